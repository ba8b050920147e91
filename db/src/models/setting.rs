use sea_orm::entity::prelude::*;
use sea_orm::{ConnectionTrait, Set};

/// One runtime setting as a key/value pair.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "settings")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub key: String,
    pub value: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Every stored pair.
    pub async fn all_pairs<C: ConnectionTrait>(db: &C) -> Result<Vec<(String, String)>, DbErr> {
        Ok(Entity::find()
            .all(db)
            .await?
            .into_iter()
            .map(|m| (m.key, m.value))
            .collect())
    }

    pub async fn get<C: ConnectionTrait>(db: &C, key: &str) -> Result<Option<String>, DbErr> {
        Ok(Entity::find_by_id(key.to_string())
            .one(db)
            .await?
            .map(|m| m.value))
    }

    /// Inserts or overwrites `key`.
    pub async fn upsert<C: ConnectionTrait>(db: &C, key: &str, value: &str) -> Result<Model, DbErr> {
        match Entity::find_by_id(key.to_string()).one(db).await? {
            Some(existing) => {
                let mut active: ActiveModel = existing.into();
                active.value = Set(value.to_string());
                active.update(db).await
            }
            None => {
                ActiveModel {
                    key: Set(key.to_string()),
                    value: Set(value.to_string()),
                }
                .insert(db)
                .await
            }
        }
    }

    /// Stores `value` only when `key` has no row yet. Returns whether it inserted.
    pub async fn insert_if_absent<C: ConnectionTrait>(
        db: &C,
        key: &str,
        value: &str,
    ) -> Result<bool, DbErr> {
        if Entity::find_by_id(key.to_string()).one(db).await?.is_some() {
            return Ok(false);
        }
        ActiveModel {
            key: Set(key.to_string()),
            value: Set(value.to_string()),
        }
        .insert(db)
        .await?;
        Ok(true)
    }
}
