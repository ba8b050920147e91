use chrono::{DateTime, Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::{Rng, thread_rng};
use sea_orm::entity::prelude::*;
use sea_orm::{ConnectionTrait, PaginatorTrait, Set};
use serde::Serialize;

/// Length of generated reset tokens.
pub const TOKEN_LENGTH: usize = 32;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "password_reset_tokens")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub user_id: i64,
    #[sea_orm(unique)]
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    User,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

fn generate_token() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

impl Model {
    /// Issues a fresh token for `user_id` valid for `ttl`.
    pub async fn issue<C: ConnectionTrait>(
        db: &C,
        user_id: i64,
        ttl: Duration,
    ) -> Result<Model, DbErr> {
        Self::issue_expiring_at(db, user_id, Utc::now() + ttl).await
    }

    pub async fn issue_expiring_at<C: ConnectionTrait>(
        db: &C,
        user_id: i64,
        expires_at: DateTime<Utc>,
    ) -> Result<Model, DbErr> {
        ActiveModel {
            user_id: Set(user_id),
            token: Set(generate_token()),
            expires_at: Set(expires_at),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(db)
        .await
    }

    pub async fn find_by_token<C: ConnectionTrait>(
        db: &C,
        token: &str,
    ) -> Result<Option<Model>, DbErr> {
        Entity::find()
            .filter(Column::Token.eq(token))
            .one(db)
            .await
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub async fn remove<C: ConnectionTrait>(self, db: &C) -> Result<(), DbErr> {
        Entity::delete_by_id(self.id).exec(db).await?;
        Ok(())
    }

    /// Deletes the token if it is still live at `now`.
    ///
    /// Returns whether this call removed it; only one caller can win.
    pub async fn consume<C: ConnectionTrait>(
        &self,
        db: &C,
        now: DateTime<Utc>,
    ) -> Result<bool, DbErr> {
        let res = Entity::delete_many()
            .filter(Column::Id.eq(self.id))
            .filter(Column::ExpiresAt.gte(now))
            .exec(db)
            .await?;
        Ok(res.rows_affected == 1)
    }

    /// Deletes every token that expired before `now`. Returns the number removed.
    pub async fn purge_expired<C: ConnectionTrait>(
        db: &C,
        now: DateTime<Utc>,
    ) -> Result<u64, DbErr> {
        let res = Entity::delete_many()
            .filter(Column::ExpiresAt.lt(now))
            .exec(db)
            .await?;
        Ok(res.rows_affected)
    }

    pub async fn count_for_user<C: ConnectionTrait>(db: &C, user_id: i64) -> Result<u64, DbErr> {
        Entity::find()
            .filter(Column::UserId.eq(user_id))
            .count(db)
            .await
    }
}
