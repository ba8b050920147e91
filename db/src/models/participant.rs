use sea_orm::entity::prelude::*;
use sea_orm::{ConnectionTrait, QueryOrder, Set};
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "participants")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Display name, as printed on the attendance list.
    pub name: String,
    pub trainer_id: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::trainer::Entity",
        from = "Column::TrainerId",
        to = "super::trainer::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Trainer,
}

impl Related<super::trainer::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Trainer.def()
    }
}

impl Related<super::training_session::Entity> for Entity {
    fn to() -> RelationDef {
        super::session_participant::Relation::Session.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::session_participant::Relation::Participant.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub async fn create<C: ConnectionTrait>(
        db: &C,
        trainer_id: i64,
        name: &str,
    ) -> Result<Model, DbErr> {
        ActiveModel {
            name: Set(name.trim().to_string()),
            trainer_id: Set(trainer_id),
            ..Default::default()
        }
        .insert(db)
        .await
    }

    /// Participants owned by `trainer_id`, alphabetically.
    pub async fn for_trainer<C: ConnectionTrait>(
        db: &C,
        trainer_id: i64,
    ) -> Result<Vec<Model>, DbErr> {
        Entity::find()
            .filter(Column::TrainerId.eq(trainer_id))
            .order_by_asc(Column::Name)
            .all(db)
            .await
    }

    pub async fn find<C: ConnectionTrait>(db: &C, id: i64) -> Result<Option<Model>, DbErr> {
        Entity::find_by_id(id).one(db).await
    }

    pub async fn rename<C: ConnectionTrait>(&self, db: &C, name: &str) -> Result<Model, DbErr> {
        let mut active: ActiveModel = self.clone().into();
        active.name = Set(name.trim().to_string());
        active.update(db).await
    }

    /// Deletes the participant together with their presence rows.
    pub async fn remove<C: ConnectionTrait>(self, db: &C) -> Result<(), DbErr> {
        super::session_participant::Entity::delete_many()
            .filter(super::session_participant::Column::ParticipantId.eq(self.id))
            .exec(db)
            .await?;
        Entity::delete_by_id(self.id).exec(db).await?;
        Ok(())
    }
}
