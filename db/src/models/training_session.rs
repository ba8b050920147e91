use chrono::NaiveDate;
use sea_orm::entity::prelude::*;
use sea_orm::{ConnectionTrait, QueryOrder, QuerySelect, Set};
use serde::Serialize;

use super::session_participant;

/// One dated training session of a trainer.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "training_sessions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub trainer_id: i64,
    pub date: NaiveDate,
    /// Length in hours.
    pub duration: f64,
    /// Whether the attendance list was already e-mailed.
    pub sent: bool,
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
    #[sea_orm(has_many = "super::session_participant::Entity")]
    Presence,
}

impl Related<super::trainer::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Trainer.def()
    }
}

impl Related<super::session_participant::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Presence.def()
    }
}

impl Related<super::participant::Entity> for Entity {
    fn to() -> RelationDef {
        session_participant::Relation::Participant.def()
    }

    fn via() -> Option<RelationDef> {
        Some(session_participant::Relation::Session.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// First day of `(month, year)` and of the month after it.
pub fn month_bounds(month: u32, year: i32) -> Option<(NaiveDate, NaiveDate)> {
    let start = NaiveDate::from_ymd_opt(year, month, 1)?;
    let end = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some((start, end))
}

impl Model {
    pub async fn create<C: ConnectionTrait>(
        db: &C,
        trainer_id: i64,
        date: NaiveDate,
        duration: f64,
    ) -> Result<Model, DbErr> {
        ActiveModel {
            trainer_id: Set(trainer_id),
            date: Set(date),
            duration: Set(duration),
            sent: Set(false),
            ..Default::default()
        }
        .insert(db)
        .await
    }

    pub async fn find<C: ConnectionTrait>(db: &C, id: i64) -> Result<Option<Model>, DbErr> {
        Entity::find_by_id(id).one(db).await
    }

    /// All sessions of a trainer, newest first.
    pub async fn for_trainer<C: ConnectionTrait>(
        db: &C,
        trainer_id: i64,
    ) -> Result<Vec<Model>, DbErr> {
        Entity::find()
            .filter(Column::TrainerId.eq(trainer_id))
            .order_by_desc(Column::Date)
            .order_by_desc(Column::Id)
            .all(db)
            .await
    }

    /// Sessions of a trainer that fall into the given month.
    pub async fn in_month<C: ConnectionTrait>(
        db: &C,
        trainer_id: i64,
        month: u32,
        year: i32,
    ) -> Result<Vec<Model>, DbErr> {
        let Some((start, end)) = month_bounds(month, year) else {
            return Ok(Vec::new());
        };
        Entity::find()
            .filter(Column::TrainerId.eq(trainer_id))
            .filter(Column::Date.gte(start))
            .filter(Column::Date.lt(end))
            .order_by_asc(Column::Date)
            .all(db)
            .await
    }

    /// Ids of trainers that have at least one session in the given month.
    pub async fn trainers_active_in<C: ConnectionTrait>(
        db: &C,
        month: u32,
        year: i32,
    ) -> Result<Vec<i64>, DbErr> {
        let Some((start, end)) = month_bounds(month, year) else {
            return Ok(Vec::new());
        };
        Entity::find()
            .select_only()
            .column(Column::TrainerId)
            .distinct()
            .filter(Column::Date.gte(start))
            .filter(Column::Date.lt(end))
            .order_by_asc(Column::TrainerId)
            .into_tuple::<i64>()
            .all(db)
            .await
    }

    /// Replaces the set of participants marked present.
    pub async fn set_participants<C: ConnectionTrait>(
        &self,
        db: &C,
        participant_ids: &[i64],
    ) -> Result<(), DbErr> {
        session_participant::Entity::delete_many()
            .filter(session_participant::Column::SessionId.eq(self.id))
            .exec(db)
            .await?;

        let mut ids = participant_ids.to_vec();
        ids.sort_unstable();
        ids.dedup();
        if ids.is_empty() {
            return Ok(());
        }

        let rows = ids.into_iter().map(|participant_id| session_participant::ActiveModel {
            session_id: Set(self.id),
            participant_id: Set(participant_id),
        });
        session_participant::Entity::insert_many(rows)
            .exec_without_returning(db)
            .await?;
        Ok(())
    }

    /// Participants marked present, alphabetically.
    pub async fn present_participants<C: ConnectionTrait>(
        &self,
        db: &C,
    ) -> Result<Vec<super::participant::Model>, DbErr> {
        self.find_related(super::participant::Entity)
            .order_by_asc(super::participant::Column::Name)
            .all(db)
            .await
    }

    pub async fn update_details<C: ConnectionTrait>(
        &self,
        db: &C,
        date: NaiveDate,
        duration: f64,
    ) -> Result<Model, DbErr> {
        let mut active: ActiveModel = self.clone().into();
        active.date = Set(date);
        active.duration = Set(duration);
        active.update(db).await
    }

    pub async fn mark_sent<C: ConnectionTrait>(&self, db: &C) -> Result<Model, DbErr> {
        let mut active: ActiveModel = self.clone().into();
        active.sent = Set(true);
        active.update(db).await
    }

    pub async fn remove<C: ConnectionTrait>(self, db: &C) -> Result<(), DbErr> {
        Entity::delete_by_id(self.id).exec(db).await?;
        Ok(())
    }
}
