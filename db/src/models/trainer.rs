use sea_orm::entity::prelude::*;
use sea_orm::sea_query::Expr;
use sea_orm::{Condition, ConnectionTrait, QueryOrder, Set};
use serde::Serialize;

/// Default length of a session in hours when the trainer has not set one.
pub const DEFAULT_SESSION_HOURS: f64 = 1.5;

/// A person running training sessions and billed per month.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "trainers")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    /// Contract number printed on the monthly report.
    pub contract_number: String,
    pub course_name: Option<String>,
    /// File name of the signature image under the static root.
    pub signature_filename: Option<String>,
    pub default_duration: f64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::participant::Entity")]
    Participants,
    #[sea_orm(has_many = "super::training_session::Entity")]
    Sessions,
    #[sea_orm(has_many = "super::user::Entity")]
    Users,
}

impl Related<super::participant::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Participants.def()
    }
}

impl Related<super::training_session::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Sessions.def()
    }
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Users.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Fields needed to create a trainer.
#[derive(Debug, Clone, Default)]
pub struct NewTrainer {
    pub first_name: String,
    pub last_name: String,
    pub contract_number: String,
    pub course_name: Option<String>,
    pub signature_filename: Option<String>,
    pub default_duration: Option<f64>,
}

/// Changes to a trainer's details; `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct TrainerChanges {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub contract_number: Option<String>,
    /// `Some(None)` clears the course name.
    pub course_name: Option<Option<String>>,
    pub default_duration: Option<f64>,
}

impl Model {
    pub async fn create<C: ConnectionTrait>(db: &C, new: NewTrainer) -> Result<Model, DbErr> {
        ActiveModel {
            first_name: Set(new.first_name),
            last_name: Set(new.last_name),
            contract_number: Set(new.contract_number),
            course_name: Set(new.course_name),
            signature_filename: Set(new.signature_filename),
            default_duration: Set(new.default_duration.unwrap_or(DEFAULT_SESSION_HOURS)),
            ..Default::default()
        }
        .insert(db)
        .await
    }

    pub async fn find<C: ConnectionTrait>(db: &C, id: i64) -> Result<Option<Model>, DbErr> {
        Entity::find_by_id(id).one(db).await
    }

    pub async fn all<C: ConnectionTrait>(db: &C) -> Result<Vec<Model>, DbErr> {
        Entity::find()
            .order_by_asc(Column::LastName)
            .order_by_asc(Column::FirstName)
            .all(db)
            .await
    }

    /// "First Last", as printed on documents and e-mails.
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub async fn update<C: ConnectionTrait>(
        &self,
        db: &C,
        changes: TrainerChanges,
    ) -> Result<Model, DbErr> {
        let mut active: ActiveModel = self.clone().into();
        if let Some(first_name) = changes.first_name {
            active.first_name = Set(first_name);
        }
        if let Some(last_name) = changes.last_name {
            active.last_name = Set(last_name);
        }
        if let Some(contract_number) = changes.contract_number {
            active.contract_number = Set(contract_number);
        }
        if let Some(course_name) = changes.course_name {
            active.course_name = Set(course_name);
        }
        if let Some(default_duration) = changes.default_duration {
            active.default_duration = Set(default_duration);
        }
        active.update(db).await
    }

    /// Deletes the trainer with their sessions, participants and presence
    /// rows. Linked user accounts stay and lose their trainer link.
    pub async fn remove<C: ConnectionTrait>(self, db: &C) -> Result<(), DbErr> {
        use super::{participant, session_participant, training_session, user};

        user::Entity::update_many()
            .col_expr(user::Column::TrainerId, Expr::value(Option::<i64>::None))
            .filter(user::Column::TrainerId.eq(self.id))
            .exec(db)
            .await?;

        let session_ids: Vec<i64> = training_session::Model::for_trainer(db, self.id)
            .await?
            .into_iter()
            .map(|s| s.id)
            .collect();
        let participant_ids: Vec<i64> = participant::Model::for_trainer(db, self.id)
            .await?
            .into_iter()
            .map(|p| p.id)
            .collect();
        session_participant::Entity::delete_many()
            .filter(
                Condition::any()
                    .add(session_participant::Column::SessionId.is_in(session_ids))
                    .add(session_participant::Column::ParticipantId.is_in(participant_ids)),
            )
            .exec(db)
            .await?;

        training_session::Entity::delete_many()
            .filter(training_session::Column::TrainerId.eq(self.id))
            .exec(db)
            .await?;
        participant::Entity::delete_many()
            .filter(participant::Column::TrainerId.eq(self.id))
            .exec(db)
            .await?;
        Entity::delete_by_id(self.id).exec(db).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{participant, session_participant, training_session, user};
    use crate::test_utils::setup_test_db;
    use chrono::NaiveDate;

    async fn anna<C: ConnectionTrait>(db: &C) -> Model {
        Model::create(
            db,
            NewTrainer {
                first_name: "Anna".into(),
                last_name: "Nowak".into(),
                contract_number: "12/2025".into(),
                course_name: Some("Szachy".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn update_keeps_fields_left_out() {
        let db = setup_test_db().await;
        let t = anna(&db).await;
        assert_eq!(t.default_duration, DEFAULT_SESSION_HOURS);

        let updated = t
            .update(
                &db,
                TrainerChanges {
                    last_name: Some("Kowalska".into()),
                    course_name: Some(None),
                    default_duration: Some(2.0),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.full_name(), "Anna Kowalska");
        assert_eq!(updated.contract_number, "12/2025");
        assert_eq!(updated.course_name, None);
        assert_eq!(updated.default_duration, 2.0);
    }

    #[tokio::test]
    async fn remove_cascades_and_detaches_accounts() {
        let db = setup_test_db().await;
        let t = anna(&db).await;
        let other = anna(&db).await;
        let account = user::Model::create(&db, "anna@b.pl", "x", user::Role::Trainer, true, Some(t.id))
            .await
            .unwrap();
        let ala = participant::Model::create(&db, t.id, "Ala").await.unwrap();
        let kept = participant::Model::create(&db, other.id, "Ola").await.unwrap();
        let day = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let session = training_session::Model::create(&db, t.id, day, 1.0).await.unwrap();
        session.set_participants(&db, &[ala.id]).await.unwrap();
        let kept_session = training_session::Model::create(&db, other.id, day, 1.0).await.unwrap();
        kept_session.set_participants(&db, &[kept.id]).await.unwrap();

        t.clone().remove(&db).await.unwrap();

        assert!(Model::find(&db, t.id).await.unwrap().is_none());
        assert!(participant::Model::find(&db, ala.id).await.unwrap().is_none());
        assert!(training_session::Model::find(&db, session.id).await.unwrap().is_none());
        assert!(session_participant::Model::for_sessions(&db, &[session.id])
            .await
            .unwrap()
            .is_empty());
        let account = user::Model::find(&db, account.id).await.unwrap().unwrap();
        assert_eq!(account.trainer_id, None);

        assert_eq!(Model::all(&db).await.unwrap(), vec![other]);
        assert_eq!(
            session_participant::Model::for_sessions(&db, &[kept_session.id])
                .await
                .unwrap()
                .len(),
            1
        );
    }
}
