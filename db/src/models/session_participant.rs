use sea_orm::entity::prelude::*;
use sea_orm::ConnectionTrait;

/// Presence of one participant at one session.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "session_participants")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub session_id: i64,
    #[sea_orm(primary_key, auto_increment = false)]
    pub participant_id: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::training_session::Entity",
        from = "Column::SessionId",
        to = "super::training_session::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Session,
    #[sea_orm(
        belongs_to = "super::participant::Entity",
        from = "Column::ParticipantId",
        to = "super::participant::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Participant,
}

impl Related<super::training_session::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Session.def()
    }
}

impl Related<super::participant::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Participant.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Presence rows of the given sessions.
    pub async fn for_sessions<C: ConnectionTrait>(
        db: &C,
        session_ids: &[i64],
    ) -> Result<Vec<Model>, DbErr> {
        if session_ids.is_empty() {
            return Ok(Vec::new());
        }
        Entity::find()
            .filter(Column::SessionId.is_in(session_ids.iter().copied()))
            .all(db)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{participant, trainer, training_session};
    use crate::test_utils::setup_test_db;
    use chrono::NaiveDate;

    #[tokio::test]
    async fn rows_are_limited_to_requested_sessions() {
        let db = setup_test_db().await;
        let t = trainer::Model::create(&db, trainer::NewTrainer::default()).await.unwrap();
        let p = participant::Model::create(&db, t.id, "Ala").await.unwrap();
        let day = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let a = training_session::Model::create(&db, t.id, day, 1.0).await.unwrap();
        let b = training_session::Model::create(&db, t.id, day, 1.0).await.unwrap();
        a.set_participants(&db, &[p.id]).await.unwrap();
        b.set_participants(&db, &[p.id]).await.unwrap();

        assert_eq!(Model::for_sessions(&db, &[a.id]).await.unwrap().len(), 1);
        assert_eq!(Model::for_sessions(&db, &[a.id, b.id]).await.unwrap().len(), 2);
        assert!(Model::for_sessions(&db, &[]).await.unwrap().is_empty());

        let rows = a.find_related(Entity).all(&db).await.unwrap();
        assert_eq!(rows, vec![Model { session_id: a.id, participant_id: p.id }]);
        let session = rows[0].find_related(training_session::Entity).one(&db).await.unwrap();
        assert_eq!(session.map(|s| s.id), Some(a.id));
    }
}
