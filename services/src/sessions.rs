//! Recording and reviewing a trainer's sessions.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{Datelike, NaiveDate};
use sea_orm::{ConnectionTrait, TransactionTrait};
use tracing::{debug, info, warn};

use db::models::participant::Model as Participant;
use db::models::session_participant::Model as Presence;
use db::models::trainer::Model as Trainer;
use db::models::training_session::Model as TrainingSession;
use documents::parse_hours;

use crate::error::{ServiceError, ServiceResult};

/// Hours from a duration typed by a user.
///
/// Unparseable input becomes `0.0`; the value is logged so a zeroed session
/// can be traced back.
pub fn duration_hours(text: &str) -> f64 {
    parse_hours(text).unwrap_or_else(|| {
        warn!(input = text, "unparseable session duration stored as 0");
        0.0
    })
}

/// A session as submitted from the attendance form.
#[derive(Debug, Clone)]
pub struct SessionInput {
    pub date: NaiveDate,
    pub duration: String,
    pub participant_ids: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParticipantStat {
    pub participant: Participant,
    pub present: u64,
    /// Share of the trainer's sessions attended, 0–100.
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttendanceStats {
    pub total_sessions: u64,
    pub participants: Vec<ParticipantStat>,
}

/// Hours per calendar month.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonthHours {
    pub year: i32,
    pub month: u32,
    pub hours: f64,
}

/// Participants of a trainer, sorted case-insensitively by name.
pub async fn sorted_participants<C: ConnectionTrait>(
    db: &C,
    trainer_id: i64,
) -> ServiceResult<Vec<Participant>> {
    let mut participants = Participant::for_trainer(db, trainer_id).await?;
    participants.sort_by_key(|p| p.name.to_lowercase());
    Ok(participants)
}

pub struct SessionService;

impl SessionService {
    /// Stores a new session with its attendance.
    pub async fn record<C>(db: &C, trainer_id: i64, input: &SessionInput) -> ServiceResult<TrainingSession>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        Trainer::find(db, trainer_id)
            .await?
            .ok_or(ServiceError::NotFound("trainer"))?;
        Self::check_participants(db, trainer_id, &input.participant_ids).await?;
        let hours = duration_hours(&input.duration);

        let txn = db.begin().await?;
        let session = TrainingSession::create(&txn, trainer_id, input.date, hours).await?;
        session.set_participants(&txn, &input.participant_ids).await?;
        txn.commit().await?;

        info!(
            session_id = session.id,
            trainer_id,
            date = %session.date,
            hours,
            present = input.participant_ids.len(),
            "session recorded"
        );
        Ok(session)
    }

    /// Changes date, duration and attendance of a session.
    pub async fn edit<C>(db: &C, session_id: i64, input: &SessionInput) -> ServiceResult<TrainingSession>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        let session = TrainingSession::find(db, session_id)
            .await?
            .ok_or(ServiceError::NotFound("session"))?;
        Self::check_participants(db, session.trainer_id, &input.participant_ids).await?;
        let hours = duration_hours(&input.duration);

        let txn = db.begin().await?;
        let session = session.update_details(&txn, input.date, hours).await?;
        session.set_participants(&txn, &input.participant_ids).await?;
        txn.commit().await?;

        info!(session_id, date = %session.date, hours, "session updated");
        Ok(session)
    }

    /// Changes date and/or duration from the admin table. Values that do not
    /// parse are ignored and the stored ones kept.
    pub async fn update_inline<C: ConnectionTrait>(
        db: &C,
        session_id: i64,
        date: Option<&str>,
        duration: Option<&str>,
    ) -> ServiceResult<TrainingSession> {
        let session = TrainingSession::find(db, session_id)
            .await?
            .ok_or(ServiceError::NotFound("session"))?;

        let new_date = match date.map(|d| NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d")) {
            Some(Ok(parsed)) => parsed,
            Some(Err(_)) => {
                debug!(session_id, input = date, "inline date ignored");
                session.date
            }
            None => session.date,
        };
        let new_duration = match duration.map(parse_hours) {
            Some(Some(hours)) => hours,
            Some(None) => {
                debug!(session_id, input = duration, "inline duration ignored");
                session.duration
            }
            None => session.duration,
        };

        if (new_date, new_duration) == (session.date, session.duration) {
            return Ok(session);
        }
        let session = session.update_details(db, new_date, new_duration).await?;
        info!(session_id, date = %session.date, hours = session.duration, "session updated inline");
        Ok(session)
    }

    pub async fn delete<C>(db: &C, session_id: i64) -> ServiceResult<()>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        let session = TrainingSession::find(db, session_id)
            .await?
            .ok_or(ServiceError::NotFound("session"))?;

        let txn = db.begin().await?;
        session.set_participants(&txn, &[]).await?;
        session.remove(&txn).await?;
        txn.commit().await?;

        info!(session_id, "session deleted");
        Ok(())
    }

    /// A trainer's sessions, newest first.
    pub async fn list<C: ConnectionTrait>(db: &C, trainer_id: i64) -> ServiceResult<Vec<TrainingSession>> {
        Ok(TrainingSession::for_trainer(db, trainer_id).await?)
    }

    /// How often each participant attended the trainer's sessions.
    pub async fn participant_stats<C: ConnectionTrait>(
        db: &C,
        trainer_id: i64,
    ) -> ServiceResult<AttendanceStats> {
        let participants = sorted_participants(db, trainer_id).await?;
        let session_ids: Vec<i64> = TrainingSession::for_trainer(db, trainer_id)
            .await?
            .into_iter()
            .map(|s| s.id)
            .collect();
        let total_sessions = session_ids.len() as u64;

        let mut counts: HashMap<i64, u64> = HashMap::new();
        for row in Presence::for_sessions(db, &session_ids).await? {
            *counts.entry(row.participant_id).or_default() += 1;
        }

        let participants = participants
            .into_iter()
            .map(|participant| {
                let present = counts.get(&participant.id).copied().unwrap_or(0);
                let percent = if total_sessions == 0 {
                    0.0
                } else {
                    present as f64 / total_sessions as f64 * 100.0
                };
                ParticipantStat {
                    participant,
                    present,
                    percent,
                }
            })
            .collect();

        Ok(AttendanceStats {
            total_sessions,
            participants,
        })
    }

    /// Hours per month over all of a trainer's sessions, newest month first.
    pub async fn monthly_summary<C: ConnectionTrait>(
        db: &C,
        trainer_id: i64,
    ) -> ServiceResult<Vec<MonthHours>> {
        let mut totals: BTreeMap<(i32, u32), f64> = BTreeMap::new();
        for session in TrainingSession::for_trainer(db, trainer_id).await? {
            *totals
                .entry((session.date.year(), session.date.month()))
                .or_default() += session.duration;
        }
        Ok(totals
            .into_iter()
            .rev()
            .map(|((year, month), hours)| MonthHours { year, month, hours })
            .collect())
    }

    async fn check_participants<C: ConnectionTrait>(
        db: &C,
        trainer_id: i64,
        ids: &[i64],
    ) -> ServiceResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let own: HashSet<i64> = Participant::for_trainer(db, trainer_id)
            .await?
            .into_iter()
            .map(|p| p.id)
            .collect();
        if let Some(&foreign) = ids.iter().find(|id| !own.contains(*id)) {
            warn!(trainer_id, participant_id = foreign, "participant does not belong to trainer");
            return Err(ServiceError::validation("Wybrano uczestnika spoza listy prowadzącego."));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use db::models::trainer::NewTrainer;
    use db::test_utils::setup_test_db;
    use sea_orm::DatabaseConnection;

    fn day(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, m, d).unwrap()
    }

    async fn trainer_with(db: &DatabaseConnection, names: &[&str]) -> (Trainer, Vec<Participant>) {
        let trainer = Trainer::create(
            db,
            NewTrainer {
                first_name: "Anna".into(),
                last_name: "Nowak".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        let mut participants = Vec::new();
        for name in names {
            participants.push(Participant::create(db, trainer.id, name).await.unwrap());
        }
        (trainer, participants)
    }

    fn input(date: NaiveDate, duration: &str, ids: &[i64]) -> SessionInput {
        SessionInput {
            date,
            duration: duration.into(),
            participant_ids: ids.to_vec(),
        }
    }

    #[test]
    fn malformed_duration_is_zero() {
        assert_eq!(duration_hours("1,5"), 1.5);
        assert_eq!(duration_hours("2"), 2.0);
        assert_eq!(duration_hours("półtorej"), 0.0);
        assert_eq!(duration_hours(""), 0.0);
    }

    #[tokio::test]
    async fn record_edit_and_delete() {
        let db = setup_test_db().await;
        let (trainer, people) = trainer_with(&db, &["Ala", "Bartek"]).await;

        let session = SessionService::record(&db, trainer.id, &input(day(3, 14), "1,5", &[people[0].id]))
            .await
            .unwrap();
        assert_eq!(session.duration, 1.5);
        assert!(!session.sent);
        assert_eq!(session.present_participants(&db).await.unwrap().len(), 1);

        let edited = SessionService::edit(
            &db,
            session.id,
            &input(day(3, 15), "abc", &[people[0].id, people[1].id]),
        )
        .await
        .unwrap();
        assert_eq!(edited.date, day(3, 15));
        assert_eq!(edited.duration, 0.0);
        assert_eq!(edited.present_participants(&db).await.unwrap().len(), 2);

        SessionService::delete(&db, session.id).await.unwrap();
        assert!(SessionService::list(&db, trainer.id).await.unwrap().is_empty());
        assert!(matches!(
            SessionService::delete(&db, session.id).await,
            Err(ServiceError::NotFound("session"))
        ));
    }

    #[tokio::test]
    async fn inline_update_keeps_unparseable_values() {
        let db = setup_test_db().await;
        let (trainer, people) = trainer_with(&db, &["Ala"]).await;
        let session = SessionService::record(&db, trainer.id, &input(day(3, 14), "1,5", &[people[0].id]))
            .await
            .unwrap();

        let moved = SessionService::update_inline(&db, session.id, Some("2025-03-20"), Some("zły"))
            .await
            .unwrap();
        assert_eq!(moved.date, day(3, 20));
        assert_eq!(moved.duration, 1.5);

        let longer = SessionService::update_inline(&db, session.id, Some("20.03.2025"), Some("2"))
            .await
            .unwrap();
        assert_eq!(longer.date, day(3, 20));
        assert_eq!(longer.duration, 2.0);

        let untouched = SessionService::update_inline(&db, session.id, None, None).await.unwrap();
        assert_eq!(untouched, longer);
        assert_eq!(untouched.present_participants(&db).await.unwrap().len(), 1);

        let missing = SessionService::update_inline(&db, 999, Some("2025-03-01"), None).await;
        assert!(matches!(missing, Err(ServiceError::NotFound("session"))));
    }

    #[tokio::test]
    async fn foreign_participants_are_rejected() {
        let db = setup_test_db().await;
        let (anna, _) = trainer_with(&db, &["Ala"]).await;
        let (_, theirs) = trainer_with(&db, &["Obcy"]).await;

        let err = SessionService::record(&db, anna.id, &input(day(3, 1), "1", &[theirs[0].id]))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        assert!(SessionService::list(&db, anna.id).await.unwrap().is_empty());

        let missing = SessionService::record(&db, 999, &input(day(3, 1), "1", &[])).await;
        assert!(matches!(missing, Err(ServiceError::NotFound("trainer"))));
    }

    #[tokio::test]
    async fn stats_count_presence_per_participant() {
        let db = setup_test_db().await;
        let (trainer, people) = trainer_with(&db, &["zosia", "Adam", "Bartek"]).await;
        let (zosia, adam) = (people[0].id, people[1].id);

        for (d, ids) in [(1, vec![zosia, adam]), (2, vec![zosia]), (3, vec![zosia]), (4, vec![])] {
            SessionService::record(&db, trainer.id, &input(day(3, d), "1", &ids))
                .await
                .unwrap();
        }

        let stats = SessionService::participant_stats(&db, trainer.id).await.unwrap();
        assert_eq!(stats.total_sessions, 4);
        let rows: Vec<(&str, u64, f64)> = stats
            .participants
            .iter()
            .map(|s| (s.participant.name.as_str(), s.present, s.percent))
            .collect();
        assert_eq!(
            rows,
            vec![("Adam", 1, 25.0), ("Bartek", 0, 0.0), ("zosia", 3, 75.0)]
        );
    }

    #[tokio::test]
    async fn stats_without_sessions_are_zero() {
        let db = setup_test_db().await;
        let (trainer, _) = trainer_with(&db, &["Ala"]).await;
        let stats = SessionService::participant_stats(&db, trainer.id).await.unwrap();
        assert_eq!(stats.total_sessions, 0);
        assert_eq!(stats.participants[0].percent, 0.0);
    }

    #[tokio::test]
    async fn monthly_summary_groups_by_month() {
        let db = setup_test_db().await;
        let (trainer, _) = trainer_with(&db, &[]).await;
        for (m, d, h) in [(2, 10, "1,5"), (3, 1, "1,5"), (3, 1, "1"), (3, 15, "2")] {
            SessionService::record(&db, trainer.id, &input(day(m, d), h, &[]))
                .await
                .unwrap();
        }

        let summary = SessionService::monthly_summary(&db, trainer.id).await.unwrap();
        assert_eq!(
            summary,
            vec![
                MonthHours { year: 2025, month: 3, hours: 4.5 },
                MonthHours { year: 2025, month: 2, hours: 1.5 },
            ]
        );
    }
}
