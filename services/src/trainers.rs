//! Trainer records and their participant lists, edited by admins and by the
//! trainers themselves.

use sea_orm::{ConnectionTrait, TransactionTrait};
use tracing::{debug, info, warn};

use db::models::participant::Model as Participant;
use db::models::trainer::{Model as Trainer, NewTrainer, TrainerChanges, DEFAULT_SESSION_HOURS};
use documents::parse_hours;

use crate::error::{ServiceError, ServiceResult};

const NAMES_REQUIRED: &str = "Wszystkie pola są wymagane.";
const PARTICIPANT_NAME_REQUIRED: &str = "Brak nazwy uczestnika.";

/// Trainer details as entered by an admin.
#[derive(Debug, Clone, Default)]
pub struct TrainerForm {
    pub first_name: String,
    pub last_name: String,
    pub contract_number: String,
    pub course_name: String,
}

/// A trainer's own profile form.
#[derive(Debug, Clone, Default)]
pub struct ProfileForm {
    pub first_name: String,
    pub last_name: String,
    pub contract_number: String,
    pub default_duration: String,
}

/// Inline edit from the admin table; `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct TrainerPatch {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub contract_number: Option<String>,
    pub course_name: Option<String>,
}

fn optional_text(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn required_names(first: &str, last: &str) -> ServiceResult<(String, String)> {
    let (first, last) = (first.trim(), last.trim());
    if first.is_empty() || last.is_empty() {
        return Err(ServiceError::validation(NAMES_REQUIRED));
    }
    Ok((first.to_string(), last.to_string()))
}

fn participant_name(name: &str) -> ServiceResult<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ServiceError::validation(PARTICIPANT_NAME_REQUIRED));
    }
    Ok(name)
}

pub struct TrainerService;

impl TrainerService {
    /// All trainers by last name.
    pub async fn list<C: ConnectionTrait>(db: &C) -> ServiceResult<Vec<Trainer>> {
        Ok(Trainer::all(db).await?)
    }

    pub async fn create<C: ConnectionTrait>(db: &C, form: &TrainerForm) -> ServiceResult<Trainer> {
        let (first_name, last_name) = required_names(&form.first_name, &form.last_name)?;
        let trainer = Trainer::create(
            db,
            NewTrainer {
                first_name,
                last_name,
                contract_number: form.contract_number.trim().to_string(),
                course_name: optional_text(&form.course_name),
                ..Default::default()
            },
        )
        .await?;
        info!(trainer_id = trainer.id, "trainer created");
        Ok(trainer)
    }

    /// Replaces the admin-editable details of a trainer.
    pub async fn edit<C: ConnectionTrait>(
        db: &C,
        trainer_id: i64,
        form: &TrainerForm,
    ) -> ServiceResult<Trainer> {
        let (first_name, last_name) = required_names(&form.first_name, &form.last_name)?;
        let trainer = Self::find(db, trainer_id).await?;
        let trainer = trainer
            .update(
                db,
                TrainerChanges {
                    first_name: Some(first_name),
                    last_name: Some(last_name),
                    contract_number: Some(form.contract_number.trim().to_string()),
                    course_name: Some(optional_text(&form.course_name)),
                    ..Default::default()
                },
            )
            .await?;
        info!(trainer_id, "trainer updated");
        Ok(trainer)
    }

    /// Applies the fields present in `patch`. Blank names are ignored and a
    /// blank course name clears it.
    pub async fn update_inline<C: ConnectionTrait>(
        db: &C,
        trainer_id: i64,
        patch: &TrainerPatch,
    ) -> ServiceResult<Trainer> {
        let trainer = Self::find(db, trainer_id).await?;
        let changes = TrainerChanges {
            first_name: patch.first_name.as_deref().and_then(optional_text),
            last_name: patch.last_name.as_deref().and_then(optional_text),
            contract_number: patch.contract_number.as_deref().map(|c| c.trim().to_string()),
            course_name: patch.course_name.as_deref().map(optional_text),
            ..Default::default()
        };
        let trainer = trainer.update(db, changes).await?;
        debug!(trainer_id, "trainer updated inline");
        Ok(trainer)
    }

    /// Saves the profile a trainer edits themselves. An empty or unreadable
    /// default duration falls back to [`DEFAULT_SESSION_HOURS`].
    pub async fn update_profile<C: ConnectionTrait>(
        db: &C,
        trainer_id: i64,
        form: &ProfileForm,
    ) -> ServiceResult<Trainer> {
        let (first_name, last_name) = required_names(&form.first_name, &form.last_name)?;
        let default_duration = parse_hours(&form.default_duration).unwrap_or_else(|| {
            debug!(input = %form.default_duration, "default duration reset");
            DEFAULT_SESSION_HOURS
        });
        let trainer = Self::find(db, trainer_id).await?;
        let trainer = trainer
            .update(
                db,
                TrainerChanges {
                    first_name: Some(first_name),
                    last_name: Some(last_name),
                    contract_number: Some(form.contract_number.trim().to_string()),
                    default_duration: Some(default_duration),
                    ..Default::default()
                },
            )
            .await?;
        info!(trainer_id, default_duration, "trainer profile saved");
        Ok(trainer)
    }

    /// Deletes a trainer with everything they own; their login accounts are
    /// kept without a trainer.
    pub async fn delete<C>(db: &C, trainer_id: i64) -> ServiceResult<()>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        let trainer = Self::find(db, trainer_id).await?;

        let txn = db.begin().await?;
        trainer.remove(&txn).await?;
        txn.commit().await?;

        info!(trainer_id, "trainer deleted");
        Ok(())
    }

    pub async fn add_participant<C: ConnectionTrait>(
        db: &C,
        trainer_id: i64,
        name: &str,
    ) -> ServiceResult<Participant> {
        let name = participant_name(name)?;
        Self::find(db, trainer_id).await?;
        let participant = Participant::create(db, trainer_id, name).await?;
        info!(trainer_id, participant_id = participant.id, "participant added");
        Ok(participant)
    }

    /// Renames a participant. With `owner` set, participants of other
    /// trainers are reported as not found.
    pub async fn rename_participant<C: ConnectionTrait>(
        db: &C,
        owner: Option<i64>,
        participant_id: i64,
        name: &str,
    ) -> ServiceResult<Participant> {
        let name = participant_name(name)?;
        let participant = Self::owned_participant(db, owner, participant_id).await?;
        Ok(participant.rename(db, name).await?)
    }

    /// Removes a participant and their attendance marks.
    pub async fn remove_participant<C>(
        db: &C,
        owner: Option<i64>,
        participant_id: i64,
    ) -> ServiceResult<()>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        let participant = Self::owned_participant(db, owner, participant_id).await?;

        let txn = db.begin().await?;
        participant.remove(&txn).await?;
        txn.commit().await?;

        info!(participant_id, "participant removed");
        Ok(())
    }

    async fn find<C: ConnectionTrait>(db: &C, trainer_id: i64) -> ServiceResult<Trainer> {
        Trainer::find(db, trainer_id)
            .await?
            .ok_or(ServiceError::NotFound("trainer"))
    }

    async fn owned_participant<C: ConnectionTrait>(
        db: &C,
        owner: Option<i64>,
        participant_id: i64,
    ) -> ServiceResult<Participant> {
        let participant = Participant::find(db, participant_id)
            .await?
            .ok_or(ServiceError::NotFound("participant"))?;
        match owner {
            Some(trainer_id) if trainer_id != participant.trainer_id => {
                warn!(trainer_id, participant_id, "participant belongs to another trainer");
                Err(ServiceError::NotFound("participant"))
            }
            _ => Ok(participant),
        }
    }
}
