//! Document generation for stored data: monthly reports, attendance lists
//! and their delivery to the coordinator.

use std::path::PathBuf;

use tracing::{info, warn};

use db::models::trainer::Model as Trainer;
use db::models::training_session::Model as TrainingSession;
use documents::{
    format_decimal, generate_attendance_list, generate_monthly_report, AttendanceList,
    GeneratedList, MonthlyReport, ReportPeriod, ReportTrainer, SessionHours, SignatureFailure,
};
use util::paths::{ensure_parent_dir, report_output_path};
use util::state::AppState;

use crate::email::{coordinator_mail, send_to_coordinator, CoordinatorDocument, MailQueue, MailTransport};
use crate::error::{ServiceError, ServiceResult};

const LIST_DATE_FORMAT: &str = "%Y-%m-%d";

/// A report written by [`ReportService::generate_all`].
#[derive(Debug, Clone, PartialEq)]
pub struct WrittenReport {
    pub trainer_id: i64,
    pub path: PathBuf,
    pub total_hours: f64,
    /// Whether the report was queued for the coordinator.
    pub queued: bool,
}

fn log_signature_failures(failures: &[SignatureFailure], what: &str) {
    for failure in failures {
        warn!(site = %failure.site, error = %failure.error, document = what, "signature left blank");
    }
}

fn report_trainer(state: &AppState, trainer: &Trainer) -> ReportTrainer {
    ReportTrainer {
        first_name: trainer.first_name.clone(),
        last_name: trainer.last_name.clone(),
        contract_number: trainer.contract_number.clone(),
        signature: signature_path(state, trainer),
    }
}

fn signature_path(state: &AppState, trainer: &Trainer) -> Option<PathBuf> {
    trainer
        .signature_filename
        .as_deref()
        .filter(|f| !f.trim().is_empty())
        .map(|f| state.config().signature_path(f))
}

pub struct ReportService;

impl ReportService {
    /// Fills the report template for a trainer's month.
    pub async fn monthly_report(
        state: &AppState,
        trainer_id: i64,
        month: u32,
        year: i32,
    ) -> ServiceResult<(Trainer, MonthlyReport)> {
        let period = ReportPeriod::new(month, year)?;
        let trainer = Trainer::find(state.db(), trainer_id)
            .await?
            .ok_or(ServiceError::NotFound("trainer"))?;

        let sessions: Vec<SessionHours> = TrainingSession::in_month(state.db(), trainer_id, month, year)
            .await?
            .into_iter()
            .map(|s| SessionHours {
                date: s.date,
                hours: s.duration,
            })
            .collect();

        let report = generate_monthly_report(
            &report_trainer(state, &trainer),
            &sessions,
            &state.config().report_template_path(),
            period,
        )?;
        log_signature_failures(&report.signature_failures, "monthly report");
        info!(
            trainer_id,
            period = %period.label(),
            sessions = sessions.len(),
            total_hours = report.total_hours,
            "monthly report generated"
        );
        Ok((trainer, report))
    }

    /// Fills the attendance list of one session.
    pub async fn attendance_list(
        state: &AppState,
        session_id: i64,
    ) -> ServiceResult<(TrainingSession, Trainer, GeneratedList)> {
        let session = TrainingSession::find(state.db(), session_id)
            .await?
            .ok_or(ServiceError::NotFound("session"))?;
        let trainer = Trainer::find(state.db(), session.trainer_id)
            .await?
            .ok_or(ServiceError::NotFound("trainer"))?;

        let mut present: Vec<String> = session
            .present_participants(state.db())
            .await?
            .into_iter()
            .map(|p| p.name)
            .collect();
        present.sort_by_key(|name| name.to_lowercase());

        let list = AttendanceList {
            date: session.date.format(LIST_DATE_FORMAT).to_string(),
            duration: format_decimal(session.duration),
            present,
            trainer_label: trainer.full_name(),
            signature: signature_path(state, &trainer),
            course_name: trainer.course_name.clone(),
        };
        let generated = generate_attendance_list(&state.config().attendance_template_path(), &list)?;
        log_signature_failures(&generated.signature_failures, "attendance list");
        Ok((session, trainer, generated))
    }

    /// Generates the session's list, sends it to the coordinator and marks
    /// the session as sent. Returns whether the e-mail went out.
    pub async fn send_attendance_list(
        state: &AppState,
        transport: &dyn MailTransport,
        session_id: i64,
    ) -> ServiceResult<bool> {
        let (session, trainer, generated) = Self::attendance_list(state, session_id).await?;
        let bytes = generated.document.to_bytes()?;
        let date = session.date.format(LIST_DATE_FORMAT).to_string();

        let settings = state.settings();
        let name = trainer.full_name();
        let sent = send_to_coordinator(
            transport,
            &settings,
            CoordinatorDocument::AttendanceList,
            &date,
            Some(&name),
            bytes,
        )
        .await;
        if sent {
            session.mark_sent(state.db()).await?;
            info!(session_id, "attendance list sent");
        }
        Ok(sent)
    }

    /// Generates a trainer's monthly report and sends it to the coordinator.
    pub async fn send_monthly_report(
        state: &AppState,
        transport: &dyn MailTransport,
        trainer_id: i64,
        month: u32,
        year: i32,
    ) -> ServiceResult<bool> {
        let (trainer, report) = Self::monthly_report(state, trainer_id, month, year).await?;
        let bytes = report.document.to_bytes()?;
        let label = ReportPeriod::new(month, year)?.file_label();
        let settings = state.settings();
        let name = trainer.full_name();
        Ok(send_to_coordinator(
            transport,
            &settings,
            CoordinatorDocument::MonthlyReport,
            &label,
            Some(&name),
            bytes,
        )
        .await)
    }

    /// Writes the report of every trainer with sessions in the month to
    /// `REPORTS_DIR`, optionally queueing each for the coordinator.
    pub async fn generate_all(
        state: &AppState,
        mail: Option<&MailQueue>,
        month: u32,
        year: i32,
    ) -> ServiceResult<Vec<WrittenReport>> {
        let period = ReportPeriod::new(month, year)?;
        let trainer_ids = TrainingSession::trainers_active_in(state.db(), month, year).await?;
        info!(period = %period.label(), trainers = trainer_ids.len(), "generating monthly reports");

        let mut written = Vec::with_capacity(trainer_ids.len());
        for trainer_id in trainer_ids {
            let (trainer, report) = Self::monthly_report(state, trainer_id, month, year).await?;
            let path = report_output_path(&state.config().reports_dir, trainer_id, month, year);
            ensure_parent_dir(&path)?;
            report.document.save(&path)?;
            info!(trainer_id, path = %path.display(), "report written");

            let mut queued = false;
            if let Some(mail) = mail {
                let settings = state.settings();
                let name = trainer.full_name();
                let message = coordinator_mail(
                    &settings,
                    CoordinatorDocument::MonthlyReport,
                    &period.file_label(),
                    Some(&name),
                    report.document.to_bytes()?,
                )?;
                if let Some(message) = message {
                    mail.enqueue(message).await?;
                    queued = true;
                }
            }

            written.push(WrittenReport {
                trainer_id,
                path,
                total_hours: report.total_hours,
                queued,
            });
        }
        Ok(written)
    }
}
