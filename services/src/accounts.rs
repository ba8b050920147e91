//! Trainer registration, approval, login checks and the admin account.

use once_cell::sync::Lazy;
use regex::Regex;
use sea_orm::{ConnectionTrait, TransactionTrait};
use tracing::{debug, error, info, warn};

use db::models::participant::Model as Participant;
use db::models::trainer::{Model as Trainer, NewTrainer};
use db::models::user::{Model as User, Role};
use util::settings::{
    ACTIVATION_EMAIL_BODY, ACTIVATION_EMAIL_SUBJECT, EMAIL_RECIPIENT, REGISTRATION_EMAIL_BODY,
    REGISTRATION_EMAIL_SUBJECT,
};
use util::state::AppState;

use crate::email::{compose, MailQueue, OutgoingMail};
use crate::error::{EmailError, ServiceError, ServiceResult};

static LOGIN_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid login pattern"));

/// Logins are e-mail addresses; only the rough shape is checked.
pub fn is_valid_login(login: &str) -> bool {
    LOGIN_PATTERN.is_match(login)
}

/// Data submitted on the registration form.
#[derive(Debug, Clone, Default)]
pub struct Registration {
    pub first_name: String,
    pub last_name: String,
    pub contract_number: String,
    pub course_name: Option<String>,
    pub login: String,
    pub password: String,
    pub participants: Vec<String>,
}

impl Registration {
    fn validate(&self) -> ServiceResult<Vec<String>> {
        if self.first_name.trim().is_empty() || self.last_name.trim().is_empty() {
            return Err(ServiceError::validation("Imię i nazwisko są wymagane."));
        }
        if !is_valid_login(self.login.trim()) {
            return Err(ServiceError::validation("Login musi być poprawnym adresem e-mail."));
        }
        if self.password.trim().is_empty() {
            return Err(ServiceError::validation("Hasło nie może być puste."));
        }
        let participants: Vec<String> = self
            .participants
            .iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        if participants.is_empty() {
            return Err(ServiceError::validation("Dodaj co najmniej jednego uczestnika."));
        }
        Ok(participants)
    }
}

#[derive(Debug)]
pub enum LoginOutcome {
    Authenticated(User),
    PendingApproval,
    InvalidCredentials,
}

pub struct AccountService;

impl AccountService {
    /// Creates the trainer, its participants and an unapproved account, then
    /// tells the coordinator about the new registration.
    pub async fn register_trainer(
        state: &AppState,
        mail: &MailQueue,
        registration: Registration,
    ) -> ServiceResult<User> {
        let participants = registration.validate()?;
        let login = registration.login.trim();
        if User::find_by_login(state.db(), login).await?.is_some() {
            return Err(ServiceError::validation("Użytkownik o tym loginie już istnieje."));
        }

        let txn = state.db().begin().await?;
        let trainer = Trainer::create(
            &txn,
            NewTrainer {
                first_name: registration.first_name.trim().to_string(),
                last_name: registration.last_name.trim().to_string(),
                contract_number: registration.contract_number.trim().to_string(),
                course_name: registration
                    .course_name
                    .as_deref()
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .map(str::to_string),
                ..Default::default()
            },
        )
        .await?;
        for name in &participants {
            Participant::create(&txn, trainer.id, name).await?;
        }
        let user = User::create(
            &txn,
            login,
            &registration.password,
            Role::Trainer,
            false,
            Some(trainer.id),
        )
        .await?;
        txn.commit().await?;

        info!(
            user_id = user.id,
            trainer_id = trainer.id,
            participants = participants.len(),
            "trainer registered, waiting for approval"
        );

        let settings = state.settings();
        match settings.get(EMAIL_RECIPIENT) {
            Some(recipient) => {
                let name = trainer.full_name();
                let link = format!("{}/admin", state.config().frontend_url.trim_end_matches('/'));
                let message = compose(
                    &settings,
                    recipient,
                    REGISTRATION_EMAIL_SUBJECT,
                    REGISTRATION_EMAIL_BODY,
                    &[("name", name.as_str()), ("login", login), ("link", link.as_str())],
                    None,
                );
                queue_notification(mail, message, "registration").await;
            }
            None => warn!("email_recipient not configured, registration notice not sent"),
        }

        Ok(user)
    }

    /// Accounts waiting for an admin's approval, oldest first.
    pub async fn pending_accounts<C: ConnectionTrait>(db: &C) -> ServiceResult<Vec<User>> {
        Ok(User::pending(db).await?)
    }

    /// Approves an account and sends the activation notice to its login.
    pub async fn approve_user(state: &AppState, mail: &MailQueue, user_id: i64) -> ServiceResult<User> {
        let user = User::find(state.db(), user_id)
            .await?
            .ok_or(ServiceError::NotFound("user"))?;
        let role = user.role;
        let user = user.set_role_and_approval(state.db(), role, true).await?;
        info!(user_id, "user approved");

        let settings = state.settings();
        let message = compose(
            &settings,
            &user.login,
            ACTIVATION_EMAIL_SUBJECT,
            ACTIVATION_EMAIL_BODY,
            &[("login", user.login.as_str())],
            None,
        );
        queue_notification(mail, message, "activation").await;
        Ok(user)
    }

    /// Checks a login attempt. Admin accounts are never held for approval.
    pub async fn authenticate<C: ConnectionTrait>(
        db: &C,
        login: &str,
        password: &str,
    ) -> ServiceResult<LoginOutcome> {
        let Some(user) = User::find_by_login(db, login).await? else {
            debug!("login attempt for unknown account");
            return Ok(LoginOutcome::InvalidCredentials);
        };
        if !user.verify_password(password) {
            debug!(user_id = user.id, "login attempt with wrong password");
            return Ok(LoginOutcome::InvalidCredentials);
        }
        if user.role == Role::Trainer && !user.approved {
            return Ok(LoginOutcome::PendingApproval);
        }
        Ok(LoginOutcome::Authenticated(user))
    }

    /// Creates the admin account, or promotes and approves an existing one.
    /// The password of an existing account is left alone.
    pub async fn ensure_admin<C: ConnectionTrait>(
        db: &C,
        login: &str,
        password: &str,
    ) -> ServiceResult<User> {
        let login = login.trim();
        if login.is_empty() {
            return Err(ServiceError::validation("admin login is empty"));
        }
        match User::find_by_login(db, login).await? {
            Some(existing) => {
                let user = existing.set_role_and_approval(db, Role::Admin, true).await?;
                info!(login, "existing account promoted to admin");
                Ok(user)
            }
            None => {
                if password.is_empty() {
                    return Err(ServiceError::validation("admin password is empty"));
                }
                let user = User::create(db, login, password, Role::Admin, true, None).await?;
                info!(login, "admin account created");
                Ok(user)
            }
        }
    }
}

async fn queue_notification(mail: &MailQueue, message: Result<OutgoingMail, EmailError>, kind: &str) {
    let result = match message {
        Ok(message) => mail.enqueue(message).await,
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        error!(error = %e, kind, "notification e-mail not queued");
    }
}
