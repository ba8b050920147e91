//! Password reset by e-mailed link.
//!
//! A token is `absent → issued → (redeemed | expired and purged)`. Unknown
//! and expired tokens look the same to the caller, and a reset request for a
//! login that does not exist gets the same answer as one that does.

use chrono::{Duration, Utc};
use sea_orm::{ConnectionTrait, DbErr, TransactionTrait};
use tracing::{error, info, warn};

use db::models::password_reset_token::Model as ResetToken;
use db::models::user::Model as User;
use util::settings::{RESET_EMAIL_BODY, RESET_EMAIL_SUBJECT};
use util::state::AppState;

use crate::accounts::is_valid_login;
use crate::email::{compose, MailQueue};
use crate::error::{ResetError, ServiceError};

/// Shown after every well-formed reset request.
pub const RESET_REQUESTED_MESSAGE: &str =
    "Jeśli konto o podanym adresie istnieje, wysłaliśmy na nie link do zmiany hasła.";

pub struct PasswordResetService;

impl PasswordResetService {
    /// Deletes every expired token. Running it twice in a row removes nothing the second time.
    pub async fn purge_expired<C: ConnectionTrait>(db: &C) -> Result<u64, DbErr> {
        let removed = ResetToken::purge_expired(db, Utc::now()).await?;
        if removed > 0 {
            info!(removed, "purged expired password reset tokens");
        }
        Ok(removed)
    }

    /// Issues a token for `login` and queues the reset e-mail.
    ///
    /// Returns the generic confirmation whether or not the account exists.
    pub async fn request_reset(
        state: &AppState,
        mail: &MailQueue,
        login: &str,
    ) -> Result<&'static str, ServiceError> {
        Self::purge_expired(state.db()).await?;

        let login = login.trim();
        if !is_valid_login(login) {
            return Err(ServiceError::validation("Podaj poprawny adres e-mail."));
        }

        let Some(user) = User::find_by_login(state.db(), login).await? else {
            info!("password reset requested for unknown login");
            return Ok(RESET_REQUESTED_MESSAGE);
        };

        let ttl = Duration::minutes(state.config().reset_token_expiry_minutes);
        let token = ResetToken::issue(state.db(), user.id, ttl).await?;
        let link = reset_link(&state.config().frontend_url, &token.token);
        info!(user_id = user.id, expires_at = %token.expires_at, "password reset token issued");

        let settings = state.settings();
        match compose(
            &settings,
            &user.login,
            RESET_EMAIL_SUBJECT,
            RESET_EMAIL_BODY,
            &[("link", link.as_str()), ("login", user.login.as_str())],
            None,
        ) {
            Ok(message) => {
                if let Err(e) = mail.enqueue(message).await {
                    error!(error = %e, user_id = user.id, "could not queue reset e-mail");
                }
            }
            Err(e) => error!(error = %e, user_id = user.id, "could not compose reset e-mail"),
        }

        Ok(RESET_REQUESTED_MESSAGE)
    }

    /// Checks that `token` can still be redeemed.
    pub async fn verify(state: &AppState, token: &str) -> Result<ResetToken, ResetError> {
        Self::purge_expired(state.db()).await?;
        Self::lookup(state.db(), token).await
    }

    /// Sets a new password and consumes the token.
    ///
    /// An empty password is rejected and leaves the token usable.
    pub async fn redeem(state: &AppState, token: &str, new_password: &str) -> Result<(), ResetError> {
        Self::purge_expired(state.db()).await?;
        let token = Self::lookup(state.db(), token).await?;

        if new_password.trim().is_empty() {
            return Err(ResetError::EmptyPassword);
        }

        let Some(user) = User::find(state.db(), token.user_id).await? else {
            warn!(user_id = token.user_id, "reset token points at a missing user");
            token.remove(state.db()).await?;
            return Err(ResetError::InvalidOrExpired);
        };

        let txn = state.db().begin().await?;
        if !token.consume(&txn, Utc::now()).await? {
            txn.rollback().await?;
            info!(token_id = token.id, "reset token already used");
            return Err(ResetError::InvalidOrExpired);
        }
        user.set_password(&txn, new_password).await?;
        txn.commit().await?;

        info!(user_id = user.id, "password changed via reset link");
        Ok(())
    }

    /// Finds a live token; an expired one is deleted on the way out.
    async fn lookup<C: ConnectionTrait>(db: &C, token: &str) -> Result<ResetToken, ResetError> {
        let Some(found) = ResetToken::find_by_token(db, token.trim()).await? else {
            return Err(ResetError::InvalidOrExpired);
        };
        if found.is_expired_at(Utc::now()) {
            info!(token_id = found.id, "expired reset token used, removing");
            found.remove(db).await?;
            return Err(ResetError::InvalidOrExpired);
        }
        Ok(found)
    }
}

pub fn reset_link(frontend_url: &str, token: &str) -> String {
    format!("{}/reset/{}", frontend_url.trim_end_matches('/'), token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{test_state, RecordingTransport};
    use db::models::user::Role;
    use db::models::PasswordResetToken;
    use sea_orm::{EntityTrait, PaginatorTrait};
    use std::sync::Arc;

    async fn user(state: &AppState, login: &str) -> User {
        User::create(state.db(), login, "stare-haslo", Role::Trainer, true, None)
            .await
            .unwrap()
    }

    async fn token_count(state: &AppState) -> u64 {
        PasswordResetToken::find().count(state.db()).await.unwrap()
    }

    #[tokio::test]
    async fn unknown_login_gets_generic_message_and_no_token() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir).await;
        let transport = Arc::new(RecordingTransport::default());
        let queue = MailQueue::start(transport.clone(), 4);

        let msg = PasswordResetService::request_reset(&state, &queue, "nikt@example.com")
            .await
            .unwrap();
        queue.shutdown().await;

        assert_eq!(msg, RESET_REQUESTED_MESSAGE);
        assert_eq!(token_count(&state).await, 0);
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn malformed_login_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir).await;
        let queue = MailQueue::start(Arc::new(RecordingTransport::default()), 4);

        let err = PasswordResetService::request_reset(&state, &queue, "anna at example")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn known_login_gets_link_by_mail() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir).await;
        let anna = user(&state, "anna@example.com").await;
        let transport = Arc::new(RecordingTransport::default());
        let queue = MailQueue::start(transport.clone(), 4);

        let msg = PasswordResetService::request_reset(&state, &queue, " anna@example.com ")
            .await
            .unwrap();
        queue.shutdown().await;

        assert_eq!(msg, RESET_REQUESTED_MESSAGE);
        assert_eq!(ResetToken::count_for_user(state.db(), anna.id).await.unwrap(), 1);

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "anna@example.com");
        assert!(sent[0]
            .body
            .contains("https://obecnosci.example.com/reset/"));
    }

    #[tokio::test]
    async fn token_redeems_exactly_once() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir).await;
        let anna = user(&state, "anna@example.com").await;
        let token = ResetToken::issue(state.db(), anna.id, Duration::hours(1))
            .await
            .unwrap();

        PasswordResetService::verify(&state, &token.token).await.unwrap();
        PasswordResetService::redeem(&state, &token.token, "nowe-haslo")
            .await
            .unwrap();

        let again = PasswordResetService::redeem(&state, &token.token, "inne").await;
        assert!(matches!(again, Err(ResetError::InvalidOrExpired)));

        let anna = User::find(state.db(), anna.id).await.unwrap().unwrap();
        assert!(anna.verify_password("nowe-haslo"));
        assert!(!anna.verify_password("stare-haslo"));
    }

    #[tokio::test]
    async fn concurrent_redeems_change_password_once() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir).await;
        let anna = user(&state, "anna@example.com").await;
        let token = ResetToken::issue(state.db(), anna.id, Duration::hours(1))
            .await
            .unwrap();

        let (first, second) = tokio::join!(
            PasswordResetService::redeem(&state, &token.token, "pierwsze"),
            PasswordResetService::redeem(&state, &token.token, "drugie"),
        );
        assert_eq!([first.is_ok(), second.is_ok()].iter().filter(|ok| **ok).count(), 1);
        let loser = if first.is_ok() { second } else { first };
        assert!(matches!(loser, Err(ResetError::InvalidOrExpired)));

        let anna = User::find(state.db(), anna.id).await.unwrap().unwrap();
        assert_ne!(
            anna.verify_password("pierwsze"),
            anna.verify_password("drugie")
        );
        assert_eq!(token_count(&state).await, 0);
    }

    #[tokio::test]
    async fn empty_password_keeps_token() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir).await;
        let anna = user(&state, "anna@example.com").await;
        let token = ResetToken::issue(state.db(), anna.id, Duration::hours(1))
            .await
            .unwrap();

        let err = PasswordResetService::redeem(&state, &token.token, "   ").await;
        assert!(matches!(err, Err(ResetError::EmptyPassword)));
        assert!(PasswordResetService::verify(&state, &token.token).await.is_ok());
    }

    #[tokio::test]
    async fn expired_token_is_rejected_and_removed() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir).await;
        let anna = user(&state, "anna@example.com").await;
        let token = ResetToken::issue_expiring_at(state.db(), anna.id, Utc::now() - Duration::minutes(1))
            .await
            .unwrap();

        let err = PasswordResetService::verify(&state, &token.token).await;
        assert!(matches!(err, Err(ResetError::InvalidOrExpired)));
        assert!(ResetToken::find_by_token(state.db(), &token.token)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn unknown_token_matches_expired_message() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir).await;
        let err = PasswordResetService::verify(&state, "nie-ma-takiego").await.unwrap_err();
        assert_eq!(err.to_string(), ResetError::InvalidOrExpired.to_string());
    }

    #[tokio::test]
    async fn purge_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir).await;
        let anna = user(&state, "anna@example.com").await;
        let past = Utc::now() - Duration::hours(2);
        ResetToken::issue_expiring_at(state.db(), anna.id, past).await.unwrap();
        ResetToken::issue_expiring_at(state.db(), anna.id, past).await.unwrap();
        ResetToken::issue(state.db(), anna.id, Duration::hours(1)).await.unwrap();

        assert_eq!(PasswordResetService::purge_expired(state.db()).await.unwrap(), 2);
        assert_eq!(PasswordResetService::purge_expired(state.db()).await.unwrap(), 0);
        assert_eq!(token_count(&state).await, 1);
    }

    #[test]
    fn link_has_single_slash() {
        assert_eq!(reset_link("http://localhost:5000/", "abc"), "http://localhost:5000/reset/abc");
    }
}
