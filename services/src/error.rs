use documents::DocumentError;
use sea_orm::DbErr;
use thiserror::Error;

/// Failures while composing or delivering an e-mail.
#[derive(Debug, Error)]
pub enum EmailError {
    #[error("mail setting `{0}` is not configured")]
    Config(&'static str),

    #[error("invalid address `{address}`: {reason}")]
    Address { address: String, reason: String },

    #[error("could not build message: {0}")]
    Build(String),

    #[error("smtp transport error: {0}")]
    Transport(String),

    #[error("mail queue is closed")]
    QueueClosed,
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Database(#[from] DbErr),

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Email(#[from] EmailError),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Validation(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServiceError {
    pub fn validation(msg: impl Into<String>) -> Self {
        ServiceError::Validation(msg.into())
    }
}

/// Outcomes of the password-reset flow that the caller shows to the user.
#[derive(Debug, Error)]
pub enum ResetError {
    /// Unknown and expired tokens are reported the same way.
    #[error("Link resetujący jest nieprawidłowy lub wygasł.")]
    InvalidOrExpired,

    #[error("Hasło nie może być puste.")]
    EmptyPassword,

    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl From<DbErr> for ResetError {
    fn from(err: DbErr) -> Self {
        ResetError::Service(ServiceError::Database(err))
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
