pub mod accounts;
pub mod email;
pub mod error;
pub mod password_reset;
pub mod reports;
pub mod sessions;
pub mod settings;
pub mod trainers;

#[cfg(test)]
mod test_support;

pub use accounts::{AccountService, LoginOutcome, Registration};
pub use email::{MailQueue, MailTransport, SmtpMailTransport};
pub use error::{EmailError, ResetError, ServiceError, ServiceResult};
pub use password_reset::PasswordResetService;
pub use reports::ReportService;
pub use sessions::SessionService;
pub use settings::SettingsService;
pub use trainers::TrainerService;
