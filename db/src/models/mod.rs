pub mod participant;
pub mod password_reset_token;
pub mod session_participant;
pub mod setting;
pub mod trainer;
pub mod training_session;
pub mod user;

pub use participant::Entity as Participant;
pub use password_reset_token::Entity as PasswordResetToken;
pub use session_participant::Entity as SessionParticipant;
pub use setting::Entity as Setting;
pub use trainer::Entity as Trainer;
pub use training_session::Entity as TrainingSession;
pub use user::Entity as User;
