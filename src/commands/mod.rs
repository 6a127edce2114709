pub mod completions;
pub mod configure;
pub mod credentials;
pub mod doctor;
pub mod export;
pub mod login;
pub mod status;

pub use completions::CompletionsCommand;
pub use configure::ConfigureCommand;
pub use credentials::{CredentialsAction, CredentialsCommand};
pub use doctor::DoctorCommand;
pub use export::{ExportCommand, ExportFormat};
pub use login::LoginCommand;
pub use status::StatusCommand;
