use std::time::Duration;

use thiserror::Error;

use crate::login::Screen;

/// Outcomes of the browser login flow that callers match on
#[derive(Debug, Error)]
pub enum AutomationError {
    #[error("Login did not complete within {}s (last screen: {screen})", .waited.as_secs())]
    Timeout { screen: Screen, waited: Duration },

    #[error("Login is stuck on the {screen} screen after {attempts} attempts. Check the stored password with `credentials update`.")]
    Stuck { screen: Screen, attempts: u32 },

    #[error("No MFA code was entered within {}s", .0.as_secs())]
    MfaTimeout(Duration),

    #[error("Failed to load the login page after {attempts} attempts: {reason}")]
    Navigation { attempts: u32, reason: String },
}
