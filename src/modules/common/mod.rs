use crate::modules::error::MailSweepResult;

pub mod auth;
pub mod error;
pub mod log;
pub mod paginated;
pub mod parallel;
pub mod signal;

/// One-time startup hook for process-wide services; called from `main` in
/// dependency order.
pub trait Initialize {
    async fn initialize() -> MailSweepResult<()>;
}
