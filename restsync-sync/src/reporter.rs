use crate::error::SyncError;
use tracing::warn;

/// Hook for surfacing failures to whatever presents them to a user.
///
/// Loads hand remote failures to the reporter instead of returning them;
/// saves report and then return the error.
pub trait ErrorReporter: Send + Sync {
    /// `operation` names what was being attempted, e.g. `"save"`.
    fn report(&self, operation: &str, error: &SyncError);
}

/// Logs every reported error with `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingErrorReporter;

impl ErrorReporter for TracingErrorReporter {
    fn report(&self, operation: &str, error: &SyncError) {
        warn!("{} failed: {}", operation, error);
    }
}
