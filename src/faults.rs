// Fault Logging - unexpected errors that are recovered from locally
//
// Per-record faults, commit failures and cache refresh failures never reach
// the uploader as-is; they are logged here and replaced by a generic message.

use tracing::error;

pub trait FaultLogger: Send + Sync {
    /// Record an error. Must not fail and must not block the caller.
    fn log_exception(&self, error: &anyhow::Error, context: Option<&str>);
}

/// Emits one `tracing` error event carrying the full cause chain
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingFaultLogger;

impl FaultLogger for TracingFaultLogger {
    fn log_exception(&self, err: &anyhow::Error, context: Option<&str>) {
        let causes = format!("{:#}", err);
        match context {
            Some(context) => error!(%context, causes = %causes, "{}", err),
            None => error!(causes = %causes, "{}", err),
        }
    }
}
