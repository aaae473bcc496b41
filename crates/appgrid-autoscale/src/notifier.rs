//! Reporting repair results back to the alert source.

use tracing::info;

use appgrid_scheduler::BoxFuture;
use appgrid_state::RepairStatus;

/// Receives the final result code of every repair attempt.
pub trait AlertNotifier: Send + Sync {
    fn notify_result<'a>(
        &'a self,
        alert_id: &'a str,
        result: RepairStatus,
    ) -> BoxFuture<'a, anyhow::Result<()>>;
}

/// Writes results to the log only.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl AlertNotifier for LogNotifier {
    fn notify_result<'a>(
        &'a self,
        alert_id: &'a str,
        result: RepairStatus,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            info!(alert = %alert_id, %result, "repair result");
            Ok(())
        })
    }
}
