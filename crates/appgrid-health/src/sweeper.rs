//! Stale-state sweep: a background loop that fails stuck entities.
//!
//! An operation that crashes mid-flight leaves its appset in DEPLOYING or
//! WAITING (or its repair record in REPAIRING) forever. Every `interval`
//! the sweeper force-transitions anything whose last update is older than
//! `stale_after`. The sweep is not transactional with the operations it
//! races: a genuinely slow operation can be failed early.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info};

use appgrid_state::*;

use crate::error::HealthResult;

/// What one sweep pass changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SweepReport {
    pub appsets_failed: usize,
    pub repairs_failed: usize,
}

pub struct Sweeper {
    state: StateStore,
    stale_after: Duration,
}

impl Sweeper {
    pub fn new(state: StateStore, stale_after: Duration) -> Self {
        Self { state, stale_after }
    }

    /// Run one pass as of `now` (Unix seconds).
    pub fn sweep_once(&self, now: u64) -> HealthResult<SweepReport> {
        let cutoff = now.saturating_sub(self.stale_after.as_secs());

        let stuck_appsets = Selector::And(vec![
            Selector::Or(vec![
                Selector::eq("status", AppsetStatus::Deploying.as_str()),
                Selector::eq("status", AppsetStatus::Waiting.as_str()),
            ]),
            Selector::lt("time_update", cutoff),
        ]);
        let appsets_failed = self.state.update_where::<Appset>(&stuck_appsets, |appset| {
            info!(appset = %appset.name, from = %appset.status, "sweeping stale appset to FAILED");
            appset.status = AppsetStatus::Failed;
            appset.time_update = now;
            appset.version += 1;
        })?;

        let stuck_repairs = Selector::And(vec![
            Selector::eq("status", RepairStatus::Repairing.as_str()),
            Selector::lt("time_update", cutoff),
        ]);
        let repairs_failed = self.state.update_where::<RepairRecord>(&stuck_repairs, |record| {
            info!(repair = %record.repair_id, app = %record.app_container_id, "sweeping stale repair to FAILURE");
            record.status = RepairStatus::Failure;
            record.time_update = now;
        })?;

        let report = SweepReport {
            appsets_failed,
            repairs_failed,
        };
        debug!(?report, cutoff, "sweep pass finished");
        Ok(report)
    }

    /// Run the sweep loop until `shutdown` fires.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = interval.as_secs(),
            stale_after_secs = self.stale_after.as_secs(),
            "sweeper started"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    if let Err(e) = self.sweep_once(epoch_secs()) {
                        error!(error = %e, "sweep pass failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("sweeper shutting down");
                    break;
                }
            }
        }
    }
}
