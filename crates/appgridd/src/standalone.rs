//! Standalone mode: every subsystem in one process around a local store.
//!
//! In this mode, the daemon:
//! 1. Opens the state store
//! 2. Starts the simulated scheduler and redeploys every appset the store
//!    says was started
//! 3. Runs the stale-state sweeper
//! 4. Optionally reads alerts from stdin and repairs them

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use appgrid_autoscale::{Alert, LogNotifier, PolicyManager, RepairOrchestrator};
use appgrid_core::AppgridConfig;
use appgrid_health::Sweeper;
use appgrid_scheduler::{InMemoryScheduler, SchedulerClient};
use appgrid_state::{AppsetStatus, StateStore};

/// Open the configured store, creating its directory if needed.
pub fn open_store(config: &AppgridConfig) -> anyhow::Result<StateStore> {
    let path = config.store_path();
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let state = StateStore::open(&path)?;
    info!(path = ?path, "state store opened");
    Ok(state)
}

/// Deploy every started appset into a fresh simulated scheduler.
///
/// The simulated scheduler keeps nothing across restarts, so the stored
/// trees are the only record of what was running.
pub async fn rehydrate(state: &StateStore, scheduler: &InMemoryScheduler) -> anyhow::Result<usize> {
    let policies = PolicyManager::new(state.clone());
    let mut deployed = 0;
    for appset in state.list_appsets()? {
        if let Err(e) = policies.refresh_appset(&appset) {
            warn!(appset = %appset.name, error = %e, "repair policy refresh failed");
        }
        if appset.status == AppsetStatus::Idle || appset.group.app_count() == 0 {
            continue;
        }
        if scheduler.has_group(&appset.group.id).await? {
            continue;
        }
        scheduler.create_group(&appset.group).await?;
        debug!(appset = %appset.name, status = %appset.status, "appset redeployed");
        deployed += 1;
    }
    scheduler.complete_deployments().await;
    Ok(deployed)
}

pub async fn run(config: AppgridConfig, alerts_from_stdin: bool) -> anyhow::Result<()> {
    info!("appgrid daemon starting in standalone mode");

    let state = open_store(&config)?;

    let scheduler = InMemoryScheduler::new();
    let deployed = rehydrate(&state, &scheduler).await?;
    info!(deployed, "simulated scheduler initialized");
    let scheduler: Arc<dyn SchedulerClient> = Arc::new(scheduler);

    let sweeper = Sweeper::new(state.clone(), config.stale_after());
    info!(
        interval_secs = config.sweep_interval().as_secs(),
        "sweeper initialized"
    );

    let orchestrator = Arc::new(RepairOrchestrator::new(
        state.clone(),
        scheduler,
        Arc::new(LogNotifier),
        config.deployment_timeout(),
    ));
    info!("repair orchestrator initialized");

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweep_shutdown = shutdown_rx.clone();
    let alert_shutdown = shutdown_rx;

    // ── Background tasks ───────────────────────────────────────

    let sweep_interval = config.sweep_interval();
    let sweep_handle = tokio::spawn(async move {
        sweeper.run(sweep_interval, sweep_shutdown).await;
    });

    let alert_handle = alerts_from_stdin.then(|| {
        tokio::spawn(async move {
            read_alerts(orchestrator, alert_shutdown).await;
        })
    });

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    let _ = sweep_handle.await;
    if let Some(handle) = alert_handle {
        let _ = handle.await;
    }

    info!("appgrid daemon stopped");
    Ok(())
}

/// Handle newline-delimited JSON alerts until stdin closes or shutdown.
async fn read_alerts(orchestrator: Arc<RepairOrchestrator>, mut shutdown: watch::Receiver<bool>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    info!("reading alerts from stdin");

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => handle_line(&orchestrator, &line).await,
                Ok(None) => {
                    info!("alert input closed");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "failed to read alert input");
                    break;
                }
            },
            _ = shutdown.changed() => break,
        }
    }
}

async fn handle_line(orchestrator: &RepairOrchestrator, line: &str) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }
    let alert: Alert = match serde_json::from_str(line) {
        Ok(alert) => alert,
        Err(e) => {
            warn!(error = %e, "ignoring malformed alert");
            return;
        }
    };
    match orchestrator.handle_alert(&alert).await {
        Ok(Some(outcome)) => info!(
            alert = %alert.id,
            repair = %outcome.repair_id,
            status = %outcome.status,
            from = outcome.from,
            to = outcome.to,
            "alert handled"
        ),
        Ok(None) => debug!(alert = %alert.id, "alert needed no repair"),
        Err(e) => warn!(alert = %alert.id, error = %e, "alert not handled"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use appgrid_core::{Application, Group};
    use appgrid_state::Appset;
    use appgrid_state::tables::REPAIR_POLICIES;

    fn appset(name: &str, status: AppsetStatus) -> Appset {
        let mut group = Group::new(format!("/{name}"));
        group.apps.push(Application::new(format!("/{name}/web"), 2));
        let mut appset = Appset::new(name, group);
        appset.status = status;
        appset
    }

    #[tokio::test]
    async fn rehydrate_survives_unreadable_policies() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("appgrid.redb");
        {
            let state = StateStore::open(&path).unwrap();
            state.insert(&appset("shop", AppsetStatus::Running)).unwrap();
            state.insert(&appset("blog", AppsetStatus::Idle)).unwrap();
        }
        {
            let db = redb::Database::create(&path).unwrap();
            let txn = db.begin_write().unwrap();
            {
                let mut table = txn.open_table(REPAIR_POLICIES).unwrap();
                table
                    .insert("HighCpuAlert:/shop/web", b"{not json".as_slice())
                    .unwrap();
            }
            txn.commit().unwrap();
        }

        let state = StateStore::open(&path).unwrap();
        let scheduler = InMemoryScheduler::new();
        assert_eq!(rehydrate(&state, &scheduler).await.unwrap(), 1);
        assert!(scheduler.has_group("/shop").await.unwrap());
        assert!(!scheduler.has_group("/blog").await.unwrap());
    }
}
