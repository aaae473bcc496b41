//! Fan-out container-name enrichment for task views.
//!
//! Each task's lookup runs as its own spawned worker. Workers send into
//! one of two collector channels (names, errors); a single aggregator
//! task drains both into an [`Enrichment`]. The aggregator finishes once
//! every worker has dropped its senders, so awaiting it is the barrier.
//!
//! Lookups are not cancellable: a slow resolver delays the whole result.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use appgrid_scheduler::{BoxFuture, Task};

use crate::error::{HealthError, HealthResult};

/// Looks up the container name backing a task on its host.
pub trait ContainerNameResolver: Send + Sync {
    fn resolve<'a>(
        &'a self,
        host: &'a str,
        task_id: &'a str,
        slave_id: &'a str,
    ) -> BoxFuture<'a, anyhow::Result<String>>;
}

/// Derives names the way a Mesos containerizer assigns them, without a
/// network call. Used by the daemon's simulated mode.
#[derive(Debug, Clone, Copy, Default)]
pub struct SlaveTaskResolver;

impl ContainerNameResolver for SlaveTaskResolver {
    fn resolve<'a>(
        &'a self,
        _host: &'a str,
        task_id: &'a str,
        slave_id: &'a str,
    ) -> BoxFuture<'a, anyhow::Result<String>> {
        Box::pin(async move {
            let Some((_, suffix)) = task_id.rsplit_once('.') else {
                anyhow::bail!("task id {task_id:?} has no instance suffix");
            };
            Ok(format!("mesos-{slave_id}.{suffix}"))
        })
    }
}

/// Merged lookup results, keyed by task id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Enrichment {
    pub names: HashMap<String, String>,
    pub errors: HashMap<String, String>,
}

/// Resolve container names for every task in parallel.
pub async fn enrich_tasks(
    resolver: Arc<dyn ContainerNameResolver>,
    tasks: &[Task],
) -> HealthResult<Enrichment> {
    if tasks.is_empty() {
        return Ok(Enrichment::default());
    }
    let (name_tx, mut name_rx) = mpsc::channel::<(String, String)>(tasks.len());
    let (err_tx, mut err_rx) = mpsc::channel::<(String, String)>(tasks.len());

    for task in tasks {
        let resolver = resolver.clone();
        let name_tx = name_tx.clone();
        let err_tx = err_tx.clone();
        let (host, task_id, slave_id) = (task.host.clone(), task.id.clone(), task.slave_id.clone());
        tokio::spawn(async move {
            match resolver.resolve(&host, &task_id, &slave_id).await {
                Ok(name) => {
                    let _ = name_tx.send((task_id, name)).await;
                }
                Err(e) => {
                    let _ = err_tx.send((task_id, e.to_string())).await;
                }
            }
        });
    }
    drop(name_tx);
    drop(err_tx);

    let aggregator = tokio::spawn(async move {
        let mut merged = Enrichment::default();
        let (mut names_open, mut errors_open) = (true, true);
        while names_open || errors_open {
            tokio::select! {
                msg = name_rx.recv(), if names_open => match msg {
                    Some((task, name)) => {
                        merged.names.insert(task, name);
                    }
                    None => names_open = false,
                },
                msg = err_rx.recv(), if errors_open => match msg {
                    Some((task, error)) => {
                        warn!(%task, %error, "container name lookup failed");
                        merged.errors.insert(task, error);
                    }
                    None => errors_open = false,
                },
            }
        }
        merged
    });

    let merged = aggregator
        .await
        .map_err(|e| HealthError::Aggregator(e.to_string()))?;
    debug!(
        resolved = merged.names.len(),
        failed = merged.errors.len(),
        "task enrichment finished"
    );
    Ok(merged)
}
