//! One-shot subcommands.

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use appgrid_autoscale::check_scale_number;
use appgrid_core::{AppgridConfig, Group};
use appgrid_health::Sweeper;
use appgrid_manager::{AppsetManager, CreateAppset};
use appgrid_scheduler::InMemoryScheduler;
use appgrid_state::epoch_secs;

use crate::standalone::open_store;

/// Create an appset from a JSON group tree and print the stored document.
pub async fn import(
    config: &AppgridConfig,
    name: String,
    file: &Path,
    description: String,
    start: bool,
) -> anyhow::Result<()> {
    let raw = std::fs::read(file)?;
    let group: Group = serde_json::from_slice(&raw)?;

    let state = open_store(config)?;
    let scheduler = Arc::new(InMemoryScheduler::new());
    let manager = AppsetManager::new(state, scheduler)
        .with_deployment_timeout(config.deployment_timeout());

    let mut appset = manager
        .create(CreateAppset {
            name,
            description,
            group: Some(group),
            ..CreateAppset::default()
        })
        .await?;
    if start {
        appset = manager.start(&appset.name).await?;
    }
    info!(appset = %appset.name, status = %appset.status, "appset imported");

    println!("{}", serde_json::to_string_pretty(&appset)?);
    Ok(())
}

/// One sweep pass against the configured store.
pub fn sweep(config: &AppgridConfig) -> anyhow::Result<()> {
    let state = open_store(config)?;
    let report = Sweeper::new(state, config.stale_after()).sweep_once(epoch_secs())?;
    println!(
        "appsets failed: {}, repairs failed: {}",
        report.appsets_failed, report.repairs_failed
    );
    Ok(())
}

pub fn check_scale(scale: &str, app: &str, max: &str, min: &str) -> anyhow::Result<()> {
    let check = check_scale_number(scale, app, max, min)?;
    println!(
        "{app}: scale to {} ({:?}, accepted: {})",
        check.number,
        check.verdict,
        check.accepted()
    );
    Ok(())
}
