//! Service-port conflict detection.
//!
//! A nonzero service port is routable cluster-wide, so it may be claimed
//! by one application only. An application conflicts when another
//! application of its own appset, or any application of any other appset,
//! claims one of its ports. Apps without port mappings never conflict.

use tracing::debug;

use appgrid_core::{Application, Group};
use appgrid_state::{Appset, StateStore};

use crate::error::{ManagerError, ManagerResult};

/// A port already held by another application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortClaim {
    pub port: u16,
    pub owner: String,
}

/// First claim that collides with `app`'s service ports.
///
/// `own` is the tree `app` belongs to (other ids in it are checked);
/// `others` holds every stored appset, the one named `appset` is skipped
/// since `own` is its current version.
pub fn find_conflict(
    appset: &str,
    app: &Application,
    own: &Group,
    others: &[Appset],
) -> Option<PortClaim> {
    let ports = app.service_ports();
    if ports.is_empty() {
        return None;
    }
    let claim_in = |candidate: &Application| {
        candidate
            .service_ports()
            .into_iter()
            .find(|port| ports.contains(port))
            .map(|port| PortClaim {
                port,
                owner: candidate.id.clone(),
            })
    };

    let siblings = own.applications();
    if let Some(claim) = siblings
        .into_iter()
        .filter(|other| other.id != app.id)
        .find_map(claim_in)
    {
        return Some(claim);
    }
    others
        .iter()
        .filter(|other| other.name != appset)
        .flat_map(|other| other.group.applications())
        .find_map(claim_in)
}

/// Runs [`find_conflict`] against the stored appsets.
#[derive(Clone)]
pub struct ConflictDetector {
    state: StateStore,
}

impl ConflictDetector {
    pub fn new(state: StateStore) -> Self {
        Self { state }
    }

    /// Check one application of `own` (the appset's pending tree).
    pub fn check_app(&self, appset: &str, own: &Group, app: &Application) -> ManagerResult<()> {
        if app.service_ports().is_empty() {
            return Ok(());
        }
        let others = self.state.list_appsets()?;
        check(appset, app, own, &others)
    }

    /// Check every application of a whole tree.
    pub fn check_tree(&self, appset: &str, own: &Group) -> ManagerResult<()> {
        let others = self.state.list_appsets()?;
        own.visit_apps(&mut |app| check(appset, app, own, &others))?;
        debug!(%appset, "no service port conflicts");
        Ok(())
    }
}

fn check(appset: &str, app: &Application, own: &Group, others: &[Appset]) -> ManagerResult<()> {
    match find_conflict(appset, app, own, others) {
        Some(claim) => Err(ManagerError::PortConflict {
            port: claim.port,
            app: app.id.clone(),
            owner: claim.owner,
        }),
        None => Ok(()),
    }
}
