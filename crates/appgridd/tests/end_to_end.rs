//! End-to-end tests.
//!
//! Drives the assembled subsystems the way the daemon wires them: an
//! on-disk store, the simulated scheduler, the appset manager, the repair
//! orchestrator and the sweeper all sharing one state.

use std::sync::Arc;
use std::time::Duration;

use appgrid_autoscale::{Alert, HIGH_CPU_ALERT, LOW_CPU_ALERT, LogNotifier, RepairOrchestrator};
use appgrid_core::Group;
use appgrid_health::Sweeper;
use appgrid_manager::{AppsetManager, CreateAppset, ManagerError};
use appgrid_scheduler::{InMemoryScheduler, SchedulerClient};
use appgrid_state::*;

const SHOP: &str = r#"{
    "id": "shop",
    "apps": [
        {
            "id": "web",
            "instances": 2,
            "cpus": 0.5,
            "mem": 128,
            "container": {
                "type": "DOCKER",
                "docker": {
                    "image": "nginx",
                    "portMappings": [{ "containerPort": 80, "servicePort": 10001 }]
                }
            },
            "env": {
                "ALERT_ENABLE": "true",
                "INSTANCE_MAX_NUM": "3",
                "INSTANCE_MIN_NUM": "1"
            }
        },
        {
            "id": "db",
            "instances": 1,
            "dependencies": ["web"]
        }
    ],
    "groups": [
        { "id": "backend", "apps": [{ "id": "worker", "instances": 1 }] }
    ]
}"#;

const BLOG: &str = r#"{
    "id": "/blog",
    "apps": [
        {
            "id": "/blog/api",
            "instances": 1,
            "container": {
                "docker": {
                    "image": "ghost",
                    "portMappings": [{ "containerPort": 2368, "servicePort": 10001 }]
                }
            }
        }
    ]
}"#;

struct Daemon {
    _dir: tempfile::TempDir,
    state: StateStore,
    scheduler: InMemoryScheduler,
    manager: AppsetManager,
    orchestrator: RepairOrchestrator,
}

fn daemon() -> Daemon {
    let dir = tempfile::tempdir().unwrap();
    let state = StateStore::open(&dir.path().join("appgrid.redb")).unwrap();
    let scheduler = InMemoryScheduler::new();
    let client: Arc<dyn SchedulerClient> = Arc::new(scheduler.clone());
    let manager = AppsetManager::new(state.clone(), client.clone())
        .with_deployment_timeout(Duration::from_millis(100));
    let orchestrator = RepairOrchestrator::new(
        state.clone(),
        client,
        Arc::new(LogNotifier),
        Duration::from_millis(100),
    );
    Daemon {
        _dir: dir,
        state,
        scheduler,
        manager,
        orchestrator,
    }
}

async fn import(d: &Daemon, name: &str, json: &str) -> Result<Appset, ManagerError> {
    let group: Group = serde_json::from_str(json).unwrap();
    d.manager
        .create(CreateAppset {
            name: name.to_string(),
            group: Some(group),
            ..CreateAppset::default()
        })
        .await
}

#[tokio::test]
async fn shop_lifecycle_from_import_to_running() {
    let d = daemon();

    let shop = import(&d, "shop", SHOP).await.unwrap();
    assert!(shop.created_by_json);
    assert_eq!(shop.group.id, "/shop");
    let db = shop.group.find_app("/shop/db").unwrap();
    assert_eq!(db.dependencies, vec!["/shop/web".to_string()]);
    shop.group.find_app("/shop/backend/worker").unwrap();
    assert_eq!(d.manager.get("shop").await.unwrap().status, AppsetStatus::Idle);

    let started = d.manager.start("shop").await.unwrap();
    assert_eq!(started.status, AppsetStatus::Deploying);
    assert_eq!(d.manager.get("shop").await.unwrap().status, AppsetStatus::Deploying);

    d.scheduler.complete_deployments().await;
    assert_eq!(d.manager.get("shop").await.unwrap().status, AppsetStatus::Running);

    let web = d.manager.get_component("shop", "web").await.unwrap();
    assert_eq!(web.tasks_running, 2);
    assert_eq!(web.tasks.len(), 2);
    assert!(
        web.tasks
            .iter()
            .all(|t| t.container_name.as_deref().is_some_and(|n| n.starts_with("mesos-")))
    );

    let stopped = d.manager.stop("shop").await.unwrap();
    assert_eq!(stopped.status, AppsetStatus::Idle);
    assert!(!d.scheduler.has_group("/shop").await.unwrap());
}

#[tokio::test]
async fn second_appset_cannot_reuse_a_service_port() {
    let d = daemon();
    import(&d, "shop", SHOP).await.unwrap();

    let err = import(&d, "blog", BLOG).await.unwrap_err();
    match err {
        ManagerError::PortConflict { port, app, owner } => {
            assert_eq!(port, 10001);
            assert_eq!(app, "/blog/api");
            assert_eq!(owner, "/shop/web");
        }
        other => panic!("expected a port conflict, got {other:?}"),
    }
    assert!(d.state.get_appset("blog").unwrap().is_none());

    let err = import(&d, "shop", SHOP).await.unwrap_err();
    assert!(matches!(err, ManagerError::AppsetExists(_)));
}

#[tokio::test]
async fn alerts_scale_within_policy_bounds() {
    let d = daemon();
    import(&d, "shop", SHOP).await.unwrap();
    d.manager.start("shop").await.unwrap();
    d.scheduler.complete_deployments().await;

    let alert = |id: &str, name: &str| Alert {
        id: id.to_string(),
        name: name.to_string(),
        app_container_id: "/shop/web".to_string(),
    };

    let out = d
        .orchestrator
        .handle_alert(&alert("a1", HIGH_CPU_ALERT))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(out.status, RepairStatus::SuccessOut);
    assert_eq!((out.from, out.to), (2, 3));
    let record = d.state.get_repair_record(&out.repair_id).unwrap().unwrap();
    assert_eq!(record.status, RepairStatus::SuccessOut);
    assert!(!record.deployment_id.is_empty());

    // The repaired count is now the desired one.
    let shop = d.state.get_appset("shop").unwrap().unwrap();
    assert_eq!(shop.group.find_app("/shop/web").unwrap().instances, 3);

    let out = d
        .orchestrator
        .handle_alert(&alert("a2", HIGH_CPU_ALERT))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(out.status, RepairStatus::DoNothingMax);
    assert_eq!(out.to, 3);

    let out = d
        .orchestrator
        .handle_alert(&alert("a3", LOW_CPU_ALERT))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(out.status, RepairStatus::SuccessIn);
    assert_eq!(out.to, 2);
}

#[tokio::test]
async fn deleting_an_appset_drops_its_policies() {
    let d = daemon();
    import(&d, "shop", SHOP).await.unwrap();
    assert!(d.state.find_repair_policy("/shop/web").unwrap().is_some());

    d.manager.delete("shop").await.unwrap();
    assert!(d.state.find_repair_policy("/shop/web").unwrap().is_none());
    assert!(matches!(
        d.manager.get("shop").await,
        Err(ManagerError::AppsetNotFound(_))
    ));
}

#[tokio::test]
async fn sweeper_fails_appsets_stuck_deploying() {
    let d = daemon();
    import(&d, "shop", SHOP).await.unwrap();
    d.manager.start("shop").await.unwrap();

    let sweeper = Sweeper::new(d.state.clone(), Duration::from_secs(3600));
    let now = epoch_secs();
    assert_eq!(sweeper.sweep_once(now).unwrap().appsets_failed, 0);

    let report = sweeper.sweep_once(now + 7200).unwrap();
    assert_eq!(report.appsets_failed, 1);
    let stored = d.state.get_appset("shop").unwrap().unwrap();
    assert_eq!(stored.status, AppsetStatus::Failed);
}

#[tokio::test]
async fn state_survives_reopening_the_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("appgrid.redb");
    {
        let state = StateStore::open(&path).unwrap();
        let manager = AppsetManager::new(state, Arc::new(InMemoryScheduler::new()));
        let group: Group = serde_json::from_str(SHOP).unwrap();
        manager
            .create(CreateAppset {
                name: "shop".to_string(),
                description: "storefront".to_string(),
                group: Some(group),
                ..CreateAppset::default()
            })
            .await
            .unwrap();
    }

    let state = StateStore::open(&path).unwrap();
    let shop = state.get_appset("shop").unwrap().unwrap();
    assert_eq!(shop.description, "storefront");
    assert_eq!(shop.group.app_count(), 3);
}
