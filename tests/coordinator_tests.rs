//! Cluster-wide coordination tests: convergent state changes, shutdown
//! recovery and stall detection against real workers.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use pretty_assertions::assert_eq;

use hivework::config::{CoordinatorConfig, WorkerConfig};
use hivework::constants::WORKERS_KEY;
use hivework::store::document::read_modify_write;
use hivework::store::InMemoryBackend;
use hivework::worker::{WorkerInfo, WorkersDocument};
use hivework::{HiveError, Worker, WorkerCoordinator, WorkerRegistry, WorkerState};

const WAIT: Option<Duration> = Some(Duration::from_secs(2));

fn setup() -> (WorkerRegistry, WorkerCoordinator) {
    let registry = WorkerRegistry::new(Arc::new(InMemoryBackend::new()));
    let coordinator = WorkerCoordinator::with_config(
        registry.clone(),
        CoordinatorConfig::default().with_poll_interval(Duration::from_millis(5)),
    );
    (registry, coordinator)
}

fn worker_config() -> WorkerConfig {
    WorkerConfig::default().with_heartbeat_interval(Duration::from_millis(10))
}

async fn start_workers(registry: &WorkerRegistry, n: usize) -> Vec<Worker> {
    let mut workers = Vec::with_capacity(n);
    for _ in 0..n {
        workers.push(
            Worker::start(registry.clone(), &worker_config(), None)
                .await
                .unwrap(),
        );
    }
    workers
}

/// Rewrites an entry's heartbeat time, inserting a bare entry if the worker
/// is not registered.
async fn backdate(registry: &WorkerRegistry, id: &str, state: WorkerState, age_secs: i64) {
    read_modify_write::<WorkersDocument, _>(registry.backend().as_ref(), WORKERS_KEY, 64, |doc| {
        let mut doc = doc.unwrap_or_default();
        let entry = doc
            .workers
            .entry(id.to_string())
            .or_insert_with(|| WorkerInfo::new(id, "ghost", state));
        entry.put_at = Utc::now() - chrono::Duration::seconds(age_secs);
        Ok(doc)
    })
    .await
    .unwrap();
}

// ─── change_state ───────────────────────────────────────────────────────────

#[tokio::test]
async fn pause_all_and_unpause_all_over_three_workers() {
    let (registry, coordinator) = setup();
    let workers = start_workers(&registry, 3).await;
    workers[2].pause().await.unwrap();

    let states = coordinator.all_worker_states().await.unwrap();
    let mut values: Vec<_> = states.values().copied().collect();
    values.sort_by_key(|s| s.as_str());
    assert_eq!(
        values,
        vec![WorkerState::Paused, WorkerState::Running, WorkerState::Running]
    );

    coordinator.pause_all(WAIT).await.unwrap();
    let states = coordinator.all_worker_states().await.unwrap();
    assert_eq!(states.len(), 3);
    assert!(states.values().all(|s| *s == WorkerState::Paused));
    assert!(workers.iter().all(|w| w.state() == WorkerState::Paused));

    coordinator.unpause_all(WAIT).await.unwrap();
    let states = coordinator.all_worker_states().await.unwrap();
    assert!(states.values().all(|s| *s == WorkerState::Running));

    for worker in &workers {
        worker.shutdown().await.unwrap();
    }
}

#[tokio::test]
async fn change_state_leaves_stopped_and_stalled_workers_alone() {
    let (registry, coordinator) = setup();
    let old = start_workers(&registry, 2).await;
    coordinator.shutdown_all(WAIT).await.unwrap();
    assert!(old.iter().all(|w| w.state() == WorkerState::Stopped));

    backdate(&registry, "stalled-one", WorkerState::Stalled, 60).await;
    let fresh = start_workers(&registry, 1).await;

    coordinator
        .change_state(WorkerState::Paused, WAIT)
        .await
        .unwrap();
    assert_eq!(fresh[0].state(), WorkerState::Paused);
    assert!(old.iter().all(|w| w.state() == WorkerState::Stopped));

    let info = coordinator.worker_info().await.unwrap();
    assert_eq!(info["stalled-one"].state, WorkerState::Stalled);
    assert_eq!(coordinator.all_worker_states().await.unwrap().len(), 1);
}

#[tokio::test]
async fn change_state_fails_when_a_live_worker_never_converges() {
    let (registry, coordinator) = setup();
    let workers = start_workers(&registry, 1).await;
    // A registry entry nobody heartbeats for.
    backdate(&registry, "ghost", WorkerState::Running, 0).await;

    let err = coordinator
        .change_state(WorkerState::Paused, Some(Duration::from_millis(200)))
        .await
        .unwrap_err();
    let HiveError::WorkerStateNotChanged { target, states } = err else {
        panic!("expected WorkerStateNotChanged");
    };
    assert_eq!(target, WorkerState::Paused);
    assert_eq!(states["ghost"], WorkerState::Running);
    assert_eq!(states[workers[0].id()], WorkerState::Paused);
    assert!(!coordinator.worker_state_enabled().await.unwrap());

    workers[0].shutdown().await.unwrap();
}

#[tokio::test]
async fn change_state_with_zero_timeout_fails_fast() {
    let (registry, coordinator) = setup();
    let workers = start_workers(&registry, 1).await;

    let result = coordinator
        .change_state(WorkerState::Paused, Some(Duration::ZERO))
        .await;
    assert!(matches!(
        result,
        Err(HiveError::WorkerStateNotChanged { .. })
    ));
    workers[0].shutdown().await.unwrap();
}

#[tokio::test]
async fn unbounded_timeouts_do_not_overflow() {
    let (registry, coordinator) = setup();
    coordinator.pause_all(Some(Duration::MAX)).await.unwrap();
    coordinator.unpause_all(Some(Duration::MAX)).await.unwrap();

    let workers = start_workers(&registry, 1).await;
    coordinator.pause_all(Some(Duration::MAX)).await.unwrap();
    assert_eq!(workers[0].state(), WorkerState::Paused);
    coordinator.shutdown_all(Some(Duration::MAX)).await.unwrap();
    assert_eq!(workers[0].state(), WorkerState::Stopped);
}

#[tokio::test]
async fn enabled_flag_survives_change_state_when_already_on() {
    let (_registry, coordinator) = setup();
    coordinator.toggle_worker_state_enabled(true).await.unwrap();
    coordinator
        .change_state(WorkerState::Paused, WAIT)
        .await
        .unwrap();
    assert!(coordinator.worker_state_enabled().await.unwrap());

    coordinator.toggle_worker_state_enabled(false).await.unwrap();
    coordinator
        .change_state(WorkerState::Running, WAIT)
        .await
        .unwrap();
    assert!(!coordinator.worker_state_enabled().await.unwrap());
}

// ─── shutdown_all ───────────────────────────────────────────────────────────

#[tokio::test]
async fn shutdown_all_stops_workers_and_resets_desired_state() {
    let (registry, coordinator) = setup();
    let workers = start_workers(&registry, 3).await;

    coordinator.shutdown_all(WAIT).await.unwrap();

    assert!(workers.iter().all(|w| w.state() == WorkerState::Stopped));
    assert!(coordinator.all_worker_states().await.unwrap().is_empty());
    let info = coordinator.worker_info().await.unwrap();
    assert_eq!(info.len(), 3);
    assert!(info.values().all(WorkerInfo::is_stopped));
    assert_eq!(
        registry.control().await.unwrap().state,
        WorkerState::Running
    );
}

#[tokio::test]
async fn shutdown_all_resets_to_running_and_propagates_stop_failure() {
    let (registry, coordinator) = setup();
    backdate(&registry, "ghost", WorkerState::Running, 0).await;

    let err = coordinator
        .shutdown_all(Some(Duration::from_millis(100)))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        HiveError::WorkerStateNotChanged {
            target: WorkerState::Stopped,
            ..
        }
    ));
    assert_eq!(
        registry.control().await.unwrap().state,
        WorkerState::Running
    );
    assert!(!coordinator.worker_state_enabled().await.unwrap());
}

// ─── refresh ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn refresh_marks_only_unresponsive_stale_workers() {
    let (registry, coordinator) = setup();
    let workers = start_workers(&registry, 2).await;
    let (slow, fresh) = (&workers[0], &workers[1]);

    backdate(&registry, slow.id(), WorkerState::Running, 30).await;
    backdate(&registry, "dead", WorkerState::Running, 30).await;
    backdate(&registry, "retired", WorkerState::Stopped, 30).await;

    let marked = coordinator
        .refresh(Some(Duration::from_millis(200)))
        .await
        .unwrap();
    assert_eq!(marked, vec!["dead".to_string()]);

    let info = coordinator.worker_info().await.unwrap();
    assert_eq!(info["dead"].state, WorkerState::Stalled);
    assert_eq!(info["retired"].state, WorkerState::Stopped);
    assert_eq!(info[slow.id()].state, WorkerState::Running);
    assert!(info[slow.id()].updated_at() > Utc::now() - chrono::Duration::seconds(1));
    assert_eq!(info[fresh.id()].state, WorkerState::Running);

    // Nothing new went stale.
    let again = coordinator
        .refresh(Some(Duration::from_millis(200)))
        .await
        .unwrap();
    assert!(again.is_empty());
    assert_eq!(coordinator.worker_info().await.unwrap()["dead"].state, WorkerState::Stalled);

    for worker in &workers {
        worker.shutdown().await.unwrap();
    }
}

#[tokio::test]
async fn refresh_with_huge_threshold_marks_nothing() {
    let (registry, coordinator) = setup();
    backdate(&registry, "old", WorkerState::Running, 3_600).await;

    let marked = coordinator
        .refresh(Some(Duration::from_secs(10_u64.pow(13))))
        .await
        .unwrap();
    assert!(marked.is_empty());
    assert!(coordinator
        .refresh(Some(Duration::MAX))
        .await
        .unwrap()
        .is_empty());
    assert_eq!(
        coordinator.worker_info().await.unwrap()["old"].state,
        WorkerState::Running
    );
}

#[tokio::test]
async fn refresh_with_no_workers_restores_flag() {
    let (_registry, coordinator) = setup();
    assert!(coordinator.refresh(None).await.unwrap().is_empty());
    assert!(!coordinator.worker_state_enabled().await.unwrap());
}

#[tokio::test]
async fn stalled_worker_recovers_by_heartbeating() {
    let (registry, coordinator) = setup();
    let workers = start_workers(&registry, 1).await;
    registry
        .record_state(workers[0].id(), WorkerState::Stalled)
        .await
        .unwrap();
    assert!(coordinator.all_worker_states().await.unwrap().is_empty());

    tokio::time::sleep(Duration::from_millis(80)).await;
    let states = coordinator.all_worker_states().await.unwrap();
    assert_eq!(states[workers[0].id()], WorkerState::Running);
    workers[0].shutdown().await.unwrap();
}
