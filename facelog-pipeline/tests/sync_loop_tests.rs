mod common;

use common::{Rig, eventually};
use facelog_pipeline::{PipelineConfig, PipelineEvent};
use facelog_recognition::mock::Method;
use facelog_types::EventType;
use serde_json::json;
use std::time::Duration;

/// Long enough that only explicit triggers cause sweeps within a test.
fn quiet_config() -> PipelineConfig {
    PipelineConfig {
        sync_interval_secs: 3_600,
        max_backoff_secs: 3_600,
        connectivity_poll_secs: 3_600,
        user_refresh_secs: 0,
        ..Default::default()
    }
}

async fn record(rig: &Rig, cycles: usize) {
    for _ in 0..cycles {
        rig.orchestrator.run_cycle(EventType::CheckIn).await.unwrap();
    }
}

// ── Scheduling ──────────────────────────────────────────────────

#[tokio::test]
async fn first_sweep_drains_backlog() {
    let rig = Rig::with_config(quiet_config());
    rig.recognize_nobody();
    rig.transport.ack_attendance();
    record(&rig, 3).await;

    let handle = rig.orchestrator.spawn_sync_loop();
    let cache = rig.orchestrator.cache().clone();
    eventually(|| {
        let cache = cache.clone();
        async move { cache.unsynced_count().await.unwrap() == 0 }
    })
    .await;
    handle.shutdown().await;

    assert_eq!(rig.submitted_ids().len(), 3);
}

#[tokio::test]
async fn offline_defers_then_transition_drains() {
    let rig = Rig::with_config(PipelineConfig {
        connectivity_poll_secs: 1,
        ..quiet_config()
    });
    rig.recognize_nobody();
    rig.transport.ack_attendance();
    rig.probe.set_online(false);
    record(&rig, 5).await;

    let handle = rig.orchestrator.spawn_sync_loop();
    let probe = rig.probe.clone();
    eventually(|| {
        let probe = probe.clone();
        async move { probe.probe_count() >= 1 }
    })
    .await;
    assert!(rig.submitted_ids().is_empty());

    // The loop notices on its own, long before the next sweep interval.
    let probes_while_offline = rig.probe.probe_count();
    rig.probe.set_online(true);

    let cache = rig.orchestrator.cache().clone();
    eventually(|| {
        let cache = cache.clone();
        async move { cache.unsynced_count().await.unwrap() == 0 }
    })
    .await;
    handle.shutdown().await;
    assert!(rig.probe.probe_count() > probes_while_offline);

    let expected: Vec<_> = rig
        .orchestrator
        .cache()
        .recent_logs(10)
        .await
        .unwrap()
        .into_iter()
        .rev()
        .map(|e| e.id.to_string())
        .collect();
    assert_eq!(rig.submitted_ids(), expected);
}

#[tokio::test]
async fn request_sync_runs_a_sweep() {
    let rig = Rig::with_config(quiet_config());
    rig.recognize_nobody();
    rig.transport.ack_attendance();

    let handle = rig.orchestrator.spawn_sync_loop();
    let mut events = rig.orchestrator.subscribe();
    // Let the initial sweep finish.
    let probe = rig.probe.clone();
    eventually(|| {
        let probe = probe.clone();
        async move { probe.probe_count() >= 1 }
    })
    .await;

    record(&rig, 2).await;
    handle.request_sync();

    let cache = rig.orchestrator.cache().clone();
    eventually(|| {
        let cache = cache.clone();
        async move { cache.unsynced_count().await.unwrap() == 0 }
    })
    .await;
    handle.shutdown().await;

    let mut saw_sync = false;
    while let Ok(event) = events.try_recv() {
        if let PipelineEvent::SyncCompleted(report) = event {
            saw_sync |= report.synced == 2;
        }
    }
    assert!(saw_sync);
}

#[tokio::test]
async fn failing_service_is_retried_later() {
    let config = PipelineConfig {
        sync_interval_secs: 1,
        max_backoff_secs: 1,
        user_refresh_secs: 0,
        ..Default::default()
    };
    let rig = Rig::with_config(config);
    rig.recognize_nobody();
    record(&rig, 1).await;
    rig.transport.push(
        Method::Post,
        "/attendance",
        Err(facelog_recognition::RecognitionError::Timeout(Duration::from_secs(10))),
    );
    rig.transport.ack_attendance();

    let handle = rig.orchestrator.spawn_sync_loop();
    let cache = rig.orchestrator.cache().clone();
    eventually(|| {
        let cache = cache.clone();
        async move { cache.unsynced_count().await.unwrap() == 0 }
    })
    .await;
    handle.shutdown().await;

    let submitted = rig.submitted_ids();
    assert_eq!(submitted.len(), 2);
    assert_eq!(submitted[0], submitted[1]);
}

// ── Reconnect ───────────────────────────────────────────────────

#[tokio::test]
async fn offline_sweep_rejoins_known_network() {
    let rig = Rig::with_config(quiet_config());
    rig.probe.set_online(false);
    rig.radio.add_secured_network("Office", 80, "pw");
    rig.orchestrator
        .connectivity()
        .remember_network("Office", Some("pw"))
        .unwrap();

    let handle = rig.orchestrator.spawn_sync_loop();
    let radio = rig.radio.clone();
    eventually(|| {
        let radio = radio.clone();
        async move { radio.connect_calls() == vec!["Office".to_string()] }
    })
    .await;
    handle.shutdown().await;

    assert_eq!(
        rig.orchestrator
            .connectivity()
            .current_network()
            .await
            .unwrap()
            .as_deref(),
        Some("Office")
    );
}

#[tokio::test]
async fn auto_reconnect_can_be_disabled() {
    let config = PipelineConfig {
        auto_reconnect: false,
        ..quiet_config()
    };
    let rig = Rig::with_config(config);
    rig.probe.set_online(false);
    rig.radio.add_network("Office", 80);
    rig.orchestrator
        .connectivity()
        .remember_network("Office", None)
        .unwrap();

    let handle = rig.orchestrator.spawn_sync_loop();
    let probe = rig.probe.clone();
    eventually(|| {
        let probe = probe.clone();
        async move { probe.probe_count() >= 1 }
    })
    .await;
    handle.shutdown().await;

    assert!(rig.radio.connect_calls().is_empty());
}

// ── Users ───────────────────────────────────────────────────────

#[tokio::test]
async fn stale_user_list_is_refreshed_after_sync() {
    let config = PipelineConfig {
        user_refresh_secs: 60,
        ..quiet_config()
    };
    let rig = Rig::with_config(config);
    rig.transport.on(Method::Get, "/users", |_| {
        Ok(json!({ "users": [{ "id": "u1", "name": "Ada", "position": "Engineer" }] }))
    });

    let handle = rig.orchestrator.spawn_sync_loop();
    let cache = rig.orchestrator.cache().clone();
    eventually(|| {
        let cache = cache.clone();
        async move { cache.cached_users().await.unwrap().len() == 1 }
    })
    .await;
    handle.shutdown().await;
}

// ── Lifecycle ───────────────────────────────────────────────────

#[tokio::test]
async fn shutdown_stops_the_loop() {
    let rig = Rig::with_config(quiet_config());
    let handle = rig.orchestrator.spawn_sync_loop();
    assert!(!handle.is_finished());

    tokio::time::timeout(Duration::from_secs(5), handle.shutdown())
        .await
        .unwrap();
}
