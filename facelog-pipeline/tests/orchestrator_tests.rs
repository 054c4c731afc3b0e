mod common;

use common::{Rig, eventually};
use facelog_cache::LocalCache;
use facelog_capture::CaptureState;
use facelog_capture::mock::MockFrame;
use facelog_pipeline::{CycleOutcome, Orchestrator, PipelineConfig, PipelineError, PipelineEvent};
use facelog_recognition::RecognitionError;
use facelog_recognition::mock::Method;
use facelog_types::{EventType, LogStatus, UNKNOWN_SUBJECT};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

// ── Capture cycles ──────────────────────────────────────────────

#[tokio::test]
async fn matched_cycle_records_success() {
    let rig = Rig::new();
    rig.recognize_as("7", "Ada");

    let record = rig.orchestrator.run_cycle(EventType::CheckIn).await.unwrap();
    assert_eq!(
        record.outcome,
        CycleOutcome::Recognized {
            name: "Ada".into()
        }
    );

    let entry = rig
        .orchestrator
        .cache()
        .log_entry(record.entry_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry.status, LogStatus::Success);
    assert_eq!(entry.subject_name, "Ada");
    assert_eq!(entry.subject_id.as_deref(), Some("7"));
    assert_eq!(entry.event_type, EventType::CheckIn);
    assert!(!entry.synced);
    // The stored image is the JPEG that was sent.
    let image = entry.captured_image.unwrap();
    assert_eq!(&image[..2], &[0xFF, 0xD8]);
}

#[tokio::test]
async fn not_matched_records_failed_entry() {
    let rig = Rig::new();
    rig.recognize_nobody();

    let record = rig.orchestrator.run_cycle(EventType::CheckOut).await.unwrap();
    assert_eq!(record.outcome, CycleOutcome::NotRecognized);

    let entry = rig
        .orchestrator
        .cache()
        .log_entry(record.entry_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry.status, LogStatus::Failed);
    assert_eq!(entry.subject_name, UNKNOWN_SUBJECT);
    assert_eq!(entry.event_type, EventType::CheckOut);
}

#[tokio::test]
async fn request_failure_looks_like_not_recognized() {
    let rig = Rig::new();
    rig.transport.set_offline(true);

    let record = rig.orchestrator.run_cycle(EventType::CheckIn).await.unwrap();
    assert_eq!(record.outcome, CycleOutcome::NotRecognized);

    let entry = rig
        .orchestrator
        .cache()
        .log_entry(record.entry_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry.status, LogStatus::Failed);
    assert!(entry.failure_reason.unwrap().contains("unreachable"));
}

#[tokio::test]
async fn absent_camera_records_camera_fault() {
    let rig = Rig::new();
    rig.camera.set_present(false);
    rig.radio.add_network("Office", 70);

    let record = rig.orchestrator.run_cycle(EventType::CheckIn).await.unwrap();
    assert!(matches!(record.outcome, CycleOutcome::CameraFault { .. }));
    assert_eq!(rig.camera.grab_count(), 0);
    assert!(rig.transport.requests().is_empty());

    let entry = rig
        .orchestrator
        .cache()
        .log_entry(record.entry_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry.status, LogStatus::Failed);
    assert!(entry.captured_image.is_none());

    // The rest of the device keeps working.
    let connectivity = rig.orchestrator.connectivity();
    assert!(connectivity.is_online().await);
    assert_eq!(connectivity.list_networks().await.unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn capture_timeout_records_entry_without_image() {
    let rig = Rig::new();
    rig.camera.push_frame(MockFrame::Hang);

    let record = rig.orchestrator.run_cycle(EventType::CheckIn).await.unwrap();
    match &record.outcome {
        CycleOutcome::CameraFault { reason } => assert!(reason.contains("timed out")),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(rig.orchestrator.capture().state(), CaptureState::Ready);
    assert!(rig.transport.requests().is_empty());

    let entry = rig
        .orchestrator
        .cache()
        .log_entry(record.entry_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry.status, LogStatus::Failed);
    assert!(entry.captured_image.is_none());
}

#[tokio::test]
async fn busy_capture_is_still_recorded() {
    let rig = Rig::new();
    rig.recognize_nobody();
    rig.camera.set_grab_delay(Duration::from_millis(300));

    let first = rig.orchestrator.trigger(EventType::CheckIn);
    let mut state = rig.orchestrator.capture().subscribe();
    state.wait_for(|s| *s == CaptureState::Capturing).await.unwrap();

    let second = rig.orchestrator.run_cycle(EventType::CheckIn).await.unwrap();
    match &second.outcome {
        CycleOutcome::CameraFault { reason } => assert!(reason.contains("in progress")),
        other => panic!("unexpected outcome: {other:?}"),
    }

    Orchestrator::join_cycle(first).await.unwrap();
    assert_eq!(rig.orchestrator.cache().unsynced_count().await.unwrap(), 2);
}

#[tokio::test]
async fn every_cycle_appends_exactly_one_entry() {
    let rig = Rig::new();
    rig.recognize_nobody();
    rig.camera.push_frame(MockFrame::Error("sensor glitch".into()));

    let mut ids = Vec::new();
    for event_type in [EventType::CheckIn, EventType::CheckOut, EventType::CheckIn] {
        ids.push(rig.orchestrator.run_cycle(event_type).await.unwrap().entry_id);
    }
    rig.transport.set_offline(true);
    ids.push(rig.orchestrator.run_cycle(EventType::CheckOut).await.unwrap().entry_id);

    let logged: Vec<_> = rig
        .orchestrator
        .cache()
        .unsynced_logs()
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.id)
        .collect();
    assert_eq!(logged, ids);
}

// ── Notifications ───────────────────────────────────────────────

#[tokio::test]
async fn event_follows_durable_append() {
    let rig = Rig::new();
    rig.recognize_as("3", "Grace");
    let mut events = rig.orchestrator.subscribe();

    let handle = rig.orchestrator.trigger(EventType::CheckIn);
    let event = events.recv().await.unwrap();
    let PipelineEvent::CycleRecorded(record) = event else {
        panic!("unexpected event: {event:?}");
    };
    assert!(
        rig.orchestrator
            .cache()
            .log_entry(record.entry_id)
            .await
            .unwrap()
            .is_some()
    );
    assert_eq!(Orchestrator::join_cycle(handle).await.unwrap(), record);
}

#[tokio::test]
async fn dropped_trigger_still_records() {
    let rig = Rig::new();
    rig.recognize_nobody();
    rig.transport.set_delay(Some(Duration::from_millis(100)));

    drop(rig.orchestrator.trigger(EventType::CheckOut));

    let cache = rig.orchestrator.cache().clone();
    eventually(|| {
        let cache = cache.clone();
        async move { cache.unsynced_count().await.unwrap() == 1 }
    })
    .await;
}

#[tokio::test]
async fn storage_failure_is_operational_fault() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.db");
    let rig = Rig::with_cache(PipelineConfig::default(), LocalCache::open(&path).unwrap());
    rig.recognize_nobody();
    let mut events = rig.orchestrator.subscribe();

    let conn = rusqlite::Connection::open(&path).unwrap();
    conn.execute_batch("DROP TABLE attendance_log").unwrap();

    let err = rig.orchestrator.run_cycle(EventType::CheckIn).await.unwrap_err();
    assert!(matches!(err, PipelineError::Storage(_)));
    assert!(matches!(
        events.recv().await.unwrap(),
        PipelineEvent::OperationalFault { .. }
    ));
}

// ── Drain ───────────────────────────────────────────────────────

#[tokio::test]
async fn offline_backlog_drains_oldest_first() {
    let rig = Rig::new();
    rig.transport.set_offline(true);

    let mut ids = Vec::new();
    for _ in 0..5 {
        let record = rig.orchestrator.run_cycle(EventType::CheckIn).await.unwrap();
        ids.push(record.entry_id.to_string());
    }
    assert_eq!(rig.orchestrator.cache().unsynced_count().await.unwrap(), 5);

    rig.transport.set_offline(false);
    rig.transport.ack_attendance();
    let report = rig.orchestrator.drain().await.unwrap();

    assert_eq!(report.synced, 5);
    assert_eq!(report.remaining, 0);
    assert!(report.is_complete());
    assert_eq!(rig.submitted_ids(), ids);
}

#[tokio::test]
async fn drain_stops_at_first_failure_and_resumes() {
    let rig = Rig::new();
    rig.recognize_nobody();
    for _ in 0..5 {
        rig.orchestrator.run_cycle(EventType::CheckIn).await.unwrap();
    }

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    rig.transport.on(Method::Post, "/attendance", move |req| {
        if counter.fetch_add(1, Ordering::SeqCst) == 2 {
            return Err(RecognitionError::Server {
                status: 503,
                body: "busy".into(),
            });
        }
        Ok(json!({ "id": req.body.as_ref().unwrap()["id"] }))
    });

    let report = rig.orchestrator.drain().await.unwrap();
    assert_eq!(report.attempted, 3);
    assert_eq!(report.synced, 2);
    assert_eq!(report.remaining, 3);
    assert!(!report.is_complete());

    rig.transport.ack_attendance();
    let report = rig.orchestrator.drain().await.unwrap();
    assert_eq!(report.synced, 3);
    assert_eq!(report.remaining, 0);

    // Synced entries were never resubmitted; only the failed one was.
    let submitted = rig.submitted_ids();
    assert_eq!(submitted.len(), 6);
    assert_eq!(submitted[2], submitted[3]);
}

#[tokio::test]
async fn mismatched_ack_leaves_entry_unsynced() {
    let rig = Rig::new();
    rig.recognize_nobody();
    rig.orchestrator.run_cycle(EventType::CheckIn).await.unwrap();
    rig.transport
        .on(Method::Post, "/attendance", |_| Ok(json!({ "id": "someone-else" })));

    let report = rig.orchestrator.drain().await.unwrap();
    assert_eq!(report.synced, 0);
    assert_eq!(report.remaining, 1);
    assert!(report.failure.unwrap().contains("someone-else"));
}

#[tokio::test]
async fn duplicate_ack_counts_as_synced() {
    let rig = Rig::new();
    rig.recognize_nobody();
    rig.orchestrator.run_cycle(EventType::CheckIn).await.unwrap();
    rig.transport.on(Method::Post, "/attendance", |req| {
        Ok(json!({ "id": req.body.as_ref().unwrap()["id"], "duplicate": true }))
    });

    let report = rig.orchestrator.drain().await.unwrap();
    assert_eq!(report.synced, 1);
    assert_eq!(report.duplicates, 1);
    assert_eq!(report.remaining, 0);
    assert_eq!(rig.orchestrator.cache().recent_logs(10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn repeated_drains_submit_each_entry_once() {
    let config = PipelineConfig {
        sync_batch_size: 2,
        ..Default::default()
    };
    let rig = Rig::with_config(config);
    rig.recognize_nobody();
    rig.transport.ack_attendance();
    for _ in 0..5 {
        rig.orchestrator.run_cycle(EventType::CheckOut).await.unwrap();
    }

    for _ in 0..3 {
        rig.orchestrator.drain().await.unwrap();
    }

    let submitted = rig.submitted_ids();
    assert_eq!(submitted.len(), 5);
    let mut unique = submitted.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), 5);
}

#[tokio::test]
async fn synced_entries_are_pruned_after_retention() {
    let config = PipelineConfig {
        retention_secs: 0,
        ..Default::default()
    };
    let rig = Rig::with_config(config);
    rig.recognize_nobody();
    rig.transport.ack_attendance();
    for _ in 0..2 {
        rig.orchestrator.run_cycle(EventType::CheckIn).await.unwrap();
    }

    let first = rig.orchestrator.drain().await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    let second = rig.orchestrator.drain().await.unwrap();

    assert_eq!(first.pruned + second.pruned, 2);
    assert!(rig.orchestrator.cache().recent_logs(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn drain_publishes_report() {
    let rig = Rig::new();
    rig.transport.ack_attendance();
    let mut events = rig.orchestrator.subscribe();

    let report = rig.orchestrator.drain().await.unwrap();
    assert_eq!(
        events.recv().await.unwrap(),
        PipelineEvent::SyncCompleted(report)
    );
}

// ── Users ───────────────────────────────────────────────────────

fn serve_users(rig: &Rig) {
    rig.transport.on(Method::Get, "/users", |_| {
        Ok(json!({
            "total_users": 3,
            "users": [
                { "id": 1, "name": "Ada", "position": "Engineer", "active": true },
                { "id": 2, "name": "Grace", "position": "Admiral" },
                { "id": 3, "name": "Gone", "position": "Former", "active": false },
            ]
        }))
    });
}

#[tokio::test]
async fn refresh_users_replaces_snapshot() {
    let rig = Rig::new();
    serve_users(&rig);

    let count = rig.orchestrator.refresh_users().await.unwrap();
    assert_eq!(count, 2);

    let users = rig.orchestrator.cache().cached_users().await.unwrap();
    let names: Vec<_> = users.iter().map(|u| u.display_name.as_str()).collect();
    assert_eq!(names, vec!["Ada", "Grace"]);
    assert_eq!(users[0].role, "Engineer");
    assert!(users.iter().all(|u| u.thumbnail.is_none()));
    assert!(
        rig.orchestrator
            .cache()
            .users_refreshed_at()
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn refresh_users_fetches_thumbnails() {
    let config = PipelineConfig {
        fetch_thumbnails: true,
        ..Default::default()
    };
    let rig = Rig::with_config(config);
    serve_users(&rig);
    rig.transport.on(Method::Get, "/users/1/image", |_| {
        Ok(json!({ "image_base64": "AQID" }))
    });
    rig.transport.push(
        Method::Get,
        "/users/2/image",
        Err(RecognitionError::Server {
            status: 404,
            body: "no image".into(),
        }),
    );

    rig.orchestrator.refresh_users().await.unwrap();

    let ada = rig.orchestrator.cache().cached_user("1").await.unwrap().unwrap();
    let grace = rig.orchestrator.cache().cached_user("2").await.unwrap().unwrap();
    assert_eq!(ada.thumbnail, Some(vec![1, 2, 3]));
    assert_eq!(grace.thumbnail, None);
}

#[tokio::test]
async fn failed_refresh_keeps_previous_snapshot() {
    let rig = Rig::new();
    serve_users(&rig);
    rig.orchestrator.refresh_users().await.unwrap();

    rig.transport.set_offline(true);
    assert!(rig.orchestrator.refresh_users().await.is_err());
    assert_eq!(rig.orchestrator.cache().cached_users().await.unwrap().len(), 2);
}

#[tokio::test]
async fn enroll_registers_and_refreshes() {
    let rig = Rig::new();
    serve_users(&rig);
    rig.transport
        .on(Method::Post, "/register", |_| Ok(json!({ "user_id": 4 })));

    let id = rig.orchestrator.enroll("Linus", "Intern").await.unwrap();
    assert_eq!(id, "4");

    let register = rig.transport.requests_to(Method::Post, "/register");
    let body = register[0].body.as_ref().unwrap();
    assert_eq!(body["name"], "Linus");
    assert_eq!(body["role"], "Intern");
    assert_eq!(rig.orchestrator.cache().cached_users().await.unwrap().len(), 2);
    // Enrollment is not attendance.
    assert_eq!(rig.orchestrator.cache().unsynced_count().await.unwrap(), 0);
}

#[tokio::test]
async fn enroll_without_camera_fails() {
    let rig = Rig::new();
    rig.camera.set_present(false);

    let err = rig.orchestrator.enroll("Linus", "Intern").await.unwrap_err();
    assert!(matches!(err, PipelineError::Capture(_)));
}

// ── Status ──────────────────────────────────────────────────────

#[tokio::test]
async fn status_reports_queue_and_state() {
    let rig = Rig::new();
    rig.recognize_nobody();

    let status = rig.orchestrator.status().await.unwrap();
    assert_eq!(status.capture, CaptureState::Closed);
    assert!(!status.online);
    assert_eq!(status.unsynced, 0);
    assert!(status.users_refreshed_at.is_none());

    rig.orchestrator.run_cycle(EventType::CheckIn).await.unwrap();
    rig.orchestrator.connectivity().is_online().await;

    let status = rig.orchestrator.status().await.unwrap();
    assert_eq!(status.capture, CaptureState::Ready);
    assert!(status.online);
    assert_eq!(status.unsynced, 1);
}

#[tokio::test]
async fn camera_stays_open_between_cycles() {
    let rig = Rig::new();
    rig.recognize_nobody();
    rig.orchestrator.run_cycle(EventType::CheckIn).await.unwrap();
    rig.orchestrator.run_cycle(EventType::CheckOut).await.unwrap();

    assert_eq!(rig.camera.start_count(), 1);
    assert_eq!(rig.camera.grab_count(), 2);
}
