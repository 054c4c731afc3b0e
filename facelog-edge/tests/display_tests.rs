use facelog_edge::display;
use facelog_pipeline::{CycleOutcome, DrainReport, PipelineEvent};
use facelog_types::{EventType, LogEntry, LogStatus, NetworkInfo, RecognitionOutcome};

#[test]
fn outcome_messages() {
    assert_eq!(
        display::outcome_message(&CycleOutcome::Recognized { name: "Ada".into() }),
        "Welcome, Ada"
    );
    assert!(display::outcome_message(&CycleOutcome::NotRecognized).starts_with("Not recognized"));
    assert!(
        display::outcome_message(&CycleOutcome::CameraFault {
            reason: "unplugged".into()
        })
        .contains("unplugged")
    );
}

#[test]
fn entry_line_shows_subject_and_sync_state() {
    let outcome = RecognitionOutcome::Matched {
        subject_id: "7".into(),
        subject_name: "Ada".into(),
        distance: 0.2,
    };
    let mut entry = LogEntry::from_outcome(EventType::CheckIn, &outcome, None);
    let line = display::entry_line(&entry);
    assert!(line.contains("check-in"));
    assert!(line.contains("Ada (7)"));
    assert!(line.contains("(unsynced)"));

    entry.synced = true;
    assert!(!display::entry_line(&entry).contains("unsynced"));
}

#[test]
fn failed_entry_shows_reason() {
    let entry = LogEntry::capture_failed(EventType::CheckOut, "capture timed out");
    let line = display::entry_line(&entry);
    assert!(line.contains(LogStatus::Failed.as_str()));
    assert!(line.contains("[capture timed out]"));
}

#[test]
fn network_line_marks_current() {
    let line = display::network_line(&NetworkInfo::new("Office", 82, true, true));
    assert!(line.starts_with('*'));
    assert!(line.contains("82%"));
    assert!(line.contains("secured"));

    let line = display::network_line(&NetworkInfo::new("Guest", 40, false, false));
    assert!(line.starts_with(' '));
    assert!(line.contains("open"));
}

#[test]
fn report_line_mentions_failure() {
    let report = DrainReport {
        attempted: 3,
        synced: 2,
        remaining: 1,
        failure: Some("server returned 503: busy".into()),
        ..Default::default()
    };
    let line = display::report_line(&report);
    assert!(line.starts_with("2 synced, 1 waiting"));
    assert!(line.contains("stopped: server returned 503"));
}

#[test]
fn fault_events_are_prominent() {
    let line = display::event_line(&PipelineEvent::OperationalFault {
        reason: "disk full".into(),
    });
    assert_eq!(line, "ERROR: disk full");
}
