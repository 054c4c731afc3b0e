use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::NaiveDate;
use facelog_recognition::mock::{Method, MockTransport};
use facelog_recognition::{
    EncoderConfig, HttpTransport, HttpTransportConfig, ImageEncoder, LogFilter,
    RecognitionClient, RecognitionConfig, RecognitionError, RecognitionMetadata,
};
use facelog_types::{CapturedImage, EventType, LogEntry, LogStatus, RecognitionOutcome};
use image::{DynamicImage, GenericImageView, ImageOutputFormat, RgbImage};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::io::Cursor;
use std::sync::Arc;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut out, ImageOutputFormat::Png)
        .unwrap();
    out.into_inner()
}

fn client(mock: &MockTransport) -> RecognitionClient {
    RecognitionClient::new(Arc::new(mock.clone()), RecognitionConfig::default())
}

// ── Encoder ─────────────────────────────────────────────────────

#[test]
fn encoder_defaults() {
    let cfg = EncoderConfig::default();
    assert_eq!(cfg.jpeg_quality, 80);
    assert_eq!(cfg.max_side, 640);
}

#[test]
fn encoder_outputs_jpeg() {
    let jpeg = ImageEncoder::default().encode(&png(32, 24)).unwrap();
    assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    let decoded = image::load_from_memory(&jpeg).unwrap();
    assert_eq!(decoded.dimensions(), (32, 24));
}

#[test]
fn encoder_downscales_large_frames() {
    let encoder = ImageEncoder::new(EncoderConfig {
        jpeg_quality: 80,
        max_side: 100,
    });
    let jpeg = encoder.encode(&png(400, 200)).unwrap();
    let decoded = image::load_from_memory(&jpeg).unwrap();
    assert_eq!(decoded.dimensions(), (100, 50));
}

#[test]
fn encoder_rejects_garbage() {
    let err = ImageEncoder::default().encode(b"not an image").unwrap_err();
    assert!(matches!(err, RecognitionError::Encode(_)));
}

// ── recognize ───────────────────────────────────────────────────

#[tokio::test]
async fn recognize_matched_with_user_id_alias() {
    let mock = MockTransport::new();
    mock.push(
        Method::Post,
        "/recognize",
        Ok(json!({"matched": true, "user_id": "u-7", "name": "Alice", "distance": 0.28, "threshold": 0.4})),
    );
    let client = client(&mock);

    let report = client
        .recognize(CapturedImage::new(png(16, 16)), RecognitionMetadata::default())
        .await;
    assert_eq!(
        report.outcome,
        RecognitionOutcome::Matched {
            subject_id: "u-7".into(),
            subject_name: "Alice".into(),
            distance: 0.28,
        }
    );

    let encoded = report.encoded_image.unwrap();
    let sent = &mock.requests_to(Method::Post, "/recognize")[0];
    let body = sent.body.as_ref().unwrap();
    assert_eq!(body["image_base64"], STANDARD.encode(&encoded));
    assert_eq!(body["captured_image"], body["image_base64"]);
    assert_eq!(body["device_id"], "facelog-edge");
}

#[tokio::test]
async fn recognize_numeric_subject_id() {
    let mock = MockTransport::new();
    mock.push(
        Method::Post,
        "/recognize",
        Ok(json!({"matched": true, "subject_id": 42, "name": "Bob", "distance": 0.1})),
    );

    let report = client(&mock)
        .recognize(CapturedImage::new(png(8, 8)), RecognitionMetadata::default())
        .await;
    assert!(matches!(
        report.outcome,
        RecognitionOutcome::Matched { ref subject_id, .. } if subject_id == "42"
    ));
}

#[tokio::test]
async fn recognize_not_matched() {
    let mock = MockTransport::new();
    mock.push(
        Method::Post,
        "/recognize",
        Ok(json!({"matched": false, "distance": 0.7, "threshold": 0.4})),
    );

    let report = client(&mock)
        .recognize(CapturedImage::new(png(8, 8)), RecognitionMetadata::default())
        .await;
    assert_eq!(report.outcome, RecognitionOutcome::NotMatched);
    assert!(report.encoded_image.is_some());
}

#[tokio::test]
async fn recognize_transport_failure_is_request_failed() {
    let mock = MockTransport::new();
    mock.set_offline(true);

    let report = client(&mock)
        .recognize(CapturedImage::new(png(8, 8)), RecognitionMetadata::default())
        .await;
    assert!(matches!(report.outcome, RecognitionOutcome::RequestFailed { .. }));
    // Exactly one attempt.
    assert_eq!(mock.requests().len(), 1);
}

#[tokio::test]
async fn recognize_server_error_is_request_failed() {
    let mock = MockTransport::new();
    mock.push(
        Method::Post,
        "/recognize",
        Err(RecognitionError::Server {
            status: 500,
            body: "boom".into(),
        }),
    );

    let report = client(&mock)
        .recognize(CapturedImage::new(png(8, 8)), RecognitionMetadata::default())
        .await;
    match report.outcome {
        RecognitionOutcome::RequestFailed { reason } => assert!(reason.contains("500")),
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test]
async fn recognize_malformed_reply_is_request_failed() {
    let mock = MockTransport::new();
    mock.push(Method::Post, "/recognize", Ok(json!({"unexpected": true})));

    let report = client(&mock)
        .recognize(CapturedImage::new(png(8, 8)), RecognitionMetadata::default())
        .await;
    assert!(matches!(report.outcome, RecognitionOutcome::RequestFailed { .. }));
}

#[tokio::test]
async fn recognize_match_without_id_is_request_failed() {
    let mock = MockTransport::new();
    mock.push(Method::Post, "/recognize", Ok(json!({"matched": true, "name": "Ghost"})));

    let report = client(&mock)
        .recognize(CapturedImage::new(png(8, 8)), RecognitionMetadata::default())
        .await;
    assert!(matches!(report.outcome, RecognitionOutcome::RequestFailed { .. }));
}

#[tokio::test]
async fn recognize_undecodable_frame_sends_nothing() {
    let mock = MockTransport::new();

    let report = client(&mock)
        .recognize(
            CapturedImage::new(vec![1, 2, 3]),
            RecognitionMetadata::default(),
        )
        .await;
    assert!(matches!(report.outcome, RecognitionOutcome::RequestFailed { .. }));
    assert!(report.encoded_image.is_none());
    assert!(mock.requests().is_empty());
}

#[tokio::test]
async fn recognize_metadata_overrides() {
    let mock = MockTransport::new();
    mock.push(Method::Post, "/recognize", Ok(json!({"matched": false})));

    client(&mock)
        .recognize(
            CapturedImage::new(png(8, 8)),
            RecognitionMetadata {
                device_id: Some("gate-2".into()),
                attach_history_image: Some(false),
            },
        )
        .await;

    let body = mock.requests()[0].body.clone().unwrap();
    assert_eq!(body["device_id"], "gate-2");
    assert!(body.get("captured_image").is_none());
}

#[tokio::test]
async fn recognize_publishes_event() {
    let mock = MockTransport::new();
    mock.push(Method::Post, "/recognize", Ok(json!({"matched": false})));
    let client = client(&mock);
    let mut events = client.subscribe();

    let image = CapturedImage::new(png(8, 8));
    let capture_id = image.capture_id();
    client.recognize(image, RecognitionMetadata::default()).await;

    let event = events.recv().await.unwrap();
    assert_eq!(event.capture_id, capture_id);
    assert_eq!(event.outcome, RecognitionOutcome::NotMatched);
}

// ── enroll & projections ────────────────────────────────────────

#[tokio::test]
async fn enroll_returns_subject_id() {
    let mock = MockTransport::new();
    mock.push(
        Method::Post,
        "/register",
        Ok(json!({"user_id": "new-1", "name": "Carol", "model": "ArcFace", "embedding_length": 512})),
    );

    let id = client(&mock)
        .enroll(CapturedImage::new(png(8, 8)), "Carol", "Engineer")
        .await
        .unwrap();
    assert_eq!(id, "new-1");

    let body = mock.requests()[0].body.clone().unwrap();
    assert_eq!(body["name"], "Carol");
    assert_eq!(body["role"], "Engineer");
    assert_eq!(body["position"], "Engineer");
}

#[tokio::test]
async fn enroll_propagates_server_error() {
    let mock = MockTransport::new();
    mock.push(
        Method::Post,
        "/register",
        Err(RecognitionError::Server {
            status: 400,
            body: "no face detected".into(),
        }),
    );

    let err = client(&mock)
        .enroll(CapturedImage::new(png(8, 8)), "Dan", "")
        .await
        .unwrap_err();
    assert!(matches!(err, RecognitionError::Server { status: 400, .. }));
}

#[tokio::test]
async fn fetch_users_maps_position_to_role() {
    let mock = MockTransport::new();
    mock.push(
        Method::Get,
        "/users",
        Ok(json!({
            "total_users": 2,
            "users": [
                {"id": "a", "name": "Alice", "position": "Lead", "active": true,
                 "created_at": "2025-01-01T00:00:00Z", "embedding": [0.1, 0.2]},
                {"id": 7, "name": "Bob", "active": false}
            ]
        })),
    );

    let users = client(&mock).fetch_users().await.unwrap();
    assert_eq!(users.len(), 2);
    assert_eq!(users[0].role.as_deref(), Some("Lead"));
    assert!(users[0].active);
    assert_eq!(users[1].id, "7");
    assert!(!users[1].active);
    assert!(users[1].role.is_none());
}

#[tokio::test]
async fn fetch_user_image_decodes_and_handles_404() {
    let mock = MockTransport::new();
    mock.push(
        Method::Get,
        "/users/a/image",
        Ok(json!({"image_base64": STANDARD.encode([9u8, 8, 7])})),
    );
    mock.push(
        Method::Get,
        "/users/b/image",
        Err(RecognitionError::Server {
            status: 404,
            body: "not found".into(),
        }),
    );
    let client = client(&mock);

    assert_eq!(client.fetch_user_image("a").await.unwrap(), Some(vec![9, 8, 7]));
    assert_eq!(client.fetch_user_image("b").await.unwrap(), None);
}

#[tokio::test]
async fn fetch_log_passes_limit() {
    let mock = MockTransport::new();
    mock.push(
        Method::Get,
        "/attendance",
        Ok(json!({"items": [
            {"ts": 1700000000, "user_id": "a", "name": "Alice", "matched": true, "distance": 0.2}
        ], "count": 1})),
    );

    let items = client(&mock)
        .fetch_log(&LogFilter { limit: Some(25) })
        .await
        .unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].subject_id.as_deref(), Some("a"));
    assert_eq!(items[0].ts, 1_700_000_000.0);
    assert_eq!(
        mock.requests()[0].query,
        vec![("limit".to_string(), "25".to_string())]
    );
}

#[tokio::test]
async fn work_hours_and_summary() {
    let mock = MockTransport::new();
    mock.push(
        Method::Get,
        "/attendance/work-hours",
        Ok(json!({"users": [{
            "user_id": "a", "name": "Alice", "first_check_in": 1700000000,
            "last_check_out": 1700028800, "work_hours": 8.0, "check_ins": 3, "cross_day": false
        }]})),
    );
    mock.push(
        Method::Get,
        "/attendance/work-hours/summary",
        Ok(json!({"summary": [{
            "user_id": "a", "name": "Alice", "date": "2024-03-01", "first_check_in": 1.0,
            "last_check_out": 3601.0, "work_hours": 1.0, "check_ins": 2, "cross_day": true
        }]})),
    );
    let client = client(&mock);
    let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();

    let hours = client.work_hours(Some(day)).await.unwrap();
    assert_eq!(hours[0].subject_id, "a");
    assert_eq!(hours[0].work_hours, 8.0);
    assert_eq!(hours[0].check_ins, 3);

    let summary = client.work_hours_summary(Some(day), Some(day)).await.unwrap();
    assert_eq!(summary[0].date, day);
    assert!(summary[0].hours.cross_day);

    let requests = mock.requests();
    assert_eq!(
        requests[0].query,
        vec![("date".to_string(), "2024-03-01".to_string())]
    );
    assert_eq!(
        requests[1].query,
        vec![
            ("start_date".to_string(), "2024-03-01".to_string()),
            ("end_date".to_string(), "2024-03-01".to_string()),
        ]
    );
}

#[tokio::test]
async fn health_reports_status() {
    let mock = MockTransport::new();
    mock.push(Method::Get, "/health", Ok(json!({"status": "ok"})));
    assert_eq!(client(&mock).health().await.unwrap(), "ok");
}

// ── submit_attendance ───────────────────────────────────────────

#[tokio::test]
async fn submit_attendance_sends_idempotency_key() {
    let mock = MockTransport::new();
    mock.ack_attendance();
    let entry = LogEntry::new(EventType::CheckIn, "Alice", LogStatus::Success);

    let ack = client(&mock).submit_attendance(&entry).await.unwrap();
    assert_eq!(ack.id, entry.id.to_string());
    assert!(!ack.duplicate);

    let sent = &mock.requests()[0];
    assert_eq!(sent.header("idempotency-key"), Some(entry.id.to_string().as_str()));
    let body = sent.body.as_ref().unwrap();
    assert_eq!(body["event_type"], "check-in");
    assert_eq!(body["status"], "success");
    assert_eq!(body["matched"], true);
    assert_eq!(body["ts"], entry.created_at.timestamp());
}

#[tokio::test]
async fn submit_attendance_duplicate_ack_is_ok() {
    let mock = MockTransport::new();
    let entry = LogEntry::new(EventType::CheckOut, "Bob", LogStatus::Failed);
    mock.push(
        Method::Post,
        "/attendance",
        Ok(json!({"id": entry.id.to_string(), "duplicate": true})),
    );

    let ack = client(&mock).submit_attendance(&entry).await.unwrap();
    assert!(ack.duplicate);
}

#[tokio::test]
async fn submit_attendance_rejects_foreign_ack() {
    let mock = MockTransport::new();
    mock.push(Method::Post, "/attendance", Ok(json!({"id": "someone-else"})));
    let entry = LogEntry::new(EventType::CheckIn, "Alice", LogStatus::Success);

    let err = client(&mock).submit_attendance(&entry).await.unwrap_err();
    assert!(matches!(err, RecognitionError::AckMismatch { .. }));
}

#[tokio::test]
async fn submit_attendance_omits_image_unless_enabled() {
    let mock = MockTransport::new();
    mock.ack_attendance();
    let mut entry = LogEntry::new(EventType::CheckIn, "Alice", LogStatus::Success);
    entry.captured_image = Some(vec![1, 2, 3]);

    client(&mock).submit_attendance(&entry).await.unwrap();
    let with_images = RecognitionClient::new(
        Arc::new(mock.clone()),
        RecognitionConfig {
            submit_images: true,
            ..Default::default()
        },
    );
    with_images.submit_attendance(&entry).await.unwrap();

    let requests = mock.requests();
    assert!(requests[0].body.as_ref().unwrap().get("captured_image").is_none());
    assert_eq!(
        requests[1].body.as_ref().unwrap()["captured_image"],
        STANDARD.encode([1u8, 2, 3])
    );
}

// ── End to end over HTTP ────────────────────────────────────────

#[tokio::test]
async fn recognize_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/recognize"))
        .and(header("content-type", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            json!({"matched": true, "user_id": "u1", "name": "Alice", "distance": 0.2, "threshold": 0.4}),
        ))
        .expect(1)
        .mount(&server)
        .await;

    let transport = HttpTransport::new(HttpTransportConfig {
        base_url: server.uri(),
        ..Default::default()
    })
    .unwrap();
    let client = RecognitionClient::new(Arc::new(transport), RecognitionConfig::default());

    let report = client
        .recognize(CapturedImage::new(png(20, 20)), RecognitionMetadata::default())
        .await;
    assert!(report.outcome.is_matched());
}

#[tokio::test]
async fn recognize_over_http_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/recognize"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let transport = HttpTransport::new(HttpTransportConfig {
        base_url: server.uri(),
        ..Default::default()
    })
    .unwrap();
    let client = RecognitionClient::new(Arc::new(transport), RecognitionConfig::default());

    let report = client
        .recognize(CapturedImage::new(png(20, 20)), RecognitionMetadata::default())
        .await;
    assert!(matches!(report.outcome, RecognitionOutcome::RequestFailed { .. }));
}
