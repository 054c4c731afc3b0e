//! Recognition client.

use crate::encode::{EncoderConfig, ImageEncoder};
use crate::error::{RecognitionError, RecognitionResult};
use crate::transport::RecognitionTransport;
use crate::wire::{
    AttendanceAck, AttendanceLogResponse, AttendanceRecord, AttendanceSubmission, HealthResponse,
    RecognizeRequest, RecognizeResponse, RegisterRequest, RegisterResponse, RemoteUser,
    UserImageResponse, UsersResponse, WorkHours, WorkHoursDay, WorkHoursResponse,
    WorkHoursSummaryResponse,
};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, NaiveDate, Utc};
use facelog_types::{CaptureId, CapturedImage, LogEntry, RecognitionOutcome, UNKNOWN_SUBJECT};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Capacity of the result channel; slow subscribers lag and skip.
const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    /// Identifies this checkpoint to the service.
    pub device_id: String,
    /// Send the encoded frame again as `captured_image` for server-side
    /// history.
    pub attach_history_image: bool,
    /// Include the captured image in attendance submissions.
    pub submit_images: bool,
    pub encoder: EncoderConfig,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            device_id: "facelog-edge".to_string(),
            attach_history_image: true,
            submit_images: false,
            encoder: EncoderConfig::default(),
        }
    }
}

/// Per-request options for [`RecognitionClient::recognize`].
#[derive(Debug, Clone, Default)]
pub struct RecognitionMetadata {
    /// Overrides the configured device id.
    pub device_id: Option<String>,
    /// Overrides [`RecognitionConfig::attach_history_image`].
    pub attach_history_image: Option<bool>,
}

/// What `recognize` produced.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionReport {
    pub outcome: RecognitionOutcome,
    /// The JPEG that was actually sent, if encoding succeeded.
    pub encoded_image: Option<Vec<u8>>,
}

/// Published on the result channel after every `recognize`.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionEvent {
    pub capture_id: CaptureId,
    pub outcome: RecognitionOutcome,
    pub at: DateTime<Utc>,
}

/// Filters for [`RecognitionClient::fetch_log`].
#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    pub limit: Option<u32>,
}

/// Talks to the recognition service.
///
/// Every call is one request with no internal retry.
pub struct RecognitionClient {
    transport: Arc<dyn RecognitionTransport>,
    encoder: ImageEncoder,
    config: RecognitionConfig,
    events: broadcast::Sender<RecognitionEvent>,
}

impl RecognitionClient {
    pub fn new(transport: Arc<dyn RecognitionTransport>, config: RecognitionConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            transport,
            encoder: ImageEncoder::new(config.encoder.clone()),
            config,
            events,
        }
    }

    pub fn config(&self) -> &RecognitionConfig {
        &self.config
    }

    /// Subscribes to recognition results.
    pub fn subscribe(&self) -> broadcast::Receiver<RecognitionEvent> {
        self.events.subscribe()
    }

    /// Asks the service who is in `image`.
    ///
    /// Never fails: anything that prevents a usable answer becomes
    /// [`RecognitionOutcome::RequestFailed`]. Takes the image by value; its
    /// buffer is consumed by the encoder.
    pub async fn recognize(
        &self,
        image: CapturedImage,
        metadata: RecognitionMetadata,
    ) -> RecognitionReport {
        let capture_id = image.capture_id();
        let report = self.recognize_inner(image, metadata).await;

        match &report.outcome {
            RecognitionOutcome::Matched {
                subject_name,
                distance,
                ..
            } => info!(%capture_id, subject = %subject_name, distance, "Recognized"),
            RecognitionOutcome::NotMatched => info!(%capture_id, "Not recognized"),
            RecognitionOutcome::RequestFailed { reason } => {
                warn!(%capture_id, %reason, "Recognition request failed")
            }
        }

        // No subscribers is fine.
        let _ = self.events.send(RecognitionEvent {
            capture_id,
            outcome: report.outcome.clone(),
            at: Utc::now(),
        });
        report
    }

    async fn recognize_inner(
        &self,
        image: CapturedImage,
        metadata: RecognitionMetadata,
    ) -> RecognitionReport {
        let encoded = match self.encoder.encode_owned(image.into_bytes()).await {
            Ok(encoded) => encoded,
            Err(e) => {
                return RecognitionReport {
                    outcome: RecognitionOutcome::RequestFailed {
                        reason: e.to_string(),
                    },
                    encoded_image: None,
                };
            }
        };

        let image_base64 = STANDARD.encode(&encoded);
        let attach = metadata
            .attach_history_image
            .unwrap_or(self.config.attach_history_image);
        let request = RecognizeRequest {
            captured_image: attach.then(|| image_base64.clone()),
            image_base64,
            device_id: metadata
                .device_id
                .unwrap_or_else(|| self.config.device_id.clone()),
        };

        let outcome = match self.post::<RecognizeResponse>("/recognize", &request, &[]).await {
            Ok(response) => outcome_from_response(response),
            Err(e) => RecognitionOutcome::RequestFailed {
                reason: e.to_string(),
            },
        };

        RecognitionReport {
            outcome,
            encoded_image: Some(encoded),
        }
    }

    /// Registers a new subject and returns the id the service assigned.
    pub async fn enroll(
        &self,
        image: CapturedImage,
        subject_name: &str,
        role: &str,
    ) -> RecognitionResult<String> {
        let encoded = self.encoder.encode_owned(image.into_bytes()).await?;
        let request = RegisterRequest {
            image_base64: STANDARD.encode(&encoded),
            name: subject_name.to_string(),
            role: role.to_string(),
            position: role.to_string(),
        };
        let response: RegisterResponse = self.post("/register", &request, &[]).await?;
        info!(subject_id = %response.subject_id, name = subject_name, "Enrolled subject");
        Ok(response.subject_id)
    }

    /// Lists registered users.
    pub async fn fetch_users(&self) -> RecognitionResult<Vec<RemoteUser>> {
        let response: UsersResponse = self.get("/users", &[]).await?;
        debug!(count = response.users.len(), "Fetched users");
        Ok(response.users)
    }

    /// Fetches a user's enrollment image. `None` if the service has none.
    pub async fn fetch_user_image(&self, id: &str) -> RecognitionResult<Option<Vec<u8>>> {
        let path = format!("/users/{id}/image");
        let response: UserImageResponse = match self.get(&path, &[]).await {
            Ok(response) => response,
            Err(RecognitionError::Server { status: 404, .. }) => return Ok(None),
            Err(e) => return Err(e),
        };
        let bytes = STANDARD
            .decode(response.image_base64.as_bytes())
            .map_err(|e| RecognitionError::Decode(format!("user image: {e}")))?;
        Ok(Some(bytes))
    }

    /// Reads the server-side attendance log.
    pub async fn fetch_log(&self, filter: &LogFilter) -> RecognitionResult<Vec<AttendanceRecord>> {
        let mut query = Vec::new();
        if let Some(limit) = filter.limit {
            query.push(("limit".to_string(), limit.to_string()));
        }
        let response: AttendanceLogResponse = self.get("/attendance", &query).await?;
        Ok(response.items)
    }

    /// Worked hours per subject for one day (the service's today if `None`).
    pub async fn work_hours(&self, date: Option<NaiveDate>) -> RecognitionResult<Vec<WorkHours>> {
        let mut query = Vec::new();
        if let Some(date) = date {
            query.push(("date".to_string(), date.format("%Y-%m-%d").to_string()));
        }
        let response: WorkHoursResponse = self.get("/attendance/work-hours", &query).await?;
        Ok(response.users)
    }

    /// Worked hours per subject and day over an inclusive range.
    pub async fn work_hours_summary(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> RecognitionResult<Vec<WorkHoursDay>> {
        let mut query = Vec::new();
        if let Some(start) = start {
            query.push(("start_date".to_string(), start.format("%Y-%m-%d").to_string()));
        }
        if let Some(end) = end {
            query.push(("end_date".to_string(), end.format("%Y-%m-%d").to_string()));
        }
        let response: WorkHoursSummaryResponse =
            self.get("/attendance/work-hours/summary", &query).await?;
        Ok(response.summary)
    }

    /// Submits one log entry.
    ///
    /// The entry id is sent as the `Idempotency-Key`; the call succeeds only
    /// if the acknowledgement echoes that id.
    pub async fn submit_attendance(&self, entry: &LogEntry) -> RecognitionResult<AttendanceAck> {
        let id = entry.id.to_string();
        let submission = AttendanceSubmission {
            id: id.clone(),
            device_id: self.config.device_id.clone(),
            subject_id: entry.subject_id.clone(),
            name: entry.subject_name.clone(),
            event_type: entry.event_type.as_str().to_string(),
            status: entry.status.as_str().to_string(),
            matched: entry.is_success(),
            distance: entry.distance,
            ts: entry.created_at.timestamp(),
            created_at: entry.created_at.to_rfc3339(),
            captured_image: if self.config.submit_images {
                entry.captured_image.as_deref().map(|b| STANDARD.encode(b))
            } else {
                None
            },
        };
        let headers = [("Idempotency-Key".to_string(), id.clone())];

        let ack: AttendanceAck = self.post("/attendance", &submission, &headers).await?;
        if ack.id != id {
            return Err(RecognitionError::AckMismatch {
                expected: id,
                received: ack.id,
            });
        }
        if ack.duplicate {
            debug!(entry_id = %id, "Service already had this entry");
        }
        Ok(ack)
    }

    /// Checks that the service answers `GET /health`.
    pub async fn health(&self) -> RecognitionResult<String> {
        let response: HealthResponse = self.get("/health", &[]).await?;
        Ok(response.status)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> RecognitionResult<T> {
        let value = self.transport.get_json(path, query).await?;
        decode(path, value)
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &impl Serialize,
        headers: &[(String, String)],
    ) -> RecognitionResult<T> {
        let body = serde_json::to_value(body)
            .map_err(|e| RecognitionError::Encode(format!("{path} body: {e}")))?;
        let value = self.transport.post_json(path, body, headers).await?;
        decode(path, value)
    }
}

fn decode<T: DeserializeOwned>(path: &str, value: Value) -> RecognitionResult<T> {
    serde_json::from_value(value).map_err(|e| RecognitionError::Decode(format!("{path}: {e}")))
}

fn outcome_from_response(response: RecognizeResponse) -> RecognitionOutcome {
    if !response.matched {
        return RecognitionOutcome::NotMatched;
    }
    match response.subject_id {
        Some(subject_id) => RecognitionOutcome::Matched {
            subject_name: response
                .name
                .unwrap_or_else(|| UNKNOWN_SUBJECT.to_string()),
            subject_id,
            distance: response.distance.unwrap_or_default(),
        },
        None => RecognitionOutcome::RequestFailed {
            reason: "match reported without a subject id".to_string(),
        },
    }
}
