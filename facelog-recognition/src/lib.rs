//! Client for the remote recognition service.
//!
//! [`RecognitionClient`] translates captured frames into the service's wire
//! format, issues exactly one request per call and turns the reply into a
//! [`RecognitionOutcome`](facelog_types::RecognitionOutcome). It never
//! retries; retry policy belongs to the caller.
//!
//! The network sits behind [`RecognitionTransport`]. [`HttpTransport`] is the
//! production implementation, [`mock::MockTransport`] scripts replies for
//! tests.

mod client;
mod encode;
mod error;
mod transport;
pub mod wire;

pub use client::{
    LogFilter, RecognitionClient, RecognitionConfig, RecognitionEvent, RecognitionMetadata,
    RecognitionReport,
};
pub use encode::{EncoderConfig, ImageEncoder};
pub use error::{RecognitionError, RecognitionResult};
pub use transport::{HttpTransport, HttpTransportConfig, RecognitionTransport, mock};
