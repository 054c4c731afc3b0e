//! Transport layer abstraction.
//!
//! The client speaks JSON over a [`RecognitionTransport`]; production uses
//! [`HttpTransport`], tests use [`mock::MockTransport`].

use crate::error::{RecognitionError, RecognitionResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// A JSON request/response channel to the recognition service.
///
/// Implementations perform exactly one attempt per call.
#[async_trait]
pub trait RecognitionTransport: Send + Sync {
    /// `GET {base}{path}?{query}`.
    async fn get_json(&self, path: &str, query: &[(String, String)]) -> RecognitionResult<Value>;

    /// `POST {base}{path}` with a JSON body and extra headers.
    async fn post_json(
        &self,
        path: &str,
        body: Value,
        headers: &[(String, String)],
    ) -> RecognitionResult<Value>;
}

/// HTTP transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpTransportConfig {
    /// Service base URL, without a trailing slash.
    pub base_url: String,
    /// Whole-request timeout in milliseconds.
    pub request_timeout_ms: u64,
    /// Connection establishment timeout in milliseconds.
    pub connect_timeout_ms: u64,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8001".to_string(),
            request_timeout_ms: 10_000,
            connect_timeout_ms: 3_000,
        }
    }
}

/// `reqwest`-backed transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    base_url: String,
    timeout: Duration,
    client: Client,
}

impl HttpTransport {
    pub fn new(config: HttpTransportConfig) -> RecognitionResult<Self> {
        let timeout = Duration::from_millis(config.request_timeout_ms);
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .build()
            .map_err(|e| RecognitionError::Transport(format!("building HTTP client: {e}")))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout,
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn map_send_error(&self, e: reqwest::Error) -> RecognitionError {
        if e.is_timeout() {
            RecognitionError::Timeout(self.timeout)
        } else {
            RecognitionError::Transport(e.to_string())
        }
    }

    async fn read_json(&self, response: reqwest::Response) -> RecognitionResult<Value> {
        let status = response.status();
        let body = response.bytes().await.map_err(|e| self.map_send_error(e))?;

        if !status.is_success() {
            return Err(RecognitionError::Server {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }
        if body.is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait]
impl RecognitionTransport for HttpTransport {
    async fn get_json(&self, path: &str, query: &[(String, String)]) -> RecognitionResult<Value> {
        debug!(path, "GET");
        let response = self
            .client
            .get(self.url(path))
            .query(query)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        self.read_json(response).await
    }

    async fn post_json(
        &self,
        path: &str,
        body: Value,
        headers: &[(String, String)],
    ) -> RecognitionResult<Value> {
        debug!(path, "POST");
        let mut request = self.client.post(self.url(path)).json(&body);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }
        let response = request.send().await.map_err(|e| self.map_send_error(e))?;
        self.read_json(response).await
    }
}

/// A scriptable transport for testing.
pub mod mock {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::{Arc, Mutex};

    /// HTTP method of a recorded request.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum Method {
        Get,
        Post,
    }

    /// A request the mock received.
    #[derive(Debug, Clone, PartialEq)]
    pub struct RecordedRequest {
        pub method: Method,
        pub path: String,
        pub query: Vec<(String, String)>,
        pub headers: Vec<(String, String)>,
        pub body: Option<Value>,
    }

    impl RecordedRequest {
        /// Looks up a header by case-insensitive name.
        pub fn header(&self, name: &str) -> Option<&str> {
            self.headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str())
        }
    }

    type Handler = Arc<dyn Fn(&RecordedRequest) -> RecognitionResult<Value> + Send + Sync>;

    #[derive(Default)]
    struct Inner {
        scripted: HashMap<(Method, String), VecDeque<RecognitionResult<Value>>>,
        handlers: HashMap<(Method, String), Handler>,
        requests: Vec<RecordedRequest>,
        offline: bool,
        delay: Option<Duration>,
    }

    /// A mock transport. Clones share state.
    ///
    /// For each request, a queued one-shot reply for the route wins, then a
    /// route handler, otherwise the call fails with a transport error.
    #[derive(Clone, Default)]
    pub struct MockTransport {
        inner: Arc<Mutex<Inner>>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queues a one-shot reply for a route.
        pub fn push(&self, method: Method, path: &str, reply: RecognitionResult<Value>) {
            self.inner
                .lock()
                .unwrap()
                .scripted
                .entry((method, path.to_string()))
                .or_default()
                .push_back(reply);
        }

        /// Installs a handler answering every unscripted request to a route.
        pub fn on<F>(&self, method: Method, path: &str, handler: F)
        where
            F: Fn(&RecordedRequest) -> RecognitionResult<Value> + Send + Sync + 'static,
        {
            self.inner
                .lock()
                .unwrap()
                .handlers
                .insert((method, path.to_string()), Arc::new(handler));
        }

        /// Acknowledges every `POST /attendance` by echoing its id.
        pub fn ack_attendance(&self) {
            self.on(Method::Post, "/attendance", |req| {
                let id = req
                    .body
                    .as_ref()
                    .and_then(|b| b.get("id"))
                    .cloned()
                    .unwrap_or(Value::Null);
                Ok(serde_json::json!({ "id": id }))
            });
        }

        /// While offline every call fails with a transport error and is
        /// still recorded.
        pub fn set_offline(&self, offline: bool) {
            self.inner.lock().unwrap().offline = offline;
        }

        /// Delays every reply.
        pub fn set_delay(&self, delay: Option<Duration>) {
            self.inner.lock().unwrap().delay = delay;
        }

        pub fn requests(&self) -> Vec<RecordedRequest> {
            self.inner.lock().unwrap().requests.clone()
        }

        /// Requests made to one route.
        pub fn requests_to(&self, method: Method, path: &str) -> Vec<RecordedRequest> {
            self.requests()
                .into_iter()
                .filter(|r| r.method == method && r.path == path)
                .collect()
        }

        async fn dispatch(&self, request: RecordedRequest) -> RecognitionResult<Value> {
            let (delay, reply) = self.resolve(request);
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            reply
        }

        fn resolve(&self, request: RecordedRequest) -> (Option<Duration>, RecognitionResult<Value>) {
            let (delay, handler) = {
                let mut inner = self.inner.lock().unwrap();
                inner.requests.push(request.clone());
                let delay = inner.delay;
                if inner.offline {
                    return (
                        delay,
                        Err(RecognitionError::Transport("network unreachable".into())),
                    );
                }

                let key = (request.method, request.path.clone());
                if let Some(reply) = inner.scripted.get_mut(&key).and_then(VecDeque::pop_front) {
                    return (delay, reply);
                }
                match inner.handlers.get(&key).cloned() {
                    Some(handler) => (delay, handler),
                    None => {
                        return (
                            delay,
                            Err(RecognitionError::Transport(format!(
                                "no mock reply for {:?} {}",
                                request.method, request.path
                            ))),
                        );
                    }
                }
            };
            // Handlers run outside the lock so they may use the mock.
            (delay, handler(&request))
        }
    }

    #[async_trait]
    impl RecognitionTransport for MockTransport {
        async fn get_json(
            &self,
            path: &str,
            query: &[(String, String)],
        ) -> RecognitionResult<Value> {
            self.dispatch(RecordedRequest {
                method: Method::Get,
                path: path.to_string(),
                query: query.to_vec(),
                headers: Vec::new(),
                body: None,
            })
            .await
        }

        async fn post_json(
            &self,
            path: &str,
            body: Value,
            headers: &[(String, String)],
        ) -> RecognitionResult<Value> {
            self.dispatch(RecordedRequest {
                method: Method::Post,
                path: path.to_string(),
                query: Vec::new(),
                headers: headers.to_vec(),
                body: Some(body),
            })
            .await
        }
    }
}
