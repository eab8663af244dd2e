//! HTTP client abstraction for submitting forms.
//!
//! This module defines the `HttpClient` trait to abstract request execution,
//! enabling testability with mock implementations.

use crate::domain::job::RequestJob;
use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Content type of every submission.
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Maximum redirects followed before giving up.
pub const MAX_REDIRECTS: usize = 10;

/// Response from an HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Canonical reason phrase for the status, empty if unknown
    pub status_text: String,
    /// Response body as a string
    pub body: String,
}

impl HttpResponse {
    /// Build a response, filling `status_text` from the status code.
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        let status_text = reqwest::StatusCode::from_u16(status)
            .ok()
            .and_then(|code| code.canonical_reason())
            .unwrap_or_default()
            .to_string();
        Self {
            status,
            status_text,
            body: body.into(),
        }
    }
}

/// Trait for submitting a job's form to its target.
///
/// This abstraction allows for different implementations (production vs. testing)
/// and makes the dispatcher testable without making real HTTP calls.
///
/// # Example
/// ```ignore
/// let client = ReqwestHttpClient::new()?;
/// let response = client.execute(&job, 5000).await?;
/// println!("Status: {}, Body: {}", response.status, response.body);
/// ```
#[async_trait]
pub trait HttpClient: Send + Sync + Clone {
    /// POST the job's URL-encoded form to `job.target`.
    ///
    /// # Errors
    /// Returns an error if:
    /// - The request fails due to network issues
    /// - The request times out after `timeout_ms`
    /// - The request cannot be built
    async fn execute(&self, job: &RequestJob, timeout_ms: u64) -> Result<HttpResponse>;
}

// ============================================================================
// Production Implementation using reqwest
// ============================================================================

/// Production HTTP client using reqwest.
///
/// Redirects are followed, no cookies are stored or sent, and no `Referer` header
/// is added. One client is shared across all jobs so connections to the target
/// are pooled.
#[derive(Clone)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    /// Create a client with the submission policy described above.
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .referer(false)
            .user_agent(concat!("stomper/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    /// Wrap an already configured reqwest client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    #[tracing::instrument(skip(self, job), fields(job = %job.index, username = %job.credential.username))]
    async fn execute(&self, job: &RequestJob, timeout_ms: u64) -> Result<HttpResponse> {
        let body = job.form_body();

        tracing::debug!(
            url = %job.target,
            timeout_ms = timeout_ms,
            body_len = body.len(),
            "Submitting form"
        );

        let response = self
            .client
            .post(job.target.clone())
            .header(reqwest::header::CONTENT_TYPE, FORM_CONTENT_TYPE)
            .timeout(Duration::from_millis(timeout_ms))
            .body(body)
            .send()
            .await
            .map_err(|e| {
                tracing::debug!(job = %job.index, error = %e, "Form submission failed");
                e
            })?;

        let status = response.status();
        let body = response.text().await?;

        tracing::debug!(
            job = %job.index,
            status = status.as_u16(),
            response_len = body.len(),
            "Form submission completed"
        );

        Ok(HttpResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            body,
        })
    }
}

// ============================================================================
// Test/Mock Implementation
// ============================================================================

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::oneshot;

/// Mock HTTP client for testing.
///
/// Responses are keyed by credential, formatted as `"{username}:{password}"`.
/// Keys without a queued response fall back to the default response, if set.
///
/// # Example
/// ```ignore
/// let mock = MockHttpClient::new();
/// mock.set_default_response(HttpResponse::new(401, "denied"));
/// mock.add_response("admin:letmein", Ok(HttpResponse::new(302, "")));
/// ```
#[derive(Clone)]
pub struct MockHttpClient {
    responses: Arc<Mutex<HashMap<String, Vec<MockResponse>>>>,
    default_response: Arc<Mutex<Option<HttpResponse>>>,
    default_delay: Arc<Mutex<Duration>>,
    calls: Arc<Mutex<Vec<MockCall>>>,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
}

/// A mock response that can optionally wait before completing.
enum MockResponse {
    /// Immediate response
    Immediate(Result<HttpResponse>),
    /// Response that completes after a fixed delay
    Delayed {
        response: Result<HttpResponse>,
        delay: Duration,
    },
    /// Response that waits for a trigger signal before completing
    Triggered {
        response: Result<HttpResponse>,
        trigger: oneshot::Receiver<()>,
    },
}

/// Record of a call made to the mock HTTP client.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub index: u64,
    pub username: String,
    pub password: String,
    pub target: String,
    pub body: String,
    pub timeout_ms: u64,
    /// When the call started, on the tokio clock
    pub started_at: tokio::time::Instant,
}

impl MockHttpClient {
    /// Create a new mock HTTP client.
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(HashMap::new())),
            default_response: Arc::new(Mutex::new(None)),
            default_delay: Arc::new(Mutex::new(Duration::ZERO)),
            calls: Arc::new(Mutex::new(Vec::new())),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Response returned for any credential with nothing queued.
    pub fn set_default_response(&self, response: HttpResponse) {
        *self.default_response.lock() = Some(response);
    }

    /// Delay applied before returning the default response.
    pub fn set_default_delay(&self, delay: Duration) {
        *self.default_delay.lock() = delay;
    }

    /// Queue a response for one credential.
    ///
    /// Multiple responses for the same key are returned in FIFO order, which is
    /// how retries of the same job are scripted.
    pub fn add_response(&self, key: &str, response: Result<HttpResponse>) {
        self.push(key, MockResponse::Immediate(response));
    }

    /// Queue a response that completes only after `delay` has elapsed.
    pub fn add_delayed_response(&self, key: &str, response: Result<HttpResponse>, delay: Duration) {
        self.push(key, MockResponse::Delayed { response, delay });
    }

    /// Queue a response that will wait for a manual trigger before completing.
    ///
    /// Returns a sender that when triggered (by sending `()` or dropping) will
    /// cause the request to complete with the given response.
    pub fn add_response_with_trigger(
        &self,
        key: &str,
        response: Result<HttpResponse>,
    ) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.push(
            key,
            MockResponse::Triggered {
                response,
                trigger: rx,
            },
        );
        tx
    }

    fn push(&self, key: &str, response: MockResponse) {
        self.responses
            .lock()
            .entry(key.to_string())
            .or_default()
            .push(response);
    }

    /// Get all calls that have been made to this mock client.
    pub fn get_calls(&self) -> Vec<MockCall> {
        self.calls.lock().clone()
    }

    /// Get the number of calls made.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Get the number of requests currently in-flight (executing).
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of requests that were ever in flight at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

impl Default for MockHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn execute(&self, job: &RequestJob, timeout_ms: u64) -> Result<HttpResponse> {
        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);

        // Guard to ensure we decrement even if cancelled/panicked
        let in_flight = self.in_flight.clone();
        let _guard = scopeguard::guard((), move |_| {
            in_flight.fetch_sub(1, Ordering::SeqCst);
        });

        self.calls.lock().push(MockCall {
            index: job.index.0,
            username: job.credential.username.clone(),
            password: job.credential.password.clone(),
            target: job.target.to_string(),
            body: job.form_body(),
            timeout_ms,
            started_at: tokio::time::Instant::now(),
        });

        let key = format!("{}:{}", job.credential.username, job.credential.password);
        let mock_response = {
            let mut responses = self.responses.lock();
            responses
                .get_mut(&key)
                .filter(|queue| !queue.is_empty())
                .map(|queue| queue.remove(0))
        };

        match mock_response {
            Some(MockResponse::Immediate(response)) => response,
            Some(MockResponse::Delayed { response, delay }) => {
                tokio::time::sleep(delay).await;
                response
            }
            Some(MockResponse::Triggered { response, trigger }) => {
                // Proceed either way once the sender fires or is dropped
                let _ = trigger.await;
                response
            }
            None => {
                let default = self.default_response.lock().clone();
                let delay = *self.default_delay.lock();
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                default.ok_or_else(|| {
                    crate::error::StomperError::Other(anyhow::anyhow!(
                        "No mock response configured for {}",
                        key
                    ))
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::job::{Credential, JobIndex};
    use crate::template::SubstitutedField;

    fn job(username: &str, password: &str) -> RequestJob {
        let credential = Credential::new(username, password);
        RequestJob {
            index: JobIndex(0),
            target: url::Url::parse("https://app.example.com/login").unwrap(),
            fields: vec![
                SubstitutedField {
                    key: "user".to_string(),
                    value: credential.username.clone(),
                },
                SubstitutedField {
                    key: "pass".to_string(),
                    value: credential.password.clone(),
                },
            ],
            credential,
            scheduled_offset: Duration::ZERO,
        }
    }

    #[test]
    fn test_response_status_text_from_code() {
        assert_eq!(HttpResponse::new(401, "").status_text, "Unauthorized");
        assert_eq!(HttpResponse::new(299, "").status_text, "");
    }

    #[tokio::test]
    async fn test_mock_client_keyed_by_credential() {
        let mock = MockHttpClient::new();
        mock.add_response("admin:admin", Ok(HttpResponse::new(200, "welcome")));
        mock.set_default_response(HttpResponse::new(401, "denied"));

        let hit = mock.execute(&job("admin", "admin"), 5000).await.unwrap();
        assert_eq!(hit.status, 200);
        assert_eq!(hit.body, "welcome");

        let miss = mock.execute(&job("admin", "guess"), 5000).await.unwrap();
        assert_eq!(miss.status, 401);

        let calls = mock.get_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].body, "user=admin&pass=admin");
        assert_eq!(calls[0].target, "https://app.example.com/login");
        assert_eq!(calls[1].timeout_ms, 5000);
    }

    #[tokio::test]
    async fn test_mock_client_fifo_responses() {
        let mock = MockHttpClient::new();
        mock.add_response("a:b", Ok(HttpResponse::new(503, "busy")));
        mock.add_response("a:b", Ok(HttpResponse::new(401, "no")));

        assert_eq!(mock.execute(&job("a", "b"), 10).await.unwrap().status, 503);
        assert_eq!(mock.execute(&job("a", "b"), 10).await.unwrap().status, 401);
        // Queue exhausted and no default configured
        assert!(mock.execute(&job("a", "b"), 10).await.is_err());
    }

    #[tokio::test]
    async fn test_mock_client_with_trigger() {
        let mock = MockHttpClient::new();
        let trigger = mock.add_response_with_trigger("a:b", Ok(HttpResponse::new(200, "late")));

        let mock_clone = mock.clone();
        let handle = tokio::spawn(async move { mock_clone.execute(&job("a", "b"), 10).await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!handle.is_finished());
        assert_eq!(mock.in_flight_count(), 1);

        trigger.send(()).unwrap();
        let response = handle.await.unwrap().unwrap();
        assert_eq!(response.body, "late");
        assert_eq!(mock.in_flight_count(), 0);
        assert_eq!(mock.peak_in_flight(), 1);
    }

    #[tokio::test]
    async fn test_reqwest_client_connection_refused_is_error() {
        // Bind then drop a listener so the port is very likely closed
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = ReqwestHttpClient::new().unwrap();
        let mut job = job("a", "b");
        job.target = url::Url::parse(&format!("http://127.0.0.1:{}/login", port)).unwrap();

        let err = client.execute(&job, 2000).await.unwrap_err();
        assert!(matches!(err, crate::StomperError::HttpClient(ref e) if e.is_connect()));
    }
}
