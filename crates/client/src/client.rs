//! Iterable API client with a retry/backoff request executor.
//!
//! Every outbound call goes through [`IterableClient::execute`], which
//! classifies each attempt and retries transient failures with exponential
//! backoff and jitter. Success is two-layered: the HTTP status must be 2xx
//! AND the response body must carry the `Success` application code.

use log::{debug, info, warn};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tokio::time::sleep;

use promosync_core::outcome::{OutcomeClass, RecordOutcome, RequestOutcome};
use promosync_core::retry::RetryPolicy;
use promosync_core::users::UserRecord;

use crate::auth::Authenticator;
use crate::error::{ClientError, Result};

/// Per-attempt timeout for API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Application-level code signalling success in a 2xx response body.
const SUCCESS_CODE: &str = "Success";

const USERS_UPDATE_PATH: &str = "/api/users/update";
const EVENTS_TRACK_PATH: &str = "/api/events/track";

/// Event name attached to page-view tracking calls.
const PAGE_VIEW_EVENT: &str = "page_view";

fn is_retryable_transport_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request() || err.is_body()
}

fn parse_body(body: &str) -> Value {
    serde_json::from_str(body).unwrap_or_else(|_| json!({ "rawResponse": body }))
}

/// Classification of a single attempt.
enum Attempt {
    Success { body: Value },
    Permanent { class: OutcomeClass, detail: Value },
    Transient { detail: Value },
}

/// Client for the Iterable `users/update` and `events/track` endpoints.
///
/// The underlying connection pool is reused across all calls of a run.
#[derive(Debug)]
pub struct IterableClient {
    client: reqwest::Client,
    base_url: String,
    auth: Authenticator,
    policy: RetryPolicy,
}

impl IterableClient {
    /// Create a new client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Base URL of the API (e.g., "https://api.iterable.com")
    /// * `auth` - Authentication strategy applied to every attempt
    /// * `policy` - Retry tuning for the request executor
    pub fn new(base_url: &str, auth: Authenticator, policy: RetryPolicy) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
            policy,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Headers for one attempt; the auth header is re-obtained every time
    /// so signed-token refresh is transparent.
    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let (name, value) = self.auth.header()?;
        let name = HeaderName::try_from(name)
            .map_err(|_| ClientError::auth("Invalid auth header name"))?;
        let value = HeaderValue::from_str(&value)
            .map_err(|_| ClientError::auth("Auth header value contains invalid characters"))?;
        headers.insert(name, value);
        Ok(headers)
    }

    fn classify_status(&self, status: StatusCode, parsed: Value) -> Attempt {
        if status.is_success() {
            let code = parsed.get("code").and_then(Value::as_str).unwrap_or("Unknown");
            if code == SUCCESS_CODE {
                return Attempt::Success { body: parsed };
            }
            // 2xx transport with a failing application code: the operation
            // itself was rejected, retrying cannot fix it.
            return Attempt::Permanent {
                class: OutcomeClass::ClientError,
                detail: parsed,
            };
        }

        if self.policy.is_transient(status.as_u16()) {
            Attempt::Transient { detail: parsed }
        } else {
            Attempt::Permanent {
                class: OutcomeClass::for_status(status.as_u16()),
                detail: parsed,
            }
        }
    }

    /// Resilient request executor.
    ///
    /// Performs the call, classifies the outcome, and retries transient
    /// failures within the policy budget. The returned outcome is the whole
    /// story; this method never fails out of band.
    pub async fn execute(&self, method: Method, url: &str, payload: &Value) -> RequestOutcome {
        let mut attempt: u32 = 1;

        loop {
            let headers = match self.headers() {
                Ok(headers) => headers,
                Err(err) => {
                    warn!("Auth header unavailable for {}: {}", url, err);
                    return RequestOutcome::failure(
                        OutcomeClass::ClientError,
                        attempt,
                        json!({ "error": err.to_string() }),
                    );
                }
            };

            let started = Instant::now();
            let send_result = self
                .client
                .request(method.clone(), url)
                .headers(headers)
                .json(payload)
                .send()
                .await;

            let attempt_result = match send_result {
                Ok(response) => {
                    let status = response.status();
                    match response.text().await {
                        Ok(body) => self.classify_status(status, parse_body(&body)),
                        Err(err) => Attempt::Transient {
                            detail: json!({
                                "error": format!("Failed to read response body: {}", err)
                            }),
                        },
                    }
                }
                Err(err) if is_retryable_transport_error(&err) => Attempt::Transient {
                    detail: json!({ "error": err.to_string() }),
                },
                Err(err) => Attempt::Permanent {
                    class: OutcomeClass::NetworkError,
                    detail: json!({ "error": err.to_string() }),
                },
            };

            let elapsed_ms = started.elapsed().as_millis();
            match attempt_result {
                Attempt::Success { body } => {
                    debug!("{} succeeded on attempt {} ({}ms)", url, attempt, elapsed_ms);
                    return RequestOutcome::success(attempt, body);
                }
                Attempt::Permanent { class, detail } => {
                    warn!(
                        "{} failed permanently on attempt {} ({}ms): {}",
                        url, attempt, elapsed_ms, detail
                    );
                    return RequestOutcome::failure(class, attempt, detail);
                }
                Attempt::Transient { detail } => {
                    if attempt >= self.policy.max_attempts {
                        warn!(
                            "{} gave up after {} attempt(s) ({}ms): {}",
                            url, attempt, elapsed_ms, detail
                        );
                        return RequestOutcome::failure(
                            OutcomeClass::ExhaustedRetries,
                            attempt,
                            detail,
                        );
                    }
                    let backoff = self.policy.backoff_delay(attempt);
                    debug!(
                        "{} attempt {} failed ({}ms), retrying in {}ms",
                        url,
                        attempt,
                        elapsed_ms,
                        backoff.as_millis()
                    );
                    sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Update a user profile.
    ///
    /// POST /api/users/update
    pub async fn update_user(&self, email: &str, data_fields: Value) -> RequestOutcome {
        let payload = json!({ "email": email, "dataFields": data_fields });
        debug!("Calling users/update for {}", email);
        self.execute(Method::POST, &self.endpoint(USERS_UPDATE_PATH), &payload)
            .await
    }

    /// Track an event for a user.
    ///
    /// POST /api/events/track
    pub async fn track_event(&self, email: &str, event_name: &str, data_fields: Value) -> RequestOutcome {
        let payload = json!({
            "email": email,
            "eventName": event_name,
            "dataFields": data_fields,
        });
        debug!("Calling events/track for {} ({})", email, event_name);
        self.execute(Method::POST, &self.endpoint(EVENTS_TRACK_PATH), &payload)
            .await
    }

    /// Process one customer record: profile update then event tracking, in
    /// that order, unconditionally. Nothing a record does can abort the
    /// batch; every failure mode ends up inside the returned outcome.
    pub async fn process_user(&self, record: &UserRecord) -> RecordOutcome {
        if record.email.is_empty() {
            warn!("Customer record {} has no email address, skipping API calls", record.id);
            let missing = RequestOutcome::failure(
                OutcomeClass::ClientError,
                0,
                json!({ "error": "missing email address" }),
            );
            return RecordOutcome::new("", missing.clone(), missing);
        }

        info!("Processing user: {}", record.email);
        let profile_fields = json!({
            "first_name": record.first_name,
            "last_name": record.last_name,
            "plan_type": record.plan_type.as_str(),
            "recent_page_view": true,
            "candidate": record.candidate,
        });
        let profile_update = self.update_user(&record.email, profile_fields).await;

        // Page-view events report the device class under the `browser` key.
        let event_fields = json!({
            "page": record.page,
            "browser": record.device,
            "location": record.location,
            "timestamp": record.event_time_string(),
            "candidate": record.candidate,
        });
        let event_track = self
            .track_event(&record.email, PAGE_VIEW_EVENT, event_fields)
            .await;

        let outcome = RecordOutcome::new(record.email.clone(), profile_update, event_track);
        if outcome.overall_success {
            info!("Successfully processed user: {}", record.email);
        } else {
            warn!("Partial or total failure processing user: {}", record.email);
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use promosync_core::outcome::SyncReport;
    use promosync_core::users::PlanTier;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::Mutex as TokioMutex;

    #[derive(Debug, Clone)]
    struct CapturedRequest {
        path: String,
        api_key: Option<String>,
        authorization: Option<String>,
        body: String,
    }

    #[derive(Debug, Clone)]
    enum MockOutcome {
        Respond { status: u16, body: String },
        DropConnection,
    }

    fn success_body() -> String {
        r#"{"code":"Success","msg":"user updated","params":null}"#.to_string()
    }

    fn api_error_body(code: &str, msg: &str) -> String {
        format!(r#"{{"code":"{}","msg":"{}","params":null}}"#, code, msg)
    }

    fn test_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(5),
            ..RetryPolicy::default()
        }
    }

    fn test_record(email: &str) -> UserRecord {
        UserRecord {
            id: 7,
            email: email.to_string(),
            first_name: Some("Ada".to_string()),
            last_name: Some("Lovelace".to_string()),
            plan_type: PlanTier::Pro,
            candidate: Some("yes".to_string()),
            page: Some("pricing".to_string()),
            device: Some("desktop".to_string()),
            browser: Some("firefox".to_string()),
            location: Some("London, UK".to_string()),
            event_time: None,
        }
    }

    fn header_end_offset(buffer: &[u8]) -> Option<usize> {
        buffer.windows(4).position(|window| window == b"\r\n\r\n")
    }

    async fn read_http_request(
        stream: &mut tokio::net::TcpStream,
    ) -> Option<(String, HashMap<String, String>, String)> {
        let mut buffer = Vec::new();
        loop {
            let mut chunk = [0_u8; 2048];
            let read = stream.read(&mut chunk).await.ok()?;
            if read == 0 {
                return None;
            }
            buffer.extend_from_slice(&chunk[..read]);
            if header_end_offset(&buffer).is_some() {
                break;
            }
        }

        let header_end = header_end_offset(&buffer)?;
        let head = String::from_utf8_lossy(&buffer[..header_end]).to_string();
        let mut lines = head.lines();
        let request_line = lines.next()?.to_string();
        let path = request_line.split_whitespace().nth(1)?.to_string();

        let mut headers = HashMap::new();
        for line in lines {
            if let Some((name, value)) = line.split_once(':') {
                headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
            }
        }

        let content_length = headers
            .get("content-length")
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(0);

        let mut body = buffer[header_end + 4..].to_vec();
        while body.len() < content_length {
            let mut chunk = [0_u8; 2048];
            let read = stream.read(&mut chunk).await.ok()?;
            if read == 0 {
                break;
            }
            body.extend_from_slice(&chunk[..read]);
        }

        Some((path, headers, String::from_utf8_lossy(&body).to_string()))
    }

    fn status_text(status: u16) -> &'static str {
        match status {
            200 => "OK",
            400 => "Bad Request",
            404 => "Not Found",
            503 => "Service Unavailable",
            _ => "Error",
        }
    }

    async fn write_http_response(
        stream: &mut tokio::net::TcpStream,
        status: u16,
        body: &str,
    ) -> std::io::Result<()> {
        let response = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            status_text(status),
            body.len(),
            body
        );
        stream.write_all(response.as_bytes()).await?;
        stream.flush().await
    }

    async fn start_mock_server(
        outcomes: Vec<MockOutcome>,
    ) -> (
        String,
        Arc<TokioMutex<Vec<CapturedRequest>>>,
        tokio::task::JoinHandle<()>,
    ) {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("listener addr");
        let captured = Arc::new(TokioMutex::new(Vec::<CapturedRequest>::new()));
        let mut scripted = VecDeque::from(outcomes);
        let captured_clone = Arc::clone(&captured);

        // The client under test is strictly sequential, so connections are
        // handled inline to keep the scripted outcomes in order.
        let handle = tokio::spawn(async move {
            loop {
                let (mut stream, _) = match listener.accept().await {
                    Ok(value) => value,
                    Err(_) => break,
                };
                let Some((path, headers, body)) = read_http_request(&mut stream).await else {
                    continue;
                };
                captured_clone.lock().await.push(CapturedRequest {
                    path,
                    api_key: headers.get("api-key").cloned(),
                    authorization: headers.get("authorization").cloned(),
                    body,
                });

                match scripted.pop_front().unwrap_or(MockOutcome::Respond {
                    status: 500,
                    body: api_error_body("Internal", "unexpected request"),
                }) {
                    MockOutcome::DropConnection => {}
                    MockOutcome::Respond { status, body } => {
                        let _ = write_http_response(&mut stream, status, &body).await;
                    }
                }
            }
        });

        (format!("http://{}", addr), captured, handle)
    }

    fn client_with_key(base_url: &str) -> IterableClient {
        IterableClient::new(base_url, Authenticator::api_key("abc"), test_policy())
    }

    #[tokio::test]
    async fn transient_status_is_retried_until_success() {
        let (base_url, captured, server) = start_mock_server(vec![
            MockOutcome::Respond { status: 503, body: api_error_body("Unavailable", "try later") },
            MockOutcome::Respond { status: 503, body: api_error_body("Unavailable", "try later") },
            MockOutcome::Respond { status: 200, body: success_body() },
        ])
        .await;

        let client = client_with_key(&base_url);
        let outcome = client.update_user("ada@example.com", json!({"plan_type": "pro"})).await;

        assert!(outcome.succeeded);
        assert_eq!(outcome.class, OutcomeClass::Success);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(captured.lock().await.len(), 3);

        server.abort();
    }

    #[tokio::test]
    async fn permanent_client_error_fails_after_single_attempt() {
        let (base_url, captured, server) = start_mock_server(vec![MockOutcome::Respond {
            status: 404,
            body: api_error_body("UnknownEmail", "no such user"),
        }])
        .await;

        let client = client_with_key(&base_url);
        let outcome = client.track_event("ada@example.com", "page_view", json!({})).await;

        assert!(!outcome.succeeded);
        assert_eq!(outcome.class, OutcomeClass::ClientError);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(captured.lock().await.len(), 1);

        server.abort();
    }

    #[tokio::test]
    async fn success_status_with_failing_application_code_is_permanent() {
        let (base_url, captured, server) = start_mock_server(vec![MockOutcome::Respond {
            status: 200,
            body: api_error_body("BadApiKey", "invalid key"),
        }])
        .await;

        let client = client_with_key(&base_url);
        let outcome = client.update_user("ada@example.com", json!({})).await;

        assert!(!outcome.succeeded);
        assert_eq!(outcome.class, OutcomeClass::ClientError);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(
            outcome.response.get("code").and_then(Value::as_str),
            Some("BadApiKey")
        );
        assert_eq!(captured.lock().await.len(), 1);

        server.abort();
    }

    #[tokio::test]
    async fn exhausted_retries_carry_last_error_detail() {
        let (base_url, captured, server) = start_mock_server(vec![
            MockOutcome::Respond { status: 503, body: api_error_body("Unavailable", "a") },
            MockOutcome::Respond { status: 503, body: api_error_body("Unavailable", "b") },
            MockOutcome::Respond { status: 503, body: api_error_body("Unavailable", "final") },
        ])
        .await;

        let client = client_with_key(&base_url);
        let outcome = client.update_user("ada@example.com", json!({})).await;

        assert!(!outcome.succeeded);
        assert_eq!(outcome.class, OutcomeClass::ExhaustedRetries);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(
            outcome.response.get("msg").and_then(Value::as_str),
            Some("final")
        );
        assert_eq!(captured.lock().await.len(), 3);

        server.abort();
    }

    #[tokio::test]
    async fn dropped_connection_is_retried_as_transient() {
        let (base_url, captured, server) = start_mock_server(vec![
            MockOutcome::DropConnection,
            MockOutcome::Respond { status: 200, body: success_body() },
        ])
        .await;

        let client = client_with_key(&base_url);
        let outcome = client.update_user("ada@example.com", json!({})).await;

        assert!(outcome.succeeded);
        assert_eq!(outcome.attempts, 2);
        assert_eq!(captured.lock().await.len(), 2);

        server.abort();
    }

    #[tokio::test]
    async fn static_key_header_is_attached_to_every_attempt() {
        let (base_url, captured, server) = start_mock_server(vec![
            MockOutcome::Respond { status: 503, body: api_error_body("Unavailable", "x") },
            MockOutcome::Respond { status: 200, body: success_body() },
        ])
        .await;

        let client = client_with_key(&base_url);
        let outcome = client.update_user("ada@example.com", json!({})).await;
        assert!(outcome.succeeded);

        let requests = captured.lock().await.clone();
        assert_eq!(requests.len(), 2);
        for request in &requests {
            assert_eq!(request.api_key.as_deref(), Some("abc"));
            assert!(request.authorization.is_none());
        }

        server.abort();
    }

    #[tokio::test]
    async fn signed_token_header_is_a_bearer_token() {
        let (base_url, captured, server) = start_mock_server(vec![MockOutcome::Respond {
            status: 200,
            body: success_body(),
        }])
        .await;

        let auth = Authenticator::signed_token("topsecret", 3600).expect("auth");
        let client = IterableClient::new(&base_url, auth, test_policy());
        let outcome = client.update_user("ada@example.com", json!({})).await;
        assert!(outcome.succeeded);

        let requests = captured.lock().await.clone();
        assert_eq!(requests.len(), 1);
        let authorization = requests[0].authorization.clone().expect("bearer header");
        assert!(authorization.starts_with("Bearer "));
        assert!(requests[0].api_key.is_none());

        server.abort();
    }

    #[tokio::test]
    async fn process_user_calls_both_endpoints_even_after_failure() {
        let (base_url, captured, server) = start_mock_server(vec![
            MockOutcome::Respond { status: 400, body: api_error_body("InvalidEmail", "bad") },
            MockOutcome::Respond { status: 200, body: success_body() },
        ])
        .await;

        let client = client_with_key(&base_url);
        let outcome = client.process_user(&test_record("ada@example.com")).await;

        assert!(!outcome.profile_update.succeeded);
        assert!(outcome.event_track.succeeded);
        assert!(!outcome.overall_success);

        let requests = captured.lock().await.clone();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].path, "/api/users/update");
        assert_eq!(requests[1].path, "/api/events/track");

        let profile: Value = serde_json::from_str(&requests[0].body).expect("profile payload");
        assert_eq!(profile["email"], "ada@example.com");
        assert_eq!(profile["dataFields"]["plan_type"], "pro");
        assert_eq!(profile["dataFields"]["recent_page_view"], true);

        let event: Value = serde_json::from_str(&requests[1].body).expect("event payload");
        assert_eq!(event["eventName"], "page_view");
        // the event payload reports the device class under `browser`
        assert_eq!(event["dataFields"]["browser"], "desktop");
        assert_eq!(event["dataFields"]["page"], "pricing");

        server.abort();
    }

    #[tokio::test]
    async fn record_without_email_fails_without_touching_the_network() {
        let (base_url, captured, server) = start_mock_server(vec![]).await;

        let client = client_with_key(&base_url);
        let outcome = client.process_user(&test_record("")).await;

        assert!(!outcome.overall_success);
        assert!(!outcome.profile_update.succeeded);
        assert!(!outcome.event_track.succeeded);
        assert_eq!(outcome.profile_update.attempts, 0);
        assert!(captured.lock().await.is_empty());

        server.abort();
    }

    #[tokio::test]
    async fn all_success_batch_tallies_full_success() {
        let responses = std::iter::repeat_with(|| MockOutcome::Respond {
            status: 200,
            body: success_body(),
        })
        .take(6)
        .collect();
        let (base_url, _captured, server) = start_mock_server(responses).await;

        let client = client_with_key(&base_url);
        let mut report = SyncReport::new();
        for email in ["a@x.co", "b@x.co", "c@x.co"] {
            report.push(client.process_user(&test_record(email)).await);
        }

        assert_eq!(report.total_users, 3);
        assert_eq!(report.successful, 3);
        assert_eq!(report.partial_failures, 0);
        assert_eq!(report.total_failures, 0);

        server.abort();
    }

    #[tokio::test]
    async fn row_failure_does_not_abort_subsequent_rows() {
        let (base_url, _captured, server) = start_mock_server(vec![
            // row 1: both succeed
            MockOutcome::Respond { status: 200, body: success_body() },
            MockOutcome::Respond { status: 200, body: success_body() },
            // row 2: event tracking rejected outright
            MockOutcome::Respond { status: 200, body: success_body() },
            MockOutcome::Respond { status: 404, body: api_error_body("UnknownEmail", "gone") },
            // row 3: both succeed
            MockOutcome::Respond { status: 200, body: success_body() },
            MockOutcome::Respond { status: 200, body: success_body() },
        ])
        .await;

        let client = client_with_key(&base_url);
        let mut report = SyncReport::new();
        for email in ["a@x.co", "b@x.co", "c@x.co"] {
            report.push(client.process_user(&test_record(email)).await);
        }

        assert_eq!(report.total_users, 3);
        assert_eq!(report.successful, 2);
        assert_eq!(report.partial_failures, 1);
        assert_eq!(report.total_failures, 0);

        let failed_row = &report.records[1];
        assert!(!failed_row.overall_success);
        assert_eq!(failed_row.event_track.attempts, 1);
        assert_eq!(failed_row.event_track.class, OutcomeClass::ClientError);
        assert!(report.records[2].overall_success);

        server.abort();
    }
}
