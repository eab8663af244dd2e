use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use stomper::dispatcher::RetryConfig;
use stomper::http::{HttpResponse, MockHttpClient, ReqwestHttpClient};
use stomper::{Classification, JobOutcome, Spray, SprayConfig, StomperError};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Word lists written to a temporary directory.
struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new(users: &str, passwords: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        for (name, contents) in [("users.txt", users), ("passwords.txt", passwords)] {
            let mut file = std::fs::File::create(dir.path().join(name)).unwrap();
            file.write_all(contents.as_bytes()).unwrap();
        }
        Self { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn config(&self, target: &str) -> SprayConfig {
        let mut config = SprayConfig::new(
            self.path("users.txt"),
            self.path("passwords.txt"),
            target,
            vec!["user:{USER}".to_string(), "pass:{PASS}".to_string()],
        );
        config.failure_status = Some(401);
        config.dispatcher.status_log_interval_ms = None;
        config
    }
}

const TARGET: &str = "https://app.example.com/login";

#[test_log::test(tokio::test)]
async fn test_every_combination_sent_in_order() {
    let fixture = Fixture::new("u1\nu2\n", "p1\np2\n");
    let mut config = fixture.config(TARGET);
    config.dispatcher.concurrency = 1;
    let spray = Spray::load(config).await.unwrap();
    assert_eq!(spray.total_jobs(), 4);

    let mock = MockHttpClient::new();
    mock.set_default_response(HttpResponse::new(401, "invalid"));

    let mut outcomes: Vec<JobOutcome> = Vec::new();
    let stats = spray
        .run(Arc::new(mock.clone()), CancellationToken::new(), |o| {
            outcomes.push(o)
        })
        .await
        .unwrap();

    assert_eq!(stats.launched, 4);
    assert_eq!(stats.expected_failures, 4);
    assert_eq!(outcomes.len(), 4);

    let sent: Vec<(String, String, String)> = mock
        .get_calls()
        .into_iter()
        .map(|call| (call.username, call.password, call.body))
        .collect();
    assert_eq!(
        sent,
        vec![
            ("u1".into(), "p1".into(), "user=u1&pass=p1".into()),
            ("u1".into(), "p2".into(), "user=u1&pass=p2".into()),
            ("u2".into(), "p1".into(), "user=u2&pass=p1".into()),
            ("u2".into(), "p2".into(), "user=u2&pass=p2".into()),
        ]
    );
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_launches_are_staggered_by_interval() {
    let fixture = Fixture::new("alice\nbob\n", "a\nb\nc\n");
    let mut config = fixture.config(TARGET);
    config.interval_ms = Some(100);
    let spray = Spray::load(config).await.unwrap();

    let mock = MockHttpClient::new();
    mock.set_default_response(HttpResponse::new(401, ""));
    // Each request outlives the interval so launches overlap
    mock.set_default_delay(Duration::from_millis(250));

    let start = Instant::now();
    let stats = spray
        .run(Arc::new(mock.clone()), CancellationToken::new(), |_| {})
        .await
        .unwrap();
    assert_eq!(stats.completed, 6);

    let calls = mock.get_calls();
    assert_eq!(calls.len(), 6);
    for call in &calls {
        let offset = call.started_at.duration_since(start);
        assert!(
            offset >= Duration::from_millis(call.index * 100),
            "job {} started after {:?}",
            call.index,
            offset
        );
    }
    assert!(mock.peak_in_flight() > 1, "staggering must not serialize jobs");
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_in_flight_never_exceeds_concurrency() {
    let users: String = (0..5).map(|i| format!("user{}\n", i)).collect();
    let passwords: String = (0..4).map(|i| format!("pw{}\n", i)).collect();
    let fixture = Fixture::new(&users, &passwords);
    let mut config = fixture.config(TARGET);
    config.dispatcher.concurrency = 3;
    let spray = Spray::load(config).await.unwrap();

    let mock = MockHttpClient::new();
    mock.set_default_response(HttpResponse::new(401, ""));
    mock.set_default_delay(Duration::from_millis(50));

    let stats = spray
        .run(Arc::new(mock.clone()), CancellationToken::new(), |_| {})
        .await
        .unwrap();

    assert_eq!(stats.completed, 20);
    assert_eq!(mock.peak_in_flight(), 3);
    assert_eq!(mock.in_flight_count(), 0);
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_retry_resubmits_identical_body() {
    let fixture = Fixture::new("admin\n", "hunter2\n");
    let mut config = fixture.config(TARGET);
    config.dispatcher.retry = RetryConfig {
        max_retries: 2,
        backoff_ms: 100,
        backoff_factor: 2,
        max_backoff_ms: 1000,
    };
    let spray = Spray::load(config).await.unwrap();

    let mock = MockHttpClient::new();
    mock.add_response("admin:hunter2", Ok(HttpResponse::new(429, "slow down")));
    mock.add_response("admin:hunter2", Ok(HttpResponse::new(200, "welcome")));

    let mut outcomes = Vec::new();
    let stats = spray
        .run(Arc::new(mock.clone()), CancellationToken::new(), |o| {
            outcomes.push(o)
        })
        .await
        .unwrap();

    assert_eq!(stats.retries, 1);
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].result.status, Some(200));
    assert_eq!(outcomes[0].result.attempts, 2);
    assert_eq!(outcomes[0].classification, Classification::Notable);

    let calls = mock.get_calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].body, calls[1].body);
    assert!(calls[1].started_at.duration_since(calls[0].started_at) >= Duration::from_millis(100));
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_cancellation_stops_launching() {
    let users: String = (0..10).map(|i| format!("user{}\n", i)).collect();
    let fixture = Fixture::new(&users, "password\n");
    let mut config = fixture.config(TARGET);
    config.interval_ms = Some(1000);
    let spray = Spray::load(config).await.unwrap();

    let mock = MockHttpClient::new();
    mock.set_default_response(HttpResponse::new(401, ""));

    let token = CancellationToken::new();
    let cancel = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(2500)).await;
        cancel.cancel();
    });

    let mut outcomes = Vec::new();
    let stats = spray
        .run(Arc::new(mock.clone()), token, |o| outcomes.push(o))
        .await
        .unwrap();

    assert!(stats.cancelled);
    assert_eq!(stats.launched, 3);
    assert_eq!(mock.call_count(), 3);
    assert_eq!(outcomes.len(), 3);
}

#[test_log::test(tokio::test)]
async fn test_startup_errors_before_any_request() {
    let fixture = Fixture::new("alice\n", "");

    // Empty password list
    let err = Spray::load(fixture.config(TARGET)).await.err().unwrap();
    assert!(matches!(err, StomperError::EmptyWordList { .. }));
    assert!(err.is_startup());

    // Missing user list
    let mut missing = fixture.config(TARGET);
    missing.user_file = fixture.path("nope.txt");
    let err = Spray::load(missing).await.err().unwrap();
    assert!(matches!(err, StomperError::Io { .. }));

    // Template without a delimiter
    let mut malformed = fixture.config(TARGET);
    malformed.form_fields = vec!["userUSER".to_string()];
    let err = Spray::load(malformed).await.err().unwrap();
    assert!(matches!(err, StomperError::MalformedTemplate(ref t) if t == "userUSER"));

    // Bad target
    let err = Spray::load(fixture.config("not a url")).await.err().unwrap();
    assert!(matches!(err, StomperError::InvalidTarget(_)));
}

/// Serve form logins over plain HTTP/1.1, accepting only `pass=secret`.
async fn spawn_login_server() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                let body = loop {
                    let n = stream.read(&mut buf).await.unwrap_or(0);
                    if n == 0 {
                        return;
                    }
                    request.extend_from_slice(&buf[..n]);
                    let text = String::from_utf8_lossy(&request).to_string();
                    let Some((head, body)) = text.split_once("\r\n\r\n") else {
                        continue;
                    };
                    let length = head
                        .lines()
                        .find_map(|line| {
                            let (name, value) = line.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())
                                .flatten()
                        })
                        .unwrap_or(0);
                    if body.len() >= length {
                        break body.to_string();
                    }
                };

                let (status, payload) = if body.split('&').any(|pair| pair == "pass=secret") {
                    ("200 OK", r#"{"token":"abc"}"#)
                } else {
                    ("401 Unauthorized", r#"{"error":"invalid credentials"}"#)
                };
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    payload.len(),
                    payload
                );
                let _ = stream.write_all(response.as_bytes()).await;
            });
        }
    });

    format!("http://{}/login", addr)
}

#[test_log::test(tokio::test)]
async fn test_real_http_classification() {
    let target = spawn_login_server().await;
    let fixture = Fixture::new("alice\nbob\n", "guess\nsecret\n");
    let mut config = fixture.config(&target);
    config.failure_status = None;
    config.failure_message = Some("invalid credentials".to_string());
    let spray = Spray::load(config).await.unwrap();

    let mut outcomes = Vec::new();
    let stats = spray
        .run(
            Arc::new(ReqwestHttpClient::new().unwrap()),
            CancellationToken::new(),
            |o| outcomes.push(o),
        )
        .await
        .unwrap();

    assert_eq!(stats.completed, 4);
    assert_eq!(stats.expected_failures, 2);
    assert_eq!(stats.notable, 2);

    let mut notable: Vec<String> = outcomes
        .iter()
        .filter(|o| o.is_notable())
        .map(|o| {
            assert_eq!(o.result.status, Some(200));
            assert!(o.result.body.is_json());
            o.result.credential.username.clone()
        })
        .collect();
    notable.sort();
    assert_eq!(notable, vec!["alice".to_string(), "bob".to_string()]);
}

#[test_log::test(tokio::test)]
async fn test_unreachable_target_reports_every_job() {
    // Bind then drop to get a port nothing listens on
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let fixture = Fixture::new("alice\nbob\n", "one\ntwo\n");
    let mut config = fixture.config(&format!("http://127.0.0.1:{}/login", port));
    config.dispatcher.timeout_ms = 2000;
    let spray = Spray::load(config).await.unwrap();

    let mut outcomes = Vec::new();
    let stats = spray
        .run(
            Arc::new(ReqwestHttpClient::new().unwrap()),
            CancellationToken::new(),
            |o| outcomes.push(o),
        )
        .await
        .unwrap();

    assert_eq!(stats.completed, 4);
    assert_eq!(stats.transport_errors, 4);
    assert!(outcomes.iter().all(|o| o.is_notable() && o.result.status.is_none()));
}
