//! Pipeline tests against in-process transports.

use async_trait::async_trait;
use http::HeaderMap;
use restbind::{
    ApiEvent, Arguments, Backoff, CallOptions, Client, ConnectionSettings, Error, FailureKind,
    RawResponse, Resource, ResourceSchema, ResourceSchemaBuilder, RouteSchema, SchemaProblem,
    Status, Transport, TransportOutcome, TransportRequest,
};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

struct Accounts;

impl Resource for Accounts {
    fn describe() -> ResourceSchemaBuilder {
        ResourceSchema::builder("Accounts")
            .route(RouteSchema::get("get", "{id}").path("id"))
            .route(
                RouteSchema::get("echo", "echo")
                    .query("n")
                    .header("tag", "x-tag"),
            )
    }
}

struct Broken;

impl Resource for Broken {
    fn describe() -> ResourceSchemaBuilder {
        ResourceSchema::builder("Broken")
            .route(RouteSchema::get("get", "{id}"))
            .route(RouteSchema::post("save", "").body("a").body("b"))
            .route(RouteSchema::get("get", "other"))
    }
}

#[derive(Debug, Default, Deserialize, PartialEq)]
struct Echo {
    n: String,
    tag: String,
}

/// Answers every attempt with the same outcome and counts calls.
struct Always {
    outcome: TransportOutcome,
    calls: AtomicUsize,
}

impl Always {
    fn new(outcome: TransportOutcome) -> Arc<Self> {
        Arc::new(Self {
            outcome,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Transport for Always {
    async fn send(&self, _: &TransportRequest) -> TransportOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcome.clone()
    }
}

/// Never answers.
#[derive(Default)]
struct Hanging {
    calls: AtomicUsize,
}

#[async_trait]
impl Transport for Hanging {
    async fn send(&self, _: &TransportRequest) -> TransportOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::future::pending::<()>().await;
        TransportOutcome::TimedOut
    }
}

/// Echoes the `n` query value and `x-tag` header back as JSON.
#[derive(Default)]
struct Echoing {
    ids: Mutex<Vec<String>>,
}

#[async_trait]
impl Transport for Echoing {
    async fn send(&self, request: &TransportRequest) -> TransportOutcome {
        self.ids.lock().unwrap().push(request.request_id.to_string());

        let n = request
            .url
            .query_pairs()
            .find(|(key, _)| key == "n")
            .map(|(_, value)| value.into_owned())
            .unwrap_or_default();
        let tag = request
            .headers
            .get("x-tag")
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();

        tokio::task::yield_now().await;

        let body = serde_json::json!({ "n": n, "tag": tag }).to_string();
        TransportOutcome::Completed(RawResponse::new(200, HeaderMap::new(), body))
    }
}

fn settings(retry_attempts: u32) -> ConnectionSettings {
    ConnectionSettings::builder()
        .base_address("http://accounts.test/")
        .unwrap()
        .timeout(Duration::from_secs(5))
        .retry_attempts(retry_attempts)
        .build()
        .unwrap()
}

fn shared(
    transport: Arc<dyn Transport>,
) -> impl Fn(&ConnectionSettings) -> restbind::Result<Arc<dyn Transport>> {
    move |_| Ok(Arc::clone(&transport))
}

#[tokio::test]
async fn test_timeouts_use_exactly_the_attempt_budget() {
    for budget in [0u32, 1, 3, 5] {
        let transport = Always::new(TransportOutcome::TimedOut);
        let client = Client::builder()
            .settings(settings(budget))
            .transport_factory(shared(transport.clone()))
            .build()
            .unwrap();

        let response = client
            .handle::<Accounts>()
            .unwrap()
            .invoke::<Echo>("get", &Arguments::new().arg("id", 1))
            .await
            .unwrap();

        let expected = budget.max(1) as usize;
        assert_eq!(transport.calls.load(Ordering::SeqCst), expected);
        assert_eq!(response.status(), Status::TimedOut);
        assert_eq!(response.meta().attempts, expected);
    }
}

#[tokio::test]
async fn test_terminal_failures_are_not_retried() {
    let transport = Always::new(TransportOutcome::TerminalFailure("bad request".to_string()));
    let client = Client::builder()
        .settings(settings(5))
        .transport_factory(shared(transport.clone()))
        .build()
        .unwrap();

    let response = client
        .handle::<Accounts>()
        .unwrap()
        .invoke::<Echo>("get", &Arguments::new().arg("id", 1))
        .await
        .unwrap();

    assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    let failure = response.failure().unwrap();
    assert_eq!(failure.status, Status::InvalidRequest);
    assert_eq!(failure.message, "bad request");
}

#[tokio::test]
async fn test_retry_events_carry_backoff() {
    let transport = Always::new(TransportOutcome::TransientFailure("refused".to_string()));
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = {
        let events = Arc::clone(&events);
        move |event: &ApiEvent| events.lock().unwrap().push(event.clone())
    };

    let settings = ConnectionSettings::builder()
        .base_address("http://accounts.test/")
        .unwrap()
        .retry_attempts(2)
        .backoff(Backoff::Fixed(Duration::from_millis(10)))
        .build()
        .unwrap();
    let client = Client::builder()
        .settings(settings)
        .transport_factory(shared(transport.clone()))
        .event_sink(sink)
        .build()
        .unwrap();

    let response = client
        .handle::<Accounts>()
        .unwrap()
        .invoke::<Echo>("get", &Arguments::new().arg("id", 1))
        .await
        .unwrap();

    assert_eq!(response.status(), Status::ConnectionFailure);

    let events = events.lock().unwrap();
    let retries: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            ApiEvent::RetryScheduled {
                next_attempt,
                delay,
                ..
            } => Some((*next_attempt, *delay)),
            _ => None,
        })
        .collect();
    assert_eq!(retries, vec![(2, Some(Duration::from_millis(10)))]);

    let failures = events
        .iter()
        .filter(|event| {
            matches!(
                event,
                ApiEvent::AttemptFailed {
                    kind: FailureKind::ConnectionFailure,
                    ..
                }
            )
        })
        .count();
    assert_eq!(failures, 2);
}

#[tokio::test]
async fn test_cancellation_mid_dispatch() {
    let transport = Arc::new(Hanging::default());
    let client = Client::builder()
        .settings(settings(5))
        .transport_factory(shared(transport.clone()))
        .build()
        .unwrap();
    let accounts = client.handle::<Accounts>().unwrap();

    let token = CancellationToken::new();
    let canceller = {
        let token = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            token.cancel();
        })
    };

    let response = accounts
        .invoke_with::<Echo>(
            "get",
            &Arguments::new().arg("id", 1),
            &CallOptions::new().cancellation(token),
        )
        .await
        .unwrap();
    canceller.await.unwrap();

    assert_eq!(response.status(), Status::Cancelled);
    assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    assert!(matches!(
        response.failure().and_then(|f| f.cause.as_deref()),
        Some(Error::Cancelled)
    ));
}

#[tokio::test]
async fn test_cancelled_before_dispatch_sends_nothing() {
    let transport = Always::new(TransportOutcome::TimedOut);
    let client = Client::builder()
        .settings(settings(3))
        .transport_factory(shared(transport.clone()))
        .build()
        .unwrap();

    let token = CancellationToken::new();
    token.cancel();

    let response = client
        .handle::<Accounts>()
        .unwrap()
        .invoke_with::<Echo>(
            "get",
            &Arguments::new().arg("id", 1),
            &CallOptions::new().cancellation(token),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), Status::Cancelled);
    assert_eq!(response.meta().attempts, 0);
    assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_concurrent_invocations_stay_isolated() {
    let transport = Arc::new(Echoing::default());
    let client = Client::builder()
        .settings(settings(0))
        .transport_factory(shared(transport.clone()))
        .build()
        .unwrap();
    let accounts = client.handle::<Accounts>().unwrap();

    let tasks: Vec<_> = (0..100)
        .map(|i| {
            let accounts = accounts.clone();
            tokio::spawn(async move {
                let args = Arguments::new()
                    .arg("n", i.to_string())
                    .arg("tag", format!("tag-{}", i));
                let response = accounts.invoke::<Echo>("echo", &args).await.unwrap();
                (i, response)
            })
        })
        .collect();

    let mut ids = HashSet::new();
    for task in tasks {
        let (i, response) = task.await.unwrap();
        ids.insert(response.meta().request_id);
        assert_eq!(
            response.into_payload(),
            Some(Echo {
                n: i.to_string(),
                tag: format!("tag-{}", i),
            })
        );
    }

    assert_eq!(ids.len(), 100);
    let sent: HashSet<_> = transport.ids.lock().unwrap().iter().cloned().collect();
    assert_eq!(sent.len(), 100);
}

#[tokio::test]
async fn test_transport_is_built_once_under_concurrent_first_use() {
    let builds = Arc::new(AtomicUsize::new(0));
    let transport = Arc::new(Echoing::default());

    let client = Client::builder()
        .settings(settings(0))
        .transport_factory({
            let builds = Arc::clone(&builds);
            move |_| {
                builds.fetch_add(1, Ordering::SeqCst);
                let transport: Arc<dyn Transport> = transport.clone();
                Ok(transport)
            }
        })
        .build()
        .unwrap();
    let accounts = client.handle::<Accounts>().unwrap();

    let tasks: Vec<_> = (0..20)
        .map(|i| {
            let accounts = accounts.clone();
            tokio::spawn(async move {
                let args = Arguments::new().arg("n", i.to_string());
                accounts.invoke::<Echo>("echo", &args).await.unwrap()
            })
        })
        .collect();

    for task in tasks {
        assert!(task.await.unwrap().is_success());
    }
    assert_eq!(builds.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_schema_errors_surface_before_any_request() {
    let builds = Arc::new(AtomicUsize::new(0));
    let client = Client::builder()
        .settings(settings(0))
        .transport_factory({
            let builds = Arc::clone(&builds);
            move |_| {
                builds.fetch_add(1, Ordering::SeqCst);
                let transport: Arc<dyn Transport> = Arc::new(Echoing::default());
                Ok(transport)
            }
        })
        .build()
        .unwrap();

    let schema = match client.register::<Broken>() {
        Err(Error::Schema(schema)) => schema,
        other => panic!("Expected schema error, got {:?}", other),
    };

    assert_eq!(schema.resource(), "Broken");
    let problems = schema.problems();
    assert!(problems.iter().any(|p| matches!(
        p,
        SchemaProblem::UnmappedPlaceholder { placeholder, .. } if placeholder == "id"
    )));
    assert!(problems
        .iter()
        .any(|p| matches!(p, SchemaProblem::MultipleBodyBindings { count: 2, .. })));
    assert!(problems
        .iter()
        .any(|p| matches!(p, SchemaProblem::DuplicateMethod { method } if method == "get")));

    assert!(client.handle::<Broken>().is_err());
    assert_eq!(builds.load(Ordering::SeqCst), 0);
}
