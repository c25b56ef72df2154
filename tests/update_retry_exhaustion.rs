//! Scenario 3 (update retry exhaustion): `update_task` fails all four
//! attempts; expect a TaskUpdateFailure event carrying the full result.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use conductor_worker::application::event_bus::{EventBus, EventListener};
use conductor_worker::application::runner::Runner;
use conductor_worker::domain::models::config::ResolvedOptions;
use conductor_worker::domain::models::event::Event;
use conductor_worker::domain::models::handler::{HandlerOutcome, TypedHandler};
use conductor_worker::infrastructure::http::client::{ClientConfig, ServerClientImpl};
use schemars::JsonSchema;
use serde::Deserialize;
use tokio::sync::watch;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Debug, Deserialize, JsonSchema)]
struct NumInput {
    x: i64,
}

#[derive(Default)]
struct Recorder(Mutex<Vec<Event>>);
impl EventListener for Recorder {
    fn on_event(&self, event: &Event) {
        self.0.lock().unwrap().push(event.clone());
    }
}

async fn mount_token_endpoint(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "token": "test-token" })))
        .mount(server)
        .await;
}

#[tokio::test]
#[ignore] // real-time: the 10s/20s/30s retry schedule makes this a ~60s test
async fn exhausting_update_retries_emits_task_update_failure() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server).await;

    let task = serde_json::json!({
        "taskId": "t-1",
        "workflowInstanceId": "w-1",
        "taskDefName": "echo",
        "inputData": {"x": 1},
        "pollCount": 1,
        "retryCount": 0,
    });

    Mock::given(method("POST"))
        .and(path("/api/tasks/poll/batch/echo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![task]))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/tasks/poll/batch/echo"))
        .respond_with(ResponseTemplate::new(200).set_body_string(""))
        .with_priority(10)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/tasks"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let client = Arc::new(ServerClientImpl::new(ClientConfig {
        base_url: server.uri(),
        key_id: "id".into(),
        key_secret: "secret".into(),
        request_timeout: Duration::from_secs(5),
        pool_max_idle_per_host: 4,
    }));

    let handler = TypedHandler::<NumInput, serde_json::Value>::blocking("echo", 1, |_ctx, input| {
        Ok(HandlerOutcome::Completed(serde_json::json!({ "x": input.x })))
    })
    .into_handler();

    let events = EventBus::new();
    let recorder = Arc::new(Recorder::default());
    events.subscribe(recorder.clone());

    let options = ResolvedOptions { poll_interval_millis: 20, max_concurrent: 1, ..ResolvedOptions::default() };
    let runner = Runner::new(handler, client, options, events);

    let (stop_tx, stop_rx) = watch::channel(false);
    let started_at = Instant::now();
    let run_handle = tokio::spawn(async move { runner.run(stop_rx).await });

    // Three waits of 10s, 20s, 30s separate the four attempts; give the
    // test a generous ceiling well above that before giving up.
    let deadline = Duration::from_secs(65);
    loop {
        if started_at.elapsed() > deadline {
            break;
        }
        let has_failure = recorder.0.lock().unwrap().iter().any(|e| matches!(e, Event::TaskUpdateFailure { .. }));
        if has_failure {
            break;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    stop_tx.send(true).unwrap();
    run_handle.await.unwrap();

    let recorded = recorder.0.lock().unwrap();
    let failure = recorded.iter().find_map(|e| match e {
        Event::TaskUpdateFailure { attempts, task_result, .. } => Some((*attempts, task_result.clone())),
        _ => None,
    });
    let (attempts, result) = failure.expect("expected a TaskUpdateFailure event");
    assert_eq!(attempts, 4);
    assert_eq!(result.output_data.get("x"), Some(&serde_json::json!(1)));
}
