//! Scenario 5 (long-running via InProgressMarker): a handler reports
//! IN_PROGRESS twice before completing; the runner must update the
//! server with IN_PROGRESS, IN_PROGRESS, COMPLETED in order, and the
//! handler must observe pollCount incrementing to 3 by the last call.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use conductor_worker::application::event_bus::EventBus;
use conductor_worker::application::runner::Runner;
use conductor_worker::domain::models::config::ResolvedOptions;
use conductor_worker::domain::models::handler::{HandlerOutcome, TypedHandler};
use conductor_worker::infrastructure::http::client::{ClientConfig, ServerClientImpl};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::watch;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Debug, Deserialize, JsonSchema)]
struct Empty {}

async fn mount_token_endpoint(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "token": "test-token" })))
        .mount(server)
        .await;
}

fn task_json(poll_count: u32) -> Value {
    serde_json::json!({
        "taskId": "t-1",
        "workflowInstanceId": "w-1",
        "taskDefName": "long_running",
        "inputData": {},
        "pollCount": poll_count,
        "retryCount": 0,
    })
}

#[tokio::test]
async fn in_progress_marker_drives_requeue_until_completion() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server).await;

    // The server re-queues the task with an incrementing pollCount each
    // time the worker reports IN_PROGRESS.
    Mock::given(method("POST"))
        .and(path("/api/tasks/poll/batch/long_running"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![task_json(1)]))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/tasks/poll/batch/long_running"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![task_json(2)]))
        .up_to_n_times(1)
        .with_priority(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/tasks/poll/batch/long_running"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![task_json(3)]))
        .up_to_n_times(1)
        .with_priority(3)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/tasks/poll/batch/long_running"))
        .respond_with(ResponseTemplate::new(200).set_body_string(""))
        .with_priority(10)
        .mount(&server)
        .await;

    let statuses: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    {
        let statuses = statuses.clone();
        Mock::given(method("POST")).and(path("/api/tasks")).respond_with(move |req: &wiremock::Request| {
            let body: Value = serde_json::from_slice(&req.body).unwrap();
            statuses.lock().unwrap().push(body.get("status").unwrap().as_str().unwrap().to_string());
            ResponseTemplate::new(200).set_body_string("ok")
        })
        .mount(&server)
        .await;
    }

    let client = Arc::new(ServerClientImpl::new(ClientConfig {
        base_url: server.uri(),
        key_id: "id".into(),
        key_secret: "secret".into(),
        request_timeout: Duration::from_secs(5),
        pool_max_idle_per_host: 4,
    }));

    let last_poll_count = Arc::new(AtomicUsize::new(0));
    let invocation_count = Arc::new(AtomicUsize::new(0));
    let handler = {
        let invocation_count = invocation_count.clone();
        let last_poll_count = last_poll_count.clone();
        TypedHandler::<Empty, Value>::blocking("long_running", 1, move |ctx, _input| {
            last_poll_count.store(ctx.poll_count as usize, Ordering::SeqCst);
            let n = invocation_count.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Ok(HandlerOutcome::InProgress { output: serde_json::json!({"progress": 50}), callback_after_seconds: 30 })
            } else {
                Ok(HandlerOutcome::Completed(serde_json::json!({"progress": 100})))
            }
        })
        .into_handler()
    };

    let events = EventBus::new();
    let options = ResolvedOptions { poll_interval_millis: 10, max_concurrent: 1, ..ResolvedOptions::default() };
    let runner = Runner::new(handler, client, options, events);

    let (stop_tx, stop_rx) = watch::channel(false);
    let run_handle = tokio::spawn(async move { runner.run(stop_rx).await });

    tokio::time::sleep(Duration::from_millis(300)).await;
    stop_tx.send(true).unwrap();
    run_handle.await.unwrap();

    assert_eq!(last_poll_count.load(Ordering::SeqCst), 3, "last observed pollCount should be 3");
    let recorded_statuses = statuses.lock().unwrap();
    assert_eq!(*recorded_statuses, vec!["IN_PROGRESS", "IN_PROGRESS", "COMPLETED"]);
}
