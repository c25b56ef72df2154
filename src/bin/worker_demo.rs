//! Demo binary wiring a couple of handlers into the Supervisor as a
//! run-until-signalled entry point.
//!
//! Grounded on the teacher's `main.rs` daemon-mode entry point: read
//! configuration from the environment, build the port implementations,
//! register handlers, and run until Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use conductor_worker::domain::models::handler::{HandlerOutcome, TypedHandler};
use conductor_worker::domain::ports::ServerClient;
use conductor_worker::infrastructure::http::client::{ClientConfig, ServerClientImpl};
use conductor_worker::infrastructure::logging;
use conductor_worker::{application::event_bus::EventBus, application::supervisor::Supervisor};
use schemars::JsonSchema;
use serde::Deserialize;
use tokio::sync::watch;

#[derive(Debug, Deserialize, JsonSchema)]
struct GreetInput {
    name: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    let server_url = std::env::var("CONDUCTOR_SERVER_URL").unwrap_or_else(|_| "http://localhost:8080".to_string());
    let key_id = std::env::var("CONDUCTOR_AUTH_KEY_ID").unwrap_or_default();
    let key_secret = std::env::var("CONDUCTOR_AUTH_KEY_SECRET").unwrap_or_default();

    let client: Arc<dyn ServerClient> = Arc::new(ServerClientImpl::new(ClientConfig {
        base_url: server_url,
        key_id,
        key_secret,
        request_timeout: Duration::from_secs(30),
        pool_max_idle_per_host: 8,
    }));

    let greet = TypedHandler::<GreetInput, String>::blocking("greet", 4, |ctx, input| {
        ctx.log(format!("greeting {}", input.name));
        Ok(HandlerOutcome::Completed(format!("Hello {}", input.name)))
    })
    .into_handler();

    let (stop_tx, stop_rx) = watch::channel(false);
    let supervisor = Supervisor::new(client, EventBus::new()).discover(vec![greet]);
    let handles = supervisor.run(stop_rx).await;

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received, stopping runners");
    stop_tx.send(true)?;

    for handle in handles {
        let _ = handle.await;
    }

    Ok(())
}
