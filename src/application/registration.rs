//! Registration Helper: push a handler's task definition and
//! schemas to the server before its runner starts polling.
//!
//! Grounded on the teacher's `task_coordinator.rs` startup sequence,
//! which performs a comparable "push declarative metadata, log and
//! continue on failure" step before entering its main loop.

use std::sync::Arc;

use serde_json::Value;

use crate::domain::models::config::ResolvedOptions;
use crate::domain::models::handler::Handler;
use crate::domain::ports::{ServerClient, TaskDef};

/// Run the registration steps for `handler`. Any HTTP failure is
/// logged at WARN and swallowed; the caller proceeds to poll regardless.
pub async fn register_handler(handler: &Arc<dyn Handler>, client: &Arc<dyn ServerClient>, options: &ResolvedOptions) {
    let task_type = handler.task_type();

    let input_schema = handler.input_schema(options.strict_schema);
    let output_schema = handler.output_schema(options.strict_schema);

    if let Some(schema) = &input_schema {
        register_schema_quietly(client, &format!("{task_type}_input"), schema).await;
    }
    if let Some(schema) = &output_schema {
        register_schema_quietly(client, &format!("{task_type}_output"), schema).await;
    }

    let mut def = TaskDef::minimal(task_type);
    if input_schema.is_some() {
        def.input_keys = schema_property_names(input_schema.as_ref());
    }
    if output_schema.is_some() {
        def.output_keys = schema_property_names(output_schema.as_ref());
    }

    if let Err(err) = client.register_task_definition(&def, options.overwrite_task_def).await {
        tracing::warn!(task_type, error = %err, "failed to register task definition; continuing without it");
    }
}

async fn register_schema_quietly(client: &Arc<dyn ServerClient>, name: &str, schema: &Value) {
    if let Err(err) = client.register_schema(name, 1, schema).await {
        tracing::warn!(schema = name, error = %err, "failed to register schema; continuing without it");
    }
}

/// Best-effort extraction of a generated schema's top-level property
/// names, used to populate `TaskDef::input_keys`/`output_keys`.
fn schema_property_names(schema: Option<&Value>) -> Option<Vec<String>> {
    schema?.get("properties")?.as_object().map(|props| props.keys().cloned().collect())
}
