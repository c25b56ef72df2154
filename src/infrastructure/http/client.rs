//! `ServerClient` implementation backed by `reqwest`.
//!
//! Grounded on the teacher's `infrastructure/claude/client.rs`
//! (`ClaudeClientImpl`): one pooled `reqwest::Client`, connection reuse
//! via `pool_max_idle_per_host`/`tcp_nodelay`, and a single configured
//! request timeout shared by every call this client makes.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::Value;

use super::auth::{CredentialCache, TokenEndpoint};
use super::error::HttpError;
use crate::domain::models::task::{TaskInstance, TaskResult};
use crate::domain::ports::{ServerClient, TaskDef};

/// Connection/timeout configuration for [`ServerClientImpl`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub key_id: String,
    pub key_secret: String,
    pub request_timeout: Duration,
    pub pool_max_idle_per_host: usize,
}

pub struct ServerClientImpl {
    http: Client,
    base_url: String,
    credentials: CredentialCache<TokenEndpoint>,
}

impl ServerClientImpl {
    /// Build a client with one pooled `reqwest::Client` shared across every
    /// request this worker issues.
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .tcp_nodelay(true)
            .build()
            .expect("reqwest client configuration is static and always valid");

        let token_endpoint = TokenEndpoint::new(http.clone(), config.base_url.clone(), config.key_id, config.key_secret);

        Self {
            http,
            base_url: config.base_url,
            credentials: CredentialCache::new(token_endpoint),
        }
    }

    /// Attach the cached credential, send, and on a 401 discard it, refresh
    /// once, and retry exactly once more with the freshly acquired credential.
    async fn send_authorized<F>(&self, build: F) -> Result<Response, HttpError>
    where
        F: Fn(&str) -> RequestBuilder,
    {
        let token = self.credentials.token().await?;
        let response = build(&token).send().await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let token = self.credentials.refresh().await?;
        Ok(build(&token).send().await?)
    }

    async fn ensure_success(response: Response) -> Result<(), HttpError> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(HttpError::from_status(status, body))
    }
}

#[async_trait]
impl ServerClient for ServerClientImpl {
    async fn batch_poll(
        &self,
        task_type: &str,
        worker_id: &str,
        count: usize,
        timeout_millis: u64,
        domain: Option<&str>,
    ) -> Result<Vec<TaskInstance>, HttpError> {
        let url = format!("{}/api/tasks/poll/batch/{task_type}", self.base_url);
        let count_str = count.to_string();
        let timeout_str = timeout_millis.to_string();

        let response = self
            .send_authorized(|token| {
                let mut builder = self
                    .http
                    .post(&url)
                    .bearer_auth(token)
                    .query(&[("workerid", worker_id), ("count", count_str.as_str()), ("timeout", timeout_str.as_str())]);
                // Omitted entirely when empty, never sent as an empty string.
                if let Some(domain) = domain.filter(|d| !d.is_empty()) {
                    builder = builder.query(&[("domain", domain)]);
                }
                builder
            })
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HttpError::from_status(status, body));
        }

        let body = response.text().await.map_err(|e| HttpError::Decode(e.to_string()))?;
        if body.trim().is_empty() {
            // A 2xx with an empty body means no tasks were available, not an error.
            return Ok(Vec::new());
        }
        serde_json::from_str(&body).map_err(|e| HttpError::Decode(e.to_string()))
    }

    async fn update_task(&self, result: &TaskResult) -> Result<String, HttpError> {
        let url = format!("{}/api/tasks", self.base_url);
        let response = self.send_authorized(|token| self.http.post(&url).bearer_auth(token).json(result)).await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HttpError::from_status(status, body));
        }
        response.text().await.map_err(|e| HttpError::Decode(e.to_string()))
    }

    async fn register_task_definition(&self, def: &TaskDef, overwrite: bool) -> Result<(), HttpError> {
        if !overwrite {
            let check_url = format!("{}/api/metadata/taskdefs/{}", self.base_url, def.name);
            let existing = self.send_authorized(|token| self.http.get(&check_url).bearer_auth(token)).await?;
            if existing.status().is_success() {
                return Ok(());
            }
        }

        let url = format!("{}/api/metadata/taskdefs", self.base_url);
        let response = self
            .send_authorized(|token| self.http.post(&url).bearer_auth(token).json(std::slice::from_ref(def)))
            .await?;
        Self::ensure_success(response).await
    }

    async fn register_schema(&self, name: &str, version: u32, body: &Value) -> Result<(), HttpError> {
        let url = format!("{}/api/schema", self.base_url);
        let envelope = serde_json::json!({
            "name": name,
            "version": version,
            "type": "JSON",
            "data": body,
        });
        let response = self.send_authorized(|token| self.http.post(&url).bearer_auth(token).json(&envelope)).await?;
        Self::ensure_success(response).await
    }
}
