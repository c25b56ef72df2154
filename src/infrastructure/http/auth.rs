//! Lazy credential acquisition and refresh-failure backoff.
//!
//! Grounded on the teacher's `infrastructure/claude/retry.rs`
//! (`calculate_backoff`: exponential, capped) for the refresh-failure
//! schedule's shape, realized here with the `backoff` crate (already a
//! teacher dependency) instead of the teacher's hand-rolled doubling
//! arithmetic, and on `infrastructure/claude/client.rs`'s single shared
//! `reqwest::Client` for the token endpoint itself.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use backoff::backoff::Backoff;
use backoff::ExponentialBackoffBuilder;
use serde::Deserialize;

use super::error::HttpError;

/// Base-2s, 60s-capped exponential backoff with no jitter, matching §4.2's
/// "exponential backoff with base 2 seconds, capped at 60 seconds" exactly.
fn refresh_backoff() -> backoff::ExponentialBackoff {
    ExponentialBackoffBuilder::new()
        .with_initial_interval(Duration::from_secs(2))
        .with_multiplier(2.0)
        .with_randomization_factor(0.0)
        .with_max_interval(Duration::from_secs(60))
        .with_max_elapsed_time(None)
        .build()
}

/// A credential obtained from the token endpoint.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub token: String,
}

/// Acquires a fresh credential. Implemented by `TokenEndpoint` against the
/// real server; test doubles implement this directly.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn acquire(&self) -> Result<Credentials, HttpError>;
}

/// `POST /token` (or equivalent) with `{keyId, keySecret}` → `{token}`.
pub struct TokenEndpoint {
    http: reqwest::Client,
    base_url: String,
    key_id: String,
    key_secret: String,
}

impl TokenEndpoint {
    #[must_use]
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, key_id: impl Into<String>, key_secret: impl Into<String>) -> Self {
        Self { http, base_url: base_url.into(), key_id: key_id.into(), key_secret: key_secret.into() }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

#[async_trait]
impl CredentialSource for TokenEndpoint {
    async fn acquire(&self) -> Result<Credentials, HttpError> {
        let response = self
            .http
            .post(format!("{}/api/token", self.base_url))
            .json(&serde_json::json!({ "keyId": self.key_id, "keySecret": self.key_secret }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HttpError::from_status(status, body));
        }

        let parsed: TokenResponse = response.json().await.map_err(|e| HttpError::Decode(e.to_string()))?;
        Ok(Credentials { token: parsed.token })
    }
}

/// Caches the current credential and serializes refresh attempts, so a
/// burst of 401 rejections triggers at most one refresh in flight.
pub struct CredentialCache<S: CredentialSource> {
    source: S,
    cached: tokio::sync::Mutex<Option<String>>,
    backoff: Mutex<backoff::ExponentialBackoff>,
    /// Set on a failed refresh; cleared on success. Paired with `backoff`
    /// to decide whether the current refresh-failure window has elapsed.
    last_refresh_failure: Mutex<Option<(Instant, Duration)>>,
}

impl<S: CredentialSource> CredentialCache<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            cached: tokio::sync::Mutex::new(None),
            backoff: Mutex::new(refresh_backoff()),
            last_refresh_failure: Mutex::new(None),
        }
    }

    /// Return the cached credential, acquiring one lazily if absent
    ///.
    pub async fn token(&self) -> Result<String, HttpError> {
        let mut guard = self.cached.lock().await;
        if let Some(token) = guard.as_ref() {
            return Ok(token.clone());
        }
        let token = self.source.acquire().await?.token;
        *guard = Some(token.clone());
        Ok(token)
    }

    /// Discard the cached credential and attempt one fresh acquisition,
    /// subject to the refresh-failure backoff.
    pub async fn refresh(&self) -> Result<String, HttpError> {
        let mut guard = self.cached.lock().await;
        *guard = None;

        if let Some((last_failure, window)) = *self.last_refresh_failure.lock().unwrap_or_else(|e| e.into_inner()) {
            if last_failure.elapsed() < window {
                return Err(HttpError::Auth);
            }
        }

        match self.source.acquire().await {
            Ok(creds) => {
                self.backoff.lock().unwrap_or_else(|e| e.into_inner()).reset();
                *self.last_refresh_failure.lock().unwrap_or_else(|e| e.into_inner()) = None;
                *guard = Some(creds.token.clone());
                Ok(creds.token)
            }
            Err(err) => {
                let window = self
                    .backoff
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .next_backoff()
                    .unwrap_or(Duration::from_secs(60));
                *self.last_refresh_failure.lock().unwrap_or_else(|e| e.into_inner()) = Some((Instant::now(), window));
                Err(err)
            }
        }
    }
}
