//! Client for the external risk-screening service.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use thiserror::Error;

use crate::config::ScreeningConfig;
use crate::services::metrics;

const CHECK_BLACKLIST_PATH: &str = "/check-blacklist";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScreeningRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

#[derive(Debug, Deserialize)]
struct ScreeningResponse {
    is_in_blacklist: bool,
}

#[derive(Error, Debug)]
pub enum ScreeningError {
    #[error("Screening transport error: {0}")]
    Transport(String),

    #[error("Screening service returned status {0}")]
    Status(u16),

    #[error("Failed to decode screening response: {0}")]
    Decode(String),
}

#[async_trait]
pub trait BlacklistScreener: Send + Sync {
    /// Ask the screening service about an applicant. Every failure to get a
    /// well-formed answer is an error.
    async fn screen(&self, request: &ScreeningRequest) -> Result<bool, ScreeningError>;

    /// Fail-open check: only a well-formed "match" answer returns `true`.
    /// Failures are logged and answered with `false`.
    async fn check_blacklist(&self, first_name: &str, last_name: &str, email: &str) -> bool {
        let request = ScreeningRequest {
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            email: email.to_string(),
        };

        match self.screen(&request).await {
            Ok(matched) => matched,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    email = %email,
                    "Screening unavailable, admitting applicant as not blacklisted"
                );
                metrics::record_screening_fail_open();
                false
            }
        }
    }
}

/// HTTP screening client (`POST {base_url}/check-blacklist`).
#[derive(Clone)]
pub struct ScreeningClient {
    client: Client,
    endpoint: String,
}

impl ScreeningClient {
    pub fn new(config: &ScreeningConfig) -> Result<Self, anyhow::Error> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build screening HTTP client: {}", e))?;

        let endpoint = format!(
            "{}{}",
            config.base_url.trim_end_matches('/'),
            CHECK_BLACKLIST_PATH
        );

        tracing::info!(
            endpoint = %endpoint,
            timeout_seconds = config.timeout_seconds,
            "Screening client configured"
        );

        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl BlacklistScreener for ScreeningClient {
    async fn screen(&self, request: &ScreeningRequest) -> Result<bool, ScreeningError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| ScreeningError::Transport(e.to_string()))?;

        let status = response.status();
        if status != StatusCode::OK && status != StatusCode::CREATED {
            return Err(ScreeningError::Status(status.as_u16()));
        }

        let body: ScreeningResponse = response
            .json()
            .await
            .map_err(|e| ScreeningError::Decode(e.to_string()))?;

        tracing::debug!(
            email = %request.email,
            is_in_blacklist = body.is_in_blacklist,
            "Screening answered"
        );

        Ok(body.is_in_blacklist)
    }
}

/// Scripted screener for tests and local runs.
#[derive(Default)]
pub struct MockScreener {
    blacklisted: AtomicBool,
    failing: AtomicBool,
    calls: AtomicUsize,
    last_request: Mutex<Option<ScreeningRequest>>,
}

impl MockScreener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn blacklisting() -> Self {
        let mock = Self::new();
        mock.set_blacklisted(true);
        mock
    }

    pub fn failing() -> Self {
        let mock = Self::new();
        mock.set_failing(true);
        mock
    }

    pub fn set_blacklisted(&self, blacklisted: bool) {
        self.blacklisted.store(blacklisted, Ordering::SeqCst);
    }

    /// Simulate a transport failure on every call.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<ScreeningRequest> {
        self.last_request.lock().ok().and_then(|r| r.clone())
    }
}

#[async_trait]
impl BlacklistScreener for MockScreener {
    async fn screen(&self, request: &ScreeningRequest) -> Result<bool, ScreeningError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_request.lock() {
            *last = Some(request.clone());
        }

        if self.failing.load(Ordering::SeqCst) {
            return Err(ScreeningError::Transport(
                "simulated connection refused".to_string(),
            ));
        }
        Ok(self.blacklisted.load(Ordering::SeqCst))
    }
}
