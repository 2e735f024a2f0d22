//! Shared fixtures for onboarding-service integration tests.
//!
//! Everything runs in-process: `InMemoryStore` for the record store,
//! `MemoryChannel` for the event channel and `MockScreener` for screening.

#![allow(dead_code)]

use axum::{body::Body, http::Request, response::Response, Router};
use onboarding_service::{
    build_router,
    config::{EventsConfig, JwtConfig},
    events::{EventConsumer, EventPublisher, MemoryChannel, OutboxDispatcher, RedeliveryPolicy},
    services::{
        AccountService, AuditRecorder, CredentialService, EventDispatch, InMemoryStore,
        MockScreener, OnboardingService, RecordStore,
    },
    AppState,
};
use secrecy::Secret;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tower::util::ServiceExt;

pub const TEST_JWT_SECRET: &str = "integration-test-secret";
pub const QUEUE: &str = "user.created";

pub fn credentials() -> CredentialService {
    credentials_with_ttl(60)
}

pub fn credentials_with_ttl(ttl_minutes: i64) -> CredentialService {
    CredentialService::new(&JwtConfig {
        secret: Secret::new(TEST_JWT_SECRET.to_string()),
        token_ttl_minutes: ttl_minutes,
    })
    .expect("credential service")
}

pub fn events_config() -> EventsConfig {
    EventsConfig {
        queue_name: QUEUE.to_string(),
        consumer_name: "test".to_string(),
        delivery_mode: onboarding_service::config::DeliveryMode::Outbox,
        max_delivery_attempts: 3,
        redelivery_backoff_ms: 1,
        redelivery_max_backoff_ms: 5,
        consumer_enabled: true,
        outbox_poll_interval_ms: 20,
        outbox_batch_size: 10,
        outbox_lease_seconds: 30,
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Outbox,
    Detached,
}

/// Fully wired service over in-process collaborators.
pub struct TestApp {
    pub store: Arc<InMemoryStore>,
    pub screener: Arc<MockScreener>,
    pub channel: MemoryChannel,
    pub credentials: CredentialService,
    pub publisher: EventPublisher,
    pub onboarding: OnboardingService,
    pub accounts: AccountService,
    pub wake: Arc<Notify>,
    pub state: AppState,
}

impl TestApp {
    pub fn new() -> Self {
        Self::build(Mode::Outbox, true)
    }

    pub fn build(mode: Mode, fail_open: bool) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let screener = Arc::new(MockScreener::new());
        let channel = MemoryChannel::new();
        let credentials = credentials();
        let publisher = EventPublisher::new(Arc::new(channel.clone()));
        let wake = Arc::new(Notify::new());

        let dispatch = match mode {
            Mode::Outbox => EventDispatch::Outbox { wake: wake.clone() },
            Mode::Detached => EventDispatch::Detached {
                publisher: publisher.clone(),
            },
        };

        let store_dyn: Arc<dyn RecordStore> = store.clone();
        let onboarding = OnboardingService::new(
            store_dyn.clone(),
            screener.clone(),
            credentials.clone(),
            dispatch,
            fail_open,
        );
        let accounts = AccountService::new(store_dyn.clone(), credentials.clone());

        let state = AppState {
            service_name: "onboarding-service-test".to_string(),
            service_version: "0.0.0-test".to_string(),
            allowed_origins: vec!["http://localhost:3000".to_string()],
            store: store_dyn,
            credentials: credentials.clone(),
            publisher: publisher.clone(),
            consumer: None,
            onboarding: onboarding.clone(),
            accounts: accounts.clone(),
        };

        Self {
            store,
            screener,
            channel,
            credentials,
            publisher,
            onboarding,
            accounts,
            wake,
            state,
        }
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    pub async fn request(&self, request: Request<Body>) -> Response {
        self.router()
            .oneshot(request)
            .await
            .expect("router is infallible")
    }

    pub fn dispatcher(&self) -> OutboxDispatcher {
        OutboxDispatcher::new(
            self.store.clone(),
            self.publisher.clone(),
            self.wake.clone(),
            &events_config(),
        )
    }

    pub fn consumer(&self, policy: RedeliveryPolicy) -> EventConsumer {
        EventConsumer::new(Arc::new(self.channel.clone()), QUEUE, policy)
            .with_poll_wait(Duration::from_millis(20))
    }

    pub fn recorder(&self) -> AuditRecorder {
        AuditRecorder::new(self.store.clone())
    }
}

pub fn fast_policy(max_attempts: u32) -> RedeliveryPolicy {
    RedeliveryPolicy {
        max_attempts,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(5),
        backoff_multiplier: 2.0,
    }
}

pub fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}

/// Poll `check` until it holds or a second passes.
pub async fn eventually<F: Fn() -> bool>(check: F) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
