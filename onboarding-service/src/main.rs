use onboarding_service::{
    build_router,
    config::{DeliveryMode, OnboardingConfig},
    db,
    events::{EventConsumer, EventPublisher, OutboxDispatcher, RedeliveryPolicy, RedisChannel},
    services::{
        metrics, AccountService, AuditRecorder, CredentialService, Database, EventDispatch,
        OnboardingService, RecordStore, ScreeningClient,
    },
    AppState,
};
use service_core::error::AppError;
use service_core::observability::init_tracing;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = OnboardingConfig::from_env()?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    );
    metrics::init_metrics()?;

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        delivery_mode = ?config.events.delivery_mode,
        screening_fail_open = config.screening.fail_open,
        "Starting onboarding service"
    );

    let pool = db::create_pool(&config.database).await?;
    db::run_migrations(&pool).await?;
    let store: Arc<dyn RecordStore> = Arc::new(Database::new(pool));

    let credentials = CredentialService::new(&config.jwt)?;
    let screener = Arc::new(ScreeningClient::new(&config.screening)?);

    let publisher_channel = RedisChannel::connect(
        &config.redis,
        &config.events.queue_name,
        &config.events.consumer_name,
    )
    .await
    .map_err(|e| AppError::InternalError(e.into()))?;
    let publisher = EventPublisher::new(Arc::new(publisher_channel));

    let shutdown = CancellationToken::new();
    let mut background = Vec::new();

    let dispatch = match config.events.delivery_mode {
        DeliveryMode::Outbox => {
            let wake = Arc::new(Notify::new());
            let dispatcher = OutboxDispatcher::new(
                store.clone(),
                publisher.clone(),
                wake.clone(),
                &config.events,
            );
            let token = shutdown.clone();
            background.push(tokio::spawn(async move { dispatcher.run(token).await }));
            EventDispatch::Outbox { wake }
        }
        DeliveryMode::Detached => EventDispatch::Detached {
            publisher: publisher.clone(),
        },
    };

    let mut consumer_health = None;
    if config.events.consumer_enabled {
        // Separate connection: the consumer blocks on its socket while idle.
        let consumer_channel = RedisChannel::connect(
            &config.redis,
            &config.events.queue_name,
            &config.events.consumer_name,
        )
        .await
        .map_err(|e| AppError::InternalError(e.into()))?;

        let consumer = EventConsumer::new(
            Arc::new(consumer_channel),
            &config.events.queue_name,
            RedeliveryPolicy::from_config(&config.events),
        );
        consumer_health = Some(consumer.health());
        let recorder = AuditRecorder::new(store.clone());
        let token = shutdown.clone();
        background.push(tokio::spawn(async move {
            if consumer.run(&recorder, token.clone()).await.is_err() {
                // A dead consumer stops the audit trail; bring the process
                // down so the supervisor restarts it.
                token.cancel();
            }
        }));
    }

    let onboarding = OnboardingService::new(
        store.clone(),
        screener,
        credentials.clone(),
        dispatch,
        config.screening.fail_open,
    );
    let accounts = AccountService::new(store.clone(), credentials.clone());

    let state = AppState {
        service_name: config.service_name.clone(),
        service_version: config.service_version.clone(),
        allowed_origins: config.security.allowed_origins.clone(),
        store,
        credentials,
        publisher,
        consumer: consumer_health.clone(),
        onboarding,
        accounts,
    };
    let app = build_router(state);

    let addr = config.common.socket_addr();
    tracing::info!(address = %addr, "Listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    tracing::info!("HTTP server stopped, draining background tasks");
    shutdown.cancel();
    for task in background {
        if let Err(e) = task.await {
            tracing::error!(error = %e, "Background task panicked");
        }
    }

    if consumer_health.is_some_and(|health| health.is_failed()) {
        return Err(AppError::InternalError(anyhow::anyhow!(
            "Event consumer stopped on error, exiting for restart"
        )));
    }

    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal(stopped: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
        _ = stopped.cancelled() => {
            tracing::warn!("Background task failed, starting graceful shutdown");
        },
    }
}
