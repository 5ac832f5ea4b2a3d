use std::sync::Arc;

use imagepp_core::envelope::{TASK_TYPE_HEALTH_CHECK, TASK_TYPE_IMAGE_PROCESS};
use imagepp_db::{JobStore, PgJobStore};
use imagepp_queue::{PgTaskQueue, TaskQueue};
use imagepp_storage::{S3ObjectStoreFactory, StorageConfig};
use imagepp_worker::health::HealthCheckHandler;
use imagepp_worker::{recovery, Dispatcher, HandlerRegistry, ImageProcessor, WorkerConfig};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "imagepp_worker=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = WorkerConfig::from_env();
    tracing::info!(
        concurrency = config.concurrency,
        poll_interval_ms = config.poll_interval.as_millis() as u64,
        "Loaded worker configuration",
    );

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = imagepp_db::create_pool(&database_url, config.db_max_connections)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    imagepp_db::health_check(&pool)
        .await
        .expect("Database health check failed");

    imagepp_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- Object store ---
    let storage_config = StorageConfig::from_env().expect("Object store configuration is incomplete");
    let objects = Arc::new(S3ObjectStoreFactory::connect(&storage_config).await);

    // --- Handlers ---
    let store: Arc<dyn JobStore> = Arc::new(PgJobStore::new(pool.clone()));
    let queue: Arc<dyn TaskQueue> = Arc::new(PgTaskQueue::new(pool));

    let registry = HandlerRegistry::new()
        .register(
            TASK_TYPE_IMAGE_PROCESS,
            Arc::new(ImageProcessor::new(store, objects)),
        )
        .register(TASK_TYPE_HEALTH_CHECK, Arc::new(HealthCheckHandler));

    // --- Background loops ---
    let cancel = CancellationToken::new();

    let recovery_handle = tokio::spawn(recovery::run(
        Arc::clone(&queue),
        config.stale_check_interval,
        cancel.clone(),
    ));

    let dispatcher = Dispatcher::new(Arc::clone(&queue), registry, &config);
    let dispatcher_cancel = cancel.clone();
    let dispatcher_handle = tokio::spawn(async move {
        dispatcher.run(dispatcher_cancel).await;
    });

    shutdown_signal().await;
    cancel.cancel();

    if let Err(e) = dispatcher_handle.await {
        tracing::error!(error = %e, "Dispatcher task ended abnormally");
    }
    let _ = recovery_handle.await;

    tracing::info!("Graceful shutdown complete");
}

/// Wait for SIGINT (Ctrl-C) or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
