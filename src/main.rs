use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use files_service::{
    api,
    config::Config,
    engine::StorageEngine,
    metadata::{Database, FileRepository},
    object_store::S3Store,
    policy::AccessPolicy,
    remote::{self, HttpIdentityService, HttpPermissionChecker, HttpSettingsService},
    storage::{FilesystemBackend, ObjectStoreBackend},
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    match log_format.to_lowercase().as_str() {
        "gcp" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_stackdriver::layer())
                .init();
        }
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_span_list(false),
                )
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    info!(version = env!("CARGO_PKG_VERSION"), "files-service starting");

    // Load configuration
    let config = Config::load()?;

    // Initialize database
    let db = Database::open(&config.server.data_dir)?;
    info!("Database opened at: {}", config.server.data_dir);
    let repo: Arc<dyn FileRepository> = Arc::new(db);

    // Remote services
    let http = remote::http_client(Duration::from_millis(config.services.timeout_ms))?;
    let identity = Arc::new(HttpIdentityService::new(http.clone(), &config.services.users_url));
    let permissions = Arc::new(HttpPermissionChecker::new(
        http.clone(),
        &config.services.permissions_url,
    ));
    let settings = Arc::new(HttpSettingsService::new(http, &config.services.settings_url));

    // Storage backends. Every configured backend is registered so existing
    // records stay readable whichever one is the default.
    let filesystem = FilesystemBackend::new(&config.storage.local_storage_path, Arc::clone(&repo))?;
    info!(
        "Local storage backend at: {}",
        config.storage.local_storage_path
    );
    let mut engine = StorageEngine::new(config.storage.backend, Arc::clone(&repo), settings)
        .with_backend(Arc::new(filesystem));

    if let Some(s3) = &config.storage.s3 {
        let store = S3Store::new(s3).await?;
        info!("S3 storage backend, bucket: {}", s3.bucket);
        engine = engine.with_backend(Arc::new(ObjectStoreBackend::new(
            Arc::new(store),
            Arc::clone(&repo),
        )));
    }
    info!(default_backend = %engine.default_backend(), "Storage engine ready");

    let policy = AccessPolicy::new(identity.clone(), permissions);

    // Create shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        engine,
        identity,
        policy,
        repo,
    });

    // Internal RPC server runs until the public server has drained
    let rpc_app = api::create_rpc_router(Arc::clone(&state));
    let rpc_listener = tokio::net::TcpListener::bind(&config.server.rpc_bind_address).await?;
    info!("RPC listening on: {}", config.server.rpc_bind_address);
    let rpc_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(rpc_listener, rpc_app).await {
            tracing::error!(error = %e, "RPC server failed");
        }
    });

    // Build and start the HTTP server
    let app = api::create_router(Arc::clone(&state));
    let listener = tokio::net::TcpListener::bind(&config.server.bind_address).await?;
    info!("Listening on: {}", config.server.bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down RPC server");
    rpc_handle.abort();

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining connections");
}
