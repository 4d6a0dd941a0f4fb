//! Classification service HTTP server.

use std::sync::Arc;
use support_copilot_classifier::{AppState, ChatCompletionsClient, Config, TicketProcessor, router};
use support_copilot_postgres::PostgresRecordStore;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "support_copilot_classifier=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    info!(
        app = %config.app_name,
        environment = %config.environment,
        llm_provider = %config.llm.provider,
        "Configuration loaded"
    );

    let model = ChatCompletionsClient::from_config(&config.llm)?;
    info!(?model, "Language model configured");

    info!("Connecting to database...");
    let records =
        PostgresRecordStore::connect(&config.postgres.url, config.postgres.max_connections).await?;
    records.migrate().await?;
    info!("Database ready");

    let addr = config.bind_address();
    let state = AppState {
        config: Arc::new(config),
        processor: TicketProcessor::new(Arc::new(model)),
        records: Arc::new(records),
    };

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            warn!(%error, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            },
            Err(error) => {
                warn!(%error, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal, shutting down gracefully...");
        },
        () = terminate => {
            info!("Received SIGTERM signal, shutting down gracefully...");
        },
    }
}
