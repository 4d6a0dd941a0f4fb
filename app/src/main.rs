//! Terminal support desk.
//!
//! Each line typed on stdin is submitted as a ticket, one at a time. The screen is redrawn
//! on every state change, so tickets show up immediately and pick up their
//! category and sentiment once the classifier writes them back.

use std::io::Write as _;
use std::sync::Arc;
use support_copilot::{Config, HttpClassificationTrigger, render, run_input};
use support_copilot_core::desk::DeskEnvironment;
use support_copilot_core::environment::{SystemClock, UuidIdGenerator};
use support_copilot_postgres::PostgresRecordStore;
use support_copilot_runtime::metrics::MetricsServer;
use support_copilot_runtime::session::{SessionConfig, TicketSession};
use tokio::io::BufReader;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Logs go to stderr, the screen owns stdout
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "support_copilot=info,support_copilot_runtime=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::from_env();
    info!(trigger_url = %config.trigger_url, "Configuration loaded");

    if let Some(addr) = config.metrics_addr {
        let mut metrics = MetricsServer::new(addr);
        metrics.start()?;
    }

    let records =
        PostgresRecordStore::connect(&config.database_url, config.database_max_connections)
            .await?;
    records.migrate().await?;

    let environment = DeskEnvironment::new(
        Arc::new(SystemClock),
        Arc::new(UuidIdGenerator),
        Arc::new(records),
        Arc::new(HttpClassificationTrigger::new(config.trigger_url.clone())),
    );
    let session = Arc::new(
        TicketSession::start_with_config(
            environment,
            SessionConfig {
                submit_timeout: config.submit_timeout(),
            },
        )
        .await?,
    );

    let renderer = tokio::spawn(render_loop(Arc::clone(&session)));
    let input = BufReader::new(tokio::io::stdin());

    tokio::select! {
        result = run_input(&session, input) => match result {
            Ok(submitted) => info!(submitted, "Input closed"),
            Err(error) => warn!(%error, "Could not read stdin"),
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C signal, shutting down gracefully...");
        },
    }

    renderer.abort();
    let _ = renderer.await;

    match Arc::try_unwrap(session) {
        Ok(session) => session.shutdown(config.shutdown_timeout()).await?,
        Err(_) => warn!("Session still shared at shutdown, skipping graceful stop"),
    }

    info!("Stopped");
    Ok(())
}

async fn render_loop(session: Arc<TicketSession>) {
    let mut changes = session.subscribe_changes();
    loop {
        let screen = render(&session.view().await);
        {
            let mut stdout = std::io::stdout().lock();
            // Clear and home the cursor before each frame
            let _ = write!(stdout, "\x1b[2J\x1b[H{screen}");
            let _ = stdout.flush();
        }

        if changes.changed().await.is_err() {
            break;
        }
    }
}
