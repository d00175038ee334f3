// src/main.rs

use std::sync::Arc;

use examline_sync::{
    Session, api::HttpExamApi, collaborators::LogCollaborators, config::Config,
    models::LifecycleState,
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Load configuration from environment (.env is read inside)
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(2);
        }
    };

    let file_appender = tracing_appender::rolling::daily("logs", "examline-sync.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::new(&config.rust_log);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout).with_target(false);
    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

    // Initialize Tracing (Logging)
    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    let api = match HttpExamApi::new(&config) {
        Ok(api) => Arc::new(api),
        Err(e) => {
            tracing::error!("Failed to build HTTP client: {}", e);
            std::process::exit(1);
        }
    };

    let ui = Arc::new(LogCollaborators);
    let session = match Session::mount(&config, api, ui.clone(), ui).await {
        Ok(session) => session,
        Err(e) => {
            tracing::error!("Could not start exam windows session: {}", e);
            std::process::exit(1);
        }
    };

    let mut changes = session.store().subscribe();
    loop {
        tokio::select! {
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                log_summary(&session).await;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down...");
                break;
            }
        }
    }

    session.teardown().await;
}

async fn log_summary(session: &Session) {
    let latency = session.channel().latency_stats().await;
    let store = session.store().read().await;
    let count = |state| store.by_state(state).count();

    tracing::info!(
        windows = store.len(),
        scheduled = count(LifecycleState::Scheduled),
        enrollment_closed = count(LifecycleState::EnrollmentClosed),
        in_progress = count(LifecycleState::InProgress),
        finished = count(LifecycleState::Finished),
        channel = %session.channel().state(),
        fallback_polling = session.scheduler().is_fallback_active(),
        avg_latency_ms = latency.map(|l| l.avg_ms).unwrap_or_default(),
        "Exam windows updated"
    );
}
