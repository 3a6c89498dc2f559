use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context as _;
use chrono::Utc;
use sea_orm::Database;
use tracing::{error, info, warn};

use crm_auth::config::AuthConfig;
use crm_auth::router::build_router;
use crm_auth::state::AppState;
use crm_core::tracing::init_tracing;

const PRUNE_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing("info,tower_http=info,sqlx=warn");

    let settings = match AuthConfig::load() {
        Ok(settings) => settings,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    match run(settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = ?e, "auth service stopped");
            ExitCode::FAILURE
        }
    }
}

async fn run(settings: crm_auth::config::Settings) -> anyhow::Result<()> {
    let db = Database::connect(&settings.database_url)
        .await
        .context("failed to connect to database")?;

    let addr = format!("0.0.0.0:{}", settings.auth_port);
    let test_mode = settings.otp.test_code.is_some();
    let state = AppState::new(db, settings).context("failed to build application state")?;
    if test_mode {
        warn!("OTP test mode enabled, SMS delivery is skipped");
    }

    spawn_pruning(state.clone());

    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!("auth service listening on {addr}");
    axum::serve(listener, router).await.context("server error")
}

/// Periodically drop expired client windows, OTP request log entries and
/// unverified OTP challenges.
fn spawn_pruning(state: AppState) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PRUNE_INTERVAL);
        loop {
            ticker.tick().await;
            let now = Utc::now();
            let purged = state.api_limiter.purge_expired(now);
            match state.otp_limiter().prune(now).await {
                Ok(pruned) => {
                    tracing::debug!(purged, pruned, "rate limit state pruned");
                }
                Err(e) => warn!(error = ?e, "failed to prune otp request log"),
            }
            match state.otp_manager().prune_expired(now).await {
                Ok(expired) => tracing::debug!(expired, "expired otp challenges pruned"),
                Err(e) => warn!(error = ?e, "failed to prune otp challenges"),
            }
        }
    });
}
