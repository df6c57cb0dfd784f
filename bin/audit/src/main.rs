//! Pointcast Audit — periodically re-derives ledger invariants and reports
//! drift to operators.
//!
//! Flow:
//! 1. Connect to PostgreSQL, apply migrations
//! 2. On a fixed interval, sweep:
//!    - per-user: stored balance vs the sum of that user's history amounts
//!    - global: streamer accumulator totals vs negated gift_sent history
//! 3. Log every divergence at error level so alerting picks it up
//!
//! The ledger's write paths are transactional, so a divergence here means
//! either operator tampering or a genuine bug — never routine operation.

use eyre::Result;
use pointcast_core::{Settings, telemetry};
use pointcast_storage::{self as storage};

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init();
    let settings = Settings::from_env()?;

    tracing::info!("Starting Pointcast Audit");

    let pool = storage::connect(&settings.database_url).await?;
    tracing::info!("Connected to database");

    sqlx::migrate!("../../migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    let interval = std::time::Duration::from_secs(settings.audit_interval_secs);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        if let Err(e) = run_sweep(&pool).await {
            tracing::error!(error = %e, "Audit sweep failed");
        }

        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("Shutting down gracefully…");
                break;
            }
            _ = tokio::time::sleep(interval) => {}
        }
    }

    tracing::info!("Audit stopped.");
    Ok(())
}

/// One full consistency sweep. Returns Ok even when drift is found — drift is
/// reported through logs, not through the process exit status.
async fn run_sweep(pool: &sqlx::PgPool) -> Result<()> {
    let drift = storage::repos::find_balance_drift(pool).await?;
    for (user_id, stored, derived) in &drift {
        tracing::error!(
            user = %user_id,
            stored = stored,
            derived = derived,
            "Balance disagrees with history sum"
        );
    }

    let (accumulated, debited) = storage::repos::gift_totals(pool).await?;
    let gifts_consistent = accumulated == debited;
    if !gifts_consistent {
        tracing::error!(
            accumulated = accumulated,
            debited = debited,
            "Streamer totals disagree with gift history"
        );
    }

    if drift.is_empty() && gifts_consistent {
        let users = storage::repos::count_balances(pool).await?;
        tracing::info!(users = users, "Ledger consistent");
    }

    Ok(())
}
