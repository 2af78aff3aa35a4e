//! `rxwatch-worker` -- clinical score change monitor.
//!
//! Polls the score view on a fixed interval, compares each snapshot with
//! the previous one and posts a Telegram alert for every record whose
//! fields changed, at most once per cooldown window per record. See
//! [`MonitorConfig::from_env`] for the environment variables.

use rxwatch_core::clock::SystemClock;
use rxwatch_db::{JsonFileStore, PgSnapshotSource};
use rxwatch_events::TelegramDelivery;
use rxwatch_worker::config::MonitorConfig;
use rxwatch_worker::poll::{PollLoop, TokioSleeper};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "rxwatch_worker=info,rxwatch_db=info,rxwatch_events=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = MonitorConfig::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid configuration");
        std::process::exit(1);
    });

    let schema = config.load_schema().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid monitor schema");
        std::process::exit(1);
    });

    let pool = rxwatch_db::create_pool(&config.database_url).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid DATABASE_URL");
        std::process::exit(1);
    });

    match rxwatch_db::health_check(&pool).await {
        Ok(()) => tracing::info!("Database reachable"),
        Err(e) => tracing::warn!(
            error = %e,
            "Database not reachable yet, the poll loop will retry"
        ),
    }

    let notifier = TelegramDelivery::new(&config.telegram).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to build Telegram client");
        std::process::exit(1);
    });

    tracing::info!(
        source = %schema.source,
        groups = schema.groups.len(),
        state_file = %config.state_file.display(),
        "Starting rxwatch-worker",
    );

    let source = PgSnapshotSource::new(pool, schema.clone());
    let store = JsonFileStore::new(&config.state_file);
    let mut poll_loop = PollLoop::new(
        source,
        store,
        notifier,
        SystemClock,
        schema,
        config.loop_settings(),
    );

    let baseline = poll_loop.restore().await;
    tracing::info!(records = baseline, "Baseline restored");

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown requested, stopping after the current cycle");
            shutdown.cancel();
        }
    });

    poll_loop.run(&TokioSleeper, cancel).await;
}
