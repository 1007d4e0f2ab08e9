use anyhow::Context;
use arena_worker::classify::Classifier;
use arena_worker::config::Config;
use arena_worker::discovery::DiscoveryTick;
use arena_worker::ledger::ArenaLedger;
use arena_worker::resolution::ResolutionTick;
use arena_worker::scheduler::TickSchedule;
use arena_worker::store::{ArenaStore, PgArenaStore};
use arena_worker::twitter::TwitterApiClient;
use chrono::Utc;
use futures::FutureExt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Load config
    let config_path = std::env::var("ARENA_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("arena.toml"));
    let config = if config_path.exists() {
        Config::load(&config_path)
            .with_context(|| format!("loading {}", config_path.display()))?
    } else {
        Config::from_env().context("loading config from environment")?
    };

    // Initialize logging
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    if config.logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .init();
    }

    let worker = &config.worker;
    info!(
        mode = %worker.mode,
        discovery_ms = worker.discovery_interval().as_millis() as u64,
        resolution_ms = worker.resolution_interval().as_millis() as u64,
        reconcile = worker.reconcile_ledger,
        "arena-worker v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    // --- Store ---
    let pg = PgArenaStore::connect(&config.store)
        .await
        .context("connecting to arena store")?;
    if config.store.init_schema {
        pg.init_schema().await.context("initializing arena schema")?;
    }
    let store: Arc<dyn ArenaStore> = Arc::new(pg);

    // --- External services ---
    let twitter = Arc::new(TwitterApiClient::new(&config.search).context("building search client")?);

    let classifier = Classifier::from_config(&config.classifier)
        .context("building classifier")?
        .map(Arc::new);
    if classifier.is_none() {
        info!("OPENAI_API_KEY not set, arenas will not be labeled");
    }

    let ledger = ArenaLedger::connect(&config.ledger)
        .await
        .context("connecting to ledger")?;
    match ledger.verify_oracle().await {
        Ok(true) => info!(oracle = %ledger.oracle_address(), "oracle key matches contract"),
        Ok(false) => {}
        Err(e) => warn!(error = %e, "could not read contract oracle"),
    }
    let ledger = Arc::new(ledger);

    // --- Ticks ---
    let discovery = Arc::new(
        DiscoveryTick::new(twitter.clone(), store.clone(), worker.mode).with_classifier(classifier),
    );
    let resolution = Arc::new(
        ResolutionTick::new(store.clone(), twitter, ledger, worker.mode)
            .with_reconcile(worker.reconcile_ledger),
    );

    let cancel = CancellationToken::new();

    let discovery_task = TickSchedule::new(
        "discovery",
        worker.discovery_interval(),
        worker.tick_timeout(),
    )
    .spawn(cancel.clone(), move || {
        let tick = discovery.clone();
        async move { tick.run(Utc::now()).await.map(|_| ()) }.boxed()
    });

    let resolution_task = TickSchedule::new(
        "resolution",
        worker.resolution_interval(),
        worker.tick_timeout(),
    )
    .spawn(cancel.clone(), move || {
        let tick = resolution.clone();
        async move { tick.run(Utc::now()).await.map(|_| ()) }.boxed()
    });

    info!("worker running - press Ctrl+C to stop");

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for ctrl-c, shutting down");
    }
    info!("shutting down...");
    cancel.cancel();

    for (name, task) in [("discovery", discovery_task), ("resolution", resolution_task)] {
        if let Err(e) = task.await {
            error!(schedule = name, error = %e, "schedule task ended abnormally");
        }
    }

    Ok(())
}
