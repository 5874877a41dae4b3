use anyhow::{Context, Result};
use ld_claim::app::{AppState, router};
use ld_claim::chain::{AlloyClaimReader, ClaimReader};
use ld_claim::index::TokenIndex;
use ld_claim::resolver::EligibilityResolver;
use ld_claim::state::StateConfig;
use ld_claim::tracker::ClaimTracker;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    if let Err(err) = run().await {
        error!(error = %err, "ld-claim terminated with error");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config_path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.json".to_string());
    let config = StateConfig::from_file(&config_path)
        .with_context(|| format!("Could not load config file {config_path}"))?;
    info!(?config, "starting ld-claim");

    let index = Arc::new(TokenIndex::from_file(&config.snapshot_path)?);
    let tracker = Arc::new(match &config.claimed_store_path {
        Some(path) => ClaimTracker::open(path)?,
        None => ClaimTracker::in_memory(),
    });
    let reader: Arc<dyn ClaimReader> =
        Arc::new(AlloyClaimReader::connect(&config.rpc.url, config.contracts).await?);
    let resolver = Arc::new(EligibilityResolver::new(
        reader.clone(),
        config.claim,
        config.rpc_timeout(),
    ));

    let app = router(Arc::new(AppState {
        index,
        resolver,
        reader,
        tracker,
        rpc_timeout: config.rpc_timeout(),
    }));

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    info!("listening on {}", config.listen_addr);
    axum::serve(listener, app).await?;
    Ok(())
}
