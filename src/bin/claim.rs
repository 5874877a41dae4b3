use alloy::signers::local::PrivateKeySigner;
use anyhow::{Context, Result};
use ld_claim::chain::AlloyClaimWriter;
use ld_claim::client::WalletApiClient;
use ld_claim::index::{TokenIdSource, TokenIndex};
use ld_claim::resolver::EligibilityResolver;
use ld_claim::session::{ClaimSession, ClaimState};
use ld_claim::state::StateConfig;
use ld_claim::submitter::ClaimSubmitter;
use ld_claim::tracker::ClaimTracker;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Runs one claim for the wallet behind `PRIVATE_KEY`.
#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let config_path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.json".to_string());
    let config = StateConfig::from_file(&config_path)
        .with_context(|| format!("Could not load config file {config_path}"))?;
    let signer: PrivateKeySigner = std::env::var("PRIVATE_KEY")
        .context("PRIVATE_KEY not set")?
        .parse()
        .context("Invalid private key")?;

    let writer =
        Arc::new(AlloyClaimWriter::connect(&config.rpc.url, config.contracts, signer).await?);
    let token_ids: Arc<dyn TokenIdSource> = match std::env::var("WALLET_API_URL") {
        Ok(url) => Arc::new(WalletApiClient::new(&url, config.rpc_timeout())?),
        Err(_) => Arc::new(TokenIndex::from_file(&config.snapshot_path)?),
    };
    let tracker = Arc::new(match &config.claimed_store_path {
        Some(path) => ClaimTracker::open(path)?,
        None => ClaimTracker::in_memory(),
    });

    let resolver = Arc::new(EligibilityResolver::new(
        writer.clone(),
        config.claim,
        config.rpc_timeout(),
    ));
    let submitter = Arc::new(ClaimSubmitter::new(
        writer,
        token_ids,
        config.claim.contract_version,
        config.contracts.claim_manager,
        config.rpc_timeout(),
        config.confirmation_timeout(),
    ));
    let session = ClaimSession::new(resolver, submitter, tracker);

    match session.check().await {
        ClaimState::Eligible(eligibility) => info!(
            "Eligible for {} $LD ({} + {} NFTs)",
            eligibility.holder.claimable_amount,
            eligibility.holder.primary_count,
            eligibility.holder.secondary_count
        ),
        ClaimState::NotEligible(holder) => {
            println!("{} holds no qualifying NFTs", holder.address);
            return Ok(());
        }
        ClaimState::AlreadyClaimed { holder, amount } => {
            println!("{} already claimed {} $LD", holder.address, amount);
            return Ok(());
        }
        ClaimState::Failed { reason, .. } => return Err(reason.into()),
        other => anyhow::bail!("unexpected state after check: {other:?}"),
    }

    match session.claim().await {
        ClaimState::Claimed { holder, tx_hash } => {
            println!(
                "Claimed {} $LD, transaction {}",
                holder.claimable_amount, tx_hash
            );
            Ok(())
        }
        ClaimState::Eligible(_) => {
            println!("Request rejected in wallet; nothing was sent");
            Ok(())
        }
        ClaimState::Failed { reason, .. } => Err(reason.into()),
        other => anyhow::bail!("unexpected state after claim: {other:?}"),
    }
}
