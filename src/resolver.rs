use crate::address::parse_address;
use crate::chain::{ClaimReader, with_timeout};
use crate::error::ClaimError;
use crate::state::ClaimConfig;
use alloy::primitives::{Address, U256};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// What a wallet holds and what that is worth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HolderRecord {
    pub address: Address,
    pub primary_count: u64,
    pub secondary_count: u64,
    /// Whole tokens: `(primary_count + secondary_count) * tokens_per_nft`.
    pub claimable_amount: u128,
}

impl HolderRecord {
    pub fn new(address: Address, primary_count: u64, secondary_count: u64, rate: u64) -> Self {
        let nfts = u128::from(primary_count) + u128::from(secondary_count);
        Self {
            address,
            primary_count,
            secondary_count,
            claimable_amount: nfts * u128::from(rate),
        }
    }

    pub fn total_nfts(&self) -> u64 {
        self.primary_count.saturating_add(self.secondary_count)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum EligibilityStatus {
    NotEligible,
    /// `amount` is what the contract reports as paid out when it can tell,
    /// otherwise the recomputed entitlement.
    AlreadyClaimed { amount: u128 },
    Eligible,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Eligibility {
    pub holder: HolderRecord,
    pub status: EligibilityStatus,
}

impl Eligibility {
    pub fn already_claimed(&self) -> bool {
        matches!(self.status, EligibilityStatus::AlreadyClaimed { .. })
    }

    pub fn is_eligible(&self) -> bool {
        self.status == EligibilityStatus::Eligible
    }
}

/// Turns a wallet address into an [`Eligibility`] by reading the chain.
///
/// Holds no state between calls; a failed resolution leaves nothing behind.
pub struct EligibilityResolver {
    reader: Arc<dyn ClaimReader>,
    config: ClaimConfig,
    timeout: Duration,
}

impl EligibilityResolver {
    pub fn new(reader: Arc<dyn ClaimReader>, config: ClaimConfig, timeout: Duration) -> Self {
        Self {
            reader,
            config,
            timeout,
        }
    }

    pub fn tokens_per_nft(&self) -> u64 {
        self.config.tokens_per_nft
    }

    pub async fn resolve(&self, address: &str) -> Result<Eligibility, ClaimError> {
        let owner = parse_address(address)?;
        self.resolve_address(owner).await
    }

    pub async fn resolve_address(&self, owner: Address) -> Result<Eligibility, ClaimError> {
        info!("Resolving eligibility for {}", owner);

        let (primary_count, secondary_count, claimed) = tokio::try_join!(
            with_timeout(
                self.timeout,
                "primary balanceOf",
                self.reader.primary_balance(owner)
            ),
            with_timeout(
                self.timeout,
                "secondary balanceOf",
                self.reader.secondary_balance(owner)
            ),
            with_timeout(self.timeout, "hasClaimed", self.reader.has_claimed(owner)),
        )?;

        let holder = HolderRecord::new(
            owner,
            primary_count,
            secondary_count,
            self.config.tokens_per_nft,
        );

        let status = if claimed {
            EligibilityStatus::AlreadyClaimed {
                amount: self.paid_out(owner).await.unwrap_or(holder.claimable_amount),
            }
        } else if holder.total_nfts() == 0 {
            EligibilityStatus::NotEligible
        } else {
            EligibilityStatus::Eligible
        };

        info!(
            "{} holds {} + {} NFTs, claimable {}, status {:?}",
            owner, primary_count, secondary_count, holder.claimable_amount, status
        );
        Ok(Eligibility { holder, status })
    }

    /// Whole tokens the claim contract reports as paid, if it reports any.
    async fn paid_out(&self, owner: Address) -> Option<u128> {
        let raw = match with_timeout(
            self.timeout,
            "claimedAmount",
            self.reader.claimed_amount(owner),
        )
        .await
        {
            Ok(raw) => raw,
            Err(err) => {
                warn!("claimedAmount unavailable for {}: {}", owner, err);
                return None;
            }
        };
        let whole = raw / U256::from(10u64).pow(U256::from(self.config.token_decimals));
        match u128::try_from(whole) {
            Ok(0) | Err(_) => None,
            Ok(amount) => Some(amount),
        }
    }
}
