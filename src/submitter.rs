use crate::chain::{ClaimParams, ClaimWriter, wait_for_confirmation, with_timeout};
use crate::error::ClaimError;
use crate::index::TokenIdSource;
use crate::resolver::Eligibility;
use crate::state::ContractVersion;
use alloy::primitives::{Address, TxHash};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{error, info, warn};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Sends the claim for one wallet, approving the claim contract on the
/// secondary collection first when the deployed version needs it.
pub struct ClaimSubmitter {
    writer: Arc<dyn ClaimWriter>,
    token_ids: Arc<dyn TokenIdSource>,
    version: ContractVersion,
    claim_contract: Address,
    rpc_timeout: Duration,
    confirmation_timeout: Duration,
    poll_interval: Duration,
    /// Set once an approval is confirmed or observed on-chain, so a retried
    /// claim never asks for approval twice.
    approved: AtomicBool,
}

impl ClaimSubmitter {
    pub fn new(
        writer: Arc<dyn ClaimWriter>,
        token_ids: Arc<dyn TokenIdSource>,
        version: ContractVersion,
        claim_contract: Address,
        rpc_timeout: Duration,
        confirmation_timeout: Duration,
    ) -> Self {
        Self {
            writer,
            token_ids,
            version,
            claim_contract,
            rpc_timeout,
            confirmation_timeout,
            poll_interval: DEFAULT_POLL_INTERVAL,
            approved: AtomicBool::new(false),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn account(&self) -> Address {
        self.writer.account()
    }

    pub fn is_approved(&self) -> bool {
        self.approved.load(Ordering::SeqCst)
    }

    /// Whether this claim moves secondary NFTs under an approval-checking
    /// contract version.
    pub fn needs_approval(&self, eligibility: &Eligibility) -> bool {
        self.version.requires_approval_check && eligibility.holder.secondary_count > 0
    }

    /// Approves, if needed, then sends the claim. Returns the unconfirmed
    /// claim transaction; see [`ClaimSubmitter::confirm`].
    pub async fn submit_claim(&self, eligibility: &Eligibility) -> Result<TxHash, ClaimError> {
        self.check_claimable(eligibility)?;
        self.ensure_approval(eligibility).await?;
        self.send_claim(eligibility).await
    }

    /// Requests `setApprovalForAll` and waits for it to confirm. Returns the
    /// approval transaction when one had to be sent.
    pub async fn ensure_approval(
        &self,
        eligibility: &Eligibility,
    ) -> Result<Option<TxHash>, ClaimError> {
        if !self.needs_approval(eligibility) || self.is_approved() {
            return Ok(None);
        }

        let account = self.account();
        let approved = with_timeout(
            self.rpc_timeout,
            "isApprovedForAll",
            self.writer.is_approved_for_all(account, self.claim_contract),
        )
        .await?;
        if approved {
            info!("{} already approved the claim contract", account);
            self.approved.store(true, Ordering::SeqCst);
            return Ok(None);
        }

        info!("Requesting approval of {} for {}", self.claim_contract, account);
        let tx_hash = self
            .writer
            .send_approval(self.claim_contract)
            .await
            .inspect_err(|e| error!("Approval failed: {:?}", e))?;
        self.confirm(tx_hash).await?;
        self.approved.store(true, Ordering::SeqCst);
        info!("Approval confirmed {}", tx_hash);
        Ok(Some(tx_hash))
    }

    /// Builds the claim call for the configured contract version and
    /// broadcasts it. Fails with `ApprovalRequired` when approval is still
    /// outstanding.
    pub async fn send_claim(&self, eligibility: &Eligibility) -> Result<TxHash, ClaimError> {
        self.check_claimable(eligibility)?;
        if self.needs_approval(eligibility) && !self.is_approved() {
            return Err(ClaimError::ApprovalRequired);
        }

        let params = self.claim_params(eligibility).await?;
        let tx_hash = self
            .writer
            .send_claim(&params)
            .await
            .inspect_err(|e| error!("Failed to submit the claim: {:?}", e))?;
        info!("Claim submitted with hash {}", tx_hash);
        Ok(tx_hash)
    }

    /// Blocks until `tx_hash` is mined successfully.
    pub async fn confirm(&self, tx_hash: TxHash) -> Result<(), ClaimError> {
        wait_for_confirmation(
            self.writer.as_ref(),
            tx_hash,
            self.rpc_timeout,
            self.poll_interval,
            self.confirmation_timeout,
        )
        .await
    }

    async fn claim_params(&self, eligibility: &Eligibility) -> Result<ClaimParams, ClaimError> {
        if !self.version.requires_token_id_params {
            return Ok(ClaimParams::Balance);
        }
        let holder = &eligibility.holder;
        let tokens = self.token_ids.token_ids(holder.address).await?;
        if tokens.is_empty() {
            return Err(ClaimError::Index(format!(
                "no token ids known for {}",
                holder.address
            )));
        }
        if tokens.total() as u64 != holder.total_nfts() {
            warn!(
                "index lists {} token ids for {} but the chain reports {} NFTs",
                tokens.total(),
                holder.address,
                holder.total_nfts()
            );
        }
        Ok(ClaimParams::TokenIds(tokens))
    }

    fn check_claimable(&self, eligibility: &Eligibility) -> Result<(), ClaimError> {
        if eligibility.already_claimed() {
            return Err(ClaimError::AlreadyClaimed);
        }
        if !eligibility.is_eligible() {
            return Err(ClaimError::NotEligible);
        }
        let account = self.account();
        if eligibility.holder.address != account {
            return Err(ClaimError::InvalidAddress(format!(
                "eligibility is for {} but the wallet is {}",
                eligibility.holder.address, account
            )));
        }
        Ok(())
    }
}
