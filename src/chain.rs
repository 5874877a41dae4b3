use crate::error::{ClaimError, classify_rpc_error};
use crate::index::WalletTokens;
use crate::state::ContractsConfig;
use alloy::network::ReceiptResponse;
use alloy::primitives::{Address, TxHash, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::signers::local::PrivateKeySigner;
use alloy::sol;
use alloy::transports::{RpcError, TransportError};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

sol! {
    #[sol(rpc)]
    contract LiminalNft {
        function balanceOf(address owner) external view returns (uint256);
        function isApprovedForAll(address owner, address operator) external view returns (bool);
        function setApprovalForAll(address operator, bool approved) external;
    }

    #[sol(rpc)]
    contract ClaimManager {
        function hasClaimed(address wallet) external view returns (bool);
        function claimedAmount(address wallet) external view returns (uint256);
        function claimTokens() external;
    }

    #[sol(rpc)]
    contract ClaimManagerWithTokenIds {
        function claimTokens(uint256[] calldata originalTokenIds, uint256[] calldata otherTokenIds) external;
    }
}

/// Outcome of a broadcast transaction as seen by the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    Pending,
    Succeeded,
    Reverted,
}

/// Argument list of the claim call; which one applies depends on the deployed
/// contract version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimParams {
    /// The contract checks balances on-chain.
    Balance,
    TokenIds(WalletTokens),
}

/// Read-only view of the two collections and the claim contract.
#[async_trait]
pub trait ClaimReader: Send + Sync {
    async fn primary_balance(&self, owner: Address) -> Result<u64, ClaimError>;

    async fn secondary_balance(&self, owner: Address) -> Result<u64, ClaimError>;

    async fn has_claimed(&self, owner: Address) -> Result<bool, ClaimError>;

    /// Amount paid out to `owner`, in token base units.
    async fn claimed_amount(&self, owner: Address) -> Result<U256, ClaimError>;

    /// Whether `operator` may move `owner`'s secondary NFTs.
    async fn is_approved_for_all(
        &self,
        owner: Address,
        operator: Address,
    ) -> Result<bool, ClaimError>;

    async fn transaction_status(&self, tx_hash: TxHash) -> Result<TxStatus, ClaimError>;
}

/// A wallet able to sign and broadcast the approval and claim transactions.
#[async_trait]
pub trait ClaimWriter: ClaimReader {
    fn account(&self) -> Address;

    /// `setApprovalForAll(operator, true)` on the secondary collection.
    async fn send_approval(&self, operator: Address) -> Result<TxHash, ClaimError>;

    async fn send_claim(&self, params: &ClaimParams) -> Result<TxHash, ClaimError>;
}

/// Bounds a single chain call; an elapsed timer is a network failure.
pub async fn with_timeout<T, F>(limit: Duration, what: &str, call: F) -> Result<T, ClaimError>
where
    F: Future<Output = Result<T, ClaimError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => {
            warn!("{} timed out after {:?}", what, limit);
            Err(ClaimError::Network(format!("{what} timed out after {limit:?}")))
        }
    }
}

/// Polls the node until `tx_hash` is mined or `limit` runs out.
///
/// A mined but failed transaction is `ContractReverted`; receipts carry no
/// revert reason. Failed lookups are retried until `limit`.
pub async fn wait_for_confirmation<R>(
    reader: &R,
    tx_hash: TxHash,
    rpc_timeout: Duration,
    poll_interval: Duration,
    limit: Duration,
) -> Result<(), ClaimError>
where
    R: ClaimReader + ?Sized,
{
    let poll = async {
        loop {
            match with_timeout(rpc_timeout, "receipt lookup", reader.transaction_status(tx_hash))
                .await
            {
                Ok(TxStatus::Succeeded) => return Ok(()),
                Ok(TxStatus::Reverted) => return Err(ClaimError::ContractReverted(None)),
                Ok(TxStatus::Pending) => debug!("{} still pending", tx_hash),
                // the transaction is already out; keep watching through flaky reads
                Err(ClaimError::Network(msg)) => warn!("receipt lookup failed: {}", msg),
                Err(err) => return Err(err),
            }
            tokio::time::sleep(poll_interval).await;
        }
    };
    match tokio::time::timeout(limit, poll).await {
        Ok(result) => result,
        Err(_) => Err(ClaimError::Network(format!(
            "transaction {tx_hash} not confirmed after {limit:?}"
        ))),
    }
}

pub(crate) fn contract_error(err: alloy::contract::Error) -> ClaimError {
    match err {
        alloy::contract::Error::TransportError(err) => transport_error(err),
        other => ClaimError::Network(other.to_string()),
    }
}

pub(crate) fn transport_error(err: TransportError) -> ClaimError {
    match err {
        RpcError::ErrorResp(payload) => classify_rpc_error(payload.code, &payload.message),
        other => ClaimError::Network(other.to_string()),
    }
}

fn to_count(balance: U256) -> Result<u64, ClaimError> {
    u64::try_from(balance)
        .map_err(|_| ClaimError::Network(format!("balance {balance} does not fit in u64")))
}

/// JSON-RPC backed reader.
#[derive(Clone)]
pub struct AlloyClaimReader {
    provider: DynProvider,
    contracts: ContractsConfig,
}

impl AlloyClaimReader {
    pub async fn connect(url: &str, contracts: ContractsConfig) -> Result<Self, ClaimError> {
        let provider = ProviderBuilder::new()
            .connect(url)
            .await
            .map_err(transport_error)?
            .erased();
        info!("Connected read provider to {}", url);
        Ok(Self::with_provider(provider, contracts))
    }

    pub fn with_provider(provider: DynProvider, contracts: ContractsConfig) -> Self {
        Self {
            provider,
            contracts,
        }
    }

    async fn balance_of(&self, collection: Address, owner: Address) -> Result<u64, ClaimError> {
        let nft = LiminalNft::new(collection, self.provider.clone());
        let balance = nft.balanceOf(owner).call().await.map_err(contract_error)?;
        to_count(balance)
    }
}

#[async_trait]
impl ClaimReader for AlloyClaimReader {
    async fn primary_balance(&self, owner: Address) -> Result<u64, ClaimError> {
        self.balance_of(self.contracts.primary_nft, owner).await
    }

    async fn secondary_balance(&self, owner: Address) -> Result<u64, ClaimError> {
        self.balance_of(self.contracts.secondary_nft, owner).await
    }

    async fn has_claimed(&self, owner: Address) -> Result<bool, ClaimError> {
        ClaimManager::new(self.contracts.claim_manager, self.provider.clone())
            .hasClaimed(owner)
            .call()
            .await
            .map_err(contract_error)
    }

    async fn claimed_amount(&self, owner: Address) -> Result<U256, ClaimError> {
        ClaimManager::new(self.contracts.claim_manager, self.provider.clone())
            .claimedAmount(owner)
            .call()
            .await
            .map_err(contract_error)
    }

    async fn is_approved_for_all(
        &self,
        owner: Address,
        operator: Address,
    ) -> Result<bool, ClaimError> {
        LiminalNft::new(self.contracts.secondary_nft, self.provider.clone())
            .isApprovedForAll(owner, operator)
            .call()
            .await
            .map_err(contract_error)
    }

    async fn transaction_status(&self, tx_hash: TxHash) -> Result<TxStatus, ClaimError> {
        let receipt = self
            .provider
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(transport_error)?;
        Ok(match receipt {
            None => TxStatus::Pending,
            Some(receipt) if ReceiptResponse::status(&receipt) => TxStatus::Succeeded,
            Some(_) => TxStatus::Reverted,
        })
    }
}

/// JSON-RPC backed wallet holding a local signing key.
#[derive(Clone)]
pub struct AlloyClaimWriter {
    reader: AlloyClaimReader,
    account: Address,
}

impl AlloyClaimWriter {
    pub async fn connect(
        url: &str,
        contracts: ContractsConfig,
        signer: PrivateKeySigner,
    ) -> Result<Self, ClaimError> {
        let account = signer.address();
        let provider = ProviderBuilder::new()
            .wallet(signer)
            .connect(url)
            .await
            .map_err(transport_error)?
            .erased();
        info!("Connected signing provider for {} to {}", account, url);
        Ok(Self {
            reader: AlloyClaimReader::with_provider(provider, contracts),
            account,
        })
    }
}

#[async_trait]
impl ClaimReader for AlloyClaimWriter {
    async fn primary_balance(&self, owner: Address) -> Result<u64, ClaimError> {
        self.reader.primary_balance(owner).await
    }

    async fn secondary_balance(&self, owner: Address) -> Result<u64, ClaimError> {
        self.reader.secondary_balance(owner).await
    }

    async fn has_claimed(&self, owner: Address) -> Result<bool, ClaimError> {
        self.reader.has_claimed(owner).await
    }

    async fn claimed_amount(&self, owner: Address) -> Result<U256, ClaimError> {
        self.reader.claimed_amount(owner).await
    }

    async fn is_approved_for_all(
        &self,
        owner: Address,
        operator: Address,
    ) -> Result<bool, ClaimError> {
        self.reader.is_approved_for_all(owner, operator).await
    }

    async fn transaction_status(&self, tx_hash: TxHash) -> Result<TxStatus, ClaimError> {
        self.reader.transaction_status(tx_hash).await
    }
}

#[async_trait]
impl ClaimWriter for AlloyClaimWriter {
    fn account(&self) -> Address {
        self.account
    }

    async fn send_approval(&self, operator: Address) -> Result<TxHash, ClaimError> {
        let nft = LiminalNft::new(
            self.reader.contracts.secondary_nft,
            self.reader.provider.clone(),
        );
        let pending_tx = nft
            .setApprovalForAll(operator, true)
            .send()
            .await
            .map_err(contract_error)?;
        let tx_hash = *pending_tx.tx_hash();
        info!("Approval submitted with hash {}", tx_hash);
        Ok(tx_hash)
    }

    async fn send_claim(&self, params: &ClaimParams) -> Result<TxHash, ClaimError> {
        let claim_manager = self.reader.contracts.claim_manager;
        let provider = self.reader.provider.clone();
        let pending_tx = match params {
            ClaimParams::Balance => ClaimManager::new(claim_manager, provider)
                .claimTokens()
                .send()
                .await
                .map_err(contract_error)?,
            ClaimParams::TokenIds(tokens) => {
                let primary: Vec<U256> = tokens
                    .primary_token_ids
                    .iter()
                    .map(|id| U256::from(*id))
                    .collect();
                let secondary: Vec<U256> = tokens
                    .secondary_token_ids
                    .iter()
                    .map(|id| U256::from(*id))
                    .collect();
                ClaimManagerWithTokenIds::new(claim_manager, provider)
                    .claimTokens(primary, secondary)
                    .send()
                    .await
                    .map_err(contract_error)?
            }
        };
        let tx_hash = *pending_tx.tx_hash();
        info!("Claim submitted with hash {}", tx_hash);
        Ok(tx_hash)
    }
}


#[cfg(test)]
mod tests {
    use super::fake::FakeChain;
    use super::*;

    #[tokio::test]
    async fn test_with_timeout_maps_to_network() {
        let result: Result<(), ClaimError> =
            with_timeout(Duration::from_millis(10), "balanceOf", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        match result {
            Err(ClaimError::Network(msg)) => assert!(msg.contains("balanceOf timed out")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_wait_for_confirmation_polls_until_mined() {
        let chain = FakeChain {
            confirm_after_polls: 2,
            ..FakeChain::new(Address::repeat_byte(1))
        };
        let tx_hash = chain.send_claim(&ClaimParams::Balance).await.unwrap();
        let result = wait_for_confirmation(
            &chain,
            tx_hash,
            Duration::from_secs(1),
            Duration::from_millis(1),
            Duration::from_secs(5),
        )
        .await;
        assert_eq!(result, Ok(()));
    }

    #[tokio::test]
    async fn test_wait_for_confirmation_reports_revert() {
        let chain = FakeChain {
            revert_claims: true,
            ..FakeChain::new(Address::repeat_byte(1))
        };
        let tx_hash = chain.send_claim(&ClaimParams::Balance).await.unwrap();
        let result = wait_for_confirmation(
            &chain,
            tx_hash,
            Duration::from_secs(1),
            Duration::from_millis(1),
            Duration::from_secs(5),
        )
        .await;
        assert_eq!(result, Err(ClaimError::ContractReverted(None)));
    }

    #[tokio::test]
    async fn test_wait_for_confirmation_gives_up() {
        let chain = FakeChain::new(Address::repeat_byte(1));
        let result = wait_for_confirmation(
            &chain,
            TxHash::repeat_byte(7),
            Duration::from_secs(1),
            Duration::from_millis(1),
            Duration::from_millis(20),
        )
        .await;
        assert!(matches!(result, Err(ClaimError::Network(_))));
    }
}
