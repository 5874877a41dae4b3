use crate::error::ClaimError;
use alloy::primitives::Address;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tokens granted per qualifying NFT.
pub const DEFAULT_TOKENS_PER_NFT: u64 = 25_000;
pub const DEFAULT_TOKEN_DECIMALS: u8 = 18;
pub const DEFAULT_RPC_TIMEOUT_SECS: u64 = 20;
pub const DEFAULT_CONFIRMATION_TIMEOUT_SECS: u64 = 180;
const MAX_RPC_TIMEOUT_SECS: u64 = 120;
/// 10^77 is the largest power of ten a `uint256` holds.
const MAX_TOKEN_DECIMALS: u8 = 77;

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct StateConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    pub rpc: ChainConfig,
    #[serde(default = "default_rpc_timeout_secs")]
    pub rpc_timeout_secs: u64,
    /// How long a broadcast transaction may stay unconfirmed.
    #[serde(default = "default_confirmation_timeout_secs")]
    pub confirmation_timeout_secs: u64,
    pub contracts: ContractsConfig,
    #[serde(default)]
    pub claim: ClaimConfig,
    pub snapshot_path: String,
    /// Where confirmed claims are persisted. In-memory only when unset.
    #[serde(default)]
    pub claimed_store_path: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ChainConfig {
    pub name: String,
    pub chain_id: u64,
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ContractsConfig {
    /// The original collection.
    pub primary_nft: Address,
    /// The other collection; the one that may need `setApprovalForAll`.
    pub secondary_nft: Address,
    pub claim_manager: Address,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClaimConfig {
    #[serde(default = "default_tokens_per_nft")]
    pub tokens_per_nft: u64,
    #[serde(default = "default_token_decimals")]
    pub token_decimals: u8,
    #[serde(default)]
    pub contract_version: ContractVersion,
}

/// Differences between deployed claim contract versions.
///
/// Selected once at startup; the submitter branches on these flags instead of
/// carrying one code path per deployment.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ContractVersion {
    /// `claimTokens(uint256[], uint256[])` instead of `claimTokens()`.
    #[serde(default)]
    pub requires_token_id_params: bool,
    #[serde(default)]
    pub requires_approval_check: bool,
}

impl Default for ClaimConfig {
    fn default() -> Self {
        Self {
            tokens_per_nft: DEFAULT_TOKENS_PER_NFT,
            token_decimals: DEFAULT_TOKEN_DECIMALS,
            contract_version: ContractVersion::default(),
        }
    }
}

fn default_listen_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_rpc_timeout_secs() -> u64 {
    DEFAULT_RPC_TIMEOUT_SECS
}

fn default_confirmation_timeout_secs() -> u64 {
    DEFAULT_CONFIRMATION_TIMEOUT_SECS
}

fn default_tokens_per_nft() -> u64 {
    DEFAULT_TOKENS_PER_NFT
}

fn default_token_decimals() -> u8 {
    DEFAULT_TOKEN_DECIMALS
}

impl StateConfig {
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: StateConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ClaimError> {
        if self.rpc.url.trim().is_empty() {
            return Err(ClaimError::Config("rpc.url is empty".to_string()));
        }
        if !(1..=MAX_RPC_TIMEOUT_SECS).contains(&self.rpc_timeout_secs) {
            return Err(ClaimError::Config(format!(
                "rpcTimeoutSecs must be within 1..={MAX_RPC_TIMEOUT_SECS}, got {}",
                self.rpc_timeout_secs
            )));
        }
        if self.confirmation_timeout_secs == 0 {
            return Err(ClaimError::Config(
                "confirmationTimeoutSecs is zero".to_string(),
            ));
        }
        if self.claim.tokens_per_nft == 0 {
            return Err(ClaimError::Config("claim.tokensPerNft is zero".to_string()));
        }
        if self.claim.token_decimals > MAX_TOKEN_DECIMALS {
            return Err(ClaimError::Config(format!(
                "claim.tokenDecimals must be at most {MAX_TOKEN_DECIMALS}, got {}",
                self.claim.token_decimals
            )));
        }
        Ok(())
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }
}
