use crate::address::parse_address;
use crate::error::ClaimError;
use alloy::primitives::Address;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::{info, warn};

/// Token ids a wallet owns in each collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletTokens {
    pub primary_token_ids: Vec<u64>,
    pub secondary_token_ids: Vec<u64>,
}

impl WalletTokens {
    pub fn total(&self) -> usize {
        self.primary_token_ids.len() + self.secondary_token_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Anything that can list the token ids owned by a wallet.
#[async_trait]
pub trait TokenIdSource: Send + Sync {
    async fn token_ids(&self, owner: Address) -> Result<WalletTokens, ClaimError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotFile {
    holders: Vec<SnapshotHolder>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotHolder {
    address: String,
    #[serde(default)]
    primary_token_ids: Vec<u64>,
    #[serde(default)]
    secondary_token_ids: Vec<u64>,
}

#[derive(Default)]
struct Holdings {
    primary: BTreeSet<u64>,
    secondary: BTreeSet<u64>,
}

/// Wallet → owned token ids, built once from a static snapshot.
///
/// Saves enumerating ownership on-chain when a claim contract wants explicit
/// token ids. Never refreshed while the process runs.
#[derive(Debug, Default, Clone)]
pub struct TokenIndex {
    wallets: HashMap<Address, WalletTokens>,
}

impl TokenIndex {
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read snapshot {path}"))?;
        Self::from_json(&content).with_context(|| format!("Failed to load snapshot {path}"))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: SnapshotFile =
            serde_json::from_str(json).context("Failed to parse snapshot json")?;

        let mut merged: HashMap<Address, Holdings> = HashMap::new();
        for holder in snapshot.holders {
            let address = parse_address(&holder.address)?;
            let entry = merged.entry(address).or_default();
            let before = entry.primary.len() + entry.secondary.len();
            let listed = holder.primary_token_ids.len() + holder.secondary_token_ids.len();
            entry.primary.extend(holder.primary_token_ids);
            entry.secondary.extend(holder.secondary_token_ids);
            let added = entry.primary.len() + entry.secondary.len() - before;
            if added != listed {
                warn!(
                    "snapshot lists {} duplicate token ids for {}",
                    listed - added,
                    holder.address
                );
            }
        }

        let wallets: HashMap<Address, WalletTokens> = merged
            .into_iter()
            .map(|(address, holdings)| {
                (
                    address,
                    WalletTokens {
                        primary_token_ids: holdings.primary.into_iter().collect(),
                        secondary_token_ids: holdings.secondary.into_iter().collect(),
                    },
                )
            })
            .collect();

        let index = Self { wallets };
        info!(
            "Loaded {} wallets holding {} NFTs from snapshot",
            index.wallet_count(),
            index.total_nfts()
        );
        Ok(index)
    }

    /// Owned token ids, empty for wallets the snapshot does not know.
    pub fn lookup(&self, owner: &Address) -> WalletTokens {
        self.wallets.get(owner).cloned().unwrap_or_default()
    }

    pub fn wallet_count(&self) -> usize {
        self.wallets.len()
    }

    pub fn total_nfts(&self) -> usize {
        self.wallets.values().map(WalletTokens::total).sum()
    }
}

#[async_trait]
impl TokenIdSource for TokenIndex {
    async fn token_ids(&self, owner: Address) -> Result<WalletTokens, ClaimError> {
        Ok(self.lookup(&owner))
    }
}
