use crate::address::storage_key;
use crate::error::ClaimError;
use alloy::primitives::{Address, TxHash};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimRecord {
    /// Lowercase address.
    pub address: String,
    pub claimed: bool,
    /// Unix seconds of the first recorded confirmation.
    pub timestamp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<TxHash>,
}

/// Wallets that already went through a confirmed claim in this client.
///
/// Only suppresses re-prompting; the claim contract's own `hasClaimed` stays
/// the source of truth. Records are written once and never changed or removed.
#[derive(Debug)]
pub struct ClaimTracker {
    records: Mutex<HashMap<String, ClaimRecord>>,
    path: Option<PathBuf>,
}

impl ClaimTracker {
    pub fn in_memory() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            path: None,
        }
    }

    /// Opens a tracker persisted at `path`, starting empty if the file is missing.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ClaimError> {
        let path = path.as_ref().to_path_buf();
        let records = match std::fs::read_to_string(&path) {
            Ok(content) => {
                let list: Vec<ClaimRecord> = serde_json::from_str(&content)
                    .map_err(|e| ClaimError::Storage(format!("{}: {e}", path.display())))?;
                list.into_iter()
                    .map(|record| (record.address.to_ascii_lowercase(), record))
                    .collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(ClaimError::Storage(format!("{}: {e}", path.display()))),
        };
        info!("Claim tracker opened with {} records", records.len());
        Ok(Self {
            records: Mutex::new(records),
            path: Some(path),
        })
    }

    /// Records a confirmed claim. A second call for the same wallet returns the
    /// first record untouched.
    pub fn record_claim(
        &self,
        address: &Address,
        tx_hash: Option<TxHash>,
    ) -> Result<ClaimRecord, ClaimError> {
        let key = storage_key(address);
        let mut records = self
            .records
            .lock()
            .map_err(|_| ClaimError::Storage("tracker lock poisoned".to_string()))?;

        if let Some(existing) = records.get(&key) {
            debug!("claim for {} already recorded", key);
            return Ok(existing.clone());
        }

        let record = ClaimRecord {
            address: key.clone(),
            claimed: true,
            timestamp: unix_now(),
            tx_hash,
        };
        if let Some(path) = &self.path {
            let mut staged = records.clone();
            staged.insert(key.clone(), record.clone());
            persist(path, &staged)?;
        }
        records.insert(key, record.clone());
        info!("Recorded claim for {}", record.address);
        Ok(record)
    }

    pub fn has_claimed(&self, address: &Address) -> bool {
        self.get(address).is_some_and(|record| record.claimed)
    }

    pub fn get(&self, address: &Address) -> Option<ClaimRecord> {
        self.records
            .lock()
            .ok()
            .and_then(|records| records.get(&storage_key(address)).cloned())
    }
}

fn persist(path: &Path, records: &HashMap<String, ClaimRecord>) -> Result<(), ClaimError> {
    let mut list: Vec<&ClaimRecord> = records.values().collect();
    list.sort_by(|a, b| a.address.cmp(&b.address));
    let json = serde_json::to_string_pretty(&list)
        .map_err(|e| ClaimError::Storage(e.to_string()))?;
    std::fs::write(path, json).map_err(|e| ClaimError::Storage(format!("{}: {e}", path.display())))
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
