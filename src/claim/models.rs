use alloy::primitives::TxHash;
use serde::{Deserialize, Serialize};

/// Body of `POST /claims`.
///
/// # Example
///
/// ```json
/// {
///     "address": "0xa2eb6be3bde7e99a8e68e6252e006ced620ff02f",
///     "txHash": "0x5c504ed432cb51138bcf09aa5e8a410dd4a1e204ef84bfed1be16dfba1b22060"
/// }
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClaimRequest {
    pub address: String,
    pub tx_hash: TxHash,
}
