use crate::address::parse_address;
use crate::app::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Json, Router, routing::get};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Token ids a wallet held at snapshot time.
///
/// # Example
///
/// ```json
/// {
///     "primaryTokenIds": [0, 1, 2],
///     "secondaryTokenIds": [40],
///     "totalNfts": 4
/// }
/// ```
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WalletTokensResponse {
    pub primary_token_ids: Vec<u64>,
    pub secondary_token_ids: Vec<u64>,
    pub total_nfts: usize,
}

/// Serves ownership straight from the in-memory snapshot index. Unknown
/// wallets get empty lists rather than a 404 so clients need no special case.
pub async fn wallet_handler(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
) -> Result<Json<WalletTokensResponse>, (StatusCode, String)> {
    let owner = parse_address(&address).map_err(<(StatusCode, String)>::from)?;
    let tokens = state.index.lookup(&owner);
    info!("wallet {} holds {} indexed NFTs", owner, tokens.total());
    Ok(Json(WalletTokensResponse {
        total_nfts: tokens.total(),
        primary_token_ids: tokens.primary_token_ids,
        secondary_token_ids: tokens.secondary_token_ids,
    }))
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/{address}", get(wallet_handler))
}
