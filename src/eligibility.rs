use crate::address::storage_key;
use crate::app::AppState;
use crate::resolver::{Eligibility, EligibilityStatus};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Json, Router, routing::get};
use serde::Serialize;
use std::sync::Arc;
use tracing::error;

/// # Example
///
/// ```json
/// {
///     "address": "0xa2eb6be3bde7e99a8e68e6252e006ced620ff02f",
///     "primaryCount": 136,
///     "secondaryCount": 0,
///     "claimableAmount": 3400000,
///     "alreadyClaimed": false,
///     "status": { "kind": "eligible" }
/// }
/// ```
#[derive(Serialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EligibilityResponse {
    pub address: String,
    pub primary_count: u64,
    pub secondary_count: u64,
    pub claimable_amount: u128,
    pub already_claimed: bool,
    pub status: EligibilityStatus,
}

impl From<Eligibility> for EligibilityResponse {
    fn from(eligibility: Eligibility) -> Self {
        let holder = eligibility.holder;
        Self {
            address: storage_key(&holder.address),
            primary_count: holder.primary_count,
            secondary_count: holder.secondary_count,
            claimable_amount: holder.claimable_amount,
            already_claimed: eligibility.already_claimed(),
            status: eligibility.status,
        }
    }
}

/// Live eligibility read from the chain. Network trouble is a 503 the client
/// may retry; nothing is cached either way.
pub async fn eligibility_handler(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
) -> Result<Json<EligibilityResponse>, (StatusCode, String)> {
    state
        .resolver
        .resolve(&address)
        .await
        .map(|eligibility| Json(eligibility.into()))
        .map_err(|e| {
            error!("Failed to resolve eligibility for {}: {:?}", address, e);
            e.into()
        })
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/{address}", get(eligibility_handler))
}
