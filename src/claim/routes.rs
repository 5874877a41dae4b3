use crate::address::parse_address;
use crate::app::AppState;
use crate::chain::{TxStatus, with_timeout};
use crate::claim::models::ClaimRequest;
use crate::tracker::ClaimRecord;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Json, Router, routing::get, routing::post};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Records a claim after checking the chain agrees it happened: the
/// transaction must be mined successfully and `hasClaimed` must be true.
/// Recording twice returns the first record.
pub async fn claim_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ClaimRequest>,
) -> Result<Json<ClaimRecord>, (StatusCode, String)> {
    info!("Received claim record request {:?}", request);
    let owner = parse_address(&request.address).map_err(<(StatusCode, String)>::from)?;

    let status = with_timeout(
        state.rpc_timeout,
        "receipt lookup",
        state.reader.transaction_status(request.tx_hash),
    )
    .await
    .map_err(|e| {
        error!("Failed to look up {}: {:?}", request.tx_hash, e);
        <(StatusCode, String)>::from(e)
    })?;

    match status {
        TxStatus::Succeeded => {}
        TxStatus::Pending => {
            return Err((
                StatusCode::CONFLICT,
                format!("transaction {} is not confirmed yet", request.tx_hash),
            ));
        }
        TxStatus::Reverted => {
            warn!("Claim transaction {} reverted", request.tx_hash);
            return Err((
                StatusCode::UNPROCESSABLE_ENTITY,
                format!("transaction {} reverted", request.tx_hash),
            ));
        }
    }

    let claimed = with_timeout(
        state.rpc_timeout,
        "hasClaimed",
        state.reader.has_claimed(owner),
    )
    .await
    .map_err(<(StatusCode, String)>::from)?;
    if !claimed {
        return Err((
            StatusCode::CONFLICT,
            format!("claim contract does not list {owner} as claimed"),
        ));
    }

    state
        .tracker
        .record_claim(&owner, Some(request.tx_hash))
        .map(Json)
        .map_err(|e| {
            error!("Failed to record claim: {:?}", e);
            e.into()
        })
}

pub async fn claim_status_handler(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
) -> Result<Json<ClaimRecord>, (StatusCode, String)> {
    let owner = parse_address(&address).map_err(<(StatusCode, String)>::from)?;
    state
        .tracker
        .get(&owner)
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, format!("no claim recorded for {owner}")))
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(claim_handler))
        .route("/{address}", get(claim_status_handler))
}
