use crate::chain::ClaimReader;
use crate::index::TokenIndex;
use crate::resolver::EligibilityResolver;
use crate::tracker::ClaimTracker;
use crate::{claim, eligibility, wallet};
use axum::Router;
use std::sync::Arc;
use std::time::Duration;

/// Shared state of the HTTP service, built once in `main`.
pub struct AppState {
    pub index: Arc<TokenIndex>,
    pub resolver: Arc<EligibilityResolver>,
    pub reader: Arc<dyn ClaimReader>,
    pub tracker: Arc<ClaimTracker>,
    pub rpc_timeout: Duration,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/wallet", wallet::routes())
        .nest("/eligibility", eligibility::routes())
        .nest("/claims", claim::routes::routes())
        .with_state(state)
}
