use axum::http::StatusCode;
use thiserror::Error;

/// Everything that can go wrong between a wallet address and a confirmed claim.
///
/// `NotEligible` and `AlreadyClaimed` are final states of the flow rather than
/// faults; they only show up as errors when a caller tries to submit a claim
/// that the resolver already ruled out.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClaimError {
    /// RPC endpoint unreachable, failed, or timed out.
    #[error("network error: {0}")]
    Network(String),
    /// The signer declined the request.
    #[error("request rejected in wallet")]
    UserRejected,
    #[error("insufficient funds for gas or value")]
    InsufficientFunds,
    #[error("secondary collection must approve the claim contract first")]
    ApprovalRequired,
    /// Carries the contract's revert reason verbatim when the node reported one.
    #[error("contract reverted{}", revert_suffix(.0))]
    ContractReverted(Option<String>),
    #[error("wallet holds no qualifying NFTs")]
    NotEligible,
    #[error("wallet has already claimed")]
    AlreadyClaimed,
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    #[error("token index: {0}")]
    Index(String),
    #[error("claim store: {0}")]
    Storage(String),
    #[error("config: {0}")]
    Config(String),
}

impl ClaimError {
    /// Whether offering the user a retry makes sense.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClaimError::Network(_)
                | ClaimError::InsufficientFunds
                | ClaimError::ApprovalRequired
                | ClaimError::ContractReverted(_)
                | ClaimError::Storage(_)
        )
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ClaimError::Network(_) => StatusCode::SERVICE_UNAVAILABLE,
            ClaimError::InvalidAddress(_) => StatusCode::BAD_REQUEST,
            ClaimError::NotEligible | ClaimError::AlreadyClaimed => StatusCode::CONFLICT,
            ClaimError::ContractReverted(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ClaimError::UserRejected
            | ClaimError::InsufficientFunds
            | ClaimError::ApprovalRequired => StatusCode::PRECONDITION_FAILED,
            ClaimError::Index(_) | ClaimError::Storage(_) | ClaimError::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<ClaimError> for (StatusCode, String) {
    fn from(err: ClaimError) -> Self {
        (err.status_code(), err.to_string())
    }
}

/// Maps a JSON-RPC error response onto the claim taxonomy.
///
/// Wallets report rejection as EIP-1193 code 4001; nodes report reverts with
/// code 3 or an "execution reverted" message, optionally followed by the
/// reason string.
pub fn classify_rpc_error(code: i64, message: &str) -> ClaimError {
    let lower = message.to_ascii_lowercase();
    if code == 4001 || lower.contains("user rejected") || lower.contains("user denied") {
        return ClaimError::UserRejected;
    }
    if lower.contains("insufficient funds") {
        return ClaimError::InsufficientFunds;
    }
    if code == 3 || lower.contains("revert") {
        return ClaimError::ContractReverted(revert_reason(message));
    }
    ClaimError::Network(format!("rpc error {code}: {message}"))
}

fn revert_suffix(reason: &Option<String>) -> String {
    reason
        .as_ref()
        .map(|reason| format!(": {reason}"))
        .unwrap_or_default()
}

fn revert_reason(message: &str) -> Option<String> {
    let lower = message.to_ascii_lowercase();
    let idx = lower.find("execution reverted")?;
    let rest = message[idx + "execution reverted".len()..]
        .trim_start_matches(':')
        .trim();
    if rest.is_empty() {
        None
    } else {
        Some(rest.to_string())
    }
}
