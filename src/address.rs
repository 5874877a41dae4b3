use crate::error::ClaimError;
use alloy::primitives::Address;

/// Parses a wallet address in any letter case.
///
/// Checksums are not enforced: `0xABC…` and `0xabc…` name the same wallet.
pub fn parse_address(input: &str) -> Result<Address, ClaimError> {
    let trimmed = input.trim();
    if !trimmed.starts_with("0x") && !trimmed.starts_with("0X") {
        return Err(ClaimError::InvalidAddress(input.to_string()));
    }
    let hex = &trimmed[2..];
    if hex.starts_with("0x") || hex.starts_with("0X") {
        return Err(ClaimError::InvalidAddress(input.to_string()));
    }
    hex.parse::<Address>()
        .map_err(|_| ClaimError::InvalidAddress(input.to_string()))
}

/// Lowercase `0x`-prefixed form used as the persisted identity key.
pub fn storage_key(address: &Address) -> String {
    address.to_string().to_ascii_lowercase()
}
