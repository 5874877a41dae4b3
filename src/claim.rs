//! Server-side record of confirmed claims.
//!
//! A claim is only recorded once the chain shows its transaction mined
//! successfully and the claim contract reports the wallet as claimed.

pub mod models;
pub mod routes;
