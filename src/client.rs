use crate::address::storage_key;
use crate::error::ClaimError;
use crate::index::{TokenIdSource, WalletTokens};
use alloy::primitives::Address;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::info;

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct WalletResponse {
    primary_token_ids: Vec<u64>,
    secondary_token_ids: Vec<u64>,
}

/// Fetches token ids from the backend's `GET /wallet/{address}` instead of
/// enumerating ownership on-chain.
#[derive(Debug, Clone)]
pub struct WalletApiClient {
    base_url: String,
    client: Client,
}

impl WalletApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClaimError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClaimError::Config(format!("failed to build http client: {e}")))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl TokenIdSource for WalletApiClient {
    async fn token_ids(&self, owner: Address) -> Result<WalletTokens, ClaimError> {
        let url = format!("{}/wallet/{}", self.base_url, storage_key(&owner));
        info!("Fetching token ids from {}", url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ClaimError::Network(format!("Failed to send request: {e}")))?
            .error_for_status()
            .map_err(|e| ClaimError::Network(e.to_string()))?
            .json::<WalletResponse>()
            .await
            .map_err(|e| ClaimError::Index(format!("Failed to deserialize wallet response: {e}")))?;
        Ok(WalletTokens {
            primary_token_ids: response.primary_token_ids,
            secondary_token_ids: response.secondary_token_ids,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    const WALLET: &str = "0xa2eb6be3bde7e99a8e68e6252e006ced620ff02f";

    #[tokio::test]
    async fn test_fetches_token_ids() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path(format!("/wallet/{WALLET}"));
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({
                    "primaryTokenIds": [0, 1, 2],
                    "secondaryTokenIds": [17],
                    "totalNfts": 4
                }));
        });

        let client = WalletApiClient::new(&server.base_url(), Duration::from_secs(5)).unwrap();
        let owner: Address = WALLET.parse().unwrap();
        let tokens = client.token_ids(owner).await.unwrap();

        mock.assert();
        assert_eq!(tokens.primary_token_ids, vec![0, 1, 2]);
        assert_eq!(tokens.secondary_token_ids, vec![17]);
        assert_eq!(tokens.total(), 4);
    }

    #[tokio::test]
    async fn test_server_error_is_network() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path(format!("/wallet/{WALLET}"));
            then.status(503);
        });

        let client = WalletApiClient::new(&server.url("/"), Duration::from_secs(5)).unwrap();
        let result = client.token_ids(WALLET.parse().unwrap()).await;

        mock.assert();
        assert!(matches!(result, Err(ClaimError::Network(_))));
    }

    #[tokio::test]
    async fn test_malformed_body_is_index_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path(format!("/wallet/{WALLET}"));
            then.status(200).body("not json");
        });

        let client = WalletApiClient::new(&server.base_url(), Duration::from_secs(5)).unwrap();
        let result = client.token_ids(WALLET.parse().unwrap()).await;
        assert!(matches!(result, Err(ClaimError::Index(_))));
    }
}
