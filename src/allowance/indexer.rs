use crate::core::{SwapError, SwapResult};
use log::debug;
use num_bigint::BigUint;
use num_traits::Zero;
use serde::Deserialize;
use std::str::FromStr;

/// Client for the allowance-indexing service: a paginated view of every
/// ERC-20 approval an owner address has granted on a chain.
pub struct IndexerClient {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApprovalsPage {
    #[serde(default)]
    result: Vec<ApprovalEntry>,
    #[serde(default)]
    cursor: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalEntry {
    pub spender: String,
    pub token_address: String,
    /// Granted allowance in smallest units, as a decimal string.
    pub value: String,
}

impl IndexerClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Walk the paginated approvals list until the (spender, token)
    /// entry turns up or the cursor runs out. Exhausted pagination means
    /// the owner never granted this spender anything: allowance zero,
    /// not an error.
    pub async fn token_allowance(
        &self,
        chain: &str,
        owner_address: &str,
        spender_address: &str,
        token_address: &str,
    ) -> SwapResult<BigUint> {
        let url = format!("{}/approvals", self.base_url);
        let mut cursor: Option<String> = None;
        let mut pages = 0u32;

        loop {
            let mut query: Vec<(&str, String)> = vec![
                ("chain", chain.to_string()),
                ("ownerAddress", owner_address.to_string()),
            ];
            if let Some(c) = &cursor {
                query.push(("cursor", c.clone()));
            }

            let response = self.client.get(&url).query(&query).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(SwapError::AllowanceQueryFailed(format!(
                    "indexer returned HTTP {}",
                    status
                )));
            }
            let page: ApprovalsPage = response
                .json()
                .await
                .map_err(|e| SwapError::AllowanceQueryFailed(e.to_string()))?;
            pages += 1;

            for entry in &page.result {
                if entry.spender.eq_ignore_ascii_case(spender_address)
                    && entry.token_address.eq_ignore_ascii_case(token_address)
                {
                    debug!(
                        "Found allowance entry for spender {} after {} page(s)",
                        spender_address, pages
                    );
                    return BigUint::from_str(&entry.value).map_err(|_| {
                        SwapError::AllowanceQueryFailed(format!(
                            "unparseable allowance value: {}",
                            entry.value
                        ))
                    });
                }
            }

            match page.cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => {
                    debug!(
                        "Approvals pagination exhausted after {} page(s), treating allowance as 0",
                        pages
                    );
                    return Ok(BigUint::zero());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    const OWNER: &str = "0x1111111111111111111111111111111111111111";
    const SPENDER: &str = "0x2222222222222222222222222222222222222222";
    const TOKEN: &str = "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48";

    #[tokio::test]
    async fn test_entry_found_on_second_page() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/approvals")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("chain".into(), "eth".into()),
                Matcher::UrlEncoded("ownerAddress".into(), OWNER.into()),
            ]))
            .with_status(200)
            .with_body(format!(
                r#"{{"result":[{{"spender":"0xother","tokenAddress":"{}","value":"1"}}],"cursor":"page2"}}"#,
                TOKEN
            ))
            .create_async()
            .await;
        server
            .mock("GET", "/approvals")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("cursor".into(), "page2".into()),
            ]))
            .with_status(200)
            .with_body(format!(
                r#"{{"result":[{{"spender":"{}","tokenAddress":"{}","value":"500000000"}}]}}"#,
                SPENDER, TOKEN
            ))
            .create_async()
            .await;

        let client = IndexerClient::new(server.url());
        let allowance = client
            .token_allowance("eth", OWNER, SPENDER, TOKEN)
            .await
            .unwrap();
        assert_eq!(allowance, BigUint::from(500_000_000u64));
    }

    #[tokio::test]
    async fn test_exhausted_pagination_is_zero_not_error() {
        let mut server = mockito::Server::new_async().await;
        // Registered first: the cursored mock below wins for page two.
        server
            .mock("GET", "/approvals")
            .match_query(Matcher::UrlEncoded("ownerAddress".into(), OWNER.into()))
            .with_status(200)
            .with_body(r#"{"result":[{"spender":"0xother","tokenAddress":"0xtoken","value":"1"}],"cursor":"p2"}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/approvals")
            .match_query(Matcher::UrlEncoded("cursor".into(), "p2".into()))
            .with_status(200)
            .with_body(r#"{"result":[]}"#)
            .create_async()
            .await;

        let client = IndexerClient::new(server.url());
        let allowance = client
            .token_allowance("eth", OWNER, SPENDER, TOKEN)
            .await
            .unwrap();
        assert_eq!(allowance, BigUint::zero());
    }

    #[tokio::test]
    async fn test_server_error_surfaces_as_query_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/approvals")
            .match_query(Matcher::Any)
            .with_status(503)
            .create_async()
            .await;

        let client = IndexerClient::new(server.url());
        let err = client
            .token_allowance("eth", OWNER, SPENDER, TOKEN)
            .await
            .unwrap_err();
        assert!(matches!(err, SwapError::AllowanceQueryFailed(_)));
    }

    #[tokio::test]
    async fn test_spender_match_is_case_insensitive() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/approvals")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(format!(
                r#"{{"result":[{{"spender":"{}","tokenAddress":"{}","value":"42"}}]}}"#,
                SPENDER,
                TOKEN.to_uppercase().replace("0X", "0x")
            ))
            .create_async()
            .await;

        let client = IndexerClient::new(server.url());
        let allowance = client
            .token_allowance("eth", OWNER, SPENDER, TOKEN)
            .await
            .unwrap();
        assert_eq!(allowance, BigUint::from(42u32));
    }

    #[tokio::test]
    async fn test_huge_allowance_values_parse() {
        // Unlimited approvals are u256::MAX, far past any machine integer.
        let max_u256 = "115792089237316195423570985008687907853269984665640564039457584007913129639935";
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/approvals")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(format!(
                r#"{{"result":[{{"spender":"{}","tokenAddress":"{}","value":"{}"}}]}}"#,
                SPENDER, TOKEN, max_u256
            ))
            .create_async()
            .await;

        let client = IndexerClient::new(server.url());
        let allowance = client
            .token_allowance("eth", OWNER, SPENDER, TOKEN)
            .await
            .unwrap();
        assert_eq!(allowance, BigUint::from_str(max_u256).unwrap());
    }
}
