//! HTTP client for a remote wallet service.
//!
//! Single-attempt calls with a hard timeout: the engine's placement path
//! fails closed on any error, and settlement credits are retried by the
//! engine's own worker, so retrying here as well would only stack delays.

use futures::future::BoxFuture;
use reqwest::{Client as HttpClient, StatusCode};
use serde::Serialize;
use std::time::Duration;
use updraft_engine::wallet::{Wallet, WalletError};
use updraft_types::AccountId;
use url::Url;

/// Timeout for wallet requests.
const TIMEOUT: Duration = Duration::from_secs(10);

/// Header carrying the credit idempotency key.
const IDEMPOTENCY_HEADER: &str = "idempotency-key";

#[derive(Clone)]
pub struct RemoteWallet {
    base_url: Url,
    http_client: HttpClient,
}

#[derive(Serialize)]
struct BalanceChange<'a> {
    account_id: &'a str,
    amount: u64,
}

impl RemoteWallet {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let base_url = Url::parse(base_url)?;
        let http_client = HttpClient::builder()
            .timeout(TIMEOUT)
            .pool_max_idle_per_host(100)
            .tcp_keepalive(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            base_url,
            http_client,
        })
    }

    async fn post(
        &self,
        path: &str,
        change: BalanceChange<'_>,
        idempotency_key: Option<&str>,
    ) -> Result<StatusCode, WalletError> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| WalletError::Unavailable(e.to_string()))?;
        let mut request = self.http_client.post(url).json(&change);
        if let Some(key) = idempotency_key {
            request = request.header(IDEMPOTENCY_HEADER, key);
        }
        let response = request
            .send()
            .await
            .map_err(|e| WalletError::Unavailable(e.to_string()))?;
        Ok(response.status())
    }
}

impl Wallet for RemoteWallet {
    fn debit<'a>(
        &'a self,
        account_id: &'a AccountId,
        amount: u64,
    ) -> BoxFuture<'a, Result<(), WalletError>> {
        Box::pin(async move {
            let status = self
                .post(
                    "debit",
                    BalanceChange {
                        account_id,
                        amount,
                    },
                    None,
                )
                .await?;
            match status {
                StatusCode::OK => Ok(()),
                // The wallet's refusal statuses both mean "cannot cover it"
                StatusCode::PAYMENT_REQUIRED | StatusCode::CONFLICT => {
                    Err(WalletError::InsufficientFunds)
                }
                status => Err(WalletError::Unavailable(format!(
                    "debit returned {status}"
                ))),
            }
        })
    }

    fn credit<'a>(
        &'a self,
        account_id: &'a AccountId,
        amount: u64,
        idempotency_key: &'a str,
    ) -> BoxFuture<'a, Result<(), WalletError>> {
        Box::pin(async move {
            let status = self
                .post(
                    "credit",
                    BalanceChange {
                        account_id,
                        amount,
                    },
                    Some(idempotency_key),
                )
                .await?;
            match status {
                StatusCode::OK => Ok(()),
                status => Err(WalletError::Unavailable(format!(
                    "credit returned {status}"
                ))),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_invalid_base_url() {
        assert!(RemoteWallet::new("not a url").is_err());
        assert!(RemoteWallet::new("http://wallet.internal:9000/").is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_wallet_is_unavailable() {
        // Nothing listens on this port; the debit must fail closed, not hang
        let wallet = RemoteWallet::new("http://127.0.0.1:1/").expect("build wallet");
        let result = wallet.debit(&"alice".to_string(), 100).await;
        assert!(matches!(result, Err(WalletError::Unavailable(_))));
    }
}
