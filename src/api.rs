//! Quote resolution: the `QuoteResolver` seam and a CoinGecko client behind it.

use crate::error::QuoteError;
use crate::models::normalize_asset;
use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Public CoinGecko API root.
pub const COINGECKO_URL: &str = "https://api.coingecko.com/api/v3";

const USER_AGENT: &str = concat!("pricepulse/", env!("CARGO_PKG_VERSION"));

/// Anything that can price assets.
///
/// Identifiers are lowercase tokens. Unknown assets are simply absent from
/// the result; an `Err` means the source itself could not be reached.
pub trait QuoteResolver: Send + Sync {
    /// Price a batch of assets in one request, omitting those that cannot be priced.
    fn resolve_many(
        &self,
        assets: &[String],
    ) -> impl Future<Output = Result<HashMap<String, f64>, QuoteError>> + Send;

    /// Price one asset. `Ok(None)` means the source does not know it.
    fn resolve(&self, asset: &str) -> impl Future<Output = Result<Option<f64>, QuoteError>> + Send {
        async move {
            let asset = normalize_asset(asset);
            let mut prices = self.resolve_many(std::slice::from_ref(&asset)).await?;
            Ok(prices.remove(&asset))
        }
    }
}

/// CoinGecko `simple/price` client.
pub struct CoinGeckoClient {
    client: Client,
    base_url: String,
    currency: String,
    timeout: Duration,
}

impl CoinGeckoClient {
    /// Create a new client.
    pub fn new(base_url: &str, currency: &str, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            currency: currency.to_lowercase(),
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}

impl QuoteResolver for CoinGeckoClient {
    async fn resolve_many(&self, assets: &[String]) -> Result<HashMap<String, f64>, QuoteError> {
        let ids: Vec<String> = assets.iter().map(|a| normalize_asset(a)).collect();
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let url = format!(
            "{}/simple/price?ids={}&vs_currencies={}",
            self.base_url,
            urlencoding::encode(&ids.join(",")),
            urlencoding::encode(&self.currency)
        );

        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(request_error)?;

        if !response.status().is_success() {
            return Err(status_error(response.status()));
        }

        let body: HashMap<String, HashMap<String, f64>> = response.json().await?;
        let prices = extract_prices(&ids, &self.currency, body);
        debug!(requested = ids.len(), priced = prices.len(), "resolved quotes");
        Ok(prices)
    }
}

/// Timeouts and refused connections mean the source is down, not that the request was bad.
fn request_error(err: reqwest::Error) -> QuoteError {
    if err.is_timeout() || err.is_connect() {
        QuoteError::Unavailable(err.to_string())
    } else {
        QuoteError::Http(err)
    }
}

fn status_error(status: StatusCode) -> QuoteError {
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        QuoteError::Unavailable(format!("status {status}"))
    } else {
        QuoteError::Status(status)
    }
}

/// Pick the requested ids out of a `simple/price` response body.
fn extract_prices(
    ids: &[String],
    currency: &str,
    mut body: HashMap<String, HashMap<String, f64>>,
) -> HashMap<String, f64> {
    let mut prices = HashMap::with_capacity(ids.len());
    for id in ids {
        match body.remove(id).and_then(|mut p| p.remove(currency)) {
            Some(price) if price.is_finite() && price > 0.0 => {
                prices.insert(id.clone(), price);
            }
            Some(price) => warn!(asset = %id, price, "ignoring non-positive price"),
            None => debug!(asset = %id, "asset not found by quote source"),
        }
    }
    prices
}

/// Popular assets offered as one-tap buttons.
pub const POPULAR_ASSETS: &[(&str, &str)] = &[
    ("bitcoin", "Bitcoin"),
    ("ethereum", "Ethereum"),
    ("solana", "Solana"),
    ("cardano", "Cardano"),
    ("polkadot", "Polkadot"),
    ("ripple", "XRP"),
    ("dogecoin", "Doge"),
    ("litecoin", "Litecoin"),
    ("pepe", "Pepe"),
    ("shiba-inu", "Shiba"),
];

/// Expand common ticker shorthands to CoinGecko ids.
///
/// People type "btc" far more often than "bitcoin".
pub fn expand_asset(raw: &str) -> String {
    let asset = normalize_asset(raw);
    let expanded = match asset.as_str() {
        "btc" => "bitcoin",
        "eth" => "ethereum",
        "sol" => "solana",
        "ada" => "cardano",
        "dot" => "polkadot",
        "xrp" => "ripple",
        "doge" => "dogecoin",
        "ltc" => "litecoin",
        "shib" => "shiba-inu",
        "link" => "chainlink",
        "avax" => "avalanche-2",
        "atom" => "cosmos",
        _ => return asset,
    };
    expanded.to_string()
}
