use crate::core::feeds::{ExchangeRateFeed, FeedStream};
use crate::core::model::ExchangeRate;
use crate::providers::feed::FeedCell;
use crate::providers::util::{RETRY_DELAY_MS, with_retry};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, instrument};

/// Ticker of the base currency all prices are quoted in.
const BASE_CURRENCY: &str = "sc";

#[derive(Debug, Deserialize)]
struct ExchangeRateResponse {
    rates: HashMap<String, HashMap<String, Decimal>>,
}

/// Market data client backing the exchange rate feed.
pub struct ExchangeRateClient {
    base_url: String,
    retries: usize,
    client: reqwest::Client,
    rates: FeedCell<ExchangeRate>,
}

impl ExchangeRateClient {
    pub fn new(base_url: &str, retries: usize) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("spendwatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build exchange rate client")?;
        Ok(ExchangeRateClient {
            base_url: base_url.trim_end_matches('/').to_string(),
            retries,
            client,
            rates: FeedCell::new(),
        })
    }
}

#[async_trait]
impl ExchangeRateFeed for ExchangeRateClient {
    fn latest(&self) -> FeedStream<ExchangeRate> {
        self.rates.subscribe()
    }

    #[instrument(name = "ExchangeRateFetch", skip(self))]
    async fn refresh(&self) -> Result<()> {
        let url = format!(
            "{}/market/exchange-rate?currencies={}",
            self.base_url, BASE_CURRENCY
        );
        debug!("Requesting exchange rates from {}", url);

        let request_url = url.as_str();
        let response = with_retry(
            || async move { self.client.get(request_url).send().await?.error_for_status() },
            self.retries,
            RETRY_DELAY_MS,
        )
        .await
        .map_err(|e| anyhow!("Request error: {} URL: {}", e, url))?;

        let mut data = response.json::<ExchangeRateResponse>().await?;
        let rates = data
            .rates
            .remove(BASE_CURRENCY)
            .ok_or_else(|| anyhow!("No exchange rates found for {}", BASE_CURRENCY))?;
        debug!(currencies = rates.len(), "Received exchange rates");

        self.rates.publish(ExchangeRate::new(rates));
        Ok(())
    }
}
