use crate::core::feeds::{AllowanceFeed, FeedStream, PricingFeed, SpendingFeed};
use crate::core::model::{AllowanceSettings, PriceSchedule, SpendingMetrics};
use crate::providers::feed::FeedCell;
use crate::providers::util::{RETRY_DELAY_MS, with_retry};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct PricesResponse {
    upload_price: Decimal,
    download_price: Decimal,
    storage_price: Decimal,
    contract_price: Decimal,
}

impl From<PricesResponse> for PriceSchedule {
    fn from(r: PricesResponse) -> Self {
        PriceSchedule {
            upload: r.upload_price,
            download: r.download_price,
            storage: r.storage_price,
            contract_formation: r.contract_price,
        }
    }
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct SpendingResponse {
    upload_spending: Decimal,
    download_spending: Decimal,
    storage_spending: Decimal,
    contract_fees: Decimal,
    unspent: Decimal,
}

impl From<SpendingResponse> for SpendingMetrics {
    fn from(r: SpendingResponse) -> Self {
        SpendingMetrics {
            upload_spent: r.upload_spending,
            download_spent: r.download_spending,
            storage_spent: r.storage_spending,
            contract_formation_spent: r.contract_fees,
            unspent: r.unspent,
        }
    }
}

#[derive(Deserialize, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct AllowanceBody {
    funds: Decimal,
    hosts: u64,
    period: u64,
    renew_window: u64,
}

impl From<AllowanceBody> for AllowanceSettings {
    fn from(b: AllowanceBody) -> Self {
        AllowanceSettings {
            funds: b.funds,
            hosts: b.hosts,
            period: b.period,
            renew_window: b.renew_window,
        }
    }
}

impl From<&AllowanceSettings> for AllowanceBody {
    fn from(s: &AllowanceSettings) -> Self {
        AllowanceBody {
            funds: s.funds,
            hosts: s.hosts,
            period: s.period,
            renew_window: s.renew_window,
        }
    }
}

/// Renter daemon HTTP client backing the allowance, pricing and spending feeds.
///
/// Each refresh fetches the current values and publishes them to the
/// corresponding feed.
pub struct RenterApiClient {
    base_url: String,
    password: Option<String>,
    retries: usize,
    client: reqwest::Client,
    allowance: FeedCell<AllowanceSettings>,
    prices: FeedCell<PriceSchedule>,
    spending: FeedCell<SpendingMetrics>,
}

impl RenterApiClient {
    pub fn new(base_url: &str, password: Option<&str>, retries: usize) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("spendwatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build renter API client")?;
        Ok(RenterApiClient {
            base_url: base_url.trim_end_matches('/').to_string(),
            password: password.map(str::to_string),
            retries,
            client,
            allowance: FeedCell::new(),
            prices: FeedCell::new(),
            spending: FeedCell::new(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let request = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        match &self.password {
            Some(password) => request.basic_auth("", Some(password)),
            None => request,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        debug!("Requesting {}{}", self.base_url, path);
        let response = with_retry(
            || async move { self.request(Method::GET, path).send().await?.error_for_status() },
            self.retries,
            RETRY_DELAY_MS,
        )
        .await
        .map_err(|e| anyhow!("Request error: {} for {}{}", e, self.base_url, path))?;

        response
            .json::<T>()
            .await
            .with_context(|| format!("Failed to parse response from {path}"))
    }
}

#[async_trait]
impl PricingFeed for RenterApiClient {
    fn latest(&self) -> FeedStream<PriceSchedule> {
        self.prices.subscribe()
    }

    #[instrument(name = "RenterPricesFetch", skip(self))]
    async fn refresh(&self) -> Result<()> {
        let prices: PricesResponse = self.get_json("/api/renter/prices").await?;
        debug!(?prices, "Received renter prices");
        self.prices.publish(prices.into());
        Ok(())
    }
}

#[async_trait]
impl AllowanceFeed for RenterApiClient {
    fn latest(&self) -> FeedStream<AllowanceSettings> {
        self.allowance.subscribe()
    }

    #[instrument(name = "RenterAllowanceFetch", skip(self))]
    async fn refresh_allowance_and_metrics(&self) -> Result<()> {
        let (allowance, spending) = futures::try_join!(
            self.get_json::<AllowanceBody>("/api/renter/allowance"),
            self.get_json::<SpendingResponse>("/api/renter/spending"),
        )?;
        debug!(?allowance, ?spending, "Received renter allowance and spending");
        self.allowance.publish(allowance.into());
        self.spending.publish(spending.into());
        Ok(())
    }

    #[instrument(name = "RenterAllowanceApply", skip(self))]
    async fn apply(&self, settings: &AllowanceSettings) -> Result<()> {
        // Not retried: a timed-out request may still have been applied.
        self.request(Method::POST, "/api/renter/allowance")
            .json(&AllowanceBody::from(settings))
            .send()
            .await
            .context("Failed to send allowance")?
            .error_for_status()
            .context("Renter rejected allowance")?;
        self.allowance.publish(settings.clone());
        Ok(())
    }
}

impl SpendingFeed for RenterApiClient {
    fn latest(&self) -> FeedStream<SpendingMetrics> {
        self.spending.subscribe()
    }
}
