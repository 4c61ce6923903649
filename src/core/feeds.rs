//! Collaborator abstractions a session consumes

use crate::core::model::{
    AllowanceSettings, Currency, ExchangeRate, Preferences, PriceSchedule, SpendingMetrics,
};
use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Snapshots of a feed over time. The stream ends after yielding an error.
pub type FeedStream<T> = BoxStream<'static, Result<T>>;

#[async_trait]
pub trait AllowanceFeed: Send + Sync {
    fn latest(&self) -> FeedStream<AllowanceSettings>;
    /// Refetches the allowance together with the spending metrics.
    async fn refresh_allowance_and_metrics(&self) -> Result<()>;
    async fn apply(&self, settings: &AllowanceSettings) -> Result<()>;
}

#[async_trait]
pub trait PricingFeed: Send + Sync {
    fn latest(&self) -> FeedStream<PriceSchedule>;
    async fn refresh(&self) -> Result<()>;
}

/// Spending metrics are refreshed through [`AllowanceFeed::refresh_allowance_and_metrics`].
pub trait SpendingFeed: Send + Sync {
    fn latest(&self) -> FeedStream<SpendingMetrics>;
}

#[async_trait]
pub trait ExchangeRateFeed: Send + Sync {
    fn latest(&self) -> FeedStream<ExchangeRate>;
    async fn refresh(&self) -> Result<()>;
}

#[async_trait]
pub trait PreferenceStore: Send + Sync {
    async fn load(&self) -> Result<Preferences>;
    async fn save_currency(&self, currency: Currency) -> Result<()>;
    async fn save_fiat_code(&self, code: &str) -> Result<()>;
}
