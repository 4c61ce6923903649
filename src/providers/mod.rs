//! Reference collaborators backing the core feeds

pub mod exchange_rate;
pub mod feed;
pub mod renter_api;
pub mod util;

pub use exchange_rate::ExchangeRateClient;
pub use feed::FeedCell;
pub use renter_api::RenterApiClient;
