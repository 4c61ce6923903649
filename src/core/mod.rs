//! Core spending view logic, independent of any concrete data source

pub mod allowance;
pub mod config;
pub mod error;
pub mod feeds;
pub mod log;
pub mod model;
pub mod session;
pub mod tracker;
pub mod view;

// Re-export main types for cleaner imports
pub use allowance::AllowanceDraft;
pub use error::{Operation, ReportedError, SpendError};
pub use feeds::{AllowanceFeed, ExchangeRateFeed, PreferenceStore, PricingFeed, SpendingFeed};
pub use model::{Currency, DerivedView, Metric, Selection};
pub use session::{Collaborators, Session};
