pub mod cli;
pub mod core;
pub mod providers;
pub mod store;

pub use crate::core::config;

use crate::cli::show::ShowArgs;
use crate::core::allowance::AllowanceDraft;
use crate::core::config::AppConfig;
use crate::core::model::{Currency, Preferences};
use crate::core::session::{Collaborators, Session};
use crate::providers::{ExchangeRateClient, RenterApiClient};
use crate::store::DiskPreferenceStore;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Longest the CLI waits for the renter data to arrive.
const WAIT_LIMIT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub enum AppCommand {
    Show(ShowArgs),
    Allowance(AllowanceDraft),
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("spendwatch starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let renter = Arc::new(RenterApiClient::new(
        &config.api.base_url,
        config.api.password.as_deref(),
        config.retries,
    )?);
    let rates = Arc::new(ExchangeRateClient::new(
        &config.rates.base_url,
        config.retries,
    )?);
    let preferences = Arc::new(DiskPreferenceStore::open(
        &config.default_data_path()?,
        Preferences {
            currency: Currency::Native,
            fiat_code: config.fiat_currency.to_uppercase(),
        },
    )?);

    let session = Session::start(
        Collaborators {
            allowance: renter.clone(),
            pricing: renter.clone(),
            spending: renter,
            exchange_rate: rates,
            preferences,
        },
        config.default_metric,
    )
    .await;

    let result = match command {
        AppCommand::Show(args) => cli::show::run(&session, args, WAIT_LIMIT).await,
        AppCommand::Allowance(draft) => cli::allowance::run(&session, draft, WAIT_LIMIT).await,
    };
    session.shutdown();
    result
}
