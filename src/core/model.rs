//! Snapshot, selection and view types

use anyhow::anyhow;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Display;
use std::str::FromStr;

/// Per-unit prices in the base currency.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PriceSchedule {
    pub upload: Decimal,
    pub download: Decimal,
    /// Price to store one unit for one period.
    pub storage: Decimal,
    pub contract_formation: Decimal,
}

/// Cumulative spending per metric plus the balance still available.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SpendingMetrics {
    pub upload_spent: Decimal,
    pub download_spent: Decimal,
    pub storage_spent: Decimal,
    pub contract_formation_spent: Decimal,
    pub unspent: Decimal,
}

/// Fiat multipliers for one unit of the base currency, keyed by upper-case code.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExchangeRate {
    rates: HashMap<String, Decimal>,
}

impl ExchangeRate {
    pub fn new<I, S>(rates: I) -> Self
    where
        I: IntoIterator<Item = (S, Decimal)>,
        S: AsRef<str>,
    {
        Self {
            rates: rates
                .into_iter()
                .map(|(code, rate)| (code.as_ref().to_uppercase(), rate))
                .collect(),
        }
    }

    /// Returns the multiplier converting base-currency amounts into `code`.
    pub fn multiplier_for(&self, code: &str) -> Option<Decimal> {
        self.rates.get(&code.to_uppercase()).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowanceSettings {
    pub funds: Decimal,
    pub hosts: u64,
    /// Contract period, in blocks.
    pub period: u64,
    /// Blocks before the end of a period in which contracts are renewed.
    pub renew_window: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Upload,
    Download,
    #[default]
    Storage,
    ContractFormation,
    Unspent,
}

struct MetricFields {
    price: fn(&PriceSchedule) -> Decimal,
    spent: fn(&SpendingMetrics) -> Decimal,
}

// Indexed by `Metric as usize`.
const METRIC_FIELDS: [MetricFields; 5] = [
    MetricFields {
        price: |p| p.upload,
        spent: |s| s.upload_spent,
    },
    MetricFields {
        price: |p| p.download,
        spent: |s| s.download_spent,
    },
    MetricFields {
        price: |p| p.storage,
        spent: |s| s.storage_spent,
    },
    MetricFields {
        price: |p| p.contract_formation,
        spent: |s| s.contract_formation_spent,
    },
    MetricFields {
        price: |_| Decimal::ZERO,
        spent: |s| s.unspent,
    },
];

impl Metric {
    pub const ALL: [Metric; 5] = [
        Metric::Upload,
        Metric::Download,
        Metric::Storage,
        Metric::ContractFormation,
        Metric::Unspent,
    ];

    fn fields(self) -> &'static MetricFields {
        &METRIC_FIELDS[self as usize]
    }

    /// Base-currency unit price of this metric. `Unspent` has no unit cost.
    pub fn price_in(self, prices: &PriceSchedule) -> Decimal {
        (self.fields().price)(prices)
    }

    /// Base-currency amount recorded against this metric.
    pub fn spent_in(self, spending: &SpendingMetrics) -> Decimal {
        (self.fields().spent)(spending)
    }
}

impl Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Metric::Upload => "Upload",
                Metric::Download => "Download",
                Metric::Storage => "Storage",
                Metric::ContractFormation => "Contract formation",
                Metric::Unspent => "Unspent",
            }
        )
    }
}

impl FromStr for Metric {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', ' '], "_").as_str() {
            "upload" => Ok(Metric::Upload),
            "download" => Ok(Metric::Download),
            "storage" => Ok(Metric::Storage),
            "contract_formation" | "contract" => Ok(Metric::ContractFormation),
            "unspent" => Ok(Metric::Unspent),
            _ => Err(anyhow!("Invalid metric: {}", s)),
        }
    }
}

/// Display currency for the derived view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Currency {
    /// The base currency prices and spending are quoted in.
    #[default]
    Native,
    /// The preferred fiat currency, converted through the exchange rate.
    Fiat,
}

impl Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Currency::Native => "native",
                Currency::Fiat => "fiat",
            }
        )
    }
}

impl FromStr for Currency {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "native" | "sc" => Ok(Currency::Native),
            "fiat" => Ok(Currency::Fiat),
            _ => Err(anyhow!("Invalid currency: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub metric: Metric,
    pub currency: Currency,
}

/// Persisted user preferences the session is seeded from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    pub currency: Currency,
    pub fiat_code: String,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            currency: Currency::Native,
            fiat_code: "USD".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DerivedView {
    pub unit_price: Decimal,
    pub amount_spent: Decimal,
    pub purchasable_quantity: Decimal,
}
