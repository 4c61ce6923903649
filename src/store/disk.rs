use crate::core::feeds::PreferenceStore;
use crate::core::model::{Currency, Preferences};
use anyhow::{Context, Result};
use async_trait::async_trait;
use fjall::{Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use tracing::debug;

const PARTITION: &str = "preferences";
const CURRENCY_KEY: &str = "currency";
const FIAT_CODE_KEY: &str = "fiat_code";

/// Preferences persisted in a fjall keyspace under the data directory.
///
/// Values missing from disk fall back to the defaults given at open time.
pub struct DiskPreferenceStore {
    keyspace: Keyspace,
    partition: PartitionHandle,
    defaults: Preferences,
}

impl DiskPreferenceStore {
    pub fn open(data_path: &Path, defaults: Preferences) -> Result<Self> {
        std::fs::create_dir_all(data_path).with_context(|| {
            format!("Failed to create data directory: {}", data_path.display())
        })?;

        let keyspace = fjall::Config::new(data_path.join("preferences"))
            .open()
            .context("Failed to open preference store")?;
        let partition = keyspace.open_partition(PARTITION, PartitionCreateOptions::default())?;
        debug!("Opened preference store at {}", data_path.display());

        Ok(Self {
            keyspace,
            partition,
            defaults,
        })
    }

    fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.partition.get(key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes).with_context(|| {
                format!("Corrupt preference value for {key}")
            })?)),
            None => Ok(None),
        }
    }

    fn write<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.partition.insert(key, serde_json::to_vec(value)?)?;
        self.keyspace.persist(PersistMode::SyncAll)?;
        debug!("Stored preference {}", key);
        Ok(())
    }
}

#[async_trait]
impl PreferenceStore for DiskPreferenceStore {
    async fn load(&self) -> Result<Preferences> {
        let currency = self.read(CURRENCY_KEY)?;
        let fiat_code = self.read(FIAT_CODE_KEY)?;
        Ok(Preferences {
            currency: currency.unwrap_or(self.defaults.currency),
            fiat_code: fiat_code.unwrap_or_else(|| self.defaults.fiat_code.clone()),
        })
    }

    async fn save_currency(&self, currency: Currency) -> Result<()> {
        self.write(CURRENCY_KEY, &currency)
    }

    async fn save_fiat_code(&self, code: &str) -> Result<()> {
        self.write(FIAT_CODE_KEY, &code)
    }
}
