use crate::core::feeds::PreferenceStore;
use crate::core::model::{Currency, Preferences};
use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

/// Preferences kept for the lifetime of the process only.
#[derive(Debug, Default)]
pub struct MemoryPreferenceStore {
    inner: Mutex<Preferences>,
}

impl MemoryPreferenceStore {
    pub fn new(initial: Preferences) -> Self {
        Self {
            inner: Mutex::new(initial),
        }
    }
}

#[async_trait]
impl PreferenceStore for MemoryPreferenceStore {
    async fn load(&self) -> Result<Preferences> {
        Ok(self.inner.lock().await.clone())
    }

    async fn save_currency(&self, currency: Currency) -> Result<()> {
        debug!(%currency, "Storing preferred currency in memory");
        self.inner.lock().await.currency = currency;
        Ok(())
    }

    async fn save_fiat_code(&self, code: &str) -> Result<()> {
        debug!(code, "Storing preferred fiat currency in memory");
        self.inner.lock().await.fiat_code = code.to_string();
        Ok(())
    }
}
