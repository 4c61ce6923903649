//! Error kinds surfaced by a session and the sink that delivers them

use chrono::{DateTime, Utc};
use std::fmt::Display;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;
use tokio::sync::Notify;
use tracing::warn;

/// External operation or feed an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    AllowanceFeed,
    PricingFeed,
    SpendingFeed,
    ExchangeRateFeed,
    RefreshPrices,
    RefreshAllowanceAndMetrics,
    RefreshExchangeRate,
    ApplyAllowance,
    LoadPreferences,
    SavePreferences,
}

impl Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Operation::AllowanceFeed => "allowance feed",
                Operation::PricingFeed => "pricing feed",
                Operation::SpendingFeed => "spending feed",
                Operation::ExchangeRateFeed => "exchange rate feed",
                Operation::RefreshPrices => "price schedule update",
                Operation::RefreshAllowanceAndMetrics => "allowance and spending update",
                Operation::RefreshExchangeRate => "exchange rate update",
                Operation::ApplyAllowance => "allowance change",
                Operation::LoadPreferences => "preference load",
                Operation::SavePreferences => "preference update",
            }
        )
    }
}

#[derive(Debug, Error)]
pub enum SpendError {
    #[error("Missing required allowance field(s): {}", .missing.join(", "))]
    Validation { missing: Vec<&'static str> },
    #[error("{operation} failed: {source:#}")]
    Collaborator {
        operation: Operation,
        #[source]
        source: anyhow::Error,
    },
}

impl SpendError {
    pub fn collaborator(operation: Operation, source: anyhow::Error) -> Self {
        SpendError::Collaborator { operation, source }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, SpendError::Validation { .. })
    }
}

#[derive(Debug)]
pub struct ReportedError {
    pub error: SpendError,
    pub reported_at: DateTime<Utc>,
}

/// Holds the most recent unconsumed failure. Each report is handed out at most once.
#[derive(Debug, Default)]
pub struct ErrorSink {
    latest: Mutex<Option<ReportedError>>,
    reported: AtomicUsize,
    notify: Notify,
}

impl ErrorSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&self, error: SpendError) {
        warn!(error = %error, "Reporting failure");
        let entry = ReportedError {
            error,
            reported_at: Utc::now(),
        };
        *self.latest.lock().unwrap_or_else(|e| e.into_inner()) = Some(entry);
        self.reported.fetch_add(1, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Takes the latest failure, if one has been reported since the last take.
    pub fn take(&self) -> Option<ReportedError> {
        self.latest.lock().unwrap_or_else(|e| e.into_inner()).take()
    }

    /// Waits for the next failure and takes it.
    pub async fn next(&self) -> ReportedError {
        loop {
            let notified = self.notify.notified();
            if let Some(entry) = self.take() {
                return entry;
            }
            notified.await;
        }
    }

    /// Total number of failures reported, consumed or not.
    pub fn reported_count(&self) -> usize {
        self.reported.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_validation_message_lists_fields() {
        let err = SpendError::Validation {
            missing: vec!["period", "renew_window"],
        };
        assert_eq!(
            err.to_string(),
            "Missing required allowance field(s): period, renew_window"
        );
        assert!(err.is_validation());
    }

    #[test]
    fn test_collaborator_message_names_operation() {
        let err = SpendError::collaborator(Operation::RefreshPrices, anyhow!("HTTP 503"));
        assert_eq!(err.to_string(), "price schedule update failed: HTTP 503");
        assert!(!err.is_validation());
    }

    #[test]
    fn test_sink_delivers_latest_once() {
        let sink = ErrorSink::new();
        assert!(sink.take().is_none());

        sink.report(SpendError::collaborator(
            Operation::PricingFeed,
            anyhow!("first"),
        ));
        sink.report(SpendError::collaborator(
            Operation::SpendingFeed,
            anyhow!("second"),
        ));

        let taken = sink.take().unwrap();
        assert!(taken.error.to_string().contains("second"));
        assert!(sink.take().is_none());
        assert_eq!(sink.reported_count(), 2);
    }

    #[tokio::test]
    async fn test_next_waits_for_report() {
        let sink = Arc::new(ErrorSink::new());
        let reporter = Arc::clone(&sink);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            reporter.report(SpendError::Validation {
                missing: vec!["funds"],
            });
        });

        let entry = tokio::time::timeout(Duration::from_secs(1), sink.next())
            .await
            .expect("error was not delivered");
        assert!(entry.error.is_validation());
    }
}
