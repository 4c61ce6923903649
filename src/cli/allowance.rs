use super::ui;
use crate::core::allowance::AllowanceDraft;
use crate::core::error::{Operation, SpendError};
use crate::core::session::Session;
use anyhow::{Result, anyhow};
use std::time::Duration;
use tracing::{debug, warn};

/// Applies an allowance built from `draft`, filling omitted fields from the
/// renter's current settings.
pub async fn run(session: &Session, draft: AllowanceDraft, wait: Duration) -> Result<()> {
    let pb = ui::new_spinner("Fetching current allowance...");
    let mut allowance = session.allowance();
    let loaded = tokio::time::timeout(wait, async {
        session.refresh().await;
        loop {
            tokio::select! {
                _ = allowance.wait_for(Option::is_some) => return,
                reported = session.next_error() => {
                    warn!(error = %reported.error, "Refresh before applying allowance failed");
                    if loses_allowance(&reported.error) {
                        return;
                    }
                }
            }
        }
    })
    .await;
    if loaded.is_err() {
        debug!("Current allowance unknown after {:?}", wait);
    }

    let current = session.allowance().borrow().clone();
    let draft = draft.or_last_known(current.as_ref());
    if let Err(e) = draft.validate() {
        pb.finish_and_clear();
        return Err(e.into());
    }

    pb.set_message("Applying allowance...");
    let applied = session.set_allowance(draft).await;
    pb.finish_and_clear();

    if !applied {
        let rejection = tokio::time::timeout(wait, async {
            loop {
                let reported = session.next_error().await;
                if is_apply_failure(&reported.error) {
                    return reported;
                }
                warn!(error = %reported.error, "Unrelated failure while applying allowance");
            }
        })
        .await;
        return match rejection {
            Ok(reported) => Err(reported.error.into()),
            Err(_) => Err(anyhow!("Allowance was not applied")),
        };
    }

    session.wait_idle().await;
    let settings = session.allowance().borrow().clone();
    println!(
        "{}",
        ui::style_text("Allowance updated", ui::StyleType::Title)
    );
    if let Some(settings) = settings {
        println!(
            "{} {} SC",
            ui::style_text("Funds:", ui::StyleType::Label),
            ui::style_text(&ui::format_amount(settings.funds, 8), ui::StyleType::Value)
        );
        println!(
            "{} {}  {} {}  {} {}",
            ui::style_text("Hosts:", ui::StyleType::Label),
            settings.hosts,
            ui::style_text("Period:", ui::StyleType::Label),
            settings.period,
            ui::style_text("Renew window:", ui::StyleType::Label),
            settings.renew_window
        );
    }
    Ok(())
}

/// Failures after which the current allowance will not arrive.
fn loses_allowance(error: &SpendError) -> bool {
    matches!(
        error,
        SpendError::Collaborator {
            operation: Operation::RefreshAllowanceAndMetrics | Operation::AllowanceFeed,
            ..
        }
    )
}

fn is_apply_failure(error: &SpendError) -> bool {
    error.is_validation()
        || matches!(
            error,
            SpendError::Collaborator {
                operation: Operation::ApplyAllowance,
                ..
            }
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn test_rate_failures_do_not_end_allowance_wait() {
        let rates = SpendError::collaborator(Operation::RefreshExchangeRate, anyhow!("HTTP 500"));
        let feed = SpendError::collaborator(Operation::ExchangeRateFeed, anyhow!("closed"));
        assert!(!loses_allowance(&rates));
        assert!(!loses_allowance(&feed));

        let renter =
            SpendError::collaborator(Operation::RefreshAllowanceAndMetrics, anyhow!("HTTP 500"));
        assert!(loses_allowance(&renter));
    }

    #[test]
    fn test_apply_failures_are_recognised() {
        let missing = SpendError::Validation {
            missing: vec!["funds"],
        };
        let rejected = SpendError::collaborator(Operation::ApplyAllowance, anyhow!("HTTP 400"));
        let rates = SpendError::collaborator(Operation::RefreshExchangeRate, anyhow!("HTTP 500"));
        assert!(is_apply_failure(&missing));
        assert!(is_apply_failure(&rejected));
        assert!(!is_apply_failure(&rates));
    }
}
