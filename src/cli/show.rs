use super::ui;
use crate::core::model::{AllowanceSettings, Currency, DerivedView, Metric, Selection};
use crate::core::session::Session;
use anyhow::Result;
use comfy_table::{Cell, Table};
use std::time::Duration;
use tracing::debug;

/// Selection changes requested on the command line.
#[derive(Debug, Clone, Default)]
pub struct ShowArgs {
    pub metric: Option<Metric>,
    pub currency: Option<Currency>,
    pub fiat_code: Option<String>,
}

pub async fn run(session: &Session, args: ShowArgs, wait: Duration) -> Result<()> {
    if let Some(metric) = args.metric {
        session.select_metric(metric);
    }
    if let Some(currency) = args.currency {
        session.select_currency(currency).await;
    }
    if let Some(code) = &args.fiat_code {
        session.select_fiat_code(code).await;
    }

    let pb = ui::new_spinner("Fetching renter data...");
    let mut active = session.active_count();
    let pb_clone = pb.clone();
    let progress = tokio::spawn(async move {
        while active.changed().await.is_ok() {
            let count = *active.borrow_and_update();
            if count > 0 {
                pb_clone.set_message(format!("Fetching renter data ({count} in flight)..."));
            } else {
                pb_clone.set_message("Waiting for exchange rates...");
            }
        }
    });

    let mut view = session.view();
    let settled = tokio::time::timeout(wait, async {
        session.refresh().await;
        tokio::select! {
            _ = view.wait_for(Option::is_some) => None,
            reported = session.next_error() => Some(reported),
        }
    })
    .await;
    progress.abort();
    pb.finish_and_clear();
    let failure = match settled {
        Ok(failure) => failure,
        Err(_) => {
            debug!("Gave up waiting for the spending view after {:?}", wait);
            None
        }
    };

    let selection = *session.selection().borrow();
    let fiat_code = session.fiat_code().borrow().clone();
    let current_view = *session.view().borrow();
    let allowance = session.allowance().borrow().clone();

    println!(
        "\n{}",
        ui::style_text("Renter Spending", ui::StyleType::Title)
    );
    println!(
        "{}",
        build_table(selection, &fiat_code, current_view, allowance.as_ref())
    );

    if current_view.is_none() {
        println!(
            "{}",
            ui::style_text(
                "Spending view unavailable until prices, spending and exchange rates are known.",
                ui::StyleType::Subtle
            )
        );
    }
    if let Some(reported) = session.take_last_error().or(failure) {
        println!(
            "{} {}",
            ui::style_text("Last error:", ui::StyleType::Error),
            ui::style_text(&reported.error.to_string(), ui::StyleType::Error)
        );
    }

    Ok(())
}

fn currency_label(currency: Currency, fiat_code: &str) -> String {
    match currency {
        Currency::Native => "SC".to_string(),
        Currency::Fiat => fiat_code.to_string(),
    }
}

pub(crate) fn build_table(
    selection: Selection,
    fiat_code: &str,
    view: Option<DerivedView>,
    allowance: Option<&AllowanceSettings>,
) -> Table {
    let unit = currency_label(selection.currency, fiat_code);
    let mut table = ui::new_styled_table();
    table.set_header(vec![ui::header_cell("Field"), ui::header_cell("Value")]);

    table.add_row(vec![
        Cell::new("Metric"),
        Cell::new(selection.metric.to_string()),
    ]);
    table.add_row(vec![Cell::new("Currency"), Cell::new(&unit)]);
    table.add_row(vec![
        Cell::new("Unit price"),
        ui::format_optional_cell(view.map(|v| v.unit_price), |v| {
            format!("{} {}", ui::format_amount(v, 8), unit)
        }),
    ]);
    table.add_row(vec![
        Cell::new("Spent"),
        ui::format_optional_cell(view.map(|v| v.amount_spent), |v| {
            format!("{} {}", ui::format_amount(v, 8), unit)
        }),
    ]);
    table.add_row(vec![
        Cell::new("Purchasable"),
        ui::format_optional_cell(view.map(|v| v.purchasable_quantity), |v| {
            ui::format_amount(v, 4)
        }),
    ]);
    table.add_row(vec![
        Cell::new("Allowance"),
        ui::format_optional_cell(allowance, |a| {
            format!(
                "{} SC, {} hosts, period {}, renew window {}",
                ui::format_amount(a.funds, 8),
                a.hosts,
                a.period,
                a.renew_window
            )
        }),
    ]);
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> rust_decimal::Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_table_with_fiat_view() {
        let selection = Selection {
            metric: Metric::Storage,
            currency: Currency::Fiat,
        };
        let view = DerivedView {
            unit_price: d("4.000"),
            amount_spent: d("20.00"),
            purchasable_quantity: d("5"),
        };
        let rendered = build_table(selection, "EUR", Some(view), None).to_string();

        assert!(rendered.contains("Storage"));
        assert!(rendered.contains("4 EUR"));
        assert!(rendered.contains("20 EUR"));
        assert!(rendered.contains("N/A"));
    }

    #[test]
    fn test_table_without_view() {
        let selection = Selection {
            metric: Metric::Unspent,
            currency: Currency::Native,
        };
        let allowance = AllowanceSettings {
            funds: d("500"),
            hosts: 30,
            period: 12096,
            renew_window: 4032,
        };
        let rendered = build_table(selection, "USD", None, Some(&allowance)).to_string();

        assert!(rendered.contains("SC"));
        assert!(rendered.contains("N/A"));
        assert!(rendered.contains("12096"));
    }
}
