//! Derived view computation.
//!
//! [`derive_view`] is the only producer of [`DerivedView`]s. It is synchronous and
//! side-effect free; the session calls it after every snapshot or selection change.
use crate::core::model::{
    AllowanceSettings, Currency, DerivedView, ExchangeRate, PriceSchedule, Selection,
    SpendingMetrics,
};
use rust_decimal::Decimal;
use tracing::{debug, warn};

/// Latest known value of every feed. Empty until the first emission of each.
#[derive(Debug, Default, Clone)]
pub struct Snapshots {
    pub prices: Option<PriceSchedule>,
    pub spending: Option<SpendingMetrics>,
    pub exchange_rate: Option<ExchangeRate>,
    pub allowance: Option<AllowanceSettings>,
}

/// Multiplier applied to base-currency amounts for the selected display currency.
pub fn conversion_rate(
    currency: Currency,
    fiat_code: &str,
    exchange_rate: &ExchangeRate,
) -> Option<Decimal> {
    match currency {
        Currency::Native => Some(Decimal::ONE),
        Currency::Fiat => exchange_rate.multiplier_for(fiat_code),
    }
}

/// Computes the view for `selection`, or `None` when an input is still missing.
///
/// The purchasable quantity is zero whenever the unit price truncates to zero, so
/// prices below one unit never produce runaway quantities.
pub fn derive_view(
    selection: &Selection,
    fiat_code: &str,
    snapshots: &Snapshots,
) -> Option<DerivedView> {
    let exchange_rate = snapshots.exchange_rate.as_ref()?;
    let Some(rate) = conversion_rate(selection.currency, fiat_code, exchange_rate) else {
        warn!("No exchange rate for {fiat_code}, keeping previous view");
        return None;
    };

    let prices = snapshots.prices.as_ref()?;
    let unit_price = selection.metric.price_in(prices).checked_mul(rate);

    let spending = snapshots.spending.as_ref()?;
    let amount_spent = selection.metric.spent_in(spending).checked_mul(rate);
    let unspent = spending.unspent.checked_mul(rate);

    let (Some(unit_price), Some(amount_spent), Some(unspent)) = (unit_price, amount_spent, unspent)
    else {
        warn!(
            metric = %selection.metric,
            %rate,
            "Conversion overflowed, keeping previous view"
        );
        return None;
    };

    let purchasable_quantity = if unit_price.trunc().is_zero() {
        Decimal::ZERO
    } else {
        unspent.checked_div(unit_price)?
    };

    debug!(
        metric = %selection.metric,
        currency = %selection.currency,
        %unit_price,
        %amount_spent,
        %purchasable_quantity,
        "Derived view recomputed"
    );
    Some(DerivedView {
        unit_price,
        amount_spent,
        purchasable_quantity,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::Metric;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn scenario_snapshots(storage_price: &str) -> Snapshots {
        Snapshots {
            prices: Some(PriceSchedule {
                upload: d("0.10"),
                download: d("0.25"),
                storage: d(storage_price),
                contract_formation: d("3.00"),
            }),
            spending: Some(SpendingMetrics {
                upload_spent: d("1.00"),
                download_spent: d("2.00"),
                storage_spent: d("0.50"),
                contract_formation_spent: d("6.00"),
                unspent: d("10.00"),
            }),
            exchange_rate: Some(ExchangeRate::new([("USD", d("0.004")), ("EUR", d("2.5"))])),
            allowance: None,
        }
    }

    fn storage_native() -> Selection {
        Selection {
            metric: Metric::Storage,
            currency: Currency::Native,
        }
    }

    #[test]
    fn test_storage_in_native_currency() {
        let view = derive_view(&storage_native(), "USD", &scenario_snapshots("2.00")).unwrap();

        assert_eq!(view.unit_price, d("2.00"));
        assert_eq!(view.amount_spent, d("0.50"));
        assert_eq!(view.purchasable_quantity, d("5.00"));
    }

    #[test]
    fn test_zero_price_yields_zero_quantity() {
        let view = derive_view(&storage_native(), "USD", &scenario_snapshots("0.00")).unwrap();

        assert_eq!(view.unit_price, Decimal::ZERO);
        assert_eq!(view.purchasable_quantity, Decimal::ZERO);
    }

    #[test]
    fn test_price_truncating_to_zero_yields_zero_quantity() {
        // 0.99 is a real price but truncates to 0, so nothing is considered purchasable.
        let mut snapshots = scenario_snapshots("0.99");
        snapshots.spending.as_mut().unwrap().unspent = d("1000000000");

        let view = derive_view(&storage_native(), "USD", &snapshots).unwrap();
        assert_eq!(view.unit_price, d("0.99"));
        assert_eq!(view.purchasable_quantity, Decimal::ZERO);
    }

    #[test]
    fn test_every_metric_guards_small_prices() {
        let snapshots = Snapshots {
            prices: Some(PriceSchedule {
                upload: d("0.5"),
                download: d("0.01"),
                storage: d("0"),
                contract_formation: d("0.999"),
            }),
            ..scenario_snapshots("0")
        };
        for metric in Metric::ALL {
            let selection = Selection {
                metric,
                currency: Currency::Native,
            };
            let view = derive_view(&selection, "USD", &snapshots).unwrap();
            assert_eq!(view.purchasable_quantity, Decimal::ZERO, "{metric}");
        }
    }

    #[test]
    fn test_unspent_metric_has_no_unit_price() {
        let selection = Selection {
            metric: Metric::Unspent,
            currency: Currency::Native,
        };
        let view = derive_view(&selection, "USD", &scenario_snapshots("2.00")).unwrap();

        assert_eq!(view.unit_price, Decimal::ZERO);
        assert_eq!(view.amount_spent, d("10.00"));
        assert_eq!(view.purchasable_quantity, Decimal::ZERO);
    }

    #[test]
    fn test_fiat_conversion() {
        let selection = Selection {
            metric: Metric::Storage,
            currency: Currency::Fiat,
        };
        let view = derive_view(&selection, "eur", &scenario_snapshots("2.00")).unwrap();

        assert_eq!(view.unit_price, d("5.00"));
        assert_eq!(view.amount_spent, d("1.25"));
        assert_eq!(view.purchasable_quantity, d("5"));
    }

    #[test]
    fn test_native_rate_ignores_exchange_table() {
        assert_eq!(
            conversion_rate(Currency::Native, "USD", &ExchangeRate::default()),
            Some(Decimal::ONE)
        );
        let weird = ExchangeRate::new([("USD", d("123.456"))]);
        assert_eq!(
            conversion_rate(Currency::Native, "USD", &weird),
            Some(Decimal::ONE)
        );
    }

    #[test]
    fn test_missing_fiat_code_keeps_view_unset() {
        let selection = Selection {
            metric: Metric::Storage,
            currency: Currency::Fiat,
        };
        assert!(derive_view(&selection, "JPY", &scenario_snapshots("2.00")).is_none());
    }

    #[test]
    fn test_requires_all_three_snapshots() {
        let full = scenario_snapshots("2.00");
        let without_rate = Snapshots {
            exchange_rate: None,
            ..full.clone()
        };
        let without_prices = Snapshots {
            prices: None,
            ..full.clone()
        };
        let without_spending = Snapshots {
            spending: None,
            ..full.clone()
        };

        assert!(derive_view(&storage_native(), "USD", &without_rate).is_none());
        assert!(derive_view(&storage_native(), "USD", &without_prices).is_none());
        assert!(derive_view(&storage_native(), "USD", &without_spending).is_none());
        assert!(derive_view(&storage_native(), "USD", &Snapshots::default()).is_none());
    }

    #[test]
    fn test_overflow_keeps_view_unset() {
        let mut snapshots = scenario_snapshots("2.00");
        snapshots.exchange_rate = Some(ExchangeRate::new([("USD", Decimal::MAX)]));
        snapshots.spending.as_mut().unwrap().unspent = Decimal::MAX;
        let selection = Selection {
            metric: Metric::Storage,
            currency: Currency::Fiat,
        };
        assert!(derive_view(&selection, "USD", &snapshots).is_none());
    }
}
