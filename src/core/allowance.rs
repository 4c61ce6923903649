use crate::core::error::SpendError;
use crate::core::model::AllowanceSettings;
use rust_decimal::Decimal;

/// Allowance change as entered by a user. Every field must be resolved before it
/// can be applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowanceDraft {
    pub funds: Option<Decimal>,
    pub hosts: Option<u64>,
    pub period: Option<u64>,
    pub renew_window: Option<u64>,
}

impl AllowanceDraft {
    /// Fills unset fields from the last known settings, if any.
    pub fn or_last_known(self, last_known: Option<&AllowanceSettings>) -> Self {
        let Some(last) = last_known else {
            return self;
        };
        Self {
            funds: self.funds.or(Some(last.funds)),
            hosts: self.hosts.or(Some(last.hosts)),
            period: self.period.or(Some(last.period)),
            renew_window: self.renew_window.or(Some(last.renew_window)),
        }
    }

    pub fn validate(&self) -> Result<AllowanceSettings, SpendError> {
        match (self.funds, self.hosts, self.period, self.renew_window) {
            (Some(funds), Some(hosts), Some(period), Some(renew_window)) => Ok(AllowanceSettings {
                funds,
                hosts,
                period,
                renew_window,
            }),
            _ => {
                let missing = [
                    ("funds", self.funds.is_none()),
                    ("hosts", self.hosts.is_none()),
                    ("period", self.period.is_none()),
                    ("renew_window", self.renew_window.is_none()),
                ]
                .into_iter()
                .filter_map(|(name, absent)| absent.then_some(name))
                .collect();
                Err(SpendError::Validation { missing })
            }
        }
    }
}
