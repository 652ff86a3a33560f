//! Payment timing helpers.

use chrono::{Days, Months, NaiveDate};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::calculations::common::round_pence;
use crate::models::TaxYear;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentDate {
    pub label: &'static str,
    pub due: NaiveDate,
}

/// Self Assessment payments for one tax year's liability, split into four
/// equal instalments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSchedule {
    pub instalment: Decimal,
    pub payment_dates: Vec<PaymentDate>,
    pub total_payments: Decimal,
}

/// Splits `annual_tax_due` into quarters against the Self Assessment
/// calendar for `tax_year`.
///
/// The balancing payment and the next year's first payment on account
/// share a due date.
pub fn quarterly_payments(annual_tax_due: Decimal, tax_year: TaxYear) -> PaymentSchedule {
    let instalment = round_pence(annual_tax_due.max(Decimal::ZERO) / Decimal::from(4));
    let end = tax_year.end_year();

    let dates = [
        ("First payment on account", end, 1),
        ("Second payment on account", end, 7),
        ("Balancing payment", end + 1, 1),
        ("Next year's first payment on account", end + 1, 1),
    ];

    let payment_dates = dates
        .into_iter()
        .filter_map(|(label, year, month)| {
            NaiveDate::from_ymd_opt(year, month, 31).map(|due| PaymentDate { label, due })
        })
        .collect();

    PaymentSchedule {
        instalment,
        payment_dates,
        total_payments: instalment.saturating_mul(Decimal::from(4)),
    }
}

/// Corporation tax is due nine months and one day after the accounting
/// period ends.
///
/// ```
/// use chrono::NaiveDate;
/// use mtd_core::calculations::corporation_tax_due_date;
///
/// let end = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
/// assert_eq!(corporation_tax_due_date(end), NaiveDate::from_ymd_opt(2025, 1, 1));
/// ```
pub fn corporation_tax_due_date(accounting_period_end: NaiveDate) -> Option<NaiveDate> {
    accounting_period_end
        .checked_add_months(Months::new(9))?
        .checked_add_days(Days::new(1))
}
