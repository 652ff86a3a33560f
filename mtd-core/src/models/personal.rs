use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::lenient;

/// Property income for one tax year, in pounds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyIncome {
    #[serde(default, deserialize_with = "lenient::amount")]
    pub rent_income: Decimal,
    #[serde(default, deserialize_with = "lenient::amount")]
    pub premiums_of_lease_grant: Decimal,
    #[serde(default, deserialize_with = "lenient::amount")]
    pub other_property_income: Decimal,
}

impl PropertyIncome {
    /// Sum of all categories, each clamped at zero.
    pub fn total(&self) -> Decimal {
        [
            self.rent_income,
            self.premiums_of_lease_grant,
            self.other_property_income,
        ]
        .into_iter()
        .map(lenient::non_negative)
        .sum()
    }
}

/// Property expenses for one tax year, in pounds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyExpenses {
    #[serde(default, deserialize_with = "lenient::amount")]
    pub premises_running_costs: Decimal,
    #[serde(default, deserialize_with = "lenient::amount")]
    pub repairs_and_maintenance: Decimal,
    #[serde(default, deserialize_with = "lenient::amount")]
    pub financial_costs: Decimal,
    #[serde(default, deserialize_with = "lenient::amount")]
    pub professional_fees: Decimal,
    #[serde(default, deserialize_with = "lenient::amount")]
    pub cost_of_services: Decimal,
    #[serde(default, deserialize_with = "lenient::amount")]
    pub other: Decimal,
}

impl PropertyExpenses {
    /// Named categories, in form order.
    pub fn categories(&self) -> [(&'static str, Decimal); 6] {
        [
            ("premises running costs", self.premises_running_costs),
            ("repairs and maintenance", self.repairs_and_maintenance),
            ("financial costs", self.financial_costs),
            ("professional fees", self.professional_fees),
            ("cost of services", self.cost_of_services),
            ("other", self.other),
        ]
    }

    /// Sum of all categories, each clamped at zero.
    pub fn total(&self) -> Decimal {
        self.categories()
            .into_iter()
            .map(|(_, value)| lenient::non_negative(value))
            .sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxAdjustments {
    #[serde(default, deserialize_with = "lenient::flag")]
    pub use_mileage_allowance: bool,
    #[serde(default, deserialize_with = "lenient::amount")]
    pub mileage_total: Decimal,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub use_property_income_allowance: bool,
    #[serde(default, deserialize_with = "lenient::amount")]
    pub prior_year_losses: Decimal,
    #[serde(default, deserialize_with = "lenient::amount")]
    pub capital_allowances: Decimal,
    #[serde(default, deserialize_with = "lenient::amount")]
    pub wear_and_tear_allowance: Decimal,
}

/// Income tax split by band.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalTaxBreakdown {
    pub personal_allowance_used: Decimal,
    pub basic_rate_tax: Decimal,
    pub higher_rate_tax: Decimal,
    pub additional_rate_tax: Decimal,
    #[serde(rename = "class4NI")]
    pub class4_ni: Decimal,
}

/// Outcome of a personal property-income tax calculation.
///
/// Every money field is rounded to pence and `taxable_profit` is never
/// negative.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalTaxResult {
    pub total_income: Decimal,
    pub allowable_expenses: Decimal,
    pub adjustments: Decimal,
    pub taxable_profit: Decimal,
    pub income_tax: Decimal,
    pub national_insurance: Decimal,
    pub total_tax_due: Decimal,
    pub breakdown: PersonalTaxBreakdown,
}
