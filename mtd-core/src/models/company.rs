use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::lenient;

/// Capital expenditure claimed against one accounting period.
///
/// Pool balances are single-year figures; nothing is carried into the next
/// period.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapitalAllowances {
    #[serde(default, deserialize_with = "lenient::amount")]
    pub aia_qualifying_expenditure: Decimal,
    #[serde(default, deserialize_with = "lenient::amount")]
    pub main_pool_brought_forward: Decimal,
    #[serde(default, deserialize_with = "lenient::amount")]
    pub main_pool_additions: Decimal,
    #[serde(default, deserialize_with = "lenient::amount")]
    pub main_pool_disposals: Decimal,
    #[serde(default, deserialize_with = "lenient::amount")]
    pub special_pool_brought_forward: Decimal,
    #[serde(default, deserialize_with = "lenient::amount")]
    pub special_pool_additions: Decimal,
    #[serde(default, deserialize_with = "lenient::amount")]
    pub special_pool_disposals: Decimal,
    #[serde(default, deserialize_with = "lenient::amount")]
    pub fya_qualifying_expenditure: Decimal,
    #[serde(default, deserialize_with = "lenient::amount")]
    pub sba_qualifying_expenditure: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RdExpenditure {
    #[serde(default, deserialize_with = "lenient::amount")]
    pub current_year_expenditure: Decimal,
    /// `None` means "decide from profit": at or below the small profits
    /// limit counts as an SME.
    #[serde(default, deserialize_with = "lenient::optional_flag")]
    pub is_small_company: Option<bool>,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub is_loss_making: bool,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub qualifies_for_tax_credit: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupRelief {
    #[serde(default, deserialize_with = "lenient::amount")]
    pub surrendering_company_losses: Decimal,
    /// Defaults to the claiming company's own profit after expenses.
    #[serde(default, deserialize_with = "lenient::optional_amount")]
    pub claiming_company_profit: Option<Decimal>,
    /// Zero means "no explicit claim limit".
    #[serde(default, deserialize_with = "lenient::amount")]
    pub group_relief_claimed: Decimal,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub is_group_company: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LossesCarriedForward {
    #[serde(default, deserialize_with = "lenient::amount")]
    pub trading_losses: Decimal,
    #[serde(default, deserialize_with = "lenient::amount")]
    pub non_trading_losses: Decimal,
    #[serde(default, deserialize_with = "lenient::amount")]
    pub management_expenses: Decimal,
    #[serde(default, deserialize_with = "lenient::amount")]
    pub excess_capital_allowances: Decimal,
    #[serde(default, deserialize_with = "lenient::amount")]
    pub used_against_current_year: Decimal,
}

impl LossesCarriedForward {
    pub fn total_available(&self) -> Decimal {
        [
            self.trading_losses,
            self.non_trading_losses,
            self.management_expenses,
            self.excess_capital_allowances,
        ]
        .into_iter()
        .map(lenient::non_negative)
        .sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyTaxAdjustments {
    #[serde(default)]
    pub capital_allowances: CapitalAllowances,
    #[serde(default)]
    pub rd_expenditure: RdExpenditure,
    #[serde(default)]
    pub group_relief: GroupRelief,
    #[serde(default)]
    pub losses_carried_forward: LossesCarriedForward,
    #[serde(default, deserialize_with = "lenient::amount")]
    pub patent_box_profits: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyTaxBreakdown {
    pub effective_rate: Decimal,
    pub capital_allowances_total: Decimal,
    pub rd_relief_total: Decimal,
    pub group_relief_used: Decimal,
    pub losses_used: Decimal,
    pub patent_box_relief: Decimal,
}

/// Outcome of a corporation tax calculation.
///
/// `corporation_tax` is the liability at the statutory rate before marginal
/// relief; `total_tax_due` nets off every relief and never goes below zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyTaxResult {
    pub total_profit: Decimal,
    pub allowable_expenses: Decimal,
    pub taxable_profit: Decimal,
    pub corporation_tax: Decimal,
    pub marginal_relief: Decimal,
    pub rd_tax_credit: Decimal,
    pub total_tax_due: Decimal,
    pub breakdown: CompanyTaxBreakdown,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Director {
    #[serde(default)]
    pub name: String,
}

/// Registration details checked before a company return is prepared.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyDetails {
    #[serde(default)]
    pub company_name: String,
    #[serde(default)]
    pub company_number: String,
    #[serde(default)]
    pub utr: String,
    #[serde(default)]
    pub accounting_period_start: Option<NaiveDate>,
    #[serde(default)]
    pub accounting_period_end: Option<NaiveDate>,
    #[serde(default)]
    pub directors: Vec<Director>,
    #[serde(default)]
    pub vat_number: Option<String>,
}
