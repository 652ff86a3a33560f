//! Corporation tax for property companies.
//!
//! # Rate selection
//!
//! Taxable profit `p` is profit after expenses, capital allowances and
//! brought-forward losses.
//!
//! | Taxable profit               | Liability                                         |
//! |------------------------------|---------------------------------------------------|
//! | `p ≤ lower limit`            | `p × small profits rate`                          |
//! | `lower limit < p ≤ upper`    | `p × main rate`, less `(upper − p) × fraction`     |
//! | `p > upper limit`            | `p × main rate`                                   |
//!
//! `corporation_tax` is reported before marginal relief. Marginal relief,
//! R&D relief, Patent Box relief and group relief are then netted off:
//!
//! ```text
//! total_tax_due = max(0, corporation_tax − marginal_relief − rd_relief
//!                         − patent_box_relief − group_relief_used)
//! ```
//!
//! # Example
//!
//! ```
//! use rust_decimal_macros::dec;
//! use mtd_core::calculations::calculate_company_tax;
//! use mtd_core::CompanyTaxAdjustments;
//!
//! let result = calculate_company_tax(dec!(750000), dec!(50000), &CompanyTaxAdjustments::default());
//!
//! assert_eq!(result.taxable_profit, dec!(700000));
//! assert_eq!(result.corporation_tax, dec!(175000.00));
//! assert_eq!(result.marginal_relief, dec!(12000.00));
//! assert_eq!(result.total_tax_due, dec!(163000.00));
//! ```

use rust_decimal::Decimal;
use tracing::debug;

use crate::calculations::common::{floor_at_zero, round_pence, round_rate};
use crate::models::lenient::{bounded, non_negative};
use crate::models::{
    CapitalAllowances, CompanyTaxAdjustments, CompanyTaxBreakdown, CompanyTaxResult, GroupRelief,
    LossesCarriedForward, RdExpenditure, TaxYear, TaxYearRates,
};

/// Calculates corporation tax against the 2024-25 rates.
pub fn calculate_company_tax(
    total_profit: Decimal,
    allowable_expenses: Decimal,
    adjustments: &CompanyTaxAdjustments,
) -> CompanyTaxResult {
    CompanyTaxCalculator::default().calculate(total_profit, allowable_expenses, adjustments)
}

/// Corporation tax calculator bound to one year's rates.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CompanyTaxCalculator {
    rates: TaxYearRates,
}

impl CompanyTaxCalculator {
    pub fn new(rates: TaxYearRates) -> Self {
        Self { rates }
    }

    pub fn for_tax_year(tax_year: TaxYear) -> Self {
        Self::new(TaxYearRates::resolve(tax_year))
    }

    pub fn calculate(
        &self,
        total_profit: Decimal,
        allowable_expenses: Decimal,
        adjustments: &CompanyTaxAdjustments,
    ) -> CompanyTaxResult {
        let total_profit = non_negative(total_profit);
        let allowable_expenses = non_negative(allowable_expenses);
        let profit_after_expenses = floor_at_zero(total_profit - allowable_expenses);

        let capital_allowances_total =
            round_pence(self.capital_allowances(&adjustments.capital_allowances));
        let losses_used =
            round_pence(self.losses_used(&adjustments.losses_carried_forward, total_profit));

        let taxable_profit = round_pence(floor_at_zero(
            profit_after_expenses - capital_allowances_total - losses_used,
        ));

        let (corporation_tax, marginal_relief) = self.liability(taxable_profit);

        let rd_relief_total = round_pence(self.rd_relief(&adjustments.rd_expenditure, taxable_profit));
        let rd_tax_credit = round_pence(self.rd_tax_credit(&adjustments.rd_expenditure));
        let group_relief_used =
            round_pence(self.group_relief(&adjustments.group_relief, profit_after_expenses));
        let patent_box_relief = round_pence(self.patent_box_relief(adjustments.patent_box_profits));

        let total_tax_due = round_pence(floor_at_zero(
            corporation_tax - marginal_relief - rd_relief_total - patent_box_relief
                - group_relief_used,
        ));

        let effective_rate = if taxable_profit.is_zero() {
            Decimal::ZERO
        } else {
            round_rate((corporation_tax - marginal_relief) / taxable_profit)
        };

        debug!(
            tax_year = %self.rates.tax_year,
            %taxable_profit,
            %corporation_tax,
            %marginal_relief,
            %total_tax_due,
            "Calculated corporation tax"
        );

        CompanyTaxResult {
            total_profit: round_pence(total_profit),
            allowable_expenses: round_pence(allowable_expenses),
            taxable_profit,
            corporation_tax,
            marginal_relief,
            rd_tax_credit,
            total_tax_due,
            breakdown: CompanyTaxBreakdown {
                effective_rate,
                capital_allowances_total,
                rd_relief_total,
                group_relief_used,
                losses_used,
                patent_box_relief,
            },
        }
    }

    /// Gross liability at the statutory rate and the marginal relief due.
    fn liability(&self, taxable_profit: Decimal) -> (Decimal, Decimal) {
        let corp = &self.rates.corporation;

        if taxable_profit <= corp.lower_limit {
            (round_pence(taxable_profit * corp.small_profits_rate), Decimal::ZERO)
        } else if taxable_profit > corp.upper_limit {
            (round_pence(taxable_profit * corp.main_rate), Decimal::ZERO)
        } else {
            let relief = (corp.upper_limit - taxable_profit) * corp.marginal_relief_fraction;
            (
                round_pence(taxable_profit * corp.main_rate),
                round_pence(relief),
            )
        }
    }

    /// Single-year capital allowances. AIA is capped; pools are written down
    /// once and not carried forward.
    pub fn capital_allowances(&self, allowances: &CapitalAllowances) -> Decimal {
        let corp = &self.rates.corporation;

        let aia = non_negative(allowances.aia_qualifying_expenditure)
            .min(corp.annual_investment_allowance);
        let fya = non_negative(allowances.fya_qualifying_expenditure);

        let main_pool = floor_at_zero(
            bounded(allowances.main_pool_brought_forward)
                + bounded(allowances.main_pool_additions)
                - bounded(allowances.main_pool_disposals),
        );
        let special_pool = floor_at_zero(
            bounded(allowances.special_pool_brought_forward)
                + bounded(allowances.special_pool_additions)
                - bounded(allowances.special_pool_disposals),
        );
        let sba = non_negative(allowances.sba_qualifying_expenditure);

        aia + fya
            + main_pool * corp.main_pool_rate
            + special_pool * corp.special_pool_rate
            + sba * corp.structures_buildings_rate
    }

    /// Additional R&D deduction: `expenditure × (multiplier − 1)`.
    ///
    /// Company size falls back to the small profits limit when not given.
    pub fn rd_relief(&self, rd: &RdExpenditure, taxable_profit: Decimal) -> Decimal {
        let corp = &self.rates.corporation;
        let expenditure = non_negative(rd.current_year_expenditure);
        if expenditure.is_zero() {
            return Decimal::ZERO;
        }

        let is_small = rd
            .is_small_company
            .unwrap_or(taxable_profit <= corp.lower_limit);
        let multiplier = if is_small {
            corp.rd_sme_multiplier
        } else {
            corp.rd_large_multiplier
        };

        expenditure * (multiplier - Decimal::ONE)
    }

    /// Payable credit for loss-making companies that qualify. Reported
    /// alongside the liability, not netted into it.
    pub fn rd_tax_credit(&self, rd: &RdExpenditure) -> Decimal {
        if rd.is_loss_making && rd.qualifies_for_tax_credit {
            non_negative(rd.current_year_expenditure) * self.rates.corporation.rd_tax_credit_rate
        } else {
            Decimal::ZERO
        }
    }

    /// Losses surrendered by a group member, capped at the claimant's
    /// profit and at any explicit claim.
    pub fn group_relief(&self, relief: &GroupRelief, own_profit: Decimal) -> Decimal {
        if !relief.is_group_company {
            return Decimal::ZERO;
        }

        let claimant_profit = non_negative(relief.claiming_company_profit.unwrap_or(own_profit));
        let mut used = non_negative(relief.surrendering_company_losses).min(claimant_profit);

        let claimed = non_negative(relief.group_relief_claimed);
        if !claimed.is_zero() {
            used = used.min(claimed);
        }

        used
    }

    /// Brought-forward losses set against this period, capped at both the
    /// losses available and the period's profit.
    pub fn losses_used(&self, losses: &LossesCarriedForward, total_profit: Decimal) -> Decimal {
        let cap = losses.total_available().min(non_negative(total_profit));

        floor_at_zero(non_negative(losses.used_against_current_year).min(cap))
    }

    /// `patent_box_profits × (main rate − patent box rate)`.
    pub fn patent_box_relief(&self, patent_box_profits: Decimal) -> Decimal {
        let corp = &self.rates.corporation;

        non_negative(patent_box_profits) * (corp.main_rate - corp.patent_box_rate)
    }
}
