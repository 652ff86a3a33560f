//! Income tax and Class 4 National Insurance on UK property profits.
//!
//! # Calculation order
//!
//! | Step | Figure |
//! |------|--------|
//! | 1    | Total income: rent + lease premiums + other property income |
//! | 2    | Allowable expenses: sum of expense categories, or the property income allowance when claimed |
//! | 3    | Adjustments: mileage + capital allowances + wear and tear + prior-year losses |
//! | 4    | Taxable profit: Step 1 − Step 2 − Step 3, never below zero |
//! | 5    | Personal allowance, tapered by £1 for every £2 over the taper threshold |
//! | 6    | Income tax: basic, higher and additional bands on profit after the allowance |
//! | 7    | Class 4 NI: main rate between the profit limits, additional rate above |
//!
//! # Property income allowance
//!
//! When `use_property_income_allowance` is set the allowance *replaces* the
//! actual expenses, capped at total income. It is not compared with the
//! actual expenses, so a landlord with larger real costs is worse off
//! claiming it.
//!
//! # Malformed input
//!
//! Negative figures are treated as zero. The calculator never fails; it
//! always returns a complete [`PersonalTaxResult`].
//!
//! # Example
//!
//! ```
//! use rust_decimal_macros::dec;
//! use mtd_core::calculations::calculate_personal_tax;
//! use mtd_core::{PropertyExpenses, PropertyIncome, TaxAdjustments};
//!
//! let income = PropertyIncome {
//!     rent_income: dec!(60000),
//!     ..Default::default()
//! };
//! let expenses = PropertyExpenses {
//!     repairs_and_maintenance: dec!(4000),
//!     ..Default::default()
//! };
//!
//! let result = calculate_personal_tax(&income, &expenses, &TaxAdjustments::default());
//!
//! assert_eq!(result.taxable_profit, dec!(56000));
//! assert_eq!(result.income_tax, dec!(9832.00));
//! assert_eq!(result.national_insurance, dec!(2376.60));
//! assert_eq!(result.total_tax_due, dec!(12208.60));
//! ```

use rust_decimal::Decimal;
use tracing::debug;

use crate::calculations::common::{floor_at_zero, round_pence, slice_between};
use crate::models::lenient::non_negative;
use crate::models::{
    PersonalTaxBreakdown, PersonalTaxResult, PropertyExpenses, PropertyIncome, TaxAdjustments,
    TaxYear, TaxYearRates,
};

/// Calculates personal property tax against the 2024-25 rates.
pub fn calculate_personal_tax(
    income: &PropertyIncome,
    expenses: &PropertyExpenses,
    adjustments: &TaxAdjustments,
) -> PersonalTaxResult {
    PersonalTaxCalculator::default().calculate(income, expenses, adjustments)
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct IncomeTaxBands {
    allowance_used: Decimal,
    basic: Decimal,
    higher: Decimal,
    additional: Decimal,
}

impl IncomeTaxBands {
    fn total(&self) -> Decimal {
        self.basic + self.higher + self.additional
    }
}

/// Personal tax calculator bound to one year's rates.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PersonalTaxCalculator {
    rates: TaxYearRates,
}

impl PersonalTaxCalculator {
    pub fn new(rates: TaxYearRates) -> Self {
        Self { rates }
    }

    /// Calculator for `tax_year`, falling back to the latest rates if the
    /// year has no table.
    pub fn for_tax_year(tax_year: TaxYear) -> Self {
        Self::new(TaxYearRates::resolve(tax_year))
    }

    pub fn rates(&self) -> &TaxYearRates {
        &self.rates
    }

    pub fn calculate(
        &self,
        income: &PropertyIncome,
        expenses: &PropertyExpenses,
        adjustments: &TaxAdjustments,
    ) -> PersonalTaxResult {
        let total_income = income.total();
        let allowable_expenses = self.allowable_expenses(total_income, expenses, adjustments);
        let adjustment_total = self.adjustment_total(adjustments);

        let taxable_profit =
            round_pence(floor_at_zero(total_income - allowable_expenses - adjustment_total));

        let bands = self.income_tax(taxable_profit);
        let class4_ni = self.class4_national_insurance(taxable_profit);
        let income_tax = bands.total();

        debug!(
            tax_year = %self.rates.tax_year,
            %total_income,
            %taxable_profit,
            %income_tax,
            %class4_ni,
            "Calculated personal tax"
        );

        PersonalTaxResult {
            total_income: round_pence(total_income),
            allowable_expenses: round_pence(allowable_expenses),
            adjustments: round_pence(adjustment_total),
            taxable_profit,
            income_tax,
            national_insurance: class4_ni,
            total_tax_due: income_tax + class4_ni,
            breakdown: PersonalTaxBreakdown {
                personal_allowance_used: bands.allowance_used,
                basic_rate_tax: bands.basic,
                higher_rate_tax: bands.higher,
                additional_rate_tax: bands.additional,
                class4_ni,
            },
        }
    }

    /// Tiered mileage deduction, exact for any non-negative mileage.
    ///
    /// ```
    /// use rust_decimal_macros::dec;
    /// use mtd_core::calculations::PersonalTaxCalculator;
    ///
    /// let calc = PersonalTaxCalculator::default();
    /// assert_eq!(calc.mileage_allowance(dec!(10001)), dec!(4500.25));
    /// ```
    pub fn mileage_allowance(&self, miles: Decimal) -> Decimal {
        let allowances = &self.rates.allowances;
        let miles = non_negative(miles);
        let within = miles.min(allowances.mileage_threshold);
        let above = floor_at_zero(miles - allowances.mileage_threshold);

        within * allowances.mileage_rate_within_threshold
            + above * allowances.mileage_rate_above_threshold
    }

    fn allowable_expenses(
        &self,
        total_income: Decimal,
        expenses: &PropertyExpenses,
        adjustments: &TaxAdjustments,
    ) -> Decimal {
        if adjustments.use_property_income_allowance {
            self.rates
                .allowances
                .property_income_allowance
                .min(total_income)
        } else {
            expenses.total()
        }
    }

    fn adjustment_total(&self, adjustments: &TaxAdjustments) -> Decimal {
        let mileage = if adjustments.use_mileage_allowance {
            self.mileage_allowance(adjustments.mileage_total)
        } else {
            Decimal::ZERO
        };

        mileage
            + non_negative(adjustments.capital_allowances)
            + non_negative(adjustments.wear_and_tear_allowance)
            + non_negative(adjustments.prior_year_losses)
    }

    /// Personal allowance after the high-income taper.
    fn personal_allowance(&self, profit: Decimal) -> Decimal {
        let personal = &self.rates.personal;
        let excess = floor_at_zero(profit - personal.allowance_taper_threshold);
        let reduction = (excess / Decimal::TWO).floor();

        floor_at_zero(personal.personal_allowance - reduction)
    }

    fn income_tax(&self, profit: Decimal) -> IncomeTaxBands {
        let personal = &self.rates.personal;

        let allowance_used = self.personal_allowance(profit).min(profit);
        let taxable = profit - allowance_used;

        let basic = taxable.min(personal.basic_rate_band) * personal.basic_rate;
        let higher = slice_between(
            taxable,
            personal.basic_rate_band,
            personal.additional_rate_threshold,
        ) * personal.higher_rate;
        let additional =
            floor_at_zero(taxable - personal.additional_rate_threshold) * personal.additional_rate;

        IncomeTaxBands {
            allowance_used: round_pence(allowance_used),
            basic: round_pence(basic),
            higher: round_pence(higher),
            additional: round_pence(additional),
        }
    }

    fn class4_national_insurance(&self, profit: Decimal) -> Decimal {
        let ni = &self.rates.national_insurance;

        let main = slice_between(profit, ni.lower_profits_limit, ni.upper_profits_limit);
        let above = floor_at_zero(profit - ni.upper_profits_limit);

        round_pence(main * ni.main_rate + above * ni.additional_rate)
    }
}
