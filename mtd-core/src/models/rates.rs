use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use super::TaxYear;

/// A rate table holds a value outside its valid range.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RatesError {
    #[error("{field} must be between 0 and 1, got {value}")]
    RateOutOfRange { field: &'static str, value: Decimal },

    #[error("{field} must not be negative, got {value}")]
    NegativeAmount { field: &'static str, value: Decimal },

    #[error("{lower} must not exceed {upper}")]
    ThresholdOrder {
        lower: &'static str,
        upper: &'static str,
    },
}

/// Income tax bands for property income.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonalRates {
    pub personal_allowance: Decimal,
    /// Income above this tapers the personal allowance by £1 per £2.
    pub allowance_taper_threshold: Decimal,
    /// Width of the basic-rate band, measured on income after allowances.
    pub basic_rate_band: Decimal,
    /// Taxable income above this is charged at the additional rate.
    pub additional_rate_threshold: Decimal,
    pub basic_rate: Decimal,
    pub higher_rate: Decimal,
    pub additional_rate: Decimal,
}

/// Class 4 National Insurance bands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NationalInsuranceRates {
    pub lower_profits_limit: Decimal,
    pub upper_profits_limit: Decimal,
    pub main_rate: Decimal,
    pub additional_rate: Decimal,
}

/// Corporation tax rates, capital allowance rates and relief multipliers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorporationRates {
    pub small_profits_rate: Decimal,
    pub main_rate: Decimal,
    pub lower_limit: Decimal,
    pub upper_limit: Decimal,
    pub marginal_relief_fraction: Decimal,
    pub annual_investment_allowance: Decimal,
    pub main_pool_rate: Decimal,
    pub special_pool_rate: Decimal,
    pub structures_buildings_rate: Decimal,
    pub rd_sme_multiplier: Decimal,
    pub rd_large_multiplier: Decimal,
    pub rd_tax_credit_rate: Decimal,
    pub patent_box_rate: Decimal,
}

/// Fixed allowances available to individual landlords.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowanceRates {
    pub property_income_allowance: Decimal,
    pub mileage_threshold: Decimal,
    pub mileage_rate_within_threshold: Decimal,
    pub mileage_rate_above_threshold: Decimal,
}

/// Every statutory figure the calculators need for one tax year.
///
/// | Year    | Class 4 main rate |
/// |---------|-------------------|
/// | 2023-24 | 9%                |
/// | 2024-25 | 6%                |
/// | 2025-26 | 6%                |
///
/// All other figures are unchanged across the built-in years.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxYearRates {
    pub tax_year: TaxYear,
    pub personal: PersonalRates,
    pub national_insurance: NationalInsuranceRates,
    pub corporation: CorporationRates,
    pub allowances: AllowanceRates,
}

const BUILT_IN_YEARS: [i32; 3] = [2023, 2024, 2025];

impl TaxYearRates {
    /// Built-in table for `tax_year`, if one exists.
    pub fn for_tax_year(tax_year: TaxYear) -> Option<Self> {
        let class4_main_rate = match tax_year.start_year() {
            2023 => Decimal::new(9, 2),
            2024 | 2025 => Decimal::new(6, 2),
            _ => return None,
        };

        Some(Self::table(tax_year, class4_main_rate))
    }

    fn table(tax_year: TaxYear, class4_main_rate: Decimal) -> Self {
        Self {
            tax_year,
            personal: PersonalRates {
                personal_allowance: Decimal::from(12_570),
                allowance_taper_threshold: Decimal::from(100_000),
                basic_rate_band: Decimal::from(37_700),
                additional_rate_threshold: Decimal::from(125_140),
                basic_rate: Decimal::new(20, 2),
                higher_rate: Decimal::new(40, 2),
                additional_rate: Decimal::new(45, 2),
            },
            national_insurance: NationalInsuranceRates {
                lower_profits_limit: Decimal::from(12_570),
                upper_profits_limit: Decimal::from(50_270),
                main_rate: class4_main_rate,
                additional_rate: Decimal::new(2, 2),
            },
            corporation: CorporationRates {
                small_profits_rate: Decimal::new(19, 2),
                main_rate: Decimal::new(25, 2),
                lower_limit: Decimal::from(250_000),
                upper_limit: Decimal::from(1_500_000),
                marginal_relief_fraction: Decimal::from(3) / Decimal::from(200),
                annual_investment_allowance: Decimal::from(1_000_000),
                main_pool_rate: Decimal::new(18, 2),
                special_pool_rate: Decimal::new(6, 2),
                structures_buildings_rate: Decimal::new(3, 2),
                rd_sme_multiplier: Decimal::new(230, 2),
                rd_large_multiplier: Decimal::new(130, 2),
                rd_tax_credit_rate: Decimal::new(145, 3),
                patent_box_rate: Decimal::new(10, 2),
            },
            allowances: AllowanceRates {
                property_income_allowance: Decimal::from(1_000),
                mileage_threshold: Decimal::from(10_000),
                mileage_rate_within_threshold: Decimal::new(45, 2),
                mileage_rate_above_threshold: Decimal::new(25, 2),
            },
        }
    }

    /// Table for the most recent built-in year.
    pub fn latest() -> Self {
        let newest = BUILT_IN_YEARS[BUILT_IN_YEARS.len() - 1];
        Self::table(TaxYear::new(newest), Decimal::new(6, 2))
    }

    /// Table for `tax_year`, falling back to the latest built-in year.
    pub fn resolve(tax_year: TaxYear) -> Self {
        match Self::for_tax_year(tax_year) {
            Some(rates) => rates,
            None => {
                let latest = Self::latest();
                warn!(
                    requested = %tax_year,
                    using = %latest.tax_year,
                    "No rate table for tax year; using latest"
                );
                latest
            }
        }
    }

    /// Years with a built-in table, oldest first.
    pub fn built_in_years() -> Vec<TaxYear> {
        BUILT_IN_YEARS.iter().copied().map(TaxYear::new).collect()
    }

    /// Checks every rate is a fraction and every threshold is ordered.
    pub fn validate(&self) -> Result<(), RatesError> {
        let rates = [
            ("basic_rate", self.personal.basic_rate),
            ("higher_rate", self.personal.higher_rate),
            ("additional_rate", self.personal.additional_rate),
            ("class4_main_rate", self.national_insurance.main_rate),
            ("class4_additional_rate", self.national_insurance.additional_rate),
            ("small_profits_rate", self.corporation.small_profits_rate),
            ("main_rate", self.corporation.main_rate),
            ("marginal_relief_fraction", self.corporation.marginal_relief_fraction),
            ("main_pool_rate", self.corporation.main_pool_rate),
            ("special_pool_rate", self.corporation.special_pool_rate),
            ("structures_buildings_rate", self.corporation.structures_buildings_rate),
            ("rd_tax_credit_rate", self.corporation.rd_tax_credit_rate),
            ("patent_box_rate", self.corporation.patent_box_rate),
        ];
        for (field, value) in rates {
            if value < Decimal::ZERO || value > Decimal::ONE {
                return Err(RatesError::RateOutOfRange { field, value });
            }
        }

        let amounts = [
            ("personal_allowance", self.personal.personal_allowance),
            ("basic_rate_band", self.personal.basic_rate_band),
            ("property_income_allowance", self.allowances.property_income_allowance),
            ("annual_investment_allowance", self.corporation.annual_investment_allowance),
            ("mileage_threshold", self.allowances.mileage_threshold),
        ];
        for (field, value) in amounts {
            if value < Decimal::ZERO {
                return Err(RatesError::NegativeAmount { field, value });
            }
        }

        if self.national_insurance.lower_profits_limit > self.national_insurance.upper_profits_limit {
            return Err(RatesError::ThresholdOrder {
                lower: "lower_profits_limit",
                upper: "upper_profits_limit",
            });
        }
        if self.corporation.lower_limit > self.corporation.upper_limit {
            return Err(RatesError::ThresholdOrder {
                lower: "lower_limit",
                upper: "upper_limit",
            });
        }
        if self.personal.basic_rate_band > self.personal.additional_rate_threshold {
            return Err(RatesError::ThresholdOrder {
                lower: "basic_rate_band",
                upper: "additional_rate_threshold",
            });
        }

        Ok(())
    }
}

impl Default for TaxYearRates {
    /// The 2024-25 table.
    fn default() -> Self {
        Self::table(TaxYear::new(2024), Decimal::new(6, 2))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn built_in_tables_validate() {
        for year in TaxYearRates::built_in_years() {
            let rates = TaxYearRates::for_tax_year(year).unwrap();
            assert_eq!(rates.validate(), Ok(()), "{year} table should validate");
        }
    }

    #[test]
    fn class4_main_rate_drops_from_2024() {
        let y2023 = TaxYearRates::for_tax_year(TaxYear::new(2023)).unwrap();
        let y2024 = TaxYearRates::for_tax_year(TaxYear::new(2024)).unwrap();

        assert_eq!(y2023.national_insurance.main_rate, dec!(0.09));
        assert_eq!(y2024.national_insurance.main_rate, dec!(0.06));
    }

    #[test]
    fn default_is_2024_25() {
        assert_eq!(TaxYearRates::default().tax_year.to_string(), "2024-25");
    }

    #[test]
    fn unknown_year_resolves_to_latest() {
        let rates = TaxYearRates::resolve(TaxYear::new(1999));

        assert_eq!(rates.tax_year, TaxYearRates::latest().tax_year);
        assert_eq!(rates.tax_year.to_string(), "2025-26");
    }

    #[test]
    fn marginal_relief_fraction_is_three_two_hundredths() {
        let rates = TaxYearRates::default();

        assert_eq!(rates.corporation.marginal_relief_fraction, dec!(0.015));
    }

    #[test]
    fn validate_rejects_rate_above_one() {
        let mut rates = TaxYearRates::default();
        rates.corporation.main_rate = dec!(1.5);

        assert_eq!(
            rates.validate(),
            Err(RatesError::RateOutOfRange {
                field: "main_rate",
                value: dec!(1.5),
            })
        );
    }

    #[test]
    fn validate_rejects_inverted_thresholds() {
        let mut rates = TaxYearRates::default();
        rates.corporation.lower_limit = dec!(2000000);

        assert!(matches!(
            rates.validate(),
            Err(RatesError::ThresholdOrder { .. })
        ));
    }
}
