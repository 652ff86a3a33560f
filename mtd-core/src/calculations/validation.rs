//! Advisory checks on user-entered figures.
//!
//! None of these block a calculation; the calculators coerce bad input on
//! their own. They exist so a form can tell the user what looks wrong.

use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{CompanyDetails, CompanyTaxResult, PropertyExpenses, PropertyIncome};

static COMPANY_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{8}$").expect("company number pattern is valid"));
static UTR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{10}$").expect("UTR pattern is valid"));
static VAT_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^GB\d{9}$").expect("VAT number pattern is valid"));

const UNUSUAL_INCOME: i64 = 10_000_000;
const MAX_ACCOUNTING_PERIOD_DAYS: i64 = 366;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputValidation {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

impl InputValidation {
    fn from_errors(errors: Vec<String>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
        }
    }
}

fn strip_whitespace(value: &str) -> String {
    value.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Flags negative figures and implausible totals in personal inputs.
pub fn validate_calculation_inputs(
    income: &PropertyIncome,
    expenses: &PropertyExpenses,
) -> InputValidation {
    let mut errors = Vec::new();

    let income_fields = [
        ("Rent income", income.rent_income),
        ("Premiums of lease grant", income.premiums_of_lease_grant),
        ("Other property income", income.other_property_income),
    ];
    for (name, value) in income_fields {
        if value < Decimal::ZERO {
            errors.push(format!("{name} cannot be negative"));
        }
    }

    for (name, value) in expenses.categories() {
        if value < Decimal::ZERO {
            errors.push(format!("{name} cannot be negative"));
        }
    }

    let raw_income = income_fields
        .iter()
        .fold(Decimal::ZERO, |total, (_, v)| total.saturating_add(*v));
    let raw_expenses = expenses
        .categories()
        .iter()
        .fold(Decimal::ZERO, |total, (_, v)| total.saturating_add(*v));

    if raw_income > Decimal::from(UNUSUAL_INCOME) {
        errors.push("Income seems unusually high - please verify".to_string());
    }
    if raw_expenses > raw_income.saturating_mul(Decimal::TWO) {
        errors.push("Expenses are more than double the income - please verify".to_string());
    }

    InputValidation::from_errors(errors)
}

/// Checks company registration details, and the calculation if given.
pub fn validate_company_details(
    details: &CompanyDetails,
    calculation: Option<&CompanyTaxResult>,
) -> InputValidation {
    let mut errors = Vec::new();

    if details.company_name.trim().is_empty() {
        errors.push("Company name is required".to_string());
    }

    let company_number = strip_whitespace(&details.company_number);
    if company_number.is_empty() {
        errors.push("Company registration number is required".to_string());
    } else if !COMPANY_NUMBER.is_match(&company_number) {
        errors.push("Company registration number must be 8 digits".to_string());
    }

    let utr = strip_whitespace(&details.utr);
    if utr.is_empty() {
        errors.push("Corporation Tax UTR is required".to_string());
    } else if !UTR.is_match(&utr) {
        errors.push("Corporation Tax UTR must be 10 digits".to_string());
    }

    match (details.accounting_period_start, details.accounting_period_end) {
        (Some(start), Some(end)) => {
            if end <= start {
                errors.push("Accounting period end must be after start date".to_string());
            } else if (end - start).num_days() > MAX_ACCOUNTING_PERIOD_DAYS {
                errors.push("Accounting period cannot exceed 12 months".to_string());
            }
        }
        (start, end) => {
            if start.is_none() {
                errors.push("Accounting period start date is required".to_string());
            }
            if end.is_none() {
                errors.push("Accounting period end date is required".to_string());
            }
        }
    }

    if details.directors.is_empty() {
        errors.push("At least one director is required".to_string());
    } else if details.directors.iter().all(|d| d.name.trim().is_empty()) {
        errors.push("At least one director must have a name".to_string());
    }

    if let Some(vat) = details.vat_number.as_deref() {
        let vat = strip_whitespace(vat);
        if !vat.is_empty() && !VAT_NUMBER.is_match(&vat) {
            errors.push("VAT number must be in format GB followed by 9 digits".to_string());
        }
    }

    if let Some(calc) = calculation {
        if calc.total_profit < Decimal::ZERO {
            errors.push("Total profit cannot be negative".to_string());
        }
        if calc.allowable_expenses < Decimal::ZERO {
            errors.push("Allowable expenses cannot be negative".to_string());
        }
    }

    InputValidation::from_errors(errors)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::models::Director;

    fn valid_company() -> CompanyDetails {
        CompanyDetails {
            company_name: "Acme Lettings Ltd".to_string(),
            company_number: "1234 5678".to_string(),
            utr: "12345 67890".to_string(),
            accounting_period_start: NaiveDate::from_ymd_opt(2024, 4, 1),
            accounting_period_end: NaiveDate::from_ymd_opt(2025, 3, 31),
            directors: vec![Director {
                name: "A. Director".to_string(),
            }],
            vat_number: Some("GB 123 456 789".to_string()),
        }
    }

    // ── personal inputs ──────────────────────────────────────────────────
    #[test]
    fn clean_inputs_pass() {
        let income = PropertyIncome {
            rent_income: dec!(20000),
            ..Default::default()
        };
        let expenses = PropertyExpenses {
            other: dec!(2000),
            ..Default::default()
        };

        let result = validate_calculation_inputs(&income, &expenses);

        assert_eq!(result, InputValidation { is_valid: true, errors: vec![] });
    }

    #[test]
    fn negative_fields_are_named() {
        let income = PropertyIncome {
            rent_income: dec!(-1),
            ..Default::default()
        };
        let expenses = PropertyExpenses {
            professional_fees: dec!(-5),
            ..Default::default()
        };

        let result = validate_calculation_inputs(&income, &expenses);

        assert!(!result.is_valid);
        assert!(result.errors.contains(&"Rent income cannot be negative".to_string()));
        assert!(result.errors.contains(&"professional fees cannot be negative".to_string()));
    }

    #[test]
    fn implausible_totals_are_flagged() {
        let income = PropertyIncome {
            rent_income: dec!(1000),
            ..Default::default()
        };
        let expenses = PropertyExpenses {
            other: dec!(2500),
            ..Default::default()
        };

        let result = validate_calculation_inputs(&income, &expenses);

        assert_eq!(
            result.errors,
            vec!["Expenses are more than double the income - please verify".to_string()]
        );
    }

    // ── company details ──────────────────────────────────────────────────
    #[test]
    fn valid_company_passes() {
        assert!(validate_company_details(&valid_company(), None).is_valid);
    }

    #[test]
    fn bad_identifiers_are_reported() {
        let details = CompanyDetails {
            company_number: "123".to_string(),
            utr: "abc".to_string(),
            vat_number: Some("FR123".to_string()),
            ..valid_company()
        };

        let result = validate_company_details(&details, None);

        assert_eq!(
            result.errors,
            vec![
                "Company registration number must be 8 digits".to_string(),
                "Corporation Tax UTR must be 10 digits".to_string(),
                "VAT number must be in format GB followed by 9 digits".to_string(),
            ]
        );
    }

    #[test]
    fn accounting_period_over_a_year_is_rejected() {
        let details = CompanyDetails {
            accounting_period_start: NaiveDate::from_ymd_opt(2024, 1, 1),
            accounting_period_end: NaiveDate::from_ymd_opt(2025, 6, 30),
            ..valid_company()
        };

        let result = validate_company_details(&details, None);

        assert_eq!(
            result.errors,
            vec!["Accounting period cannot exceed 12 months".to_string()]
        );
    }

    #[test]
    fn missing_period_and_directors_are_reported() {
        let details = CompanyDetails {
            accounting_period_start: None,
            accounting_period_end: None,
            directors: vec![Director { name: " ".to_string() }],
            ..valid_company()
        };

        let result = validate_company_details(&details, None);

        assert_eq!(
            result.errors,
            vec![
                "Accounting period start date is required".to_string(),
                "Accounting period end date is required".to_string(),
                "At least one director must have a name".to_string(),
            ]
        );
    }
}
