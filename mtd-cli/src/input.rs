//! JSON documents the CLI reads.

use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use mtd_core::models::lenient;
use mtd_core::{
    CompanyDetails, CompanyTaxAdjustments, PropertyExpenses, PropertyIncome, TaxAdjustments,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde::de::DeserializeOwned;

/// A landlord's figures for one tax year.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalInput {
    #[serde(default)]
    pub income: PropertyIncome,
    #[serde(default)]
    pub expenses: PropertyExpenses,
    #[serde(default)]
    pub adjustments: TaxAdjustments,
}

/// A property company's figures for one accounting period.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyInput {
    #[serde(default, deserialize_with = "lenient::amount")]
    pub total_profit: Decimal,
    #[serde(default, deserialize_with = "lenient::amount")]
    pub allowable_expenses: Decimal,
    #[serde(default)]
    pub adjustments: CompanyTaxAdjustments,
    #[serde(default)]
    pub company: Option<CompanyDetails>,
}

/// Reads a JSON document from `path`, or from stdin when `path` is `-`.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = if path.as_os_str() == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read stdin")?;
        text
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to open: {}", path.display()))?
    };
    serde_json::from_str(&text).with_context(|| format!("Failed to parse JSON: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn personal_input_tolerates_missing_sections() {
        let input: PersonalInput =
            serde_json::from_str(r#"{ "income": { "rentIncome": "12000.50" } }"#).unwrap();

        assert_eq!(input.income.rent_income, dec!(12000.50));
        assert_eq!(input.expenses, PropertyExpenses::default());
        assert!(!input.adjustments.use_property_income_allowance);
    }

    #[test]
    fn company_input_reads_nested_adjustments() {
        let input: CompanyInput = serde_json::from_str(
            r#"{
                "totalProfit": 300000,
                "allowableExpenses": "50000",
                "adjustments": { "patentBoxProfits": 1000 },
                "company": { "companyName": "Lettings Ltd", "companyNumber": "12345678" }
            }"#,
        )
        .unwrap();

        assert_eq!(input.total_profit, dec!(300000));
        assert_eq!(input.allowable_expenses, dec!(50000));
        assert_eq!(input.adjustments.patent_box_profits, dec!(1000));
        assert_eq!(
            input.company.map(|c| c.company_name),
            Some("Lettings Ltd".to_string())
        );
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = read_json::<PersonalInput>(Path::new("/nonexistent/input.json")).unwrap_err();

        assert_eq!(err.to_string(), "Failed to open: /nonexistent/input.json");
    }
}
