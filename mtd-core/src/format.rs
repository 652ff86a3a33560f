//! Conversion of calculation results into the regulator's wire schema.
//!
//! | Concern      | Wire form                                         |
//! |--------------|---------------------------------------------------|
//! | Money        | whole pence as `i64`, rounded half away from zero |
//! | Tax year     | `YYYY-YY`                                         |
//! | Timestamp    | ISO-8601 UTC with milliseconds, `Z` suffix        |
//! | Traceability | vendor, product, version, schema version          |
//!
//! Personal submissions carry aggregate figures: total income is reported
//! as rent income and allowable expenses as premises running costs.

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{CompanyTaxResult, PersonalTaxResult, TaxYear, TaxYearError, VendorMetadata};

/// Version tag stamped on every formatted submission.
pub const CALCULATION_SCHEMA_VERSION: &str = "2024-25.1";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("amount is too large to express in pence: {0}")]
    Overflow(Decimal),

    #[error(transparent)]
    TaxYear(#[from] TaxYearError),
}

/// Converts pounds to whole pence.
///
/// ```
/// use rust_decimal_macros::dec;
/// use mtd_core::format::to_minor_units;
///
/// assert_eq!(to_minor_units(dec!(1234.565)).unwrap(), 123457);
/// assert_eq!(to_minor_units(dec!(-0.005)).unwrap(), -1);
/// ```
pub fn to_minor_units(amount: Decimal) -> Result<i64, FormatError> {
    amount
        .checked_mul(Decimal::ONE_HUNDRED)
        .map(|p| p.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|p| p.to_i64())
        .ok_or(FormatError::Overflow(amount))
}

pub fn from_minor_units(pence: i64) -> Decimal {
    Decimal::new(pence, 2)
}

/// Canonical `YYYY-YY` form of a tax year written as `YYYY/YYYY` or
/// `YYYY-YY`.
pub fn normalize_tax_year(value: &str) -> Result<String, FormatError> {
    Ok(TaxYear::parse(value)?.to_string())
}

/// `2025-01-31T09:30:00.000Z`.
pub fn iso_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionMetadata {
    pub vendor_name: String,
    pub product_name: String,
    pub product_version: String,
    pub schema_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_id: Option<String>,
}

// ── personal ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UkPropertyIncome {
    pub rent_income: i64,
    pub premiums_of_lease_grant: i64,
    pub other_property_income: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UkPropertyExpenses {
    pub premises_running_costs: i64,
    pub repairs_and_maintenance: i64,
    pub financial_costs: i64,
    pub professional_fees: i64,
    pub cost_of_services: i64,
    pub other: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UkPropertyAdjustments {
    pub private_use_adjustment: i64,
    pub balancing_charge: i64,
    pub property_income_allowance: i64,
    pub renovation_allowance_balancing_charge: i64,
    pub residential_finance_cost: i64,
    pub unused_residential_finance_cost: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UkProperty {
    pub income: UkPropertyIncome,
    pub expenses: UkPropertyExpenses,
    pub adjustments: UkPropertyAdjustments,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalCalculation {
    pub taxable_profit: i64,
    pub income_tax: i64,
    pub national_insurance: i64,
    pub total_tax_due: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalBody {
    pub uk_property: UkProperty,
    pub calculation: PersonalCalculation,
}

// ── company ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyProfitFigures {
    pub total_profit: i64,
    pub allowable_expenses: i64,
    pub taxable_profit: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReliefTotal {
    pub total: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReliefClaimed {
    pub claimed: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LossesUsed {
    pub used: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatentBoxRelief {
    pub relief: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorporationTaxFigures {
    pub before_reliefs: i64,
    pub marginal_relief: i64,
    pub rd_tax_credit: i64,
    pub total_due: i64,
    /// Basis points, e.g. `2329` for 23.29%.
    pub effective_rate_bps: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyBody {
    pub company_details: CompanyProfitFigures,
    pub capital_allowances: ReliefTotal,
    pub rd_relief: ReliefTotal,
    pub group_relief: ReliefClaimed,
    pub losses_carried_forward: LossesUsed,
    pub patent_box: PatentBoxRelief,
    pub corporation_tax: CorporationTaxFigures,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SubmissionBody {
    Personal(PersonalBody),
    Company(CompanyBody),
}

/// Annual adjustments for a UK property business.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyAnnualAdjustments {
    pub private_use_adjustment: i64,
    pub balancing_charge: i64,
    pub period_of_grace_adjustment: bool,
    pub property_income_allowance: bool,
    pub renovation_allowance_balancing_charge: i64,
    pub residential_finance_cost: i64,
    pub unused_residential_finance_cost: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyAnnualAllowances {
    pub annual_investment_allowance: i64,
    pub business_premises_renovation_allowance: i64,
    pub zero_emission_goods_vehicle_allowance: i64,
    pub property_income_allowance: i64,
}

/// Body of the property business annual summary, sent before the final
/// calculation is triggered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyAnnualSubmission {
    pub adjustments: PropertyAnnualAdjustments,
    pub allowances: PropertyAnnualAllowances,
}

/// A calculation result ready to go on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HmrcSubmission {
    pub tax_year: String,
    pub submitted_at: String,
    pub metadata: SubmissionMetadata,
    pub body: SubmissionBody,
}

/// Formats results for the regulator, stamping this vendor's metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HmrcFormatAdapter {
    vendor: VendorMetadata,
}

impl HmrcFormatAdapter {
    pub fn new(vendor: VendorMetadata) -> Self {
        Self { vendor }
    }

    pub fn vendor(&self) -> &VendorMetadata {
        &self.vendor
    }

    fn metadata(&self, business_id: Option<&str>) -> SubmissionMetadata {
        SubmissionMetadata {
            vendor_name: self.vendor.name.clone(),
            product_name: self.vendor.product_name.clone(),
            product_version: self.vendor.product_version.clone(),
            schema_version: CALCULATION_SCHEMA_VERSION.to_string(),
            business_id: business_id.map(str::to_string),
        }
    }

    pub fn format_personal(
        &self,
        result: &PersonalTaxResult,
        tax_year: &str,
        submitted_at: DateTime<Utc>,
        business_id: Option<&str>,
    ) -> Result<HmrcSubmission, FormatError> {
        let body = PersonalBody {
            uk_property: UkProperty {
                income: UkPropertyIncome {
                    rent_income: to_minor_units(result.total_income)?,
                    ..Default::default()
                },
                expenses: UkPropertyExpenses {
                    premises_running_costs: to_minor_units(result.allowable_expenses)?,
                    ..Default::default()
                },
                adjustments: UkPropertyAdjustments {
                    property_income_allowance: to_minor_units(result.adjustments)?,
                    ..Default::default()
                },
            },
            calculation: PersonalCalculation {
                taxable_profit: to_minor_units(result.taxable_profit)?,
                income_tax: to_minor_units(result.income_tax)?,
                national_insurance: to_minor_units(result.national_insurance)?,
                total_tax_due: to_minor_units(result.total_tax_due)?,
            },
        };

        Ok(HmrcSubmission {
            tax_year: normalize_tax_year(tax_year)?,
            submitted_at: iso_timestamp(submitted_at),
            metadata: self.metadata(business_id),
            body: SubmissionBody::Personal(body),
        })
    }

    /// The annual summary for a personal submission. Only the property
    /// income allowance claim is carried; every other adjustment is zero.
    pub fn format_property_annual(
        &self,
        claims_property_income_allowance: bool,
        allowance: Decimal,
    ) -> Result<PropertyAnnualSubmission, FormatError> {
        let claimed = if claims_property_income_allowance {
            to_minor_units(allowance)?
        } else {
            0
        };

        Ok(PropertyAnnualSubmission {
            adjustments: PropertyAnnualAdjustments {
                property_income_allowance: claims_property_income_allowance,
                ..Default::default()
            },
            allowances: PropertyAnnualAllowances {
                property_income_allowance: claimed,
                ..Default::default()
            },
        })
    }

    pub fn format_company(
        &self,
        result: &CompanyTaxResult,
        tax_year: &str,
        submitted_at: DateTime<Utc>,
    ) -> Result<HmrcSubmission, FormatError> {
        let breakdown = &result.breakdown;
        // A rate scaled by 100 and taken in minor units is basis points.
        let effective_rate_bps = to_minor_units(breakdown.effective_rate * Decimal::ONE_HUNDRED)?;

        let body = CompanyBody {
            company_details: CompanyProfitFigures {
                total_profit: to_minor_units(result.total_profit)?,
                allowable_expenses: to_minor_units(result.allowable_expenses)?,
                taxable_profit: to_minor_units(result.taxable_profit)?,
            },
            capital_allowances: ReliefTotal {
                total: to_minor_units(breakdown.capital_allowances_total)?,
            },
            rd_relief: ReliefTotal {
                total: to_minor_units(breakdown.rd_relief_total)?,
            },
            group_relief: ReliefClaimed {
                claimed: to_minor_units(breakdown.group_relief_used)?,
            },
            losses_carried_forward: LossesUsed {
                used: to_minor_units(breakdown.losses_used)?,
            },
            patent_box: PatentBoxRelief {
                relief: to_minor_units(breakdown.patent_box_relief)?,
            },
            corporation_tax: CorporationTaxFigures {
                before_reliefs: to_minor_units(result.corporation_tax)?,
                marginal_relief: to_minor_units(result.marginal_relief)?,
                rd_tax_credit: to_minor_units(result.rd_tax_credit)?,
                total_due: to_minor_units(result.total_tax_due)?,
                effective_rate_bps,
            },
        };

        Ok(HmrcSubmission {
            tax_year: normalize_tax_year(tax_year)?,
            submitted_at: iso_timestamp(submitted_at),
            metadata: self.metadata(None),
            body: SubmissionBody::Company(body),
        })
    }
}
