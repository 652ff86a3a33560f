use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::auth::AccessToken;
use crate::error::MtdError;
use crate::format::PropertyAnnualSubmission;
use crate::fraud::ValidatedHeaders;
use crate::models::TaxYear;

/// One business registered against a NINO.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessDetails {
    pub business_id: String,
    #[serde(alias = "businessType")]
    pub type_of_business: String,
    #[serde(default)]
    pub trading_name: Option<String>,
}

impl BusinessDetails {
    pub fn is_uk_property(&self) -> bool {
        matches!(self.type_of_business.as_str(), "uk-property" | "property")
    }
}

/// The regulator accepted a final-calculation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculationAck {
    pub calculation_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalculationStatus {
    Processing,
    Completed,
    Failed { errors: Vec<String> },
}

/// The regulator's MTD endpoints.
///
/// Every call carries a bearer token and the validated fraud-prevention
/// headers; there is no way to call it with an unvalidated set.
#[async_trait]
pub trait RegulatorApi: Send + Sync {
    async fn list_businesses(
        &self,
        token: &AccessToken,
        headers: &ValidatedHeaders,
        nino: &str,
    ) -> Result<Vec<BusinessDetails>, MtdError>;

    async fn submit_property_annual(
        &self,
        token: &AccessToken,
        headers: &ValidatedHeaders,
        nino: &str,
        business_id: &str,
        tax_year: TaxYear,
        body: &PropertyAnnualSubmission,
    ) -> Result<(), MtdError>;

    async fn trigger_final_calculation(
        &self,
        token: &AccessToken,
        headers: &ValidatedHeaders,
        nino: &str,
        tax_year: TaxYear,
    ) -> Result<CalculationAck, MtdError>;

    async fn calculation_status(
        &self,
        token: &AccessToken,
        headers: &ValidatedHeaders,
        nino: &str,
        tax_year: TaxYear,
        calculation_id: &str,
    ) -> Result<CalculationStatus, MtdError>;
}
