use async_trait::async_trait;
use mtd_core::MtdError;
use mtd_core::auth::AccessToken;
use mtd_core::format::PropertyAnnualSubmission;
use mtd_core::fraud::ValidatedHeaders;
use mtd_core::submission::{BusinessDetails, CalculationAck, CalculationStatus, RegulatorApi};
use mtd_core::TaxYear;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::environment::{ClientConfigError, HmrcClientConfig};
use crate::response::{
    api_error, calculation_ack, parse_businesses, parse_calculation_status, transport_error,
};

const BUSINESS_DETAILS_VERSION: &str = "application/vnd.hmrc.1.0+json";
const PROPERTY_VERSION: &str = "application/vnd.hmrc.2.0+json";
const CALCULATIONS_VERSION: &str = "application/vnd.hmrc.4.0+json";

/// [`RegulatorApi`] over HTTPS.
pub struct HmrcApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl HmrcApiClient {
    pub fn new(config: &HmrcClientConfig) -> Result<Self, ClientConfigError> {
        Ok(Self {
            http: config.http_client()?,
            base_url: config.base_url.clone(),
        })
    }

    fn business_details_url(&self, nino: &str) -> String {
        format!("{}/individuals/business/details/{}", self.base_url, nino)
    }

    fn property_annual_url(&self, nino: &str, business_id: &str, tax_year: TaxYear) -> String {
        format!(
            "{}/individuals/business/property/uk/{}/{}/annual/{}",
            self.base_url, nino, business_id, tax_year
        )
    }

    fn calculation_url(&self, nino: &str, tax_year: TaxYear) -> String {
        format!(
            "{}/individuals/calculations/{}/self-assessment/{}",
            self.base_url, nino, tax_year
        )
    }

    /// Adds bearer auth, the version header and the fraud-prevention set.
    fn prepare(
        &self,
        builder: reqwest::RequestBuilder,
        token: &AccessToken,
        headers: &ValidatedHeaders,
        accept: &str,
    ) -> reqwest::RequestBuilder {
        headers
            .iter()
            .fold(builder, |b, (name, value)| b.header(name, value))
            .bearer_auth(token.secret())
            .header(reqwest::header::ACCEPT, accept)
    }

    /// Sends the request and returns `(status, body)` for a success, or
    /// the mapped error otherwise.
    async fn execute(
        &self,
        request: reqwest::RequestBuilder,
        nino: &str,
        operation: &str,
    ) -> Result<(u16, String), MtdError> {
        let resp = request.send().await.map_err(|e| {
            warn!(operation, error = %e, "HMRC request did not complete");
            transport_error(&e)
        })?;
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        debug!(operation, status, "HMRC responded");

        if (200..300).contains(&status) {
            Ok((status, body))
        } else {
            let err = api_error(status, &body, nino);
            warn!(operation, status, error = %err, "HMRC request failed");
            Err(err)
        }
    }
}

#[async_trait]
impl RegulatorApi for HmrcApiClient {
    async fn list_businesses(
        &self,
        token: &AccessToken,
        headers: &ValidatedHeaders,
        nino: &str,
    ) -> Result<Vec<BusinessDetails>, MtdError> {
        let request = self.prepare(
            self.http.get(self.business_details_url(nino)),
            token,
            headers,
            BUSINESS_DETAILS_VERSION,
        );
        match self.execute(request, nino, "list_businesses").await {
            Ok((_, body)) => parse_businesses(&body),
            // No businesses registered yet.
            Err(MtdError::RegulatorRejection { status: 404, .. }) => Ok(Vec::new()),
            Err(err) => Err(err),
        }
    }

    async fn submit_property_annual(
        &self,
        token: &AccessToken,
        headers: &ValidatedHeaders,
        nino: &str,
        business_id: &str,
        tax_year: TaxYear,
        body: &PropertyAnnualSubmission,
    ) -> Result<(), MtdError> {
        let request = self.prepare(
            self.http
                .put(self.property_annual_url(nino, business_id, tax_year))
                .json(body),
            token,
            headers,
            PROPERTY_VERSION,
        );
        self.execute(request, nino, "submit_property_annual").await?;
        info!(tax_year = %tax_year, "Annual property summary stored");
        Ok(())
    }

    async fn trigger_final_calculation(
        &self,
        token: &AccessToken,
        headers: &ValidatedHeaders,
        nino: &str,
        tax_year: TaxYear,
    ) -> Result<CalculationAck, MtdError> {
        let request = self.prepare(
            self.http
                .post(self.calculation_url(nino, tax_year))
                .json(&json!({ "finalDeclaration": true })),
            token,
            headers,
            CALCULATIONS_VERSION,
        );
        let (status, body) = self.execute(request, nino, "trigger_final_calculation").await?;
        debug!(status, "Final calculation triggered");
        calculation_ack(status, &body)
    }

    async fn calculation_status(
        &self,
        token: &AccessToken,
        headers: &ValidatedHeaders,
        nino: &str,
        tax_year: TaxYear,
        calculation_id: &str,
    ) -> Result<CalculationStatus, MtdError> {
        let url = format!("{}/{}", self.calculation_url(nino, tax_year), calculation_id);
        let request = self.prepare(self.http.get(url), token, headers, CALCULATIONS_VERSION);
        match self.execute(request, nino, "calculation_status").await {
            Ok((_, body)) => parse_calculation_status(&body),
            // The calculation is not retrievable until it has run.
            Err(MtdError::RegulatorRejection { status: 404, .. }) => Ok(CalculationStatus::Processing),
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::environment::HmrcEnvironment;

    fn client() -> HmrcApiClient {
        let config = HmrcClientConfig::new(HmrcEnvironment::Sandbox, "id", "secret")
            .with_base_url("http://localhost:9000/");
        HmrcApiClient::new(&config).unwrap()
    }

    #[test]
    fn urls_follow_the_mtd_paths() {
        let client = client();
        let year = TaxYear::new(2024);

        assert_eq!(
            client.business_details_url("AA123456A"),
            "http://localhost:9000/individuals/business/details/AA123456A"
        );
        assert_eq!(
            client.property_annual_url("AA123456A", "XPIS1", year),
            "http://localhost:9000/individuals/business/property/uk/AA123456A/XPIS1/annual/2024-25"
        );
        assert_eq!(
            client.calculation_url("AA123456A", year),
            "http://localhost:9000/individuals/calculations/AA123456A/self-assessment/2024-25"
        );
    }
}
