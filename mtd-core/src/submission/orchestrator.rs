//! Runs one submission end to end and keeps its audit record current.
//!
//! Phases: token, fraud headers, business lookup (personal only), format,
//! `submitted` record, regulator calls under the retry policy, optional
//! polling, final record. Whatever happens after the record key is known,
//! the record is overwritten with the outcome before control returns.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::api::{CalculationAck, CalculationStatus, RegulatorApi};
use super::retry::{PollPolicy, RetryPolicy};
use crate::auth::{AccessToken, OAuthTokenManager};
use crate::db::SubmissionRecordStore;
use crate::error::MtdError;
use crate::format::{HmrcFormatAdapter, HmrcSubmission, PropertyAnnualSubmission};
use crate::fraud::{ClientTelemetry, FraudPreventionHeaderGenerator, ValidatedHeaders};
use crate::models::{
    CompanyTaxResult, PersonalTaxResult, SubmissionRecord, SubmissionStatus, SubmissionType,
    TaxYear, TaxYearRates, VendorMetadata,
};

/// A finished calculation, ready to submit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Computation {
    Personal {
        result: PersonalTaxResult,
        claims_property_income_allowance: bool,
    },
    Company(CompanyTaxResult),
}

impl Computation {
    pub fn submission_type(&self) -> SubmissionType {
        match self {
            Computation::Personal { .. } => SubmissionType::Personal,
            Computation::Company(_) => SubmissionType::Company,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SubmissionRequest {
    pub user_id: String,
    pub nino: String,
    pub tax_year: TaxYear,
    pub computation: Computation,
    pub telemetry: ClientTelemetry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Accepted,
    /// Acknowledged, but the calculation had not finished when polling
    /// timed out.
    StillProcessing,
    /// The calculation finished with errors.
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionOutcome {
    pub submission_id: String,
    pub status: OutcomeStatus,
    pub calculation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    /// False when neither the primary nor the fallback store took the
    /// final record.
    pub record_persisted: bool,
}

/// What the regulator calls produced, before it is written down.
struct Settled {
    status: OutcomeStatus,
    calculation_id: String,
    errors: Vec<String>,
    /// Set when polling failed after the trigger was acknowledged.
    poll_error: Option<MtdError>,
}

pub struct SubmissionOrchestrator {
    tokens: Arc<OAuthTokenManager>,
    api: Arc<dyn RegulatorApi>,
    records: Arc<dyn SubmissionRecordStore>,
    fallback: Option<Arc<dyn SubmissionRecordStore>>,
    formatter: HmrcFormatAdapter,
    headers: FraudPreventionHeaderGenerator,
    retry: RetryPolicy,
    poll: Option<PollPolicy>,
    business_ids: RwLock<HashMap<String, String>>,
}

impl SubmissionOrchestrator {
    pub fn new(
        tokens: Arc<OAuthTokenManager>,
        api: Arc<dyn RegulatorApi>,
        records: Arc<dyn SubmissionRecordStore>,
        vendor: VendorMetadata,
    ) -> Self {
        Self {
            tokens,
            api,
            records,
            fallback: None,
            formatter: HmrcFormatAdapter::new(vendor.clone()),
            headers: FraudPreventionHeaderGenerator::new(vendor),
            retry: RetryPolicy::default(),
            poll: None,
            business_ids: RwLock::new(HashMap::new()),
        }
    }

    /// Second store that receives a record the primary failed to write.
    pub fn with_fallback(mut self, fallback: Arc<dyn SubmissionRecordStore>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Poll accepted calculations to a terminal state. Without a poll
    /// policy an acknowledgment counts as accepted.
    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = Some(poll);
        self
    }

    /// Submits `request` and records the outcome under
    /// `(user_id, tax_year, submission_type)`.
    ///
    /// # Errors
    /// Any pipeline failure. An `error` or `rejected` record has already
    /// been written (best effort) when this returns `Err`.
    pub async fn submit(&self, request: SubmissionRequest) -> Result<SubmissionOutcome, MtdError> {
        let submission_id = Uuid::new_v4().to_string();
        let mut record = SubmissionRecord::new(
            &request.user_id,
            request.tax_year,
            request.computation.submission_type(),
            &submission_id,
        );
        info!(
            user_id = %request.user_id,
            tax_year = %request.tax_year,
            submission_type = %record.submission_type,
            submission_id = %submission_id,
            "Starting submission"
        );

        match self.run(&request, &mut record).await {
            Ok(settled) => {
                record.status = match settled.status {
                    OutcomeStatus::Accepted => SubmissionStatus::Accepted,
                    OutcomeStatus::StillProcessing => SubmissionStatus::Submitted,
                    OutcomeStatus::Rejected => SubmissionStatus::Rejected,
                };
                record.hmrc_reference = Some(settled.calculation_id.clone());
                record.error_details = if !settled.errors.is_empty() {
                    Some(json!({ "kind": "calculation_failed", "errors": settled.errors }))
                } else {
                    settled
                        .poll_error
                        .as_ref()
                        .map(|err| json!({ "kind": "poll_failed", "error": err.details() }))
                };
                record.updated_at = Utc::now();
                let record_persisted = self.write_record(&record).await;

                info!(
                    user_id = %request.user_id,
                    tax_year = %request.tax_year,
                    status = %record.status,
                    record_persisted,
                    "Submission finished"
                );
                Ok(SubmissionOutcome {
                    submission_id,
                    status: settled.status,
                    calculation_id: Some(settled.calculation_id),
                    errors: settled.errors,
                    record_persisted,
                })
            }
            Err(err) => {
                let err = err.attributed_to(&request.user_id);
                if matches!(err, MtdError::RegulatorRejection { .. }) {
                    record.status = SubmissionStatus::Rejected;
                } else {
                    record.status = SubmissionStatus::Error;
                    record.submitted_at = None;
                }
                record.error_details = Some(err.details());
                record.updated_at = Utc::now();

                warn!(
                    user_id = %request.user_id,
                    tax_year = %request.tax_year,
                    status = %record.status,
                    error = %err,
                    "Submission failed"
                );
                self.write_record(&record).await;
                Err(err)
            }
        }
    }

    async fn run(
        &self,
        request: &SubmissionRequest,
        record: &mut SubmissionRecord,
    ) -> Result<Settled, MtdError> {
        let user_id = request.user_id.as_str();

        let token = self
            .retry
            .run("access_token", |_| self.tokens.get_access_token(user_id))
            .await?;

        let headers = self
            .headers
            .generate_validated(&request.telemetry, user_id)?;

        let now = Utc::now();
        let tax_year = request.tax_year.to_string();
        let (submission, annual) = match &request.computation {
            Computation::Personal {
                result,
                claims_property_income_allowance,
            } => {
                let business_id = self.business_id(&token, &headers, &request.nino).await?;
                let allowance = TaxYearRates::resolve(request.tax_year)
                    .allowances
                    .property_income_allowance;
                let annual = self
                    .formatter
                    .format_property_annual(*claims_property_income_allowance, allowance)?;
                let submission =
                    self.formatter
                        .format_personal(result, &tax_year, now, Some(&business_id))?;
                (submission, Some((business_id, annual)))
            }
            Computation::Company(result) => {
                (self.formatter.format_company(result, &tax_year, now)?, None)
            }
        };

        record.payload = Some(payload(&submission, annual.as_ref().map(|(_, a)| a))?);
        record.submitted_at = Some(now);
        record.updated_at = now;
        self.write_record(record).await;

        let ack = self
            .send(request, record, &token, &headers, annual.as_ref())
            .await?;
        info!(
            user_id,
            tax_year = %request.tax_year,
            calculation_id = %ack.calculation_id,
            "Final calculation accepted"
        );

        let Some(poll) = self.poll else {
            return Ok(Settled {
                status: OutcomeStatus::Accepted,
                calculation_id: ack.calculation_id,
                errors: Vec::new(),
                poll_error: None,
            });
        };

        // The trigger is acknowledged; a failed poll leaves it processing.
        let (status, poll_error) = match self.poll(request, &token, &headers, &ack, poll).await {
            Ok(status) => (status, None),
            Err(err) => {
                warn!(
                    user_id,
                    calculation_id = %ack.calculation_id,
                    error = %err,
                    "Polling failed after the calculation was accepted"
                );
                (CalculationStatus::Processing, Some(err))
            }
        };
        let (status, errors) = match status {
            CalculationStatus::Completed => (OutcomeStatus::Accepted, Vec::new()),
            CalculationStatus::Failed { errors } => (OutcomeStatus::Rejected, errors),
            CalculationStatus::Processing => (OutcomeStatus::StillProcessing, Vec::new()),
        };
        Ok(Settled {
            status,
            calculation_id: ack.calculation_id,
            errors,
            poll_error,
        })
    }

    /// The regulator calls proper. Each failed attempt that will be
    /// retried is written to the record before the backoff.
    async fn send(
        &self,
        request: &SubmissionRequest,
        record: &mut SubmissionRecord,
        token: &AccessToken,
        headers: &ValidatedHeaders,
        annual: Option<&(String, PropertyAnnualSubmission)>,
    ) -> Result<CalculationAck, MtdError> {
        let mut attempt = 1;
        loop {
            debug!(
                user_id = %request.user_id,
                tax_year = %request.tax_year,
                attempt,
                "Calling HMRC"
            );
            let result = async {
                if let Some((business_id, body)) = annual {
                    self.api
                        .submit_property_annual(
                            token,
                            headers,
                            &request.nino,
                            business_id,
                            request.tax_year,
                            body,
                        )
                        .await?;
                }
                self.api
                    .trigger_final_calculation(token, headers, &request.nino, request.tax_year)
                    .await
            }
            .await;

            let err = match result {
                Ok(ack) => return Ok(ack),
                Err(err) => err,
            };
            let Some(delay) = self.retry.next_delay(attempt, &err) else {
                return Err(err);
            };

            warn!(
                user_id = %request.user_id,
                tax_year = %request.tax_year,
                attempt,
                backoff_ms = delay.as_millis() as u64,
                error = %err,
                "Submission attempt failed; retrying"
            );
            record.error_details = Some(json!({ "attempt": attempt, "error": err.details() }));
            record.updated_at = Utc::now();
            self.write_record(record).await;

            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// Polls until the calculation leaves `Processing`. A timeout reports
    /// `Processing`.
    async fn poll(
        &self,
        request: &SubmissionRequest,
        token: &AccessToken,
        headers: &ValidatedHeaders,
        ack: &CalculationAck,
        poll: PollPolicy,
    ) -> Result<CalculationStatus, MtdError> {
        let waited = tokio::time::timeout(poll.timeout, async {
            loop {
                tokio::time::sleep(poll.interval).await;
                let status = self
                    .retry
                    .run("calculation_status", |_| {
                        self.api.calculation_status(
                            token,
                            headers,
                            &request.nino,
                            request.tax_year,
                            &ack.calculation_id,
                        )
                    })
                    .await?;
                debug!(calculation_id = %ack.calculation_id, ?status, "Polled calculation");
                if status != CalculationStatus::Processing {
                    return Ok::<_, MtdError>(status);
                }
            }
        })
        .await;

        match waited {
            Ok(status) => status,
            Err(_) => {
                info!(
                    calculation_id = %ack.calculation_id,
                    timeout_ms = poll.timeout.as_millis() as u64,
                    "Calculation still processing at poll timeout"
                );
                Ok(CalculationStatus::Processing)
            }
        }
    }

    /// The NINO's UK property business id, looked up once and cached.
    async fn business_id(
        &self,
        token: &AccessToken,
        headers: &ValidatedHeaders,
        nino: &str,
    ) -> Result<String, MtdError> {
        if let Some(id) = self.business_ids.read().await.get(nino) {
            return Ok(id.clone());
        }

        let businesses = self
            .retry
            .run("list_businesses", |_| {
                self.api.list_businesses(token, headers, nino)
            })
            .await?;
        let business = businesses
            .into_iter()
            .find(|b| b.is_uk_property())
            .ok_or_else(|| {
                MtdError::Validation("no UK property business is registered for this NINO".to_string())
            })?;

        debug!(business_id = %business.business_id, "Found property business");
        self.business_ids
            .write()
            .await
            .insert(nino.to_string(), business.business_id.clone());
        Ok(business.business_id)
    }

    /// Upserts `record`, falling back to the second store on failure.
    /// Returns whether any store took it.
    async fn write_record(&self, record: &SubmissionRecord) -> bool {
        let err = match self.records.upsert_submission(record).await {
            Ok(()) => {
                debug!(
                    user_id = %record.user_id,
                    tax_year = %record.tax_year,
                    status = %record.status,
                    "Submission record written"
                );
                return true;
            }
            Err(err) => err,
        };
        error!(
            user_id = %record.user_id,
            tax_year = %record.tax_year,
            status = %record.status,
            error = %err,
            "Failed to write submission record"
        );

        let Some(fallback) = &self.fallback else {
            return false;
        };
        match fallback.upsert_submission(record).await {
            Ok(()) => {
                warn!(
                    user_id = %record.user_id,
                    status = %record.status,
                    "Submission record written to fallback store"
                );
                true
            }
            Err(err) => {
                error!(
                    user_id = %record.user_id,
                    error = %err,
                    "Fallback write of submission record failed"
                );
                false
            }
        }
    }
}

fn payload(
    submission: &HmrcSubmission,
    annual: Option<&PropertyAnnualSubmission>,
) -> Result<serde_json::Value, MtdError> {
    let mut value =
        serde_json::to_value(submission).map_err(|e| MtdError::Validation(e.to_string()))?;
    if let (Some(annual), Some(map)) = (annual, value.as_object_mut()) {
        let annual =
            serde_json::to_value(annual).map_err(|e| MtdError::Validation(e.to_string()))?;
        map.insert("propertyAnnual".to_string(), annual);
    }
    Ok(value)
}
