//! End-to-end submission through the CLI glue, against real storage
//! backends and a fake HMRC.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use mtd_cli::AppConfig;
use mtd_cli::commands::{self, Services, SubmitArgs};
use mtd_cli::input::PersonalInput;
use mtd_core::auth::{
    AccessToken, AesGcmCipher, TokenEndpoint, TokenEndpointError, TokenGrant,
};
use mtd_core::db::DbConfig;
use mtd_core::format::PropertyAnnualSubmission;
use mtd_core::fraud::{ClientTelemetry, ValidatedHeaders};
use mtd_core::submission::{
    BusinessDetails, CalculationAck, CalculationStatus, OutcomeStatus, RegulatorApi,
};
use mtd_core::{MtdError, PropertyIncome, SubmissionStatus, SubmissionType, TaxYear};
use pretty_assertions::assert_eq;
use rust_decimal_macros::dec;

const KEY: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

struct NoRefresh;

#[async_trait]
impl TokenEndpoint for NoRefresh {
    async fn refresh(&self, _: &str) -> Result<TokenGrant, TokenEndpointError> {
        Err(TokenEndpointError::InvalidGrant)
    }

    async fn exchange_code(&self, _: &str, _: &str) -> Result<TokenGrant, TokenEndpointError> {
        Ok(grant())
    }

    async fn revoke(&self, _: &str) -> Result<(), TokenEndpointError> {
        Ok(())
    }
}

#[derive(Default)]
struct FakeHmrc {
    annual_submissions: AtomicUsize,
    triggers: AtomicUsize,
    reject: bool,
}

#[async_trait]
impl RegulatorApi for FakeHmrc {
    async fn list_businesses(
        &self,
        _: &AccessToken,
        _: &ValidatedHeaders,
        _: &str,
    ) -> Result<Vec<BusinessDetails>, MtdError> {
        Ok(vec![BusinessDetails {
            business_id: "XPIS00000000001".to_string(),
            type_of_business: "uk-property".to_string(),
            trading_name: None,
        }])
    }

    async fn submit_property_annual(
        &self,
        _: &AccessToken,
        _: &ValidatedHeaders,
        _: &str,
        _: &str,
        _: TaxYear,
        _: &PropertyAnnualSubmission,
    ) -> Result<(), MtdError> {
        self.annual_submissions.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn trigger_final_calculation(
        &self,
        _: &AccessToken,
        _: &ValidatedHeaders,
        _: &str,
        _: TaxYear,
    ) -> Result<CalculationAck, MtdError> {
        self.triggers.fetch_add(1, Ordering::SeqCst);
        if self.reject {
            return Err(MtdError::RegulatorRejection {
                status: 403,
                code: Some("RULE_FINAL_DECLARATION_RECEIVED".to_string()),
                message: "Final declaration already received".to_string(),
                body: serde_json::json!({ "code": "RULE_FINAL_DECLARATION_RECEIVED" }),
            });
        }
        Ok(CalculationAck {
            calculation_id: "f2fb30e5-4ab6-4a29-b3c1-c7264259ff1c".to_string(),
        })
    }

    async fn calculation_status(
        &self,
        _: &AccessToken,
        _: &ValidatedHeaders,
        _: &str,
        _: TaxYear,
        _: &str,
    ) -> Result<CalculationStatus, MtdError> {
        Ok(CalculationStatus::Completed)
    }
}

fn grant() -> TokenGrant {
    TokenGrant {
        access_token: "access".to_string(),
        refresh_token: Some("refresh".to_string()),
        expires_in: 14400,
        scope: Some("read:self-assessment write:self-assessment".to_string()),
    }
}

fn config() -> AppConfig {
    AppConfig::from_toml(&format!(
        r#"
        encryption_key = "{KEY}"

        [retry]
        max_attempts = 2
        initial_backoff_ms = 1
        max_backoff_ms = 2

        [polling]
        interval_ms = 1
        timeout_secs = 1
        "#
    ))
    .expect("test configuration is valid")
}

async fn services(backend: &str, connection_string: &str) -> Services {
    let repositories = commands::open_repositories(&DbConfig {
        backend: backend.to_string(),
        connection_string: connection_string.to_string(),
    })
    .await
    .expect("failed to open repositories");
    let cipher = AesGcmCipher::from_hex(KEY).unwrap();
    Services::with_parts(repositories, Arc::new(NoRefresh), Arc::new(cipher))
}

fn submit_args(input: &PersonalInput) -> SubmitArgs {
    SubmitArgs {
        user_id: "landlord-1".to_string(),
        nino: " aa123456a ".to_string(),
        tax_year: TaxYear::new(2024),
        computation: commands::personal_computation(input, TaxYear::new(2024)),
        telemetry: ClientTelemetry {
            device_id: "beec798b-b366-47fa-b1f8-92cede14a1ce".to_string(),
            timezone: Some("Europe/London".to_string()),
            ..Default::default()
        },
    }
}

fn landlord_input() -> PersonalInput {
    PersonalInput {
        income: PropertyIncome {
            rent_income: dec!(24000),
            ..Default::default()
        },
        ..Default::default()
    }
}

#[tokio::test]
async fn accepted_submission_is_recorded_in_sqlite() {
    let config = config();
    let services = services("sqlite", ":memory:").await;
    commands::connect(&services, "landlord-1", "auth-code", "http://localhost/callback")
        .await
        .unwrap();
    let hmrc = Arc::new(FakeHmrc::default());
    let orchestrator = services.orchestrator(&config, hmrc.clone());

    let outcome = commands::submit(&orchestrator, submit_args(&landlord_input()))
        .await
        .unwrap();

    assert_eq!(outcome.status, OutcomeStatus::Accepted);
    assert!(outcome.record_persisted);
    assert_eq!(hmrc.annual_submissions.load(Ordering::SeqCst), 1);

    let records = commands::records(&services.repositories, "landlord-1").await.unwrap();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.submission_type, SubmissionType::Personal);
    assert_eq!(record.status, SubmissionStatus::Accepted);
    assert_eq!(
        record.hmrc_reference.as_deref(),
        Some("f2fb30e5-4ab6-4a29-b3c1-c7264259ff1c")
    );
    assert_eq!(record.submission_id, outcome.submission_id);
    assert!(record.payload.is_some());
}

#[tokio::test]
async fn rejection_is_recorded_and_returned() {
    let config = config();
    let services = services("memory", "").await;
    services.tokens.store_grant("landlord-1", grant()).await.unwrap();
    let hmrc = Arc::new(FakeHmrc {
        reject: true,
        ..Default::default()
    });
    let orchestrator = services.orchestrator(&config, hmrc.clone());

    let err = commands::submit(&orchestrator, submit_args(&landlord_input()))
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "Submission for landlord-1 (2024-25) failed");
    assert_eq!(hmrc.triggers.load(Ordering::SeqCst), 1);

    let records = commands::records(&services.repositories, "landlord-1").await.unwrap();
    assert_eq!(records[0].status, SubmissionStatus::Rejected);
    assert_eq!(
        records[0].error_details.as_ref().map(|d| d["code"].clone()),
        Some(serde_json::json!("RULE_FINAL_DECLARATION_RECEIVED"))
    );
}

#[tokio::test]
async fn disconnected_user_cannot_submit() {
    let config = config();
    let services = services("memory", "").await;
    services.tokens.store_grant("landlord-1", grant()).await.unwrap();
    commands::disconnect(&services, "landlord-1").await.unwrap();
    let hmrc = Arc::new(FakeHmrc::default());
    let orchestrator = services.orchestrator(&config, hmrc.clone());

    let err = commands::submit(&orchestrator, submit_args(&landlord_input()))
        .await
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<MtdError>(),
        Some(MtdError::NotAuthorized { user_id }) if user_id == "landlord-1"
    ));
    assert_eq!(hmrc.triggers.load(Ordering::SeqCst), 0);
    assert!(!services.tokens.is_connected("landlord-1").await.unwrap());
}
