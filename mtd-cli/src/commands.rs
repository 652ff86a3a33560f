use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use mtd_core::auth::{OAuthTokenManager, TokenCipher, TokenEndpoint};
use mtd_core::calculations::{
    CompanyTaxCalculator, PersonalTaxCalculator, validate_calculation_inputs,
    validate_company_details,
};
use mtd_core::db::{DbConfig, MemoryRepositoryFactory, RepositoryRegistry, SubmissionRecordStore};
use mtd_core::format::{HmrcFormatAdapter, HmrcSubmission};
use mtd_core::fraud::ClientTelemetry;
use mtd_core::submission::{
    Computation, RegulatorApi, SubmissionOrchestrator, SubmissionOutcome, SubmissionRequest,
};
use mtd_core::{
    CompanyTaxResult, PersonalTaxResult, Repositories, SubmissionRecord, TaxYear, VendorMetadata,
};
use mtd_db_sqlite::SqliteRepositoryFactory;
use mtd_hmrc::{HmrcApiClient, HmrcTokenEndpoint};
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::input::{CompanyInput, PersonalInput};

// ── Computation ──────────────────────────────────────────────────────────

pub fn personal(input: &PersonalInput, tax_year: TaxYear) -> PersonalTaxResult {
    let validation = validate_calculation_inputs(&input.income, &input.expenses);
    for message in &validation.errors {
        warn!(tax_year = %tax_year, "{message}");
    }
    PersonalTaxCalculator::for_tax_year(tax_year).calculate(
        &input.income,
        &input.expenses,
        &input.adjustments,
    )
}

pub fn company(input: &CompanyInput, tax_year: TaxYear) -> CompanyTaxResult {
    let result = CompanyTaxCalculator::for_tax_year(tax_year).calculate(
        input.total_profit,
        input.allowable_expenses,
        &input.adjustments,
    );
    if let Some(details) = &input.company {
        let validation = validate_company_details(details, Some(&result));
        for message in &validation.errors {
            warn!(tax_year = %tax_year, "{message}");
        }
    }
    result
}

/// Computes and formats in one step, with no business id.
pub fn format(
    vendor: VendorMetadata,
    computation: &Computation,
    tax_year: TaxYear,
) -> Result<HmrcSubmission> {
    let adapter = HmrcFormatAdapter::new(vendor);
    let tax_year = tax_year.to_string();
    let submission = match computation {
        Computation::Personal { result, .. } => {
            adapter.format_personal(result, &tax_year, Utc::now(), None)
        }
        Computation::Company(result) => adapter.format_company(result, &tax_year, Utc::now()),
    };
    submission.context("Failed to format submission")
}

pub fn personal_computation(input: &PersonalInput, tax_year: TaxYear) -> Computation {
    Computation::Personal {
        result: personal(input, tax_year),
        claims_property_income_allowance: input.adjustments.use_property_income_allowance,
    }
}

pub fn company_computation(input: &CompanyInput, tax_year: TaxYear) -> Computation {
    Computation::Company(company(input, tax_year))
}

// ── Services ─────────────────────────────────────────────────────────────

pub async fn open_repositories(config: &DbConfig) -> Result<Repositories> {
    let mut registry = RepositoryRegistry::new();
    registry.register(Box::new(SqliteRepositoryFactory));
    registry.register(Box::new(MemoryRepositoryFactory));

    registry
        .create(config)
        .await
        .with_context(|| format!("Failed to open '{}' storage backend", config.backend))
}

/// Stores and token manager shared by the commands that touch HMRC state.
pub struct Services {
    pub repositories: Repositories,
    pub tokens: Arc<OAuthTokenManager>,
}

impl Services {
    /// Opens storage and wires the HMRC token endpoint.
    pub async fn open(config: &AppConfig) -> Result<Self> {
        config.hmrc.require_credentials()?;
        let cipher = config.cipher()?;
        let endpoint = HmrcTokenEndpoint::new(config.hmrc.client_config())
            .context("Failed to build HMRC token client")?;
        let repositories = open_repositories(&config.database.db_config()).await?;
        Ok(Self::with_parts(repositories, Arc::new(endpoint), Arc::new(cipher)))
    }

    pub fn with_parts(
        repositories: Repositories,
        endpoint: Arc<dyn TokenEndpoint>,
        cipher: Arc<dyn TokenCipher>,
    ) -> Self {
        let tokens = Arc::new(OAuthTokenManager::new(
            repositories.authorizations.clone(),
            endpoint,
            cipher,
        ));
        Self {
            repositories,
            tokens,
        }
    }

    pub fn orchestrator(
        &self,
        config: &AppConfig,
        api: Arc<dyn RegulatorApi>,
    ) -> SubmissionOrchestrator {
        let orchestrator = SubmissionOrchestrator::new(
            self.tokens.clone(),
            api,
            self.repositories.submissions.clone(),
            config.vendor.clone(),
        )
        .with_retry_policy(config.retry.policy());
        match config.polling.policy() {
            Some(poll) => orchestrator.with_poll_policy(poll),
            None => orchestrator,
        }
    }

    pub fn hmrc_api(config: &AppConfig) -> Result<Arc<dyn RegulatorApi>> {
        let client = HmrcApiClient::new(&config.hmrc.client_config())
            .context("Failed to build HMRC API client")?;
        Ok(Arc::new(client))
    }
}

// ── HMRC state ───────────────────────────────────────────────────────────

pub struct SubmitArgs {
    pub user_id: String,
    pub nino: String,
    pub tax_year: TaxYear,
    pub computation: Computation,
    pub telemetry: ClientTelemetry,
}

pub async fn submit(
    orchestrator: &SubmissionOrchestrator,
    args: SubmitArgs,
) -> Result<SubmissionOutcome> {
    let request = SubmissionRequest {
        user_id: args.user_id,
        nino: args.nino.trim().to_ascii_uppercase(),
        tax_year: args.tax_year,
        computation: args.computation,
        telemetry: args.telemetry,
    };
    let user_id = request.user_id.clone();
    let tax_year = request.tax_year;
    orchestrator
        .submit(request)
        .await
        .with_context(|| format!("Submission for {user_id} ({tax_year}) failed"))
}

pub async fn records(repositories: &Repositories, user_id: &str) -> Result<Vec<SubmissionRecord>> {
    repositories
        .submissions
        .list_submissions(user_id)
        .await
        .with_context(|| format!("Failed to list submissions for {user_id}"))
}

/// Completes OAuth consent with the code from the redirect.
pub async fn connect(
    services: &Services,
    user_id: &str,
    code: &str,
    redirect_uri: &str,
) -> Result<()> {
    services
        .tokens
        .exchange_code(user_id, code, redirect_uri)
        .await
        .with_context(|| format!("Failed to connect {user_id} to HMRC"))?;
    info!(user_id, "Connected to HMRC");
    Ok(())
}

pub async fn disconnect(services: &Services, user_id: &str) -> Result<()> {
    services
        .tokens
        .disconnect(user_id)
        .await
        .with_context(|| format!("Failed to disconnect {user_id}"))?;
    info!(user_id, "Disconnected from HMRC");
    Ok(())
}
