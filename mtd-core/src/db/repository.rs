use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{HmrcAuthorization, SubmissionRecord, SubmissionType, TaxYear};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("Record not found")]
    NotFound,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// One authorization row per user. Tokens arrive and leave encrypted.
#[async_trait]
pub trait AuthorizationStore: Send + Sync {
    /// # Errors
    /// [`RepositoryError::NotFound`] when the user has never connected.
    async fn get_authorization(&self, user_id: &str) -> Result<HmrcAuthorization, RepositoryError>;

    /// Inserts or replaces the user's row.
    async fn upsert_authorization(&self, auth: &HmrcAuthorization) -> Result<(), RepositoryError>;

    /// Removing a row that does not exist is not an error.
    async fn delete_authorization(&self, user_id: &str) -> Result<(), RepositoryError>;
}

/// Submission audit trail, unique on `(user_id, tax_year, submission_type)`.
#[async_trait]
pub trait SubmissionRecordStore: Send + Sync {
    /// Inserts the record or overwrites the one with the same key.
    async fn upsert_submission(&self, record: &SubmissionRecord) -> Result<(), RepositoryError>;

    async fn get_submission(
        &self,
        user_id: &str,
        tax_year: TaxYear,
        submission_type: SubmissionType,
    ) -> Result<SubmissionRecord, RepositoryError>;

    /// Newest tax year first.
    async fn list_submissions(&self, user_id: &str)
    -> Result<Vec<SubmissionRecord>, RepositoryError>;
}

/// The stores a backend provides, ready to hand to the token manager and
/// the orchestrator.
#[derive(Clone)]
pub struct Repositories {
    pub authorizations: Arc<dyn AuthorizationStore>,
    pub submissions: Arc<dyn SubmissionRecordStore>,
}

impl Repositories {
    /// Both stores backed by the same value.
    pub fn shared<T>(store: Arc<T>) -> Self
    where
        T: AuthorizationStore + SubmissionRecordStore + 'static,
    {
        Self {
            authorizations: store.clone(),
            submissions: store,
        }
    }
}

impl std::fmt::Debug for Repositories {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repositories").finish_non_exhaustive()
    }
}
