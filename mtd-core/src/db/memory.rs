//! A process-local backend, registered as `"memory"`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::factory::{DbConfig, RepositoryFactory};
use super::repository::{
    AuthorizationStore, Repositories, RepositoryError, SubmissionRecordStore,
};
use crate::models::{HmrcAuthorization, SubmissionRecord, SubmissionType, TaxYear};

type SubmissionKey = (String, TaxYear, SubmissionType);

#[derive(Debug, Default)]
pub struct InMemoryStore {
    authorizations: RwLock<HashMap<String, HmrcAuthorization>>,
    submissions: RwLock<HashMap<SubmissionKey, SubmissionRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn submission_count(&self) -> usize {
        self.submissions.read().await.len()
    }
}

#[async_trait]
impl AuthorizationStore for InMemoryStore {
    async fn get_authorization(&self, user_id: &str) -> Result<HmrcAuthorization, RepositoryError> {
        self.authorizations
            .read()
            .await
            .get(user_id)
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    async fn upsert_authorization(&self, auth: &HmrcAuthorization) -> Result<(), RepositoryError> {
        let mut rows = self.authorizations.write().await;
        let created_at = rows
            .get(&auth.user_id)
            .map_or(auth.created_at, |existing| existing.created_at);
        rows.insert(
            auth.user_id.clone(),
            HmrcAuthorization {
                created_at,
                ..auth.clone()
            },
        );
        Ok(())
    }

    async fn delete_authorization(&self, user_id: &str) -> Result<(), RepositoryError> {
        self.authorizations.write().await.remove(user_id);
        Ok(())
    }
}

#[async_trait]
impl SubmissionRecordStore for InMemoryStore {
    async fn upsert_submission(&self, record: &SubmissionRecord) -> Result<(), RepositoryError> {
        self.submissions
            .write()
            .await
            .insert(record.key(), record.clone());
        Ok(())
    }

    async fn get_submission(
        &self,
        user_id: &str,
        tax_year: TaxYear,
        submission_type: SubmissionType,
    ) -> Result<SubmissionRecord, RepositoryError> {
        self.submissions
            .read()
            .await
            .get(&(user_id.to_string(), tax_year, submission_type))
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    async fn list_submissions(
        &self,
        user_id: &str,
    ) -> Result<Vec<SubmissionRecord>, RepositoryError> {
        let mut records: Vec<_> = self
            .submissions
            .read()
            .await
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| {
            b.tax_year
                .cmp(&a.tax_year)
                .then_with(|| a.submission_type.as_str().cmp(b.submission_type.as_str()))
        });
        Ok(records)
    }
}

pub struct MemoryRepositoryFactory;

#[async_trait]
impl RepositoryFactory for MemoryRepositoryFactory {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn create(&self, _config: &DbConfig) -> Result<Repositories, RepositoryError> {
        Ok(Repositories::shared(Arc::new(InMemoryStore::new())))
    }
}
