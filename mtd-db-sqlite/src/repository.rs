use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mtd_core::{
    AuthorizationStore, EncryptedSecret, HmrcAuthorization, RepositoryError, SubmissionRecord,
    SubmissionRecordStore, SubmissionType, TaxYear,
};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use tracing::debug;

use crate::columns::{get_optional_json, get_parsed, json_text};

pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    pub async fn new_with_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run database migrations")?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn db_error(e: sqlx::Error) -> RepositoryError {
    RepositoryError::Database(e.to_string())
}

fn row_to_authorization(row: &SqliteRow) -> Result<HmrcAuthorization, RepositoryError> {
    Ok(HmrcAuthorization {
        user_id: row.try_get("user_id").map_err(db_error)?,
        access_token: EncryptedSecret::from_stored(
            row.try_get::<String, _>("access_token").map_err(db_error)?,
        ),
        refresh_token: EncryptedSecret::from_stored(
            row.try_get::<String, _>("refresh_token").map_err(db_error)?,
        ),
        expires_at: row
            .try_get::<DateTime<Utc>, _>("expires_at")
            .map_err(|e| RepositoryError::Database(format!("Failed to get expires_at: {}", e)))?,
        scope: row.try_get("scope").map_err(db_error)?,
        created_at: row
            .try_get::<DateTime<Utc>, _>("created_at")
            .map_err(|e| RepositoryError::Database(format!("Failed to get created_at: {}", e)))?,
        updated_at: row
            .try_get::<DateTime<Utc>, _>("updated_at")
            .map_err(|e| RepositoryError::Database(format!("Failed to get updated_at: {}", e)))?,
    })
}

fn row_to_submission(row: &SqliteRow) -> Result<SubmissionRecord, RepositoryError> {
    Ok(SubmissionRecord {
        user_id: row.try_get("user_id").map_err(db_error)?,
        tax_year: get_parsed(row, "tax_year")?,
        submission_type: get_parsed(row, "submission_type")?,
        submission_id: row.try_get("submission_id").map_err(db_error)?,
        status: get_parsed(row, "status")?,
        hmrc_reference: row.try_get("hmrc_reference").map_err(db_error)?,
        submitted_at: row
            .try_get::<Option<DateTime<Utc>>, _>("submitted_at")
            .map_err(|e| RepositoryError::Database(format!("Failed to get submitted_at: {}", e)))?,
        payload: get_optional_json(row, "payload")?,
        error_details: get_optional_json(row, "error_details")?,
        updated_at: row
            .try_get::<DateTime<Utc>, _>("updated_at")
            .map_err(|e| RepositoryError::Database(format!("Failed to get updated_at: {}", e)))?,
    })
}

const SUBMISSION_COLUMNS: &str = "user_id, tax_year, submission_type, submission_id, status,
     hmrc_reference, submitted_at, payload, error_details, updated_at";

#[async_trait]
impl AuthorizationStore for SqliteRepository {
    async fn get_authorization(&self, user_id: &str) -> Result<HmrcAuthorization, RepositoryError> {
        let row = sqlx::query(
            "SELECT user_id, access_token, refresh_token, expires_at, scope, created_at, updated_at
             FROM hmrc_authorizations WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?
        .ok_or(RepositoryError::NotFound)?;

        row_to_authorization(&row)
    }

    async fn upsert_authorization(&self, auth: &HmrcAuthorization) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO hmrc_authorizations (
                user_id, access_token, refresh_token, expires_at, scope, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (user_id) DO UPDATE SET
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                expires_at = excluded.expires_at,
                scope = excluded.scope,
                updated_at = excluded.updated_at",
        )
        .bind(&auth.user_id)
        .bind(auth.access_token.as_stored())
        .bind(auth.refresh_token.as_stored())
        .bind(auth.expires_at)
        .bind(&auth.scope)
        .bind(auth.created_at)
        .bind(auth.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        debug!(user_id = %auth.user_id, "Upserted authorization");
        Ok(())
    }

    async fn delete_authorization(&self, user_id: &str) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM hmrc_authorizations WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }
}

#[async_trait]
impl SubmissionRecordStore for SqliteRepository {
    async fn upsert_submission(&self, record: &SubmissionRecord) -> Result<(), RepositoryError> {
        let query = format!(
            "INSERT INTO tax_submissions ({SUBMISSION_COLUMNS})
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (user_id, tax_year, submission_type) DO UPDATE SET
                submission_id = excluded.submission_id,
                status = excluded.status,
                hmrc_reference = excluded.hmrc_reference,
                submitted_at = excluded.submitted_at,
                payload = excluded.payload,
                error_details = excluded.error_details,
                updated_at = excluded.updated_at"
        );

        sqlx::query(&query)
            .bind(&record.user_id)
            .bind(record.tax_year.to_string())
            .bind(record.submission_type.as_str())
            .bind(&record.submission_id)
            .bind(record.status.as_str())
            .bind(&record.hmrc_reference)
            .bind(record.submitted_at)
            .bind(json_text(record.payload.as_ref())?)
            .bind(json_text(record.error_details.as_ref())?)
            .bind(record.updated_at)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;

        debug!(
            user_id = %record.user_id,
            tax_year = %record.tax_year,
            status = %record.status,
            "Upserted submission record"
        );
        Ok(())
    }

    async fn get_submission(
        &self,
        user_id: &str,
        tax_year: TaxYear,
        submission_type: SubmissionType,
    ) -> Result<SubmissionRecord, RepositoryError> {
        let query = format!(
            "SELECT {SUBMISSION_COLUMNS} FROM tax_submissions
             WHERE user_id = ? AND tax_year = ? AND submission_type = ?"
        );

        let row = sqlx::query(&query)
            .bind(user_id)
            .bind(tax_year.to_string())
            .bind(submission_type.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?
            .ok_or(RepositoryError::NotFound)?;

        row_to_submission(&row)
    }

    async fn list_submissions(
        &self,
        user_id: &str,
    ) -> Result<Vec<SubmissionRecord>, RepositoryError> {
        let query = format!(
            "SELECT {SUBMISSION_COLUMNS} FROM tax_submissions
             WHERE user_id = ? ORDER BY tax_year DESC, submission_type"
        );

        let rows = sqlx::query(&query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;

        rows.iter().map(row_to_submission).collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use mtd_core::SubmissionStatus;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use sqlx::sqlite::SqlitePoolOptions;

    use super::*;

    async fn setup_test_db() -> SqliteRepository {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory database");

        let repo = SqliteRepository::new_with_pool(pool).await;
        repo.run_migrations()
            .await
            .expect("Failed to run migrations");
        repo
    }

    fn authorization(user_id: &str, access: &str) -> HmrcAuthorization {
        let now = Utc::now();
        HmrcAuthorization {
            user_id: user_id.to_string(),
            access_token: EncryptedSecret::from_stored(access),
            refresh_token: EncryptedSecret::from_stored("cafe"),
            expires_at: now + Duration::hours(4),
            scope: Some("write:self-assessment".to_string()),
            created_at: now,
            updated_at: now,
        }
    }

    fn record(user_id: &str, year: i32, kind: SubmissionType) -> SubmissionRecord {
        SubmissionRecord::new(user_id, TaxYear::new(year), kind, format!("sub-{year}"))
    }

    // ── authorizations ───────────────────────────────────────────────────
    #[tokio::test]
    async fn test_authorization_round_trip() {
        let repo = setup_test_db().await;
        let auth = authorization("user-1", "beef");

        repo.upsert_authorization(&auth).await.expect("Should upsert");
        let fetched = repo.get_authorization("user-1").await.expect("Should fetch");

        assert_eq!(fetched.access_token.as_stored(), "beef");
        assert_eq!(fetched.scope, auth.scope);
        assert_eq!(fetched.expires_at.timestamp(), auth.expires_at.timestamp());
    }

    #[tokio::test]
    async fn test_authorization_upsert_replaces_tokens_and_keeps_created_at() {
        let repo = setup_test_db().await;
        let first = authorization("user-1", "aaaa");
        repo.upsert_authorization(&first).await.expect("Should upsert");

        let mut second = authorization("user-1", "bbbb");
        second.created_at = first.created_at + Duration::days(1);
        repo.upsert_authorization(&second).await.expect("Should upsert");

        let fetched = repo.get_authorization("user-1").await.expect("Should fetch");
        assert_eq!(fetched.access_token.as_stored(), "bbbb");
        assert_eq!(fetched.created_at.timestamp(), first.created_at.timestamp());

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM hmrc_authorizations")
            .fetch_one(repo.pool())
            .await
            .expect("Should count");
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_missing_authorization_is_not_found() {
        let repo = setup_test_db().await;

        let result = repo.get_authorization("nobody").await;

        assert!(matches!(result, Err(RepositoryError::NotFound)));
    }

    #[tokio::test]
    async fn test_delete_authorization_is_idempotent() {
        let repo = setup_test_db().await;
        repo.upsert_authorization(&authorization("user-1", "beef"))
            .await
            .expect("Should upsert");

        repo.delete_authorization("user-1").await.expect("Should delete");
        repo.delete_authorization("user-1").await.expect("Should delete again");

        assert!(matches!(
            repo.get_authorization("user-1").await,
            Err(RepositoryError::NotFound)
        ));
    }

    // ── submissions ──────────────────────────────────────────────────────
    #[tokio::test]
    async fn test_submission_round_trip() {
        let repo = setup_test_db().await;
        let mut rec = record("user-1", 2024, SubmissionType::Personal);
        rec.payload = Some(json!({ "taxYear": "2024-25" }));
        rec.submitted_at = Some(Utc::now());

        repo.upsert_submission(&rec).await.expect("Should upsert");
        let fetched = repo
            .get_submission("user-1", TaxYear::new(2024), SubmissionType::Personal)
            .await
            .expect("Should fetch");

        assert_eq!(fetched.submission_id, "sub-2024");
        assert_eq!(fetched.status, SubmissionStatus::Submitted);
        assert_eq!(fetched.payload, rec.payload);
        assert_eq!(fetched.error_details, None);
        assert!(fetched.submitted_at.is_some());
    }

    #[tokio::test]
    async fn test_upsert_overwrites_the_same_key() {
        let repo = setup_test_db().await;
        let rec = record("user-1", 2024, SubmissionType::Personal);
        repo.upsert_submission(&rec).await.expect("Should upsert");

        let mut retried = rec.clone();
        retried.submission_id = "sub-retry".to_string();
        retried.status = SubmissionStatus::Error;
        retried.error_details = Some(json!({ "attempt": 2 }));
        repo.upsert_submission(&retried).await.expect("Should upsert");

        let all = repo.list_submissions("user-1").await.expect("Should list");
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].submission_id, "sub-retry");
        assert_eq!(all[0].status, SubmissionStatus::Error);
        assert_eq!(all[0].error_details, Some(json!({ "attempt": 2 })));
    }

    #[tokio::test]
    async fn test_list_is_newest_year_first_and_per_user() {
        let repo = setup_test_db().await;
        for rec in [
            record("user-1", 2023, SubmissionType::Personal),
            record("user-1", 2024, SubmissionType::Personal),
            record("user-1", 2024, SubmissionType::Company),
            record("user-2", 2025, SubmissionType::Personal),
        ] {
            repo.upsert_submission(&rec).await.expect("Should upsert");
        }

        let listed: Vec<(String, SubmissionType)> = repo
            .list_submissions("user-1")
            .await
            .expect("Should list")
            .into_iter()
            .map(|r| (r.tax_year.to_string(), r.submission_type))
            .collect();

        assert_eq!(
            listed,
            vec![
                ("2024-25".to_string(), SubmissionType::Company),
                ("2024-25".to_string(), SubmissionType::Personal),
                ("2023-24".to_string(), SubmissionType::Personal),
            ]
        );
    }

    #[tokio::test]
    async fn test_get_missing_submission_is_not_found() {
        let repo = setup_test_db().await;

        let result = repo
            .get_submission("user-1", TaxYear::new(2024), SubmissionType::Company)
            .await;

        assert!(matches!(result, Err(RepositoryError::NotFound)));
    }
}
