use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use mtd_core::db::{DbConfig, RepositoryFactory};
use mtd_core::{Repositories, RepositoryError};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::info;

use crate::repository::SqliteRepository;

/// [`RepositoryFactory`] for SQLite.
///
/// Register this with a [`mtd_core::db::RepositoryRegistry`] to make the
/// `"sqlite"` backend available:
///
/// ```rust,no_run
/// use mtd_core::db::RepositoryRegistry;
/// use mtd_db_sqlite::SqliteRepositoryFactory;
///
/// let mut registry = RepositoryRegistry::new();
/// registry.register(Box::new(SqliteRepositoryFactory));
/// ```
pub struct SqliteRepositoryFactory;

impl SqliteRepositoryFactory {
    /// Accepted connection-string values:
    /// * A bare file path, e.g. `"mtd.db"`. The file is created if it does
    ///   not exist.
    /// * `":memory:"`, an ephemeral database on a single connection.
    /// * A sqlx URL such as `sqlite:mtd.db?mode=rwc`, passed through.
    async fn open(connection_string: &str) -> Result<SqliteRepository, RepositoryError> {
        let connection_string = connection_string.trim();
        let (options, max_connections) = if connection_string == ":memory:" {
            let options = SqliteConnectOptions::from_str("sqlite::memory:")
                .map_err(|e| RepositoryError::Configuration(e.to_string()))?;
            (options, 1)
        } else if connection_string.starts_with("sqlite:") {
            let options = SqliteConnectOptions::from_str(connection_string)
                .map_err(|e| RepositoryError::Configuration(e.to_string()))?;
            (options, 5)
        } else if connection_string.is_empty() {
            return Err(RepositoryError::Configuration(
                "sqlite connection string is empty".to_string(),
            ));
        } else {
            let options = SqliteConnectOptions::new()
                .filename(connection_string)
                .create_if_missing(true);
            (options, 5)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| RepositoryError::Connection(e.to_string()))?;
        Ok(SqliteRepository::new_with_pool(pool).await)
    }
}

#[async_trait]
impl RepositoryFactory for SqliteRepositoryFactory {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    /// Opens the database described by `config.connection_string` and
    /// runs the embedded migrations.
    async fn create(&self, config: &DbConfig) -> Result<Repositories, RepositoryError> {
        let repo = Self::open(&config.connection_string).await?;
        repo.run_migrations()
            .await
            .map_err(|e| RepositoryError::Database(format!("{e:#}")))?;
        info!(connection = %config.connection_string, "SQLite repository ready");
        Ok(Repositories::shared(Arc::new(repo)))
    }
}

#[cfg(test)]
mod tests {
    use mtd_core::db::{DbConfig, RepositoryFactory, RepositoryRegistry};
    use mtd_core::{SubmissionRecord, SubmissionRecordStore, SubmissionType, TaxYear};
    use pretty_assertions::assert_eq;

    use super::SqliteRepositoryFactory;

    fn memory_config() -> DbConfig {
        DbConfig {
            backend: "sqlite".to_string(),
            connection_string: ":memory:".to_string(),
        }
    }

    #[test]
    fn backend_name_is_sqlite() {
        assert_eq!(SqliteRepositoryFactory.backend_name(), "sqlite");
    }

    #[tokio::test]
    async fn creates_in_memory_repositories() {
        let repos = SqliteRepositoryFactory
            .create(&memory_config())
            .await
            .expect("failed to create in-memory repositories");

        let record = SubmissionRecord::new("u1", TaxYear::new(2024), SubmissionType::Personal, "s1");
        repos.submissions.upsert_submission(&record).await.unwrap();

        assert_eq!(repos.submissions.list_submissions("u1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn registry_dispatches_to_sqlite() {
        let mut registry = RepositoryRegistry::new();
        registry.register(Box::new(SqliteRepositoryFactory));

        assert!(registry.create(&memory_config()).await.is_ok());
    }

    #[tokio::test]
    async fn empty_connection_string_is_a_configuration_error() {
        let config = DbConfig {
            connection_string: "  ".to_string(),
            ..memory_config()
        };

        let result = SqliteRepositoryFactory.create(&config).await;

        assert!(matches!(
            result,
            Err(mtd_core::RepositoryError::Configuration(_))
        ));
    }
}
