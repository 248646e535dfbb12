// Repository layer for provider lookups
//
// Decision: Table names come from configuration, so they are validated as
// plain identifiers before being interpolated into SQL (they cannot be bound)

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::postgres::PgConnectOptions;
use sqlx::PgPool;
use tracing::{debug, info, instrument};

use crate::error::StorageError;
use crate::models::ProviderCluster;

/// Logical name of the providers table in the table mapping
pub const PROVIDERS_TABLE: &str = "providers";

/// Physical table names, resolved from the configured mapping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNames {
    providers: String,
}

impl TableNames {
    /// Resolve and validate the physical table names
    pub fn from_mapping(tables: &HashMap<String, String>) -> Result<Self, StorageError> {
        let providers = tables
            .get(PROVIDERS_TABLE)
            .ok_or(StorageError::MissingTable(PROVIDERS_TABLE))?;
        validate_identifier(providers)?;

        Ok(Self {
            providers: providers.clone(),
        })
    }

    /// Providers table, which is also the notification channel
    pub fn providers(&self) -> &str {
        &self.providers
    }
}

fn validate_identifier(name: &str) -> Result<(), StorageError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
                && name.len() <= 63
        }
        None => false,
    };

    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidTableName(name.to_string()))
    }
}

/// Provider lookups needed by the reconciler and the backfill
#[async_trait]
pub trait ProviderStore: Send + Sync {
    /// Fetch a provider by cluster id, `None` if it does not exist
    async fn get_provider_cluster(
        &self,
        cluster_id: &str,
    ) -> Result<Option<ProviderCluster>, StorageError>;

    /// Ids of every known provider
    async fn list_provider_ids(&self) -> Result<Vec<String>, StorageError>;
}

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
    tables: TableNames,
}

impl Database {
    /// Connect, verify the table mapping and ping the database
    #[instrument(skip_all)]
    pub async fn connect(
        options: PgConnectOptions,
        tables: &HashMap<String, String>,
    ) -> Result<Self, StorageError> {
        let tables = TableNames::from_mapping(tables)?;

        let pool = PgPool::connect_with(options)
            .await
            .map_err(StorageError::Connect)?;

        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .map_err(StorageError::Connect)?;

        info!(providers_table = %tables.providers(), "Connected to database");
        Ok(Self { pool, tables })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn tables(&self) -> &TableNames {
        &self.tables
    }

    /// Close every pooled connection
    pub async fn close(&self) {
        self.pool.close().await;
        debug!("Database pool closed");
    }
}

#[async_trait]
impl ProviderStore for Database {
    async fn get_provider_cluster(
        &self,
        cluster_id: &str,
    ) -> Result<Option<ProviderCluster>, StorageError> {
        let query = format!(
            r#"
            SELECT cluster_id, account_id, satellite_id, metadata, spec, status
            FROM {}
            WHERE cluster_id = $1
            "#,
            self.tables.providers()
        );

        let row = sqlx::query_as::<_, ProviderCluster>(&query)
            .bind(cluster_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    async fn list_provider_ids(&self) -> Result<Vec<String>, StorageError> {
        let query = format!("SELECT cluster_id FROM {}", self.tables.providers());

        let ids = sqlx::query_scalar::<_, String>(&query)
            .fetch_all(&self.pool)
            .await?;

        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_table_names_require_providers() {
        let err = TableNames::from_mapping(&mapping(&[("clusters", "c")])).unwrap_err();
        assert!(matches!(err, StorageError::MissingTable("providers")));
        assert_eq!(
            err.to_string(),
            "incomplete table name mapping, missing a table name for \"providers\" table"
        );
    }

    #[test]
    fn test_table_names_resolve() {
        let tables = TableNames::from_mapping(&mapping(&[("providers", "provider_clusters")]))
            .unwrap();
        assert_eq!(tables.providers(), "provider_clusters");
    }

    #[test]
    fn test_table_names_reject_injection() {
        for bad in [
            "",
            "1providers",
            "providers; DROP TABLE x",
            "public.providers",
            "prov-iders",
        ] {
            let result = TableNames::from_mapping(&mapping(&[("providers", bad)]));
            assert!(
                matches!(result, Err(StorageError::InvalidTableName(_))),
                "{:?} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_identifier_length_limit() {
        assert!(validate_identifier(&"a".repeat(63)).is_ok());
        assert!(validate_identifier(&"a".repeat(64)).is_err());
        assert!(validate_identifier("_private_table").is_ok());
    }
}
