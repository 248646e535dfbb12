// Database models

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A managed provider cluster as stored in the providers table
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct ProviderCluster {
    pub cluster_id: String,
    pub account_id: String,
    pub satellite_id: String,
    pub metadata: sqlx::types::JsonValue,
    pub spec: sqlx::types::JsonValue,
    /// Unset until the provider has been reconciled at least once
    pub status: Option<sqlx::types::JsonValue>,
}
