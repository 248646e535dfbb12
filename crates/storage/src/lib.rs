// Postgres storage layer with sqlx
//
// This crate provides:
// - Database: provider lookups against the configured providers table
// - ProviderStore: the lookup trait the reconciler depends on
// - ProviderListener: LISTEN/NOTIFY change feed plus optional backfill

pub mod error;
pub mod listener;
pub mod models;
pub mod repositories;

pub use error::StorageError;
pub use listener::{backfill_providers, ProviderListener, ProviderSink};
pub use models::*;
pub use repositories::*;
