// Fleet reconciler
//
// This crate provides:
// - Config: YAML process configuration
// - Reconciler: the per-provider callback run by Forman
// - app: wiring of storage, scheduler and change feed
// - telemetry: tracing subscriber setup

pub mod app;
pub mod config;
pub mod reconcile;
pub mod telemetry;

pub use config::{Config, ConfigError, DbConfig, ReconcileConfig, CONFIG_ENV};
pub use reconcile::{DesiredState, InstallFlow, ReconcileError, Reconciler};
