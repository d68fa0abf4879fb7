//! gcs-sync Core - configuration, ignore patterns and the transfer port
//!
//! This crate contains everything the scheduling engine needs that has no
//! concurrency of its own:
//! - **Configuration** - `Config`, `SyncRule`, `SyncDirection`, YAML loading and validation
//! - **Ignore patterns** - glob compilation into anchored path predicates
//! - **Ports** - the `ITransferInvoker` trait implemented by transfer adapters
//! - **Paths** - home expansion and `/`-normalised relative paths

pub mod config;
pub mod ignore;
pub mod paths;
pub mod ports;

pub use config::{Config, SyncDirection, SyncRule, SyncRuleBuilder, ValidationError};
pub use ignore::{IgnoreSet, PatternError};
