//! # Financial Agent DB
//!
//! Provisions and exercises the MongoDB database behind a multi-agent
//! financial-investigation assistant.
//!
//! ## Features
//!
//! - **Schema registry**: `$jsonSchema` validators for the six collections
//! - **Provisioning**: idempotent collection and index setup
//! - **Record access**: typed create/read/update/delete per collection
//! - **Sample data**: one assistant, four specialized agents, two conversations
//! - **Validation harness**: end-to-end smoke test with cleanup
//!
//! ## Architecture
//!
//! ```text
//! CLI → Provisioner / Repositories / Seeder / Harness
//!                    ↓
//!         Connector → DocumentStore (MongoDB | in-memory)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use financial_agent_db::{Config, MongoConnector, Provisioner, Repositories, Seeder};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let connector = Arc::new(MongoConnector::new(config.database.clone()));
//!     Provisioner::new(connector.clone()).provision_all().await?;
//!     Seeder::new().run(&Repositories::new(connector)).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

/// Configuration loaded from the environment.
pub mod config;
/// Error types and result aliases for the application.
pub mod error;
/// End-to-end validation harness.
pub mod harness;
/// Record types stored in each collection.
pub mod models;
/// Collection and index provisioning.
pub mod provision;
/// Typed record access.
pub mod repository;
/// Collection names and validator schemas.
pub mod schema;
/// Sample data loader.
pub mod seed;
/// Document store abstraction and backends.
pub mod storage;

pub use config::Config;
pub use error::{AppError, AppResult, StorageError, StorageResult};
pub use harness::{Harness, Phase, PhaseResult, ValidationReport};
pub use provision::{CollectionAction, Provisioner};
pub use repository::{Repositories, Repository};
pub use schema::Collection;
pub use seed::{SeedOutcome, SeedReport, Seeder};
pub use storage::{Connector, DocumentStore, MemoryConnector, MongoConnector};
