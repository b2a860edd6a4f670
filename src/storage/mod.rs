//! Document store seam.
//!
//! [`Connector`] opens a [`DocumentStore`] handle and every caller releases it
//! when its operation completes. [`MongoConnector`] talks to a MongoDB server;
//! [`MemoryConnector`] keeps collections in process with the same validator,
//! unique-index and update semantics.

mod memory;
mod mongo;

pub use memory::MemoryConnector;
pub use mongo::{MongoConnector, MongoStore};

use async_trait::async_trait;
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{doc, Document};
use tracing::warn;

use crate::error::StorageResult;

/// Which writes a collection validator applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationLevel {
    /// Validation disabled.
    Off,
    /// Every insert and update is validated.
    Strict,
    /// Inserts, and updates to documents that already pass, are validated.
    Moderate,
}

impl ValidationLevel {
    /// Server option value.
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationLevel::Off => "off",
            ValidationLevel::Strict => "strict",
            ValidationLevel::Moderate => "moderate",
        }
    }
}

/// What happens to a write that fails validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationAction {
    /// Reject the write.
    Error,
    /// Accept the write and log a warning.
    Warn,
}

impl ValidationAction {
    /// Server option value.
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationAction::Error => "error",
            ValidationAction::Warn => "warn",
        }
    }
}

/// Validator settings attached to a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionOptions {
    /// Validator document, `{ $jsonSchema: ... }`.
    pub validator: Document,
    /// Validation level.
    pub level: ValidationLevel,
    /// Validation action.
    pub action: ValidationAction,
}

impl CollectionOptions {
    /// Moderate level, error action: the settings every managed collection uses.
    pub fn moderate(validator: Document) -> Self {
        Self {
            validator,
            level: ValidationLevel::Moderate,
            action: ValidationAction::Error,
        }
    }
}

/// A secondary index definition.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSpec {
    /// Index key document, e.g. `{ created_at: -1 }`.
    pub keys: Document,
    /// Whether the index enforces uniqueness.
    pub unique: bool,
}

impl IndexSpec {
    /// Non-unique ascending index on one field.
    pub fn ascending(field: &str) -> Self {
        Self {
            keys: doc! { field: 1 },
            unique: false,
        }
    }

    /// Non-unique descending index on one field.
    pub fn descending(field: &str) -> Self {
        Self {
            keys: doc! { field: -1 },
            unique: false,
        }
    }

    /// Make the index unique.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// Counts reported by a single-document update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOutcome {
    /// Documents matching the filter.
    pub matched_count: u64,
    /// Documents whose content changed.
    pub modified_count: u64,
}

/// Logical operations issued against an open store handle.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Round-trip to the server.
    async fn ping(&self) -> StorageResult<()>;

    // Collection administration

    /// Whether a collection with this name exists.
    async fn collection_exists(&self, name: &str) -> StorageResult<bool>;
    /// Create a collection with validator settings.
    async fn create_collection(&self, name: &str, options: &CollectionOptions)
        -> StorageResult<()>;
    /// Replace the validator settings of an existing collection (`collMod`).
    async fn modify_collection(&self, name: &str, options: &CollectionOptions)
        -> StorageResult<()>;
    /// Create an index; creating an equivalent existing index is a no-op.
    async fn create_index(&self, collection: &str, index: &IndexSpec) -> StorageResult<()>;

    // Documents

    /// Insert a document and return its `_id`.
    async fn insert_one(&self, collection: &str, document: Document) -> StorageResult<ObjectId>;
    /// First document matching `filter`.
    async fn find_one(&self, collection: &str, filter: Document)
        -> StorageResult<Option<Document>>;
    /// All documents matching `filter`, optionally sorted.
    async fn find(
        &self,
        collection: &str,
        filter: Document,
        sort: Option<Document>,
    ) -> StorageResult<Vec<Document>>;
    /// Apply an update-operator document to the first match.
    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> StorageResult<UpdateOutcome>;
    /// Remove the first match, returning the number removed.
    async fn delete_one(&self, collection: &str, filter: Document) -> StorageResult<u64>;

    /// Release the handle.
    async fn close(&self) -> StorageResult<()>;
}

/// Opens store handles.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a new handle.
    async fn connect(&self) -> StorageResult<Box<dyn DocumentStore>>;
}

/// Close `store` and hand back `result`.
///
/// The handle is closed whether or not the operation succeeded. An operation
/// error takes precedence over a close error.
pub async fn release<T>(
    store: Box<dyn DocumentStore>,
    result: StorageResult<T>,
) -> StorageResult<T> {
    let closed = store.close().await;
    if let (Err(close_err), Err(_)) = (&closed, &result) {
        warn!(error = %close_err, "Failed to close store handle after error");
    }
    let value = result?;
    closed?;
    Ok(value)
}
