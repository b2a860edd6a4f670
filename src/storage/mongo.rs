use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{doc, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{self, IndexOptions};
use mongodb::{Client, Collection, Database, IndexModel};
use tracing::debug;

use super::{
    CollectionOptions, Connector, DocumentStore, IndexSpec, UpdateOutcome, ValidationAction,
    ValidationLevel,
};
use crate::config::DatabaseConfig;
use crate::error::{StorageError, StorageResult};

/// Server error code for a unique-index violation.
const DUPLICATE_KEY: i32 = 11000;
/// Server error code for a write rejected by a collection validator.
const DOCUMENT_VALIDATION_FAILURE: i32 = 121;

/// Opens handles to a MongoDB database.
#[derive(Debug, Clone)]
pub struct MongoConnector {
    config: DatabaseConfig,
}

impl MongoConnector {
    /// Create a connector for the configured URI and database.
    pub fn new(config: DatabaseConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for MongoConnector {
    async fn connect(&self) -> StorageResult<Box<dyn DocumentStore>> {
        let client = Client::with_uri_str(&self.config.uri)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid MongoDB URI: {}", e),
            })?;
        let database = client.database(&self.config.name);

        let store = MongoStore { client, database };
        if let Err(e) = store.ping().await {
            // The client's monitors are already running; stop them before giving up.
            store.client.shutdown().await;
            return Err(StorageError::Connection {
                message: format!("Failed to connect to MongoDB: {}", e),
            });
        }

        debug!(database = %self.config.name, "Connected to MongoDB");
        Ok(Box::new(store))
    }
}

/// An open handle to one MongoDB database.
#[derive(Clone)]
pub struct MongoStore {
    client: Client,
    database: Database,
}

impl MongoStore {
    fn collection(&self, name: &str) -> Collection<Document> {
        self.database.collection::<Document>(name)
    }
}

impl From<ValidationLevel> for options::ValidationLevel {
    fn from(level: ValidationLevel) -> Self {
        match level {
            ValidationLevel::Off => options::ValidationLevel::Off,
            ValidationLevel::Strict => options::ValidationLevel::Strict,
            ValidationLevel::Moderate => options::ValidationLevel::Moderate,
        }
    }
}

impl From<ValidationAction> for options::ValidationAction {
    fn from(action: ValidationAction) -> Self {
        match action {
            ValidationAction::Error => options::ValidationAction::Error,
            ValidationAction::Warn => options::ValidationAction::Warn,
        }
    }
}

/// Map driver write errors onto the storage taxonomy.
fn classify(collection: &str, err: mongodb::error::Error) -> StorageError {
    if let ErrorKind::Write(WriteFailure::WriteError(write_error)) = err.kind.as_ref() {
        match write_error.code {
            DUPLICATE_KEY => {
                return StorageError::DuplicateKey {
                    collection: collection.to_string(),
                    message: write_error.message.clone(),
                }
            }
            DOCUMENT_VALIDATION_FAILURE => {
                return StorageError::ValidationRejected {
                    collection: collection.to_string(),
                    reason: write_error.message.clone(),
                }
            }
            _ => {}
        }
    }
    StorageError::Driver(err)
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn ping(&self) -> StorageResult<()> {
        self.database.run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }

    async fn collection_exists(&self, name: &str) -> StorageResult<bool> {
        let names = self
            .database
            .list_collection_names()
            .filter(doc! { "name": name })
            .await?;
        Ok(!names.is_empty())
    }

    async fn create_collection(
        &self,
        name: &str,
        options: &CollectionOptions,
    ) -> StorageResult<()> {
        self.database
            .create_collection(name)
            .validator(options.validator.clone())
            .validation_level(options::ValidationLevel::from(options.level))
            .validation_action(options::ValidationAction::from(options.action))
            .await?;
        Ok(())
    }

    async fn modify_collection(
        &self,
        name: &str,
        options: &CollectionOptions,
    ) -> StorageResult<()> {
        self.database
            .run_command(doc! {
                "collMod": name,
                "validator": options.validator.clone(),
                "validationLevel": options.level.as_str(),
                "validationAction": options.action.as_str(),
            })
            .await?;
        Ok(())
    }

    async fn create_index(&self, collection: &str, index: &IndexSpec) -> StorageResult<()> {
        let model = if index.unique {
            IndexModel::builder()
                .keys(index.keys.clone())
                .options(IndexOptions::builder().unique(true).build())
                .build()
        } else {
            IndexModel::builder().keys(index.keys.clone()).build()
        };

        self.collection(collection)
            .create_index(model)
            .await
            .map_err(|e| classify(collection, e))?;
        Ok(())
    }

    async fn insert_one(&self, collection: &str, document: Document) -> StorageResult<ObjectId> {
        let result = self
            .collection(collection)
            .insert_one(document)
            .await
            .map_err(|e| classify(collection, e))?;

        result
            .inserted_id
            .as_object_id()
            .ok_or_else(|| StorageError::Query {
                message: format!("Inserted id in {} is not an ObjectId", collection),
            })
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: Document,
    ) -> StorageResult<Option<Document>> {
        Ok(self.collection(collection).find_one(filter).await?)
    }

    async fn find(
        &self,
        collection: &str,
        filter: Document,
        sort: Option<Document>,
    ) -> StorageResult<Vec<Document>> {
        let coll = self.collection(collection);
        let cursor = match sort {
            Some(sort) => coll.find(filter).sort(sort).await?,
            None => coll.find(filter).await?,
        };
        let documents: Vec<Document> = cursor.try_collect().await?;
        Ok(documents)
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> StorageResult<UpdateOutcome> {
        let result = self
            .collection(collection)
            .update_one(filter, update)
            .await
            .map_err(|e| classify(collection, e))?;

        Ok(UpdateOutcome {
            matched_count: result.matched_count,
            modified_count: result.modified_count,
        })
    }

    async fn delete_one(&self, collection: &str, filter: Document) -> StorageResult<u64> {
        let result = self.collection(collection).delete_one(filter).await?;
        Ok(result.deleted_count)
    }

    async fn close(&self) -> StorageResult<()> {
        self.client.clone().shutdown().await;
        debug!("MongoDB connection closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson;
    use mongodb::error::{Error, WriteError};

    fn write_error(code: i32, message: &str) -> Error {
        let write_error: WriteError =
            bson::from_document(doc! { "code": code, "errmsg": message }).unwrap();
        Error::from(ErrorKind::Write(WriteFailure::WriteError(write_error)))
    }

    #[test]
    fn test_duplicate_key_code_classified() {
        match classify("general_assistant", write_error(11000, "E11000 duplicate key")) {
            StorageError::DuplicateKey {
                collection,
                message,
            } => {
                assert_eq!(collection, "general_assistant");
                assert_eq!(message, "E11000 duplicate key");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_validation_failure_code_classified() {
        match classify("conversations", write_error(121, "Document failed validation")) {
            StorageError::ValidationRejected { collection, reason } => {
                assert_eq!(collection, "conversations");
                assert_eq!(reason, "Document failed validation");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_other_errors_stay_driver_errors() {
        assert!(matches!(
            classify("conversations", write_error(2, "BadValue")),
            StorageError::Driver(_)
        ));
        assert!(matches!(
            classify("conversations", Error::custom("socket closed")),
            StorageError::Driver(_)
        ));
    }

    #[tokio::test]
    async fn test_unparseable_uri_is_connection_error() {
        let connector = MongoConnector::new(DatabaseConfig {
            uri: "not-a-mongodb-uri".to_string(),
            name: "financial_agents".to_string(),
        });
        assert!(matches!(
            connector.connect().await,
            Err(StorageError::Connection { .. })
        ));
    }

    #[tokio::test]
    async fn test_unreachable_server_fails_at_connect() {
        let connector = MongoConnector::new(DatabaseConfig {
            uri: "mongodb://127.0.0.1:1/?serverSelectionTimeoutMS=200".to_string(),
            name: "financial_agents".to_string(),
        });
        match connector.connect().await {
            Err(StorageError::Connection { message }) => {
                assert!(message.starts_with("Failed to connect to MongoDB"), "{}", message);
            }
            Err(other) => panic!("unexpected error {:?}", other),
            Ok(_) => panic!("nothing listens on port 1"),
        }
    }
}
