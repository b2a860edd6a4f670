//! Collection and index provisioning.

use std::sync::Arc;

use mongodb::bson::Document;
use tracing::{error, info};

use crate::error::StorageResult;
use crate::models::AgentType;
use crate::schema::Collection;
use crate::storage::{release, CollectionOptions, Connector, DocumentStore, IndexSpec};

/// What `ensure_collection` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionAction {
    /// The collection did not exist and was created.
    Created,
    /// The collection existed and its validator was re-applied.
    Updated,
}

/// Every secondary index, by collection.
pub fn index_plan() -> Vec<(Collection, IndexSpec)> {
    let mut plan = vec![(
        Collection::GeneralAssistant,
        IndexSpec::ascending("name").unique(),
    )];
    plan.extend(
        AgentType::ALL
            .iter()
            .map(|agent_type| (Collection::Agent(*agent_type), IndexSpec::ascending("parent_id"))),
    );
    plan.extend([
        (Collection::Conversations, IndexSpec::ascending("user_id")),
        (Collection::Conversations, IndexSpec::ascending("agent_id")),
        (Collection::Conversations, IndexSpec::ascending("agent_type")),
        (Collection::Conversations, IndexSpec::descending("created_at")),
    ]);
    plan
}

/// Creates collections with validators and builds indexes.
#[derive(Clone)]
pub struct Provisioner {
    connector: Arc<dyn Connector>,
}

impl Provisioner {
    /// Create a provisioner over `connector`.
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self { connector }
    }

    /// Create `name` with `validator` if absent, otherwise re-apply the validator.
    ///
    /// Both paths use validation level "moderate" and action "error".
    pub async fn ensure_collection(
        &self,
        name: &str,
        validator: Document,
    ) -> StorageResult<CollectionAction> {
        let store = self.connector.connect().await?;
        let result = apply_validator(store.as_ref(), name, validator).await;
        release(store, result).await
    }

    /// Run `ensure_collection` for every managed collection over one handle.
    pub async fn create_collections(&self) -> StorageResult<()> {
        info!("Creating collections with schema validation...");
        let store = self.connector.connect().await?;
        let result = create_all(store.as_ref()).await;
        let result = release(store, result).await;

        match &result {
            Ok(()) => info!("All collections created successfully with schema validation"),
            Err(e) => error!(error = %e, "Error creating collections"),
        }
        result
    }

    /// Build every index in [`index_plan`]. Returns the number declared.
    pub async fn ensure_indexes(&self) -> StorageResult<usize> {
        info!("Creating indexes for collections...");
        let store = self.connector.connect().await?;
        let result = create_indexes(store.as_ref()).await;
        let result = release(store, result).await;

        match &result {
            Ok(count) => info!(count, "All indexes created successfully"),
            Err(e) => error!(error = %e, "Error creating indexes"),
        }
        result
    }

    /// Collections, then indexes.
    pub async fn provision_all(&self) -> StorageResult<()> {
        self.create_collections().await?;
        self.ensure_indexes().await?;
        Ok(())
    }
}

async fn apply_validator(
    store: &dyn DocumentStore,
    name: &str,
    validator: Document,
) -> StorageResult<CollectionAction> {
    let options = CollectionOptions::moderate(validator);

    let action = if store.collection_exists(name).await? {
        info!(collection = name, "Collection already exists. Updating validation schema...");
        store.modify_collection(name, &options).await?;
        CollectionAction::Updated
    } else {
        info!(collection = name, "Creating collection");
        store.create_collection(name, &options).await?;
        CollectionAction::Created
    };

    info!(collection = name, "Collection setup complete with schema validation");
    Ok(action)
}

async fn create_all(store: &dyn DocumentStore) -> StorageResult<()> {
    for collection in Collection::ALL {
        apply_validator(store, collection.name(), collection.validator())
            .await
            .map_err(|e| {
                error!(collection = %collection, error = %e, "Error setting up collection");
                e
            })?;
    }
    Ok(())
}

async fn create_indexes(store: &dyn DocumentStore) -> StorageResult<usize> {
    let plan = index_plan();
    for (collection, index) in &plan {
        store.create_index(collection.name(), index).await?;
    }
    Ok(plan.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryConnector;
    use mongodb::bson::doc;

    #[test]
    fn test_index_plan() {
        let plan = index_plan();
        assert_eq!(plan.len(), 9);

        let unique: Vec<_> = plan.iter().filter(|(_, index)| index.unique).collect();
        assert_eq!(unique.len(), 1);
        assert_eq!(unique[0].0, Collection::GeneralAssistant);
        assert_eq!(unique[0].1.keys, doc! { "name": 1 });

        assert!(plan.contains(&(
            Collection::Conversations,
            IndexSpec::descending("created_at")
        )));
        for agent_type in AgentType::ALL {
            assert!(plan.contains(&(
                Collection::Agent(agent_type),
                IndexSpec::ascending("parent_id")
            )));
        }
    }

    #[tokio::test]
    async fn test_ensure_collection_creates_then_updates() {
        let connector = MemoryConnector::new();
        let provisioner = Provisioner::new(Arc::new(connector.clone()));
        let validator = Collection::GeneralAssistant.validator();

        let first = provisioner
            .ensure_collection("general_assistant", validator.clone())
            .await
            .unwrap();
        let second = provisioner
            .ensure_collection("general_assistant", validator.clone())
            .await
            .unwrap();

        assert_eq!(first, CollectionAction::Created);
        assert_eq!(second, CollectionAction::Updated);
        assert_eq!(
            connector.collection_options("general_assistant").await,
            Some(CollectionOptions::moderate(validator))
        );
        assert_eq!(connector.open_handles(), 0);
    }

    #[tokio::test]
    async fn test_provision_all_is_idempotent() {
        let connector = MemoryConnector::new();
        let provisioner = Provisioner::new(Arc::new(connector.clone()));

        provisioner.provision_all().await.unwrap();
        provisioner.provision_all().await.unwrap();

        for collection in Collection::ALL {
            assert!(connector
                .collection_options(collection.name())
                .await
                .is_some());
        }
        assert_eq!(connector.indexes("conversations").await.len(), 4);
        assert_eq!(connector.indexes("general_assistant").await.len(), 1);
        assert_eq!(connector.open_handles(), 0);
    }
}
