//! Record access layer.
//!
//! One generic [`Repository`] serves every collection. The record type fixes
//! which collections it can be built for and which entity-specific queries
//! are available. Each call opens its own store handle and releases it before
//! returning, on success and on error.

use std::marker::PhantomData;
use std::sync::Arc;

use mongodb::bson::oid::ObjectId;
use mongodb::bson::{self, doc, Bson, DateTime, Document};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error, info};

use crate::error::{StorageError, StorageResult};
use crate::models::{
    AgentType, Conversation, ConversationMetadata, GeneralAssistant, Message, SpecializedAgent,
};
use crate::schema::Collection;
use crate::storage::{release, Connector, DocumentStore};

/// Typed create/read/update/delete access to one collection.
pub struct Repository<R> {
    connector: Arc<dyn Connector>,
    collection: Collection,
    _record: PhantomData<fn() -> R>,
}

impl<R> Clone for Repository<R> {
    fn clone(&self) -> Self {
        Self {
            connector: Arc::clone(&self.connector),
            collection: self.collection,
            _record: PhantomData,
        }
    }
}

/// Parse a hex identifier into an ObjectId.
pub fn parse_id(id: &str) -> StorageResult<ObjectId> {
    ObjectId::parse_str(id).map_err(|_| StorageError::InvalidId { id: id.to_string() })
}

impl<R> Repository<R>
where
    R: Serialize + DeserializeOwned,
{
    fn new(connector: Arc<dyn Connector>, collection: Collection) -> Self {
        Self {
            connector,
            collection,
            _record: PhantomData,
        }
    }

    /// The collection this repository reads and writes.
    pub fn collection(&self) -> Collection {
        self.collection
    }

    fn failed(&self, operation: &str, err: StorageError) -> StorageError {
        error!(collection = %self.collection, operation, error = %err, "Repository operation failed");
        err
    }

    async fn open(&self, operation: &str) -> StorageResult<Box<dyn DocumentStore>> {
        self.connector
            .connect()
            .await
            .map_err(|e| self.failed(operation, e))
    }

    async fn finish<T>(
        &self,
        operation: &str,
        store: Box<dyn DocumentStore>,
        result: StorageResult<T>,
    ) -> StorageResult<T> {
        release(store, result)
            .await
            .map_err(|e| self.failed(operation, e))
    }

    fn parse(&self, operation: &str, id: &str) -> StorageResult<ObjectId> {
        parse_id(id).map_err(|e| self.failed(operation, e))
    }

    /// Insert a record, returning its generated id.
    pub async fn create(&self, record: &R) -> StorageResult<ObjectId> {
        let document = bson::to_document(record).map_err(|e| self.failed("create", e.into()))?;
        self.create_document(document).await
    }

    /// Insert a raw document.
    ///
    /// Stamps `created_at` and `updated_at`, pins `agent_type` on
    /// specialized-agent collections and defaults a missing `messages` list
    /// on conversations. Fields the validator requires are not filled in.
    pub async fn create_document(&self, mut data: Document) -> StorageResult<ObjectId> {
        let now = DateTime::now();
        data.insert("created_at", now);
        data.insert("updated_at", now);

        if let Some(agent_type) = self.collection.agent_type() {
            data.insert("agent_type", agent_type.as_str());
        }
        if self.collection == Collection::Conversations && !data.contains_key("messages") {
            data.insert("messages", Bson::Array(Vec::new()));
        }

        let store = self.open("create").await?;
        let result = store.insert_one(self.collection.name(), data).await;
        let id = self.finish("create", store, result).await?;

        info!(collection = %self.collection, id = %id, "Created document");
        Ok(id)
    }

    /// Fetch a record by id; `None` if absent.
    pub async fn get_by_id(&self, id: &str) -> StorageResult<Option<R>> {
        let oid = self.parse("get_by_id", id)?;

        let store = self.open("get_by_id").await?;
        let result = store
            .find_one(self.collection.name(), doc! { "_id": oid })
            .await;
        let found = self.finish("get_by_id", store, result).await?;

        found
            .map(bson::from_document)
            .transpose()
            .map_err(|e| self.failed("get_by_id", e.into()))
    }

    /// Overwrite the given top-level fields and re-stamp `updated_at`.
    ///
    /// Returns whether a document was modified.
    pub async fn update(&self, id: &str, mut partial: Document) -> StorageResult<bool> {
        let oid = self.parse("update", id)?;
        partial.insert("updated_at", DateTime::now());
        self.update_with("update", oid, doc! { "$set": partial })
            .await
    }

    /// Remove a record. Returns whether anything was removed.
    pub async fn delete(&self, id: &str) -> StorageResult<bool> {
        let oid = self.parse("delete", id)?;

        let store = self.open("delete").await?;
        let result = store
            .delete_one(self.collection.name(), doc! { "_id": oid })
            .await;
        let deleted = self.finish("delete", store, result).await?;

        debug!(collection = %self.collection, id, deleted, "Delete finished");
        Ok(deleted > 0)
    }

    async fn update_with(
        &self,
        operation: &str,
        oid: ObjectId,
        update: Document,
    ) -> StorageResult<bool> {
        let store = self.open(operation).await?;
        let result = store
            .update_one(self.collection.name(), doc! { "_id": oid }, update)
            .await;
        let outcome = self.finish(operation, store, result).await?;

        debug!(
            collection = %self.collection,
            id = %oid,
            matched = outcome.matched_count,
            modified = outcome.modified_count,
            "{} finished",
            operation
        );
        Ok(outcome.modified_count > 0)
    }

    async fn find_many(
        &self,
        operation: &str,
        filter: Document,
        sort: Option<Document>,
    ) -> StorageResult<Vec<R>> {
        let store = self.open(operation).await?;
        let result = store.find(self.collection.name(), filter, sort).await;
        let documents = self.finish(operation, store, result).await?;

        documents
            .into_iter()
            .map(bson::from_document)
            .collect::<Result<Vec<R>, _>>()
            .map_err(|e| self.failed(operation, e.into()))
    }
}

impl Repository<GeneralAssistant> {
    /// Repository over `general_assistant`.
    pub fn general_assistant(connector: Arc<dyn Connector>) -> Self {
        Self::new(connector, Collection::GeneralAssistant)
    }

    /// Look up an assistant by its unique name.
    pub async fn get_by_name(&self, name: &str) -> StorageResult<Option<GeneralAssistant>> {
        let store = self.open("get_by_name").await?;
        let result = store
            .find_one(self.collection.name(), doc! { "name": name })
            .await;
        let found = self.finish("get_by_name", store, result).await?;

        found
            .map(bson::from_document)
            .transpose()
            .map_err(|e| self.failed("get_by_name", e.into()))
    }
}

impl Repository<SpecializedAgent> {
    /// Repository over the collection for `agent_type`.
    pub fn agents(connector: Arc<dyn Connector>, agent_type: AgentType) -> Self {
        Self::new(connector, Collection::Agent(agent_type))
    }

    /// Agents whose stored `parent_id` equals `parent_id`, in no particular order.
    pub async fn get_by_parent_id(&self, parent_id: &str) -> StorageResult<Vec<SpecializedAgent>> {
        let parent = self.parse("get_by_parent_id", parent_id)?;
        self.find_many("get_by_parent_id", doc! { "parent_id": parent }, None)
            .await
    }
}

impl Repository<Conversation> {
    /// Repository over `conversations`.
    pub fn conversations(connector: Arc<dyn Connector>) -> Self {
        Self::new(connector, Collection::Conversations)
    }

    /// A user's conversations, newest first.
    pub async fn get_by_user_id(&self, user_id: &str) -> StorageResult<Vec<Conversation>> {
        self.find_many(
            "get_by_user_id",
            doc! { "user_id": user_id },
            Some(doc! { "created_at": -1 }),
        )
        .await
    }

    /// Append a message and re-stamp `updated_at`.
    ///
    /// A message without a timestamp is stamped with the current time.
    pub async fn add_message(&self, id: &str, mut message: Message) -> StorageResult<bool> {
        let oid = self.parse("add_message", id)?;
        if message.timestamp.is_none() {
            message.timestamp = Some(DateTime::now());
        }
        let message =
            bson::to_bson(&message).map_err(|e| self.failed("add_message", e.into()))?;

        self.update_with(
            "add_message",
            oid,
            doc! {
                "$push": { "messages": message },
                "$set": { "updated_at": DateTime::now() },
            },
        )
        .await
    }

    /// Replace the metadata object wholesale and re-stamp `updated_at`.
    pub async fn update_metadata(
        &self,
        id: &str,
        metadata: &ConversationMetadata,
    ) -> StorageResult<bool> {
        let oid = self.parse("update_metadata", id)?;
        let metadata =
            bson::to_bson(metadata).map_err(|e| self.failed("update_metadata", e.into()))?;

        self.update_with(
            "update_metadata",
            oid,
            doc! {
                "$set": {
                    "metadata": metadata,
                    "updated_at": DateTime::now(),
                },
            },
        )
        .await
    }
}

/// Repositories for every managed collection, sharing one connector.
#[derive(Clone)]
pub struct Repositories {
    /// `general_assistant`
    pub general_assistant: Repository<GeneralAssistant>,
    /// `murder_agent`
    pub murder: Repository<SpecializedAgent>,
    /// `theft_agent`
    pub theft: Repository<SpecializedAgent>,
    /// `fraud_agent`
    pub fraud: Repository<SpecializedAgent>,
    /// `accident_agent`
    pub accident: Repository<SpecializedAgent>,
    /// `conversations`
    pub conversations: Repository<Conversation>,
}

impl Repositories {
    /// Build every repository over `connector`.
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            general_assistant: Repository::general_assistant(Arc::clone(&connector)),
            murder: Repository::agents(Arc::clone(&connector), AgentType::Murder),
            theft: Repository::agents(Arc::clone(&connector), AgentType::Theft),
            fraud: Repository::agents(Arc::clone(&connector), AgentType::Fraud),
            accident: Repository::agents(Arc::clone(&connector), AgentType::Accident),
            conversations: Repository::conversations(connector),
        }
    }

    /// Repository for a specialized agent type.
    pub fn agents(&self, agent_type: AgentType) -> &Repository<SpecializedAgent> {
        match agent_type {
            AgentType::Murder => &self.murder,
            AgentType::Theft => &self.theft,
            AgentType::Fraud => &self.fraud,
            AgentType::Accident => &self.accident,
        }
    }
}
