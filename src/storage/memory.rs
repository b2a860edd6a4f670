use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;

use async_trait::async_trait;
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{Bson, Document};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{
    CollectionOptions, Connector, DocumentStore, IndexSpec, UpdateOutcome, ValidationAction,
    ValidationLevel,
};
use crate::error::{StorageError, StorageResult};
use crate::schema;

#[derive(Debug, Default)]
struct MemoryCollection {
    options: Option<CollectionOptions>,
    indexes: Vec<IndexSpec>,
    documents: Vec<Document>,
}

impl MemoryCollection {
    /// Validator check for a write, honouring level and action.
    fn check_write(
        &self,
        collection: &str,
        document: &Document,
        previous: Option<&Document>,
    ) -> StorageResult<()> {
        let Some(options) = &self.options else {
            return Ok(());
        };
        let Ok(schema) = options.validator.get_document("$jsonSchema") else {
            return Ok(());
        };

        match (options.level, previous) {
            (ValidationLevel::Off, _) => return Ok(()),
            (ValidationLevel::Moderate, Some(previous))
                if schema::validate(previous, schema).is_err() =>
            {
                return Ok(())
            }
            _ => {}
        }

        if let Err(violation) = schema::validate(document, schema) {
            match options.action {
                ValidationAction::Error => {
                    return Err(StorageError::ValidationRejected {
                        collection: collection.to_string(),
                        reason: violation.to_string(),
                    })
                }
                ValidationAction::Warn => {
                    warn!(collection, %violation, "Document failed validation");
                }
            }
        }
        Ok(())
    }

    /// Unique-index check against every document except `skip`.
    fn check_unique(
        &self,
        collection: &str,
        document: &Document,
        skip: Option<usize>,
    ) -> StorageResult<()> {
        for index in self.indexes.iter().filter(|index| index.unique) {
            let key = index_key(&index.keys, document);
            let clash = self
                .documents
                .iter()
                .enumerate()
                .any(|(i, other)| Some(i) != skip && index_key(&index.keys, other) == key);
            if clash {
                return Err(StorageError::DuplicateKey {
                    collection: collection.to_string(),
                    message: format!("index {} dup key {:?}", index.keys, key),
                });
            }
        }
        Ok(())
    }
}

fn index_key(keys: &Document, document: &Document) -> Vec<Bson> {
    keys.keys()
        .map(|field| document.get(field).cloned().unwrap_or(Bson::Null))
        .collect()
}

fn matches(document: &Document, filter: &Document) -> bool {
    filter
        .iter()
        .all(|(field, expected)| document.get(field) == Some(expected))
}

fn compare(a: Option<&Bson>, b: Option<&Bson>) -> Ordering {
    match (a, b) {
        (Some(Bson::DateTime(a)), Some(Bson::DateTime(b))) => a.cmp(b),
        (Some(Bson::String(a)), Some(Bson::String(b))) => a.cmp(b),
        (Some(Bson::Int32(a)), Some(Bson::Int32(b))) => a.cmp(b),
        (Some(Bson::Int64(a)), Some(Bson::Int64(b))) => a.cmp(b),
        (Some(Bson::Double(a)), Some(Bson::Double(b))) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
        (Some(Bson::ObjectId(a)), Some(Bson::ObjectId(b))) => a.cmp(b),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

/// Apply `$set` / `$push` operators to a copy of `document`.
fn apply_update(document: &Document, update: &Document) -> StorageResult<Document> {
    let mut updated = document.clone();
    for (operator, fields) in update {
        let Bson::Document(fields) = fields else {
            return Err(StorageError::Query {
                message: format!("{} expects a document", operator),
            });
        };
        match operator.as_str() {
            "$set" => {
                for (field, value) in fields {
                    updated.insert(field.clone(), value.clone());
                }
            }
            "$push" => {
                for (field, value) in fields {
                    match updated.get_mut(field) {
                        Some(Bson::Array(values)) => values.push(value.clone()),
                        Some(_) => {
                            return Err(StorageError::Query {
                                message: format!("$push target {} is not an array", field),
                            })
                        }
                        None => {
                            updated.insert(field.clone(), Bson::Array(vec![value.clone()]));
                        }
                    }
                }
            }
            other => {
                return Err(StorageError::Query {
                    message: format!("Unsupported update operator: {}", other),
                })
            }
        }
    }
    Ok(updated)
}

#[derive(Debug, Default)]
struct MemoryState {
    collections: HashMap<String, MemoryCollection>,
}

/// Opens handles onto a shared in-process database.
///
/// Cloned connectors see the same collections. The connector counts open
/// handles so callers can check that every operation released its handle.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    state: Arc<Mutex<MemoryState>>,
    open_handles: Arc<AtomicUsize>,
}

impl MemoryConnector {
    /// Create a connector over an empty database.
    pub fn new() -> Self {
        Self::default()
    }

    /// Handles opened and not yet closed.
    pub fn open_handles(&self) -> usize {
        self.open_handles.load(AtomicOrdering::SeqCst)
    }

    /// Number of documents currently in `collection`.
    pub async fn count(&self, collection: &str) -> usize {
        let state = self.state.lock().await;
        state
            .collections
            .get(collection)
            .map(|c| c.documents.len())
            .unwrap_or(0)
    }

    /// Index definitions on `collection`.
    pub async fn indexes(&self, collection: &str) -> Vec<IndexSpec> {
        let state = self.state.lock().await;
        state
            .collections
            .get(collection)
            .map(|c| c.indexes.clone())
            .unwrap_or_default()
    }

    /// Validator settings on `collection`, if any.
    pub async fn collection_options(&self, collection: &str) -> Option<CollectionOptions> {
        let state = self.state.lock().await;
        state
            .collections
            .get(collection)
            .and_then(|c| c.options.clone())
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self) -> StorageResult<Box<dyn DocumentStore>> {
        self.open_handles.fetch_add(1, AtomicOrdering::SeqCst);
        debug!("Opened in-memory store handle");
        Ok(Box::new(MemoryStore {
            state: Arc::clone(&self.state),
            open_handles: Arc::clone(&self.open_handles),
        }))
    }
}

struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    open_handles: Arc<AtomicUsize>,
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn ping(&self) -> StorageResult<()> {
        Ok(())
    }

    async fn collection_exists(&self, name: &str) -> StorageResult<bool> {
        Ok(self.state.lock().await.collections.contains_key(name))
    }

    async fn create_collection(
        &self,
        name: &str,
        options: &CollectionOptions,
    ) -> StorageResult<()> {
        let mut state = self.state.lock().await;
        if state.collections.contains_key(name) {
            return Err(StorageError::Query {
                message: format!("Collection {} already exists", name),
            });
        }
        state.collections.insert(
            name.to_string(),
            MemoryCollection {
                options: Some(options.clone()),
                ..Default::default()
            },
        );
        Ok(())
    }

    async fn modify_collection(
        &self,
        name: &str,
        options: &CollectionOptions,
    ) -> StorageResult<()> {
        let mut state = self.state.lock().await;
        let collection = state
            .collections
            .get_mut(name)
            .ok_or_else(|| StorageError::Query {
                message: format!("Collection {} does not exist", name),
            })?;
        collection.options = Some(options.clone());
        Ok(())
    }

    async fn create_index(&self, collection: &str, index: &IndexSpec) -> StorageResult<()> {
        let mut state = self.state.lock().await;
        let coll = state.collections.entry(collection.to_string()).or_default();
        if coll.indexes.iter().any(|existing| existing == index) {
            return Ok(());
        }

        if index.unique {
            let mut seen = Vec::new();
            for document in &coll.documents {
                let key = index_key(&index.keys, document);
                if seen.contains(&key) {
                    return Err(StorageError::DuplicateKey {
                        collection: collection.to_string(),
                        message: format!("cannot build unique index {}", index.keys),
                    });
                }
                seen.push(key);
            }
        }

        coll.indexes.push(index.clone());
        Ok(())
    }

    async fn insert_one(
        &self,
        collection: &str,
        mut document: Document,
    ) -> StorageResult<ObjectId> {
        let id = match document.get("_id") {
            Some(Bson::ObjectId(id)) => *id,
            Some(other) => {
                return Err(StorageError::Query {
                    message: format!("Unsupported _id value: {}", other),
                })
            }
            None => {
                let id = ObjectId::new();
                document.insert("_id", id);
                id
            }
        };

        let mut state = self.state.lock().await;
        let coll = state.collections.entry(collection.to_string()).or_default();
        coll.check_write(collection, &document, None)?;
        if coll
            .documents
            .iter()
            .any(|existing| existing.get("_id") == Some(&Bson::ObjectId(id)))
        {
            return Err(StorageError::DuplicateKey {
                collection: collection.to_string(),
                message: format!("_id {}", id),
            });
        }
        coll.check_unique(collection, &document, None)?;
        coll.documents.push(document);
        Ok(id)
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: Document,
    ) -> StorageResult<Option<Document>> {
        let state = self.state.lock().await;
        Ok(state.collections.get(collection).and_then(|coll| {
            coll.documents
                .iter()
                .find(|document| matches(document, &filter))
                .cloned()
        }))
    }

    async fn find(
        &self,
        collection: &str,
        filter: Document,
        sort: Option<Document>,
    ) -> StorageResult<Vec<Document>> {
        let state = self.state.lock().await;
        let Some(coll) = state.collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut found: Vec<Document> = coll
            .documents
            .iter()
            .filter(|document| matches(document, &filter))
            .cloned()
            .collect();

        if let Some(sort) = sort {
            found.sort_by(|a, b| {
                for (field, direction) in &sort {
                    let ordering = compare(a.get(field), b.get(field));
                    let ordering = match direction.as_i32() {
                        Some(d) if d < 0 => ordering.reverse(),
                        _ => ordering,
                    };
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                Ordering::Equal
            });
        }

        Ok(found)
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> StorageResult<UpdateOutcome> {
        let mut state = self.state.lock().await;
        let Some(coll) = state.collections.get_mut(collection) else {
            return Ok(UpdateOutcome::default());
        };
        let Some(position) = coll
            .documents
            .iter()
            .position(|document| matches(document, &filter))
        else {
            return Ok(UpdateOutcome::default());
        };

        let current = &coll.documents[position];
        let updated = apply_update(current, &update)?;
        if &updated == current {
            return Ok(UpdateOutcome {
                matched_count: 1,
                modified_count: 0,
            });
        }

        coll.check_write(collection, &updated, Some(current))?;
        coll.check_unique(collection, &updated, Some(position))?;
        coll.documents[position] = updated;

        Ok(UpdateOutcome {
            matched_count: 1,
            modified_count: 1,
        })
    }

    async fn delete_one(&self, collection: &str, filter: Document) -> StorageResult<u64> {
        let mut state = self.state.lock().await;
        let Some(coll) = state.collections.get_mut(collection) else {
            return Ok(0);
        };
        match coll
            .documents
            .iter()
            .position(|document| matches(document, &filter))
        {
            Some(position) => {
                coll.documents.remove(position);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn close(&self) -> StorageResult<()> {
        self.open_handles.fetch_sub(1, AtomicOrdering::SeqCst);
        debug!("Closed in-memory store handle");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::{doc, DateTime};
    use pretty_assertions::assert_eq;

    fn validated(schema: Document) -> CollectionOptions {
        CollectionOptions::moderate(doc! { "$jsonSchema": schema })
    }

    fn name_schema() -> Document {
        doc! {
            "bsonType": "object",
            "required": ["name"],
            "properties": { "name": { "bsonType": "string" } },
        }
    }

    #[tokio::test]
    async fn test_insert_assigns_object_id() {
        let connector = MemoryConnector::new();
        let store = connector.connect().await.unwrap();

        let id = store.insert_one("things", doc! { "name": "a" }).await.unwrap();
        let found = store
            .find_one("things", doc! { "_id": id })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found, doc! { "name": "a", "_id": id });
    }

    #[tokio::test]
    async fn test_validator_rejects_missing_field() {
        let connector = MemoryConnector::new();
        let store = connector.connect().await.unwrap();
        store
            .create_collection("things", &validated(name_schema()))
            .await
            .unwrap();

        let err = store
            .insert_one("things", doc! { "label": "no name" })
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::ValidationRejected { .. }));
        assert_eq!(connector.count("things").await, 0);
    }

    #[tokio::test]
    async fn test_warn_action_accepts_invalid_document() {
        let connector = MemoryConnector::new();
        let store = connector.connect().await.unwrap();
        let mut options = validated(name_schema());
        options.action = ValidationAction::Warn;
        store.create_collection("things", &options).await.unwrap();

        store
            .insert_one("things", doc! { "label": "no name" })
            .await
            .unwrap();
        assert_eq!(connector.count("things").await, 1);
    }

    #[tokio::test]
    async fn test_moderate_level_skips_already_invalid_documents() {
        let connector = MemoryConnector::new();
        let store = connector.connect().await.unwrap();
        let legacy = store
            .insert_one("things", doc! { "label": "legacy" })
            .await
            .unwrap();
        store
            .modify_collection("things", &validated(name_schema()))
            .await
            .unwrap();

        // The insert created the collection implicitly, so collMod applies.
        assert!(connector.collection_options("things").await.is_some());

        let outcome = store
            .update_one(
                "things",
                doc! { "_id": legacy },
                doc! { "$set": { "label": "still legacy" } },
            )
            .await
            .unwrap();
        assert_eq!(outcome.modified_count, 1);

        let valid = store.insert_one("things", doc! { "name": "ok" }).await.unwrap();
        let err = store
            .update_one(
                "things",
                doc! { "_id": valid },
                doc! { "$set": { "name": 5 } },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::ValidationRejected { .. }));
    }

    #[tokio::test]
    async fn test_update_with_same_values_is_not_a_modification() {
        let connector = MemoryConnector::new();
        let store = connector.connect().await.unwrap();
        let id = store.insert_one("things", doc! { "name": "a" }).await.unwrap();

        let outcome = store
            .update_one("things", doc! { "_id": id }, doc! { "$set": { "name": "a" } })
            .await
            .unwrap();
        assert_eq!(
            outcome,
            UpdateOutcome {
                matched_count: 1,
                modified_count: 0
            }
        );

        let outcome = store
            .update_one(
                "things",
                doc! { "_id": ObjectId::new() },
                doc! { "$set": { "name": "b" } },
            )
            .await
            .unwrap();
        assert_eq!(outcome, UpdateOutcome::default());
    }

    #[tokio::test]
    async fn test_push_appends_in_order() {
        let connector = MemoryConnector::new();
        let store = connector.connect().await.unwrap();
        let id = store
            .insert_one("things", doc! { "items": ["a"] })
            .await
            .unwrap();

        store
            .update_one("things", doc! { "_id": id }, doc! { "$push": { "items": "b" } })
            .await
            .unwrap();
        let found = store
            .find_one("things", doc! { "_id": id })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            found.get_array("items").unwrap(),
            &vec![Bson::from("a"), Bson::from("b")]
        );
    }

    #[tokio::test]
    async fn test_unique_index_rejects_duplicates() {
        let connector = MemoryConnector::new();
        let store = connector.connect().await.unwrap();
        let index = IndexSpec::ascending("name").unique();
        store.create_index("things", &index).await.unwrap();
        store.create_index("things", &index).await.unwrap();
        assert_eq!(connector.indexes("things").await.len(), 1);

        store.insert_one("things", doc! { "name": "a" }).await.unwrap();
        let err = store
            .insert_one("things", doc! { "name": "a" })
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::DuplicateKey { .. }));
    }

    #[tokio::test]
    async fn test_find_sorts_descending() {
        let connector = MemoryConnector::new();
        let store = connector.connect().await.unwrap();
        for millis in [1_000, 3_000, 2_000] {
            store
                .insert_one(
                    "things",
                    doc! { "owner": "u", "created_at": DateTime::from_millis(millis) },
                )
                .await
                .unwrap();
        }
        store
            .insert_one("things", doc! { "owner": "other", "created_at": DateTime::now() })
            .await
            .unwrap();

        let found = store
            .find("things", doc! { "owner": "u" }, Some(doc! { "created_at": -1 }))
            .await
            .unwrap();
        let millis: Vec<i64> = found
            .iter()
            .map(|d| d.get_datetime("created_at").unwrap().timestamp_millis())
            .collect();
        assert_eq!(millis, vec![3_000, 2_000, 1_000]);
    }

    #[tokio::test]
    async fn test_delete_one() {
        let connector = MemoryConnector::new();
        let store = connector.connect().await.unwrap();
        let id = store.insert_one("things", doc! { "name": "a" }).await.unwrap();

        assert_eq!(store.delete_one("things", doc! { "_id": id }).await.unwrap(), 1);
        assert_eq!(store.delete_one("things", doc! { "_id": id }).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_open_handle_count() {
        let connector = MemoryConnector::new();
        let store = connector.connect().await.unwrap();
        assert_eq!(connector.open_handles(), 1);
        store.close().await.unwrap();
        assert_eq!(connector.open_handles(), 0);
    }
}
