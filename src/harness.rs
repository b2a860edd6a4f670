//! End-to-end smoke test of a provisioned database.
//!
//! Phases run in order and stop at the first failure: connection, collection
//! provisioning, index provisioning, a CRUD round trip, then sample-data
//! insertion. Every document the harness writes carries a run-unique name
//! and is deleted before the phase returns.

use std::fmt;
use std::sync::Arc;

use mongodb::bson::doc;
use mongodb::bson::oid::ObjectId;
use serde::Serialize;
use tracing::{error, info};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{AgentKind, Conversation, GeneralAssistant, Message, Sender};
use crate::provision::Provisioner;
use crate::repository::Repositories;
use crate::seed::{SeedOutcome, Seeder, SAMPLE_ASSISTANT_NAME};
use crate::storage::{release, Connector};

/// A harness phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Open a handle and ping the server.
    Connection,
    /// Create or update every collection validator.
    Collections,
    /// Build every index.
    Indexes,
    /// Create, read, update and delete an assistant and a conversation.
    Crud,
    /// Insert and remove the sample documents.
    SampleData,
}

impl Phase {
    /// Every phase, in execution order.
    pub const ALL: [Phase; 5] = [
        Phase::Connection,
        Phase::Collections,
        Phase::Indexes,
        Phase::Crud,
        Phase::SampleData,
    ];

    /// Human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            Phase::Connection => "Database connection",
            Phase::Collections => "Collection creation",
            Phase::Indexes => "Index creation",
            Phase::Crud => "CRUD operations",
            Phase::SampleData => "Sample data insertion",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Outcome of one phase.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseResult {
    /// Which phase ran.
    pub phase: Phase,
    /// Whether it passed.
    pub passed: bool,
    /// Failure description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Phases that ran, in order. Phases after a failure are absent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    /// Identifier embedded in every name the run wrote.
    pub run_id: String,
    /// Phase outcomes.
    pub phases: Vec<PhaseResult>,
}

impl ValidationReport {
    /// Whether every phase ran and passed.
    pub fn passed(&self) -> bool {
        self.phases.len() == Phase::ALL.len() && self.phases.iter().all(|p| p.passed)
    }

    /// The phase that stopped the run, if any.
    pub fn failed_phase(&self) -> Option<&PhaseResult> {
        self.phases.iter().find(|p| !p.passed)
    }
}

/// Runs the smoke test.
#[derive(Clone)]
pub struct Harness {
    connector: Arc<dyn Connector>,
    repos: Repositories,
    run_id: String,
}

impl Harness {
    /// Harness over `connector` with a fresh run id.
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        let run_id = Uuid::new_v4().simple().to_string();
        Self {
            repos: Repositories::new(Arc::clone(&connector)),
            connector,
            run_id,
        }
    }

    /// This run's identifier.
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Run every phase, stopping at the first failure.
    pub async fn run(&self) -> ValidationReport {
        info!(run_id = %self.run_id, "Starting validation tests...");
        let mut phases = Vec::with_capacity(Phase::ALL.len());

        for phase in Phase::ALL {
            match self.run_phase(phase).await {
                Ok(()) => {
                    info!(phase = %phase, "Phase passed");
                    phases.push(PhaseResult {
                        phase,
                        passed: true,
                        error: None,
                    });
                }
                Err(e) => {
                    error!(phase = %phase, error = %e, "Validation failed");
                    phases.push(PhaseResult {
                        phase,
                        passed: false,
                        error: Some(e.to_string()),
                    });
                    break;
                }
            }
        }

        let report = ValidationReport {
            run_id: self.run_id.clone(),
            phases,
        };
        if report.passed() {
            info!("All validation tests passed successfully");
        }
        report
    }

    /// Run a single phase.
    pub async fn run_phase(&self, phase: Phase) -> AppResult<()> {
        match phase {
            Phase::Connection => self.check_connection().await,
            Phase::Collections => Ok(self.provisioner().create_collections().await?),
            Phase::Indexes => {
                self.provisioner().ensure_indexes().await?;
                Ok(())
            }
            Phase::Crud => {
                self.check_assistant_crud().await?;
                self.check_conversation_crud().await
            }
            Phase::SampleData => self.check_sample_data().await,
        }
    }

    fn provisioner(&self) -> Provisioner {
        Provisioner::new(Arc::clone(&self.connector))
    }

    fn unique(&self, prefix: &str) -> String {
        format!("{} {}", prefix, self.run_id)
    }

    async fn check_connection(&self) -> AppResult<()> {
        let store = self.connector.connect().await?;
        let result = store.ping().await;
        release(store, result).await?;
        Ok(())
    }

    async fn check_assistant_crud(&self) -> AppResult<()> {
        info!("Testing General Assistant CRUD operations...");
        let repo = &self.repos.general_assistant;
        let name = self.unique("Smoke Test Assistant");

        let assistant =
            GeneralAssistant::new(&name, "A test general assistant").with_capabilities(["Testing"]);
        let id = repo.create(&assistant).await?.to_hex();

        // The assistant is deleted whether or not the checks pass.
        let checked = self.exercise_assistant(&id, &name).await;
        let deleted = repo.delete(&id).await;
        checked?;
        ensure(deleted?, "assistant delete removed nothing")?;
        ensure(
            repo.get_by_id(&id).await?.is_none(),
            "assistant still present after delete",
        )?;

        info!("General Assistant CRUD operations successful");
        Ok(())
    }

    async fn exercise_assistant(&self, id: &str, name: &str) -> AppResult<()> {
        let repo = &self.repos.general_assistant;

        let fetched = repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| smoke_failure(format!("assistant {} not found after create", id)))?;
        ensure(fetched.name == name, "fetched assistant has the wrong name")?;
        ensure(
            fetched.created_at == fetched.updated_at,
            "new assistant has created_at != updated_at",
        )?;

        let updated = repo
            .update(id, doc! { "description": "Updated test description" })
            .await?;
        ensure(updated, "assistant update modified nothing")?;

        let fetched = repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| smoke_failure(format!("assistant {} not found after update", id)))?;
        ensure(
            fetched.description == "Updated test description",
            "assistant update was not persisted",
        )
    }

    async fn check_conversation_crud(&self) -> AppResult<()> {
        info!("Testing Conversation CRUD operations...");
        let repo = &self.repos.conversations;
        let user_id = format!("smoke_test_user_{}", self.run_id);

        let conversation = Conversation::new(&user_id, ObjectId::new(), AgentKind::General);
        let id = repo.create(&conversation).await?.to_hex();

        let checked = self.exercise_conversation(&id).await;
        let deleted = repo.delete(&id).await;
        checked?;
        ensure(deleted?, "conversation delete removed nothing")?;

        info!("Conversation CRUD operations successful");
        Ok(())
    }

    async fn exercise_conversation(&self, id: &str) -> AppResult<()> {
        let repo = &self.repos.conversations;

        let appended = repo
            .add_message(id, Message::new(Sender::User, "Test message"))
            .await?;
        ensure(appended, "add_message modified nothing")?;

        let fetched = repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| smoke_failure(format!("conversation {} not found", id)))?;
        ensure(
            fetched.messages.len() == 1,
            "conversation does not hold exactly one message",
        )?;
        ensure(
            fetched.messages[0].timestamp.is_some(),
            "appended message has no timestamp",
        )
    }

    async fn check_sample_data(&self) -> AppResult<()> {
        let seeder = Seeder::new().with_assistant_name(self.unique(SAMPLE_ASSISTANT_NAME));

        let report = match seeder.run(&self.repos).await? {
            SeedOutcome::Inserted(report) => report,
            SeedOutcome::AlreadyPresent { assistant_id } => {
                return Err(smoke_failure(format!(
                    "run-unique assistant already present as {}",
                    assistant_id
                )))
            }
        };

        let checked = match self
            .repos
            .fraud
            .get_by_parent_id(&report.assistant_id.to_hex())
            .await
        {
            Ok(children) => ensure(
                children.len() == 1,
                "sample fraud agent not found under its parent",
            ),
            Err(e) => Err(e.into()),
        };

        let cleaned = report.cleanup(&self.repos).await;
        checked?;
        Ok(cleaned?)
    }
}

fn smoke_failure(message: impl Into<String>) -> AppError {
    AppError::SmokeTest {
        message: message.into(),
    }
}

fn ensure(condition: bool, message: &str) -> AppResult<()> {
    if condition {
        Ok(())
    } else {
        Err(smoke_failure(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{StorageError, StorageResult};
    use crate::storage::{
        CollectionOptions, DocumentStore, IndexSpec, MemoryConnector, UpdateOutcome,
    };
    use async_trait::async_trait;
    use mongodb::bson::Document;

    /// Which store call to break.
    #[derive(Clone, Copy)]
    enum Broken {
        Update,
        Find,
    }

    /// In-memory connector whose handles fail one kind of call.
    struct BrokenConnector {
        inner: MemoryConnector,
        broken: Broken,
    }

    struct BrokenStore {
        inner: Box<dyn DocumentStore>,
        broken: Broken,
    }

    fn broken<T>(operation: &str) -> StorageResult<T> {
        Err(StorageError::Query {
            message: format!("{} unavailable", operation),
        })
    }

    #[async_trait]
    impl Connector for BrokenConnector {
        async fn connect(&self) -> StorageResult<Box<dyn DocumentStore>> {
            Ok(Box::new(BrokenStore {
                inner: self.inner.connect().await?,
                broken: self.broken,
            }))
        }
    }

    #[async_trait]
    impl DocumentStore for BrokenStore {
        async fn ping(&self) -> StorageResult<()> {
            self.inner.ping().await
        }

        async fn collection_exists(&self, name: &str) -> StorageResult<bool> {
            self.inner.collection_exists(name).await
        }

        async fn create_collection(
            &self,
            name: &str,
            options: &CollectionOptions,
        ) -> StorageResult<()> {
            self.inner.create_collection(name, options).await
        }

        async fn modify_collection(
            &self,
            name: &str,
            options: &CollectionOptions,
        ) -> StorageResult<()> {
            self.inner.modify_collection(name, options).await
        }

        async fn create_index(&self, collection: &str, index: &IndexSpec) -> StorageResult<()> {
            self.inner.create_index(collection, index).await
        }

        async fn insert_one(
            &self,
            collection: &str,
            document: Document,
        ) -> StorageResult<ObjectId> {
            self.inner.insert_one(collection, document).await
        }

        async fn find_one(
            &self,
            collection: &str,
            filter: Document,
        ) -> StorageResult<Option<Document>> {
            self.inner.find_one(collection, filter).await
        }

        async fn find(
            &self,
            collection: &str,
            filter: Document,
            sort: Option<Document>,
        ) -> StorageResult<Vec<Document>> {
            match self.broken {
                Broken::Find => broken("find"),
                Broken::Update => self.inner.find(collection, filter, sort).await,
            }
        }

        async fn update_one(
            &self,
            collection: &str,
            filter: Document,
            update: Document,
        ) -> StorageResult<UpdateOutcome> {
            match self.broken {
                Broken::Update => broken("update"),
                Broken::Find => self.inner.update_one(collection, filter, update).await,
            }
        }

        async fn delete_one(&self, collection: &str, filter: Document) -> StorageResult<u64> {
            self.inner.delete_one(collection, filter).await
        }

        async fn close(&self) -> StorageResult<()> {
            self.inner.close().await
        }
    }

    async fn assert_nothing_left(connector: &MemoryConnector) {
        for name in [
            "general_assistant",
            "murder_agent",
            "theft_agent",
            "fraud_agent",
            "accident_agent",
            "conversations",
        ] {
            assert_eq!(connector.count(name).await, 0, "{} should be empty", name);
        }
        assert_eq!(connector.open_handles(), 0);
    }

    #[test]
    fn test_report_passed_requires_every_phase() {
        let partial = ValidationReport {
            run_id: "r".to_string(),
            phases: vec![PhaseResult {
                phase: Phase::Connection,
                passed: true,
                error: None,
            }],
        };
        assert!(!partial.passed());
        assert!(partial.failed_phase().is_none());
    }

    #[test]
    fn test_report_serializes_phase_names() {
        let report = ValidationReport {
            run_id: "abc".to_string(),
            phases: vec![PhaseResult {
                phase: Phase::SampleData,
                passed: false,
                error: Some("boom".to_string()),
            }],
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["phases"][0]["phase"], "sample_data");
        assert_eq!(json["phases"][0]["error"], "boom");
    }

    #[tokio::test]
    async fn test_harness_passes_and_cleans_up() {
        let connector = MemoryConnector::new();
        let harness = Harness::new(Arc::new(connector.clone()));

        let report = harness.run().await;
        assert!(report.passed(), "{:?}", report);
        assert_eq!(report.run_id, harness.run_id());

        assert_eq!(connector.count("general_assistant").await, 0);
        assert_eq!(connector.count("fraud_agent").await, 0);
        assert_eq!(connector.count("conversations").await, 0);
        assert_eq!(connector.open_handles(), 0);
    }

    #[tokio::test]
    async fn test_failed_crud_check_still_deletes() {
        let connector = MemoryConnector::new();
        let harness = Harness::new(Arc::new(BrokenConnector {
            inner: connector.clone(),
            broken: Broken::Update,
        }));

        let report = harness.run().await;
        let failed = report.failed_phase().expect("CRUD phase should fail");
        assert_eq!(failed.phase, Phase::Crud);
        assert!(failed.error.as_deref().unwrap_or_default().contains("update unavailable"));

        assert_nothing_left(&connector).await;
    }

    #[tokio::test]
    async fn test_failed_sample_data_check_still_cleans_up() {
        let connector = MemoryConnector::new();
        let harness = Harness::new(Arc::new(BrokenConnector {
            inner: connector.clone(),
            broken: Broken::Find,
        }));

        let report = harness.run().await;
        let failed = report.failed_phase().expect("sample data phase should fail");
        assert_eq!(failed.phase, Phase::SampleData);
        assert!(failed.error.as_deref().unwrap_or_default().contains("find unavailable"));

        assert_nothing_left(&connector).await;
    }
}
