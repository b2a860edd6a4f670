//! Integration tests for the sample data loader and validation harness

use std::sync::Arc;

use financial_agent_db::models::{AgentKind, AgentType};
use financial_agent_db::seed::{SAMPLE_ASSISTANT_NAME, SAMPLE_CASE_REFERENCE, SAMPLE_USER_ID};
use financial_agent_db::{
    Harness, MemoryConnector, Phase, Provisioner, Repositories, SeedOutcome, Seeder,
};

async fn create_test_repos() -> (MemoryConnector, Repositories) {
    let connector = MemoryConnector::new();
    Provisioner::new(Arc::new(connector.clone()))
        .provision_all()
        .await
        .expect("Failed to provision in-memory store");
    let repos = Repositories::new(Arc::new(connector.clone()));
    (connector, repos)
}

#[cfg(test)]
mod seed_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_seed_inserts_full_sample_set() {
        let (connector, repos) = create_test_repos().await;

        let report = match Seeder::new().run(&repos).await.unwrap() {
            SeedOutcome::Inserted(report) => report,
            other => panic!("Expected sample data to be inserted, got {:?}", other),
        };

        assert_eq!(report.document_count(), 7);
        assert_eq!(connector.count("general_assistant").await, 1);
        for name in ["murder_agent", "theft_agent", "fraud_agent", "accident_agent"] {
            assert_eq!(connector.count(name).await, 1, "{} should hold one agent", name);
        }
        assert_eq!(connector.count("conversations").await, 2);

        let assistant = repos
            .general_assistant
            .get_by_name(SAMPLE_ASSISTANT_NAME)
            .await
            .unwrap()
            .expect("Sample assistant should exist");
        assert_eq!(assistant.id, Some(report.assistant_id));
        assert_eq!(assistant.capabilities.len(), 5);

        for agent_type in AgentType::ALL {
            let children = repos
                .agents(agent_type)
                .get_by_parent_id(&report.assistant_id.to_hex())
                .await
                .unwrap();
            assert_eq!(children.len(), 1);
            assert_eq!(children[0].agent_type(), agent_type);
            assert_eq!(children[0].id, report.agent_id(agent_type));
        }
        assert_eq!(connector.open_handles(), 0);
    }

    #[tokio::test]
    async fn test_seed_conversations_target_assistant_and_fraud_agent() {
        let (_, repos) = create_test_repos().await;

        let SeedOutcome::Inserted(report) = Seeder::new().run(&repos).await.unwrap() else {
            panic!("Expected sample data to be inserted");
        };

        let conversations = repos
            .conversations
            .get_by_user_id(SAMPLE_USER_ID)
            .await
            .unwrap();
        assert_eq!(conversations.len(), 2);

        let general = conversations
            .iter()
            .find(|c| c.agent_type == AgentKind::General)
            .expect("General conversation");
        assert_eq!(general.agent_id, report.assistant_id);

        let fraud = conversations
            .iter()
            .find(|c| c.agent_type == AgentKind::Fraud)
            .expect("Fraud conversation");
        assert_eq!(Some(fraud.agent_id), report.agent_id(AgentType::Fraud));

        for conversation in &conversations {
            assert_eq!(
                conversation.case_reference.as_deref(),
                Some(SAMPLE_CASE_REFERENCE)
            );
            assert_eq!(conversation.messages.len(), 4);
            let metadata = conversation.metadata.as_ref().expect("metadata");
            assert_eq!(metadata.priority.as_deref(), Some("High"));
        }
    }

    #[tokio::test]
    async fn test_second_run_reports_already_present() {
        let (connector, repos) = create_test_repos().await;

        let SeedOutcome::Inserted(report) = Seeder::new().run(&repos).await.unwrap() else {
            panic!("Expected sample data to be inserted");
        };
        let second = Seeder::new().run(&repos).await.unwrap();

        assert_eq!(
            second,
            SeedOutcome::AlreadyPresent {
                assistant_id: report.assistant_id
            }
        );
        assert_eq!(connector.count("general_assistant").await, 1);
        assert_eq!(connector.count("conversations").await, 2);
    }

    #[tokio::test]
    async fn test_cleanup_removes_everything_inserted() {
        let (connector, repos) = create_test_repos().await;

        let SeedOutcome::Inserted(report) = Seeder::new()
            .with_assistant_name("Disposable Assistant")
            .run(&repos)
            .await
            .unwrap()
        else {
            panic!("Expected sample data to be inserted");
        };
        report.cleanup(&repos).await.unwrap();

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
    }

    #[test]
    fn test_seed_outcome_json() {
        let outcome = SeedOutcome::AlreadyPresent {
            assistant_id: mongodb::bson::oid::ObjectId::new(),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "already_present");
    }
}

#[cfg(test)]
mod harness_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_harness_on_empty_store() {
        let connector = MemoryConnector::new();

        let report = Harness::new(Arc::new(connector.clone())).run().await;

        assert!(report.passed(), "{:?}", report);
        let phases: Vec<Phase> = report.phases.iter().map(|p| p.phase).collect();
        assert_eq!(phases, Phase::ALL.to_vec());
        assert_eq!(connector.open_handles(), 0);
    }

    #[tokio::test]
    async fn test_harness_leaves_existing_sample_data_alone() {
        let (connector, repos) = create_test_repos().await;
        Seeder::new().run(&repos).await.unwrap();

        let report = Harness::new(Arc::new(connector.clone())).run().await;

        assert!(report.passed(), "{:?}", report);
        assert_eq!(connector.count("general_assistant").await, 1);
        assert_eq!(connector.count("fraud_agent").await, 1);
        assert_eq!(connector.count("conversations").await, 2);
    }

    #[tokio::test]
    async fn test_harness_can_run_twice() {
        let connector = MemoryConnector::new();

        let first = Harness::new(Arc::new(connector.clone())).run().await;
        let second = Harness::new(Arc::new(connector.clone())).run().await;

        assert!(first.passed());
        assert!(second.passed());
        assert_ne!(first.run_id, second.run_id);
    }
}
