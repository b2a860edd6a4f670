//! Sample data loader.
//!
//! Inserts one general assistant, one agent of every specialized type under
//! it, and two conversations: one with the assistant itself and one with the
//! fraud agent. The assistant name is unique, so a second run finds the
//! existing assistant and leaves the store untouched.

use chrono::{Duration, TimeZone, Utc};
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{doc, DateTime};
use serde::Serialize;
use tracing::{error, info};

use crate::error::{StorageError, StorageResult};
use crate::models::{
    AccidentType, AgentKind, AgentType, CaseTemplate, Conversation, ConversationMetadata,
    FraudType, GeneralAssistant, InvestigationProtocol, KnowledgeBase, KnowledgeSource, Message,
    Reference, Sender, SpecializedAgent, Specialty, TheftCategory,
};
use crate::repository::Repositories;

/// Name of the sample general assistant.
pub const SAMPLE_ASSISTANT_NAME: &str = "Financial Investigation Assistant";

/// Officer the sample conversations belong to.
pub const SAMPLE_USER_ID: &str = "police_officer_123";

/// Case the sample conversations discuss.
pub const SAMPLE_CASE_REFERENCE: &str = "CASE-2025-0542";

/// A specialized agent inserted by the loader.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeededAgent {
    /// Agent collection.
    pub agent_type: AgentType,
    /// Inserted id.
    pub id: ObjectId,
}

/// Ids of everything one loader run inserted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeedReport {
    /// The general assistant.
    pub assistant_id: ObjectId,
    /// One agent per specialized type, in `AgentType::ALL` order.
    pub agents: Vec<SeededAgent>,
    /// The two conversations, general first.
    pub conversation_ids: Vec<ObjectId>,
}

impl SeedReport {
    /// Id of the inserted agent of `agent_type`.
    pub fn agent_id(&self, agent_type: AgentType) -> Option<ObjectId> {
        self.agents
            .iter()
            .find(|agent| agent.agent_type == agent_type)
            .map(|agent| agent.id)
    }

    /// Total number of inserted documents.
    pub fn document_count(&self) -> usize {
        1 + self.agents.len() + self.conversation_ids.len()
    }

    /// Delete every document this run inserted, conversations first.
    pub async fn cleanup(&self, repos: &Repositories) -> StorageResult<()> {
        for id in &self.conversation_ids {
            repos.conversations.delete(&id.to_hex()).await?;
        }
        for agent in &self.agents {
            repos.agents(agent.agent_type).delete(&agent.id.to_hex()).await?;
        }
        repos
            .general_assistant
            .delete(&self.assistant_id.to_hex())
            .await?;
        Ok(())
    }
}

/// Result of a loader run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SeedOutcome {
    /// Sample documents were inserted.
    Inserted(SeedReport),
    /// An assistant with the sample name already existed; nothing was inserted.
    AlreadyPresent {
        /// Id of the existing assistant.
        assistant_id: ObjectId,
    },
}

/// Inserts the sample documents.
#[derive(Debug, Clone)]
pub struct Seeder {
    assistant_name: String,
}

impl Default for Seeder {
    fn default() -> Self {
        Self::new()
    }
}

impl Seeder {
    /// Loader for the standard sample assistant.
    pub fn new() -> Self {
        Self {
            assistant_name: SAMPLE_ASSISTANT_NAME.to_string(),
        }
    }

    /// Use a different assistant name.
    pub fn with_assistant_name(mut self, name: impl Into<String>) -> Self {
        self.assistant_name = name.into();
        self
    }

    /// Name of the assistant this loader inserts.
    pub fn assistant_name(&self) -> &str {
        &self.assistant_name
    }

    /// Insert the sample documents unless the assistant already exists.
    pub async fn run(&self, repos: &Repositories) -> StorageResult<SeedOutcome> {
        info!(assistant = %self.assistant_name, "Starting sample data insertion...");

        if let Some(existing) = repos
            .general_assistant
            .get_by_name(&self.assistant_name)
            .await?
        {
            let assistant_id = existing.id.ok_or_else(|| StorageError::Query {
                message: format!("Assistant '{}' has no _id", self.assistant_name),
            })?;
            info!(id = %assistant_id, "Sample assistant already present, skipping insertion");
            return Ok(SeedOutcome::AlreadyPresent { assistant_id });
        }

        match self.insert_all(repos).await {
            Ok(report) => {
                info!(
                    documents = report.document_count(),
                    "All sample data inserted successfully"
                );
                Ok(SeedOutcome::Inserted(report))
            }
            Err(e) => {
                error!(error = %e, "Error inserting sample data");
                Err(e)
            }
        }
    }

    async fn insert_all(&self, repos: &Repositories) -> StorageResult<SeedReport> {
        let assistant_id = repos
            .general_assistant
            .create(&sample_assistant(&self.assistant_name))
            .await?;
        info!(id = %assistant_id, "Sample General Assistant created");

        let mut agents = Vec::with_capacity(AgentType::ALL.len());
        for agent_type in AgentType::ALL {
            let id = repos
                .agents(agent_type)
                .create(&sample_agent(agent_type, assistant_id))
                .await?;
            info!(agent_type = %agent_type, id = %id, "Sample agent created");
            agents.push(SeededAgent { agent_type, id });
        }

        let fraud_id = agents
            .iter()
            .find(|agent| agent.agent_type == AgentType::Fraud)
            .map(|agent| agent.id)
            .ok_or_else(|| StorageError::Query {
                message: "Fraud agent was not inserted".to_string(),
            })?;

        let mut conversation_ids = Vec::with_capacity(2);
        for (agent_id, kind) in [
            (assistant_id, AgentKind::General),
            (fraud_id, AgentKind::Fraud),
        ] {
            let id = repos
                .conversations
                .create(&sample_conversation(agent_id, kind.clone()))
                .await?;
            info!(id = %id, agent_type = ?kind, "Sample Conversation created");
            conversation_ids.push(id);
        }

        Ok(SeedReport {
            assistant_id,
            agents,
            conversation_ids,
        })
    }
}

/// Midnight UTC on the given day.
fn published(year: i32, month: u32, day: u32) -> DateTime {
    let date = Utc
        .with_ymd_and_hms(year, month, day, 0, 0, 0)
        .single()
        .unwrap_or_default();
    DateTime::from_millis(date.timestamp_millis())
}

fn minutes_ago(minutes: i64) -> DateTime {
    DateTime::from_millis((Utc::now() - Duration::minutes(minutes)).timestamp_millis())
}

fn source(name: &str, content: &str, version: &str, updated: DateTime) -> KnowledgeSource {
    KnowledgeSource::document(name, content)
        .with_metadata(doc! { "version": version, "last_updated": updated })
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn template(name: &str, questions: &[&str], guidelines: &str) -> CaseTemplate {
    CaseTemplate {
        template_name: name.to_string(),
        questions: strings(questions),
        response_guidelines: guidelines.to_string(),
    }
}

/// The sample general assistant.
pub fn sample_assistant(name: &str) -> GeneralAssistant {
    GeneralAssistant::new(
        name,
        "A general assistant for financial investigations that can handle various case types",
    )
    .with_capabilities([
        "Case analysis",
        "Financial data interpretation",
        "Investigation guidance",
        "Legal reference",
        "Report generation",
    ])
    .with_knowledge_base(KnowledgeBase::new(vec![source(
        "Financial Investigation Guidelines",
        "General guidelines for conducting financial investigations",
        "1.0",
        published(2025, 1, 15),
    )]))
}

/// The sample agent of `agent_type`, parented to `parent_id`.
pub fn sample_agent(agent_type: AgentType, parent_id: ObjectId) -> SpecializedAgent {
    match agent_type {
        AgentType::Murder => SpecializedAgent::new(
            Specialty::Murder {
                investigation_protocols: vec![InvestigationProtocol {
                    protocol_name: "Financial Motive Analysis".to_string(),
                    steps: strings(&[
                        "Identify financial relationships",
                        "Analyze recent financial transactions",
                        "Evaluate insurance policies and beneficiaries",
                        "Check for debt relationships",
                    ]),
                    legal_references: strings(&[
                        "Criminal Code Section 302.1",
                        "Financial Investigation Act Section 45",
                    ]),
                }],
            },
            "Murder Investigation Agent",
            "Specialized agent for murder investigations with financial implications",
            parent_id,
        )
        .with_knowledge_base(KnowledgeBase::new(vec![source(
            "Murder Investigation Protocol",
            "Detailed protocol for investigating murders with financial motives",
            "2.1",
            published(2025, 2, 10),
        )]))
        .with_case_templates(vec![template(
            "Insurance Fraud Murder",
            &[
                "Was the victim recently insured?",
                "Who are the beneficiaries?",
                "Were there any policy changes before death?",
            ],
            "Focus on timeline of policy changes and relationship between beneficiaries and suspects.",
        )]),

        AgentType::Theft => SpecializedAgent::new(
            Specialty::Theft {
                theft_categories: vec![
                    TheftCategory {
                        category_name: "Corporate Embezzlement".to_string(),
                        investigation_approach:
                            "Focus on accounting discrepancies and access privileges".to_string(),
                        evidence_guidelines: "Secure digital records and transaction logs"
                            .to_string(),
                    },
                    TheftCategory {
                        category_name: "Identity Theft".to_string(),
                        investigation_approach:
                            "Track digital footprint and financial account access".to_string(),
                        evidence_guidelines:
                            "Document unauthorized transactions and access attempts".to_string(),
                    },
                ],
            },
            "Theft Investigation Agent",
            "Specialized agent for theft investigations",
            parent_id,
        )
        .with_knowledge_base(KnowledgeBase::new(vec![source(
            "Theft Investigation Guidelines",
            "Guidelines for investigating various types of theft",
            "1.5",
            published(2025, 1, 20),
        )]))
        .with_case_templates(vec![template(
            "Employee Theft",
            &[
                "What access did the suspect have to assets?",
                "Were there any security measures bypassed?",
                "Is there a pattern to the missing assets?",
            ],
            "Analyze access logs and compare with employee schedules.",
        )]),

        AgentType::Fraud => SpecializedAgent::new(
            Specialty::Fraud {
                fraud_types: vec![
                    FraudType {
                        fraud_type: "Investment Fraud".to_string(),
                        detection_methods: strings(&[
                            "Analyze return on investment claims",
                            "Verify registration with regulatory bodies",
                            "Check for pressure tactics in marketing",
                        ]),
                        financial_indicators: strings(&[
                            "Unrealistic returns",
                            "Lack of transparency in operations",
                            "Difficulty withdrawing funds",
                        ]),
                    },
                    FraudType {
                        fraud_type: "Insurance Fraud".to_string(),
                        detection_methods: strings(&[
                            "Identify patterns in claims",
                            "Verify documentation authenticity",
                            "Cross-reference with other claims",
                        ]),
                        financial_indicators: strings(&[
                            "Multiple similar claims",
                            "Claims shortly after policy initiation",
                            "Inflated value claims",
                        ]),
                    },
                ],
            },
            "Fraud Investigation Agent",
            "Specialized agent for fraud investigations",
            parent_id,
        )
        .with_knowledge_base(KnowledgeBase::new(vec![source(
            "Financial Fraud Detection Manual",
            "Comprehensive guide to detecting various types of financial fraud",
            "3.0",
            published(2025, 3, 5),
        )]))
        .with_case_templates(vec![template(
            "Ponzi Scheme",
            &[
                "How were returns generated for early investors?",
                "What was the source of funds for payouts?",
                "Were financial statements audited by reputable firms?",
            ],
            "Focus on cash flow analysis and verification of claimed investments.",
        )]),

        AgentType::Accident => SpecializedAgent::new(
            Specialty::Accident {
                accident_types: vec![
                    AccidentType {
                        accident_type: "Workplace Accident".to_string(),
                        investigation_procedures: strings(&[
                            "Assess workplace safety compliance",
                            "Review insurance coverage and claims history",
                            "Evaluate financial pressure on business operations",
                        ]),
                        evidence_collection: "Secure workplace safety records, insurance documentation, and financial statements.".to_string(),
                    },
                    AccidentType {
                        accident_type: "Vehicle Accident".to_string(),
                        investigation_procedures: strings(&[
                            "Review insurance policy details",
                            "Check for recent policy changes",
                            "Assess financial status of involved parties",
                        ]),
                        evidence_collection: "Obtain insurance policies, financial records, and vehicle maintenance history.".to_string(),
                    },
                ],
            },
            "Accident Investigation Agent",
            "Specialized agent for accident investigations with financial implications",
            parent_id,
        )
        .with_knowledge_base(KnowledgeBase::new(vec![source(
            "Financial Aspects of Accident Investigation",
            "Guide to investigating financial motives and implications in accidents",
            "1.2",
            published(2025, 2, 25),
        )]))
        .with_case_templates(vec![template(
            "Insurance Claim Accident",
            &[
                "Were there any recent insurance policy changes?",
                "Is there a history of similar claims?",
                "What is the financial status of the claimant?",
            ],
            "Analyze timing of policy changes relative to accident and financial need of claimant.",
        )]),
    }
}

fn reference(source: &str, content: &str, relevance_score: f64) -> Reference {
    Reference {
        source: source.to_string(),
        content: content.to_string(),
        relevance_score,
    }
}

/// The sample embezzlement conversation, attached to `agent_id`.
pub fn sample_conversation(agent_id: ObjectId, kind: AgentKind) -> Conversation {
    let messages = vec![
        Message::new(
            Sender::User,
            "I'm investigating a potential fraud case involving corporate embezzlement.",
        )
        .at(minutes_ago(60)),
        Message::new(
            Sender::Agent,
            "I'll help you with this investigation. What financial records have you reviewed so far?",
        )
        .at(minutes_ago(59))
        .with_references(vec![reference(
            "Financial Fraud Detection Manual",
            "Corporate embezzlement investigations should begin with a review of accounting records and access logs.",
            0.92,
        )]),
        Message::new(
            Sender::User,
            "I've looked at the company's bank statements and found some unusual transfers.",
        )
        .at(minutes_ago(58)),
        Message::new(
            Sender::Agent,
            "That's a good start. You should also examine the authorization protocols for these transfers and identify who had access rights. Consider reviewing the timing of these transfers in relation to any changes in authorization procedures.",
        )
        .at(minutes_ago(57))
        .with_references(vec![
            reference(
                "Financial Fraud Detection Manual",
                "Unusual transfers should be analyzed for timing patterns and authorization anomalies.",
                0.89,
            ),
            reference(
                "Corporate Fraud Investigation Protocol",
                "Changes in authorization procedures often precede fraudulent activities.",
                0.78,
            ),
        ]),
    ];

    Conversation::new(SAMPLE_USER_ID, agent_id, kind)
        .with_case_reference(SAMPLE_CASE_REFERENCE)
        .with_messages(messages)
        .with_metadata(ConversationMetadata {
            case_type: Some("Corporate Fraud".to_string()),
            priority: Some("High".to_string()),
            tags: strings(&["embezzlement", "financial", "corporate"]),
        })
}
