//! Record types stored in the agent collections.
//!
//! Every record carries an optional `_id` (assigned by the store on insert)
//! and `created_at` / `updated_at` timestamps that the repository re-stamps on
//! every write. Optional fields are skipped when absent so that validators
//! never see `null` where they expect a typed value.

use mongodb::bson::oid::ObjectId;
use mongodb::bson::{DateTime, Document};
use serde::{Deserialize, Serialize};

/// Kind of specialized investigation agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentType {
    /// Murder investigations with financial motives.
    Murder,
    /// Theft, embezzlement and identity theft.
    Theft,
    /// Investment, insurance and corporate fraud.
    Fraud,
    /// Accidents with financial implications.
    Accident,
}

impl AgentType {
    /// All specialized agent types, in collection order.
    pub const ALL: [AgentType; 4] = [
        AgentType::Murder,
        AgentType::Theft,
        AgentType::Fraud,
        AgentType::Accident,
    ];

    /// Discriminator value stored in `agent_type`.
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentType::Murder => "Murder",
            AgentType::Theft => "Theft",
            AgentType::Fraud => "Fraud",
            AgentType::Accident => "Accident",
        }
    }
}

impl std::fmt::Display for AgentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AgentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "murder" => Ok(AgentType::Murder),
            "theft" => Ok(AgentType::Theft),
            "fraud" => Ok(AgentType::Fraud),
            "accident" => Ok(AgentType::Accident),
            _ => Err(format!("Unknown agent type: {}", s)),
        }
    }
}

/// Agent kind a conversation is attached to.
///
/// The conversations validator only requires a string here, so kinds this
/// crate does not model are kept verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentKind {
    /// The general assistant.
    General,
    /// Murder agent.
    Murder,
    /// Theft agent.
    Theft,
    /// Fraud agent.
    Fraud,
    /// Accident agent.
    Accident,
    /// Any other kind written by another client.
    #[serde(untagged)]
    Other(String),
}

impl From<AgentType> for AgentKind {
    fn from(agent_type: AgentType) -> Self {
        match agent_type {
            AgentType::Murder => AgentKind::Murder,
            AgentType::Theft => AgentKind::Theft,
            AgentType::Fraud => AgentKind::Fraud,
            AgentType::Accident => AgentKind::Accident,
        }
    }
}

/// A single source in an agent's knowledge base.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeSource {
    /// Source title.
    pub name: String,
    /// Source type, e.g. "document".
    #[serde(rename = "type")]
    pub source_type: String,
    /// Source text or summary.
    pub content: String,
    /// Free-form source metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Document>,
}

impl KnowledgeSource {
    /// Create a document source.
    pub fn document(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source_type: "document".to_string(),
            content: content.into(),
            metadata: None,
        }
    }

    /// Attach metadata.
    pub fn with_metadata(mut self, metadata: Document) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Knowledge base attached to an assistant or agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeBase {
    /// Reference sources.
    #[serde(default)]
    pub sources: Vec<KnowledgeSource>,
    /// When the sources were last refreshed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime>,
}

impl KnowledgeBase {
    /// Knowledge base with the given sources, marked as updated now.
    pub fn new(sources: Vec<KnowledgeSource>) -> Self {
        Self {
            sources,
            last_updated: Some(DateTime::now()),
        }
    }
}

/// Template for handling a case scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseTemplate {
    /// Template title.
    pub template_name: String,
    /// Questions the agent asks.
    pub questions: Vec<String>,
    /// How the agent should frame its response.
    pub response_guidelines: String,
}

/// The general assistant that parents every specialized agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralAssistant {
    /// Store-assigned identifier.
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    /// Unique assistant name.
    pub name: String,
    /// Purpose of the assistant.
    pub description: String,
    /// Capabilities offered.
    pub capabilities: Vec<String>,
    /// General knowledge base.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub knowledge_base: Option<KnowledgeBase>,
    /// When the assistant was created.
    pub created_at: DateTime,
    /// When the assistant was last updated.
    pub updated_at: DateTime,
}

impl GeneralAssistant {
    /// Create a new assistant with no capabilities.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        let now = DateTime::now();
        Self {
            id: None,
            name: name.into(),
            description: description.into(),
            capabilities: Vec::new(),
            knowledge_base: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set capabilities.
    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }

    /// Set the knowledge base.
    pub fn with_knowledge_base(mut self, knowledge_base: KnowledgeBase) -> Self {
        self.knowledge_base = Some(knowledge_base);
        self
    }
}

/// Protocol followed during a murder investigation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestigationProtocol {
    #[serde(default)]
    pub protocol_name: String,
    #[serde(default)]
    pub steps: Vec<String>,
    #[serde(default)]
    pub legal_references: Vec<String>,
}

/// Category of theft with its handling procedure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TheftCategory {
    #[serde(default)]
    pub category_name: String,
    #[serde(default)]
    pub investigation_approach: String,
    #[serde(default)]
    pub evidence_guidelines: String,
}

/// Fraud type with detection methods and indicators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FraudType {
    #[serde(default)]
    pub fraud_type: String,
    #[serde(default)]
    pub detection_methods: Vec<String>,
    #[serde(default)]
    pub financial_indicators: Vec<String>,
}

/// Accident type with its investigation procedures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccidentType {
    #[serde(default)]
    pub accident_type: String,
    #[serde(default)]
    pub investigation_procedures: Vec<String>,
    #[serde(default)]
    pub evidence_collection: String,
}

/// Type-specific payload of a specialized agent, selected by `agent_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "agent_type")]
pub enum Specialty {
    /// Murder investigation protocols.
    Murder {
        #[serde(default)]
        investigation_protocols: Vec<InvestigationProtocol>,
    },
    /// Theft categories.
    Theft {
        #[serde(default)]
        theft_categories: Vec<TheftCategory>,
    },
    /// Fraud types.
    Fraud {
        #[serde(default)]
        fraud_types: Vec<FraudType>,
    },
    /// Accident types.
    Accident {
        #[serde(default)]
        accident_types: Vec<AccidentType>,
    },
}

impl Specialty {
    /// Empty payload for the given agent type.
    pub fn empty(agent_type: AgentType) -> Self {
        match agent_type {
            AgentType::Murder => Specialty::Murder {
                investigation_protocols: Vec::new(),
            },
            AgentType::Theft => Specialty::Theft {
                theft_categories: Vec::new(),
            },
            AgentType::Fraud => Specialty::Fraud {
                fraud_types: Vec::new(),
            },
            AgentType::Accident => Specialty::Accident {
                accident_types: Vec::new(),
            },
        }
    }

    /// The discriminator this payload is stored under.
    pub fn agent_type(&self) -> AgentType {
        match self {
            Specialty::Murder { .. } => AgentType::Murder,
            Specialty::Theft { .. } => AgentType::Theft,
            Specialty::Fraud { .. } => AgentType::Fraud,
            Specialty::Accident { .. } => AgentType::Accident,
        }
    }
}

/// A specialized investigation agent owned by a general assistant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecializedAgent {
    /// Store-assigned identifier.
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    /// Agent name.
    pub name: String,
    /// Purpose of the agent.
    pub description: String,
    /// Weak reference to the parent general assistant.
    pub parent_id: ObjectId,
    /// Specialized knowledge base.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub knowledge_base: Option<KnowledgeBase>,
    /// Agent type and its type-specific list.
    #[serde(flatten)]
    pub specialty: Specialty,
    /// Case handling templates.
    #[serde(default)]
    pub case_templates: Vec<CaseTemplate>,
    /// When the agent was created.
    pub created_at: DateTime,
    /// When the agent was last updated.
    pub updated_at: DateTime,
}

impl SpecializedAgent {
    /// Create a new agent under `parent_id`.
    pub fn new(
        specialty: Specialty,
        name: impl Into<String>,
        description: impl Into<String>,
        parent_id: ObjectId,
    ) -> Self {
        let now = DateTime::now();
        Self {
            id: None,
            name: name.into(),
            description: description.into(),
            parent_id,
            knowledge_base: None,
            specialty,
            case_templates: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// The agent's discriminator.
    pub fn agent_type(&self) -> AgentType {
        self.specialty.agent_type()
    }

    /// Set the knowledge base.
    pub fn with_knowledge_base(mut self, knowledge_base: KnowledgeBase) -> Self {
        self.knowledge_base = Some(knowledge_base);
        self
    }

    /// Set case templates.
    pub fn with_case_templates(mut self, case_templates: Vec<CaseTemplate>) -> Self {
        self.case_templates = case_templates;
        self
    }
}

/// Author of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    /// The investigating officer.
    User,
    /// The agent.
    Agent,
}

/// A retrieved reference cited by an agent message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub relevance_score: f64,
}

/// A message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Who sent the message.
    pub sender: Sender,
    /// Message text.
    pub content: String,
    /// When the message was sent; filled with "now" on append when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime>,
    /// References used to produce an agent answer.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<Reference>,
}

impl Message {
    /// Create a message without a timestamp.
    pub fn new(sender: Sender, content: impl Into<String>) -> Self {
        Self {
            sender,
            content: content.into(),
            timestamp: None,
            references: Vec::new(),
        }
    }

    /// Set the timestamp.
    pub fn at(mut self, timestamp: DateTime) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Attach references.
    pub fn with_references(mut self, references: Vec<Reference>) -> Self {
        self.references = references;
        self
    }
}

/// Case metadata attached to a conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// An interaction between a user and an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    /// Store-assigned identifier.
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    /// Officer using the system.
    pub user_id: String,
    /// Weak reference into the collection named by `agent_type`.
    pub agent_id: ObjectId,
    /// Which agent collection `agent_id` points into.
    pub agent_type: AgentKind,
    /// Case under discussion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_reference: Option<String>,
    /// Messages in insertion order.
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ConversationMetadata>,
    /// When the conversation was created.
    pub created_at: DateTime,
    /// When the conversation was last updated.
    pub updated_at: DateTime,
}

impl Conversation {
    /// Start an empty conversation.
    pub fn new(user_id: impl Into<String>, agent_id: ObjectId, agent_type: AgentKind) -> Self {
        let now = DateTime::now();
        Self {
            id: None,
            user_id: user_id.into(),
            agent_id,
            agent_type,
            case_reference: None,
            messages: Vec::new(),
            metadata: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the case reference.
    pub fn with_case_reference(mut self, case_reference: impl Into<String>) -> Self {
        self.case_reference = Some(case_reference.into());
        self
    }

    /// Set the initial messages.
    pub fn with_messages(mut self, messages: Vec<Message>) -> Self {
        self.messages = messages;
        self
    }

    /// Set the metadata.
    pub fn with_metadata(mut self, metadata: ConversationMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}
