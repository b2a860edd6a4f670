//! Collection registry and `$jsonSchema` validator definitions.
//!
//! The six collections share a handful of nested shapes (knowledge bases,
//! case templates). The four specialized-agent validators are built from one
//! common agent shape plus the type-specific list, with `agent_type` pinned to
//! a single-value enum per collection.

mod validate;

pub use validate::{validate, SchemaViolation};

use mongodb::bson::{doc, Document};

use crate::models::AgentType;

/// A collection managed by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    /// Parent collection for all agents.
    GeneralAssistant,
    /// One collection per specialized agent type.
    Agent(AgentType),
    /// User/agent interactions.
    Conversations,
}

impl Collection {
    /// All collections, in provisioning order.
    pub const ALL: [Collection; 6] = [
        Collection::GeneralAssistant,
        Collection::Agent(AgentType::Murder),
        Collection::Agent(AgentType::Theft),
        Collection::Agent(AgentType::Fraud),
        Collection::Agent(AgentType::Accident),
        Collection::Conversations,
    ];

    /// Collection name in the database.
    pub fn name(&self) -> &'static str {
        match self {
            Collection::GeneralAssistant => "general_assistant",
            Collection::Agent(AgentType::Murder) => "murder_agent",
            Collection::Agent(AgentType::Theft) => "theft_agent",
            Collection::Agent(AgentType::Fraud) => "fraud_agent",
            Collection::Agent(AgentType::Accident) => "accident_agent",
            Collection::Conversations => "conversations",
        }
    }

    /// One-line description used in setup output.
    pub fn summary(&self) -> &'static str {
        match self {
            Collection::GeneralAssistant => "Parent collection for all agents",
            Collection::Agent(AgentType::Murder) => {
                "Specialized agent for murder investigations"
            }
            Collection::Agent(AgentType::Theft) => "Specialized agent for theft investigations",
            Collection::Agent(AgentType::Fraud) => "Specialized agent for fraud investigations",
            Collection::Agent(AgentType::Accident) => {
                "Specialized agent for accident investigations"
            }
            Collection::Conversations => "Stores interactions between users and agents",
        }
    }

    /// Fixed `agent_type` for specialized-agent collections.
    pub fn agent_type(&self) -> Option<AgentType> {
        match self {
            Collection::Agent(agent_type) => Some(*agent_type),
            _ => None,
        }
    }

    /// The `$jsonSchema` body for this collection.
    pub fn schema(&self) -> Document {
        match self {
            Collection::GeneralAssistant => general_assistant_schema(),
            Collection::Agent(agent_type) => specialized_agent_schema(*agent_type),
            Collection::Conversations => conversation_schema(),
        }
    }

    /// The full validator document, `{ $jsonSchema: ... }`.
    pub fn validator(&self) -> Document {
        doc! { "$jsonSchema": self.schema() }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

fn string_field(description: &str) -> Document {
    doc! { "bsonType": "string", "description": description }
}

fn date_field(description: &str) -> Document {
    doc! { "bsonType": "date", "description": description }
}

fn string_array() -> Document {
    doc! { "bsonType": "array", "items": { "bsonType": "string" } }
}

fn knowledge_base(description: &str) -> Document {
    doc! {
        "bsonType": "object",
        "description": description,
        "properties": {
            "sources": {
                "bsonType": "array",
                "items": {
                    "bsonType": "object",
                    "required": ["name", "type", "content"],
                    "properties": {
                        "name": { "bsonType": "string" },
                        "type": { "bsonType": "string" },
                        "content": { "bsonType": "string" },
                        "metadata": { "bsonType": "object" },
                    },
                },
            },
            "last_updated": { "bsonType": "date" },
        },
    }
}

fn case_templates(description: &str) -> Document {
    doc! {
        "bsonType": "array",
        "description": description,
        "items": {
            "bsonType": "object",
            "required": ["template_name", "questions", "response_guidelines"],
            "properties": {
                "template_name": { "bsonType": "string" },
                "questions": string_array(),
                "response_guidelines": { "bsonType": "string" },
            },
        },
    }
}

fn general_assistant_schema() -> Document {
    doc! {
        "bsonType": "object",
        "required": ["name", "description", "capabilities", "created_at", "updated_at"],
        "properties": {
            "name": string_field("Name of the general assistant"),
            "description": string_field(
                "Description of the general assistant's purpose and capabilities",
            ),
            "capabilities": {
                "bsonType": "array",
                "description": "List of capabilities the general assistant has",
                "items": { "bsonType": "string" },
            },
            "knowledge_base": knowledge_base("General knowledge base for the assistant"),
            "created_at": date_field("Timestamp when the assistant was created"),
            "updated_at": date_field("Timestamp when the assistant was last updated"),
        },
    }
}

/// Property name and schema of the type-specific list.
fn specialty_property(agent_type: AgentType) -> (&'static str, Document) {
    match agent_type {
        AgentType::Murder => (
            "investigation_protocols",
            doc! {
                "bsonType": "array",
                "description": "Specific protocols for murder investigations",
                "items": {
                    "bsonType": "object",
                    "properties": {
                        "protocol_name": { "bsonType": "string" },
                        "steps": string_array(),
                        "legal_references": string_array(),
                    },
                },
            },
        ),
        AgentType::Theft => (
            "theft_categories",
            doc! {
                "bsonType": "array",
                "description": "Categories of theft with specific handling procedures",
                "items": {
                    "bsonType": "object",
                    "properties": {
                        "category_name": { "bsonType": "string" },
                        "investigation_approach": { "bsonType": "string" },
                        "evidence_guidelines": { "bsonType": "string" },
                    },
                },
            },
        ),
        AgentType::Fraud => (
            "fraud_types",
            doc! {
                "bsonType": "array",
                "description": "Types of fraud with specific detection and investigation methods",
                "items": {
                    "bsonType": "object",
                    "properties": {
                        "fraud_type": { "bsonType": "string" },
                        "detection_methods": string_array(),
                        "financial_indicators": string_array(),
                    },
                },
            },
        ),
        AgentType::Accident => (
            "accident_types",
            doc! {
                "bsonType": "array",
                "description": "Types of accidents with specific investigation procedures",
                "items": {
                    "bsonType": "object",
                    "properties": {
                        "accident_type": { "bsonType": "string" },
                        "investigation_procedures": string_array(),
                        "evidence_collection": { "bsonType": "string" },
                    },
                },
            },
        ),
    }
}

fn specialized_agent_schema(agent_type: AgentType) -> Document {
    let label = agent_type.as_str().to_lowercase();
    let mut properties = doc! {
        "agent_type": {
            "enum": [agent_type.as_str()],
            "description": format!("Type of specialized agent ({})", agent_type),
        },
        "name": string_field(&format!("Name of the {} investigation agent", label)),
        "description": string_field(&format!(
            "Description of the {} agent's purpose and capabilities",
            label
        )),
        "parent_id": {
            "bsonType": "objectId",
            "description": "Reference to the parent General Assistant",
        },
        "knowledge_base": knowledge_base(&format!("{} investigation knowledge base", agent_type)),
    };

    let (field, schema) = specialty_property(agent_type);
    properties.insert(field, schema);
    properties.insert(
        "case_templates",
        case_templates(&format!(
            "Templates for handling different {} case scenarios",
            label
        )),
    );
    properties.insert("created_at", date_field("Timestamp when the agent was created"));
    properties.insert(
        "updated_at",
        date_field("Timestamp when the agent was last updated"),
    );

    doc! {
        "bsonType": "object",
        "required": ["agent_type", "name", "description", "parent_id", "created_at", "updated_at"],
        "properties": properties,
    }
}

fn conversation_schema() -> Document {
    doc! {
        "bsonType": "object",
        "required": ["user_id", "agent_id", "agent_type", "messages", "created_at", "updated_at"],
        "properties": {
            "user_id": string_field("ID of the police official using the system"),
            "agent_id": {
                "bsonType": "objectId",
                "description": "Reference to the agent handling the conversation",
            },
            "agent_type": string_field("Type of agent (General, Murder, Theft, Fraud, Accident)"),
            "case_reference": string_field("Reference to the case being discussed"),
            "messages": {
                "bsonType": "array",
                "description": "Array of messages in the conversation",
                "items": {
                    "bsonType": "object",
                    "required": ["sender", "content", "timestamp"],
                    "properties": {
                        "sender": {
                            "enum": ["user", "agent"],
                            "description": "Either 'user' or 'agent'",
                        },
                        "content": string_field("Message content"),
                        "timestamp": date_field("When the message was sent"),
                        "references": {
                            "bsonType": "array",
                            "description": "References used in RAG responses",
                            "items": {
                                "bsonType": "object",
                                "properties": {
                                    "source": { "bsonType": "string" },
                                    "content": { "bsonType": "string" },
                                    "relevance_score": { "bsonType": "double" },
                                },
                            },
                        },
                    },
                },
            },
            "metadata": {
                "bsonType": "object",
                "description": "Additional metadata about the conversation",
                "properties": {
                    "case_type": { "bsonType": "string" },
                    "priority": { "bsonType": "string" },
                    "tags": string_array(),
                },
            },
            "created_at": date_field("Timestamp when the conversation was created"),
            "updated_at": date_field("Timestamp when the conversation was last updated"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::Bson;

    fn required(schema: &Document) -> Vec<String> {
        schema
            .get_array("required")
            .unwrap()
            .iter()
            .filter_map(|b| b.as_str().map(str::to_string))
            .collect()
    }

    #[test]
    fn test_collection_names() {
        let names: Vec<_> = Collection::ALL.iter().map(|c| c.name()).collect();
        assert_eq!(
            names,
            vec![
                "general_assistant",
                "murder_agent",
                "theft_agent",
                "fraud_agent",
                "accident_agent",
                "conversations",
            ]
        );
    }

    #[test]
    fn test_validator_wraps_json_schema() {
        for collection in Collection::ALL {
            let validator = collection.validator();
            assert_eq!(validator.len(), 1);
            assert_eq!(
                validator.get_document("$jsonSchema").unwrap(),
                &collection.schema()
            );
        }
    }

    #[test]
    fn test_agent_type_is_single_value_enum() {
        for agent_type in AgentType::ALL {
            let schema = Collection::Agent(agent_type).schema();
            let agent_type_schema = schema
                .get_document("properties")
                .unwrap()
                .get_document("agent_type")
                .unwrap();
            assert_eq!(
                agent_type_schema.get_array("enum").unwrap(),
                &vec![Bson::String(agent_type.as_str().to_string())]
            );
        }
    }

    #[test]
    fn test_specialized_schemas_differ_only_in_specialty() {
        let expected = [
            (AgentType::Murder, "investigation_protocols"),
            (AgentType::Theft, "theft_categories"),
            (AgentType::Fraud, "fraud_types"),
            (AgentType::Accident, "accident_types"),
        ];

        for (agent_type, field) in expected {
            let schema = Collection::Agent(agent_type).schema();
            assert_eq!(
                required(&schema),
                vec![
                    "agent_type",
                    "name",
                    "description",
                    "parent_id",
                    "created_at",
                    "updated_at"
                ]
            );

            let properties = schema.get_document("properties").unwrap();
            assert!(properties.contains_key(field));
            for (_, other) in expected.iter().filter(|(t, _)| *t != agent_type) {
                assert!(!properties.contains_key(*other));
            }
            assert!(properties.contains_key("case_templates"));
        }
    }

    #[test]
    fn test_required_fields() {
        assert_eq!(
            required(&Collection::GeneralAssistant.schema()),
            vec!["name", "description", "capabilities", "created_at", "updated_at"]
        );
        assert_eq!(
            required(&Collection::Conversations.schema()),
            vec!["user_id", "agent_id", "agent_type", "messages", "created_at", "updated_at"]
        );
    }

    #[test]
    fn test_only_specialized_collections_pin_agent_type() {
        assert_eq!(Collection::GeneralAssistant.agent_type(), None);
        assert_eq!(Collection::Conversations.agent_type(), None);
        assert_eq!(
            Collection::Agent(AgentType::Theft).agent_type(),
            Some(AgentType::Theft)
        );
    }
}
