use super::{DOCUMENT_VERSION, bounded_text};
use crate::core::FieldError;
use crate::store::{
    CollectionStore, Mapper, Record, RecordFields, StoreOptions, Validation, Validator,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const AGENT_NAME_MAX: usize = 100;
pub const AGENT_DESCRIPTION_MAX: usize = 500;
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const MAX_TEMPERATURE: f64 = 2.0;

pub type AgentStore = CollectionStore<AgentValidator, AgentMapper>;

impl AgentStore {
    /// Store of the `agents` collection.
    pub fn agents(options: StoreOptions) -> Self {
        Self::with_options("agents", AgentValidator, AgentMapper, options)
    }
}

impl Default for AgentStore {
    fn default() -> Self {
        Self::agents(StoreOptions::default())
    }
}

/// Raw agent input; unset optional knobs fall back to defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AgentInput {
    pub name: String,
    pub description: String,
    pub role_id: Option<String>,
    pub provider: String,
    pub model_id: String,
    pub temperature: Option<f64>,
    pub max_tokens: Option<i64>,
    pub enabled: Option<bool>,
}

impl AgentInput {
    pub fn new(
        name: impl Into<String>,
        provider: impl Into<String>,
        model_id: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            provider: provider.into(),
            model_id: model_id.into(),
            ..Self::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn role_id(mut self, role_id: impl Into<String>) -> Self {
        self.role_id = Some(role_id.into());
        self
    }

    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn max_tokens(mut self, max_tokens: i64) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }
}

/// LLM an agent runs on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelRef {
    pub provider: String,
    pub model_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentFields {
    pub name: String,
    pub description: String,
    pub role_id: Option<String>,
    pub model: ModelRef,
    pub temperature: f64,
    pub max_tokens: Option<u32>,
    pub enabled: bool,
}

impl RecordFields for AgentFields {
    fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AgentValidator;

impl Validator for AgentValidator {
    type Input = AgentInput;
    type Output = AgentFields;

    fn validate(&self, input: AgentInput) -> Validation<AgentFields> {
        let mut errors = Vec::new();
        let name = bounded_text("name", &input.name, AGENT_NAME_MAX, true, &mut errors);
        let description = bounded_text(
            "description",
            &input.description,
            AGENT_DESCRIPTION_MAX,
            false,
            &mut errors,
        );
        let provider = bounded_text("model.provider", &input.provider, 100, true, &mut errors);
        let model_id = bounded_text("model.modelId", &input.model_id, 200, true, &mut errors);
        let role_id = input
            .role_id
            .map(|role_id| role_id.trim().to_string())
            .filter(|role_id| !role_id.is_empty());

        let temperature = input.temperature.unwrap_or(DEFAULT_TEMPERATURE);
        if !temperature.is_finite() || !(0.0..=MAX_TEMPERATURE).contains(&temperature) {
            errors.push(FieldError::new(
                "temperature",
                format!("must be between 0 and {MAX_TEMPERATURE}"),
            ));
        }

        let max_tokens = match input.max_tokens {
            None => None,
            Some(value) => match u32::try_from(value) {
                Ok(tokens) if tokens > 0 => Some(tokens),
                _ => {
                    errors.push(FieldError::new(
                        "maxTokens",
                        format!("must be a positive integer up to {}", u32::MAX),
                    ));
                    None
                }
            },
        };

        if !errors.is_empty() {
            return Validation::Invalid(errors);
        }
        Validation::Valid(AgentFields {
            name,
            description,
            role_id,
            model: ModelRef { provider, model_id },
            temperature,
            max_tokens,
            enabled: input.enabled.unwrap_or(true),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedAgent {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_id: Option<String>,
    pub model: ModelRef,
    pub temperature: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentsDocument {
    pub version: u32,
    pub agents: Vec<PersistedAgent>,
}

impl Default for AgentsDocument {
    fn default() -> Self {
        Self {
            version: DOCUMENT_VERSION,
            agents: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AgentMapper;

impl Mapper for AgentMapper {
    type Fields = AgentFields;
    type Persisted = AgentsDocument;

    fn to_persisted(&self, items: &[Record<AgentFields>]) -> AgentsDocument {
        let agents = items
            .iter()
            .map(|record| {
                let fields = record.fields.clone();
                PersistedAgent {
                    id: record.id.clone(),
                    name: fields.name,
                    description: fields.description,
                    role_id: fields.role_id,
                    model: fields.model,
                    temperature: fields.temperature,
                    max_tokens: fields.max_tokens,
                    enabled: fields.enabled,
                    created_at: record.created_at,
                    updated_at: record.updated_at,
                }
            })
            .collect();
        AgentsDocument {
            version: DOCUMENT_VERSION,
            agents,
        }
    }

    fn from_persisted(&self, persisted: AgentsDocument) -> Vec<Record<AgentFields>> {
        persisted
            .agents
            .into_iter()
            .map(|agent| Record {
                id: agent.id,
                fields: AgentFields {
                    name: agent.name,
                    description: agent.description,
                    role_id: agent.role_id,
                    model: agent.model,
                    temperature: agent.temperature,
                    max_tokens: agent.max_tokens,
                    enabled: agent.enabled,
                },
                created_at: agent.created_at,
                updated_at: agent.updated_at,
            })
            .collect()
    }
}
