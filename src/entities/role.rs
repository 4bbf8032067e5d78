use super::{DOCUMENT_VERSION, bounded_text};
use crate::store::{
    CollectionStore, Mapper, Record, RecordFields, StoreOptions, Validation, Validator,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const ROLE_NAME_MAX: usize = 100;
pub const ROLE_DESCRIPTION_MAX: usize = 500;
pub const ROLE_INSTRUCTIONS_MAX: usize = 10_000;

pub type RoleStore = CollectionStore<RoleValidator, RoleMapper>;

impl RoleStore {
    /// Store of the `roles` collection.
    pub fn roles(options: StoreOptions) -> Self {
        Self::with_options("roles", RoleValidator, RoleMapper, options)
    }
}

impl Default for RoleStore {
    fn default() -> Self {
        Self::roles(StoreOptions::default())
    }
}

/// Raw role input as typed by a user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleInput {
    pub name: String,
    pub description: String,
    pub instructions: String,
}

impl RoleInput {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleFields {
    pub name: String,
    pub description: String,
    pub instructions: String,
}

impl RecordFields for RoleFields {
    fn name(&self) -> &str {
        &self.name
    }
}

impl From<&RoleFields> for RoleInput {
    fn from(fields: &RoleFields) -> Self {
        Self {
            name: fields.name.clone(),
            description: fields.description.clone(),
            instructions: fields.instructions.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RoleValidator;

impl Validator for RoleValidator {
    type Input = RoleInput;
    type Output = RoleFields;

    fn validate(&self, input: RoleInput) -> Validation<RoleFields> {
        let mut errors = Vec::new();
        let name = bounded_text("name", &input.name, ROLE_NAME_MAX, true, &mut errors);
        let description = bounded_text(
            "description",
            &input.description,
            ROLE_DESCRIPTION_MAX,
            false,
            &mut errors,
        );
        let instructions = bounded_text(
            "instructions",
            &input.instructions,
            ROLE_INSTRUCTIONS_MAX,
            false,
            &mut errors,
        );

        if errors.is_empty() {
            Validation::Valid(RoleFields {
                name,
                description,
                instructions,
            })
        } else {
            Validation::Invalid(errors)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedRole {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub instructions: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// On-disk shape of the roles collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RolesDocument {
    pub version: u32,
    pub roles: Vec<PersistedRole>,
}

impl Default for RolesDocument {
    fn default() -> Self {
        Self {
            version: DOCUMENT_VERSION,
            roles: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RoleMapper;

impl Mapper for RoleMapper {
    type Fields = RoleFields;
    type Persisted = RolesDocument;

    fn to_persisted(&self, items: &[Record<RoleFields>]) -> RolesDocument {
        RolesDocument {
            version: DOCUMENT_VERSION,
            roles: items
                .iter()
                .map(|record| PersistedRole {
                    id: record.id.clone(),
                    name: record.fields.name.clone(),
                    description: record.fields.description.clone(),
                    instructions: record.fields.instructions.clone(),
                    created_at: record.created_at,
                    updated_at: record.updated_at,
                })
                .collect(),
        }
    }

    fn from_persisted(&self, persisted: RolesDocument) -> Vec<Record<RoleFields>> {
        persisted
            .roles
            .into_iter()
            .map(|role| Record {
                id: role.id,
                fields: RoleFields {
                    name: role.name,
                    description: role.description,
                    instructions: role.instructions,
                },
                created_at: role.created_at,
                updated_at: role.updated_at,
            })
            .collect()
    }
}
