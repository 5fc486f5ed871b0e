//! Declarative per-entity-type storage schema.
//!
//! The registry maps an entity type tag to the record layout the apply engine
//! needs: which field is the business key, which fields belong on the main row,
//! where the remaining fields go as meta rows, and which fields hold dates.
//! Supporting a new entity type is a `schema.yaml` edit:
//!
//! ```yaml
//! entities:
//!   User:
//!     key_field: id
//!     main_fields: [id, login, email, registered_at]
//!     meta_table: user_meta
//!     meta_foreign_key: user_id
//!     date_fields:
//!       - { name: registered_at, default_now: true }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;
use crate::files::{self, load_yaml, save_yaml};
use crate::types::{key_string, EntityType, FieldMap};

/// A main field normalized to a canonical timestamp string on apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateField {
    pub name: String,
    /// Fill with the current time when the payload omits the field.
    #[serde(default)]
    pub default_now: bool,
}

/// Resolves the concrete entity type of a row from one of its main fields.
///
/// e.g. `Post` rows whose `post_type` is `page` are stored as `Page`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Specialization {
    pub field: String,
    pub variants: BTreeMap<String, EntityType>,
}

/// Storage layout of one entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySchema {
    /// Business key used for upserts; must be listed in `main_fields`.
    pub key_field: String,
    /// Allow-list of fields stored on the main row.
    pub main_fields: Vec<String>,
    /// Storage tag of the meta side table.
    pub meta_table: String,
    /// Name of the meta table's foreign key to the main row.
    pub meta_foreign_key: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub date_fields: Vec<DateField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specialization: Option<Specialization>,
}

impl EntitySchema {
    pub fn is_main_field(&self, field: &str) -> bool {
        self.main_fields.iter().any(|f| f == field)
    }

    /// Split a payload into `(main_fields, meta_fields)`. Every key lands in
    /// exactly one side.
    pub fn partition(&self, fields: FieldMap) -> (FieldMap, FieldMap) {
        fields
            .into_iter()
            .partition(|(name, _)| self.is_main_field(name))
    }

    /// Concrete type of a row built from `main`, given the tag it arrived under.
    pub fn resolve_type(&self, declared: &EntityType, main: &FieldMap) -> EntityType {
        self.specialization
            .as_ref()
            .and_then(|spec| {
                let value = main.get(&spec.field)?;
                spec.variants.get(&key_string(value)).cloned()
            })
            .unwrap_or_else(|| declared.clone())
    }

    /// The business-key value of a payload, if present and non-null.
    pub fn key_of<'a>(&self, fields: &'a FieldMap) -> Option<&'a Value> {
        fields.get(&self.key_field).filter(|v| !v.is_null())
    }
}

/// Entity type tag → [`EntitySchema`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaRegistry {
    #[serde(default)]
    entities: BTreeMap<EntityType, EntitySchema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, entity_type: impl Into<EntityType>, schema: EntitySchema) -> Self {
        self.insert(entity_type, schema);
        self
    }

    pub fn insert(&mut self, entity_type: impl Into<EntityType>, schema: EntitySchema) {
        self.entities.insert(entity_type.into(), schema);
    }

    pub fn get(&self, entity_type: &EntityType) -> Option<&EntitySchema> {
        self.entities.get(entity_type)
    }

    pub fn contains(&self, entity_type: &EntityType) -> bool {
        self.entities.contains_key(entity_type)
    }

    pub fn entity_types(&self) -> impl Iterator<Item = &EntityType> {
        self.entities.keys()
    }

    /// Check cross-field consistency of every schema.
    pub fn validate(&self) -> Result<(), CoreError> {
        for (entity_type, schema) in &self.entities {
            if !schema.is_main_field(&schema.key_field) {
                return Err(invalid(format!(
                    "{entity_type}: key field '{}' is not a main field",
                    schema.key_field
                )));
            }
            if let Some(date) = schema
                .date_fields
                .iter()
                .find(|d| !schema.is_main_field(&d.name))
            {
                return Err(invalid(format!(
                    "{entity_type}: date field '{}' is not a main field",
                    date.name
                )));
            }
            if let Some(spec) = &schema.specialization {
                if let Some(missing) = spec.variants.values().find(|v| !self.contains(v)) {
                    return Err(invalid(format!(
                        "{entity_type}: specialization target '{missing}' has no schema"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Load and validate `<home>/.relay/schema.yaml`.
    pub fn load_at(home: &Path) -> Result<Self, CoreError> {
        let registry: Self = load_yaml(&files::schema_path_at(home))?;
        registry.validate()?;
        Ok(registry)
    }

    /// `load_at` convenience wrapper.
    pub fn load() -> Result<Self, CoreError> {
        Self::load_at(&files::home()?)
    }

    pub fn save_at(&self, home: &Path) -> Result<(), CoreError> {
        save_yaml(&files::schema_path_at(home), self)
    }
}

fn invalid(reason: String) -> CoreError {
    CoreError::Invalid {
        what: "schema",
        reason,
    }
}
