//! Domain types shared by every relay crate.
//!
//! Field values travel as `serde_json::Value`; a record's fields are a
//! [`FieldMap`] ordered by field name so that payloads and stored rows
//! serialize deterministically.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Flat field name → value map, the shape of every record on the wire and in storage.
pub type FieldMap = BTreeMap<String, Value>;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Identity of a platform in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlatformId(pub u64);

impl fmt::Display for PlatformId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<u64> for PlatformId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Identity of a sync configuration row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncId(pub u64);

impl fmt::Display for SyncId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<u64> for SyncId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Tag naming a domain entity type (`User`, `Post`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityType(pub String);

impl EntityType {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for EntityType {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for EntityType {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Canonical string form of a business-key value.
///
/// `7` and `"7"` address the same row; other JSON shapes fall back to their
/// compact encoding.
pub fn key_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Lifecycle event that triggered a sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Created,
    Updated,
    Deleted,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Created => "created",
            EventType::Updated => "updated",
            EventType::Deleted => "deleted",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(EventType::Created),
            "updated" => Ok(EventType::Updated),
            "deleted" => Ok(EventType::Deleted),
            other => Err(format!(
                "unknown event type '{other}'; expected: created, updated, deleted"
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Platforms and sync configuration
// ---------------------------------------------------------------------------

/// One independently deployed instance participating in sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    pub id: PlatformId,
    pub name: String,
    /// Network host, e.g. `shop.example.com`.
    pub domain: String,
    /// Opaque token; uniquely authenticates the platform.
    pub api_token: String,
}

impl Platform {
    /// Public view of the platform sent along with every payload.
    pub fn snapshot(&self) -> PlatformSnapshot {
        PlatformSnapshot {
            id: self.id,
            name: self.name.clone(),
            domain: self.domain.clone(),
        }
    }
}

/// Token-free platform view carried on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformSnapshot {
    pub id: PlatformId,
    pub name: String,
    pub domain: String,
}

/// Propagate `source_entity_type` mutations made on `source_platform_id` to
/// `target_platform_id`. A (source, entity type) pair fans out to every
/// matching row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfiguration {
    pub id: SyncId,
    pub source_platform_id: PlatformId,
    pub source_entity_type: EntityType,
    pub target_platform_id: PlatformId,
}

// ---------------------------------------------------------------------------
// Entity associations
// ---------------------------------------------------------------------------

/// Reference to an arbitrary domain entity by type tag and key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityRef {
    pub entity_type: EntityType,
    pub key: String,
}

impl EntityRef {
    pub fn new(entity_type: impl Into<EntityType>, key: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.entity_type, self.key)
    }
}

/// Row of the `model_platform` join table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelPlatformAssociation {
    pub model_type: EntityType,
    pub model_id: String,
    pub platform_id: PlatformId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ModelPlatformAssociation {
    pub fn new(entity: &EntityRef, platform_id: PlatformId, now: DateTime<Utc>) -> Self {
        Self {
            model_type: entity.entity_type.clone(),
            model_id: entity.key.clone(),
            platform_id,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn entity(&self) -> EntityRef {
        EntityRef::new(self.model_type.clone(), self.model_id.clone())
    }
}

// ---------------------------------------------------------------------------
// Stored records
// ---------------------------------------------------------------------------

/// Canonical row of an entity, keyed by its business key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MainRecord {
    /// Concrete type of the row; may differ from the tag it was applied under.
    pub entity_type: EntityType,
    pub fields: FieldMap,
}

impl MainRecord {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}

/// One key/value side row attached to a main record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaRecord {
    /// Storage tag of the meta table, e.g. `user_meta`.
    pub meta_table: String,
    /// Foreign-key column name, e.g. `user_id`.
    pub foreign_key: String,
    /// Business key of the owning main record.
    pub owner_key: String,
    pub meta_key: String,
    pub meta_value: Value,
}

// ---------------------------------------------------------------------------
// Wire payload
// ---------------------------------------------------------------------------

/// Reference to the sync configuration row a delivery was made for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRef {
    pub id: SyncId,
}

/// JSON body of a webhook delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncPayload {
    pub event_type: EventType,
    pub model: FieldMap,
    pub model_class: EntityType,
    pub platform: PlatformSnapshot,
    pub sync: SyncRef,
}

/// Typed lifecycle event published by whatever mutates local entities.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationEvent {
    pub entity_type: EntityType,
    /// Business-key value of the mutated entity.
    pub key: Value,
    pub kind: EventType,
}

impl MutationEvent {
    pub fn new(entity_type: impl Into<EntityType>, key: Value, kind: EventType) -> Self {
        Self {
            entity_type: entity_type.into(),
            key,
            kind,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
