//! Relay core library: domain types, schema registry, catalog, settings, storage seam.
//!
//! - [`types`]: newtypes, records and the wire payload
//! - [`schema`]: per-entity-type storage layout
//! - [`catalog`]: platforms and sync configuration rows
//! - [`config`]: [`SyncSettings`]
//! - [`store`]: [`Store`] / [`Transaction`] and the in-memory backend
//! - [`error`]: [`CoreError`], [`StoreError`]

pub mod catalog;
pub mod config;
pub mod error;
pub mod files;
pub mod schema;
pub mod store;
pub mod types;

pub use catalog::Catalog;
pub use config::SyncSettings;
pub use error::{CoreError, StoreError};
pub use schema::{DateField, EntitySchema, SchemaRegistry, Specialization};
pub use store::{MemoryStore, Store, Transaction};
pub use types::{
    key_string, EntityRef, EntityType, EventType, FieldMap, MainRecord, MetaRecord,
    ModelPlatformAssociation, MutationEvent, Platform, PlatformId, PlatformSnapshot,
    SyncConfiguration, SyncId, SyncPayload, SyncRef,
};
