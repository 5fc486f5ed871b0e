//! Error types for relay-sync.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use relay_core::{EntityType, PlatformId, StoreError};

/// Errors raised by the apply engine, preparation and platform relations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The entity type has no entry in the schema registry.
    #[error("unsupported entity type: {entity_type}")]
    UnsupportedEntityType { entity_type: EntityType },

    /// The payload carries no value for the entity's business key.
    #[error("{entity_type} payload is missing its key field '{key_field}'")]
    MissingKey {
        entity_type: EntityType,
        key_field: String,
    },

    /// A referenced platform id is not in the catalog.
    #[error("unknown platform id {0}")]
    UnknownPlatform(PlatformId),

    /// Persistence failed; the enclosing transaction was rolled back.
    #[error("transaction failed: {0}")]
    Transaction(#[from] StoreError),

    /// The job runtime refused a deferred task.
    #[error("scheduler error: {0}")]
    Scheduler(String),
}

impl SyncError {
    pub(crate) fn unsupported(entity_type: &EntityType) -> Self {
        SyncError::UnsupportedEntityType {
            entity_type: entity_type.clone(),
        }
    }

    /// Whether re-running the failed job could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Transaction(_))
    }
}

/// Failure delivering one webhook to one target.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// Target answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Connection, TLS or I/O failure before a response was read.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Field name → messages, in the order fields were checked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors(pub BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            for message in messages {
                if !first {
                    f.write_str("; ")?;
                }
                write!(f, "{field}: {message}")?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Rejection at the webhook ingress. Nothing is applied for any variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IngressError {
    #[error("{0}")]
    Authentication(&'static str),

    #[error("validation failed: {0}")]
    Validation(ValidationErrors),

    /// The request was valid but its apply job could not be queued.
    #[error("apply job not queued: {0}")]
    Unavailable(String),
}

impl IngressError {
    /// HTTP status the listener answers with.
    pub fn status_code(&self) -> u16 {
        match self {
            IngressError::Authentication(_) => 401,
            IngressError::Validation(_) => 422,
            IngressError::Unavailable(_) => 503,
        }
    }
}
