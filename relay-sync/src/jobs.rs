//! Deferred work handed to the job runtime.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use relay_core::{EntityType, EventType, FieldMap, PlatformId, SyncConfiguration, SyncId};

use crate::error::SyncError;

/// Load, transform and deliver one mutated entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrepareJob {
    pub entity_key: Value,
    pub entity_type: EntityType,
    pub event_type: EventType,
    pub source_platform_id: PlatformId,
    pub sync_configurations: Vec<SyncConfiguration>,
}

/// Apply one accepted inbound payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplyJob {
    pub entity_type: EntityType,
    pub event_type: EventType,
    pub sync_id: SyncId,
    pub fields: FieldMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Job {
    Prepare(PrepareJob),
    Apply(ApplyJob),
}

impl Job {
    pub fn label(&self) -> String {
        match self {
            Job::Prepare(job) => format!(
                "prepare {}#{} ({})",
                job.entity_type,
                relay_core::key_string(&job.entity_key),
                job.event_type
            ),
            Job::Apply(job) => format!("apply {} (sync {})", job.entity_type, job.sync_id),
        }
    }
}

/// The worker pool that runs deferred jobs.
///
/// `schedule` must not block on the job itself; it only enqueues.
pub trait JobScheduler: Send + Sync {
    fn schedule(&self, job: Job, delay: Duration) -> Result<(), SyncError>;
}
