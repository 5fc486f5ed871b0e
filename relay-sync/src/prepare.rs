//! Sync preparation: load → transform → fan out one webhook per target.
//!
//! Deliveries to different targets are independent: a failure is logged and
//! recorded in the returned [`DeliveryReport`], and the remaining targets are
//! still attempted. Nothing is retried here.

use std::time::Duration;

use serde_json::Value;

use relay_core::{
    key_string, EntityType, EventType, FieldMap, Platform, PlatformSnapshot, Store,
    SyncConfiguration, SyncId, SyncPayload, SyncRef,
};

use crate::context::SyncContext;
use crate::error::{DeliveryError, SyncError};
use crate::jobs::PrepareJob;
use crate::signature;
use crate::transformer::EntityView;

pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";
pub const PLATFORM_TOKEN_HEADER: &str = "X-Platform-Token";

/// Upper bound on one outbound webhook call.
pub const DELIVERY_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// One signed outbound webhook call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookRequest {
    pub url: String,
    pub bearer_token: String,
    pub signature: String,
    pub body: Vec<u8>,
}

pub trait WebhookTransport: Send + Sync {
    /// POST the request; `Ok` carries the 2xx status.
    fn post(&self, request: &WebhookRequest) -> Result<u16, DeliveryError>;
}

/// Blocking HTTP transport.
#[derive(Debug, Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new(timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
        }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new(DELIVERY_TIMEOUT)
    }
}

impl WebhookTransport for UreqTransport {
    fn post(&self, request: &WebhookRequest) -> Result<u16, DeliveryError> {
        let result = self
            .agent
            .post(&request.url)
            .set("Authorization", &format!("Bearer {}", request.bearer_token))
            .set(SIGNATURE_HEADER, &request.signature)
            .set("Content-Type", "application/json")
            .set("Accept", "application/json")
            .send_bytes(&request.body);

        match result {
            Ok(response) => Ok(response.status()),
            Err(ureq::Error::Status(status, response)) => Err(DeliveryError::Status {
                status,
                body: response.into_string().unwrap_or_default(),
            }),
            Err(ureq::Error::Transport(transport)) => {
                Err(DeliveryError::Transport(transport.to_string()))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Delivery report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryStatus {
    Delivered(u16),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub sync_id: Option<SyncId>,
    pub target: String,
    pub url: Option<String>,
    pub status: DeliveryStatus,
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self.status, DeliveryStatus::Delivered(_))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub outcomes: Vec<DeliveryOutcome>,
}

impl DeliveryReport {
    pub fn delivered(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_delivered()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.delivered()
    }
}

// ---------------------------------------------------------------------------
// Preparation
// ---------------------------------------------------------------------------

pub struct Preparer<'a> {
    ctx: &'a SyncContext,
    store: &'a dyn Store,
    transport: &'a dyn WebhookTransport,
}

impl<'a> Preparer<'a> {
    pub fn new(ctx: &'a SyncContext, store: &'a dyn Store, transport: &'a dyn WebhookTransport) -> Self {
        Self {
            ctx,
            store,
            transport,
        }
    }

    /// Run one [`PrepareJob`].
    ///
    /// Errors only for problems shared by every target (unknown source
    /// platform, unsupported entity type, store failure); per-target failures
    /// land in the report.
    pub fn run(&self, job: &PrepareJob) -> Result<DeliveryReport, SyncError> {
        let source = self
            .ctx
            .catalog
            .platform(job.source_platform_id)
            .ok_or(SyncError::UnknownPlatform(job.source_platform_id))?;

        tracing::debug!(
            "preparing {}#{} ({}) from platform #{}",
            job.entity_type,
            key_string(&job.entity_key),
            job.event_type,
            source.id
        );

        let model = self.build_model(&job.entity_type, &job.entity_key)?;
        Ok(self.deliver_all(
            job.event_type,
            &job.entity_type,
            &model,
            &source.snapshot(),
            &job.sync_configurations,
        ))
    }

    /// Wire model of the entity, or just its key when it no longer exists.
    pub fn build_model(&self, entity_type: &EntityType, key: &Value) -> Result<FieldMap, SyncError> {
        let schema = self
            .ctx
            .schema
            .get(entity_type)
            .ok_or_else(|| SyncError::unsupported(entity_type))?;

        let Some(record) = self.store.find_main(entity_type, &key_string(key))? else {
            tracing::warn!(
                "{entity_type}#{} not found; sending key only",
                key_string(key)
            );
            let mut model = FieldMap::new();
            model.insert(schema.key_field.clone(), key.clone());
            return Ok(model);
        };

        let meta_table = &self
            .ctx
            .schema
            .get(&record.entity_type)
            .unwrap_or(schema)
            .meta_table;
        let meta = self.store.meta_for(meta_table, &key_string(key))?;
        let view = EntityView {
            record: &record,
            meta: &meta,
        };
        Ok(self.ctx.transformers.for_type(entity_type).transform(&view))
    }

    fn deliver_all(
        &self,
        event_type: EventType,
        entity_type: &EntityType,
        model: &FieldMap,
        source: &PlatformSnapshot,
        syncs: &[SyncConfiguration],
    ) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        for sync in syncs {
            let Some(target) = self.ctx.catalog.platform(sync.target_platform_id) else {
                tracing::warn!(
                    "sync {} targets unknown platform #{}; skipped",
                    sync.id,
                    sync.target_platform_id
                );
                report.outcomes.push(DeliveryOutcome {
                    sync_id: Some(sync.id),
                    target: sync.target_platform_id.to_string(),
                    url: None,
                    status: DeliveryStatus::Failed("unknown target platform".to_string()),
                });
                continue;
            };
            let payload = SyncPayload {
                event_type,
                model: model.clone(),
                model_class: entity_type.clone(),
                platform: source.clone(),
                sync: SyncRef { id: sync.id },
            };
            report
                .outcomes
                .push(self.deliver(Some(sync.id), target, &payload));
        }
        tracing::info!(
            "{entity_type} {event_type}: {} delivered, {} failed",
            report.delivered(),
            report.failed()
        );
        report
    }

    /// Sign and POST one payload. Failures are logged, never raised.
    pub(crate) fn deliver(
        &self,
        sync_id: Option<SyncId>,
        target: &Platform,
        payload: &SyncPayload,
    ) -> DeliveryOutcome {
        let url = self.ctx.settings.webhook_url(&target.domain);
        let status = match self.send(&url, target, payload) {
            Ok(code) => {
                tracing::debug!("webhook to {} ({url}) answered {code}", target.name);
                DeliveryStatus::Delivered(code)
            }
            Err(err) => {
                tracing::warn!("webhook to {} ({url}) failed: {err}", target.name);
                DeliveryStatus::Failed(err.to_string())
            }
        };
        DeliveryOutcome {
            sync_id,
            target: target.name.clone(),
            url: Some(url),
            status,
        }
    }

    fn send(&self, url: &str, target: &Platform, payload: &SyncPayload) -> Result<u16, DeliveryError> {
        let body = serde_json::to_vec(payload)
            .map_err(|e| DeliveryError::Transport(format!("payload encoding failed: {e}")))?;
        let request = WebhookRequest {
            url: url.to_string(),
            bearer_token: target.api_token.clone(),
            signature: signature::sign(&body, &target.api_token, &self.ctx.settings.sync_token),
            body,
        };
        self.transport.post(&request)
    }

    /// Push the catalog's platform records to every target of a `Platform`
    /// sync row sourced at the current platform. Each target receives every
    /// platform except itself, as an `updated` event.
    pub fn broadcast_platforms(&self) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        let Some(current) = &self.ctx.current_platform else {
            tracing::info!("platform broadcast skipped: current platform not set");
            return report;
        };
        let platform_type = EntityType::from(PLATFORM_ENTITY_TYPE);

        for sync in self.ctx.catalog.syncs_for(current.id, &platform_type) {
            let Some(target) = self.ctx.catalog.platform(sync.target_platform_id) else {
                continue;
            };
            for platform in self.ctx.catalog.platforms.iter().filter(|p| p.id != target.id) {
                let payload = SyncPayload {
                    event_type: EventType::Updated,
                    model: platform_model(platform),
                    model_class: platform_type.clone(),
                    platform: current.snapshot(),
                    sync: SyncRef { id: sync.id },
                };
                report.outcomes.push(self.deliver(Some(sync.id), target, &payload));
            }
        }
        tracing::info!(
            "platform broadcast: {} delivered, {} failed",
            report.delivered(),
            report.failed()
        );
        report
    }
}

/// Entity type tag under which platform records travel.
pub const PLATFORM_ENTITY_TYPE: &str = "Platform";

fn platform_model(platform: &Platform) -> FieldMap {
    let snapshot = platform.snapshot();
    let mut model = FieldMap::new();
    model.insert("id".into(), Value::from(snapshot.id.0));
    model.insert("name".into(), Value::String(snapshot.name));
    model.insert("domain".into(), Value::String(snapshot.domain));
    model
}
