//! Webhook ingress: authenticate, verify, validate, enqueue.
//!
//! The gate is transport-agnostic; the daemon maps HTTP requests onto
//! [`IngressRequest`] and [`IngressError`] back onto 401/422 responses.

use std::time::Duration;

use serde_json::{json, Value};

use relay_core::{EntityType, EventType, FieldMap, Platform, SyncId};

use crate::context::SyncContext;
use crate::error::{IngressError, ValidationErrors};
use crate::jobs::{ApplyJob, Job, JobScheduler};
use crate::signature;

/// Path suffixes whose requests are authenticated by token alone.
pub const SIGNATURE_EXEMPT_PATHS: [&str; 5] = [
    "file-sync/chunk",
    "file-sync/finalize",
    "file-sync/check",
    "file-sync/size",
    "file-sync/hash",
];

/// Transport-neutral view of one inbound webhook call.
#[derive(Debug, Clone, Default)]
pub struct IngressRequest {
    pub path: String,
    /// Value of `Authorization: Bearer ...`.
    pub bearer_token: Option<String>,
    /// Value of `X-Platform-Token`.
    pub platform_token: Option<String>,
    /// Value of `X-Webhook-Signature`.
    pub signature: Option<String>,
    pub body: Vec<u8>,
}

/// Who a request authenticated as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Platform(Platform),
    /// Caller presented the shared sync token itself.
    SharedToken,
}

impl Identity {
    /// Platform half of the signing key.
    fn signing_token(&self) -> &str {
        match self {
            Identity::Platform(platform) => &platform.api_token,
            Identity::SharedToken => "",
        }
    }
}

pub fn is_signature_exempt(path: &str) -> bool {
    let path = path.trim_end_matches('/');
    SIGNATURE_EXEMPT_PATHS
        .iter()
        .any(|exempt| path.ends_with(exempt))
}

pub struct WebhookGate<'a> {
    ctx: &'a SyncContext,
}

impl<'a> WebhookGate<'a> {
    pub fn new(ctx: &'a SyncContext) -> Self {
        Self { ctx }
    }

    /// Resolve the caller from the bearer token or `X-Platform-Token`.
    pub fn identify(&self, request: &IngressRequest) -> Result<Identity, IngressError> {
        let candidates = [
            request.bearer_token.as_deref(),
            request.platform_token.as_deref(),
        ];
        let tokens = candidates
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|t| !t.is_empty());

        let mut shared = false;
        for token in tokens {
            if let Some(platform) = self.ctx.catalog.platform_by_token(token) {
                return Ok(Identity::Platform(platform.clone()));
            }
            if !self.ctx.settings.sync_token.is_empty() && token == self.ctx.settings.sync_token {
                shared = true;
            }
        }
        if shared {
            return Ok(Identity::SharedToken);
        }
        Err(IngressError::Authentication("invalid or missing token"))
    }

    /// Identity check followed by signature check (unless the path is exempt).
    pub fn authenticate(&self, request: &IngressRequest) -> Result<Identity, IngressError> {
        let identity = self.identify(request)?;
        if is_signature_exempt(&request.path) {
            return Ok(identity);
        }

        let Some(sig) = request.signature.as_deref() else {
            return Err(IngressError::Authentication("missing webhook signature"));
        };
        if !signature::verify(
            &request.body,
            sig,
            identity.signing_token(),
            &self.ctx.settings.sync_token,
        ) {
            return Err(IngressError::Authentication("invalid webhook signature"));
        }
        Ok(identity)
    }

    /// Check the payload shape and resolve it to an [`ApplyJob`].
    pub fn validate(&self, body: &[u8]) -> Result<ApplyJob, IngressError> {
        let mut errors = ValidationErrors::default();
        let document: Value = match serde_json::from_slice(body) {
            Ok(value) => value,
            Err(err) => {
                errors.add("body", format!("must be a JSON object: {err}"));
                return Err(IngressError::Validation(errors));
            }
        };
        let Some(object) = document.as_object() else {
            errors.add("body", "must be a JSON object");
            return Err(IngressError::Validation(errors));
        };

        let event_type = match object.get("event_type") {
            None | Some(Value::Null) => {
                errors.add("event_type", "is required");
                None
            }
            Some(Value::String(s)) => match s.parse::<EventType>() {
                Ok(kind) => Some(kind),
                Err(reason) => {
                    errors.add("event_type", reason);
                    None
                }
            },
            Some(_) => {
                errors.add("event_type", "must be a string");
                None
            }
        };

        let model = match object.get("model") {
            Some(Value::Object(map)) => Some(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect::<FieldMap>(),
            ),
            None | Some(Value::Null) => {
                errors.add("model", "is required");
                None
            }
            Some(_) => {
                errors.add("model", "must be an object");
                None
            }
        };

        let sync = match object.get("sync") {
            Some(Value::Object(sync)) => match sync.get("id").and_then(Value::as_u64) {
                Some(id) => match self.ctx.catalog.sync(SyncId(id)) {
                    Some(row) => Some(row),
                    None => {
                        errors.add("sync.id", format!("unknown sync configuration {id}"));
                        None
                    }
                },
                None => {
                    errors.add("sync.id", "is required and must be an integer");
                    None
                }
            },
            None | Some(Value::Null) => {
                errors.add("sync", "is required");
                None
            }
            Some(_) => {
                errors.add("sync", "must be an object");
                None
            }
        };

        if let (Some(row), Some(Value::String(class))) = (sync, object.get("model_class")) {
            if EntityType::from(class.as_str()) != row.source_entity_type {
                errors.add(
                    "model_class",
                    format!(
                        "'{class}' does not match sync configuration type '{}'",
                        row.source_entity_type
                    ),
                );
            }
        }

        match (event_type, model, sync) {
            (Some(event_type), Some(fields), Some(row)) if errors.is_empty() => Ok(ApplyJob {
                entity_type: row.source_entity_type.clone(),
                event_type,
                sync_id: row.id,
                fields,
            }),
            _ => Err(IngressError::Validation(errors)),
        }
    }

    /// Authenticate, validate and enqueue. Returns the success body; the
    /// apply itself runs later on the worker pool. A refused enqueue is an
    /// error so the sender does not record the delivery as done.
    pub fn accept(
        &self,
        request: &IngressRequest,
        scheduler: &dyn JobScheduler,
    ) -> Result<Value, IngressError> {
        let identity = self.authenticate(request)?;
        let job = self.validate(&request.body)?;

        let caller = match &identity {
            Identity::Platform(platform) => platform.name.as_str(),
            Identity::SharedToken => "shared token",
        };
        let label = format!("apply {} (sync {})", job.entity_type, job.sync_id);
        if let Err(err) = scheduler.schedule(Job::Apply(job), Duration::ZERO) {
            tracing::error!("could not enqueue {label} from {caller}: {err}");
            return Err(IngressError::Unavailable(err.to_string()));
        }
        tracing::debug!("accepted {label} from {caller}");
        Ok(success_body())
    }
}

pub fn success_body() -> Value {
    json!({ "status": "success" })
}
