//! # relay-sync
//!
//! Outbound change propagation and inbound webhook application.
//!
//! Outbound: a [`MutationEvent`](relay_core::MutationEvent) published on the
//! [`EventBus`] reaches [`ChangeCapture`], which schedules a [`PrepareJob`];
//! the [`Preparer`] reloads, transforms and signs one webhook per target.
//!
//! Inbound: the [`WebhookGate`] authenticates and validates a request and
//! schedules an [`ApplyJob`]; the [`ApplyEngine`] merges it into local storage
//! in one transaction.

pub mod apply;
pub mod capture;
pub mod context;
pub mod error;
pub mod ingress;
pub mod jobs;
pub mod platforms;
pub mod prepare;
pub mod signature;
pub mod transformer;

pub use apply::ApplyEngine;
pub use capture::{ChangeCapture, EventBus};
pub use context::SyncContext;
pub use error::{DeliveryError, IngressError, SyncError, ValidationErrors};
pub use ingress::{Identity, IngressRequest, WebhookGate};
pub use jobs::{ApplyJob, Job, JobScheduler, PrepareJob};
pub use platforms::PlatformRelations;
pub use prepare::{
    DeliveryOutcome, DeliveryReport, DeliveryStatus, Preparer, UreqTransport, WebhookRequest,
    WebhookTransport,
};
pub use transformer::{AllFields, EntityView, MetaProjection, Transformer, TransformerRegistry};
