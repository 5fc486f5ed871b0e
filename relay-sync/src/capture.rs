//! Change capture: typed mutation events → deferred preparation jobs.
//!
//! Publishers emit [`MutationEvent`]s on an [`EventBus`]. [`ChangeCapture`]
//! subscribes once at startup for every entity type the current platform
//! syncs, and turns each event into a [`PrepareJob`] scheduled after the
//! capture delay. Capture never fails the mutation that triggered it.

use std::collections::HashMap;
use std::sync::Arc;

use relay_core::{EntityType, MutationEvent};

use crate::context::SyncContext;
use crate::jobs::{Job, JobScheduler, PrepareJob};

type Handler = Box<dyn Fn(&MutationEvent) + Send + Sync>;

/// Entity type → subscribers. Built at startup, then shared read-only.
#[derive(Default)]
pub struct EventBus {
    subscribers: HashMap<EntityType, Vec<Handler>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&mut self, entity_type: EntityType, handler: F)
    where
        F: Fn(&MutationEvent) + Send + Sync + 'static,
    {
        self.subscribers
            .entry(entity_type)
            .or_default()
            .push(Box::new(handler));
    }

    /// Deliver `event` to every subscriber of its entity type; returns how many
    /// handlers ran.
    pub fn publish(&self, event: &MutationEvent) -> usize {
        let Some(handlers) = self.subscribers.get(&event.entity_type) else {
            return 0;
        };
        for handler in handlers {
            handler(event);
        }
        handlers.len()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("entity_types", &self.subscribers.keys().collect::<Vec<_>>())
            .finish()
    }
}

pub struct ChangeCapture {
    ctx: Arc<SyncContext>,
    scheduler: Arc<dyn JobScheduler>,
}

impl ChangeCapture {
    pub fn new(ctx: Arc<SyncContext>, scheduler: Arc<dyn JobScheduler>) -> Self {
        Self { ctx, scheduler }
    }

    /// Subscribe to every entity type the current platform is a sync source
    /// for. Returns the subscribed types; empty when no platform is resolved.
    pub fn register(self: Arc<Self>, bus: &mut EventBus) -> Vec<EntityType> {
        let Some(platform) = &self.ctx.current_platform else {
            tracing::debug!("no listeners registered: current platform not set");
            return Vec::new();
        };

        let mut types: Vec<EntityType> = self
            .ctx
            .catalog
            .syncs_from(platform.id)
            .map(|s| s.source_entity_type.clone())
            .collect();
        types.sort();
        types.dedup();

        for entity_type in &types {
            let capture = Arc::clone(&self);
            bus.subscribe(entity_type.clone(), move |event| capture.on_mutation(event));
        }
        tracing::info!(
            "listening for mutations of {} entity type(s) on platform #{}",
            types.len(),
            platform.id
        );
        types
    }

    /// Schedule preparation of `event`. Never fails; problems are logged.
    pub fn on_mutation(&self, event: &MutationEvent) {
        let Some(platform) = &self.ctx.current_platform else {
            tracing::debug!(
                "{} {} ignored: current platform not set",
                event.entity_type,
                event.kind
            );
            return;
        };

        let syncs = self.ctx.catalog.syncs_for(platform.id, &event.entity_type);
        if syncs.is_empty() {
            return;
        }

        let delay = self.ctx.settings.capture_delay()
            + self.ctx.transformers.delay_for(&event.entity_type);
        let job = Job::Prepare(PrepareJob {
            entity_key: event.key.clone(),
            entity_type: event.entity_type.clone(),
            event_type: event.kind,
            source_platform_id: platform.id,
            sync_configurations: syncs,
        });
        let label = job.label();

        match self.scheduler.schedule(job, delay) {
            Ok(()) => tracing::debug!("scheduled {label} in {}ms", delay.as_millis()),
            Err(err) => tracing::warn!("could not schedule {label}: {err}"),
        }
    }
}
