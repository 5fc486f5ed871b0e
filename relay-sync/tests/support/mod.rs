//! Fixtures shared by the relay-sync integration tests.
#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;
use std::time::Duration;

use relay_core::{
    Catalog, DateField, EntityRef, EntitySchema, EntityType, FieldMap, MainRecord, MetaRecord,
    ModelPlatformAssociation, PlatformId, SchemaRegistry, Specialization, Store, StoreError,
    SyncSettings, Transaction,
};
use relay_sync::error::DeliveryError;
use relay_sync::{Job, JobScheduler, SyncError, WebhookRequest, WebhookTransport};

pub const SHARED_TOKEN: &str = "shared-secret";

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn fields(value: serde_json::Value) -> FieldMap {
    match value {
        serde_json::Value::Object(map) => map.into_iter().collect(),
        other => panic!("expected object, got {other}"),
    }
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

pub fn schema() -> SchemaRegistry {
    let user = EntitySchema {
        key_field: "id".into(),
        main_fields: names(&["id", "user_login", "user_email", "user_registered"]),
        meta_table: "user_meta".into(),
        meta_foreign_key: "user_id".into(),
        date_fields: vec![DateField {
            name: "user_registered".into(),
            default_now: true,
        }],
        specialization: None,
    };
    let post = EntitySchema {
        key_field: "ID".into(),
        main_fields: names(&["ID", "post_title", "post_type", "post_date"]),
        meta_table: "post_meta".into(),
        meta_foreign_key: "post_id".into(),
        date_fields: vec![DateField {
            name: "post_date".into(),
            default_now: false,
        }],
        specialization: Some(Specialization {
            field: "post_type".into(),
            variants: BTreeMap::from([("page".to_string(), EntityType::from("Page"))]),
        }),
    };
    let page = EntitySchema {
        meta_table: "page_meta".into(),
        meta_foreign_key: "page_id".into(),
        specialization: None,
        ..post.clone()
    };
    SchemaRegistry::new()
        .with("User", user)
        .with("Post", post)
        .with("Page", page)
}

/// Platforms a, b, c; `User` syncs from a to b and from a to c.
pub fn catalog() -> Catalog {
    let mut catalog = Catalog::default();
    for name in ["a", "b", "c"] {
        catalog
            .add_platform(name, format!("{name}.test"), format!("tok-{name}"))
            .expect("add platform");
    }
    for target in [2, 3] {
        catalog
            .add_sync(PlatformId(1), EntityType::from("User"), PlatformId(target))
            .expect("add sync");
    }
    catalog
}

pub fn settings(host: &str) -> SyncSettings {
    SyncSettings::new(host, SHARED_TOKEN)
}

// ---------------------------------------------------------------------------
// Scheduler and transport doubles
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingScheduler {
    pub jobs: Mutex<Vec<(Job, Duration)>>,
}

impl RecordingScheduler {
    pub fn take(&self) -> Vec<(Job, Duration)> {
        std::mem::take(&mut *self.jobs.lock().expect("lock"))
    }
}

impl JobScheduler for RecordingScheduler {
    fn schedule(&self, job: Job, delay: Duration) -> Result<(), SyncError> {
        self.jobs.lock().expect("lock").push((job, delay));
        Ok(())
    }
}

/// Scheduler whose queue is gone; every `schedule` call fails.
pub struct ClosedScheduler;

impl JobScheduler for ClosedScheduler {
    fn schedule(&self, _job: Job, _delay: Duration) -> Result<(), SyncError> {
        Err(SyncError::Scheduler("job queue closed".to_string()))
    }
}

/// Records every request; answers 500 for URLs containing a failing host.
#[derive(Default)]
pub struct RecordingTransport {
    pub requests: Mutex<Vec<WebhookRequest>>,
    pub failing_hosts: BTreeSet<String>,
}

impl RecordingTransport {
    pub fn failing(hosts: &[&str]) -> Self {
        Self {
            requests: Mutex::default(),
            failing_hosts: hosts.iter().map(|h| h.to_string()).collect(),
        }
    }

    pub fn sent(&self) -> Vec<WebhookRequest> {
        self.requests.lock().expect("lock").clone()
    }
}

impl WebhookTransport for RecordingTransport {
    fn post(&self, request: &WebhookRequest) -> Result<u16, DeliveryError> {
        self.requests.lock().expect("lock").push(request.clone());
        if self.failing_hosts.iter().any(|h| request.url.contains(h)) {
            return Err(DeliveryError::Status {
                status: 500,
                body: "boom".into(),
            });
        }
        Ok(200)
    }
}

// ---------------------------------------------------------------------------
// Store whose meta writes fail
// ---------------------------------------------------------------------------

pub struct FailingMetaStore<S> {
    pub inner: S,
}

struct FailingMetaTransaction<'a> {
    inner: Box<dyn Transaction + 'a>,
}

impl<S: Store> Store for FailingMetaStore<S> {
    fn begin(&self) -> Result<Box<dyn Transaction + '_>, StoreError> {
        Ok(Box::new(FailingMetaTransaction {
            inner: self.inner.begin()?,
        }))
    }

    fn find_main(&self, table: &EntityType, key: &str) -> Result<Option<MainRecord>, StoreError> {
        self.inner.find_main(table, key)
    }

    fn meta_for(&self, meta_table: &str, owner_key: &str) -> Result<Vec<MetaRecord>, StoreError> {
        self.inner.meta_for(meta_table, owner_key)
    }

    fn associations_for(
        &self,
        entity: &EntityRef,
    ) -> Result<Vec<ModelPlatformAssociation>, StoreError> {
        self.inner.associations_for(entity)
    }
}

impl Transaction for FailingMetaTransaction<'_> {
    fn find_main(
        &mut self,
        table: &EntityType,
        key: &str,
    ) -> Result<Option<MainRecord>, StoreError> {
        self.inner.find_main(table, key)
    }

    fn write_main(
        &mut self,
        table: &EntityType,
        key: &str,
        entity_type: &EntityType,
        fields: &FieldMap,
    ) -> Result<(), StoreError> {
        self.inner.write_main(table, key, entity_type, fields)
    }

    fn upsert_meta(&mut self, _meta: MetaRecord) -> Result<(), StoreError> {
        Err(StoreError::Backend("meta table unavailable".into()))
    }

    fn delete_associations(&mut self, entity: &EntityRef) -> Result<usize, StoreError> {
        self.inner.delete_associations(entity)
    }

    fn delete_association(
        &mut self,
        entity: &EntityRef,
        platform_id: PlatformId,
    ) -> Result<bool, StoreError> {
        self.inner.delete_association(entity, platform_id)
    }

    fn upsert_association(&mut self, row: ModelPlatformAssociation) -> Result<(), StoreError> {
        self.inner.upsert_association(row)
    }

    fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.inner.commit()
    }
}
