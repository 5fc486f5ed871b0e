use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};

use relay_core::{Catalog, MainRecord, MemoryStore, SchemaRegistry, Store, SyncSettings};
use relay_sync::{
    ApplyEngine, ChangeCapture, DeliveryReport, EventBus, Job, Preparer,
    SyncContext, SyncError, TransformerRegistry, UreqTransport, WebhookTransport,
};

use crate::error::{io_err, DaemonError};
use crate::http;
use crate::scheduler::{retry_backoff, QueuedJob, TokioScheduler};

/// Everything a job needs to run.
#[derive(Clone)]
pub struct Services {
    pub ctx: Arc<SyncContext>,
    pub store: Arc<dyn Store>,
    pub transport: Arc<dyn WebhookTransport>,
}

impl Services {
    /// Load settings, catalog and schema from `<home>/.relay/`, with the
    /// in-memory store and the HTTP transport.
    pub fn load(home: &Path) -> Result<Self, DaemonError> {
        let settings = SyncSettings::load_at(home)?;
        let catalog = Catalog::load_at(home)?;
        let schema = SchemaRegistry::load_at(home)?;
        tracing::info!(
            host = %settings.host,
            platforms = catalog.platforms.len(),
            syncs = catalog.syncs.len(),
            entity_types = schema.entity_types().count(),
            "loaded relay configuration",
        );
        Ok(Self {
            ctx: Arc::new(SyncContext::new(
                settings,
                catalog,
                schema,
                TransformerRegistry::new(),
            )),
            store: Arc::new(MemoryStore::new()),
            transport: Arc::new(UreqTransport::default()),
        })
    }
}

/// Result of one finished job.
#[derive(Debug)]
pub enum JobOutcome {
    Delivered(DeliveryReport),
    Applied(MainRecord),
}

/// Job runtime plus webhook listener.
///
/// Embedders publish local mutations on [`Runtime::bus`] before calling
/// [`Runtime::run_until`].
pub struct Runtime {
    services: Services,
    scheduler: Arc<TokioScheduler>,
    queue: mpsc::UnboundedReceiver<QueuedJob>,
    bus: Arc<EventBus>,
}

impl Runtime {
    /// Build the queue and register change capture. Must be called from
    /// within a tokio runtime.
    pub fn new(services: Services) -> Result<Self, DaemonError> {
        let (scheduler, queue) = TokioScheduler::new()?;
        let scheduler = Arc::new(scheduler);

        let mut bus = EventBus::new();
        let capture = Arc::new(ChangeCapture::new(
            Arc::clone(&services.ctx),
            scheduler.clone(),
        ));
        capture.register(&mut bus);

        Ok(Self {
            services,
            scheduler,
            queue,
            bus: Arc::new(bus),
        })
    }

    /// Event bus local mutations are published on.
    pub fn bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.bus)
    }

    pub fn scheduler(&self) -> Arc<TokioScheduler> {
        Arc::clone(&self.scheduler)
    }

    /// Serve webhooks and run jobs until `shutdown` resolves or a task fails.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), DaemonError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listen = self.services.ctx.settings.listen.clone();
        let listener = TcpListener::bind(&listen)
            .await
            .map_err(|e| io_err(format!("bind {listen}"), e))?;
        tracing::info!(
            listen = %listen,
            path = %self.services.ctx.settings.webhook_path,
            "webhook listener ready",
        );
        self.serve(listener, shutdown).await
    }

    /// [`Self::run_until`] on an already bound listener.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<(), DaemonError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Runtime {
            services,
            scheduler,
            queue,
            bus: _,
        } = self;
        let services = Arc::new(services);
        let (shutdown_tx, _) = broadcast::channel::<()>(16);

        let worker_handle = {
            let shutdown = shutdown_tx.clone();
            let services = Arc::clone(&services);
            let scheduler = Arc::clone(&scheduler);
            tokio::spawn(async move {
                let result = worker_task(services, scheduler, queue, shutdown.subscribe()).await;
                let _ = shutdown.send(());
                result
            })
        };

        let http_handle = {
            let shutdown = shutdown_tx.clone();
            let app = http::router(Arc::clone(&services.ctx), scheduler.clone());
            let mut shutdown_rx = shutdown.subscribe();
            tokio::spawn(async move {
                let result = axum::serve(listener, app)
                    .with_graceful_shutdown(async move {
                        let _ = shutdown_rx.recv().await;
                    })
                    .await
                    .map_err(|e| io_err("webhook listener", e));
                let _ = shutdown.send(());
                result
            })
        };

        let signal_handle = {
            let stop = shutdown_tx.clone();
            tokio::spawn(async move {
                let mut shutdown_rx = stop.subscribe();
                tokio::select! {
                    _ = shutdown_rx.recv() => {}
                    _ = shutdown => {
                        tracing::info!("shutdown requested, stopping relay daemon");
                        let _ = stop.send(());
                    }
                }
                Ok(())
            })
        };

        let (worker_result, http_result, signal_result) =
            tokio::join!(worker_handle, http_handle, signal_handle);

        handle_join("worker", worker_result)?;
        handle_join("webhook_listener", http_result)?;
        handle_join("signal_handler", signal_result)?;
        Ok(())
    }
}

/// Start the daemon and block the current thread until it exits.
pub fn start_blocking(home: &Path) -> Result<(), DaemonError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio runtime", e))?;
    runtime.block_on(run(home.to_path_buf()))
}

/// Load configuration from `home` and run until ctrl-c.
pub async fn run(home: PathBuf) -> Result<(), DaemonError> {
    let services = tokio::task::spawn_blocking(move || Services::load(&home))
        .await
        .map_err(|err| DaemonError::Task(format!("configuration load join error: {err}")))??;

    Runtime::new(services)?
        .run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %err, "ctrl-c handler failed");
            }
        })
        .await
}

async fn worker_task(
    services: Arc<Services>,
    scheduler: Arc<TokioScheduler>,
    mut queue: mpsc::UnboundedReceiver<QueuedJob>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            next = queue.recv() => {
                let Some(queued) = next else { break };
                let services = Arc::clone(&services);
                let scheduler = Arc::clone(&scheduler);
                // Jobs are independent; no ordering between them.
                tokio::spawn(process(services, scheduler, queued));
            }
        }
    }
    Ok(())
}

/// Run one job on the blocking pool; requeue failed applies that may succeed
/// later.
pub(crate) async fn process(
    services: Arc<Services>,
    scheduler: Arc<TokioScheduler>,
    queued: QueuedJob,
) {
    let label = queued.job.label();
    let attempt = queued.attempt;
    let job = queued.job.clone();
    let worker_services = Arc::clone(&services);
    let result = tokio::task::spawn_blocking(move || execute(&worker_services, &job)).await;

    match result {
        Err(err) => tracing::error!(job = %label, error = %err, "job task panicked"),
        Ok(Ok(JobOutcome::Delivered(report))) => tracing::info!(
            job = %label,
            delivered = report.delivered(),
            failed = report.failed(),
            "preparation finished",
        ),
        Ok(Ok(JobOutcome::Applied(record))) => tracing::info!(
            job = %label,
            entity_type = %record.entity_type,
            attempt,
            "apply finished",
        ),
        Ok(Err(err)) => {
            let max_attempts = services.ctx.settings.apply_max_attempts;
            let retryable = matches!(queued.job, Job::Apply(_)) && err.is_retryable();
            if retryable && attempt < max_attempts {
                let delay = retry_backoff(attempt);
                tracing::warn!(
                    job = %label,
                    error = %err,
                    attempt,
                    retry_in_ms = delay.as_millis() as u64,
                    "job failed, retrying",
                );
                let retry = QueuedJob {
                    job: queued.job,
                    attempt: attempt + 1,
                };
                if let Err(err) = scheduler.enqueue(retry, delay) {
                    tracing::error!(job = %label, error = %err, "could not requeue job");
                }
            } else {
                tracing::error!(job = %label, error = %err, attempt, "job failed");
            }
        }
    }
}

/// Synchronous body of a job.
pub fn execute(services: &Services, job: &Job) -> Result<JobOutcome, SyncError> {
    match job {
        Job::Prepare(prepare) => {
            let preparer = Preparer::new(
                &services.ctx,
                services.store.as_ref(),
                services.transport.as_ref(),
            );
            preparer.run(prepare).map(JobOutcome::Delivered)
        }
        Job::Apply(apply) => ApplyEngine::new(&services.ctx.schema, services.store.as_ref())
            .apply(&apply.entity_type, apply.fields.clone())
            .map(JobOutcome::Applied),
    }
}

fn handle_join(
    name: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Task(format!("{name} task join error: {err}"))),
    }
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use relay_core::{
        EntityRef, EntitySchema, EntityType, EventType, FieldMap, MetaRecord,
        ModelPlatformAssociation, MutationEvent, PlatformId, StoreError, SyncId, Transaction,
    };
    use relay_sync::error::DeliveryError;
    use relay_sync::{ApplyJob, WebhookRequest};
    use serde_json::json;

    struct UnavailableStore;

    impl Store for UnavailableStore {
        fn begin(&self) -> Result<Box<dyn Transaction + '_>, StoreError> {
            Err(StoreError::Backend("database unavailable".into()))
        }

        fn find_main(
            &self,
            _table: &EntityType,
            _key: &str,
        ) -> Result<Option<MainRecord>, StoreError> {
            Ok(None)
        }

        fn meta_for(&self, _table: &str, _owner: &str) -> Result<Vec<MetaRecord>, StoreError> {
            Ok(Vec::new())
        }

        fn associations_for(
            &self,
            _entity: &EntityRef,
        ) -> Result<Vec<ModelPlatformAssociation>, StoreError> {
            Ok(Vec::new())
        }
    }

    #[derive(Default)]
    struct RecordingTransport(Mutex<Vec<WebhookRequest>>);

    impl WebhookTransport for RecordingTransport {
        fn post(&self, request: &WebhookRequest) -> Result<u16, DeliveryError> {
            self.0.lock().expect("lock").push(request.clone());
            Ok(200)
        }
    }

    fn schema() -> SchemaRegistry {
        SchemaRegistry::new().with(
            "User",
            EntitySchema {
                key_field: "id".into(),
                main_fields: vec!["id".into(), "user_login".into()],
                meta_table: "user_meta".into(),
                meta_foreign_key: "user_id".into(),
                date_fields: Vec::new(),
                specialization: None,
            },
        )
    }

    fn services(store: Arc<dyn Store>, transport: Arc<dyn WebhookTransport>) -> Services {
        let mut catalog = Catalog::default();
        catalog.add_platform("a", "a.test", "tok-a").expect("add");
        catalog.add_platform("b", "b.test", "tok-b").expect("add");
        catalog
            .add_sync(PlatformId(1), EntityType::from("User"), PlatformId(2))
            .expect("sync");
        let mut settings = SyncSettings::new("a.test", "shared");
        settings.capture_delay_secs = 5;
        Services {
            ctx: Arc::new(SyncContext::new(
                settings,
                catalog,
                schema(),
                TransformerRegistry::new(),
            )),
            store,
            transport,
        }
    }

    fn apply_job() -> Job {
        let mut fields = FieldMap::new();
        fields.insert("id".into(), json!(3));
        fields.insert("user_login".into(), json!("ada"));
        Job::Apply(ApplyJob {
            entity_type: EntityType::from("User"),
            event_type: EventType::Created,
            sync_id: SyncId(1),
            fields,
        })
    }

    #[test]
    fn services_load_from_relay_home() {
        let home = tempfile::TempDir::new().expect("home");
        SyncSettings::new("a.test", "shared")
            .save_at(home.path())
            .expect("save settings");
        schema().save_at(home.path()).expect("save schema");

        let services = Services::load(home.path()).expect("load");
        assert!(services.ctx.catalog.platforms.is_empty());
        assert!(services.ctx.current_platform.is_none());
        assert!(services.ctx.schema.contains(&EntityType::from("User")));
    }

    #[test]
    fn services_require_settings() {
        let home = tempfile::TempDir::new().expect("home");
        assert!(matches!(
            Services::load(home.path()),
            Err(DaemonError::Core(_))
        ));
    }

    #[test]
    fn execute_applies_into_the_store() {
        let store = Arc::new(MemoryStore::new());
        let services = services(store.clone(), Arc::new(RecordingTransport::default()));

        let outcome = execute(&services, &apply_job()).expect("execute");
        assert!(matches!(outcome, JobOutcome::Applied(_)));
        assert!(store
            .find_main(&EntityType::from("User"), "3")
            .expect("find")
            .is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_apply_is_requeued_with_backoff() {
        let services = Arc::new(services(
            Arc::new(UnavailableStore),
            Arc::new(RecordingTransport::default()),
        ));
        let (scheduler, mut queue) = TokioScheduler::new().expect("scheduler");
        let scheduler = Arc::new(scheduler);

        process(
            Arc::clone(&services),
            Arc::clone(&scheduler),
            QueuedJob {
                job: apply_job(),
                attempt: 1,
            },
        )
        .await;

        let retry = queue.recv().await.expect("retry");
        assert_eq!(retry.attempt, 2);

        // Last allowed attempt: no further retry.
        process(
            services,
            Arc::clone(&scheduler),
            QueuedJob {
                job: apply_job(),
                attempt: 3,
            },
        )
        .await;
        tokio::time::advance(Duration::from_secs(120)).await;
        assert!(queue.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn published_mutation_is_delivered_after_capture_delay() {
        let store = Arc::new(MemoryStore::new());
        let transport = Arc::new(RecordingTransport::default());
        let services = services(store.clone(), transport.clone());
        execute(&services, &apply_job()).expect("seed");

        let runtime = Runtime::new(services.clone()).expect("runtime");
        let bus = runtime.bus();
        let Runtime {
            scheduler, mut queue, ..
        } = runtime;

        bus.publish(&MutationEvent::new("User", json!(3), EventType::Updated));
        assert!(queue.try_recv().is_err());

        let queued = queue.recv().await.expect("prepare job");
        assert!(matches!(queued.job, Job::Prepare(_)));
        process(Arc::new(services), scheduler, queued).await;

        let sent = transport.0.lock().expect("lock");
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].url, "https://b.test/sync-webhook");
    }
}
