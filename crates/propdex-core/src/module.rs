//! A module's published index and the background pass that replaces it.

use crate::metrics::{Metrics, PassResult};
use crate::pass::{IndexPass, PassOutcome};
use crate::snapshot::IndexSnapshot;
use crate::CoreError;
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use propdex_indexer::{ClassGraphCache, SourceDiscovery};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{oneshot, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use uuid::Uuid;

/// The running pass of a module.
struct InFlight {
    id: Uuid,
    token: CancellationToken,
}

/// Index of one module.
///
/// Readers load the current snapshot without locking. Exactly one pass may
/// publish at a time: starting a pass cancels the one in flight, and a pass
/// only publishes while it is still the registered one.
pub struct ModuleIndex {
    id: String,
    discovery: Arc<dyn SourceDiscovery>,
    type_catalogs: Vec<PathBuf>,
    snapshot: ArcSwap<IndexSnapshot>,
    cache: ClassGraphCache,
    in_flight: Mutex<Option<InFlight>>,
    idle: Notify,
    metrics: Arc<Metrics>,
}

impl ModuleIndex {
    pub(crate) fn new(
        id: String,
        discovery: Arc<dyn SourceDiscovery>,
        type_catalogs: Vec<PathBuf>,
        cache_capacity: usize,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            id,
            discovery,
            type_catalogs,
            snapshot: ArcSwap::from_pointee(IndexSnapshot::default()),
            cache: ClassGraphCache::new(cache_capacity),
            in_flight: Mutex::new(None),
            idle: Notify::new(),
            metrics,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The currently published generation.
    pub fn snapshot(&self) -> Arc<IndexSnapshot> {
        self.snapshot.load_full()
    }

    pub fn cache(&self) -> &ClassGraphCache {
        &self.cache
    }

    pub fn is_indexing(&self) -> bool {
        self.in_flight.lock().is_some()
    }

    /// Start a pass, superseding any pass in flight.
    ///
    /// Must be called within a tokio runtime.
    pub fn start_pass(self: &Arc<Self>) -> oneshot::Receiver<Result<PassOutcome, CoreError>> {
        let pass_id = Uuid::new_v4();
        let token = CancellationToken::new();

        if let Some(previous) = self.in_flight.lock().replace(InFlight {
            id: pass_id,
            token: token.clone(),
        }) {
            debug!(module = %self.id, pass = %previous.id, "Superseding pass in flight");
            previous.token.cancel();
        }

        let (tx, rx) = oneshot::channel();
        let module = Arc::clone(self);
        tokio::spawn(async move {
            let worker = Arc::clone(&module);
            let worker_token = token.clone();
            let built = tokio::task::spawn_blocking(move || {
                let base = worker.snapshot();
                IndexPass {
                    module: &worker.id,
                    base: &base,
                    discovery: worker.discovery.as_ref(),
                    type_catalogs: &worker.type_catalogs,
                    token: &worker_token,
                }
                .run()
            })
            .await;

            let outcome = module.finish_pass(pass_id, &token, built);
            // The requester may not be waiting
            let _ = tx.send(outcome);
        });

        info!(module = %self.id, pass = %pass_id, "Index pass started");
        rx
    }

    /// Publish a finished pass if it is still current.
    fn finish_pass(
        &self,
        pass_id: Uuid,
        token: &CancellationToken,
        built: Result<Result<Option<IndexSnapshot>, CoreError>, tokio::task::JoinError>,
    ) -> Result<PassOutcome, CoreError> {
        let mut in_flight = self.in_flight.lock();
        let current = in_flight.as_ref().is_some_and(|f| f.id == pass_id);

        let outcome = match built.map_err(CoreError::from).and_then(|r| r) {
            Ok(Some(snapshot)) if current && !token.is_cancelled() => {
                let stats = snapshot.stats;
                let generation = snapshot.generation;
                self.snapshot.store(Arc::new(snapshot));
                let retired = self.cache.retire_before(generation);
                debug!(module = %self.id, generation, retired, "Published snapshot");
                self.metrics.record_pass(PassResult::Committed);
                Ok(PassOutcome::Committed(stats))
            }
            Ok(_) => {
                debug!(module = %self.id, pass = %pass_id, "Pass superseded");
                self.metrics.record_pass(PassResult::Superseded);
                Ok(PassOutcome::Superseded)
            }
            Err(e) => {
                error!(module = %self.id, pass = %pass_id, error = %e, "Index pass failed");
                self.metrics.record_pass(PassResult::Failed);
                Err(e)
            }
        };

        if current {
            *in_flight = None;
            self.idle.notify_waiters();
        }
        outcome
    }

    /// Cancel the pass in flight, if any.
    pub fn cancel(&self) {
        if let Some(in_flight) = self.in_flight.lock().as_ref() {
            in_flight.token.cancel();
        }
    }

    /// Wait until no pass is in flight.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if !self.is_indexing() {
                return;
            }
            notified.await;
        }
    }
}
