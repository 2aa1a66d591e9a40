//! Watch router.
//!
//! The in-process stand-in for an external watch/work-queue framework: it
//! consumes store change events, maps each to the primary resources that must
//! be reconciled (directly, via owner references, or via the secret reverse
//! index), and dispatches to the engine with at most one in-flight reconcile
//! per key. Failed reconciles are re-queued with exponential backoff; events
//! arriving mid-reconcile mark the key dirty and it runs again.

use crate::error::ReconcileError;
use crate::reconcile::Engine;
use crate::store::ChangeEvent;
use crate::types::{ResourceKey, ResourceKind};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

type Request = (ResourceKind, ResourceKey);

pub struct WatchRouter {
    engine: Arc<Engine>,
}

impl WatchRouter {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    /// Primary resources affected by one change event.
    fn requests_for(&self, event: &ChangeEvent) -> Vec<Request> {
        match event {
            ChangeEvent::Primary { kind, key } => vec![(*kind, key.clone())],
            ChangeEvent::Owned { owner, .. } => vec![(owner.kind, owner.key.clone())],
            ChangeEvent::Secret { key } => self
                .engine
                .context()
                .state
                .secret_index
                .owners_of(key),
        }
    }

    /// Consume events until the store's watch stream closes.
    pub async fn run(self) {
        let mut events = self.engine.context().store.watch();
        let (requeue_tx, mut requeue_rx) = mpsc::unbounded_channel::<Request>();

        let mut inflight: HashSet<Request> = HashSet::new();
        let mut dirty: HashSet<Request> = HashSet::new();
        let mut failures: HashMap<Request, u32> = HashMap::new();
        let mut tasks: JoinSet<(Request, Result<(), ReconcileError>)> = JoinSet::new();

        info!("watch router started");
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(event) => {
                        for request in self.requests_for(&event) {
                            self.dispatch(request, &mut inflight, &mut dirty, &mut tasks);
                        }
                    }
                    Err(RecvError::Lagged(missed)) => {
                        // Dropped events mean unknown staleness; the next
                        // change to any affected resource re-converges it.
                        warn!(missed, "watch stream lagged");
                    }
                    Err(RecvError::Closed) => break,
                },
                Some(request) = requeue_rx.recv() => {
                    self.dispatch(request, &mut inflight, &mut dirty, &mut tasks);
                }
                Some(joined) = tasks.join_next() => {
                    let (request, result) = match joined {
                        Ok(done) => done,
                        Err(join_err) => {
                            warn!(error = %join_err, "reconcile task panicked");
                            continue;
                        }
                    };
                    inflight.remove(&request);
                    match result {
                        Ok(()) => {
                            failures.remove(&request);
                            if dirty.remove(&request) {
                                self.dispatch(request, &mut inflight, &mut dirty, &mut tasks);
                            }
                        }
                        Err(_) => {
                            dirty.remove(&request);
                            let count = failures.entry(request.clone()).or_insert(0);
                            *count += 1;
                            let delay = self
                                .engine
                                .context()
                                .state
                                .config
                                .requeue
                                .delay_for(*count);
                            debug!(kind = %request.0, key = %request.1, failures = *count, ?delay, "requeueing after failure");
                            let tx = requeue_tx.clone();
                            tokio::spawn(async move {
                                tokio::time::sleep(delay).await;
                                let _ = tx.send(request);
                            });
                        }
                    }
                }
            }
        }
        info!("watch router stopped");
    }

    fn dispatch(
        &self,
        request: Request,
        inflight: &mut HashSet<Request>,
        dirty: &mut HashSet<Request>,
        tasks: &mut JoinSet<(Request, Result<(), ReconcileError>)>,
    ) {
        if inflight.contains(&request) {
            // Serialized per key: remember the event, run again afterwards.
            dirty.insert(request);
            return;
        }
        inflight.insert(request.clone());
        let engine = Arc::clone(&self.engine);
        tasks.spawn(async move {
            let result = engine.reconcile(request.0, &request.1).await;
            (request, result)
        });
    }
}
