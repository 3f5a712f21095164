//! Backend serving a heavyweight interpreter through one long-lived worker.
//!
//! The worker is bootstrapped once, lazily or through [`PersistentRuntimeBackend::warm_up`].
//! Every call is tagged with a fresh correlation id and parked in the pending
//! map until its reply arrives or its backup timer fires, whichever is first.
//! Replies are matched by id only, so they may come back in any order.
//! A worker that lets a backup timer expire is considered hung: it is killed
//! and the runtime moves to `Failed` until [`PersistentRuntimeBackend::reload`].

mod protocol;
mod worker;

pub use protocol::{WorkerMessage, WorkerReply, WorkerRequest};
pub use worker::{PythonWorkerSpawner, WorkerChannel, WorkerSpawner};

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::time;
use tracing::{debug, info, warn};

use crate::{
    config::RuntimeConfig,
    error::Error,
    executor::Backend,
    types::{BackendReadiness, RawOutcome},
};

type PendingMap = HashMap<u64, oneshot::Sender<WorkerReply>>;

/// Runs guest programs on the persistent interpreter worker
pub struct PersistentRuntimeBackend {
    inner: Arc<Inner>,
}

struct Inner {
    spawner: Arc<dyn WorkerSpawner>,
    bootstrap_deadline: Duration,
    safety_margin: Duration,
    readiness: watch::Sender<BackendReadiness>,
    worker: Mutex<Option<LiveWorker>>,
    pending: Mutex<PendingMap>,
    next_correlation_id: AtomicU64,
    generation: AtomicU64,
}

/// Handles to the worker currently serving calls
struct LiveWorker {
    generation: u64,
    outbound: mpsc::UnboundedSender<WorkerRequest>,
    // dropping this stops the worker
    _kill_switch: Option<oneshot::Sender<()>>,
}

impl PersistentRuntimeBackend {
    pub fn new(spawner: Arc<dyn WorkerSpawner>, config: &RuntimeConfig) -> Self {
        let (readiness, _) = watch::channel(BackendReadiness::NotLoaded);
        Self {
            inner: Arc::new(Inner {
                spawner,
                bootstrap_deadline: config.bootstrap_deadline(),
                safety_margin: config.safety_margin(),
                readiness,
                worker: Mutex::new(None),
                pending: Mutex::new(HashMap::new()),
                next_correlation_id: AtomicU64::new(1),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Current lifecycle state
    pub fn readiness(&self) -> BackendReadiness {
        self.inner.readiness.borrow().clone()
    }

    /// Start the bootstrap ahead of the first call. No-op unless `NotLoaded`.
    pub fn warm_up(&self) {
        Inner::begin_loading(&self.inner, false);
    }

    /// Retry a failed or hung runtime. Returns whether a new bootstrap was started.
    pub fn reload(&self) -> bool {
        Inner::begin_loading(&self.inner, true)
    }

    /// Wait until the runtime is either `Ready` or `Failed`
    pub async fn settled(&self) -> BackendReadiness {
        self.inner.settled().await
    }

    /// Number of calls waiting for a reply
    pub async fn pending_count(&self) -> usize {
        self.inner.pending.lock().await.len()
    }

    /// Generation and request sender of the worker serving calls
    async fn outbound(&self) -> Result<(u64, mpsc::UnboundedSender<WorkerRequest>), String> {
        Inner::begin_loading(&self.inner, false);
        match self.inner.settled().await {
            BackendReadiness::Ready => {}
            BackendReadiness::Failed { reason } => return Err(Error::Bootstrap(reason).to_string()),
            other => return Err(format!("runtime is {:?}", other)),
        }
        self.inner
            .worker
            .lock()
            .await
            .as_ref()
            .map(|worker| (worker.generation, worker.outbound.clone()))
            .ok_or_else(|| Error::Worker("no worker is running".to_string()).to_string())
    }
}

impl Inner {
    /// Move to `Loading` and spawn the bootstrap task. Only `NotLoaded`, and
    /// `Failed` when `retry` is set, may start a bootstrap.
    fn begin_loading(inner: &Arc<Inner>, retry: bool) -> bool {
        let started = inner.readiness.send_if_modified(|state| match state {
            BackendReadiness::NotLoaded => {
                *state = BackendReadiness::Loading;
                true
            }
            BackendReadiness::Failed { .. } if retry => {
                *state = BackendReadiness::Loading;
                true
            }
            _ => false,
        });

        if started {
            let generation = inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::spawn(Inner::bootstrap(Arc::clone(inner), generation));
        }
        started
    }

    async fn settled(&self) -> BackendReadiness {
        let mut receiver = self.readiness.subscribe();
        let settled = receiver
            .wait_for(|state| {
                matches!(state, BackendReadiness::Ready | BackendReadiness::Failed { .. })
            })
            .await;
        match settled {
            Ok(state) => state.clone(),
            Err(_) => BackendReadiness::Failed {
                reason: "runtime shut down".to_string(),
            },
        }
    }

    async fn bootstrap(inner: Arc<Inner>, generation: u64) {
        info!(generation, "bootstrapping interpreter runtime");
        let started = Instant::now();

        let bootstrap = spawn_until_ready(inner.spawner.as_ref());
        let channel = match time::timeout(inner.bootstrap_deadline, bootstrap).await {
            Ok(Ok(channel)) => channel,
            Ok(Err(e)) => {
                inner.fail(generation, e.to_string()).await;
                return;
            }
            Err(_) => {
                let reason = format!(
                    "bootstrap did not finish within {}ms",
                    inner.bootstrap_deadline.as_millis()
                );
                inner.fail(generation, reason).await;
                return;
            }
        };

        let WorkerChannel {
            outbound,
            inbound,
            kill_switch,
        } = channel;
        *inner.worker.lock().await = Some(LiveWorker {
            generation,
            outbound,
            _kill_switch: kill_switch,
        });
        tokio::spawn(route_replies(Arc::downgrade(&inner), generation, inbound));

        inner.readiness.send_replace(BackendReadiness::Ready);
        info!(
            generation,
            duration_ms = started.elapsed().as_millis() as u64,
            "interpreter runtime ready"
        );
    }

    /// Record a failure of `generation` and stop its worker. Stale
    /// generations are ignored and the first reason recorded is kept.
    async fn fail(&self, generation: u64, reason: String) {
        if self.generation.load(Ordering::SeqCst) != generation {
            debug!(generation, "ignoring failure of a stale worker");
            return;
        }

        {
            let mut worker = self.worker.lock().await;
            if worker.as_ref().map(|w| w.generation) == Some(generation) {
                *worker = None;
            }
        }
        let recorded = self.readiness.send_if_modified(|state| match state {
            BackendReadiness::Failed { .. } => false,
            _ => {
                *state = BackendReadiness::Failed {
                    reason: reason.clone(),
                };
                true
            }
        });
        if recorded {
            warn!(generation, %reason, "interpreter runtime failed");
        }

        // waiters see their sender dropped and resolve at once
        let drained = std::mem::take(&mut *self.pending.lock().await);
        if !drained.is_empty() {
            warn!(count = drained.len(), "failing executions pending on the lost worker");
        }
    }
}

/// Spawn a worker and wait for its ready signal
async fn spawn_until_ready(spawner: &dyn WorkerSpawner) -> Result<WorkerChannel, Error> {
    let mut channel = spawner.spawn().await?;
    loop {
        match channel.inbound.recv().await {
            Some(WorkerMessage::Ready) => return Ok(channel),
            Some(WorkerMessage::Reply(reply)) => debug!(
                correlation_id = reply.correlation_id,
                "ignoring reply received before ready"
            ),
            None => {
                return Err(Error::Worker(
                    "worker exited before signalling ready".to_string(),
                ))
            }
        }
    }
}

/// Deliver each reply to the call parked under its correlation id
async fn route_replies(
    inner: Weak<Inner>,
    generation: u64,
    mut inbound: mpsc::UnboundedReceiver<WorkerMessage>,
) {
    while let Some(message) = inbound.recv().await {
        let Some(shared) = inner.upgrade() else {
            return;
        };
        match message {
            WorkerMessage::Reply(reply) => {
                let correlation_id = reply.correlation_id;
                let waiter = shared.pending.lock().await.remove(&correlation_id);
                let delivered = match waiter {
                    Some(waiter) => waiter.send(reply).is_ok(),
                    None => false,
                };
                if !delivered {
                    debug!(correlation_id, "discarding late worker reply");
                }
            }
            WorkerMessage::Ready => debug!(generation, "ignoring repeated ready signal"),
        }
    }

    if let Some(shared) = inner.upgrade() {
        shared
            .fail(generation, "worker exited unexpectedly".to_string())
            .await;
    }
}

#[async_trait]
impl Backend for PersistentRuntimeBackend {
    fn name(&self) -> &'static str {
        "persistent"
    }

    async fn run(&self, source: &str, _stdin: Option<&str>, time_limit: Duration) -> RawOutcome {
        let started = Instant::now();
        let limit_ms = time_limit.as_millis() as u64;

        let (generation, outbound) = match self.outbound().await {
            Ok(worker) => worker,
            Err(reason) => {
                return RawOutcome::Unavailable {
                    reason,
                    duration_ms: started.elapsed().as_millis() as u64,
                }
            }
        };

        let correlation_id = self
            .inner
            .next_correlation_id
            .fetch_add(1, Ordering::SeqCst);
        let (resolver, reply) = oneshot::channel();
        self.inner
            .pending
            .lock()
            .await
            .insert(correlation_id, resolver);

        let request = WorkerRequest {
            correlation_id,
            source_text: source.to_string(),
            time_limit_ms: limit_ms,
        };
        if outbound.send(request).is_err() {
            self.inner.pending.lock().await.remove(&correlation_id);
            return RawOutcome::Unavailable {
                reason: Error::Worker("worker is not accepting requests".to_string()).to_string(),
                duration_ms: started.elapsed().as_millis() as u64,
            };
        }
        debug!(correlation_id, limit_ms, "request sent to worker");

        let backup = time_limit + self.inner.safety_margin;
        let outcome = time::timeout(backup, reply).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(Ok(reply)) => RawOutcome::Process {
                stdout: reply.stdout,
                stderr: reply.stderr,
                exit_code: reply.exit_code,
                duration_ms,
            },
            Ok(Err(_)) => RawOutcome::Unavailable {
                reason: Error::Worker("worker exited before replying".to_string()).to_string(),
                duration_ms,
            },
            Err(_) => {
                // first settlement wins; a reply arriving later finds no entry
                let unanswered = self
                    .inner
                    .pending
                    .lock()
                    .await
                    .remove(&correlation_id)
                    .is_some();
                // a worker that answered in the meantime is not hung
                if unanswered {
                    warn!(correlation_id, generation, "backup timer fired, stopping hung worker");
                    let reason = format!(
                        "worker did not answer request {} within {}ms",
                        correlation_id,
                        backup.as_millis()
                    );
                    self.inner.fail(generation, reason).await;
                }
                RawOutcome::TimedOut {
                    limit_ms,
                    duration_ms,
                }
            }
        }
    }
}
