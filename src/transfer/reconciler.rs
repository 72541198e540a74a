//! Event Reconciler
//!
//! Background task that keeps the [`TransferRegistry`] in step with the engine.
//! Two sources feed it: the push event stream and a periodic full poll. The
//! poll only runs while the transfer view is visible; on becoming visible
//! again one poll runs immediately and the period restarts.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

use crate::config::SyncConfig;
use crate::engine::{EngineEvent, JobEngine};
use crate::error::Result;

use super::reconcile::{admit_push, merge_progress, plan_poll, Visibility};
use super::registry::TransferRegistry;
use super::types::JobProgress;

pub struct EventReconciler {
    registry: Arc<TransferRegistry>,
    engine: Arc<dyn JobEngine>,
    poll_interval: Duration,
    visibility: watch::Sender<Visibility>,
    poll_signal: Notify,
    /// Set by poll requests, cleared by any poll that starts afterwards
    poll_pending: AtomicBool,
    last_error: Mutex<Option<String>>,
}

impl EventReconciler {
    pub fn new(
        registry: Arc<TransferRegistry>,
        engine: Arc<dyn JobEngine>,
        config: &SyncConfig,
    ) -> Arc<Self> {
        let (visibility, _) = watch::channel(Visibility::Visible);
        Arc::new(Self {
            registry,
            engine,
            poll_interval: config.poll_interval(),
            visibility,
            poll_signal: Notify::new(),
            poll_pending: AtomicBool::new(false),
            last_error: Mutex::new(None),
        })
    }

    pub fn registry(&self) -> &Arc<TransferRegistry> {
        &self.registry
    }

    pub fn visibility(&self) -> Visibility {
        *self.visibility.borrow()
    }

    pub fn set_visibility(&self, visibility: Visibility) {
        let previous = self.visibility.send_replace(visibility);
        if previous != visibility {
            info!("Transfer view visibility: {:?} -> {:?}", previous, visibility);
        }
    }

    /// Ask the running loop to poll soon (ignored while hidden until visible again)
    pub fn request_poll(&self) {
        self.poll_pending.store(true, Ordering::SeqCst);
        self.poll_signal.notify_one();
    }

    /// Error from the most recent failed poll, cleared by the next successful one
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    /// Apply one push event, returns whether the registry changed
    pub fn apply_push(&self, event: EngineEvent) -> bool {
        if !admit_push(&event, self.visibility()) {
            trace!("Dropped progress for {} while hidden", event.job_id());
            return false;
        }

        match event {
            EngineEvent::JobAdded { job } => {
                let id = job.id.clone();
                let progress = JobProgress::from_job(&job);
                if self.registry.insert_new(job) {
                    return true;
                }
                self.registry
                    .patch_with(&id, |local| merge_progress(local, &progress))
            }
            EngineEvent::JobProgress(progress) => {
                if !self.registry.contains(&progress.job_id) {
                    debug!(
                        "Progress for unknown transfer {}, scheduling poll",
                        progress.job_id
                    );
                    self.request_poll();
                    return false;
                }
                self.registry.patch_with(&progress.job_id, |local| {
                    let patch = merge_progress(local, &progress);
                    if patch.is_none() && local.is_terminal() {
                        debug!(
                            "Ignored {:?} for finished transfer {}",
                            progress.status, progress.job_id
                        );
                    }
                    patch
                })
            }
        }
    }

    /// Fetch the full job list and merge it, returns whether the registry changed
    pub async fn poll_once(&self) -> Result<bool> {
        self.poll_pending.store(false, Ordering::SeqCst);
        let known: HashSet<String> = self.registry.ids().into_iter().collect();

        match self.engine.list_transfers().await {
            Ok(polled) => {
                *self.last_error.lock() = None;
                let count = polled.len();
                let changed = self
                    .registry
                    .reconcile(|current| plan_poll(current, &known, polled));
                trace!("Polled {} transfers (changed: {})", count, changed);
                Ok(changed)
            }
            Err(e) => {
                warn!("Transfer poll failed: {}", e);
                *self.last_error.lock() = Some(e.to_string());
                Err(e.into())
            }
        }
    }

    /// Start the background loop
    pub fn spawn(self: &Arc<Self>, events: mpsc::Receiver<EngineEvent>) -> ReconcilerHandle {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let reconciler = Arc::clone(self);
        let task = tokio::spawn(async move { reconciler.run(events, shutdown_rx).await });

        ReconcilerHandle {
            reconciler: Arc::clone(self),
            shutdown: Some(shutdown_tx),
            task: Some(task),
        }
    }

    async fn run(
        self: Arc<Self>,
        mut events: mpsc::Receiver<EngineEvent>,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) {
        let mut visibility_rx = self.visibility.subscribe();
        let mut visible = visibility_rx.borrow_and_update().is_visible();
        let mut events_open = true;

        // First tick completes immediately, which is the initial poll
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        debug!("Transfer reconciler started");

        loop {
            tokio::select! {
                _ = &mut shutdown_rx => break,
                event = events.recv(), if events_open => match event {
                    Some(event) => {
                        self.apply_push(event);
                    }
                    None => {
                        debug!("Engine event stream closed, polling only");
                        events_open = false;
                    }
                },
                changed = visibility_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let now_visible = visibility_rx.borrow_and_update().is_visible();
                    if now_visible && !visible {
                        let _ = self.poll_once().await;
                        ticker.reset();
                    }
                    visible = now_visible;
                }
                _ = self.poll_signal.notified(), if visible => {
                    // The permit may predate a poll that already ran
                    if self.poll_pending.load(Ordering::SeqCst) {
                        let _ = self.poll_once().await;
                        ticker.reset();
                    }
                }
                _ = ticker.tick(), if visible => {
                    let _ = self.poll_once().await;
                }
            }
        }

        debug!("Transfer reconciler stopped");
    }
}

/// Control surface of a running reconciler; dropping it stops the loop
pub struct ReconcilerHandle {
    reconciler: Arc<EventReconciler>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ReconcilerHandle {
    pub fn set_visible(&self, visible: bool) {
        self.reconciler
            .set_visibility(Visibility::from_visible(visible));
    }

    pub fn poll_now(&self) {
        self.reconciler.request_poll();
    }

    pub fn reconciler(&self) -> &Arc<EventReconciler> {
        &self.reconciler
    }

    /// Stop the loop and wait for it to exit
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}
