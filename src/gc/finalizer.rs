use super::RootToken;
use crate::{
    object::{run_automatic_cleanup, Disposable, ObjectId},
    utils::sync::{Arc, AtomicUsize, Mutex, Ordering, Weak},
};
use std::panic::{catch_unwind, AssertUnwindSafe};

struct PendingFinalizer {
    id: ObjectId,
    root: Weak<RootToken>,
    object: Arc<dyn Disposable>,
}

impl PendingFinalizer {
    fn is_reachable(&self) -> bool {
        self.root.strong_count() > 0
    }
}

#[derive(Default)]
pub(crate) struct QueueInner {
    queue: Mutex<Vec<PendingFinalizer>>,
    collections: AtomicUsize,
    finalized: AtomicUsize,
}

/// Outcome of one sweep.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CollectReport {
    /// Sweep passes run. A pass that finalizes something can make more instances
    /// unreachable, so sweeping repeats until a pass finds nothing.
    pub passes: usize,
    /// Queued instances looked at, summed over passes.
    pub examined: usize,
    /// Instances whose automatic cleanup ran, in the order it ran.
    pub finalized: Vec<ObjectId>,
    /// Instances whose cleanup chain panicked. The panic is logged and swallowed.
    pub panicked: Vec<ObjectId>,
    /// Instances still queued afterwards.
    pub still_pending: usize,
}

/// Queue of instances whose automatic cleanup has not run yet.
///
/// Every tracked instance is registered at construction. `dispose` removes it again
/// (the equivalent of suppressing its finalizer), so an instance leaves the queue
/// either through `dispose` or through exactly one sweep.
#[derive(Clone, Default)]
pub struct FinalizationQueue {
    inner: Arc<QueueInner>,
}

impl FinalizationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn link(&self) -> FinalizerLink {
        FinalizerLink(Arc::downgrade(&self.inner))
    }

    pub(crate) fn register(
        &self,
        id: ObjectId,
        root: Weak<RootToken>,
        object: Arc<dyn Disposable>,
    ) {
        self.inner
            .queue
            .lock()
            .push(PendingFinalizer { id, root, object });
    }

    /// Cancels the pending automatic cleanup for `id`. Returns `false` if none was
    /// pending.
    pub fn suppress(&self, id: ObjectId) -> bool {
        let removed = {
            let mut queue = self.inner.queue.lock();
            queue
                .iter()
                .position(|p| p.id == id)
                .map(|i| queue.remove(i))
        };
        match removed {
            Some(_) => {
                tracing::trace!("finalizer for {} suppressed", id);
                true
            }
            None => false,
        }
    }

    pub fn pending(&self) -> usize {
        self.inner.queue.lock().len()
    }

    pub fn is_pending(&self, id: ObjectId) -> bool {
        self.inner.queue.lock().iter().any(|p| p.id == id)
    }

    /// Number of sweeps run so far, shutdown included.
    pub fn collections(&self) -> usize {
        self.inner.collections.load(Ordering::Relaxed)
    }

    /// Total automatic cleanups run so far.
    pub fn total_finalized(&self) -> usize {
        self.inner.finalized.load(Ordering::Relaxed)
    }

    /// Runs automatic cleanup for every queued instance that has no root handle left.
    pub fn collect(&self) -> CollectReport {
        self.sweep(false)
    }

    /// Runs automatic cleanup for everything still queued, reachable or not, the way
    /// pending finalizers run when a process exits.
    pub fn shutdown(&self) -> CollectReport {
        self.sweep(true)
    }

    fn sweep(&self, everything: bool) -> CollectReport {
        self.inner.collections.fetch_add(1, Ordering::Relaxed);
        let mut report = CollectReport::default();

        loop {
            let to_finalize = {
                let mut queue = self.inner.queue.lock();
                report.examined += queue.len();
                let (dead, live): (Vec<_>, Vec<_>) = std::mem::take(&mut *queue)
                    .into_iter()
                    .partition(|p| everything || !p.is_reachable());
                *queue = live;
                dead
            };
            report.passes += 1;

            if to_finalize.is_empty() {
                break;
            }

            // Queue lock is released: finalizers may dispose or create other objects.
            for pending in to_finalize {
                let object = &*pending.object;
                match catch_unwind(AssertUnwindSafe(|| run_automatic_cleanup(object))) {
                    Ok(true) => {
                        self.inner.finalized.fetch_add(1, Ordering::Relaxed);
                        report.finalized.push(pending.id);
                    }
                    Ok(false) => {
                        tracing::trace!("{} was disposed before its finalizer ran", pending.id);
                    }
                    Err(payload) => {
                        let message = payload
                            .downcast_ref::<&str>()
                            .map(|s| s.to_string())
                            .or_else(|| payload.downcast_ref::<String>().cloned())
                            .unwrap_or_else(|| "<non-string panic>".to_string());
                        tracing::warn!(
                            "automatic cleanup of {} panicked: {}",
                            pending.id,
                            message
                        );
                        report.panicked.push(pending.id);
                    }
                }
                // Dropping `pending` here may release the last reference to the
                // instance, and with it the roots of anything it owned.
            }
        }

        report.still_pending = self.pending();
        tracing::debug!(
            "sweep: {} finalized, {} panicked, {} still pending ({} passes)",
            report.finalized.len(),
            report.panicked.len(),
            report.still_pending,
            report.passes
        );
        report
    }
}

/// Weak back-reference from an instance to the queue it is registered with.
#[derive(Clone, Debug)]
pub(crate) struct FinalizerLink(Weak<QueueInner>);

impl FinalizerLink {
    pub(crate) fn suppress(&self, id: ObjectId) {
        if let Some(inner) = self.0.upgrade() {
            FinalizationQueue { inner }.suppress(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        config::Config,
        object::{CompositeResource, DerivedResource, Disposable},
        session::Session,
    };

    #[test]
    fn test_collect_skips_reachable() {
        let session = Session::new(Config::default());
        let kept = DerivedResource::new(&session, "kept");
        let report = session.collect();
        assert!(report.finalized.is_empty());
        assert_eq!(report.still_pending, 1);
        assert!(session.finalizers().is_pending(kept.id()));
    }

    #[test]
    fn test_collect_finalizes_once() {
        let session = Session::new(Config::default());
        let id = DerivedResource::new(&session, "dropped").id();

        assert_eq!(session.collect().finalized, [id]);
        assert!(session.collect().finalized.is_empty());
        assert_eq!(session.finalizers().total_finalized(), 1);
    }

    #[test]
    fn test_dispose_suppresses() {
        let session = Session::new(Config::default());
        let res = DerivedResource::new(&session, "disposed");
        assert!(session.finalizers().is_pending(res.id()));
        res.dispose();
        assert!(!session.finalizers().is_pending(res.id()));
        assert!(!session.finalizers().suppress(res.id()));
    }

    #[test]
    fn test_children_swept_in_later_pass() {
        let session = Session::new(Config::default());
        let owner = CompositeResource::new(&session, "owner");
        let child = DerivedResource::new(&session, "child");
        let child_id = child.id();
        owner.adopt(child).unwrap();
        let owner_id = owner.id();
        drop(owner);

        let report = session.collect();
        assert_eq!(report.finalized, [owner_id, child_id]);
        assert_eq!(report.passes, 3);
        assert_eq!(session.finalizers().pending(), 0);
    }

    #[test]
    fn test_shutdown_finalizes_reachable() {
        let session = Session::new(Config::default());
        let res = DerivedResource::new(&session, "held");
        let report = session.finalizers().shutdown();
        assert_eq!(report.finalized, [res.id()]);
        assert!(res.is_disposed());
        assert!(res.write(b"x").is_err());
    }
}
