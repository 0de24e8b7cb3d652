//! Session state shared by every instance created through it.
use crate::{
    config::Config,
    gc::{CollectReport, FinalizationQueue, Rooted},
    native::NativeHeap,
    object::{Disposable, ObjectId},
    registry::{LiveSnapshot, TrackedEntry, TrackingRegistry},
    tracer::{EventLog, EventSink, Tee},
    utils::sync::{Arc, AtomicBool, AtomicU64, Ordering},
};

/// The environment instances live in: tracking registry, finalization queue, native
/// heap and event log, plus the configuration they were created with.
///
/// Dropping a session runs [`Session::shutdown`].
pub struct Session {
    config: Config,
    registry: TrackingRegistry,
    finalizers: FinalizationQueue,
    native: Arc<NativeHeap>,
    log: Arc<EventLog>,
    sink: Arc<dyn EventSink>,
    next_id: AtomicU64,
    shut_down: AtomicBool,
}

impl Session {
    pub fn new(config: Config) -> Self {
        let log = Arc::new(EventLog::new());
        Self::build(config, log.clone(), log)
    }

    /// Like [`Session::new`], but lifecycle events also go to `sink`.
    pub fn with_sink(config: Config, sink: Arc<dyn EventSink>) -> Self {
        let log = Arc::new(EventLog::new());
        let sinks = vec![log.clone() as Arc<dyn EventSink>, sink];
        let tee: Arc<dyn EventSink> = Arc::new(Tee::new(sinks));
        Self::build(config, log, tee)
    }

    fn build(config: Config, log: Arc<EventLog>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            config,
            registry: TrackingRegistry::new(),
            finalizers: FinalizationQueue::new(),
            native: Arc::new(NativeHeap::new()),
            log,
            sink,
            next_id: AtomicU64::new(1),
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &TrackingRegistry {
        &self.registry
    }

    pub fn finalizers(&self) -> &FinalizationQueue {
        &self.finalizers
    }

    pub fn native_heap(&self) -> &Arc<NativeHeap> {
        &self.native
    }

    pub fn events(&self) -> &EventLog {
        &self.log
    }

    pub(crate) fn sink(&self) -> Arc<dyn EventSink> {
        self.sink.clone()
    }

    pub(crate) fn next_object_id(&self) -> ObjectId {
        ObjectId::from_raw(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Registers a freshly built instance with the registry and the finalization
    /// queue and hands back its first root handle.
    pub fn track<T: Disposable + 'static>(&self, object: T) -> Rooted<T> {
        let object = Arc::new(object);
        let (rooted, root) = Rooted::new(object.clone());

        self.registry.register(TrackedEntry {
            id: object.id(),
            name: object.base().shared_name(),
            tier: object.tier(),
        });
        self.finalizers.register(object.id(), root, object);

        tracing::debug!("{} {:?}: created", rooted.id(), rooted.name());
        rooted
    }

    /// Sweeps the finalization queue. See [`FinalizationQueue::collect`].
    pub fn collect(&self) -> CollectReport {
        self.finalizers.collect()
    }

    pub fn snapshot_live(&self) -> LiveSnapshot {
        self.registry.snapshot_live()
    }

    /// Runs every automatic cleanup still pending, reachable or not. Safe to call
    /// more than once: later calls pick up instances tracked since the last one.
    pub fn shutdown(&self) -> CollectReport {
        let first = !self.shut_down.swap(true, Ordering::AcqRel);
        let report = self.finalizers.shutdown();
        if !first && report.examined == 0 {
            return report;
        }
        let leaked = self.native.live_count();
        if leaked > 0 {
            tracing::warn!(
                "session shut down with {} native allocations ({} bytes) still live",
                leaked,
                self.native.live_bytes()
            );
        }
        report
    }

    /// Whether [`Session::shutdown`] has run at least once.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown();
    }
}
