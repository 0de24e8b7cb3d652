//! The disposable hierarchy.
//!
//! A disposable type is a chain of tiers. The outermost tier implements
//! [`CleanupHook`] by doing its own release work and then calling its parent tier's
//! hook; the chain always ends in [`DisposableBase`], which owns the disposed flag and
//! the links back to the session.
//!
//! ```text
//! CompositeResource ──> DerivedResource ──> DisposableBase
//!   (os handle,           (native memory,      (flag, registry entry)
//!    child objects)        staged bytes)
//! ```
//!
//! The hook receives `releasing_managed`:
//!
//! - `true` when the owner called [`Disposable::dispose`]. Tiers release everything,
//!   including references to other disposable objects.
//! - `false` when the finalization queue runs the chain for an unreachable instance.
//!   Tiers release only unmanaged resources they own directly and leave every other
//!   object alone.
//!
//! Both entry points race for the same [`DisposeFlag`]; whichever sets it first runs
//! the chain and the other becomes a no-op.
use crate::{
    error::{DisposeError, NativeError},
    gc::FinalizerLink,
    registry::TrackingRegistry,
    session::Session,
    tracer::{EventSink, LifecycleEvent, Phase},
    utils::sync::{Arc, AtomicBool, AtomicUsize, Ordering},
};
use std::fmt::{Display, Formatter};

mod composite;
mod derived;

pub use composite::CompositeResource;
pub use derived::DerivedResource;

/// Session-unique identity of a disposable instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_raw(self) -> u64 {
        self.0
    }
}

impl Display for ObjectId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One-shot false→true transition.
#[derive(Debug, Default)]
pub struct DisposeFlag(AtomicBool);

impl DisposeFlag {
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Returns `true` for exactly one caller over the flag's lifetime.
    pub(crate) fn try_set(&self) -> bool {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// One tier's share of cleanup.
///
/// Implementations must forward to their parent tier's hook with the same flag after
/// finishing their own work, even when they own nothing themselves.
pub trait CleanupHook {
    /// Name of the tier, as it appears in lifecycle events.
    fn tier(&self) -> &'static str;

    fn cleanup_hook(&self, releasing_managed: bool);
}

pub trait Disposable: CleanupHook + Send + Sync {
    fn base(&self) -> &DisposableBase;

    /// Runs the cleanup chain with `releasing_managed = true` the first time it is
    /// called and cancels the pending automatic cleanup. Later calls do nothing.
    fn dispose(&self) {
        let base = self.base();
        if !base.disposed.try_set() {
            tracing::trace!("{} {:?}: already disposed", base.id, &*base.name);
            return;
        }
        tracing::debug!("{} {:?}: dispose", base.id, &*base.name);
        self.cleanup_hook(true);
        base.finalizer.suppress(base.id);
    }

    fn is_disposed(&self) -> bool {
        self.base().disposed.is_set()
    }

    /// Fails with [`DisposeError::UseAfterDispose`] once the instance is disposed.
    /// Every operation except `dispose` calls this before doing any work.
    fn ensure_not_disposed(&self, context: &str) -> Result<(), DisposeError> {
        let base = self.base();
        if base.disposed.is_set() {
            return Err(base.use_after_dispose(context));
        }
        Ok(())
    }

    fn id(&self) -> ObjectId {
        self.base().id
    }

    fn name(&self) -> &str {
        &self.base().name
    }

    /// Whether `id` is owned by this instance, directly or through owned instances.
    /// Only types that hold other disposables need to override this.
    fn owns(&self, _id: ObjectId) -> bool {
        false
    }
}

/// Runs the chain with `releasing_managed = false` unless `dispose` already won.
/// Only the finalization queue calls this.
pub(crate) fn run_automatic_cleanup(object: &dyn Disposable) -> bool {
    let base = object.base();
    if !base.disposed.try_set() {
        return false;
    }
    tracing::debug!("{} {:?}: automatic cleanup", base.id, &*base.name);
    object.cleanup_hook(false);
    true
}

/// Root tier shared by every disposable type.
pub struct DisposableBase {
    id: ObjectId,
    name: Arc<str>,
    disposed: DisposeFlag,
    registry: TrackingRegistry,
    finalizer: FinalizerLink,
    events: Arc<dyn EventSink>,
    trace_events: bool,
    release_failures: AtomicUsize,
}

impl DisposableBase {
    pub const TIER: &'static str = "Base";

    pub fn new(session: &Session, name: impl Into<Arc<str>>) -> Self {
        Self {
            id: session.next_object_id(),
            name: name.into(),
            disposed: DisposeFlag::default(),
            registry: session.registry().clone(),
            finalizer: session.finalizers().link(),
            events: session.sink(),
            trace_events: session.config().trace_events,
            release_failures: AtomicUsize::new(0),
        }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shared_name(&self) -> Arc<str> {
        self.name.clone()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.is_set()
    }

    pub fn use_after_dispose(&self, context: &str) -> DisposeError {
        DisposeError::UseAfterDispose {
            name: self.name.to_string(),
            context: context.to_string(),
        }
    }

    /// Records that `tier` started its share of the cleanup chain.
    pub fn emit(&self, tier: &'static str, releasing_managed: bool) {
        let event = LifecycleEvent {
            object: self.id,
            name: self.name.clone(),
            tier,
            phase: Phase::from_releasing_managed(releasing_managed),
            releasing_managed,
        };
        if self.trace_events {
            tracing::info!("{} {:?}: {} [{}]", self.id, &*self.name, event, event.phase);
        } else {
            tracing::debug!("{} {:?}: {} [{}]", self.id, &*self.name, event, event.phase);
        }
        self.events.record(event);
    }

    /// A tier could not release something it owns. Logged and counted; the chain
    /// carries on to the parent tier regardless.
    pub fn report_release_failure(&self, tier: &'static str, error: &NativeError) {
        self.release_failures.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(
            "{} {:?}: {} tier failed to release: {}",
            self.id,
            &*self.name,
            tier,
            error
        );
    }

    pub fn release_failures(&self) -> usize {
        self.release_failures.load(Ordering::Relaxed)
    }
}

impl CleanupHook for DisposableBase {
    fn tier(&self) -> &'static str {
        Self::TIER
    }

    fn cleanup_hook(&self, releasing_managed: bool) {
        self.emit(Self::TIER, releasing_managed);
        if releasing_managed {
            self.registry.unregister(self.id);
        }
    }
}
