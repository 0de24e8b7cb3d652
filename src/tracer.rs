//! Lifecycle event tracing.
//!
//! Every tier's cleanup hook reports one [`LifecycleEvent`] before doing its own work,
//! so the order of events for an instance is the order in which the tier chain ran.
//! Events go to an [`EventSink`]; [`EventLog`] is the in-memory sink a session uses
//! unless told otherwise.
use crate::{
    object::ObjectId,
    utils::sync::{Arc, Mutex},
};
use std::fmt::{Display, Formatter};

/// Which entry point started a cleanup chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    /// `dispose()` called by the owner.
    Dispose,
    /// Run by the finalization queue after the instance became unreachable.
    AutomaticCleanup,
}

impl Phase {
    pub fn from_releasing_managed(releasing_managed: bool) -> Self {
        if releasing_managed {
            Phase::Dispose
        } else {
            Phase::AutomaticCleanup
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Dispose => "dispose",
            Phase::AutomaticCleanup => "automatic-cleanup",
        }
    }
}

impl Display for Phase {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LifecycleEvent {
    pub object: ObjectId,
    pub name: Arc<str>,
    pub tier: &'static str,
    pub phase: Phase,
    pub releasing_managed: bool,
}

/// Renders as `Tier.cleanup(flag)`, the notation used in logs and test expectations.
impl Display for LifecycleEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.cleanup({})", self.tier, self.releasing_managed)
    }
}

pub trait EventSink: Send + Sync {
    fn record(&self, event: LifecycleEvent);
}

#[derive(Debug, Default)]
pub struct EventLog {
    events: Mutex<Vec<LifecycleEvent>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events.lock().clone()
    }

    /// Events recorded for one object, in order.
    pub fn events_for(&self, object: ObjectId) -> Vec<LifecycleEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.object == object)
            .cloned()
            .collect()
    }

    /// `Tier.cleanup(flag)` strings for one object.
    pub fn lines_for(&self, object: ObjectId) -> Vec<String> {
        self.events_for(object)
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn drain(&self) -> Vec<LifecycleEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl EventSink for EventLog {
    fn record(&self, event: LifecycleEvent) {
        self.events.lock().push(event);
    }
}

/// Fans one event out to several sinks.
#[derive(Default)]
pub struct Tee(Vec<Arc<dyn EventSink>>);

impl Tee {
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self(sinks)
    }
}

impl EventSink for Tee {
    fn record(&self, event: LifecycleEvent) {
        if let Some((last, rest)) = self.0.split_last() {
            for sink in rest {
                sink.record(event.clone());
            }
            last.record(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(object: u64, tier: &'static str, releasing_managed: bool) -> LifecycleEvent {
        LifecycleEvent {
            object: ObjectId::from_raw(object),
            name: Arc::from("test"),
            tier,
            phase: Phase::from_releasing_managed(releasing_managed),
            releasing_managed,
        }
    }

    #[test]
    fn test_event_display() {
        assert_eq!(event(1, "Derived", false).to_string(), "Derived.cleanup(false)");
        assert_eq!(Phase::AutomaticCleanup.to_string(), "automatic-cleanup");
    }

    #[test]
    fn test_log_filters_by_object() {
        let log = EventLog::new();
        log.record(event(1, "Derived", true));
        log.record(event(2, "Derived", false));
        log.record(event(1, "Base", true));

        assert_eq!(
            log.lines_for(ObjectId::from_raw(1)),
            ["Derived.cleanup(true)", "Base.cleanup(true)"]
        );
        assert_eq!(log.drain().len(), 3);
        assert!(log.is_empty());
    }

    #[test]
    fn test_tee_forwards_to_every_sink() {
        let a = Arc::new(EventLog::new());
        let b = Arc::new(EventLog::new());
        let tee = Tee::new(vec![a.clone() as Arc<dyn EventSink>, b.clone()]);
        tee.record(event(7, "Base", false));
        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 1);
    }
}
