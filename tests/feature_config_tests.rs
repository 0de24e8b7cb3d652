//! Tests that exercise behavior specific to each feature configuration.
//!
//! Run with:
//! - `cargo test --test feature_config_tests` (default, single-threaded locks)
//! - `cargo test --test feature_config_tests --features multithreading`
use dispose_rs::{Config, DerivedResource, Disposable, Session};

// ============================================================================
// Configuration Tests (all feature configurations)
// ============================================================================

#[test]
fn test_buffer_size_comes_from_config() {
    let config = Config {
        buffer_size: 8,
        ..Config::default()
    };
    let session = Session::new(config);
    let res = DerivedResource::new(&session, "small");

    assert_eq!(res.write(b"0123456789").unwrap(), 8);
    assert_eq!(res.read().unwrap(), b"01234567");
    assert_eq!(session.native_heap().live_bytes(), 8);
}

#[test]
fn test_trace_events_does_not_change_behavior() {
    let config = Config {
        trace_events: true,
        ..Config::default()
    };
    let session = Session::new(config);
    let res = DerivedResource::new(&session, "traced");
    res.dispose();

    assert_eq!(
        session.events().lines_for(res.id()),
        ["Derived.cleanup(true)", "Base.cleanup(true)"]
    );
}

// ============================================================================
// Single-threaded Tests (default)
// ============================================================================

#[cfg(not(feature = "multithreading"))]
mod single_threaded {
    use super::*;

    #[test]
    fn test_sequential_dispose_then_sweep() {
        let session = Session::default();
        let ids: Vec<_> = (0..4)
            .map(|i| {
                let res = DerivedResource::new(&session, format!("r{}", i));
                if i % 2 == 0 {
                    res.dispose();
                }
                res.id()
            })
            .collect();

        let report = session.collect();
        assert_eq!(report.finalized, [ids[1], ids[3]]);
        for id in ids {
            assert_eq!(session.events().events_for(id).len(), 2);
        }
    }
}

// ============================================================================
// Multithreading Tests
// ============================================================================

#[cfg(feature = "multithreading")]
mod multithreading {
    use super::*;
    use std::{sync::Arc, thread};

    fn base_events(session: &Session, id: dispose_rs::ObjectId) -> usize {
        session
            .events()
            .lines_for(id)
            .iter()
            .filter(|l| l.starts_with("Base."))
            .count()
    }

    #[test]
    fn test_concurrent_dispose_runs_chain_once() {
        let session = Session::default();
        let res = DerivedResource::new(&session, "contended");
        let id = res.id();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let res = res.clone();
                thread::spawn(move || res.dispose())
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(
            session.events().lines_for(id),
            ["Derived.cleanup(true)", "Base.cleanup(true)"]
        );
        assert!(!session.finalizers().is_pending(id));
    }

    #[test]
    fn test_dispose_races_shutdown() {
        let session = Arc::new(Session::default());
        let resources: Vec<_> = (0..32)
            .map(|i| DerivedResource::new(&session, format!("race-{}", i)))
            .collect();
        let ids: Vec<_> = resources.iter().map(|r| r.id()).collect();

        let disposer = thread::spawn(move || {
            for res in resources {
                res.dispose();
            }
        });
        let sweeper = {
            let session = Arc::clone(&session);
            thread::spawn(move || session.finalizers().shutdown())
        };

        disposer.join().unwrap();
        sweeper.join().unwrap();

        for id in ids {
            assert_eq!(base_events(&session, id), 1, "{} cleaned up twice", id);
        }
        assert_eq!(session.native_heap().live_count(), 0);
    }

    #[test]
    fn test_registry_shared_across_threads() {
        let session = Arc::new(Session::default());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let session = Arc::clone(&session);
                thread::spawn(move || {
                    for i in 0..10 {
                        let res = DerivedResource::new(&session, format!("t{}-{}", t, i));
                        if i % 2 == 0 {
                            res.dispose();
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(session.snapshot_live().len(), 20);
        session.collect();
        assert_eq!(session.snapshot_live().len(), 20);
        assert_eq!(session.finalizers().pending(), 0);
    }
}
