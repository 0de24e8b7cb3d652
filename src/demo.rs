//! Console walkthroughs of the two cleanup paths.
//!
//! Each scenario runs in its own [`Session`] and ends by printing the lifecycle events
//! it produced, what the tracking registry still lists, and what is left on the
//! native heap.
use crate::{
    config::Config,
    object::{CompositeResource, DerivedResource, Disposable},
    session::Session,
};
use clap::ValueEnum;
use std::io::{self, Write};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Scenario {
    /// Create instances and dispose each of them twice.
    Explicit,
    /// Create instances, drop every handle, then sweep.
    Abandoned,
    /// Composite owners disposing their children, and an abandoned owner.
    Composite,
    /// Call an operation on a disposed instance.
    UseAfterDispose,
    /// Everything above, in order.
    All,
}

impl Scenario {
    const EACH: [Scenario; 4] = [
        Scenario::Explicit,
        Scenario::Abandoned,
        Scenario::Composite,
        Scenario::UseAfterDispose,
    ];
}

pub fn run<W: Write>(
    scenario: Scenario,
    config: &Config,
    count: usize,
    out: &mut W,
) -> io::Result<()> {
    match scenario {
        Scenario::Explicit => explicit(config, count, out),
        Scenario::Abandoned => abandoned(config, count, out),
        Scenario::Composite => composite(config, count, out),
        Scenario::UseAfterDispose => use_after_dispose(config, out),
        Scenario::All => {
            for (i, s) in Scenario::EACH.into_iter().enumerate() {
                if i > 0 {
                    writeln!(out)?;
                }
                run(s, config, count, out)?;
            }
            Ok(())
        }
    }
}

fn explicit<W: Write>(config: &Config, count: usize, out: &mut W) -> io::Result<()> {
    writeln!(out, "== explicit disposal ==")?;
    let session = Session::new(config.clone());

    for i in 1..=count {
        let res = DerivedResource::new(&session, format!("explicit-{}", i));
        if let Err(e) = res.write(format!("payload {}", i).as_bytes()) {
            writeln!(out, "  write failed: {}", e)?;
        }
        res.dispose();
        // The second call is a no-op and adds nothing to the log.
        res.dispose();
    }

    summarize(&session, out)
}

fn abandoned<W: Write>(config: &Config, count: usize, out: &mut W) -> io::Result<()> {
    writeln!(out, "== abandoned instances ==")?;
    let session = Session::new(config.clone());

    for i in 1..=count {
        DerivedResource::new(&session, format!("abandoned-{}", i));
    }
    writeln!(
        out,
        "  before sweep: {} pending finalizer(s), {} native allocation(s)",
        session.finalizers().pending(),
        session.native_heap().live_count()
    )?;

    let report = session.collect();
    writeln!(
        out,
        "  sweep: {} finalized in {} pass(es)",
        report.finalized.len(),
        report.passes
    )?;

    summarize(&session, out)
}

fn composite<W: Write>(config: &Config, count: usize, out: &mut W) -> io::Result<()> {
    writeln!(out, "== composite owners ==")?;
    let session = Session::new(config.clone());

    let owner = CompositeResource::new(&session, "owner");
    for i in 1..=count {
        let child = DerivedResource::new(&session, format!("owned-{}", i));
        if let Err(e) = owner.adopt(child) {
            writeln!(out, "  adopt failed: {}", e)?;
        }
    }
    owner.dispose();

    let orphan = CompositeResource::new(&session, "orphan");
    if let Err(e) = orphan.adopt(DerivedResource::new(&session, "orphaned-child")) {
        writeln!(out, "  adopt failed: {}", e)?;
    }
    drop(orphan);

    let report = session.collect();
    writeln!(
        out,
        "  sweep: {} finalized in {} pass(es)",
        report.finalized.len(),
        report.passes
    )?;

    summarize(&session, out)
}

fn use_after_dispose<W: Write>(config: &Config, out: &mut W) -> io::Result<()> {
    writeln!(out, "== use after dispose ==")?;
    let session = Session::new(config.clone());

    let res = DerivedResource::new(&session, "short-lived");
    res.dispose();
    match res.write(b"too late") {
        Ok(n) => writeln!(out, "  unexpectedly wrote {} byte(s)", n)?,
        Err(e) => writeln!(out, "  write rejected: {}", e)?,
    }

    summarize(&session, out)
}

fn summarize<W: Write>(session: &Session, out: &mut W) -> io::Result<()> {
    writeln!(out, "  events:")?;
    for event in session.events().events() {
        writeln!(
            out,
            "    {:<5} {:<16} {:<26} [{}]",
            event.object.to_string(),
            &*event.name,
            event.to_string(),
            event.phase
        )?;
    }

    let live = session.snapshot_live();
    if live.is_empty() {
        writeln!(out, "  registry: empty")?;
    } else {
        writeln!(out, "  registry still references:")?;
        for entry in &live {
            writeln!(out, "    {:<5} {} ({})", entry.id.to_string(), entry.name, entry.tier)?;
        }
    }

    let heap = session.native_heap();
    writeln!(
        out,
        "  native heap: {} allocation(s), {} byte(s) live",
        heap.live_count(),
        heap.live_bytes()
    )
}
