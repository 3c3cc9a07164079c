//! Completion tracking for a discovery run
//!
//! Every ping and every probe is recorded as *sent* before it is dispatched
//! and as *received* once it has fully resolved. Alongside the four counters
//! the tracker keeps a single outstanding-operation count. It starts at one,
//! standing for the dispatch phase itself, which `seal()` releases once the
//! last ping of the run has been handed out. The run is complete when the
//! outstanding count drops to zero; a compare-and-swap on `fired` makes sure
//! exactly one caller observes that transition.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;
use tracing::warn;

/// Point-in-time view of a run's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunCounters {
    pub sent_reachability: usize,
    pub received_reachability: usize,
    pub sent_probe: usize,
    pub received_probe: usize,
}

impl RunCounters {
    pub fn is_settled(&self) -> bool {
        self.received_reachability >= self.sent_reachability
            && self.received_probe >= self.sent_probe
    }
}

/// Final state of a completed run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Wall-clock time from start to the last resolved operation
    pub elapsed_ms: u64,
    #[serde(flatten)]
    pub counters: RunCounters,
}

/// Per-run counters and the one-shot completion signal
#[derive(Debug)]
pub struct CompletionTracker {
    sent_reachability: AtomicUsize,
    received_reachability: AtomicUsize,
    sent_probe: AtomicUsize,
    received_probe: AtomicUsize,
    outstanding: AtomicUsize,
    sealed: AtomicBool,
    fired: AtomicBool,
    started: Instant,
}

impl Default for CompletionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionTracker {
    /// Start measuring a new run
    pub fn new() -> Self {
        Self {
            sent_reachability: AtomicUsize::new(0),
            received_reachability: AtomicUsize::new(0),
            sent_probe: AtomicUsize::new(0),
            received_probe: AtomicUsize::new(0),
            outstanding: AtomicUsize::new(1),
            sealed: AtomicBool::new(false),
            fired: AtomicBool::new(false),
            started: Instant::now(),
        }
    }

    pub fn record_reachability_sent(&self) {
        self.outstanding.fetch_add(1, Ordering::AcqRel);
        self.sent_reachability.fetch_add(1, Ordering::AcqRel);
    }

    /// Returns the summary if this completion finished the run
    pub fn record_reachability_received(&self) -> Option<RunSummary> {
        self.received_reachability.fetch_add(1, Ordering::AcqRel);
        self.resolve_one()
    }

    pub fn record_probe_sent(&self) {
        self.outstanding.fetch_add(1, Ordering::AcqRel);
        self.sent_probe.fetch_add(1, Ordering::AcqRel);
    }

    /// Returns the summary if this completion finished the run
    pub fn record_probe_received(&self) -> Option<RunSummary> {
        self.received_probe.fetch_add(1, Ordering::AcqRel);
        self.resolve_one()
    }

    /// Mark the dispatch phase finished
    ///
    /// Returns the summary if nothing was left in flight. Only the first
    /// call has any effect.
    pub fn seal(&self) -> Option<RunSummary> {
        if self.sealed.swap(true, Ordering::AcqRel) {
            return None;
        }
        self.resolve_one()
    }

    /// Whether the completion signal has been produced
    pub fn is_complete(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> RunCounters {
        // received before sent so a snapshot never shows received > sent
        let received_reachability = self.received_reachability.load(Ordering::Acquire);
        let received_probe = self.received_probe.load(Ordering::Acquire);
        RunCounters {
            sent_reachability: self.sent_reachability.load(Ordering::Acquire),
            received_reachability,
            sent_probe: self.sent_probe.load(Ordering::Acquire),
            received_probe,
        }
    }

    fn resolve_one(&self) -> Option<RunSummary> {
        let previous = self
            .outstanding
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));

        match previous {
            Ok(1) => self.fire(),
            Ok(_) => None,
            Err(_) => {
                warn!("Completion recorded with nothing outstanding");
                None
            }
        }
    }

    fn fire(&self) -> Option<RunSummary> {
        self.fired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;

        Some(RunSummary {
            elapsed_ms: self.started.elapsed().as_millis() as u64,
            counters: self.snapshot(),
        })
    }
}
