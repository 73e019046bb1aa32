//! Triage engine: classify an NMI against the frozen category table.
//!
//! Evaluation order is fixed and is the whole point of the engine:
//!
//! 1. Ignore: return [`Outcome::Suppressed`] without logging anything.
//! 2. Log the event.
//! 3. Debug: capture diagnostics, then keep going.
//! 4. Drop: return [`Outcome::Dropped`].
//! 5. Panic: return [`Outcome::PanicTriggered`].
//! 6. Otherwise return [`Outcome::Unmanaged`].
//!
//! So Ignore beats everything, Drop beats Panic, and Debug never decides the
//! outcome on its own.
//!
//! The engine is safe to call from NMI context: the table is `Copy` data
//! that is never written after construction, counters are relaxed atomics,
//! and log events carry static messages with plain structured fields, so the
//! engine itself neither allocates nor locks. What an installed `tracing`
//! subscriber or [`DiagnosticCapture`] does is up to them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use nmi_common::{ReasonCode, SourceType};
use nmi_config::{Category, CategoryTable};
use serde::Serialize;
use tracing::{error, info};

use crate::capture::DiagnosticCapture;
use crate::source::{NmiHandler, Verdict};

/// Result of triaging one NMI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Listed in Ignore. Nothing logged; other handlers still run.
    Suppressed,
    /// Listed in Drop. Consumed; other handlers never see it.
    Dropped,
    /// Listed in Panic. The host must halt; this is terminal.
    PanicTriggered,
    /// Listed nowhere. Logged and left to other handlers.
    Unmanaged,
}

impl Outcome {
    /// Verdict reported back to the host.
    pub fn verdict(self) -> Verdict {
        match self {
            Outcome::Suppressed | Outcome::Unmanaged => Verdict::Pass,
            Outcome::Dropped => Verdict::Handled,
            Outcome::PanicTriggered => Verdict::Halt,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Outcome::PanicTriggered)
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Suppressed => write!(f, "suppressed"),
            Outcome::Dropped => write!(f, "dropped"),
            Outcome::PanicTriggered => write!(f, "panic"),
            Outcome::Unmanaged => write!(f, "unmanaged"),
        }
    }
}

/// Outcome of [`TriageEngine::decide`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub outcome: Outcome,
    /// Whether a diagnostic capture runs before the outcome is returned.
    pub capture: bool,
}

/// Point-in-time copy of the engine counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TriageStats {
    pub suppressed: u64,
    pub dropped: u64,
    pub panics: u64,
    pub unmanaged: u64,
    pub captures: u64,
}

impl TriageStats {
    pub fn total(&self) -> u64 {
        self.suppressed + self.dropped + self.panics + self.unmanaged
    }

    /// Counts accumulated after `earlier` was taken.
    pub fn since(&self, earlier: &TriageStats) -> TriageStats {
        TriageStats {
            suppressed: self.suppressed.saturating_sub(earlier.suppressed),
            dropped: self.dropped.saturating_sub(earlier.dropped),
            panics: self.panics.saturating_sub(earlier.panics),
            unmanaged: self.unmanaged.saturating_sub(earlier.unmanaged),
            captures: self.captures.saturating_sub(earlier.captures),
        }
    }

    /// The outcome recorded, when these counts hold exactly one evaluation.
    pub fn single_outcome(&self) -> Option<Outcome> {
        if self.total() != 1 {
            return None;
        }
        Some(if self.suppressed == 1 {
            Outcome::Suppressed
        } else if self.dropped == 1 {
            Outcome::Dropped
        } else if self.panics == 1 {
            Outcome::PanicTriggered
        } else {
            Outcome::Unmanaged
        })
    }
}

#[derive(Debug, Default)]
struct Counters {
    suppressed: AtomicU64,
    dropped: AtomicU64,
    panics: AtomicU64,
    unmanaged: AtomicU64,
    captures: AtomicU64,
}

impl Counters {
    fn bump(&self, outcome: Outcome) {
        let counter = match outcome {
            Outcome::Suppressed => &self.suppressed,
            Outcome::Dropped => &self.dropped,
            Outcome::PanicTriggered => &self.panics,
            Outcome::Unmanaged => &self.unmanaged,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Owns the frozen configuration and classifies NMIs against it.
pub struct TriageEngine {
    table: CategoryTable,
    capture: Arc<dyn DiagnosticCapture>,
    counters: Counters,
}

impl TriageEngine {
    pub fn new(table: CategoryTable, capture: Arc<dyn DiagnosticCapture>) -> Self {
        Self {
            table,
            capture,
            counters: Counters::default(),
        }
    }

    pub fn table(&self) -> &CategoryTable {
        &self.table
    }

    /// Pure classification: which outcome `code` resolves to and whether
    /// the Debug category matched. No logging, no capture, no counters.
    pub fn decide(&self, code: ReasonCode) -> Decision {
        if self.table.contains(Category::Ignore, code) {
            return Decision {
                outcome: Outcome::Suppressed,
                capture: false,
            };
        }
        let capture = self.table.contains(Category::Debug, code);
        let outcome = if self.table.contains(Category::Drop, code) {
            Outcome::Dropped
        } else if self.table.contains(Category::Panic, code) {
            Outcome::PanicTriggered
        } else {
            Outcome::Unmanaged
        };
        Decision { outcome, capture }
    }

    /// Classify one NMI, with logging and diagnostic capture. Total over its
    /// inputs; never fails.
    pub fn evaluate(&self, source: SourceType, code: ReasonCode) -> Outcome {
        let Decision { outcome, capture } = self.decide(code);
        self.counters.bump(outcome);

        if outcome == Outcome::Suppressed {
            return outcome;
        }

        info!(
            %source,
            nmi_type = source.index(),
            reason = code.0,
            "handling new NMI"
        );

        if capture {
            info!(%source, reason = code.0, "debug NMI");
            self.counters.captures.fetch_add(1, Ordering::Relaxed);
            self.capture.capture(source, code);
        }

        match outcome {
            Outcome::Dropped => info!(%source, reason = code.0, "drop NMI"),
            Outcome::PanicTriggered => error!(
                severity = "emergency",
                %source,
                reason = code.0,
                "panic on NMI"
            ),
            Outcome::Unmanaged => info!(%source, reason = code.0, "unmanaged NMI, let it pass"),
            Outcome::Suppressed => {}
        }
        outcome
    }

    pub fn stats(&self) -> TriageStats {
        let c = &self.counters;
        TriageStats {
            suppressed: c.suppressed.load(Ordering::Relaxed),
            dropped: c.dropped.load(Ordering::Relaxed),
            panics: c.panics.load(Ordering::Relaxed),
            unmanaged: c.unmanaged.load(Ordering::Relaxed),
            captures: c.captures.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for TriageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriageEngine")
            .field("table", &self.table)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl NmiHandler for TriageEngine {
    fn handle(&self, source: SourceType, code: ReasonCode) -> Verdict {
        self.evaluate(source, code).verdict()
    }
}
