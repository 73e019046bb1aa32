//! Diagnostic capture for the Debug category.

use std::sync::atomic::{AtomicUsize, Ordering};

use nmi_common::{ReasonCode, SourceType};
use tracing::info;

/// Snapshot of execution state taken when a Debug-listed NMI arrives.
pub trait DiagnosticCapture: Send + Sync {
    fn capture(&self, source: SourceType, code: ReasonCode);
}

/// Log the current call stack.
#[derive(Debug, Default, Clone, Copy)]
pub struct BacktraceCapture;

impl DiagnosticCapture for BacktraceCapture {
    fn capture(&self, source: SourceType, code: ReasonCode) {
        let backtrace = backtrace::Backtrace::new();
        info!(
            %source,
            reason = code.0,
            frames = backtrace.frames().len(),
            "debug NMI\n{backtrace:?}"
        );
    }
}

/// Count captures without collecting anything. For dry runs and tests.
#[derive(Debug, Default)]
pub struct CountingCapture {
    count: AtomicUsize,
}

impl CountingCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }
}

impl DiagnosticCapture for CountingCapture {
    fn capture(&self, _source: SourceType, _code: ReasonCode) {
        self.count.fetch_add(1, Ordering::Relaxed);
    }
}
