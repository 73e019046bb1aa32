//! Process-wide engine handle for hosts that only accept a bare callback.
//!
//! Some hosts register a plain function rather than an object. For those the
//! engine is installed here exactly once at startup and never replaced;
//! [`handle_nmi`] is the function handed to the host.

use std::sync::{Arc, OnceLock};

use nmi_common::{Error, ReasonCode, Result, SourceType};

use crate::engine::TriageEngine;
use crate::source::{NmiHandler, Verdict};

static ENGINE: OnceLock<Arc<TriageEngine>> = OnceLock::new();

/// Install the engine. Fails if one is already installed.
pub fn install(engine: Arc<TriageEngine>) -> Result<&'static Arc<TriageEngine>> {
    ENGINE.set(engine).map_err(|_| Error::AlreadyInstalled)?;
    ENGINE.get().ok_or(Error::AlreadyInstalled)
}

pub fn installed() -> Option<&'static Arc<TriageEngine>> {
    ENGINE.get()
}

/// Host callback. Passes the NMI on untouched until an engine is installed.
pub fn handle_nmi(source: SourceType, code: ReasonCode) -> Verdict {
    match ENGINE.get() {
        Some(engine) => engine.handle(source, code),
        None => Verdict::Pass,
    }
}

/// [`NmiHandler`] that forwards to [`handle_nmi`].
#[derive(Debug, Default, Clone, Copy)]
pub struct GlobalHandler;

impl NmiHandler for GlobalHandler {
    fn handle(&self, source: SourceType, code: ReasonCode) -> Verdict {
        handle_nmi(source, code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::CountingCapture;
    use nmi_config::{Category, CategoryTable, TriageParams};

    // The slot is process-wide, so the whole lifecycle is one test.
    #[test]
    fn install_once_then_dispatch() {
        let (table, _) =
            CategoryTable::from_params(&TriageParams::default().with(Category::Drop, "9"));
        let engine = Arc::new(TriageEngine::new(table, Arc::new(CountingCapture::new())));

        assert_eq!(handle_nmi(SourceType::Unknown, ReasonCode(9)), Verdict::Pass);

        install(engine.clone()).unwrap();
        assert!(Arc::ptr_eq(installed().unwrap(), &engine));
        assert_eq!(
            GlobalHandler.handle(SourceType::Unknown, ReasonCode(9)),
            Verdict::Handled
        );

        let second = Arc::new(TriageEngine::new(
            CategoryTable::empty(),
            Arc::new(CountingCapture::new()),
        ));
        assert!(matches!(install(second), Err(Error::AlreadyInstalled)));
        assert_eq!(handle_nmi(SourceType::Unknown, ReasonCode(9)), Verdict::Handled);
    }
}
