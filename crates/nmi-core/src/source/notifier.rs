//! Legacy die-notifier backend.
//!
//! Older hosts have no per-source NMI registration. A handler joins a single
//! notifier chain that sees every die event; the NMI-class events reach the
//! handler as [`SourceType::Unknown`], everything else is passed over.

use std::sync::Arc;

use nmi_common::{ReasonCode, SourceType};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::trace;

use super::{
    insert_entry, remove_entry, HandlerEntry, InterruptSource, NmiHandler, Priority,
    RegistrationError, Verdict,
};
use crate::halt::Halt;

/// Events carried by the legacy die chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DieEvent {
    Nmi,
    NmiWatchdog,
    NmiIpi,
    NmiUnknown,
    Oops,
    Trap,
}

impl DieEvent {
    /// NMI-class events are the only ones handed to NMI handlers.
    pub fn is_nmi(self) -> bool {
        matches!(
            self,
            DieEvent::Nmi | DieEvent::NmiWatchdog | DieEvent::NmiIpi | DieEvent::NmiUnknown
        )
    }
}

/// In-process host with one notifier chain for every event.
pub struct NotifierHost {
    chain: RwLock<Vec<HandlerEntry>>,
    halt: Arc<dyn Halt>,
}

impl NotifierHost {
    pub fn new(halt: Arc<dyn Halt>) -> Self {
        Self {
            chain: RwLock::new(Vec::new()),
            halt,
        }
    }

    pub fn handlers(&self) -> Vec<String> {
        self.chain.read().iter().map(|e| e.name.clone()).collect()
    }

    /// Walk the notifier chain for `event`. Returns the consuming handler.
    ///
    /// Does not return if a handler asks for a halt.
    pub fn notify(&self, event: DieEvent, code: ReasonCode) -> Option<String> {
        if !event.is_nmi() {
            trace!(?event, "non-NMI die event passed over");
            return None;
        }
        let chain = self.chain.read().clone();
        for entry in &chain {
            match entry.handler.handle(SourceType::Unknown, code) {
                Verdict::Pass => continue,
                Verdict::Handled => return Some(entry.name.clone()),
                Verdict::Halt => self.halt.halt(SourceType::Unknown, code),
            }
        }
        None
    }
}

impl InterruptSource for NotifierHost {
    fn backend_name(&self) -> &'static str {
        "notifier"
    }

    fn supports(&self, source: SourceType) -> bool {
        source == SourceType::Unknown
    }

    fn register(
        &self,
        source: SourceType,
        handler: Arc<dyn NmiHandler>,
        priority: Priority,
        name: &str,
    ) -> Result<(), RegistrationError> {
        if !self.supports(source) {
            return Err(RegistrationError::Unsupported {
                source_type: source,
                backend: self.backend_name(),
            });
        }
        let entry = HandlerEntry {
            name: name.to_string(),
            handler,
        };
        insert_entry(&mut self.chain.write(), source, entry, priority)
    }

    fn unregister(&self, source: SourceType, name: &str) -> Result<(), RegistrationError> {
        if !self.supports(source) {
            return Err(RegistrationError::Unsupported {
                source_type: source,
                backend: self.backend_name(),
            });
        }
        remove_entry(&mut self.chain.write(), source, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::halt::PanicHalt;
    use crate::source::testing::RecordingHandler;

    #[test]
    fn only_unknown_is_supported() {
        let host = NotifierHost::new(Arc::new(PanicHalt));
        let h = RecordingHandler::new(Verdict::Pass);
        assert!(host.supports(SourceType::Unknown));
        assert!(!host.supports(SourceType::IoCheck));
        assert!(matches!(
            host.register(SourceType::IoCheck, h.clone(), Priority::First, "h"),
            Err(RegistrationError::Unsupported { .. })
        ));
        host.register(SourceType::Unknown, h, Priority::First, "h").unwrap();
        assert_eq!(host.handlers(), vec!["h"]);
    }

    #[test]
    fn nmi_events_reach_handlers_as_unknown() {
        let host = NotifierHost::new(Arc::new(PanicHalt));
        let h = RecordingHandler::new(Verdict::Handled);
        host.register(SourceType::Unknown, h.clone(), Priority::First, "h").unwrap();

        assert_eq!(host.notify(DieEvent::NmiIpi, ReasonCode(3)).as_deref(), Some("h"));
        assert_eq!(host.notify(DieEvent::Oops, ReasonCode(4)), None);
        assert_eq!(h.seen(), vec![(SourceType::Unknown, ReasonCode(3))]);
    }

    #[test]
    fn unregister_removes_entry() {
        let host = NotifierHost::new(Arc::new(PanicHalt));
        let h = RecordingHandler::new(Verdict::Pass);
        host.register(SourceType::Unknown, h, Priority::First, "h").unwrap();
        host.unregister(SourceType::Unknown, "h").unwrap();
        assert!(host.handlers().is_empty());
        assert!(host.unregister(SourceType::Unknown, "h").is_err());
    }
}
