//! Per-source handler chains.
//!
//! Each [`SourceType`] has its own ordered chain. An NMI walks the chain of
//! its source until a handler returns [`Verdict::Handled`]; a
//! [`Verdict::Halt`] stops the system through the host's [`Halt`].

use std::collections::HashSet;
use std::sync::Arc;

use nmi_common::{ReasonCode, SourceType};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{info, trace};

use super::{
    insert_entry, remove_entry, HandlerEntry, InterruptSource, NmiHandler, Priority,
    RegistrationError, Verdict,
};
use crate::halt::Halt;

/// Result of one delivery through the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Delivery {
    pub source: SourceType,
    pub code: ReasonCode,
    /// Handlers that were invoked, in order.
    pub visited: Vec<String>,
    /// Handler that consumed the NMI, if any.
    pub handled_by: Option<String>,
}

/// In-process host with one handler chain per source.
pub struct ChainHost {
    chains: RwLock<[Vec<HandlerEntry>; 4]>,
    refused: RwLock<HashSet<SourceType>>,
    sticky: RwLock<HashSet<SourceType>>,
    halt: Arc<dyn Halt>,
}

impl ChainHost {
    pub fn new(halt: Arc<dyn Halt>) -> Self {
        Self {
            chains: RwLock::new(Default::default()),
            refused: RwLock::new(HashSet::new()),
            sticky: RwLock::new(HashSet::new()),
            halt,
        }
    }

    /// Make every future registration on `source` fail.
    pub fn refuse_registration(&self, source: SourceType) {
        self.refused.write().insert(source);
    }

    /// Make every future unregistration on `source` fail.
    pub fn refuse_unregistration(&self, source: SourceType) {
        self.sticky.write().insert(source);
    }

    /// Names registered on `source`, in dispatch order.
    pub fn handlers(&self, source: SourceType) -> Vec<String> {
        self.chains.read()[slot(source)]
            .iter()
            .map(|e| e.name.clone())
            .collect()
    }

    pub fn is_bound(&self, source: SourceType, name: &str) -> bool {
        self.chains.read()[slot(source)]
            .iter()
            .any(|e| e.name == name)
    }

    /// Number of sources `name` is currently bound to.
    pub fn bound_count(&self, name: &str) -> usize {
        self.chains
            .read()
            .iter()
            .filter(|chain| chain.iter().any(|e| e.name == name))
            .count()
    }

    /// Dispatch an NMI the way the host's NMI entry would.
    ///
    /// Does not return if a handler asks for a halt.
    pub fn deliver(&self, source: SourceType, code: ReasonCode) -> Delivery {
        // Snapshot the chain so handlers run without the host lock held.
        let chain = self.chains.read()[slot(source)].clone();
        let mut visited = Vec::with_capacity(chain.len());

        for entry in &chain {
            visited.push(entry.name.clone());
            match entry.handler.handle(source, code) {
                Verdict::Pass => continue,
                Verdict::Handled => {
                    trace!(%source, reason = code.0, handler = %entry.name, "NMI handled");
                    return Delivery {
                        source,
                        code,
                        visited,
                        handled_by: Some(entry.name.clone()),
                    };
                }
                Verdict::Halt => self.halt.halt(source, code),
            }
        }

        info!(%source, reason = code.0, "NMI not claimed by any handler");
        Delivery {
            source,
            code,
            visited,
            handled_by: None,
        }
    }
}

impl InterruptSource for ChainHost {
    fn backend_name(&self) -> &'static str {
        "chain"
    }

    fn supports(&self, _source: SourceType) -> bool {
        true
    }

    fn register(
        &self,
        source: SourceType,
        handler: Arc<dyn NmiHandler>,
        priority: Priority,
        name: &str,
    ) -> Result<(), RegistrationError> {
        if self.refused.read().contains(&source) {
            return Err(RegistrationError::Refused {
                source_type: source,
                reason: "registration rejected by host".to_string(),
            });
        }
        let entry = HandlerEntry {
            name: name.to_string(),
            handler,
        };
        insert_entry(&mut self.chains.write()[slot(source)], source, entry, priority)
    }

    fn unregister(&self, source: SourceType, name: &str) -> Result<(), RegistrationError> {
        if self.sticky.read().contains(&source) {
            return Err(RegistrationError::Refused {
                source_type: source,
                reason: "unregistration rejected by host".to_string(),
            });
        }
        remove_entry(&mut self.chains.write()[slot(source)], source, name)
    }
}

fn slot(source: SourceType) -> usize {
    source.index() as usize
}
