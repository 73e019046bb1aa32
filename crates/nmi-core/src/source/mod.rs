//! Host interrupt-source capability.
//!
//! The host owns NMI dispatch. It exposes registration of named handlers per
//! [`SourceType`] and calls every registered [`NmiHandler`] when an NMI of
//! that class arrives. Different hosts register differently, so each
//! registration strategy is its own backend behind [`InterruptSource`]:
//!
//! - [`ChainHost`]: per-source handler chains with priority ordering.
//! - [`NotifierHost`]: one legacy notifier chain covering every NMI; only
//!   [`SourceType::Unknown`] can be targeted.

pub mod chain;
pub mod notifier;

use std::fmt;
use std::sync::Arc;

use nmi_common::{ReasonCode, SourceType};
use serde::Serialize;
use thiserror::Error;

pub use chain::{ChainHost, Delivery};
pub use notifier::{DieEvent, NotifierHost};

/// What a handler tells the host after seeing an NMI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Not consumed; the host keeps walking the chain (`NMI_DONE`).
    Pass,
    /// Consumed; later handlers do not see it (`NMI_HANDLED`).
    Handled,
    /// The host must halt the system now.
    Halt,
}

/// Callback the host invokes for every NMI on a bound source.
///
/// Runs in NMI context: implementations must not block, sleep, or take
/// locks that the interrupted code could hold.
pub trait NmiHandler: Send + Sync {
    fn handle(&self, source: SourceType, code: ReasonCode) -> Verdict;
}

/// Position in a source's handler chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Run before every handler already registered.
    #[default]
    First,
    /// Run after every handler already registered.
    Last,
}

/// Errors reported by a host backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    #[error("host refused handler for {source_type}: {reason}")]
    Refused {
        source_type: SourceType,
        reason: String,
    },

    #[error("handler '{name}' already registered for {source_type}")]
    Duplicate { source_type: SourceType, name: String },

    #[error("handler '{name}' is not registered for {source_type}")]
    NotRegistered { source_type: SourceType, name: String },

    #[error("{source_type} is not supported by the {backend} backend")]
    Unsupported {
        source_type: SourceType,
        backend: &'static str,
    },

    #[error("handlers are already bound; tear down before registering again")]
    AlreadyBound,
}

impl RegistrationError {
    /// The source the failure concerns, when there is one.
    pub fn source_type(&self) -> Option<SourceType> {
        match self {
            RegistrationError::Refused { source_type, .. }
            | RegistrationError::Duplicate { source_type, .. }
            | RegistrationError::NotRegistered { source_type, .. }
            | RegistrationError::Unsupported { source_type, .. } => Some(*source_type),
            RegistrationError::AlreadyBound => None,
        }
    }
}

/// Registration capability provided by the host.
pub trait InterruptSource: Send + Sync {
    /// Short backend name for logs.
    fn backend_name(&self) -> &'static str;

    /// Whether `source` can be targeted by [`register`](Self::register).
    fn supports(&self, source: SourceType) -> bool;

    fn register(
        &self,
        source: SourceType,
        handler: Arc<dyn NmiHandler>,
        priority: Priority,
        name: &str,
    ) -> Result<(), RegistrationError>;

    fn unregister(&self, source: SourceType, name: &str) -> Result<(), RegistrationError>;
}

/// Named handler entry shared by the in-process backends.
#[derive(Clone)]
pub(crate) struct HandlerEntry {
    pub name: String,
    pub handler: Arc<dyn NmiHandler>,
}

impl fmt::Debug for HandlerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerEntry")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Insert `entry` at the position `priority` asks for, refusing duplicates.
pub(crate) fn insert_entry(
    chain: &mut Vec<HandlerEntry>,
    source: SourceType,
    entry: HandlerEntry,
    priority: Priority,
) -> Result<(), RegistrationError> {
    if chain.iter().any(|e| e.name == entry.name) {
        return Err(RegistrationError::Duplicate {
            source_type: source,
            name: entry.name,
        });
    }
    match priority {
        Priority::First => chain.insert(0, entry),
        Priority::Last => chain.push(entry),
    }
    Ok(())
}

/// Remove the entry called `name`.
pub(crate) fn remove_entry(
    chain: &mut Vec<HandlerEntry>,
    source: SourceType,
    name: &str,
) -> Result<(), RegistrationError> {
    match chain.iter().position(|e| e.name == name) {
        Some(idx) => {
            chain.remove(idx);
            Ok(())
        }
        None => Err(RegistrationError::NotRegistered {
            source_type: source,
            name: name.to_string(),
        }),
    }
}
