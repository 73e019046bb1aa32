//! Terminal halt actions.
//!
//! The triage engine only reports [`Outcome::PanicTriggered`]; the host turns
//! that into a halt through one of these. A halt never returns.
//!
//! [`Outcome::PanicTriggered`]: crate::engine::Outcome::PanicTriggered

use nmi_common::{ReasonCode, SourceType};
use tracing::error;

/// Message carried by every deliberate halt.
pub const HALT_MESSAGE: &str = "nmimgr: Hit explicit panic";

/// Capability that stops the system.
pub trait Halt: Send + Sync {
    fn halt(&self, source: SourceType, code: ReasonCode) -> !;
}

/// Abort the process immediately. No unwinding, no destructors.
#[derive(Debug, Default, Clone, Copy)]
pub struct AbortHalt;

impl Halt for AbortHalt {
    fn halt(&self, source: SourceType, code: ReasonCode) -> ! {
        error!(
            severity = "emergency",
            %source,
            reason = code.0,
            "{HALT_MESSAGE}"
        );
        std::process::abort()
    }
}

/// Unwinding panic. Used for dry runs and tests, where the caller can observe
/// the halt instead of losing the process.
#[derive(Debug, Default, Clone, Copy)]
pub struct PanicHalt;

impl Halt for PanicHalt {
    fn halt(&self, source: SourceType, code: ReasonCode) -> ! {
        error!(
            severity = "emergency",
            %source,
            reason = code.0,
            "{HALT_MESSAGE}"
        );
        panic!("{HALT_MESSAGE} (source {source}, event {code})")
    }
}
