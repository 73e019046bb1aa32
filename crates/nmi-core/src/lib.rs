//! NMI triage core: engine, host backends, registration, lifecycle.
//!
//! The [`engine::TriageEngine`] classifies each `(source, reason)` NMI
//! against a frozen [`nmi_config::CategoryTable`]. The
//! [`coordinator::RegistrationCoordinator`] binds it to the host's
//! interrupt sources all-or-nothing, and [`manager::NmiManager`] ties
//! startup and teardown together.

pub mod capture;
pub mod coordinator;
pub mod engine;
pub mod exit_codes;
pub mod global;
pub mod halt;
pub mod manager;
pub mod source;

pub use capture::{BacktraceCapture, CountingCapture, DiagnosticCapture};
pub use coordinator::{
    RegistrationCoordinator, RegistrationRecord, RegistrationSummary, TeardownFailure,
    TeardownReport,
};
pub use engine::{Decision, Outcome, TriageEngine, TriageStats};
pub use exit_codes::ExitCode;
pub use halt::{AbortHalt, Halt, PanicHalt, HALT_MESSAGE};
pub use manager::{HandlerBinding, NmiManager, HANDLER_NAME};
pub use source::{
    ChainHost, Delivery, DieEvent, InterruptSource, NmiHandler, NotifierHost, Priority,
    RegistrationError, Verdict,
};
