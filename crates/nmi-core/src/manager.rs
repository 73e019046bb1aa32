//! Startup and teardown of NMI triage on a host.
//!
//! `start` parses the lists, freezes them into an engine, and binds the
//! engine to every configured source. Configuration mistakes only disable
//! the affected category; a registration failure aborts startup with nothing
//! left bound. `shutdown` (or drop) unbinds everything.

use std::sync::Arc;

use nmi_common::{Error, Result, SourceType};
use nmi_config::{CategoryTable, ConfigDiagnostic, NmiConfig};
use tracing::{info, warn};

use crate::capture::DiagnosticCapture;
use crate::coordinator::{RegistrationCoordinator, RegistrationSummary, TeardownReport};
use crate::engine::TriageEngine;
use crate::global::{self, GlobalHandler};
use crate::source::{InterruptSource, NmiHandler, RegistrationError};

/// Name handlers are registered under.
pub const HANDLER_NAME: &str = "nmimgr";

/// Manager version, reported at load.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// How the engine is handed to the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HandlerBinding {
    /// Register the engine object itself.
    #[default]
    Owned,
    /// Install the engine in the process-wide slot and register
    /// [`GlobalHandler`]. Allowed once per process.
    Global,
}

/// A running triage setup.
#[derive(Debug)]
pub struct NmiManager {
    engine: Arc<TriageEngine>,
    coordinator: RegistrationCoordinator,
    diagnostics: Vec<ConfigDiagnostic>,
    summary: RegistrationSummary,
}

impl NmiManager {
    pub fn start(
        config: &NmiConfig,
        host: Arc<dyn InterruptSource>,
        capture: Arc<dyn DiagnosticCapture>,
    ) -> Result<Self> {
        Self::start_with(config, host, capture, HandlerBinding::Owned)
    }

    pub fn start_with(
        config: &NmiConfig,
        host: Arc<dyn InterruptSource>,
        capture: Arc<dyn DiagnosticCapture>,
        binding: HandlerBinding,
    ) -> Result<Self> {
        info!(version = VERSION, backend = host.backend_name(), "loaded NMI manager");

        let (table, diagnostics) = CategoryTable::build(&config.params, config.capacity);
        let engine = Arc::new(TriageEngine::new(table, capture));

        let handler: Arc<dyn NmiHandler> = match binding {
            HandlerBinding::Owned => engine.clone() as Arc<dyn NmiHandler>,
            HandlerBinding::Global => {
                global::install(engine.clone())?;
                Arc::new(GlobalHandler)
            }
        };

        let mut coordinator = RegistrationCoordinator::new(host, HANDLER_NAME);
        let summary = coordinator
            .register_all(&config.sources, handler)
            .map_err(|err| {
                warn!(error = %err, "NMI management not available");
                registration_error(err)
            })?;

        Ok(Self {
            engine,
            coordinator,
            diagnostics,
            summary,
        })
    }

    pub fn engine(&self) -> &Arc<TriageEngine> {
        &self.engine
    }

    /// Lists rejected at startup.
    pub fn diagnostics(&self) -> &[ConfigDiagnostic] {
        &self.diagnostics
    }

    pub fn registration(&self) -> &RegistrationSummary {
        &self.summary
    }

    pub fn bound_sources(&self) -> Vec<SourceType> {
        self.coordinator.bound_sources()
    }

    pub fn is_running(&self) -> bool {
        !self.coordinator.records().is_empty()
    }

    /// Unbind every source. Safe to call more than once.
    pub fn shutdown(&mut self) -> TeardownReport {
        let was_running = self.is_running();
        let report = self.coordinator.unregister_all();
        if was_running {
            info!(
                unbound = report.unbound.len(),
                failed = report.failed.len(),
                "unloaded NMI manager"
            );
        }
        report
    }
}

impl Drop for NmiManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn registration_error(err: RegistrationError) -> Error {
    match err {
        RegistrationError::Unsupported {
            source_type,
            backend,
        } => Error::UnsupportedSource {
            source_type,
            backend: backend.to_string(),
        },
        other => match other.source_type() {
            Some(source_type) => Error::Registration {
                source_type,
                reason: other.to_string(),
            },
            None => Error::Config(other.to_string()),
        },
    }
}
