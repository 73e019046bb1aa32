//! All-or-nothing registration of one handler across several NMI sources.
//!
//! `register_all` either binds every supported source or leaves none bound:
//! the first host refusal unwinds the sources already bound, newest first.
//! `unregister_all` is best-effort and idempotent; one stuck source never
//! keeps the others bound.

use std::sync::Arc;

use nmi_common::SourceType;
use serde::Serialize;
use tracing::{info, warn};

use crate::source::{InterruptSource, NmiHandler, Priority, RegistrationError};

/// One bound source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RegistrationRecord {
    pub source: SourceType,
    pub priority: Priority,
}

/// What `register_all` did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegistrationSummary {
    pub bound: Vec<SourceType>,
    /// Requested sources the backend cannot target.
    pub skipped: Vec<SourceType>,
}

/// What `unregister_all` did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TeardownReport {
    pub unbound: Vec<SourceType>,
    pub failed: Vec<TeardownFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeardownFailure {
    pub source: SourceType,
    pub error: String,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Binds a handler to host sources and remembers what it bound.
pub struct RegistrationCoordinator {
    host: Arc<dyn InterruptSource>,
    name: String,
    records: Vec<RegistrationRecord>,
}

impl RegistrationCoordinator {
    pub fn new(host: Arc<dyn InterruptSource>, name: impl Into<String>) -> Self {
        Self {
            host,
            name: name.into(),
            records: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn backend_name(&self) -> &'static str {
        self.host.backend_name()
    }

    /// Bound sources, in registration order.
    pub fn records(&self) -> &[RegistrationRecord] {
        &self.records
    }

    pub fn bound_sources(&self) -> Vec<SourceType> {
        self.records.iter().map(|r| r.source).collect()
    }

    pub fn is_bound(&self, source: SourceType) -> bool {
        self.records.iter().any(|r| r.source == source)
    }

    /// Bind `handler` to every source in `sources`, in order, ahead of any
    /// handler already present.
    ///
    /// On failure every source bound by this call is unbound again (reverse
    /// order) before the error is returned. Sources the backend cannot target
    /// are skipped, but a call that binds nothing at all fails with
    /// [`RegistrationError::Unsupported`].
    pub fn register_all(
        &mut self,
        sources: &[SourceType],
        handler: Arc<dyn NmiHandler>,
    ) -> Result<RegistrationSummary, RegistrationError> {
        if !self.records.is_empty() {
            return Err(RegistrationError::AlreadyBound);
        }

        let mut summary = RegistrationSummary::default();
        for &source in sources {
            if !self.host.supports(source) {
                info!(
                    %source,
                    backend = self.host.backend_name(),
                    "source not available on this host, skipping"
                );
                summary.skipped.push(source);
                continue;
            }

            let priority = Priority::First;
            if let Err(err) = self
                .host
                .register(source, Arc::clone(&handler), priority, &self.name)
            {
                warn!(
                    %source,
                    host_name = source.host_name(),
                    error = %err,
                    "unable to register handler, rolling back"
                );
                self.rollback();
                return Err(err);
            }

            info!(%source, host_name = source.host_name(), "registered handler");
            self.records.push(RegistrationRecord { source, priority });
            summary.bound.push(source);
        }

        // Every requested source was skipped: nothing would ever be triaged.
        if summary.bound.is_empty() {
            if let Some(&source_type) = summary.skipped.first() {
                return Err(RegistrationError::Unsupported {
                    source_type,
                    backend: self.host.backend_name(),
                });
            }
        }

        Ok(summary)
    }

    fn rollback(&mut self) {
        while let Some(record) = self.records.pop() {
            if let Err(err) = self.host.unregister(record.source, &self.name) {
                warn!(source = %record.source, error = %err, "rollback could not unregister handler");
            }
        }
    }

    /// Unbind every bound source in reverse registration order.
    ///
    /// Failures are logged and reported but never stop the remaining
    /// unregistrations. Calling this again with nothing bound is a no-op.
    pub fn unregister_all(&mut self) -> TeardownReport {
        let mut report = TeardownReport::default();
        while let Some(record) = self.records.pop() {
            match self.host.unregister(record.source, &self.name) {
                Ok(()) => {
                    info!(source = %record.source, "unregistered handler");
                    report.unbound.push(record.source);
                }
                Err(err) => {
                    warn!(source = %record.source, error = %err, "unable to unregister handler");
                    report.failed.push(TeardownFailure {
                        source: record.source,
                        error: err.to_string(),
                    });
                }
            }
        }
        report
    }
}

impl std::fmt::Debug for RegistrationCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationCoordinator")
            .field("backend", &self.host.backend_name())
            .field("name", &self.name)
            .field("records", &self.records)
            .finish()
    }
}
