//! Integration tests for all-or-nothing registration on both host backends.

use std::sync::{Arc, Mutex};

use nmi_common::{Error, ReasonCode, SourceType};
use nmi_config::{BackendKind, Category, NmiConfig, TriageParams};
use nmi_core::{
    ChainHost, CountingCapture, DieEvent, InterruptSource, NmiHandler, NmiManager, NotifierHost,
    PanicHalt, Priority, RegistrationCoordinator, RegistrationError, Verdict, HANDLER_NAME,
};

/// Handler that records every NMI it sees and answers with a fixed verdict.
struct Recorder {
    verdict: Verdict,
    seen: Mutex<Vec<(SourceType, ReasonCode)>>,
}

impl Recorder {
    fn new(verdict: Verdict) -> Arc<Self> {
        Arc::new(Self {
            verdict,
            seen: Mutex::new(Vec::new()),
        })
    }

    fn seen(&self) -> Vec<(SourceType, ReasonCode)> {
        self.seen.lock().unwrap().clone()
    }
}

impl NmiHandler for Recorder {
    fn handle(&self, source: SourceType, code: ReasonCode) -> Verdict {
        self.seen.lock().unwrap().push((source, code));
        self.verdict
    }
}

fn chain_host() -> Arc<ChainHost> {
    Arc::new(ChainHost::new(Arc::new(PanicHalt)))
}

#[test]
fn middle_failure_leaves_zero_sources_bound() {
    let host = chain_host();
    host.refuse_registration(SourceType::SystemError);

    let mut coordinator = RegistrationCoordinator::new(host.clone(), "probe");
    let err = coordinator
        .register_all(
            &[SourceType::Unknown, SourceType::SystemError, SourceType::IoCheck],
            Recorder::new(Verdict::Pass),
        )
        .unwrap_err();

    assert!(matches!(
        err,
        RegistrationError::Refused {
            source_type: SourceType::SystemError,
            ..
        }
    ));
    for source in SourceType::MANAGED {
        assert!(!host.is_bound(source, "probe"), "{source} still bound");
    }
    assert!(coordinator.records().is_empty());
}

#[test]
fn last_failure_unwinds_everything_before_it() {
    let host = chain_host();
    host.refuse_registration(SourceType::IoCheck);

    let mut coordinator = RegistrationCoordinator::new(host.clone(), "probe");
    assert!(coordinator
        .register_all(&SourceType::MANAGED, Recorder::new(Verdict::Pass))
        .is_err());
    assert_eq!(host.bound_count("probe"), 0);

    // A failed attempt leaves the coordinator reusable.
    let host = chain_host();
    let mut coordinator = RegistrationCoordinator::new(host.clone(), "probe");
    let summary = coordinator
        .register_all(&SourceType::MANAGED, Recorder::new(Verdict::Pass))
        .unwrap();
    assert_eq!(summary.bound.len(), 3);
}

#[test]
fn registration_puts_triage_ahead_of_existing_handlers() {
    let host = chain_host();
    let existing = Recorder::new(Verdict::Pass);
    host.register(SourceType::Unknown, existing.clone(), Priority::First, "existing")
        .unwrap();

    let config = NmiConfig {
        params: TriageParams::default().with(Category::Drop, "7"),
        ..NmiConfig::default()
    };
    let _manager =
        NmiManager::start(&config, host.clone(), Arc::new(CountingCapture::new())).unwrap();

    assert_eq!(
        host.handlers(SourceType::Unknown),
        vec![HANDLER_NAME.to_string(), "existing".to_string()]
    );

    // Dropped NMIs never reach the later handler; others do.
    let dropped = host.deliver(SourceType::Unknown, ReasonCode(7));
    assert_eq!(dropped.handled_by.as_deref(), Some(HANDLER_NAME));
    let passed = host.deliver(SourceType::Unknown, ReasonCode(8));
    assert_eq!(passed.handled_by, None);
    assert_eq!(existing.seen(), vec![(SourceType::Unknown, ReasonCode(8))]);
}

#[test]
fn teardown_keeps_going_past_a_stuck_source() {
    let host = chain_host();
    let mut manager = NmiManager::start(
        &NmiConfig::default(),
        host.clone(),
        Arc::new(CountingCapture::new()),
    )
    .unwrap();
    host.refuse_unregistration(SourceType::Unknown);

    let report = manager.shutdown();
    assert_eq!(
        report.unbound,
        vec![SourceType::IoCheck, SourceType::SystemError]
    );
    assert_eq!(report.failed.len(), 1);
    assert!(!manager.is_running());
    assert!(manager.shutdown().is_clean());
}

#[test]
fn notifier_backend_binds_unknown_only() {
    let host = Arc::new(NotifierHost::new(Arc::new(PanicHalt)));
    let config = NmiConfig {
        backend: BackendKind::Notifier,
        params: TriageParams::default()
            .with(Category::Ignore, "1")
            .with(Category::Drop, "2"),
        ..NmiConfig::default()
    };
    let later = Recorder::new(Verdict::Pass);
    host.register(SourceType::Unknown, later.clone(), Priority::Last, "later")
        .unwrap();

    let mut manager =
        NmiManager::start(&config, host.clone(), Arc::new(CountingCapture::new())).unwrap();
    assert_eq!(manager.bound_sources(), vec![SourceType::Unknown]);
    assert_eq!(
        manager.registration().skipped,
        vec![SourceType::SystemError, SourceType::IoCheck]
    );

    assert_eq!(host.notify(DieEvent::Nmi, ReasonCode(1)), None);
    assert_eq!(
        host.notify(DieEvent::NmiUnknown, ReasonCode(2)).as_deref(),
        Some(HANDLER_NAME)
    );
    assert_eq!(host.notify(DieEvent::Trap, ReasonCode(2)), None);
    assert_eq!(later.seen(), vec![(SourceType::Unknown, ReasonCode(1))]);

    assert!(manager.shutdown().is_clean());
    assert_eq!(host.handlers(), vec!["later".to_string()]);
}

#[test]
fn start_error_names_the_refused_source() {
    let host = chain_host();
    host.refuse_registration(SourceType::Unknown);
    let err = NmiManager::start(
        &NmiConfig::default(),
        host.clone(),
        Arc::new(CountingCapture::new()),
    )
    .unwrap_err();

    match err {
        Error::Registration { source_type, .. } => assert_eq!(source_type, SourceType::Unknown),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(host.bound_count(HANDLER_NAME), 0);
}
