//! Property-based tests for triage ordering.

use std::sync::Arc;

use nmi_common::{ReasonCode, SourceType};
use nmi_config::{Category, CategoryTable, TriageParams};
use nmi_core::{CountingCapture, Outcome, TriageEngine, Verdict, NmiHandler};
use proptest::prelude::*;

fn list(codes: &[u8]) -> String {
    codes
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

fn source_strategy() -> impl Strategy<Value = SourceType> {
    prop_oneof![
        Just(SourceType::Unknown),
        Just(SourceType::SystemError),
        Just(SourceType::IoCheck),
    ]
}

fn codes() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..40)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    #[test]
    fn outcome_follows_priority_order(
        ignore in codes(),
        debug in codes(),
        drop in codes(),
        panic in codes(),
        source in source_strategy(),
        code in any::<u8>(),
    ) {
        let params = TriageParams::default()
            .with(Category::Ignore, list(&ignore))
            .with(Category::Debug, list(&debug))
            .with(Category::Drop, list(&drop))
            .with(Category::Panic, list(&panic));
        let (table, diagnostics) = CategoryTable::from_params(&params);
        prop_assert!(diagnostics.is_empty());

        let capture = Arc::new(CountingCapture::new());
        let engine = TriageEngine::new(table, capture.clone());
        let outcome = engine.evaluate(source, ReasonCode(code));

        let expected = if ignore.contains(&code) {
            Outcome::Suppressed
        } else if drop.contains(&code) {
            Outcome::Dropped
        } else if panic.contains(&code) {
            Outcome::PanicTriggered
        } else {
            Outcome::Unmanaged
        };
        prop_assert_eq!(outcome, expected);

        let captured = !ignore.contains(&code) && debug.contains(&code);
        prop_assert_eq!(capture.count(), usize::from(captured));
    }

    #[test]
    fn evaluation_is_deterministic(
        drop in codes(),
        panic in codes(),
        code in any::<u8>(),
    ) {
        let params = TriageParams::default()
            .with(Category::Drop, list(&drop))
            .with(Category::Panic, list(&panic));
        let (table, _) = CategoryTable::from_params(&params);
        let engine = TriageEngine::new(table, Arc::new(CountingCapture::new()));

        let first = engine.decide(ReasonCode(code));
        for source in SourceType::MANAGED {
            prop_assert_eq!(engine.decide(ReasonCode(code)), first);
            prop_assert_eq!(engine.evaluate(source, ReasonCode(code)), first.outcome);
        }
    }

    #[test]
    fn handler_verdict_matches_outcome(
        ignore in codes(),
        drop in codes(),
        code in any::<u8>(),
    ) {
        let params = TriageParams::default()
            .with(Category::Ignore, list(&ignore))
            .with(Category::Drop, list(&drop));
        let (table, _) = CategoryTable::from_params(&params);
        let engine = TriageEngine::new(table, Arc::new(CountingCapture::new()));

        let verdict = engine.handle(SourceType::Unknown, ReasonCode(code));
        let expected = if !ignore.contains(&code) && drop.contains(&code) {
            Verdict::Handled
        } else {
            Verdict::Pass
        };
        prop_assert_eq!(verdict, expected);
    }
}

#[test]
fn empty_configuration_manages_nothing() {
    let (table, diagnostics) = CategoryTable::from_params(&TriageParams::default());
    assert!(diagnostics.is_empty());
    let capture = Arc::new(CountingCapture::new());
    let engine = TriageEngine::new(table, capture.clone());

    for code in 0..=u8::MAX {
        assert_eq!(
            engine.evaluate(SourceType::Unknown, ReasonCode(code)),
            Outcome::Unmanaged
        );
    }
    assert_eq!(capture.count(), 0);
    assert_eq!(engine.stats().unmanaged, 256);
}

#[test]
fn rejected_list_leaves_other_categories_active() {
    let params = TriageParams::default()
        .with(Category::Drop, "1-3,x")
        .with(Category::Panic, "2");
    let (table, diagnostics) = CategoryTable::from_params(&params);
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].category, Category::Drop);

    let engine = TriageEngine::new(table, Arc::new(CountingCapture::new()));
    assert_eq!(
        engine.evaluate(SourceType::Unknown, ReasonCode(1)),
        Outcome::Unmanaged
    );
    assert_eq!(
        engine.evaluate(SourceType::Unknown, ReasonCode(2)),
        Outcome::PanicTriggered
    );
}
