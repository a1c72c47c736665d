//! ---
//! ilk_section: "15-testing-qa"
//! ilk_subsection: "integration-tests"
//! ilk_type: "source"
//! ilk_scope: "code"
//! ilk_description: "Failure-path scenarios: aborts, timeouts, and lifecycle errors."
//! ilk_version: "v0.1.0"
//! ilk_owner: "tbd"
//! ---
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use interlock_common::config::HarnessConfig;
use interlock_harness::{ContractOutcome, HarnessError, MethodTable, RunnableBuilder, Scenario};

fn config() -> HarnessConfig {
    HarnessConfig::default().with_step_timeout(Duration::from_secs(2))
}

#[test]
fn unknown_method_id_fails_before_any_worker_spawns() {
    let table = MethodTable::new();
    let err = table
        .resolve("widget::does_not_exist")
        .err()
        .expect("unknown identifier");
    assert!(matches!(err, HarnessError::Resolution(message)
        if message.contains("widget::does_not_exist")));
}

#[test]
fn run_phase_error_aborts_scenario_and_joins_all_workers() {
    let b_terminated = Arc::new(AtomicBool::new(false));
    let b_flag = b_terminated.clone();

    let a = RunnableBuilder::new()
        .run(|cx| {
            cx.arrive("a1")?;
            bail!("kaboom");
        })
        .build()
        .expect("contract a builds");
    let b = RunnableBuilder::new()
        .run(|cx| {
            cx.arrive("b1")?;
            Ok(())
        })
        .terminate(move || {
            b_flag.store(true, Ordering::SeqCst);
            Ok(())
        })
        .build()
        .expect("contract b builds");

    let failure = Scenario::new()
        .contract("A", a)
        .contract("B", b)
        .advance("B", "b1")
        .advance("A", "a1")
        .run_to_completion("A")
        .run(&config())
        .expect_err("run phase failure aborts the scenario");

    assert!(matches!(&failure.error, HarnessError::RunPhase { contract, message }
        if contract == "A" && message.contains("kaboom")));
    // B was blocked at b1 when A failed; the abort detached it and both
    // workers were joined before run() returned, so its teardown already ran
    assert!(b_terminated.load(Ordering::SeqCst));
    assert!(matches!(
        failure.report.outcome("A"),
        Some(ContractOutcome::Failed { .. })
    ));
    assert_eq!(failure.report.outcome("B"), Some(&ContractOutcome::Completed));
    // partial crossing log captured before the abort is preserved
    let order: Vec<(&str, &str)> = failure
        .report
        .crossings
        .iter()
        .map(|c| (c.contract.as_str(), c.breakpoint.as_str()))
        .collect();
    assert_eq!(order, vec![("B", "b1"), ("A", "a1")]);
}

#[test]
fn step_times_out_when_breakpoint_is_never_reached() {
    let terminated = Arc::new(AtomicBool::new(false));
    let flag = terminated.clone();

    // the run phase dawdles and never arrives anywhere, so the step must
    // fail within the configured bound instead of hanging the test
    let contract = RunnableBuilder::new()
        .run(|_cx| {
            std::thread::sleep(Duration::from_millis(300));
            Ok(())
        })
        .terminate(move || {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        })
        .build()
        .expect("contract builds");

    let failure = Scenario::new()
        .contract("slow", contract)
        .advance("slow", "never")
        .run(&HarnessConfig::default().with_step_timeout(Duration::from_millis(50)))
        .expect_err("step times out");

    assert!(matches!(&failure.error, HarnessError::StepTimeout { contract, waited_ms, .. }
        if contract == "slow" && *waited_ms == 50));
    // the worker was still joined during cleanup
    assert!(terminated.load(Ordering::SeqCst));
    assert!(failure.report.crossings.is_empty());
}

#[test]
fn stepping_past_completion_is_a_deterministic_failure() {
    let contract = RunnableBuilder::new()
        .run(|cx| {
            cx.arrive("only")?;
            Ok(())
        })
        .build()
        .expect("contract builds");

    let failure = Scenario::new()
        .contract("A", contract)
        .advance("A", "only")
        .run_to_completion("A")
        .advance("A", "after-the-end")
        .run(&config())
        .expect_err("worker already completed");

    assert!(matches!(&failure.error, HarnessError::StepTimeout { waited_ms: 0, .. }));
}

#[test]
fn duplicate_breakpoint_crossing_fails_the_contract() {
    let contract = RunnableBuilder::new()
        .run(|cx| {
            cx.arrive("p")?;
            cx.arrive("p")?;
            Ok(())
        })
        .build()
        .expect("contract builds");

    let failure = Scenario::new()
        .contract("A", contract)
        .advance("A", "p")
        .run_to_completion("A")
        .run(&config())
        .expect_err("second crossing of `p` is rejected");

    assert_eq!(
        failure.error,
        HarnessError::DuplicateBreakpoint {
            contract: "A".into(),
            breakpoint: "p".into(),
        }
    );
    assert_eq!(failure.report.crossings.len(), 1);
}

#[test]
fn initialization_error_aborts_before_any_breakpoint() {
    let contract = RunnableBuilder::new()
        .initialize(|| bail!("database unavailable"))
        .run(|cx| {
            cx.arrive("unreachable")?;
            Ok(())
        })
        .build()
        .expect("contract builds");

    let failure = Scenario::new()
        .contract("A", contract)
        .advance("A", "unreachable")
        .run(&config())
        .expect_err("initialization failure aborts");

    assert!(matches!(&failure.error, HarnessError::Initialization { contract, message }
        if contract == "A" && message.contains("database unavailable")));
    assert!(failure.report.crossings.is_empty());
}

#[test]
fn panic_in_run_phase_becomes_a_run_phase_error() {
    let contract = RunnableBuilder::new()
        .run(|_cx| panic!("unexpected state"))
        .build()
        .expect("contract builds");

    let failure = Scenario::new()
        .contract("A", contract)
        .run_to_completion("A")
        .run(&config())
        .expect_err("panic surfaces as an error");

    assert!(matches!(&failure.error, HarnessError::RunPhase { message, .. }
        if message.contains("unexpected state")));
}

#[test]
fn teardown_error_is_retained_but_never_masks_run_error() {
    let contract = RunnableBuilder::new()
        .run(|_cx| bail!("primary failure"))
        .terminate(|| bail!("cleanup failure"))
        .build()
        .expect("contract builds");

    let failure = Scenario::new()
        .contract("A", contract)
        .run_to_completion("A")
        .run(&config())
        .expect_err("run phase failure surfaces");

    // run-phase error is primary
    assert!(matches!(&failure.error, HarnessError::RunPhase { message, .. }
        if message.contains("primary failure")));
    // teardown error is retained alongside it
    match failure.report.outcome("A") {
        Some(ContractOutcome::Failed {
            error,
            teardown_error: Some(teardown),
        }) => {
            assert!(error.contains("primary failure"));
            assert!(teardown.contains("cleanup failure"));
        }
        other => panic!("expected failed outcome with teardown error, got {other:?}"),
    }
}

#[test]
fn teardown_error_alone_fails_the_contract() {
    let contract = RunnableBuilder::new()
        .run(|_cx| Ok(()))
        .terminate(|| bail!("cleanup failure"))
        .build()
        .expect("contract builds");

    let failure = Scenario::new()
        .contract("A", contract)
        .run_to_completion("A")
        .run(&config())
        .expect_err("teardown failure surfaces");

    assert!(matches!(&failure.error, HarnessError::Teardown { contract, message }
        if contract == "A" && message.contains("cleanup failure")));
    match failure.report.outcome("A") {
        Some(ContractOutcome::Failed {
            teardown_error: None,
            ..
        }) => {}
        other => panic!("expected failed outcome without duplicated teardown error, got {other:?}"),
    }
}
