//! ---
//! ilk_section: "15-testing-qa"
//! ilk_subsection: "integration-tests"
//! ilk_type: "source"
//! ilk_scope: "code"
//! ilk_description: "End-to-end scenarios exercising deterministic interleaving."
//! ilk_version: "v0.1.0"
//! ilk_owner: "tbd"
//! ---
use std::sync::{Arc, Mutex};
use std::time::Duration;

use interlock_common::config::HarnessConfig;
use interlock_harness::{
    ContractOutcome, Crossing, MethodTable, Runnable, RunnableBuilder, Scenario, WorkerContext,
};

fn config() -> HarnessConfig {
    HarnessConfig::default().with_step_timeout(Duration::from_secs(2))
}

#[test]
fn two_contract_scenario_records_the_requested_interleaving() {
    // contract A crosses a1 then a2; contract B has no breakpoints
    let a = RunnableBuilder::new()
        .run(|cx| {
            cx.arrive("a1")?;
            cx.arrive("a2")?;
            Ok(())
        })
        .build()
        .expect("contract a builds");
    let b = RunnableBuilder::new()
        .run(|_cx| Ok(()))
        .build()
        .expect("contract b builds");

    let report = Scenario::new()
        .contract("A", a)
        .contract("B", b)
        .advance("A", "a1")
        .advance("A", "a2")
        .run_to_completion("A")
        .run_to_completion("B")
        .run(&config())
        .expect("scenario completes");

    assert_eq!(
        report.crossings,
        vec![
            Crossing {
                contract: "A".into(),
                breakpoint: "a1".into(),
                sequence: 1,
            },
            Crossing {
                contract: "A".into(),
                breakpoint: "a2".into(),
                sequence: 2,
            },
        ]
    );
    assert_eq!(report.outcome("A"), Some(&ContractOutcome::Completed));
    assert_eq!(report.outcome("B"), Some(&ContractOutcome::Completed));
    assert!(report.all_completed());
}

#[test]
fn interleaved_writes_follow_the_plan_order() {
    let events: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    let contract = |first: &'static str, second: &'static str| {
        let events = events.clone();
        RunnableBuilder::new()
            .run(move |cx| {
                cx.arrive("ready")?;
                events.lock().unwrap().push(first);
                cx.arrive("mid")?;
                events.lock().unwrap().push(second);
                Ok(())
            })
            .build()
            .expect("contract builds")
    };

    let report = Scenario::new()
        .contract("A", contract("A:first", "A:second"))
        .contract("B", contract("B:first", "B:second"))
        .advance("A", "ready")
        .advance("B", "ready")
        .advance("A", "mid")
        .advance("B", "mid")
        .run_to_completion("A")
        .run_to_completion("B")
        .run(&config())
        .expect("scenario completes");

    // both threads really ran, but only in the order the plan dictated
    assert_eq!(
        *events.lock().unwrap(),
        vec!["A:first", "B:first", "A:second", "B:second"]
    );
    let order: Vec<(&str, &str)> = report
        .crossings
        .iter()
        .map(|c| (c.contract.as_str(), c.breakpoint.as_str()))
        .collect();
    assert_eq!(
        order,
        vec![
            ("A", "ready"),
            ("B", "ready"),
            ("A", "mid"),
            ("B", "mid"),
        ]
    );
}

#[test]
fn crossing_log_length_equals_breakpoints_reached() {
    let a = RunnableBuilder::new()
        .run(|cx| {
            cx.arrive("a1")?;
            cx.arrive("a2")?;
            cx.arrive("a3")?;
            Ok(())
        })
        .build()
        .expect("contract a builds");
    let b = RunnableBuilder::new()
        .run(|cx| {
            cx.arrive("b1")?;
            Ok(())
        })
        .build()
        .expect("contract b builds");

    // finish() drives through every remaining breakpoint, so all four are
    // reached and recorded
    let report = Scenario::new()
        .contract("A", a)
        .contract("B", b)
        .advance("A", "a1")
        .advance("B", "b1")
        .run_to_completion("A")
        .run_to_completion("B")
        .run(&config())
        .expect("scenario completes");

    assert_eq!(report.crossings.len(), 4);
    assert_eq!(report.crossings_for("A").count(), 3);
    assert_eq!(report.crossings_for("B").count(), 1);
    // per-contract crossing order is sequence-monotonic
    let a_sequences: Vec<u64> = report.crossings_for("A").map(|c| c.sequence).collect();
    assert!(a_sequences.windows(2).all(|pair| pair[0] < pair[1]));
}

#[test]
fn zero_breakpoint_contract_round_trips_through_finish() {
    let report = Scenario::new()
        .contract(
            "solo",
            RunnableBuilder::new()
                .run(|_cx| Ok(()))
                .build()
                .expect("contract builds"),
        )
        .run_to_completion("solo")
        .run(&config())
        .expect("scenario completes");

    assert!(report.crossings.is_empty());
    assert_eq!(report.outcome("solo"), Some(&ContractOutcome::Completed));
}

#[test]
fn lifecycle_hooks_run_in_order() {
    let events: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
    let init_events = events.clone();
    let run_events = events.clone();
    let term_events = events.clone();

    let contract = RunnableBuilder::new()
        .method_id("ledger::post")
        .initialize(move || {
            init_events.lock().unwrap().push("initialize");
            Ok(())
        })
        .run(move |cx| {
            run_events.lock().unwrap().push("run");
            cx.arrive("posted")?;
            Ok(())
        })
        .terminate(move || {
            term_events.lock().unwrap().push("terminate");
            Ok(())
        })
        .build()
        .expect("contract builds");

    let report = Scenario::new()
        .contract("ledger", contract)
        .advance("ledger", "posted")
        .run_to_completion("ledger")
        .run(&config())
        .expect("scenario completes");

    assert_eq!(
        *events.lock().unwrap(),
        vec!["initialize", "run", "terminate"]
    );
    assert!(report.all_completed());
}

#[test]
fn method_table_resolution_feeds_a_scenario() {
    struct CounterProbe {
        ticks: u32,
    }

    impl Runnable for CounterProbe {
        fn method_id(&self) -> Option<&str> {
            Some("counter::tick")
        }

        fn run(&mut self, cx: &WorkerContext) -> anyhow::Result<()> {
            cx.register("before-tick")?;
            cx.arrive("before-tick")?;
            self.ticks += 1;
            Ok(())
        }
    }

    let mut table = MethodTable::new();
    table.register("counter::tick", || CounterProbe { ticks: 0 });

    let runnable = table
        .resolve("counter::tick")
        .expect("identifier resolves");
    let report = Scenario::new()
        .boxed_contract("counter", runnable)
        .advance("counter", "before-tick")
        .run_to_completion("counter")
        .run(&config())
        .expect("scenario completes");

    assert_eq!(report.crossings.len(), 1);
    assert!(report.all_completed());
}

#[test]
fn report_can_be_dumped_as_json_artifact() {
    let report = Scenario::new()
        .contract(
            "A",
            RunnableBuilder::new()
                .run(|cx| {
                    cx.arrive("only")?;
                    Ok(())
                })
                .build()
                .expect("contract builds"),
        )
        .advance("A", "only")
        .run_to_completion("A")
        .run(&config())
        .expect("scenario completes");

    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("test-logs").join("scenario-report.json");
    report.write_json(&path).expect("report written");
    let raw = std::fs::read_to_string(&path).expect("report readable");
    assert!(raw.contains("\"contract\": \"A\""));
    assert!(raw.contains("\"status\": \"completed\""));
}
