// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::{FakeAgent, TestEnv};
use color_eyre::eyre::Result;
use indoc::indoc;
use maplit::btreeset;
use pretty_assertions::assert_eq;
use std::{collections::BTreeSet, thread};
use testcov_metadata::FinalStatus;
use testcov_runner::source::{
    Description, Failure, JunitResult, JunitRunListener, LibtestEventSource, TestngContext,
    TestngListener, TestngResult, drive,
};

fn testng_result(method: &str, status: i32, throwable: Option<&str>) -> TestngResult {
    TestngResult {
        class_name: "com.example.NgTest".to_owned(),
        method_name: method.to_owned(),
        status,
        throwable: throwable.map(str::to_owned),
    }
}

#[test]
fn junit_listener() -> Result<()> {
    let agent = FakeAgent::start();
    let env = TestEnv::new(agent.port(), "0")?;
    let listener = JunitRunListener::new(env.coordinator());

    let passes = Description::new("com.example.FooTest", "passes");
    let fails = Description::new("com.example.FooTest", "fails");
    let assumes = Description::new("com.example.FooTest", "assumes");
    let ignored = Description::new("com.example.FooTest", "ignored");

    listener.test_run_started(&Description::class("com.example.FooTest"));
    listener.test_started(&passes);
    listener.test_finished(&passes);
    listener.test_started(&fails);
    let failure = Failure {
        description: fails.clone(),
        message: Some("expected:<1> but was:<2>".to_owned()),
    };
    listener.test_failure(&failure);
    listener.test_finished(&fails);
    listener.test_started(&assumes);
    listener.test_assumption_failure(&Failure {
        description: assumes.clone(),
        message: None,
    });
    listener.test_finished(&assumes);
    listener.test_ignored(&ignored);

    // The run result repeats the failure that was already reported.
    let summary = listener.test_run_finished(&JunitResult {
        failures: vec![failure],
        assumption_failures: Vec::new(),
    });
    assert_eq!(summary.count(FinalStatus::Succeeded), 1);
    assert_eq!(summary.count(FinalStatus::Failed), 1);
    assert_eq!(summary.count(FinalStatus::AssumptionFailed), 1);
    assert_eq!(summary.count(FinalStatus::Ignored), 1);
    assert_eq!(summary.statistics.failed, 1);
    assert_eq!(summary.snapshots_written, 4);

    let results: Vec<_> = env.results()?.iter().map(|line| line.to_string()).collect();
    assert_eq!(
        results,
        [
            "PASS: com.example.FooTest.passes",
            "FAIL: com.example.FooTest.fails",
            "AFAIL: com.example.FooTest.assumes",
            "IGNR: com.example.FooTest.ignored",
        ]
    );
    Ok(())
}

#[test]
fn testng_listener() -> Result<()> {
    let agent = FakeAgent::start();
    let env = TestEnv::new(agent.port(), "0")?;
    let listener = TestngListener::new(env.coordinator());
    let context = TestngContext {
        name: "suite".to_owned(),
        failed_tests: Vec::new(),
    };

    listener.on_start(&context);
    let ok = testng_result("ok", 1, None);
    listener.on_test_start(&ok);
    listener.on_test_success(&ok);

    let broken = testng_result("broken", 2, Some("NullPointerException"));
    listener.on_test_start(&broken);
    listener.on_test_failure(&broken);

    let flaky = testng_result("flaky", 4, None);
    listener.on_test_start(&flaky);
    listener.on_test_failed_but_within_success_percentage(&flaky);

    // TestNG may start a test before skipping it.
    let skipped = testng_result("skipped", 3, None);
    listener.on_test_start(&skipped);
    listener.on_test_skipped(&skipped);

    listener.on_test_result(&testng_result("generic", 16, None));
    listener.on_test_result(&testng_result("generic", 1, None));
    listener.on_test_result(&testng_result("weird", 16, None));
    listener.on_test_result(&testng_result("weird", 99, None));

    let summary = listener.on_finish(&context);
    assert_eq!(summary.protocol_mismatches, 1);

    let results: Vec<_> = env.results()?.iter().map(|line| line.to_string()).collect();
    assert_eq!(
        results,
        [
            "PASS: com.example.NgTest.ok",
            "FAIL: com.example.NgTest.broken",
            "PASS: com.example.NgTest.flaky",
            "IGNR: com.example.NgTest.skipped",
            "PASS: com.example.NgTest.generic",
            "FAIL: com.example.NgTest.weird",
        ]
    );
    Ok(())
}

#[test]
fn testng_unknown_status_without_start() -> Result<()> {
    let agent = FakeAgent::start();
    let env = TestEnv::new(agent.port(), "0")?;
    let listener = TestngListener::new(env.coordinator());

    listener.on_test_result(&testng_result("odd", 42, None));
    let summary = listener.on_finish(&TestngContext::default());

    assert_eq!(summary.protocol_mismatches, 1);
    assert_eq!(summary.orphan_events, 0);
    assert_eq!(summary.count(FinalStatus::Failed), 1);
    assert_eq!(summary.snapshots_written, 1);
    let results: Vec<_> = env.results()?.iter().map(|line| line.to_string()).collect();
    assert_eq!(results, ["FAIL: com.example.NgTest.odd"]);
    Ok(())
}

#[test]
fn libtest_stream() -> Result<()> {
    let agent = FakeAgent::start();
    let env = TestEnv::new(agent.port(), "0")?;
    let coordinator = env.coordinator();

    let input = indoc! {r#"
        { "type": "suite", "event": "started", "test_count": 3 }
        { "type": "test", "event": "started", "name": "parser::tests::ok" }
        { "type": "test", "name": "parser::tests::ok", "event": "ok", "exec_time": 0.001 }
        { "type": "test", "event": "started", "name": "parser::tests::bad" }
        { "type": "test", "name": "parser::tests::bad", "event": "failed", "stdout": "panicked" }
        { "type": "test", "name": "parser::tests::slow", "event": "ignored" }
        { "type": "suite", "event": "failed", "passed": 1, "failed": 1, "ignored": 1 }
    "#};
    let mut source = LibtestEventSource::new(input.as_bytes(), "my-crate");
    let summaries = drive(&mut source, &coordinator)?;
    assert_eq!(summaries.len(), 1);

    let results: Vec<_> = env.results()?.iter().map(|line| line.to_string()).collect();
    assert_eq!(
        results,
        [
            "PASS: my-crate.parser-tests-ok",
            "FAIL: my-crate.parser-tests-bad",
            "IGNR: my-crate.parser-tests-slow",
        ]
    );
    assert_eq!(env.snapshot_files()?.len(), 3);
    Ok(())
}

#[test]
fn two_listeners_share_one_coordinator() -> Result<()> {
    let agent = FakeAgent::start();
    let env = TestEnv::new(agent.port(), "0")?;
    let coordinator = env.coordinator();
    let junit = JunitRunListener::new(coordinator.clone());
    let testng = TestngListener::new(coordinator.clone());

    thread::scope(|scope| {
        scope.spawn(|| {
            for i in 0..20 {
                let description = Description::new("com.example.JunitTest", format!("t{i}"));
                junit.test_started(&description);
                junit.test_finished(&description);
            }
        });
        scope.spawn(|| {
            for i in 0..20 {
                let result = testng_result(&format!("t{i}"), 1, None);
                testng.on_test_start(&result);
                testng.on_test_success(&result);
            }
        });
    });

    let summary = junit.test_run_finished(&JunitResult::default());
    assert_eq!(summary.count(FinalStatus::Succeeded), 40);
    assert_eq!(summary.snapshots_written, 40);
    assert_eq!(summary.protocol_mismatches, 0);
    assert_eq!(agent.dumps(), 40);

    // Every test got exactly one result, hash map entry and snapshot.
    let names: BTreeSet<_> = env
        .results()?
        .into_iter()
        .map(|line| line.qualified_name)
        .collect();
    assert_eq!(names.len(), 40);
    let hashed: BTreeSet<_> = env
        .hash_map()?
        .into_iter()
        .map(|line| line.qualified_name)
        .collect();
    assert_eq!(hashed, names);
    assert_eq!(env.snapshot_files()?.len(), 40);

    // A second listener's run-finished has nothing left to flush.
    let context = TestngContext::default();
    assert_eq!(testng.on_finish(&context).total(), 0);
    assert!(names.is_superset(&btreeset! {
        "com.example.JunitTest.t0".to_owned(),
        "com.example.NgTest.t19".to_owned(),
    }));
    Ok(())
}
