// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::{AgentBehavior, FakeAgent, TestEnv};
use color_eyre::eyre::Result;
use indoc::indoc;
use pretty_assertions::assert_eq;
use test_case::test_case;
use testcov_metadata::{FinalStatus, Fingerprint, SnapshotFileName};
use testcov_runner::{
    coordinator::{HostRunSummary, LifecycleEvent},
    identity::TestIdentity,
    source::{EventReplay, drive},
};

fn foo(case: &str) -> TestIdentity {
    TestIdentity::new("pkg.Foo", case)
}

#[test]
fn passing_test_writes_result_and_snapshot() -> Result<()> {
    let agent = FakeAgent::start();
    let env = TestEnv::new(agent.port(), "0")?;
    let coordinator = env.coordinator();

    coordinator.run_started();
    coordinator.test_started(foo("bar"));
    coordinator.test_finished(foo("bar"));
    let summary = coordinator.run_finished(HostRunSummary::default());

    assert_eq!(summary.count(FinalStatus::Succeeded), 1);
    assert_eq!(summary.snapshots_written, 1);
    assert_eq!(summary.coverage_losses, 0);

    let results = env.results()?;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].to_string(), "PASS: pkg.Foo.bar");

    let fingerprint = Fingerprint::of("pkg.Foo.bar");
    assert_eq!(env.snapshot_files()?, [format!("{fingerprint}.exec")]);
    let snapshot = std::fs::read(
        env.layout()
            .snapshot_file(&SnapshotFileName::new(fingerprint, 0, "exec")),
    )?;
    assert_eq!(snapshot, FakeAgent::expected_snapshot(0));

    let hash_map = env.hash_map()?;
    assert_eq!(hash_map.len(), 1);
    assert_eq!(hash_map[0].fingerprint, fingerprint);
    assert_eq!(hash_map[0].qualified_name, "pkg.Foo.bar");
    Ok(())
}

#[test]
fn failing_test_is_recorded_as_failed() -> Result<()> {
    let agent = FakeAgent::start();
    let env = TestEnv::new(agent.port(), "0")?;
    let coordinator = env.coordinator();

    coordinator.test_started(foo("baz"));
    coordinator.test_failed(&foo("baz"), Some("expected 1 but was 2".to_owned()));
    coordinator.test_finished(foo("baz"));
    coordinator.run_finished(HostRunSummary::default());

    let results = std::fs::read_to_string(env.layout().results_file())?;
    assert_eq!(results, "FAIL: pkg.Foo.baz\n");
    assert_eq!(env.snapshot_files()?.len(), 1);
    Ok(())
}

#[test]
fn refused_connection_is_a_coverage_loss() -> Result<()> {
    // Bind and drop a listener so nothing is accepting on the port.
    let port = std::net::TcpListener::bind("127.0.0.1:0")?.local_addr()?.port();
    let env = TestEnv::new(port, "0")?;
    let coordinator = env.coordinator();

    coordinator.test_started(foo("bar"));
    coordinator.test_finished(foo("bar"));
    let summary = coordinator.run_finished(HostRunSummary::default());

    assert_eq!(summary.count(FinalStatus::Succeeded), 1);
    assert_eq!(summary.coverage_losses, 1);
    assert_eq!(summary.snapshots_written, 0);
    assert_eq!(env.results()?[0].to_string(), "PASS: pkg.Foo.bar");
    assert_eq!(env.snapshot_files()?, Vec::<String>::new());
    assert_eq!(env.hash_map()?.len(), 1);

    let losses = env.coverage_losses()?;
    assert_eq!(losses.len(), 1);
    assert_eq!(losses[0].qualified_name, "pkg.Foo.bar");
    assert!(
        losses[0].reason.starts_with("failed to connect to coverage agent"),
        "{}",
        losses[0].reason
    );
    Ok(())
}

#[test_case(AgentBehavior::HangUp, "closed the connection"; "partial read")]
#[test_case(AgentBehavior::BadMagic, "invalid magic number"; "malformed response")]
#[test_case(AgentBehavior::Stall, "did not complete a dump within"; "timeout")]
fn failed_capture_leaves_no_snapshot(behavior: AgentBehavior, reason: &str) -> Result<()> {
    let agent = FakeAgent::start();
    agent.set_behavior(behavior);
    let env = TestEnv::with_config_file(
        agent.port(),
        "0",
        indoc! {r#"
            [agent]
            timeout = "300ms"
        "#},
    )?;
    let coordinator = env.coordinator();

    coordinator.test_started(foo("bar"));
    coordinator.test_finished(foo("bar"));
    let summary = coordinator.run_finished(HostRunSummary::default());

    assert_eq!(summary.coverage_losses, 1);
    assert_eq!(env.snapshot_files()?, Vec::<String>::new());
    let losses = env.coverage_losses()?;
    assert!(losses[0].reason.contains(reason), "{}", losses[0].reason);
    Ok(())
}

#[test]
fn reruns_get_distinct_snapshots() -> Result<()> {
    let agent = FakeAgent::start();
    let env = TestEnv::new(agent.port(), "0")?;
    let coordinator = env.coordinator();

    for _ in 0..2 {
        coordinator.test_started(foo("bar"));
        coordinator.test_finished(foo("bar"));
    }
    coordinator.run_finished(HostRunSummary::default());

    let results: Vec<_> = env.results()?.iter().map(|line| line.to_string()).collect();
    assert_eq!(results, ["PASS: pkg.Foo.bar", "PASS: pkg.Foo.bar"]);

    let fingerprint = Fingerprint::of("pkg.Foo.bar");
    let mut expected = vec![format!("{fingerprint}.1.exec"), format!("{fingerprint}.exec")];
    expected.sort();
    assert_eq!(env.snapshot_files()?, expected);

    // The rerun's snapshot holds the second dump, not a copy of the first.
    let rerun = std::fs::read(
        env.layout()
            .snapshot_file(&SnapshotFileName::new(fingerprint, 1, "exec")),
    )?;
    assert_eq!(rerun, FakeAgent::expected_snapshot(1));
    assert_eq!(env.hash_map()?.len(), 2);
    Ok(())
}

#[test]
fn coordinators_sharing_a_layout_keep_every_snapshot() -> Result<()> {
    let agent = FakeAgent::start();
    let env = TestEnv::new(agent.port(), "0")?;
    // For example a JUnit and a TestNG integration in one process, each built from config.
    let first = env.coordinator();
    let second = env.coordinator();

    first.test_started(foo("bar"));
    first.test_finished(foo("bar"));
    second.test_started(foo("bar"));
    second.test_finished(foo("bar"));
    let first_summary = first.run_finished(HostRunSummary::default());
    let second_summary = second.run_finished(HostRunSummary::default());

    assert_eq!(first_summary.snapshots_written, 1);
    assert_eq!(second_summary.snapshots_written, 1);
    let results: Vec<_> = env.results()?.iter().map(|line| line.to_string()).collect();
    assert_eq!(results, ["PASS: pkg.Foo.bar", "PASS: pkg.Foo.bar"]);
    assert_eq!(env.hash_map()?.len(), 2);

    let fingerprint = Fingerprint::of("pkg.Foo.bar");
    let mut expected = vec![format!("{fingerprint}.1.exec"), format!("{fingerprint}.exec")];
    expected.sort();
    assert_eq!(env.snapshot_files()?, expected);

    // The second coordinator's dump went to the next free name.
    for index in 0..2 {
        let path = env.layout().snapshot_file(&SnapshotFileName::new(
            fingerprint,
            index,
            "exec",
        ));
        assert_eq!(std::fs::read(path)?, FakeAgent::expected_snapshot(index as usize));
    }
    Ok(())
}

#[test]
fn capture_completes_before_next_test_starts() -> Result<()> {
    let agent = FakeAgent::start();
    let env = TestEnv::new(agent.port(), "0")?;
    let coordinator = env.coordinator();

    for (index, case) in ["a", "b", "c"].into_iter().enumerate() {
        assert_eq!(agent.dumps(), index, "dump for the previous test already taken");
        coordinator.test_started(foo(case));
        assert_eq!(agent.dumps(), index, "no dump while {case} is running");
        coordinator.test_finished(foo(case));
        assert_eq!(agent.dumps(), index + 1, "dump taken before {case} finished");
    }
    coordinator.run_finished(HostRunSummary::default());

    // Each test's snapshot holds exactly the dump taken when it finished.
    for (index, case) in ["a", "b", "c"].into_iter().enumerate() {
        let path = env.layout().snapshot_file(&SnapshotFileName::new(
            foo(case).fingerprint(),
            0,
            "exec",
        ));
        assert_eq!(std::fs::read(path)?, FakeAgent::expected_snapshot(index));
    }
    Ok(())
}

#[test]
fn flush_is_idempotent() -> Result<()> {
    let agent = FakeAgent::start();
    let env = TestEnv::new(agent.port(), "42")?;
    let coordinator = env.coordinator();

    coordinator.test_started(foo("bar"));
    coordinator.test_finished(foo("bar"));
    let first = coordinator.run_finished(HostRunSummary::default());
    let second = coordinator.run_finished(HostRunSummary::default());

    assert_eq!(first.total(), 1);
    assert_eq!(second.total(), 0);
    assert_eq!(env.results()?.len(), 1);
    assert_eq!(env.hash_map()?.len(), 1);
    assert_eq!(first.run_id, "42");
    assert!(env.layout().results_file().ends_with("42/TestResults.r42"));

    // Statistics are cumulative over the coordinator's lifetime.
    assert_eq!(second.statistics, first.statistics);
    assert_eq!(second.statistics.started, 1);
    Ok(())
}

#[test]
fn run_summary_failures_are_swept_in() -> Result<()> {
    let agent = FakeAgent::start();
    let env = TestEnv::new(agent.port(), "0")?;
    let coordinator = env.coordinator();

    let events = [
        LifecycleEvent::RunStarted,
        LifecycleEvent::TestStarted(foo("bar")),
        LifecycleEvent::TestFinished(foo("bar")),
        LifecycleEvent::TestStarted(foo("baz")),
        LifecycleEvent::TestAssumptionFailed {
            identity: foo("baz"),
            cause: Some("not on CI".to_owned()),
        },
        LifecycleEvent::TestFinished(foo("baz")),
        LifecycleEvent::TestIgnored(foo("skipped")),
        LifecycleEvent::RunFinished(HostRunSummary {
            failures: vec![testcov_runner::coordinator::HostFailure {
                identity: foo("bar"),
                assumption: false,
                cause: Some("@AfterClass failed".to_owned()),
            }],
        }),
    ];
    let summaries = drive(&mut EventReplay::new(events), &coordinator)?;
    assert_eq!(summaries.len(), 1);

    let results: Vec<_> = env
        .results()?
        .into_iter()
        .map(|line| (line.status, line.qualified_name))
        .collect();
    assert_eq!(
        results,
        [
            (FinalStatus::Failed, "pkg.Foo.bar".to_owned()),
            (FinalStatus::AssumptionFailed, "pkg.Foo.baz".to_owned()),
            (FinalStatus::Ignored, "pkg.Foo.skipped".to_owned()),
        ]
    );
    assert_eq!(summaries[0].snapshots_written, 3);
    Ok(())
}

#[test]
fn disabled_backend_writes_results_only() -> Result<()> {
    let env = TestEnv::with_config_file(
        1,
        "0",
        indoc! {r#"
            [agent]
            backend = "none"
        "#},
    )?;
    let coordinator = env.coordinator();
    assert!(!coordinator.captures_coverage());

    coordinator.test_started(foo("bar"));
    coordinator.test_finished(foo("bar"));
    let summary = coordinator.run_finished(HostRunSummary::default());

    assert_eq!(summary.coverage_disabled, 1);
    assert_eq!(summary.coverage_losses, 0);
    assert_eq!(env.results()?.len(), 1);
    assert_eq!(env.hash_map()?.len(), 1);
    assert_eq!(env.coverage_losses()?.len(), 0);
    assert_eq!(env.snapshot_files()?, Vec::<String>::new());
    Ok(())
}

#[test]
fn summary_serializes_to_json() -> Result<()> {
    let agent = FakeAgent::start();
    let env = TestEnv::new(agent.port(), "0")?;
    let coordinator = env.coordinator();

    coordinator.test_started(foo("bar"));
    coordinator.test_finished(foo("bar"));
    let summary = coordinator.run_finished(HostRunSummary::default());

    let json = serde_json::to_value(&summary)?;
    assert_eq!(json["run-id"], "0");
    assert_eq!(json["tallies"]["PASS"], 1);
    assert_eq!(json["snapshots-written"], 1);
    assert_eq!(json["statistics"]["finished"], 1);
    Ok(())
}
