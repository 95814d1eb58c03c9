//! Persistence and recovery tests for the control core.
//!
//! These tests verify that drives, the heartbeat log and the plan tracker
//! survive a restart (persist + reopen cycle).

use autonomic::config::AutonomicConfig;
use autonomic::drives::DriveKind;
use autonomic::heartbeat::{
    ActivityKind, ActivityLog, HeartbeatActivity, HeartbeatConfig, HeartbeatScheduler,
};
use autonomic::paths::AutonomicPaths;
use autonomic::plan::{PlanState, StepSpec, StepStatus};
use autonomic::runtime::AgentRuntime;

fn open(dir: &std::path::Path) -> (AutonomicConfig, AutonomicPaths, AgentRuntime) {
    let config = AutonomicConfig::default();
    let paths = AutonomicPaths::rooted_at(dir);
    paths.ensure_dirs().unwrap();
    let runtime = AgentRuntime::open(&config, &paths);
    (config, paths, runtime)
}

#[test]
fn drives_survive_restart() {
    let dir = tempfile::TempDir::new().unwrap();

    // First session: move the drives away from their defaults.
    {
        let (_, _, runtime) = open(dir.path());
        runtime.with_drives(|d| {
            d.expend_energy(0.5);
            d.satisfy(DriveKind::Curiosity, 0.3);
        });
    }

    // Second session: the levels and the interaction time are back.
    {
        let (_, paths, runtime) = open(dir.path());
        assert!(paths.drives_file().exists());
        runtime.with_drives(|d| {
            assert!((d.level(DriveKind::Energy) - 0.5).abs() < 0.01);
            assert!((d.level(DriveKind::Curiosity) - 0.2).abs() < 0.01);
            assert!(d.last_interaction().is_some());
        });
    }
}

#[test]
fn corrupt_drive_file_falls_back_to_defaults() {
    let dir = tempfile::TempDir::new().unwrap();
    let paths = AutonomicPaths::rooted_at(dir.path());
    std::fs::write(paths.drives_file(), "{ not json").unwrap();

    let (_, _, runtime) = open(dir.path());
    runtime.with_drives(|d| {
        assert_eq!(d.level(DriveKind::Energy), 1.0);
        assert_eq!(d.level(DriveKind::Boredom), 0.0);
    });
}

#[test]
fn plan_survives_restart() {
    let dir = tempfile::TempDir::new().unwrap();

    {
        let (_, _, runtime) = open(dir.path());
        let tools = runtime.goal_tools();
        tools.create_goal_plan(
            "write release notes",
            "collect merged changes|git_log; draft the notes|write_file; post them|publish",
            "notes are published",
        );
        tools.complete_step(1, "12 changes found");
        tools.fail_step(2, "editor crashed");
    }

    {
        let (_, _, runtime) = open(dir.path());
        runtime.with_plans(|p| {
            assert_eq!(p.state(), PlanState::Executing);
            let plan = p.active_plan().unwrap();
            assert_eq!(plan.goal, "write release notes");
            assert_eq!(plan.current_step, Some(2));

            let first = plan.step(1).unwrap();
            assert_eq!(first.status, StepStatus::Done);
            assert_eq!(first.outcome.as_deref(), Some("12 changes found"));

            let second = plan.step(2).unwrap();
            assert_eq!(second.status, StepStatus::InProgress);
            assert_eq!(second.attempts, 1);
        });

        // The restored plan keeps advancing.
        let message = runtime.goal_tools().complete_step(2, "drafted");
        assert!(message.contains("Now on step 3"));
    }
}

#[test]
fn archive_survives_restart() {
    let dir = tempfile::TempDir::new().unwrap();

    {
        let (_, _, runtime) = open(dir.path());
        runtime.with_plans(|p| {
            p.create_plan("one step", vec![StepSpec::new("do it", "auto")], "")
                .unwrap();
            p.complete_step(1, "done").unwrap();
            p.create_plan("abandoned", vec![StepSpec::new("start", "auto")], "")
                .unwrap();
            p.reset();
        });
    }

    {
        let (_, _, runtime) = open(dir.path());
        runtime.with_plans(|p| {
            assert_eq!(p.state(), PlanState::Idle);
            let archive: Vec<_> = p.archive().collect();
            assert_eq!(archive.len(), 2);
            assert_eq!(archive[0].goal, "one step");
            assert!(archive[0].success);
            assert_eq!(archive[1].goal, "abandoned");
            assert!(!archive[1].success);
        });
    }
}

#[test]
fn activity_log_survives_restart_and_stays_bounded() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("heartbeat_log.json");

    {
        let mut log = ActivityLog::open(3, &path);
        for i in 0..5 {
            log.push(HeartbeatActivity::heartbeat(
                vec![format!("beat{i}")],
                "content",
                0.9,
            ));
        }
        log.push(HeartbeatActivity::error("social engagement failed: offline"));
    }

    let log = ActivityLog::open(3, &path);
    assert_eq!(log.len(), 3);
    let kinds: Vec<_> = log.recent(3).map(|a| a.kind).collect();
    assert_eq!(
        kinds,
        vec![ActivityKind::Heartbeat, ActivityKind::Heartbeat, ActivityKind::Error]
    );
    assert_eq!(log.recent(3).next().unwrap().actions, vec!["beat3"]);

    // A smaller capacity on reopen keeps only the newest records.
    let shrunk = ActivityLog::open(1, &path);
    assert_eq!(shrunk.len(), 1);
    assert_eq!(shrunk.last().unwrap().kind, ActivityKind::Error);
}

#[tokio::test]
async fn scheduler_ticks_land_in_the_persisted_log() {
    let dir = tempfile::TempDir::new().unwrap();
    let (config, paths, runtime) = open(dir.path());
    let hb = HeartbeatConfig {
        spontaneous_probability: 0.0,
        ..config.heartbeat.clone()
    };

    {
        let log = ActivityLog::open(hb.activity_capacity, &paths.heartbeat_log_file());
        let scheduler = HeartbeatScheduler::builder(runtime.clone(), hb.clone())
            .activity_log(log)
            .build();
        scheduler.force_tick().await;
        scheduler.force_tick().await;
    }

    let reopened = ActivityLog::open(hb.activity_capacity, &paths.heartbeat_log_file());
    assert_eq!(reopened.len(), 2);
    assert!(reopened.last_heartbeat().is_some());
    assert!(reopened.summary(5).starts_with("**Recent Autonomous Activities:**"));
}
