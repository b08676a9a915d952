#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use berth_server::actor::ActorSystem;

use crate::allocation::{Allocation, ResourcesAllocated};
use crate::checkpoint::{CheckpointRecord, CheckpointStorageConfig, StoredCheckpoint};
use crate::checkpoint_gc::{CheckpointGcActor, CheckpointGcHandle, CheckpointGcOptions, GC_COMPLETED};
use crate::container::{ContainerFailure, ContainerState, ContainerStateChanged};
use crate::controller::{ControllerOptions, ABORTED_BEFORE_SCHEDULING, KILLED_BEFORE_START};
use crate::error::TaskResult;
use crate::event::{EventSubscription, TaskEventKind};
use crate::id::TaskId;
use crate::lifecycle::TaskLifecycle;
use crate::log::ContainerLog;
use crate::resource_manager::TaskHandler;
use crate::spec::TaskPayload;
use crate::summary::{TaskKind, TaskStatus};
use crate::testing::{
    app_config, capture_logs, captured_logs, count_events, next_event, Harness,
    RecordingSessionStore, ResourceCall, ScriptedAllocation,
};

const EXPERIMENT_ID: i32 = 3;

fn options(harness: &Harness, task_id: &str) -> CheckpointGcOptions {
    CheckpointGcOptions::new(
        EXPERIMENT_ID,
        CheckpointStorageConfig::default(),
        ControllerOptions::for_checkpoint_gc(&app_config()),
        harness.services(),
    )
    .with_task_id(task_id.into())
    .with_resource_pool("gc")
    .with_delete_tensorboards(true)
}

fn spawn(system: &mut ActorSystem, options: CheckpointGcOptions) -> CheckpointGcHandle {
    system.spawn::<CheckpointGcActor>(options).into()
}

async fn grant(
    harness: &Harness,
    task_id: &TaskId,
    allocations: &[Arc<ScriptedAllocation>],
) -> TaskResult<Arc<dyn TaskHandler>> {
    let handler = harness.resource_manager.handler(task_id).await;
    handler
        .resources_allocated(ResourcesAllocated {
            id: task_id.clone(),
            resource_pool: None,
            allocations: allocations
                .iter()
                .map(|x| Arc::clone(x) as Arc<dyn Allocation>)
                .collect(),
        })
        .await?;
    Ok(handler)
}

async fn wait_for_exit(subscription: &mut EventSubscription) -> String {
    let event = next_event(&mut subscription.receiver, |x| {
        matches!(x, TaskEventKind::Exited { .. })
    })
    .await;
    match event.kind {
        TaskEventKind::Exited { exit_status } => exit_status,
        _ => unreachable!(),
    }
}

async fn seed_checkpoints(harness: &Harness) {
    for (uuid, total_batches, metric) in [("old", 100, 0.9), ("best", 200, 0.1), ("latest", 300, 0.5)] {
        harness
            .checkpoints
            .insert(
                EXPERIMENT_ID,
                StoredCheckpoint {
                    record: CheckpointRecord {
                        uuid: uuid.to_string(),
                        trial_id: 1,
                        total_batches,
                    },
                    metric: Some(metric),
                },
            )
            .await;
    }
}

#[tokio::test]
async fn test_checkpoint_gc_runs_to_completion() -> TaskResult<()> {
    let harness = Harness::new();
    seed_checkpoints(&harness).await;
    let mut system = ActorSystem::new();
    let task_id = TaskId::from("gc1");
    let handle = spawn(&mut system, options(&harness, "gc1"));
    let mut subscription = handle.subscribe().await?;

    let allocation = ScriptedAllocation::new("a1");
    grant(&harness, &task_id, &[allocation.clone()]).await?;
    let spec = allocation.wait_for_start().await;
    let session = harness.sessions.inner.get(&task_id).await.unwrap();
    assert_eq!(spec.task_token, session.token());
    let TaskPayload::GcCheckpoints {
        experiment_id,
        to_delete,
        delete_tensorboards,
        ..
    } = spec.payload
    else {
        panic!("unexpected payload");
    };
    assert_eq!(experiment_id, EXPERIMENT_ID);
    assert_eq!(
        to_delete.iter().map(|x| x.uuid.as_str()).collect::<Vec<_>>(),
        vec!["old"]
    );
    assert!(delete_tensorboards);

    handle
        .container_state_changed(ContainerStateChanged::running("c1", vec![]))
        .await?;
    handle
        .log(ContainerLog::new(Some("c1".into()), "deleting old"))
        .await?;
    handle
        .container_state_changed(ContainerStateChanged::terminated("c1", None))
        .await?;
    assert_eq!(wait_for_exit(&mut subscription).await, GC_COMPLETED);

    let summary = handle.snapshot(None).await?.unwrap();
    assert_eq!(summary.kind, TaskKind::CheckpointGc);
    assert_eq!(summary.description, "Checkpoint GC (Experiment 3)");
    assert_eq!(summary.state, TaskStatus::Terminated);
    assert_eq!(summary.service_address, None);
    assert_eq!(summary.resource_pool.as_deref(), Some("gc"));
    assert_eq!(harness.resource_manager.releases(&task_id), 1);
    assert_eq!(harness.sessions.deletes(), 1);
    assert!(harness.proxy.names().await.is_empty());

    let events = handle.events().await?;
    assert_eq!(
        count_events(&events, |x| matches!(
            x,
            TaskEventKind::Log { .. } | TaskEventKind::ServiceReady { .. }
        )),
        0
    );
    let calls = harness.resource_manager.calls.snapshot();
    assert!(matches!(&calls[0], ResourceCall::Allocate(request)
        if request.fitting.single_agent && request.non_preemptible && request.resources.slots == 0));
    Ok(())
}

#[tokio::test]
async fn test_checkpoint_gc_ignores_release_resources() -> TaskResult<()> {
    let harness = Harness::new();
    let mut system = ActorSystem::new();
    let task_id = TaskId::from("gc1");
    let handle = spawn(&mut system, options(&harness, "gc1"));
    let mut subscription = handle.subscribe().await?;
    let allocation = ScriptedAllocation::new("a1");
    let handler = grant(&harness, &task_id, &[allocation.clone()]).await?;
    allocation.wait_for_start().await;
    handle
        .container_state_changed(ContainerStateChanged::running("c1", vec![]))
        .await?;

    handler.release_resources().await?;
    let summary = handle.snapshot(None).await?.unwrap();
    assert_eq!(summary.state, TaskStatus::Running);
    assert_eq!(summary.lifecycle, TaskLifecycle::Running);
    assert_eq!(allocation.kills(), 0);
    assert_eq!(harness.resource_manager.releases(&task_id), 0);

    handle
        .container_state_changed(ContainerStateChanged::terminated("c1", None))
        .await?;
    assert_eq!(wait_for_exit(&mut subscription).await, GC_COMPLETED);
    assert_eq!(harness.resource_manager.releases(&task_id), 1);
    Ok(())
}

#[tokio::test]
async fn test_checkpoint_gc_failure_is_reported() -> TaskResult<()> {
    let harness = Harness::new();
    let mut system = ActorSystem::new();
    let task_id = TaskId::from("gc1");
    let handle = spawn(&mut system, options(&harness, "gc1"));
    let mut subscription = handle.subscribe().await?;
    let allocation = ScriptedAllocation::new("a1");
    grant(&harness, &task_id, &[allocation.clone()]).await?;
    allocation.wait_for_start().await;

    handle
        .log(ContainerLog::new(Some("c1".into()), "permission denied"))
        .await?;
    handle
        .container_state_changed(ContainerStateChanged::terminated(
            "c1",
            Some(ContainerFailure::new("task failed").with_exit_code(1)),
        ))
        .await?;
    assert_eq!(
        wait_for_exit(&mut subscription).await,
        "task failed (exit code 1)"
    );
    Ok(())
}

#[tokio::test]
async fn test_checkpoint_gc_failure_logs_buffered_lines() -> TaskResult<()> {
    capture_logs();
    let harness = Harness::new();
    let mut config = app_config();
    config.checkpoint_gc.log_buffer_size = 2;
    let options = CheckpointGcOptions::new(
        EXPERIMENT_ID,
        CheckpointStorageConfig::default(),
        ControllerOptions::for_checkpoint_gc(&config),
        harness.services(),
    )
    .with_task_id("gc-logs".into());
    let mut system = ActorSystem::new();
    let task_id = TaskId::from("gc-logs");
    let handle = spawn(&mut system, options);
    let mut subscription = handle.subscribe().await?;
    let allocation = ScriptedAllocation::new("a1");
    grant(&harness, &task_id, &[allocation.clone()]).await?;
    allocation.wait_for_start().await;

    for line in ["removing ckpt-1", "removing ckpt-2", "permission denied"] {
        handle
            .log(ContainerLog::new(Some("gc-logs-c1".into()), line))
            .await?;
    }
    handle
        .container_state_changed(ContainerStateChanged::terminated(
            "gc-logs-c1",
            Some(ContainerFailure::new("task failed").with_exit_code(2)),
        ))
        .await?;
    assert_eq!(
        wait_for_exit(&mut subscription).await,
        "task failed (exit code 2)"
    );

    let lines = captured_logs(|x| x.contains("[gc-logs-c1]"));
    assert_eq!(lines.len(), 2, "{lines:?}");
    assert!(lines[0].starts_with("ERROR") && lines[0].ends_with("removing ckpt-2"));
    assert!(lines[1].starts_with("ERROR") && lines[1].ends_with("permission denied"));
    assert_eq!(
        captured_logs(|x| x.contains("task gc-logs has 1 earlier log line(s)")).len(),
        1
    );
    Ok(())
}

#[tokio::test]
async fn test_checkpoint_gc_waits_for_every_container() -> TaskResult<()> {
    let harness = Harness::new();
    let mut system = ActorSystem::new();
    let task_id = TaskId::from("gc1");
    let handle = spawn(&mut system, options(&harness, "gc1"));
    let allocations = [ScriptedAllocation::new("a1"), ScriptedAllocation::new("a2")];
    grant(&harness, &task_id, &allocations).await?;
    for allocation in &allocations {
        allocation.wait_for_start().await;
    }
    for id in ["c1", "c2"] {
        handle
            .container_state_changed(ContainerStateChanged::running(id, vec![]))
            .await?;
    }

    handle
        .container_state_changed(ContainerStateChanged::terminated("c1", None))
        .await?;
    let summary = handle.snapshot(None).await?.unwrap();
    assert_eq!(summary.lifecycle, TaskLifecycle::Running);

    let mut subscription = handle.subscribe().await?;
    handle
        .container_state_changed(ContainerStateChanged::terminated("c2", None))
        .await?;
    assert_eq!(wait_for_exit(&mut subscription).await, GC_COMPLETED);
    let events = handle.events().await?;
    assert_eq!(
        count_events(&events, |x| matches!(x, TaskEventKind::ContainerStarted { .. })),
        1
    );
    Ok(())
}

#[tokio::test]
async fn test_checkpoint_gc_kill_twice_before_allocation() -> TaskResult<()> {
    let harness = Harness::new();
    let mut system = ActorSystem::new();
    let task_id = TaskId::from("gc1");
    let handle = spawn(&mut system, options(&harness, "gc1"));
    let mut subscription = handle.subscribe().await?;
    harness.resource_manager.handler(&task_id).await;

    handle.kill().await?;
    handle.kill().await?;
    assert_eq!(wait_for_exit(&mut subscription).await, ABORTED_BEFORE_SCHEDULING);
    let events = handle.events().await?;
    assert_eq!(count_events(&events, |x| matches!(x, TaskEventKind::Exited { .. })), 1);
    assert_eq!(harness.resource_manager.releases(&task_id), 1);
    assert!(harness.sessions.calls.snapshot().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_checkpoint_gc_kill_while_session_is_created() -> TaskResult<()> {
    let (sessions, gate) = RecordingSessionStore::gated();
    let harness = Harness::with_sessions(sessions);
    let mut system = ActorSystem::new();
    let task_id = TaskId::from("gc1");
    let handle = spawn(&mut system, options(&harness, "gc1"));
    let mut subscription = handle.subscribe().await?;
    let allocation = ScriptedAllocation::new("a1");
    grant(&harness, &task_id, &[allocation.clone()]).await?;
    harness
        .sessions
        .calls
        .wait_for("the session request", |_| true)
        .await;

    handle.kill().await?;
    gate.add_permits(1);
    assert_eq!(wait_for_exit(&mut subscription).await, KILLED_BEFORE_START);
    assert!(allocation.calls.snapshot().is_empty());
    assert_eq!(harness.sessions.deletes(), 1);
    Ok(())
}

#[tokio::test]
async fn test_checkpoint_gc_snapshot_has_no_owner() -> TaskResult<()> {
    let harness = Harness::new();
    let mut system = ActorSystem::new();
    let handle = spawn(&mut system, options(&harness, "gc1"));

    assert!(handle.snapshot(Some("alice")).await?.is_none());
    let summary = handle.snapshot(None).await?.unwrap();
    assert_eq!(summary.owner, None);
    assert_eq!(summary.state, TaskStatus::Pending);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_checkpoint_gc_stops_after_retention() -> TaskResult<()> {
    let harness = Harness::new();
    let mut system = ActorSystem::new();
    let task_id = TaskId::from("gc1");
    let handle = spawn(&mut system, options(&harness, "gc1"));
    let mut subscription = handle.subscribe().await?;
    let allocation = ScriptedAllocation::new("a1");
    grant(&harness, &task_id, &[allocation.clone()]).await?;
    allocation.wait_for_start().await;
    handle
        .container_state_changed(ContainerStateChanged::new("c1", ContainerState::Pulling))
        .await?;
    handle
        .container_state_changed(ContainerStateChanged::terminated("c1", None))
        .await?;
    wait_for_exit(&mut subscription).await;

    handle.clone().wait_for_stop().await;
    assert!(handle.events().await.is_err());
    system.join().await;
    Ok(())
}
