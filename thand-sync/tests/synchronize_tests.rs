//! End-to-end synchronization tests
//!
//! Exercises the orchestrator against scripted and seeded providers in
//! both modes: local parallel fan-out with the mutex accumulator, and
//! durable workflows with registered activities and upstream forwarding.

use std::sync::Arc;
use std::time::Duration;

use thand_core::SearchRequest;
use thand_providers::Provider;
use thand_sync::{
    RecordingUpstream, SyncChunk, SyncOutcome, SyncRequest, Synchronizer, WorkflowService,
};
use thand_test_utils::{
    sample_groups, sample_users, seeded_memory_provider, ScriptedProvider, SynchronizeCapability,
};

// ============================================================================
// LOCAL MODE
// ============================================================================

/// Users in 3 pages of 2, groups in 1 page of 1, roles declared but left
/// unimplemented: the identities catalog ends up with 7 entries, the
/// roles catalog stays empty, and no error surfaces.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn local_sync_suppresses_not_implemented() {
    let users = sample_users(6);
    let provider = Arc::new(ScriptedProvider::new(
        vec![
            users[0..2].to_vec(),
            users[2..4].to_vec(),
            users[4..6].to_vec(),
        ],
        vec![sample_groups()],
        [
            SynchronizeCapability::Users,
            SynchronizeCapability::Groups,
            // Declared but not implemented: the sentinel must be
            // swallowed by the streamer.
            SynchronizeCapability::Roles,
        ],
    ));

    let outcome = Synchronizer::local()
        .synchronize(provider.clone(), SyncRequest::for_provider("scripted"))
        .await
        .expect("no error surfaces");

    match outcome {
        SyncOutcome::Completed { summary } => {
            assert_eq!(summary.users, 6);
            assert_eq!(summary.groups, 1);
            assert_eq!(summary.roles, 0);
        }
        other => panic!("expected completion, got {other:?}"),
    }

    let identities = provider.base().identity().expect("identity catalog");
    assert_eq!(identities.identities.len(), 7);
    let roles = provider.base().rbac().expect("rbac catalog");
    assert!(roles.roles.is_empty());

    // Every user is reachable by email, the group by name.
    assert!(provider.get_identity("user3@example.com").is_ok());
    assert!(provider.get_identity("dev").is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn local_sync_defaults_to_declared_capabilities() {
    let provider = Arc::new(seeded_memory_provider("mem", 6, 2).await);

    let outcome = Synchronizer::local()
        .synchronize(
            provider.clone() as Arc<dyn Provider>,
            SyncRequest::for_provider("mem"),
        )
        .await
        .expect("sync");

    match outcome {
        SyncOutcome::Completed { summary } => {
            assert_eq!(summary.users, 6);
            assert_eq!(summary.groups, 1);
            assert_eq!(summary.roles, 1);
            assert_eq!(summary.permissions, 3);
            assert_eq!(summary.resources, 1);
            // Identities capability is not declared synchronizable by
            // the memory back-end.
            assert_eq!(summary.identities, 0);
        }
        other => panic!("expected completion, got {other:?}"),
    }

    // Catalog reads work across the board after one pass.
    assert!(provider.get_role("admin").is_ok());
    assert!(provider.get_permission("iam:get").is_ok());
    assert!(provider.get_resource("appA").is_ok());
    assert!(provider.get_identity("user0@example.com").is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn local_sync_search_converges_after_refresh() {
    let provider = Arc::new(seeded_memory_provider("mem", 6, 3).await);
    Synchronizer::local()
        .synchronize(
            provider.clone() as Arc<dyn Provider>,
            SyncRequest::for_provider("mem"),
        )
        .await
        .expect("sync");

    let catalog = &provider.base().rbac().expect("rbac").permissions;
    for _ in 0..100 {
        if catalog.index_ready() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let hits = provider
        .list_permissions(Some(&SearchRequest::query("iam")))
        .expect("search");
    assert_eq!(hits.len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn skipped_when_no_synchronizable_capability() {
    struct Inert {
        base: thand_providers::BaseProvider,
    }

    impl Provider for Inert {
        fn base(&self) -> &thand_providers::BaseProvider {
            &self.base
        }

        fn kind(&self) -> thand_test_utils::ProviderKind {
            thand_test_utils::ProviderKind::Memory
        }
    }

    let provider = Arc::new(Inert {
        base: thand_providers::BaseProvider::new(vec![thand_test_utils::Capability::Notifier]),
    });
    let outcome = Synchronizer::local()
        .synchronize(provider, SyncRequest::for_provider("inert"))
        .await
        .expect("skip");
    assert_eq!(outcome, SyncOutcome::Skipped);
}

// ============================================================================
// DURABLE MODE
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn durable_sync_runs_activities_and_forwards_upstream() {
    let provider = Arc::new(seeded_memory_provider("mem", 6, 2).await);
    let service = Arc::new(WorkflowService::new());
    let upstream = Arc::new(RecordingUpstream::default());

    let outcome = Synchronizer::durable(Arc::clone(&service))
        .with_upstream(upstream.clone())
        .synchronize(
            provider.clone() as Arc<dyn Provider>,
            SyncRequest::for_provider("mem"),
        )
        .await
        .expect("start");

    let workflow_id = match outcome {
        SyncOutcome::Started { workflow_id, .. } => workflow_id,
        other => panic!("expected a started workflow, got {other:?}"),
    };
    assert_eq!(workflow_id, "mem-synchronize");

    // Fire-and-forget for the orchestrator; the test awaits the engine.
    let summary = service.await_result(&workflow_id).await.expect("workflow");
    assert_eq!(summary["users"], 6);
    assert_eq!(summary["groups"], 1);

    // Catalogs were written by the activities.
    assert!(provider.get_identity("user5@example.com").is_ok());

    // The detached uploader commits after the workflow closes the
    // channel; poll briefly for it.
    for _ in 0..200 {
        if upstream.commits.load(std::sync::atomic::Ordering::SeqCst) == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(upstream.starts.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert_eq!(upstream.commits.load(std::sync::atomic::Ordering::SeqCst), 1);
    let forwarded: usize = upstream
        .chunks
        .lock()
        .unwrap()
        .iter()
        .map(SyncChunk::len)
        .sum();
    // 6 users + 1 group + 1 role + 3 permissions + 1 resource.
    assert_eq!(forwarded, 12);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn durable_sync_registers_provider_activities() {
    let provider = Arc::new(seeded_memory_provider("mem", 2, 2).await);
    let service = Arc::new(WorkflowService::new());

    Synchronizer::durable(Arc::clone(&service))
        .synchronize(
            provider as Arc<dyn Provider>,
            SyncRequest::for_provider("mem"),
        )
        .await
        .expect("start");

    let names = service.activities().names();
    assert!(names.contains(&"mem-SynchronizeUsers".to_string()));
    assert!(names.contains(&"mem-SynchronizeGroups".to_string()));
    assert!(names.contains(&"mem-SynchronizeRoles".to_string()));
    service.await_result("mem-synchronize").await.expect("workflow");
}
