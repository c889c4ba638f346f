mod common;

use serde_json::json;

use common::{coordinator, site, workflow};
use fedrun::model::{JobId, JobStatus, OperationState, SiteId, WorkflowId};
use fedrun::{Coordinator, CoordinatorConfig, CoordinatorError};

/// Workflow W requires {"gpu"}; site A has {"gpu","net"}, site B has {"net"}.
/// J1 under W must be listed for A only.
#[tokio::test]
async fn test_capability_filtering() {
    let coord = coordinator();
    coord
        .publish_workflow(workflow("wf-gpu", &["gpu"], &[]))
        .await
        .unwrap();
    coord
        .register_site(site("site-a", &["gpu", "net"]))
        .await
        .unwrap();
    coord.register_site(site("site-b", &["net"])).await.unwrap();
    let job = coord
        .create_job(&WorkflowId::from("wf-gpu"), json!({}))
        .await
        .unwrap();

    let for_a = coord
        .list_claimable_jobs(&SiteId::from("site-a"))
        .await
        .unwrap();
    assert_eq!(for_a.len(), 1);
    assert_eq!(for_a[0].id, job.id);

    let for_b = coord
        .list_claimable_jobs(&SiteId::from("site-b"))
        .await
        .unwrap();
    assert!(for_b.is_empty());
}

#[tokio::test]
async fn test_claim_rechecks_capabilities() {
    let coord = coordinator();
    coord
        .publish_workflow(workflow("wf-gpu", &["gpu"], &[]))
        .await
        .unwrap();
    coord.register_site(site("site-b", &["net"])).await.unwrap();
    let job = coord
        .create_job(&WorkflowId::from("wf-gpu"), json!({}))
        .await
        .unwrap();

    let err = coord
        .claim_job(&job.id, &SiteId::from("site-b"))
        .await
        .unwrap_err();
    assert!(matches!(err, CoordinatorError::CapabilityMismatch { .. }));

    // The failed attempt must not have touched the job.
    let job = coord.get_job(&job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Unclaimed);
}

#[tokio::test]
async fn test_successful_claim_creates_initial_operation() {
    let coord = coordinator();
    let job = common::seed_simple_job(&coord).await;

    let op = coord
        .claim_job(&job.id, &SiteId::from("site-a"))
        .await
        .unwrap();
    assert_eq!(op.state, OperationState::Initial);
    assert_eq!(op.job_id, job.id);
    assert_eq!(op.site_id, SiteId::from("site-a"));

    let job = coord.get_job(&job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Claimed);
    assert_eq!(job.claimed_by, Some(SiteId::from("site-a")));
}

/// Two concurrent claims of the same job: exactly one wins, the other sees
/// a claim conflict.
#[tokio::test]
async fn test_concurrent_claims_single_winner() {
    let coord = coordinator();
    let job = common::seed_simple_job(&coord).await;
    let site_id = SiteId::from("site-a");

    let (first, second) = tokio::join!(
        coord.claim_job(&job.id, &site_id),
        coord.claim_job(&job.id, &site_id),
    );

    let outcomes = [first, second];
    let wins = outcomes.iter().filter(|r| r.is_ok()).count();
    assert_eq!(wins, 1);
    let conflict = outcomes.iter().find(|r| r.is_err()).unwrap();
    assert!(matches!(
        conflict.as_ref().unwrap_err(),
        CoordinatorError::ClaimConflict(_)
    ));
}

#[tokio::test]
async fn test_claim_of_claimed_or_missing_job_conflicts() {
    let coord = coordinator();
    let job = common::seed_simple_job(&coord).await;
    let site_id = SiteId::from("site-a");

    coord.claim_job(&job.id, &site_id).await.unwrap();
    let err = coord.claim_job(&job.id, &site_id).await.unwrap_err();
    assert!(matches!(err, CoordinatorError::ClaimConflict(_)));

    let err = coord
        .claim_job(&JobId::from("no-such-job"), &site_id)
        .await
        .unwrap_err();
    assert!(matches!(err, CoordinatorError::ClaimConflict(_)));
}

#[tokio::test]
async fn test_claimed_job_not_listed() {
    let coord = coordinator();
    let job = common::seed_simple_job(&coord).await;
    let site_id = SiteId::from("site-a");

    coord.claim_job(&job.id, &site_id).await.unwrap();
    assert!(coord.list_claimable_jobs(&site_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_release_gated_on_terminal_operation() {
    let coord = coordinator();
    let job = common::seed_simple_job(&coord).await;
    let site_id = SiteId::from("site-a");

    let op = coord.claim_job(&job.id, &site_id).await.unwrap();

    // Operation still active: release refused.
    let err = coord.release_job(&job.id).await.unwrap_err();
    assert!(matches!(err, CoordinatorError::InvalidTransition(_)));

    coord.operations().cancel(&op.id).await.unwrap();
    let released = coord.release_job(&job.id).await.unwrap();
    assert_eq!(released.status, JobStatus::Unclaimed);
    assert!(released.claimed_by.is_none());

    // The job is re-executable: a fresh claim yields a fresh operation.
    let second = coord.claim_job(&job.id, &site_id).await.unwrap();
    assert_ne!(second.id, op.id);
    assert_eq!(second.state, OperationState::Initial);
}

#[tokio::test]
async fn test_release_of_unclaimed_job_is_invalid() {
    let coord = coordinator();
    let job = common::seed_simple_job(&coord).await;

    let err = coord.release_job(&job.id).await.unwrap_err();
    assert!(matches!(err, CoordinatorError::InvalidTransition(_)));
}

#[tokio::test]
async fn test_listing_pagination_is_stable() {
    let coord = Coordinator::in_memory(CoordinatorConfig::default().with_page_size(2));
    coord
        .publish_workflow(workflow("wf-basic", &[], &[]))
        .await
        .unwrap();
    coord.register_site(site("site-a", &[])).await.unwrap();
    for _ in 0..5 {
        coord
            .create_job(&WorkflowId::from("wf-basic"), json!({}))
            .await
            .unwrap();
    }

    let site_id = SiteId::from("site-a");
    let mut seen = Vec::new();
    for page in 0..3 {
        let jobs = coord
            .list_claimable_jobs_page(&site_id, page)
            .await
            .unwrap();
        assert_eq!(jobs.len(), if page < 2 { 2 } else { 1 });
        for pair in jobs.windows(2) {
            assert!(pair[0].created_at <= pair[1].created_at);
        }
        seen.extend(jobs.into_iter().map(|j| j.id));
    }
    assert!(coord
        .list_claimable_jobs_page(&site_id, 3)
        .await
        .unwrap()
        .is_empty());

    seen.sort();
    seen.dedup();
    assert_eq!(seen.len(), 5, "pages must not overlap");
}

#[tokio::test]
async fn test_empty_requirements_match_any_site() {
    let coord = coordinator();
    coord
        .publish_workflow(workflow("wf-open", &[], &[]))
        .await
        .unwrap();
    coord.register_site(site("site-bare", &[])).await.unwrap();
    let job = coord
        .create_job(&WorkflowId::from("wf-open"), json!({}))
        .await
        .unwrap();

    let listed = coord
        .list_claimable_jobs(&SiteId::from("site-bare"))
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, job.id);
}
