use std::sync::Arc;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use sqlx::Row;

use fundflow_core::domain::approval::{Approval, ApprovalId, ApprovalStatus};
use fundflow_core::domain::org::{ProjectId, UserId};
use fundflow_core::domain::receiver::ReceiverStatus;
use fundflow_core::domain::request::{NewFundRequest, RequestId, RequestStatus};
use fundflow_core::domain::workflow::WorkflowId;
use fundflow_core::errors::DomainError;
use fundflow_core::lifecycle::{ApprovalDecision, TransitionError};
use fundflow_core::routing::{RoutingError, RoutingOptions};
use fundflow_db::repositories::{
    AcknowledgeOutcome, ApprovalRepository, FinalReceiverRepository, FundRequestRepository,
    SqlApprovalRepository, SqlFinalReceiverRepository, SqlFundRequestRepository,
};
use fundflow_db::{connect_with_settings, migrations, DbPool, DemoSeed};
use fundflow_engine::{ApprovalEngine, EngineError};

const INITIATOR: UserId = UserId(10);
const FINANCE_ASHA: UserId = UserId(21);
const FINANCE_BO: UserId = UserId(22);
const DIRECTOR_CALEB: UserId = UserId(30);

async fn setup() -> (DbPool, ApprovalEngine) {
    let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrations");
    DemoSeed::load(&pool).await.expect("seed");
    let engine =
        ApprovalEngine::with_pool(pool.clone(), RoutingOptions::default()).expect("engine");
    (pool, engine)
}

fn submission() -> NewFundRequest {
    NewFundRequest {
        title: "Team offsite".to_string(),
        description: "Q3 planning offsite".to_string(),
        amount: Decimal::new(125_000, 2),
        initiator_id: INITIATOR,
        workflow_id: WorkflowId(DemoSeed::WORKFLOW_ID),
        department_id: None,
        project_id: None,
        fields: vec![("cost_center".to_string(), "CC-204".to_string())],
    }
}

async fn pending_at(pool: &DbPool, request_id: &RequestId, level: i32) -> Approval {
    let repo = SqlApprovalRepository::new(pool.clone());
    let mut pending =
        repo.list_pending_for_level(request_id, level).await.expect("query pending");
    assert_eq!(pending.len(), 1, "exactly one pending approval at level {level}");
    pending.remove(0)
}

async fn insert_delegation(pool: &DbPool, from: i64, to: i64, created_offset_secs: i64) {
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO delegation (from_user_id, to_user_id, starts_at, ends_at, revoked, created_at)
         VALUES (?, ?, ?, ?, 0, ?)",
    )
    .bind(from)
    .bind(to)
    .bind((now - Duration::hours(1)).to_rfc3339())
    .bind((now + Duration::hours(12)).to_rfc3339())
    .bind((now + Duration::seconds(created_offset_secs)).to_rfc3339())
    .execute(pool)
    .await
    .expect("insert delegation");
}

async fn outbox_subjects(pool: &DbPool) -> Vec<(String, String)> {
    sqlx::query("SELECT to_address, subject FROM email_outbox ORDER BY queued_at ASC, id ASC")
        .fetch_all(pool)
        .await
        .expect("query outbox")
        .into_iter()
        .map(|row| (row.get::<String, _>("to_address"), row.get::<String, _>("subject")))
        .collect()
}

#[tokio::test]
async fn submit_assigns_the_initiator_at_level_zero() {
    let (pool, engine) = setup().await;

    let request = engine.submit(submission(), "corr-submit").await.expect("submit");
    assert_eq!(request.status, RequestStatus::Pending);
    assert_eq!(request.current_level, 0);

    let approval = pending_at(&pool, &request.id, 0).await;
    assert_eq!(approval.approver_id, INITIATOR, "first step is a self-approval marker");

    let subjects = outbox_subjects(&pool).await;
    assert_eq!(subjects.len(), 1, "self-assigned first step sends only the initiator ack");
    assert!(subjects[0].1.starts_with("Fund request submitted"));
}

#[tokio::test]
async fn full_chain_reaches_terminal_approval_and_fans_out() {
    let (pool, engine) = setup().await;

    let request = engine.submit(submission(), "corr-e").await.expect("submit");

    let level0 = pending_at(&pool, &request.id, 0).await;
    engine
        .decide(&level0.id, INITIATOR, ApprovalDecision::Approve, None, "corr-e")
        .await
        .expect("level 0");

    let level1 = pending_at(&pool, &request.id, 1).await;
    assert_eq!(level1.approver_id, FINANCE_ASHA, "equal load ties break to the lowest id");
    engine
        .decide(&level1.id, FINANCE_ASHA, ApprovalDecision::Approve, Some("within budget"), "corr-e")
        .await
        .expect("level 1");

    let level2 = pending_at(&pool, &request.id, 2).await;
    assert_eq!(level2.approver_id, DIRECTOR_CALEB);
    engine
        .decide(&level2.id, DIRECTOR_CALEB, ApprovalDecision::Approve, None, "corr-e")
        .await
        .expect("level 2");

    let closed = SqlFundRequestRepository::new(pool.clone())
        .find_by_id(&request.id)
        .await
        .expect("find")
        .expect("exists");
    assert_eq!(closed.status, RequestStatus::Approved);

    let receivers = SqlFinalReceiverRepository::new(pool.clone())
        .list_for_request(&request.id)
        .await
        .expect("assignments");
    assert_eq!(receivers.len(), 1, "director matches every channel once after dedup");
    assert_eq!(receivers[0].user_id, DIRECTOR_CALEB);
    assert_eq!(receivers[0].status, ReceiverStatus::Pending);

    let subjects = outbox_subjects(&pool).await;
    let completed: Vec<_> = subjects
        .iter()
        .filter(|(_, subject)| subject.starts_with("Fund request approved"))
        .collect();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].0, "caleb@example.com");

    // Invariant check across the whole run: never two pending rows for one
    // (request, level).
    let max_pending_per_level: i64 = sqlx::query(
        "SELECT IFNULL(MAX(c), 0) AS c FROM (
             SELECT COUNT(*) AS c FROM approval
             WHERE status = 'pending' GROUP BY request_id, level
         )",
    )
    .fetch_one(&pool)
    .await
    .expect("invariant query")
    .get("c");
    assert!(max_pending_per_level <= 1);
}

#[tokio::test]
async fn least_loaded_finance_manager_wins_the_assignment() {
    let (pool, engine) = setup().await;

    // Pre-load Asha with pending work on the seeded request.
    let approvals = SqlApprovalRepository::new(pool.clone());
    for (id, level) in [("busy-1", 5), ("busy-2", 6)] {
        approvals
            .insert_pending(&Approval {
                id: ApprovalId(id.to_string()),
                request_id: RequestId(DemoSeed::SEED_REQUEST_ID.to_string()),
                level,
                approver_id: FINANCE_ASHA,
                status: ApprovalStatus::Pending,
                comment: None,
                overridden_user_id: None,
                assigned_at: Utc::now(),
                actioned_at: None,
                approved_at: None,
            })
            .await
            .expect("preload");
    }

    let request = engine.submit(submission(), "corr-a").await.expect("submit");
    let level0 = pending_at(&pool, &request.id, 0).await;
    engine
        .decide(&level0.id, INITIATOR, ApprovalDecision::Approve, None, "corr-a")
        .await
        .expect("advance");

    let level1 = pending_at(&pool, &request.id, 1).await;
    assert_eq!(level1.approver_id, FINANCE_BO, "zero pending beats two pending");
}

#[tokio::test]
async fn explicit_project_scope_never_falls_back_globally() {
    let (pool, engine) = setup().await;

    sqlx::query("INSERT INTO project (id, name) VALUES (5, 'Borealis')")
        .execute(&pool)
        .await
        .expect("insert project");

    let mut scoped = submission();
    scoped.project_id = Some(ProjectId(5));
    let request = engine.submit(scoped, "corr-b").await.expect("submit");

    let level0 = pending_at(&pool, &request.id, 0).await;
    let error = engine
        .decide(&level0.id, INITIATOR, ApprovalDecision::Approve, None, "corr-b")
        .await
        .expect_err("no finance manager is mapped to project 5");

    match error {
        EngineError::Routing(RoutingError::NoCandidateInProject {
            designation_id,
            project_id,
        }) => {
            assert_eq!(designation_id, 7);
            assert_eq!(project_id, 5);
        }
        other => panic!("expected project-scoped routing failure, got {other:?}"),
    }
}

#[tokio::test]
async fn active_delegation_chain_redirects_the_assignment() {
    let (pool, engine) = setup().await;

    // Asha delegates to Bo, Bo delegates to Caleb.
    insert_delegation(&pool, FINANCE_ASHA.0, FINANCE_BO.0, 1).await;
    insert_delegation(&pool, FINANCE_BO.0, DIRECTOR_CALEB.0, 2).await;

    let request = engine.submit(submission(), "corr-c").await.expect("submit");
    let level0 = pending_at(&pool, &request.id, 0).await;
    engine
        .decide(&level0.id, INITIATOR, ApprovalDecision::Approve, None, "corr-c")
        .await
        .expect("advance");

    let level1 = pending_at(&pool, &request.id, 1).await;
    assert_eq!(level1.approver_id, DIRECTOR_CALEB, "the chain ends at Caleb");
}

#[tokio::test]
async fn delegation_cycle_terminates_on_a_cycle_member() {
    let (pool, engine) = setup().await;

    insert_delegation(&pool, FINANCE_ASHA.0, FINANCE_BO.0, 1).await;
    insert_delegation(&pool, FINANCE_BO.0, FINANCE_ASHA.0, 2).await;

    let request = engine.submit(submission(), "corr-d").await.expect("submit");
    let level0 = pending_at(&pool, &request.id, 0).await;
    engine
        .decide(&level0.id, INITIATOR, ApprovalDecision::Approve, None, "corr-d")
        .await
        .expect("advance");

    let level1 = pending_at(&pool, &request.id, 1).await;
    assert!(
        [FINANCE_ASHA, FINANCE_BO].contains(&level1.approver_id),
        "cycle resolution stays within the cycle"
    );
}

#[tokio::test]
async fn send_back_and_resubmission_restart_the_chain() {
    let (pool, engine) = setup().await;

    let request = engine.submit(submission(), "corr-sb").await.expect("submit");
    let level0 = pending_at(&pool, &request.id, 0).await;
    engine
        .decide(&level0.id, INITIATOR, ApprovalDecision::Approve, None, "corr-sb")
        .await
        .expect("level 0");

    let level1 = pending_at(&pool, &request.id, 1).await;
    engine
        .decide(
            &level1.id,
            FINANCE_ASHA,
            ApprovalDecision::SendBack,
            Some("missing cost breakdown"),
            "corr-sb",
        )
        .await
        .expect("send back");

    let requests = SqlFundRequestRepository::new(pool.clone());
    let parked = requests.find_by_id(&request.id).await.expect("find").expect("exists");
    assert_eq!(parked.status, RequestStatus::SentBack);

    let resubmitted = engine
        .resubmit(
            &request.id,
            &[("cost_center".to_string(), "CC-207".to_string())],
            "corr-sb",
        )
        .await
        .expect("resubmit");
    assert_eq!(resubmitted.status, RequestStatus::Pending);
    assert_eq!(resubmitted.current_level, 0);

    let fields = requests.list_fields(&request.id).await.expect("fields");
    assert_eq!(fields.len(), 2, "resubmission appends a new revision");
    assert_eq!(fields[1].revision, 1);

    let history = SqlApprovalRepository::new(pool.clone())
        .list_for_request(&request.id)
        .await
        .expect("history");
    assert_eq!(history.len(), 3, "prior decisions stay, a fresh level-0 row is appended");
}

#[tokio::test]
async fn double_decision_on_one_approval_is_rejected() {
    let (pool, engine) = setup().await;

    let request = engine.submit(submission(), "corr-dd").await.expect("submit");
    let level0 = pending_at(&pool, &request.id, 0).await;

    engine
        .decide(&level0.id, INITIATOR, ApprovalDecision::Approve, None, "corr-dd")
        .await
        .expect("first decision");
    let error = engine
        .decide(&level0.id, INITIATOR, ApprovalDecision::Reject, None, "corr-dd")
        .await
        .expect_err("already resolved");

    assert!(matches!(
        error,
        EngineError::Domain(DomainError::Transition(TransitionError::ApprovalAlreadyResolved {
            status: ApprovalStatus::Approved
        }))
    ));
}

#[tokio::test]
async fn rejection_closes_the_request_and_notifies_the_initiator() {
    let (pool, engine) = setup().await;

    let request = engine.submit(submission(), "corr-rj").await.expect("submit");
    let level0 = pending_at(&pool, &request.id, 0).await;
    engine
        .decide(&level0.id, INITIATOR, ApprovalDecision::Approve, None, "corr-rj")
        .await
        .expect("level 0");

    let level1 = pending_at(&pool, &request.id, 1).await;
    engine
        .decide(
            &level1.id,
            FINANCE_ASHA,
            ApprovalDecision::Reject,
            Some("budget exhausted"),
            "corr-rj",
        )
        .await
        .expect("reject");

    let closed = SqlFundRequestRepository::new(pool.clone())
        .find_by_id(&request.id)
        .await
        .expect("find")
        .expect("exists");
    assert_eq!(closed.status, RequestStatus::Rejected);

    let subjects = outbox_subjects(&pool).await;
    assert!(
        subjects
            .iter()
            .any(|(to, subject)| to == "priya@example.com"
                && subject.starts_with("Fund request rejected")),
        "initiator learns about the rejection"
    );
}

#[tokio::test]
async fn first_receiver_acknowledgement_wins_exactly_once() {
    let (pool, engine) = setup().await;

    // Add a second legacy receiver so two assignments exist.
    sqlx::query(
        "INSERT INTO workflow_final_receiver (workflow_id, receiver_name, user_id)
         VALUES (1, NULL, 21)",
    )
    .execute(&pool)
    .await
    .expect("legacy receiver");

    let request = engine.submit(submission(), "corr-ack").await.expect("submit");
    for (level, actor) in [(0, INITIATOR), (1, FINANCE_ASHA), (2, DIRECTOR_CALEB)] {
        let approval = pending_at(&pool, &request.id, level).await;
        engine
            .decide(&approval.id, actor, ApprovalDecision::Approve, None, "corr-ack")
            .await
            .expect("approve");
    }

    let first = engine
        .acknowledge(&request.id, DIRECTOR_CALEB, "corr-ack")
        .await
        .expect("first ack");
    assert_eq!(first, AcknowledgeOutcome::Completed);

    let second =
        engine.acknowledge(&request.id, FINANCE_ASHA, "corr-ack").await.expect("second ack");
    assert_eq!(second, AcknowledgeOutcome::AlreadyClosed);

    let rows = SqlFinalReceiverRepository::new(pool.clone())
        .list_for_request(&request.id)
        .await
        .expect("assignments");
    assert_eq!(rows.iter().filter(|r| r.status == ReceiverStatus::Completed).count(), 1);
    assert_eq!(rows.iter().filter(|r| r.status == ReceiverStatus::AutoClosed).count(), 1);
}

#[tokio::test]
async fn auto_approve_steps_cascade_without_an_actor() {
    let (pool, engine) = setup().await;

    sqlx::query("INSERT INTO workflow (id, name) VALUES (2, 'Fast-track opex')")
        .execute(&pool)
        .await
        .expect("workflow");
    sqlx::query(
        "INSERT INTO workflow_step
             (workflow_id, name, sequence, sla_hours, auto_approve, is_final_receiver,
              designation_id, assigned_user_name)
         VALUES
             (2, 'Initiator', 0, 24, 1, 0, NULL, NULL),
             (2, 'Finance Review', 1, 48, 0, 0, 7, NULL)",
    )
    .execute(&pool)
    .await
    .expect("steps");

    let mut fast_track = submission();
    fast_track.workflow_id = WorkflowId(2);
    let request = engine.submit(fast_track, "corr-auto").await.expect("submit");

    assert_eq!(request.current_level, 1, "the initiator step approved itself");
    let level1 = pending_at(&pool, &request.id, 1).await;
    assert_eq!(level1.approver_id, FINANCE_ASHA);

    let history = SqlApprovalRepository::new(pool.clone())
        .list_for_request(&request.id)
        .await
        .expect("history");
    assert_eq!(history[0].status, ApprovalStatus::Approved);
    assert!(history[0].approved_at.is_some());
}
