//! End-to-end approval scenarios driven through the public service facade and HTTP router.

mod common {
    use std::sync::Arc;

    use chrono::NaiveDate;

    use dj_desk::config::SchedulingConfig;
    use dj_desk::workflows::capability::Role;
    use dj_desk::workflows::{
        ApprovalFlow, ApprovalLogic, DepartmentId, DesignJobService, InMemoryNotifications,
        InMemoryWorkflowStore, JobTypeAssignment, JobTypeId, ProjectId, UserId,
    };

    pub(super) type Service = DesignJobService<InMemoryWorkflowStore, InMemoryNotifications>;

    pub(super) fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    pub(super) fn user(id: &str) -> UserId {
        UserId::new(id)
    }

    pub(super) fn project() -> ProjectId {
        ProjectId::new("spring-campaign")
    }

    /// Level 1: ANY of the art directors. Level 2: ALL of brand and legal.
    pub(super) fn campaign_flow() -> ApprovalFlow {
        let mut flow = ApprovalFlow::leveled(project()).activated();
        flow.add_level(ApprovalLogic::Any, [user("ad-1"), user("ad-2")]);
        flow.add_level(ApprovalLogic::All, [user("brand"), user("legal")]);
        flow.with_team_lead(None)
    }

    pub(super) fn build() -> (Arc<Service>, Arc<InMemoryNotifications>) {
        let store = Arc::new(InMemoryWorkflowStore::default());
        store
            .register_department(project(), DepartmentId::new("studio"), Some(user("manager")))
            .expect("department");
        store.grant_role(user("admin"), Role::Admin).expect("admin");
        let notifications = Arc::new(InMemoryNotifications::default());
        let service = DesignJobService::new(
            store,
            notifications.clone(),
            SchedulingConfig {
                urgent_shift_days: 2,
                default_sla_days: 3,
            },
        );

        service
            .save_assignment_matrix(
                &user("admin"),
                &project(),
                vec![JobTypeAssignment {
                    project_id: project(),
                    job_type_id: JobTypeId::new("resize"),
                    assignee_id: user("designer"),
                }],
            )
            .expect("matrix");
        service
            .save_flow(
                &user("admin"),
                ApprovalFlow::skip(project(), JobTypeId::new("resize")).activated(),
            )
            .expect("skip flow");
        service
            .save_flow(&user("admin"), campaign_flow())
            .expect("default flow");

        (Arc::new(service), notifications)
    }
}

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use common::*;
use dj_desk::workflows::{
    workflow_router, AssignmentSource, CreateJobRequest, Decision, JobStatus, JobTypeId,
    LevelOutcome, NotificationEventType, Priority,
};

fn request(job_type: &str) -> CreateJobRequest {
    CreateJobRequest {
        project_id: project(),
        job_type_id: JobTypeId::new(job_type),
        title: "Hero banner".to_string(),
        requester_id: user("requester"),
        priority: Priority::Normal,
        due_date: None,
        submitted_on: Some(date(2025, 3, 7)),
    }
}

async fn send(
    service: &std::sync::Arc<Service>,
    method: &str,
    uri: &str,
    body: Value,
) -> (StatusCode, Value) {
    let response = workflow_router(service.clone())
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&body).expect("json")))
                .expect("request"),
        )
        .await
        .expect("router response");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("body");
    (status, serde_json::from_slice(&bytes).expect("json payload"))
}

#[test]
fn two_level_flow_ends_with_manager_assignment_when_no_team_lead() {
    let (service, notifications) = build();
    let job = service
        .create_job(request("banner"), date(2025, 3, 7))
        .expect("created")
        .job;
    assert_eq!(job.due_date, date(2025, 3, 12));

    let steps = [("ad-2", 1), ("legal", 2), ("brand", 2)];
    let mut last = None;
    for (approver, level) in steps {
        last = Some(
            service
                .record_decision(&job.id, &user(approver), level, Decision::Approve)
                .expect("decision"),
        );
    }

    let last = last.expect("final update");
    assert_eq!(
        last.outcome,
        Some(LevelOutcome::FlowCompleted { completed_level: 2 })
    );
    assert_eq!(last.job.status, JobStatus::Assigned);
    assert_eq!(last.job.assignee_id, Some(user("manager")));
    assert_eq!(
        last.assignment.map(|assignment| assignment.source),
        Some(AssignmentSource::DepartmentManager)
    );
    assert!(notifications
        .events()
        .iter()
        .any(|event| event.event_type == NotificationEventType::JobApproved));
}

#[test]
fn late_second_approval_on_any_level_changes_nothing() {
    let (service, _) = build();
    let job = service
        .create_job(request("banner"), date(2025, 3, 7))
        .expect("created")
        .job;

    service
        .record_decision(&job.id, &user("ad-1"), 1, Decision::Approve)
        .expect("first");
    let before = service.get(&job.id).expect("job");
    let late = service
        .record_decision(&job.id, &user("ad-2"), 1, Decision::Approve)
        .expect("late");

    assert_eq!(late.outcome, Some(LevelOutcome::AlreadySettled { level: 1 }));
    assert_eq!(service.get(&job.id).expect("job"), before);
}

#[tokio::test]
async fn http_round_trip_from_intake_to_rework() {
    let (service, _) = build();

    let (status, created) = send(
        &service,
        "POST",
        "/api/v1/jobs",
        json!({
            "project_id": "spring-campaign",
            "job_type_id": "banner",
            "title": "Hero banner",
            "requester_id": "requester",
            "submitted_on": "2025-03-07"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let job_id = created["job"]["id"].as_str().expect("job id").to_string();

    let (status, rejected) = send(
        &service,
        "POST",
        &format!("/api/v1/jobs/{job_id}/decisions"),
        json!({ "approver_id": "ad-1", "level": 1, "decision": "reject" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rejected["job"]["status"]["state"], "rework");

    let (status, resubmitted) = send(
        &service,
        "POST",
        &format!("/api/v1/jobs/{job_id}/resubmit"),
        json!({ "actor_id": "requester" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resubmitted["job"]["current_level"], 1);
}

#[tokio::test]
async fn skip_routed_job_is_assigned_over_http() {
    let (service, _) = build();

    let (status, created) = send(
        &service,
        "POST",
        "/api/v1/jobs",
        json!({
            "project_id": "spring-campaign",
            "job_type_id": "resize",
            "title": "Resize hero for social",
            "requester_id": "requester",
            "submitted_on": "2025-03-07"
        }),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["job"]["status"]["state"], "assigned");
    assert_eq!(created["assignment"]["assignee_id"], "designer");
    assert_eq!(created["assignment"]["source"], "assignment_matrix");
}

#[tokio::test]
async fn removing_the_matrix_row_of_a_skip_flow_is_unprocessable() {
    let (service, _) = build();

    let (status, body) = send(
        &service,
        "PUT",
        "/api/v1/projects/spring-campaign/assignment-matrix",
        json!({ "actor_id": "manager", "rows": [] }),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["kind"], "configuration");
}
