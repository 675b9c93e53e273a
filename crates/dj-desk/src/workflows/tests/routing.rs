use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde_json::json;
use tower::ServiceExt;

use super::common::*;
use crate::workflows::domain::Priority;
use crate::workflows::memory::{InMemoryNotifications, InMemoryWorkflowStore};
use crate::workflows::router::{self, workflow_router};

fn shared_service() -> Arc<MemoryService> {
    let (service, _, _) = build_service();
    Arc::new(service)
}

#[tokio::test]
async fn create_route_returns_created_job() {
    let service = shared_service();

    let response = workflow_router(service)
        .oneshot(json_request(
            "POST",
            "/api/v1/jobs",
            &json!({
                "project_id": "packaging",
                "job_type_id": "banner",
                "title": "Spring banner",
                "requester_id": "rae",
                "submitted_on": "2025-01-03"
            }),
        ))
        .await
        .expect("router response");

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = read_json_body(response).await;
    assert_eq!(body["job"]["status"]["state"], "pending_approval");
    assert_eq!(body["job"]["current_level"], 1);
    assert_eq!(body["job"]["due_date"], "2025-01-08");
}

#[tokio::test]
async fn decision_route_rejects_approvers_outside_the_pool() {
    let service = shared_service();
    let job = service
        .create_job(job_request("banner", Priority::Normal), date(2025, 1, 3))
        .expect("created")
        .job;

    let response = workflow_router(service)
        .oneshot(json_request(
            "POST",
            &format!("/api/v1/jobs/{}/decisions", job.id),
            &json!({ "approver_id": "wes", "level": 1, "decision": "approve" }),
        ))
        .await
        .expect("router response");

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = read_json_body(response).await;
    assert_eq!(body["kind"], "approval");
}

#[tokio::test]
async fn decision_on_unopened_level_conflicts() {
    let service = shared_service();
    let job = service
        .create_job(job_request("banner", Priority::Normal), date(2025, 1, 3))
        .expect("created")
        .job;

    let response = workflow_router(service)
        .oneshot(json_request(
            "POST",
            &format!("/api/v1/jobs/{}/decisions", job.id),
            &json!({ "approver_id": "kai", "level": 2, "decision": "approve" }),
        ))
        .await
        .expect("router response");

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn decision_route_reports_level_outcome() {
    let service = shared_service();
    let job = service
        .create_job(job_request("banner", Priority::Normal), date(2025, 1, 3))
        .expect("created")
        .job;

    let response = workflow_router(service)
        .oneshot(json_request(
            "POST",
            &format!("/api/v1/jobs/{}/decisions", job.id),
            &json!({ "approver_id": "li", "level": 1, "decision": "approve" }),
        ))
        .await
        .expect("router response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["outcome"]["outcome"], "advanced");
    assert_eq!(body["outcome"]["next_level"], 2);
}

#[tokio::test]
async fn unknown_job_is_not_found() {
    let response = workflow_router(shared_service())
        .oneshot(get_request("/api/v1/jobs/dj-missing"))
        .await
        .expect("router response");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = read_json_body(response).await;
    assert_eq!(body["kind"], "persistence");
    assert_eq!(body["error"], "record not found");
}

#[tokio::test]
async fn skip_flow_without_matrix_row_is_unprocessable() {
    let response = workflow_router(shared_service())
        .oneshot(json_request(
            "PUT",
            "/api/v1/projects/packaging/flows",
            &json!({
                "actor_id": "ada",
                "flow": {
                    "project_id": "ignored",
                    "job_type_id": "poster",
                    "skip_approval": true,
                    "active": true
                }
            }),
        ))
        .await
        .expect("router response");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = read_json_body(response).await;
    assert_eq!(body["kind"], "configuration");
}

#[tokio::test]
async fn matrix_route_stores_rows_for_the_path_project() {
    let service = shared_service();

    let response = workflow_router(service.clone())
        .oneshot(json_request(
            "PUT",
            "/api/v1/projects/packaging/assignment-matrix",
            &json!({
                "actor_id": "mia",
                "rows": [
                    { "job_type_id": "resize", "assignee_id": "oli" },
                    { "job_type_id": "poster", "assignee_id": "wes" }
                ]
            }),
        ))
        .await
        .expect("router response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body.as_array().map(Vec::len), Some(2));
    assert_eq!(body[0]["project_id"], "packaging");

    let update = service
        .create_job(job_request("resize", Priority::Normal), date(2025, 1, 3))
        .expect("created");
    assert_eq!(update.job.assignee_id, Some(user("oli")));
}

#[tokio::test]
async fn shift_log_handler_lists_entries() {
    let service = shared_service();
    let normal = service
        .create_job(job_request("resize", Priority::Normal), date(2025, 1, 3))
        .expect("normal")
        .job;
    service
        .create_job(job_request("resize", Priority::Urgent), date(2025, 1, 3))
        .expect("urgent");

    let response = router::shift_log_handler::<InMemoryWorkflowStore, InMemoryNotifications>(
        State(service),
        Path(normal.id.to_string()),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body[0]["job_id"], normal.id.as_str());
    assert_eq!(body[0]["new_due_date"], "2025-01-10");
}

#[tokio::test]
async fn lifecycle_routes_enforce_assignee() {
    let service = shared_service();
    let job = service
        .create_job(job_request("resize", Priority::Normal), date(2025, 1, 3))
        .expect("created")
        .job;

    let forbidden = workflow_router(service.clone())
        .oneshot(json_request(
            "POST",
            &format!("/api/v1/jobs/{}/start", job.id),
            &json!({ "actor_id": "rae" }),
        ))
        .await
        .expect("router response");
    assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);

    let started = workflow_router(service)
        .oneshot(json_request(
            "POST",
            &format!("/api/v1/jobs/{}/start", job.id),
            &json!({ "actor_id": "wes" }),
        ))
        .await
        .expect("router response");
    assert_eq!(started.status(), StatusCode::OK);
    let body = read_json_body(started).await;
    assert_eq!(body["status"]["state"], "in_progress");
}
