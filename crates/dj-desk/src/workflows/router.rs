use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Router,
};
use chrono::Local;
use serde::Deserialize;
use serde_json::json;

use super::approval::{ApprovalError, ApprovalFlow, Decision, JobTypeAssignment};
use super::domain::{JobId, JobTypeId, ProjectId, UserId};
use super::repository::{NotificationDispatcher, RepositoryError, WorkflowStore};
use super::service::{CreateJobRequest, DesignJobService, JobUpdate, WorkflowError};
use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub(crate) struct DecisionRequest {
    pub(crate) approver_id: UserId,
    pub(crate) level: u32,
    pub(crate) decision: Decision,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ActorRequest {
    pub(crate) actor_id: UserId,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AssignRequest {
    pub(crate) actor_id: UserId,
    pub(crate) assignee_id: UserId,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SaveFlowRequest {
    pub(crate) actor_id: UserId,
    pub(crate) flow: ApprovalFlow,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MatrixRow {
    pub(crate) job_type_id: JobTypeId,
    pub(crate) assignee_id: UserId,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SaveMatrixRequest {
    pub(crate) actor_id: UserId,
    pub(crate) rows: Vec<MatrixRow>,
}

type SharedService<S, N> = Arc<DesignJobService<S, N>>;

/// Router builder exposing job intake, approval, and configuration endpoints.
pub fn workflow_router<S, N>(service: SharedService<S, N>) -> Router
where
    S: WorkflowStore + 'static,
    N: NotificationDispatcher + 'static,
{
    Router::new()
        .route("/api/v1/jobs", post(create_job_handler::<S, N>))
        .route("/api/v1/jobs/:job_id", get(job_handler::<S, N>))
        .route(
            "/api/v1/jobs/:job_id/decisions",
            post(decision_handler::<S, N>),
        )
        .route("/api/v1/jobs/:job_id/assignee", post(assign_handler::<S, N>))
        .route(
            "/api/v1/jobs/:job_id/resubmit",
            post(resubmit_handler::<S, N>),
        )
        .route(
            "/api/v1/jobs/:job_id/withdraw",
            post(withdraw_handler::<S, N>),
        )
        .route("/api/v1/jobs/:job_id/start", post(start_handler::<S, N>))
        .route(
            "/api/v1/jobs/:job_id/complete",
            post(complete_handler::<S, N>),
        )
        .route(
            "/api/v1/jobs/:job_id/shift-log",
            get(shift_log_handler::<S, N>),
        )
        .route(
            "/api/v1/projects/:project_id/flows",
            put(save_flow_handler::<S, N>).get(list_flows_handler::<S, N>),
        )
        .route(
            "/api/v1/projects/:project_id/assignment-matrix",
            put(save_matrix_handler::<S, N>),
        )
        .with_state(service)
}

pub(crate) async fn create_job_handler<S, N>(
    State(service): State<SharedService<S, N>>,
    axum::Json(request): axum::Json<CreateJobRequest>,
) -> Response
where
    S: WorkflowStore + 'static,
    N: NotificationDispatcher + 'static,
{
    let today = Local::now().date_naive();
    match service.create_job(request, today) {
        Ok(update) => update_response(StatusCode::CREATED, update),
        Err(err) => AppError::from(err).into_response(),
    }
}

pub(crate) async fn job_handler<S, N>(
    State(service): State<SharedService<S, N>>,
    Path(job_id): Path<String>,
) -> Response
where
    S: WorkflowStore + 'static,
    N: NotificationDispatcher + 'static,
{
    match service.get(&JobId(job_id)) {
        Ok(job) => (StatusCode::OK, axum::Json(job.view())).into_response(),
        Err(err) => AppError::from(err).into_response(),
    }
}

pub(crate) async fn decision_handler<S, N>(
    State(service): State<SharedService<S, N>>,
    Path(job_id): Path<String>,
    axum::Json(request): axum::Json<DecisionRequest>,
) -> Response
where
    S: WorkflowStore + 'static,
    N: NotificationDispatcher + 'static,
{
    match service.record_decision(
        &JobId(job_id),
        &request.approver_id,
        request.level,
        request.decision,
    ) {
        Ok(update) => update_response(StatusCode::OK, update),
        Err(err) => AppError::from(err).into_response(),
    }
}

pub(crate) async fn assign_handler<S, N>(
    State(service): State<SharedService<S, N>>,
    Path(job_id): Path<String>,
    axum::Json(request): axum::Json<AssignRequest>,
) -> Response
where
    S: WorkflowStore + 'static,
    N: NotificationDispatcher + 'static,
{
    match service.assign_manually(&request.actor_id, &JobId(job_id), request.assignee_id) {
        Ok(update) => update_response(StatusCode::OK, update),
        Err(err) => AppError::from(err).into_response(),
    }
}

pub(crate) async fn resubmit_handler<S, N>(
    State(service): State<SharedService<S, N>>,
    Path(job_id): Path<String>,
    axum::Json(request): axum::Json<ActorRequest>,
) -> Response
where
    S: WorkflowStore + 'static,
    N: NotificationDispatcher + 'static,
{
    match service.resubmit(&request.actor_id, &JobId(job_id)) {
        Ok(update) => update_response(StatusCode::OK, update),
        Err(err) => AppError::from(err).into_response(),
    }
}

pub(crate) async fn withdraw_handler<S, N>(
    State(service): State<SharedService<S, N>>,
    Path(job_id): Path<String>,
    axum::Json(request): axum::Json<ActorRequest>,
) -> Response
where
    S: WorkflowStore + 'static,
    N: NotificationDispatcher + 'static,
{
    match service.withdraw(&request.actor_id, &JobId(job_id)) {
        Ok(job) => (StatusCode::OK, axum::Json(job.view())).into_response(),
        Err(err) => AppError::from(err).into_response(),
    }
}

pub(crate) async fn start_handler<S, N>(
    State(service): State<SharedService<S, N>>,
    Path(job_id): Path<String>,
    axum::Json(request): axum::Json<ActorRequest>,
) -> Response
where
    S: WorkflowStore + 'static,
    N: NotificationDispatcher + 'static,
{
    match service.start_work(&request.actor_id, &JobId(job_id)) {
        Ok(job) => (StatusCode::OK, axum::Json(job.view())).into_response(),
        Err(err) => AppError::from(err).into_response(),
    }
}

pub(crate) async fn complete_handler<S, N>(
    State(service): State<SharedService<S, N>>,
    Path(job_id): Path<String>,
    axum::Json(request): axum::Json<ActorRequest>,
) -> Response
where
    S: WorkflowStore + 'static,
    N: NotificationDispatcher + 'static,
{
    match service.complete(&request.actor_id, &JobId(job_id)) {
        Ok(job) => (StatusCode::OK, axum::Json(job.view())).into_response(),
        Err(err) => AppError::from(err).into_response(),
    }
}

pub(crate) async fn shift_log_handler<S, N>(
    State(service): State<SharedService<S, N>>,
    Path(job_id): Path<String>,
) -> Response
where
    S: WorkflowStore + 'static,
    N: NotificationDispatcher + 'static,
{
    match service.shift_log(&JobId(job_id)) {
        Ok(entries) => (StatusCode::OK, axum::Json(entries)).into_response(),
        Err(err) => AppError::from(err).into_response(),
    }
}

pub(crate) async fn save_flow_handler<S, N>(
    State(service): State<SharedService<S, N>>,
    Path(project_id): Path<String>,
    axum::Json(request): axum::Json<SaveFlowRequest>,
) -> Response
where
    S: WorkflowStore + 'static,
    N: NotificationDispatcher + 'static,
{
    let SaveFlowRequest { actor_id, mut flow } = request;
    flow.project_id = ProjectId(project_id);
    match service.save_flow(&actor_id, flow) {
        Ok(flow) => (StatusCode::OK, axum::Json(flow)).into_response(),
        Err(err) => AppError::from(err).into_response(),
    }
}

pub(crate) async fn list_flows_handler<S, N>(
    State(service): State<SharedService<S, N>>,
    Path(project_id): Path<String>,
) -> Response
where
    S: WorkflowStore + 'static,
    N: NotificationDispatcher + 'static,
{
    match service.flows(&ProjectId(project_id)) {
        Ok(flows) => (StatusCode::OK, axum::Json(flows)).into_response(),
        Err(err) => AppError::from(err).into_response(),
    }
}

pub(crate) async fn save_matrix_handler<S, N>(
    State(service): State<SharedService<S, N>>,
    Path(project_id): Path<String>,
    axum::Json(request): axum::Json<SaveMatrixRequest>,
) -> Response
where
    S: WorkflowStore + 'static,
    N: NotificationDispatcher + 'static,
{
    let project_id = ProjectId(project_id);
    let rows = request
        .rows
        .into_iter()
        .map(|row| JobTypeAssignment {
            project_id: project_id.clone(),
            job_type_id: row.job_type_id,
            assignee_id: row.assignee_id,
        })
        .collect();

    match service.save_assignment_matrix(&request.actor_id, &project_id, rows) {
        Ok(rows) => (StatusCode::OK, axum::Json(rows)).into_response(),
        Err(err) => AppError::from(err).into_response(),
    }
}

fn update_response(status: StatusCode, update: JobUpdate) -> Response {
    let payload = json!({
        "job": update.job.view(),
        "outcome": update.outcome,
        "assignment": update.assignment,
        "shift": update.shift,
    });
    (status, axum::Json(payload)).into_response()
}

pub(crate) fn error_status(err: &WorkflowError) -> StatusCode {
    match err {
        WorkflowError::Configuration(_)
        | WorkflowError::Routing(_)
        | WorkflowError::DueDateOutOfRange { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        WorkflowError::Forbidden { .. } | WorkflowError::Approval(ApprovalError::NotInPool { .. }) => {
            StatusCode::FORBIDDEN
        }
        WorkflowError::Approval(_)
        | WorkflowError::InvalidTransition { .. }
        | WorkflowError::Repository(RepositoryError::Conflict | RepositoryError::Stale) => {
            StatusCode::CONFLICT
        }
        WorkflowError::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
        WorkflowError::Repository(RepositoryError::Unavailable(_)) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
