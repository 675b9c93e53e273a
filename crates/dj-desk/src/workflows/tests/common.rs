use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{header, Request};
use axum::response::Response;
use chrono::NaiveDate;
use serde_json::Value;

use crate::config::SchedulingConfig;
use crate::workflows::approval::{
    ApprovalFlow, ApprovalFlowEngine, ApprovalLogic, Decision, JobTypeAssignment,
};
use crate::workflows::calendar::Holiday;
use crate::workflows::capability::{CapabilityEvaluator, Principal, Role};
use crate::workflows::domain::{
    DepartmentId, DueDateShift, Job, JobId, JobStatus, JobTypeId, Priority, ProjectId,
    SlaShiftLog, UserId,
};
use crate::workflows::memory::{InMemoryNotifications, InMemoryWorkflowStore};
use crate::workflows::repository::{
    ApprovalFlowRepository, AssignmentMatrixRepository, HolidayRepository, JobRepository,
    NotificationDispatcher, NotificationEvent, NotifyError, OrganizationDirectory,
    RepositoryError, WorkflowStore,
};
use crate::workflows::service::{CreateJobRequest, DesignJobService};

pub(super) type MemoryService = DesignJobService<InMemoryWorkflowStore, InMemoryNotifications>;

pub(super) fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

pub(super) fn user(id: &str) -> UserId {
    UserId::new(id)
}

pub(super) fn project() -> ProjectId {
    ProjectId::new("packaging")
}

pub(super) fn scheduling() -> SchedulingConfig {
    SchedulingConfig {
        urgent_shift_days: 2,
        default_sla_days: 3,
    }
}

pub(super) fn matrix_row(job_type: &str, assignee: &str) -> JobTypeAssignment {
    JobTypeAssignment {
        project_id: project(),
        job_type_id: JobTypeId::new(job_type),
        assignee_id: user(assignee),
    }
}

/// Level 1 is ANY of li/sam, level 2 is ALL of kai/noor.
pub(super) fn two_level_flow() -> ApprovalFlow {
    let mut flow = ApprovalFlow::leveled(project()).activated();
    flow.add_level(ApprovalLogic::Any, [user("li"), user("sam")]);
    flow.add_level(ApprovalLogic::All, [user("kai"), user("noor")]);
    flow
}

pub(super) fn seed_organization(store: &InMemoryWorkflowStore) {
    store
        .register_department(project(), DepartmentId::new("creative"), Some(user("mia")))
        .expect("department registered");
    store
        .grant_role(user("ada"), Role::Admin)
        .expect("admin granted");
}

/// Matrix row plus skip flow for `resize`; two-level default flow routed to team lead `tl`.
pub(super) fn seed_flows<S, N>(service: &DesignJobService<S, N>)
where
    S: WorkflowStore + 'static,
    N: NotificationDispatcher + 'static,
{
    service
        .save_assignment_matrix(&user("ada"), &project(), vec![matrix_row("resize", "wes")])
        .expect("matrix saved");
    service
        .save_flow(
            &user("ada"),
            ApprovalFlow::skip(project(), JobTypeId::new("resize")).activated(),
        )
        .expect("skip flow saved");
    service
        .save_flow(
            &user("ada"),
            two_level_flow().with_team_lead(Some(user("tl"))),
        )
        .expect("default flow saved");
}

pub(super) fn build_service() -> (
    MemoryService,
    Arc<InMemoryWorkflowStore>,
    Arc<InMemoryNotifications>,
) {
    let store = Arc::new(InMemoryWorkflowStore::default());
    let notifications = Arc::new(InMemoryNotifications::default());
    seed_organization(&store);
    let service = DesignJobService::new(store.clone(), notifications.clone(), scheduling());
    seed_flows(&service);
    (service, store, notifications)
}

/// Submitted on Friday 2025-01-03, so the default due date is Wednesday 2025-01-08.
pub(super) fn job_request(job_type: &str, priority: Priority) -> CreateJobRequest {
    CreateJobRequest {
        project_id: project(),
        job_type_id: JobTypeId::new(job_type),
        title: format!("{job_type} artwork"),
        requester_id: user("rae"),
        priority,
        due_date: None,
        submitted_on: Some(date(2025, 1, 3)),
    }
}

pub(super) fn stored_job(id: &str, assignee: Option<&str>, due: NaiveDate, status: JobStatus) -> Job {
    Job {
        id: JobId::new(id),
        project_id: project(),
        job_type_id: JobTypeId::new("banner"),
        title: format!("Job {id}"),
        requester_id: user("rae"),
        priority: Priority::Normal,
        status,
        created_on: date(2025, 1, 2),
        due_date: due,
        original_due_date: None,
        shifted_by_job_id: None,
        assignee_id: assignee.map(UserId::new),
        approval: None,
        version: 0,
    }
}

pub(super) fn urgent_job(id: &str, assignee: &str, due: NaiveDate) -> Job {
    Job {
        priority: Priority::Urgent,
        ..stored_job(id, Some(assignee), due, JobStatus::Assigned)
    }
}

pub(super) fn event_types(notifications: &InMemoryNotifications) -> Vec<String> {
    notifications
        .events()
        .into_iter()
        .map(|event| event.event_type.to_string())
        .collect()
}

type UpdateHook = Box<dyn FnOnce(&InMemoryWorkflowStore) + Send>;

/// Memory store that can fail individual shift commits or holiday reads, lose the
/// acknowledgement of a landed commit, and inject a competing write right before
/// the next job update or shift commit.
#[derive(Default, Clone)]
pub(super) struct FlakyStore {
    pub(super) inner: InMemoryWorkflowStore,
    failing: Arc<Mutex<BTreeSet<JobId>>>,
    lost_acks: Arc<Mutex<BTreeSet<JobId>>>,
    holidays_down: Arc<Mutex<bool>>,
    before_update: Arc<Mutex<Option<UpdateHook>>>,
    before_shift: Arc<Mutex<Option<UpdateHook>>>,
}

impl FlakyStore {
    pub(super) fn fail_shifts_for(&self, ids: &[&str]) {
        let mut failing = self.failing.lock().expect("failing set poisoned");
        failing.extend(ids.iter().map(|id| JobId::new(*id)));
    }

    /// Commit the shift but report a failure, as a timed-out write that landed would.
    pub(super) fn lose_shift_acks_for(&self, ids: &[&str]) {
        let mut lost = self.lost_acks.lock().expect("ack set poisoned");
        lost.extend(ids.iter().map(|id| JobId::new(*id)));
    }

    pub(super) fn fail_holidays(&self) {
        *self.holidays_down.lock().expect("holiday flag poisoned") = true;
    }

    pub(super) fn heal(&self) {
        self.failing.lock().expect("failing set poisoned").clear();
        self.lost_acks.lock().expect("ack set poisoned").clear();
        *self.holidays_down.lock().expect("holiday flag poisoned") = false;
    }

    pub(super) fn race_next_update<F>(&self, hook: F)
    where
        F: FnOnce(&InMemoryWorkflowStore) + Send + 'static,
    {
        *self.before_update.lock().expect("hook poisoned") = Some(Box::new(hook));
    }

    pub(super) fn race_next_shift<F>(&self, hook: F)
    where
        F: FnOnce(&InMemoryWorkflowStore) + Send + 'static,
    {
        *self.before_shift.lock().expect("hook poisoned") = Some(Box::new(hook));
    }
}

impl ApprovalFlowRepository for FlakyStore {
    fn load_approval_flows(
        &self,
        project_id: Option<&ProjectId>,
    ) -> Result<Vec<ApprovalFlow>, RepositoryError> {
        self.inner.load_approval_flows(project_id)
    }

    fn save_approval_flow(&self, flow: ApprovalFlow) -> Result<(), RepositoryError> {
        self.inner.save_approval_flow(flow)
    }
}

impl AssignmentMatrixRepository for FlakyStore {
    fn load_assignment_matrix(
        &self,
        project_id: &ProjectId,
    ) -> Result<Vec<JobTypeAssignment>, RepositoryError> {
        self.inner.load_assignment_matrix(project_id)
    }

    fn save_assignment_matrix(
        &self,
        project_id: &ProjectId,
        rows: Vec<JobTypeAssignment>,
    ) -> Result<(), RepositoryError> {
        self.inner.save_assignment_matrix(project_id, rows)
    }
}

impl HolidayRepository for FlakyStore {
    fn load_holidays(&self) -> Result<Vec<Holiday>, RepositoryError> {
        if *self.holidays_down.lock().expect("holiday flag poisoned") {
            return Err(RepositoryError::Unavailable("holiday table offline".to_string()));
        }
        self.inner.load_holidays()
    }
}

impl JobRepository for FlakyStore {
    fn insert_job(&self, job: Job) -> Result<Job, RepositoryError> {
        self.inner.insert_job(job)
    }

    fn fetch_job(&self, id: &JobId) -> Result<Option<Job>, RepositoryError> {
        self.inner.fetch_job(id)
    }

    fn update_job(&self, job: Job) -> Result<Job, RepositoryError> {
        let hook = self.before_update.lock().expect("hook poisoned").take();
        if let Some(hook) = hook {
            hook(&self.inner);
        }
        self.inner.update_job(job)
    }

    fn load_active_jobs(
        &self,
        assignee_id: &UserId,
        exclude: &JobId,
    ) -> Result<Vec<Job>, RepositoryError> {
        self.inner.load_active_jobs(assignee_id, exclude)
    }

    fn update_job_due_date(
        &self,
        job_id: &JobId,
        new_due_date: NaiveDate,
        original_due_date: NaiveDate,
        shifted_by_job_id: &JobId,
    ) -> Result<(), RepositoryError> {
        self.inner
            .update_job_due_date(job_id, new_due_date, original_due_date, shifted_by_job_id)
    }

    fn append_shift_log(&self, entry: SlaShiftLog) -> Result<(), RepositoryError> {
        self.inner.append_shift_log(entry)
    }

    fn shift_log(&self, job_id: &JobId) -> Result<Vec<SlaShiftLog>, RepositoryError> {
        self.inner.shift_log(job_id)
    }

    fn commit_shift(&self, shift: &DueDateShift) -> Result<(), RepositoryError> {
        if self
            .failing
            .lock()
            .expect("failing set poisoned")
            .contains(&shift.job_id)
        {
            return Err(RepositoryError::Unavailable("write timed out".to_string()));
        }
        let hook = self.before_shift.lock().expect("hook poisoned").take();
        if let Some(hook) = hook {
            hook(&self.inner);
        }
        self.inner.commit_shift(shift)?;
        if self
            .lost_acks
            .lock()
            .expect("ack set poisoned")
            .contains(&shift.job_id)
        {
            return Err(RepositoryError::Unavailable("acknowledgement lost".to_string()));
        }
        Ok(())
    }
}

impl OrganizationDirectory for FlakyStore {
    fn department_for_project(
        &self,
        project_id: &ProjectId,
    ) -> Result<Option<DepartmentId>, RepositoryError> {
        self.inner.department_for_project(project_id)
    }

    fn department_manager(
        &self,
        department_id: &DepartmentId,
    ) -> Result<Option<UserId>, RepositoryError> {
        self.inner.department_manager(department_id)
    }

    fn roles_for(&self, user_id: &UserId) -> Result<Vec<Role>, RepositoryError> {
        self.inner.roles_for(user_id)
    }
}

/// Records the approver's decision straight into the store, as a concurrent request would.
pub(super) fn competing_decision(
    store: &InMemoryWorkflowStore,
    job_id: &JobId,
    approver: &str,
    level: u32,
) {
    let engine = ApprovalFlowEngine::new(CapabilityEvaluator);
    let mut job = store
        .fetch_job(job_id)
        .expect("fetch")
        .expect("job exists");
    let principal = Principal::new(user(approver), Vec::new());
    engine
        .record_decision(&mut job, level, &principal, Decision::Approve)
        .expect("competing decision");
    store.update_job(job).expect("competing write");
}

#[derive(Default)]
pub(super) struct FailingNotifier;

impl NotificationDispatcher for FailingNotifier {
    fn notify(&self, _event: NotificationEvent) -> Result<(), NotifyError> {
        Err(NotifyError::Transport("smtp relay offline".to_string()))
    }
}

pub(super) fn json_request(method: &str, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(body).expect("json body")))
        .expect("request")
}

pub(super) fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
