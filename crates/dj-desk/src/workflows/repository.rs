use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::approval::{ApprovalFlow, JobTypeAssignment};
use super::calendar::Holiday;
use super::capability::Role;
use super::domain::{DepartmentId, DueDateShift, Job, JobId, ProjectId, SlaShiftLog, UserId};

/// Storage for approval flow configuration.
pub trait ApprovalFlowRepository: Send + Sync {
    /// All flows, or only those of one project.
    fn load_approval_flows(
        &self,
        project_id: Option<&ProjectId>,
    ) -> Result<Vec<ApprovalFlow>, RepositoryError>;
    /// Upsert keyed by (project, job type).
    fn save_approval_flow(&self, flow: ApprovalFlow) -> Result<(), RepositoryError>;
}

pub trait AssignmentMatrixRepository: Send + Sync {
    fn load_assignment_matrix(
        &self,
        project_id: &ProjectId,
    ) -> Result<Vec<JobTypeAssignment>, RepositoryError>;
    /// Replace every row of the project's matrix.
    fn save_assignment_matrix(
        &self,
        project_id: &ProjectId,
        rows: Vec<JobTypeAssignment>,
    ) -> Result<(), RepositoryError>;
}

pub trait HolidayRepository: Send + Sync {
    fn load_holidays(&self) -> Result<Vec<Holiday>, RepositoryError>;
}

pub trait JobRepository: Send + Sync {
    fn insert_job(&self, job: Job) -> Result<Job, RepositoryError>;
    fn fetch_job(&self, id: &JobId) -> Result<Option<Job>, RepositoryError>;
    /// Compare-and-set write: fails with [`RepositoryError::Stale`] unless the stored
    /// version equals `job.version`. Returns the job with its bumped version.
    fn update_job(&self, job: Job) -> Result<Job, RepositoryError>;
    /// Jobs held by `assignee_id` other than `exclude`, in any non-terminal status.
    fn load_active_jobs(
        &self,
        assignee_id: &UserId,
        exclude: &JobId,
    ) -> Result<Vec<Job>, RepositoryError>;
    fn update_job_due_date(
        &self,
        job_id: &JobId,
        new_due_date: NaiveDate,
        original_due_date: NaiveDate,
        shifted_by_job_id: &JobId,
    ) -> Result<(), RepositoryError>;
    /// Audit rows are append-only.
    fn append_shift_log(&self, entry: SlaShiftLog) -> Result<(), RepositoryError>;
    fn shift_log(&self, job_id: &JobId) -> Result<Vec<SlaShiftLog>, RepositoryError>;

    /// Persist one job's due-date move and its audit row as a unit.
    ///
    /// Fails with [`RepositoryError::Stale`] when the job's version is no longer
    /// `shift.expected_version` or the job left the active set. This default checks
    /// then writes; stores with transactions should override it so the check and
    /// both writes commit together.
    fn commit_shift(&self, shift: &DueDateShift) -> Result<(), RepositoryError> {
        let stored = self.fetch_job(&shift.job_id)?.ok_or(RepositoryError::NotFound)?;
        if stored.version != shift.expected_version || !stored.status.is_active() {
            return Err(RepositoryError::Stale);
        }
        self.update_job_due_date(
            &shift.job_id,
            shift.new_due_date,
            shift.original_due_date,
            &shift.shifted_by_job_id,
        )?;
        self.append_shift_log(shift.log.clone())
    }
}

/// Organisation lookups used for manager fallback and capability checks.
pub trait OrganizationDirectory: Send + Sync {
    fn department_for_project(
        &self,
        project_id: &ProjectId,
    ) -> Result<Option<DepartmentId>, RepositoryError>;
    fn department_manager(
        &self,
        department_id: &DepartmentId,
    ) -> Result<Option<UserId>, RepositoryError>;
    fn roles_for(&self, user_id: &UserId) -> Result<Vec<Role>, RepositoryError>;
}

/// Everything the job service reads and writes.
pub trait WorkflowStore:
    ApprovalFlowRepository
    + AssignmentMatrixRepository
    + HolidayRepository
    + JobRepository
    + OrganizationDirectory
{
}

impl<T> WorkflowStore for T where
    T: ApprovalFlowRepository
        + AssignmentMatrixRepository
        + HolidayRepository
        + JobRepository
        + OrganizationDirectory
{
}

/// Error enumeration for store failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("record changed since it was read")]
    Stale,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationEventType {
    JobCreated,
    JobApproved,
    JobRejected,
    JobAssigned,
    JobCompleted,
    DeadlineApproaching,
    UrgentImpact,
}

impl NotificationEventType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::JobCreated => "job_created",
            Self::JobApproved => "job_approved",
            Self::JobRejected => "job_rejected",
            Self::JobAssigned => "job_assigned",
            Self::JobCompleted => "job_completed",
            Self::DeadlineApproaching => "deadline_approaching",
            Self::UrgentImpact => "urgent_impact",
        }
    }
}

impl fmt::Display for NotificationEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Milestone handed to the downstream notification sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub event_type: NotificationEventType,
    pub job_id: JobId,
    pub metadata: BTreeMap<String, String>,
}

impl NotificationEvent {
    pub fn new(event_type: NotificationEventType, job_id: JobId) -> Self {
        Self {
            event_type,
            job_id,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl ToString) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }
}

/// Outbound hook for e-mail, chat, or in-app delivery.
pub trait NotificationDispatcher: Send + Sync {
    fn notify(&self, event: NotificationEvent) -> Result<(), NotifyError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotifyError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}
