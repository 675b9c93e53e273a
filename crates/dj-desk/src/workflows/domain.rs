use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::approval::ApprovalProgress;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// Identifier of a design job ("DJ").
    JobId
);
string_id!(ProjectId);
string_id!(JobTypeId);
string_id!(
    /// Requesters, approvers, workers, and managers all share one identity space.
    UserId
);
string_id!(DepartmentId);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    #[default]
    Normal,
    Urgent,
}

/// Lifecycle of a design job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobStatus {
    Draft,
    PendingApproval { level: u32 },
    Approved,
    Assigned,
    InProgress,
    Completed,
    Rejected,
    Rework,
}

impl JobStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Draft => "Draft",
            Self::PendingApproval { .. } => "Pending Approval",
            Self::Approved => "Approved",
            Self::Assigned => "Assigned",
            Self::InProgress => "In Progress",
            Self::Completed => "Completed",
            Self::Rejected => "Rejected",
            Self::Rework => "Rework",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Rejected)
    }

    /// Statuses whose due dates move when urgent work lands on the same worker.
    pub const fn is_active(self) -> bool {
        matches!(
            self,
            Self::PendingApproval { .. }
                | Self::Approved
                | Self::Assigned
                | Self::InProgress
                | Self::Rework
        )
    }

    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;

        match (self, next) {
            (Draft, PendingApproval { level }) => level == 1,
            (Draft, Assigned) => true,
            (PendingApproval { level }, PendingApproval { level: next_level }) => {
                next_level == level + 1
            }
            (PendingApproval { .. }, Approved | Rework | Rejected) => true,
            (Approved, Assigned) => true,
            (Assigned, InProgress) => true,
            (InProgress, Completed) => true,
            (Rework, PendingApproval { level }) => level == 1,
            (Rework, Assigned | Rejected) => true,
            _ => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::PendingApproval { level } => write!(f, "Pending Approval (level {level})"),
            other => f.write_str(other.label()),
        }
    }
}

/// A design job as held by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub project_id: ProjectId,
    pub job_type_id: JobTypeId,
    pub title: String,
    pub requester_id: UserId,
    pub priority: Priority,
    pub status: JobStatus,
    pub created_on: NaiveDate,
    pub due_date: NaiveDate,
    /// First-ever due date, captured on the first urgent shift only.
    pub original_due_date: Option<NaiveDate>,
    pub shifted_by_job_id: Option<JobId>,
    pub assignee_id: Option<UserId>,
    pub approval: Option<ApprovalProgress>,
    /// Compare-and-set token bumped on every write.
    pub version: u64,
}

impl Job {
    pub fn is_urgent(&self) -> bool {
        self.priority == Priority::Urgent
    }

    pub fn view(&self) -> JobView {
        JobView {
            id: self.id.clone(),
            project_id: self.project_id.clone(),
            job_type_id: self.job_type_id.clone(),
            title: self.title.clone(),
            priority: self.priority,
            status: self.status,
            status_label: self.status.to_string(),
            due_date: self.due_date,
            original_due_date: self.original_due_date,
            shifted_by_job_id: self.shifted_by_job_id.clone(),
            assignee_id: self.assignee_id.clone(),
            current_level: match self.status {
                JobStatus::PendingApproval { level } => Some(level),
                _ => None,
            },
        }
    }
}

/// Outward representation of a job for API responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobView {
    pub id: JobId,
    pub project_id: ProjectId,
    pub job_type_id: JobTypeId,
    pub title: String,
    pub priority: Priority,
    pub status: JobStatus,
    pub status_label: String,
    pub due_date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_due_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shifted_by_job_id: Option<JobId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_level: Option<u32>,
}

/// Immutable audit row appended once per shifted job per urgent event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlaShiftLog {
    pub job_id: JobId,
    pub urgent_job_id: JobId,
    pub original_due_date: NaiveDate,
    pub new_due_date: NaiveDate,
    pub shift_days: u32,
}

/// One job's due-date move together with the audit row recording it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueDateShift {
    pub job_id: JobId,
    /// Version of the job the move was planned from; the commit is refused once it moved.
    pub expected_version: u64,
    pub new_due_date: NaiveDate,
    /// Value to store in `original_due_date` after the write.
    pub original_due_date: NaiveDate,
    pub shifted_by_job_id: JobId,
    pub log: SlaShiftLog,
}
