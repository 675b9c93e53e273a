//! Design job approval, assignment, and deadline scheduling.

pub mod approval;
pub mod assignment;
pub mod calendar;
pub mod capability;
pub mod domain;
pub mod memory;
pub mod repository;
pub mod router;
pub mod scheduling;
pub mod service;

#[cfg(test)]
mod tests;

pub use approval::{
    ApprovalError, ApprovalFlow, ApprovalFlowEngine, ApprovalLevel, ApprovalLogic,
    ConfigurationError, Decision, JobTypeAssignment, LevelOutcome, RoutingError,
};
pub use assignment::{Assignment, AssignmentSource, AutoAssignmentResolver};
pub use calendar::{Holiday, HolidayCalendar, HolidayKind};
pub use domain::{
    DepartmentId, Job, JobId, JobStatus, JobTypeId, JobView, Priority, ProjectId, SlaShiftLog,
    UserId,
};
pub use memory::{InMemoryNotifications, InMemoryWorkflowStore};
pub use repository::{
    NotificationDispatcher, NotificationEvent, NotificationEventType, RepositoryError,
    WorkflowStore,
};
pub use router::workflow_router;
pub use scheduling::{ShiftReport, UrgentJobScheduler};
pub use service::{CreateJobRequest, DesignJobService, JobUpdate, WorkflowError};
