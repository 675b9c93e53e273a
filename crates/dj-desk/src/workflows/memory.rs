//! Mutex-backed store and notification sink for demos and tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::NaiveDate;

use super::approval::{ApprovalFlow, JobTypeAssignment};
use super::calendar::Holiday;
use super::capability::Role;
use super::domain::{DepartmentId, DueDateShift, Job, JobId, ProjectId, SlaShiftLog, UserId};
use super::repository::{
    ApprovalFlowRepository, AssignmentMatrixRepository, HolidayRepository, JobRepository,
    NotificationDispatcher, NotificationEvent, NotifyError, OrganizationDirectory,
    RepositoryError,
};

#[derive(Debug, Default)]
struct StoreState {
    flows: Vec<ApprovalFlow>,
    matrix: HashMap<ProjectId, Vec<JobTypeAssignment>>,
    holidays: Vec<Holiday>,
    jobs: HashMap<JobId, Job>,
    shift_log: Vec<SlaShiftLog>,
    project_departments: HashMap<ProjectId, DepartmentId>,
    department_managers: HashMap<DepartmentId, UserId>,
    roles: HashMap<UserId, Vec<Role>>,
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryWorkflowStore {
    state: Arc<Mutex<StoreState>>,
}

impl InMemoryWorkflowStore {
    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, RepositoryError> {
        self.state
            .lock()
            .map_err(|_| RepositoryError::Unavailable("store mutex poisoned".to_string()))
    }

    /// Attach a project to a department with an optional manager.
    pub fn register_department(
        &self,
        project_id: ProjectId,
        department_id: DepartmentId,
        manager_id: Option<UserId>,
    ) -> Result<(), RepositoryError> {
        let mut state = self.lock()?;
        if let Some(manager_id) = manager_id {
            state
                .roles
                .entry(manager_id.clone())
                .or_default()
                .push(Role::DepartmentManager(department_id.clone()));
            state
                .department_managers
                .insert(department_id.clone(), manager_id);
        }
        state.project_departments.insert(project_id, department_id);
        Ok(())
    }

    pub fn grant_role(&self, user_id: UserId, role: Role) -> Result<(), RepositoryError> {
        self.lock()?.roles.entry(user_id).or_default().push(role);
        Ok(())
    }

    pub fn add_holiday(&self, holiday: Holiday) -> Result<(), RepositoryError> {
        self.lock()?.holidays.push(holiday);
        Ok(())
    }

    fn write_due_date(
        state: &mut StoreState,
        job_id: &JobId,
        new_due_date: NaiveDate,
        original_due_date: NaiveDate,
        shifted_by_job_id: &JobId,
    ) -> Result<(), RepositoryError> {
        let job = state.jobs.get_mut(job_id).ok_or(RepositoryError::NotFound)?;
        job.due_date = new_due_date;
        if job.original_due_date.is_none() {
            job.original_due_date = Some(original_due_date);
        }
        job.shifted_by_job_id = Some(shifted_by_job_id.clone());
        job.version += 1;
        Ok(())
    }
}

impl ApprovalFlowRepository for InMemoryWorkflowStore {
    fn load_approval_flows(
        &self,
        project_id: Option<&ProjectId>,
    ) -> Result<Vec<ApprovalFlow>, RepositoryError> {
        let state = self.lock()?;
        Ok(state
            .flows
            .iter()
            .filter(|flow| project_id.map_or(true, |project| &flow.project_id == project))
            .cloned()
            .collect())
    }

    fn save_approval_flow(&self, flow: ApprovalFlow) -> Result<(), RepositoryError> {
        let mut state = self.lock()?;
        match state.flows.iter_mut().find(|existing| {
            existing.project_id == flow.project_id && existing.job_type_id == flow.job_type_id
        }) {
            Some(existing) => *existing = flow,
            None => state.flows.push(flow),
        }
        Ok(())
    }
}

impl AssignmentMatrixRepository for InMemoryWorkflowStore {
    fn load_assignment_matrix(
        &self,
        project_id: &ProjectId,
    ) -> Result<Vec<JobTypeAssignment>, RepositoryError> {
        Ok(self
            .lock()?
            .matrix
            .get(project_id)
            .cloned()
            .unwrap_or_default())
    }

    fn save_assignment_matrix(
        &self,
        project_id: &ProjectId,
        rows: Vec<JobTypeAssignment>,
    ) -> Result<(), RepositoryError> {
        self.lock()?.matrix.insert(project_id.clone(), rows);
        Ok(())
    }
}

impl HolidayRepository for InMemoryWorkflowStore {
    fn load_holidays(&self) -> Result<Vec<Holiday>, RepositoryError> {
        Ok(self.lock()?.holidays.clone())
    }
}

impl JobRepository for InMemoryWorkflowStore {
    fn insert_job(&self, job: Job) -> Result<Job, RepositoryError> {
        let mut state = self.lock()?;
        if state.jobs.contains_key(&job.id) {
            return Err(RepositoryError::Conflict);
        }
        state.jobs.insert(job.id.clone(), job.clone());
        Ok(job)
    }

    fn fetch_job(&self, id: &JobId) -> Result<Option<Job>, RepositoryError> {
        Ok(self.lock()?.jobs.get(id).cloned())
    }

    fn update_job(&self, mut job: Job) -> Result<Job, RepositoryError> {
        let mut state = self.lock()?;
        let stored = state.jobs.get_mut(&job.id).ok_or(RepositoryError::NotFound)?;
        if stored.version != job.version {
            return Err(RepositoryError::Stale);
        }
        job.version += 1;
        *stored = job.clone();
        Ok(job)
    }

    fn load_active_jobs(
        &self,
        assignee_id: &UserId,
        exclude: &JobId,
    ) -> Result<Vec<Job>, RepositoryError> {
        let state = self.lock()?;
        let mut jobs: Vec<Job> = state
            .jobs
            .values()
            .filter(|job| {
                job.assignee_id.as_ref() == Some(assignee_id)
                    && &job.id != exclude
                    && job.status.is_active()
            })
            .cloned()
            .collect();
        jobs.sort_by(|a, b| a.due_date.cmp(&b.due_date).then_with(|| a.id.cmp(&b.id)));
        Ok(jobs)
    }

    fn update_job_due_date(
        &self,
        job_id: &JobId,
        new_due_date: NaiveDate,
        original_due_date: NaiveDate,
        shifted_by_job_id: &JobId,
    ) -> Result<(), RepositoryError> {
        let mut state = self.lock()?;
        Self::write_due_date(
            &mut state,
            job_id,
            new_due_date,
            original_due_date,
            shifted_by_job_id,
        )
    }

    fn append_shift_log(&self, entry: SlaShiftLog) -> Result<(), RepositoryError> {
        self.lock()?.shift_log.push(entry);
        Ok(())
    }

    fn shift_log(&self, job_id: &JobId) -> Result<Vec<SlaShiftLog>, RepositoryError> {
        Ok(self
            .lock()?
            .shift_log
            .iter()
            .filter(|entry| &entry.job_id == job_id)
            .cloned()
            .collect())
    }

    fn commit_shift(&self, shift: &DueDateShift) -> Result<(), RepositoryError> {
        let mut state = self.lock()?;
        let stored = state.jobs.get(&shift.job_id).ok_or(RepositoryError::NotFound)?;
        if stored.version != shift.expected_version || !stored.status.is_active() {
            return Err(RepositoryError::Stale);
        }
        Self::write_due_date(
            &mut state,
            &shift.job_id,
            shift.new_due_date,
            shift.original_due_date,
            &shift.shifted_by_job_id,
        )?;
        state.shift_log.push(shift.log.clone());
        Ok(())
    }
}

impl OrganizationDirectory for InMemoryWorkflowStore {
    fn department_for_project(
        &self,
        project_id: &ProjectId,
    ) -> Result<Option<DepartmentId>, RepositoryError> {
        Ok(self.lock()?.project_departments.get(project_id).cloned())
    }

    fn department_manager(
        &self,
        department_id: &DepartmentId,
    ) -> Result<Option<UserId>, RepositoryError> {
        Ok(self.lock()?.department_managers.get(department_id).cloned())
    }

    fn roles_for(&self, user_id: &UserId) -> Result<Vec<Role>, RepositoryError> {
        Ok(self.lock()?.roles.get(user_id).cloned().unwrap_or_default())
    }
}

/// Notification sink that keeps every event it receives.
#[derive(Debug, Default, Clone)]
pub struct InMemoryNotifications {
    events: Arc<Mutex<Vec<NotificationEvent>>>,
}

impl InMemoryNotifications {
    pub fn events(&self) -> Vec<NotificationEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl NotificationDispatcher for InMemoryNotifications {
    fn notify(&self, event: NotificationEvent) -> Result<(), NotifyError> {
        self.events
            .lock()
            .map_err(|_| NotifyError::Transport("event buffer poisoned".to_string()))?
            .push(event);
        Ok(())
    }
}
