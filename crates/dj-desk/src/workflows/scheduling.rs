//! Urgent-work cascade: pushes a worker's other deadlines out by a fixed number
//! of business days when an urgent job lands in their queue.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::calendar::HolidayCalendar;
use super::domain::{DueDateShift, Job, JobId, SlaShiftLog, UserId};
use super::repository::{
    JobRepository, NotificationDispatcher, NotificationEvent, NotificationEventType,
    RepositoryError,
};

/// Commits retried after the peer changed underneath the cascade.
const MAX_SHIFT_ATTEMPTS: usize = 3;

/// A peer job whose shift could not be persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShiftFailure {
    pub job_id: JobId,
    pub error: String,
}

/// What one cascade run did. Failed jobs can be fed back to
/// [`UrgentJobScheduler::retry_failed`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ShiftReport {
    pub shifted: Vec<SlaShiftLog>,
    pub failed: Vec<ShiftFailure>,
    /// Peers that left the queue before their commit or were already moved by this
    /// urgent job.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<JobId>,
    /// Set when the assignee's queue could not be loaded at all.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aborted: Option<String>,
}

impl ShiftReport {
    pub fn aborted(reason: impl Into<String>) -> Self {
        Self {
            aborted: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.aborted.is_none()
    }

    pub fn failed_ids(&self) -> BTreeSet<JobId> {
        self.failed.iter().map(|failure| failure.job_id.clone()).collect()
    }
}

pub struct UrgentJobScheduler<'a> {
    calendar: &'a HolidayCalendar,
    shift_days: u32,
}

impl<'a> UrgentJobScheduler<'a> {
    pub fn new(calendar: &'a HolidayCalendar, shift_days: u32) -> Self {
        Self {
            calendar,
            shift_days,
        }
    }

    /// Compute the move for one peer without touching storage. `None` when the new
    /// due date would fall past the last representable date.
    pub fn plan(&self, urgent: &Job, peer: &Job) -> Option<DueDateShift> {
        let new_due_date = self
            .calendar
            .add_working_days(peer.due_date, self.shift_days)?;
        Some(DueDateShift {
            job_id: peer.id.clone(),
            expected_version: peer.version,
            new_due_date,
            original_due_date: peer.original_due_date.unwrap_or(peer.due_date),
            shifted_by_job_id: urgent.id.clone(),
            log: SlaShiftLog {
                job_id: peer.id.clone(),
                urgent_job_id: urgent.id.clone(),
                original_due_date: peer.due_date,
                new_due_date,
                shift_days: self.shift_days,
            },
        })
    }

    /// Run the cascade for `urgent`. Does nothing unless the job is urgent and assigned.
    ///
    /// Each peer is committed on its own; a failed peer is logged and reported and the
    /// remaining peers are still processed. Only failing to load the queue is an error.
    /// Peers already moved by `urgent` are left alone, so running the cascade again
    /// only finishes what an earlier run missed.
    pub fn shift<R, N>(
        &self,
        urgent: &Job,
        jobs: &R,
        notifier: &N,
    ) -> Result<ShiftReport, RepositoryError>
    where
        R: JobRepository + ?Sized,
        N: NotificationDispatcher + ?Sized,
    {
        self.run(urgent, jobs, notifier, None)
    }

    /// Re-run the cascade for the listed peers only.
    pub fn retry_failed<R, N>(
        &self,
        urgent: &Job,
        failed: &BTreeSet<JobId>,
        jobs: &R,
        notifier: &N,
    ) -> Result<ShiftReport, RepositoryError>
    where
        R: JobRepository + ?Sized,
        N: NotificationDispatcher + ?Sized,
    {
        self.run(urgent, jobs, notifier, Some(failed))
    }

    fn run<R, N>(
        &self,
        urgent: &Job,
        jobs: &R,
        notifier: &N,
        only: Option<&BTreeSet<JobId>>,
    ) -> Result<ShiftReport, RepositoryError>
    where
        R: JobRepository + ?Sized,
        N: NotificationDispatcher + ?Sized,
    {
        let mut report = ShiftReport::default();
        let assignee_id = match (&urgent.assignee_id, urgent.is_urgent()) {
            (Some(assignee_id), true) => assignee_id,
            _ => return Ok(report),
        };

        let peers: Vec<Job> = jobs
            .load_active_jobs(assignee_id, &urgent.id)?
            .into_iter()
            .filter(|peer| peer.id != urgent.id && peer.status.is_active())
            .filter(|peer| only.map_or(true, |ids| ids.contains(&peer.id)))
            .collect();

        debug!(
            urgent_job = %urgent.id,
            assignee = %assignee_id,
            peers = peers.len(),
            "starting urgent shift cascade"
        );

        for peer in peers {
            let peer_id = peer.id.clone();
            match self.shift_peer(urgent, assignee_id, peer, jobs) {
                Ok(Some(log)) => {
                    let event = NotificationEvent::new(
                        NotificationEventType::DeadlineApproaching,
                        peer_id.clone(),
                    )
                    .with("urgent_job_id", &urgent.id)
                    .with("shift_days", self.shift_days)
                    .with("previous_due_date", log.original_due_date)
                    .with("new_due_date", log.new_due_date);
                    if let Err(err) = notifier.notify(event) {
                        warn!(job = %peer_id, error = %err, "deadline notification not delivered");
                    }
                    report.shifted.push(log);
                }
                Ok(None) => {
                    debug!(job = %peer_id, urgent_job = %urgent.id, "peer skipped");
                    report.skipped.push(peer_id);
                }
                Err(err) => {
                    warn!(
                        job = %peer_id,
                        urgent_job = %urgent.id,
                        error = %err,
                        "failed to shift due date; continuing with remaining jobs"
                    );
                    report.failed.push(ShiftFailure {
                        job_id: peer_id,
                        error: err.to_string(),
                    });
                }
            }
        }

        if !report.shifted.is_empty() {
            let event = NotificationEvent::new(NotificationEventType::UrgentImpact, urgent.id.clone())
                .with("assignee_id", assignee_id)
                .with("shifted_jobs", report.shifted.len())
                .with("shift_days", self.shift_days);
            if let Err(err) = notifier.notify(event) {
                warn!(job = %urgent.id, error = %err, "urgent impact notification not delivered");
            }
        }

        info!(
            urgent_job = %urgent.id,
            shifted = report.shifted.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            "urgent shift cascade finished"
        );

        Ok(report)
    }

    /// Move one peer, planning again from a fresh read whenever the commit finds the
    /// job changed. `None` when the peer no longer belongs in the cascade.
    fn shift_peer<R>(
        &self,
        urgent: &Job,
        assignee_id: &UserId,
        mut peer: Job,
        jobs: &R,
    ) -> Result<Option<SlaShiftLog>, ShiftError>
    where
        R: JobRepository + ?Sized,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let queued = peer.status.is_active() && peer.assignee_id.as_ref() == Some(assignee_id);
            if !queued || already_shifted_by(jobs, &peer.id, &urgent.id)? {
                return Ok(None);
            }

            let shift = self.plan(urgent, &peer).ok_or(ShiftError::OutOfRange {
                due_date: peer.due_date,
                shift_days: self.shift_days,
            })?;
            match jobs.commit_shift(&shift) {
                Ok(()) => return Ok(Some(shift.log)),
                Err(RepositoryError::Stale) if attempt < MAX_SHIFT_ATTEMPTS => {
                    debug!(job = %peer.id, attempt, "peer changed since the queue was read; planning again");
                    peer = jobs.fetch_job(&peer.id)?.ok_or(RepositoryError::NotFound)?;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

fn already_shifted_by<R>(jobs: &R, job_id: &JobId, urgent_job_id: &JobId) -> Result<bool, RepositoryError>
where
    R: JobRepository + ?Sized,
{
    Ok(jobs
        .shift_log(job_id)?
        .iter()
        .any(|entry| &entry.urgent_job_id == urgent_job_id))
}

#[derive(Debug, thiserror::Error)]
enum ShiftError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("due date {due_date} cannot move {shift_days} working days")]
    OutOfRange { due_date: NaiveDate, shift_days: u32 },
}
