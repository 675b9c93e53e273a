use chrono::NaiveDate;
use dj_desk::workflows::capability::Role;
use dj_desk::workflows::{
    Holiday, HolidayKind, InMemoryWorkflowStore, NotificationDispatcher, NotificationEvent,
    RepositoryError, UserId,
};
use dj_desk::workflows::repository::NotifyError;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Delivers notifications to the log until a real transport is wired in.
#[derive(Debug, Default, Clone)]
pub(crate) struct LoggingNotificationDispatcher;

impl NotificationDispatcher for LoggingNotificationDispatcher {
    fn notify(&self, event: NotificationEvent) -> Result<(), NotifyError> {
        info!(
            target: "dj_desk::notifications",
            event = %event.event_type,
            job = %event.job_id,
            metadata = ?event.metadata,
            "notification dispatched"
        );
        Ok(())
    }
}

/// Admin grants and company holidays supplied on the command line.
pub(crate) fn seed_store(
    store: &InMemoryWorkflowStore,
    admins: &[String],
    holidays: &[NaiveDate],
) -> Result<(), RepositoryError> {
    for admin in admins {
        store.grant_role(UserId::new(admin.as_str()), Role::Admin)?;
    }
    for date in holidays {
        store.add_holiday(Holiday::one_off(*date, HolidayKind::Company, "company holiday"))?;
    }
    Ok(())
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}
