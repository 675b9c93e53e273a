use chrono::{Local, NaiveDate};
use clap::Args;
use dj_desk::config::{SchedulingConfig, DEFAULT_SLA_DAYS, DEFAULT_URGENT_SHIFT_DAYS};
use dj_desk::error::AppError;
use dj_desk::workflows::capability::Role;
use dj_desk::workflows::{
    ApprovalFlow, ApprovalLogic, CreateJobRequest, Decision, DepartmentId, DesignJobService,
    Holiday, HolidayCalendar, HolidayKind, InMemoryNotifications, InMemoryWorkflowStore, JobId,
    JobTypeAssignment, JobTypeId, JobUpdate, Priority, ProjectId, UserId, WorkflowError,
};
use serde::Serialize;
use std::sync::Arc;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Submission date for the demo jobs (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) today: Option<NaiveDate>,
    /// Business days an urgent job pushes other work back.
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=30))]
    pub(crate) shift_days: Option<u32>,
    /// Company holiday (YYYY-MM-DD) honoured by the demo calendar (repeatable)
    #[arg(long = "holiday", value_parser = crate::infra::parse_date)]
    pub(crate) holidays: Vec<NaiveDate>,
}

#[derive(Args, Debug)]
pub(crate) struct AddDaysArgs {
    /// Start date (YYYY-MM-DD)
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) from: NaiveDate,
    /// Working days to add
    #[arg(long)]
    pub(crate) days: u32,
    /// Holiday (YYYY-MM-DD) to skip (repeatable)
    #[arg(long = "holiday", value_parser = crate::infra::parse_date)]
    pub(crate) holidays: Vec<NaiveDate>,
    /// Print the result as JSON
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Debug, Serialize)]
struct AddDaysOutput {
    from: NaiveDate,
    days: u32,
    result: NaiveDate,
    skipped_holidays: Vec<NaiveDate>,
}

pub(crate) fn run_add_days(args: AddDaysArgs) -> Result<(), AppError> {
    let AddDaysArgs {
        from,
        days,
        holidays,
        json,
    } = args;

    let calendar = HolidayCalendar::from_holidays(
        holidays
            .iter()
            .map(|date| Holiday::one_off(*date, HolidayKind::Company, "cli holiday")),
    );
    let Some(result) = calendar.add_working_days(from, days) else {
        println!("{from} + {days} working days is past the last supported date");
        return Ok(());
    };
    let output = AddDaysOutput {
        from,
        days,
        result,
        skipped_holidays: holidays
            .into_iter()
            .filter(|date| *date > from && *date <= result)
            .collect(),
    };

    if json {
        match serde_json::to_string_pretty(&output) {
            Ok(rendered) => println!("{rendered}"),
            Err(err) => println!("JSON output unavailable: {err}"),
        }
    } else {
        println!(
            "{} + {} working days = {} ({})",
            output.from,
            output.days,
            output.result,
            output.result.format("%A")
        );
        if !output.skipped_holidays.is_empty() {
            println!("Skipped holidays:");
            for date in &output.skipped_holidays {
                println!("  - {date}");
            }
        }
    }

    Ok(())
}

const DEMO_ADMIN: &str = "ops-admin";

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        today,
        shift_days,
        holidays,
    } = args;
    let today = today.unwrap_or_else(|| Local::now().date_naive());
    let scheduling = SchedulingConfig {
        urgent_shift_days: shift_days.unwrap_or(DEFAULT_URGENT_SHIFT_DAYS),
        default_sla_days: DEFAULT_SLA_DAYS,
    };

    let store = Arc::new(InMemoryWorkflowStore::default());
    let notifications = Arc::new(InMemoryNotifications::default());
    seed_demo_organization(&store, &holidays).map_err(WorkflowError::from)?;
    let service = DesignJobService::new(store, notifications.clone(), scheduling);
    configure_demo_project(&service)?;

    println!("Design job desk demo (submitted {today})");
    println!(
        "- Urgent jobs push other work back {} business days; default SLA {} days",
        scheduling.urgent_shift_days, scheduling.default_sla_days
    );

    println!("\nLeveled approval");
    let banner = service.create_job(
        demo_request("banner", "Spring hero banner", Priority::Normal),
        today,
    )?;
    print_update("created", &banner);
    for (approver, level) in [("art-lead", 1), ("legal", 2), ("brand", 2)] {
        let update = service.record_decision(
            &banner.job.id,
            &UserId::new(approver),
            level,
            Decision::Approve,
        )?;
        print_update(&format!("{approver} approved level {level}"), &update);
    }

    println!("\nSkip-approval routing");
    let resize = service.create_job(
        demo_request("resize", "Resize hero for social", Priority::Normal),
        today,
    )?;
    print_update("created", &resize);

    println!("\nUrgent job on a busy designer");
    let urgent = service.create_job(
        demo_request("resize", "Launch-day fix", Priority::Urgent),
        today,
    )?;
    print_update("created", &urgent);
    if let Some(report) = &urgent.shift {
        for entry in &report.shifted {
            println!(
                "  - {} moved {} -> {} (+{} business days)",
                entry.job_id, entry.original_due_date, entry.new_due_date, entry.shift_days
            );
        }
        for failure in &report.failed {
            println!("  - {} not shifted: {}", failure.job_id, failure.error);
        }
    }
    print_shift_log(&service, &resize.job.id)?;

    println!("\nNotifications dispatched:");
    for event in notifications.events() {
        println!("  - {} -> {}", event.event_type, event.job_id);
    }

    Ok(())
}

fn demo_project() -> ProjectId {
    ProjectId::new("spring-campaign")
}

fn seed_demo_organization(
    store: &InMemoryWorkflowStore,
    holidays: &[NaiveDate],
) -> Result<(), dj_desk::workflows::RepositoryError> {
    store.register_department(
        demo_project(),
        DepartmentId::new("studio"),
        Some(UserId::new("studio-manager")),
    )?;
    store.grant_role(UserId::new(DEMO_ADMIN), Role::Admin)?;
    for date in holidays {
        store.add_holiday(Holiday::one_off(*date, HolidayKind::Company, "company holiday"))?;
    }
    Ok(())
}

fn configure_demo_project(
    service: &DesignJobService<InMemoryWorkflowStore, InMemoryNotifications>,
) -> Result<(), WorkflowError> {
    let admin = UserId::new(DEMO_ADMIN);
    service.save_assignment_matrix(
        &admin,
        &demo_project(),
        vec![JobTypeAssignment {
            project_id: demo_project(),
            job_type_id: JobTypeId::new("resize"),
            assignee_id: UserId::new("riley"),
        }],
    )?;
    service.save_flow(
        &admin,
        ApprovalFlow::skip(demo_project(), JobTypeId::new("resize")).activated(),
    )?;

    let mut flow = ApprovalFlow::leveled(demo_project())
        .activated()
        .with_team_lead(Some(UserId::new("riley")));
    flow.add_level(
        ApprovalLogic::Any,
        [UserId::new("art-lead"), UserId::new("art-deputy")],
    );
    flow.add_level(
        ApprovalLogic::All,
        [UserId::new("brand"), UserId::new("legal")],
    );
    service.save_flow(&admin, flow)?;
    Ok(())
}

fn demo_request(job_type: &str, title: &str, priority: Priority) -> CreateJobRequest {
    CreateJobRequest {
        project_id: demo_project(),
        job_type_id: JobTypeId::new(job_type),
        title: title.to_string(),
        requester_id: UserId::new("marketing"),
        priority,
        due_date: None,
        submitted_on: None,
    }
}

fn print_update(label: &str, update: &JobUpdate) {
    let job = &update.job;
    println!(
        "- {} [{}] {}: {} | due {}",
        job.id, job.title, label, job.status, job.due_date
    );
    if let Some(outcome) = &update.outcome {
        println!("  outcome: {outcome:?}");
    }
    if let Some(assignment) = &update.assignment {
        println!(
            "  assigned to {} via {:?}",
            assignment.assignee_id, assignment.source
        );
    }
}

fn print_shift_log(
    service: &DesignJobService<InMemoryWorkflowStore, InMemoryNotifications>,
    job_id: &JobId,
) -> Result<(), WorkflowError> {
    let log = service.shift_log(job_id)?;
    if log.is_empty() {
        return Ok(());
    }
    println!("  Audit log for {job_id}:");
    for entry in log {
        println!(
            "    - shifted by {}: {} -> {}",
            entry.urgent_job_id, entry.original_due_date, entry.new_due_date
        );
    }
    Ok(())
}
