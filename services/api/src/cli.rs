use crate::demo::{run_add_days, run_demo, AddDaysArgs, DemoArgs};
use crate::server;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use dj_desk::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Design Job Desk",
    about = "Run the design job approval and scheduling service from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Business-day arithmetic against a holiday list
    Calendar {
        #[command(subcommand)]
        command: CalendarCommand,
    },
    /// Walk a job through approval and an urgent deadline cascade
    Demo(DemoArgs),
}

#[derive(Subcommand, Debug)]
enum CalendarCommand {
    /// Add working days to a date, skipping weekends and holidays
    AddDays(AddDaysArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Grant the admin role to this user at startup (repeatable)
    #[arg(long = "admin")]
    pub(crate) admins: Vec<String>,
    /// Company holiday (YYYY-MM-DD) loaded into the calendar (repeatable)
    #[arg(long = "holiday", value_parser = crate::infra::parse_date)]
    pub(crate) holidays: Vec<NaiveDate>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Calendar {
            command: CalendarCommand::AddDays(args),
        } => run_add_days(args),
        Command::Demo(args) => run_demo(args),
    }
}
