use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};

use app::{App, ShiftBoard};
use git::CancelToken;
use logging::Surface;
use session::Session;
use types::{Period, ShiftEntry, Team};

mod api;
mod app;
mod auth;
mod classify;
mod config;
mod error;
mod git;
mod ingest;
mod layout;
mod logging;
mod mcp;
mod publish;
mod session;
mod store;
mod stores;
mod sync;
mod tui;
mod types;
mod utils;
mod watcher;

#[derive(Parser)]
#[command(name = "rosterboard")]
#[command(version)]
#[command(disable_help_subcommand = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the terminal dashboard (default)
    Dashboard(DashboardArgs),
    /// Upload a roster or a shift legend (admin)
    Upload(UploadArgs),
    /// Show, export or delete a month's roster
    Schedule(ScheduleArgs),
    /// Print the day, night and vacation shifts of a date
    Shifts(ShiftsArgs),
    /// Manage the monthly memo board
    Memo(MemoArgs),
    /// Read or regenerate published daily snapshots
    Snapshot(SnapshotArgs),
    /// Prepare the checkout and pull the latest rosters
    Sync,
    /// Run as an MCP (Model Context Protocol) server
    Mcp,
    /// Manage configuration
    Config(ConfigArgs),
}

#[derive(Args, Default)]
struct DashboardArgs {
    /// Team selected at startup
    #[arg(long)]
    team: Option<Team>,
}

/// Team to unlock. The secret comes from `ROSTERBOARD_SECRET` or is typed at a
/// prompt without echo.
#[derive(Args)]
struct AdminArgs {
    #[arg(long)]
    team: Team,
}

const SECRET_ENV: &str = "ROSTERBOARD_SECRET";

#[derive(Args)]
struct MonthArgs {
    #[arg(long)]
    year: i32,

    #[arg(long)]
    month: u32,
}

impl MonthArgs {
    fn period(&self) -> Result<Period> {
        Period::new(self.year, self.month)
            .with_context(|| format!("Invalid month {}-{}", self.year, self.month))
    }
}

#[derive(Args)]
struct UploadArgs {
    #[command(subcommand)]
    subcommand: UploadSubcommands,
}

#[derive(Subcommand)]
enum UploadSubcommands {
    /// Store a month's roster (CSV, XLSX or XLS) and publish its snapshots
    Schedule {
        #[command(flatten)]
        admin: AdminArgs,
        #[command(flatten)]
        month: MonthArgs,
        file: PathBuf,
    },
    /// Replace the team's shift-code legend
    Legend {
        #[command(flatten)]
        admin: AdminArgs,
        file: PathBuf,
    },
}

#[derive(Args)]
struct ScheduleArgs {
    #[command(subcommand)]
    subcommand: ScheduleSubcommands,
}

#[derive(Subcommand)]
enum ScheduleSubcommands {
    /// Print the roster without metadata columns
    Show {
        #[arg(long)]
        team: Team,
        #[command(flatten)]
        month: MonthArgs,
        /// Only rows whose name contains this text
        #[arg(long)]
        search: Option<String>,
    },
    /// Write the full roster as CSV with a UTF-8 BOM
    Export {
        #[arg(long)]
        team: Team,
        #[command(flatten)]
        month: MonthArgs,
        /// Output file; defaults to `{team}_{month}월_근무표.csv`
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Delete a month's roster (admin)
    Delete {
        #[command(flatten)]
        admin: AdminArgs,
        #[command(flatten)]
        month: MonthArgs,
    },
    /// List the months that have a roster
    List {
        #[arg(long)]
        team: Team,
    },
}

#[derive(Args)]
struct ShiftsArgs {
    #[arg(long)]
    team: Team,

    /// Date as YYYY-MM-DD; defaults to today
    #[arg(long)]
    date: Option<NaiveDate>,
}

#[derive(Args)]
struct MemoArgs {
    #[command(subcommand)]
    subcommand: MemoSubcommands,
}

#[derive(Subcommand)]
enum MemoSubcommands {
    /// Add a memo to a month
    Add {
        #[arg(long)]
        team: Team,
        #[command(flatten)]
        month: MonthArgs,
        #[arg(long)]
        author: String,
        note: String,
    },
    /// List a month's memos, newest first
    List {
        #[arg(long)]
        team: Team,
        #[command(flatten)]
        month: MonthArgs,
    },
    /// Delete one memo by its number in `memo list` (admin)
    Delete {
        #[command(flatten)]
        admin: AdminArgs,
        #[command(flatten)]
        month: MonthArgs,
        /// Number printed by `memo list`
        number: usize,
    },
}

#[derive(Args)]
struct SnapshotArgs {
    #[command(subcommand)]
    subcommand: SnapshotSubcommands,
}

#[derive(Subcommand)]
enum SnapshotSubcommands {
    /// Print the published snapshot of a team and date
    Get {
        #[arg(long)]
        team: String,
        #[arg(long)]
        date: String,
    },
    /// Answer a raw query string such as `team=관제SO팀&date=2025-03-15`
    Query { query: String },
    /// Regenerate a month of snapshots from the stored roster (admin)
    Publish {
        #[command(flatten)]
        admin: AdminArgs,
        #[command(flatten)]
        month: MonthArgs,
    },
}

#[derive(Args)]
struct ConfigArgs {
    #[command(subcommand)]
    subcommand: ConfigSubcommands,
}

#[derive(Subcommand)]
enum ConfigSubcommands {
    /// Create default configuration file
    Init {
        #[arg(long, default_value_t = false)]
        overwrite: bool,
    },
    /// Show current configuration
    Show,
    /// Set configuration value
    Set {
        /// Configuration key (repo-url, repo-token, branch, checkout-dir, author-name,
        /// author-email, conflict-policy, sync-interval, timezone, team-secret:<TEAM>)
        key: String,
        /// Configuration value
        value: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        None => run_dashboard(DashboardArgs::default()).await,
        Some(Commands::Dashboard(args)) => run_dashboard(args).await,
        Some(Commands::Mcp) => {
            logging::init(Surface::Interactive);
            match config::Config::load_or_default() {
                Ok(config) => mcp::run_mcp_server(config)
                    .await
                    .context("MCP server error"),
                Err(e) => Err(e),
            }
        }
        Some(Commands::Config(args)) => {
            logging::init(Surface::Cli);
            handle_config_subcommand(args)
        }
        Some(command) => {
            logging::init(Surface::Cli);
            run_command(command)
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run_dashboard(args: DashboardArgs) -> Result<()> {
    logging::init(Surface::Interactive);
    let config = config::Config::load_or_default()?;
    let interval = config.sync_interval();
    let team = args.team.unwrap_or(Team::all()[0]);

    tokio::task::spawn_blocking(move || -> Result<()> {
        let app = App::open(&config)?;
        tui::run_tui(Arc::new(app), team, interval).context("Error displaying dashboard")
    })
    .await?
}

fn run_command(command: Commands) -> Result<()> {
    let config = config::Config::load_or_default()?;
    let app = App::open(&config)?;
    if !matches!(command, Commands::Sync) {
        app.refresh();
    }

    match command {
        Commands::Upload(args) => handle_upload(&app, args.subcommand),
        Commands::Schedule(args) => handle_schedule(&app, args.subcommand),
        Commands::Shifts(args) => print_shifts(&app, args.team, args.date),
        Commands::Memo(args) => handle_memo(&app, args.subcommand),
        Commands::Snapshot(args) => handle_snapshot(&app, args.subcommand),
        Commands::Sync => {
            let outcome = app.sync(&CancelToken::new()).context("Failed to sync")?;
            println!("{}", app::Notice::from_pull(&outcome).message);
            Ok(())
        }
        Commands::Dashboard(_) | Commands::Mcp | Commands::Config(_) => Ok(()),
    }
}

/// Session with `admin.team` selected and unlocked.
fn admin_session(app: &App, admin: &AdminArgs) -> Result<Session> {
    let mut session = app.new_session(admin.team);
    if !app.gate().has_secret(admin.team) {
        bail!(
            "No admin secret configured for {}; set one with `rosterboard config set team-secret:{} <secret>`",
            admin.team,
            admin.team
        );
    }
    let secret = read_secret(admin.team)?;
    if !session.unlock(app.gate(), &secret) {
        bail!("Admin secret rejected for {}", admin.team);
    }
    Ok(session)
}

/// Admin secret from `ROSTERBOARD_SECRET`, or typed at a prompt with echo off.
fn read_secret(team: Team) -> Result<String> {
    if let Ok(secret) = std::env::var(SECRET_ENV)
        && !secret.is_empty()
    {
        return Ok(secret);
    }
    if !io::stdin().is_terminal() {
        bail!("No admin secret given: set {SECRET_ENV} or run from a terminal");
    }

    eprint!("Admin secret for {team}: ");
    io::stderr().flush()?;
    crossterm::terminal::enable_raw_mode()?;
    let typed = read_hidden_line(event::read);
    crossterm::terminal::disable_raw_mode()?;
    eprintln!();
    typed
}

/// Collects typed characters until Enter. Nothing is echoed.
fn read_hidden_line(mut read: impl FnMut() -> io::Result<Event>) -> Result<String> {
    let mut secret = String::new();
    loop {
        let Event::Key(key) = read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }
        match key.code {
            KeyCode::Enter => return Ok(secret),
            KeyCode::Esc => bail!("Cancelled"),
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                bail!("Cancelled")
            }
            KeyCode::Backspace => {
                secret.pop();
            }
            KeyCode::Char(c) => secret.push(c),
            _ => {}
        }
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn handle_upload(app: &App, subcommand: UploadSubcommands) -> Result<()> {
    match subcommand {
        UploadSubcommands::Schedule { admin, month, file } => {
            let session = admin_session(app, &admin)?;
            let period = month.period()?;
            let report = app
                .upload_schedule(&session, admin.team, period, &file, &read_file(&file)?)
                .context("Failed to upload roster")?;
            println!(
                "✅ {} {} roster saved; {} days published ({} written, {} removed)",
                report.team,
                report.period.month_label(),
                report.days_covered,
                report.written,
                report.removed
            );
            if report.legend_missing {
                println!("⚠️  No legend uploaded for {}; only vacation codes were classified", report.team);
            }
        }
        UploadSubcommands::Legend { admin, file } => {
            let session = admin_session(app, &admin)?;
            let codes = app
                .upload_legend(&session, admin.team, &file, &read_file(&file)?)
                .context("Failed to upload legend")?;
            println!("✅ {} legend saved with {codes} shift codes", admin.team);
        }
    }
    Ok(())
}

fn print_table(table: &types::Table) {
    println!("{}", table.headers.join("\t"));
    for row in &table.rows {
        println!("{}", row.join("\t"));
    }
}

fn handle_schedule(app: &App, subcommand: ScheduleSubcommands) -> Result<()> {
    match subcommand {
        ScheduleSubcommands::Show {
            team,
            month,
            search,
        } => {
            let period = month.period()?;
            match app.roster_view(team, period, search.as_deref().unwrap_or(""))? {
                Some(table) => print_table(&table),
                None => println!("No roster uploaded for {team} {}", period.month_label()),
            }
        }
        ScheduleSubcommands::Export {
            team,
            month,
            output,
        } => {
            let (name, bytes) = app.export_roster(team, month.period()?)?;
            let path = output.unwrap_or_else(|| PathBuf::from(name));
            std::fs::write(&path, bytes)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("✅ Exported {}", path.display());
        }
        ScheduleSubcommands::Delete { admin, month } => {
            let session = admin_session(app, &admin)?;
            let period = month.period()?;
            if app.delete_schedule(&session, admin.team, period)? {
                println!("✅ Deleted {} {} roster", admin.team, period.month_label());
            } else {
                println!("No roster uploaded for {} {}", admin.team, period.month_label());
            }
        }
        ScheduleSubcommands::List { team } => {
            let periods = app.schedules.list_periods(team)?;
            if periods.is_empty() {
                println!("No rosters uploaded for {team}");
            }
            for period in periods {
                println!("{}", period.year_month());
            }
        }
    }
    Ok(())
}

fn print_bucket(title: &str, entries: &[ShiftEntry]) {
    println!("{title} ({})", entries.len());
    for entry in entries {
        println!("  {:<6} {} ({})", entry.division, entry.name, entry.shift_code);
    }
}

fn print_shifts(app: &App, team: Team, date: Option<NaiveDate>) -> Result<()> {
    let date = date.unwrap_or_else(|| app.today());
    match app.shift_board(team, date)? {
        ShiftBoard::NoRoster => {
            println!("No roster uploaded for {team} {}", Period::of(date).month_label())
        }
        ShiftBoard::NoColumn(column) => println!("No column {column} in the {team} roster"),
        ShiftBoard::Ready {
            buckets,
            legend_missing,
        } => {
            println!("{}", utils::board_title(team, date));
            if legend_missing {
                println!("⚠️  No legend uploaded; only vacation codes were classified");
            }
            print_bucket("Day", &buckets.day);
            print_bucket("Night", &buckets.night);
            print_bucket("Vacation", &buckets.vacation);
        }
    }
    Ok(())
}

fn handle_memo(app: &App, subcommand: MemoSubcommands) -> Result<()> {
    match subcommand {
        MemoSubcommands::Add {
            team,
            month,
            author,
            note,
        } => {
            if app.add_memo(team, month.period()?, &note, &author)? {
                println!("✅ Memo saved");
            } else {
                println!("Same memo already saved");
            }
        }
        MemoSubcommands::List { team, month } => {
            let period = month.period()?;
            let memos = app.list_memos(team, period)?;
            if memos.is_empty() {
                println!("No memos for {team} {}", period.month_label());
            }
            for (i, memo) in memos.iter().enumerate() {
                println!("{:>3}. [{}] {}: {}", i + 1, memo.timestamp, memo.author, memo.note);
            }
        }
        MemoSubcommands::Delete {
            admin,
            month,
            number,
        } => {
            let period = month.period()?;
            let memos = app.list_memos(admin.team, period)?;
            let Some(memo) = number.checked_sub(1).and_then(|i| memos.get(i)) else {
                bail!(
                    "No memo #{number} for {} {} ({} saved)",
                    admin.team,
                    period.month_label(),
                    memos.len()
                );
            };
            let session = admin_session(app, &admin)?;
            if app.delete_memo(&session, admin.team, period, memo)? {
                println!("✅ Memo deleted: [{}] {}", memo.timestamp, memo.note);
            } else {
                println!("Memo #{number} was already gone");
            }
        }
    }
    Ok(())
}

fn handle_snapshot(app: &App, subcommand: SnapshotSubcommands) -> Result<()> {
    let response = match subcommand {
        SnapshotSubcommands::Get { team, date } => api::ApiResponse::from_result(
            api::get_snapshot(&app.snapshots, &api::SnapshotQuery::new(team, date)),
        ),
        SnapshotSubcommands::Query { query } => api::handle_query(&app.snapshots, &query),
        SnapshotSubcommands::Publish { admin, month } => {
            let session = admin_session(app, &admin)?;
            let report = app.publish(&session, admin.team, month.period()?)?;
            println!(
                "✅ {} {}: {} days published ({} written, {} removed)",
                report.team,
                report.period.month_label(),
                report.days_covered,
                report.written,
                report.removed
            );
            return Ok(());
        }
    };

    println!("{}", response.to_json());
    if response.is_error() {
        std::process::exit(1);
    }
    Ok(())
}

fn handle_config_subcommand(config_args: ConfigArgs) -> Result<()> {
    match config_args.subcommand {
        ConfigSubcommands::Init { overwrite } => {
            config::create_default_config(overwrite).context("Error creating config")
        }
        ConfigSubcommands::Show => config::show_config().context("Error showing config"),
        ConfigSubcommands::Set { key, value } => {
            config::set_config_value(&key, &value).context("Error setting config")
        }
    }
}
