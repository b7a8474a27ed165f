use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use jirapms::{DateRange, JiraPms, MemberFilter, MetricsQuery, Period};

#[derive(Parser)]
#[command(name = "jirapms", about = "JIRA delivery efficiency warehouse CLI")]
struct Cli {
    /// Database path (default: ~/.jirapms/jirapms.db)
    #[arg(long)]
    db: Option<String>,

    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Progress reporter that writes to stderr.
struct StderrProgress;

impl jirapms::ImportProgress for StderrProgress {
    fn on_epic_start(&self, epic_key: &str, index: usize, total: usize) {
        eprintln!("[{}/{}] Importing {}...", index + 1, total, epic_key);
    }

    fn on_epic_complete(&self, _epic_key: &str, imported: usize, failed: usize) {
        if failed > 0 {
            eprintln!("  Done: {imported} units, {failed} failed");
        } else {
            eprintln!("  Done: {imported} units");
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Import a saved JIRA export file
    Import {
        /// Path to the export JSON ({"epics": [...], "issues": {...}})
        file: String,
        /// Delete stored units the export no longer lists
        #[arg(long)]
        prune: bool,
        /// Output the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show warehouse status
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Compute delivery metrics
    Metrics {
        #[command(subcommand)]
        target: MetricsTarget,
    },
    /// Manage teams
    Team {
        #[command(subcommand)]
        action: TeamAction,
    },
    /// Manage members and their JIRA account links
    Member {
        #[command(subcommand)]
        action: MemberAction,
    },
    /// Inspect JIRA workers seen in imports
    Worker {
        #[command(subcommand)]
        action: WorkerAction,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Args, Clone, Default)]
struct FilterArgs {
    /// Period (e.g. 2025, 2025-H1, 2025-Q1, 2025-01, 2025-W05, 30d, ytd, mtd)
    #[arg(long, conflicts_with_all = ["from", "to"])]
    period: Option<String>,
    /// Range start (YYYY-MM-DD)
    #[arg(long)]
    from: Option<String>,
    /// Range end (YYYY-MM-DD, default: today)
    #[arg(long)]
    to: Option<String>,
    /// Team id or name
    #[arg(long)]
    team: Option<String>,
    /// Member email or JIRA account id
    #[arg(long)]
    member: Option<String>,
    /// Output as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum MetricsTarget {
    /// Issue counts and progress per project
    Projects(FilterArgs),
    /// Efficiency per JIRA worker
    Workers(FilterArgs),
    /// Efficiency per member
    Members(FilterArgs),
    /// Efficiency per team
    Teams(FilterArgs),
    /// Month-by-month completed work
    Monthly(FilterArgs),
    /// Dashboard summary
    Summary(FilterArgs),
    /// Estimation total of one epic
    Epic {
        /// Epic key (e.g. PMS-123)
        key: String,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum TeamAction {
    /// Create a team
    Add { name: String },
    /// List teams
    List {
        #[arg(long)]
        json: bool,
    },
    /// Delete a team (members are kept without a team)
    Remove {
        /// Team id or name
        team: String,
    },
}

#[derive(Subcommand)]
enum MemberAction {
    /// Add or update a member
    Add {
        email: String,
        #[arg(long)]
        nickname: Option<String>,
        /// Team id or name
        #[arg(long)]
        team: Option<String>,
        /// JIRA account id
        #[arg(long)]
        account: Option<String>,
    },
    /// List members
    List {
        #[arg(long)]
        json: bool,
    },
    /// Link a member to a JIRA account (omit the account to unlink)
    Link {
        email: String,
        account: Option<String>,
    },
    /// Remove a member
    Remove { email: String },
}

#[derive(Subcommand)]
enum WorkerAction {
    /// Workers not linked to any member
    Unmapped {
        #[arg(long)]
        json: bool,
    },
    /// Workers excluded from aggregation
    Excluded {
        #[arg(long)]
        json: bool,
    },
    /// Exclude a worker's units from every metric
    Exclude { account: String },
    /// Include an excluded worker again
    Restore { account: String },
    /// Create a member for an unmapped worker
    Register {
        account: String,
        #[arg(long)]
        nickname: Option<String>,
        /// Team id or name
        #[arg(long)]
        team: Option<String>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a config value
    Get { key: String },
    /// Set a config value
    Set { key: String, value: String },
    /// List all config values
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let db = match &cli.db {
        Some(path) => jirapms::Database::open_at(path).await?,
        None => jirapms::Database::open().await?,
    };
    let pms = JiraPms::new(db);

    match cli.command {
        Commands::Import { file, prune, json } => {
            let report = pms.import_file(&file, prune, &StderrProgress).await?;
            if json {
                print_json(&report)?;
            } else {
                print_import_report(&report);
            }
        }
        Commands::Status { json } => {
            let status = pms.status().await?;
            if json {
                print_json(&status)?;
            } else {
                print_status(&status);
            }
        }
        Commands::Metrics { target } => handle_metrics(&pms, target).await?,
        Commands::Team { action } => handle_team(&pms, action).await?,
        Commands::Member { action } => handle_member(&pms, action).await?,
        Commands::Worker { action } => handle_worker(&pms, action).await?,
        Commands::Config { action } => handle_config(&pms, action).await?,
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Build the query from command-line filters, resolving team names and
/// member emails against the store.
async fn build_query(pms: &JiraPms, args: &FilterArgs) -> anyhow::Result<MetricsQuery> {
    let range = match &args.period {
        Some(p) => DateRange::from_period(&Period::parse(p)?)?,
        None => DateRange::parse(args.from.as_deref(), args.to.as_deref())?,
    };

    let team_id = match &args.team {
        Some(t) => Some(pms.team_find(t).await?.id),
        None => None,
    };
    let member_account_id = match &args.member {
        Some(m) => Some(resolve_account(pms, m).await?),
        None => None,
    };

    Ok(MetricsQuery {
        range,
        filter: MemberFilter {
            team_id,
            member_account_id,
        },
    })
}

/// A member email resolves to its linked account; anything else is
/// taken as an account id.
async fn resolve_account(pms: &JiraPms, identifier: &str) -> anyhow::Result<String> {
    let members = pms.member_list().await?;
    match members.iter().find(|m| m.email.eq_ignore_ascii_case(identifier)) {
        Some(member) => member
            .jira_account_id
            .clone()
            .ok_or_else(|| anyhow::anyhow!("member {identifier} is not linked to a JIRA account")),
        None => Ok(identifier.to_string()),
    }
}

async fn resolve_team(pms: &JiraPms, team: Option<&str>) -> anyhow::Result<Option<i64>> {
    match team {
        Some(t) => Ok(Some(pms.team_find(t).await?.id)),
        None => Ok(None),
    }
}

async fn handle_metrics(pms: &JiraPms, target: MetricsTarget) -> anyhow::Result<()> {
    match target {
        MetricsTarget::Projects(args) => {
            let rows = pms.project_metrics(&build_query(pms, &args).await?).await?;
            if args.json {
                return print_json(&rows);
            }
            println!(
                "{:<12} {:<32} {:>6} {:>6} {:>6} {:>6} {:>5} {:>8}",
                "EPIC", "NAME", "TOTAL", "TODO", "DOING", "DONE", "%", "ESTIM"
            );
            for p in &rows {
                println!(
                    "{:<12} {:<32} {:>6} {:>6} {:>6} {:>6} {:>4}% {:>8.1}",
                    p.project_key,
                    truncate(&p.project_name, 32),
                    p.total_issues,
                    p.todo_count,
                    p.in_progress_count,
                    p.done_count,
                    p.progress_percent,
                    p.estimation_total
                );
            }
        }
        MetricsTarget::Workers(args) => {
            let rows = pms.worker_metrics(&build_query(pms, &args).await?).await?;
            if args.json {
                return print_json(&rows);
            }
            print_efficiency_header("WORKER");
            for w in &rows {
                print_efficiency_row(
                    w.rank,
                    &w.display_name,
                    w.total_assigned,
                    w.total_resolved,
                    w.otdr,
                    w.aod,
                );
            }
        }
        MetricsTarget::Members(args) => {
            let rows = pms.member_metrics(&build_query(pms, &args).await?).await?;
            if args.json {
                return print_json(&rows);
            }
            print_efficiency_header("MEMBER");
            for m in &rows {
                let label = match &m.team_name {
                    Some(team) => format!("{} ({team})", m.nickname),
                    None => m.nickname.clone(),
                };
                print_efficiency_row(
                    m.rank,
                    &label,
                    m.total_assigned,
                    m.total_resolved,
                    m.otdr,
                    m.aod,
                );
            }
        }
        MetricsTarget::Teams(args) => {
            let rows = pms.team_metrics(&build_query(pms, &args).await?).await?;
            if args.json {
                return print_json(&rows);
            }
            print_efficiency_header("TEAM");
            for t in &rows {
                let label = format!("{} ({} members)", t.team_name, t.member_count);
                print_efficiency_row(
                    t.rank,
                    &label,
                    t.total_assigned,
                    t.total_resolved,
                    t.otdr,
                    t.aod,
                );
            }
        }
        MetricsTarget::Monthly(args) => {
            let stats = pms.monthly_stats(&build_query(pms, &args).await?).await?;
            if args.json {
                return print_json(&stats);
            }
            print_monthly(&stats);
        }
        MetricsTarget::Summary(args) => {
            let summary = pms.summary(&build_query(pms, &args).await?).await?;
            if args.json {
                return print_json(&summary);
            }
            println!("Summary");
            println!("  Projects: {}", summary.total_projects);
            println!("  Issues:   {}", summary.total_issues);
            println!("  Avg OTDR: {:.1}%", summary.avg_otdr * 100.0);
            println!("  Avg AOD:  {:.2} days", summary.avg_aod);
        }
        MetricsTarget::Epic { key, json } => {
            let total = pms.epic_estimation(&key).await?;
            if json {
                return print_json(&serde_json::json!({ "epic_key": key, "estimation": total }));
            }
            println!("{key}: {total:.1}");
        }
    }
    Ok(())
}

async fn handle_team(pms: &JiraPms, action: TeamAction) -> anyhow::Result<()> {
    match action {
        TeamAction::Add { name } => {
            let id = pms.team_add(&name).await?;
            println!("Created team {name} (id {id}).");
        }
        TeamAction::List { json } => {
            let teams = pms.team_list().await?;
            if json {
                return print_json(&teams);
            }
            if teams.is_empty() {
                println!("No teams.");
            }
            for t in &teams {
                println!("{:>4}  {}", t.id, t.name);
            }
        }
        TeamAction::Remove { team } => {
            if pms.team_remove(&team).await? {
                println!("Removed team {team}.");
            }
        }
    }
    Ok(())
}

async fn handle_member(pms: &JiraPms, action: MemberAction) -> anyhow::Result<()> {
    match action {
        MemberAction::Add {
            email,
            nickname,
            team,
            account,
        } => {
            let team_id = resolve_team(pms, team.as_deref()).await?;
            let nickname = nickname
                .unwrap_or_else(|| email.split('@').next().unwrap_or(&email).to_string());
            pms.member_add(jirapms::Member {
                email: email.clone(),
                nickname,
                team_id,
                jira_account_id: account,
            })
            .await?;
            println!("Saved member {email}.");
        }
        MemberAction::List { json } => {
            let members = pms.member_list().await?;
            if json {
                return print_json(&members);
            }
            if members.is_empty() {
                println!("No members.");
            }
            let teams = pms.team_list().await?;
            for m in &members {
                let team = m
                    .team_id
                    .and_then(|id| teams.iter().find(|t| t.id == id))
                    .map(|t| t.name.as_str())
                    .unwrap_or("-");
                println!(
                    "{:<32} {:<16} {:<16} {}",
                    m.email,
                    m.nickname,
                    team,
                    m.jira_account_id.as_deref().unwrap_or("(unlinked)")
                );
            }
        }
        MemberAction::Link { email, account } => {
            pms.member_link(&email, account.as_deref()).await?;
            match account {
                Some(a) => println!("Linked {email} to {a}."),
                None => println!("Unlinked {email}."),
            }
        }
        MemberAction::Remove { email } => {
            if pms.member_remove(&email).await? {
                println!("Removed member {email}.");
            } else {
                println!("No member {email}.");
            }
        }
    }
    Ok(())
}

async fn handle_worker(pms: &JiraPms, action: WorkerAction) -> anyhow::Result<()> {
    match action {
        WorkerAction::Unmapped { json } => {
            let workers = pms.workers_unmapped().await?;
            if json {
                return print_json(&workers);
            }
            print_workers(&workers, "All workers are mapped.");
        }
        WorkerAction::Excluded { json } => {
            let workers = pms.workers_excluded().await?;
            if json {
                return print_json(&workers);
            }
            print_workers(&workers, "No excluded workers.");
        }
        WorkerAction::Exclude { account } => {
            pms.worker_set_excluded(&account, true).await?;
            println!("Excluded {account}.");
        }
        WorkerAction::Restore { account } => {
            pms.worker_set_excluded(&account, false).await?;
            println!("Restored {account}.");
        }
        WorkerAction::Register {
            account,
            nickname,
            team,
        } => {
            let team_id = resolve_team(pms, team.as_deref()).await?;
            let member = pms
                .worker_register(&account, nickname.as_deref().unwrap_or(""), team_id)
                .await?;
            println!("Registered {} as {}.", account, member.email);
        }
    }
    Ok(())
}

async fn handle_config(pms: &JiraPms, action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => match pms.config_get(&key).await? {
            Some(v) => println!("{key} = {v}"),
            None => println!("{key} is not set"),
        },
        ConfigAction::Set { key, value } => {
            pms.config_set(&key, &value).await?;
            println!("Config updated.");
        }
        ConfigAction::List => {
            let items = pms.config_list().await?;
            if items.is_empty() {
                println!("No configuration set.");
            } else {
                for (k, v) in items {
                    println!("{k} = {v}");
                }
            }
        }
    }
    Ok(())
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(width.saturating_sub(1)).collect();
        out.push('…');
        out
    }
}

fn print_efficiency_header(label: &str) {
    println!(
        "{:>4}  {:<36} {:>8} {:>8} {:>7} {:>7}",
        "RANK", label, "ASSIGNED", "RESOLVED", "OTDR", "AOD"
    );
}

fn print_efficiency_row(rank: usize, label: &str, assigned: u64, resolved: u64, otdr: f64, aod: f64) {
    println!(
        "{:>4}  {:<36} {:>8} {:>8} {:>6.1}% {:>7.2}",
        rank,
        truncate(label, 36),
        assigned,
        resolved,
        otdr * 100.0,
        aod
    );
}

fn print_monthly(stats: &jirapms::MonthlyStats) {
    if stats.person_stats.is_empty() && stats.team_stats.is_empty() {
        println!("No completed work in range.");
        return;
    }
    let mut months: Vec<&str> = stats
        .person_stats
        .iter()
        .map(|p| p.month.as_str())
        .chain(stats.team_stats.iter().map(|t| t.month.as_str()))
        .collect();
    months.sort_unstable();
    months.dedup();

    for month in months {
        println!("{month}");
        if let Some(total) = stats.total_stats.iter().find(|t| t.month == month) {
            println!(
                "  Total: {} done, {:.1} est, OTDR {:.1}%, AOD {:.2}",
                total.completed_count,
                total.estimation_total,
                total.otdr * 100.0,
                total.aod
            );
        }
        for t in stats.team_stats.iter().filter(|t| t.month == month) {
            println!(
                "  Team {}: {} done, {:.1} est, OTDR {:.1}%, AOD {:.2}",
                t.team_name,
                t.completed_count,
                t.estimation_total,
                t.otdr * 100.0,
                t.aod
            );
        }
        for p in stats.person_stats.iter().filter(|p| p.month == month) {
            println!(
                "    {:<24} {:>4} done {:>7.1} est  OTDR {:>5.1}%  AOD {:>5.2}",
                truncate(&p.display_name, 24),
                p.completed_count,
                p.estimation_total,
                p.otdr * 100.0,
                p.aod
            );
        }
    }
}

fn print_workers(workers: &[jirapms::UnmappedWorker], empty: &str) {
    if workers.is_empty() {
        println!("{empty}");
        return;
    }
    for w in workers {
        println!(
            "{:<28} {:<24} {}",
            w.account_id,
            truncate(&w.display_name, 24),
            w.email.as_deref().unwrap_or("-")
        );
    }
}

fn print_status(status: &jirapms::StoreStatus) {
    println!("Warehouse Status");
    println!("  Projects: {}", status.projects);
    println!("  Units:    {}", status.units);
    println!(
        "  Workers:  {} ({} excluded, {} unmapped)",
        status.workers, status.excluded_workers, status.unmapped_workers
    );
    println!("  Teams:    {}", status.teams);
    println!("  Members:  {}", status.members);
    println!(
        "  Last sync: {}",
        status.last_sync_at.as_deref().unwrap_or("never")
    );
    if let Some(job) = &status.last_job {
        println!(
            "  Last job: {} [{}] {} synced, {} failed",
            job.source, job.status, job.synced_items, job.failed_items
        );
    }
}

fn print_import_report(report: &jirapms::SyncReport) {
    println!("Import: {}", report.source);
    println!("  Status:  {:?}", report.status);
    println!("  Epics:   {}", report.epics);
    println!("  Synced:  {} units", report.items_synced);
    println!("  Failed:  {} units", report.items_failed);
    println!("  Workers: {}", report.workers);
    println!("  Due date changes: {}", report.due_date_changes);
    println!("  Members linked:   {}", report.members_linked);
    if let Some(ref err) = report.error {
        println!("  Error:   {err}");
    }
}
