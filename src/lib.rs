pub mod date_util;
pub mod efficiency;
pub mod error;
pub mod estimation;
pub mod identity;
pub mod jira;
pub mod metrics;
pub mod model;
pub mod query;
pub mod storage;
pub mod sync;

use std::path::Path;

use serde::Serialize;

pub use efficiency::{CompletionField, DueDateStrategy, EfficiencyCalculator, EfficiencyResult};
pub use error::{Error, Result};
pub use identity::{IdentityMap, UnmappedWorker};
pub use jira::{EstimationType, JiraExport, MapperConfig};
pub use metrics::{
    MemberMetrics, MonthlyStats, ProjectMetrics, Summary, TeamMetrics, WorkerMetrics,
};
pub use model::{DueDateChange, Member, Project, StatusCategory, Team, Unit, Worker};
pub use query::{DateRange, MemberFilter, Period};
pub use storage::repository::SyncJob;
pub use storage::Database;
pub use sync::{ImportOptions, ImportProgress, NoopProgress, SyncReport, SyncStatus};

use storage::repository;

/// Everything the composers read, loaded in one pass. Units assigned to
/// excluded workers are already removed.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub projects: Vec<Project>,
    pub units: Vec<Unit>,
    pub workers: Vec<Worker>,
    pub teams: Vec<Team>,
    pub members: Vec<Member>,
}

/// Dashboard filters applied before aggregation.
#[derive(Debug, Clone, Default)]
pub struct MetricsQuery {
    pub range: DateRange,
    pub filter: MemberFilter,
}

impl MetricsQuery {
    pub fn is_unfiltered(&self) -> bool {
        self.range.is_open() && self.filter.is_empty()
    }

    fn units(&self, snapshot: &Snapshot) -> Vec<Unit> {
        let in_range = self.range.apply(&snapshot.units);
        self.filter.apply(&in_range, &snapshot.members)
    }
}

/// Counts shown by `jirapms status`.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStatus {
    pub projects: usize,
    pub units: usize,
    pub workers: usize,
    pub excluded_workers: usize,
    pub teams: usize,
    pub members: usize,
    pub unmapped_workers: usize,
    pub last_sync_at: Option<String>,
    pub last_job: Option<SyncJob>,
}

/// Main entry point: the local JIRA warehouse plus the metric composers.
pub struct JiraPms {
    db: Database,
}

impl JiraPms {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Access the database (for direct queries in the CLI).
    pub fn db(&self) -> &Database {
        &self.db
    }

    // ── Import ─────────────────────────────────────────────────────

    /// Import a saved export file, using the mapper settings in config.
    pub async fn import_file(
        &self,
        path: impl AsRef<Path>,
        prune: bool,
        progress: &dyn ImportProgress,
    ) -> Result<SyncReport> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path).await?;
        let export: JiraExport = serde_json::from_str(&text)?;
        log::debug!(
            "read {} epics from {}",
            export.epics.len(),
            path.display()
        );

        let options = ImportOptions {
            source: path.display().to_string(),
            mapper: sync::load_mapper_config(&self.db).await?,
            prune,
        };
        sync::import_export(&self.db, export, &options, progress).await
    }

    pub async fn status(&self) -> Result<StoreStatus> {
        let snapshot = self.load_snapshot().await?;
        let (unit_count, last_sync_at, last_job) = self
            .db
            .reader()
            .call(|conn| {
                let units: i64 = conn.query_row("SELECT COUNT(*) FROM units", [], |r| r.get(0))?;
                Ok::<_, rusqlite::Error>((
                    units as usize,
                    repository::get_config(conn, "last_sync_at")?,
                    repository::latest_sync_job(conn)?,
                ))
            })
            .await?;

        Ok(StoreStatus {
            projects: snapshot.projects.len(),
            units: unit_count,
            workers: snapshot.workers.len(),
            excluded_workers: snapshot.workers.iter().filter(|w| w.excluded).count(),
            teams: snapshot.teams.len(),
            members: snapshot.members.len(),
            unmapped_workers: identity::find_unmapped_workers(&snapshot.workers, &snapshot.members)
                .len(),
            last_sync_at,
            last_job,
        })
    }

    // ── Metrics ────────────────────────────────────────────────────

    /// Calculator honouring the configured completion field.
    pub async fn calculator(&self) -> Result<EfficiencyCalculator> {
        let field = sync::load_completion_field(&self.db).await?;
        Ok(EfficiencyCalculator::default().with_completion_field(field))
    }

    pub async fn load_snapshot(&self) -> Result<Snapshot> {
        let mut snapshot = self
            .db
            .reader()
            .call(|conn| {
                Ok::<_, rusqlite::Error>(Snapshot {
                    projects: repository::list_projects(conn)?,
                    units: repository::list_units(conn)?,
                    workers: repository::list_workers(conn)?,
                    teams: repository::list_teams(conn)?,
                    members: repository::list_members(conn)?,
                })
            })
            .await?;
        snapshot.units = query::exclude_excluded_workers(&snapshot.units, &snapshot.workers);
        Ok(snapshot)
    }

    /// Per-project counts. With a filter active, projects left without
    /// units are omitted.
    pub async fn project_metrics(&self, query: &MetricsQuery) -> Result<Vec<ProjectMetrics>> {
        let snapshot = self.load_snapshot().await?;
        let units = query.units(&snapshot);
        Ok(project_rows(&snapshot, &units, query))
    }

    pub async fn worker_metrics(&self, query: &MetricsQuery) -> Result<Vec<WorkerMetrics>> {
        let snapshot = self.load_snapshot().await?;
        let calc = self.calculator().await?;
        let units = query.units(&snapshot);
        Ok(worker_rows(&calc, &snapshot, &units, query))
    }

    pub async fn member_metrics(&self, query: &MetricsQuery) -> Result<Vec<MemberMetrics>> {
        let snapshot = self.load_snapshot().await?;
        let calc = self.calculator().await?;
        let units = query.units(&snapshot);
        Ok(member_rows(&calc, &snapshot, &units, query))
    }

    pub async fn team_metrics(&self, query: &MetricsQuery) -> Result<Vec<TeamMetrics>> {
        let snapshot = self.load_snapshot().await?;
        let calc = self.calculator().await?;
        let units = query.units(&snapshot);
        let mut rows =
            metrics::compute_team_metrics(&calc, &snapshot.teams, &snapshot.members, &units);
        if let Some(team_id) = query.filter.team_id {
            rows.retain(|t| t.team_id == team_id);
        }
        Ok(rows)
    }

    /// Monthly statistics. The date range narrows the units, the member
    /// filter narrows the resulting rows.
    pub async fn monthly_stats(&self, query: &MetricsQuery) -> Result<MonthlyStats> {
        let snapshot = self.load_snapshot().await?;
        let calc = self.calculator().await?;
        let units = query.range.apply(&snapshot.units);
        let stats =
            metrics::compute_monthly_stats(&calc, &units, &snapshot.members, &snapshot.teams);
        Ok(query.filter.apply_monthly(stats))
    }

    pub async fn summary(&self, query: &MetricsQuery) -> Result<Summary> {
        let snapshot = self.load_snapshot().await?;
        let calc = self.calculator().await?;
        let units = query.units(&snapshot);
        Ok(metrics::compute_summary(
            &project_rows(&snapshot, &units, query),
            &member_rows(&calc, &snapshot, &units, query),
            &worker_rows(&calc, &snapshot, &units, query),
        ))
    }

    /// Estimation total of one epic, subtasks rolled up into parents.
    /// Units of excluded workers are left out, as in every other metric.
    pub async fn epic_estimation(&self, epic_key: &str) -> Result<f64> {
        let snapshot = self.load_snapshot().await?;
        if !snapshot.projects.iter().any(|p| p.key == epic_key) {
            return Err(Error::NotFound(format!("epic {epic_key}")));
        }
        Ok(estimation::compute_epic_estimation(
            snapshot.units.iter().filter(|u| u.epic_key == epic_key),
        ))
    }

    // ── Teams ──────────────────────────────────────────────────────

    pub async fn team_add(&self, name: &str) -> Result<i64> {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(Error::Other("team name must not be empty".into()));
        }
        let id = self
            .db
            .writer()
            .call(move |conn| repository::insert_team(conn, &name))
            .await?;
        Ok(id)
    }

    pub async fn team_list(&self) -> Result<Vec<Team>> {
        let teams = self.db.reader().call(|conn| repository::list_teams(conn)).await?;
        Ok(teams)
    }

    /// Resolve a team by numeric id or by name.
    pub async fn team_find(&self, identifier: &str) -> Result<Team> {
        let teams = self.team_list().await?;
        let found = match identifier.parse::<i64>() {
            Ok(id) => teams.into_iter().find(|t| t.id == id),
            Err(_) => teams.into_iter().find(|t| t.name == identifier),
        };
        found.ok_or_else(|| Error::NotFound(format!("team {identifier}")))
    }

    /// Delete a team. Its members stay, without a team.
    pub async fn team_remove(&self, identifier: &str) -> Result<bool> {
        let team = self.team_find(identifier).await?;
        let removed = self
            .db
            .writer()
            .call(move |conn| repository::delete_team(conn, team.id))
            .await?;
        Ok(removed)
    }

    // ── Members ────────────────────────────────────────────────────

    /// Add or replace a member, refusing an account id another member holds.
    pub async fn member_add(&self, member: Member) -> Result<()> {
        let members = self.member_list().await?;
        if let Some(account_id) = member.jira_account_id.as_deref() {
            identity::check_link(&members, &member.email, account_id)?;
        }
        self.db
            .writer()
            .call(move |conn| repository::upsert_member(conn, &member))
            .await?;
        Ok(())
    }

    pub async fn member_list(&self) -> Result<Vec<Member>> {
        let members = self.db.reader().call(|conn| repository::list_members(conn)).await?;
        Ok(members)
    }

    /// Link a member to an account id, or unlink it with `None`.
    pub async fn member_link(&self, email: &str, account_id: Option<&str>) -> Result<()> {
        let members = self.member_list().await?;
        if !members.iter().any(|m| m.email.eq_ignore_ascii_case(email)) {
            return Err(Error::NotFound(format!("member {email}")));
        }
        if let Some(account_id) = account_id {
            identity::check_link(&members, email, account_id)?;
        }

        let email = email.to_string();
        let account_id = account_id.map(str::to_string);
        self.db
            .writer()
            .call(move |conn| repository::link_member_account(conn, &email, account_id.as_deref()))
            .await?;
        Ok(())
    }

    pub async fn member_remove(&self, email: &str) -> Result<bool> {
        let email = email.to_string();
        let removed = self
            .db
            .writer()
            .call(move |conn| repository::delete_member(conn, &email))
            .await?;
        Ok(removed)
    }

    // ── Workers ────────────────────────────────────────────────────

    pub async fn workers_unmapped(&self) -> Result<Vec<UnmappedWorker>> {
        let snapshot = self.load_snapshot().await?;
        Ok(identity::find_unmapped_workers(&snapshot.workers, &snapshot.members))
    }

    pub async fn workers_excluded(&self) -> Result<Vec<UnmappedWorker>> {
        let workers = self.db.reader().call(|conn| repository::list_workers(conn)).await?;
        Ok(identity::find_excluded_workers(&workers))
    }

    /// Exclude a worker from (or restore it to) every aggregation.
    pub async fn worker_set_excluded(&self, account_id: &str, excluded: bool) -> Result<()> {
        let id = account_id.to_string();
        let updated = self
            .db
            .writer()
            .call(move |conn| repository::set_worker_excluded(conn, &id, excluded))
            .await?;
        if !updated {
            return Err(Error::NotFound(format!("worker {account_id}")));
        }
        Ok(())
    }

    /// Create a member for an unmapped worker.
    pub async fn worker_register(
        &self,
        account_id: &str,
        nickname: &str,
        team_id: Option<i64>,
    ) -> Result<Member> {
        let unmapped = self.workers_unmapped().await?;
        let worker = unmapped
            .iter()
            .find(|w| w.account_id == account_id)
            .ok_or_else(|| Error::NotFound(format!("unmapped worker {account_id}")))?;

        let nickname = if nickname.is_empty() {
            worker.display_name.as_str()
        } else {
            nickname
        };
        let member = identity::member_from_worker(worker, nickname, team_id);
        self.member_add(member.clone()).await?;
        Ok(member)
    }

    // ── Config ─────────────────────────────────────────────────────

    pub async fn config_get(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        let value = self
            .db
            .reader()
            .call(move |conn| repository::get_config(conn, &key))
            .await?;
        Ok(value)
    }

    /// Store a config value. Enumerated keys are checked first.
    pub async fn config_set(&self, key: &str, value: &str) -> Result<()> {
        match key {
            "estimation_type" => {
                EstimationType::parse(value)?;
            }
            "completion_field" => {
                CompletionField::parse(value)?;
            }
            _ => {}
        }
        let key = key.to_string();
        let value = value.trim().to_string();
        self.db
            .writer()
            .call(move |conn| repository::set_config(conn, &key, &value))
            .await?;
        Ok(())
    }

    pub async fn config_list(&self) -> Result<Vec<(String, String)>> {
        let entries = self.db.reader().call(|conn| repository::list_config(conn)).await?;
        Ok(entries)
    }
}

fn project_rows(snapshot: &Snapshot, units: &[Unit], query: &MetricsQuery) -> Vec<ProjectMetrics> {
    snapshot
        .projects
        .iter()
        .map(|p| metrics::compute_project_metrics(p, units))
        .filter(|m| query.is_unfiltered() || m.total_issues > 0)
        .collect()
}

fn worker_rows(
    calc: &EfficiencyCalculator,
    snapshot: &Snapshot,
    units: &[Unit],
    query: &MetricsQuery,
) -> Vec<WorkerMetrics> {
    let mut rows = metrics::compute_worker_metrics(calc, &snapshot.workers, units);
    if !query.filter.is_empty() {
        let active: std::collections::HashSet<&str> =
            units.iter().filter_map(|u| u.assignee_id.as_deref()).collect();
        rows.retain(|w| active.contains(w.account_id.as_str()));
    }
    rows
}

fn member_rows(
    calc: &EfficiencyCalculator,
    snapshot: &Snapshot,
    units: &[Unit],
    query: &MetricsQuery,
) -> Vec<MemberMetrics> {
    let mut rows = metrics::compute_member_metrics(calc, &snapshot.members, &snapshot.teams, units);
    if let Some(id) = query.filter.member_account_id.as_deref() {
        rows.retain(|m| m.account_id == id);
    } else if let Some(team_id) = query.filter.team_id {
        rows.retain(|m| m.team_id == Some(team_id));
    }
    rows
}
