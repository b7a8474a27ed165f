pub mod monthly;
pub mod types;

pub use monthly::compute_monthly_stats;
pub use types::*;

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::efficiency::EfficiencyCalculator;
use crate::estimation::compute_epic_estimation;
use crate::identity::IdentityMap;
use crate::model::{Member, Project, StatusCategory, Team, Unit, Worker};

/// Count a project's units by status category. Units of other epics are
/// ignored, so the full unit set can be passed in.
pub fn compute_project_metrics(project: &Project, units: &[Unit]) -> ProjectMetrics {
    let units: Vec<&Unit> = units.iter().filter(|u| u.epic_key == project.key).collect();

    let count = |cat: StatusCategory| units.iter().filter(|u| u.status_category == cat).count() as u64;
    let todo_count = count(StatusCategory::New);
    let in_progress_count = count(StatusCategory::Indeterminate);
    let done_count = count(StatusCategory::Done);
    let total_issues = units.len() as u64;

    let progress_percent = if total_issues > 0 {
        (done_count as f64 / total_issues as f64 * 100.0).round() as u8
    } else {
        0
    };

    ProjectMetrics {
        project_key: project.key.clone(),
        project_name: project.name.clone(),
        total_issues,
        todo_count,
        in_progress_count,
        done_count,
        progress_percent,
        estimation_total: compute_epic_estimation(units.iter().copied()),
    }
}

/// Efficiency of every non-excluded worker, ranked.
pub fn compute_worker_metrics(
    calc: &EfficiencyCalculator,
    workers: &[Worker],
    units: &[Unit],
) -> Vec<WorkerMetrics> {
    let by_assignee = group_by_assignee(units);

    let mut results: Vec<WorkerMetrics> = workers
        .iter()
        .filter(|w| !w.excluded)
        .map(|worker| {
            let assigned = by_assignee
                .get(worker.account_id.as_str())
                .map(Vec::as_slice)
                .unwrap_or_default();
            let eff = calc.calculate(assigned.iter().copied());
            WorkerMetrics {
                account_id: worker.account_id.clone(),
                display_name: worker.display_name.clone(),
                total_assigned: assigned.len() as u64,
                total_resolved: eff.total_resolved,
                otdr: eff.otdr,
                aod: eff.aod,
                rank: 0,
            }
        })
        .collect();

    rank(&mut results);
    results
}

/// Efficiency of every member linked to a JIRA actor, ranked. A member
/// whose actor id is already claimed by an earlier member gets no row.
pub fn compute_member_metrics(
    calc: &EfficiencyCalculator,
    members: &[Member],
    teams: &[Team],
    units: &[Unit],
) -> Vec<MemberMetrics> {
    let identities = IdentityMap::lenient(members);
    let team_names: HashMap<i64, &str> = teams.iter().map(|t| (t.id, t.name.as_str())).collect();
    let by_assignee = group_by_assignee(units);

    let mut results: Vec<MemberMetrics> = members
        .iter()
        .filter(|m| identities.is_canonical(m))
        .filter_map(|member| {
            let account_id = member.jira_account_id.as_deref()?;
            let assigned = by_assignee
                .get(account_id)
                .map(Vec::as_slice)
                .unwrap_or_default();
            let eff = calc.calculate(assigned.iter().copied());
            Some(MemberMetrics {
                email: member.email.clone(),
                nickname: member.nickname.clone(),
                account_id: account_id.to_string(),
                team_id: member.team_id,
                team_name: member
                    .team_id
                    .and_then(|id| team_names.get(&id))
                    .map(|n| n.to_string()),
                total_assigned: assigned.len() as u64,
                total_resolved: eff.total_resolved,
                otdr: eff.otdr,
                aod: eff.aod,
                rank: 0,
            })
        })
        .collect();

    rank(&mut results);
    results
}

/// Efficiency of every team over the units of its linked members, ranked.
/// Teams without members are reported with zero figures.
pub fn compute_team_metrics(
    calc: &EfficiencyCalculator,
    teams: &[Team],
    members: &[Member],
    units: &[Unit],
) -> Vec<TeamMetrics> {
    let identities = IdentityMap::lenient(members);

    let mut results: Vec<TeamMetrics> = teams
        .iter()
        .map(|team| {
            let account_ids = identities.team_account_ids(team.id);
            let team_units: Vec<&Unit> = units
                .iter()
                .filter(|u| {
                    u.assignee_id
                        .as_deref()
                        .is_some_and(|id| account_ids.contains(id))
                })
                .collect();
            let eff = calc.calculate(team_units.iter().copied());
            TeamMetrics {
                team_id: team.id,
                team_name: team.name.clone(),
                member_count: account_ids.len() as u64,
                total_assigned: team_units.len() as u64,
                total_resolved: eff.total_resolved,
                otdr: eff.otdr,
                aod: eff.aod,
                rank: 0,
            }
        })
        .collect();

    rank(&mut results);
    results
}

/// Dashboard headline. Averages are over member rows, or worker rows
/// when no member is linked.
pub fn compute_summary(
    projects: &[ProjectMetrics],
    members: &[MemberMetrics],
    workers: &[WorkerMetrics],
) -> Summary {
    let ratios: Vec<(f64, f64)> = if members.is_empty() {
        workers.iter().map(|w| (w.otdr, w.aod)).collect()
    } else {
        members.iter().map(|m| (m.otdr, m.aod)).collect()
    };

    let (avg_otdr, avg_aod) = if ratios.is_empty() {
        (0.0, 0.0)
    } else {
        let n = ratios.len() as f64;
        (
            ratios.iter().map(|r| r.0).sum::<f64>() / n,
            ratios.iter().map(|r| r.1).sum::<f64>() / n,
        )
    };

    Summary {
        total_projects: projects.len() as u64,
        total_issues: projects.iter().map(|p| p.total_issues).sum(),
        avg_otdr,
        avg_aod,
    }
}

// ── Ranking ─────────────────────────────────────────────────────

/// A row that takes part in OTDR/AOD ranking.
pub trait Ranked {
    fn otdr(&self) -> f64;
    fn aod(&self) -> f64;
    fn set_rank(&mut self, rank: usize);
}

macro_rules! impl_ranked {
    ($($t:ty),*) => {$(
        impl Ranked for $t {
            fn otdr(&self) -> f64 { self.otdr }
            fn aod(&self) -> f64 { self.aod }
            fn set_rank(&mut self, rank: usize) { self.rank = rank; }
        }
    )*};
}

impl_ranked!(WorkerMetrics, MemberMetrics, TeamMetrics);

/// Higher OTDR first; on a tie, lower AOD first.
fn compare<T: Ranked>(a: &T, b: &T) -> Ordering {
    b.otdr()
        .total_cmp(&a.otdr())
        .then_with(|| a.aod().total_cmp(&b.aod()))
}

/// Sort rows best-first and assign 1-based ranks. The sort is stable, so
/// fully tied rows keep their input order.
pub fn rank<T: Ranked>(rows: &mut [T]) {
    rows.sort_by(compare);
    for (i, row) in rows.iter_mut().enumerate() {
        row.set_rank(i + 1);
    }
}

fn group_by_assignee(units: &[Unit]) -> HashMap<&str, Vec<&Unit>> {
    let mut map: HashMap<&str, Vec<&Unit>> = HashMap::new();
    for unit in units {
        if let Some(id) = unit.assignee_id.as_deref() {
            map.entry(id).or_default().push(unit);
        }
    }
    map
}
