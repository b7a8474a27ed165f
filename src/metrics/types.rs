use serde::Serialize;

/// Progress of one project (epic).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProjectMetrics {
    pub project_key: String,
    pub project_name: String,
    pub total_issues: u64,
    pub todo_count: u64,
    pub in_progress_count: u64,
    pub done_count: u64,
    /// Rounded percentage of done units, 0 to 100.
    pub progress_percent: u8,
    /// Epic estimation total with subtask rollup applied.
    pub estimation_total: f64,
}

/// Delivery efficiency of one JIRA actor.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WorkerMetrics {
    pub account_id: String,
    pub display_name: String,
    pub total_assigned: u64,
    pub total_resolved: u64,
    pub otdr: f64,
    pub aod: f64,
    pub rank: usize,
}

/// Delivery efficiency of one member linked to a JIRA actor.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MemberMetrics {
    pub email: String,
    pub nickname: String,
    pub account_id: String,
    pub team_id: Option<i64>,
    pub team_name: Option<String>,
    pub total_assigned: u64,
    pub total_resolved: u64,
    pub otdr: f64,
    pub aod: f64,
    pub rank: usize,
}

/// Delivery efficiency of a team, computed over its members' units.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TeamMetrics {
    pub team_id: i64,
    pub team_name: String,
    /// Members of the team linked to a JIRA actor.
    pub member_count: u64,
    pub total_assigned: u64,
    pub total_resolved: u64,
    pub otdr: f64,
    pub aod: f64,
    pub rank: usize,
}

/// Headline figures for the dashboard.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Summary {
    pub total_projects: u64,
    pub total_issues: u64,
    /// Mean OTDR over the ranked actors (members, else workers).
    pub avg_otdr: f64,
    pub avg_aod: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MonthlyPersonStat {
    /// `YYYY-MM`.
    pub month: String,
    pub account_id: String,
    pub display_name: String,
    pub team_id: Option<i64>,
    pub team_name: Option<String>,
    pub completed_count: u64,
    pub estimation_total: f64,
    pub otdr: f64,
    pub aod: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MonthlyTeamStat {
    pub month: String,
    pub team_id: i64,
    pub team_name: String,
    pub completed_count: u64,
    pub estimation_total: f64,
    pub otdr: f64,
    pub aod: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MonthlyTotalStat {
    pub month: String,
    pub completed_count: u64,
    pub estimation_total: f64,
    pub otdr: f64,
    pub aod: f64,
}

/// Month-by-month breakdown of completed work.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MonthlyStats {
    /// Sorted by (month, account id).
    pub person_stats: Vec<MonthlyPersonStat>,
    /// Sorted by (month, team id).
    pub team_stats: Vec<MonthlyTeamStat>,
    /// Sorted by month.
    pub total_stats: Vec<MonthlyTotalStat>,
}

impl MonthlyStats {
    /// Months present in the totals, ascending.
    pub fn months(&self) -> Vec<&str> {
        self.total_stats.iter().map(|t| t.month.as_str()).collect()
    }
}
