//! Month-by-month statistics of completed work.
//!
//! Only done units with a completion date are considered, bucketed by the
//! `YYYY-MM` of that date. The calculator's completion field decides which
//! date that is, so monthly rows agree with the other composers. Team and
//! total rows sum
//! the person rows' counts and estimations, but their OTDR and AOD are
//! recomputed from the underlying units: ratios do not average.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::date_util::month_key;
use crate::efficiency::EfficiencyCalculator;
use crate::estimation::{compute_person_completed_counts_by, compute_person_estimations};
use crate::identity::IdentityMap;
use crate::model::{Member, Team, Unit};

use super::types::{MonthlyPersonStat, MonthlyStats, MonthlyTeamStat, MonthlyTotalStat};

pub fn compute_monthly_stats(
    calc: &EfficiencyCalculator,
    units: &[Unit],
    members: &[Member],
    teams: &[Team],
) -> MonthlyStats {
    let identities = IdentityMap::lenient(members);
    let teams_by_id: HashMap<i64, &Team> = teams.iter().map(|t| (t.id, t)).collect();

    let mut by_month: BTreeMap<String, Vec<&Unit>> = BTreeMap::new();
    for unit in units.iter().filter(|u| u.is_done()) {
        if let Some(day) = calc.completion_day(unit) {
            by_month.entry(month_key(day)).or_default().push(unit);
        }
    }

    let mut stats = MonthlyStats::default();

    for (month, month_units) in &by_month {
        let counts = compute_person_completed_counts_by(month_units.iter().copied(), |u| {
            calc.completion_day(u)
        });
        let estimations = compute_person_estimations(month_units.iter().copied());

        let mut by_assignee: BTreeMap<&str, Vec<&Unit>> = BTreeMap::new();
        for &unit in month_units {
            if let Some(id) = unit.assignee_id.as_deref() {
                by_assignee.entry(id).or_default().push(unit);
            }
        }

        let account_ids: BTreeSet<&str> = counts
            .keys()
            .map(String::as_str)
            .chain(estimations.keys().map(String::as_str))
            .chain(by_assignee.keys().copied())
            .collect();

        let mut team_rows: BTreeMap<i64, MonthlyTeamStat> = BTreeMap::new();
        let mut total = MonthlyTotalStat {
            month: month.clone(),
            ..Default::default()
        };

        for account_id in account_ids {
            let completed_count = counts.get(account_id).copied().unwrap_or(0);
            let estimation_total = estimations.get(account_id).copied().unwrap_or(0.0);
            let assigned = by_assignee.get(account_id).map(Vec::as_slice).unwrap_or_default();
            let eff = calc.calculate(assigned.iter().copied());

            let member = identities.member(account_id);
            let display_name = member
                .map(|m| m.nickname.clone())
                .or_else(|| assigned.iter().find_map(|u| u.assignee_name.clone()))
                .unwrap_or_else(|| account_id.to_string());
            let team = member
                .and_then(|m| m.team_id)
                .and_then(|id| teams_by_id.get(&id).copied());

            if let Some(team) = team {
                let row = team_rows.entry(team.id).or_insert_with(|| MonthlyTeamStat {
                    month: month.clone(),
                    team_id: team.id,
                    team_name: team.name.clone(),
                    ..Default::default()
                });
                row.completed_count += completed_count;
                row.estimation_total += estimation_total;
            }

            total.completed_count += completed_count;
            total.estimation_total += estimation_total;

            stats.person_stats.push(MonthlyPersonStat {
                month: month.clone(),
                account_id: account_id.to_string(),
                display_name,
                team_id: team.map(|t| t.id),
                team_name: team.map(|t| t.name.clone()),
                completed_count,
                estimation_total,
                otdr: eff.otdr,
                aod: eff.aod,
            });
        }

        for row in team_rows.values_mut() {
            let account_ids = identities.team_account_ids(row.team_id);
            let eff = calc.calculate(month_units.iter().copied().filter(|u| {
                u.assignee_id
                    .as_deref()
                    .is_some_and(|id| account_ids.contains(id))
            }));
            row.otdr = eff.otdr;
            row.aod = eff.aod;
        }
        stats.team_stats.extend(team_rows.into_values());

        let eff = calc.calculate(month_units.iter().copied());
        total.otdr = eff.otdr;
        total.aod = eff.aod;
        stats.total_stats.push(total);
    }

    log::debug!(
        "monthly stats: {} months, {} person rows, {} team rows",
        stats.total_stats.len(),
        stats.person_stats.len(),
        stats.team_stats.len()
    );
    stats
}
