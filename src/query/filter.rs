//! Narrowing of the unit set before aggregation, and of monthly rows after.

use std::collections::HashSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::date_util::{parse_date, today_kst};
use crate::error::{Error, Result};
use crate::identity::IdentityMap;
use crate::metrics::MonthlyStats;
use crate::model::{Member, Unit, Worker};

use super::period::Period;

/// Inclusive calendar range. An open end means today; an open start means
/// unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self { start, end }
    }

    pub fn from_period(period: &Period) -> Result<Self> {
        let (start, end) = period.date_range()?;
        Ok(Self::new(Some(start), Some(end)))
    }

    /// Build a range from optional `YYYY-MM-DD` bounds.
    pub fn parse(start: Option<&str>, end: Option<&str>) -> Result<Self> {
        let day = |s: &str| {
            parse_date(s).ok_or_else(|| Error::InvalidDate(format!("{s} (expected YYYY-MM-DD)")))
        };
        let range = Self::new(start.map(day).transpose()?, end.map(day).transpose()?);
        if let (Some(start), Some(end)) = (range.start, range.end) {
            if start > end {
                return Err(Error::InvalidDate(format!("range start {start} is after end {end}")));
            }
        }
        Ok(range)
    }

    pub fn is_open(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    /// Whether the unit was active inside the range. A unit is active from
    /// its start date (else its end date) through its end date (else
    /// today). Units with neither date never match a bounded range.
    pub fn contains(&self, unit: &Unit, today: NaiveDate) -> bool {
        if self.is_open() {
            return true;
        }
        let Some(active_from) = unit.start_day().or_else(|| unit.end_day()) else {
            return false;
        };
        let active_to = unit.end_day().unwrap_or(today);

        let range_end = self.end.unwrap_or(today);
        active_from <= range_end && self.start.is_none_or(|start| active_to >= start)
    }

    pub fn apply(&self, units: &[Unit]) -> Vec<Unit> {
        let today = today_kst();
        units
            .iter()
            .filter(|u| self.contains(u, today))
            .cloned()
            .collect()
    }
}

/// Restrict results to one team or one JIRA actor. A member filter wins
/// over a team filter when both are set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberFilter {
    pub team_id: Option<i64>,
    pub member_account_id: Option<String>,
}

impl MemberFilter {
    pub fn is_empty(&self) -> bool {
        self.team_id.is_none() && self.member_account_id.is_none()
    }

    /// Actor ids the filter admits, or `None` for no restriction.
    fn account_ids<'a>(&'a self, members: &'a [Member]) -> Option<HashSet<&'a str>> {
        if let Some(id) = self.member_account_id.as_deref() {
            return Some(HashSet::from([id]));
        }
        let team_id = self.team_id?;
        Some(IdentityMap::lenient(members).team_account_ids(team_id))
    }

    pub fn apply(&self, units: &[Unit], members: &[Member]) -> Vec<Unit> {
        let Some(ids) = self.account_ids(members) else {
            return units.to_vec();
        };
        units
            .iter()
            .filter(|u| u.assignee_id.as_deref().is_some_and(|id| ids.contains(id)))
            .cloned()
            .collect()
    }

    /// Narrow monthly rows: a member filter keeps that person's rows only;
    /// a team filter keeps the team's person and team rows. Totals are
    /// dropped whenever a filter is active.
    pub fn apply_monthly(&self, stats: MonthlyStats) -> MonthlyStats {
        if let Some(id) = self.member_account_id.as_deref() {
            return MonthlyStats {
                person_stats: stats
                    .person_stats
                    .into_iter()
                    .filter(|p| p.account_id == id)
                    .collect(),
                ..Default::default()
            };
        }
        match self.team_id {
            Some(team_id) => MonthlyStats {
                person_stats: stats
                    .person_stats
                    .into_iter()
                    .filter(|p| p.team_id == Some(team_id))
                    .collect(),
                team_stats: stats
                    .team_stats
                    .into_iter()
                    .filter(|t| t.team_id == team_id)
                    .collect(),
                total_stats: Vec::new(),
            },
            None => stats,
        }
    }
}

/// Drop units assigned to excluded workers.
pub fn exclude_excluded_workers(units: &[Unit], workers: &[Worker]) -> Vec<Unit> {
    let excluded: HashSet<&str> = workers
        .iter()
        .filter(|w| w.excluded)
        .map(|w| w.account_id.as_str())
        .collect();
    if excluded.is_empty() {
        return units.to_vec();
    }
    units
        .iter()
        .filter(|u| {
            !u.assignee_id
                .as_deref()
                .is_some_and(|id| excluded.contains(id))
        })
        .cloned()
        .collect()
}
