//! Value records the analytics core reads. Callers own the backing
//! collections and pass snapshots in; nothing here is mutated by the core.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::date_util::parse_date;

/// JIRA status category of an issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusCategory {
    New,
    Indeterminate,
    Done,
}

impl StatusCategory {
    /// Map a JIRA `statusCategory.key`. JIRA also reports `undefined` for
    /// statuses outside any category; those count as not started.
    pub fn from_key(key: &str) -> Self {
        match key {
            "done" => StatusCategory::Done,
            "indeterminate" => StatusCategory::Indeterminate,
            _ => StatusCategory::New,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StatusCategory::New => "new",
            StatusCategory::Indeterminate => "indeterminate",
            StatusCategory::Done => "done",
        }
    }
}

/// An atomic work item mirrored from JIRA.
///
/// Dates are kept as the `YYYY-MM-DD` strings the source supplied so an
/// unparsable value can be told apart from an absent one; the accessor
/// methods return parsed dates and treat both cases as `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    pub key: String,
    /// Key of the epic this unit belongs to.
    pub epic_key: String,
    pub summary: String,
    pub status: String,
    pub status_category: StatusCategory,
    pub issue_type: String,
    pub priority: Option<String>,
    pub assignee_id: Option<String>,
    pub assignee_name: Option<String>,
    pub start_date: Option<String>,
    pub due_date: Option<String>,
    pub end_date: Option<String>,
    /// Legacy completion timestamp (JIRA `resolutiondate`).
    pub resolution_date: Option<String>,
    /// Story points, or an estimate converted to hours.
    pub estimation: Option<f64>,
    pub parent_key: Option<String>,
    pub is_subtask: bool,
}

impl Unit {
    pub fn is_done(&self) -> bool {
        self.status_category == StatusCategory::Done
    }

    pub fn start_day(&self) -> Option<NaiveDate> {
        self.start_date.as_deref().and_then(parse_date)
    }

    pub fn end_day(&self) -> Option<NaiveDate> {
        self.end_date.as_deref().and_then(parse_date)
    }

    /// Done with a usable end date: the canonical "completed" test.
    pub fn is_completed(&self) -> bool {
        self.is_done() && self.end_day().is_some()
    }

    pub fn has_due_date(&self) -> bool {
        self.due_date.as_deref().is_some_and(|d| !d.trim().is_empty())
    }
}

/// An epic mirrored from JIRA; units reference it through `epic_key`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub key: String,
    pub name: String,
    pub description: Option<String>,
    pub status: String,
    pub total_units: u64,
    pub completed_units: u64,
    pub lead_account_id: Option<String>,
    pub last_synced_at: String,
}

/// A JIRA actor seen as an assignee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Worker {
    pub account_id: String,
    pub display_name: String,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    pub active: bool,
    /// Suppresses the worker's units from every aggregation.
    pub excluded: bool,
    pub last_synced_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: i64,
    pub name: String,
}

/// A locally curated person, optionally linked to one JIRA actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub email: String,
    pub nickname: String,
    pub team_id: Option<i64>,
    pub jira_account_id: Option<String>,
}

/// A recorded change of a unit's due date between two imports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DueDateChange {
    pub unit_key: String,
    /// Empty when the unit had no due date before.
    pub previous_due_date: String,
    /// Empty when the due date was removed.
    pub new_due_date: String,
    pub detected_at: String,
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// A done task in `EPIC-1` with every optional field empty.
    pub fn unit(key: &str) -> Unit {
        Unit {
            key: key.to_string(),
            epic_key: "EPIC-1".to_string(),
            summary: "test".to_string(),
            status: "Done".to_string(),
            status_category: StatusCategory::Done,
            issue_type: "Task".to_string(),
            priority: None,
            assignee_id: None,
            assignee_name: None,
            start_date: None,
            due_date: None,
            end_date: None,
            resolution_date: None,
            estimation: None,
            parent_key: None,
            is_subtask: false,
        }
    }

    pub fn subtask(key: &str, parent: &str) -> Unit {
        Unit {
            parent_key: Some(parent.to_string()),
            is_subtask: true,
            issue_type: "Sub-task".to_string(),
            ..unit(key)
        }
    }

    pub fn member(email: &str, account_id: &str, team_id: Option<i64>) -> Member {
        Member {
            email: email.to_string(),
            nickname: email.split('@').next().unwrap_or(email).to_string(),
            team_id,
            jira_account_id: Some(account_id.to_string()),
        }
    }

    pub fn worker(account_id: &str) -> Worker {
        Worker {
            account_id: account_id.to_string(),
            display_name: account_id.to_uppercase(),
            email: None,
            avatar_url: None,
            active: true,
            excluded: false,
            last_synced_at: "2025-01-01T00:00:00+09:00".to_string(),
        }
    }

    pub trait UnitExt {
        fn assignee(self, id: &str) -> Self;
        fn points(self, v: f64) -> Self;
        fn ended(self, d: &str) -> Self;
        fn due(self, d: &str) -> Self;
        fn started(self, d: &str) -> Self;
        fn category(self, s: StatusCategory) -> Self;
    }

    impl UnitExt for Unit {
        fn assignee(mut self, id: &str) -> Self {
            self.assignee_id = Some(id.to_string());
            self
        }
        fn points(mut self, v: f64) -> Self {
            self.estimation = Some(v);
            self
        }
        fn ended(mut self, d: &str) -> Self {
            self.end_date = Some(d.to_string());
            self
        }
        fn due(mut self, d: &str) -> Self {
            self.due_date = Some(d.to_string());
            self
        }
        fn started(mut self, d: &str) -> Self {
            self.start_date = Some(d.to_string());
            self
        }
        fn category(mut self, s: StatusCategory) -> Self {
            self.status_category = s;
            self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_status_category_from_key() {
        assert_eq!(StatusCategory::from_key("done"), StatusCategory::Done);
        assert_eq!(StatusCategory::from_key("indeterminate"), StatusCategory::Indeterminate);
        assert_eq!(StatusCategory::from_key("new"), StatusCategory::New);
        assert_eq!(StatusCategory::from_key("undefined"), StatusCategory::New);
    }

    #[test]
    fn test_is_completed_requires_parsable_end_date() {
        assert!(!unit("T-1").is_completed());
        assert!(unit("T-1").ended("2025-01-10").is_completed());
        assert!(!unit("T-1").ended("2025-13-10").is_completed());
        assert!(!unit("T-1")
            .ended("2025-01-10")
            .category(StatusCategory::Indeterminate)
            .is_completed());
    }

    #[test]
    fn test_has_due_date_ignores_blank() {
        assert!(!unit("T-1").due("  ").has_due_date());
        assert!(unit("T-1").due("2025-01-10").has_due_date());
    }

    #[test]
    fn test_status_category_serde() {
        let json = serde_json::to_string(&StatusCategory::Indeterminate).unwrap();
        assert_eq!(json, "\"indeterminate\"");
    }
}
