use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::date_util::{parse_date, to_kst};
use crate::error::{Error, Result};
use crate::model::{Project, StatusCategory, Unit, Worker};

use super::{JiraIssue, JiraIssueFields, JiraUser};

pub const DEFAULT_START_DATE_FIELD: &str = "customfield_10917";
pub const DEFAULT_END_DATE_FIELD: &str = "customfield_10918";

/// Where a unit's estimation value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimationType {
    /// A numeric custom field, used as is.
    StoryPoints,
    /// Seconds, from a custom field or `timetracking`, converted to hours.
    Estimate,
    #[default]
    None,
}

impl EstimationType {
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim() {
            "story_points" | "storyPoint" => Ok(EstimationType::StoryPoints),
            "estimate" => Ok(EstimationType::Estimate),
            "none" | "" => Ok(EstimationType::None),
            other => Err(Error::Config(format!(
                "unknown estimation_type '{other}' (expected story_points, estimate or none)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EstimationConfig {
    pub kind: EstimationType,
    pub field_id: Option<String>,
}

/// Site-specific field choices for turning issues into units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapperConfig {
    pub estimation: EstimationConfig,
    pub start_date_field: String,
    pub end_date_field: String,
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            estimation: EstimationConfig::default(),
            start_date_field: DEFAULT_START_DATE_FIELD.to_string(),
            end_date_field: DEFAULT_END_DATE_FIELD.to_string(),
        }
    }
}

pub fn map_epic_to_project(issue: &JiraIssue, synced_at: &str) -> Project {
    let fields = &issue.fields;
    Project {
        key: issue.key.clone(),
        name: fields.summary.clone(),
        description: fields
            .description
            .as_ref()
            .and_then(Value::as_str)
            .map(str::to_string),
        status: fields.status.name.clone(),
        total_units: 0,
        completed_units: 0,
        lead_account_id: fields.assignee.as_ref().and_then(actor_id),
        last_synced_at: synced_at.to_string(),
    }
}

pub fn map_issue_to_unit(issue: &JiraIssue, epic_key: &str, config: &MapperConfig) -> Unit {
    let fields = &issue.fields;
    let is_subtask = fields.issuetype.subtask;

    Unit {
        key: issue.key.clone(),
        epic_key: epic_key.to_string(),
        summary: fields.summary.clone(),
        status: fields.status.name.clone(),
        status_category: StatusCategory::from_key(&fields.status.status_category.key),
        issue_type: fields.issuetype.name.clone(),
        priority: fields.priority.as_ref().map(|p| p.name.clone()),
        assignee_id: fields.assignee.as_ref().and_then(actor_id),
        assignee_name: fields.assignee.as_ref().map(|a| a.display_name.clone()),
        start_date: date_field(fields.custom(&config.start_date_field)),
        due_date: fields.duedate.as_deref().and_then(normalize_date),
        end_date: date_field(fields.custom(&config.end_date_field)),
        resolution_date: fields.resolutiondate.clone(),
        estimation: estimation(fields, &config.estimation),
        parent_key: if is_subtask {
            fields.parent.as_ref().map(|p| p.key.clone())
        } else {
            None
        },
        is_subtask,
    }
}

/// The assignee as a worker, if the issue has one with a usable id.
pub fn extract_worker(issue: &JiraIssue, synced_at: &str) -> Option<Worker> {
    let assignee = issue.fields.assignee.as_ref()?;
    Some(Worker {
        account_id: actor_id(assignee)?,
        display_name: assignee.display_name.clone(),
        email: assignee.email_address.clone(),
        avatar_url: assignee.avatar_urls.get("48x48").cloned(),
        active: assignee.active,
        excluded: false,
        last_synced_at: synced_at.to_string(),
    })
}

/// `accountId`, then `name`, then `key`.
fn actor_id(user: &JiraUser) -> Option<String> {
    [&user.account_id, &user.name, &user.key]
        .into_iter()
        .flatten()
        .find(|s| !s.is_empty())
        .cloned()
}

fn estimation(fields: &JiraIssueFields, config: &EstimationConfig) -> Option<f64> {
    let field = config.field_id.as_deref().and_then(|id| fields.custom(id));
    match config.kind {
        EstimationType::None => None,
        EstimationType::StoryPoints => field.and_then(Value::as_f64),
        EstimationType::Estimate => match config.field_id {
            Some(_) => field.and_then(Value::as_f64).map(|s| s / 3600.0),
            None => fields
                .custom("timetracking")
                .and_then(|tt| tt.get("originalEstimateSeconds"))
                .and_then(Value::as_f64)
                .filter(|s| *s > 0.0)
                .map(|s| s / 3600.0),
        },
    }
}

fn date_field(value: Option<&Value>) -> Option<String> {
    value.and_then(Value::as_str).and_then(normalize_date)
}

/// Reduce a date or timestamp to `YYYY-MM-DD` in KST. Strings that are
/// neither are kept verbatim so they read as unparsable downstream.
fn normalize_date(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if parse_date(raw).is_some() {
        return Some(raw.to_string());
    }
    match to_kst(raw) {
        Some(ts) => Some(ts.date_naive().format("%Y-%m-%d").to_string()),
        None => {
            log::debug!("keeping unparsable date value {raw:?}");
            Some(raw.to_string())
        }
    }
}
