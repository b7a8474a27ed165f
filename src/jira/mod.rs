//! JIRA REST payloads, as returned by `/rest/api/2/search`, and the
//! export file the importer reads.

pub mod mapper;

pub use mapper::{
    extract_worker, map_epic_to_project, map_issue_to_unit, EstimationConfig, EstimationType,
    MapperConfig,
};

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JiraSearchResponse {
    #[serde(default)]
    pub start_at: u64,
    #[serde(default)]
    pub max_results: u64,
    #[serde(default)]
    pub total: u64,
    pub issues: Vec<JiraIssue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JiraIssue {
    #[serde(default)]
    pub id: String,
    pub key: String,
    pub fields: JiraIssueFields,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JiraIssueFields {
    #[serde(default)]
    pub summary: String,
    /// Plain text on Server; a document object on Cloud.
    #[serde(default)]
    pub description: Option<Value>,
    pub status: JiraStatus,
    pub issuetype: JiraIssueType,
    #[serde(default)]
    pub assignee: Option<JiraUser>,
    #[serde(default)]
    pub duedate: Option<String>,
    #[serde(default)]
    pub resolutiondate: Option<String>,
    #[serde(default)]
    pub priority: Option<JiraNamed>,
    #[serde(default)]
    pub parent: Option<JiraParent>,
    /// Everything else, custom fields and `timetracking` included.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl JiraIssueFields {
    pub fn custom(&self, field_id: &str) -> Option<&Value> {
        self.extra.get(field_id).filter(|v| !v.is_null())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JiraStatus {
    pub name: String,
    #[serde(rename = "statusCategory")]
    pub status_category: JiraStatusCategory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JiraStatusCategory {
    pub key: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JiraIssueType {
    pub name: String,
    #[serde(default)]
    pub subtask: bool,
}

/// An assignee. Server installs identify users by `name` or `key`,
/// Cloud by `accountId`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JiraUser {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub email_address: Option<String>,
    #[serde(default)]
    pub avatar_urls: HashMap<String, String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JiraNamed {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JiraParent {
    pub key: String,
}

/// A saved export: the epics and, per epic key, its raw issues. Issues
/// stay untyped here so one malformed record does not reject the file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JiraExport {
    pub epics: Vec<JiraIssue>,
    #[serde(default)]
    pub issues: BTreeMap<String, Vec<Value>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_issue_with_custom_fields() {
        let json = r#"{
            "id": "10001",
            "key": "PMS-2",
            "fields": {
                "summary": "Write parser",
                "status": {"name": "In Review", "statusCategory": {"id": 4, "key": "indeterminate", "name": "In Progress"}},
                "issuetype": {"name": "Task", "subtask": false},
                "assignee": {"name": "jdoe", "displayName": "J. Doe", "emailAddress": "jdoe@corp.com", "active": true},
                "duedate": "2025-01-10",
                "customfield_10016": 5,
                "customfield_10918": null
            }
        }"#;
        let issue: JiraIssue = serde_json::from_str(json).unwrap();
        assert_eq!(issue.key, "PMS-2");
        assert_eq!(issue.fields.status.status_category.key, "indeterminate");
        let assignee = issue.fields.assignee.as_ref().unwrap();
        assert_eq!(assignee.name.as_deref(), Some("jdoe"));
        assert!(assignee.account_id.is_none());
        assert_eq!(issue.fields.custom("customfield_10016"), Some(&Value::from(5)));
        assert!(issue.fields.custom("customfield_10918").is_none());
        assert!(issue.fields.parent.is_none());
    }

    #[test]
    fn test_deserialize_export() {
        let json = r#"{
            "epics": [{"key": "PMS-1", "fields": {"summary": "Epic", "status": {"name": "Open", "statusCategory": {"key": "new"}}, "issuetype": {"name": "Epic"}}}],
            "issues": {"PMS-1": [{"key": "PMS-2"}]}
        }"#;
        let export: JiraExport = serde_json::from_str(json).unwrap();
        assert_eq!(export.epics.len(), 1);
        assert_eq!(export.issues["PMS-1"].len(), 1);
    }
}
