use std::collections::{BTreeMap, HashMap};

use serde_json::Value;

use crate::date_util::now_kst;
use crate::efficiency::CompletionField;
use crate::error::Result;
use crate::identity::plan_auto_map_by_email;
use crate::jira::mapper::{DEFAULT_END_DATE_FIELD, DEFAULT_START_DATE_FIELD};
use crate::jira::{
    extract_worker, map_epic_to_project, map_issue_to_unit, EstimationConfig, EstimationType,
    JiraExport, JiraIssue, MapperConfig,
};
use crate::model::{DueDateChange, Project, Unit, Worker};
use crate::storage::repository;
use crate::storage::Database;
use crate::sync::{ImportOptions, ImportProgress, SyncReport};

/// Build the mapper configuration from `app_config`, falling back to the
/// default date fields and no estimation.
pub async fn load_mapper_config(db: &Database) -> Result<MapperConfig> {
    let values: HashMap<String, String> = db
        .reader()
        .call(|conn| repository::list_config(conn))
        .await?
        .into_iter()
        .collect();
    let get = |key: &str| values.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());

    let kind = match get("estimation_type") {
        Some(v) => EstimationType::parse(v)?,
        None => EstimationType::None,
    };
    Ok(MapperConfig {
        estimation: EstimationConfig {
            kind,
            field_id: get("estimation_field_id").map(str::to_string),
        },
        start_date_field: get("start_date_field")
            .unwrap_or(DEFAULT_START_DATE_FIELD)
            .to_string(),
        end_date_field: get("end_date_field")
            .unwrap_or(DEFAULT_END_DATE_FIELD)
            .to_string(),
    })
}

/// The configured completion field, `end_date` unless set otherwise.
pub async fn load_completion_field(db: &Database) -> Result<CompletionField> {
    let value = db
        .reader()
        .call(|conn| repository::get_config(conn, "completion_field"))
        .await?;
    match value {
        Some(v) => CompletionField::parse(&v),
        None => Ok(CompletionField::default()),
    }
}

/// Due-date changes between the stored units and a fresh import. Units
/// seen for the first time record nothing.
pub fn detect_due_date_changes(
    previous: &HashMap<String, Option<String>>,
    units: &[Unit],
    detected_at: &str,
) -> Vec<DueDateChange> {
    units
        .iter()
        .filter_map(|unit| {
            let before = previous.get(&unit.key)?.as_deref().unwrap_or("");
            let after = unit.due_date.as_deref().unwrap_or("");
            (before != after).then(|| DueDateChange {
                unit_key: unit.key.clone(),
                previous_due_date: before.to_string(),
                new_due_date: after.to_string(),
                detected_at: detected_at.to_string(),
            })
        })
        .collect()
}

/// Everything mapped from one export, ready to write.
#[derive(Debug, Default)]
struct ImportBatch {
    projects: Vec<Project>,
    units: Vec<Unit>,
    workers: BTreeMap<String, Worker>,
    /// Unit keys of each epic that imported without failures.
    clean_epics: Vec<(String, Vec<String>)>,
    failed: u64,
    errors: Vec<String>,
}

fn build_batch(
    export: &JiraExport,
    mapper: &MapperConfig,
    synced_at: &str,
    progress: &dyn ImportProgress,
) -> ImportBatch {
    let mut batch = ImportBatch::default();
    let total = export.epics.len();

    for (index, epic) in export.epics.iter().enumerate() {
        progress.on_epic_start(&epic.key, index, total);
        let mut project = map_epic_to_project(epic, synced_at);
        let raw_issues = export.issues.get(&epic.key).map(Vec::as_slice).unwrap_or_default();

        let mut units = Vec::with_capacity(raw_issues.len());
        let mut failed = 0usize;
        for raw in raw_issues {
            match serde_json::from_value::<JiraIssue>(raw.clone()) {
                Ok(issue) => {
                    if let Some(worker) = extract_worker(&issue, synced_at) {
                        batch.workers.insert(worker.account_id.clone(), worker);
                    }
                    units.push(map_issue_to_unit(&issue, &epic.key, mapper));
                }
                Err(e) => {
                    let key = raw.get("key").and_then(Value::as_str).unwrap_or("<no key>");
                    log::warn!("{}: skipping malformed issue {key}: {e}", epic.key);
                    batch.errors.push(format!("{key}: {e}"));
                    failed += 1;
                }
            }
        }

        project.total_units = units.len() as u64;
        project.completed_units = units.iter().filter(|u| u.is_done()).count() as u64;
        progress.on_epic_complete(&epic.key, units.len(), failed);

        if failed == 0 {
            let keys = units.iter().map(|u| u.key.clone()).collect();
            batch.clean_epics.push((epic.key.clone(), keys));
        }
        batch.failed += failed as u64;
        batch.projects.push(project);
        batch.units.extend(units);
    }

    for (epic_key, issues) in &export.issues {
        if !export.epics.iter().any(|e| &e.key == epic_key) {
            log::warn!("ignoring {} issues of unknown epic {epic_key}", issues.len());
        }
    }

    batch
}

/// Import a saved export into the store.
///
/// Malformed issues are counted as failed and skipped; the rest of the
/// export is written in one transaction. Members whose email matches an
/// imported worker's are linked to it.
pub async fn import_export(
    db: &Database,
    export: JiraExport,
    options: &ImportOptions,
    progress: &dyn ImportProgress,
) -> Result<SyncReport> {
    let synced_at = now_kst().to_rfc3339();

    let job_id = db
        .writer()
        .call({
            let source = options.source.clone();
            move |conn| repository::insert_sync_job(conn, &source)
        })
        .await?;

    let batch = build_batch(&export, &options.mapper, &synced_at, progress);
    let mut report = SyncReport::from_counts(
        options.source.clone(),
        batch.projects.len() as u64,
        batch.units.len() as u64,
        batch.failed,
    );
    report.workers = batch.workers.len() as u64;
    if let Some(first) = batch.errors.first() {
        report.error = Some(format!("{} items failed (first: {first})", batch.failed));
    }

    let prune = options.prune;
    let written = db
        .writer()
        .call(move |conn| {
            let tx = conn.transaction()?;

            let previous = repository::get_due_dates(&tx)?;
            let changes = detect_due_date_changes(&previous, &batch.units, &synced_at);
            for change in &changes {
                repository::insert_due_date_change(&tx, change)?;
            }

            for project in &batch.projects {
                repository::upsert_project(&tx, project)?;
            }
            for unit in &batch.units {
                repository::upsert_unit(&tx, unit, &synced_at)?;
            }
            for worker in batch.workers.values() {
                repository::upsert_worker(&tx, worker)?;
            }
            if prune {
                for (epic_key, keys) in &batch.clean_epics {
                    let removed = repository::delete_stale_units(&tx, epic_key, keys)?;
                    if removed > 0 {
                        log::info!("{epic_key}: removed {removed} units no longer in the export");
                    }
                }
            }

            let workers = repository::list_workers(&tx)?;
            let members = repository::list_members(&tx)?;
            let links = plan_auto_map_by_email(&workers, &members);
            for (email, account_id) in &links {
                log::info!("linking {email} to JIRA account {account_id}");
                repository::link_member_account(&tx, email, Some(account_id))?;
            }

            repository::set_config(&tx, "last_sync_at", &synced_at)?;
            tx.commit()?;
            Ok::<(u64, u64), rusqlite::Error>((changes.len() as u64, links.len() as u64))
        })
        .await;

    match written {
        Ok((due_date_changes, members_linked)) => {
            report.due_date_changes = due_date_changes;
            report.members_linked = members_linked;
        }
        Err(e) => {
            let message = e.to_string();
            db.writer()
                .call(move |conn| {
                    repository::update_sync_job(conn, job_id, "failed", 0, 0, Some(&message))
                })
                .await?;
            return Err(e.into());
        }
    }

    db.writer()
        .call({
            let status = report.status.as_job_status();
            let (synced, failed) = (report.items_synced, report.items_failed);
            let error = report.error.clone();
            move |conn| {
                repository::update_sync_job(conn, job_id, status, synced, failed, error.as_deref())
            }
        })
        .await?;

    log::info!(
        "imported {} epics, {} units ({} failed), {} due date changes",
        report.epics,
        report.items_synced,
        report.items_failed,
        report.due_date_changes
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::*;
    use crate::model::Member;
    use crate::sync::{NoopProgress, SyncStatus};
    use serde_json::json;

    fn issue(key: &str, due: &str, assignee: &str) -> Value {
        json!({
            "key": key,
            "fields": {
                "summary": format!("{key} summary"),
                "status": {"name": "Done", "statusCategory": {"key": "done"}},
                "issuetype": {"name": "Task", "subtask": false},
                "duedate": due,
                "customfield_10918": "2025-01-09",
                "assignee": {
                    "accountId": assignee,
                    "displayName": assignee.to_uppercase(),
                    "emailAddress": format!("{assignee}@corp.com")
                }
            }
        })
    }

    fn export(issues: Vec<Value>) -> JiraExport {
        let epic = json!({
            "key": "PMS-1",
            "fields": {
                "summary": "Billing",
                "status": {"name": "In Progress", "statusCategory": {"key": "indeterminate"}},
                "issuetype": {"name": "Epic"}
            }
        });
        serde_json::from_value(json!({"epics": [epic], "issues": {"PMS-1": issues}})).unwrap()
    }

    fn options() -> ImportOptions {
        ImportOptions {
            source: "export.json".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_detect_due_date_changes() {
        let previous = HashMap::from([
            ("T-1".to_string(), Some("2025-01-10".to_string())),
            ("T-2".to_string(), None),
            ("T-3".to_string(), Some("2025-01-10".to_string())),
        ]);
        let units = vec![
            unit("T-1").due("2025-01-12"),
            unit("T-2").due("2025-01-05"),
            unit("T-3").due("2025-01-10"),
            unit("T-4").due("2025-01-01"),
        ];
        let changes = detect_due_date_changes(&previous, &units, "now");
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].unit_key, "T-1");
        assert_eq!(changes[0].previous_due_date, "2025-01-10");
        assert_eq!(changes[1].unit_key, "T-2");
        assert_eq!(changes[1].previous_due_date, "");
        assert_eq!(changes[1].new_due_date, "2025-01-05");
    }

    #[tokio::test]
    async fn test_import_export_writes_everything() {
        let db = Database::open_memory().await.unwrap();

        let mut alice = member("u1@corp.com", "", None);
        alice.jira_account_id = None;
        db.writer()
            .call(move |conn| repository::upsert_member(conn, &alice))
            .await
            .unwrap();

        let data = export(vec![
            issue("PMS-2", "2025-01-10", "u1"),
            issue("PMS-3", "2025-01-08", "u2"),
            json!({"key": "PMS-4", "fields": {"summary": "no status"}}),
        ]);
        let report = import_export(&db, data, &options(), &NoopProgress).await.unwrap();

        assert_eq!(report.status, SyncStatus::PartialFailure);
        assert_eq!(report.epics, 1);
        assert_eq!(report.items_synced, 2);
        assert_eq!(report.items_failed, 1);
        assert_eq!(report.workers, 2);
        assert_eq!(report.members_linked, 1);
        assert!(report.error.as_deref().unwrap().contains("PMS-4"));

        let (projects, units, members, job, last_sync): (
            Vec<Project>,
            Vec<Unit>,
            Vec<Member>,
            Option<repository::SyncJob>,
            Option<String>,
        ) = db
            .reader()
            .call(|conn| {
                Ok::<_, rusqlite::Error>((
                    repository::list_projects(conn)?,
                    repository::list_units(conn)?,
                    repository::list_members(conn)?,
                    repository::latest_sync_job(conn)?,
                    repository::get_config(conn, "last_sync_at")?,
                ))
            })
            .await
            .unwrap();

        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].total_units, 2);
        assert_eq!(projects[0].completed_units, 2);
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].end_date.as_deref(), Some("2025-01-09"));
        assert_eq!(members[0].jira_account_id.as_deref(), Some("u1"));
        assert_eq!(job.unwrap().status, "partial");
        assert!(last_sync.is_some());
    }

    #[tokio::test]
    async fn test_reimport_records_due_date_change_and_prunes() {
        let db = Database::open_memory().await.unwrap();

        let first = export(vec![
            issue("PMS-2", "2025-01-10", "u1"),
            issue("PMS-3", "2025-01-08", "u1"),
        ]);
        let report = import_export(&db, first, &options(), &NoopProgress).await.unwrap();
        assert_eq!(report.status, SyncStatus::Success);
        assert_eq!(report.due_date_changes, 0);

        let second = export(vec![issue("PMS-2", "2025-01-20", "u1")]);
        let opts = ImportOptions {
            prune: true,
            ..options()
        };
        let report = import_export(&db, second, &opts, &NoopProgress).await.unwrap();
        assert_eq!(report.due_date_changes, 1);

        let (history, units) = db
            .reader()
            .call(|conn| {
                Ok::<_, rusqlite::Error>((
                    repository::list_due_date_history(conn, None)?,
                    repository::list_units(conn)?,
                ))
            })
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].unit_key, "PMS-2");
        assert_eq!(history[0].previous_due_date, "2025-01-10");
        assert_eq!(history[0].new_due_date, "2025-01-20");
        assert_eq!(units.len(), 1);
    }

    #[tokio::test]
    async fn test_load_mapper_config() {
        let db = Database::open_memory().await.unwrap();
        assert_eq!(load_mapper_config(&db).await.unwrap(), MapperConfig::default());
        assert_eq!(load_completion_field(&db).await.unwrap(), CompletionField::EndDate);

        db.writer()
            .call(|conn| {
                repository::set_config(conn, "estimation_type", "story_points")?;
                repository::set_config(conn, "estimation_field_id", "customfield_10016")?;
                repository::set_config(conn, "end_date_field", "customfield_20000")?;
                repository::set_config(conn, "completion_field", "resolution_date")
            })
            .await
            .unwrap();

        let config = load_mapper_config(&db).await.unwrap();
        assert_eq!(config.estimation.kind, EstimationType::StoryPoints);
        assert_eq!(config.estimation.field_id.as_deref(), Some("customfield_10016"));
        assert_eq!(config.start_date_field, DEFAULT_START_DATE_FIELD);
        assert_eq!(config.end_date_field, "customfield_20000");
        assert_eq!(
            load_completion_field(&db).await.unwrap(),
            CompletionField::ResolutionDate
        );

        db.writer()
            .call(|conn| repository::set_config(conn, "estimation_type", "tshirt"))
            .await
            .unwrap();
        assert!(load_mapper_config(&db).await.is_err());
    }
}
