use std::collections::HashMap;

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

use crate::model::{DueDateChange, Member, Project, StatusCategory, Team, Unit, Worker};

// ── Projects ───────────────────────────────────────────────────────

pub fn upsert_project(conn: &Connection, project: &Project) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO projects (
            project_key, name, description, status, total_units, completed_units,
            lead_account_id, last_synced_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ON CONFLICT(project_key) DO UPDATE SET
            name=excluded.name, description=excluded.description, status=excluded.status,
            total_units=excluded.total_units, completed_units=excluded.completed_units,
            lead_account_id=excluded.lead_account_id, last_synced_at=excluded.last_synced_at",
        params![
            project.key,
            project.name,
            project.description,
            project.status,
            project.total_units as i64,
            project.completed_units as i64,
            project.lead_account_id,
            project.last_synced_at,
        ],
    )?;
    Ok(())
}

const PROJECT_COLUMNS: &str = "project_key, name, description, status, total_units, \
                               completed_units, lead_account_id, last_synced_at";

fn project_from_row(row: &Row<'_>) -> Result<Project, rusqlite::Error> {
    Ok(Project {
        key: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        status: row.get(3)?,
        total_units: row.get::<_, i64>(4)? as u64,
        completed_units: row.get::<_, i64>(5)? as u64,
        lead_account_id: row.get(6)?,
        last_synced_at: row.get(7)?,
    })
}

pub fn list_projects(conn: &Connection) -> Result<Vec<Project>, rusqlite::Error> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PROJECT_COLUMNS} FROM projects ORDER BY project_key"
    ))?;
    let rows = stmt.query_map([], project_from_row)?;
    rows.collect()
}

pub fn get_project(conn: &Connection, key: &str) -> Result<Option<Project>, rusqlite::Error> {
    conn.query_row(
        &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE project_key = ?1"),
        params![key],
        project_from_row,
    )
    .optional()
}

// ── Units ──────────────────────────────────────────────────────────

pub fn upsert_unit(conn: &Connection, unit: &Unit, synced_at: &str) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO units (
            unit_key, epic_key, summary, status, status_category, issue_type, priority,
            assignee_id, assignee_name, start_date, due_date, end_date, resolution_date,
            estimation, parent_key, is_subtask, last_synced_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
        ON CONFLICT(unit_key) DO UPDATE SET
            epic_key=excluded.epic_key, summary=excluded.summary, status=excluded.status,
            status_category=excluded.status_category, issue_type=excluded.issue_type,
            priority=excluded.priority, assignee_id=excluded.assignee_id,
            assignee_name=excluded.assignee_name, start_date=excluded.start_date,
            due_date=excluded.due_date, end_date=excluded.end_date,
            resolution_date=excluded.resolution_date, estimation=excluded.estimation,
            parent_key=excluded.parent_key, is_subtask=excluded.is_subtask,
            last_synced_at=excluded.last_synced_at",
        params![
            unit.key,
            unit.epic_key,
            unit.summary,
            unit.status,
            unit.status_category.as_str(),
            unit.issue_type,
            unit.priority,
            unit.assignee_id,
            unit.assignee_name,
            unit.start_date,
            unit.due_date,
            unit.end_date,
            unit.resolution_date,
            unit.estimation,
            unit.parent_key,
            unit.is_subtask as i32,
            synced_at,
        ],
    )?;
    Ok(())
}

const UNIT_COLUMNS: &str = "unit_key, epic_key, summary, status, status_category, issue_type, \
                            priority, assignee_id, assignee_name, start_date, due_date, end_date, \
                            resolution_date, estimation, parent_key, is_subtask";

fn unit_from_row(row: &Row<'_>) -> Result<Unit, rusqlite::Error> {
    let category: String = row.get(4)?;
    Ok(Unit {
        key: row.get(0)?,
        epic_key: row.get(1)?,
        summary: row.get(2)?,
        status: row.get(3)?,
        status_category: StatusCategory::from_key(&category),
        issue_type: row.get(5)?,
        priority: row.get(6)?,
        assignee_id: row.get(7)?,
        assignee_name: row.get(8)?,
        start_date: row.get(9)?,
        due_date: row.get(10)?,
        end_date: row.get(11)?,
        resolution_date: row.get(12)?,
        estimation: row.get(13)?,
        parent_key: row.get(14)?,
        is_subtask: row.get::<_, i32>(15)? != 0,
    })
}

pub fn list_units(conn: &Connection) -> Result<Vec<Unit>, rusqlite::Error> {
    let mut stmt = conn.prepare(&format!("SELECT {UNIT_COLUMNS} FROM units ORDER BY unit_key"))?;
    let rows = stmt.query_map([], unit_from_row)?;
    rows.collect()
}

/// Stored due date of every unit, keyed by unit key.
pub fn get_due_dates(conn: &Connection) -> Result<HashMap<String, Option<String>>, rusqlite::Error> {
    let mut stmt = conn.prepare("SELECT unit_key, due_date FROM units")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    rows.collect()
}

/// Remove units of an epic that are not in `keep`. Returns the number deleted.
pub fn delete_stale_units(
    conn: &Connection,
    epic_key: &str,
    keep: &[String],
) -> Result<usize, rusqlite::Error> {
    let existing: Vec<String> = {
        let mut stmt = conn.prepare("SELECT unit_key FROM units WHERE epic_key = ?1")?;
        let rows = stmt.query_map(params![epic_key], |row| row.get(0))?;
        rows.collect::<Result<_, _>>()?
    };
    let mut deleted = 0;
    for key in existing.iter().filter(|k| !keep.contains(k)) {
        deleted += conn.execute("DELETE FROM units WHERE unit_key = ?1", params![key])?;
    }
    Ok(deleted)
}

// ── Workers ────────────────────────────────────────────────────────

/// Insert or refresh a worker. The `excluded` flag is local state and is
/// never overwritten by a sync.
pub fn upsert_worker(conn: &Connection, worker: &Worker) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO workers (
            account_id, display_name, email, avatar_url, active, excluded, last_synced_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ON CONFLICT(account_id) DO UPDATE SET
            display_name = CASE WHEN excluded.display_name != ''
                           THEN excluded.display_name ELSE workers.display_name END,
            email = COALESCE(excluded.email, workers.email),
            avatar_url = COALESCE(excluded.avatar_url, workers.avatar_url),
            active = excluded.active,
            last_synced_at = excluded.last_synced_at",
        params![
            worker.account_id,
            worker.display_name,
            worker.email,
            worker.avatar_url,
            worker.active as i32,
            worker.excluded as i32,
            worker.last_synced_at,
        ],
    )?;
    Ok(())
}

pub fn list_workers(conn: &Connection) -> Result<Vec<Worker>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT account_id, display_name, email, avatar_url, active, excluded, last_synced_at
         FROM workers ORDER BY display_name, account_id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(Worker {
            account_id: row.get(0)?,
            display_name: row.get(1)?,
            email: row.get(2)?,
            avatar_url: row.get(3)?,
            active: row.get::<_, i32>(4)? != 0,
            excluded: row.get::<_, i32>(5)? != 0,
            last_synced_at: row.get(6)?,
        })
    })?;
    rows.collect()
}

/// Returns false when no such worker exists.
pub fn set_worker_excluded(
    conn: &Connection,
    account_id: &str,
    excluded: bool,
) -> Result<bool, rusqlite::Error> {
    let changed = conn.execute(
        "UPDATE workers SET excluded = ?2 WHERE account_id = ?1",
        params![account_id, excluded as i32],
    )?;
    Ok(changed > 0)
}

// ── Teams ──────────────────────────────────────────────────────────

pub fn insert_team(conn: &Connection, name: &str) -> Result<i64, rusqlite::Error> {
    conn.execute("INSERT INTO teams (name) VALUES (?1)", params![name])?;
    Ok(conn.last_insert_rowid())
}

pub fn list_teams(conn: &Connection) -> Result<Vec<Team>, rusqlite::Error> {
    let mut stmt = conn.prepare("SELECT id, name FROM teams ORDER BY id")?;
    let rows = stmt.query_map([], |row| {
        Ok(Team {
            id: row.get(0)?,
            name: row.get(1)?,
        })
    })?;
    rows.collect()
}

pub fn find_team_by_name(conn: &Connection, name: &str) -> Result<Option<Team>, rusqlite::Error> {
    conn.query_row(
        "SELECT id, name FROM teams WHERE name = ?1",
        params![name],
        |row| {
            Ok(Team {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        },
    )
    .optional()
}

/// Delete a team. Its members stay, detached from any team.
pub fn delete_team(conn: &Connection, id: i64) -> Result<bool, rusqlite::Error> {
    conn.execute("UPDATE members SET team_id = NULL WHERE team_id = ?1", params![id])?;
    let deleted = conn.execute("DELETE FROM teams WHERE id = ?1", params![id])?;
    Ok(deleted > 0)
}

// ── Members ────────────────────────────────────────────────────────

pub fn upsert_member(conn: &Connection, member: &Member) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO members (email, nickname, team_id, jira_account_id)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(email) DO UPDATE SET
            nickname=excluded.nickname, team_id=excluded.team_id,
            jira_account_id=excluded.jira_account_id",
        params![
            member.email,
            member.nickname,
            member.team_id,
            member.jira_account_id
        ],
    )?;
    Ok(())
}

fn member_from_row(row: &Row<'_>) -> Result<Member, rusqlite::Error> {
    Ok(Member {
        email: row.get(0)?,
        nickname: row.get(1)?,
        team_id: row.get(2)?,
        jira_account_id: row.get(3)?,
    })
}

pub fn list_members(conn: &Connection) -> Result<Vec<Member>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT email, nickname, team_id, jira_account_id FROM members ORDER BY created_at, email",
    )?;
    let rows = stmt.query_map([], member_from_row)?;
    rows.collect()
}

pub fn get_member(conn: &Connection, email: &str) -> Result<Option<Member>, rusqlite::Error> {
    conn.query_row(
        "SELECT email, nickname, team_id, jira_account_id FROM members WHERE email = ?1",
        params![email],
        member_from_row,
    )
    .optional()
}

/// Set or clear a member's JIRA account. Returns false when no such member
/// exists. A second claim on an account violates the unique index.
pub fn link_member_account(
    conn: &Connection,
    email: &str,
    account_id: Option<&str>,
) -> Result<bool, rusqlite::Error> {
    let changed = conn.execute(
        "UPDATE members SET jira_account_id = ?2 WHERE email = ?1",
        params![email, account_id],
    )?;
    Ok(changed > 0)
}

pub fn delete_member(conn: &Connection, email: &str) -> Result<bool, rusqlite::Error> {
    let deleted = conn.execute("DELETE FROM members WHERE email = ?1", params![email])?;
    Ok(deleted > 0)
}

// ── Due Date History ───────────────────────────────────────────────

pub fn insert_due_date_change(
    conn: &Connection,
    change: &DueDateChange,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO unit_due_date_history (unit_key, previous_due_date, new_due_date, detected_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            change.unit_key,
            change.previous_due_date,
            change.new_due_date,
            change.detected_at
        ],
    )?;
    Ok(())
}

/// Changes for one unit, or for every unit when `unit_key` is `None`,
/// oldest first.
pub fn list_due_date_history(
    conn: &Connection,
    unit_key: Option<&str>,
) -> Result<Vec<DueDateChange>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT unit_key, previous_due_date, new_due_date, detected_at
         FROM unit_due_date_history
         WHERE ?1 IS NULL OR unit_key = ?1
         ORDER BY id",
    )?;
    let rows = stmt.query_map(params![unit_key], |row| {
        Ok(DueDateChange {
            unit_key: row.get(0)?,
            previous_due_date: row.get(1)?,
            new_due_date: row.get(2)?,
            detected_at: row.get(3)?,
        })
    })?;
    rows.collect()
}

// ── Config ─────────────────────────────────────────────────────────

pub fn get_config(conn: &Connection, key: &str) -> Result<Option<String>, rusqlite::Error> {
    conn.query_row(
        "SELECT value FROM app_config WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
}

pub fn set_config(conn: &Connection, key: &str, value: &str) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO app_config (key, value, updated_at)
         VALUES (?1, ?2, datetime('now'))",
        params![key, value],
    )?;
    Ok(())
}

pub fn list_config(conn: &Connection) -> Result<Vec<(String, String)>, rusqlite::Error> {
    let mut stmt = conn.prepare("SELECT key, value FROM app_config ORDER BY key")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    rows.collect()
}

// ── Sync Jobs ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct SyncJob {
    pub id: i64,
    pub source: String,
    pub status: String,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub synced_items: u64,
    pub failed_items: u64,
    pub error_message: Option<String>,
}

pub fn insert_sync_job(conn: &Connection, source: &str) -> Result<i64, rusqlite::Error> {
    conn.execute(
        "INSERT INTO sync_jobs (source, status, started_at)
         VALUES (?1, 'running', datetime('now'))",
        params![source],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn update_sync_job(
    conn: &Connection,
    job_id: i64,
    status: &str,
    synced_items: u64,
    failed_items: u64,
    error_message: Option<&str>,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "UPDATE sync_jobs SET
            status = ?2, completed_at = datetime('now'),
            synced_items = ?3, failed_items = ?4, error_message = ?5
         WHERE id = ?1",
        params![
            job_id,
            status,
            synced_items as i64,
            failed_items as i64,
            error_message,
        ],
    )?;
    Ok(())
}

pub fn latest_sync_job(conn: &Connection) -> Result<Option<SyncJob>, rusqlite::Error> {
    conn.query_row(
        "SELECT id, source, status, started_at, completed_at, synced_items, failed_items,
                error_message
         FROM sync_jobs ORDER BY id DESC LIMIT 1",
        [],
        |row| {
            Ok(SyncJob {
                id: row.get(0)?,
                source: row.get(1)?,
                status: row.get(2)?,
                started_at: row.get(3)?,
                completed_at: row.get(4)?,
                synced_items: row.get::<_, i64>(5)? as u64,
                failed_items: row.get::<_, i64>(6)? as u64,
                error_message: row.get(7)?,
            })
        },
    )
    .optional()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::*;
    use crate::storage::Database;

    const NOW: &str = "2025-01-01T09:00:00+09:00";

    #[tokio::test]
    async fn test_config_round_trip() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                set_config(conn, "estimation_type", "story_points")?;
                set_config(conn, "estimation_field_id", "customfield_10016")?;
                let val = get_config(conn, "estimation_type")?;
                assert_eq!(val, Some("story_points".to_string()));

                let missing = get_config(conn, "nonexistent")?;
                assert_eq!(missing, None);

                let all = list_config(conn)?;
                assert_eq!(all.len(), 2);
                assert_eq!(all[0].0, "estimation_field_id");
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_unit_round_trip() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                let mut u = subtask("PMS-3", "PMS-2")
                    .assignee("u1")
                    .due("2025-01-10")
                    .ended("2025-01-09")
                    .points(2.5);
                u.priority = Some("High".to_string());
                upsert_unit(conn, &u, NOW)?;
                upsert_unit(conn, &unit("PMS-4").category(StatusCategory::New), NOW)?;

                let units = list_units(conn)?;
                assert_eq!(units.len(), 2);
                assert_eq!(units[0], u);
                assert_eq!(units[1].status_category, StatusCategory::New);

                u.due_date = Some("2025-01-20".to_string());
                upsert_unit(conn, &u, NOW)?;
                let due = get_due_dates(conn)?;
                assert_eq!(due["PMS-3"].as_deref(), Some("2025-01-20"));
                assert_eq!(due["PMS-4"], None);

                let deleted = delete_stale_units(conn, "EPIC-1", &["PMS-3".to_string()])?;
                assert_eq!(deleted, 1);
                assert_eq!(list_units(conn)?.len(), 1);
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_project_round_trip() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                let mut p = Project {
                    key: "PMS-1".to_string(),
                    name: "Billing revamp".to_string(),
                    description: None,
                    status: "In Progress".to_string(),
                    total_units: 3,
                    completed_units: 1,
                    lead_account_id: Some("u1".to_string()),
                    last_synced_at: NOW.to_string(),
                };
                upsert_project(conn, &p)?;
                p.completed_units = 2;
                upsert_project(conn, &p)?;

                assert_eq!(list_projects(conn)?, vec![p.clone()]);
                assert_eq!(get_project(conn, "PMS-1")?, Some(p));
                assert_eq!(get_project(conn, "PMS-9")?, None);
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_worker_sync_preserves_exclusion() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                let mut w = worker("u1");
                w.email = Some("u1@corp.com".to_string());
                upsert_worker(conn, &w)?;
                assert!(set_worker_excluded(conn, "u1", true)?);
                assert!(!set_worker_excluded(conn, "nobody", true)?);

                // A later sync without email must not clear it or the flag.
                let mut again = worker("u1");
                again.display_name = "Renamed".to_string();
                upsert_worker(conn, &again)?;

                let workers = list_workers(conn)?;
                assert_eq!(workers.len(), 1);
                assert!(workers[0].excluded);
                assert_eq!(workers[0].display_name, "Renamed");
                assert_eq!(workers[0].email.as_deref(), Some("u1@corp.com"));
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_member_account_is_unique() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                upsert_member(conn, &member("alice@test.com", "u1", None))?;
                let mut bob = member("bob@test.com", "u2", None);
                bob.jira_account_id = None;
                upsert_member(conn, &bob)?;

                assert!(link_member_account(conn, "bob@test.com", Some("u1")).is_err());
                assert!(link_member_account(conn, "bob@test.com", Some("u2"))?);
                assert!(!link_member_account(conn, "nobody@test.com", Some("u3"))?);

                assert!(link_member_account(conn, "alice@test.com", None)?);
                let alice = get_member(conn, "ALICE@test.com")?.unwrap();
                assert_eq!(alice.jira_account_id, None);
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_delete_team_detaches_members() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                let id = insert_team(conn, "Platform")?;
                upsert_member(conn, &member("alice@test.com", "u1", Some(id)))?;
                assert_eq!(find_team_by_name(conn, "Platform")?.map(|t| t.id), Some(id));

                assert!(delete_team(conn, id)?);
                assert!(list_teams(conn)?.is_empty());

                let members = list_members(conn)?;
                assert_eq!(members.len(), 1);
                assert_eq!(members[0].team_id, None);

                assert!(delete_member(conn, "alice@test.com")?);
                assert!(!delete_member(conn, "alice@test.com")?);
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_due_date_history() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                for (key, prev, new) in [("PMS-2", "", "2025-01-10"), ("PMS-3", "2025-01-05", "")] {
                    insert_due_date_change(
                        conn,
                        &DueDateChange {
                            unit_key: key.to_string(),
                            previous_due_date: prev.to_string(),
                            new_due_date: new.to_string(),
                            detected_at: NOW.to_string(),
                        },
                    )?;
                }
                assert_eq!(list_due_date_history(conn, None)?.len(), 2);
                let one = list_due_date_history(conn, Some("PMS-3"))?;
                assert_eq!(one.len(), 1);
                assert_eq!(one[0].previous_due_date, "2025-01-05");
                assert_eq!(one[0].new_due_date, "");
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_sync_job_round_trip() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                assert!(latest_sync_job(conn)?.is_none());
                let job_id = insert_sync_job(conn, "export.json")?;
                assert!(job_id > 0);

                update_sync_job(conn, job_id, "partial", 42, 1, Some("PMS-7: missing field"))?;

                let job = latest_sync_job(conn)?.unwrap();
                assert_eq!(job.status, "partial");
                assert_eq!(job.synced_items, 42);
                assert_eq!(job.failed_items, 1);
                assert!(job.completed_at.is_some());
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }
}
