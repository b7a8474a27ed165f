//! Mapping between JIRA actors (workers) and locally curated members.
//!
//! A JIRA account id may be linked to at most one member. The strict
//! constructor rejects a second claim; the lenient one (used by the
//! metric composers, which never fail) logs it and keeps the first.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::error::{Error, Result};
use crate::model::{Member, Worker};

/// Lookup from JIRA account id to the member linked to it.
#[derive(Debug, Clone, Default)]
pub struct IdentityMap<'a> {
    by_account: HashMap<&'a str, &'a Member>,
}

impl<'a> IdentityMap<'a> {
    /// Build the map, failing if two members claim the same account id.
    pub fn new(members: &'a [Member]) -> Result<Self> {
        let mut by_account: HashMap<&'a str, &'a Member> = HashMap::new();
        for member in members {
            let Some(account_id) = member.jira_account_id.as_deref() else {
                continue;
            };
            if let Some(existing) = by_account.get(account_id) {
                return Err(Error::DuplicateIdentity {
                    account_id: account_id.to_string(),
                    existing: existing.email.clone(),
                    claimant: member.email.clone(),
                });
            }
            by_account.insert(account_id, member);
        }
        Ok(Self { by_account })
    }

    /// Build the map, keeping the first claim on a duplicated account id.
    pub fn lenient(members: &'a [Member]) -> Self {
        let mut by_account: HashMap<&'a str, &'a Member> = HashMap::new();
        for member in members {
            let Some(account_id) = member.jira_account_id.as_deref() else {
                continue;
            };
            match by_account.get(account_id) {
                Some(existing) => log::warn!(
                    "JIRA account {account_id} is linked to both {} and {}; using {}",
                    existing.email,
                    member.email,
                    existing.email
                ),
                None => {
                    by_account.insert(account_id, member);
                }
            }
        }
        Self { by_account }
    }

    pub fn member(&self, account_id: &str) -> Option<&'a Member> {
        self.by_account.get(account_id).copied()
    }

    /// Whether `member` is the one its account id resolves to.
    pub fn is_canonical(&self, member: &Member) -> bool {
        member
            .jira_account_id
            .as_deref()
            .and_then(|id| self.member(id))
            .is_some_and(|m| m.email == member.email)
    }

    /// Account ids of every linked member of a team.
    pub fn team_account_ids(&self, team_id: i64) -> HashSet<&'a str> {
        self.by_account
            .iter()
            .filter(|(_, m)| m.team_id == Some(team_id))
            .map(|(id, _)| *id)
            .collect()
    }
}

/// Check that linking `account_id` to the member `email` keeps the
/// one-to-one invariant.
pub fn check_link(members: &[Member], email: &str, account_id: &str) -> Result<()> {
    match members
        .iter()
        .find(|m| m.email != email && m.jira_account_id.as_deref() == Some(account_id))
    {
        Some(existing) => Err(Error::DuplicateIdentity {
            account_id: account_id.to_string(),
            existing: existing.email.clone(),
            claimant: email.to_string(),
        }),
        None => Ok(()),
    }
}

/// A worker with no member behind it, or one excluded from aggregation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnmappedWorker {
    pub account_id: String,
    pub display_name: String,
    pub email: Option<String>,
    pub excluded: bool,
}

impl From<&Worker> for UnmappedWorker {
    fn from(w: &Worker) -> Self {
        Self {
            account_id: w.account_id.clone(),
            display_name: w.display_name.clone(),
            email: w.email.clone(),
            excluded: w.excluded,
        }
    }
}

fn is_mapped(worker: &Worker, by_account: &HashSet<&str>, by_email: &HashSet<String>) -> bool {
    by_account.contains(worker.account_id.as_str())
        || worker
            .email
            .as_deref()
            .is_some_and(|e| by_email.contains(&e.to_lowercase()))
}

/// Every excluded worker plus every worker matching no member by account
/// id or (case-insensitive) email, in input order.
pub fn find_unmapped_or_excluded_workers(
    workers: &[Worker],
    members: &[Member],
) -> Vec<UnmappedWorker> {
    let by_account: HashSet<&str> = members
        .iter()
        .filter_map(|m| m.jira_account_id.as_deref())
        .collect();
    let by_email: HashSet<String> = members.iter().map(|m| m.email.to_lowercase()).collect();

    workers
        .iter()
        .filter(|w| w.excluded || !is_mapped(w, &by_account, &by_email))
        .map(UnmappedWorker::from)
        .collect()
}

/// Non-excluded workers that still need a member.
pub fn find_unmapped_workers(workers: &[Worker], members: &[Member]) -> Vec<UnmappedWorker> {
    find_unmapped_or_excluded_workers(workers, members)
        .into_iter()
        .filter(|w| !w.excluded)
        .collect()
}

pub fn find_excluded_workers(workers: &[Worker]) -> Vec<UnmappedWorker> {
    workers
        .iter()
        .filter(|w| w.excluded)
        .map(UnmappedWorker::from)
        .collect()
}

/// Links to make after an import: `(member email, account id)` for each
/// unlinked member whose email matches a worker's. Account ids already
/// linked elsewhere are skipped.
pub fn plan_auto_map_by_email(workers: &[Worker], members: &[Member]) -> Vec<(String, String)> {
    let mut taken: HashSet<&str> = members
        .iter()
        .filter_map(|m| m.jira_account_id.as_deref())
        .collect();
    let mut unlinked: HashMap<String, &Member> = members
        .iter()
        .filter(|m| m.jira_account_id.is_none())
        .map(|m| (m.email.to_lowercase(), m))
        .collect();

    let mut links = Vec::new();
    for worker in workers {
        let Some(email) = worker.email.as_deref() else {
            continue;
        };
        if taken.contains(worker.account_id.as_str()) {
            continue;
        }
        if let Some(member) = unlinked.remove(&email.to_lowercase()) {
            taken.insert(worker.account_id.as_str());
            links.push((member.email.clone(), worker.account_id.clone()));
        }
    }
    links
}

/// A new member for an unmapped worker. Workers without an email get a
/// placeholder address derived from the account id.
pub fn member_from_worker(worker: &UnmappedWorker, nickname: &str, team_id: Option<i64>) -> Member {
    let email = match worker.email.as_deref() {
        Some(e) if !e.is_empty() => e.to_string(),
        _ => format!("{}@jira.local", worker.account_id),
    };
    Member {
        email,
        nickname: nickname.to_string(),
        team_id,
        jira_account_id: Some(worker.account_id.clone()),
    }
}
