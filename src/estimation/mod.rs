//! Story-point rollups over parent/subtask hierarchies.
//!
//! Every rollup starts from the same partition of the input:
//!
//! - a *parent group* is a non-subtask unit together with the subtasks in
//!   the same input that name it as their parent;
//! - everything else is *standalone*: units nobody points at, plus
//!   orphaned subtasks whose parent is not in the input.
//!
//! A parent group contributes its subtasks' values only when every
//! subtask carries one; otherwise the parent's own value stands in for
//! the whole group.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;

use crate::model::Unit;

struct ParentGroup<'a> {
    parent: &'a Unit,
    subtasks: Vec<&'a Unit>,
}

impl ParentGroup<'_> {
    fn all_subtasks_estimated(&self) -> bool {
        self.subtasks.iter().all(|s| s.estimation.is_some())
    }
}

struct Partition<'a> {
    standalone: Vec<&'a Unit>,
    parents: Vec<ParentGroup<'a>>,
}

fn partition<'a>(units: &[&'a Unit]) -> Partition<'a> {
    // Pass 1: every non-subtask is a candidate parent.
    let mut groups: Vec<ParentGroup<'a>> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();
    for &unit in units.iter().filter(|u| !u.is_subtask) {
        index.entry(unit.key.as_str()).or_insert(groups.len());
        groups.push(ParentGroup {
            parent: unit,
            subtasks: Vec::new(),
        });
    }

    // Pass 2: attach subtasks; unresolved ones stand alone.
    let mut standalone = Vec::new();
    for &unit in units.iter().filter(|u| u.is_subtask) {
        match unit.parent_key.as_deref().and_then(|k| index.get(k)) {
            Some(&i) => groups[i].subtasks.push(unit),
            None => {
                log::debug!(
                    "{}: parent {:?} not in input, treating as standalone",
                    unit.key,
                    unit.parent_key
                );
                standalone.push(unit);
            }
        }
    }

    let mut parents = Vec::new();
    for group in groups {
        if group.subtasks.is_empty() {
            standalone.push(group.parent);
        } else {
            parents.push(group);
        }
    }

    Partition {
        standalone,
        parents,
    }
}

/// Total estimation of an epic's units.
pub fn compute_epic_estimation<'a, I>(units: I) -> f64
where
    I: IntoIterator<Item = &'a Unit>,
{
    let units: Vec<&Unit> = units.into_iter().collect();
    let Partition {
        standalone,
        parents,
    } = partition(&units);

    let standalone_total: f64 = standalone.iter().map(|u| u.estimation.unwrap_or(0.0)).sum();
    let parents_total: f64 = parents
        .iter()
        .map(|group| {
            if group.all_subtasks_estimated() {
                group.subtasks.iter().filter_map(|s| s.estimation).sum()
            } else {
                group.parent.estimation.unwrap_or(0.0)
            }
        })
        .sum();

    standalone_total + parents_total
}

/// Estimation attributed to each assignee.
///
/// Standalone units credit their own assignee. A fully estimated parent
/// group credits each subtask's assignee; otherwise the parent's value
/// goes to the parent's assignee. Unassigned units and zero values are
/// skipped, so every key in the result has a non-zero total.
pub fn compute_person_estimations<'a, I>(units: I) -> BTreeMap<String, f64>
where
    I: IntoIterator<Item = &'a Unit>,
{
    let units: Vec<&Unit> = units.into_iter().collect();
    let Partition {
        standalone,
        parents,
    } = partition(&units);

    let credited = standalone.into_iter().chain(parents.into_iter().flat_map(|group| {
        if group.all_subtasks_estimated() {
            group.subtasks
        } else {
            vec![group.parent]
        }
    }));

    credited.fold(BTreeMap::new(), |mut acc, unit| {
        let value = unit.estimation.unwrap_or(0.0);
        if let Some(assignee) = unit.assignee_id.as_deref() {
            if value != 0.0 {
                *acc.entry(assignee.to_string()).or_insert(0.0) += value;
            }
        }
        acc
    })
}

/// Completed units per assignee, without double counting a parent that
/// closed together with its subtasks.
///
/// Only done units with an end date take part. When a subtask ended on
/// the same day as its parent, only the subtasks count; otherwise the
/// parent and every subtask each count once.
pub fn compute_person_completed_counts<'a, I>(units: I) -> BTreeMap<String, u64>
where
    I: IntoIterator<Item = &'a Unit>,
{
    compute_person_completed_counts_by(units, Unit::end_day)
}

/// Like [`compute_person_completed_counts`], with the completion day of a
/// unit supplied by `completion_day`. Done units without one are skipped.
pub fn compute_person_completed_counts_by<'a, I, F>(
    units: I,
    completion_day: F,
) -> BTreeMap<String, u64>
where
    I: IntoIterator<Item = &'a Unit>,
    F: Fn(&Unit) -> Option<NaiveDate>,
{
    let completed: Vec<&Unit> = units
        .into_iter()
        .filter(|u| u.is_done() && completion_day(u).is_some())
        .collect();
    let Partition {
        standalone,
        parents,
    } = partition(&completed);

    let counted = standalone.into_iter().chain(parents.into_iter().flat_map(|group| {
        let parent_day = completion_day(group.parent);
        let closed_together = group
            .subtasks
            .iter()
            .any(|s| completion_day(s) == parent_day);
        let mut group_units = group.subtasks;
        if !closed_together {
            group_units.push(group.parent);
        }
        group_units
    }));

    counted.fold(BTreeMap::new(), |mut acc, unit| {
        if let Some(assignee) = unit.assignee_id.as_deref() {
            *acc.entry(assignee.to_string()).or_insert(0) += 1;
        }
        acc
    })
}
