use chrono::{DateTime, FixedOffset};

use crate::date_util::{to_kst_end_of_day, KST};

/// Deadline policy: when a unit is due, and how late a completion is.
pub trait EfficiencyStrategy: Send + Sync {
    /// Parse a due-date string into a deadline instant. Absent or
    /// unparsable input yields `None`.
    fn parse_deadline(&self, due_date: Option<&str>) -> Option<DateTime<FixedOffset>>;

    /// True iff `completion` is at or before `deadline`.
    fn is_on_time(&self, completion: &DateTime<FixedOffset>, deadline: &DateTime<FixedOffset>)
        -> bool;

    /// Whole days late, 0 when on time.
    fn overdue_days(
        &self,
        completion: &DateTime<FixedOffset>,
        deadline: &DateTime<FixedOffset>,
    ) -> i64;
}

/// The due date is met by anything completed up to 23:59:59 KST of that day.
#[derive(Debug, Clone, Copy, Default)]
pub struct DueDateStrategy;

impl EfficiencyStrategy for DueDateStrategy {
    fn parse_deadline(&self, due_date: Option<&str>) -> Option<DateTime<FixedOffset>> {
        to_kst_end_of_day(due_date?)
    }

    fn is_on_time(
        &self,
        completion: &DateTime<FixedOffset>,
        deadline: &DateTime<FixedOffset>,
    ) -> bool {
        completion <= deadline
    }

    fn overdue_days(
        &self,
        completion: &DateTime<FixedOffset>,
        deadline: &DateTime<FixedOffset>,
    ) -> i64 {
        if self.is_on_time(completion, deadline) {
            return 0;
        }
        // Calendar-day difference in KST; time of day does not matter.
        let completion_day = completion.with_timezone(&*KST).date_naive();
        let deadline_day = deadline.with_timezone(&*KST).date_naive();
        (completion_day - deadline_day).num_days().max(0)
    }
}
