pub mod strategy;

pub use strategy::{DueDateStrategy, EfficiencyStrategy};

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::date_util::{to_kst, to_kst_end_of_day};
use crate::error::{Error, Result};
use crate::model::Unit;

/// On-time delivery figures for a set of units.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EfficiencyResult {
    /// Done units with a usable completion date.
    pub total_resolved: u64,
    /// Resolved units whose due date parsed into a deadline.
    pub resolved_with_due_date: u64,
    pub on_time_count: u64,
    pub overdue_count: u64,
    /// On-time delivery rate, 0.0 to 1.0.
    pub otdr: f64,
    /// Average overdue days among late units only.
    pub aod: f64,
    /// Resolved units with no (or an unparsable) due date.
    pub excluded_no_due_date: u64,
}

/// Which unit field marks the moment of completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionField {
    /// Date-only end date, taken as 23:59:59 KST of that day.
    #[default]
    EndDate,
    /// Legacy JIRA resolution timestamp, converted to KST.
    ResolutionDate,
}

impl CompletionField {
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim() {
            "end_date" => Ok(CompletionField::EndDate),
            "resolution_date" => Ok(CompletionField::ResolutionDate),
            other => Err(Error::Config(format!(
                "unknown completion_field '{other}' (expected end_date or resolution_date)"
            ))),
        }
    }
}

/// Applies an [`EfficiencyStrategy`] to collections of units.
pub struct EfficiencyCalculator {
    strategy: Box<dyn EfficiencyStrategy>,
    completion_field: CompletionField,
}

impl Default for EfficiencyCalculator {
    fn default() -> Self {
        Self::new(DueDateStrategy)
    }
}

impl EfficiencyCalculator {
    pub fn new(strategy: impl EfficiencyStrategy + 'static) -> Self {
        Self {
            strategy: Box::new(strategy),
            completion_field: CompletionField::default(),
        }
    }

    pub fn with_completion_field(mut self, field: CompletionField) -> Self {
        self.completion_field = field;
        self
    }

    pub fn completion_field(&self) -> CompletionField {
        self.completion_field
    }

    /// Completion instant of a unit, if it has a usable one.
    pub fn completion(&self, unit: &Unit) -> Option<DateTime<FixedOffset>> {
        match self.completion_field {
            CompletionField::EndDate => to_kst_end_of_day(unit.end_date.as_deref()?),
            CompletionField::ResolutionDate => to_kst(unit.resolution_date.as_deref()?),
        }
    }

    /// KST calendar day of the completion instant.
    pub fn completion_day(&self, unit: &Unit) -> Option<NaiveDate> {
        self.completion(unit).map(|dt| dt.date_naive())
    }

    /// Compute OTDR and AOD over `units`. Order of the input does not matter.
    pub fn calculate<'a, I>(&self, units: I) -> EfficiencyResult
    where
        I: IntoIterator<Item = &'a Unit>,
    {
        let mut result = EfficiencyResult::default();
        let mut total_overdue_days: i64 = 0;

        for unit in units {
            if !unit.is_done() {
                continue;
            }
            let Some(completion) = self.completion(unit) else {
                continue;
            };
            result.total_resolved += 1;

            let Some(deadline) = self.strategy.parse_deadline(unit.due_date.as_deref()) else {
                if unit.has_due_date() {
                    log::debug!("{}: unparsable due date {:?}", unit.key, unit.due_date);
                }
                result.excluded_no_due_date += 1;
                continue;
            };
            result.resolved_with_due_date += 1;

            if self.strategy.is_on_time(&completion, &deadline) {
                result.on_time_count += 1;
            } else {
                result.overdue_count += 1;
                total_overdue_days += self.strategy.overdue_days(&completion, &deadline);
            }
        }

        if result.resolved_with_due_date > 0 {
            result.otdr = result.on_time_count as f64 / result.resolved_with_due_date as f64;
        }
        if result.overdue_count > 0 {
            result.aod = total_overdue_days as f64 / result.overdue_count as f64;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::*;
    use crate::model::StatusCategory;

    #[test]
    fn test_empty_input() {
        let calc = EfficiencyCalculator::default();
        let r = calc.calculate(&Vec::<Unit>::new());
        assert_eq!(r, EfficiencyResult::default());
    }

    #[test]
    fn test_otdr_and_aod() {
        let units = vec![
            unit("T-1").due("2025-01-10").ended("2025-01-08"),
            unit("T-2").due("2025-01-10").ended("2025-01-15"),
        ];
        let r = EfficiencyCalculator::default().calculate(&units);
        assert_eq!(r.total_resolved, 2);
        assert_eq!(r.resolved_with_due_date, 2);
        assert_eq!(r.on_time_count, 1);
        assert_eq!(r.overdue_count, 1);
        assert_eq!(r.otdr, 0.5);
        assert_eq!(r.aod, 5.0);
    }

    #[test]
    fn test_completed_on_due_day_is_on_time() {
        let units = vec![unit("T-1").due("2025-01-10").ended("2025-01-10")];
        let r = EfficiencyCalculator::default().calculate(&units);
        assert_eq!(r.on_time_count, 1);
        assert_eq!(r.otdr, 1.0);
        assert_eq!(r.aod, 0.0);
    }

    #[test]
    fn test_missing_due_date_is_excluded_from_denominators() {
        let units = vec![
            unit("T-1").ended("2025-01-08"),
            unit("T-2").due("2025-01-10").ended("2025-01-09"),
        ];
        let r = EfficiencyCalculator::default().calculate(&units);
        assert_eq!(r.total_resolved, 2);
        assert_eq!(r.excluded_no_due_date, 1);
        assert_eq!(r.resolved_with_due_date, 1);
        assert_eq!(r.on_time_count, 1);
        assert_eq!(r.overdue_count, 0);
        assert_eq!(r.otdr, 1.0);
    }

    #[test]
    fn test_unparsable_due_date_counts_as_missing() {
        let units = vec![unit("T-1").due("next week").ended("2025-01-08")];
        let r = EfficiencyCalculator::default().calculate(&units);
        assert_eq!(r.total_resolved, 1);
        assert_eq!(r.resolved_with_due_date, 0);
        assert_eq!(r.excluded_no_due_date, 1);
        assert_eq!(r.otdr, 0.0);
    }

    #[test]
    fn test_only_done_units_with_end_date_are_resolved() {
        let units = vec![
            unit("T-1").due("2025-01-10").ended("2025-01-08").category(StatusCategory::Indeterminate),
            unit("T-2").due("2025-01-10"),
            unit("T-3").due("2025-01-10").ended("2025-01-12"),
        ];
        let r = EfficiencyCalculator::default().calculate(&units);
        assert_eq!(r.total_resolved, 1);
        assert_eq!(r.overdue_count, 1);
        assert_eq!(r.aod, 2.0);
        assert_eq!(r.otdr, 0.0);
    }

    #[test]
    fn test_aod_averages_late_units_only() {
        let units = vec![
            unit("T-1").due("2025-01-10").ended("2025-01-11"),
            unit("T-2").due("2025-01-10").ended("2025-01-14"),
            unit("T-3").due("2025-01-10").ended("2025-01-01"),
        ];
        let r = EfficiencyCalculator::default().calculate(&units);
        assert_eq!(r.overdue_count, 2);
        assert_eq!(r.aod, 2.5);
        assert!((r.otdr - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_resolution_date_completion_field() {
        let mut late = unit("T-1").due("2025-01-10");
        late.resolution_date = Some("2025-01-12T09:00:00.000+0900".to_string());
        let mut early = unit("T-2").due("2025-01-10");
        early.resolution_date = Some("2025-01-10T14:00:00Z".to_string());

        let calc = EfficiencyCalculator::default().with_completion_field(CompletionField::ResolutionDate);
        let r = calc.calculate([&late, &early]);
        assert_eq!(r.total_resolved, 2);
        assert_eq!(r.on_time_count, 1);
        assert_eq!(r.overdue_count, 1);
        assert_eq!(r.aod, 2.0);

        // Neither unit has an end date, so the default field resolves nothing.
        let r = EfficiencyCalculator::default().calculate([&late, &early]);
        assert_eq!(r.total_resolved, 0);
    }

    #[test]
    fn test_completion_day_is_kst_calendar_day() {
        let mut u = unit("T-1").ended("2025-01-31");
        u.resolution_date = Some("2025-01-31T16:30:00Z".to_string());

        let by_end = EfficiencyCalculator::default();
        assert_eq!(by_end.completion_day(&u), NaiveDate::from_ymd_opt(2025, 1, 31));

        let by_resolution =
            EfficiencyCalculator::default().with_completion_field(CompletionField::ResolutionDate);
        assert_eq!(by_resolution.completion_day(&u), NaiveDate::from_ymd_opt(2025, 2, 1));
        assert_eq!(by_resolution.completion_day(&unit("T-2")), None);
    }

    struct GraceDayStrategy;

    impl EfficiencyStrategy for GraceDayStrategy {
        fn parse_deadline(&self, due_date: Option<&str>) -> Option<DateTime<FixedOffset>> {
            DueDateStrategy
                .parse_deadline(due_date)
                .map(|d| d + chrono::Duration::days(1))
        }
        fn is_on_time(&self, c: &DateTime<FixedOffset>, d: &DateTime<FixedOffset>) -> bool {
            c <= d
        }
        fn overdue_days(&self, c: &DateTime<FixedOffset>, d: &DateTime<FixedOffset>) -> i64 {
            DueDateStrategy.overdue_days(c, d)
        }
    }

    #[test]
    fn test_strategy_is_substitutable() {
        let units = vec![unit("T-1").due("2025-01-10").ended("2025-01-11")];
        let strict = EfficiencyCalculator::default().calculate(&units);
        let lenient = EfficiencyCalculator::new(GraceDayStrategy).calculate(&units);
        assert_eq!(strict.on_time_count, 0);
        assert_eq!(lenient.on_time_count, 1);
    }

    #[test]
    fn test_completion_field_parse() {
        assert_eq!(CompletionField::parse("end_date").unwrap(), CompletionField::EndDate);
        assert_eq!(
            CompletionField::parse("resolution_date").unwrap(),
            CompletionField::ResolutionDate
        );
        assert!(CompletionField::parse("closed").is_err());
    }
}
