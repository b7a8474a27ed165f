use std::sync::LazyLock;

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use regex::Regex;

use crate::date_util::{last_day_of_month, quarter_of, today_kst};
use crate::error::{Error, Result};

static RE_HALF: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{4})-[Hh]([12])$").unwrap());
static RE_QUARTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})-[Qq]([1-4])$").unwrap());
static RE_WEEK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{4})-[Ww](\d{1,2})$").unwrap());
static RE_MONTH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{4})-(\d{2})$").unwrap());
static RE_ROLLING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{1,4})[dD]$").unwrap());

/// Calendar span a to-date period runs over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Span {
    Year,
    Half,
    Quarter,
    Month,
    Week,
}

/// A reporting window for the dashboard filters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Period {
    Year(i32),
    Half(i32, u8),
    Quarter(i32, u8),
    Month(i32, u8),
    Week(i32, u8),
    /// The last N days, ending on (and including) `as_of`.
    Rolling(u32, NaiveDate),
    /// From the start of the span containing `as_of` through `as_of`.
    ToDate(Span, NaiveDate),
}

impl Period {
    /// Parse a period string relative to today in KST.
    ///
    /// Supported formats:
    /// - `2025`, `2025-H1`, `2025-Q1`, `2025-01`, `2025-W05`
    /// - `30d`: the last 30 days
    /// - `ytd`, `htd`, `qtd`, `mtd`, `wtd`: current span to date
    pub fn parse(s: &str) -> Result<Self> {
        Self::parse_as_of(s, today_kst())
    }

    pub fn parse_as_of(s: &str, today: NaiveDate) -> Result<Self> {
        let s = s.trim();

        let span = match s.to_lowercase().as_str() {
            "ytd" => Some(Span::Year),
            "htd" => Some(Span::Half),
            "qtd" => Some(Span::Quarter),
            "mtd" => Some(Span::Month),
            "wtd" => Some(Span::Week),
            _ => None,
        };
        if let Some(span) = span {
            return Ok(Period::ToDate(span, today));
        }

        let period = if let Some(caps) = RE_ROLLING.captures(s) {
            let days: u32 = caps[1].parse().unwrap_or(0);
            if days == 0 {
                return Err(Error::PeriodParse(format!("empty rolling window: {s}")));
            }
            Period::Rolling(days, today)
        } else if s.len() == 4 && s.chars().all(|c| c.is_ascii_digit()) {
            Period::Year(year_of(s)?)
        } else if let Some(caps) = RE_HALF.captures(s) {
            Period::Half(year_of(&caps[1])?, number_of(&caps[2])?)
        } else if let Some(caps) = RE_QUARTER.captures(s) {
            Period::Quarter(year_of(&caps[1])?, number_of(&caps[2])?)
        } else if let Some(caps) = RE_WEEK.captures(s) {
            Period::Week(year_of(&caps[1])?, number_of(&caps[2])?)
        } else if let Some(caps) = RE_MONTH.captures(s) {
            Period::Month(year_of(&caps[1])?, number_of(&caps[2])?)
        } else {
            return Err(Error::PeriodParse(format!("unrecognized period: {s}")));
        };

        // Reject periods with no calendar range (month 13, week 54).
        period.date_range()?;
        Ok(period)
    }

    /// Canonical key, e.g. `2025-Q1` or `30d`.
    pub fn to_key(&self) -> String {
        match self {
            Period::Year(y) => format!("{y}"),
            Period::Half(y, h) => format!("{y}-H{h}"),
            Period::Quarter(y, q) => format!("{y}-Q{q}"),
            Period::Month(y, m) => format!("{y}-{m:02}"),
            Period::Week(y, w) => format!("{y}-W{w:02}"),
            Period::Rolling(n, _) => format!("{n}d"),
            Period::ToDate(span, _) => match span {
                Span::Year => "ytd",
                Span::Half => "htd",
                Span::Quarter => "qtd",
                Span::Month => "mtd",
                Span::Week => "wtd",
            }
            .to_string(),
        }
    }

    /// Inclusive first and last day of the period.
    pub fn date_range(&self) -> Result<(NaiveDate, NaiveDate)> {
        let invalid = || Error::PeriodParse(format!("no such period: {}", self.to_key()));
        let ymd = |y: i32, m: u32, d: u32| NaiveDate::from_ymd_opt(y, m, d).ok_or_else(invalid);

        match *self {
            Period::Year(y) => Ok((ymd(y, 1, 1)?, ymd(y, 12, 31)?)),
            Period::Half(y, h) => match h {
                1 => Ok((ymd(y, 1, 1)?, ymd(y, 6, 30)?)),
                2 => Ok((ymd(y, 7, 1)?, ymd(y, 12, 31)?)),
                _ => Err(invalid()),
            },
            Period::Quarter(y, q) if (1..=4).contains(&q) => {
                let first = (q as u32 - 1) * 3 + 1;
                Ok((ymd(y, first, 1)?, last_day_of_month(y, first + 2)))
            }
            Period::Month(y, m) if (1..=12).contains(&m) => {
                Ok((ymd(y, m as u32, 1)?, last_day_of_month(y, m as u32)))
            }
            Period::Week(y, w) => {
                let start = NaiveDate::from_isoywd_opt(y, w as u32, Weekday::Mon).ok_or_else(invalid)?;
                Ok((start, start + Duration::days(6)))
            }
            Period::Rolling(n, as_of) => Ok((as_of - Duration::days(n as i64 - 1), as_of)),
            Period::ToDate(span, as_of) => {
                let start = match span {
                    Span::Year => ymd(as_of.year(), 1, 1)?,
                    Span::Half => ymd(as_of.year(), if as_of.month() <= 6 { 1 } else { 7 }, 1)?,
                    Span::Quarter => ymd(as_of.year(), (quarter_of(as_of) as u32 - 1) * 3 + 1, 1)?,
                    Span::Month => ymd(as_of.year(), as_of.month(), 1)?,
                    Span::Week => {
                        as_of - Duration::days(as_of.weekday().num_days_from_monday() as i64)
                    }
                };
                Ok((start, as_of))
            }
            Period::Quarter(..) | Period::Month(..) => Err(invalid()),
        }
    }
}

fn year_of(s: &str) -> Result<i32> {
    s.parse()
        .map_err(|_| Error::PeriodParse(format!("invalid year: {s}")))
}

fn number_of(s: &str) -> Result<u8> {
    s.parse()
        .map_err(|_| Error::PeriodParse(format!("invalid number: {s}")))
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_key())
    }
}
