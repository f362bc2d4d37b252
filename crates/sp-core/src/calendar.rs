//! Period partitioning and working-day arithmetic.
//!
//! Metrics are aggregated over aligned periods so that snapshots computed
//! from different requested ranges share the same `period_start` key:
//!
//! | Granularity | Period |
//! |-------------|--------|
//! | weekly      | Monday to Sunday |
//! | monthly     | calendar month |
//! | quarterly   | Jan-Mar, Apr-Jun, Jul-Sep, Oct-Dec |

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};

/// Time-bucket size used for metric aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Granularity {
    Weekly,
    Monthly,
    Quarterly,
}

impl Granularity {
    /// String representation for storage and display.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Quarterly => "quarterly",
        }
    }

    /// Returns the aligned period containing `date`.
    pub fn period_containing(self, date: NaiveDate) -> Period {
        let start = match self {
            Self::Weekly => {
                let offset = u64::from(date.weekday().num_days_from_monday());
                date - Days::new(offset)
            }
            Self::Monthly => first_of_month(date.year(), date.month()),
            Self::Quarterly => {
                let quarter_month = (date.month0() / 3) * 3 + 1;
                first_of_month(date.year(), quarter_month)
            }
        };
        let end = match self {
            Self::Weekly => start + Days::new(6),
            Self::Monthly => start + Months::new(1) - Days::new(1),
            Self::Quarterly => start + Months::new(3) - Days::new(1),
        };
        Period {
            start,
            end,
            granularity: self,
        }
    }

    /// Partitions `[start, end]` into aligned periods.
    ///
    /// The first period is the one containing `start`; periods are emitted
    /// while their start is on or before `end`. Returns an empty list when
    /// `end < start`.
    pub fn periods(self, start: NaiveDate, end: NaiveDate) -> Vec<Period> {
        let mut periods = Vec::new();
        if end < start {
            return periods;
        }
        let mut current = self.period_containing(start);
        while current.start <= end {
            let next_start = current.end + Days::new(1);
            periods.push(current);
            current = self.period_containing(next_start);
        }
        periods
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = UnknownGranularity;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "weekly" | "week" => Ok(Self::Weekly),
            "monthly" | "month" => Ok(Self::Monthly),
            "quarterly" | "quarter" => Ok(Self::Quarterly),
            _ => Err(UnknownGranularity(s.to_string())),
        }
    }
}

impl Serialize for Granularity {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Granularity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Error type for unknown granularity strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownGranularity(pub String);

impl fmt::Display for UnknownGranularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown granularity: {} (expected weekly, monthly or quarterly)",
            self.0
        )
    }
}

impl std::error::Error for UnknownGranularity {}

/// An aligned aggregation period, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Period {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub granularity: Granularity,
}

impl Period {
    /// Returns true if `date` falls inside the period.
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Iterates every calendar day of the period.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        self.start.iter_days().take_while({
            let end = self.end;
            move |d| *d <= end
        })
    }
}

/// Working-day assumptions used to convert hours into calendar spans.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorkingTime {
    /// Working days per week, counted from Monday. Default: 5.
    pub days_per_week: u32,
    /// Hours in a standard working day. Default: 7.
    pub hours_per_day: f64,
}

impl Default for WorkingTime {
    fn default() -> Self {
        Self {
            days_per_week: 5,
            hours_per_day: 7.0,
        }
    }
}

impl WorkingTime {
    /// Days per week clamped to a usable `1..=7`.
    pub fn effective_days_per_week(&self) -> u32 {
        self.days_per_week.clamp(1, 7)
    }

    /// Returns true if `date` is a working day.
    pub fn is_working_day(&self, date: NaiveDate) -> bool {
        date.weekday().num_days_from_monday() < self.effective_days_per_week()
    }

    /// Returns the first working day on or after `date`.
    pub fn next_working_day(&self, date: NaiveDate) -> NaiveDate {
        let mut current = date;
        while !self.is_working_day(current) {
            current = current + Days::new(1);
        }
        current
    }

    /// Returns the last day of a span of `days` working days starting at `start`.
    ///
    /// `start` counts as the first day when it is a working day; a span of
    /// zero or one day ends on the first working day.
    pub fn add_working_days(&self, start: NaiveDate, days: u32) -> NaiveDate {
        let mut current = self.next_working_day(start);
        let mut counted = 1;
        while counted < days {
            current = self.next_working_day(current + Days::new(1));
            counted += 1;
        }
        current
    }

    /// Number of working days needed to cover `hours` at `hours_per_day`.
    #[expect(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "value is a positive, ceil'd day count"
    )]
    pub fn days_for_hours(&self, hours: f64) -> u32 {
        if hours <= 0.0 || self.hours_per_day <= 0.0 {
            return 0;
        }
        (hours / self.hours_per_day).ceil() as u32
    }
}

fn first_of_month(year: i32, month: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(NaiveDate::MIN)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn weekly_periods_align_to_monday() {
        // 2025-01-15 is a Wednesday
        let periods = Granularity::Weekly.periods(date(2025, 1, 15), date(2025, 1, 27));
        assert_eq!(periods.len(), 3);
        assert_eq!(periods[0].start, date(2025, 1, 13));
        assert_eq!(periods[0].end, date(2025, 1, 19));
        assert_eq!(periods[2].start, date(2025, 1, 27));
        assert_eq!(periods[2].end, date(2025, 2, 2));
    }

    #[test]
    fn monthly_periods_cover_calendar_months() {
        let periods = Granularity::Monthly.periods(date(2024, 1, 20), date(2024, 3, 1));
        let bounds: Vec<_> = periods.iter().map(|p| (p.start, p.end)).collect();
        assert_eq!(
            bounds,
            vec![
                (date(2024, 1, 1), date(2024, 1, 31)),
                (date(2024, 2, 1), date(2024, 2, 29)),
                (date(2024, 3, 1), date(2024, 3, 31)),
            ]
        );
    }

    #[test]
    fn quarterly_periods_use_three_month_blocks() {
        let periods = Granularity::Quarterly.periods(date(2024, 2, 10), date(2024, 12, 31));
        let starts: Vec<_> = periods.iter().map(|p| p.start).collect();
        assert_eq!(
            starts,
            vec![
                date(2024, 1, 1),
                date(2024, 4, 1),
                date(2024, 7, 1),
                date(2024, 10, 1)
            ]
        );
        assert_eq!(periods[3].end, date(2024, 12, 31));
    }

    #[test]
    fn periods_empty_when_end_before_start() {
        assert!(
            Granularity::Monthly
                .periods(date(2024, 3, 1), date(2024, 2, 1))
                .is_empty()
        );
    }

    #[test]
    fn granularity_parses_case_insensitively() {
        assert_eq!("Weekly".parse::<Granularity>(), Ok(Granularity::Weekly));
        assert_eq!("quarterly".parse::<Granularity>(), Ok(Granularity::Quarterly));
        let err = "daily".parse::<Granularity>().unwrap_err();
        assert!(err.to_string().contains("daily"));
    }

    #[test]
    fn granularity_serde_roundtrip() {
        let json = serde_json::to_string(&Granularity::Monthly).unwrap();
        assert_eq!(json, "\"monthly\"");
        let parsed: Granularity = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, Granularity::Monthly);
    }

    #[test]
    fn working_days_skip_weekends() {
        let wt = WorkingTime::default();
        assert!(wt.is_working_day(date(2025, 1, 17)));
        assert!(!wt.is_working_day(date(2025, 1, 18)));
        assert!(!wt.is_working_day(date(2025, 1, 19)));
    }

    #[test]
    fn add_working_days_spans_weekend() {
        let wt = WorkingTime::default();
        // Thursday + 3 working days = Thu, Fri, Mon
        assert_eq!(wt.add_working_days(date(2025, 1, 16), 3), date(2025, 1, 20));
        // Starting on Saturday rolls to Monday
        assert_eq!(wt.add_working_days(date(2025, 1, 18), 1), date(2025, 1, 20));
    }

    #[test]
    fn days_for_hours_rounds_up() {
        let wt = WorkingTime::default();
        assert_eq!(wt.days_for_hours(15.0), 3);
        assert_eq!(wt.days_for_hours(14.0), 2);
        assert_eq!(wt.days_for_hours(0.0), 0);
    }
}
