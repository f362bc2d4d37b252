//! Shared utilities for CLI commands.

use std::sync::LazyLock;

use anyhow::Context;
use chrono::{Datelike, Local, Months, NaiveDate};
use regex::Regex;

/// Pre-compiled regex for `YYYY` and `YYYY-MM` period arguments.
static PERIOD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})(?:-(\d{2}))?$").unwrap());

/// Today in the local timezone.
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// First and last day of the month containing `date`.
pub fn month_bounds(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let first = date.with_day(1).unwrap_or(date);
    let last = first
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
        .unwrap_or(first);
    (first, last)
}

/// Parse a period argument into an inclusive date range.
///
/// Supports:
/// - Year: "2025" (January 1 to December 31)
/// - Month: "2025-03" (March 1 to March 31)
pub fn parse_period(s: &str) -> anyhow::Result<(NaiveDate, NaiveDate)> {
    let Some(caps) = PERIOD_RE.captures(s.trim()) else {
        anyhow::bail!("Invalid period: {s}. Use YYYY (e.g., 2025) or YYYY-MM (e.g., 2025-03)");
    };

    let year: i32 = caps[1].parse().context("failed to parse year")?;
    match caps.get(2) {
        Some(month) => {
            let month: u32 = month.as_str().parse().context("failed to parse month")?;
            let first = NaiveDate::from_ymd_opt(year, month, 1)
                .with_context(|| format!("Invalid month in period: {s}"))?;
            Ok(month_bounds(first))
        }
        None => {
            let first = NaiveDate::from_ymd_opt(year, 1, 1)
                .with_context(|| format!("Invalid year in period: {s}"))?;
            let last = NaiveDate::from_ymd_opt(year, 12, 31)
                .with_context(|| format!("Invalid year in period: {s}"))?;
            Ok((first, last))
        }
    }
}

/// Resolve the effective range of a command.
///
/// Explicit `--start`/`--end` override the matching side of the period
/// argument, which in turn overrides `default`.
pub fn resolve_range(
    period: Option<&str>,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    default: (NaiveDate, NaiveDate),
) -> anyhow::Result<(NaiveDate, NaiveDate)> {
    let (base_start, base_end) = match period {
        Some(period) => parse_period(period)?,
        None => default,
    };
    let range = (start.unwrap_or(base_start), end.unwrap_or(base_end));
    if range.1 < range.0 {
        anyhow::bail!("End date {} is before start date {}", range.1, range.0);
    }
    Ok(range)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn parse_period_year() {
        assert_eq!(
            parse_period("2024").unwrap(),
            (date(2024, 1, 1), date(2024, 12, 31))
        );
    }

    #[test]
    fn parse_period_month_handles_leap_february() {
        assert_eq!(
            parse_period("2024-02").unwrap(),
            (date(2024, 2, 1), date(2024, 2, 29))
        );
        assert_eq!(
            parse_period("2025-12").unwrap(),
            (date(2025, 12, 1), date(2025, 12, 31))
        );
    }

    #[test]
    fn parse_period_rejects_bad_input() {
        assert!(parse_period("2025-13").is_err());
        assert!(parse_period("25-01").is_err());
        assert!(parse_period("last week").is_err());
    }

    #[test]
    fn resolve_range_prefers_explicit_dates() {
        let default = (date(2025, 1, 1), date(2025, 1, 31));
        assert_eq!(resolve_range(None, None, None, default).unwrap(), default);
        assert_eq!(
            resolve_range(Some("2025-03"), None, Some(date(2025, 3, 15)), default).unwrap(),
            (date(2025, 3, 1), date(2025, 3, 15))
        );
        assert!(resolve_range(None, Some(date(2025, 2, 1)), None, default).is_err());
    }

    #[test]
    fn month_bounds_of_mid_month_date() {
        assert_eq!(
            month_bounds(date(2025, 4, 17)),
            (date(2025, 4, 1), date(2025, 4, 30))
        );
    }
}
