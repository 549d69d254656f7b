//! Date parsing, validation and range expansion.

use chrono::NaiveDate;

use crate::error::{MobilityError, Result};
use crate::model::DatasetVersion;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parses a `YYYY-MM-DD` date.
pub fn parse_date(value: &str) -> Result<NaiveDate> {
    let trimmed = value.trim();
    // chrono accepts non-padded fields; the contract is the fixed-width form
    if trimmed.len() != 10 {
        return Err(MobilityError::InvalidDate(value.to_string()));
    }
    NaiveDate::parse_from_str(trimmed, DATE_FORMAT)
        .map_err(|_| MobilityError::InvalidDate(value.to_string()))
}

/// Inclusive, ordered list of ISO dates between `start` and `end`.
pub fn get_dates_between(start: &str, end: &str) -> Result<Vec<String>> {
    let start_date = parse_date(start)?;
    let end_date = parse_date(end)?;
    Ok(date_range(start_date, end_date)?
        .into_iter()
        .map(|d| d.format(DATE_FORMAT).to_string())
        .collect())
}

pub fn date_range(start: NaiveDate, end: NaiveDate) -> Result<Vec<NaiveDate>> {
    if start > end {
        return Err(MobilityError::InvalidDateRange {
            start: start.to_string(),
            end: end.to_string(),
        });
    }
    Ok(start.iter_days().take_while(|d| *d <= end).collect())
}

/// First and last day published for a dataset version. `None` means the
/// series is still being extended.
pub fn valid_window(version: DatasetVersion) -> (NaiveDate, Option<NaiveDate>) {
    match version {
        DatasetVersion::V1 => (
            NaiveDate::from_ymd_opt(2020, 2, 14).unwrap_or(NaiveDate::MIN),
            NaiveDate::from_ymd_opt(2021, 5, 9),
        ),
        DatasetVersion::V2 => (
            NaiveDate::from_ymd_opt(2022, 1, 1).unwrap_or(NaiveDate::MIN),
            None,
        ),
    }
}

pub fn ensure_within_window(date: NaiveDate, version: DatasetVersion) -> Result<()> {
    let (first, last) = valid_window(version);
    let after_last = last.is_some_and(|l| date > l);
    if date < first || after_last {
        return Err(MobilityError::DateOutOfRange {
            date: date.to_string(),
            version: version.number(),
            first: first.to_string(),
            last: last.map_or_else(|| "present".to_string(), |l| l.to_string()),
        });
    }
    Ok(())
}

/// Converts a source date field (`20220101`, or an already ISO `2022-01-01`)
/// into its ISO form. Returns `None` when the token is not a date.
pub fn normalize_source_date(token: &str) -> Option<String> {
    let token = token.trim();
    let parsed = if token.len() == 8 {
        NaiveDate::parse_from_str(token, "%Y%m%d").ok()
    } else if token.len() == 10 {
        NaiveDate::parse_from_str(token, DATE_FORMAT).ok()
    } else {
        None
    };
    parsed.map(|d| d.format(DATE_FORMAT).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_dates_between_is_inclusive() {
        let dates = get_dates_between("2022-01-01", "2022-01-03").unwrap();
        assert_eq!(dates, vec!["2022-01-01", "2022-01-02", "2022-01-03"]);
    }

    #[test]
    fn test_get_dates_between_single_day() {
        let dates = get_dates_between("2022-02-28", "2022-02-28").unwrap();
        assert_eq!(dates, vec!["2022-02-28"]);
    }

    #[test]
    fn test_get_dates_between_crosses_month() {
        let dates = get_dates_between("2024-02-28", "2024-03-01").unwrap();
        assert_eq!(dates, vec!["2024-02-28", "2024-02-29", "2024-03-01"]);
    }

    #[test]
    fn test_reversed_range_is_rejected() {
        let err = get_dates_between("2022-01-03", "2022-01-01").unwrap_err();
        assert!(matches!(err, MobilityError::InvalidDateRange { .. }));
    }

    #[test]
    fn test_date_format_is_enforced() {
        assert!(matches!(
            parse_date("2022/01/01"),
            Err(MobilityError::InvalidDate(_))
        ));
        assert!(parse_date("2022-1-1").is_err());
        assert!(parse_date("2022-01-01").is_ok());
    }

    #[test]
    fn test_window_checks() {
        let d = NaiveDate::from_ymd_opt(2020, 3, 11).unwrap();
        assert!(ensure_within_window(d, DatasetVersion::V1).is_ok());
        assert!(ensure_within_window(d, DatasetVersion::V2).is_err());

        let late = NaiveDate::from_ymd_opt(2021, 6, 1).unwrap();
        assert!(ensure_within_window(late, DatasetVersion::V1).is_err());
    }

    #[test]
    fn test_normalize_source_date() {
        assert_eq!(normalize_source_date("20220101").as_deref(), Some("2022-01-01"));
        assert_eq!(normalize_source_date(" 2022-01-01 ").as_deref(), Some("2022-01-01"));
        assert_eq!(normalize_source_date("fecha"), None);
        assert_eq!(normalize_source_date("20221301"), None);
    }
}
