// src/models/period.rs

//! ISO week periods, the publication cadence of the bulletin archive.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Local, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// A `(year, ISO week)` pair.
///
/// Field order matters: the derived `Ord` compares year first, then week.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Period {
    pub year: i32,
    pub week: u32,
}

impl Period {
    /// Create a period, checking the week against the year's ISO length.
    pub fn new(year: i32, week: u32) -> Result<Self> {
        if week == 0 || week > weeks_in_year(year) {
            return Err(AppError::validation(format!(
                "week {week} is outside 1..={} for {year}",
                weeks_in_year(year)
            )));
        }
        Ok(Self { year, week })
    }

    /// The period containing today's local date.
    pub fn current() -> Self {
        Self::containing(Local::now().date_naive())
    }

    /// The period containing a given date.
    pub fn containing(date: NaiveDate) -> Self {
        let iso = date.iso_week();
        Self {
            year: iso.year(),
            week: iso.week(),
        }
    }

    /// The period immediately after this one, rolling over year ends.
    ///
    /// A week beyond the year's length (legacy data) also rolls over.
    pub fn next(self) -> Self {
        if self.week >= weeks_in_year(self.year) {
            Self {
                year: self.year + 1,
                week: 1,
            }
        } else {
            Self {
                year: self.year,
                week: self.week + 1,
            }
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-W{:02}", self.year, self.week)
    }
}

impl FromStr for Period {
    type Err = AppError;

    /// Accepts `2021-W10` as well as `2021-10`.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || AppError::validation(format!("'{s}' is not a YEAR-WEEK period"));
        let (year, week) = s.trim().split_once('-').ok_or_else(invalid)?;
        let week = week.strip_prefix(['W', 'w']).unwrap_or(week);
        let year = year.parse().map_err(|_| invalid())?;
        let week = week.parse().map_err(|_| invalid())?;
        Self::new(year, week)
    }
}

/// Number of ISO weeks in a year: 53 when the year has a week-53 Monday.
pub fn weeks_in_year(year: i32) -> u32 {
    if NaiveDate::from_isoywd_opt(year, 53, Weekday::Mon).is_some() {
        53
    } else {
        52
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weeks_in_year() {
        assert_eq!(weeks_in_year(2019), 52);
        assert_eq!(weeks_in_year(2020), 53);
        assert_eq!(weeks_in_year(2026), 53);
        assert_eq!(weeks_in_year(2023), 52);
    }

    #[test]
    fn test_ordering_is_year_then_week() {
        let a = Period::new(2020, 53).unwrap();
        let b = Period::new(2021, 1).unwrap();
        assert!(a < b);
        assert!(Period::new(2021, 2).unwrap() > Period::new(2021, 1).unwrap());
    }

    #[test]
    fn test_next_rolls_over() {
        assert_eq!(Period::new(2020, 53).unwrap().next(), Period::new(2021, 1).unwrap());
        assert_eq!(Period::new(2019, 52).unwrap().next(), Period::new(2020, 1).unwrap());
        assert_eq!(Period::new(2020, 52).unwrap().next(), Period::new(2020, 53).unwrap());
    }

    #[test]
    fn test_rejects_invalid_week() {
        assert!(Period::new(2019, 53).is_err());
        assert!(Period::new(2019, 0).is_err());
    }

    #[test]
    fn test_containing_uses_iso_year() {
        // 2021-01-01 belongs to the last ISO week of 2020.
        let date = NaiveDate::from_ymd_opt(2021, 1, 1).unwrap();
        assert_eq!(Period::containing(date), Period::new(2020, 53).unwrap());
    }

    #[test]
    fn test_display() {
        assert_eq!(Period::new(2021, 3).unwrap().to_string(), "2021-W03");
    }

    #[test]
    fn test_parse() {
        assert_eq!("2021-W10".parse::<Period>().unwrap(), Period::new(2021, 10).unwrap());
        assert_eq!("2020-53".parse::<Period>().unwrap(), Period::new(2020, 53).unwrap());
        assert!("2019-W53".parse::<Period>().is_err());
        assert!("2019".parse::<Period>().is_err());
        assert!("abcd-W01".parse::<Period>().is_err());
    }
}
