// src/pipeline/periods.rs

//! Gap resolution: which periods a sync must (re)check.

use crate::models::Period;

/// Periods to check, oldest first.
///
/// Starts right after `watermark`, or at `epoch` for an empty store, and runs
/// through `current` inclusive. With a `cap`, only the most recent periods are
/// kept; `current` is always among them.
pub fn periods_to_check(
    watermark: Option<Period>,
    epoch: Period,
    current: Period,
    cap: Option<usize>,
) -> Vec<Period> {
    let start = match watermark {
        Some(mark) if mark >= current => return Vec::new(),
        Some(mark) => mark.next(),
        None => epoch,
    };

    let mut periods = Vec::new();
    let mut period = start;
    while period <= current {
        periods.push(period);
        period = period.next();
    }

    if let Some(cap) = cap {
        let keep = cap.max(1);
        if periods.len() > keep {
            periods.drain(..periods.len() - keep);
        }
    }

    periods
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::weeks_in_year;

    fn p(year: i32, week: u32) -> Period {
        Period::new(year, week).unwrap()
    }

    #[test]
    fn test_empty_store_starts_at_epoch() {
        let periods = periods_to_check(None, p(2019, 1), p(2019, 3), None);
        assert_eq!(periods, vec![p(2019, 1), p(2019, 2), p(2019, 3)]);
    }

    #[test]
    fn test_starts_after_watermark() {
        let periods = periods_to_check(Some(p(2021, 9)), p(2019, 1), p(2021, 11), None);
        assert_eq!(periods, vec![p(2021, 10), p(2021, 11)]);
    }

    #[test]
    fn test_up_to_date_is_empty() {
        assert!(periods_to_check(Some(p(2024, 5)), p(2019, 1), p(2024, 5), None).is_empty());
        assert!(periods_to_check(Some(p(2024, 9)), p(2019, 1), p(2024, 5), None).is_empty());
    }

    #[test]
    fn test_epoch_after_current_is_empty() {
        assert!(periods_to_check(None, p(2025, 1), p(2024, 5), None).is_empty());
    }

    #[test]
    fn test_spans_53_week_year() {
        let periods = periods_to_check(Some(p(2020, 51)), p(2019, 1), p(2021, 2), None);
        assert_eq!(
            periods,
            vec![p(2020, 52), p(2020, 53), p(2021, 1), p(2021, 2)]
        );
    }

    #[test]
    fn test_spans_52_week_year() {
        let periods = periods_to_check(Some(p(2019, 52)), p(2019, 1), p(2020, 1), None);
        assert_eq!(periods, vec![p(2020, 1)]);
    }

    #[test]
    fn test_cap_keeps_most_recent() {
        let periods = periods_to_check(None, p(2019, 1), p(2019, 10), Some(3));
        assert_eq!(periods, vec![p(2019, 8), p(2019, 9), p(2019, 10)]);
    }

    #[test]
    fn test_zero_cap_still_includes_current() {
        let periods = periods_to_check(None, p(2019, 1), p(2019, 10), Some(0));
        assert_eq!(periods, vec![p(2019, 10)]);
    }

    #[test]
    fn test_gap_set_is_exact_over_many_years() {
        let watermark = p(2019, 30);
        let current = p(2024, 12);
        let periods = periods_to_check(Some(watermark), p(2019, 1), current, None);

        let expected_len: u32 = (weeks_in_year(2019) - 30)
            + (2020..=2023).map(weeks_in_year).sum::<u32>()
            + 12;
        assert_eq!(periods.len() as u32, expected_len);
        assert_eq!(periods.first(), Some(&p(2019, 31)));
        assert_eq!(periods.last(), Some(&current));
        assert!(periods.windows(2).all(|w| w[0] < w[1] && w[0].next() == w[1]));
    }
}
