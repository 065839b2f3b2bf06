use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::ModelError;

/// Inclusive range of calendar dates (UTC).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, ModelError> {
        if start > end {
            return Err(ModelError::InvertedRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    pub fn contains_instant(&self, at: DateTime<Utc>) -> bool {
        self.contains(at.date_naive())
    }

    /// Number of calendar days covered, both ends included.
    pub fn days(&self) -> u64 {
        (self.end - self.start).num_days() as u64 + 1
    }

    /// The equally long range ending the day before this one starts.
    pub fn preceding(&self) -> Option<DateRange> {
        let end = self.start.checked_sub_days(Days::new(1))?;
        let start = self.start.checked_sub_days(Days::new(self.days()))?;
        Some(DateRange { start, end })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_inclusive_bounds() {
        let range = DateRange::new(date(2024, 3, 1), date(2024, 3, 31)).unwrap();
        assert!(range.contains(date(2024, 3, 1)));
        assert!(range.contains(date(2024, 3, 31)));
        assert!(!range.contains(date(2024, 4, 1)));
        assert_eq!(range.days(), 31);
    }

    #[test]
    fn test_preceding_period_has_same_length() {
        let range = DateRange::new(date(2024, 3, 8), date(2024, 3, 14)).unwrap();
        let prior = range.preceding().unwrap();
        assert_eq!(prior.start, date(2024, 3, 1));
        assert_eq!(prior.end, date(2024, 3, 7));
        assert_eq!(prior.days(), range.days());
    }

    #[test]
    fn test_rejects_inverted_range() {
        assert!(DateRange::new(date(2024, 3, 2), date(2024, 3, 1)).is_err());
    }
}
