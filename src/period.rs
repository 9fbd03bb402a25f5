// 📅 Reporting Periods - month/year selection and quarter math
// Periods arrive pre-parsed from the operator; quarters drive link folders

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

// ============================================================================
// PERIOD
// ============================================================================

/// One reporting period (calendar month of a given year)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Period {
    pub month: u32,
    pub year: i32,
}

impl Period {
    pub fn new(month: u32, year: i32) -> Self {
        Period { month, year }
    }

    /// True if the given date falls inside this period
    pub fn contains(&self, date: NaiveDate) -> bool {
        date.month() == self.month && date.year() == self.year
    }

    /// The quarter this period belongs to
    pub fn quarter(&self) -> Quarter {
        Quarter {
            number: (self.month - 1) / 3 + 1,
            year: self.year,
        }
    }

    /// Label used in report filenames, e.g. "2023 04"
    pub fn label(&self) -> String {
        format!("{} {:02}", self.year, self.month)
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}/{}", self.month, self.year)
    }
}

// ============================================================================
// QUARTER
// ============================================================================

/// Calendar quarter; invoice images are filed into per-quarter folders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quarter {
    pub number: u32,
    pub year: i32,
}

impl Quarter {
    /// The following quarter, rolling Q4 into Q1 of the next year
    pub fn next(&self) -> Quarter {
        if self.number >= 4 {
            Quarter {
                number: 1,
                year: self.year + 1,
            }
        } else {
            Quarter {
                number: self.number + 1,
                year: self.year,
            }
        }
    }

    /// Folder name the originals are filed under, e.g. "2023 Q2 Invoices"
    pub fn folder_name(&self) -> String {
        format!("{} Q{} Invoices", self.year, self.number)
    }
}

impl std::fmt::Display for Quarter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Q{}", self.number)
    }
}

// ============================================================================
// MONTH SPEC PARSING
// ============================================================================

/// Parse operator input like "1-3", "1, 2, 6" or "4" into months.
///
/// Out-of-range months are dropped; the result is sorted and de-duplicated.
/// Returns an empty vec when nothing parses (caller decides how to react).
pub fn parse_month_spec(spec: &str) -> Vec<u32> {
    let spec = spec.trim();
    let mut months: Vec<u32> = Vec::new();

    if let Some((start, end)) = spec.split_once('-') {
        if let (Ok(start), Ok(end)) = (start.trim().parse::<u32>(), end.trim().parse::<u32>()) {
            months.extend(start..=end);
        }
    } else if spec.contains(',') {
        for part in spec.split(',') {
            if let Ok(m) = part.trim().parse::<u32>() {
                months.push(m);
            }
        }
    } else if let Ok(m) = spec.parse::<u32>() {
        months.push(m);
    }

    months.retain(|m| (1..=12).contains(m));
    months.sort_unstable();
    months.dedup();
    months
}

/// Expand a month spec against a year into periods
pub fn periods_for(spec: &str, year: i32) -> Vec<Period> {
    parse_month_spec(spec)
        .into_iter()
        .map(|month| Period::new(month, year))
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_range() {
        assert_eq!(parse_month_spec("1-3"), vec![1, 2, 3]);
    }

    #[test]
    fn test_parse_list() {
        assert_eq!(parse_month_spec("1, 2, 6"), vec![1, 2, 6]);
    }

    #[test]
    fn test_parse_single() {
        assert_eq!(parse_month_spec(" 4 "), vec![4]);
    }

    #[test]
    fn test_parse_drops_out_of_range() {
        assert_eq!(parse_month_spec("0, 5, 13"), vec![5]);
        assert_eq!(parse_month_spec("10-14"), vec![10, 11, 12]);
    }

    #[test]
    fn test_parse_garbage_is_empty() {
        assert!(parse_month_spec("march").is_empty());
        assert!(parse_month_spec("").is_empty());
    }

    #[test]
    fn test_parse_dedups_and_sorts() {
        assert_eq!(parse_month_spec("6, 2, 6, 1"), vec![1, 2, 6]);
    }

    #[test]
    fn test_quarter_of_month() {
        assert_eq!(Period::new(1, 2023).quarter().number, 1);
        assert_eq!(Period::new(6, 2023).quarter().number, 2);
        assert_eq!(Period::new(9, 2023).quarter().number, 3);
        assert_eq!(Period::new(12, 2023).quarter().number, 4);
    }

    #[test]
    fn test_quarter_rollover() {
        let q4 = Period::new(11, 2023).quarter();
        assert_eq!(q4.number, 4);
        let next = q4.next();
        assert_eq!(next.number, 1);
        assert_eq!(next.year, 2024);
    }

    #[test]
    fn test_quarter_folder_name() {
        assert_eq!(Period::new(5, 2023).quarter().folder_name(), "2023 Q2 Invoices");
    }

    #[test]
    fn test_period_contains() {
        let period = Period::new(4, 2023);
        assert!(period.contains(NaiveDate::from_ymd_opt(2023, 4, 15).unwrap()));
        assert!(!period.contains(NaiveDate::from_ymd_opt(2023, 5, 1).unwrap()));
        assert!(!period.contains(NaiveDate::from_ymd_opt(2022, 4, 15).unwrap()));
    }
}
