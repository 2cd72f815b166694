//! Sorted, paged views over normalized records for previews.

use std::{cmp::Ordering, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    error::{IntakeError, Result},
    record::Record,
};

pub const DEFAULT_PAGE_SIZE: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortDirection::Asc => write!(f, "asc"),
            SortDirection::Desc => write!(f, "desc"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortDirective {
    pub column: String,
    pub direction: SortDirection,
}

impl FromStr for SortDirective {
    type Err = IntakeError;

    /// Parses `column` or `column:asc|desc`.
    fn from_str(directive: &str) -> Result<Self> {
        let (column, direction) = match directive.rsplit_once(':') {
            Some((column, dir)) => {
                let direction = match dir.trim().to_ascii_lowercase().as_str() {
                    "asc" => SortDirection::Asc,
                    "desc" => SortDirection::Desc,
                    other => {
                        return Err(IntakeError::validation(format!(
                            "Unknown sort direction '{other}'"
                        )));
                    }
                };
                (column, direction)
            }
            None => (directive, SortDirection::Asc),
        };
        let column = column.trim();
        if column.is_empty() {
            return Err(IntakeError::validation("Sort directive needs a column"));
        }
        Ok(SortDirective {
            column: column.to_string(),
            direction,
        })
    }
}

/// Compares numerically when both sides parse as numbers, otherwise as strings.
pub fn compare_values(left: &str, right: &str) -> Ordering {
    match (left.trim().parse::<f64>(), right.trim().parse::<f64>()) {
        (Ok(a), Ok(b)) if !a.is_nan() && !b.is_nan() => a.total_cmp(&b),
        _ => left.cmp(right),
    }
}

/// Stable sort of `records` by one column.
pub fn sort_records(records: &mut [&Record], directive: &SortDirective) {
    records.sort_by(|a, b| {
        let ordering = compare_values(a.get(&directive.column), b.get(&directive.column));
        match directive.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    });
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    /// 1-based page number.
    pub number: usize,
    pub size: usize,
}

impl Default for Page {
    fn default() -> Self {
        Page {
            number: 1,
            size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Page {
    pub fn new(number: usize, size: usize) -> Self {
        Page {
            number: number.max(1),
            size: size.max(1),
        }
    }

    pub fn total_pages(&self, total_rows: usize) -> usize {
        total_rows.div_ceil(self.size)
    }

    pub fn slice<'s, T>(&self, items: &'s [T]) -> &'s [T] {
        let start = (self.number - 1).saturating_mul(self.size).min(items.len());
        let end = start.saturating_add(self.size).min(items.len());
        &items[start..end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(age: &str) -> Record {
        [("AGE", age)].into_iter().collect()
    }

    #[test]
    fn numeric_values_sort_numerically() {
        let rows = [rec("10"), rec("9"), rec("abc"), rec("100")];
        let mut view = rows.iter().collect::<Vec<_>>();
        sort_records(&mut view, &"AGE".parse().unwrap());
        let ages = view.iter().map(|r| r.get("AGE")).collect::<Vec<_>>();
        assert_eq!(ages, vec!["9", "10", "100", "abc"]);
    }

    #[test]
    fn descending_sort_of_numbers() {
        let rows = [rec("2"), rec("10"), rec("1")];
        let mut view = rows.iter().collect::<Vec<_>>();
        sort_records(&mut view, &"AGE:desc".parse().unwrap());
        let ages = view.iter().map(|r| r.get("AGE")).collect::<Vec<_>>();
        assert_eq!(ages, vec!["10", "2", "1"]);
    }

    #[test]
    fn pages_clamp_to_bounds() {
        let items = (0..25).collect::<Vec<_>>();
        let page = Page::new(3, 10);
        assert_eq!(page.slice(&items), &[20, 21, 22, 23, 24]);
        assert_eq!(page.total_pages(items.len()), 3);
        assert!(Page::new(4, 10).slice(&items).is_empty());
    }

    #[test]
    fn sort_directive_rejects_unknown_direction() {
        assert!("AGE:sideways".parse::<SortDirective>().is_err());
        assert_eq!(
            "NAME:DESC".parse::<SortDirective>().unwrap().direction,
            SortDirection::Desc
        );
    }
}
