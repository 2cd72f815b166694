use std::{fmt, str::FromStr};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    error::{IntakeError, Result},
    record::Record,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOperator {
    Equals,
    NotEquals,
    Contains,
    StartsWith,
    EndsWith,
    GreaterThan,
    LessThan,
    GreaterEqual,
    LessEqual,
}

impl ComparisonOperator {
    pub const ALL: [ComparisonOperator; 9] = [
        ComparisonOperator::Equals,
        ComparisonOperator::NotEquals,
        ComparisonOperator::Contains,
        ComparisonOperator::StartsWith,
        ComparisonOperator::EndsWith,
        ComparisonOperator::GreaterThan,
        ComparisonOperator::LessThan,
        ComparisonOperator::GreaterEqual,
        ComparisonOperator::LessEqual,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ComparisonOperator::Equals => "equals",
            ComparisonOperator::NotEquals => "not_equals",
            ComparisonOperator::Contains => "contains",
            ComparisonOperator::StartsWith => "starts_with",
            ComparisonOperator::EndsWith => "ends_with",
            ComparisonOperator::GreaterThan => "greater_than",
            ComparisonOperator::LessThan => "less_than",
            ComparisonOperator::GreaterEqual => "greater_equal",
            ComparisonOperator::LessEqual => "less_equal",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ComparisonOperator::GreaterThan
                | ComparisonOperator::LessThan
                | ComparisonOperator::GreaterEqual
                | ComparisonOperator::LessEqual
        )
    }
}

impl fmt::Display for ComparisonOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComparisonOperator {
    type Err = IntakeError;

    fn from_str(value: &str) -> Result<Self> {
        let lowered = value.trim().to_ascii_lowercase();
        let op = match lowered.as_str() {
            "equals" | "eq" | "=" | "==" => ComparisonOperator::Equals,
            "not_equals" | "ne" | "!=" => ComparisonOperator::NotEquals,
            "contains" => ComparisonOperator::Contains,
            "starts_with" | "startswith" => ComparisonOperator::StartsWith,
            "ends_with" | "endswith" => ComparisonOperator::EndsWith,
            "greater_than" | "gt" | ">" => ComparisonOperator::GreaterThan,
            "less_than" | "lt" | "<" => ComparisonOperator::LessThan,
            "greater_equal" | "ge" | ">=" => ComparisonOperator::GreaterEqual,
            "less_equal" | "le" | "<=" => ComparisonOperator::LessEqual,
            _ => {
                return Err(IntakeError::validation(format!(
                    "Unknown filter operator '{value}'"
                )));
            }
        };
        Ok(op)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterCondition {
    pub column: String,
    pub operator: ComparisonOperator,
    pub value: String,
}

impl FilterCondition {
    pub fn new(
        column: impl Into<String>,
        operator: ComparisonOperator,
        value: impl Into<String>,
    ) -> Self {
        FilterCondition {
            column: column.into(),
            operator,
            value: value.into(),
        }
    }

    /// Partially specified conditions (no column or no value) never exclude a record.
    pub fn is_vacuous(&self) -> bool {
        self.column.is_empty() || self.value.is_empty()
    }

    pub fn matches(&self, record: &Record) -> bool {
        if self.is_vacuous() {
            return true;
        }
        let cell = record.get(&self.column);
        let text = || (cell.to_lowercase(), self.value.to_lowercase());
        let numbers = || parse_number(cell).zip(parse_number(&self.value));

        use ComparisonOperator::*;
        match self.operator {
            Equals => {
                let (cell, needle) = text();
                cell == needle
            }
            NotEquals => {
                let (cell, needle) = text();
                cell != needle
            }
            Contains => {
                let (cell, needle) = text();
                cell.contains(&needle)
            }
            StartsWith => {
                let (cell, needle) = text();
                cell.starts_with(&needle)
            }
            EndsWith => {
                let (cell, needle) = text();
                cell.ends_with(&needle)
            }
            GreaterThan => numbers().is_some_and(|(left, right)| left > right),
            LessThan => numbers().is_some_and(|(left, right)| left < right),
            GreaterEqual => numbers().is_some_and(|(left, right)| left >= right),
            LessEqual => numbers().is_some_and(|(left, right)| left <= right),
        }
    }
}

impl fmt::Display for FilterCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} '{}'", self.column, self.operator, self.value)
    }
}

/// The whole trimmed cell must be a number; `"45 yrs"` is not.
fn parse_number(value: &str) -> Option<f64> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|parsed| !parsed.is_nan())
}

pub fn evaluate_conditions(conditions: &[FilterCondition], record: &Record) -> bool {
    conditions.iter().all(|condition| condition.matches(record))
}

/// Records for which every condition holds, in input order.
pub fn apply_filters<'a>(conditions: &[FilterCondition], records: &'a [Record]) -> Vec<&'a Record> {
    records
        .iter()
        .filter(|record| evaluate_conditions(conditions, record))
        .collect()
}

pub type FilterId = u64;

/// An editable list of conditions. Every [`FilterSet::apply`] re-evaluates from scratch.
#[derive(Debug, Clone, Default)]
pub struct FilterSet {
    entries: Vec<(FilterId, FilterCondition)>,
    next_id: FilterId,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, condition: FilterCondition) -> FilterId {
        self.next_id += 1;
        let id = self.next_id;
        debug!("Filter #{id} added: {condition}");
        self.entries.push((id, condition));
        id
    }

    pub fn remove(&mut self, id: FilterId) -> Option<FilterCondition> {
        let position = self.entries.iter().position(|(entry, _)| *entry == id)?;
        Some(self.entries.remove(position).1)
    }

    pub fn update(&mut self, id: FilterId, condition: FilterCondition) -> Result<()> {
        let slot = self
            .entries
            .iter_mut()
            .find(|(entry, _)| *entry == id)
            .ok_or_else(|| IntakeError::not_found("filter", id))?;
        slot.1 = condition;
        Ok(())
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FilterId, &FilterCondition)> {
        self.entries.iter().map(|(id, c)| (*id, c))
    }

    pub fn apply<'a>(&self, records: &'a [Record]) -> Vec<&'a Record> {
        records
            .iter()
            .filter(|record| self.entries.iter().all(|(_, c)| c.matches(record)))
            .collect()
    }
}

pub fn parse_filters(filters: &[String]) -> Result<Vec<FilterCondition>> {
    filters.iter().map(|f| parse_filter(f)).collect()
}

/// Parses `column <op> value` where `op` is a symbol (`>=`), a word (`contains`),
/// or a snake_case operator name (`greater_than`).
pub fn parse_filter(filter: &str) -> Result<FilterCondition> {
    let trimmed = filter.trim();
    if trimmed.is_empty() {
        return Err(IntakeError::validation("Empty filter expression"));
    }

    let lowered = trimmed.to_ascii_lowercase();
    let mut words = ComparisonOperator::ALL
        .iter()
        .map(|op| (op.as_str().to_string(), *op))
        .collect::<Vec<_>>();
    words.push(("startswith".to_string(), ComparisonOperator::StartsWith));
    words.push(("endswith".to_string(), ComparisonOperator::EndsWith));
    for (word, op) in &words {
        let needle = format!(" {word} ");
        if let Some(idx) = lowered.find(&needle) {
            let left = &trimmed[..idx];
            let right = trimmed[idx + needle.len()..].trim();
            return Ok(FilterCondition::new(left.trim(), *op, unquote(right)));
        }
    }

    for needle in ["!=", ">=", "<=", "=", ">", "<"] {
        if let Some(idx) = trimmed.find(needle) {
            let op = needle.parse::<ComparisonOperator>()?;
            let left = trimmed[..idx].trim();
            let right = trimmed[idx + needle.len()..].trim();
            return Ok(FilterCondition::new(left, op, unquote(right)));
        }
    }

    Err(IntakeError::validation(format!(
        "Failed to parse filter expression '{trimmed}'"
    )))
}

fn unquote(value: &str) -> &str {
    if value.len() >= 2 {
        let bytes = value.as_bytes();
        if (bytes[0] == b'"' && bytes[value.len() - 1] == b'"')
            || (bytes[0] == b'\'' && bytes[value.len() - 1] == b'\'')
        {
            return &value[1..value.len() - 1];
        }
    }
    value
}
