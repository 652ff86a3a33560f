use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

static TAX_YEAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4})[-/](\d{2}|\d{4})$").expect("tax year pattern is valid")
});

/// A tax year is not in a recognised form or its two halves do not follow
/// one another.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid tax year '{0}': expected YYYY-YY or YYYY/YYYY with consecutive years")]
pub struct TaxYearError(pub String);

/// A UK tax year, running 6 April to 5 April.
///
/// Accepts `2024-25`, `2024/25`, `2024/2025` and `2024-2025`; always
/// displays in the canonical `2024-25` form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaxYear {
    start: i32,
}

impl TaxYear {
    pub fn new(start: i32) -> Self {
        Self { start }
    }

    pub fn parse(value: &str) -> Result<Self, TaxYearError> {
        let trimmed = value.trim();
        let caps = TAX_YEAR_PATTERN
            .captures(trimmed)
            .ok_or_else(|| TaxYearError(value.to_string()))?;

        let start: i32 = caps[1]
            .parse()
            .map_err(|_| TaxYearError(value.to_string()))?;
        let end_text = &caps[2];
        let end: i32 = end_text
            .parse()
            .map_err(|_| TaxYearError(value.to_string()))?;

        let consecutive = if end_text.len() == 2 {
            (start + 1) % 100 == end
        } else {
            start + 1 == end
        };

        if !consecutive {
            return Err(TaxYearError(value.to_string()));
        }

        Ok(Self { start })
    }

    /// The tax year that contains `date`. A new year starts on 6 April.
    pub fn containing(date: NaiveDate) -> Self {
        let year = date.year();
        let starts_on_or_before = (date.month(), date.day()) >= (4, 6);
        if starts_on_or_before {
            Self::new(year)
        } else {
            Self::new(year - 1)
        }
    }

    /// The tax year containing `today` followed by the `count - 1` years
    /// before it, newest first.
    pub fn recent(today: NaiveDate, count: usize) -> Vec<Self> {
        let current = Self::containing(today);
        (0..count as i32).map(|i| Self::new(current.start - i)).collect()
    }

    pub fn start_year(&self) -> i32 {
        self.start
    }

    pub fn end_year(&self) -> i32 {
        self.start + 1
    }

    /// First day of the tax year (6 April).
    pub fn first_day(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.start, 4, 6)
    }

    /// Human label, e.g. `2024/25`.
    pub fn label(&self) -> String {
        format!("{}/{:02}", self.start, self.end_year() % 100)
    }
}

impl fmt::Display for TaxYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:02}", self.start, self.end_year() % 100)
    }
}

impl FromStr for TaxYear {
    type Err = TaxYearError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TaxYear {
    type Error = TaxYearError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TaxYear> for String {
    fn from(value: TaxYear) -> Self {
        value.to_string()
    }
}
