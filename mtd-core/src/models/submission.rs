use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::TaxYear;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionType {
    Personal,
    Company,
}

impl SubmissionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionType::Personal => "personal",
            SubmissionType::Company => "company",
        }
    }
}

impl fmt::Display for SubmissionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubmissionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "personal" => Ok(SubmissionType::Personal),
            "company" => Ok(SubmissionType::Company),
            other => Err(format!("unknown submission type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    /// Sent (or about to be sent); no terminal answer yet.
    Submitted,
    Accepted,
    Rejected,
    Error,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Submitted => "submitted",
            SubmissionStatus::Accepted => "accepted",
            SubmissionStatus::Rejected => "rejected",
            SubmissionStatus::Error => "error",
        }
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubmissionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "submitted" => Ok(SubmissionStatus::Submitted),
            "accepted" => Ok(SubmissionStatus::Accepted),
            "rejected" => Ok(SubmissionStatus::Rejected),
            "error" => Ok(SubmissionStatus::Error),
            other => Err(format!("unknown submission status '{other}'")),
        }
    }
}

/// Audit row for one (user, tax year, submission type).
///
/// There is only ever one row per key; each phase of a submission
/// overwrites it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub user_id: String,
    pub tax_year: TaxYear,
    pub submission_type: SubmissionType,
    pub submission_id: String,
    pub status: SubmissionStatus,
    pub hmrc_reference: Option<String>,
    /// `None` for attempts that never reached the regulator.
    pub submitted_at: Option<DateTime<Utc>>,
    pub payload: Option<Value>,
    pub error_details: Option<Value>,
    pub updated_at: DateTime<Utc>,
}

impl SubmissionRecord {
    pub fn new(
        user_id: impl Into<String>,
        tax_year: TaxYear,
        submission_type: SubmissionType,
        submission_id: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            tax_year,
            submission_type,
            submission_id: submission_id.into(),
            status: SubmissionStatus::Submitted,
            hmrc_reference: None,
            submitted_at: None,
            payload: None,
            error_details: None,
            updated_at: Utc::now(),
        }
    }

    pub fn key(&self) -> (String, TaxYear, SubmissionType) {
        (self.user_id.clone(), self.tax_year, self.submission_type)
    }
}
