use serde_json::Value;
use thiserror::Error;

use crate::auth::CipherError;
use crate::db::RepositoryError;
use crate::format::FormatError;
use crate::fraud::HeaderValidationReport;

/// Everything that can stop a submission.
#[derive(Debug, Error)]
pub enum MtdError {
    /// Malformed input or headers. The caller must correct them first.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// No stored authorization; the user has to complete OAuth consent.
    #[error("User {user_id} has not authorized access to HMRC")]
    NotAuthorized { user_id: String },

    /// The refresh token was revoked. Never retried.
    #[error("User {user_id} must re-authorize with HMRC")]
    ReauthorizationRequired { user_id: String },

    #[error("Transient transport failure: {0}")]
    TransientTransport(String),

    /// A 4xx from the regulator with its error payload.
    #[error("HMRC rejected the request ({status}): {message}")]
    RegulatorRejection {
        status: u16,
        code: Option<String>,
        message: String,
        body: Value,
    },

    #[error("Persistence error: {0}")]
    Persistence(#[from] RepositoryError),

    #[error("Token encryption error: {0}")]
    Encryption(#[from] CipherError),
}

impl MtdError {
    /// Only transport failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, MtdError::TransientTransport(_))
    }

    /// Structured form stored as a record's `error_details`.
    pub fn details(&self) -> Value {
        match self {
            MtdError::RegulatorRejection {
                status,
                code,
                message,
                body,
            } => serde_json::json!({
                "kind": "regulator_rejection",
                "status": status,
                "code": code,
                "message": message,
                "body": body,
            }),
            other => serde_json::json!({
                "kind": other.kind(),
                "message": other.to_string(),
            }),
        }
    }

    /// HTTP clients only know the NINO; rebinds authorization errors to
    /// the local user they were raised for.
    pub fn attributed_to(self, user_id: &str) -> Self {
        match self {
            MtdError::NotAuthorized { .. } => MtdError::NotAuthorized {
                user_id: user_id.to_string(),
            },
            MtdError::ReauthorizationRequired { .. } => MtdError::ReauthorizationRequired {
                user_id: user_id.to_string(),
            },
            other => other,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            MtdError::Validation(_) => "validation",
            MtdError::NotAuthorized { .. } => "not_authorized",
            MtdError::ReauthorizationRequired { .. } => "reauthorization_required",
            MtdError::TransientTransport(_) => "transient_transport",
            MtdError::RegulatorRejection { .. } => "regulator_rejection",
            MtdError::Persistence(_) => "persistence",
            MtdError::Encryption(_) => "encryption",
        }
    }
}

impl From<FormatError> for MtdError {
    fn from(err: FormatError) -> Self {
        MtdError::Validation(err.to_string())
    }
}

impl From<HeaderValidationReport> for MtdError {
    fn from(report: HeaderValidationReport) -> Self {
        MtdError::Validation(report.summary())
    }
}
