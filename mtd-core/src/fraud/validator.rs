use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use super::catalog::FraudHeader;

/// A single header's value did not match its wire format.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{header}: {reason}")]
pub struct HeaderError {
    pub header: String,
    pub reason: String,
}

/// Makes a value safe to place in an HTTP header.
///
/// CR, LF and TAB become spaces, other control characters are dropped,
/// whitespace runs collapse to one space and the ends are trimmed.
///
/// ```
/// use mtd_core::fraud::encode_header_value;
///
/// assert_eq!(encode_header_value(" Europe/London\r\nX-Injected: 1\u{7}"), "Europe/London X-Injected: 1");
/// ```
pub fn encode_header_value(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .filter_map(|c| match c {
            '\r' | '\n' | '\t' => Some(' '),
            c if c.is_control() => None,
            c => Some(c),
        })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Encodes `raw` and checks it against the header's wire format.
pub fn validate_header(header: FraudHeader, raw: &str) -> Result<String, HeaderError> {
    let encoded = encode_header_value(raw);
    header
        .format()
        .check(&encoded)
        .map(|()| encoded)
        .map_err(|reason| HeaderError {
            header: header.name().to_string(),
            reason,
        })
}

/// A candidate header set, keyed by wire name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FraudPreventionHeaderSet {
    headers: BTreeMap<String, String>,
}

impl FraudPreventionHeaderSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, header: FraudHeader, value: impl Into<String>) {
        self.headers.insert(header.name().to_string(), value.into());
    }

    /// Adds a header by wire name, matched case-insensitively against the
    /// catalog. Names outside the catalog are kept and reported by
    /// validation.
    pub fn insert_raw(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(canonical_name(name.into()), value.into());
    }

    pub fn remove(&mut self, header: FraudHeader) -> Option<String> {
        self.headers.remove(header.name())
    }

    pub fn get(&self, header: FraudHeader) -> Option<&str> {
        self.headers.get(header.name()).map(String::as_str)
    }

    pub fn contains(&self, header: FraudHeader) -> bool {
        self.get(header).is_some_and(|v| !v.is_empty())
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FraudPreventionHeaderSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            headers: iter
                .into_iter()
                .map(|(k, v)| (canonical_name(k.into()), v.into()))
                .collect(),
        }
    }
}

fn canonical_name(name: String) -> String {
    match FraudHeader::from_name(&name) {
        Some(header) => header.name().to_string(),
        None => name,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HeaderValidationReport {
    pub valid: bool,
    /// Required headers that are absent or empty.
    pub missing: Vec<String>,
    /// `"{header}: {reason}"` for each present header that is malformed.
    pub errors: Vec<String>,
}

impl HeaderValidationReport {
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if !self.missing.is_empty() {
            parts.push(format!("missing headers: {}", self.missing.join(", ")));
        }
        parts.extend(self.errors.iter().cloned());
        parts.join("; ")
    }
}

/// Headers that passed validation, encoded and ready to send.
///
/// Only [`validate_headers`] produces this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedHeaders {
    headers: Vec<(&'static str, String)>,
}

impl ValidatedHeaders {
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.headers.iter().map(|(k, v)| (*k, v.as_str()))
    }

    pub fn get(&self, header: FraudHeader) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| *k == header.name())
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}

/// Re-parses every header in `set`.
///
/// Returns the encoded headers when the set is complete and well formed,
/// otherwise the report explaining why it is not.
pub fn validate_headers(
    set: &FraudPreventionHeaderSet,
) -> Result<ValidatedHeaders, HeaderValidationReport> {
    let missing: Vec<String> = FraudHeader::required()
        .filter(|h| !set.contains(*h))
        .map(|h| h.name().to_string())
        .collect();

    let mut errors = Vec::new();
    let mut headers = Vec::with_capacity(set.len());

    for (name, raw) in set.iter() {
        if raw.is_empty() {
            continue;
        }
        let Some(header) = FraudHeader::from_name(name) else {
            errors.push(format!("{name}: unknown header"));
            continue;
        };
        match validate_header(header, raw) {
            Ok(encoded) => headers.push((header.name(), encoded)),
            Err(err) => errors.push(err.to_string()),
        }
    }

    if missing.is_empty() && errors.is_empty() {
        return Ok(ValidatedHeaders { headers });
    }

    warn!(
        missing = ?missing,
        errors = ?errors,
        "Fraud prevention headers failed validation"
    );
    Err(HeaderValidationReport {
        valid: false,
        missing,
        errors,
    })
}

/// [`validate_headers`] as a plain report.
pub fn check_headers(set: &FraudPreventionHeaderSet) -> HeaderValidationReport {
    match validate_headers(set) {
        Ok(_) => HeaderValidationReport {
            valid: true,
            ..Default::default()
        },
        Err(report) => report,
    }
}
