//! Fraud-prevention headers: the catalog, the generator and the validator.

pub mod catalog;
pub mod generator;
pub mod validator;

pub use catalog::{ConnectionMethod, FraudHeader, HeaderCategory, Requirement, WireFormat};
pub use generator::{ClientTelemetry, FraudPreventionHeaderGenerator, ScreenInfo, WindowSize};
pub use validator::{
    FraudPreventionHeaderSet, HeaderError, HeaderValidationReport, ValidatedHeaders,
    check_headers, encode_header_value, validate_header, validate_headers,
};
