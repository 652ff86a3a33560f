//! HTTPS adapters for HMRC: the OAuth token endpoint and the MTD income
//! tax APIs used by the submission pipeline.

mod api;
mod environment;
pub mod response;
mod token_endpoint;

pub use api::HmrcApiClient;
pub use environment::{
    ClientConfigError, HmrcClientConfig, HmrcEnvironment, PRODUCTION_BASE_URL, SANDBOX_BASE_URL,
};
pub use token_endpoint::HmrcTokenEndpoint;
