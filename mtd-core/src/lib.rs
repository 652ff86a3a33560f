//! Tax computation and HMRC Making Tax Digital submission for UK property
//! landlords and property companies.

pub mod auth;
pub mod calculations;
pub mod db;
pub mod error;
pub mod format;
pub mod fraud;
pub mod models;
pub mod submission;

pub use db::{AuthorizationStore, Repositories, RepositoryError, SubmissionRecordStore};
pub use error::MtdError;
pub use models::*;
