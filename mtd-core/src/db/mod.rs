pub mod factory;
pub mod memory;
pub mod repository;

pub use factory::{DbConfig, RepositoryFactory, RepositoryRegistry};
pub use memory::{InMemoryStore, MemoryRepositoryFactory};
pub use repository::{AuthorizationStore, Repositories, RepositoryError, SubmissionRecordStore};
