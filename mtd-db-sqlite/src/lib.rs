//! SQLite storage for authorizations and submission records.

mod columns;
mod factory;
mod repository;

pub use factory::SqliteRepositoryFactory;
pub use repository::SqliteRepository;
