//! Infrastructure layer: subject persistence and configuration.

pub mod config;
pub mod subject_store;

pub use config::{AppConfig, ConfigError};
pub use subject_store::{
    InMemorySubjectStore, PostgresSubjectStore, ProfileUpdate, StoreError, SubjectStore, UserRecord,
};
