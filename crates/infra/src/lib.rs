//! Infrastructure layer: credential stores, config, dev seed data.

pub mod config;
pub mod seed;
pub mod store;


pub use config::{ConfigError, Settings};
pub use store::{InMemoryCredentialStore, PostgresCredentialStore};
