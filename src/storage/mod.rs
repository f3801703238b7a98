mod database;
mod transaction_log;
mod wallet_store;

pub use database::*;
pub use transaction_log::*;
pub use wallet_store::*;

/// SQL migration for initial schema
pub const MIGRATION_001_INITIAL: &str = include_str!("migrations/001_initial.sql");
