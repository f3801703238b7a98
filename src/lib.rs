pub mod application;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod io;
pub mod storage;

pub use application::LedgerEngine;
pub use config::LedgerConfig;
pub use domain::*;
pub use error::LedgerError;
pub use storage::{Database, TransactionLog, WalletStore};
