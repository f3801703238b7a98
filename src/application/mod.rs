// Application layer: the ledger engine and the request validation in front of it.

mod engine;
mod locks;
pub mod request;

pub use crate::error::*;
pub use engine::*;
pub use locks::*;
