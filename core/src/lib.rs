pub mod db;
pub mod error;
pub mod identity;
pub mod models;
pub mod progress;
pub mod seed;
pub mod service;

pub use error::{LedgerError, Result};
pub use service::Ledger;
