//! A personal finance ledger kept in a single CSV file.

pub mod amount;
pub mod application;
pub mod command;
pub mod error;
pub mod ledger;
pub mod record;
pub mod report;

pub use command::{Command, Outcome};
pub use error::{LedgerError, ValidationError};
pub use ledger::LedgerStore;
