//! transfer_ledger - Double-Entry Ledger on PostgreSQL
//!
//! Accounts hold balances; transfers move money between two accounts as one
//! atomic unit that writes the transfer, two balancing entries and both
//! balance changes, safely under concurrent callers.
//!
//! # Modules
//!
//! - [`ledger`] - Store, transaction executor, TransferTx and error taxonomy
//! - [`db`] - Connection pool and migrations
//! - [`config`] - YAML configuration
//! - [`logging`] - tracing subscriber setup

pub mod config;
pub mod db;
pub mod ledger;
pub mod logging;

// Convenient re-exports at crate root
pub use config::AppConfig;
pub use db::Database;
pub use ledger::{
    Account, Entry, LedgerError, SqlStore, Store, Transfer, TransferTxParams, TransferTxResult,
};
