//! Double-entry ledger
//!
//! # Architecture
//!
//! ```text
//! Store::transfer_tx ─▶ TxExecutor ─▶ transfer_unit ─▶ Queries ─▶ PostgreSQL
//!                           │                              │
//!                           └──── LedgerError ◀── classify ┘
//! ```
//!
//! # Invariants
//!
//! 1. **Balanced**: every transfer has exactly two entries, `-amount` on the
//!    source and `+amount` on the destination, written in the same
//!    transaction as both balance changes.
//! 2. **Non-negative**: a balance delta is applied by the database only if
//!    the result stays `>= 0`; `accounts_balance_non_negative` backs this up.
//! 3. **Lock order**: balance rows are locked in ascending account id order.
//! 4. **Append-only**: entries and transfers are never updated.

pub mod error;
pub mod executor;
pub mod models;
pub mod queries;
pub mod store;
pub mod transfer;

// Re-exports for convenience
pub use error::{DbErrorKind, LedgerError, TransientCause, classify};
pub use executor::{Isolation, RetryPolicy, TxExecutor};
pub use models::{
    Account, CreateAccountParams, CreateEntryParams, CreateSessionParams, CreateTransferParams,
    CreateUserParams, Entry, Page, Session, Transfer, TransferTxParams, TransferTxResult,
    UpdateUserParams, User,
};
pub use queries::Queries;
pub use store::{SqlStore, Store};
pub use transfer::{BalanceDelta, lock_order};
