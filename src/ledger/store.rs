//! Store: the ledger entry point for request handlers

use async_trait::async_trait;
use tracing::{info, warn};

use super::error::LedgerError;
use super::executor::TxExecutor;
use super::models::{Account, Entry, Page, Transfer, TransferTxParams, TransferTxResult};
use super::queries::Queries;
use super::transfer::{transfer_unit, validate};
use crate::config::TransferConfig;
use crate::db::Database;

/// Ledger operations exposed to request handlers
///
/// Implementations must not hold in-process state shared between calls;
/// concurrency control belongs to the database.
#[async_trait]
pub trait Store: Send + Sync {
    /// Move `amount` from one account to another as a single atomic unit
    async fn transfer_tx(&self, params: TransferTxParams)
    -> Result<TransferTxResult, LedgerError>;

    async fn get_account(&self, id: i64) -> Result<Account, LedgerError>;

    async fn list_accounts(&self, owner: &str, page: Page) -> Result<Vec<Account>, LedgerError>;

    async fn get_transfer(&self, id: i64) -> Result<Transfer, LedgerError>;

    /// The two entries written by a transfer, debit first
    async fn transfer_entries(&self, transfer_id: i64) -> Result<Vec<Entry>, LedgerError>;
}

/// PostgreSQL-backed [`Store`]
#[derive(Clone)]
pub struct SqlStore {
    db: Database,
    executor: TxExecutor,
}

impl SqlStore {
    pub fn new(db: Database, config: &TransferConfig) -> Self {
        let executor = TxExecutor::new(
            db.pool().clone(),
            config.isolation,
            config.retry_policy(),
            config.tx_timeout(),
        );
        Self { db, executor }
    }
}

#[async_trait]
impl Store for SqlStore {
    async fn transfer_tx(
        &self,
        params: TransferTxParams,
    ) -> Result<TransferTxResult, LedgerError> {
        // Bad input never opens a transaction
        validate(&params)?;

        let result = self
            .executor
            .exec_tx(move |conn| {
                let params = params.clone();
                Box::pin(async move { transfer_unit(conn, &params).await })
            })
            .await;

        match &result {
            Ok(res) => info!(
                transfer_id = res.transfer.id,
                from_balance = res.from_account.balance,
                to_balance = res.to_account.balance,
                "Transfer committed"
            ),
            Err(e) => warn!(code = e.code(), error = %e, "Transfer rolled back"),
        }
        result
    }

    async fn get_account(&self, id: i64) -> Result<Account, LedgerError> {
        Ok(Queries::get_account(self.db.pool(), id).await?)
    }

    async fn list_accounts(&self, owner: &str, page: Page) -> Result<Vec<Account>, LedgerError> {
        Ok(Queries::list_accounts(self.db.pool(), owner, page).await?)
    }

    async fn get_transfer(&self, id: i64) -> Result<Transfer, LedgerError> {
        Ok(Queries::get_transfer(self.db.pool(), id).await?)
    }

    async fn transfer_entries(&self, transfer_id: i64) -> Result<Vec<Entry>, LedgerError> {
        Ok(Queries::list_entries_for_transfer(self.db.pool(), transfer_id).await?)
    }
}
