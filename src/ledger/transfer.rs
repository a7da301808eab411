//! TransferTx: atomic two-party funds transfer
//!
//! # Flow (one database transaction)
//!
//! ```text
//! validate ─▶ BEGIN ─▶ load both accounts (ascending id)
//!                  ─▶ INSERT transfer
//!                  ─▶ INSERT entry(from, -amount)
//!                  ─▶ INSERT entry(to,   +amount)
//!                  ─▶ balance deltas in ascending account id order
//!                  ─▶ COMMIT
//! ```
//!
//! # Lock ordering
//!
//! Balance updates take row locks. A→B running next to B→A would deadlock if
//! each locked its source first, so the deltas are always applied in
//! ascending account id order, whichever side is the source. Every
//! transaction touching a pair of accounts then queues on the same row first.

use sqlx::PgConnection;
use tracing::{debug, info};

use super::error::LedgerError;
use super::models::{
    Account, CreateEntryParams, CreateTransferParams, TransferTxParams, TransferTxResult,
};
use super::queries::Queries;

/// One balance change inside a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceDelta {
    pub account_id: i64,
    pub amount: i64,
}

/// Order balance changes by account id so that lock acquisition is the
/// same for every transaction sharing any of the accounts. Works for any
/// number of participants.
pub fn lock_order<const N: usize>(mut deltas: [BalanceDelta; N]) -> [BalanceDelta; N] {
    deltas.sort_by_key(|d| d.account_id);
    deltas
}

/// Reject input that must never reach storage
pub fn validate(params: &TransferTxParams) -> Result<(), LedgerError> {
    if params.from_account_id == params.to_account_id {
        return Err(LedgerError::Validation(format!(
            "cannot transfer from account {} to itself",
            params.from_account_id
        )));
    }
    if params.amount <= 0 {
        return Err(LedgerError::Validation(format!(
            "amount must be positive, got {}",
            params.amount
        )));
    }
    if let Some(currency) = &params.currency {
        if currency.trim().is_empty() {
            return Err(LedgerError::Validation("currency must not be empty".to_string()));
        }
    }
    Ok(())
}

/// Both accounts must share one currency, and match the requested one if given
fn check_currency(
    params: &TransferTxParams,
    from: &Account,
    to: &Account,
) -> Result<(), LedgerError> {
    if from.currency != to.currency {
        return Err(LedgerError::Validation(format!(
            "currency mismatch: account {} is {}, account {} is {}",
            from.id, from.currency, to.id, to.currency
        )));
    }
    if let Some(currency) = &params.currency {
        if *currency != from.currency {
            return Err(LedgerError::Validation(format!(
                "currency mismatch: accounts are {}, transfer is {}",
                from.currency, currency
            )));
        }
    }
    Ok(())
}

async fn load_account(conn: &mut PgConnection, id: i64) -> Result<Account, LedgerError> {
    Queries::get_account(&mut *conn, id).await.map_err(|e| match LedgerError::from(e) {
        LedgerError::NotFound(_) => LedgerError::NotFound(format!("account {}", id)),
        other => other,
    })
}

/// Apply one guarded delta. A rejected guard means either the account
/// disappeared or the balance would drop below zero.
async fn apply_delta(conn: &mut PgConnection, delta: BalanceDelta) -> Result<Account, LedgerError> {
    let updated = Queries::add_account_balance(&mut *conn, delta.account_id, delta.amount).await?;
    if let Some(account) = updated {
        return Ok(account);
    }

    let current = load_account(conn, delta.account_id).await?;
    Err(LedgerError::InsufficientFunds {
        account_id: current.id,
        balance: current.balance,
        requested: -delta.amount,
    })
}

/// Unit of work run by the executor. Any error aborts the transaction.
pub(crate) async fn transfer_unit(
    conn: &mut PgConnection,
    params: &TransferTxParams,
) -> Result<TransferTxResult, LedgerError> {
    let from_account_id = params.from_account_id;
    let to_account_id = params.to_account_id;
    let amount = params.amount;

    // Existence and currency, read in the same order the locks are taken
    let (from, to) = if from_account_id < to_account_id {
        let from = load_account(conn, from_account_id).await?;
        let to = load_account(conn, to_account_id).await?;
        (from, to)
    } else {
        let to = load_account(conn, to_account_id).await?;
        let from = load_account(conn, from_account_id).await?;
        (from, to)
    };
    check_currency(params, &from, &to)?;

    let transfer = Queries::create_transfer(
        &mut *conn,
        CreateTransferParams {
            from_account_id,
            to_account_id,
            amount,
        },
    )
    .await?;

    let from_entry = Queries::create_entry(
        &mut *conn,
        CreateEntryParams {
            account_id: from_account_id,
            transfer_id: transfer.id,
            amount: -amount,
        },
    )
    .await?;

    let to_entry = Queries::create_entry(
        &mut *conn,
        CreateEntryParams {
            account_id: to_account_id,
            transfer_id: transfer.id,
            amount,
        },
    )
    .await?;

    let ordered = lock_order([
        BalanceDelta {
            account_id: from_account_id,
            amount: -amount,
        },
        BalanceDelta {
            account_id: to_account_id,
            amount,
        },
    ]);

    let mut from_account = None;
    let mut to_account = None;
    for delta in ordered {
        let account = apply_delta(conn, delta).await?;
        debug!(
            transfer_id = transfer.id,
            account_id = account.id,
            delta = delta.amount,
            balance = account.balance,
            "Balance updated"
        );
        if account.id == from_account_id {
            from_account = Some(account);
        } else {
            to_account = Some(account);
        }
    }

    let (Some(from_account), Some(to_account)) = (from_account, to_account) else {
        return Err(LedgerError::Internal(format!(
            "transfer {} did not update both accounts",
            transfer.id
        )));
    };

    info!(
        transfer_id = transfer.id,
        from_account_id,
        to_account_id,
        amount,
        "Transfer applied"
    );

    Ok(TransferTxResult {
        transfer,
        from_account,
        to_account,
        from_entry,
        to_entry,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn delta(account_id: i64, amount: i64) -> BalanceDelta {
        BalanceDelta { account_id, amount }
    }

    fn account(id: i64, currency: &str) -> Account {
        Account {
            id,
            owner: format!("owner{}", id),
            balance: 100,
            currency: currency.to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_lock_order_is_independent_of_direction() {
        // A(1) -> B(2) and B(2) -> A(1) both touch account 1 first
        let forward = lock_order([delta(1, -30), delta(2, 30)]);
        let backward = lock_order([delta(2, -30), delta(1, 30)]);

        assert_eq!(forward[0].account_id, 1);
        assert_eq!(backward[0].account_id, 1);
        assert_eq!(forward.map(|d| d.account_id), backward.map(|d| d.account_id));
    }

    #[test]
    fn test_lock_order_keeps_amounts_with_accounts() {
        let ordered = lock_order([delta(9, -5), delta(3, 5)]);
        assert_eq!(ordered, [delta(3, 5), delta(9, -5)]);
    }

    #[test]
    fn test_lock_order_generalizes_to_n_accounts() {
        let ordered = lock_order([delta(7, 1), delta(2, 1), delta(5, -2)]);
        assert_eq!(ordered.map(|d| d.account_id), [2, 5, 7]);
    }

    #[test]
    fn test_self_transfer_rejected_for_any_amount() {
        for amount in [-1, 0, 1, 30, i64::MAX] {
            let err = validate(&TransferTxParams::new(4, 4, amount)).unwrap_err();
            assert!(matches!(err, LedgerError::Validation(_)), "amount {}", amount);
        }
    }

    #[test]
    fn test_non_positive_amount_rejected() {
        for amount in [0, -1, i64::MIN] {
            let err = validate(&TransferTxParams::new(1, 2, amount)).unwrap_err();
            assert_eq!(err.code(), "VALIDATION_ERROR");
        }
        assert!(validate(&TransferTxParams::new(1, 2, 1)).is_ok());
    }

    #[test]
    fn test_blank_currency_rejected() {
        let params = TransferTxParams::new(1, 2, 10).with_currency(" ");
        assert!(validate(&params).is_err());
    }

    #[test]
    fn test_currency_must_match_both_accounts() {
        let params = TransferTxParams::new(1, 2, 10);
        assert!(check_currency(&params, &account(1, "USD"), &account(2, "USD")).is_ok());
        assert!(check_currency(&params, &account(1, "USD"), &account(2, "EUR")).is_err());

        let eur = params.with_currency("EUR");
        assert!(check_currency(&eur, &account(1, "USD"), &account(2, "USD")).is_err());
        assert!(check_currency(&eur, &account(1, "EUR"), &account(2, "EUR")).is_ok());
    }
}
