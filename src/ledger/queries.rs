//! Ledger Store: single-statement operations on ledger rows
//!
//! Every function takes any PostgreSQL executor, so the same query runs
//! against the pool or inside a caller-managed transaction
//! (`&mut *tx` / `&mut *conn`). None of them opens a transaction.
//!
//! Lookups by key use `fetch_one`: a missing row surfaces as
//! `sqlx::Error::RowNotFound`, which the classifier maps to `NotFound`.

use sqlx::PgExecutor;
use uuid::Uuid;

use super::models::{
    Account, CreateAccountParams, CreateEntryParams, CreateSessionParams, CreateTransferParams,
    CreateUserParams, Entry, Page, Session, Transfer, UpdateUserParams, User,
};

/// Ledger row queries
pub struct Queries;

// ============================================================================
// Accounts
// ============================================================================

impl Queries {
    pub async fn create_account(
        db: impl PgExecutor<'_>,
        params: &CreateAccountParams,
    ) -> Result<Account, sqlx::Error> {
        sqlx::query_as::<_, Account>(
            r#"INSERT INTO accounts (owner, balance, currency)
               VALUES ($1, $2, $3)
               RETURNING id, owner, balance, currency, created_at"#,
        )
        .bind(&params.owner)
        .bind(params.balance)
        .bind(&params.currency)
        .fetch_one(db)
        .await
    }

    pub async fn get_account(db: impl PgExecutor<'_>, id: i64) -> Result<Account, sqlx::Error> {
        sqlx::query_as::<_, Account>(
            r#"SELECT id, owner, balance, currency, created_at
               FROM accounts WHERE id = $1"#,
        )
        .bind(id)
        .fetch_one(db)
        .await
    }

    /// Row-locking read. `NO KEY UPDATE` does not conflict with the
    /// `KEY SHARE` locks taken by foreign keys from transfers/entries.
    pub async fn get_account_for_update(
        db: impl PgExecutor<'_>,
        id: i64,
    ) -> Result<Account, sqlx::Error> {
        sqlx::query_as::<_, Account>(
            r#"SELECT id, owner, balance, currency, created_at
               FROM accounts WHERE id = $1
               FOR NO KEY UPDATE"#,
        )
        .bind(id)
        .fetch_one(db)
        .await
    }

    pub async fn list_accounts(
        db: impl PgExecutor<'_>,
        owner: &str,
        page: Page,
    ) -> Result<Vec<Account>, sqlx::Error> {
        sqlx::query_as::<_, Account>(
            r#"SELECT id, owner, balance, currency, created_at
               FROM accounts WHERE owner = $1
               ORDER BY id
               LIMIT $2 OFFSET $3"#,
        )
        .bind(owner)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(db)
        .await
    }

    /// Overwrite the balance. Administrative path; transfers use
    /// [`Queries::add_account_balance`].
    pub async fn update_account(
        db: impl PgExecutor<'_>,
        id: i64,
        balance: i64,
    ) -> Result<Account, sqlx::Error> {
        sqlx::query_as::<_, Account>(
            r#"UPDATE accounts SET balance = $2
               WHERE id = $1
               RETURNING id, owner, balance, currency, created_at"#,
        )
        .bind(id)
        .bind(balance)
        .fetch_one(db)
        .await
    }

    /// Apply `delta` atomically in the database.
    ///
    /// Returns `None` when the row is missing or the new balance would be
    /// negative; the guard is evaluated against the latest committed row
    /// version after the row lock is granted.
    pub async fn add_account_balance(
        db: impl PgExecutor<'_>,
        id: i64,
        delta: i64,
    ) -> Result<Option<Account>, sqlx::Error> {
        sqlx::query_as::<_, Account>(
            r#"UPDATE accounts SET balance = balance + $2
               WHERE id = $1 AND balance + $2 >= 0
               RETURNING id, owner, balance, currency, created_at"#,
        )
        .bind(id)
        .bind(delta)
        .fetch_optional(db)
        .await
    }

    pub async fn delete_account(db: impl PgExecutor<'_>, id: i64) -> Result<(), sqlx::Error> {
        let result = sqlx::query("DELETE FROM accounts WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }
        Ok(())
    }
}

// ============================================================================
// Entries
// ============================================================================

impl Queries {
    pub async fn create_entry(
        db: impl PgExecutor<'_>,
        params: CreateEntryParams,
    ) -> Result<Entry, sqlx::Error> {
        sqlx::query_as::<_, Entry>(
            r#"INSERT INTO entries (account_id, transfer_id, amount)
               VALUES ($1, $2, $3)
               RETURNING id, account_id, transfer_id, amount, created_at"#,
        )
        .bind(params.account_id)
        .bind(params.transfer_id)
        .bind(params.amount)
        .fetch_one(db)
        .await
    }

    pub async fn get_entry(db: impl PgExecutor<'_>, id: i64) -> Result<Entry, sqlx::Error> {
        sqlx::query_as::<_, Entry>(
            r#"SELECT id, account_id, transfer_id, amount, created_at
               FROM entries WHERE id = $1"#,
        )
        .bind(id)
        .fetch_one(db)
        .await
    }

    pub async fn list_entries(
        db: impl PgExecutor<'_>,
        account_id: i64,
        page: Page,
    ) -> Result<Vec<Entry>, sqlx::Error> {
        sqlx::query_as::<_, Entry>(
            r#"SELECT id, account_id, transfer_id, amount, created_at
               FROM entries WHERE account_id = $1
               ORDER BY id
               LIMIT $2 OFFSET $3"#,
        )
        .bind(account_id)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(db)
        .await
    }

    pub async fn list_entries_for_transfer(
        db: impl PgExecutor<'_>,
        transfer_id: i64,
    ) -> Result<Vec<Entry>, sqlx::Error> {
        sqlx::query_as::<_, Entry>(
            r#"SELECT id, account_id, transfer_id, amount, created_at
               FROM entries WHERE transfer_id = $1
               ORDER BY id"#,
        )
        .bind(transfer_id)
        .fetch_all(db)
        .await
    }
}

// ============================================================================
// Transfers
// ============================================================================

impl Queries {
    pub async fn create_transfer(
        db: impl PgExecutor<'_>,
        params: CreateTransferParams,
    ) -> Result<Transfer, sqlx::Error> {
        sqlx::query_as::<_, Transfer>(
            r#"INSERT INTO transfers (from_account_id, to_account_id, amount)
               VALUES ($1, $2, $3)
               RETURNING id, from_account_id, to_account_id, amount, created_at"#,
        )
        .bind(params.from_account_id)
        .bind(params.to_account_id)
        .bind(params.amount)
        .fetch_one(db)
        .await
    }

    pub async fn get_transfer(db: impl PgExecutor<'_>, id: i64) -> Result<Transfer, sqlx::Error> {
        sqlx::query_as::<_, Transfer>(
            r#"SELECT id, from_account_id, to_account_id, amount, created_at
               FROM transfers WHERE id = $1"#,
        )
        .bind(id)
        .fetch_one(db)
        .await
    }

    /// Transfers leaving `from_account_id` or arriving at `to_account_id`
    pub async fn list_transfers(
        db: impl PgExecutor<'_>,
        from_account_id: i64,
        to_account_id: i64,
        page: Page,
    ) -> Result<Vec<Transfer>, sqlx::Error> {
        sqlx::query_as::<_, Transfer>(
            r#"SELECT id, from_account_id, to_account_id, amount, created_at
               FROM transfers
               WHERE from_account_id = $1 OR to_account_id = $2
               ORDER BY id
               LIMIT $3 OFFSET $4"#,
        )
        .bind(from_account_id)
        .bind(to_account_id)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(db)
        .await
    }
}

// ============================================================================
// Users & sessions
// ============================================================================

impl Queries {
    pub async fn create_user(
        db: impl PgExecutor<'_>,
        params: &CreateUserParams,
    ) -> Result<User, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"INSERT INTO users (username, role, hashed_password, full_name, email)
               VALUES ($1, $2, $3, $4, $5)
               RETURNING username, role, hashed_password, full_name, email,
                         password_changed_at, created_at"#,
        )
        .bind(&params.username)
        .bind(&params.role)
        .bind(&params.hashed_password)
        .bind(&params.full_name)
        .bind(&params.email)
        .fetch_one(db)
        .await
    }

    pub async fn get_user(db: impl PgExecutor<'_>, username: &str) -> Result<User, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"SELECT username, role, hashed_password, full_name, email,
                      password_changed_at, created_at
               FROM users WHERE username = $1"#,
        )
        .bind(username)
        .fetch_one(db)
        .await
    }

    /// Partial update; a new password hash also stamps `password_changed_at`
    pub async fn update_user(
        db: impl PgExecutor<'_>,
        username: &str,
        params: &UpdateUserParams,
    ) -> Result<User, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"UPDATE users SET
                   hashed_password = COALESCE($2, hashed_password),
                   password_changed_at = CASE WHEN $2::varchar IS NULL
                                              THEN password_changed_at ELSE NOW() END,
                   full_name = COALESCE($3, full_name),
                   email = COALESCE($4, email)
               WHERE username = $1
               RETURNING username, role, hashed_password, full_name, email,
                         password_changed_at, created_at"#,
        )
        .bind(username)
        .bind(params.hashed_password.as_deref())
        .bind(params.full_name.as_deref())
        .bind(params.email.as_deref())
        .fetch_one(db)
        .await
    }

    pub async fn create_session(
        db: impl PgExecutor<'_>,
        params: &CreateSessionParams,
    ) -> Result<Session, sqlx::Error> {
        sqlx::query_as::<_, Session>(
            r#"INSERT INTO sessions
                   (id, username, refresh_token, user_agent, client_ip, is_blocked, expires_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7)
               RETURNING id, username, refresh_token, user_agent, client_ip,
                         is_blocked, expires_at, created_at"#,
        )
        .bind(params.id)
        .bind(&params.username)
        .bind(&params.refresh_token)
        .bind(&params.user_agent)
        .bind(&params.client_ip)
        .bind(params.is_blocked)
        .bind(params.expires_at)
        .fetch_one(db)
        .await
    }

    pub async fn get_session(db: impl PgExecutor<'_>, id: Uuid) -> Result<Session, sqlx::Error> {
        sqlx::query_as::<_, Session>(
            r#"SELECT id, username, refresh_token, user_agent, client_ip,
                      is_blocked, expires_at, created_at
               FROM sessions WHERE id = $1"#,
        )
        .bind(id)
        .fetch_one(db)
        .await
    }
}
