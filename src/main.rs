//! transfer_ledger service entry point
//!
//! ```text
//! transfer_ledger [--env <name>]                               migrate + health check
//! transfer_ledger [--env <name>] transfer <from> <to> <amount> [currency]
//! ```
//!
//! Configuration is read from `config/<env>.yaml` (default `dev`);
//! `DATABASE_URL` overrides the configured PostgreSQL URL.

use anyhow::{Context, bail};

use transfer_ledger::config::AppConfig;
use transfer_ledger::db::Database;
use transfer_ledger::ledger::{SqlStore, Store, TransferTxParams};

fn get_env(args: &[String]) -> String {
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

/// Index of the `transfer` subcommand, ignoring the value of `--env`
fn find_subcommand(args: &[String]) -> Option<usize> {
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--env" | "-e" => i += 2,
            "transfer" => return Some(i),
            _ => i += 1,
        }
    }
    None
}

/// Positional arguments after the `transfer` keyword
fn get_transfer_args(args: &[String]) -> anyhow::Result<Option<TransferTxParams>> {
    let Some(pos) = find_subcommand(args) else {
        return Ok(None);
    };
    let rest = &args[pos + 1..];
    if rest.len() < 3 {
        bail!("usage: transfer <from_account_id> <to_account_id> <amount> [currency]");
    }

    let from: i64 = rest[0].parse().context("from_account_id must be an integer")?;
    let to: i64 = rest[1].parse().context("to_account_id must be an integer")?;
    let amount: i64 = rest[2].parse().context("amount must be an integer")?;

    let mut params = TransferTxParams::new(from, to, amount);
    if let Some(currency) = rest.get(3) {
        params = params.with_currency(currency.as_str());
    }
    Ok(Some(params))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let env = get_env(&args);
    let transfer = get_transfer_args(&args)?;

    let app_config = AppConfig::load(&env)?;
    let _log_guard = transfer_ledger::logging::init_logging(&app_config);

    tracing::info!(
        env = %env,
        git = env!("GIT_HASH"),
        "Starting transfer_ledger"
    );

    let db = Database::connect(&app_config.postgres_url, &app_config.pool)
        .await
        .context("cannot connect to db")?;
    db.migrate().await.context("cannot apply migrations")?;
    db.health_check().await.context("database health check failed")?;

    let Some(params) = transfer else {
        tracing::info!("Database ready");
        return Ok(());
    };

    let store = SqlStore::new(db, &app_config.transfer);
    match store.transfer_tx(params).await {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Err(e) => bail!("transfer failed [{}]: {}", e.code(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(line: &str) -> Vec<String> {
        line.split_whitespace().map(String::from).collect()
    }

    #[test]
    fn test_env_defaults_to_dev() {
        assert_eq!(get_env(&args("transfer_ledger")), "dev");
        assert_eq!(get_env(&args("transfer_ledger -e prod")), "prod");
    }

    #[test]
    fn test_transfer_args_parsed() {
        let params = get_transfer_args(&args("transfer_ledger transfer 1 2 30 USD"))
            .unwrap()
            .unwrap();
        assert_eq!(params, TransferTxParams::new(1, 2, 30).with_currency("USD"));

        assert!(get_transfer_args(&args("transfer_ledger")).unwrap().is_none());
        assert!(get_transfer_args(&args("transfer_ledger transfer 1 2")).is_err());
        assert!(get_transfer_args(&args("transfer_ledger transfer 1 x 30")).is_err());
    }

    #[test]
    fn test_env_named_transfer_is_not_a_subcommand() {
        let line = args("transfer_ledger --env transfer");
        assert_eq!(get_env(&line), "transfer");
        assert!(get_transfer_args(&line).unwrap().is_none());

        let params = get_transfer_args(&args("transfer_ledger --env transfer transfer 3 4 5"))
            .unwrap()
            .unwrap();
        assert_eq!(params, TransferTxParams::new(3, 4, 5));
    }
}
