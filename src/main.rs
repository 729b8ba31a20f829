//! sql-ext - Main entry point.
//!
//! Runs one operation (non-query, table, reader, scalar or transaction)
//! against MySQL or SQL Server and prints the result to stdout.

use serde_json::Value as JsonValue;
use sql_ext::config::{Command, Config};
use sql_ext::db::ExecutionGuard;
use sql_ext::error::{DbError, DbResult};
use sql_ext::format;
use sql_ext::models::ConnectionConfig;
use sql_ext::{BlockingCaller, DatabaseCaller};
use std::process::ExitCode;
use std::time::Instant;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging. Logs go to stderr so
/// stdout carries only results.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

/// Cancel `token` on the first Ctrl-C.
fn spawn_ctrl_c(handle: &Handle, token: CancellationToken) {
    handle.spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling the running statement");
            token.cancel();
        }
    });
}

fn scalar_default(text: &str) -> JsonValue {
    serde_json::from_str(text).unwrap_or_else(|_| JsonValue::String(text.to_string()))
}

fn print_json<T: serde::Serialize>(value: &T) -> DbResult<()> {
    let text = serde_json::to_string(value)
        .map_err(|e| DbError::internal(format!("Failed to serialize output: {}", e)))?;
    println!("{}", text);
    Ok(())
}

async fn run_async(
    config: &Config,
    conn_config: &ConnectionConfig,
    guard: ExecutionGuard,
) -> DbResult<()> {
    let mut caller = DatabaseCaller::connect(conn_config)
        .await?
        .with_guard(guard);
    let db_type = conn_config.db_type;
    let start = Instant::now();

    match &config.command {
        Command::NonQuery(args) => {
            let (sql, params) = args.bind(db_type)?;
            let rows = caller.execute_non_query(&sql, &params).await?;
            println!("{} rows affected", rows);
        }
        Command::Table(args) => {
            let (sql, params) = args.bind(db_type)?;
            let table = caller.execute_query_table(&sql, &params).await?;
            let elapsed = start.elapsed().as_millis() as u64;
            println!("{}", format::render(&table, config.format, elapsed));
        }
        Command::Reader(args) => {
            let (sql, params) = args.bind(db_type)?;
            let mut reader = caller.execute_query_reader(&sql, &params).await?;
            while reader.read().await? {
                print_json(reader.row()?)?;
            }
            info!(rows = reader.rows_read(), "Reader finished");
        }
        Command::Scalar { statement, default } => {
            let (sql, params) = statement.bind(db_type)?;
            let value = caller
                .execute_scalar(&sql, &params, scalar_default(default))
                .await?;
            print_json(&value)?;
        }
        Command::Transaction { .. } => {
            let batch = config.command.batch().map_err(DbError::invalid_input)?;
            let summary = caller.execute_transaction(&batch).await?;
            print_json(&summary)?;
        }
    }

    caller.close().await
}

fn run_blocking(
    config: &Config,
    conn_config: &ConnectionConfig,
    guard: ExecutionGuard,
    token: CancellationToken,
) -> DbResult<()> {
    let mut caller = BlockingCaller::connect_with(conn_config, guard)?;
    spawn_ctrl_c(&caller.handle(), token);
    let db_type = conn_config.db_type;
    let start = Instant::now();

    match &config.command {
        Command::NonQuery(args) => {
            let (sql, params) = args.bind(db_type)?;
            let rows = caller.execute_non_query(&sql, &params)?;
            println!("{} rows affected", rows);
        }
        Command::Table(args) => {
            let (sql, params) = args.bind(db_type)?;
            let table = caller.execute_query_table(&sql, &params)?;
            let elapsed = start.elapsed().as_millis() as u64;
            println!("{}", format::render(&table, config.format, elapsed));
        }
        Command::Reader(args) => {
            let (sql, params) = args.bind(db_type)?;
            let reader = caller.execute_query_reader(&sql, &params)?;
            for row in reader {
                print_json(&row?)?;
            }
        }
        Command::Scalar { statement, default } => {
            let (sql, params) = statement.bind(db_type)?;
            let value = caller.execute_scalar(&sql, &params, scalar_default(default))?;
            print_json(&value)?;
        }
        Command::Transaction { .. } => {
            let batch = config.command.batch().map_err(DbError::invalid_input)?;
            let summary = caller.execute_transaction(&batch)?;
            print_json(&summary)?;
        }
    }

    caller.close()
}

fn run(config: &Config) -> DbResult<()> {
    let db_config = config.parse_database().map_err(DbError::invalid_input)?;
    let conn_config = db_config
        .to_connection_config(config.connect_timeout)
        .map_err(|e| DbError::invalid_input(e.to_string()))?;

    info!(
        db_type = %conn_config.db_type,
        database = conn_config.database.as_deref().unwrap_or(""),
        blocking = config.blocking,
        "Connecting"
    );

    let token = CancellationToken::new();
    let mut guard = ExecutionGuard::none().with_cancellation(token.clone());
    if let Some(timeout) = config.query_timeout_duration() {
        guard = guard.with_timeout(timeout);
    }

    if config.blocking {
        return run_blocking(config, &conn_config, guard, token);
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| DbError::internal(format!("Failed to start runtime: {}", e)))?;
    spawn_ctrl_c(runtime.handle(), token);
    runtime.block_on(run_async(config, &conn_config, guard))
}

fn main() -> ExitCode {
    let config = Config::parse_args();
    init_tracing(&config);

    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("Error: {}", e);
            if let Some(suggestion) = e.suggestion() {
                eprintln!("Hint: {}", suggestion);
            }
            ExitCode::FAILURE
        }
    }
}
