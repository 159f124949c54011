//! # Database Subcommands
//!
//! - `migrate` — apply the service's embedded migrations
//! - `audit-verify` — recompute the audit log hash chain
//!
//! Both read the connection string from `--database-url` or `DATABASE_URL`.

use anyhow::{Context, Result};
use clap::Args;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use rsm_api::db::audit::verify_chain_integrity;
use rsm_api::db::MIGRATOR;

/// Connection arguments shared by the database subcommands.
#[derive(Args, Debug)]
pub struct DatabaseArgs {
    /// Postgres connection string.
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: String,
}

/// Arguments for `rsm audit-verify`.
#[derive(Args, Debug)]
pub struct AuditVerifyArgs {
    #[command(flatten)]
    pub db: DatabaseArgs,

    /// Number of events to check, oldest first.
    #[arg(long, default_value_t = 100_000)]
    pub limit: i64,
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")
}

async fn connect(url: &str) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(2)
        .connect(url)
        .await
        .context("failed to connect to the database")
}

pub fn run_migrate(args: &DatabaseArgs) -> Result<u8> {
    runtime()?.block_on(async {
        let pool = connect(&args.database_url).await?;
        MIGRATOR
            .run(&pool)
            .await
            .context("failed to apply migrations")?;
        let applied = MIGRATOR.iter().count();
        tracing::info!(migrations = applied, "migrations applied");
        println!("{applied} migrations applied");
        Ok(0)
    })
}

pub fn run_audit_verify(args: &AuditVerifyArgs) -> Result<u8> {
    runtime()?.block_on(async {
        let pool = connect(&args.db.database_url).await?;
        let result = verify_chain_integrity(&pool, args.limit)
            .await
            .context("failed to read audit events")?;

        println!("events checked   {}", result.total_events);
        println!("broken links     {}", result.broken_links);
        println!("hash mismatches  {}", result.hash_mismatches);
        if result.chain_valid {
            println!("audit chain valid");
            Ok(0)
        } else {
            tracing::error!(
                broken_links = result.broken_links,
                hash_mismatches = result.hash_mismatches,
                "audit chain integrity check failed"
            );
            println!("audit chain INVALID");
            Ok(2)
        }
    })
}
