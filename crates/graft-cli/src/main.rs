//! Command line interface for graft.
//!
//! `graft apply` adds a missing column (plus foreign key and index) in one
//! transaction and is safe to re-run; the other subcommands inspect without
//! writing.

mod config;

use clap::{Args, Parser, Subcommand};
use graft::{
    Column, ColumnPatch, DriftPolicy, ForeignKey, OnDelete, PatchOutcome, Patcher, PgType,
    introspect,
};
use owo_colors::OwoColorize;
use tracing_subscriber::EnvFilter;

/// Idempotent column patching for Postgres.
#[derive(Parser, Debug)]
#[command(name = "graft", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Add a column (with optional foreign key and index) if it is missing
    Apply(PatchArgs),
    /// Print the SQL a patch would run, without running it
    Plan(PatchArgs),
    /// List the columns of a table
    Status {
        /// Table to inspect
        table: String,

        /// Database connection URL
        #[arg(long)]
        database_url: Option<String>,
    },
    /// Verify connectivity, and optionally that expected columns exist
    Check {
        /// Table to inspect
        #[arg(long)]
        table: Option<String>,

        /// Comma-separated column names that must exist
        #[arg(long, value_delimiter = ',', requires = "table")]
        expect: Vec<String>,

        /// Database connection URL
        #[arg(long)]
        database_url: Option<String>,
    },
}

#[derive(Args, Debug)]
struct PatchArgs {
    /// Table to patch
    table: String,

    /// Column to add
    column: String,

    /// Column type (e.g. integer, bigint, text, timestamptz)
    #[arg(long = "type")]
    column_type: PgType,

    /// Add the column as NOT NULL instead of nullable
    #[arg(long)]
    not_null: bool,

    /// Foreign key target, as `table.column` or `table(column)`
    #[arg(long)]
    references: Option<String>,

    /// ON DELETE action for the foreign key (default: no-action)
    #[arg(long, requires = "references")]
    on_delete: Option<OnDelete>,

    /// Create an index on the new column
    #[arg(long)]
    index: bool,

    /// Alter an existing column to match instead of failing on drift
    #[arg(long)]
    reconcile: bool,

    /// Database connection URL
    #[arg(long)]
    database_url: Option<String>,
}

impl PatchArgs {
    fn to_patch(&self) -> Result<ColumnPatch, String> {
        let foreign_key = match &self.references {
            Some(target) => {
                let Some((ref_table, ref_column)) = graft::parse_fk_reference(target) else {
                    return Err(format!(
                        "invalid --references {target:?}: expected table.column or table(column)"
                    ));
                };
                Some(ForeignKey {
                    references_table: ref_table.to_string(),
                    references_column: ref_column.to_string(),
                    on_delete: self.on_delete.unwrap_or_default(),
                })
            }
            None => None,
        };

        let mut column = Column::new(&self.column, self.column_type);
        column.nullable = !self.not_null;

        Ok(ColumnPatch {
            table: self.table.clone(),
            column,
            foreign_key,
            index: self.index,
        })
    }

    fn policy(&self) -> DriftPolicy {
        if self.reconcile {
            DriftPolicy::Reconcile
        } else {
            DriftPolicy::Reject
        }
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{} {e}", "error:".red().bold());
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> Result<i32, Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Apply(args) => {
            let policy = args.policy();
            let patch = args.to_patch()?;
            let url = config::database_url(args.database_url)?;
            let mut client = graft::connect(&url).await?;

            let outcome = Patcher::new(&mut client)
                .with_policy(policy)
                .apply(&patch)
                .await?;
            match outcome {
                PatchOutcome::Applied(plan) => {
                    for change in &plan.changes {
                        println!("{change}");
                    }
                    println!(
                        "column {} added to {}",
                        patch.column.name.green(),
                        patch.table.bold()
                    );
                }
                PatchOutcome::AlreadyPresent => {
                    println!(
                        "column {} already exists on {}",
                        patch.column.name.yellow(),
                        patch.table.bold()
                    );
                }
                PatchOutcome::Reconciled(plan) => {
                    for change in &plan.changes {
                        println!("{change}");
                    }
                    println!(
                        "column {} reconciled on {}",
                        patch.column.name.green(),
                        patch.table.bold()
                    );
                }
            }
            Ok(0)
        }
        Commands::Plan(args) => {
            let policy = args.policy();
            let patch = args.to_patch()?;
            let url = config::database_url(args.database_url)?;
            let mut client = graft::connect(&url).await?;

            let plan = Patcher::new(&mut client)
                .with_policy(policy)
                .plan(&patch)
                .await?;
            if plan.is_empty() {
                println!(
                    "nothing to do: column {} already exists on {}",
                    patch.column.name.yellow(),
                    patch.table.bold()
                );
            } else {
                println!("{}", plan.to_sql());
            }
            Ok(0)
        }
        Commands::Status {
            table,
            database_url,
        } => {
            let url = config::database_url(database_url)?;
            let client = graft::connect(&url).await?;

            if !introspect::table_exists(&client, &table).await? {
                return Err(format!("table {table:?} does not exist").into());
            }
            let columns = introspect::table_columns(&client, &table).await?;
            println!("{} ({} columns)", table.bold(), columns.len());
            for info in columns.values() {
                let mut attrs = Vec::new();
                if !info.nullable {
                    attrs.push("NOT NULL".to_string());
                }
                if let Some(default) = &info.default {
                    attrs.push(format!("DEFAULT {default}"));
                }
                let attrs_str = if attrs.is_empty() {
                    String::new()
                } else {
                    format!(" [{}]", attrs.join(", "))
                };
                println!("  {}: {}{}", info.name, info.data_type, attrs_str);
            }
            Ok(0)
        }
        Commands::Check {
            table,
            expect,
            database_url,
        } => {
            let url = config::database_url(database_url)?;
            let client = graft::connect(&url).await?;

            let version = introspect::server_version(&client).await?;
            println!("server: {version}");

            let Some(table) = table else {
                return Ok(0);
            };
            if !introspect::table_exists(&client, &table).await? {
                return Err(format!("table {table:?} does not exist").into());
            }
            let columns = introspect::table_columns(&client, &table).await?;
            let missing: Vec<&str> = expect
                .iter()
                .map(String::as_str)
                .filter(|name| !columns.contains_key(*name))
                .collect();
            if missing.is_empty() {
                println!(
                    "{}: all {} expected columns present",
                    table.bold(),
                    expect.len()
                );
                Ok(0)
            } else {
                for name in &missing {
                    println!("{} is missing column {}", table.bold(), name.red());
                }
                Ok(1)
            }
        }
    }
}
