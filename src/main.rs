use anyhow::Result;
use clap::{Parser, Subcommand};
use querygate::translator::templates::supported_grammar;
use querygate::{
    EngineConfig, NlQueryRequest, QueryError, QueryExecutor, QueryParam, QueryPipeline, RawQueryRequest,
    SafetySettings, SchemaRequest, SqlValidator, ValidateRequest, ValidateResponse,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "querygate")]
#[command(about = "Translate natural language to SQL, check it, and run it")]
struct Cli {
    /// JSON configuration file (default: environment / .env)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Translate a natural-language request and execute it
    Ask {
        text: String,

        /// Confirm a destructive statement
        #[arg(long)]
        confirm: bool,

        /// Print the translation and verdict without executing
        #[arg(long)]
        dry_run: bool,
    },
    /// Execute raw SQL with positional parameters
    Sql {
        sql: String,

        /// Positional parameter (repeatable); numbers, true/false and null are typed
        #[arg(short, long = "param")]
        params: Vec<String>,

        #[arg(long)]
        confirm: bool,
    },
    /// Show the schema of one table or the whole database
    Schema {
        #[arg(short, long)]
        table: Option<String>,

        /// Drop cached schema before reading
        #[arg(long)]
        refresh: bool,
    },
    /// Validate SQL without connecting to a database
    Validate { sql: String },
    /// Check that the backend answers
    Health,
}

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Offline: only the safety settings are read, no backend is required
    if let Command::Validate { sql } = &cli.command {
        init_tracing("warn");
        let settings = match &cli.config {
            Some(path) => SafetySettings::from_file(path)?,
            None => SafetySettings::from_env()?,
        };
        let verdict = SqlValidator::from_settings(&settings).validate(sql, false);
        return print_json(&ValidateResponse::from(verdict));
    }

    let config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::from_env()?,
    };
    init_tracing(&config.log_level);

    info!("querygate starting ({} backend)", config.backend.kind());
    let executor = Arc::new(QueryExecutor::connect(&config).await?);
    let pipeline = QueryPipeline::new(&config, Arc::clone(&executor));

    let outcome = tokio::select! {
        result = run(&pipeline, cli.command) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
            Ok(())
        }
    };

    executor.shutdown().await;

    if let Err(e) = &outcome {
        match e.downcast_ref::<QueryError>() {
            Some(failure @ QueryError::UnrecognizedIntent { .. }) => {
                error!("{} stage failed: {}", failure.stage(), failure);
                info!("Supported phrasings:\n  {}", supported_grammar().join("\n  "));
            }
            Some(failure) => error!("{} stage failed: {}", failure.stage(), failure),
            None => error!("{}", e),
        }
    }
    outcome
}

async fn run(pipeline: &QueryPipeline, command: Command) -> Result<()> {
    match command {
        Command::Ask { text, confirm, dry_run } => {
            if dry_run {
                let translation = pipeline.translate(&text).await?;
                let verdict = pipeline.validate(ValidateRequest {
                    sql: translation.generated_sql.clone(),
                });
                print_json(&serde_json::json!({ "translation": translation, "validation": verdict }))
            } else {
                let response = pipeline
                    .natural_language(NlQueryRequest {
                        query: text,
                        confirm_destructive: confirm,
                    })
                    .await?;
                print_json(&response)
            }
        }
        Command::Sql { sql, params, confirm } => {
            let response = pipeline
                .raw_sql(RawQueryRequest {
                    sql,
                    params: params.iter().map(|p| QueryParam::infer(p)).collect(),
                    confirm_destructive: confirm,
                })
                .await?;
            print_json(&response)
        }
        Command::Schema { table, refresh } => {
            if refresh {
                pipeline.executor().refresh_schema(table.as_deref());
            }
            let response = pipeline.schema(SchemaRequest { table_name: table }).await?;
            print_json(&response)
        }
        Command::Validate { sql } => print_json(&pipeline.validate(ValidateRequest { sql })),
        Command::Health => {
            let healthy = pipeline.executor().health_check().await?;
            print_json(&serde_json::json!({
                "engine": pipeline.executor().engine_name(),
                "healthy": healthy,
            }))
        }
    }
}
