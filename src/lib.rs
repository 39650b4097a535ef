pub mod cli;
pub mod config;
pub mod decode;
pub mod error;
pub mod evolution;
pub mod ingest;
pub mod ingest_cmd;
pub mod io_utils;
pub mod normalize;
pub mod project_cmd;
pub mod reconstruct;
pub mod registry;
pub mod rows_cmd;
pub mod sanitize;
pub mod schema_cmd;
pub mod store;
pub mod table;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, debug};

use crate::{
    cli::{Cli, Commands},
    config::IngestConfig,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("sheet_intake", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let config = IngestConfig::load_or_default(cli.config.as_deref())?;
    let mut conn = store::open(&cli.db, &config)
        .with_context(|| format!("Opening database {:?}", cli.db))?;
    debug!("Using database {:?}", cli.db);
    match &cli.command {
        Commands::Project(command) => project_cmd::execute(&mut conn, command),
        Commands::Ingest(args) => ingest_cmd::execute(&mut conn, config, args),
        Commands::Rows(args) => rows_cmd::execute_rows(&conn, args),
        Commands::Batches(args) => rows_cmd::execute_batches(&conn, args),
        Commands::Columns(args) => schema_cmd::execute(&conn, args),
    }
}
