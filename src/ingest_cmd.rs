use anyhow::{Context, Result};
use log::info;
use rusqlite::Connection;

use crate::{cli::IngestArgs, config::IngestConfig, decode::SheetFile, ingest, project_cmd};

pub fn execute(conn: &mut Connection, mut config: IngestConfig, args: &IngestArgs) -> Result<()> {
    apply_overrides(&mut config, args);
    let project = project_cmd::resolve_project(conn, &args.project)?;

    let mut source = SheetFile::new(&args.input);
    if let Some(name) = &args.file_name {
        source = source.with_file_name(name.clone());
    }
    info!(
        "Ingesting {:?} into project '{}' as {}",
        source.path(),
        project.name,
        args.user
    );
    let result = ingest::ingest(conn, &project.name, &source, &args.user, &config)
        .with_context(|| format!("Ingesting {:?}", args.input))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!(
            "{} row(s) from '{}' ingested into '{}' at {}",
            result.rows_inserted, result.batch.file_name, result.table, result.batch.upload_time
        );
        if !result.columns_added.is_empty() {
            println!(
                "New column(s): {}",
                itertools::join(&result.columns_added, ", ")
            );
        }
    }
    Ok(())
}

/// Command-line flags win over the settings file.
fn apply_overrides(config: &mut IngestConfig, args: &IngestArgs) {
    if let Some(sheet) = &args.sheet {
        config.sheet = Some(sheet.clone());
    }
    if let Some(delimiter) = args.delimiter {
        config.delimiter = Some(delimiter as char);
    }
    if let Some(encoding) = &args.input_encoding {
        config.encoding = Some(encoding.clone());
    }
    if let Some(policy) = args.header_collisions {
        config.header_collisions = policy;
    }
    if let Some(policy) = args.fixed_column_collisions {
        config.fixed_column_collisions = policy;
    }
}
