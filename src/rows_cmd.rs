use anyhow::{Context, Result};
use log::info;
use rusqlite::Connection;

use crate::{
    cli::{BatchesArgs, RowsArgs},
    ingest::BatchKey,
    io_utils, project_cmd, reconstruct, table,
};

pub fn execute_rows(conn: &Connection, args: &RowsArgs) -> Result<()> {
    let project = project_cmd::resolve_project(conn, &args.project)?;
    let row_set = match (&args.batch_time, &args.file) {
        (Some(upload_time), Some(file_name)) => {
            let batch = BatchKey {
                uploaded_by: args.user.clone(),
                upload_time: upload_time.clone(),
                file_name: file_name.clone(),
            };
            reconstruct::fetch_batch_rows(conn, &project.name, &batch)
        }
        _ => reconstruct::fetch_rows(conn, &project.name, &args.user),
    }
    .with_context(|| format!("Reading rows of project '{}'", project.name))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&row_set)?);
        return Ok(());
    }
    let cells = row_set
        .rows
        .iter()
        .map(|row| row.cells(&row_set.columns))
        .collect::<Vec<_>>();
    match &args.output {
        Some(path) => {
            let mut writer = io_utils::open_csv_writer(Some(path))?;
            writer
                .write_record(&row_set.columns)
                .context("Writing CSV header")?;
            for record in &cells {
                writer.write_record(record).context("Writing CSV row")?;
            }
            writer.flush().context("Flushing CSV output")?;
            info!("Exported {} row(s) to {:?}", cells.len(), path);
        }
        None => {
            if row_set.is_empty() {
                info!(
                    "No rows uploaded by {} in project '{}'",
                    args.user, project.name
                );
            }
            table::print_table(&row_set.columns, &cells);
        }
    }
    Ok(())
}

pub fn execute_batches(conn: &Connection, args: &BatchesArgs) -> Result<()> {
    let project = project_cmd::resolve_project(conn, &args.project)?;
    let batches = reconstruct::fetch_batches(conn, &project.name, &args.user)
        .with_context(|| format!("Reading batches of project '{}'", project.name))?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&batches)?);
        return Ok(());
    }
    let headers = ["upload_time", "file_name", "rows"]
        .into_iter()
        .map(String::from)
        .collect::<Vec<_>>();
    let rows = batches
        .iter()
        .map(|batch| {
            vec![
                batch.upload_time.clone(),
                batch.file_name.clone(),
                batch.row_count.to_string(),
            ]
        })
        .collect::<Vec<_>>();
    table::print_table(&headers, &rows);
    Ok(())
}
