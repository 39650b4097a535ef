use anyhow::{Context, Result};
use log::info;
use rusqlite::Connection;

use crate::{cli::ColumnsArgs, evolution, project_cmd, store, table};

pub fn execute(conn: &Connection, args: &ColumnsArgs) -> Result<()> {
    let project = project_cmd::resolve_project(conn, &args.project)?;
    let table_name = project.table();
    let Some(schema) = evolution::describe_table(conn, &table_name)
        .with_context(|| format!("Describing table for project '{}'", project.name))?
    else {
        info!(
            "Project '{}' has no table '{}' yet",
            project.name, table_name
        );
        return Ok(());
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&schema)?);
        return Ok(());
    }

    info!(
        "Table '{}' is at schema version {} ({} data column(s))",
        schema.table,
        schema.version(),
        schema.data_columns.len()
    );
    let headers = vec!["#".to_string(), "column".to_string(), "kind".to_string()];
    let rows = schema
        .columns
        .iter()
        .enumerate()
        .map(|(idx, column)| {
            let kind = if store::is_fixed_column(column) {
                "fixed"
            } else {
                "data"
            };
            vec![(idx + 1).to_string(), column.clone(), kind.to_string()]
        })
        .collect::<Vec<_>>();
    table::print_table(&headers, &rows);
    Ok(())
}
