use anyhow::{Context, Result, anyhow};
use log::info;
use rusqlite::Connection;

use crate::{
    cli::ProjectCommands,
    registry::{self, Project},
    table,
};

pub fn execute(conn: &mut Connection, command: &ProjectCommands) -> Result<()> {
    match command {
        ProjectCommands::Add(args) => {
            let project = registry::add_project(conn, &args.name)
                .with_context(|| format!("Adding project '{}'", args.name))?;
            println!("{}\t{}\t{}", project.id, project.name, project.table());
        }
        ProjectCommands::List(args) => {
            let projects = registry::list_projects(conn).context("Listing projects")?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&projects)?);
            } else {
                print_projects(&projects);
            }
        }
        ProjectCommands::Rename(args) => {
            let project = registry::rename_project(conn, args.id, &args.name)
                .with_context(|| format!("Renaming project {} to '{}'", args.id, args.name))?;
            println!("{}\t{}\t{}", project.id, project.name, project.table());
        }
        ProjectCommands::Delete(args) => {
            let project = registry::delete_project(conn, args.id)
                .with_context(|| format!("Deleting project {}", args.id))?;
            info!(
                "Table '{}' still holds the uploads of '{}'",
                project.table(),
                project.name
            );
        }
    }
    Ok(())
}

/// Looks up a registered project by name.
pub fn resolve_project(conn: &Connection, name: &str) -> Result<Project> {
    registry::find_project(conn, name)
        .with_context(|| format!("Looking up project '{name}'"))?
        .ok_or_else(|| anyhow!("Project '{name}' is not registered; add it with `project add`"))
}

fn print_projects(projects: &[Project]) {
    let headers = vec!["id".to_string(), "name".to_string(), "table".to_string()];
    let rows = projects
        .iter()
        .map(|project| {
            vec![
                project.id.to_string(),
                project.name.clone(),
                project.table().into_string(),
            ]
        })
        .collect::<Vec<_>>();
    table::print_table(&headers, &rows);
}
