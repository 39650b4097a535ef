//! Project registry.
//!
//! Projects are named by users and backed by one table each, whose name is
//! the sanitized project name. The registry keeps two projects from sharing
//! a table and keeps record and table in step when a project is renamed.
//! Deleting a project forgets the record; its table and uploads stay.

use log::{debug, info};
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;

use crate::{
    error::RegistryError,
    evolution,
    sanitize::{Identifier, sanitize_table},
    store,
};

pub const PROJECTS_TABLE: &str = "projects";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Project {
    pub id: i64,
    pub name: String,
}

impl Project {
    /// Table backing this project.
    pub fn table(&self) -> Identifier {
        sanitize_table(&self.name)
    }
}

pub fn ensure_registry(conn: &Connection) -> Result<(), RegistryError> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {PROJECTS_TABLE} (\
            id INTEGER PRIMARY KEY AUTOINCREMENT, \
            name TEXT NOT NULL)"
    ))?;
    Ok(())
}

/// Registers `name` and creates its (empty) table in one transaction.
pub fn add_project(conn: &mut Connection, name: &str) -> Result<Project, RegistryError> {
    let name = checked_name(name)?;
    ensure_registry(conn)?;
    let table = sanitize_table(name);
    ensure_table_free(conn, &table, None)?;

    let tx = conn.transaction()?;
    tx.execute(
        &format!("INSERT INTO {PROJECTS_TABLE} (name) VALUES (?1)"),
        params![name],
    )?;
    let id = tx.last_insert_rowid();
    evolution::ensure_table(&tx, &table)?;
    tx.commit()?;

    info!("Registered project '{name}' (id {id}) backed by table '{table}'");
    Ok(Project {
        id,
        name: name.to_string(),
    })
}

/// All projects ordered by name.
pub fn list_projects(conn: &Connection) -> Result<Vec<Project>, RegistryError> {
    ensure_registry(conn)?;
    let mut stmt = conn.prepare(&format!(
        "SELECT id, name FROM {PROJECTS_TABLE} ORDER BY name, id"
    ))?;
    let projects = stmt
        .query_map([], |row| {
            Ok(Project {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(projects)
}

pub fn get_project(conn: &Connection, id: i64) -> Result<Project, RegistryError> {
    ensure_registry(conn)?;
    conn.query_row(
        &format!("SELECT id, name FROM {PROJECTS_TABLE} WHERE id = ?1"),
        params![id],
        |row| {
            Ok(Project {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        },
    )
    .optional()?
    .ok_or(RegistryError::NotFound(id))
}

/// Looks a project up by its exact (trimmed) name.
pub fn find_project(conn: &Connection, name: &str) -> Result<Option<Project>, RegistryError> {
    ensure_registry(conn)?;
    let project = conn
        .query_row(
            &format!("SELECT id, name FROM {PROJECTS_TABLE} WHERE name = ?1 ORDER BY id LIMIT 1"),
            params![name.trim()],
            |row| {
                Ok(Project {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            },
        )
        .optional()?;
    Ok(project)
}

/// Renames project `id`, moving its table along with the record.
///
/// The registry update and the table rename share one transaction. When the
/// old table was never created, the new one is created instead.
pub fn rename_project(
    conn: &mut Connection,
    id: i64,
    new_name: &str,
) -> Result<Project, RegistryError> {
    let new_name = checked_name(new_name)?;
    let current = get_project(conn, id)?;
    let old_table = current.table();
    let new_table = sanitize_table(new_name);
    ensure_table_free(conn, &new_table, Some(id))?;

    let tx = conn.transaction()?;
    tx.execute(
        &format!("UPDATE {PROJECTS_TABLE} SET name = ?1 WHERE id = ?2"),
        params![new_name, id],
    )?;
    if old_table == new_table {
        debug!("Project {id} keeps table '{old_table}'");
    } else if store::table_exists(&tx, &old_table)? {
        evolution::rename_table(&tx, &old_table, &new_table)?;
    } else {
        evolution::ensure_table(&tx, &new_table)?;
    }
    tx.commit()?;

    info!(
        "Renamed project {id} from '{}' to '{new_name}'",
        current.name
    );
    Ok(Project {
        id,
        name: new_name.to_string(),
    })
}

/// Removes the registry record of project `id`. The backing table is kept.
pub fn delete_project(conn: &Connection, id: i64) -> Result<Project, RegistryError> {
    let project = get_project(conn, id)?;
    conn.execute(
        &format!("DELETE FROM {PROJECTS_TABLE} WHERE id = ?1"),
        params![id],
    )?;
    info!(
        "Deleted project '{}' (id {id}); table '{}' retained",
        project.name,
        project.table()
    );
    Ok(project)
}

fn checked_name(name: &str) -> Result<&str, RegistryError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(RegistryError::EmptyName);
    }
    Ok(name)
}

/// Fails when another project (other than `except`) is backed by `table`.
fn ensure_table_free(
    conn: &Connection,
    table: &Identifier,
    except: Option<i64>,
) -> Result<(), RegistryError> {
    let owner = list_projects(conn)?
        .into_iter()
        .filter(|project| Some(project.id) != except)
        .find(|project| project.table() == *table);
    match owner {
        Some(owner) => Err(RegistryError::TableConflict {
            table: table.to_string(),
            owner: owner.name,
        }),
        None => Ok(()),
    }
}
