mod common;

use std::fs;

use assert_cmd::Command;
use common::TestWorkspace;
use predicates::prelude::PredicateBooleanExt;
use predicates::str::contains;

fn sheet_intake(workspace: &TestWorkspace) -> Command {
    let mut cmd = Command::cargo_bin("sheet-intake").expect("binary exists");
    cmd.arg("--db").arg(workspace.db_path());
    cmd
}

fn add_project(workspace: &TestWorkspace, name: &str) {
    sheet_intake(workspace)
        .args(["project", "add", name])
        .assert()
        .success();
}

#[test]
fn project_add_and_list() {
    let workspace = TestWorkspace::new();
    sheet_intake(&workspace)
        .args(["project", "add", "Team A"])
        .assert()
        .success()
        .stdout(contains("team_a"));
    add_project(&workspace, "Alpha");

    let output = sheet_intake(&workspace)
        .args(["project", "list", "--json"])
        .output()
        .expect("run list");
    assert!(output.status.success());
    let projects: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    let names: Vec<_> = projects
        .as_array()
        .expect("array")
        .iter()
        .filter_map(|project| project["name"].as_str())
        .collect();
    assert_eq!(names, vec!["Alpha", "Team A"]);
}

#[test]
fn duplicate_project_table_is_rejected() {
    let workspace = TestWorkspace::new();
    add_project(&workspace, "Team A");
    sheet_intake(&workspace)
        .args(["project", "add", "team-a"])
        .assert()
        .failure()
        .stderr(contains("already used by project 'Team A'"));
}

#[test]
fn ingest_requires_registered_project() {
    let workspace = TestWorkspace::new();
    let input = workspace.write("data.csv", "name\nann\n");
    sheet_intake(&workspace)
        .args(["ingest", "--project", "Ghost", "--user", "bob", "-i"])
        .arg(&input)
        .assert()
        .failure()
        .stderr(contains("not registered"));
}

#[test]
fn reads_require_registered_project() {
    let workspace = TestWorkspace::new();
    for args in [
        vec!["rows", "-p", "Ghost", "-u", "bob"],
        vec!["batches", "-p", "Ghost", "-u", "bob"],
        vec!["columns", "-p", "Ghost"],
    ] {
        sheet_intake(&workspace)
            .args(&args)
            .assert()
            .failure()
            .stderr(contains("Project 'Ghost' is not registered"));
    }

    add_project(&workspace, "Ghost");
    sheet_intake(&workspace)
        .args(["batches", "-p", "Ghost", "-u", "bob"])
        .assert()
        .success();
}

#[test]
fn ingest_then_read_rows_batches_and_columns() {
    let workspace = TestWorkspace::new();
    add_project(&workspace, "Team A");
    let input = workspace.write("scores.csv", "Full Name,2023 Score\nJane Doe,88\nJohn Roe,NA\n");

    sheet_intake(&workspace)
        .args(["ingest", "-p", "Team A", "-u", "bob", "-i"])
        .arg(&input)
        .assert()
        .success()
        .stdout(contains("2 row(s) from 'scores.csv' ingested into 'team_a'"))
        .stdout(contains("c_2023_Score"));

    let output = sheet_intake(&workspace)
        .args(["rows", "-p", "Team A", "-u", "bob", "--json"])
        .output()
        .expect("run rows");
    assert!(output.status.success());
    let rows: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(
        rows["columns"],
        serde_json::json!(["upload_time", "file_name", "Full_Name", "c_2023_Score"])
    );
    assert_eq!(rows["rows"][0]["values"]["c_2023_Score"], "88");
    assert!(rows["rows"][1]["values"]["c_2023_Score"].is_null());

    sheet_intake(&workspace)
        .args(["batches", "-p", "Team A", "-u", "bob"])
        .assert()
        .success()
        .stdout(contains("scores.csv").and(contains("upload_time")));

    sheet_intake(&workspace)
        .args(["columns", "-p", "Team A"])
        .assert()
        .success()
        .stdout(contains("Full_Name").and(contains("fixed")));

    sheet_intake(&workspace)
        .args(["rows", "-p", "Team A", "-u", "alice"])
        .assert()
        .success()
        .stdout(contains("Jane Doe").not());
}

#[test]
fn rows_export_to_csv() {
    let workspace = TestWorkspace::new();
    add_project(&workspace, "Export");
    let input = workspace.write("in.csv", "b,a\n2,1\n");
    sheet_intake(&workspace)
        .args(["ingest", "-p", "Export", "-u", "ann", "-i"])
        .arg(&input)
        .assert()
        .success();

    let out = workspace.path().join("out.csv");
    sheet_intake(&workspace)
        .args(["rows", "-p", "Export", "-u", "ann", "-o"])
        .arg(&out)
        .assert()
        .success();
    let exported = fs::read_to_string(&out).expect("read export");
    let mut lines = exported.lines();
    assert_eq!(lines.next(), Some("upload_time,file_name,a,b"));
    let row = lines.next().expect("data row");
    assert!(row.ends_with(",in.csv,1,2"), "unexpected row {row}");
}

#[test]
fn rename_moves_uploads_to_new_table() {
    let workspace = TestWorkspace::new();
    add_project(&workspace, "Old");
    let input = workspace.write("in.csv", "v\nkept\n");
    sheet_intake(&workspace)
        .args(["ingest", "-p", "Old", "-u", "ann", "-i"])
        .arg(&input)
        .assert()
        .success();

    sheet_intake(&workspace)
        .args(["project", "rename", "--id", "1", "--name", "New"])
        .assert()
        .success()
        .stdout(contains("new"));
    sheet_intake(&workspace)
        .args(["rows", "-p", "New", "-u", "ann"])
        .assert()
        .success()
        .stdout(contains("kept"));
}

#[test]
fn config_file_enables_header_collision_rejection() {
    let workspace = TestWorkspace::new();
    add_project(&workspace, "Strict");
    let config = workspace.write("intake.yaml", "header_collisions: reject\n");
    let input = workspace.write("dup.csv", "first name,first-name\na,b\n");
    sheet_intake(&workspace)
        .arg("--config")
        .arg(&config)
        .args(["ingest", "-p", "Strict", "-u", "ann", "-i"])
        .arg(&input)
        .assert()
        .failure()
        .stderr(contains("both map to column 'first_name'"));
}
