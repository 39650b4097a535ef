mod common;

use common::{TestWorkspace, column_names, row_count, timestamp};
use sheet_intake::config::IngestConfig;
use sheet_intake::decode::{MemorySheet, SheetFile};
use sheet_intake::error::IngestError;
use sheet_intake::ingest::{BatchKey, ingest, ingest_at};
use sheet_intake::reconstruct::{fetch_batch_rows, fetch_batches, fetch_rows};
use sheet_intake::registry::add_project;
use sheet_intake::store;

#[test]
fn upload_creates_sanitized_table_and_reads_back() {
    let workspace = TestWorkspace::new();
    let mut conn = workspace.connect();
    let config = IngestConfig::default();
    add_project(&mut conn, "Team A").expect("add project");

    let source = MemorySheet::from_strings(
        "scores.xlsx",
        &["Full Name", "2023 Score"],
        &[&["Jane Doe", "88"]],
    );
    let result = ingest(&mut conn, "Team A", &source, "bob", &config).expect("ingest");
    assert_eq!(result.table, "team_a");
    assert_eq!(result.rows_inserted, 1);
    assert_eq!(
        column_names(&conn, "team_a"),
        vec![
            "id",
            "uploaded_by",
            "upload_time",
            "file_name",
            "Full_Name",
            "c_2023_Score"
        ]
    );

    let rows = fetch_rows(&conn, "Team A", "bob").expect("fetch rows");
    assert_eq!(
        rows.columns,
        vec!["upload_time", "file_name", "Full_Name", "c_2023_Score"]
    );
    assert_eq!(rows.rows.len(), 1);
    let row = &rows.rows[0];
    assert_eq!(row.uploaded_by, "bob");
    assert_eq!(row.file_name, "scores.xlsx");
    assert_eq!(row.upload_time, result.batch.upload_time);
    assert_eq!(row.get("Full_Name"), Some("Jane Doe"));
    assert_eq!(row.get("c_2023_Score"), Some("88"));
}

#[test]
fn later_uploads_grow_the_schema_and_leave_old_rows_null() {
    let workspace = TestWorkspace::new();
    let mut conn = workspace.connect();
    let config = IngestConfig::default();

    let first = MemorySheet::from_strings("one.csv", &["name"], &[&["ann"]]);
    ingest_at(&mut conn, "Growth", &first, "ann", timestamp(1, 9, 0), &config).expect("first");
    let second = MemorySheet::from_strings("two.csv", &["Name", "city"], &[&["ben", "Oslo"]]);
    let result =
        ingest_at(&mut conn, "Growth", &second, "ann", timestamp(2, 9, 0), &config).expect("second");

    // `Name` folds onto the existing `name` column.
    assert_eq!(result.columns_added, vec!["city"]);
    assert_eq!(
        column_names(&conn, "growth"),
        vec!["id", "uploaded_by", "upload_time", "file_name", "name", "city"]
    );

    let rows = fetch_rows(&conn, "Growth", "ann").expect("fetch rows");
    assert_eq!(rows.columns, vec!["upload_time", "file_name", "city", "name"]);
    assert_eq!(rows.rows[0].get("name"), Some("ann"));
    assert_eq!(rows.rows[0].values.get("city"), Some(&None));
    assert_eq!(rows.rows[1].get("city"), Some("Oslo"));
    assert_eq!(rows.rows[1].get("name"), Some("ben"));
}

#[test]
fn batches_are_grouped_per_upload_most_recent_first() {
    let workspace = TestWorkspace::new();
    let mut conn = workspace.connect();
    let config = IngestConfig::default();

    let first = MemorySheet::from_strings("a.xlsx", &["v"], &[&["1"], &["2"], &["3"]]);
    ingest_at(&mut conn, "Demo", &first, "alice", timestamp(3, 10, 0), &config).expect("first");
    let second = MemorySheet::from_strings("b.xlsx", &["v"], &[&["4"], &["5"]]);
    ingest_at(&mut conn, "Demo", &second, "alice", timestamp(3, 10, 5), &config).expect("second");
    let other = MemorySheet::from_strings("c.xlsx", &["v"], &[&["6"]]);
    ingest_at(&mut conn, "Demo", &other, "carol", timestamp(3, 11, 0), &config).expect("other");

    let batches = fetch_batches(&conn, "Demo", "alice").expect("batches");
    let summary: Vec<_> = batches
        .iter()
        .map(|batch| (batch.file_name.as_str(), batch.upload_time.as_str(), batch.row_count))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("b.xlsx", "2024-05-03 10:05:00", 2),
            ("a.xlsx", "2024-05-03 10:00:00", 3),
        ]
    );
    assert!(batches.iter().all(|batch| batch.table_name == "demo"));
    assert!(batches.iter().all(|batch| batch.project_name == "Demo"));

    let drill_down = fetch_batch_rows(&conn, "Demo", &batches[1].key()).expect("batch rows");
    let values: Vec<_> = drill_down
        .rows
        .iter()
        .filter_map(|row| row.get("v"))
        .collect();
    assert_eq!(values, vec!["1", "2", "3"]);
}

#[test]
fn rows_are_scoped_to_the_uploader() {
    let workspace = TestWorkspace::new();
    let mut conn = workspace.connect();
    let config = IngestConfig::default();

    let mine = MemorySheet::from_strings("mine.csv", &["v"], &[&["a"]]);
    ingest_at(&mut conn, "Shared", &mine, "dora", timestamp(4, 8, 0), &config).expect("mine");
    let theirs = MemorySheet::from_strings("theirs.csv", &["v"], &[&["b"], &["c"]]);
    ingest_at(&mut conn, "Shared", &theirs, "eve", timestamp(4, 8, 1), &config).expect("theirs");

    let rows = fetch_rows(&conn, "Shared", "dora").expect("fetch rows");
    assert_eq!(rows.rows.len(), 1);
    assert!(fetch_rows(&conn, "Shared", "nobody").expect("fetch").is_empty());
}

#[test]
fn reads_of_an_unknown_project_are_empty() {
    let workspace = TestWorkspace::new();
    let conn = workspace.connect();

    let rows = fetch_rows(&conn, "Never Uploaded", "bob").expect("fetch rows");
    assert_eq!(rows.columns, vec!["upload_time", "file_name"]);
    assert!(rows.is_empty());
    assert!(fetch_batches(&conn, "Never Uploaded", "bob").expect("batches").is_empty());

    let key = BatchKey {
        uploaded_by: "bob".into(),
        upload_time: "2024-05-01 00:00:00".into(),
        file_name: "x.csv".into(),
    };
    assert!(fetch_batch_rows(&conn, "Never Uploaded", &key).expect("batch").is_empty());
}

#[test]
fn registered_project_without_uploads_reads_empty() {
    let workspace = TestWorkspace::new();
    let mut conn = workspace.connect();
    add_project(&mut conn, "Fresh").expect("add project");

    let rows = fetch_rows(&conn, "Fresh", "bob").expect("fetch rows");
    assert_eq!(rows.columns, vec!["upload_time", "file_name"]);
    assert!(fetch_batches(&conn, "Fresh", "bob").expect("batches").is_empty());
}

#[test]
fn failing_row_rolls_back_the_upload_but_keeps_new_columns() {
    let workspace = TestWorkspace::new();
    let mut conn = workspace.connect();
    let config = IngestConfig::default();

    let seed = MemorySheet::from_strings("seed.csv", &["v"], &[&["fine"]]);
    ingest_at(&mut conn, "Guarded", &seed, "fay", timestamp(5, 9, 0), &config).expect("seed");
    conn.execute_batch(
        "CREATE TRIGGER reject_boom BEFORE INSERT ON guarded \
         WHEN NEW.v = 'boom' BEGIN SELECT RAISE(ABORT, 'boom rejected'); END;",
    )
    .expect("create trigger");

    let upload = MemorySheet::from_strings(
        "bad.csv",
        &["v", "extra"],
        &[&["ok", "1"], &["boom", "2"], &["later", "3"]],
    );
    let err = ingest_at(&mut conn, "Guarded", &upload, "fay", timestamp(5, 9, 30), &config)
        .expect_err("trigger should abort the insert");

    match err {
        IngestError::Ingestion { ref table, row, .. } => {
            assert_eq!(table, "guarded");
            assert_eq!(row, 2);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(row_count(&conn, "guarded"), 1);
    assert!(column_names(&conn, "guarded").contains(&"extra".to_string()));
    assert_eq!(fetch_batches(&conn, "Guarded", "fay").expect("batches").len(), 1);
}

#[test]
fn workbook_upload_renders_cells_as_text() {
    let workspace = TestWorkspace::new();
    let mut conn = workspace.connect();
    let config = IngestConfig::default();
    let path = workspace.write_xlsx(
        "scores.xlsx",
        &["Full Name", "2023 Score", "Ratio", "Note"],
        &[
            &["Jane Doe", "88", "0.5", ""],
            &["", "", "", ""],
            &["John Roe", "91", "1.25", "late"],
        ],
    );

    let result = ingest(&mut conn, "Team A", &SheetFile::new(&path), "bob", &config)
        .expect("ingest workbook");
    assert_eq!(result.batch.file_name, "scores.xlsx");
    assert_eq!(result.rows_inserted, 2);

    let rows = fetch_rows(&conn, "Team A", "bob").expect("fetch rows");
    assert_eq!(rows.rows[0].get("c_2023_Score"), Some("88"));
    assert_eq!(rows.rows[0].get("Ratio"), Some("0.5"));
    assert_eq!(rows.rows[0].get("Note"), None);
    assert_eq!(rows.rows[1].get("Full_Name"), Some("John Roe"));
    assert_eq!(rows.rows[1].get("Ratio"), Some("1.25"));
}

#[test]
fn csv_upload_keeps_recorded_file_name_override() {
    let workspace = TestWorkspace::new();
    let mut conn = workspace.connect();
    let config = IngestConfig::default();
    let path = workspace.write("spool-1234.tsv", "name\tscore\nann\t7\n");

    let source = SheetFile::new(&path).with_file_name("results.tsv");
    let result = ingest(&mut conn, "Tabs", &source, "ann", &config).expect("ingest tsv");
    assert_eq!(result.batch.file_name, "results.tsv");

    let rows = fetch_rows(&conn, "Tabs", "ann").expect("fetch rows");
    assert_eq!(rows.rows[0].get("score"), Some("7"));
    assert_eq!(rows.rows[0].file_name, "results.tsv");
}

#[test]
fn unreadable_upload_changes_nothing() {
    let workspace = TestWorkspace::new();
    let mut conn = workspace.connect();
    let path = workspace.write("broken.xlsx", "this is not a zip archive");

    let err = ingest(
        &mut conn,
        "Broken",
        &SheetFile::new(&path),
        "bob",
        &IngestConfig::default(),
    )
    .expect_err("not a workbook");
    assert!(matches!(err, IngestError::Parse { ref file_name, .. } if file_name == "broken.xlsx"));
    assert!(column_names(&conn, "broken").is_empty());
}

#[test]
fn headers_naming_fixed_columns_do_not_touch_bookkeeping() {
    let workspace = TestWorkspace::new();
    let mut conn = workspace.connect();
    let config = IngestConfig::default();

    let source = MemorySheet::from_strings(
        "spoof.csv",
        &["Uploaded By", "value"],
        &[&["mallory", "1"]],
    );
    ingest_at(&mut conn, "Audit", &source, "trent", timestamp(6, 7, 0), &config).expect("ingest");

    let rows = fetch_rows(&conn, "Audit", "trent").expect("fetch rows");
    assert_eq!(rows.rows.len(), 1);
    assert_eq!(rows.rows[0].uploaded_by, "trent");
    assert!(fetch_rows(&conn, "Audit", "mallory").expect("fetch").is_empty());
}

#[test]
fn commit_blocked_by_reader_is_an_ingestion_timeout() {
    let workspace = TestWorkspace::new();
    let config = IngestConfig {
        busy_timeout_ms: 100,
        ..IngestConfig::default()
    };
    let mut conn = store::open(&workspace.db_path(), &config).expect("open writer");
    let seed = MemorySheet::from_strings("seed.csv", &["v"], &[&["1"]]);
    ingest_at(&mut conn, "Locked", &seed, "gus", timestamp(7, 9, 0), &config).expect("seed");

    let reader = workspace.connect();
    reader
        .execute_batch("BEGIN; SELECT COUNT(*) FROM locked;")
        .expect("open read transaction");

    let upload = MemorySheet::from_strings("blocked.csv", &["v"], &[&["2"], &["3"]]);
    let err = ingest_at(&mut conn, "Locked", &upload, "gus", timestamp(7, 9, 5), &config)
        .expect_err("commit should time out");
    assert!(err.is_timeout(), "expected a busy timeout, got {err}");
    assert!(
        matches!(err, IngestError::Ingestion { ref table, row: 2, .. } if table == "locked"),
        "unexpected error kind: {err:?}"
    );

    reader.execute_batch("COMMIT;").expect("close read transaction");
    assert_eq!(row_count(&conn, "locked"), 1);
}

#[test]
fn blank_workbook_headers_keep_their_columns_apart() {
    let workspace = TestWorkspace::new();
    let mut conn = workspace.connect();
    let path = workspace.write_xlsx(
        "blank_headers.xlsx",
        &["name", "", ""],
        &[&["ann", "left", ""], &["ben", "x", "y"]],
    );

    let result = ingest(
        &mut conn,
        "Blanks",
        &SheetFile::new(&path),
        "ann",
        &IngestConfig::default(),
    )
    .expect("ingest workbook");
    assert_eq!(result.columns_added, vec!["name", "Unnamed_1", "Unnamed_2"]);

    let rows = fetch_rows(&conn, "Blanks", "ann").expect("fetch rows");
    assert_eq!(rows.rows[0].get("Unnamed_1"), Some("left"));
    assert_eq!(rows.rows[0].get("Unnamed_2"), None);
    assert_eq!(rows.rows[1].get("Unnamed_1"), Some("x"));
    assert_eq!(rows.rows[1].get("Unnamed_2"), Some("y"));
}
