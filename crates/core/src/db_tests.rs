// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use crate::diff::apply_changes;
use crate::model::ChangeType;
use chrono::Duration;
use yare::parameterized;

fn db() -> Database {
    Database::open_in_memory().unwrap()
}

fn uploaded_version(id: &str, location: &str, content: &str, ts: DateTime<Utc>) -> FileVersion {
    FileVersion {
        id: id.to_string(),
        file_id: format!("remote-{id}"),
        location: location.to_string(),
        content: content.to_string(),
        timestamp: ts,
        client: "peer".to_string(),
    }
}

#[test]
fn create_and_find_file() {
    let db = db();
    assert!(db.find_file_by_location("a.md").unwrap().is_none());

    let file = db.create_file("a.md").unwrap();
    let found = db.find_file_by_location("a.md").unwrap().unwrap();
    assert_eq!(found, file);
    assert!(found.active);
    assert!(found.content.is_empty());
}

#[test]
fn duplicate_location_is_rejected() {
    let db = db();
    db.create_file("a.md").unwrap();
    let err = db.create_file("a.md").unwrap_err();
    assert!(matches!(err, Error::Database(_)));
}

#[test]
fn create_version_updates_file_and_records_changes() {
    let db = db();
    let file = db.create_file("a.md").unwrap();

    let v1 = db.create_file_version(&file, "a\nb\nc", "s1").unwrap();
    let file = db.find_file_by_location("a.md").unwrap().unwrap();
    assert_eq!(file.content, "a\nb\nc");
    assert_eq!(db.list_changes(&v1.id).unwrap().len(), 3);

    let v2 = db.create_file_version(&file, "a\nx\nc", "s1").unwrap();
    let file = db.find_file_by_location("a.md").unwrap().unwrap();
    assert_eq!(file.content, "a\nx\nc");

    let changes = db.list_changes(&v2.id).unwrap();
    assert_eq!(changes.len(), 2);
    assert!(changes
        .iter()
        .any(|c| c.change_type == ChangeType::Add && c.content == "x" && c.position == 1));
    assert!(changes
        .iter()
        .any(|c| c.change_type == ChangeType::Remove && c.content == "b" && c.position == 1));
    assert!(changes.iter().all(|c| c.version_id == v2.id));
}

#[test]
fn stored_changes_replay_between_versions() {
    let db = db();
    let file = db.create_file("a.md").unwrap();
    let contents = ["one\ntwo", "zero\none\ntwo", "zero\ntwo\nthree", ""];

    let mut previous = String::new();
    for content in contents {
        let file = db.find_file_by_location(&file.location).unwrap().unwrap();
        let version = db.create_file_version(&file, content, "s1").unwrap();
        let changes = db.list_changes(&version.id).unwrap();
        assert_eq!(apply_changes(&previous, &changes), content);
        previous = content.to_string();
    }
}

#[test]
fn create_version_diffs_against_committed_content() {
    let db = db();
    let stale = db.create_file("a.md").unwrap();
    db.create_file_version(&stale, "a", "s1").unwrap();

    // `stale` still carries empty content; the diff must not re-add "a".
    let version = db.create_file_version(&stale, "a\nb", "s1").unwrap();
    let changes = db.list_changes(&version.id).unwrap();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].content, "b");
}

#[test]
fn create_version_for_unknown_file_writes_nothing() {
    let db = db();
    let ghost = File::new("ghost.md");
    let err = db.create_file_version(&ghost, "boo", "s1").unwrap_err();
    assert!(matches!(err, Error::FileNotFound(_)));
    assert!(db.list_versions(&ghost.id).unwrap().is_empty());
}

#[test]
fn failed_version_transaction_leaves_no_trace() {
    let db = db();
    let file = db.create_file("a.md").unwrap();
    let v1 = db.create_file_version(&file, "a\nb", "s1").unwrap();
    // Fails the last statement, after the version and its changes are inserted.
    db.conn()
        .execute_batch(
            "CREATE TRIGGER block_content BEFORE UPDATE OF content ON files
             BEGIN SELECT RAISE(ABORT, 'content locked'); END;",
        )
        .unwrap();

    let err = db.create_file_version(&file, "a\nx\nc", "s1").unwrap_err();
    assert!(matches!(err, Error::Database(_)));

    let versions = db.list_versions(&file.id).unwrap();
    assert_eq!(versions, vec![v1]);
    assert_eq!(
        db.find_file_by_location("a.md").unwrap().unwrap().content,
        "a\nb"
    );
    let changes: i64 = db
        .conn()
        .query_row("SELECT COUNT(*) FROM file_changes", [], |row| row.get(0))
        .unwrap();
    assert_eq!(changes, 2);
}

#[test]
fn latest_version_and_history() {
    let db = db();
    let file = db.create_file("a.md").unwrap();
    assert!(matches!(
        db.latest_version(&file.id).unwrap_err(),
        Error::VersionNotFound(_)
    ));

    db.create_file_version(&file, "1", "s1").unwrap();
    db.create_file_version(&file, "2", "s1").unwrap();
    let v3 = db.create_file_version(&file, "3", "s1").unwrap();

    assert_eq!(db.latest_version(&file.id).unwrap(), v3);
    let history: Vec<String> = db
        .list_versions(&file.id)
        .unwrap()
        .into_iter()
        .map(|v| v.content)
        .collect();
    assert_eq!(history, vec!["1", "2", "3"]);
}

#[test]
fn version_timestamps_roundtrip_at_micros() {
    let db = db();
    let file = db.create_file("a.md").unwrap();
    let created = db.create_file_version(&file, "x", "s1").unwrap();
    let stored = db.latest_version(&file.id).unwrap();
    assert_eq!(stored.timestamp, created.timestamp);
}

#[parameterized(
    markdown = { "notes/a.md", true },
    text = { "a.txt", true },
    upper = { "README.MD", true },
    pdf = { "doc.pdf", false },
    no_extension = { "Makefile", false },
    hidden = { ".md", false },
)]
fn default_extensions(location: &str, expected: bool) {
    assert_eq!(db().valid_extension(location), expected);
}

#[test]
fn configured_extensions_replace_defaults() {
    let db = db().with_extensions(vec![".pdf".to_string()]);
    assert!(db.valid_extension("doc.pdf"));
    assert!(!db.valid_extension("a.md"));
}

#[test]
fn list_active_files_excludes_inactive() {
    let db = db();
    db.create_file("b.md").unwrap();
    let hidden = db.create_file("a.md").unwrap();
    db.conn()
        .execute("UPDATE files SET active = 0 WHERE id = ?1", params![hidden.id])
        .unwrap();

    let locations: Vec<String> = db
        .list_active_files()
        .unwrap()
        .into_iter()
        .map(|f| f.location)
        .collect();
    assert_eq!(locations, vec!["b.md"]);
}

#[test]
fn session_upsert_is_monotonic() {
    let db = db();
    let t = timestamp_now();
    assert!(db.get_session("s1").unwrap().is_none());

    db.upsert_session("s1", t, true).unwrap();
    let session = db.get_session("s1").unwrap().unwrap();
    assert_eq!(session.last_sync_time, t);
    assert!(session.is_active);

    db.upsert_session("s1", t - Duration::seconds(5), false).unwrap();
    let session = db.get_session("s1").unwrap().unwrap();
    assert_eq!(session.last_sync_time, t);
    assert!(!session.is_active);

    let later = t + Duration::seconds(5);
    db.upsert_session("s1", later, true).unwrap();
    assert_eq!(db.get_session("s1").unwrap().unwrap().last_sync_time, later);
}

/// Returns a cursor strictly between versions stored before and after it.
fn cursor_between() -> DateTime<Utc> {
    std::thread::sleep(std::time::Duration::from_millis(2));
    let cursor = timestamp_now();
    std::thread::sleep(std::time::Duration::from_millis(2));
    cursor
}

#[test]
fn versions_since_returns_latest_newer_versions() {
    let db = db();
    let t = timestamp_now();
    db.store_upload(&uploaded_version("v-old", "old.md", "old", t))
        .unwrap()
        .unwrap();
    let cursor = cursor_between();

    let after = uploaded_version("v-a1", "a.md", "a1", t + Duration::seconds(1));
    let after_newer = uploaded_version("v-a2", "a.md", "a2", t + Duration::seconds(2));
    let other = uploaded_version("v-b", "b.md", "b", t + Duration::seconds(1));
    for version in [&after, &after_newer, &other] {
        db.store_upload(version).unwrap().unwrap();
    }

    let since: Vec<(String, String)> = db
        .versions_since(cursor)
        .unwrap()
        .into_iter()
        .map(|v| (v.location, v.content))
        .collect();
    assert_eq!(
        since,
        vec![
            ("b.md".to_string(), "b".to_string()),
            ("a.md".to_string(), "a2".to_string()),
        ]
    );
}

#[test]
fn versions_since_reports_late_upload_of_old_version() {
    let db = db();
    let cursor = cursor_between();
    // Created offline well before the cursor, received after it.
    let offline = uploaded_version("v1", "offline.md", "x", cursor - Duration::seconds(30));
    db.store_upload(&offline).unwrap().unwrap();

    let since = db.versions_since(cursor).unwrap();
    assert_eq!(since.len(), 1);
    assert_eq!(since[0].location, "offline.md");
    assert_eq!(since[0].timestamp, offline.timestamp);
}

#[test]
fn versions_since_skips_versions_received_before_cursor() {
    let db = db();
    db.store_upload(&uploaded_version("v1", "a.md", "a", timestamp_now() + Duration::seconds(60)))
        .unwrap();
    let cursor = cursor_between();
    assert!(db.versions_since(cursor).unwrap().is_empty());
}

#[test]
fn migration_backfills_received_at() {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(
        "CREATE TABLE file_versions (
             id TEXT PRIMARY KEY, file_id TEXT NOT NULL, location TEXT NOT NULL,
             content TEXT NOT NULL, timestamp TEXT NOT NULL, client TEXT NOT NULL,
             uploaded INTEGER NOT NULL DEFAULT 0
         );
         INSERT INTO file_versions (id, file_id, location, content, timestamp, client)
         VALUES ('v1', 'f1', 'a.md', 'a', '2026-01-01T00:00:00.000000Z', 'peer');",
    )
    .unwrap();

    run_migrations(&conn).unwrap();
    run_migrations(&conn).unwrap();

    let received: String = conn
        .query_row("SELECT received_at FROM file_versions WHERE id = 'v1'", [], |row| {
            row.get(0)
        })
        .unwrap();
    assert_eq!(received, "2026-01-01T00:00:00.000000Z");
}

#[test]
fn versions_since_skips_inactive_files() {
    let db = db();
    let t = timestamp_now();
    let stored = db
        .store_upload(&uploaded_version("v1", "a.md", "a", t + Duration::seconds(1)))
        .unwrap()
        .unwrap();
    db.conn()
        .execute("UPDATE files SET active = 0 WHERE id = ?1", params![stored.file_id])
        .unwrap();
    assert!(db.versions_since(t).unwrap().is_empty());
}

#[test]
fn store_upload_creates_file_with_uploaded_id() {
    let db = db();
    let version = uploaded_version("v1", "a.md", "hello", timestamp_now());
    let stored = db.store_upload(&version).unwrap().unwrap();
    assert_eq!(stored, version);

    let file = db.find_file_by_location("a.md").unwrap().unwrap();
    assert_eq!(file.id, version.file_id);
    assert_eq!(file.content, "hello");
}

#[test]
fn store_upload_reuses_local_file_for_location() {
    let db = db();
    let local = db.create_file("a.md").unwrap();
    let version = uploaded_version("v1", "a.md", "hello", timestamp_now());

    let stored = db.store_upload(&version).unwrap().unwrap();
    assert_eq!(stored.file_id, local.id);
    assert_eq!(db.latest_version(&local.id).unwrap().content, "hello");
}

#[test]
fn store_upload_ignores_duplicates() {
    let db = db();
    let version = uploaded_version("v1", "a.md", "hello", timestamp_now());
    assert!(db.store_upload(&version).unwrap().is_some());
    assert!(db.store_upload(&version).unwrap().is_none());
    assert_eq!(db.list_versions(&version.file_id).unwrap().len(), 1);
}

#[test]
fn store_upload_keeps_newer_content() {
    let db = db();
    let t = timestamp_now();
    db.store_upload(&uploaded_version("v2", "a.md", "new", t)).unwrap();
    db.store_upload(&uploaded_version("v1", "a.md", "old", t - Duration::seconds(3)))
        .unwrap();

    let file = db.find_file_by_location("a.md").unwrap().unwrap();
    assert_eq!(file.content, "new");
    assert_eq!(db.list_versions(&file.id).unwrap().len(), 2);
}

#[test]
fn pending_uploads_until_marked() {
    let db = db();
    let a = db.create_file("a.md").unwrap();
    let b = db.create_file("b.md").unwrap();
    db.create_file_version(&a, "a1", "s1").unwrap();
    let a2 = db.create_file_version(&a, "a2", "s1").unwrap();
    let b1 = db.create_file_version(&b, "b1", "s1").unwrap();

    let pending: Vec<String> = db
        .pending_uploads()
        .unwrap()
        .into_iter()
        .map(|v| v.id)
        .collect();
    assert_eq!(pending, vec![a2.id.clone(), b1.id.clone()]);

    db.mark_uploaded(&a2.id).unwrap();
    let pending: Vec<String> = db
        .pending_uploads()
        .unwrap()
        .into_iter()
        .map(|v| v.id)
        .collect();
    assert_eq!(pending, vec![b1.id]);
}

#[test]
fn open_creates_parent_directory() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("drift.db");

    {
        let db = Database::open(&path).unwrap();
        db.create_file("a.md").unwrap();
    }

    assert!(path.exists());
    let reopened = Database::open(&path).unwrap();
    assert!(reopened.find_file_by_location("a.md").unwrap().is_some());
}
