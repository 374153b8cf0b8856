//! Shared fixtures for tally-db integration tests.

#![allow(dead_code)]

use std::io::Write;
use std::path::PathBuf;

use tally_core::{Ident, QualifiedName};
use tally_db::LibsqlStore;
use tempfile::TempDir;

/// A file-backed store, so every operation really gets its own connection.
pub async fn file_store(dir: &TempDir) -> LibsqlStore {
    let path = dir.path().join("tally.db");
    LibsqlStore::open_local(path.to_str().unwrap(), 5000)
        .await
        .unwrap()
        .with_batch_size(2)
}

pub fn write_csv(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    path
}

pub fn table(name: &str) -> QualifiedName {
    QualifiedName::parse("main", name).unwrap()
}

pub fn ident(name: &str) -> Ident {
    Ident::new(name).unwrap()
}

pub async fn count_rows(store: &LibsqlStore, sql: &str) -> i64 {
    let conn = store.connect().await.unwrap();
    let mut rows = conn.query(sql, ()).await.unwrap();
    rows.next().await.unwrap().unwrap().get::<i64>(0).unwrap()
}

/// `(key, name)` pairs of `people`, ordered by key.
pub async fn people_rows(store: &LibsqlStore) -> Vec<(String, Option<String>)> {
    let conn = store.connect().await.unwrap();
    let mut rows = conn
        .query("SELECT CAST(id AS TEXT), name FROM people ORDER BY CAST(id AS INTEGER)", ())
        .await
        .unwrap();
    let mut out = Vec::new();
    while let Some(row) = rows.next().await.unwrap() {
        out.push((
            row.get::<String>(0).unwrap(),
            row.get::<Option<String>>(1).unwrap(),
        ));
    }
    out
}

/// Names of leftover staging relations.
pub async fn staging_tables(store: &LibsqlStore) -> Vec<String> {
    let conn = store.connect().await.unwrap();
    let mut rows = conn
        .query(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name LIKE '\\_stg\\_%' ESCAPE '\\'",
            (),
        )
        .await
        .unwrap();
    let mut out = Vec::new();
    while let Some(row) = rows.next().await.unwrap() {
        out.push(row.get::<String>(0).unwrap());
    }
    out
}
