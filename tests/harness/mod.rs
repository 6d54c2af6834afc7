#![allow(dead_code)]

use sqlx::query_as;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use sql_fixture::{DatabaseInstance, DirectoryLoader, Session};

static NEXT_ID: AtomicUsize = AtomicUsize::new(0);

/// Database name not used by any other test in this binary.
pub fn unique_name(prefix: &str) -> String {
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{id}")
}

pub fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests").join("fixtures")
}

pub fn fixtures_loader() -> DirectoryLoader {
    DirectoryLoader::new(fixtures_dir())
}

pub async fn started(prefix: &str) -> anyhow::Result<DatabaseInstance> {
    let mut instance = DatabaseInstance::new(unique_name(prefix));
    instance.start().await?;
    Ok(instance)
}

/// Schema of every user table as `(name, sql)`, ordered by name.
pub async fn schema(conn: &mut Session) -> anyhow::Result<Vec<(String, String)>> {
    let rows: Vec<(String, String)> = query_as(
        "SELECT name, sql FROM sqlite_master \
         WHERE type = 'table' ORDER BY name",
    )
    .fetch_all(&mut **conn)
    .await?;

    Ok(rows)
}
