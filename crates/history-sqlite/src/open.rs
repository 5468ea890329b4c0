use crate::schema::MIG_0001_INIT;
use anyhow::Result;
use rusqlite::Connection;
use std::fs;
use std::path::{Path, PathBuf};

pub struct HistoryDb {
    pub conn: Connection,
    pub(crate) content_dir: PathBuf,
}

impl HistoryDb {
    /// Open (or create) the history store rooted at `data_dir`. An
    /// unreadable or invalid metadata database is moved aside and replaced
    /// with a fresh empty one instead of failing the caller.
    pub fn open_or_create(data_dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        fs::create_dir_all(data_dir)?;
        let db_path = data_dir.join("history.db");
        let conn = match open_checked(&db_path) {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!(
                    path = %db_path.display(),
                    error = %e,
                    "metadata database unreadable, reinitializing empty"
                );
                let _ = fs::rename(&db_path, db_path.with_extension("db.corrupt"));
                // stale WAL sidecars would replay into the fresh database
                let _ = fs::remove_file(db_path.with_extension("db-wal"));
                let _ = fs::remove_file(db_path.with_extension("db-shm"));
                open_checked(&db_path)?
            }
        };
        let content_dir = data_dir.join("content");
        fs::create_dir_all(&content_dir)?;
        Ok(HistoryDb { conn, content_dir })
    }
}

fn open_checked(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    apply_pragmas(&conn)?;
    migrate(&conn)?;
    Ok(conn)
}

fn apply_pragmas(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    // every acknowledged commit must survive a crash
    conn.pragma_update(None, "synchronous", "FULL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(())
}

fn migrate(conn: &Connection) -> Result<()> {
    // naive: if targets table doesn't exist, apply 0001
    let exists: i64 = conn.query_row(
        "SELECT COUNT(1) FROM sqlite_master WHERE type='table' AND name='targets'",
        [],
        |r| r.get(0),
    )?;
    if exists == 0 {
        conn.execute_batch(MIG_0001_INIT)?;
    }
    Ok(())
}
