use crate::content::{content_path, hash_content, remove_content};
use crate::{
    HistoryDb, NewScript, ScanId, ScriptId, ScriptKey, StoreOutcome, Target, TargetId, VersionId,
};
use anyhow::Result;
use rusqlite::{params, OptionalExtension};
use std::fs;
use time::OffsetDateTime;

fn now_ms() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

impl HistoryDb {
    /// Idempotent upsert keyed by domain.
    pub fn get_or_create_target(&mut self, domain: &str) -> Result<Target> {
        self.conn.execute(
            "INSERT INTO targets(domain, created_ms) VALUES (?,?) ON CONFLICT(domain) DO NOTHING",
            params![domain, now_ms()],
        )?;
        let target = self.conn.query_row(
            "SELECT target_id, domain, created_ms, last_scan_ms FROM targets WHERE domain=?",
            [domain],
            |r| {
                Ok(Target {
                    target_id: r.get(0)?,
                    domain: r.get(1)?,
                    created_ms: r.get(2)?,
                    last_scan_ms: r.get(3)?,
                })
            },
        )?;
        Ok(target)
    }

    /// Record one observation pass. Also bumps the target's last-scan
    /// timestamp, in the same transaction.
    pub fn create_scan(
        &mut self,
        target_id: TargetId,
        url: &str,
        script_count: i64,
        total_bytes: i64,
    ) -> Result<ScanId> {
        let now = now_ms();
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO scans(target_id, url, created_ms, script_count, total_bytes) VALUES (?,?,?,?,?)",
            params![target_id, url, now, script_count, total_bytes],
        )?;
        let scan_id = tx.last_insert_rowid();
        tx.execute(
            "UPDATE targets SET last_scan_ms=? WHERE target_id=?",
            params![now, target_id],
        )?;
        tx.commit()?;
        Ok(scan_id)
    }

    /// The central write path: resolve the script by (target, stable key),
    /// dedup the body by content hash within that script, persist a new
    /// version only for unseen content.
    pub fn store_script(
        &mut self,
        target_id: TargetId,
        scan_id: ScanId,
        source: &NewScript<'_>,
        key: &ScriptKey<'_>,
    ) -> Result<StoreOutcome> {
        let content_hash = hash_content(source.content);
        let now = now_ms();
        let tx = self.conn.transaction()?;

        let existing: Option<ScriptId> = tx
            .query_row(
                "SELECT script_id FROM scripts WHERE target_id=? AND stable_key=?",
                params![target_id, key.stable_key],
                |r| r.get(0),
            )
            .optional()?;
        let (script_id, is_new_script) = match existing {
            Some(id) => {
                // lastSeen and the canonical URL move on every observation,
                // even when the content turns out to be unchanged
                tx.execute(
                    "UPDATE scripts SET url=?, normalized_url=?, base_name=?, last_seen_ms=? WHERE script_id=?",
                    params![source.url, key.normalized_url, key.base_name, now, id],
                )?;
                (id, false)
            }
            None => {
                tx.execute(
                    "INSERT INTO scripts(target_id, url, normalized_url, stable_key, base_name, first_seen_ms, last_seen_ms)
                     VALUES (?,?,?,?,?,?,?)",
                    params![target_id, source.url, key.normalized_url, key.stable_key, key.base_name, now, now],
                )?;
                (tx.last_insert_rowid(), true)
            }
        };

        let existing_version: Option<VersionId> = tx
            .query_row(
                "SELECT version_id FROM versions WHERE script_id=? AND content_hash=?",
                params![script_id, &content_hash],
                |r| r.get(0),
            )
            .optional()?;
        let (version_id, is_new_version) = match existing_version {
            // Re-observed content resolves to the version that first
            // carried it; its scan linkage stays on the introducing scan.
            Some(id) => (id, false),
            None => {
                tx.execute(
                    "INSERT INTO versions(script_id, scan_id, content_hash, size, source_url, created_ms)
                     VALUES (?,?,?,?,?,?)",
                    params![script_id, scan_id, &content_hash, source.size, source.url, now],
                )?;
                let id = tx.last_insert_rowid();
                // blob write happens inside the transaction window so a
                // failed write rolls the metadata back
                fs::write(content_path(&self.content_dir, id), source.content)?;
                (id, true)
            }
        };
        tx.commit()?;

        Ok(StoreOutcome { script_id, version_id, is_new_script, is_new_version, content_hash })
    }

    /// Cascading removal of a target and everything it owns, version
    /// bodies included. Returns false for an unknown domain.
    pub fn remove_target(&mut self, domain: &str) -> Result<bool> {
        let tx = self.conn.transaction()?;
        let target_id: Option<TargetId> = tx
            .query_row("SELECT target_id FROM targets WHERE domain=?", [domain], |r| r.get(0))
            .optional()?;
        let Some(target_id) = target_id else {
            return Ok(false);
        };
        let version_ids: Vec<VersionId> = tx
            .prepare(
                "SELECT v.version_id FROM versions v
                 JOIN scripts s ON s.script_id = v.script_id
                 WHERE s.target_id = ?",
            )?
            .query_map([target_id], |r| r.get(0))?
            .collect::<rusqlite::Result<_>>()?;
        tx.execute("DELETE FROM targets WHERE target_id=?", [target_id])?;
        tx.commit()?;
        // metadata first; an orphaned blob is harmless, dangling metadata
        // would not be
        for version_id in version_ids {
            remove_content(&self.content_dir, version_id);
        }
        Ok(true)
    }
}
