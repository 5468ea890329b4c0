use crate::{
    HistoryDb, Scan, Script, ScriptId, ScriptSummary, Target, TargetId, TargetSummary, Version,
    VersionId,
};
use anyhow::Result;
use rusqlite::{params, OptionalExtension, Row};

fn row_to_version(r: &Row<'_>) -> rusqlite::Result<Version> {
    Ok(Version {
        version_id: r.get(0)?,
        script_id: r.get(1)?,
        scan_id: r.get(2)?,
        content_hash: r.get(3)?,
        size: r.get(4)?,
        source_url: r.get(5)?,
        created_ms: r.get(6)?,
    })
}

const VERSION_COLS: &str = "version_id, script_id, scan_id, content_hash, size, source_url, created_ms";

impl HistoryDb {
    pub fn get_target(&self, domain: &str) -> Result<Option<Target>> {
        let target = self
            .conn
            .query_row(
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
            )
            .optional()?;
        Ok(target)
    }

    pub fn get_all_targets(&self) -> Result<Vec<TargetSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT t.target_id, t.domain, t.created_ms, t.last_scan_ms,
                    (SELECT COUNT(1) FROM scripts s WHERE s.target_id = t.target_id),
                    (SELECT COUNT(1) FROM scans c WHERE c.target_id = t.target_id)
             FROM targets t ORDER BY t.target_id",
        )?;
        let rows = stmt.query_map([], |r| {
            Ok(TargetSummary {
                target_id: r.get(0)?,
                domain: r.get(1)?,
                created_ms: r.get(2)?,
                last_scan_ms: r.get(3)?,
                script_count: r.get(4)?,
                scan_count: r.get(5)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    pub fn get_target_scripts(&self, target_id: TargetId) -> Result<Vec<ScriptSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT s.script_id, s.target_id, s.url, s.normalized_url, s.stable_key, s.base_name,
                    s.first_seen_ms, s.last_seen_ms,
                    (SELECT COUNT(1) FROM versions v WHERE v.script_id = s.script_id)
             FROM scripts s WHERE s.target_id=? ORDER BY s.script_id",
        )?;
        let rows = stmt.query_map([target_id], |r| {
            Ok(ScriptSummary {
                script_id: r.get(0)?,
                target_id: r.get(1)?,
                url: r.get(2)?,
                normalized_url: r.get(3)?,
                stable_key: r.get(4)?,
                base_name: r.get(5)?,
                first_seen_ms: r.get(6)?,
                last_seen_ms: r.get(7)?,
                version_count: r.get(8)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// Most recent scans first. `limit = 0` returns all of them.
    pub fn get_target_scans(&self, target_id: TargetId, limit: usize) -> Result<Vec<Scan>> {
        let limit = if limit == 0 { -1 } else { limit as i64 };
        let mut stmt = self.conn.prepare(
            "SELECT scan_id, target_id, url, created_ms, script_count, total_bytes
             FROM scans WHERE target_id=? ORDER BY scan_id DESC LIMIT ?",
        )?;
        let rows = stmt.query_map(params![target_id, limit], |r| {
            Ok(Scan {
                scan_id: r.get(0)?,
                target_id: r.get(1)?,
                url: r.get(2)?,
                created_ms: r.get(3)?,
                script_count: r.get(4)?,
                total_bytes: r.get(5)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    pub fn get_script(&self, script_id: ScriptId) -> Result<Option<Script>> {
        let script = self
            .conn
            .query_row(
                "SELECT script_id, target_id, url, normalized_url, stable_key, base_name,
                        first_seen_ms, last_seen_ms
                 FROM scripts WHERE script_id=?",
                [script_id],
                |r| {
                    Ok(Script {
                        script_id: r.get(0)?,
                        target_id: r.get(1)?,
                        url: r.get(2)?,
                        normalized_url: r.get(3)?,
                        stable_key: r.get(4)?,
                        base_name: r.get(5)?,
                        first_seen_ms: r.get(6)?,
                        last_seen_ms: r.get(7)?,
                    })
                },
            )
            .optional()?;
        Ok(script)
    }

    pub fn get_version(&self, version_id: VersionId) -> Result<Option<Version>> {
        let version = self
            .conn
            .query_row(
                &format!("SELECT {} FROM versions WHERE version_id=?", VERSION_COLS),
                [version_id],
                row_to_version,
            )
            .optional()?;
        Ok(version)
    }

    /// All versions of a script, newest first. Id order is the recency
    /// contract, not the timestamp column.
    pub fn get_script_versions(&self, script_id: ScriptId) -> Result<Vec<Version>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM versions WHERE script_id=? ORDER BY version_id DESC",
            VERSION_COLS
        ))?;
        let rows = stmt.query_map([script_id], row_to_version)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// The version with the next-smaller id than `version_id` for this
    /// script, or None when it is the oldest.
    pub fn get_previous_version(
        &self,
        script_id: ScriptId,
        version_id: VersionId,
    ) -> Result<Option<Version>> {
        let version = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM versions WHERE script_id=? AND version_id<? ORDER BY version_id DESC LIMIT 1",
                    VERSION_COLS
                ),
                params![script_id, version_id],
                row_to_version,
            )
            .optional()?;
        Ok(version)
    }

}

#[cfg(test)]
mod tests {
    use crate::{HistoryDb, NewScript, ScriptKey};
    use tempfile::tempdir;

    fn key(stable: &str) -> ScriptKey<'_> {
        ScriptKey { stable_key: stable, normalized_url: stable, base_name: "main" }
    }

    fn src<'a>(url: &'a str, content: &'a str) -> NewScript<'a> {
        NewScript { url, content, size: content.len() as i64 }
    }

    #[test]
    fn target_upsert_is_idempotent() {
        let dir = tempdir().unwrap();
        let mut db = HistoryDb::open_or_create(dir.path()).unwrap();
        let a = db.get_or_create_target("a.com").unwrap();
        let b = db.get_or_create_target("a.com").unwrap();
        assert_eq!(a.target_id, b.target_id);
        assert_eq!(a.created_ms, b.created_ms);
        assert!(a.last_scan_ms.is_none());
    }

    #[test]
    fn scan_bumps_target_last_scan() {
        let dir = tempdir().unwrap();
        let mut db = HistoryDb::open_or_create(dir.path()).unwrap();
        let t = db.get_or_create_target("a.com").unwrap();
        db.create_scan(t.target_id, "https://a.com/", 2, 100).unwrap();
        let t = db.get_target("a.com").unwrap().unwrap();
        assert!(t.last_scan_ms.is_some());
    }

    #[test]
    fn duplicate_content_reuses_version() {
        let dir = tempdir().unwrap();
        let mut db = HistoryDb::open_or_create(dir.path()).unwrap();
        let t = db.get_or_create_target("a.com").unwrap();
        let scan1 = db.create_scan(t.target_id, "https://a.com/", 1, 1).unwrap();
        let scan2 = db.create_scan(t.target_id, "https://a.com/", 1, 1).unwrap();

        let first = db
            .store_script(t.target_id, scan1, &src("https://a.com/m.abc12345.js", "X"), &key("https://a.com/m.js"))
            .unwrap();
        assert!(first.is_new_script);
        assert!(first.is_new_version);

        let second = db
            .store_script(t.target_id, scan2, &src("https://a.com/m.def67890.js", "X"), &key("https://a.com/m.js"))
            .unwrap();
        assert!(!second.is_new_script);
        assert!(!second.is_new_version);
        assert_eq!(second.version_id, first.version_id);
        assert_eq!(second.content_hash, first.content_hash);

        // the dedup hit keeps the introducing scan's linkage
        let v = db.get_version(first.version_id).unwrap().unwrap();
        assert_eq!(v.scan_id, scan1);

        // but the script's lastSeen and canonical URL do move
        let s = db.get_script(first.script_id).unwrap().unwrap();
        assert_eq!(s.url, "https://a.com/m.def67890.js");
        assert!(s.last_seen_ms >= s.first_seen_ms);
    }

    #[test]
    fn distinct_content_gets_distinct_versions() {
        let dir = tempdir().unwrap();
        let mut db = HistoryDb::open_or_create(dir.path()).unwrap();
        let t = db.get_or_create_target("a.com").unwrap();
        let scan = db.create_scan(t.target_id, "https://a.com/", 1, 1).unwrap();
        let v1 = db
            .store_script(t.target_id, scan, &src("https://a.com/m.js", "X"), &key("https://a.com/m.js"))
            .unwrap();
        let v2 = db
            .store_script(t.target_id, scan, &src("https://a.com/m.js", "Y"), &key("https://a.com/m.js"))
            .unwrap();
        assert_ne!(v1.version_id, v2.version_id);
        assert_ne!(v1.content_hash, v2.content_hash);
        assert_eq!(db.version_content(v1.version_id).unwrap(), "X");
        assert_eq!(db.version_content(v2.version_id).unwrap(), "Y");
    }

    #[test]
    fn dedup_is_scoped_per_script() {
        let dir = tempdir().unwrap();
        let mut db = HistoryDb::open_or_create(dir.path()).unwrap();
        let t = db.get_or_create_target("a.com").unwrap();
        let scan = db.create_scan(t.target_id, "https://a.com/", 2, 2).unwrap();
        let a = db
            .store_script(t.target_id, scan, &src("https://a.com/a.js", "X"), &key("https://a.com/a.js"))
            .unwrap();
        let b = db
            .store_script(t.target_id, scan, &src("https://a.com/b.js", "X"), &key("https://a.com/b.js"))
            .unwrap();
        // identical bytes, different scripts: both get their own version
        assert_ne!(a.script_id, b.script_id);
        assert_ne!(a.version_id, b.version_id);
        assert!(b.is_new_version);
    }

    #[test]
    fn same_stable_key_on_two_targets_stays_separate() {
        let dir = tempdir().unwrap();
        let mut db = HistoryDb::open_or_create(dir.path()).unwrap();
        let t1 = db.get_or_create_target("a.com").unwrap();
        let t2 = db.get_or_create_target("b.com").unwrap();
        let s1 = db.create_scan(t1.target_id, "https://a.com/", 1, 1).unwrap();
        let s2 = db.create_scan(t2.target_id, "https://b.com/", 1, 1).unwrap();
        let a = db.store_script(t1.target_id, s1, &src("u", "X"), &key("/m.js")).unwrap();
        let b = db.store_script(t2.target_id, s2, &src("u", "X"), &key("/m.js")).unwrap();
        assert!(a.is_new_script);
        assert!(b.is_new_script);
        assert_ne!(a.script_id, b.script_id);
    }

    #[test]
    fn previous_version_walks_by_id() {
        let dir = tempdir().unwrap();
        let mut db = HistoryDb::open_or_create(dir.path()).unwrap();
        let t = db.get_or_create_target("a.com").unwrap();
        let scan = db.create_scan(t.target_id, "https://a.com/", 1, 1).unwrap();
        let k = key("https://a.com/m.js");
        let v1 = db.store_script(t.target_id, scan, &src("u", "one"), &k).unwrap();
        let v2 = db.store_script(t.target_id, scan, &src("u", "two"), &k).unwrap();
        let v3 = db.store_script(t.target_id, scan, &src("u", "three"), &k).unwrap();

        assert!(db.get_previous_version(v1.script_id, v1.version_id).unwrap().is_none());
        let prev = db.get_previous_version(v3.script_id, v3.version_id).unwrap().unwrap();
        assert_eq!(prev.version_id, v2.version_id);

        let versions = db.get_script_versions(v1.script_id).unwrap();
        let ids: Vec<i64> = versions.iter().map(|v| v.version_id).collect();
        assert_eq!(ids, vec![v3.version_id, v2.version_id, v1.version_id]);
    }

    #[test]
    fn projections_carry_counts() {
        let dir = tempdir().unwrap();
        let mut db = HistoryDb::open_or_create(dir.path()).unwrap();
        let t = db.get_or_create_target("a.com").unwrap();
        let scan = db.create_scan(t.target_id, "https://a.com/", 1, 1).unwrap();
        let k = key("https://a.com/m.js");
        db.store_script(t.target_id, scan, &src("u", "one"), &k).unwrap();
        db.store_script(t.target_id, scan, &src("u", "two"), &k).unwrap();

        let targets = db.get_all_targets().unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].script_count, 1);
        assert_eq!(targets[0].scan_count, 1);

        let scripts = db.get_target_scripts(t.target_id).unwrap();
        assert_eq!(scripts.len(), 1);
        assert_eq!(scripts[0].version_count, 2);

        let scans = db.get_target_scans(t.target_id, 10).unwrap();
        assert_eq!(scans.len(), 1);
        assert_eq!(scans[0].script_count, 1);
    }

    #[test]
    fn scan_limit_caps_newest_first() {
        let dir = tempdir().unwrap();
        let mut db = HistoryDb::open_or_create(dir.path()).unwrap();
        let t = db.get_or_create_target("a.com").unwrap();
        let s1 = db.create_scan(t.target_id, "https://a.com/", 0, 0).unwrap();
        let s2 = db.create_scan(t.target_id, "https://a.com/", 0, 0).unwrap();
        let s3 = db.create_scan(t.target_id, "https://a.com/", 0, 0).unwrap();
        let scans = db.get_target_scans(t.target_id, 2).unwrap();
        assert_eq!(scans.iter().map(|s| s.scan_id).collect::<Vec<_>>(), vec![s3, s2]);
        let all = db.get_target_scans(t.target_id, 0).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[2].scan_id, s1);
    }

    #[test]
    fn remove_target_cascades_and_reports() {
        let dir = tempdir().unwrap();
        let mut db = HistoryDb::open_or_create(dir.path()).unwrap();
        assert!(!db.remove_target("nope.com").unwrap());

        let t = db.get_or_create_target("a.com").unwrap();
        let other = db.get_or_create_target("b.com").unwrap();
        let scan = db.create_scan(t.target_id, "https://a.com/", 1, 1).unwrap();
        let other_scan = db.create_scan(other.target_id, "https://b.com/", 1, 1).unwrap();
        let stored =
            db.store_script(t.target_id, scan, &src("u", "X"), &key("https://a.com/m.js")).unwrap();
        let kept = db
            .store_script(other.target_id, other_scan, &src("u", "Y"), &key("https://b.com/m.js"))
            .unwrap();

        assert!(db.remove_target("a.com").unwrap());
        assert!(db.get_target("a.com").unwrap().is_none());
        assert!(db.get_script(stored.script_id).unwrap().is_none());
        assert!(db.get_version(stored.version_id).unwrap().is_none());
        assert!(db.version_content(stored.version_id).is_none());

        // the other target is untouched
        assert!(db.get_target("b.com").unwrap().is_some());
        assert_eq!(db.version_content(kept.version_id).unwrap(), "Y");
    }

    #[test]
    fn corrupt_metadata_reinitializes_empty() {
        let dir = tempdir().unwrap();
        {
            let mut db = HistoryDb::open_or_create(dir.path()).unwrap();
            db.get_or_create_target("a.com").unwrap();
        }
        std::fs::write(dir.path().join("history.db"), b"this is not a database").unwrap();
        std::fs::remove_file(dir.path().join("history.db-wal")).ok();
        std::fs::remove_file(dir.path().join("history.db-shm")).ok();

        let db = HistoryDb::open_or_create(dir.path()).unwrap();
        assert!(db.get_all_targets().unwrap().is_empty());
        assert!(dir.path().join("history.db.corrupt").exists());
    }

    #[test]
    fn missing_content_file_reads_as_none() {
        let dir = tempdir().unwrap();
        let mut db = HistoryDb::open_or_create(dir.path()).unwrap();
        let t = db.get_or_create_target("a.com").unwrap();
        let scan = db.create_scan(t.target_id, "https://a.com/", 1, 1).unwrap();
        let stored =
            db.store_script(t.target_id, scan, &src("u", "X"), &key("https://a.com/m.js")).unwrap();
        std::fs::remove_file(dir.path().join("content").join(format!("{}.js", stored.version_id)))
            .unwrap();
        // metadata survives, body reads as absent
        assert!(db.get_version(stored.version_id).unwrap().is_some());
        assert!(db.version_content(stored.version_id).is_none());
    }
}
