pub const MIG_0001_INIT: &str = r#"
BEGIN;

CREATE TABLE targets (
  target_id       INTEGER PRIMARY KEY AUTOINCREMENT,
  domain          TEXT NOT NULL UNIQUE,
  created_ms      INTEGER NOT NULL,
  last_scan_ms    INTEGER
);

CREATE TABLE scans (
  scan_id         INTEGER PRIMARY KEY AUTOINCREMENT,
  target_id       INTEGER NOT NULL REFERENCES targets(target_id) ON DELETE CASCADE,
  url             TEXT NOT NULL,
  created_ms      INTEGER NOT NULL,
  script_count    INTEGER NOT NULL DEFAULT 0,
  total_bytes     INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE scripts (
  script_id       INTEGER PRIMARY KEY AUTOINCREMENT,
  target_id       INTEGER NOT NULL REFERENCES targets(target_id) ON DELETE CASCADE,
  url             TEXT NOT NULL,
  normalized_url  TEXT NOT NULL,
  stable_key      TEXT NOT NULL,
  base_name       TEXT NOT NULL,
  first_seen_ms   INTEGER NOT NULL,
  last_seen_ms    INTEGER NOT NULL,
  UNIQUE (target_id, stable_key)
);

CREATE TABLE versions (
  version_id      INTEGER PRIMARY KEY AUTOINCREMENT,
  script_id       INTEGER NOT NULL REFERENCES scripts(script_id) ON DELETE CASCADE,
  scan_id         INTEGER NOT NULL REFERENCES scans(scan_id) ON DELETE CASCADE,
  content_hash    TEXT NOT NULL,
  size            INTEGER NOT NULL,
  source_url      TEXT NOT NULL,
  created_ms      INTEGER NOT NULL,
  UNIQUE (script_id, content_hash)
);

CREATE INDEX idx_scans_target ON scans(target_id);
CREATE INDEX idx_scripts_target ON scripts(target_id);
CREATE INDEX idx_versions_script ON versions(script_id);

COMMIT;
"#;
