use serde::{Deserialize, Serialize};

pub type TargetId = i64;
pub type ScanId = i64;
pub type ScriptId = i64;
pub type VersionId = i64;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    pub target_id: TargetId,
    pub domain: String,
    pub created_ms: i64,
    pub last_scan_ms: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetSummary {
    pub target_id: TargetId,
    pub domain: String,
    pub created_ms: i64,
    pub last_scan_ms: Option<i64>,
    pub script_count: i64,
    pub scan_count: i64,
}

/// One observation pass over a target. Immutable once created; scan_id
/// order doubles as recency order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scan {
    pub scan_id: ScanId,
    pub target_id: TargetId,
    pub url: String,
    pub created_ms: i64,
    pub script_count: i64,
    pub total_bytes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Script {
    pub script_id: ScriptId,
    pub target_id: TargetId,
    /// Most recently seen raw URL for this identity.
    pub url: String,
    pub normalized_url: String,
    pub stable_key: String,
    pub base_name: String,
    pub first_seen_ms: i64,
    pub last_seen_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptSummary {
    pub script_id: ScriptId,
    pub target_id: TargetId,
    pub url: String,
    pub normalized_url: String,
    pub stable_key: String,
    pub base_name: String,
    pub first_seen_ms: i64,
    pub last_seen_ms: i64,
    pub version_count: i64,
}

/// One deduplicated content snapshot. scan_id points at the scan that
/// first produced this content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Version {
    pub version_id: VersionId,
    pub script_id: ScriptId,
    pub scan_id: ScanId,
    pub content_hash: String,
    pub size: i64,
    pub source_url: String,
    pub created_ms: i64,
}

/// Raw script body being committed by a scan.
#[derive(Debug, Clone, Copy)]
pub struct NewScript<'a> {
    pub url: &'a str,
    pub content: &'a str,
    pub size: i64,
}

/// Normalized identity fields for the script being committed.
#[derive(Debug, Clone, Copy)]
pub struct ScriptKey<'a> {
    pub stable_key: &'a str,
    pub normalized_url: &'a str,
    pub base_name: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreOutcome {
    pub script_id: ScriptId,
    pub version_id: VersionId,
    pub is_new_script: bool,
    pub is_new_version: bool,
    pub content_hash: String,
}
