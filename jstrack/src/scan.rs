//! Scan orchestration: commit extracted scripts to the history store and
//! diff updated scripts against their previous version.

use anyhow::Result;
use history_sqlite::{HistoryDb, NewScript, ScanId, ScriptId, ScriptKey, TargetId, VersionId};
use jstrack_core::ScriptSource;
use script_diff::{DiffResult, DiffStats, SourceFormatter};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ScriptReport {
    pub script_id: ScriptId,
    pub version_id: VersionId,
    pub url: String,
    pub base_name: String,
    pub is_new_script: bool,
    pub is_new_version: bool,
    pub content_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<DiffResult>,
}

/// One existing script that received new content in this scan.
#[derive(Debug, Serialize)]
pub struct ChangedScript {
    pub script_id: ScriptId,
    pub base_name: String,
    pub url: String,
    pub old_version_id: VersionId,
    pub new_version_id: VersionId,
    pub stats: DiffStats,
}

#[derive(Debug, Serialize)]
pub struct ScanReport {
    pub target_id: TargetId,
    pub scan_id: ScanId,
    pub domain: String,
    pub script_count: usize,
    pub total_bytes: i64,
    pub scripts: Vec<ScriptReport>,
    pub changed: Vec<ChangedScript>,
}

/// Process one scan sequentially: normalize each script's identity, commit
/// it, and when an existing script gained a new version, diff it against
/// the immediately preceding one. First-ever versions are never diffed.
pub fn record_scan(
    db: &mut HistoryDb,
    domain: &str,
    source_url: &str,
    scripts: &[ScriptSource],
    formatter: Option<&dyn SourceFormatter>,
) -> Result<ScanReport> {
    let target = db.get_or_create_target(domain)?;
    let total_bytes: i64 = scripts.iter().map(|s| s.size).sum();
    let scan_id = db.create_scan(target.target_id, source_url, scripts.len() as i64, total_bytes)?;

    let mut reports = Vec::with_capacity(scripts.len());
    let mut changed = Vec::new();
    for script in scripts {
        let identity = script_identity::normalize(&script.url);
        let base_name = script_identity::base_name(&script.url);
        let outcome = db.store_script(
            target.target_id,
            scan_id,
            &NewScript { url: &script.url, content: &script.content, size: script.size },
            &ScriptKey {
                stable_key: &identity.stable_key,
                normalized_url: &identity.normalized,
                base_name: &base_name,
            },
        )?;

        let mut diff = None;
        if outcome.is_new_version && !outcome.is_new_script {
            if let Some(prev) = db.get_previous_version(outcome.script_id, outcome.version_id)? {
                if let Some(old_content) = db.version_content(prev.version_id) {
                    let result =
                        script_diff::diff_with_formatter(&old_content, &script.content, formatter);
                    changed.push(ChangedScript {
                        script_id: outcome.script_id,
                        base_name: base_name.clone(),
                        url: script.url.clone(),
                        old_version_id: prev.version_id,
                        new_version_id: outcome.version_id,
                        stats: result.stats.clone(),
                    });
                    diff = Some(result);
                }
            }
        }

        reports.push(ScriptReport {
            script_id: outcome.script_id,
            version_id: outcome.version_id,
            url: script.url.clone(),
            base_name,
            is_new_script: outcome.is_new_script,
            is_new_version: outcome.is_new_version,
            content_hash: outcome.content_hash,
            diff,
        });
    }

    Ok(ScanReport {
        target_id: target.target_id,
        scan_id,
        domain: domain.to_string(),
        script_count: scripts.len(),
        total_bytes,
        scripts: reports,
        changed,
    })
}
