use crate::{HistoryDb, VersionId};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

/// Digest of a version's exact text. Deduplication identity only, not a
/// security primitive.
pub fn hash_content(content: &str) -> String {
    let mut sha = Sha256::new();
    sha.update(content.as_bytes());
    hex::encode(sha.finalize())
}

pub(crate) fn content_path(dir: &Path, version_id: VersionId) -> PathBuf {
    dir.join(format!("{}.js", version_id))
}

pub(crate) fn remove_content(dir: &Path, version_id: VersionId) {
    let path = content_path(dir, version_id);
    if let Err(e) = fs::remove_file(&path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "failed to delete version content");
        }
    }
}

impl HistoryDb {
    /// Body of a stored version. A version row whose backing file is
    /// missing or unreadable yields `None`, never an error.
    pub fn version_content(&self, version_id: VersionId) -> Option<String> {
        let path = content_path(&self.content_dir, version_id);
        match fs::read_to_string(&path) {
            Ok(s) => Some(s),
            Err(e) => {
                tracing::warn!(
                    version_id,
                    path = %path.display(),
                    error = %e,
                    "version content missing or unreadable"
                );
                None
            }
        }
    }
}
