//! Transient storage for rendered clips.
//!
//! Clips live as `<prefix><key>.<ext>` in one directory (the system temp dir
//! unless configured otherwise). The key is a SHA-256 digest of the sentence,
//! so identical sentences map to the same file for the whole run.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

/// Hex characters of the digest kept in file names.
const KEY_LEN: usize = 16;

#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
    prefix: String,
    extension: String,
}

/// Result of a purge. Failures are counted, never raised.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PurgeReport {
    pub removed: usize,
    pub failed: usize,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>, prefix: &str, extension: &str) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.to_string(),
            extension: extension.trim_start_matches('.').to_string(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Deterministic key for a sentence.
    pub fn cache_key(text: &str) -> String {
        let digest = Sha256::digest(text.as_bytes());
        let mut key = hex::encode(digest);
        key.truncate(KEY_LEN);
        key
    }

    pub fn path_for(&self, text: &str) -> PathBuf {
        self.dir.join(format!(
            "{}{}.{}",
            self.prefix,
            Self::cache_key(text),
            self.extension
        ))
    }

    fn matches(&self, name: &str) -> bool {
        name.starts_with(&self.prefix)
            && name
                .strip_suffix(&self.extension)
                .is_some_and(|stem| stem.ends_with('.'))
    }

    fn is_staging(&self, name: &str) -> bool {
        name.strip_prefix('.')
            .is_some_and(|rest| rest.starts_with(&self.prefix))
            && name.ends_with(".part")
    }

    /// Write `bytes` to `path` via a uniquely named sibling, then rename.
    ///
    /// Readers never see a half-written clip. The write and the rename run
    /// on the blocking pool as one job that finishes even if the caller is
    /// dropped, so a staging file never outlives the call.
    pub async fn write_atomic(&self, path: &Path, bytes: Vec<u8>) -> io::Result<()> {
        let dir = self.dir.clone();
        let path = path.to_path_buf();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let staging = self.dir.join(format!(
            ".{file_name}.{}.{}.part",
            std::process::id(),
            staging_counter()
        ));

        tokio::task::spawn_blocking(move || {
            fs::create_dir_all(&dir)?;
            let result = fs::write(&staging, &bytes).and_then(|()| fs::rename(&staging, &path));
            if result.is_err() {
                let _ = fs::remove_file(&staging);
            }
            result
        })
        .await
        .map_err(io::Error::other)?
    }

    fn list(&self, keep: impl Fn(&str) -> bool) -> io::Result<Vec<PathBuf>> {
        let mut found: Vec<PathBuf> = fs::read_dir(&self.dir)?
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter(|e| keep(&e.file_name().to_string_lossy()))
            .map(|e| e.path())
            .collect();
        found.sort();
        Ok(found)
    }

    /// Every clip in the directory matching this store's naming pattern.
    pub fn artifacts(&self) -> io::Result<Vec<PathBuf>> {
        self.list(|name| self.matches(name))
    }

    /// Best-effort removal of every clip, plus staging files left by an
    /// interrupted write. Never fails.
    pub fn purge(&self) -> PurgeReport {
        let mut report = PurgeReport::default();

        let paths = match self.list(|name| self.matches(name) || self.is_staging(name)) {
            Ok(paths) => paths,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return report,
            Err(e) => {
                warn!("Failed to list clips in {}: {e}", self.dir.display());
                return report;
            }
        };

        for path in paths {
            match fs::remove_file(&path) {
                Ok(()) => report.removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!("Failed to remove {}: {e}", path.display());
                    report.failed += 1;
                }
            }
        }

        debug!(
            "Purged {} clip(s) from {} ({} failed)",
            report.removed,
            self.dir.display(),
            report.failed
        );
        report
    }
}

fn staging_counter() -> u64 {
    use std::sync::atomic::{AtomicU64, Ordering};
    static NEXT: AtomicU64 = AtomicU64::new(0);
    NEXT.fetch_add(1, Ordering::Relaxed)
}
