//! Persistent shader cache.
//!
//! One file per compiled variant, named by the 64-bit cache key in hex with
//! the `.spvz` extension. Files hold the compressed blob in the self-describing
//! container from [`loupe_core::compress`]. Writes go to a temporary file in
//! the same directory which is then renamed over the target, so readers never
//! observe a partial entry.
//!
//! The cache is an optimization: unreadable or corrupt entries are deleted and
//! reported as misses, and failed writes are logged and otherwise ignored.

use std::io::Write;
use std::path::{Path, PathBuf};

use loupe_core::{Result, compress};
use tempfile::NamedTempFile;

const EXTENSION: &str = "spvz";

#[derive(Debug, Clone)]
pub struct ShaderCache {
    dir: PathBuf,
    level: i32,
}

impl ShaderCache {
    /// Opens (creating if needed) a cache rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>, level: i32) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        log::info!("Shader cache at {}", dir.display());
        Ok(Self { dir, level })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn entry_path(&self, key: u64) -> PathBuf {
        self.dir.join(format!("{key:016x}.{EXTENSION}"))
    }

    /// Loads the blob stored under `key`.
    ///
    /// `validate` is applied to the decompressed bytes; entries that fail it
    /// are treated like undecodable ones.
    pub fn load(&self, key: u64, validate: impl FnOnce(&[u8]) -> bool) -> Option<Vec<u8>> {
        let path = self.entry_path(key);
        let compressed = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                log::warn!("Failed to read shader cache entry {}: {e}", path.display());
                return None;
            }
        };

        match compress::decompress(&compressed) {
            Ok(blob) if validate(&blob) => {
                log::debug!("Shader cache hit {key:016x}");
                Some(blob)
            }
            Ok(_) => {
                self.evict(&path, "blob failed validation");
                None
            }
            Err(e) => {
                self.evict(&path, &e.to_string());
                None
            }
        }
    }

    /// Persists `blob` under `key`, replacing any existing entry atomically.
    pub fn store(&self, key: u64, blob: &[u8]) -> Result<()> {
        let compressed = compress::compress(blob, self.level)?;
        let mut file = NamedTempFile::new_in(&self.dir)?;
        file.write_all(&compressed)?;
        file.as_file().sync_all()?;
        file.persist(self.entry_path(key)).map_err(|e| e.error)?;
        log::debug!(
            "Stored shader {key:016x} ({} -> {} bytes)",
            blob.len(),
            compressed.len()
        );
        Ok(())
    }

    fn evict(&self, path: &Path, reason: &str) {
        log::warn!("Discarding corrupt shader cache entry {}: {reason}", path.display());
        if let Err(e) = std::fs::remove_file(path) {
            log::warn!("Failed to remove {}: {e}", path.display());
        }
    }
}
