//! Shader Pipeline
//!
//! Source text goes through [`preprocess`](preprocess::preprocess), then a
//! [`ShaderCompiler`], and the resulting [`ShaderBlob`] is cached twice: in
//! memory by the [`ShaderManager`] and on disk by the [`ShaderCache`].
//!
//! Both caches use [`shader_key`], a 64-bit content hash over the source, the
//! entry point, the macro set and the compiler profile. Collisions are not
//! detected. Included files are not part of the key, so editing an include
//! requires clearing the cache directory.

pub mod cache;
pub mod compiler;
pub mod defines;
pub mod manager;
pub mod preprocess;

pub use cache::ShaderCache;
pub use compiler::{CompileRequest, NagaCompiler, ShaderCompiler};
pub use defines::ShaderDefines;
pub use manager::{ShaderManager, ShaderStats};
pub use preprocess::{DirectoryIncludes, IncludeResolver, NoIncludes};

use loupe_core::ContentHasher;

/// A compiled shader variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderBlob {
    key: u64,
    entry_point: String,
    bytes: Vec<u8>,
}

impl ShaderBlob {
    #[must_use]
    pub fn new(key: u64, entry_point: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            key,
            entry_point: entry_point.into(),
            bytes,
        }
    }

    #[inline]
    #[must_use]
    pub fn key(&self) -> u64 {
        self.key
    }

    #[inline]
    #[must_use]
    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    #[inline]
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Cache key of one shader variant.
#[must_use]
pub fn shader_key(source: &str, entry_point: &str, defines: &ShaderDefines, profile: &str) -> u64 {
    let mut hasher = ContentHasher::new();
    hasher
        .write_str(source)
        .write_str(entry_point)
        .write_str(profile);
    defines.hash_into(&mut hasher);
    hasher.finish()
}
