//! Shader Manager
//!
//! Lookup order for a variant: in-memory map, then the on-disk cache, then
//! the compiler. A fresh compile is written back to both caches.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use loupe_core::{Dispatcher, Result};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use super::cache::ShaderCache;
use super::compiler::{CompileRequest, ShaderCompiler};
use super::defines::ShaderDefines;
use super::preprocess::IncludeResolver;
use super::{ShaderBlob, shader_key};

/// Where compiled shaders came from since the manager was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShaderStats {
    pub memory_hits: usize,
    pub disk_hits: usize,
    pub compiled: usize,
}

pub struct ShaderManager {
    compiler: Arc<dyn ShaderCompiler>,
    disk: Option<ShaderCache>,
    // Locked so precompilation can fan out across dispatch workers.
    memory: Mutex<FxHashMap<u64, Arc<ShaderBlob>>>,

    memory_hits: AtomicUsize,
    disk_hits: AtomicUsize,
    compiled: AtomicUsize,
}

impl ShaderManager {
    #[must_use]
    pub fn new(compiler: Arc<dyn ShaderCompiler>, disk: Option<ShaderCache>) -> Self {
        Self {
            compiler,
            disk,
            memory: Mutex::new(FxHashMap::default()),
            memory_hits: AtomicUsize::new(0),
            disk_hits: AtomicUsize::new(0),
            compiled: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn compiler(&self) -> &dyn ShaderCompiler {
        self.compiler.as_ref()
    }

    #[must_use]
    pub fn disk_cache(&self) -> Option<&ShaderCache> {
        self.disk.as_ref()
    }

    /// Returns the compiled blob for one variant, compiling on a miss.
    ///
    /// Compilation errors are returned as is; cache failures never are.
    pub fn compile(
        &self,
        source: &str,
        entry_point: &str,
        source_name: &str,
        includes: &dyn IncludeResolver,
        defines: &ShaderDefines,
    ) -> Result<Arc<ShaderBlob>> {
        let key = shader_key(source, entry_point, defines, self.compiler.profile());

        if let Some(blob) = self.memory.lock().get(&key) {
            self.memory_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Arc::clone(blob));
        }

        if let Some(disk) = &self.disk
            && let Some(bytes) = disk.load(key, |b| self.compiler.validate_blob(b))
        {
            self.disk_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(self.remember(ShaderBlob::new(key, entry_point, bytes)));
        }

        log::debug!("Compiling shader '{source_name}' ({entry_point}, key {key:016x})");
        let bytes = self
            .compiler
            .compile(&CompileRequest {
                source,
                source_name,
                entry_point,
                defines,
                includes,
            })
            .inspect_err(|e| log::error!("{e}"))?;
        self.compiled.fetch_add(1, Ordering::Relaxed);

        if let Some(disk) = &self.disk
            && let Err(e) = disk.store(key, &bytes)
        {
            log::warn!("Failed to persist shader {key:016x}: {e}");
        }

        Ok(self.remember(ShaderBlob::new(key, entry_point, bytes)))
    }

    /// Compiles every macro variant of one source across the dispatcher's
    /// workers. Results are in `variants` order.
    pub fn precompile(
        &self,
        dispatcher: &Dispatcher,
        source: &str,
        entry_point: &str,
        source_name: &str,
        includes: &dyn IncludeResolver,
        variants: &[ShaderDefines],
    ) -> Vec<Result<Arc<ShaderBlob>>> {
        dispatcher.run_parallel_collect(
            |i| self.compile(source, entry_point, source_name, includes, &variants[i]),
            variants.len(),
        )
    }

    #[must_use]
    pub fn stats(&self) -> ShaderStats {
        ShaderStats {
            memory_hits: self.memory_hits.load(Ordering::Relaxed),
            disk_hits: self.disk_hits.load(Ordering::Relaxed),
            compiled: self.compiled.load(Ordering::Relaxed),
        }
    }

    /// Number of variants held in memory.
    #[must_use]
    pub fn len(&self) -> usize {
        self.memory.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.memory.lock().is_empty()
    }

    /// Drops the in-memory map. The disk cache is untouched.
    pub fn clear_memory(&self) {
        self.memory.lock().clear();
    }

    fn remember(&self, blob: ShaderBlob) -> Arc<ShaderBlob> {
        let blob = Arc::new(blob);
        self.memory.lock().insert(blob.key(), Arc::clone(&blob));
        blob
    }
}
