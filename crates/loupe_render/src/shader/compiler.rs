//! Shader compilers.
//!
//! [`ShaderCompiler`] turns one preprocessed request into a binary blob.
//! [`NagaCompiler`] is the built-in implementation: WGSL in, SPIR-V out.

use loupe_core::{LoupeError, Result};

use super::defines::ShaderDefines;
use super::preprocess::{IncludeResolver, preprocess};

/// SPIR-V module magic number, first word of every valid blob.
pub const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Everything a compiler needs for one shader variant.
pub struct CompileRequest<'a> {
    pub source: &'a str,
    pub source_name: &'a str,
    pub entry_point: &'a str,
    pub defines: &'a ShaderDefines,
    pub includes: &'a dyn IncludeResolver,
}

pub trait ShaderCompiler: Send + Sync {
    /// Target identifier, part of every cache key (for example `spirv-1.0`).
    fn profile(&self) -> &str;

    fn compile(&self, request: &CompileRequest<'_>) -> Result<Vec<u8>>;

    /// Cheap structural check applied to blobs loaded from disk.
    fn validate_blob(&self, bytes: &[u8]) -> bool;
}

/// Compiles WGSL through naga: parse, validate, then emit SPIR-V for the
/// requested entry point.
#[derive(Debug, Default, Clone, Copy)]
pub struct NagaCompiler;

impl NagaCompiler {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl ShaderCompiler for NagaCompiler {
    fn profile(&self) -> &str {
        "naga-spirv"
    }

    fn compile(&self, request: &CompileRequest<'_>) -> Result<Vec<u8>> {
        let fail = |diagnostics: String| LoupeError::ShaderCompilation {
            source_name: request.source_name.to_string(),
            diagnostics,
        };

        let expanded = preprocess(
            request.source,
            request.source_name,
            request.defines,
            request.includes,
        )
        .map_err(fail)?;

        let module = naga::front::wgsl::parse_str(&expanded)
            .map_err(|e| fail(e.emit_to_string(&expanded)))?;

        let info = naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        )
        .validate(&module)
        .map_err(|e| fail(e.emit_to_string(&expanded)))?;

        let Some(entry) = module
            .entry_points
            .iter()
            .find(|ep| ep.name == request.entry_point)
        else {
            return Err(fail(format!(
                "entry point '{}' not found",
                request.entry_point
            )));
        };

        let pipeline = naga::back::spv::PipelineOptions {
            shader_stage: entry.stage,
            entry_point: request.entry_point.to_string(),
        };
        let words = naga::back::spv::write_vec(
            &module,
            &info,
            &naga::back::spv::Options::default(),
            Some(&pipeline),
        )
        .map_err(|e| fail(e.to_string()))?;

        Ok(bytemuck::cast_slice(&words).to_vec())
    }

    fn validate_blob(&self, bytes: &[u8]) -> bool {
        // Header is five words: magic, version, generator, bound, schema.
        if bytes.len() < 20 || bytes.len() % 4 != 0 {
            return false;
        }
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[..4]);
        u32::from_le_bytes(magic) == SPIRV_MAGIC
    }
}
