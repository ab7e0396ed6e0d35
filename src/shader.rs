//! Shader input. Spec §6 says SPIR-V bytecode arrives pre-compiled; this
//! module additionally carries the teacher's `shaderc`-backed GLSL
//! convenience path (`plumber.rs::compile_glsl`/`compile_shader`) as an
//! ergonomic on-ramp for demos and tests, ungated by any Non-goal.

use std::path::PathBuf;

use parking_lot::Mutex;
use shaderc::{Compiler, ShaderKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
    Geometry,
}

impl ShaderStage {
    fn shaderc_kind(self) -> ShaderKind {
        match self {
            ShaderStage::Vertex => ShaderKind::Vertex,
            ShaderStage::Fragment => ShaderKind::Fragment,
            ShaderStage::Compute => ShaderKind::Compute,
            ShaderStage::Geometry => ShaderKind::Geometry,
        }
    }
}

/// Pre-compiled SPIR-V, or a GLSL convenience source compiled on demand.
/// `Task` construction always resolves this down to `Spirv` before handing
/// bytes to the device.
#[derive(Debug, Clone)]
pub enum ShaderSource {
    Spirv(Vec<u32>),
    GlslSource { code: String, stage: ShaderStage, name: &'static str },
    GlslFile { path: PathBuf, stage: ShaderStage },
}

/// Wraps a `shaderc::Compiler`, mirroring `Plumber`'s
/// `Arc<Mutex<ShaderCCompiler>>` (the compiler is not `Sync`, so access is
/// serialized).
pub struct ShaderCompiler {
    inner: Mutex<Compiler>,
}

// shaderc::Compiler is not Sync by default in the upstream crate; access is
// always taken through the Mutex above, matching the teacher's own
// `unsafe impl Send for ShaderCCompiler`.
unsafe impl Send for ShaderCompiler {}
unsafe impl Sync for ShaderCompiler {}

impl ShaderCompiler {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Compiler::new().expect("[ShaderCompiler] failed to create shaderc compiler")),
        }
    }

    pub fn compile(&self, source: ShaderSource) -> anyhow::Result<Vec<u32>> {
        match source {
            ShaderSource::Spirv(words) => Ok(words),
            ShaderSource::GlslSource { code, stage, name } => self.compile_glsl(&code, stage, name),
            ShaderSource::GlslFile { path, stage } => {
                let code = std::fs::read_to_string(&path)?;
                let name = path.to_str().unwrap_or("shader");
                self.compile_glsl(&code, stage, name)
            }
        }
    }

    fn compile_glsl(&self, source: &str, stage: ShaderStage, name: &str) -> anyhow::Result<Vec<u32>> {
        let mut compiler = self.inner.lock();
        let artifact = compiler.compile_into_spirv(source, stage.shaderc_kind(), name, "main", None)?;
        Ok(artifact.as_binary().to_vec())
    }
}

impl Default for ShaderCompiler {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ShaderCompiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShaderCompiler").finish()
    }
}
