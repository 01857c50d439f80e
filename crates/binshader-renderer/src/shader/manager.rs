//! Program loader
//!
//! Produces a ready program, preferring the binary cache:
//!
//! ```text
//! load ok   -> materialize -> ready                          (Cache)
//! miss      -> compile -> store -> load -> materialize       (Rebuilt)
//! stale     -> Fatal: error | PurgeAndRebuild: purge, then as miss
//! no binary formats / caching off -> compile only            (Compiled)
//! ```

use binshader_common::files::AssetStore;
use tracing::{info, warn};

use super::{Program, ProgramSource};
use crate::driver::ShaderCompiler;
use crate::program_cache::{CacheConfig, CacheError, CompiledArtifactCache, IncompatiblePolicy};

/// Where an acquired program came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramOrigin {
    /// Restored from the existing cache files.
    Cache,
    /// Compiled from source, stored, and restored from the new cache files.
    Rebuilt,
    /// Compiled from source without touching the cache.
    Compiled,
}

/// A usable program and how it was obtained.
pub struct AcquiredProgram<'d, D: ShaderCompiler + ?Sized> {
    pub program: Program<'d, D>,
    pub origin: ProgramOrigin,
}

impl<D: ShaderCompiler + ?Sized> std::fmt::Debug for AcquiredProgram<'_, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcquiredProgram")
            .field("program", &self.program)
            .field("origin", &self.origin)
            .finish()
    }
}

pub struct ProgramLoader<'d, D: ShaderCompiler + ?Sized, S: AssetStore> {
    cache: CompiledArtifactCache<'d, D, S>,
    config: CacheConfig,
}

impl<'d, D: ShaderCompiler + ?Sized, S: AssetStore> ProgramLoader<'d, D, S> {
    pub fn new(driver: &'d D, store: S, config: CacheConfig) -> Self {
        Self {
            cache: CompiledArtifactCache::new(driver, store),
            config,
        }
    }

    pub fn cache(&self) -> &CompiledArtifactCache<'d, D, S> {
        &self.cache
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Get a linked program for `source`.
    pub fn acquire(&self, source: &ProgramSource) -> Result<AcquiredProgram<'d, D>, CacheError> {
        if !self.config.enabled {
            return self.compile_only(source);
        }

        let (format_path, blob_path) = (&self.config.format_path, &self.config.blob_path);

        match self.cache.load(format_path, blob_path) {
            Ok(artifact) => match self.cache.materialize(&artifact) {
                Ok(program) => {
                    return Ok(AcquiredProgram {
                        program,
                        origin: ProgramOrigin::Cache,
                    })
                }
                Err(CacheError::IncompatibleArtifact { format })
                    if self.config.incompatible_policy == IncompatiblePolicy::PurgeAndRebuild =>
                {
                    warn!(
                        format = %format!("0x{:04x}", format),
                        "cached program binary is stale; rebuilding"
                    );
                    self.cache.purge(format_path, blob_path)?;
                }
                Err(e) => return Err(e),
            },
            Err(e) if e.is_miss() => {}
            Err(e) => return Err(e),
        }

        self.rebuild(source)
    }

    fn compile_only(&self, source: &ProgramSource) -> Result<AcquiredProgram<'d, D>, CacheError> {
        let program = Program::compile(self.cache.driver(), source)?;
        Ok(AcquiredProgram {
            program,
            origin: ProgramOrigin::Compiled,
        })
    }

    /// Compile from source, store, then restore from what was stored.
    fn rebuild(&self, source: &ProgramSource) -> Result<AcquiredProgram<'d, D>, CacheError> {
        let (format_path, blob_path) = (&self.config.format_path, &self.config.blob_path);

        let compiled = Program::compile(self.cache.driver(), source)?;
        match self.cache.store(&compiled, format_path, blob_path) {
            Ok(()) => {}
            Err(CacheError::NoBinaryFormatSupported) => {
                warn!("driver cannot export program binaries; running without a program cache");
                return Ok(AcquiredProgram {
                    program: compiled,
                    origin: ProgramOrigin::Compiled,
                });
            }
            Err(CacheError::WriteFailure(e)) => {
                warn!(error = %e, "couldn't write program cache; continuing without it");
                return Ok(AcquiredProgram {
                    program: compiled,
                    origin: ProgramOrigin::Compiled,
                });
            }
            Err(e) => return Err(e),
        }
        drop(compiled);

        let artifact = self
            .cache
            .load(format_path, blob_path)
            .map_err(|_| CacheError::ReloadFailed)?;
        let program = self.cache.materialize(&artifact)?;

        info!(program = program.id(), "program compiled and cached");
        Ok(AcquiredProgram {
            program,
            origin: ProgramOrigin::Rebuilt,
        })
    }
}
