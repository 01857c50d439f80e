//! Binary program cache
//!
//! Persists a linked program as two files: a 4-byte format tag and the raw
//! program binary. On later runs the pair is loaded and handed back to the
//! driver instead of compiling from source again.
//!
//! Cache location: <basedir>/shaderformat.bin and <basedir>/shader.bin

use std::path::{Path, PathBuf};

use binshader_common::cvar::{CvarContext, CvarFlags};
use binshader_common::files::{AssetStore, FsError};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::driver::{CompileError, DriverError, ProgramDriver};
use crate::shader::Program;

/// Size of the format tag record.
pub const FORMAT_TAG_SIZE: usize = std::mem::size_of::<u32>();

/// A program binary together with the tag identifying its encoding.
/// The two are only ever stored and loaded as a pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledArtifact {
    pub format: u32,
    pub binary: Vec<u8>,
}

/// Errors raised by the program cache.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Nothing usable is cached yet; compile from source.
    #[error("no cached program at {path}")]
    Miss { path: PathBuf },

    /// The driver cannot export programs; caching is unavailable.
    #[error("driver does not support any binary formats")]
    NoBinaryFormatSupported,

    #[error("failed to write program cache: {0}")]
    WriteFailure(#[source] FsError),

    /// The cached binary does not link on this driver.
    #[error(
        "shader binary (format 0x{format:04x}) not valid; consider deleting the cache files \
         if they were generated with a different driver version"
    )]
    IncompatibleArtifact { format: u32 },

    #[error("failed to purge program cache: {0}")]
    Purge(#[source] FsError),

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    /// A freshly stored program could not be read back.
    #[error("cannot load shader binary that was just stored")]
    ReloadFailed,
}

impl CacheError {
    pub fn is_miss(&self) -> bool {
        matches!(self, CacheError::Miss { .. })
    }
}

/// What to do when a cached binary no longer links.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IncompatiblePolicy {
    /// Surface [`CacheError::IncompatibleArtifact`] to the caller.
    #[default]
    Fatal,
    /// Delete the stale files, compile from source and store again.
    PurgeAndRebuild,
}

/// Program cache configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Directory the cache files live in.
    pub basedir: PathBuf,
    /// Format tag file, relative to `basedir` unless absolute.
    pub format_path: PathBuf,
    /// Program binary file, relative to `basedir` unless absolute.
    pub blob_path: PathBuf,
    /// When false, programs are always compiled from source.
    pub enabled: bool,
    pub incompatible_policy: IncompatiblePolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            basedir: PathBuf::from("."),
            format_path: PathBuf::from("shaderformat.bin"),
            blob_path: PathBuf::from("shader.bin"),
            enabled: true,
            incompatible_policy: IncompatiblePolicy::Fatal,
        }
    }
}

impl CacheConfig {
    /// Register the cache cvars with their defaults.
    pub fn register_cvars(cvars: &mut CvarContext) {
        let defaults = Self::default();
        cvars.get("basedir", &defaults.basedir.to_string_lossy(), CvarFlags::NOSET);
        cvars.get("shader_formatfile", &defaults.format_path.to_string_lossy(), CvarFlags::ARCHIVE);
        cvars.get("shader_binfile", &defaults.blob_path.to_string_lossy(), CvarFlags::ARCHIVE);
        cvars.get("shader_cache", "1", CvarFlags::ARCHIVE);
        cvars.get("shader_purge_stale", "0", CvarFlags::ARCHIVE);
    }

    pub fn from_cvars(cvars: &CvarContext) -> Self {
        let defaults = Self::default();
        let path_or = |name: &str, default: PathBuf| match cvars.variable_string(name) {
            "" => default,
            s => PathBuf::from(s),
        };

        let incompatible_policy = if cvars.variable_value("shader_purge_stale") != 0.0 {
            IncompatiblePolicy::PurgeAndRebuild
        } else {
            IncompatiblePolicy::Fatal
        };

        Self {
            basedir: path_or("basedir", defaults.basedir),
            format_path: path_or("shader_formatfile", defaults.format_path),
            blob_path: path_or("shader_binfile", defaults.blob_path),
            enabled: cvars.find_var("shader_cache").map_or(true, |v| v.value != 0.0),
            incompatible_policy,
        }
    }
}

/// Stores, loads and rebuilds programs through an [`AssetStore`].
pub struct CompiledArtifactCache<'d, D: ProgramDriver + ?Sized, S: AssetStore> {
    driver: &'d D,
    store: S,
}

impl<'d, D: ProgramDriver + ?Sized, S: AssetStore> CompiledArtifactCache<'d, D, S> {
    pub fn new(driver: &'d D, store: S) -> Self {
        Self { driver, store }
    }

    pub fn driver(&self) -> &'d D {
        self.driver
    }

    /// Export `program` and write its format tag and binary.
    ///
    /// Both files are replaced; if either write fails, both are removed so
    /// the tag and binary on disk never come from different programs.
    pub fn store(&self, program: &Program<'_, D>, format_path: &Path, blob_path: &Path) -> Result<(), CacheError> {
        if self.driver.num_program_binary_formats() == 0 {
            return Err(CacheError::NoBinaryFormatSupported);
        }

        let length = self.driver.program_binary_length(program.id());
        let (format, binary) = self.driver.get_program_binary(program.id())?;
        if binary.len() != length {
            debug!(reported = length, actual = binary.len(), "program binary length changed during export");
        }

        let written = self
            .store
            .write_file(format_path, bytemuck::bytes_of(&format))
            .and_then(|()| self.store.write_file(blob_path, &binary));

        if let Err(e) = written {
            let _ = self.store.remove_file(format_path);
            let _ = self.store.remove_file(blob_path);
            return Err(CacheError::WriteFailure(e));
        }

        info!(
            format = %format!("0x{:04x}", format),
            bytes = binary.len(),
            "stored program binary"
        );
        Ok(())
    }

    /// Read a cached format tag and binary.
    ///
    /// Anything short of both files being present and readable is a
    /// [`CacheError::Miss`], so a half-written cache leads to a rebuild.
    pub fn load(&self, format_path: &Path, blob_path: &Path) -> Result<CompiledArtifact, CacheError> {
        let tag = self.read(format_path)?;
        if tag.len() != FORMAT_TAG_SIZE {
            warn!(
                path = %format_path.display(),
                len = tag.len(),
                "format tag file has the wrong size; ignoring cache"
            );
            return Err(CacheError::Miss {
                path: format_path.to_path_buf(),
            });
        }
        let format: u32 = bytemuck::pod_read_unaligned(&tag);

        let binary = self.read(blob_path)?;

        debug!(
            format = %format!("0x{:04x}", format),
            bytes = binary.len(),
            "program cache hit"
        );
        Ok(CompiledArtifact { format, binary })
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>, CacheError> {
        match self.store.load_file(path) {
            Ok(Some(data)) => Ok(data),
            Ok(None) => {
                debug!(path = %path.display(), "program cache miss");
                Err(CacheError::Miss { path: path.to_path_buf() })
            }
            Err(e) => {
                warn!(error = %e, "program cache unreadable; treating as miss");
                Err(CacheError::Miss { path: path.to_path_buf() })
            }
        }
    }

    /// Rebuild a program object from a cached artifact.
    pub fn materialize(&self, artifact: &CompiledArtifact) -> Result<Program<'d, D>, CacheError> {
        let program = Program::create(self.driver);
        self.driver
            .program_binary(program.id(), artifact.format, &artifact.binary);

        if !program.is_linked() {
            // dropping `program` releases it
            return Err(CacheError::IncompatibleArtifact {
                format: artifact.format,
            });
        }

        info!(program = program.id(), "program restored from binary");
        Ok(program)
    }

    /// Delete both cache files. Missing files are not an error.
    pub fn purge(&self, format_path: &Path, blob_path: &Path) -> Result<(), CacheError> {
        let format_removed = self.store.remove_file(format_path).map_err(CacheError::Purge)?;
        let blob_removed = self.store.remove_file(blob_path).map_err(CacheError::Purge)?;
        if format_removed || blob_removed {
            warn!("purged program cache");
        }
        Ok(())
    }
}
