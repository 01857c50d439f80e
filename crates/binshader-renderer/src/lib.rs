//! Binary shader program caching.
//!
//! A linked program is exported from the driver as a `(format, bytes)` pair,
//! persisted to two files, and on later runs rebuilt from those files instead
//! of being compiled from source again.

pub mod driver;
pub mod program_cache;
pub mod shader;
pub mod soft_driver;

pub use driver::{CompileError, DriverError, ProgramDriver, ProgramId, ShaderCompiler, ShaderStage};
pub use program_cache::{CacheConfig, CacheError, CompiledArtifact, CompiledArtifactCache, IncompatiblePolicy};
pub use shader::{AcquiredProgram, Program, ProgramLoader, ProgramOrigin, ProgramSource};
pub use soft_driver::{SoftDriver, SoftDriverConfig};
