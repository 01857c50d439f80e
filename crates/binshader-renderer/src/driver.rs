//! Driver interface
//!
//! The program cache only ever talks to the GPU through these two traits.
//! They mirror the handful of driver entry points binary program caching
//! needs: export/import of a linked program and its link status.

use std::fmt;

use thiserror::Error;

use crate::shader::ProgramSource;

/// Driver-side name of a program object. Zero is never a valid program.
pub type ProgramId = u32;

/// Shader pipeline stage, for compile diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => write!(f, "vertex"),
            ShaderStage::Fragment => write!(f, "fragment"),
        }
    }
}

/// Errors from compiling a program from source.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("{stage} shader compilation failed: {log}")]
    Compile { stage: ShaderStage, log: String },

    #[error("program link failed: {0}")]
    Link(String),
}

/// Errors from driver queries on an existing program.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("unknown program {0}")]
    UnknownProgram(ProgramId),

    #[error("program {0} is not linked")]
    NotLinked(ProgramId),

    #[error("driver exposes no program binary formats")]
    NoBinaryFormats,
}

/// Program object management and binary export/import.
pub trait ProgramDriver {
    /// Number of binary formats programs can be exported in.
    fn num_program_binary_formats(&self) -> usize;

    /// Creates an empty, unlinked program object.
    fn create_program(&self) -> ProgramId;

    /// Releases a program object. Unknown ids are ignored.
    fn delete_program(&self, program: ProgramId);

    /// Size in bytes of the program's exported binary, 0 if unlinked.
    fn program_binary_length(&self, program: ProgramId) -> usize;

    /// Exports a linked program as its binary format tag and bytes.
    fn get_program_binary(&self, program: ProgramId) -> Result<(u32, Vec<u8>), DriverError>;

    /// Replaces the program's contents with a previously exported binary.
    /// Success or failure is reported through [`link_status`](Self::link_status).
    fn program_binary(&self, program: ProgramId, format: u32, binary: &[u8]);

    /// Whether the last link (from source or from a binary) succeeded.
    fn link_status(&self, program: ProgramId) -> bool;

    /// Location of an active uniform, `None` if absent or unlinked.
    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<i32>;
}

/// Compiles and links programs from source.
pub trait ShaderCompiler: ProgramDriver {
    fn compile_program(&self, source: &ProgramSource) -> Result<ProgramId, CompileError>;
}
