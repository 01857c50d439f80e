//! Shader programs
//!
//! Owned program handles, program source descriptions, and the loader that
//! decides between the binary cache and a compile from source.

mod manager;
mod program;

pub use manager::{AcquiredProgram, ProgramLoader, ProgramOrigin};
pub use program::{Program, ProgramSource};
