//! Shared services for the binary shader tools: console variables, console
//! output and tracing setup, and the writable asset store the program cache
//! persists into.

pub mod common;
pub mod cvar;
pub mod files;
