//! Binary shaders sample: acquires the scene program through the binary
//! program cache and reports how it was obtained.

pub mod binary_shaders;
