// binary_shaders.rs — the binary shaders sample
//
// Builds the lit, textured scene program with the attribute bindings and
// defines the renderer uses, acquires it through the program cache, and
// resolves its uniforms to show the restored program is usable.

use binshader_common::common::com_printf;
use binshader_common::cvar::{CvarContext, CvarFlags};
use binshader_common::files::DiskStore;
use binshader_renderer::soft_driver::SGX_PROGRAM_BINARY_FORMAT;
use binshader_renderer::{
    CacheConfig, CacheError, ProgramDriver, ProgramLoader, ProgramOrigin, ProgramSource, SoftDriver,
    SoftDriverConfig,
};
use tracing::info;

const VERTEX_SHADER: &str = include_str!("../shaders/VertShader.vsh");
const FRAGMENT_SHADER: &str = include_str!("../shaders/FragShader.fsh");

/// Uniforms the scene pass sets every frame.
pub const UNIFORM_NAMES: [&str; 4] = ["WVPMatrix", "WorldViewIT", "LightDirection", "sTexture"];

/// Vertex attribute locations, matching the mesh vertex layout.
pub const ATTRIBUTES: [(&str, u16); 3] = [("inVertex", 0), ("inNormal", 1), ("inTexCoord", 2)];

/// Register the sample's cvars, including the program cache ones.
pub fn register_cvars(cvars: &mut CvarContext) {
    CacheConfig::register_cvars(cvars);
    cvars.get("developer", "0", CvarFlags::empty());
    cvars.get("shader_srgb", "1", CvarFlags::ARCHIVE);
    cvars.get("soft_driver_version", "1", CvarFlags::NOSET);
    cvars.get("soft_binary_formats", "1", CvarFlags::NOSET);
}

/// Source for the scene program. With an sRGB framebuffer the hardware does
/// the gamma conversion, so the shader skips its own.
pub fn program_source(srgb_framebuffer: bool) -> ProgramSource {
    let mut source = ProgramSource::new(VERTEX_SHADER, FRAGMENT_SHADER);
    for (name, index) in ATTRIBUTES {
        source = source.bind_attribute(name, index);
    }
    if srgb_framebuffer {
        source = source.define("FRAMEBUFFER_SRGB");
    }
    source
}

/// Driver settings from the `soft_*` cvars. `soft_binary_formats 0` models a
/// driver without binary program support.
pub fn driver_config(cvars: &CvarContext) -> SoftDriverConfig {
    let defaults = SoftDriverConfig::default();
    let driver_version = cvars
        .variable_string("soft_driver_version")
        .parse()
        .unwrap_or(defaults.driver_version);
    let binary_formats = if cvars.find_var("soft_binary_formats").map_or(true, |v| v.value != 0.0) {
        vec![SGX_PROGRAM_BINARY_FORMAT]
    } else {
        Vec::new()
    };
    SoftDriverConfig {
        driver_version,
        binary_formats,
    }
}

/// Outcome of one run of the sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub origin: ProgramOrigin,
    pub binary_size: usize,
    pub identity: Option<String>,
    pub uniforms: Vec<(&'static str, Option<i32>)>,
}

impl Report {
    pub fn print(&self) {
        let origin = match self.origin {
            ProgramOrigin::Cache => "loaded from program cache",
            ProgramOrigin::Rebuilt => "compiled from source and cached",
            ProgramOrigin::Compiled => "compiled from source (no cache)",
        };
        com_printf(&format!("Binary Shaders: program {}\n", origin));
        com_printf(&format!("  binary size: {} bytes\n", self.binary_size));
        if let Some(ref identity) = self.identity {
            com_printf(&format!("  identity: {}\n", identity));
        }
        for (name, location) in &self.uniforms {
            match location {
                Some(loc) => com_printf(&format!("  uniform {:<16} location {}\n", name, loc)),
                None => com_printf(&format!("  uniform {:<16} not active\n", name)),
            }
        }
    }
}

/// Acquire the scene program. With `purge`, the cache is emptied first.
pub fn run(cvars: &CvarContext, purge: bool) -> Result<Report, CacheError> {
    let config = CacheConfig::from_cvars(cvars);
    let driver = SoftDriver::new(driver_config(cvars));
    let loader = ProgramLoader::new(&driver, DiskStore::new(config.basedir.clone()), config);

    if purge {
        let config = loader.config();
        loader.cache().purge(&config.format_path, &config.blob_path)?;
    }

    let source = program_source(cvars.variable_value("shader_srgb") != 0.0);
    let acquired = loader.acquire(&source)?;
    let program = &acquired.program;

    let report = Report {
        origin: acquired.origin,
        binary_size: driver.program_binary_length(program.id()),
        identity: driver.program_identity(program.id()),
        uniforms: UNIFORM_NAMES
            .iter()
            .map(|&name| (name, program.uniform_location(name)))
            .collect(),
    };
    info!(origin = ?report.origin, program = program.id(), "scene program ready");
    Ok(report)
}
