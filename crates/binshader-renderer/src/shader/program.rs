//! Shader program handles and sources

use crate::driver::{CompileError, ProgramDriver, ProgramId, ShaderCompiler};

/// Everything needed to compile a program from source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgramSource {
    pub vertex: String,
    pub fragment: String,
    /// Explicit attribute locations, applied before linking.
    pub attributes: Vec<(String, u16)>,
    /// Preprocessor symbols defined for both stages.
    pub defines: Vec<String>,
}

impl ProgramSource {
    pub fn new(vertex: impl Into<String>, fragment: impl Into<String>) -> Self {
        Self {
            vertex: vertex.into(),
            fragment: fragment.into(),
            attributes: Vec::new(),
            defines: Vec::new(),
        }
    }

    pub fn bind_attribute(mut self, name: &str, index: u16) -> Self {
        self.attributes.push((name.to_string(), index));
        self
    }

    pub fn define(mut self, symbol: &str) -> Self {
        self.defines.push(symbol.to_string());
        self
    }
}

/// An owned program object.
///
/// The program is deleted from the driver when the handle is dropped, so a
/// handle that fails validation halfway through construction is released on
/// the error path as well.
pub struct Program<'d, D: ProgramDriver + ?Sized> {
    driver: &'d D,
    id: ProgramId,
}

impl<'d, D: ProgramDriver + ?Sized> Program<'d, D> {
    /// Create an empty program object.
    pub fn create(driver: &'d D) -> Self {
        let id = driver.create_program();
        Self { driver, id }
    }

    /// Driver-side program name.
    pub fn id(&self) -> ProgramId {
        self.id
    }

    pub fn is_linked(&self) -> bool {
        self.driver.link_status(self.id)
    }

    pub fn uniform_location(&self, name: &str) -> Option<i32> {
        self.driver.uniform_location(self.id, name)
    }
}

impl<'d, D: ShaderCompiler + ?Sized> Program<'d, D> {
    /// Compile and link a program from source.
    pub fn compile(driver: &'d D, source: &ProgramSource) -> Result<Self, CompileError> {
        let id = driver.compile_program(source)?;
        Ok(Self { driver, id })
    }
}

impl<D: ProgramDriver + ?Sized> Drop for Program<'_, D> {
    fn drop(&mut self) {
        self.driver.delete_program(self.id);
    }
}

impl<D: ProgramDriver + ?Sized> std::fmt::Debug for Program<'_, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Program").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soft_driver::SoftDriver;

    const VS: &str = "attribute vec3 inVertex;\nuniform mat4 WVPMatrix;\nvoid main() { gl_Position = WVPMatrix * vec4(inVertex, 1.0); }\n";
    const FS: &str = "void main() { gl_FragColor = vec4(1.0); }\n";

    #[test]
    fn test_source_builder() {
        let src = ProgramSource::new(VS, FS)
            .bind_attribute("inVertex", 0)
            .define("FRAMEBUFFER_SRGB");
        assert_eq!(src.attributes, vec![("inVertex".to_string(), 0)]);
        assert_eq!(src.defines, vec!["FRAMEBUFFER_SRGB".to_string()]);
    }

    #[test]
    fn test_drop_releases_program() {
        let driver = SoftDriver::default();
        {
            let program = Program::compile(&driver, &ProgramSource::new(VS, FS)).unwrap();
            assert!(program.is_linked());
            assert_eq!(driver.live_programs(), 1);
        }
        assert_eq!(driver.live_programs(), 0);
    }

    #[test]
    fn test_create_is_unlinked() {
        let driver = SoftDriver::default();
        let program = Program::create(&driver);
        assert_ne!(program.id(), 0);
        assert!(!program.is_linked());
        assert_eq!(program.uniform_location("WVPMatrix"), None);
    }

    #[test]
    fn test_uniform_location_on_compiled_program() {
        let driver = SoftDriver::default();
        let program = Program::compile(&driver, &ProgramSource::new(VS, FS)).unwrap();
        assert_eq!(program.uniform_location("WVPMatrix"), Some(0));
        assert_eq!(program.uniform_location("missing"), None);
    }
}
