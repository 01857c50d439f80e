// End-to-end program cache scenarios through the public API.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use binshader_common::files::DiskStore;
use binshader_renderer::{
    CacheConfig, CacheError, CompiledArtifact, CompiledArtifactCache, CompileError, DriverError, Program,
    ProgramDriver, ProgramId, ProgramLoader, ProgramOrigin, ProgramSource, ShaderCompiler, SoftDriver,
};

const VS: &str = "attribute vec3 inVertex;\nuniform mat4 WVPMatrix;\nvoid main() { gl_Position = WVPMatrix * vec4(inVertex, 1.0); }\n";
const FS: &str = "uniform sampler2D sTexture;\nvoid main() { gl_FragColor = vec4(1.0); }\n";

/// A driver whose binaries are the program id's bytes, tagged 0x42.
/// Counts create/delete calls to catch leaked programs.
#[derive(Default)]
struct EchoDriver {
    programs: RefCell<HashMap<ProgramId, bool>>,
    next: RefCell<ProgramId>,
    created: RefCell<usize>,
    deleted: RefCell<usize>,
}

impl ProgramDriver for EchoDriver {
    fn num_program_binary_formats(&self) -> usize {
        1
    }

    fn create_program(&self) -> ProgramId {
        *self.next.borrow_mut() += 1;
        let id = *self.next.borrow();
        self.programs.borrow_mut().insert(id, false);
        *self.created.borrow_mut() += 1;
        id
    }

    fn delete_program(&self, program: ProgramId) {
        if self.programs.borrow_mut().remove(&program).is_some() {
            *self.deleted.borrow_mut() += 1;
        }
    }

    fn program_binary_length(&self, _program: ProgramId) -> usize {
        4
    }

    fn get_program_binary(&self, program: ProgramId) -> Result<(u32, Vec<u8>), DriverError> {
        match self.programs.borrow().get(&program) {
            Some(true) => Ok((0x42, program.to_le_bytes().to_vec())),
            Some(false) => Err(DriverError::NotLinked(program)),
            None => Err(DriverError::UnknownProgram(program)),
        }
    }

    fn program_binary(&self, program: ProgramId, format: u32, binary: &[u8]) {
        let ok = format == 0x42 && binary.len() == 4;
        self.programs.borrow_mut().insert(program, ok);
    }

    fn link_status(&self, program: ProgramId) -> bool {
        self.programs.borrow().get(&program).copied().unwrap_or(false)
    }

    fn uniform_location(&self, _program: ProgramId, _name: &str) -> Option<i32> {
        None
    }
}

impl ShaderCompiler for EchoDriver {
    fn compile_program(&self, _source: &ProgramSource) -> Result<ProgramId, CompileError> {
        let id = self.create_program();
        self.programs.borrow_mut().insert(id, true);
        Ok(id)
    }
}

fn store_in(dir: &Path) -> DiskStore {
    DiskStore::new(dir)
}

#[test]
fn empty_directory_full_cycle() {
    let tmp = tempfile::tempdir().unwrap();
    let driver = SoftDriver::default();
    let cache = CompiledArtifactCache::new(&driver, store_in(tmp.path()));
    let (fmt, blob) = (Path::new("shaderformat.bin"), Path::new("shader.bin"));

    assert!(cache.load(fmt, blob).unwrap_err().is_miss());

    let compiled = Program::compile(&driver, &ProgramSource::new(VS, FS)).unwrap();
    let n = driver.program_binary_length(compiled.id());
    cache.store(&compiled, fmt, blob).unwrap();
    assert_eq!(fs::metadata(tmp.path().join(fmt)).unwrap().len(), 4);
    assert_eq!(fs::metadata(tmp.path().join(blob)).unwrap().len(), n as u64);

    let artifact = cache.load(fmt, blob).unwrap();
    assert_eq!(artifact.binary.len(), n);
    let restored = cache.materialize(&artifact).unwrap();
    assert!(restored.is_linked());
}

#[test]
fn tag_of_seven_without_blob_is_miss() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(tmp.path().join("shaderformat.bin"), 7u32.to_ne_bytes()).unwrap();
    let driver = SoftDriver::default();
    let cache = CompiledArtifactCache::new(&driver, store_in(tmp.path()));
    let err = cache
        .load(Path::new("shaderformat.bin"), Path::new("shader.bin"))
        .unwrap_err();
    assert!(err.is_miss());
}

#[test]
fn zeroed_blob_is_incompatible() {
    let tmp = tempfile::tempdir().unwrap();
    let driver = SoftDriver::default();
    let loader = ProgramLoader::new(&driver, store_in(tmp.path()), CacheConfig::default());
    drop(loader.acquire(&ProgramSource::new(VS, FS)).unwrap());

    fs::write(tmp.path().join("shader.bin"), b"").unwrap();
    assert!(matches!(
        loader.acquire(&ProgramSource::new(VS, FS)),
        Err(CacheError::IncompatibleArtifact { .. })
    ));
    assert_eq!(driver.live_programs(), 0);
}

#[test]
fn custom_driver_round_trip_and_no_leaks() {
    let tmp = tempfile::tempdir().unwrap();
    let driver = EchoDriver::default();
    let loader = ProgramLoader::new(&driver, store_in(tmp.path()), CacheConfig::default());

    let first = loader.acquire(&ProgramSource::new(VS, FS)).unwrap();
    assert_eq!(first.origin, ProgramOrigin::Rebuilt);
    drop(first);
    let second = loader.acquire(&ProgramSource::new(VS, FS)).unwrap();
    assert_eq!(second.origin, ProgramOrigin::Cache);
    drop(second);

    let bad = CompiledArtifact {
        format: 0x43,
        binary: vec![0; 4],
    };
    assert!(matches!(
        loader.cache().materialize(&bad),
        Err(CacheError::IncompatibleArtifact { format: 0x43 })
    ));

    assert_eq!(*driver.created.borrow(), *driver.deleted.borrow());
    assert!(driver.programs.borrow().is_empty());
}

#[test]
fn trait_object_driver() {
    let tmp = tempfile::tempdir().unwrap();
    let soft = SoftDriver::default();
    let driver: &dyn ShaderCompiler = &soft;
    let loader = ProgramLoader::new(driver, store_in(tmp.path()), CacheConfig::default());
    let acquired = loader.acquire(&ProgramSource::new(VS, FS)).unwrap();
    assert_eq!(acquired.program.uniform_location("sTexture"), Some(1));
}
