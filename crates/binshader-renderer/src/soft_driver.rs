//! Software program driver
//!
//! An in-process implementation of [`ShaderCompiler`] and [`ProgramDriver`].
//! It "compiles" GLSL by running a small preprocessor over each stage and
//! collecting attribute and uniform declarations, and exports programs in a
//! checksummed binary that only the same driver version will accept back.
//!
//! Binary layout (little endian):
//!
//! ```text
//! u32 magic            "SPBN"
//! u32 driver_version
//! u32 payload_crc      CRC-32/ISO-HDLC of the payload
//! u32 payload_len
//! payload:
//!   [u8; 20] identity  SHA-1 of the preprocessed stages
//!   u16 attribute count, then per attribute: u16 index, u16 len, name
//!   u16 uniform count, then per uniform: u16 len, name
//! ```

use std::collections::{HashMap, HashSet};

use crc::{Crc, CRC_32_ISO_HDLC};
use parking_lot::Mutex;
use sha1::{Digest, Sha1};
use tracing::{debug, warn};

use crate::driver::{CompileError, DriverError, ProgramDriver, ProgramId, ShaderCompiler, ShaderStage};
use crate::shader::ProgramSource;

/// Binary format tag the software driver exports with by default.
pub const SGX_PROGRAM_BINARY_FORMAT: u32 = 0x9130;

/// Highest attribute location + 1.
pub const MAX_VERTEX_ATTRIBS: u16 = 16;

const BINARY_MAGIC: u32 = 0x4E42_5053; // "SPBN"
const HEADER_SIZE: usize = 16;
const IDENTITY_SIZE: usize = 20;

const CRC_CALC: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Software driver configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoftDriverConfig {
    /// Stamped into exported binaries; binaries from another version fail to link.
    pub driver_version: u32,
    /// Accepted binary formats. The first one is used for export; an empty
    /// list models a driver without binary program support.
    pub binary_formats: Vec<u32>,
}

impl Default for SoftDriverConfig {
    fn default() -> Self {
        Self {
            driver_version: 1,
            binary_formats: vec![SGX_PROGRAM_BINARY_FORMAT],
        }
    }
}

/// Linked state of a program.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ProgramImage {
    identity: [u8; IDENTITY_SIZE],
    attributes: Vec<(String, u16)>,
    uniforms: Vec<String>,
}

#[derive(Debug, Default)]
struct SoftProgram {
    /// `Some` once linked.
    image: Option<ProgramImage>,
    info_log: String,
}

struct SoftState {
    next_id: ProgramId,
    programs: HashMap<ProgramId, SoftProgram>,
}

pub struct SoftDriver {
    config: SoftDriverConfig,
    state: Mutex<SoftState>,
}

impl SoftDriver {
    pub fn new(config: SoftDriverConfig) -> Self {
        Self {
            config,
            state: Mutex::new(SoftState {
                next_id: 1,
                programs: HashMap::new(),
            }),
        }
    }

    /// Number of program objects not yet deleted.
    pub fn live_programs(&self) -> usize {
        self.state.lock().programs.len()
    }

    /// Diagnostic left by the last failed link of `program`.
    pub fn info_log(&self, program: ProgramId) -> String {
        self.state
            .lock()
            .programs
            .get(&program)
            .map(|p| p.info_log.clone())
            .unwrap_or_default()
    }

    /// Hex SHA-1 identity of a linked program's sources.
    pub fn program_identity(&self, program: ProgramId) -> Option<String> {
        let state = self.state.lock();
        let image = state.programs.get(&program)?.image.as_ref()?;
        Some(hex(&image.identity))
    }

    fn insert(&self, program: SoftProgram) -> ProgramId {
        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.programs.insert(id, program);
        id
    }
}

impl Default for SoftDriver {
    fn default() -> Self {
        Self::new(SoftDriverConfig::default())
    }
}

impl ProgramDriver for SoftDriver {
    fn num_program_binary_formats(&self) -> usize {
        self.config.binary_formats.len()
    }

    fn create_program(&self) -> ProgramId {
        self.insert(SoftProgram::default())
    }

    fn delete_program(&self, program: ProgramId) {
        if self.state.lock().programs.remove(&program).is_some() {
            debug!(program, "deleted program");
        }
    }

    fn program_binary_length(&self, program: ProgramId) -> usize {
        let state = self.state.lock();
        state
            .programs
            .get(&program)
            .and_then(|p| p.image.as_ref())
            .map_or(0, |image| image.encode(self.config.driver_version).len())
    }

    fn get_program_binary(&self, program: ProgramId) -> Result<(u32, Vec<u8>), DriverError> {
        let format = *self.config.binary_formats.first().ok_or(DriverError::NoBinaryFormats)?;
        let state = self.state.lock();
        let entry = state.programs.get(&program).ok_or(DriverError::UnknownProgram(program))?;
        let image = entry.image.as_ref().ok_or(DriverError::NotLinked(program))?;
        Ok((format, image.encode(self.config.driver_version)))
    }

    fn program_binary(&self, program: ProgramId, format: u32, binary: &[u8]) {
        let mut state = self.state.lock();
        let Some(entry) = state.programs.get_mut(&program) else {
            warn!(program, "program_binary on unknown program");
            return;
        };

        let result = if !self.config.binary_formats.contains(&format) {
            Err(format!("unsupported binary format 0x{:04x}", format))
        } else {
            ProgramImage::decode(binary, self.config.driver_version)
        };

        match result {
            Ok(image) => {
                entry.image = Some(image);
                entry.info_log.clear();
            }
            Err(log) => {
                debug!(program, log = %log, "program binary rejected");
                entry.image = None;
                entry.info_log = log;
            }
        }
    }

    fn link_status(&self, program: ProgramId) -> bool {
        self.state
            .lock()
            .programs
            .get(&program)
            .is_some_and(|p| p.image.is_some())
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<i32> {
        let state = self.state.lock();
        let image = state.programs.get(&program)?.image.as_ref()?;
        image.uniforms.iter().position(|u| u == name).map(|i| i as i32)
    }
}

impl ShaderCompiler for SoftDriver {
    fn compile_program(&self, source: &ProgramSource) -> Result<ProgramId, CompileError> {
        let vertex = compile_stage(ShaderStage::Vertex, &source.vertex, &source.defines)?;
        let fragment = compile_stage(ShaderStage::Fragment, &source.fragment, &source.defines)?;

        let attributes = assign_attributes(
            declared_names(&vertex, &["attribute", "in"]),
            &source.attributes,
        )?;

        let mut uniforms = declared_names(&vertex, &["uniform"]);
        for name in declared_names(&fragment, &["uniform"]) {
            if !uniforms.contains(&name) {
                uniforms.push(name);
            }
        }
        check_encodable(&attributes, &uniforms)?;

        let mut hasher = Sha1::new();
        hasher.update(vertex.as_bytes());
        hasher.update([0u8]);
        hasher.update(fragment.as_bytes());
        let mut identity = [0u8; IDENTITY_SIZE];
        identity.copy_from_slice(&hasher.finalize());

        let id = self.insert(SoftProgram {
            image: Some(ProgramImage {
                identity,
                attributes,
                uniforms,
            }),
            info_log: String::new(),
        });
        debug!(program = id, identity = %hex(&identity), "compiled program from source");
        Ok(id)
    }
}

// ============================================================
// Compilation
// ============================================================

fn compile_stage(stage: ShaderStage, source: &str, defines: &[String]) -> Result<String, CompileError> {
    let text = preprocess(source, defines).map_err(|log| CompileError::Compile { stage, log })?;
    if !text.contains("void main") {
        return Err(CompileError::Compile {
            stage,
            log: "missing entry point 'main'".to_string(),
        });
    }
    Ok(text)
}

/// Applies `#define`, `#ifdef`, `#ifndef`, `#else` and `#endif`. Other
/// directives pass through untouched.
fn preprocess(source: &str, defines: &[String]) -> Result<String, String> {
    let mut symbols: HashSet<String> = defines.iter().cloned().collect();
    let mut branches: Vec<bool> = Vec::new();
    let mut out = String::with_capacity(source.len());

    for (lineno, line) in source.lines().enumerate() {
        let trimmed = line.trim_start();
        let emitting = branches.iter().all(|&b| b);

        if let Some(rest) = trimmed.strip_prefix("#ifdef") {
            branches.push(symbols.contains(rest.trim()));
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("#ifndef") {
            branches.push(!symbols.contains(rest.trim()));
            continue;
        }
        if trimmed.starts_with("#else") {
            match branches.last_mut() {
                Some(top) => *top = !*top,
                None => return Err(format!("{}: #else without #ifdef", lineno + 1)),
            }
            continue;
        }
        if trimmed.starts_with("#endif") {
            if branches.pop().is_none() {
                return Err(format!("{}: #endif without #ifdef", lineno + 1));
            }
            continue;
        }
        if !emitting {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("#define") {
            if let Some(symbol) = rest.split_whitespace().next() {
                symbols.insert(symbol.to_string());
            }
        }
        out.push_str(line);
        out.push('\n');
    }

    if !branches.is_empty() {
        return Err("unterminated #ifdef".to_string());
    }
    Ok(out)
}

/// Names of global declarations introduced by one of `qualifiers`.
fn declared_names(source: &str, qualifiers: &[&str]) -> Vec<String> {
    let code: String = source
        .lines()
        .filter(|l| !l.trim_start().starts_with('#'))
        .map(|l| l.split("//").next().unwrap_or(""))
        .collect::<Vec<_>>()
        .join("\n");

    let mut names = Vec::new();
    for statement in code.split(';') {
        let tokens: Vec<&str> = statement.split_whitespace().collect();
        let Some(pos) = tokens.iter().position(|t| qualifiers.contains(t)) else {
            continue;
        };
        // qualifier, [precision], type, name
        if tokens.len() - pos < 3 {
            continue;
        }
        let raw = tokens[tokens.len() - 1];
        let name = raw.split('[').next().unwrap_or(raw);
        if !name.is_empty()
            && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
            && !names.iter().any(|n| n == name)
        {
            names.push(name.to_string());
        }
    }
    names
}

/// Gives every declared attribute a location: the bound one if present,
/// otherwise the lowest free index.
fn assign_attributes(declared: Vec<String>, bindings: &[(String, u16)]) -> Result<Vec<(String, u16)>, CompileError> {
    for (name, index) in bindings {
        if *index >= MAX_VERTEX_ATTRIBS {
            return Err(CompileError::Link(format!(
                "attribute {} bound to location {} (max {})",
                name,
                index,
                MAX_VERTEX_ATTRIBS - 1
            )));
        }
    }

    let mut used: HashSet<u16> = declared
        .iter()
        .filter_map(|d| bindings.iter().find(|(n, _)| n == d).map(|&(_, i)| i))
        .collect();

    let mut attributes = Vec::with_capacity(declared.len());
    for name in declared {
        let index = match bindings.iter().find(|(n, _)| *n == name) {
            Some(&(_, index)) => index,
            None => {
                let free = (0..MAX_VERTEX_ATTRIBS)
                    .find(|i| !used.contains(i))
                    .ok_or_else(|| CompileError::Link("too many vertex attributes".to_string()))?;
                used.insert(free);
                free
            }
        };
        attributes.push((name, index));
    }
    Ok(attributes)
}

/// Names and counts are stored as `u16` in the exported binary.
fn check_encodable(attributes: &[(String, u16)], uniforms: &[String]) -> Result<(), CompileError> {
    let max = usize::from(u16::MAX);
    if uniforms.len() > max {
        return Err(CompileError::Link(format!(
            "{} active uniforms (max {})",
            uniforms.len(),
            max
        )));
    }
    let names = attributes.iter().map(|(name, _)| name).chain(uniforms);
    if let Some(name) = names.into_iter().find(|name| name.len() > max) {
        return Err(CompileError::Link(format!(
            "identifier {}... is {} bytes long (max {})",
            &name[..32],
            name.len(),
            max
        )));
    }
    Ok(())
}

// ============================================================
// Binary encoding
// ============================================================

impl ProgramImage {
    fn encode(&self, driver_version: u32) -> Vec<u8> {
        let mut payload = Vec::new();
        payload.extend_from_slice(&self.identity);
        put_u16(&mut payload, self.attributes.len() as u16);
        for (name, index) in &self.attributes {
            put_u16(&mut payload, *index);
            put_str(&mut payload, name);
        }
        put_u16(&mut payload, self.uniforms.len() as u16);
        for name in &self.uniforms {
            put_str(&mut payload, name);
        }

        let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
        out.extend_from_slice(&BINARY_MAGIC.to_le_bytes());
        out.extend_from_slice(&driver_version.to_le_bytes());
        out.extend_from_slice(&CRC_CALC.checksum(&payload).to_le_bytes());
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        out.extend_from_slice(&payload);
        out
    }

    fn decode(binary: &[u8], driver_version: u32) -> Result<Self, String> {
        let mut header = Reader::new(binary);
        let truncated = || "binary too short".to_string();

        if header.u32().ok_or_else(truncated)? != BINARY_MAGIC {
            return Err("not a program binary".to_string());
        }
        let built_by = header.u32().ok_or_else(truncated)?;
        if built_by != driver_version {
            return Err(format!(
                "binary built by driver version {}, running {}",
                built_by, driver_version
            ));
        }
        let crc = header.u32().ok_or_else(truncated)?;
        let len = header.u32().ok_or_else(truncated)? as usize;

        let payload = header.rest();
        if payload.len() != len {
            return Err(format!("payload is {} bytes, header says {}", payload.len(), len));
        }
        if CRC_CALC.checksum(payload) != crc {
            return Err("checksum mismatch".to_string());
        }

        let corrupt = || "corrupt payload".to_string();
        let mut r = Reader::new(payload);
        let identity: [u8; IDENTITY_SIZE] = r
            .bytes(IDENTITY_SIZE)
            .and_then(|b| b.try_into().ok())
            .ok_or_else(corrupt)?;

        let count = r.u16().ok_or_else(corrupt)?;
        let mut attributes = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let index = r.u16().ok_or_else(corrupt)?;
            attributes.push((r.string().ok_or_else(corrupt)?, index));
        }

        let count = r.u16().ok_or_else(corrupt)?;
        let mut uniforms = Vec::with_capacity(count as usize);
        for _ in 0..count {
            uniforms.push(r.string().ok_or_else(corrupt)?);
        }

        if !r.rest().is_empty() {
            return Err(corrupt());
        }

        Ok(Self {
            identity,
            attributes,
            uniforms,
        })
    }
}

fn put_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn put_str(out: &mut Vec<u8>, s: &str) {
    put_u16(out, s.len() as u16);
    out.extend_from_slice(s.as_bytes());
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn bytes(&mut self, n: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(n)?;
        let slice = self.data.get(self.pos..end)?;
        self.pos = end;
        Some(slice)
    }

    fn u16(&mut self) -> Option<u16> {
        self.bytes(2).map(|b| u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Option<u32> {
        self.bytes(4).map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn string(&mut self) -> Option<String> {
        let len = self.u16()? as usize;
        let bytes = self.bytes(len)?;
        String::from_utf8(bytes.to_vec()).ok()
    }

    fn rest(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }
}
