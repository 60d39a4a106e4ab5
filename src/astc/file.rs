//! ASTC module container
//!
//! ```text
//! offset  size  field
//! 0       4     magic "ASTC"
//! 4       4     version (1)
//! 8       4     payload_size
//! 12      4     entry_point (payload offset of the entry function, or 0xFFFF_FFFF)
//! 16      ..    serialized translation unit
//! ```

use super::errors::SerializationError;
use super::reader::{deserialize, AstReader};
use super::tags::FUNCTION_DECL;
use super::writer::AstWriter;
use crate::parser::ast::{AstNode, NodeKind};
use crate::stage;
use std::io::Write;
use std::path::Path;

pub const ASTC_MAGIC: [u8; 4] = *b"ASTC";
pub const ASTC_VERSION: u32 = 1;
pub const HEADER_SIZE: usize = 16;
/// `entry_point` value of a module without an entry function
pub const NO_ENTRY_POINT: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AstcHeader {
    pub version: u32,
    pub payload_size: u32,
    pub entry_point: u32,
}

impl AstcHeader {
    pub fn has_entry_point(&self) -> bool {
        self.entry_point != NO_ENTRY_POINT
    }

    fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..4].copy_from_slice(&ASTC_MAGIC);
        out[4..8].copy_from_slice(&self.version.to_le_bytes());
        out[8..12].copy_from_slice(&self.payload_size.to_le_bytes());
        out[12..16].copy_from_slice(&self.entry_point.to_le_bytes());
        out
    }
}

/// A decoded module: header plus translation unit
#[derive(Debug, Clone, PartialEq)]
pub struct AstcModule {
    pub header: AstcHeader,
    pub unit: AstNode,
    /// Name of the function `header.entry_point` refers to
    pub entry: Option<String>,
}

/// Encode `unit` as a complete ASTC file image with `entry` as entry function
pub fn encode_module(unit: &AstNode, entry: &str) -> Result<Vec<u8>, SerializationError> {
    build_module(unit, entry).map(|(_, bytes)| bytes)
}

fn build_module(unit: &AstNode, entry: &str) -> Result<(AstcHeader, Vec<u8>), SerializationError> {
    stage::run_staged(|| write_module(unit, entry))?
}

fn write_module(unit: &AstNode, entry: &str) -> Result<(AstcHeader, Vec<u8>), SerializationError> {
    let mut writer = AstWriter::new();
    writer.write_node(unit)?;
    let entry_point = writer.function_offset(entry).unwrap_or(NO_ENTRY_POINT);
    let payload = writer.into_bytes();
    let payload_size = u32::try_from(payload.len()).map_err(|_| SerializationError::LengthOverflow {
        what: "payload",
        len: payload.len(),
    })?;

    let header = AstcHeader {
        version: ASTC_VERSION,
        payload_size,
        entry_point,
    };
    let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
    out.extend_from_slice(&header.encode());
    out.extend_from_slice(&payload);
    tracing::debug!(payload_size, entry_point, "encoded ASTC module");
    Ok((header, out))
}

/// Validate the header of an ASTC image and decode its payload
pub fn decode_module(bytes: &[u8]) -> Result<AstcModule, SerializationError> {
    stage::run_staged(|| read_module(bytes))?
}

fn read_module(bytes: &[u8]) -> Result<AstcModule, SerializationError> {
    if bytes.len() < HEADER_SIZE {
        return Err(SerializationError::UnexpectedEof {
            offset: bytes.len(),
            needed: HEADER_SIZE - bytes.len(),
        });
    }
    let word = |at: usize| u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);

    let mut magic = [0u8; 4];
    magic.copy_from_slice(&bytes[0..4]);
    if magic != ASTC_MAGIC {
        return Err(SerializationError::BadMagic {
            expected: ASTC_MAGIC,
            found: magic,
        });
    }
    let header = AstcHeader {
        version: word(4),
        payload_size: word(8),
        entry_point: word(12),
    };
    if header.version != ASTC_VERSION {
        return Err(SerializationError::UnsupportedVersion {
            expected: ASTC_VERSION,
            found: header.version,
        });
    }

    let payload = &bytes[HEADER_SIZE..];
    if payload.len() != header.payload_size as usize {
        return Err(SerializationError::PayloadSizeMismatch {
            declared: header.payload_size,
            actual: payload.len(),
        });
    }

    let mut entry = None;
    if header.has_entry_point() {
        let offset = header.entry_point as usize;
        let invalid = SerializationError::InvalidEntryPoint {
            entry: header.entry_point,
        };
        let tag = AstReader::at(payload, offset).u16().ok();
        if tag != Some(FUNCTION_DECL) {
            return Err(invalid);
        }
        match AstReader::at(payload, offset).read_node().map(|node| node.kind) {
            Ok(NodeKind::FunctionDecl { name, .. }) => entry = Some(name),
            _ => return Err(invalid),
        }
    }

    let unit = deserialize(payload)?;
    Ok(AstcModule { header, unit, entry })
}

/// Replace the file at `path` with `bytes` via a temporary file in the same directory
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    file.write_all(bytes)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Write `unit` to `path` as an ASTC module whose entry point is `main`
pub fn save_astc(path: &Path, unit: &AstNode) -> Result<AstcHeader, SerializationError> {
    save_astc_with_entry(path, unit, "main")
}

pub fn save_astc_with_entry(
    path: &Path,
    unit: &AstNode,
    entry: &str,
) -> Result<AstcHeader, SerializationError> {
    let (header, bytes) = build_module(unit, entry)?;
    write_atomic(path, &bytes)?;
    tracing::debug!(path = %path.display(), "wrote ASTC module");
    Ok(header)
}

/// Read and validate an ASTC module
pub fn load_astc(path: &Path) -> Result<AstcModule, SerializationError> {
    let bytes = std::fs::read(path)?;
    decode_module(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse::parse_source;

    fn sample() -> AstNode {
        parse_source("int helper(void); int main() { return 42; } int helper(void) { return 1; }", "m.c").unwrap()
    }

    #[test]
    fn test_header_fields() {
        let bytes = encode_module(&sample(), "main").unwrap();
        assert_eq!(&bytes[0..4], b"ASTC");
        assert_eq!(u32::from_le_bytes(bytes[4..8].try_into().unwrap()), 1);
        let payload_size = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
        assert_eq!(payload_size as usize, bytes.len() - HEADER_SIZE);

        let module = decode_module(&bytes).unwrap();
        assert!(module.header.has_entry_point());
        let entry = module.header.entry_point as usize;
        // The entry point addresses main's definition, not the prototype of helper
        assert_eq!(&bytes[HEADER_SIZE + entry..HEADER_SIZE + entry + 2], &FUNCTION_DECL.to_le_bytes());
        assert!(entry > 0);
        assert_eq!(module.entry.as_deref(), Some("main"));
        assert_eq!(module.unit, sample());
    }

    #[test]
    fn test_missing_entry_function() {
        let unit = parse_source("int helper(void) { return 1; }", "m.c").unwrap();
        let module = decode_module(&encode_module(&unit, "main").unwrap()).unwrap();
        assert_eq!(module.header.entry_point, NO_ENTRY_POINT);
        assert_eq!(module.entry, None);
    }

    #[test]
    fn test_header_validation() {
        let good = encode_module(&sample(), "main").unwrap();

        let mut bad_magic = good.clone();
        bad_magic[0] = b'X';
        assert!(matches!(decode_module(&bad_magic), Err(SerializationError::BadMagic { .. })));

        let mut bad_version = good.clone();
        bad_version[4] = 9;
        assert!(matches!(
            decode_module(&bad_version),
            Err(SerializationError::UnsupportedVersion { found: 9, .. })
        ));

        let truncated = &good[..good.len() - 3];
        assert!(matches!(
            decode_module(truncated),
            Err(SerializationError::PayloadSizeMismatch { .. })
        ));

        let mut bad_entry = good.clone();
        bad_entry[12..16].copy_from_slice(&1u32.to_le_bytes());
        assert!(matches!(
            decode_module(&bad_entry),
            Err(SerializationError::InvalidEntryPoint { entry: 1 })
        ));

        assert!(matches!(
            decode_module(&good[..5]),
            Err(SerializationError::UnexpectedEof { .. })
        ));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prog.astc");
        let header = save_astc(&path, &sample()).unwrap();
        let module = load_astc(&path).unwrap();
        assert_eq!(module.header, header);
        assert_eq!(module.unit, sample());
    }
}
