//! RTME runtime image container
//!
//! ```text
//! offset  size  field
//! 0       4     magic "RTME"
//! 4       4     version (1)
//! 8       4     code_size
//! 12      4     entry_point_offset
//! 16      ..    machine code
//! ```

use super::generator::CompiledProgram;
use crate::astc::file::write_atomic;
use std::path::Path;
use thiserror::Error;

pub const RTME_MAGIC: [u8; 4] = *b"RTME";
pub const RTME_VERSION: u32 = 1;
pub const RTME_HEADER_SIZE: usize = 16;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("image is {len} byte(s), shorter than the 16-byte header")]
    Truncated { len: usize },

    #[error("bad magic {found:?} (expected \"RTME\")")]
    BadMagic { found: [u8; 4] },

    #[error("unsupported image version {found} (expected 1)")]
    UnsupportedVersion { found: u32 },

    #[error("code size mismatch: header says {declared} byte(s), {actual} available")]
    CodeSizeMismatch { declared: u32, actual: usize },

    #[error("entry point {entry:#x} is outside the {code_size}-byte code")]
    EntryOutOfRange { entry: u32, code_size: u32 },

    #[error("code of {len} byte(s) does not fit the image format")]
    TooLarge { len: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Machine code plus the offset execution starts at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeImage {
    pub code: Vec<u8>,
    pub entry_point_offset: u32,
}

impl RuntimeImage {
    pub fn from_program(program: &CompiledProgram) -> Result<Self, ImageError> {
        let too_large = || ImageError::TooLarge {
            len: program.code.len(),
        };
        u32::try_from(program.code.len()).map_err(|_| too_large())?;
        Ok(RuntimeImage {
            code: program.code.clone(),
            entry_point_offset: u32::try_from(program.entry_offset).map_err(|_| too_large())?,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(RTME_HEADER_SIZE + self.code.len());
        out.extend_from_slice(&RTME_MAGIC);
        out.extend_from_slice(&RTME_VERSION.to_le_bytes());
        out.extend_from_slice(&(self.code.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.entry_point_offset.to_le_bytes());
        out.extend_from_slice(&self.code);
        out
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, ImageError> {
        if bytes.len() < RTME_HEADER_SIZE {
            return Err(ImageError::Truncated { len: bytes.len() });
        }
        let word = |at: usize| u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);

        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[0..4]);
        if magic != RTME_MAGIC {
            return Err(ImageError::BadMagic { found: magic });
        }
        let version = word(4);
        if version != RTME_VERSION {
            return Err(ImageError::UnsupportedVersion { found: version });
        }
        let code_size = word(8);
        let entry = word(12);
        let code = &bytes[RTME_HEADER_SIZE..];
        if code.len() != code_size as usize {
            return Err(ImageError::CodeSizeMismatch {
                declared: code_size,
                actual: code.len(),
            });
        }
        if entry >= code_size {
            return Err(ImageError::EntryOutOfRange { entry, code_size });
        }
        Ok(RuntimeImage {
            code: code.to_vec(),
            entry_point_offset: entry,
        })
    }

    /// Write the image to `path` atomically
    pub fn save(&self, path: &Path) -> Result<(), ImageError> {
        write_atomic(path, &self.to_bytes())?;
        tracing::debug!(path = %path.display(), code_size = self.code.len(), "wrote runtime image");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, ImageError> {
        Self::parse(&std::fs::read(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn image() -> RuntimeImage {
        let program = CompiledProgram {
            code: vec![0x90, 0x48, 0xC7, 0xC0, 7, 0, 0, 0, 0xC3],
            entry_offset: 1,
            symbols: BTreeMap::from([("main".to_string(), 1)]),
        };
        RuntimeImage::from_program(&program).unwrap()
    }

    #[test]
    fn test_header_layout() {
        let bytes = image().to_bytes();
        assert_eq!(&bytes[0..4], b"RTME");
        assert_eq!(&bytes[4..8], &1u32.to_le_bytes());
        assert_eq!(&bytes[8..12], &9u32.to_le_bytes());
        assert_eq!(&bytes[12..16], &1u32.to_le_bytes());
        assert_eq!(RuntimeImage::parse(&bytes).unwrap(), image());
    }

    #[test]
    fn test_rejects_malformed_images() {
        let bytes = image().to_bytes();
        assert!(matches!(RuntimeImage::parse(&bytes[..10]), Err(ImageError::Truncated { .. })));

        let mut bad = bytes.clone();
        bad[0] = b'X';
        assert!(matches!(RuntimeImage::parse(&bad), Err(ImageError::BadMagic { .. })));

        let mut bad = bytes.clone();
        bad[4] = 2;
        assert!(matches!(RuntimeImage::parse(&bad), Err(ImageError::UnsupportedVersion { found: 2 })));

        assert!(matches!(
            RuntimeImage::parse(&bytes[..bytes.len() - 1]),
            Err(ImageError::CodeSizeMismatch { .. })
        ));

        let mut bad = bytes;
        bad[12] = 40;
        assert!(matches!(RuntimeImage::parse(&bad), Err(ImageError::EntryOutOfRange { .. })));
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prog.bin");
        image().save(&path).unwrap();
        assert_eq!(RuntimeImage::load(&path).unwrap(), image());
    }
}
