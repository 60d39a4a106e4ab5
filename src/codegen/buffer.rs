//! Growable machine-code buffer with labels and relocation fixups
//!
//! Jumps and calls are emitted with a zero `rel32` placeholder and a fixup
//! entry. A reference to a label that is already bound (a backward jump) is
//! patched on the spot; forward references are patched by [`CodeBuffer::finalize`],
//! which consumes the buffer. In both cases the displacement is
//! `target - (fixup_offset + 4)`, the distance from the end of the
//! displacement field, which is also the end of the instruction.

use super::errors::CodegenError;
use rustc_hash::FxHashMap;

/// Bytes per stack slot
pub const SLOT_SIZE: i32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixupKind {
    /// Target was bound when the reference was emitted
    Backward,
    /// Target is bound later; patched during finalization
    Forward,
}

/// A `rel32` field waiting for (or already given) its displacement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fixup {
    /// Byte offset of the 4-byte displacement field
    pub offset: usize,
    pub kind: FixupKind,
    pub label: String,
}

/// Result of finalization: code with every displacement in place
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assembled {
    pub code: Vec<u8>,
    pub labels: FxHashMap<String, usize>,
    pub fixups: Vec<Fixup>,
}

#[derive(Debug, Default)]
pub struct CodeBuffer {
    code: Vec<u8>,
    labels: FxHashMap<String, usize>,
    fixups: Vec<Fixup>,
    /// Frame slot of every local of the current function (offset from `rbp`)
    locals: FxHashMap<String, i32>,
    next_slot: i32,
    label_index: u64,
}

impl CodeBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current end of the code, where the next byte goes
    pub fn position(&self) -> usize {
        self.code.len()
    }

    pub fn code(&self) -> &[u8] {
        &self.code
    }

    pub fn emit(&mut self, bytes: &[u8]) {
        self.code.extend_from_slice(bytes);
    }

    pub fn emit_i32(&mut self, value: i32) {
        self.code.extend_from_slice(&value.to_le_bytes());
    }

    pub fn emit_i64(&mut self, value: i64) {
        self.code.extend_from_slice(&value.to_le_bytes());
    }

    /// Overwrite the 4 bytes at `offset`
    pub fn patch_i32(&mut self, offset: usize, value: i32) {
        self.code[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Generate a unique label for jump targets.
    pub fn gen_label(&mut self, prefix: &str) -> String {
        self.label_index += 1;
        format!("{}_{}", prefix, self.label_index)
    }

    pub fn label_position(&self, label: &str) -> Option<usize> {
        self.labels.get(label).copied()
    }

    /// Bind `label` to the current position
    pub fn bind_label(&mut self, label: &str) -> Result<(), CodegenError> {
        if self.labels.contains_key(label) {
            return Err(CodegenError::DuplicateLabel {
                label: label.to_string(),
            });
        }
        tracing::trace!(label, offset = self.code.len(), "bound label");
        self.labels.insert(label.to_string(), self.code.len());
        Ok(())
    }

    /// Emit a `rel32` displacement to `label` and record the fixup
    pub fn emit_rel32(&mut self, label: &str) -> Result<(), CodegenError> {
        let offset = self.code.len();
        self.emit_i32(0);
        match self.labels.get(label).copied() {
            Some(target) => {
                let disp = Self::displacement(offset, target, label)?;
                self.patch_i32(offset, disp);
                self.fixups.push(Fixup {
                    offset,
                    kind: FixupKind::Backward,
                    label: label.to_string(),
                });
            }
            None => self.fixups.push(Fixup {
                offset,
                kind: FixupKind::Forward,
                label: label.to_string(),
            }),
        }
        Ok(())
    }

    fn displacement(offset: usize, target: usize, label: &str) -> Result<i32, CodegenError> {
        let disp = target as i64 - (offset as i64 + 4);
        i32::try_from(disp).map_err(|_| CodegenError::DisplacementOverflow {
            label: label.to_string(),
        })
    }

    pub fn fixups(&self) -> &[Fixup] {
        &self.fixups
    }

    /// Slot of a local, allocated on first reference
    pub fn local_offset(&mut self, name: &str) -> i32 {
        if let Some(&offset) = self.locals.get(name) {
            return offset;
        }
        self.next_slot += 1;
        let offset = -self.next_slot * SLOT_SIZE;
        self.locals.insert(name.to_string(), offset);
        offset
    }

    /// Start a new function: forget the previous locals.
    /// Returns the frame size the previous function needed, rounded up to 16.
    pub fn reset_locals(&mut self) -> i32 {
        let frame = self.frame_size();
        self.locals.clear();
        self.next_slot = 0;
        frame
    }

    /// Bytes of stack the current function's locals occupy, 16-byte aligned
    pub fn frame_size(&self) -> i32 {
        (self.next_slot * SLOT_SIZE + 15) & !15
    }

    /// Resolve every forward reference. Fails if a referenced label was never bound.
    pub fn finalize(mut self) -> Result<Assembled, CodegenError> {
        let pending: Vec<(usize, String)> = self
            .fixups
            .iter()
            .filter(|f| f.kind == FixupKind::Forward)
            .map(|f| (f.offset, f.label.clone()))
            .collect();

        for (offset, label) in &pending {
            let target = self
                .labels
                .get(label)
                .copied()
                .ok_or_else(|| CodegenError::UnboundLabel { label: label.clone() })?;
            let disp = Self::displacement(*offset, target, label)?;
            self.patch_i32(*offset, disp);
            tracing::trace!(label = %label, offset, disp, "patched forward reference");
        }

        tracing::debug!(
            code_size = self.code.len(),
            fixups = self.fixups.len(),
            forward = pending.len(),
            "finalized code buffer"
        );
        Ok(Assembled {
            code: self.code,
            labels: self.labels,
            fixups: self.fixups,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_i32(code: &[u8], at: usize) -> i32 {
        i32::from_le_bytes([code[at], code[at + 1], code[at + 2], code[at + 3]])
    }

    #[test]
    fn test_forward_reference_is_patched_on_finalize() {
        let mut buf = CodeBuffer::new();
        buf.emit(&[0xE9]);
        buf.emit_rel32("exit").unwrap();
        assert_eq!(&buf.code()[1..5], &[0, 0, 0, 0]);
        buf.emit(&[0x90, 0x90, 0x90]);
        buf.bind_label("exit").unwrap();
        assert_eq!(buf.label_position("exit"), Some(8));

        let out = buf.finalize().unwrap();
        assert_eq!(read_i32(&out.code, 1), 3);
        assert_eq!(out.fixups[0].kind, FixupKind::Forward);
    }

    #[test]
    fn test_backward_reference_is_patched_immediately() {
        let mut buf = CodeBuffer::new();
        buf.bind_label("top").unwrap();
        buf.emit(&[0x90, 0x90]);
        buf.emit(&[0xE9]);
        buf.emit_rel32("top").unwrap();
        // 0 - (3 + 4)
        assert_eq!(read_i32(buf.code(), 3), -7);
        assert_eq!(buf.fixups()[0].kind, FixupKind::Backward);
    }

    #[test]
    fn test_unbound_and_duplicate_labels() {
        let mut buf = CodeBuffer::new();
        buf.emit(&[0xE8]);
        buf.emit_rel32("nowhere").unwrap();
        assert_eq!(
            buf.finalize().unwrap_err(),
            CodegenError::UnboundLabel {
                label: "nowhere".to_string()
            }
        );

        let mut buf = CodeBuffer::new();
        buf.bind_label("a").unwrap();
        assert!(matches!(buf.bind_label("a"), Err(CodegenError::DuplicateLabel { .. })));
    }

    #[test]
    fn test_local_slots_are_lazy_and_stable() {
        let mut buf = CodeBuffer::new();
        assert_eq!(buf.local_offset("x"), -8);
        assert_eq!(buf.local_offset("y"), -16);
        assert_eq!(buf.local_offset("x"), -8);
        assert_eq!(buf.local_offset("z"), -24);
        assert_eq!(buf.frame_size(), 32);
        assert_eq!(buf.reset_locals(), 32);
        assert_eq!(buf.local_offset("y"), -8);
        assert_eq!(buf.frame_size(), 16);
    }

    #[test]
    fn test_gen_label_is_unique() {
        let mut buf = CodeBuffer::new();
        let a = buf.gen_label("else");
        let b = buf.gen_label("else");
        assert_ne!(a, b);
        assert!(a.starts_with("else_"));
    }
}
