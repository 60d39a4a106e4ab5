//! x86-64 instruction encodings used by the generator
//!
//! The generator works with two registers: `rax` holds the value of the
//! expression being evaluated and `rcx` the saved left operand of a binary
//! operation. `rdx` is only clobbered by division. Every instruction is
//! 64-bit (REX.W).
//!
//! `rbx` belongs to the executor: it holds the stack pointer to unwind to when
//! generated code traps. A trap stub restores that stack, pops the `rbp` and
//! `rbx` the executor saved there, leaves its trap code in `rdx` and returns
//! straight to the executor.

use super::buffer::CodeBuffer;
use super::errors::CodegenError;

/// Trap code for a zero divisor
pub const TRAP_DIVIDE_BY_ZERO: u32 = 1;

/// Condition codes, as the low nibble of `setcc`/`jcc`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cond {
    E = 0x4,
    Ne = 0x5,
    /// unsigned below
    B = 0x2,
    /// unsigned above or equal
    Ae = 0x3,
    /// unsigned below or equal
    Be = 0x6,
    /// unsigned above
    A = 0x7,
    L = 0xC,
    Ge = 0xD,
    Le = 0xE,
    G = 0xF,
}

impl CodeBuffer {
    /// `mov rax, imm`: sign-extended imm32 when it fits, `movabs` otherwise
    pub fn mov_rax_imm(&mut self, value: i64) {
        match i32::try_from(value) {
            Ok(small) => {
                self.emit(&[0x48, 0xC7, 0xC0]);
                self.emit_i32(small);
            }
            Err(_) => {
                self.emit(&[0x48, 0xB8]);
                self.emit_i64(value);
            }
        }
    }

    pub fn push_rax(&mut self) {
        self.emit(&[0x50]);
    }

    pub fn pop_rax(&mut self) {
        self.emit(&[0x58]);
    }

    pub fn pop_rcx(&mut self) {
        self.emit(&[0x59]);
    }

    /// `mov rax, [rbp + disp]`
    pub fn load_local(&mut self, disp: i32) {
        self.emit(&[0x48, 0x8B, 0x85]);
        self.emit_i32(disp);
    }

    /// `mov [rbp + disp], rax`
    pub fn store_local(&mut self, disp: i32) {
        self.emit(&[0x48, 0x89, 0x85]);
        self.emit_i32(disp);
    }

    /// `rax = rcx + rax`
    pub fn add_rcx(&mut self) {
        self.emit(&[0x48, 0x01, 0xC8]);
    }

    /// `rax = rcx - rax`
    pub fn sub_from_rcx(&mut self) {
        // sub rcx, rax; mov rax, rcx
        self.emit(&[0x48, 0x29, 0xC1, 0x48, 0x89, 0xC8]);
    }

    /// `rax = rcx * rax`
    pub fn imul_rcx(&mut self) {
        self.emit(&[0x48, 0x0F, 0xAF, 0xC1]);
    }

    /// `rax = rcx / rax` (signed); `rdx` receives the remainder
    pub fn idiv_rcx_by_rax(&mut self) {
        // xchg rax, rcx; cqo; idiv rcx
        self.emit(&[0x48, 0x91, 0x48, 0x99, 0x48, 0xF7, 0xF9]);
    }

    /// `rax = rcx % rax` (signed)
    pub fn irem_rcx_by_rax(&mut self) {
        self.idiv_rcx_by_rax();
        // mov rax, rdx
        self.emit(&[0x48, 0x89, 0xD0]);
    }

    pub fn and_rcx(&mut self) {
        self.emit(&[0x48, 0x21, 0xC8]);
    }

    pub fn or_rcx(&mut self) {
        self.emit(&[0x48, 0x09, 0xC8]);
    }

    pub fn xor_rcx(&mut self) {
        self.emit(&[0x48, 0x31, 0xC8]);
    }

    /// `rax = rcx << rax`
    pub fn shl_rcx_by_rax(&mut self) {
        // xchg rax, rcx; shl rax, cl
        self.emit(&[0x48, 0x91, 0x48, 0xD3, 0xE0]);
    }

    /// `rax = rcx >> rax` (arithmetic)
    pub fn sar_rcx_by_rax(&mut self) {
        // xchg rax, rcx; sar rax, cl
        self.emit(&[0x48, 0x91, 0x48, 0xD3, 0xF8]);
    }

    /// `rax = (rcx <cond> rax) as 0/1`
    pub fn compare_rcx_rax(&mut self, cond: Cond) {
        // cmp rcx, rax; setcc al; movzx rax, al
        self.emit(&[0x48, 0x39, 0xC1, 0x0F, 0x90 | cond as u8, 0xC0, 0x48, 0x0F, 0xB6, 0xC0]);
    }

    /// `rax = (rax <cond> 0) as 0/1`
    pub fn test_rax_set(&mut self, cond: Cond) {
        // test rax, rax; setcc al; movzx rax, al
        self.emit(&[0x48, 0x85, 0xC0, 0x0F, 0x90 | cond as u8, 0xC0, 0x48, 0x0F, 0xB6, 0xC0]);
    }

    pub fn test_rax(&mut self) {
        self.emit(&[0x48, 0x85, 0xC0]);
    }

    /// `cmp rax, imm8`
    pub fn cmp_rax_imm8(&mut self, value: i8) {
        self.emit(&[0x48, 0x83, 0xF8, value as u8]);
    }

    pub fn mov_rax_rcx(&mut self) {
        self.emit(&[0x48, 0x89, 0xC8]);
    }

    pub fn zero_rax(&mut self) {
        self.emit(&[0x31, 0xC0]);
    }

    /// Unwind to the executor with `code` in `rdx`:
    /// `mov rsp, rbx; mov edx, code; xor eax, eax; pop rbp; pop rbx; ret`
    pub fn trap_stub(&mut self, code: u32) {
        self.emit(&[0x48, 0x89, 0xDC, 0xBA]);
        self.emit(&code.to_le_bytes());
        self.emit(&[0x31, 0xC0, 0x5D, 0x5B, 0xC3]);
    }

    pub fn neg_rax(&mut self) {
        self.emit(&[0x48, 0xF7, 0xD8]);
    }

    pub fn not_rax(&mut self) {
        self.emit(&[0x48, 0xF7, 0xD0]);
    }

    /// Sign-extend the low 32 bits of `rax` (`movsxd rax, eax`)
    pub fn sign_extend_eax(&mut self) {
        self.emit(&[0x48, 0x63, 0xC0]);
    }

    /// `jmp rel32`
    pub fn jmp(&mut self, label: &str) -> Result<(), CodegenError> {
        self.emit(&[0xE9]);
        self.emit_rel32(label)
    }

    /// `jcc rel32`
    pub fn jcc(&mut self, cond: Cond, label: &str) -> Result<(), CodegenError> {
        self.emit(&[0x0F, 0x80 | cond as u8]);
        self.emit_rel32(label)
    }

    /// `call rel32`
    pub fn call(&mut self, label: &str) -> Result<(), CodegenError> {
        self.emit(&[0xE8]);
        self.emit_rel32(label)
    }

    /// `push rbp; mov rbp, rsp; sub rsp, imm32`.
    /// Returns the offset of the frame-size immediate for later patching.
    pub fn prologue(&mut self) -> usize {
        self.emit(&[0x55, 0x48, 0x89, 0xE5, 0x48, 0x81, 0xEC]);
        let at = self.position();
        self.emit_i32(0);
        at
    }

    /// `mov rsp, rbp; pop rbp; ret`
    pub fn epilogue(&mut self) {
        self.emit(&[0x48, 0x89, 0xEC, 0x5D, 0xC3]);
    }

    /// `add rsp, imm32`
    pub fn add_rsp(&mut self, bytes: i32) {
        self.emit(&[0x48, 0x81, 0xC4]);
        self.emit_i32(bytes);
    }
}
