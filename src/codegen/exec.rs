//! In-process execution of generated machine code
//!
//! The code is copied into a fresh anonymous mapping behind a small entry
//! trampoline, the mapping is switched from writable to executable, and the
//! entry point is called through the trampoline. Only available on x86-64
//! Linux; elsewhere [`execute`] reports [`ExecError::UnsupportedHost`].
//!
//! The trampoline saves `rbx` and `rbp`, stores the stack pointer in `rbx` and
//! calls the entry function. A normal return clears `rdx`; a trap stub (see
//! [`super::x86`]) restores the stack from `rbx` and returns with its trap
//! code in `rdx`, which is mapped to an [`ExecError`].

use super::image::RuntimeImage;
use super::x86::TRAP_DIVIDE_BY_ZERO;
use thiserror::Error;

/// ```text
/// push rbx; push rbp; mov rbx, rsp; sub rsp, 8; call rdi
/// xor edx, edx; mov rsp, rbx; pop rbp; pop rbx; ret
/// ```
const TRAMPOLINE: [u8; 19] = [
    0x53, 0x55, 0x48, 0x89, 0xE3, 0x48, 0x83, 0xEC, 0x08, 0xFF, 0xD7, //
    0x31, 0xD2, 0x48, 0x89, 0xDC, 0x5D, 0x5B, 0xC3,
];

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("native execution requires an x86-64 Linux host")]
    UnsupportedHost,

    #[error("entry point {entry:#x} is outside the {code_size}-byte code")]
    EntryOutOfRange { entry: usize, code_size: usize },

    #[error("division by zero in native code")]
    DivisionByZero,

    #[error("native code stopped with unknown trap code {code}")]
    UnknownTrap { code: u64 },

    #[error("{call} failed: {source}")]
    Os {
        call: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Whether [`execute`] can run code on this host
pub const fn native_execution_supported() -> bool {
    cfg!(all(target_arch = "x86_64", target_os = "linux"))
}

/// What the trampoline hands back: `rax` and `rdx`
#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct NativeReturn {
    value: i64,
    trap: u64,
}

impl NativeReturn {
    fn into_result(self) -> Result<i64, ExecError> {
        match self.trap {
            0 => Ok(self.value),
            code if code == u64::from(TRAP_DIVIDE_BY_ZERO) => Err(ExecError::DivisionByZero),
            code => Err(ExecError::UnknownTrap { code }),
        }
    }
}

/// Run the image's entry function and return what it left in `rax`.
///
/// A division by zero unwinds back here and is reported as
/// [`ExecError::DivisionByZero`].
///
/// # Safety
///
/// `image.code` is executed as it is. It must be code built by
/// [`super::compile_program`] or code keeping the same contract: the function
/// at `entry_point_offset` takes no arguments and returns in `rax`, every
/// function follows the System V calling convention, and `rbx` is only
/// touched by trap stubs.
pub unsafe fn execute(image: &RuntimeImage) -> Result<i64, ExecError> {
    let entry = image.entry_point_offset as usize;
    if entry >= image.code.len() {
        return Err(ExecError::EntryOutOfRange {
            entry,
            code_size: image.code.len(),
        });
    }
    run(&image.code, entry)?.into_result()
}

#[cfg(all(target_arch = "x86_64", target_os = "linux"))]
unsafe fn run(code: &[u8], entry: usize) -> Result<NativeReturn, ExecError> {
    let mut bytes = Vec::with_capacity(TRAMPOLINE.len() + code.len());
    bytes.extend_from_slice(&TRAMPOLINE);
    bytes.extend_from_slice(code);
    let memory = native::ExecutableMemory::new(&bytes)?;
    tracing::debug!(code_size = code.len(), entry, "executing native code");
    // SAFETY: the caller vouches for the code; the trampoline sits at the
    // start of the mapping and `entry` was checked to lie inside the code.
    Ok(unsafe { memory.call(TRAMPOLINE.len() + entry) })
}

#[cfg(not(all(target_arch = "x86_64", target_os = "linux")))]
unsafe fn run(_code: &[u8], _entry: usize) -> Result<NativeReturn, ExecError> {
    Err(ExecError::UnsupportedHost)
}

#[cfg(all(target_arch = "x86_64", target_os = "linux"))]
mod native {
    use super::{ExecError, NativeReturn};
    use std::ptr;

    fn os_error(call: &'static str) -> ExecError {
        ExecError::Os {
            call,
            source: std::io::Error::last_os_error(),
        }
    }

    /// An anonymous mapping, unmapped on drop
    pub(super) struct ExecutableMemory {
        ptr: *mut libc::c_void,
        len: usize,
    }

    impl ExecutableMemory {
        pub(super) fn new(code: &[u8]) -> Result<Self, ExecError> {
            let len = code.len().max(1);
            // SAFETY: a fresh private anonymous mapping aliases nothing
            let ptr = unsafe {
                libc::mmap(
                    ptr::null_mut(),
                    len,
                    libc::PROT_READ | libc::PROT_WRITE,
                    libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                    -1,
                    0,
                )
            };
            if ptr == libc::MAP_FAILED {
                return Err(os_error("mmap"));
            }
            let memory = ExecutableMemory { ptr, len };

            // SAFETY: the mapping is writable and at least `code.len()` bytes long
            unsafe { ptr::copy_nonoverlapping(code.as_ptr(), ptr.cast::<u8>(), code.len()) };
            // SAFETY: `ptr`/`len` describe the mapping created above
            if unsafe { libc::mprotect(ptr, len, libc::PROT_READ | libc::PROT_EXEC) } != 0 {
                return Err(os_error("mprotect"));
            }
            Ok(memory)
        }

        /// Call the trampoline at the start of the mapping with the function
        /// at `target` as its argument.
        ///
        /// # Safety
        ///
        /// The mapping must start with the entry trampoline and `target` must
        /// be the start of a System V function that takes no arguments,
        /// returns in `rax` and leaves `rbx` alone.
        pub(super) unsafe fn call(&self, target: usize) -> NativeReturn {
            let base = self.ptr.cast::<u8>();
            let trampoline: unsafe extern "C" fn(*const u8) -> NativeReturn = std::mem::transmute(base);
            trampoline(base.add(target))
        }
    }

    impl Drop for ExecutableMemory {
        fn drop(&mut self) {
            // SAFETY: unmapping the region this value owns
            unsafe {
                libc::munmap(self.ptr, self.len);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_outside_code_is_rejected() {
        let image = RuntimeImage {
            code: vec![0xC3],
            entry_point_offset: 4,
        };
        // SAFETY: rejected before any code runs
        let result = unsafe { execute(&image) };
        assert!(matches!(result, Err(ExecError::EntryOutOfRange { .. })));
    }

    #[test]
    fn test_trap_codes() {
        let ok = NativeReturn { value: -4, trap: 0 };
        assert_eq!(ok.into_result().unwrap(), -4);
        let divide = NativeReturn { value: 0, trap: 1 };
        assert!(matches!(divide.into_result(), Err(ExecError::DivisionByZero)));
        let other = NativeReturn { value: 0, trap: 9 };
        assert!(matches!(other.into_result(), Err(ExecError::UnknownTrap { code: 9 })));
    }

    #[cfg(all(target_arch = "x86_64", target_os = "linux"))]
    #[test]
    fn test_runs_hand_written_code() {
        // nop; mov rax, 7; ret
        let image = RuntimeImage {
            code: vec![0x90, 0x48, 0xC7, 0xC0, 7, 0, 0, 0, 0xC3],
            entry_point_offset: 1,
        };
        // SAFETY: a leaf function returning in rax
        assert_eq!(unsafe { execute(&image) }.unwrap(), 7);
    }

    #[cfg(all(target_arch = "x86_64", target_os = "linux"))]
    #[test]
    fn test_trap_unwinds_nested_frames() {
        use crate::codegen::buffer::CodeBuffer;

        // entry: prologue; call inner; (never returns here)
        // inner: prologue; push rax; push rax; jmp trap
        let mut buf = CodeBuffer::new();
        let frame = buf.prologue();
        buf.patch_i32(frame, 16);
        buf.call("inner").unwrap();
        buf.epilogue();
        buf.bind_label("inner").unwrap();
        let frame = buf.prologue();
        buf.patch_i32(frame, 32);
        buf.push_rax();
        buf.push_rax();
        buf.jmp("trap").unwrap();
        buf.bind_label("trap").unwrap();
        buf.trap_stub(TRAP_DIVIDE_BY_ZERO);
        let code = buf.finalize().unwrap().code;

        let image = RuntimeImage {
            code,
            entry_point_offset: 0,
        };
        // SAFETY: the trap stub restores the stack saved by the trampoline
        let result = unsafe { execute(&image) };
        assert!(matches!(result, Err(ExecError::DivisionByZero)), "got {:?}", result);
        // The caller's frame survived the unwind
        // SAFETY: as above
        assert!(matches!(unsafe { execute(&image) }, Err(ExecError::DivisionByZero)));
    }
}
