//! Host stack for the recursive stages
//!
//! The parser, the ASTC reader and writer, the interpreter and the code
//! generator all recurse once per nesting level of the tree they walk. Their
//! depth limits are sized for [`STAGE_STACK_SIZE`], so every public entry
//! point runs its work through [`run_on_stage_stack`]. Nested calls reuse the
//! thread they are already on.

use std::cell::Cell;
use std::io;
use std::thread;

/// Stack reserved for a stage thread
pub const STAGE_STACK_SIZE: usize = 256 << 20;

thread_local! {
    static ON_STAGE_STACK: Cell<bool> = const { Cell::new(false) };
}

/// True on a thread started by [`run_on_stage_stack`]
pub fn on_stage_stack() -> bool {
    ON_STAGE_STACK.with(Cell::get)
}

/// Run `f` on a thread with at least `stack_size` bytes of stack and wait for it.
///
/// The caller's thread is used directly when it is already a stage thread. A
/// panic in `f` is resumed on the caller. Fails only if the thread cannot be
/// started.
pub fn run_on_stage_stack<T, F>(stack_size: usize, f: F) -> io::Result<T>
where
    F: FnOnce() -> T + Send,
    T: Send,
{
    if on_stage_stack() {
        return Ok(f());
    }

    thread::scope(|scope| {
        let handle = thread::Builder::new()
            .name("astcc-stage".to_string())
            .stack_size(stack_size.max(STAGE_STACK_SIZE))
            .spawn_scoped(scope, move || {
                ON_STAGE_STACK.with(|flag| flag.set(true));
                f()
            })?;
        match handle.join() {
            Ok(value) => Ok(value),
            Err(payload) => std::panic::resume_unwind(payload),
        }
    })
}

/// [`run_on_stage_stack`] with the default size
pub fn run_staged<T, F>(f: F) -> io::Result<T>
where
    F: FnOnce() -> T + Send,
    T: Send,
{
    run_on_stage_stack(STAGE_STACK_SIZE, f)
}
