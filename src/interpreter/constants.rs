// Constants for the C interpreter

/// Starting address for heap allocations
/// Heap addresses start at 0x10000000 to clearly distinguish them from stack addresses
pub const HEAP_ADDRESS_START: u64 = 0x1000_0000;

/// Starting address for stack (and global) cells
/// Address 0 stays free so that it can act as the null pointer
pub const STACK_ADDRESS_START: u64 = 0x0000_0004;

/// Unaddressable cells between two heap blocks; overruns fault instead of
/// reaching the next block
pub const HEAP_GUARD_CELLS: u64 = 1;

/// Default number of heap cells a program may hold at once
pub const DEFAULT_MAX_HEAP_CELLS: usize = 1 << 22;

/// Default number of stack cells (globals included)
pub const DEFAULT_MAX_STACK_CELLS: usize = 1 << 20;

/// Default limit on nested calls
pub const DEFAULT_MAX_CALL_DEPTH: usize = 512;

/// Host stack reserved per interpreted call, covering the expression and
/// statement recursion inside one frame
pub const HOST_STACK_PER_CALL: usize = 256 << 10;
