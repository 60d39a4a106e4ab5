//! Memory model for the interpreter
//!
//! This module provides the core memory abstractions:
//! - [`value`]: Runtime value representation (Int, Float, Pointer)
//! - [`stack`]: Globals and call frames with block scopes
//! - [`heap`]: Heap allocation with malloc/free and tombstone tracking
//! - [`layout`]: Type sizes, record layouts and typedef resolution
//!
//! # Addressing
//!
//! Memory is a flat space of cells, one [`value::Value`] per cell:
//!
//! ```text
//! 0                      null (never mapped)
//! STACK_ADDRESS_START..  globals, then frames
//! HEAP_ADDRESS_START..   heap blocks separated by guard cells
//! ```
//!
//! [`Memory`] dispatches each access to the region owning the address.

pub mod heap;
pub mod layout;
pub mod stack;
pub mod value;

use crate::interpreter::constants::HEAP_ADDRESS_START;
use heap::Heap;
use stack::Stack;
use thiserror::Error;
use value::{Address, Value};

/// Faults raised by the memory regions
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    #[error("null pointer dereference")]
    NullDereference,

    #[error("invalid address 0x{address:x}")]
    InvalidAddress { address: Address },

    #[error("address 0x{address:x} is outside the {size}-cell block at 0x{block:x}")]
    OutOfBounds {
        address: Address,
        block: Address,
        size: usize,
    },

    #[error("use after free at 0x{address:x}")]
    UseAfterFree { address: Address },

    #[error("double free of 0x{address:x}")]
    DoubleFree { address: Address },

    #[error("free of 0x{address:x}, which is not the start of a heap block")]
    InvalidFree { address: Address },

    #[error("out of heap memory: requested {requested} cells, limit is {limit}")]
    OutOfMemory { requested: usize, limit: usize },

    #[error("stack exhausted: requested {requested} cells, limit is {limit}")]
    StackExhausted { requested: usize, limit: usize },
}

/// Stack and heap behind one address space
#[derive(Debug, Clone)]
pub struct Memory {
    pub stack: Stack,
    pub heap: Heap,
}

impl Memory {
    pub fn new(max_stack_cells: usize, max_heap_cells: usize) -> Self {
        Memory {
            stack: Stack::new(max_stack_cells),
            heap: Heap::new(max_heap_cells),
        }
    }

    pub fn is_heap_address(addr: Address) -> bool {
        addr >= HEAP_ADDRESS_START
    }

    pub fn read(&self, addr: Address) -> Result<Value, MemoryError> {
        if addr == 0 {
            Err(MemoryError::NullDereference)
        } else if Self::is_heap_address(addr) {
            self.heap.read(addr)
        } else {
            self.stack.read(addr)
        }
    }

    pub fn write(&mut self, addr: Address, value: Value) -> Result<(), MemoryError> {
        if addr == 0 {
            Err(MemoryError::NullDereference)
        } else if Self::is_heap_address(addr) {
            self.heap.write(addr, value)
        } else {
            self.stack.write(addr, value)
        }
    }

    /// Copy `count` cells from `src` to `dst`; the ranges may overlap
    pub fn copy(&mut self, dst: Address, src: Address, count: usize) -> Result<(), MemoryError> {
        let cells = (0..count as Address)
            .map(|i| self.read(src + i))
            .collect::<Result<Vec<_>, _>>()?;
        for (i, cell) in cells.into_iter().enumerate() {
            self.write(dst + i as Address, cell)?;
        }
        Ok(())
    }

    /// Fill `count` cells starting at `addr` with `value`
    pub fn fill(&mut self, addr: Address, count: usize, value: Value) -> Result<(), MemoryError> {
        (0..count as Address).try_for_each(|i| self.write(addr + i, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_by_address() {
        let mut memory = Memory::new(16, 16);
        let local = memory.stack.allocate(2).unwrap();
        let block = memory.heap.allocate(2, Value::Int(0)).unwrap();

        memory.write(local, Value::Int(1)).unwrap();
        memory.write(block + 1, Value::Float(2.5)).unwrap();
        assert_eq!(memory.read(local).unwrap(), Value::Int(1));
        assert_eq!(memory.read(block + 1).unwrap(), Value::Float(2.5));
        assert_eq!(memory.read(0), Err(MemoryError::NullDereference));
    }

    #[test]
    fn test_copy_between_regions() {
        let mut memory = Memory::new(16, 16);
        let local = memory.stack.allocate(3).unwrap();
        memory.fill(local, 3, Value::Int(4)).unwrap();
        let block = memory.heap.allocate(3, Value::Uninitialized).unwrap();

        memory.copy(block, local, 3).unwrap();
        assert_eq!(memory.read(block + 2).unwrap(), Value::Int(4));
        assert!(memory.copy(block, local, 4).is_err());
    }
}
