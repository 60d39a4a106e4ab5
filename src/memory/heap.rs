//! Heap implementation for the interpreter
//!
//! This module provides heap memory management with:
//! - Explicit allocation/deallocation (malloc/free)
//! - Tombstone tracking for freed blocks
//! - Use-after-free and double-free detection
//!
//! Blocks are cell arrays addressed from [`HEAP_ADDRESS_START`] upwards, with
//! [`HEAP_GUARD_CELLS`] unaddressable cells between consecutive blocks.
//! Addresses are never reused, so a stale pointer always hits its tombstone.

use super::value::{Address, Value};
use super::MemoryError;
use crate::interpreter::constants::{HEAP_ADDRESS_START, HEAP_GUARD_CELLS};
use std::collections::BTreeMap;

/// State of a heap block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    Allocated,
    Tombstone, // Freed; kept so later accesses can be diagnosed
}

/// A block of heap memory
#[derive(Debug, Clone)]
pub struct HeapBlock {
    pub cells: Vec<Value>,
    pub state: BlockState,
}

impl HeapBlock {
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// The heap
#[derive(Debug, Clone)]
pub struct Heap {
    blocks: BTreeMap<Address, HeapBlock>,
    next_address: Address,
    live_cells: usize,
    max_cells: usize,
}

impl Heap {
    /// Create a new heap with a maximum size limit (in cells)
    pub fn new(max_cells: usize) -> Self {
        Heap {
            blocks: BTreeMap::new(),
            next_address: HEAP_ADDRESS_START,
            live_cells: 0,
            max_cells,
        }
    }

    /// Allocate a block of `count` cells, each set to `fill`.
    /// A zero-sized request still yields a distinct one-cell block.
    pub fn allocate(&mut self, count: usize, fill: Value) -> Result<Address, MemoryError> {
        let count = count.max(1);
        if self
            .live_cells
            .checked_add(count)
            .map_or(true, |total| total > self.max_cells)
        {
            return Err(MemoryError::OutOfMemory {
                requested: count,
                limit: self.max_cells,
            });
        }

        let addr = self.next_address;
        self.next_address += count as Address + HEAP_GUARD_CELLS;
        self.blocks.insert(
            addr,
            HeapBlock {
                cells: vec![fill; count],
                state: BlockState::Allocated,
            },
        );
        self.live_cells += count;
        tracing::trace!(address = addr, cells = count, "heap allocate");
        Ok(addr)
    }

    /// Free a block of memory (mark as tombstone)
    pub fn free(&mut self, addr: Address) -> Result<(), MemoryError> {
        match self.blocks.get_mut(&addr) {
            Some(block) if block.state == BlockState::Allocated => {
                block.state = BlockState::Tombstone;
                self.live_cells -= block.cells.len();
                tracing::trace!(address = addr, "heap free");
                Ok(())
            }
            Some(_) => Err(MemoryError::DoubleFree { address: addr }),
            None => Err(MemoryError::InvalidFree { address: addr }),
        }
    }

    /// Locate the block containing `addr` and the offset inside it
    fn locate(&self, addr: Address) -> Result<(Address, usize), MemoryError> {
        let (&start, block) = self
            .blocks
            .range(..=addr)
            .next_back()
            .ok_or(MemoryError::InvalidAddress { address: addr })?;
        let offset = (addr - start) as usize;
        if offset >= block.cells.len() {
            return Err(MemoryError::OutOfBounds {
                address: addr,
                block: start,
                size: block.cells.len(),
            });
        }
        if block.state == BlockState::Tombstone {
            return Err(MemoryError::UseAfterFree { address: addr });
        }
        Ok((start, offset))
    }

    pub fn read(&self, addr: Address) -> Result<Value, MemoryError> {
        let (start, offset) = self.locate(addr)?;
        Ok(self.blocks[&start].cells[offset])
    }

    pub fn write(&mut self, addr: Address, value: Value) -> Result<(), MemoryError> {
        let (start, offset) = self.locate(addr)?;
        if let Some(block) = self.blocks.get_mut(&start) {
            block.cells[offset] = value;
        }
        Ok(())
    }

    /// Get a live heap block by its start address
    pub fn get_block(&self, addr: Address) -> Result<&HeapBlock, MemoryError> {
        match self.blocks.get(&addr) {
            Some(block) if block.state == BlockState::Allocated => Ok(block),
            Some(_) => Err(MemoryError::UseAfterFree { address: addr }),
            None => Err(MemoryError::InvalidAddress { address: addr }),
        }
    }

    /// All blocks, tombstones included
    pub fn blocks(&self) -> &BTreeMap<Address, HeapBlock> {
        &self.blocks
    }

    /// Cells held by live blocks
    pub fn live_cells(&self) -> usize {
        self.live_cells
    }

    pub fn max_cells(&self) -> usize {
        self.max_cells
    }
}

impl Default for Heap {
    fn default() -> Self {
        Heap::new(crate::interpreter::constants::DEFAULT_MAX_HEAP_CELLS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_read_write() {
        let mut heap = Heap::new(64);
        let a = heap.allocate(4, Value::Uninitialized).unwrap();
        let b = heap.allocate(2, Value::Int(0)).unwrap();
        assert_eq!(a, HEAP_ADDRESS_START);
        assert_eq!(b, a + 4 + HEAP_GUARD_CELLS);

        heap.write(a + 3, Value::Int(9)).unwrap();
        assert_eq!(heap.read(a + 3).unwrap(), Value::Int(9));
        assert_eq!(heap.read(a).unwrap(), Value::Uninitialized);
        assert_eq!(heap.read(b + 1).unwrap(), Value::Int(0));
        assert_eq!(heap.live_cells(), 6);
    }

    #[test]
    fn test_overrun_hits_guard() {
        let mut heap = Heap::new(64);
        let a = heap.allocate(2, Value::Int(0)).unwrap();
        heap.allocate(2, Value::Int(0)).unwrap();
        assert!(matches!(
            heap.write(a + 2, Value::Int(1)),
            Err(MemoryError::OutOfBounds { size: 2, .. })
        ));
        assert!(matches!(
            heap.read(HEAP_ADDRESS_START - 1),
            Err(MemoryError::InvalidAddress { .. })
        ));
    }

    #[test]
    fn test_free_errors() {
        let mut heap = Heap::new(64);
        let a = heap.allocate(3, Value::Int(0)).unwrap();
        heap.free(a).unwrap();
        assert_eq!(heap.live_cells(), 0);
        assert!(matches!(heap.read(a + 1), Err(MemoryError::UseAfterFree { .. })));
        assert!(matches!(heap.free(a), Err(MemoryError::DoubleFree { .. })));
        assert!(matches!(heap.free(a + 1), Err(MemoryError::InvalidFree { .. })));
    }

    #[test]
    fn test_limit() {
        let mut heap = Heap::new(4);
        heap.allocate(3, Value::Int(0)).unwrap();
        assert!(matches!(
            heap.allocate(2, Value::Int(0)),
            Err(MemoryError::OutOfMemory { requested: 2, limit: 4 })
        ));
        // Zero-sized requests still allocate a distinct block
        let z = heap.allocate(0, Value::Int(0)).unwrap();
        assert_eq!(heap.get_block(z).unwrap().len(), 1);
    }
}
