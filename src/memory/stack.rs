//! Call stack implementation
//!
//! This module provides the call stack for function execution:
//! - [`Stack`]: cell storage for globals and locals, plus the frames
//! - [`StackFrame`]: a single function's activation record
//! - [`LocalVar`]: a local variable's address and declared type
//!
//! Cells are allocated bump-style. Globals occupy the bottom cells and are
//! never released; a frame releases every cell above its base when popped, and
//! a block scope releases the cells it allocated when it exits.

use super::value::{Address, Value};
use super::MemoryError;
use crate::interpreter::constants::STACK_ADDRESS_START;
use crate::parser::ast::Type;
use rustc_hash::FxHashMap;

/// Local variable on the stack
#[derive(Debug, Clone, PartialEq)]
pub struct LocalVar {
    pub address: Address,
    pub var_type: Type,
}

#[derive(Debug, Clone)]
struct ScopeData {
    shadowed: Vec<(String, LocalVar)>,
    declared: Vec<String>,
    cell_mark: usize,
}

/// Stack frame for a function call
#[derive(Debug, Clone)]
pub struct StackFrame {
    pub function_name: String,
    pub locals: FxHashMap<String, LocalVar>,
    /// Index of the first cell owned by this frame
    pub base: usize,
    scope_stack: Vec<ScopeData>,
}

impl StackFrame {
    pub fn new(function_name: String, base: usize) -> Self {
        StackFrame {
            function_name,
            locals: FxHashMap::default(),
            base,
            scope_stack: Vec::new(),
        }
    }

    /// Declare a new local variable
    pub fn declare_var(&mut self, name: String, var_type: Type, address: Address) {
        let new_var = LocalVar { address, var_type };

        // Handle scoping if we are in a nested scope
        if let Some(scope) = self.scope_stack.last_mut() {
            if let Some(old_var) = self.locals.insert(name.clone(), new_var) {
                if !scope.declared.contains(&name) {
                    // If variable existed in an outer scope, track it as shadowed
                    scope.shadowed.push((name, old_var));
                }
            } else {
                scope.declared.push(name);
            }
        } else {
            // Top-level function scope
            self.locals.insert(name, new_var);
        }
    }

    /// Get a local variable
    pub fn get_var(&self, name: &str) -> Option<&LocalVar> {
        self.locals.get(name)
    }
}

/// The call stack
#[derive(Debug, Clone)]
pub struct Stack {
    cells: Vec<Value>,
    frames: Vec<StackFrame>,
    max_cells: usize,
}

impl Stack {
    pub fn new(max_cells: usize) -> Self {
        Stack {
            cells: Vec::new(),
            frames: Vec::new(),
            max_cells,
        }
    }

    pub fn address_of(index: usize) -> Address {
        STACK_ADDRESS_START + index as Address
    }

    fn index_of(&self, addr: Address) -> Result<usize, MemoryError> {
        addr.checked_sub(STACK_ADDRESS_START)
            .map(|i| i as usize)
            .filter(|i| *i < self.cells.len())
            .ok_or(MemoryError::InvalidAddress { address: addr })
    }

    /// Reserve `count` uninitialized cells and return the address of the first
    pub fn allocate(&mut self, count: usize) -> Result<Address, MemoryError> {
        let index = self.cells.len();
        if index.checked_add(count).map_or(true, |end| end > self.max_cells) {
            return Err(MemoryError::StackExhausted {
                requested: count,
                limit: self.max_cells,
            });
        }
        self.cells.resize(index + count, Value::Uninitialized);
        Ok(Self::address_of(index))
    }

    pub fn read(&self, addr: Address) -> Result<Value, MemoryError> {
        Ok(self.cells[self.index_of(addr)?])
    }

    pub fn write(&mut self, addr: Address, value: Value) -> Result<(), MemoryError> {
        let index = self.index_of(addr)?;
        self.cells[index] = value;
        Ok(())
    }

    /// Number of live cells
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Push a new stack frame owning every cell allocated from now on
    pub fn push_frame(&mut self, function_name: String) {
        let base = self.cells.len();
        self.frames.push(StackFrame::new(function_name, base));
    }

    /// Pop the top stack frame and release its cells
    pub fn pop_frame(&mut self) -> Option<StackFrame> {
        let frame = self.frames.pop()?;
        self.cells.truncate(frame.base);
        Some(frame)
    }

    /// Enter a new block scope in the current frame
    pub fn push_scope(&mut self) {
        let cell_mark = self.cells.len();
        if let Some(frame) = self.frames.last_mut() {
            frame.scope_stack.push(ScopeData {
                shadowed: Vec::new(),
                declared: Vec::new(),
                cell_mark,
            });
        }
    }

    /// Exit the current block scope, releasing its variables and cells
    pub fn pop_scope(&mut self) {
        let Some(frame) = self.frames.last_mut() else {
            return;
        };
        if let Some(scope) = frame.scope_stack.pop() {
            // Remove variables declared in this scope
            for name in scope.declared {
                frame.locals.remove(&name);
            }

            // Restore shadowed variables
            for (name, var) in scope.shadowed {
                frame.locals.insert(name, var);
            }
            self.cells.truncate(scope.cell_mark);
        }
    }

    /// Get the current (top) frame
    pub fn current_frame(&self) -> Option<&StackFrame> {
        self.frames.last()
    }

    /// Get a mutable reference to the current frame
    pub fn current_frame_mut(&mut self) -> Option<&mut StackFrame> {
        self.frames.last_mut()
    }

    pub fn frames(&self) -> &[StackFrame] {
        &self.frames
    }

    /// Get the depth of the call stack
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_releases_cells() {
        let mut stack = Stack::new(16);
        let global = stack.allocate(1).unwrap();
        stack.write(global, Value::Int(7)).unwrap();

        stack.push_frame("f".into());
        let local = stack.allocate(3).unwrap();
        assert_eq!(local, global + 1);
        assert_eq!(stack.read(local).unwrap(), Value::Uninitialized);
        stack.pop_frame();

        assert_eq!(stack.cell_count(), 1);
        assert!(matches!(stack.read(local), Err(MemoryError::InvalidAddress { .. })));
        assert_eq!(stack.read(global).unwrap(), Value::Int(7));
    }

    #[test]
    fn test_scope_shadowing_and_release() {
        let mut stack = Stack::new(16);
        stack.push_frame("main".into());
        let outer = stack.allocate(1).unwrap();
        stack
            .current_frame_mut()
            .unwrap()
            .declare_var("x".into(), Type::int(), outer);

        stack.push_scope();
        let inner = stack.allocate(1).unwrap();
        let frame = stack.current_frame_mut().unwrap();
        frame.declare_var("x".into(), Type::int(), inner);
        frame.declare_var("y".into(), Type::int(), inner);
        assert_eq!(frame.get_var("x").unwrap().address, inner);
        stack.pop_scope();

        let frame = stack.current_frame().unwrap();
        assert_eq!(frame.get_var("x").unwrap().address, outer);
        assert!(frame.get_var("y").is_none());
        assert_eq!(stack.cell_count(), 1);
    }

    #[test]
    fn test_stack_limit() {
        let mut stack = Stack::new(4);
        stack.allocate(3).unwrap();
        assert!(matches!(
            stack.allocate(2),
            Err(MemoryError::StackExhausted { requested: 2, limit: 4 })
        ));
    }
}
