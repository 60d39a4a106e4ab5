//! Runtime value representation
//!
//! This module defines the [`Value`] enum held by every memory cell.
//!
//! # Value Types
//!
//! - [`Value::Int`]: every integer type, chars and enums (64-bit, wrapping)
//! - [`Value::Float`]: `float` and `double`
//! - [`Value::Pointer`]: cell address; address 0 is the null pointer
//! - [`Value::Uninitialized`]: marker for never-written cells
//!
//! Aggregates (arrays, structs, unions) are not values: they live in
//! consecutive cells and are referred to by the address of their first cell.

/// Memory address type (64-bit cell address)
pub type Address = u64;

/// Runtime values in the interpreter
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Value {
    Int(i64),
    Float(f64),
    Pointer(Address),
    #[default]
    Uninitialized, // Special marker for uninitialized memory
}

impl Value {
    pub const NULL: Value = Value::Pointer(0);

    /// Check if this value is initialized
    pub fn is_initialized(&self) -> bool {
        !matches!(self, Value::Uninitialized)
    }

    /// Integer view; pointers convert to their address
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Pointer(addr) => Some(*addr as i64),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(x) => Some(*x),
            _ => None,
        }
    }

    /// Address view; integers are reinterpreted as addresses
    pub fn as_pointer(&self) -> Option<Address> {
        match self {
            Value::Pointer(addr) => Some(*addr),
            Value::Int(n) => Some(*n as Address),
            _ => None,
        }
    }

    /// C truthiness; `None` for uninitialized values
    pub fn truthy(&self) -> Option<bool> {
        match self {
            Value::Int(n) => Some(*n != 0),
            Value::Float(x) => Some(*x != 0.0),
            Value::Pointer(addr) => Some(*addr != 0),
            Value::Uninitialized => None,
        }
    }

    /// Check if this value is null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Pointer(0))
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, Value::Pointer(_))
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Value::Float(_))
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Pointer(_) => "pointer",
            Value::Uninitialized => "uninitialized",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert_eq!(Value::Int(0).truthy(), Some(false));
        assert_eq!(Value::Float(0.5).truthy(), Some(true));
        assert_eq!(Value::NULL.truthy(), Some(false));
        assert_eq!(Value::Pointer(8).truthy(), Some(true));
        assert_eq!(Value::Uninitialized.truthy(), None);
    }

    #[test]
    fn test_numeric_views() {
        assert_eq!(Value::Pointer(16).as_int(), Some(16));
        assert_eq!(Value::Int(3).as_float(), Some(3.0));
        assert_eq!(Value::Float(1.0).as_pointer(), None);
        assert!(Value::Int(0).as_pointer() == Some(0));
    }
}
