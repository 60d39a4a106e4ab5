//! WASM-form nodes of the ASTC IR
//!
//! Low-level instructions are kept in folded form: an opcode, one immediate and
//! the operand sub-expressions as children. Instruction opcodes keep their WASM
//! binary encoding as tag; module items live at `0x0100..` so that no two
//! kinds share a tag.

use super::ast::AstNode;

macro_rules! wasm_ops {
    ($($variant:ident = $code:literal => $name:literal,)*) => {
        /// Every WASM instruction and module item representable in the IR
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u16)]
        pub enum WasmOp {
            $($variant = $code,)*
        }

        impl WasmOp {
            pub const ALL: &'static [WasmOp] = &[$(WasmOp::$variant,)*];

            pub fn code(self) -> u16 {
                self as u16
            }

            pub fn from_code(code: u16) -> Option<Self> {
                match code {
                    $($code => Some(WasmOp::$variant),)*
                    _ => None,
                }
            }

            pub fn name(self) -> &'static str {
                match self {
                    $(WasmOp::$variant => $name,)*
                }
            }
        }
    };
}

wasm_ops! {
    // Control flow
    Unreachable = 0x00 => "unreachable",
    Nop = 0x01 => "nop",
    Block = 0x02 => "block",
    Loop = 0x03 => "loop",
    If = 0x04 => "if",
    Else = 0x05 => "else",
    End = 0x0B => "end",
    Br = 0x0C => "br",
    BrIf = 0x0D => "br_if",
    BrTable = 0x0E => "br_table",
    Return = 0x0F => "return",
    Call = 0x10 => "call",
    CallIndirect = 0x11 => "call_indirect",

    // Parametric
    Drop = 0x1A => "drop",
    Select = 0x1B => "select",

    // Variables
    LocalGet = 0x20 => "local.get",
    LocalSet = 0x21 => "local.set",
    LocalTee = 0x22 => "local.tee",
    GlobalGet = 0x23 => "global.get",
    GlobalSet = 0x24 => "global.set",

    // Memory
    I32Load = 0x28 => "i32.load",
    I64Load = 0x29 => "i64.load",
    F32Load = 0x2A => "f32.load",
    F64Load = 0x2B => "f64.load",
    I32Load8S = 0x2C => "i32.load8_s",
    I32Load8U = 0x2D => "i32.load8_u",
    I32Load16S = 0x2E => "i32.load16_s",
    I32Load16U = 0x2F => "i32.load16_u",
    I64Load8S = 0x30 => "i64.load8_s",
    I64Load8U = 0x31 => "i64.load8_u",
    I64Load16S = 0x32 => "i64.load16_s",
    I64Load16U = 0x33 => "i64.load16_u",
    I64Load32S = 0x34 => "i64.load32_s",
    I64Load32U = 0x35 => "i64.load32_u",
    I32Store = 0x36 => "i32.store",
    I64Store = 0x37 => "i64.store",
    F32Store = 0x38 => "f32.store",
    F64Store = 0x39 => "f64.store",
    I32Store8 = 0x3A => "i32.store8",
    I32Store16 = 0x3B => "i32.store16",
    I64Store8 = 0x3C => "i64.store8",
    I64Store16 = 0x3D => "i64.store16",
    I64Store32 = 0x3E => "i64.store32",
    MemorySize = 0x3F => "memory.size",
    MemoryGrow = 0x40 => "memory.grow",

    // Constants
    I32Const = 0x41 => "i32.const",
    I64Const = 0x42 => "i64.const",
    F32Const = 0x43 => "f32.const",
    F64Const = 0x44 => "f64.const",

    // i32 comparisons
    I32Eqz = 0x45 => "i32.eqz",
    I32Eq = 0x46 => "i32.eq",
    I32Ne = 0x47 => "i32.ne",
    I32LtS = 0x48 => "i32.lt_s",
    I32LtU = 0x49 => "i32.lt_u",
    I32GtS = 0x4A => "i32.gt_s",
    I32GtU = 0x4B => "i32.gt_u",
    I32LeS = 0x4C => "i32.le_s",
    I32LeU = 0x4D => "i32.le_u",
    I32GeS = 0x4E => "i32.ge_s",
    I32GeU = 0x4F => "i32.ge_u",

    // i64 comparisons
    I64Eqz = 0x50 => "i64.eqz",
    I64Eq = 0x51 => "i64.eq",
    I64Ne = 0x52 => "i64.ne",
    I64LtS = 0x53 => "i64.lt_s",
    I64LtU = 0x54 => "i64.lt_u",
    I64GtS = 0x55 => "i64.gt_s",
    I64GtU = 0x56 => "i64.gt_u",
    I64LeS = 0x57 => "i64.le_s",
    I64LeU = 0x58 => "i64.le_u",
    I64GeS = 0x59 => "i64.ge_s",
    I64GeU = 0x5A => "i64.ge_u",

    // Float comparisons
    F32Eq = 0x5B => "f32.eq",
    F32Ne = 0x5C => "f32.ne",
    F32Lt = 0x5D => "f32.lt",
    F32Gt = 0x5E => "f32.gt",
    F32Le = 0x5F => "f32.le",
    F32Ge = 0x60 => "f32.ge",
    F64Eq = 0x61 => "f64.eq",
    F64Ne = 0x62 => "f64.ne",
    F64Lt = 0x63 => "f64.lt",
    F64Gt = 0x64 => "f64.gt",
    F64Le = 0x65 => "f64.le",
    F64Ge = 0x66 => "f64.ge",

    // i32 arithmetic
    I32Clz = 0x67 => "i32.clz",
    I32Ctz = 0x68 => "i32.ctz",
    I32Popcnt = 0x69 => "i32.popcnt",
    I32Add = 0x6A => "i32.add",
    I32Sub = 0x6B => "i32.sub",
    I32Mul = 0x6C => "i32.mul",
    I32DivS = 0x6D => "i32.div_s",
    I32DivU = 0x6E => "i32.div_u",
    I32RemS = 0x6F => "i32.rem_s",
    I32RemU = 0x70 => "i32.rem_u",
    I32And = 0x71 => "i32.and",
    I32Or = 0x72 => "i32.or",
    I32Xor = 0x73 => "i32.xor",
    I32Shl = 0x74 => "i32.shl",
    I32ShrS = 0x75 => "i32.shr_s",
    I32ShrU = 0x76 => "i32.shr_u",
    I32Rotl = 0x77 => "i32.rotl",
    I32Rotr = 0x78 => "i32.rotr",

    // i64 arithmetic
    I64Clz = 0x79 => "i64.clz",
    I64Ctz = 0x7A => "i64.ctz",
    I64Popcnt = 0x7B => "i64.popcnt",
    I64Add = 0x7C => "i64.add",
    I64Sub = 0x7D => "i64.sub",
    I64Mul = 0x7E => "i64.mul",
    I64DivS = 0x7F => "i64.div_s",
    I64DivU = 0x80 => "i64.div_u",
    I64RemS = 0x81 => "i64.rem_s",
    I64RemU = 0x82 => "i64.rem_u",
    I64And = 0x83 => "i64.and",
    I64Or = 0x84 => "i64.or",
    I64Xor = 0x85 => "i64.xor",
    I64Shl = 0x86 => "i64.shl",
    I64ShrS = 0x87 => "i64.shr_s",
    I64ShrU = 0x88 => "i64.shr_u",
    I64Rotl = 0x89 => "i64.rotl",
    I64Rotr = 0x8A => "i64.rotr",

    // Conversions
    I32WrapI64 = 0xA7 => "i32.wrap_i64",
    I32TruncF32S = 0xA8 => "i32.trunc_f32_s",
    I32TruncF32U = 0xA9 => "i32.trunc_f32_u",
    I32TruncF64S = 0xAA => "i32.trunc_f64_s",
    I32TruncF64U = 0xAB => "i32.trunc_f64_u",
    I64ExtendI32S = 0xAC => "i64.extend_i32_s",
    I64ExtendI32U = 0xAD => "i64.extend_i32_u",

    // Reference types
    RefNull = 0xD0 => "ref.null",
    RefIsNull = 0xD1 => "ref.is_null",
    RefFunc = 0xD2 => "ref.func",

    // Module items
    Module = 0x0100 => "module",
    FuncType = 0x0101 => "functype",
    Import = 0x0102 => "import",
    Func = 0x0103 => "func",
    Table = 0x0104 => "table",
    Memory = 0x0105 => "memory",
    Global = 0x0106 => "global",
    Export = 0x0107 => "export",
    Start = 0x0108 => "start",
    Elem = 0x0109 => "elem",
    Data = 0x010A => "data",

    // Prefixed (0xFC) instructions
    MemoryInit = 0xFC08 => "memory.init",
    DataDrop = 0xFC09 => "data.drop",
    MemoryCopy = 0xFC0A => "memory.copy",
    MemoryFill = 0xFC0B => "memory.fill",
    TableInit = 0xFC0C => "table.init",
    ElemDrop = 0xFC0D => "elem.drop",
    TableCopy = 0xFC0E => "table.copy",
    TableGrow = 0xFC0F => "table.grow",
    TableSize = 0xFC10 => "table.size",
    TableFill = 0xFC11 => "table.fill",
}

/// Immediate operand carried by a WASM-form node
#[derive(Debug, Clone, PartialEq)]
pub enum WasmImmediate {
    None,
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    /// Label depth, function index, memory offset...
    Index(u32),
    /// Symbolic reference (local/global/function name)
    Name(String),
}

/// A folded WASM instruction: `(op immediate operand*)`
#[derive(Debug, Clone, PartialEq)]
pub struct WasmInstr {
    pub op: WasmOp,
    pub immediate: WasmImmediate,
    pub operands: Vec<AstNode>,
}

impl WasmInstr {
    pub fn new(op: WasmOp, immediate: WasmImmediate, operands: Vec<AstNode>) -> Self {
        WasmInstr {
            op,
            immediate,
            operands,
        }
    }
}
