//! Single-pass x86-64 code generation
//!
//! Every expression leaves its value in `rax`. Binary operators evaluate the
//! left operand, push it, evaluate the right operand and pop the left one into
//! `rcx`. Locals live in 8-byte frame slots below `rbp`; arguments are pushed
//! left to right by the caller, so parameter `i` of `n` sits at
//! `rbp + 16 + 8 * (n - 1 - i)`.
//!
//! Only the integer subset compiles. Anything else (floating point, strings,
//! pointers, arrays, records, globals, library calls) is rejected with
//! [`CodegenError::UnsupportedConstruct`] before any code would run.

use super::buffer::{CodeBuffer, SLOT_SIZE};
use super::errors::CodegenError;
use super::x86::{Cond, TRAP_DIVIDE_BY_ZERO};
use crate::memory::layout::TypeTable;
use crate::parser::ast::*;
use crate::parser::wasm::{WasmImmediate, WasmInstr, WasmOp};
use crate::stage;
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;

/// Names the interpreter provides natively; they have no machine-code body
const LIBRARY_FUNCTIONS: &[&str] = &["printf", "putchar", "puts", "malloc", "calloc", "free", "abs", "exit"];

/// Machine code for a whole translation unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledProgram {
    pub code: Vec<u8>,
    /// Offset of the entry function within `code`
    pub entry_offset: usize,
    /// Function name -> offset within `code`
    pub symbols: BTreeMap<String, usize>,
}

/// A variable visible in the current scope
#[derive(Debug, Clone)]
struct Binding {
    /// Key of the variable's slot in the code buffer's local table
    slot: String,
    ty: Type,
}

/// Jump targets of the innermost enclosing loop or switch
#[derive(Debug, Clone)]
struct JumpTargets {
    break_label: String,
    /// `None` inside a switch that is not inside a loop
    continue_label: Option<String>,
}

#[derive(Debug)]
pub struct CodeGenerator {
    buf: CodeBuffer,
    types: TypeTable,
    constants: FxHashMap<String, i64>,
    /// Function definitions and their parameter count
    functions: FxHashMap<String, usize>,
    scopes: Vec<FxHashMap<String, Binding>>,
    jumps: Vec<JumpTargets>,
    return_type: Type,
    slot_index: usize,
    /// Set once a division jumps to the shared trap stub
    divides: bool,
}

/// Shared stub that every zero-divisor check jumps to
const DIVIDE_TRAP: &str = "trap:divide";

fn function_label(name: &str) -> String {
    format!("fn:{}", name)
}

impl Default for CodeGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl CodeGenerator {
    pub fn new() -> Self {
        CodeGenerator {
            buf: CodeBuffer::new(),
            types: TypeTable::new(),
            constants: FxHashMap::default(),
            functions: FxHashMap::default(),
            scopes: Vec::new(),
            jumps: Vec::new(),
            return_type: Type::int(),
            slot_index: 0,
            divides: false,
        }
    }

    /// Compile `unit` and finalize the code; `entry` names the entry function
    pub fn compile(mut self, unit: &AstNode, entry: &str) -> Result<CompiledProgram, CodegenError> {
        let declarations: &[AstNode] = match &unit.kind {
            NodeKind::TranslationUnit { declarations } => declarations,
            _ => std::slice::from_ref(unit),
        };

        // Collect signatures first so calls may precede definitions
        for decl in declarations {
            match &decl.kind {
                NodeKind::FunctionDecl {
                    name,
                    params,
                    body: Some(_),
                    ..
                } => {
                    self.functions.insert(name.clone(), params.len());
                }
                // Prototypes carry nothing the definition does not
                NodeKind::FunctionDecl { .. } => {}
                NodeKind::VarDecl { name, .. } => {
                    return Err(CodegenError::unsupported(
                        format!("global variable '{}'", name),
                        decl.location,
                    ))
                }
                NodeKind::DeclStmt { .. } => {
                    return Err(CodegenError::unsupported("global variable declaration", decl.location))
                }
                _ => self.declare_type(decl)?,
            }
        }
        if !self.functions.contains_key(entry) {
            return Err(CodegenError::NoEntryPoint {
                name: entry.to_string(),
            });
        }

        for decl in declarations {
            if let NodeKind::FunctionDecl {
                name,
                return_type,
                params,
                body: Some(body),
            } = &decl.kind
            {
                self.gen_function(name, return_type, params, body, decl.location)?;
            }
        }
        if self.divides {
            self.buf.bind_label(DIVIDE_TRAP)?;
            self.buf.trap_stub(TRAP_DIVIDE_BY_ZERO);
        }

        let assembled = self.buf.finalize()?;
        let symbols: BTreeMap<String, usize> = self
            .functions
            .keys()
            .filter_map(|name| {
                assembled
                    .labels
                    .get(&function_label(name))
                    .map(|&offset| (name.clone(), offset))
            })
            .collect();
        let entry_offset = symbols
            .get(entry)
            .copied()
            .ok_or_else(|| CodegenError::NoEntryPoint {
                name: entry.to_string(),
            })?;

        tracing::debug!(
            code_size = assembled.code.len(),
            functions = symbols.len(),
            entry_offset,
            "generated native code"
        );
        Ok(CompiledProgram {
            code: assembled.code,
            entry_offset,
            symbols,
        })
    }

    /// Struct, union, typedef and enum declarations; only enums produce values
    fn declare_type(&mut self, decl: &AstNode) -> Result<(), CodegenError> {
        match &decl.kind {
            NodeKind::StructDecl { name, fields } => self.types.define_struct(name, fields.clone()),
            NodeKind::UnionDecl { name, fields } => self.types.define_union(name, fields.clone()),
            NodeKind::TypedefDecl { name, target } => self.types.define_typedef(name, target.clone()),
            NodeKind::EnumDecl { constants, .. } => {
                let mut next = 0i64;
                for constant in constants {
                    let value = match &constant.value {
                        Some(expr) => self.fold_constant(expr)?,
                        None => next,
                    };
                    self.constants.insert(constant.name.clone(), value);
                    next = value.wrapping_add(1);
                }
            }
            NodeKind::Empty => {}
            other => {
                return Err(CodegenError::unsupported(
                    format!("{} at file scope", other.name()),
                    decl.location,
                ))
            }
        }
        Ok(())
    }

    fn fold_constant(&self, expr: &AstNode) -> Result<i64, CodegenError> {
        expr.constant_value_with(&|name| self.constants.get(name).copied())
            .ok_or_else(|| CodegenError::unsupported("non-constant case or enumerator value", expr.location))
    }

    /// Resolve typedefs and require an integer scalar
    fn scalar_type(&self, ty: &Type, location: SourceLocation) -> Result<Type, CodegenError> {
        let resolved = self
            .types
            .resolve(ty)
            .map_err(|e| CodegenError::unsupported(e.to_string(), location))?;
        if resolved.pointer_depth > 0 {
            return Err(CodegenError::unsupported(format!("pointer type '{}'", resolved), location));
        }
        if resolved.is_array() {
            return Err(CodegenError::unsupported(format!("array type '{}'", resolved), location));
        }
        match resolved.base {
            BaseType::Void
            | BaseType::Bool
            | BaseType::Char
            | BaseType::Short
            | BaseType::Int
            | BaseType::Long
            | BaseType::Enum(_) => Ok(resolved),
            BaseType::Float | BaseType::Double => Err(CodegenError::unsupported(
                format!("floating-point type '{}'", resolved),
                location,
            )),
            _ => Err(CodegenError::unsupported(format!("type '{}'", resolved), location)),
        }
    }

    /// Convert `rax` to a scalar type the way a store to that type does
    fn narrow(&mut self, ty: &Type) {
        match (&ty.base, ty.is_unsigned) {
            (BaseType::Bool, _) => self.buf.test_rax_set(Cond::Ne),
            // movzx rax, al / movsx rax, al
            (BaseType::Char, true) => self.buf.emit(&[0x48, 0x0F, 0xB6, 0xC0]),
            (BaseType::Char, false) => self.buf.emit(&[0x48, 0x0F, 0xBE, 0xC0]),
            // movzx rax, ax / movsx rax, ax
            (BaseType::Short, true) => self.buf.emit(&[0x48, 0x0F, 0xB7, 0xC0]),
            (BaseType::Short, false) => self.buf.emit(&[0x48, 0x0F, 0xBF, 0xC0]),
            (BaseType::Void, _) => self.buf.mov_rax_imm(0),
            _ => {}
        }
    }

    fn gen_function(
        &mut self,
        name: &str,
        return_type: &Type,
        params: &[Param],
        body: &AstNode,
        location: SourceLocation,
    ) -> Result<(), CodegenError> {
        tracing::trace!(function = name, "generating function");
        self.return_type = self.scalar_type(return_type, location)?;
        self.buf.reset_locals();
        self.slot_index = 0;
        self.scopes = vec![FxHashMap::default()];
        self.jumps.clear();

        self.buf.bind_label(&function_label(name))?;
        let frame_at = self.buf.prologue();

        let count = params.len() as i32;
        for (i, param) in params.iter().enumerate() {
            let ty = self.scalar_type(&param.param_type, location)?;
            let disp = self.declare(&param.name, ty);
            self.buf.load_local(16 + SLOT_SIZE * (count - 1 - i as i32));
            self.buf.store_local(disp);
        }

        self.gen_statement(body)?;
        if !Self::ends_in_return(body) {
            self.buf.mov_rax_imm(0);
            self.buf.epilogue();
        }

        let frame = self.buf.frame_size();
        if frame < 0 {
            return Err(CodegenError::FrameTooLarge {
                function: name.to_string(),
            });
        }
        self.buf.patch_i32(frame_at, frame);
        Ok(())
    }

    fn ends_in_return(body: &AstNode) -> bool {
        match &body.kind {
            NodeKind::Return { .. } => true,
            NodeKind::Compound { statements } => statements.last().is_some_and(Self::ends_in_return),
            _ => false,
        }
    }

    /// Bind `name` in the innermost scope to a fresh slot; returns its frame offset
    fn declare(&mut self, name: &str, ty: Type) -> i32 {
        self.slot_index += 1;
        let slot = format!("{}#{}", name, self.slot_index);
        let disp = self.buf.local_offset(&slot);
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), Binding { slot, ty });
        }
        disp
    }

    fn lookup(&self, name: &str) -> Option<&Binding> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    /// Frame offset and type of a local assignment target
    fn local_target(&mut self, target: &AstNode) -> Result<(i32, Type), CodegenError> {
        match &target.kind {
            NodeKind::Identifier(name) => {
                let binding = self.lookup(name).cloned().ok_or_else(|| CodegenError::UndefinedVariable {
                    name: name.clone(),
                    location: target.location,
                })?;
                Ok((self.buf.local_offset(&binding.slot), binding.ty))
            }
            other => Err(CodegenError::unsupported(
                format!("assignment to {}", other.name()),
                target.location,
            )),
        }
    }

    fn gen_statement(&mut self, stmt: &AstNode) -> Result<(), CodegenError> {
        let location = stmt.location;
        match &stmt.kind {
            NodeKind::Compound { statements } => {
                self.scopes.push(FxHashMap::default());
                let result = statements.iter().try_for_each(|s| self.gen_statement(s));
                self.scopes.pop();
                result
            }
            NodeKind::DeclStmt { declarations } => {
                declarations.iter().try_for_each(|d| self.gen_statement(d))
            }
            NodeKind::VarDecl { name, var_type, init } => {
                let ty = self.scalar_type(var_type, location)?;
                // The initializer is evaluated before the new name is in scope
                if let Some(init) = init {
                    self.gen_expr(init)?;
                    self.narrow(&ty);
                }
                let disp = self.declare(name, ty);
                if init.is_some() {
                    self.buf.store_local(disp);
                }
                Ok(())
            }
            NodeKind::StructDecl { .. }
            | NodeKind::UnionDecl { .. }
            | NodeKind::TypedefDecl { .. }
            | NodeKind::EnumDecl { .. } => self.declare_type(stmt),

            NodeKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let else_label = self.buf.gen_label("else");
                let end_label = self.buf.gen_label("endif");
                self.gen_expr(condition)?;
                self.buf.test_rax();
                self.buf.jcc(Cond::E, &else_label)?;
                self.gen_statement(then_branch)?;
                self.buf.jmp(&end_label)?;
                self.buf.bind_label(&else_label)?;
                if let Some(else_branch) = else_branch {
                    self.gen_statement(else_branch)?;
                }
                self.buf.bind_label(&end_label)
            }
            NodeKind::While { condition, body } => {
                let top = self.buf.gen_label("while");
                let end = self.buf.gen_label("endwhile");
                self.buf.bind_label(&top)?;
                self.gen_expr(condition)?;
                self.buf.test_rax();
                self.buf.jcc(Cond::E, &end)?;
                self.gen_loop_body(body, &end, &top)?;
                self.buf.jmp(&top)?;
                self.buf.bind_label(&end)
            }
            NodeKind::DoWhile { body, condition } => {
                let top = self.buf.gen_label("do");
                let next = self.buf.gen_label("docond");
                let end = self.buf.gen_label("enddo");
                self.buf.bind_label(&top)?;
                self.gen_loop_body(body, &end, &next)?;
                self.buf.bind_label(&next)?;
                self.gen_expr(condition)?;
                self.buf.test_rax();
                self.buf.jcc(Cond::Ne, &top)?;
                self.buf.bind_label(&end)
            }
            NodeKind::For {
                init,
                condition,
                increment,
                body,
            } => {
                self.scopes.push(FxHashMap::default());
                let result = self.gen_for(init.as_deref(), condition.as_deref(), increment.as_deref(), body);
                self.scopes.pop();
                result
            }
            NodeKind::Switch { expr, cases } => self.gen_switch(expr, cases, location),

            NodeKind::Return { expr } => {
                match expr {
                    Some(expr) => {
                        self.gen_expr(expr)?;
                        let ty = self.return_type.clone();
                        self.narrow(&ty);
                    }
                    None => self.buf.mov_rax_imm(0),
                }
                self.buf.epilogue();
                Ok(())
            }
            NodeKind::Break => {
                let target = self.jumps.last().map(|j| j.break_label.clone()).ok_or(
                    CodegenError::StrayControl {
                        statement: "break",
                        location,
                    },
                )?;
                self.buf.jmp(&target)
            }
            NodeKind::Continue => {
                let target = self
                    .jumps
                    .iter()
                    .rev()
                    .find_map(|j| j.continue_label.clone())
                    .ok_or(CodegenError::StrayControl {
                        statement: "continue",
                        location,
                    })?;
                self.buf.jmp(&target)
            }
            NodeKind::ExprStmt { expr } => self.gen_expr(expr),
            NodeKind::Empty => Ok(()),

            other => Err(CodegenError::unsupported(other.name(), location)),
        }
    }

    fn gen_loop_body(&mut self, body: &AstNode, break_label: &str, continue_label: &str) -> Result<(), CodegenError> {
        self.jumps.push(JumpTargets {
            break_label: break_label.to_string(),
            continue_label: Some(continue_label.to_string()),
        });
        let result = self.gen_statement(body);
        self.jumps.pop();
        result
    }

    fn gen_for(
        &mut self,
        init: Option<&AstNode>,
        condition: Option<&AstNode>,
        increment: Option<&AstNode>,
        body: &AstNode,
    ) -> Result<(), CodegenError> {
        let top = self.buf.gen_label("for");
        let next = self.buf.gen_label("forinc");
        let end = self.buf.gen_label("endfor");

        if let Some(init) = init {
            self.gen_statement(init)?;
        }
        self.buf.bind_label(&top)?;
        if let Some(condition) = condition {
            self.gen_expr(condition)?;
            self.buf.test_rax();
            self.buf.jcc(Cond::E, &end)?;
        }
        self.gen_loop_body(body, &end, &next)?;
        self.buf.bind_label(&next)?;
        if let Some(increment) = increment {
            self.gen_expr(increment)?;
        }
        self.buf.jmp(&top)?;
        self.buf.bind_label(&end)
    }

    /// Compare the scrutinee against each case value, then lay out the bodies
    /// in source order so that control falls through from one to the next
    fn gen_switch(&mut self, expr: &AstNode, cases: &[SwitchCase], location: SourceLocation) -> Result<(), CodegenError> {
        let end = self.buf.gen_label("endswitch");
        let labels: Vec<String> = cases.iter().map(|_| self.buf.gen_label("case")).collect();

        self.scopes.push(FxHashMap::default());
        let scrutinee = self.declare("switch", Type::new(BaseType::Long));
        self.gen_expr(expr)?;
        self.buf.store_local(scrutinee);

        let mut default_label = None;
        for (case, label) in cases.iter().zip(&labels) {
            match &case.value {
                Some(value) => {
                    let value = self.fold_constant(value)?;
                    self.buf.push_rax();
                    self.buf.mov_rax_imm(value);
                    self.buf.pop_rcx();
                    self.buf.emit(&[0x48, 0x39, 0xC1]); // cmp rcx, rax
                    self.buf.jcc(Cond::E, label)?;
                    self.buf.load_local(scrutinee);
                }
                None => default_label = Some(label.clone()),
            }
        }
        self.buf.jmp(default_label.as_deref().unwrap_or(&end))?;

        self.jumps.push(JumpTargets {
            break_label: end.clone(),
            continue_label: None,
        });
        let result = cases.iter().zip(&labels).try_for_each(|(case, label)| {
            self.buf.bind_label(label)?;
            case.body.iter().try_for_each(|s| self.gen_statement(s))
        });
        self.jumps.pop();
        self.scopes.pop();
        result?;

        tracing::trace!(cases = cases.len(), %location, "generated switch");
        self.buf.bind_label(&end)
    }

    fn gen_expr(&mut self, expr: &AstNode) -> Result<(), CodegenError> {
        let location = expr.location;
        match &expr.kind {
            NodeKind::IntLiteral(n) => self.buf.mov_rax_imm(*n),
            NodeKind::CharLiteral(c) => self.buf.mov_rax_imm(*c as i8 as i64),
            NodeKind::Identifier(name) => {
                if let Some(binding) = self.lookup(name).cloned() {
                    let disp = self.buf.local_offset(&binding.slot);
                    self.buf.load_local(disp);
                } else if let Some(&value) = self.constants.get(name) {
                    self.buf.mov_rax_imm(value);
                } else if self.functions.contains_key(name) {
                    return Err(CodegenError::unsupported(
                        format!("function '{}' used as a value", name),
                        location,
                    ));
                } else {
                    return Err(CodegenError::UndefinedVariable {
                        name: name.clone(),
                        location,
                    });
                }
            }
            NodeKind::Binary { op, left, right } => self.gen_binary(*op, left, right)?,
            NodeKind::Unary { op, operand } => self.gen_unary(*op, operand, location)?,
            NodeKind::Assign { op, target, value } => {
                let (disp, ty) = self.local_target(target)?;
                self.gen_expr(value)?;
                if let Some(op) = op {
                    self.buf.push_rax();
                    self.buf.load_local(disp);
                    self.buf.pop_rcx();
                    // left operand (the current value) into rcx
                    self.buf.emit(&[0x48, 0x91]);
                    self.apply_binary(*op)?;
                }
                self.narrow(&ty);
                self.buf.store_local(disp);
            }
            NodeKind::Ternary {
                condition,
                then_expr,
                else_expr,
            } => {
                let else_label = self.buf.gen_label("ternelse");
                let end_label = self.buf.gen_label("ternend");
                self.gen_expr(condition)?;
                self.buf.test_rax();
                self.buf.jcc(Cond::E, &else_label)?;
                self.gen_expr(then_expr)?;
                self.buf.jmp(&end_label)?;
                self.buf.bind_label(&else_label)?;
                self.gen_expr(else_expr)?;
                self.buf.bind_label(&end_label)?;
            }
            NodeKind::Call { callee, args } => self.gen_call(callee, args, location)?,
            NodeKind::Cast { target_type, expr: inner } => {
                let ty = self.scalar_type(target_type, location)?;
                self.gen_expr(inner)?;
                self.narrow(&ty);
            }
            NodeKind::SizeofType(ty) => {
                let size = self
                    .types
                    .byte_size(ty)
                    .map_err(|e| CodegenError::unsupported(e.to_string(), location))?;
                self.buf.mov_rax_imm(size as i64);
            }
            NodeKind::SizeofExpr(inner) => {
                let ty = match &inner.kind {
                    NodeKind::Identifier(name) => self
                        .lookup(name)
                        .map(|b| b.ty.clone())
                        .ok_or_else(|| CodegenError::UndefinedVariable {
                            name: name.clone(),
                            location,
                        })?,
                    NodeKind::IntLiteral(_) | NodeKind::CharLiteral(_) => Type::int(),
                    other => {
                        return Err(CodegenError::unsupported(
                            format!("sizeof applied to {}", other.name()),
                            location,
                        ))
                    }
                };
                let size = self
                    .types
                    .byte_size(&ty)
                    .map_err(|e| CodegenError::unsupported(e.to_string(), location))?;
                self.buf.mov_rax_imm(size as i64);
            }
            NodeKind::Wasm(instr) => self.gen_wasm(instr, location)?,

            NodeKind::FloatLiteral(_) => {
                return Err(CodegenError::unsupported("floating-point literal", location))
            }
            NodeKind::StringLiteral(_) => return Err(CodegenError::unsupported("string literal", location)),
            other => return Err(CodegenError::unsupported(other.name(), location)),
        }
        Ok(())
    }

    fn gen_binary(&mut self, op: BinOp, left: &AstNode, right: &AstNode) -> Result<(), CodegenError> {
        match op {
            BinOp::And | BinOp::Or => {
                // Short-circuit: the result is 0/1
                let short = self.buf.gen_label(if op == BinOp::And { "andfalse" } else { "ortrue" });
                let end = self.buf.gen_label("logicend");
                let exit_cond = if op == BinOp::And { Cond::E } else { Cond::Ne };
                self.gen_expr(left)?;
                self.buf.test_rax();
                self.buf.jcc(exit_cond, &short)?;
                self.gen_expr(right)?;
                self.buf.test_rax_set(Cond::Ne);
                self.buf.jmp(&end)?;
                self.buf.bind_label(&short)?;
                self.buf.mov_rax_imm((op == BinOp::Or) as i64);
                self.buf.bind_label(&end)
            }
            _ => {
                self.gen_expr(left)?;
                self.buf.push_rax();
                self.gen_expr(right)?;
                self.buf.pop_rcx();
                self.apply_binary(op)
            }
        }
    }

    /// `rax = rcx <op> rax`
    fn apply_binary(&mut self, op: BinOp) -> Result<(), CodegenError> {
        match op {
            BinOp::Add => self.buf.add_rcx(),
            BinOp::Sub => self.buf.sub_from_rcx(),
            BinOp::Mul => self.buf.imul_rcx(),
            BinOp::Div | BinOp::Mod => return self.checked_division(op),
            BinOp::BitAnd => self.buf.and_rcx(),
            BinOp::BitOr => self.buf.or_rcx(),
            BinOp::BitXor => self.buf.xor_rcx(),
            BinOp::Shl => self.buf.shl_rcx_by_rax(),
            BinOp::Shr => self.buf.sar_rcx_by_rax(),
            BinOp::Eq => self.buf.compare_rcx_rax(Cond::E),
            BinOp::Ne => self.buf.compare_rcx_rax(Cond::Ne),
            BinOp::Lt => self.buf.compare_rcx_rax(Cond::L),
            BinOp::Le => self.buf.compare_rcx_rax(Cond::Le),
            BinOp::Gt => self.buf.compare_rcx_rax(Cond::G),
            BinOp::Ge => self.buf.compare_rcx_rax(Cond::Ge),
            // Non-short-circuit forms, only reached through compound assignment
            BinOp::And => {
                self.buf.test_rax_set(Cond::Ne);
                self.buf.emit(&[0x48, 0x85, 0xC9, 0x0F, 0x95, 0xC1]); // test rcx, rcx; setne cl
                self.buf.emit(&[0x48, 0x0F, 0xB6, 0xC9]); // movzx rcx, cl
                self.buf.and_rcx();
            }
            BinOp::Or => {
                self.buf.or_rcx();
                self.buf.test_rax_set(Cond::Ne);
            }
        }
        Ok(())
    }

    /// `rax = rcx / rax` or `rcx % rax`. A zero divisor jumps to the trap
    /// stub; a divisor of -1 wraps without `idiv`, which faults on
    /// `i64::MIN / -1`.
    fn checked_division(&mut self, op: BinOp) -> Result<(), CodegenError> {
        self.divides = true;
        self.buf.test_rax();
        self.buf.jcc(Cond::E, DIVIDE_TRAP)?;

        let divide = self.buf.gen_label("divide");
        let done = self.buf.gen_label("divdone");
        self.buf.cmp_rax_imm8(-1);
        self.buf.jcc(Cond::Ne, &divide)?;
        if op == BinOp::Div {
            self.buf.mov_rax_rcx();
            self.buf.neg_rax();
        } else {
            self.buf.zero_rax();
        }
        self.buf.jmp(&done)?;

        self.buf.bind_label(&divide)?;
        if op == BinOp::Div {
            self.buf.idiv_rcx_by_rax();
        } else {
            self.buf.irem_rcx_by_rax();
        }
        self.buf.bind_label(&done)
    }

    fn gen_unary(&mut self, op: UnOp, operand: &AstNode, location: SourceLocation) -> Result<(), CodegenError> {
        match op {
            UnOp::Neg => {
                self.gen_expr(operand)?;
                self.buf.neg_rax();
            }
            UnOp::Not => {
                self.gen_expr(operand)?;
                self.buf.test_rax_set(Cond::E);
            }
            UnOp::BitNot => {
                self.gen_expr(operand)?;
                self.buf.not_rax();
            }
            UnOp::PreInc | UnOp::PreDec | UnOp::PostInc | UnOp::PostDec => {
                let (disp, ty) = self.local_target(operand)?;
                let postfix = matches!(op, UnOp::PostInc | UnOp::PostDec);
                self.buf.load_local(disp);
                if postfix {
                    self.buf.push_rax();
                }
                if matches!(op, UnOp::PreInc | UnOp::PostInc) {
                    self.buf.emit(&[0x48, 0x83, 0xC0, 0x01]); // add rax, 1
                } else {
                    self.buf.emit(&[0x48, 0x83, 0xE8, 0x01]); // sub rax, 1
                }
                self.narrow(&ty);
                self.buf.store_local(disp);
                if postfix {
                    self.buf.pop_rax();
                }
            }
            UnOp::Deref | UnOp::AddrOf => {
                return Err(CodegenError::unsupported(
                    format!("pointer operator '{}'", if op == UnOp::Deref { "*" } else { "&" }),
                    location,
                ))
            }
        }
        Ok(())
    }

    fn gen_call(&mut self, callee: &AstNode, args: &[AstNode], location: SourceLocation) -> Result<(), CodegenError> {
        let NodeKind::Identifier(name) = &callee.kind else {
            return Err(CodegenError::unsupported("indirect call", location));
        };
        let Some(&expected) = self.functions.get(name) else {
            if LIBRARY_FUNCTIONS.contains(&name.as_str()) {
                return Err(CodegenError::unsupported(format!("built-in function '{}'", name), location));
            }
            return Err(CodegenError::UndefinedFunction {
                name: name.clone(),
                location,
            });
        };
        // Arguments are addressed from the last one pushed, so the count must
        // match the definition even when a prototype said otherwise
        if args.len() != expected {
            return Err(CodegenError::ArgumentCountMismatch {
                function: name.clone(),
                expected,
                got: args.len(),
                location,
            });
        }

        for arg in args {
            self.gen_expr(arg)?;
            self.buf.push_rax();
        }
        self.buf.call(&function_label(name))?;
        if !args.is_empty() {
            self.buf.add_rsp(SLOT_SIZE * args.len() as i32);
        }
        Ok(())
    }

    fn gen_wasm(&mut self, instr: &WasmInstr, location: SourceLocation) -> Result<(), CodegenError> {
        use WasmOp::*;

        match (instr.op, &instr.immediate) {
            (I32Const, WasmImmediate::I32(n)) => {
                self.buf.mov_rax_imm(*n as i64);
                return Ok(());
            }
            (I64Const, WasmImmediate::I64(n)) => {
                self.buf.mov_rax_imm(*n);
                return Ok(());
            }
            _ => {}
        }

        let is_i32 = (I32Eqz.code()..=I32GeU.code()).contains(&instr.op.code())
            || matches!(instr.op, I32Add | I32Sub | I32Mul);
        let (cond, arith) = match instr.op {
            I32Eq | I64Eq => (Some(Cond::E), None),
            I32Ne | I64Ne => (Some(Cond::Ne), None),
            I32LtS | I64LtS => (Some(Cond::L), None),
            I32LtU | I64LtU => (Some(Cond::B), None),
            I32GtS | I64GtS => (Some(Cond::G), None),
            I32GtU | I64GtU => (Some(Cond::A), None),
            I32LeS | I64LeS => (Some(Cond::Le), None),
            I32LeU | I64LeU => (Some(Cond::Be), None),
            I32GeS | I64GeS => (Some(Cond::Ge), None),
            I32GeU | I64GeU => (Some(Cond::Ae), None),
            I32Add | I64Add => (None, Some(BinOp::Add)),
            I32Sub | I64Sub => (None, Some(BinOp::Sub)),
            I32Mul | I64Mul => (None, Some(BinOp::Mul)),
            I32Eqz | I64Eqz => {
                let operand = Self::wasm_operand(instr, 0, location)?;
                self.gen_expr(operand)?;
                if is_i32 {
                    self.buf.emit(&[0x89, 0xC0]); // mov eax, eax
                }
                self.buf.test_rax_set(Cond::E);
                return Ok(());
            }
            op => {
                return Err(CodegenError::unsupported(
                    format!("WASM instruction '{}'", op.name()),
                    location,
                ))
            }
        };

        let unsigned = matches!(cond, Some(Cond::B | Cond::A | Cond::Be | Cond::Ae));
        let extend = |gen: &mut Self| {
            if is_i32 && cond.is_some() {
                if unsigned {
                    gen.buf.emit(&[0x89, 0xC0]); // mov eax, eax
                } else {
                    gen.buf.sign_extend_eax();
                }
            }
        };

        self.gen_expr(Self::wasm_operand(instr, 0, location)?)?;
        extend(self);
        self.buf.push_rax();
        self.gen_expr(Self::wasm_operand(instr, 1, location)?)?;
        extend(self);
        self.buf.pop_rcx();
        match (cond, arith) {
            (Some(cond), _) => self.buf.compare_rcx_rax(cond),
            (None, Some(op)) => {
                self.apply_binary(op)?;
                if is_i32 {
                    self.buf.sign_extend_eax();
                }
            }
            (None, None) => {}
        }
        Ok(())
    }

    fn wasm_operand(instr: &WasmInstr, index: usize, location: SourceLocation) -> Result<&AstNode, CodegenError> {
        instr.operands.get(index).ok_or_else(|| {
            CodegenError::unsupported(
                format!("{} without operand {}", instr.op.name(), index + 1),
                location,
            )
        })
    }
}

/// Compile a translation unit to native code
pub fn compile_program(unit: &AstNode, entry: &str) -> Result<CompiledProgram, CodegenError> {
    stage::run_staged(|| CodeGenerator::new().compile(unit, entry)).map_err(|err| CodegenError::HostThread {
        message: err.to_string(),
    })?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::buffer::FixupKind;
    use crate::parser::parse_source;

    fn compile(source: &str) -> Result<CompiledProgram, CodegenError> {
        let unit = parse_source(source, "gen.c").unwrap();
        compile_program(&unit, "main")
    }

    fn unsupported(source: &str) -> String {
        match compile(source) {
            Err(CodegenError::UnsupportedConstruct { construct, .. }) => construct,
            other => panic!("expected an unsupported construct, got {:?}", other),
        }
    }

    #[test]
    fn test_return_constant_layout() {
        let program = compile("int main() { return 42; }").unwrap();
        assert_eq!(program.entry_offset, 0);
        let expected_prologue = [0x55, 0x48, 0x89, 0xE5, 0x48, 0x81, 0xEC, 0, 0, 0, 0];
        assert_eq!(&program.code[..11], &expected_prologue);
        // mov rax, 42; mov rsp, rbp; pop rbp; ret
        assert_eq!(&program.code[11..], &[0x48, 0xC7, 0xC0, 42, 0, 0, 0, 0x48, 0x89, 0xEC, 0x5D, 0xC3]);
    }

    #[test]
    fn test_frame_size_is_backpatched() {
        let program = compile("int main() { int a = 1; int b = 2; int c = 3; return a + b + c; }").unwrap();
        let frame = i32::from_le_bytes(program.code[7..11].try_into().unwrap());
        assert_eq!(frame, 32);
    }

    #[test]
    fn test_implicit_return_zero() {
        let program = compile("void f() { } int main() { f(); return 1; }").unwrap();
        let f = program.symbols["f"];
        // prologue, mov rax, 0, epilogue
        assert_eq!(&program.code[f + 11..f + 18], &[0x48, 0xC7, 0xC0, 0, 0, 0, 0]);
        assert_eq!(&program.code[f + 18..f + 23], &[0x48, 0x89, 0xEC, 0x5D, 0xC3]);
    }

    #[test]
    fn test_symbols_cover_every_definition() {
        let program =
            compile("int add(int a, int b); int main() { return add(1, 2); } int add(int a, int b) { return a + b; }")
                .unwrap();
        assert_eq!(program.symbols.len(), 2);
        assert_eq!(program.symbols["main"], program.entry_offset);
        assert!(program.symbols["add"] > program.symbols["main"]);
    }

    #[test]
    fn test_every_displacement_reaches_its_label() {
        let source = "
            int fact(int n) { if (n <= 1) return 1; return n * fact(n - 1); }
            int main() {
                int s = 0;
                for (int i = 0; i < 10; i++) { if (i == 3) continue; if (i == 8) break; s += i; }
                while (s > 100) s = s - 1;
                do { s++; } while (s < 5);
                switch (s) { case 1: s = 2; break; default: s = s + fact(3); }
                return s && 1 || 0 ? s : -s;
            }";
        let unit = parse_source(source, "gen.c").unwrap();
        let mut generator = CodeGenerator::new();
        generator.functions.insert("fact".into(), 1);
        generator.functions.insert("main".into(), 0);
        let NodeKind::TranslationUnit { declarations } = &unit.kind else {
            panic!("expected a translation unit");
        };
        for decl in declarations {
            if let NodeKind::FunctionDecl {
                name,
                return_type,
                params,
                body: Some(body),
            } = &decl.kind
            {
                generator.gen_function(name, return_type, params, body, decl.location).unwrap();
            }
        }
        let assembled = generator.buf.finalize().unwrap();
        assert!(assembled.fixups.iter().any(|f| f.kind == FixupKind::Forward));
        assert!(assembled.fixups.iter().any(|f| f.kind == FixupKind::Backward));
        for fixup in &assembled.fixups {
            let at = fixup.offset;
            let disp = i32::from_le_bytes(assembled.code[at..at + 4].try_into().unwrap()) as i64;
            let target = assembled.labels[&fixup.label] as i64;
            assert_eq!(disp + at as i64 + 4, target, "fixup for {}", fixup.label);
        }
    }

    #[test]
    fn test_unsupported_constructs() {
        assert!(unsupported("int main() { double d = 1.5; return 0; }").contains("floating-point"));
        assert!(unsupported("int main() { int *p; return 0; }").contains("pointer"));
        assert!(unsupported("int g; int main() { return g; }").contains("global variable"));
        assert!(unsupported("int main() { printf(\"hi\"); return 0; }").contains("printf"));
        assert!(unsupported("int main() { int a[3]; return 0; }").contains("array"));
        assert_eq!(unsupported("int main() { return 1.0 > 0; }"), "floating-point literal");
    }

    #[test]
    fn test_semantic_errors() {
        assert!(matches!(
            compile("int main() { return missing; }"),
            Err(CodegenError::UndefinedVariable { .. })
        ));
        assert!(matches!(
            compile("int main() { return nothing(); }"),
            Err(CodegenError::UndefinedFunction { .. })
        ));
        assert!(matches!(
            compile("int f(int a) { return a; } int main() { return f(); }"),
            Err(CodegenError::ArgumentCountMismatch { expected: 1, got: 0, .. })
        ));
        assert!(matches!(
            compile("int main() { break; return 0; }"),
            Err(CodegenError::StrayControl { statement: "break", .. })
        ));
        assert!(matches!(
            compile("int helper() { return 1; }"),
            Err(CodegenError::NoEntryPoint { .. })
        ));
    }

    #[test]
    fn test_division_checks_share_one_trap() {
        let stub: [u8; 13] = [0x48, 0x89, 0xDC, 0xBA, 1, 0, 0, 0, 0x31, 0xC0, 0x5D, 0x5B, 0xC3];
        let program = compile("int main() { int a = 7; int b = 2; a /= b; return a / b + a % b; }").unwrap();
        assert!(program.code.ends_with(&stub));
        assert_eq!(program.code.windows(stub.len()).filter(|w| *w == &stub[..]).count(), 1);

        let plain = compile("int main() { return 6 * 7; }").unwrap();
        assert!(!plain.code.windows(stub.len()).any(|w| w == &stub[..]));
    }

    #[test]
    fn test_prototype_does_not_relax_argument_count() {
        assert!(matches!(
            compile("int f(); int main() { return f(1, 2); } int f(int a) { return a; }"),
            Err(CodegenError::ArgumentCountMismatch { expected: 1, got: 2, .. })
        ));
        assert!(compile("int f(); int main() { return f(3); } int f(int a) { return a; }").is_ok());
    }

    #[test]
    fn test_enum_constants_are_immediates() {
        let program = compile("enum { A = 2, B = A << 3 }; int main() { return B; }").unwrap();
        assert_eq!(&program.code[11..18], &[0x48, 0xC7, 0xC0, 16, 0, 0, 0]);
    }
}
