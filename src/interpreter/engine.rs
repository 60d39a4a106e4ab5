// Execution engine for the interpreter

use crate::interpreter::constants::{
    DEFAULT_MAX_CALL_DEPTH, DEFAULT_MAX_HEAP_CELLS, DEFAULT_MAX_STACK_CELLS, HOST_STACK_PER_CALL,
};
use crate::interpreter::errors::RuntimeError;
use crate::memory::layout::TypeTable;
use crate::memory::stack::LocalVar;
use crate::memory::value::{Address, Value};
use crate::memory::Memory;
use crate::parser::ast::*;
use crate::stage;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Limits and entry point of one interpreter run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterpreterConfig {
    pub max_call_depth: usize,
    pub max_stack_cells: usize,
    pub max_heap_cells: usize,
    pub entry_point: String,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        InterpreterConfig {
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            max_stack_cells: DEFAULT_MAX_STACK_CELLS,
            max_heap_cells: DEFAULT_MAX_HEAP_CELLS,
            entry_point: "main".to_string(),
        }
    }
}

/// Outcome of executing one statement
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum ControlSignal {
    Normal,
    Return(Value),
    Break,
    Continue,
}

/// A function definition, indexed by name
#[derive(Debug, Clone)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: Type,
    pub body: AstNode,
    pub location: SourceLocation,
}

/// The tree-walking interpreter
pub struct Interpreter {
    pub(crate) config: InterpreterConfig,

    /// Stack (globals and frames) and heap cells
    pub(crate) memory: Memory,

    /// Struct, union and typedef definitions seen so far
    pub(crate) types: TypeTable,

    /// Function definitions (name -> FunctionDef)
    pub(crate) functions: FxHashMap<String, Arc<FunctionDef>>,

    /// Functions that were only declared by a prototype
    pub(crate) prototypes: FxHashMap<String, Type>,

    /// Global variables, allocated at the bottom of the stack
    pub(crate) globals: FxHashMap<String, LocalVar>,

    /// Enumerator values
    pub(crate) constants: FxHashMap<String, i64>,

    /// Top-level declarations other than functions, run once in order
    top_level: Vec<AstNode>,
    prepared: bool,

    /// Interned string literals (contents -> heap address)
    pub(crate) strings: FxHashMap<String, Address>,

    /// Text written by printf/putchar/puts
    pub(crate) output: String,
}

impl Interpreter {
    /// Create a new interpreter for a translation unit
    pub fn new(unit: &AstNode, config: InterpreterConfig) -> Self {
        let mut functions = FxHashMap::default();
        let mut prototypes = FxHashMap::default();
        let mut top_level = Vec::new();

        let declarations: &[AstNode] = match &unit.kind {
            NodeKind::TranslationUnit { declarations } => declarations,
            _ => std::slice::from_ref(unit),
        };

        // Index functions for fast lookup; everything else runs in `prepare`
        for decl in declarations {
            match &decl.kind {
                NodeKind::FunctionDecl {
                    name,
                    return_type,
                    params,
                    body: Some(body),
                } => {
                    functions.insert(
                        name.clone(),
                        Arc::new(FunctionDef {
                            name: name.clone(),
                            params: params.clone(),
                            return_type: return_type.clone(),
                            body: body.as_ref().clone(),
                            location: decl.location,
                        }),
                    );
                }
                NodeKind::FunctionDecl {
                    name, return_type, ..
                } => {
                    prototypes.insert(name.clone(), return_type.clone());
                }
                _ => top_level.push(decl.clone()),
            }
        }

        tracing::debug!(
            functions = functions.len(),
            declarations = top_level.len(),
            "interpreter loaded unit"
        );

        Interpreter {
            memory: Memory::new(config.max_stack_cells, config.max_heap_cells),
            config,
            types: TypeTable::new(),
            functions,
            prototypes,
            globals: FxHashMap::default(),
            constants: FxHashMap::default(),
            top_level,
            prepared: false,
            strings: FxHashMap::default(),
            output: String::new(),
        }
    }

    /// Run the entry point and return its result as the program status.
    /// A call to `exit()` ends the run with the status it was given.
    ///
    /// The program runs on a stage thread whose stack holds
    /// `max_call_depth` nested calls, so running out of depth is reported as
    /// [`RuntimeError::StackOverflow`].
    pub fn run(&mut self) -> Result<i64, RuntimeError> {
        let stack_size = self.host_stack_size();
        stage::run_on_stage_stack(stack_size, || self.run_entry()).map_err(Self::host_thread_error)?
    }

    fn run_entry(&mut self) -> Result<i64, RuntimeError> {
        let entry = self.config.entry_point.clone();
        let result = self.prepare().and_then(|_| {
            let func = self
                .functions
                .get(&entry)
                .cloned()
                .ok_or_else(|| RuntimeError::NoEntryPoint { name: entry.clone() })?;
            // `int main(int argc, char **argv)` receives zeros
            let args = func
                .params
                .iter()
                .map(|p| {
                    if p.param_type.pointer_depth > 0 {
                        Value::NULL
                    } else {
                        Value::Int(0)
                    }
                })
                .collect();
            self.call_user_function(&func, args, func.location)
        });

        match result {
            Ok(value) => Ok(Self::status_of(value)),
            Err(RuntimeError::ProgramExit { code }) => Ok(code),
            Err(err) => Err(err),
        }
    }

    /// Call a function by name with already evaluated arguments
    pub fn call_function(&mut self, name: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
        let stack_size = self.host_stack_size();
        stage::run_on_stage_stack(stack_size, || self.call_by_name(name, args))
            .map_err(Self::host_thread_error)?
    }

    fn call_by_name(&mut self, name: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
        self.prepare()?;
        let func = self
            .functions
            .get(name)
            .cloned()
            .ok_or_else(|| RuntimeError::UndefinedFunction {
                name: name.to_string(),
                location: SourceLocation::default(),
            })?;
        self.call_user_function(&func, args, func.location)
    }

    /// Everything printed by the program so far
    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn take_output(&mut self) -> String {
        std::mem::take(&mut self.output)
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    fn host_stack_size(&self) -> usize {
        self.config.max_call_depth.saturating_add(1).saturating_mul(HOST_STACK_PER_CALL)
    }

    fn host_thread_error(err: std::io::Error) -> RuntimeError {
        RuntimeError::HostThread {
            message: err.to_string(),
        }
    }

    fn status_of(value: Value) -> i64 {
        match value {
            Value::Int(n) => n,
            Value::Float(x) => x as i64,
            Value::Pointer(addr) => addr as i64,
            Value::Uninitialized => 0,
        }
    }

    /// Register types and enumerators and initialize globals, in declaration order
    pub(crate) fn prepare(&mut self) -> Result<(), RuntimeError> {
        if self.prepared {
            return Ok(());
        }
        self.prepared = true;

        let top_level = std::mem::take(&mut self.top_level);
        for decl in &top_level {
            match &decl.kind {
                NodeKind::VarDecl {
                    name,
                    var_type,
                    init,
                } => self.declare_global(name, var_type, init.as_deref(), decl.location)?,
                NodeKind::DeclStmt { declarations } => {
                    for inner in declarations {
                        if let NodeKind::VarDecl {
                            name,
                            var_type,
                            init,
                        } = &inner.kind
                        {
                            self.declare_global(name, var_type, init.as_deref(), inner.location)?;
                        } else {
                            self.register_type_decl(inner)?;
                        }
                    }
                }
                _ => self.register_type_decl(decl)?,
            }
        }
        tracing::debug!(globals = self.globals.len(), "globals initialized");
        Ok(())
    }

    fn declare_global(
        &mut self,
        name: &str,
        var_type: &Type,
        init: Option<&AstNode>,
        location: SourceLocation,
    ) -> Result<(), RuntimeError> {
        let resolved = self.complete_declared_type(var_type, init, location)?;
        let count = self.cell_count(&resolved, location)?.max(1);
        let address = self
            .memory
            .stack
            .allocate(count)
            .map_err(|e| RuntimeError::from_memory(e, location))?;
        // Globals start zeroed
        self.memory
            .fill(address, count, Value::Int(0))
            .map_err(|e| RuntimeError::from_memory(e, location))?;
        self.globals.insert(
            name.to_string(),
            LocalVar {
                address,
                var_type: resolved.clone(),
            },
        );
        if let Some(init) = init {
            self.initialize(address, &resolved, init, location)?;
        }
        Ok(())
    }

    /// Record struct, union, enum and typedef declarations
    pub(crate) fn register_type_decl(&mut self, decl: &AstNode) -> Result<(), RuntimeError> {
        match &decl.kind {
            NodeKind::StructDecl { name, fields } => {
                self.types.define_struct(name, fields.clone());
            }
            NodeKind::UnionDecl { name, fields } => {
                self.types.define_union(name, fields.clone());
            }
            NodeKind::TypedefDecl { name, target } => {
                self.types.define_typedef(name, target.clone());
            }
            NodeKind::EnumDecl { constants, .. } => {
                let mut next = 0i64;
                for constant in constants {
                    let value = match &constant.value {
                        Some(expr) => self.evaluate_expr(expr)?.as_int().ok_or_else(|| {
                            RuntimeError::type_error(
                                format!("enumerator '{}' is not an integer", constant.name),
                                expr.location,
                            )
                        })?,
                        None => next,
                    };
                    self.constants.insert(constant.name.clone(), value);
                    next = value.wrapping_add(1);
                }
            }
            NodeKind::Empty => {}
            other => {
                return Err(RuntimeError::unsupported(
                    format!("{} at file scope", other.name()),
                    decl.location,
                ))
            }
        }
        Ok(())
    }

    /// Look up a variable: current frame first, then globals
    pub(crate) fn lookup_var(&self, name: &str) -> Option<LocalVar> {
        self.memory
            .stack
            .current_frame()
            .and_then(|frame| frame.get_var(name))
            .or_else(|| self.globals.get(name))
            .cloned()
    }

    /// Allocate cells for a local variable in the current scope
    pub(crate) fn declare_local(
        &mut self,
        name: &str,
        var_type: Type,
        location: SourceLocation,
    ) -> Result<Address, RuntimeError> {
        let count = self.cell_count(&var_type, location)?.max(1);
        let address = self
            .memory
            .stack
            .allocate(count)
            .map_err(|e| RuntimeError::from_memory(e, location))?;
        match self.memory.stack.current_frame_mut() {
            Some(frame) => frame.declare_var(name.to_string(), var_type, address),
            None => {
                self.globals
                    .insert(name.to_string(), LocalVar { address, var_type });
            }
        }
        Ok(address)
    }

    pub(crate) fn enter_scope(&mut self) {
        self.memory.stack.push_scope();
    }

    pub(crate) fn exit_scope(&mut self) {
        self.memory.stack.pop_scope();
    }

    /// Push a frame, bind the arguments, run the body and pop the frame
    pub(crate) fn call_user_function(
        &mut self,
        func: &FunctionDef,
        args: Vec<Value>,
        location: SourceLocation,
    ) -> Result<Value, RuntimeError> {
        if self.memory.stack.depth() >= self.config.max_call_depth {
            return Err(RuntimeError::StackOverflow {
                depth: self.config.max_call_depth,
                location,
            });
        }
        if args.len() != func.params.len() {
            return Err(RuntimeError::ArgumentCountMismatch {
                function: func.name.clone(),
                expected: func.params.len(),
                got: args.len(),
                location,
            });
        }
        let return_type = self.resolve_type(&func.return_type, location)?;
        if self.is_aggregate(&return_type, location)? {
            return Err(RuntimeError::unsupported(
                format!("returning '{}' by value from '{}'", return_type, func.name),
                func.location,
            ));
        }

        tracing::trace!(function = %func.name, depth = self.memory.stack.depth() + 1, "call");
        self.memory.stack.push_frame(func.name.clone());
        let result = self
            .bind_parameters(func, args)
            .and_then(|_| self.execute_statement(&func.body));
        self.memory.stack.pop_frame();
        tracing::trace!(function = %func.name, "return");

        let value = match result? {
            ControlSignal::Return(value) => value,
            ControlSignal::Normal => Value::Int(0),
            ControlSignal::Break => {
                return Err(RuntimeError::StrayControl {
                    statement: "break",
                    location: func.location,
                })
            }
            ControlSignal::Continue => {
                return Err(RuntimeError::StrayControl {
                    statement: "continue",
                    location: func.location,
                })
            }
        };

        if return_type.base == BaseType::Void && return_type.pointer_depth == 0 {
            return Ok(Value::Int(0));
        }
        Ok(Self::coerce(value, &return_type))
    }

    fn bind_parameters(&mut self, func: &FunctionDef, args: Vec<Value>) -> Result<(), RuntimeError> {
        for (param, arg) in func.params.iter().zip(args) {
            let param_type = self.resolve_type(&param.param_type, func.location)?;
            let address = self.declare_local(&param.name, param_type.clone(), func.location)?;
            self.initialize_value(address, &param_type, arg, func.location)?;
        }
        Ok(())
    }

    pub(crate) fn resolve_type(
        &self,
        ty: &Type,
        location: SourceLocation,
    ) -> Result<Type, RuntimeError> {
        self.types
            .resolve(ty)
            .map_err(|e| RuntimeError::from_layout(e, location))
    }

    pub(crate) fn cell_count(&self, ty: &Type, location: SourceLocation) -> Result<usize, RuntimeError> {
        self.types
            .cell_count(ty)
            .map_err(|e| RuntimeError::from_layout(e, location))
    }

    pub(crate) fn is_aggregate(&self, ty: &Type, location: SourceLocation) -> Result<bool, RuntimeError> {
        self.types
            .is_aggregate(ty)
            .map_err(|e| RuntimeError::from_layout(e, location))
    }

    /// Resolve a declared type, sizing `T x[] = "..."` from its initializer
    pub(crate) fn complete_declared_type(
        &self,
        var_type: &Type,
        init: Option<&AstNode>,
        location: SourceLocation,
    ) -> Result<Type, RuntimeError> {
        let mut resolved = self.resolve_type(var_type, location)?;
        if resolved.array_dims.first() == Some(&None) {
            match init.map(|i| &i.kind) {
                Some(NodeKind::StringLiteral(s)) => {
                    resolved.array_dims[0] = Some(s.len() as u32 + 1);
                }
                _ => {
                    return Err(RuntimeError::type_error(
                        format!("array size missing in declaration of type '{}'", resolved),
                        location,
                    ))
                }
            }
        }
        Ok(resolved)
    }
}
