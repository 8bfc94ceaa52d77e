use std::rc::Rc;

use crate::lexer::Span;
use crate::parser::ast::{Expr, InfixOp, PrefixOp, SpannedExpr, SpannedStmt, Stmt};

use super::builtins::BuiltinId;
use super::bytecode::{Chunk, CompiledFunction, OpCode};
use super::value::Value;

/// Compile error with source location
#[derive(Debug, Clone, PartialEq)]
pub struct CompileError {
    pub message: String,
    pub span: Span,
}

impl CompileError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Compile error at {}:{}: {}",
            self.span.line, self.span.column, self.message
        )
    }
}

impl std::error::Error for CompileError {}

/// A binding name resolved to a stack slot. Aliases share the slot.
#[derive(Debug, Clone)]
struct Local {
    name: String,
    slot: u8,
}

/// Where `let` bindings live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Synthesized unit body: parameters and lets are stack slots
    Unit,
    /// Top-level script: lets define globals on the `Env`
    Script,
}

/// Compiler state for one unit or script
pub struct Compiler {
    function: CompiledFunction,
    locals: Vec<Local>,
    slot_count: usize,
    mode: Mode,
    current_line: u32,
}

impl Compiler {
    fn new(function: CompiledFunction, mode: Mode) -> Self {
        Self {
            function,
            locals: Vec::new(),
            slot_count: 0,
            mode,
            current_line: 1,
        }
    }

    /// Compile a synthesized unit body.
    ///
    /// `slots` lists, per positional parameter, every binding name that reads
    /// it. A variadic unit receives a single slot holding all arguments.
    pub fn compile_unit(
        name: &str,
        slots: &[Vec<String>],
        variadic: bool,
        stmts: &[SpannedStmt],
    ) -> Result<CompiledFunction, CompileError> {
        if slots.len() > u8::MAX as usize {
            return Err(CompileError::new(
                "Too many parameters (max 255)",
                first_span(stmts),
            ));
        }

        let function = if variadic {
            CompiledFunction::new_variadic(Some(name.to_string()))
        } else {
            CompiledFunction::new(slots.len() as u8, Some(name.to_string()))
        };
        let mut compiler = Compiler::new(function, Mode::Unit);

        for names in slots {
            let slot = compiler.slot_count as u8;
            for name in names {
                compiler.locals.push(Local {
                    name: name.clone(),
                    slot,
                });
            }
            compiler.slot_count += 1;
        }

        compiler.body(stmts)?;
        Ok(compiler.function)
    }

    /// Compile top-level statements; `let` defines globals
    pub fn compile_script(stmts: &[SpannedStmt]) -> Result<CompiledFunction, CompileError> {
        let mut compiler = Compiler::new(CompiledFunction::new(0, None), Mode::Script);
        compiler.body(stmts)?;
        Ok(compiler.function)
    }

    /// The value of an explicit `return` wins; otherwise a trailing expression
    /// statement is the result, and anything else yields nil.
    fn body(&mut self, stmts: &[SpannedStmt]) -> Result<(), CompileError> {
        if stmts.is_empty() {
            self.emit(OpCode::Nil);
            self.emit(OpCode::Return);
            return Ok(());
        }

        for (i, stmt) in stmts.iter().enumerate() {
            let is_last = i == stmts.len() - 1;
            self.current_line = stmt.span.line;

            match &stmt.node {
                Stmt::Expr(expr) => {
                    self.expression(expr)?;
                    if !is_last {
                        self.emit(OpCode::Pop);
                    }
                }
                Stmt::Let { name, value } => {
                    self.compile_let(name, value, stmt.span)?;
                    if is_last {
                        self.emit(OpCode::Nil);
                    }
                }
                Stmt::Return(expr) => {
                    self.expression(expr)?;
                    self.emit(OpCode::Return);
                }
            }
        }

        if let Some(last) = stmts.last()
            && !matches!(last.node, Stmt::Return(_))
        {
            self.emit(OpCode::Return);
        }
        Ok(())
    }

    fn chunk(&mut self) -> &mut Chunk {
        &mut self.function.chunk
    }

    fn emit(&mut self, op: OpCode) {
        let line = self.current_line;
        self.chunk().write(op, line);
    }

    fn emit_with_operand(&mut self, op: OpCode, operand: u8) {
        self.emit(op);
        self.chunk().write_operand(operand);
    }

    fn emit_constant(&mut self, value: Value, span: Span) -> Result<(), CompileError> {
        let idx = self.chunk().add_constant(value);
        if idx <= 255 {
            self.emit_with_operand(OpCode::Constant, idx as u8);
        } else if idx <= 65535 {
            self.emit(OpCode::ConstantLong);
            self.chunk().write_operand_u16(idx as u16);
        } else {
            return Err(CompileError::new("Too many constants in one chunk", span));
        }
        Ok(())
    }

    /// Names share the one-byte operand space, so they must sit in the first 256 constants
    fn name_operand(&mut self, name: &str, span: Span) -> Result<u8, CompileError> {
        let idx = self.chunk().name_constant(name);
        u8::try_from(idx).map_err(|_| CompileError::new("Too many names in one chunk", span))
    }

    /// Emit a jump instruction and return the offset for patching
    fn emit_jump(&mut self, op: OpCode) -> usize {
        self.emit(op);
        self.chunk().write_operand(0xFF);
        self.chunk().write_operand(0xFF);
        self.chunk().len() - 2
    }

    fn patch_jump(&mut self, offset: usize, span: Span) -> Result<(), CompileError> {
        if self.chunk().patch_jump(offset) {
            Ok(())
        } else {
            Err(CompileError::new("Jump offset too large", span))
        }
    }

    fn resolve_local(&self, name: &str) -> Option<u8> {
        self.locals
            .iter()
            .rev()
            .find(|local| local.name == name)
            .map(|local| local.slot)
    }

    fn expression(&mut self, expr: &SpannedExpr) -> Result<(), CompileError> {
        self.current_line = expr.span.line;

        match &expr.node {
            // Literals
            Expr::Integer(n) => self.emit_constant(Value::Integer(*n), expr.span)?,
            Expr::Decimal(n) => self.emit_constant(Value::from(*n), expr.span)?,
            Expr::String(s) => {
                self.emit_constant(Value::String(Rc::new(s.clone())), expr.span)?
            }
            Expr::Boolean(true) => self.emit(OpCode::True),
            Expr::Boolean(false) => self.emit(OpCode::False),
            Expr::Nil => self.emit(OpCode::Nil),

            // Collections
            Expr::List(elements) => {
                if elements.len() > 255 {
                    return Err(CompileError::new(
                        "Too many elements in list literal (max 255)",
                        expr.span,
                    ));
                }
                for element in elements {
                    self.expression(element)?;
                }
                self.emit_with_operand(OpCode::MakeList, elements.len() as u8);
            }
            Expr::Dict(entries) => {
                if entries.len() > 255 {
                    return Err(CompileError::new(
                        "Too many entries in dict literal (max 255)",
                        expr.span,
                    ));
                }
                for (key, value) in entries {
                    self.expression(key)?;
                    self.expression(value)?;
                }
                self.emit_with_operand(OpCode::MakeDict, entries.len() as u8);
            }

            Expr::Identifier(name) => self.compile_identifier(name, expr.span)?,

            Expr::Prefix { op, right } => {
                self.expression(right)?;
                match op {
                    PrefixOp::Neg => self.emit(OpCode::Neg),
                    PrefixOp::Not => self.emit(OpCode::Not),
                }
            }
            Expr::Infix { left, op, right } => self.compile_infix(left, *op, right, expr.span)?,

            Expr::Index { collection, index } => {
                self.expression(collection)?;
                self.expression(index)?;
                self.emit(OpCode::Index);
            }
            Expr::Member { object, name } => {
                self.expression(object)?;
                let idx = self.name_operand(name, expr.span)?;
                self.emit_with_operand(OpCode::Member, idx);
            }

            Expr::Call { function, args } => self.compile_call(function, args, expr.span)?,

            Expr::Conditional {
                condition,
                then_branch,
                else_branch,
            } => {
                self.expression(condition)?;
                let then_jump = self.emit_jump(OpCode::JumpIfFalse);
                self.emit(OpCode::Pop); // Pop condition if truthy
                self.expression(then_branch)?;

                let else_jump = self.emit_jump(OpCode::Jump);
                self.patch_jump(then_jump, expr.span)?;
                self.emit(OpCode::Pop); // Pop condition if falsy
                self.expression(else_branch)?;
                self.patch_jump(else_jump, expr.span)?;
            }

            Expr::Sequence(items) => {
                for (i, item) in items.iter().enumerate() {
                    self.expression(item)?;
                    if i + 1 < items.len() {
                        self.emit(OpCode::Pop);
                    }
                }
                if items.is_empty() {
                    self.emit(OpCode::Nil);
                }
            }
        }

        Ok(())
    }

    fn compile_infix(
        &mut self,
        left: &SpannedExpr,
        op: InfixOp,
        right: &SpannedExpr,
        span: Span,
    ) -> Result<(), CompileError> {
        // Short-circuit operators leave the deciding operand as the result
        match op {
            InfixOp::And => {
                self.expression(left)?;
                let jump = self.emit_jump(OpCode::PopJumpIfFalse);
                self.expression(right)?;
                return self.patch_jump(jump, span);
            }
            InfixOp::Or => {
                self.expression(left)?;
                let jump = self.emit_jump(OpCode::PopJumpIfTrue);
                self.expression(right)?;
                return self.patch_jump(jump, span);
            }
            _ => {}
        }

        self.expression(left)?;
        self.expression(right)?;

        let opcode = match op {
            InfixOp::Add => OpCode::Add,
            InfixOp::Sub => OpCode::Sub,
            InfixOp::Mul => OpCode::Mul,
            InfixOp::Div => OpCode::Div,
            InfixOp::Mod => OpCode::Mod,
            InfixOp::Eq => OpCode::Eq,
            InfixOp::Ne => OpCode::Ne,
            InfixOp::Lt => OpCode::Lt,
            InfixOp::Le => OpCode::Le,
            InfixOp::Gt => OpCode::Gt,
            InfixOp::Ge => OpCode::Ge,
            InfixOp::And | InfixOp::Or => unreachable!("Handled above"),
        };
        self.emit(opcode);
        Ok(())
    }

    /// Builtins are bound at compile time unless a local shadows the name;
    /// anything else is looked up among the live units when the call runs.
    fn compile_call(
        &mut self,
        function: &str,
        args: &[SpannedExpr],
        span: Span,
    ) -> Result<(), CompileError> {
        if args.len() > 255 {
            return Err(CompileError::new("Too many arguments (max 255)", span));
        }

        for arg in args {
            self.expression(arg)?;
        }
        self.current_line = span.line;

        if let Some(builtin_id) = BuiltinId::from_name(function)
            && self.resolve_local(function).is_none()
        {
            self.emit(OpCode::CallBuiltin);
            self.chunk().write_operand_u16(builtin_id as u16);
            self.chunk().write_operand(args.len() as u8);
            return Ok(());
        }

        let name_idx = self.name_operand(function, span)?;
        self.emit_with_operand(OpCode::CallNamed, name_idx);
        self.chunk().write_operand(args.len() as u8);
        Ok(())
    }

    fn compile_identifier(&mut self, name: &str, span: Span) -> Result<(), CompileError> {
        if let Some(slot) = self.resolve_local(name) {
            self.emit_with_operand(OpCode::GetLocal, slot);
            return Ok(());
        }

        // The runtime resolves globals defined on the Env
        let name_idx = self.name_operand(name, span)?;
        self.emit_with_operand(OpCode::GetGlobal, name_idx);
        Ok(())
    }

    fn compile_let(
        &mut self,
        name: &str,
        value: &SpannedExpr,
        span: Span,
    ) -> Result<(), CompileError> {
        // The value is compiled before the name is bound, so `let x = x + 1`
        // reads the previous binding.
        self.expression(value)?;

        match self.mode {
            Mode::Script => {
                let name_idx = self.name_operand(name, span)?;
                self.emit_with_operand(OpCode::SetGlobal, name_idx);
                // SetGlobal only peeks
                self.emit(OpCode::Pop);
            }
            Mode::Unit => {
                // The value stays on the stack as the new slot
                if self.slot_count >= 255 {
                    return Err(CompileError::new("Too many local variables (max 255)", span));
                }
                self.locals.push(Local {
                    name: name.to_string(),
                    slot: self.slot_count as u8,
                });
                self.slot_count += 1;
            }
        }
        Ok(())
    }
}

fn first_span(stmts: &[SpannedStmt]) -> Span {
    stmts.first().map(|stmt| stmt.span).unwrap_or(Span {
        start: 0,
        end: 0,
        line: 1,
        column: 1,
    })
}
