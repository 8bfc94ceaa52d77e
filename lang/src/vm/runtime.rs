use im_rc::Vector;
use ordered_float::OrderedFloat;
use std::rc::Rc;
use unicode_segmentation::UnicodeSegmentation;

use super::builtins::{self, BuiltinId};
use super::bytecode::{Chunk, CompiledFunction, OpCode};
use super::value::Value;
use crate::error::LambdaError;
use crate::lambda::Env;

/// Deepest chain of unit calls a single VM will follow
pub const MAX_FRAMES: usize = 64;

/// Largest string (in bytes) or list (in elements) that `*` will build
pub const MAX_REPEAT_LEN: usize = 1 << 24;

/// One entry of a runtime error's trace, innermost first
#[derive(Debug, Clone, PartialEq)]
pub struct StackFrame {
    /// `None` for top-level script code
    pub unit_name: Option<String>,
    pub line: u32,
}

/// Runtime error with message and stack trace
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeError {
    pub message: String,
    pub line: u32,
    pub stack_trace: Vec<StackFrame>,
}

impl RuntimeError {
    pub fn new(message: impl Into<String>, line: u32) -> Self {
        Self {
            message: message.into(),
            line,
            stack_trace: Vec::new(),
        }
    }

    pub fn add_frame(&mut self, unit_name: Option<String>, line: u32) {
        self.stack_trace.push(StackFrame { unit_name, line });
    }
}

impl std::fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Runtime error at line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for RuntimeError {}

/// Call frame for unit execution
#[derive(Debug)]
struct CallFrame {
    function: Rc<CompiledFunction>,
    /// Instruction pointer within the function's chunk
    ip: usize,
    /// Base of the stack for this frame's slots
    stack_base: usize,
}

impl CallFrame {
    fn new(function: Rc<CompiledFunction>, stack_base: usize) -> Self {
        Self {
            function,
            ip: 0,
            stack_base,
        }
    }

    fn chunk(&self) -> &Chunk {
        &self.function.chunk
    }

    fn read_byte(&mut self) -> u8 {
        let byte = self.chunk().code[self.ip];
        self.ip += 1;
        byte
    }

    fn read_u16(&mut self) -> u16 {
        let hi = self.chunk().code[self.ip] as u16;
        let lo = self.chunk().code[self.ip + 1] as u16;
        self.ip += 2;
        (hi << 8) | lo
    }

    fn current_line(&self) -> u32 {
        self.chunk().get_line(self.ip.saturating_sub(1))
    }
}

/// Numeric operands after promotion: Integer with Decimal computes in Decimal
enum Numeric {
    Int(i64, i64),
    Dec(f64, f64),
}

fn numeric_pair(a: &Value, b: &Value) -> Option<Numeric> {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => Some(Numeric::Int(*x, *y)),
        (Value::Integer(x), Value::Decimal(y)) => Some(Numeric::Dec(*x as f64, y.0)),
        (Value::Decimal(x), Value::Integer(y)) => Some(Numeric::Dec(x.0, *y as f64)),
        (Value::Decimal(x), Value::Decimal(y)) => Some(Numeric::Dec(x.0, y.0)),
        _ => None,
    }
}

fn decimal(n: f64) -> Value {
    Value::Decimal(OrderedFloat(n))
}

/// The stack VM. Globals and live units are resolved through the borrowed `Env`.
pub struct VM<'env> {
    stack: Vec<Value>,
    frames: Vec<CallFrame>,
    env: &'env Env,
}

impl<'env> VM<'env> {
    pub fn new(env: &'env Env) -> Self {
        Self {
            stack: Vec::with_capacity(256),
            frames: Vec::with_capacity(MAX_FRAMES),
            env,
        }
    }

    /// Run top-level script code
    pub fn run(&mut self, function: Rc<CompiledFunction>) -> Result<Value, LambdaError> {
        self.stack.clear();
        self.frames.clear();
        self.frames.push(CallFrame::new(function, 0));
        self.execute_traced()
    }

    /// Invoke a compiled unit with positional arguments
    pub fn call(
        &mut self,
        function: Rc<CompiledFunction>,
        args: &[Value],
    ) -> Result<Value, LambdaError> {
        self.stack.clear();
        self.frames.clear();
        self.stack.extend(args.iter().cloned());
        self.enter(function, args.len())?;
        self.execute_traced()
    }

    /// Attach the active frames to a runtime error on its way out
    fn execute_traced(&mut self) -> Result<Value, LambdaError> {
        self.execute().map_err(|err| match err {
            LambdaError::Runtime(mut err) => {
                for frame in self.frames.iter().rev() {
                    err.add_frame(frame.function.name.clone(), frame.current_line());
                }
                LambdaError::Runtime(err)
            }
            other => other,
        })
    }

    /// Push a frame for `function` whose `argc` arguments are on top of the stack
    fn enter(&mut self, function: Rc<CompiledFunction>, argc: usize) -> Result<(), LambdaError> {
        if function.variadic {
            let start = self.stack.len() - argc;
            let args: Vector<Value> = self.stack.drain(start..).collect();
            self.push(Value::List(args));
        } else if argc != function.arity as usize {
            return Err(self.error(format!(
                "{} expects {} argument(s), got {}",
                function.name.as_deref().unwrap_or("<script>"),
                function.arity,
                argc
            )));
        }

        if self.frames.len() >= MAX_FRAMES {
            return Err(self.error("Stack overflow"));
        }

        let slots = function.arity as usize;
        let stack_base = self.stack.len() - slots;
        self.frames.push(CallFrame::new(function, stack_base));
        Ok(())
    }

    /// Main execution loop
    fn execute(&mut self) -> Result<Value, LambdaError> {
        loop {
            let instruction = self.read_byte();

            match OpCode::try_from(instruction) {
                Ok(OpCode::Constant) => {
                    let idx = self.read_byte() as usize;
                    let value = self.current_chunk().constants[idx].clone();
                    self.push(value);
                }
                Ok(OpCode::ConstantLong) => {
                    let idx = self.read_u16() as usize;
                    let value = self.current_chunk().constants[idx].clone();
                    self.push(value);
                }

                Ok(OpCode::Nil) => self.push(Value::Nil),
                Ok(OpCode::True) => self.push(Value::Boolean(true)),
                Ok(OpCode::False) => self.push(Value::Boolean(false)),

                Ok(OpCode::Pop) => {
                    self.pop();
                }

                // Variables
                Ok(OpCode::GetLocal) => {
                    let slot = self.read_byte() as usize;
                    let base = self.current_frame().stack_base;
                    let value = self.stack[base + slot].clone();
                    self.push(value);
                }
                Ok(OpCode::SetLocal) => {
                    let slot = self.read_byte() as usize;
                    let base = self.current_frame().stack_base;
                    let value = self.peek(0).clone();
                    self.stack[base + slot] = value;
                }
                Ok(OpCode::GetGlobal) => {
                    let idx = self.read_byte() as usize;
                    let name = self.get_constant_string(idx)?;
                    let value = self
                        .env
                        .global(&name)
                        .ok_or_else(|| self.error(format!("Undefined variable '{name}'")))?;
                    self.push(value);
                }
                Ok(OpCode::SetGlobal) => {
                    let idx = self.read_byte() as usize;
                    let name = self.get_constant_string(idx)?;
                    let value = self.peek(0).clone();
                    self.env.define(name, value);
                }

                // Arithmetic
                Ok(OpCode::Add) => self.binary_add()?,
                Ok(OpCode::Sub) => self.binary_sub()?,
                Ok(OpCode::Mul) => self.binary_mul()?,
                Ok(OpCode::Div) => self.binary_div()?,
                Ok(OpCode::Mod) => self.binary_mod()?,
                Ok(OpCode::Neg) => self.unary_neg()?,

                // Comparison
                Ok(OpCode::Eq) => {
                    let b = self.pop();
                    let a = self.pop();
                    self.push(Value::Boolean(a == b));
                }
                Ok(OpCode::Ne) => {
                    let b = self.pop();
                    let a = self.pop();
                    self.push(Value::Boolean(a != b));
                }
                Ok(op @ (OpCode::Lt | OpCode::Le | OpCode::Gt | OpCode::Ge)) => {
                    self.binary_compare(op)?
                }

                // Logical
                Ok(OpCode::Not) => {
                    let value = self.pop();
                    self.push(Value::Boolean(!value.is_truthy()));
                }

                // Collections
                Ok(OpCode::MakeList) => {
                    let count = self.read_byte() as usize;
                    let start = self.stack.len() - count;
                    let elements: Vector<Value> = self.stack.drain(start..).collect();
                    self.push(Value::List(elements));
                }
                Ok(OpCode::MakeDict) => {
                    let count = self.read_byte() as usize;
                    let start = self.stack.len() - count * 2;
                    let flat: Vec<Value> = self.stack.drain(start..).collect();
                    let mut entries = indexmap::IndexMap::with_capacity(count);
                    // Stack holds key1, val1, key2, val2, ...
                    for pair in flat.chunks(2) {
                        let key = match &pair[0] {
                            Value::String(s) => s.as_str().to_owned(),
                            Value::Integer(n) => n.to_string(),
                            other => {
                                return Err(self.error(format!(
                                    "Cannot use {} as dictionary key",
                                    other.type_name()
                                )));
                            }
                        };
                        entries.insert(key, pair[1].clone());
                    }
                    self.push(Value::Dict(entries));
                }
                Ok(OpCode::Index) => self.index_op()?,
                Ok(OpCode::Member) => {
                    let idx = self.read_byte() as usize;
                    let name = self.get_constant_string(idx)?;
                    let object = self.pop();
                    let value = match &object {
                        Value::Dict(entries) => entries.get(&name).cloned().unwrap_or(Value::Nil),
                        _ => {
                            return Err(self.error(format!(
                                "Cannot access member '{name}' on {}",
                                object.type_name()
                            )));
                        }
                    };
                    self.push(value);
                }

                // Units
                Ok(OpCode::CallNamed) => {
                    let idx = self.read_byte() as usize;
                    let argc = self.read_byte() as usize;
                    let name = self.get_constant_string(idx)?;
                    let unit = self
                        .env
                        .unit(&name)
                        .ok_or_else(|| self.error(format!("Undefined function '{name}'")))?;
                    let function = unit.compiled()?;
                    self.enter(function, argc)?;
                }
                Ok(OpCode::Return) => {
                    let result = self.pop();
                    let frame = self.pop_frame();
                    self.stack.truncate(frame.stack_base);

                    if self.frames.is_empty() {
                        return Ok(result);
                    }

                    self.push(result);
                }

                // Control flow
                Ok(OpCode::Jump) => {
                    let offset = self.read_u16() as usize;
                    self.current_frame_mut().ip += offset;
                }
                Ok(OpCode::JumpIfFalse) => {
                    let offset = self.read_u16() as usize;
                    if !self.peek(0).is_truthy() {
                        self.current_frame_mut().ip += offset;
                    }
                }
                Ok(OpCode::PopJumpIfFalse) => {
                    // &&: a falsy left operand is the result, a truthy one is discarded
                    let offset = self.read_u16() as usize;
                    let value = self.pop();
                    if !value.is_truthy() {
                        self.push(value);
                        self.current_frame_mut().ip += offset;
                    }
                }
                Ok(OpCode::PopJumpIfTrue) => {
                    // ||: a truthy left operand is the result, a falsy one is discarded
                    let offset = self.read_u16() as usize;
                    let value = self.pop();
                    if value.is_truthy() {
                        self.push(value);
                        self.current_frame_mut().ip += offset;
                    }
                }

                Ok(OpCode::CallBuiltin) => {
                    let raw_id = self.read_u16();
                    let argc = self.read_byte() as usize;
                    let id = BuiltinId::try_from(raw_id)
                        .map_err(|raw| self.error(format!("Unknown builtin: {raw}")))?;
                    let start = self.stack.len() - argc;
                    let args: Vec<Value> = self.stack.drain(start..).collect();
                    let line = self.current_frame().current_line();
                    let result = builtins::call_builtin(self.env, id, &args, line)?;
                    self.push(result);
                }

                Err(byte) => {
                    return Err(self.error(format!("Unknown opcode: {byte}")));
                }
            }
        }
    }

    // Helper methods

    fn read_byte(&mut self) -> u8 {
        self.current_frame_mut().read_byte()
    }

    fn read_u16(&mut self) -> u16 {
        self.current_frame_mut().read_u16()
    }

    fn current_frame(&self) -> &CallFrame {
        self.frames.last().expect("no active call frame")
    }

    fn current_frame_mut(&mut self) -> &mut CallFrame {
        self.frames.last_mut().expect("no active call frame")
    }

    fn pop_frame(&mut self) -> CallFrame {
        self.frames.pop().expect("no active call frame")
    }

    fn current_chunk(&self) -> &Chunk {
        self.current_frame().chunk()
    }

    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    fn pop(&mut self) -> Value {
        self.stack.pop().expect("Stack underflow")
    }

    fn peek(&self, distance: usize) -> &Value {
        &self.stack[self.stack.len() - 1 - distance]
    }

    fn error(&self, message: impl Into<String>) -> LambdaError {
        let line = self.frames.last().map(CallFrame::current_line).unwrap_or(0);
        RuntimeError::new(message, line).into()
    }

    fn get_constant_string(&self, idx: usize) -> Result<String, LambdaError> {
        match &self.current_chunk().constants[idx] {
            Value::String(s) => Ok((**s).clone()),
            _ => Err(self.error("Expected string constant")),
        }
    }

    // Arithmetic operations

    fn binary_add(&mut self) -> Result<(), LambdaError> {
        let b = self.pop();
        let a = self.pop();

        let result = match (&a, &b) {
            (Value::String(x), Value::String(y)) => Value::String(Rc::new(format!("{x}{y}"))),
            (Value::List(x), Value::List(y)) => {
                let mut result = x.clone();
                result.append(y.clone());
                Value::List(result)
            }
            // Dictionary merge, right operand wins
            (Value::Dict(x), Value::Dict(y)) => {
                let mut result = x.clone();
                result.extend(y.iter().map(|(k, v)| (k.clone(), v.clone())));
                Value::Dict(result)
            }
            _ => match numeric_pair(&a, &b) {
                Some(Numeric::Int(x, y)) => Value::Integer(
                    x.checked_add(y)
                        .ok_or_else(|| self.error("Integer overflow"))?,
                ),
                Some(Numeric::Dec(x, y)) => decimal(x + y),
                None => {
                    return Err(self.error(format!(
                        "Cannot add {} and {}",
                        a.type_name(),
                        b.type_name()
                    )));
                }
            },
        };

        self.push(result);
        Ok(())
    }

    fn binary_sub(&mut self) -> Result<(), LambdaError> {
        let b = self.pop();
        let a = self.pop();

        let result = match numeric_pair(&a, &b) {
            Some(Numeric::Int(x, y)) => Value::Integer(
                x.checked_sub(y)
                    .ok_or_else(|| self.error("Integer overflow"))?,
            ),
            Some(Numeric::Dec(x, y)) => decimal(x - y),
            None => {
                return Err(self.error(format!(
                    "Cannot subtract {} from {}",
                    b.type_name(),
                    a.type_name()
                )));
            }
        };

        self.push(result);
        Ok(())
    }

    /// Repetitions of a `len`-sized operand, refusing results over `MAX_REPEAT_LEN`
    fn repeat_count(&self, len: usize, n: i64) -> Result<usize, LambdaError> {
        if len == 0 {
            return Ok(0);
        }
        usize::try_from(n)
            .ok()
            .and_then(|n| len.checked_mul(n).map(|total| (n, total)))
            .filter(|&(_, total)| total <= MAX_REPEAT_LEN)
            .map(|(n, _)| n)
            .ok_or_else(|| self.error("Repeat count too large"))
    }

    fn binary_mul(&mut self) -> Result<(), LambdaError> {
        let b = self.pop();
        let a = self.pop();

        let result = match (&a, &b) {
            // String repetition
            (Value::String(s), Value::Integer(n)) => {
                if *n < 0 {
                    return Err(self.error("Cannot repeat string negative times"));
                }
                let count = self.repeat_count(s.len(), *n)?;
                Value::String(Rc::new(s.repeat(count)))
            }
            // List repetition
            (Value::List(v), Value::Integer(n)) => {
                if *n < 0 {
                    return Err(self.error("Cannot repeat list negative times"));
                }
                let count = self.repeat_count(v.len(), *n)?;
                let mut result = Vector::new();
                for _ in 0..count {
                    result.append(v.clone());
                }
                Value::List(result)
            }
            _ => match numeric_pair(&a, &b) {
                Some(Numeric::Int(x, y)) => Value::Integer(
                    x.checked_mul(y)
                        .ok_or_else(|| self.error("Integer overflow"))?,
                ),
                Some(Numeric::Dec(x, y)) => decimal(x * y),
                None => {
                    return Err(self.error(format!(
                        "Cannot multiply {} by {}",
                        a.type_name(),
                        b.type_name()
                    )));
                }
            },
        };

        self.push(result);
        Ok(())
    }

    fn binary_div(&mut self) -> Result<(), LambdaError> {
        let b = self.pop();
        let a = self.pop();

        let result = match numeric_pair(&a, &b) {
            // Integer division truncates toward zero
            Some(Numeric::Int(_, 0)) => return Err(self.error("Division by zero")),
            Some(Numeric::Int(x, y)) => Value::Integer(
                x.checked_div(y)
                    .ok_or_else(|| self.error("Integer overflow"))?,
            ),
            Some(Numeric::Dec(_, y)) if y == 0.0 => return Err(self.error("Division by zero")),
            Some(Numeric::Dec(x, y)) => decimal(x / y),
            None => {
                return Err(self.error(format!(
                    "Cannot divide {} by {}",
                    a.type_name(),
                    b.type_name()
                )));
            }
        };

        self.push(result);
        Ok(())
    }

    fn binary_mod(&mut self) -> Result<(), LambdaError> {
        let b = self.pop();
        let a = self.pop();

        // Floored modulo: the result has the sign of the divisor
        let result = match numeric_pair(&a, &b) {
            Some(Numeric::Int(_, 0)) => return Err(self.error("Modulo by zero")),
            Some(Numeric::Int(x, y)) => {
                let rem = x.wrapping_rem(y);
                Value::Integer(if rem != 0 && (rem < 0) != (y < 0) {
                    rem + y
                } else {
                    rem
                })
            }
            Some(Numeric::Dec(_, y)) if y == 0.0 => return Err(self.error("Modulo by zero")),
            Some(Numeric::Dec(x, y)) => {
                let rem = x % y;
                decimal(if rem != 0.0 && (rem < 0.0) != (y < 0.0) {
                    rem + y
                } else {
                    rem
                })
            }
            None => {
                return Err(self.error(format!(
                    "Cannot compute modulo of {} and {}",
                    a.type_name(),
                    b.type_name()
                )));
            }
        };

        self.push(result);
        Ok(())
    }

    fn unary_neg(&mut self) -> Result<(), LambdaError> {
        let value = self.pop();

        let result = match value {
            Value::Integer(n) => Value::Integer(
                n.checked_neg()
                    .ok_or_else(|| self.error("Integer overflow"))?,
            ),
            Value::Decimal(n) => decimal(-n.0),
            _ => return Err(self.error(format!("Cannot negate {}", value.type_name()))),
        };

        self.push(result);
        Ok(())
    }

    fn binary_compare(&mut self, op: OpCode) -> Result<(), LambdaError> {
        let b = self.pop();
        let a = self.pop();

        let ordering = match (&a, &b) {
            (Value::String(x), Value::String(y)) => Some(x.as_str().cmp(y.as_str())),
            _ => match numeric_pair(&a, &b) {
                Some(Numeric::Int(x, y)) => Some(x.cmp(&y)),
                Some(Numeric::Dec(x, y)) => x.partial_cmp(&y),
                None => {
                    let symbol = match op {
                        OpCode::Lt => "<",
                        OpCode::Le => "<=",
                        OpCode::Gt => ">",
                        _ => ">=",
                    };
                    return Err(self.error(format!(
                        "Cannot compare {} {symbol} {}",
                        a.type_name(),
                        b.type_name()
                    )));
                }
            },
        };

        // NaN compares false against everything
        let result = ordering.is_some_and(|ordering| match op {
            OpCode::Lt => ordering.is_lt(),
            OpCode::Le => ordering.is_le(),
            OpCode::Gt => ordering.is_gt(),
            _ => ordering.is_ge(),
        });

        self.push(Value::Boolean(result));
        Ok(())
    }

    /// Missing indexes and keys read as nil
    fn index_op(&mut self) -> Result<(), LambdaError> {
        let index = self.pop();
        let collection = self.pop();

        let result = match (&collection, &index) {
            (Value::List(list), Value::Integer(idx)) => {
                let len = list.len() as i64;
                let actual_idx = if *idx < 0 { len + idx } else { *idx };
                if actual_idx < 0 || actual_idx >= len {
                    Value::Nil
                } else {
                    list[actual_idx as usize].clone()
                }
            }

            // String indexing (grapheme clusters)
            (Value::String(s), Value::Integer(idx)) => {
                let graphemes: Vec<&str> = s.graphemes(true).collect();
                let len = graphemes.len() as i64;
                let actual_idx = if *idx < 0 { len + idx } else { *idx };
                if actual_idx < 0 || actual_idx >= len {
                    Value::Nil
                } else {
                    Value::string(graphemes[actual_idx as usize])
                }
            }

            (Value::Dict(dict), Value::String(key)) => {
                dict.get(key.as_str()).cloned().unwrap_or(Value::Nil)
            }
            (Value::Dict(dict), Value::Integer(key)) => {
                dict.get(&key.to_string()).cloned().unwrap_or(Value::Nil)
            }

            _ => {
                return Err(self.error(format!(
                    "Cannot index {} with {}",
                    collection.type_name(),
                    index.type_name()
                )));
            }
        };

        self.push(result);
        Ok(())
    }
}
