use super::value::Value;

/// Bytecode instruction set for the expression VM
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    // Stack manipulation
    /// Push constant from pool (1 byte operand: constant index)
    Constant = 0,
    /// Push constant from pool with wide index (2 byte operand)
    ConstantLong = 1,
    /// Discard top of stack
    Pop = 2,

    // Variables
    /// Load local variable (1 byte operand: slot index)
    GetLocal = 10,
    /// Store local variable (1 byte operand: slot index)
    SetLocal = 11,
    /// Load global by name index (1 byte operand)
    GetGlobal = 12,
    /// Store global by name index (1 byte operand)
    SetGlobal = 13,

    // Arithmetic
    /// Addition: numbers, strings, lists, dicts
    Add = 20,
    Sub = 21,
    /// Multiplication: numbers, string/list repetition
    Mul = 22,
    /// Division: truncating on integers
    Div = 23,
    /// Modulo: floored
    Mod = 24,
    /// Unary negation
    Neg = 25,

    // Comparison
    Eq = 30,
    Ne = 31,
    Lt = 32,
    Le = 33,
    Gt = 34,
    Ge = 35,

    // Logical
    /// Logical NOT (based on truthiness)
    Not = 40,

    // Collections
    /// Create list from N stack values (1 byte operand: count)
    MakeList = 50,
    /// Create dict from N*2 stack values (1 byte operand: pair count)
    MakeDict = 52,
    /// Index operation: collection, index -> value
    Index = 54,
    /// Member access: object -> value (1 byte operand: name constant index)
    Member = 56,

    // Functions
    /// Call a live synthesized unit by name (1 byte operand: name index, 1 byte: arg count)
    CallNamed = 61,
    /// Return from the current unit
    Return = 63,

    // Control flow
    /// Unconditional jump (2 byte operand: offset)
    Jump = 70,
    /// Jump if top of stack is falsy (2 byte operand)
    JumpIfFalse = 71,
    /// Pop and jump if falsy (for && short-circuit)
    PopJumpIfFalse = 73,
    /// Pop and jump if truthy (for || short-circuit)
    PopJumpIfTrue = 74,

    // Built-ins
    /// Call built-in function (2 byte operand: builtin_id, 1 byte: arg_count)
    CallBuiltin = 80,

    // Literals
    Nil = 92,
    True = 93,
    False = 94,
}

impl TryFrom<u8> for OpCode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(OpCode::Constant),
            1 => Ok(OpCode::ConstantLong),
            2 => Ok(OpCode::Pop),
            10 => Ok(OpCode::GetLocal),
            11 => Ok(OpCode::SetLocal),
            12 => Ok(OpCode::GetGlobal),
            13 => Ok(OpCode::SetGlobal),
            20 => Ok(OpCode::Add),
            21 => Ok(OpCode::Sub),
            22 => Ok(OpCode::Mul),
            23 => Ok(OpCode::Div),
            24 => Ok(OpCode::Mod),
            25 => Ok(OpCode::Neg),
            30 => Ok(OpCode::Eq),
            31 => Ok(OpCode::Ne),
            32 => Ok(OpCode::Lt),
            33 => Ok(OpCode::Le),
            34 => Ok(OpCode::Gt),
            35 => Ok(OpCode::Ge),
            40 => Ok(OpCode::Not),
            50 => Ok(OpCode::MakeList),
            52 => Ok(OpCode::MakeDict),
            54 => Ok(OpCode::Index),
            56 => Ok(OpCode::Member),
            61 => Ok(OpCode::CallNamed),
            63 => Ok(OpCode::Return),
            70 => Ok(OpCode::Jump),
            71 => Ok(OpCode::JumpIfFalse),
            73 => Ok(OpCode::PopJumpIfFalse),
            74 => Ok(OpCode::PopJumpIfTrue),
            80 => Ok(OpCode::CallBuiltin),
            92 => Ok(OpCode::Nil),
            93 => Ok(OpCode::True),
            94 => Ok(OpCode::False),
            _ => Err(value),
        }
    }
}

/// Bytecode chunk containing compiled code
#[derive(Debug, Clone, Default)]
pub struct Chunk {
    /// Raw bytecode
    pub code: Vec<u8>,
    /// Constant pool
    pub constants: Vec<Value>,
    /// Line number for each byte
    pub lines: Vec<u32>,
}

impl Chunk {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write an opcode to the chunk
    pub fn write(&mut self, op: OpCode, line: u32) {
        self.code.push(op as u8);
        self.lines.push(line);
    }

    /// Write a raw byte operand
    pub fn write_operand(&mut self, byte: u8) {
        // Use the same line as the previous instruction
        let line = self.lines.last().copied().unwrap_or(0);
        self.code.push(byte);
        self.lines.push(line);
    }

    /// Write a 16-bit operand (big-endian)
    pub fn write_operand_u16(&mut self, value: u16) {
        self.write_operand((value >> 8) as u8);
        self.write_operand((value & 0xFF) as u8);
    }

    /// Add a constant to the pool and return its index
    pub fn add_constant(&mut self, value: Value) -> usize {
        self.constants.push(value);
        self.constants.len() - 1
    }

    /// Find an existing string constant, or add it
    pub fn name_constant(&mut self, name: &str) -> usize {
        self.constants
            .iter()
            .position(|c| c.as_str() == Some(name))
            .unwrap_or_else(|| self.add_constant(Value::string(name)))
    }

    pub fn get_line(&self, offset: usize) -> u32 {
        self.lines.get(offset).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Patch a jump instruction's offset so it lands on the current end of the chunk.
    /// Returns `false` when the distance does not fit in the 16-bit operand.
    #[must_use]
    pub fn patch_jump(&mut self, offset: usize) -> bool {
        // Calculate the jump distance from the instruction after the jump operand
        let jump = self.code.len() - offset - 2;
        if jump > u16::MAX as usize {
            return false;
        }
        self.code[offset] = (jump >> 8) as u8;
        self.code[offset + 1] = (jump & 0xFF) as u8;
        true
    }

    /// Disassemble a single instruction at the given offset
    pub fn disassemble_instruction(&self, offset: usize) -> String {
        let instruction = self.code[offset];
        let line = self.get_line(offset);

        match OpCode::try_from(instruction) {
            Ok(OpCode::Constant) => {
                let idx = self.code[offset + 1] as usize;
                let value = &self.constants[idx];
                format!("{offset:04} [{line:4}] Constant {idx} ({value})")
            }
            Ok(OpCode::ConstantLong) => {
                let idx =
                    ((self.code[offset + 1] as usize) << 8) | (self.code[offset + 2] as usize);
                let value = &self.constants[idx];
                format!("{offset:04} [{line:4}] ConstantLong {idx} ({value})")
            }
            Ok(op @ (OpCode::GetLocal | OpCode::SetLocal)) => {
                let slot = self.code[offset + 1];
                format!("{offset:04} [{line:4}] {op:?} {slot}")
            }
            Ok(op @ (OpCode::GetGlobal | OpCode::SetGlobal | OpCode::Member)) => {
                let idx = self.code[offset + 1] as usize;
                let name = &self.constants[idx];
                format!("{offset:04} [{line:4}] {op:?} {idx} ({name})")
            }
            Ok(op @ (OpCode::MakeList | OpCode::MakeDict)) => {
                let count = self.code[offset + 1];
                format!("{offset:04} [{line:4}] {op:?} {count}")
            }
            Ok(OpCode::CallNamed) => {
                let idx = self.code[offset + 1] as usize;
                let argc = self.code[offset + 2];
                let name = &self.constants[idx];
                format!("{offset:04} [{line:4}] CallNamed {idx} ({name}, {argc} args)")
            }
            Ok(
                op @ (OpCode::Jump
                | OpCode::JumpIfFalse
                | OpCode::PopJumpIfFalse
                | OpCode::PopJumpIfTrue),
            ) => {
                let jump =
                    ((self.code[offset + 1] as u16) << 8) | (self.code[offset + 2] as u16);
                let target = offset + 3 + jump as usize;
                format!("{offset:04} [{line:4}] {op:?} -> {target}")
            }
            Ok(OpCode::CallBuiltin) => {
                let builtin_id =
                    ((self.code[offset + 1] as u16) << 8) | (self.code[offset + 2] as u16);
                let argc = self.code[offset + 3];
                format!("{offset:04} [{line:4}] CallBuiltin {builtin_id} ({argc} args)")
            }
            Ok(op) => format!("{offset:04} [{line:4}] {op:?}"),
            Err(byte) => format!("{offset:04} [{line:4}] Unknown({byte})"),
        }
    }

    /// Disassemble the entire chunk
    pub fn disassemble(&self, name: &str) -> String {
        let mut output = format!("== {name} ==\n");
        let mut offset = 0;

        while offset < self.code.len() {
            output.push_str(&self.disassemble_instruction(offset));
            output.push('\n');
            offset += self.instruction_size(offset);
        }

        output
    }

    fn instruction_size(&self, offset: usize) -> usize {
        match OpCode::try_from(self.code[offset]) {
            Ok(OpCode::Constant) => 2,
            Ok(OpCode::ConstantLong) => 3,
            Ok(
                OpCode::GetLocal
                | OpCode::SetLocal
                | OpCode::GetGlobal
                | OpCode::SetGlobal
                | OpCode::Member
                | OpCode::MakeList
                | OpCode::MakeDict,
            ) => 2,
            Ok(OpCode::CallNamed) => 3,
            Ok(
                OpCode::Jump
                | OpCode::JumpIfFalse
                | OpCode::PopJumpIfFalse
                | OpCode::PopJumpIfTrue,
            ) => 3,
            Ok(OpCode::CallBuiltin) => 4,
            _ => 1,
        }
    }
}

/// Compiled unit body
#[derive(Debug)]
pub struct CompiledFunction {
    /// Number of positional parameter slots
    pub arity: u8,
    /// All arguments are packed into the single `args` slot
    pub variadic: bool,
    pub chunk: Chunk,
    /// Unit name (for debugging and disassembly)
    pub name: Option<String>,
}

impl CompiledFunction {
    pub fn new(arity: u8, name: Option<String>) -> Self {
        Self {
            arity,
            variadic: false,
            chunk: Chunk::new(),
            name,
        }
    }

    pub fn new_variadic(name: Option<String>) -> Self {
        Self {
            arity: 1,
            variadic: true,
            chunk: Chunk::new(),
            name,
        }
    }
}
