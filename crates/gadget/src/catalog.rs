use std::str::FromStr;

use crate::operand;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("empty instruction")]
    Empty,

    #[error("unknown opcode `{0}`")]
    UnknownOpcode(String),
}

/// The closed set of opcodes with modeled semantics.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Opcode {
    Add,
    Call,
    Jmp,
    Lea,
    Mov,
    Movaps,
    Movhps,
    Movq,
    Nop,
    Punpcklqdq,
    Push,
    Sub,
    Xor,
}

/// Number of operands an opcode accepts.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Arity {
    Fixed(usize),
    Variadic,
}

impl Arity {
    pub fn accepts(self, num_operands: usize) -> bool {
        match self {
            Arity::Fixed(n) => n == num_operands,
            Arity::Variadic => true,
        }
    }
}

impl std::fmt::Display for Arity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Arity::Fixed(n) => write!(f, "{n}"),
            Arity::Variadic => write!(f, "any number of"),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct InstructionDescriptor {
    pub opcode: Opcode,
    pub arity: Arity,
}

const fn descriptor(opcode: Opcode, arity: Arity) -> InstructionDescriptor {
    InstructionDescriptor { opcode, arity }
}

const CATALOG: [InstructionDescriptor; 13] = [
    descriptor(Opcode::Add, Arity::Fixed(2)),
    descriptor(Opcode::Call, Arity::Fixed(1)),
    descriptor(Opcode::Jmp, Arity::Fixed(1)),
    descriptor(Opcode::Lea, Arity::Fixed(2)),
    descriptor(Opcode::Mov, Arity::Fixed(2)),
    descriptor(Opcode::Movaps, Arity::Fixed(2)),
    descriptor(Opcode::Movhps, Arity::Fixed(2)),
    descriptor(Opcode::Movq, Arity::Fixed(2)),
    descriptor(Opcode::Nop, Arity::Variadic),
    descriptor(Opcode::Punpcklqdq, Arity::Fixed(2)),
    descriptor(Opcode::Push, Arity::Fixed(1)),
    descriptor(Opcode::Sub, Arity::Fixed(2)),
    descriptor(Opcode::Xor, Arity::Fixed(2)),
];

/// Every supported instruction with its operand arity. A front end decoding instructions can
/// validate against this table before handing instructions to the emulator.
pub fn catalog() -> &'static [InstructionDescriptor] {
    &CATALOG
}

impl Opcode {
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Add => "add",
            Opcode::Call => "call",
            Opcode::Jmp => "jmp",
            Opcode::Lea => "lea",
            Opcode::Mov => "mov",
            Opcode::Movaps => "movaps",
            Opcode::Movhps => "movhps",
            Opcode::Movq => "movq",
            Opcode::Nop => "nop",
            Opcode::Punpcklqdq => "punpcklqdq",
            Opcode::Push => "push",
            Opcode::Sub => "sub",
            Opcode::Xor => "xor",
        }
    }

    pub fn arity(self) -> Arity {
        CATALOG
            .iter()
            .find(|descriptor| descriptor.opcode == self)
            .map_or(Arity::Variadic, |descriptor| descriptor.arity)
    }

    pub fn is_unconditional_jump(self) -> bool {
        self == Opcode::Jmp
    }
}

impl FromStr for Opcode {
    type Err = Error;

    fn from_str(mnemonic: &str) -> Result<Self, Self::Err> {
        CATALOG
            .iter()
            .map(|descriptor| descriptor.opcode)
            .find(|opcode| opcode.mnemonic().eq_ignore_ascii_case(mnemonic))
            .ok_or_else(|| Error::UnknownOpcode(mnemonic.to_string()))
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.mnemonic())
    }
}

/// A decoded instruction: the mnemonic and its operands in textual assembly syntax.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Instruction {
    pub mnemonic: String,
    pub operands: Vec<String>,
}

impl Instruction {
    pub fn new(
        mnemonic: impl Into<String>,
        operands: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            mnemonic: mnemonic.into(),
            operands: operands.into_iter().map(Into::into).collect(),
        }
    }
}

impl FromStr for Instruction {
    type Err = Error;

    /// Decode an instruction line such as `mov rax, QWORD PTR [rsp+0x8]`. Trailing disassembler
    /// comments introduced by `#` are dropped.
    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.split('#').next().unwrap_or_default().trim();
        let (mnemonic, operands) = match line.split_once(char::is_whitespace) {
            Some((mnemonic, operands)) => (mnemonic, operands),
            None => (line, ""),
        };

        if mnemonic.is_empty() {
            return Err(Error::Empty);
        }

        Ok(Self {
            mnemonic: mnemonic.to_ascii_lowercase(),
            operands: operand::split_operands(operands),
        })
    }
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.mnemonic)?;
        for (i, operand) in self.operands.iter().enumerate() {
            let separator = if i == 0 { " " } else { ", " };
            write!(f, "{separator}{operand}")?;
        }

        Ok(())
    }
}
