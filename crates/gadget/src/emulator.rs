use sym::SymbolicValue;

use crate::arch::{Arch, RegisterClass};
use crate::call::{CallDecision, CallPolicy, CallSite, StandardCallPolicy};
use crate::catalog::{Arity, Instruction, Opcode};
use crate::constraint::Constraint;
use crate::mem::{self, SymbolicState};
use crate::operand::{self, Memory, Operand};

mod scalar;
mod simd;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The opcode or the shape of its operands is not modeled. The candidate is rejected.
    #[error("unhandled instruction `{instruction}`: {reason}")]
    UnhandledInstruction {
        instruction: Box<Instruction>,
        reason: UnhandledReason,
    },

    /// A runtime invariant of the symbolic state was violated. The candidate is rejected.
    #[error("corrupted state: {0}")]
    CorruptedState(#[from] mem::Error),

    /// The call target is neither terminal nor a satisfied benign call. This is an ordinary
    /// rejection of the candidate.
    #[error("unresolved call to `{target}`")]
    UnresolvedCall { target: String },
}

#[derive(thiserror::Error, Debug)]
pub enum UnhandledReason {
    #[error("unknown opcode")]
    UnknownOpcode,

    #[error("expected {expected} operand(s), found {actual}")]
    Arity { expected: Arity, actual: usize },

    #[error(transparent)]
    Operand(#[from] operand::Error),

    #[error("unsupported operand {index}")]
    UnsupportedOperand { index: usize },

    #[error("unsupported combination of operands")]
    UnsupportedOperands,

    #[error("only the self-xor idiom is supported")]
    NonSelfXor,

    #[error("operand {index} is not a concrete integer")]
    SymbolicOperand { index: usize },

    #[error(transparent)]
    Reference(#[from] sym::Error),
}

impl Error {
    /// Whether the error indicates an instruction or state that cannot be modeled, as opposed to a
    /// call that was simply not recognized.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::UnresolvedCall { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Result of successfully processing an instruction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Flow {
    /// Continue with the next instruction.
    #[default]
    Continue,

    /// A terminal call was reached. The program counter holds the target and no further
    /// instructions should be processed.
    Terminated(String),
}

/// Symbolic emulator for a short straight-line sequence of amd64 or i386 instructions.
///
/// An emulator evaluates exactly one candidate. It owns its registers, stack and the constraints
/// accumulated along the way.
#[derive(Debug, Clone)]
pub struct Emulator<P = StandardCallPolicy>
where
    P: CallPolicy,
{
    state: SymbolicState,
    constraints: Vec<Constraint>,
    policy: P,
}

impl Emulator {
    pub fn new(arch: Arch) -> Self {
        Self::with_policy(arch, StandardCallPolicy::new())
    }
}

impl<P: CallPolicy> Emulator<P> {
    pub fn with_policy(arch: Arch, policy: P) -> Self {
        Self {
            state: SymbolicState::new(arch),
            constraints: Vec::new(),
            policy,
        }
    }

    pub fn arch(&self) -> Arch {
        self.state.arch()
    }

    pub fn state(&self) -> &SymbolicState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut SymbolicState {
        &mut self.state
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    /// Constraints accumulated so far, in the order they were emitted.
    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn program_counter(&self) -> SymbolicValue {
        self.state.read_register(self.arch().program_counter())
    }

    /// Process instructions in order until a terminal call is reached. Returns the call target, or
    /// `None` if the instructions ran out first.
    pub fn run<'a>(
        &mut self,
        instructions: impl IntoIterator<Item = &'a Instruction>,
    ) -> Result<Option<String>> {
        for instruction in instructions {
            if let Flow::Terminated(target) = self.process(instruction)? {
                return Ok(Some(target));
            }
        }

        Ok(None)
    }

    /// Update the symbolic state according to the semantics of a single instruction.
    pub fn process(&mut self, instruction: &Instruction) -> Result<Flow> {
        let result = self.dispatch(instruction);
        match &result {
            Ok(flow) => tracing::trace!(%instruction, ?flow, "processed"),
            Err(err) => tracing::debug!(%instruction, %err, "rejected"),
        }

        result
    }

    fn dispatch(&mut self, instruction: &Instruction) -> Result<Flow> {
        let opcode: Opcode = instruction
            .mnemonic
            .parse()
            .map_err(|_| unhandled(instruction, UnhandledReason::UnknownOpcode))?;

        // Jump targets are resolved before instructions reach the emulator
        if opcode.is_unconditional_jump() {
            return Ok(Flow::Continue);
        }

        require_arity(instruction, opcode.arity())?;

        match opcode {
            Opcode::Add => self.add(instruction)?,
            Opcode::Call => return self.call(instruction),
            Opcode::Lea => self.lea(instruction)?,
            Opcode::Mov => self.mov(instruction)?,
            Opcode::Movaps => self.movaps(instruction)?,
            Opcode::Movhps => self.movhps(instruction)?,
            Opcode::Movq => self.movq(instruction)?,
            Opcode::Jmp | Opcode::Nop => (),
            Opcode::Punpcklqdq => self.punpcklqdq(instruction)?,
            Opcode::Push => self.push(instruction)?,
            Opcode::Sub => self.sub(instruction)?,
            Opcode::Xor => self.xor(instruction)?,
        }

        Ok(Flow::Continue)
    }

    /// Classify the call target. A terminal call resolves the program counter to the target.
    fn call(&mut self, instruction: &Instruction) -> Result<Flow> {
        let target = instruction.operands[0].trim();
        match self.policy.classify(target, &CallSite::new(&self.state)) {
            CallDecision::Terminal => {
                tracing::debug!(call = target, "terminal call");
                let program_counter = self.arch().program_counter();
                self.state
                    .write_register(program_counter, SymbolicValue::symbol(target));
                Ok(Flow::Terminated(target.to_string()))
            }
            CallDecision::Benign => {
                tracing::debug!(call = target, "benign call");
                Ok(Flow::Continue)
            }
            CallDecision::Unresolved => Err(Error::UnresolvedCall {
                target: target.to_string(),
            }),
        }
    }

    fn operand(&self, instruction: &Instruction, index: usize) -> Result<Operand> {
        Operand::parse(&instruction.operands[index], self.arch())
            .map_err(|err| unhandled(instruction, err))
    }

    fn register_class(&self, operand: &Operand) -> Option<RegisterClass> {
        operand
            .as_register()
            .and_then(|register| self.arch().classify(register))
    }

    /// The value an operand denotes when read. Stack slots addressed through the stack pointer are
    /// read from the symbolic stack, any other memory operand yields a dereferenced address.
    fn read_operand(&self, instruction: &Instruction, index: usize) -> Result<SymbolicValue> {
        match self.operand(instruction, index)? {
            Operand::Register(register) => {
                if self.arch().classify(&register) == Some(RegisterClass::Vector) {
                    return Err(unsupported_operand(instruction, index));
                }
                Ok(self.state.read_register(&register))
            }
            Operand::Immediate(value) => Ok(SymbolicValue::constant(value)),
            Operand::Memory(memory) => match self.stack_slot(&memory)? {
                Some(offset) => Ok(self.state.read_stack(offset)),
                None => Ok(self.address_of(&memory).deref()),
            },
            Operand::Label(_) => Err(unsupported_operand(instruction, index)),
        }
    }

    /// Symbolic form of an operand without consulting the stack, i.e. a memory operand is the
    /// dereference of its address.
    fn symbolic_operand(&self, instruction: &Instruction, index: usize) -> Result<SymbolicValue> {
        match self.operand(instruction, index)? {
            Operand::Register(register) => Ok(self.state.read_register(&register)),
            Operand::Immediate(value) => Ok(SymbolicValue::constant(value)),
            Operand::Memory(memory) => Ok(self.address_of(&memory).deref()),
            Operand::Label(_) => Err(unsupported_operand(instruction, index)),
        }
    }

    /// The address a memory operand refers to, in terms of current register values.
    fn address_of(&self, memory: &Memory) -> SymbolicValue {
        let registers = memory
            .registers
            .iter()
            .map(|register| self.state.read_register(register))
            .reduce(|lhs, rhs| lhs + rhs)
            .unwrap_or_else(|| SymbolicValue::constant(0));
        registers + memory.displacement
    }

    /// The stack address of a `[sp ± k]` operand, relative to the initial stack pointer. Returns
    /// `None` if the operand is not of that shape.
    fn stack_slot(&self, memory: &Memory) -> Result<Option<i64>> {
        match memory.stack_offset(self.arch().stack_pointer()) {
            Some(offset) => Ok(Some(
                self.state.stack_pointer_offset()?.wrapping_add(offset),
            )),
            None => Ok(None),
        }
    }

    /// Record that a write target must be writable. Program counter relative addresses are global
    /// data of the image being analyzed and assumed writable.
    fn require_writable(&mut self, address: SymbolicValue) {
        if address.references(self.arch().program_counter()) {
            tracing::trace!(%address, "skipping writable constraint for global");
            return;
        }

        tracing::debug!(%address, "writable constraint");
        self.constraints.push(Constraint::Writable(address));
    }
}

fn unhandled(instruction: &Instruction, reason: impl Into<UnhandledReason>) -> Error {
    Error::UnhandledInstruction {
        instruction: Box::new(instruction.clone()),
        reason: reason.into(),
    }
}

fn unsupported_operand(instruction: &Instruction, index: usize) -> Error {
    unhandled(instruction, UnhandledReason::UnsupportedOperand { index })
}

fn require_arity(instruction: &Instruction, arity: Arity) -> Result<()> {
    if arity.accepts(instruction.operands.len()) {
        Ok(())
    } else {
        Err(unhandled(
            instruction,
            UnhandledReason::Arity {
                expected: arity,
                actual: instruction.operands.len(),
            },
        ))
    }
}
