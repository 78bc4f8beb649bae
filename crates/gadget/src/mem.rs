use std::collections::BTreeMap;

use sym::{Environment, EvaluationError, Evaluator, SymbolicValue};

use crate::arch::{Arch, RegisterClass};

/// Memory result type
pub type Result<T> = std::result::Result<T, Error>;

/// Possible register and stack access errors
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The stack pointer no longer evaluates to a concrete offset from its initial value. This
    /// happens when it is overwritten with an unrelated value.
    #[error("stack pointer {value} is not a concrete offset from its initial value: {source}")]
    SymbolicStackPointer {
        value: SymbolicValue,
        source: EvaluationError,
    },

    /// Lanes were requested for a register that is not a vector register.
    #[error("{0} is not a vector register")]
    NotVector(String),
}

/// Symbolic registers and stack for a single evaluation.
///
/// # Registers
///
/// Reading a register that was never written yields the symbol of the same name, which stands for
/// its unknown initial value.
///
/// # Stack
///
/// Stack addresses are integers relative to the initial stack pointer, so the symbol of the stack
/// pointer register evaluates to zero. The current address of a stack slot is obtained by
/// evaluating the current stack pointer value, see [Self::stack_pointer_offset].
///
/// # Vector registers
///
/// Vector registers are stored as word-sized lanes. The lanes are materialized from the register
/// symbol on first reference and cached for the remainder of the evaluation.
#[derive(Debug, Clone)]
pub struct SymbolicState {
    arch: Arch,
    registers: BTreeMap<String, SymbolicValue>,
    lanes: BTreeMap<String, Vec<SymbolicValue>>,
    stack: BTreeMap<i64, SymbolicValue>,
}

impl SymbolicState {
    pub fn new(arch: Arch) -> Self {
        Self {
            arch,
            registers: Default::default(),
            lanes: Default::default(),
            stack: Default::default(),
        }
    }

    pub fn arch(&self) -> Arch {
        self.arch
    }

    pub fn read_register(&self, name: &str) -> SymbolicValue {
        self.registers
            .get(name)
            .cloned()
            .unwrap_or_else(|| SymbolicValue::symbol(name))
    }

    /// Write a register. Writing a full 64-bit register discards any value recorded under its
    /// 32-bit alias, see [Arch::resolve_alias].
    pub fn write_register(&mut self, name: impl Into<String>, value: SymbolicValue) {
        let name = name.into();
        let arch = self.arch;
        self.registers
            .retain(|other, _| *other == name || arch.resolve_alias(other) != name.as_str());
        self.registers.insert(name, value);
    }

    /// Registers that have been written, in name order.
    pub fn registers(&self) -> impl Iterator<Item = (&str, &SymbolicValue)> {
        self.registers
            .iter()
            .map(|(name, value)| (name.as_str(), value))
    }

    pub fn stack_pointer(&self) -> SymbolicValue {
        self.read_register(self.arch.stack_pointer())
    }

    /// Evaluate the current stack pointer relative to its initial value.
    pub fn stack_pointer_offset(&self) -> Result<i64> {
        let value = self.stack_pointer();
        Evaluator::new(Environment::from([(self.arch.stack_pointer(), 0)]))
            .evaluate(&value)
            .map_err(|source| Error::SymbolicStackPointer { value, source })
    }

    /// Read the stack slot at `offset` from the initial stack pointer. A slot that was never
    /// written holds whatever the initial stack held there.
    pub fn read_stack(&self, offset: i64) -> SymbolicValue {
        self.stack.get(&offset).cloned().unwrap_or_else(|| {
            (SymbolicValue::symbol(self.arch.stack_pointer()) + offset).deref()
        })
    }

    pub fn write_stack(&mut self, offset: i64, value: SymbolicValue) {
        self.stack.insert(offset, value);
    }

    /// Stack slots that have been written, in address order.
    pub fn stack(&self) -> impl Iterator<Item = (i64, &SymbolicValue)> {
        self.stack.iter().map(|(&offset, value)| (offset, value))
    }

    /// Lanes of a vector register, lowest lane first.
    pub fn lanes(&mut self, name: &str) -> Result<&[SymbolicValue]> {
        self.materialize(name).map(|lanes| lanes.as_slice())
    }

    pub fn lanes_mut(&mut self, name: &str) -> Result<&mut [SymbolicValue]> {
        self.materialize(name).map(|lanes| lanes.as_mut_slice())
    }

    fn materialize(&mut self, name: &str) -> Result<&mut Vec<SymbolicValue>> {
        if self.arch.classify(name) != Some(RegisterClass::Vector) {
            return Err(Error::NotVector(name.to_string()));
        }

        let arch = self.arch;
        Ok(self.lanes.entry(name.to_string()).or_insert_with(|| {
            // Every lane is carved from the same 128-bit register value
            let register = SymbolicValue::symbol(name);
            (0..arch.lanes_per_vector())
                .map(|i| register.lane(i as u32, arch.bits()))
                .collect()
        }))
    }
}
