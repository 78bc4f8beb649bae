use sym::SymbolicValue;

use super::{unhandled, unsupported_operand, Emulator, Result, UnhandledReason};
use crate::arch::RegisterClass;
use crate::call::CallPolicy;
use crate::catalog::Instruction;
use crate::operand::Operand;

impl<P: CallPolicy> Emulator<P> {
    /// Destination register of an instruction. Vector registers are only written by the vector
    /// instructions.
    fn destination_register(&self, instruction: &Instruction) -> Result<String> {
        let destination = self.operand(instruction, 0)?;
        match self.register_class(&destination) {
            Some(RegisterClass::Vector) | None => Err(unsupported_operand(instruction, 0)),
            Some(_) => match destination {
                Operand::Register(register) => Ok(register),
                _ => Err(unsupported_operand(instruction, 0)),
            },
        }
    }

    /// Writes to registers and to `[sp ± k]` are modeled. A write to any other memory location is
    /// not tracked; instead the location is required to be writable.
    pub(super) fn mov(&mut self, instruction: &Instruction) -> Result<()> {
        let value = self.read_operand(instruction, 1)?;
        let destination = self.operand(instruction, 0)?;
        let class = self.register_class(&destination);
        match destination {
            Operand::Register(register) if class != Some(RegisterClass::Vector) => {
                self.state.write_register(register, value);
            }
            Operand::Memory(memory) => match self.stack_slot(&memory)? {
                Some(offset) => self.state.write_stack(offset, value),
                None => self.require_writable(self.address_of(&memory)),
            },
            _ => return Err(unsupported_operand(instruction, 0)),
        }

        Ok(())
    }

    /// Load the address of the source operand, i.e. the source with one less dereference.
    pub(super) fn lea(&mut self, instruction: &Instruction) -> Result<()> {
        let destination = self.destination_register(instruction)?;
        let address = self
            .symbolic_operand(instruction, 1)?
            .reference()
            .map_err(|err| unhandled(instruction, err))?;
        self.state.write_register(destination, address);

        Ok(())
    }

    pub(super) fn push(&mut self, instruction: &Instruction) -> Result<()> {
        // The value is read before the stack pointer moves, so `push rsp` pushes the old value
        let value = self.read_operand(instruction, 0)?;
        let stack_pointer = self.arch().stack_pointer();
        let top = self.state.stack_pointer() - self.arch().word_size();
        self.state.write_register(stack_pointer, top);

        let offset = self.state.stack_pointer_offset()?;
        self.state.write_stack(offset, value);

        Ok(())
    }

    /// Only `xor reg, reg` is supported, which zeroes the register.
    pub(super) fn xor(&mut self, instruction: &Instruction) -> Result<()> {
        let destination = self.destination_register(instruction)?;
        let source = self.operand(instruction, 1)?;
        if source.as_register() != Some(destination.as_str()) {
            return Err(unhandled(instruction, UnhandledReason::NonSelfXor));
        }

        let register = self.arch().resolve_alias(&destination).into_owned();
        self.state
            .write_register(register.as_str(), SymbolicValue::constant(0));

        // The alias reads back as zero as well
        if register != destination {
            self.state
                .write_register(destination, SymbolicValue::constant(0));
        }

        Ok(())
    }

    pub(super) fn add(&mut self, instruction: &Instruction) -> Result<()> {
        let destination = self.destination_register(instruction)?;
        let value = self.read_operand(instruction, 1)?;
        let sum = self.state.read_register(&destination) + value;
        self.state.write_register(destination, sum);

        Ok(())
    }

    /// Only subtraction of a concrete integer is supported.
    pub(super) fn sub(&mut self, instruction: &Instruction) -> Result<()> {
        let destination = self.destination_register(instruction)?;
        let value = self
            .read_operand(instruction, 1)?
            .as_constant()
            .ok_or_else(|| {
                unhandled(instruction, UnhandledReason::SymbolicOperand { index: 1 })
            })?;
        let difference = self.state.read_register(&destination) - value;
        self.state.write_register(destination, difference);

        Ok(())
    }
}
