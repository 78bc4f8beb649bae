use super::{unhandled, Emulator, Result, UnhandledReason};
use crate::arch::{Arch, RegisterClass};
use crate::call::CallPolicy;
use crate::catalog::Instruction;
use crate::constraint::Constraint;
use crate::operand::Operand;

/// Operand shapes understood by the vector instructions.
enum Shape {
    Vector(String),
    General { register: String, bits: u32 },

    /// A `[sp ± k]` operand, resolved to its offset from the initial stack pointer.
    Stack(i64),
    Other,
}

impl<P: CallPolicy> Emulator<P> {
    fn shape(&self, instruction: &Instruction, index: usize) -> Result<Shape> {
        let shape = match self.operand(instruction, index)? {
            Operand::Register(register) => {
                let arch = self.arch();
                match (arch.classify(&register), arch.general_register_bits(&register)) {
                    (Some(RegisterClass::Vector), _) => Shape::Vector(register),
                    (Some(RegisterClass::General), Some(bits)) => {
                        Shape::General { register, bits }
                    }
                    _ => Shape::Other,
                }
            }
            Operand::Memory(memory) => match self.stack_slot(&memory)? {
                Some(offset) => Shape::Stack(offset),
                None => Shape::Other,
            },
            _ => Shape::Other,
        };

        Ok(shape)
    }

    /// Number of word-sized lanes in 64 bits, i.e. half of a vector register.
    fn half_lanes(&self) -> usize {
        self.arch().lanes_per_vector() / 2
    }

    /// Aligned store of a vector register to the stack.
    pub(super) fn movaps(&mut self, instruction: &Instruction) -> Result<()> {
        let (offset, source) = match (self.shape(instruction, 0)?, self.shape(instruction, 1)?) {
            (Shape::Stack(offset), Shape::Vector(source)) => (offset, source),
            _ => return Err(unhandled(instruction, UnhandledReason::UnsupportedOperands)),
        };

        let constraint = Constraint::stack_alignment(self.arch().stack_pointer(), offset);
        tracing::debug!(%constraint, "alignment constraint");
        self.constraints.push(constraint);

        let word_size = self.arch().word_size();
        let lanes = self.state.lanes(&source)?.to_vec();
        for (lane, value) in (0..).zip(lanes) {
            self.state.write_stack(lane_offset(offset, lane, word_size), value);
        }

        Ok(())
    }

    pub(super) fn movq(&mut self, instruction: &Instruction) -> Result<()> {
        match (self.shape(instruction, 0)?, self.shape(instruction, 1)?) {
            (Shape::Vector(destination), Shape::General { register, bits: 64 })
                if self.arch() == Arch::Amd64 =>
            {
                // Only the low quadword is modeled, the upper lane keeps its value
                let value = self.state.read_register(&register);
                self.state.lanes_mut(&destination)?[0] = value;
            }
            (Shape::Vector(destination), Shape::Stack(offset)) => {
                self.load_half(&destination, offset, 0)?;
            }
            _ => return Err(unhandled(instruction, UnhandledReason::UnsupportedOperands)),
        }

        Ok(())
    }

    /// Load 64 bits from the stack into the upper half of a vector register.
    pub(super) fn movhps(&mut self, instruction: &Instruction) -> Result<()> {
        match (self.shape(instruction, 0)?, self.shape(instruction, 1)?) {
            (Shape::Vector(destination), Shape::Stack(offset)) => {
                let half = self.half_lanes();
                self.load_half(&destination, offset, half)
            }
            _ => Err(unhandled(instruction, UnhandledReason::UnsupportedOperands)),
        }
    }

    /// Interleave the low quadwords. The low half of the destination is unchanged and the low half
    /// of the source lands in its upper half.
    pub(super) fn punpcklqdq(&mut self, instruction: &Instruction) -> Result<()> {
        let (destination, source) =
            match (self.shape(instruction, 0)?, self.shape(instruction, 1)?) {
                (Shape::Vector(destination), Shape::Vector(source)) => (destination, source),
                _ => return Err(unhandled(instruction, UnhandledReason::UnsupportedOperands)),
            };

        let half = self.half_lanes();
        let low = self.state.lanes(&source)?[..half].to_vec();
        self.state.lanes_mut(&destination)?[half..].clone_from_slice(&low);

        Ok(())
    }

    /// Copy 64 bits of consecutive stack slots starting at `offset` into the lanes of `register`
    /// starting at lane `first`.
    fn load_half(&mut self, register: &str, offset: i64, first: usize) -> Result<()> {
        let word_size = self.arch().word_size();
        let count = self.half_lanes();

        let values: Vec<_> = (0..count as i64)
            .map(|lane| self.state.read_stack(lane_offset(offset, lane, word_size)))
            .collect();
        self.state.lanes_mut(register)?[first..first + count].clone_from_slice(&values);

        Ok(())
    }
}

/// Stack offset of a lane. Offsets wrap like the address arithmetic of the target.
fn lane_offset(offset: i64, lane: i64, word_size: i64) -> i64 {
    offset.wrapping_add(lane.wrapping_mul(word_size))
}
