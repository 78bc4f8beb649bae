//! Symbolic semantics for the handful of amd64 and i386 instructions found in one-gadget
//! candidates. A candidate is a short sequence of disassembled instructions ending in a call to a
//! process replacement function such as `execve`.
//!
//! ### Emulator
//!
//! The [emulator::Emulator] processes one instruction at a time, updating the symbolic registers
//! and stack held in [mem::SymbolicState]. Values are expressed as [sym::SymbolicValue] in terms of
//! the initial register values. Along the way the emulator accumulates the [constraint::Constraint]
//! preconditions required for the candidate to reach its terminal call.
//!
//! ### Calls
//!
//! Calls are classified by a [call::CallPolicy]. The [call::StandardCallPolicy] terminates on
//! process replacement functions and allows a short list of benign calls whose arguments satisfy
//! simple predicates.

pub mod arch;

/// Classification of calls reached during evaluation.
pub mod call;

/// Supported instructions and the textual instruction form accepted by the emulator.
pub mod catalog;

pub mod constraint;

/// Symbolic instruction semantics.
pub mod emulator;

/// Symbolic register and stack state.
pub mod mem;

/// Operand parsing.
pub mod operand;

#[cfg(test)]
mod tests;
