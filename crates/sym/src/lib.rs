//! Symbolic expressions over register and memory values.
//!
//! A [SymbolicValue] is an immutable expression built from named symbols and integer offsets with
//! a counted number of pending dereferences. Values can be sliced into lanes and evaluated to
//! concrete integers against an [Environment] once the symbols they depend on are known.

mod eval;
mod sym;

pub use crate::eval::*;
pub use crate::sym::*;
