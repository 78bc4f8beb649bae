use sym::SymbolicValue;

/// Alignment in bytes required by aligned vector stores.
pub const VECTOR_ALIGNMENT: i64 = 16;

/// A precondition the initial machine state must satisfy for the evaluated instructions to reach
/// the resolved call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Constraint {
    /// A boolean relation over initial register values, e.g. `(rsp & 0xf) == 0x8`.
    Relation(String),

    /// The address must be mapped writable.
    Writable(SymbolicValue),
}

impl Constraint {
    /// The relation under which `stack_pointer + offset` is aligned to [VECTOR_ALIGNMENT], given as
    /// a requirement on the stack pointer alone.
    pub fn stack_alignment(stack_pointer: &str, offset: i64) -> Self {
        let remainder = (VECTOR_ALIGNMENT - offset.rem_euclid(VECTOR_ALIGNMENT)) % VECTOR_ALIGNMENT;
        Constraint::Relation(format!(
            "({stack_pointer} & {mask:#x}) == {remainder:#x}",
            mask = VECTOR_ALIGNMENT - 1
        ))
    }
}

impl std::fmt::Display for Constraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Constraint::Relation(relation) => write!(f, "{relation}"),
            Constraint::Writable(address) => write!(f, "writable({address})"),
        }
    }
}
