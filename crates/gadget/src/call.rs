use sym::SymbolicValue;

use crate::arch::{Arch, ArgumentLocation};
use crate::mem::SymbolicState;

/// Calls that replace the process image. Reaching one of these ends the evaluation.
pub const TERMINAL_CALLS: [&str; 3] = ["execve", "execl", "posix_spawn"];

/// Outcome of classifying a call target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallDecision {
    /// The call replaces the process image. The program counter resolves to the target.
    Terminal,

    /// The call is known not to interfere with the rest of the evaluation.
    Benign,

    Unresolved,
}

/// Decides whether a call reached during evaluation is acceptable.
pub trait CallPolicy {
    fn classify(&self, target: &str, site: &CallSite<'_>) -> CallDecision;
}

/// The machine state at the point of a call.
#[derive(Debug, Clone, Copy)]
pub struct CallSite<'a> {
    state: &'a SymbolicState,
}

impl<'a> CallSite<'a> {
    pub fn new(state: &'a SymbolicState) -> Self {
        Self { state }
    }

    pub fn arch(&self) -> Arch {
        self.state.arch()
    }

    /// The value of argument `index` as it stands when the call is made. Returns `None` when the
    /// argument cannot be located, e.g. a stack argument behind a symbolic stack pointer.
    pub fn argument(&self, index: usize) -> Option<SymbolicValue> {
        match self.arch().argument(index)? {
            ArgumentLocation::Register(register) => Some(self.state.read_register(register)),
            ArgumentLocation::Stack(offset) => {
                let stack_pointer = self.state.stack_pointer_offset().ok()?;
                Some(self.state.read_stack(stack_pointer.checked_add(offset)?))
            }
        }
    }
}

/// Requirement on a call argument.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Predicate {
    /// The argument is the address of a global variable, i.e. computed relative to the program
    /// counter.
    GlobalVariable,

    /// The argument is exactly zero.
    Zero,
}

impl Predicate {
    pub fn holds(self, value: &SymbolicValue, arch: Arch) -> bool {
        match self {
            Predicate::GlobalVariable => value.references(arch.program_counter()),
            Predicate::Zero => value.is_zero(),
        }
    }
}

/// A call that may be made before the terminal call, provided every requirement holds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BenignCall {
    /// Matched against any target containing this name, e.g. `__sigaction` matches
    /// `<__sigaction@plt>`.
    pub name: String,
    pub requirements: Vec<(usize, Predicate)>,
}

impl BenignCall {
    pub fn new(
        name: impl Into<String>,
        requirements: impl IntoIterator<Item = (usize, Predicate)>,
    ) -> Self {
        Self {
            name: name.into(),
            requirements: requirements.into_iter().collect(),
        }
    }

    fn satisfied(&self, site: &CallSite<'_>) -> bool {
        self.requirements.iter().all(|&(index, predicate)| {
            site.argument(index)
                .is_some_and(|value| predicate.holds(&value, site.arch()))
        })
    }
}

/// Call policy for gadgets in the C library: the process replacement calls are terminal and a
/// short list of calls commonly found between a gadget and its terminal call are benign.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StandardCallPolicy {
    terminal: Vec<String>,
    benign: Vec<BenignCall>,
}

impl Default for StandardCallPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl StandardCallPolicy {
    pub fn new() -> Self {
        Self {
            terminal: TERMINAL_CALLS.iter().map(ToString::to_string).collect(),
            benign: vec![
                BenignCall::new("sigprocmask", []),
                BenignCall::new("__close", []),
                BenignCall::new("unsetenv", [(0, Predicate::GlobalVariable)]),
                BenignCall::new(
                    "__sigaction",
                    [(1, Predicate::GlobalVariable), (2, Predicate::Zero)],
                ),
            ],
        }
    }

    /// Add a benign call. Entries are matched in insertion order.
    pub fn with_benign(mut self, call: BenignCall) -> Self {
        self.benign.push(call);
        self
    }

    pub fn with_terminal(mut self, name: impl Into<String>) -> Self {
        self.terminal.push(name.into());
        self
    }

    pub fn benign(&self) -> &[BenignCall] {
        &self.benign
    }
}

impl CallPolicy for StandardCallPolicy {
    fn classify(&self, target: &str, site: &CallSite<'_>) -> CallDecision {
        if self.terminal.iter().any(|name| target.contains(name.as_str())) {
            return CallDecision::Terminal;
        }

        match self
            .benign
            .iter()
            .find(|call| target.contains(call.name.as_str()))
        {
            Some(call) if call.satisfied(site) => CallDecision::Benign,
            _ => CallDecision::Unresolved,
        }
    }
}
