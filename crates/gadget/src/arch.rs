use std::borrow::Cow;

/// Width of a vector register in bits.
pub const VECTOR_BITS: u32 = 128;

/// General purpose register stems shared by the 16, 32 and 64-bit register names. The stack
/// pointer is excluded since it is classified separately.
const LEGACY_STEMS: [&str; 7] = ["ax", "bx", "cx", "dx", "si", "di", "bp"];

const BYTE_REGISTERS: [&str; 8] = ["al", "bl", "cl", "dl", "ah", "bh", "ch", "dh"];

// System V calling convention
const AMD64_ARGUMENTS: [&str; 6] = ["rdi", "rsi", "rdx", "rcx", "r8", "r9"];

/// Target architecture of the instructions being emulated.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Arch {
    /// 32-bit x86.
    ///
    /// Global variables are only recognized by addresses computed from the program counter, as on
    /// amd64. Position independent i386 code reaches its globals through a GOT base held in a
    /// general register (`ebx`, `esi`, ...) instead, so such addresses are neither accepted as
    /// global variable arguments of benign calls nor exempt from writable constraints.
    I386,
    Amd64,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RegisterClass {
    StackPointer,
    ProgramCounter,
    General,
    Vector,
}

/// Location of a call argument at the time of the call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArgumentLocation {
    Register(&'static str),

    /// Offset in bytes from the stack pointer.
    Stack(i64),
}

impl Arch {
    pub const fn bits(self) -> u32 {
        match self {
            Arch::I386 => 32,
            Arch::Amd64 => 64,
        }
    }

    /// Size of a machine word in bytes.
    pub const fn word_size(self) -> i64 {
        (self.bits() / 8) as i64
    }

    pub const fn stack_pointer(self) -> &'static str {
        match self {
            Arch::I386 => "esp",
            Arch::Amd64 => "rsp",
        }
    }

    pub const fn program_counter(self) -> &'static str {
        match self {
            Arch::I386 => "eip",
            Arch::Amd64 => "rip",
        }
    }

    /// Number of word-sized lanes in a vector register.
    pub const fn lanes_per_vector(self) -> usize {
        (VECTOR_BITS / self.bits()) as usize
    }

    /// Classify a register by name. Returns `None` if the name is not a register on this
    /// architecture. Names are expected in lowercase.
    pub fn classify(self, name: &str) -> Option<RegisterClass> {
        if name == self.stack_pointer() {
            Some(RegisterClass::StackPointer)
        } else if name == self.program_counter() {
            Some(RegisterClass::ProgramCounter)
        } else if self.is_vector(name) {
            Some(RegisterClass::Vector)
        } else if self.general_register_bits(name).is_some() {
            Some(RegisterClass::General)
        } else {
            None
        }
    }

    /// Width in bits of a general purpose register, or `None` if `name` is not one.
    pub fn general_register_bits(self, name: &str) -> Option<u32> {
        if BYTE_REGISTERS.contains(&name) {
            return Some(8);
        }

        if LEGACY_STEMS.contains(&name) {
            return Some(16);
        }

        if let Some(stem) = name.strip_prefix('e') {
            if LEGACY_STEMS.contains(&stem) {
                return Some(32);
            }
        }

        if self != Arch::Amd64 {
            return None;
        }

        match name {
            "sil" | "dil" | "bpl" | "spl" => return Some(8),
            // Outside of their architectural role the narrow forms of the stack and instruction
            // pointers are plain 32-bit registers
            "esp" | "eip" => return Some(32),
            _ => (),
        }

        let stem = name.strip_prefix('r')?;
        if LEGACY_STEMS.contains(&stem) {
            return Some(64);
        }

        let digits = stem.trim_end_matches(&['d', 'w', 'b'][..]);
        let number: u8 = digits.parse().ok()?;
        if !(8..=15).contains(&number) {
            return None;
        }

        match &stem[digits.len()..] {
            "" => Some(64),
            "d" => Some(32),
            "w" => Some(16),
            "b" => Some(8),
            _ => None,
        }
    }

    fn is_vector(self, name: &str) -> bool {
        let count = match self {
            Arch::I386 => 8,
            Arch::Amd64 => 16,
        };

        name.strip_prefix("xmm")
            .and_then(|index| index.parse::<u8>().ok())
            .is_some_and(|index| index < count)
    }

    /// Resolve the 32-bit alias of a 64-bit general purpose register to the full register. Writing
    /// a 32-bit register on amd64 clears the upper half, so the alias is modeled by writing the
    /// full register. All other names are returned unchanged.
    pub fn resolve_alias(self, name: &str) -> Cow<'_, str> {
        if self != Arch::Amd64 {
            return Cow::Borrowed(name);
        }

        match name {
            "esp" => return Cow::Borrowed("rsp"),
            "eip" => return Cow::Borrowed("rip"),
            _ => (),
        }

        if let Some(stem) = name.strip_prefix('e') {
            if LEGACY_STEMS.contains(&stem) {
                return Cow::Owned(format!("r{stem}"));
            }
        }

        if self.general_register_bits(name) == Some(32) {
            if let Some(full) = name.strip_suffix('d') {
                return Cow::Owned(full.to_string());
            }
        }

        Cow::Borrowed(name)
    }

    /// Location of argument `index` when a call is made.
    ///
    /// On amd64 the first six arguments are passed in registers. On i386 all arguments are passed
    /// on the stack and read before the return address is pushed.
    pub fn argument(self, index: usize) -> Option<ArgumentLocation> {
        match self {
            Arch::Amd64 => AMD64_ARGUMENTS
                .get(index)
                .map(|register| ArgumentLocation::Register(*register)),
            Arch::I386 => {
                let index = i64::try_from(index).ok()?;
                index
                    .checked_mul(self.word_size())
                    .map(ArgumentLocation::Stack)
            }
        }
    }
}

impl std::fmt::Display for Arch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Arch::I386 => write!(f, "i386"),
            Arch::Amd64 => write!(f, "amd64"),
        }
    }
}
