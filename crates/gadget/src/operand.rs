use crate::arch::Arch;

/// Size prefixes that may precede a memory operand, e.g. `QWORD PTR [rsp+0x8]`.
const SIZE_PREFIXES: [&str; 7] = ["byte", "word", "dword", "qword", "xmmword", "oword", "ptr"];

/// Operand decoding errors
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("empty operand")]
    Empty,

    #[error("unbalanced brackets in operand `{0}`")]
    UnbalancedBrackets(String),

    #[error("unsupported term `{term}` in operand `{operand}`")]
    UnsupportedTerm { operand: String, term: String },
}

pub type Result<T> = std::result::Result<T, Error>;

/// A decoded instruction operand.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operand {
    Register(String),
    Immediate(i64),
    Memory(Memory),

    /// Anything that is neither a register nor an integer, such as a call target `execve` or
    /// `0x4f440 <execve>`.
    Label(String),
}

/// A memory operand `[r1 + r2 + ... + displacement]` with a single level of indirection.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Memory {
    pub registers: Vec<String>,
    pub displacement: i64,
}

impl Memory {
    /// Returns `k` if this operand is exactly `[sp ± k]`.
    pub fn stack_offset(&self, stack_pointer: &str) -> Option<i64> {
        match self.registers.as_slice() {
            [register] if register == stack_pointer => Some(self.displacement),
            _ => None,
        }
    }

    fn parse(operand: &str, inner: &str, arch: Arch) -> Result<Self> {
        if inner.trim().is_empty() {
            return Err(Error::Empty);
        }

        let mut memory = Memory::default();
        let mut negative = false;
        let mut start = 0;

        // Split on signs while remembering the sign of each term
        for (i, c) in inner.char_indices() {
            if c == '+' || c == '-' {
                memory.add_term(operand, &inner[start..i], negative, arch)?;
                negative = c == '-';
                start = i + 1;
            }
        }
        memory.add_term(operand, &inner[start..], negative, arch)?;

        Ok(memory)
    }

    fn add_term(&mut self, operand: &str, term: &str, negative: bool, arch: Arch) -> Result<()> {
        let term = term.trim();
        if term.is_empty() {
            return Ok(());
        }

        let unsupported = || Error::UnsupportedTerm {
            operand: operand.to_string(),
            term: term.to_string(),
        };

        if let Some(value) = parse_integer(term) {
            self.displacement = if negative {
                self.displacement.wrapping_sub(value)
            } else {
                self.displacement.wrapping_add(value)
            };
            return Ok(());
        }

        let register = term.to_ascii_lowercase();
        if negative || arch.classify(&register).is_none() {
            // Scaled indices and subtracted registers are not modeled
            return Err(unsupported());
        }

        self.registers.push(register);
        Ok(())
    }
}

impl Operand {
    /// Decode an operand in Intel syntax. Register names are matched case-insensitively and
    /// stored in lowercase. Anything following a `#` is treated as a comment.
    pub fn parse(text: &str, arch: Arch) -> Result<Self> {
        let text = text.split('#').next().unwrap_or_default().trim();
        if text.is_empty() {
            return Err(Error::Empty);
        }

        if let Some(open) = text.find('[') {
            let close = text
                .rfind(']')
                .filter(|&close| close > open && text[close + 1..].trim().is_empty())
                .ok_or_else(|| Error::UnbalancedBrackets(text.to_string()))?;

            let prefix = text[..open].to_ascii_lowercase();
            if let Some(word) = prefix
                .split_whitespace()
                .find(|word| !SIZE_PREFIXES.contains(word))
            {
                return Err(Error::UnsupportedTerm {
                    operand: text.to_string(),
                    term: word.to_string(),
                });
            }

            return Memory::parse(text, &text[open + 1..close], arch).map(Operand::Memory);
        }

        if text.contains(']') {
            return Err(Error::UnbalancedBrackets(text.to_string()));
        }

        if let Some(value) = parse_integer(text) {
            return Ok(Operand::Immediate(value));
        }

        let register = text.to_ascii_lowercase();
        if arch.classify(&register).is_some() {
            return Ok(Operand::Register(register));
        }

        Ok(Operand::Label(text.to_string()))
    }

    pub fn as_register(&self) -> Option<&str> {
        match self {
            Operand::Register(name) => Some(name.as_str()),
            _ => None,
        }
    }

    pub fn as_memory(&self) -> Option<&Memory> {
        match self {
            Operand::Memory(memory) => Some(memory),
            _ => None,
        }
    }
}

/// Parse a decimal or `0x` prefixed hexadecimal integer with an optional leading `-`. Hexadecimal
/// values wider than 63 bits are reinterpreted as two's complement.
pub fn parse_integer(text: &str) -> Option<i64> {
    let text = text.trim();
    let (negative, magnitude) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };

    let value = if let Some(hex) = magnitude
        .strip_prefix("0x")
        .or_else(|| magnitude.strip_prefix("0X"))
    {
        u64::from_str_radix(hex, 16).ok()? as i64
    } else if !magnitude.is_empty() && magnitude.bytes().all(|b| b.is_ascii_digit()) {
        magnitude.parse::<u64>().ok()? as i64
    } else {
        return None;
    };

    Some(if negative { value.wrapping_neg() } else { value })
}

/// Split the operand list of an instruction on commas that are not inside brackets.
pub fn split_operands(text: &str) -> Vec<String> {
    let mut operands = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    for c in text.chars() {
        match c {
            '[' | '<' | '(' => depth += 1,
            ']' | '>' | ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                operands.push(std::mem::take(&mut current).trim().to_string());
                continue;
            }
            _ => (),
        }
        current.push(c);
    }

    let current = current.trim();
    if !current.is_empty() {
        operands.push(current.to_string());
    }

    operands
}
