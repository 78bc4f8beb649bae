use std::rc::Rc;

/// The part of a [SymbolicValue] that is not a plain integer offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Base {
    /// No symbolic part. A value with this base and no pending dereference is a constant.
    Zero,

    /// A named symbol, typically the initial value of a register. Two symbols with the same name
    /// are equivalent.
    Symbol(Rc<str>),

    /// A value that was offset after being dereferenced. The nested value is shared so that
    /// repeated arithmetic on a loaded value does not copy the expression tree.
    Nested(Rc<SymbolicValue>),

    /// The sum of two values, neither of which is a constant. The `+` operator should be preferred
    /// to this, as it folds constants where a direct construction does not.
    Sum(Rc<SymbolicValue>, Rc<SymbolicValue>),

    /// A slice of a wider value: `source` is logically shifted right by `shift` bits and then
    /// truncated to `bits` bits.
    Lane {
        source: Rc<SymbolicValue>,
        shift: u32,
        bits: u32,
    },
}

/// An immutable symbolic expression of the form `deref^depth(base + offset)`.
///
/// The dereference depth counts the pending pointer indirections. A depth of zero means the value
/// is itself the quantity of interest, for example an address computed by `lea`. A memory operand
/// such as `[rsp+0x8]` has a depth of one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolicValue {
    base: Base,
    offset: i64,
    deref_depth: u32,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("cannot take the address of {0}: value is not dereferenced")]
    NotDereferenced(SymbolicValue),
}

pub type Result<T> = std::result::Result<T, Error>;

impl SymbolicValue {
    pub fn constant(value: i64) -> Self {
        Self {
            base: Base::Zero,
            offset: value,
            deref_depth: 0,
        }
    }

    pub fn symbol(name: impl AsRef<str>) -> Self {
        Self {
            base: Base::Symbol(Rc::from(name.as_ref())),
            offset: 0,
            deref_depth: 0,
        }
    }

    pub fn base(&self) -> &Base {
        &self.base
    }

    /// The integer offset applied to the base before any pending dereference.
    pub fn offset(&self) -> i64 {
        self.offset
    }

    pub fn deref_depth(&self) -> u32 {
        self.deref_depth
    }

    /// Add one level of indirection. The result denotes the data stored at the address this value
    /// denotes.
    pub fn deref(mut self) -> Self {
        self.deref_depth += 1;
        self
    }

    /// Remove one level of indirection. This is the inverse of [Self::deref] and fails if the value
    /// has no pending dereference.
    pub fn reference(mut self) -> Result<Self> {
        if self.deref_depth == 0 {
            return Err(Error::NotDereferenced(self));
        }

        self.deref_depth -= 1;
        Ok(self)
    }

    /// Add an integer to this value. The integer is folded into the offset when there is no pending
    /// dereference, otherwise the dereferenced value becomes the base of a new expression.
    pub fn add_offset(self, value: i64) -> Self {
        if self.deref_depth == 0 {
            Self {
                offset: self.offset.wrapping_add(value),
                ..self
            }
        } else if value == 0 {
            self
        } else {
            Self {
                base: Base::Nested(Rc::new(self)),
                offset: value,
                deref_depth: 0,
            }
        }
    }

    pub fn sub_offset(self, value: i64) -> Self {
        self.add_offset(value.wrapping_neg())
    }

    /// Slice lane `index` of width `bits` out of this value. Lane 0 holds the least significant
    /// bits.
    pub fn lane(&self, index: u32, bits: u32) -> Self {
        Self {
            base: Base::Lane {
                source: Rc::new(self.clone()),
                shift: index * bits,
                bits,
            },
            offset: 0,
            deref_depth: 0,
        }
    }

    /// The concrete integer this value denotes, if it has no symbolic part.
    pub fn as_constant(&self) -> Option<i64> {
        match self.base {
            Base::Zero if self.deref_depth == 0 => Some(self.offset),
            _ => None,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.as_constant() == Some(0)
    }

    /// The symbol name if this value is exactly a symbol plus an offset.
    pub fn base_symbol(&self) -> Option<&str> {
        match &self.base {
            Base::Symbol(name) => Some(name.as_ref()),
            _ => None,
        }
    }

    /// Whether the address computation of this value refers to the symbol `name` directly, that is
    /// without going through a dereference. A value loaded from memory does not reference the
    /// symbols used to compute the address it was loaded from.
    pub fn references(&self, name: &str) -> bool {
        if self.deref_depth > 0 {
            return false;
        }

        match &self.base {
            Base::Zero | Base::Lane { .. } => false,
            Base::Symbol(symbol) => symbol.as_ref() == name,
            Base::Nested(value) => value.references(name),
            Base::Sum(lhs, rhs) => lhs.references(name) || rhs.references(name),
        }
    }
}

impl From<i64> for SymbolicValue {
    fn from(value: i64) -> Self {
        Self::constant(value)
    }
}

impl std::ops::Add<i64> for SymbolicValue {
    type Output = Self;

    fn add(self, rhs: i64) -> Self::Output {
        self.add_offset(rhs)
    }
}

impl std::ops::Sub<i64> for SymbolicValue {
    type Output = Self;

    fn sub(self, rhs: i64) -> Self::Output {
        self.sub_offset(rhs)
    }
}

impl std::ops::Add for SymbolicValue {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        if let Some(value) = rhs.as_constant() {
            return self.add_offset(value);
        }

        if let Some(value) = self.as_constant() {
            return rhs.add_offset(value);
        }

        Self {
            base: Base::Sum(Rc::new(self), Rc::new(rhs)),
            offset: 0,
            deref_depth: 0,
        }
    }
}

impl std::fmt::Display for SymbolicValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for _ in 0..self.deref_depth {
            write!(f, "[")?;
        }

        match &self.base {
            Base::Zero => write_signed_hex(f, self.offset)?,
            Base::Symbol(name) => write!(f, "{name}")?,
            Base::Nested(value) => write!(f, "{value}")?,
            Base::Sum(lhs, rhs) => write!(f, "{lhs}+{rhs}")?,
            Base::Lane {
                source,
                shift: 0,
                bits,
            } => write!(f, "(u{bits}){source}")?,
            Base::Lane {
                source,
                shift,
                bits,
            } => write!(f, "(u{bits})({source}>>{shift})")?,
        }

        if self.base != Base::Zero && self.offset != 0 {
            if self.offset > 0 {
                write!(f, "+")?;
            }
            write_signed_hex(f, self.offset)?;
        }

        for _ in 0..self.deref_depth {
            write!(f, "]")?;
        }

        Ok(())
    }
}

fn write_signed_hex(f: &mut std::fmt::Formatter<'_>, value: i64) -> std::fmt::Result {
    if value < 0 {
        write!(f, "-{:#x}", value.unsigned_abs())
    } else {
        write!(f, "{value:#x}")
    }
}
