//! Source-language types as seen by dispatch
//!
//! A small nominal lattice: abstract numeric types at the top, concrete
//! primitives at the leaves, plus pointer and tuple constructors. Only
//! concrete types can be compiled.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Type {
    /// Top of the lattice.
    Any,
    Number,
    Real,
    Integer,
    Signed,
    Unsigned,
    AbstractFloat,

    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    Nothing,

    Ptr(Box<Type>),
    Tuple(Vec<Type>),
}

impl Type {
    /// Direct abstract supertype of a nominal type. `None` for `Any` and
    /// for the structural constructors.
    pub fn supertype(&self) -> Option<Type> {
        use Type::*;
        match self {
            Any | Ptr(_) | Tuple(_) => None,
            Number | Nothing => Some(Any),
            Real => Some(Number),
            Integer | AbstractFloat => Some(Real),
            Signed | Unsigned => Some(Integer),
            Bool => Some(Integer),
            Int8 | Int16 | Int32 | Int64 => Some(Signed),
            UInt8 | UInt16 | UInt32 | UInt64 => Some(Unsigned),
            Float32 | Float64 => Some(AbstractFloat),
        }
    }

    /// `self <: other`
    pub fn is_subtype(&self, other: &Type) -> bool {
        if self == other || *other == Type::Any {
            return true;
        }
        match (self, other) {
            // Pointers are invariant in their pointee.
            (Type::Ptr(_), Type::Ptr(_)) => false,
            (Type::Tuple(a), Type::Tuple(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.is_subtype(y))
            }
            _ => {
                let mut current = self.supertype();
                while let Some(ty) = current {
                    if &ty == other {
                        return true;
                    }
                    current = ty.supertype();
                }
                false
            }
        }
    }

    /// Whether values can have exactly this type.
    pub fn is_concrete(&self) -> bool {
        use Type::*;
        match self {
            Any | Number | Real | Integer | Signed | Unsigned | AbstractFloat => false,
            Ptr(inner) => inner.is_concrete(),
            Tuple(items) => items.iter().all(Type::is_concrete),
            _ => true,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Ptr(inner) => write!(f, "Ptr{{{}}}", inner),
            Type::Tuple(items) => {
                write!(f, "Tuple{{")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "}}")
            }
            other => write!(f, "{:?}", other),
        }
    }
}

/// Render `name(T1, T2, ...)` for diagnostics.
pub fn signature_string(name: &str, types: &[Type]) -> String {
    let args = types.iter().map(Type::to_string).collect::<Vec<_>>().join(", ");
    format!("{}({})", name, args)
}
