//! The type lattice consumed by the optimizer.
//!
//! Inference is an external stage; the optimizer only needs enough of its lattice
//! to answer a handful of questions: is a type concrete, is a value's type fully
//! known, is one type a subtype of another, can an object of this type be mutated.
//! [`IrType`] provides exactly those queries over a small, closed set of shapes.

use std::{fmt, sync::Arc};

/// A constant carried by the IR.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// The unit value `nothing`
    Nothing,
    /// A boolean constant
    Bool(bool),
    /// A 64-bit integer constant
    Int(i64),
    /// A 64-bit floating point constant
    Float(f64),
    /// A string constant
    Str(Arc<str>),
    /// An interned symbol
    Symbol(Arc<str>),
}

impl Literal {
    /// Returns the (widened) type of this constant.
    #[must_use]
    pub fn type_of(&self) -> IrType {
        match self {
            Literal::Nothing => IrType::Nothing,
            Literal::Bool(_) => IrType::Bool,
            Literal::Int(_) => IrType::Int,
            Literal::Float(_) => IrType::Float,
            Literal::Str(_) => IrType::Str,
            Literal::Symbol(_) => IrType::Symbol,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Nothing => write!(f, "nothing"),
            Literal::Bool(b) => write!(f, "{b}"),
            Literal::Int(i) => write!(f, "{i}"),
            Literal::Float(x) => write!(f, "{x:?}"),
            Literal::Str(s) => write!(f, "{s:?}"),
            Literal::Symbol(s) => write!(f, ":{s}"),
        }
    }
}

/// A user-defined aggregate type.
#[derive(Debug, Clone, PartialEq)]
pub struct StructType {
    /// Type name, used for identity
    pub name: Arc<str>,
    /// Whether fields may be reassigned after construction
    pub mutable: bool,
    /// Declared fields, in order
    pub fields: Vec<(Arc<str>, IrType)>,
}

impl StructType {
    /// Creates a struct type.
    #[must_use]
    pub fn new(name: &str, mutable: bool, fields: Vec<(&str, IrType)>) -> Arc<Self> {
        Arc::new(Self {
            name: Arc::from(name),
            mutable,
            fields: fields
                .into_iter()
                .map(|(name, ty)| (Arc::from(name), ty))
                .collect(),
        })
    }

    /// Returns the position of the field called `name`.
    #[must_use]
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|(field, _)| &**field == name)
    }
}

/// A lattice element describing what is known about a value.
///
/// The order of the lattice is given by [`IrType::is_subtype`]: `Bottom` is below
/// everything, `Any` above everything, and `Const` elements sit directly below the type
/// of their constant.
#[derive(Debug, Clone, PartialEq)]
pub enum IrType {
    /// The empty type: an expression of this type never produces a value
    Bottom,
    /// Exactly one known constant
    Const(Literal),
    /// The type of `nothing`
    Nothing,
    /// Booleans
    Bool,
    /// 64-bit integers
    Int,
    /// 64-bit floats
    Float,
    /// Strings
    Str,
    /// Symbols
    Symbol,
    /// A struct type
    Struct(Arc<StructType>),
    /// A tuple with the given element types
    Tuple(Vec<IrType>),
    /// The type whose single instance is the given type
    Type(Box<IrType>),
    /// A named abstract type
    Abstract(Arc<str>),
    /// The top of the lattice
    Any,
}

impl IrType {
    /// Creates a named abstract type.
    #[must_use]
    pub fn abstract_type(name: &str) -> Self {
        IrType::Abstract(Arc::from(name))
    }

    /// Drops constant information, mapping `Const` to the type of its constant.
    #[must_use]
    pub fn widen(&self) -> IrType {
        match self {
            IrType::Const(lit) => lit.type_of(),
            IrType::Tuple(elems) => IrType::Tuple(elems.iter().map(IrType::widen).collect()),
            other => other.clone(),
        }
    }

    /// Returns `true` for the empty type.
    #[must_use]
    pub fn is_bottom(&self) -> bool {
        matches!(self, IrType::Bottom)
    }

    /// Returns `true` if every value of this type has the same, fully known layout.
    #[must_use]
    pub fn is_concrete(&self) -> bool {
        match self {
            IrType::Const(_)
            | IrType::Nothing
            | IrType::Bool
            | IrType::Int
            | IrType::Float
            | IrType::Str
            | IrType::Symbol
            | IrType::Struct(_) => true,
            IrType::Tuple(elems) => elems.iter().all(IrType::is_concrete),
            IrType::Bottom | IrType::Type(_) | IrType::Abstract(_) | IrType::Any => false,
        }
    }

    /// Returns `true` if the type is statically fully known: the empty type, a constant,
    /// or a concrete type.
    #[must_use]
    pub fn is_known(&self) -> bool {
        self.is_bottom() || matches!(self, IrType::Const(_)) || self.widen().is_concrete()
    }

    /// Returns `true` if the type is a constant.
    #[must_use]
    pub fn is_const(&self) -> bool {
        matches!(self, IrType::Const(_))
    }

    /// Returns `true` if the widened type is a tuple type.
    #[must_use]
    pub fn is_tuple(&self) -> bool {
        matches!(self.widen(), IrType::Tuple(_))
    }

    /// Returns `true` for a struct type that allows field reassignment.
    #[must_use]
    pub fn is_mutable(&self) -> bool {
        matches!(self, IrType::Struct(st) if st.mutable)
    }

    /// Returns `true` if no object of this type can be mutated, at any depth.
    ///
    /// Arguments of such a type can be passed to an allocation without the allocation
    /// observing or causing mutation of caller memory.
    #[must_use]
    pub fn is_mutation_free(&self) -> bool {
        match self {
            IrType::Bottom
            | IrType::Const(_)
            | IrType::Nothing
            | IrType::Bool
            | IrType::Int
            | IrType::Float
            | IrType::Str
            | IrType::Symbol
            | IrType::Type(_) => true,
            IrType::Struct(st) => {
                !st.mutable && st.fields.iter().all(|(_, ty)| ty.is_mutation_free())
            }
            IrType::Tuple(elems) => elems.iter().all(IrType::is_mutation_free),
            IrType::Abstract(_) | IrType::Any => false,
        }
    }

    /// Returns the number of fields of an aggregate, if statically known.
    #[must_use]
    pub fn field_count(&self) -> Option<usize> {
        match self.widen() {
            IrType::Struct(st) => Some(st.fields.len()),
            IrType::Tuple(elems) => Some(elems.len()),
            IrType::Nothing => Some(0),
            _ => None,
        }
    }

    /// Returns the declared type of field `idx` of an aggregate.
    #[must_use]
    pub fn field_type(&self, idx: usize) -> Option<IrType> {
        match self.widen() {
            IrType::Struct(st) => st.fields.get(idx).map(|(_, ty)| ty.clone()),
            IrType::Tuple(elems) => elems.get(idx).cloned(),
            _ => None,
        }
    }

    /// Lattice order: returns `true` if every value described by `self` is also
    /// described by `other`.
    #[must_use]
    pub fn is_subtype(&self, other: &IrType) -> bool {
        match (self, other) {
            (IrType::Bottom, _) | (_, IrType::Any) => true,
            (_, IrType::Bottom) => false,
            (IrType::Const(a), IrType::Const(b)) => a == b,
            (IrType::Const(lit), _) => lit.type_of().is_subtype(other),
            (_, IrType::Const(_)) => false,
            (IrType::Tuple(a), IrType::Tuple(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.is_subtype(y))
            }
            (IrType::Struct(a), IrType::Struct(b)) => a.name == b.name,
            (IrType::Type(a), IrType::Type(b)) => a == b,
            (IrType::Abstract(a), IrType::Abstract(b)) => {
                a == b || abstract_parent(a).is_some_and(|parent| {
                    IrType::abstract_type(parent).is_subtype(other)
                })
            }
            (_, IrType::Abstract(name)) => abstract_contains(name, self),
            (a, b) => a == b,
        }
    }

    /// Least upper bound of two lattice elements, as used for phi result types.
    #[must_use]
    pub fn join(&self, other: &IrType) -> IrType {
        if self.is_subtype(other) {
            return other.clone();
        }
        if other.is_subtype(self) {
            return self.clone();
        }
        match (self.widen(), other.widen()) {
            (IrType::Tuple(a), IrType::Tuple(b)) if a.len() == b.len() => {
                IrType::Tuple(a.iter().zip(&b).map(|(x, y)| x.join(y)).collect())
            }
            (a, b) if a == b => a,
            (a, b) if a.is_subtype(&b) => b,
            (a, b) if b.is_subtype(&a) => a,
            _ => IrType::Any,
        }
    }
}

fn abstract_parent(name: &str) -> Option<&'static str> {
    match name {
        "Integer" | "AbstractFloat" => Some("Real"),
        "Real" => Some("Number"),
        _ => None,
    }
}

fn abstract_contains(name: &str, ty: &IrType) -> bool {
    match (name, ty) {
        ("Integer" | "Real" | "Number", IrType::Int) => true,
        ("AbstractFloat" | "Real" | "Number", IrType::Float) => true,
        ("AbstractString", IrType::Str) => true,
        ("Tuple", IrType::Tuple(_)) => true,
        ("Type", IrType::Type(_)) => true,
        _ => false,
    }
}

impl fmt::Display for IrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrType::Bottom => write!(f, "Union{{}}"),
            IrType::Const(lit) => write!(f, "Const({lit})"),
            IrType::Nothing => write!(f, "Nothing"),
            IrType::Bool => write!(f, "Bool"),
            IrType::Int => write!(f, "Int64"),
            IrType::Float => write!(f, "Float64"),
            IrType::Str => write!(f, "String"),
            IrType::Symbol => write!(f, "Symbol"),
            IrType::Struct(st) => write!(f, "{}", st.name),
            IrType::Tuple(elems) => {
                write!(f, "Tuple{{")?;
                for (i, elem) in elems.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{elem}")?;
                }
                write!(f, "}}")
            }
            IrType::Type(inner) => write!(f, "Type{{{inner}}}"),
            IrType::Abstract(name) => write!(f, "{name}"),
            IrType::Any => write!(f, "Any"),
        }
    }
}
