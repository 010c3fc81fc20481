use strum::EnumString;

use super::{
    ast::{Expr, IndexRef},
    intern::InternedSymbol,
    value::Value,
};

/// The role a dimension plays in a stencil
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, EnumString, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum DimKind {
    /// The time-like dimension advanced once per stencil application
    Step,
    /// A spatial dimension the stencil is evaluated over
    Domain,
    /// A selector dimension indexed by constants only
    Misc,
}

/// A named dimension. Copyable handle, compared by name and kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Dim {
    name: InternedSymbol,
    kind: DimKind,
}

impl Dim {
    pub fn new(name: &str, kind: DimKind) -> Self {
        Self {
            name: InternedSymbol::new(name),
            kind,
        }
    }

    pub fn name(self) -> InternedSymbol {
        self.name
    }

    pub fn kind(self) -> DimKind {
        self.kind
    }

    pub fn is_step(self) -> bool {
        self.kind == DimKind::Step
    }

    pub fn is_domain(self) -> bool {
        self.kind == DimKind::Domain
    }

    pub fn is_misc(self) -> bool {
        self.kind == DimKind::Misc
    }

    /// The loop index of this dimension as an expression
    pub fn value(self) -> Value {
        Value(Expr::index(IndexRef::Dim(self)))
    }

    pub fn first_index(self) -> Value {
        Value(Expr::index(IndexRef::FirstIndex(self)))
    }

    pub fn last_index(self) -> Value {
        Value(Expr::index(IndexRef::LastIndex(self)))
    }

    pub fn less_than(self, rhs: impl Into<Value>) -> Value {
        self.value().less_than(rhs)
    }

    pub fn less_equal(self, rhs: impl Into<Value>) -> Value {
        self.value().less_equal(rhs)
    }

    pub fn greater_than(self, rhs: impl Into<Value>) -> Value {
        self.value().greater_than(rhs)
    }

    pub fn greater_equal(self, rhs: impl Into<Value>) -> Value {
        self.value().greater_equal(rhs)
    }

    pub fn equal_to(self, rhs: impl Into<Value>) -> Value {
        self.value().equal_to(rhs)
    }
}

impl From<Dim> for Value {
    fn from(dim: Dim) -> Self {
        dim.value()
    }
}

impl core::ops::Add<i64> for Dim {
    type Output = Value;

    fn add(self, rhs: i64) -> Value {
        self.value() + rhs
    }
}

impl core::ops::Sub<i64> for Dim {
    type Output = Value;

    fn sub(self, rhs: i64) -> Value {
        self.value() - rhs
    }
}

impl core::ops::Add<Value> for Dim {
    type Output = Value;

    fn add(self, rhs: Value) -> Value {
        self.value() + rhs
    }
}

impl core::ops::Sub<Value> for Dim {
    type Output = Value;

    fn sub(self, rhs: Value) -> Value {
        self.value() - rhs
    }
}

impl core::ops::Mul<i64> for Dim {
    type Output = Value;

    fn mul(self, rhs: i64) -> Value {
        self.value() * rhs
    }
}

impl core::ops::Add<Dim> for Dim {
    type Output = Value;

    fn add(self, rhs: Dim) -> Value {
        self.value() + rhs.value()
    }
}
