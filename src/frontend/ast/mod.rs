//! The expression tree stencil equations are built from.
//!
//! Nodes are immutable once built and are shared through [`ExprRef`]
//! (`Rc<Expr>`), so one subexpression may hang off several parents. The
//! resulting graph is always acyclic since a node can only reference nodes
//! that existed before it.

use std::rc::Rc;

use colored::Colorize;
use itertools::Itertools;

use super::{
    dims::Dim,
    grid::{Grid, GridPoint},
};

pub mod visit;

/// A shared, reference counted expression node
pub type ExprRef = Rc<Expr>;

#[derive(Debug)]
pub enum Expr {
    /// A floating point literal
    Const(f64),
    /// A fragment of target code which is pasted into the output verbatim
    Code(String),
    /// A reference to a loop index (only valid in grid point arguments and
    /// sub-domain conditions)
    Index(IndexRef),
    GridPoint(GridPoint),
    Unary {
        operator: UnaryOperator,
        operand: ExprRef,
    },
    Binary {
        operator: BinaryOperator,
        lhs: ExprRef,
        rhs: ExprRef,
    },
    Equals(Equals),
    /// An operator applied to two or more operands where operand order does
    /// not matter mathematically (but is preserved for printing)
    Commutative {
        operator: CommutativeOperator,
        operands: Vec<ExprRef>,
    },
}

/// `lhs = rhs`, optionally restricted to the sub-domain where `condition`
/// holds
#[derive(Debug)]
pub struct Equals {
    pub lhs: GridPoint,
    pub rhs: ExprRef,
    pub condition: Option<ExprRef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IndexRef {
    /// The current value of the loop index
    Dim(Dim),
    /// The first index of the overall problem domain
    FirstIndex(Dim),
    /// The last index of the overall problem domain
    LastIndex(Dim),
}

impl IndexRef {
    pub fn dim(self) -> Dim {
        match self {
            IndexRef::Dim(dim) | IndexRef::FirstIndex(dim) | IndexRef::LastIndex(dim) => dim,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, strum::Display)]
pub enum UnaryOperator {
    #[strum(serialize = "-")]
    Negate,
    #[strum(serialize = "!")]
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, strum::Display)]
pub enum BinaryOperator {
    #[strum(serialize = "-")]
    Subtract,
    #[strum(serialize = "/")]
    Divide,
    #[strum(serialize = "<")]
    LessThan,
    #[strum(serialize = "<=")]
    LessThanOrEqualTo,
    #[strum(serialize = ">")]
    GreaterThan,
    #[strum(serialize = ">=")]
    GreaterThanOrEqualTo,
    #[strum(serialize = "==")]
    Equals,
    #[strum(serialize = "!=")]
    NotEquals,
    #[strum(serialize = "&&")]
    LogicalAnd,
    #[strum(serialize = "||")]
    LogicalOr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperatorClass {
    Arithmetic,
    Comparison,
    Logical,
}

impl BinaryOperator {
    pub fn class(self) -> BinaryOperatorClass {
        match self {
            Self::Subtract | Self::Divide => BinaryOperatorClass::Arithmetic,
            Self::LessThan
            | Self::LessThanOrEqualTo
            | Self::GreaterThan
            | Self::GreaterThanOrEqualTo
            | Self::Equals
            | Self::NotEquals => BinaryOperatorClass::Comparison,
            Self::LogicalAnd | Self::LogicalOr => BinaryOperatorClass::Logical,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, strum::Display)]
pub enum CommutativeOperator {
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "*")]
    Multiply,
}

impl CommutativeOperator {
    /// The value of the operator applied to zero operands
    pub fn identity(self) -> f64 {
        match self {
            CommutativeOperator::Add => 0.0,
            CommutativeOperator::Multiply => 1.0,
        }
    }
}

impl Expr {
    pub fn constant(value: f64) -> ExprRef {
        Rc::new(Expr::Const(value))
    }

    pub fn code(code: impl Into<String>) -> ExprRef {
        Rc::new(Expr::Code(code.into()))
    }

    pub fn index(index: IndexRef) -> ExprRef {
        Rc::new(Expr::Index(index))
    }

    pub fn unary(operator: UnaryOperator, operand: ExprRef) -> ExprRef {
        Rc::new(Expr::Unary { operator, operand })
    }

    pub fn binary(operator: BinaryOperator, lhs: ExprRef, rhs: ExprRef) -> ExprRef {
        Rc::new(Expr::Binary { operator, lhs, rhs })
    }

    /// Builds a commutative node, absorbing operands which are themselves
    /// the same commutative operator so `a + (b + c)` becomes `a + b + c`.
    pub fn commutative(operator: CommutativeOperator, operands: Vec<ExprRef>) -> ExprRef {
        let mut flattened = Vec::with_capacity(operands.len());

        for operand in operands {
            match &*operand {
                Expr::Commutative {
                    operator: inner,
                    operands: inner_operands,
                } if *inner == operator => flattened.extend(inner_operands.iter().cloned()),
                _ => flattened.push(operand),
            }
        }

        match flattened.len() {
            0 => Expr::constant(operator.identity()),
            1 => flattened.remove(0),
            _ => Rc::new(Expr::Commutative {
                operator,
                operands: flattened,
            }),
        }
    }

    pub fn grid_point(point: GridPoint) -> ExprRef {
        Rc::new(Expr::GridPoint(point))
    }

    pub fn as_grid_point(&self) -> Option<&GridPoint> {
        match self {
            Expr::GridPoint(point) => Some(point),
            _ => None,
        }
    }

    pub fn as_equals(&self) -> Option<&Equals> {
        match self {
            Expr::Equals(equals) => Some(equals),
            _ => None,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(
            self,
            Expr::Const(_) | Expr::Code(_) | Expr::Index(_) | Expr::GridPoint(_)
        )
    }
}

/// Identity of a node within the DAG. Two parents sharing a child see the
/// same id.
pub fn node_id(expr: &ExprRef) -> usize {
    Rc::as_ptr(expr) as usize
}

impl Grid {
    /// Used by the pretty printer only
    fn colored_name(&self) -> colored::ColoredString {
        self.name().value().blue()
    }
}

impl core::fmt::Display for GridPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}(", self.grid().colored_name())?;

        match self.offsets() {
            Some(offsets) => {
                let args = self
                    .grid()
                    .dims()
                    .iter()
                    .zip(offsets.iter())
                    .map(|(dim, offset)| format_dim_offset(*dim, *offset))
                    .join(", ");
                write!(f, "{args}")?;
            }
            None => write!(f, "{}", self.args().iter().join(", "))?,
        }

        write!(f, ")")
    }
}

/// Formats one normalized grid point argument like `x`, `x+1` or `x-2`.
/// Misc dimensions hold a plain constant.
pub fn format_dim_offset(dim: Dim, offset: i64) -> String {
    if dim.is_misc() {
        return offset.to_string();
    }

    match offset {
        0 => dim.name().value().to_owned(),
        o if o > 0 => format!("{}+{o}", dim.name()),
        o => format!("{}{o}", dim.name()),
    }
}

impl core::fmt::Display for IndexRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexRef::Dim(dim) => write!(f, "{}", dim.name()),
            IndexRef::FirstIndex(dim) => write!(f, "first_index({})", dim.name()),
            IndexRef::LastIndex(dim) => write!(f, "last_index({})", dim.name()),
        }
    }
}

impl core::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Const(value) => write!(f, "{}", format!("{value}").purple()),
            Expr::Code(code) => write!(f, "{}", code.cyan()),
            Expr::Index(index) => write!(f, "{}", index.to_string().yellow()),
            Expr::GridPoint(point) => write!(f, "{point}"),
            Expr::Unary { operator, operand } => write!(f, "{}{operand}", operator.to_string().white()),
            Expr::Binary { operator, lhs, rhs } => {
                write!(f, "({lhs} {} {rhs})", operator.to_string().white())
            }
            Expr::Equals(equals) => {
                write!(f, "{} {} {}", equals.lhs, "EQUALS".magenta(), equals.rhs)?;

                if let Some(condition) = &equals.condition {
                    write!(f, " {} {condition}", "IF".magenta())?;
                }

                Ok(())
            }
            Expr::Commutative { operator, operands } => write!(
                f,
                "({})",
                operands
                    .iter()
                    .join(&format!(" {} ", operator.to_string().white()))
            ),
        }
    }
}
