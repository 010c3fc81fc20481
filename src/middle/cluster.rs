//! Replicates a bundle's equations once per vector of a cluster, each copy
//! moved by that vector's element offset.

use std::rc::Rc;

use hashbrown::HashMap;

use super::{bundles::Bundle, dims::Dimensions};
use crate::{
    frontend::{
        ast::{node_id, Equals, Expr, ExprRef},
        dims::Dim,
        grid::GridPoint,
        stencil::{Equation, EquationId},
    },
    index::IndexVec,
};

/// One equation of a cluster body
#[derive(Debug, Clone)]
pub struct ClusterEquation {
    pub source: EquationId,
    /// Element offset of this copy from the cluster origin
    pub shift: Vec<(Dim, i64)>,
    pub lhs: GridPoint,
    pub rhs: ExprRef,
}

/// Rebuilds expressions moved by a fixed shift. Nodes reached twice map to
/// one translated node, so sharing survives translation.
struct Translator<'a> {
    shift: &'a [(Dim, i64)],
    done: HashMap<usize, ExprRef>,
}

impl Translator<'_> {
    fn translate(&mut self, expression: &ExprRef) -> ExprRef {
        if self.shift.iter().all(|(_, amount)| *amount == 0) {
            return expression.clone();
        }

        if let Some(done) = self.done.get(&node_id(expression)) {
            return done.clone();
        }

        let translated = match &**expression {
            Expr::Const(_) | Expr::Code(_) | Expr::Index(_) => expression.clone(),
            Expr::GridPoint(point) => Expr::grid_point(point.translated(self.shift)),
            Expr::Unary { operator, operand } => Expr::unary(*operator, self.translate(operand)),
            Expr::Binary { operator, lhs, rhs } => {
                Expr::binary(*operator, self.translate(lhs), self.translate(rhs))
            }
            Expr::Commutative { operator, operands } => Rc::new(Expr::Commutative {
                operator: *operator,
                operands: operands.iter().map(|o| self.translate(o)).collect(),
            }),
            Expr::Equals(equals) => Rc::new(Expr::Equals(Equals {
                lhs: equals.lhs.translated(self.shift),
                rhs: self.translate(&equals.rhs),
                condition: equals.condition.clone(),
            })),
        };

        self.done.insert(node_id(expression), translated.clone());
        translated
    }
}

/// The equations of `bundle` for every vector of a cluster: outer order is
/// the cluster offset, inner order the bundle's declaration order
pub fn cluster_body(
    bundle: &Bundle,
    equations: &IndexVec<EquationId, Equation>,
    dims: &Dimensions,
) -> Vec<ClusterEquation> {
    let mut body = Vec::new();

    for shift in dims.cluster_offsets() {
        let mut translator = Translator {
            shift: &shift,
            done: HashMap::new(),
        };

        for id in &bundle.equations {
            let equation = &equations[*id];

            body.push(ClusterEquation {
                source: *id,
                shift: shift.clone(),
                lhs: equation.lhs().translated(&shift),
                rhs: translator.translate(equation.rhs()),
            });
        }
    }

    body
}
