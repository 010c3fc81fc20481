//! Common subexpression elimination by hash-consing: every node is rebuilt
//! bottom-up and structurally identical nodes are replaced by a single
//! shared instance. Operand order is significant, so `a + b` and `b + a`
//! stay distinct.

use std::rc::Rc;

use hashbrown::HashMap;
use log::debug;

use crate::{
    frontend::{
        ast::{node_id, BinaryOperator, CommutativeOperator, Equals, Expr, ExprRef, IndexRef, UnaryOperator},
        grid::PointKey,
        stencil::{Equation, EquationId},
    },
    index::IndexVec,
};

#[derive(Debug, PartialEq, Eq, Hash)]
enum NodeKey {
    Const(u64),
    Code(String),
    Index(IndexRef),
    GridPoint(PointKey),
    Unary(UnaryOperator, usize),
    Binary(BinaryOperator, usize, usize),
    Commutative(CommutativeOperator, Vec<usize>),
}

#[derive(Debug, Default)]
pub struct CommonSubexpressions {
    /// Canonical instance of each distinct node
    table: HashMap<NodeKey, ExprRef>,
    /// Original node id to (original node, canonical node). Holding the
    /// original keeps its address from being reused while the map is live.
    rebuilt: HashMap<usize, (ExprRef, ExprRef)>,
    merged: usize,
}

impl CommonSubexpressions {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many nodes were found to duplicate an existing one
    pub fn merged(&self) -> usize {
        self.merged
    }

    /// Returns the canonical node for `expression`
    pub fn share(&mut self, expression: &ExprRef) -> ExprRef {
        if let Some((_, canonical)) = self.rebuilt.get(&node_id(expression)) {
            return canonical.clone();
        }

        let canonical = match &**expression {
            Expr::Equals(equals) => {
                let rhs = self.share(&equals.rhs);
                let condition = equals.condition.as_ref().map(|c| self.share(c));

                Rc::new(Expr::Equals(Equals {
                    lhs: equals.lhs.clone(),
                    rhs,
                    condition,
                }))
            }
            _ => {
                let (key, rebuilt) = self.key_of(expression);
                self.intern(key, rebuilt)
            }
        };

        self.rebuilt
            .insert(node_id(expression), (expression.clone(), canonical.clone()));
        canonical
    }

    fn intern(&mut self, key: NodeKey, node: ExprRef) -> ExprRef {
        if let Some(existing) = self.table.get(&key) {
            self.merged += 1;
            return existing.clone();
        }

        self.table.insert(key, node.clone());
        node
    }

    /// Computes the structural key of a node with its children already
    /// canonicalized, and the node rebuilt on top of those children
    fn key_of(&mut self, expression: &ExprRef) -> (NodeKey, ExprRef) {
        match &**expression {
            Expr::Const(value) => (NodeKey::Const(value.to_bits()), expression.clone()),
            Expr::Code(code) => (NodeKey::Code(code.clone()), expression.clone()),
            Expr::Index(index) => (NodeKey::Index(*index), expression.clone()),
            Expr::GridPoint(point) => (NodeKey::GridPoint(point.key()), expression.clone()),
            Expr::Unary { operator, operand } => {
                let operand = self.share(operand);
                (
                    NodeKey::Unary(*operator, node_id(&operand)),
                    Expr::unary(*operator, operand),
                )
            }
            Expr::Binary { operator, lhs, rhs } => {
                let lhs = self.share(lhs);
                let rhs = self.share(rhs);
                (
                    NodeKey::Binary(*operator, node_id(&lhs), node_id(&rhs)),
                    Expr::binary(*operator, lhs, rhs),
                )
            }
            Expr::Commutative { operator, operands } => {
                let operands: Vec<ExprRef> = operands.iter().map(|o| self.share(o)).collect();
                let ids = operands.iter().map(node_id).collect();

                (
                    NodeKey::Commutative(*operator, ids),
                    Rc::new(Expr::Commutative {
                        operator: *operator,
                        operands,
                    }),
                )
            }
            Expr::Equals(_) => unreachable!("equals nodes are rebuilt by `share`"),
        }
    }
}

/// Rewrites every equation so identical subexpressions, within and across
/// equations, are one shared node. Returns the number of merged nodes.
pub fn eliminate(equations: &mut IndexVec<EquationId, Equation>) -> usize {
    let mut cse = CommonSubexpressions::new();

    let rewritten: Vec<Equation> = equations
        .iter()
        .map(|equation| Equation {
            expr: cse.share(&equation.expr),
            ..equation.clone()
        })
        .collect();

    debug!("common subexpression elimination merged {} nodes", cse.merged());

    *equations = IndexVec::from_raw(rewritten);
    cse.merged()
}
