//! Trait definition for an expression visitor which walks the DAG in DFS order
//!
//! Every `visit_*` method defaults to walking the node's operands (unary:
//! operand; binary and equals: left then right; commutative: operands in
//! order), so a visitor only overrides the variants it cares about. A node
//! reachable through two parents is visited twice unless the visitor
//! overrides [`Visitor::visit_expression`] to memoize on [`node_id`].
//!
//! [`node_id`]: super::node_id

use super::{
    BinaryOperator, CommutativeOperator, Equals, Expr, ExprRef, IndexRef, UnaryOperator,
};
use crate::frontend::grid::GridPoint;

pub trait Visitor<'e>: Sized {
    /// Entry point for every node in the tree
    fn visit_expression(&mut self, expression: &'e ExprRef) {
        walk_expression(self, expression)
    }

    fn visit_const(&mut self, _value: f64) {}

    fn visit_code(&mut self, _code: &'e str) {}

    fn visit_index(&mut self, _index: &'e IndexRef) {}

    fn visit_grid_point(&mut self, _point: &'e GridPoint) {}

    fn visit_unary(&mut self, _operator: UnaryOperator, operand: &'e ExprRef) {
        walk_unary(self, operand)
    }

    fn visit_binary(&mut self, _operator: BinaryOperator, lhs: &'e ExprRef, rhs: &'e ExprRef) {
        walk_binary(self, lhs, rhs)
    }

    fn visit_equals(&mut self, equals: &'e Equals) {
        walk_equals(self, equals)
    }

    /// Sub-domain conditions are not part of the computed value, so they are
    /// skipped unless a visitor asks for them.
    fn visit_condition(&mut self, _condition: &'e ExprRef) {}

    fn visit_commutative(&mut self, _operator: CommutativeOperator, operands: &'e [ExprRef]) {
        walk_commutative(self, operands)
    }
}

pub fn walk_expression<'e>(visitor: &mut impl Visitor<'e>, expression: &'e ExprRef) {
    match &**expression {
        Expr::Const(value) => visitor.visit_const(*value),
        Expr::Code(code) => visitor.visit_code(code),
        Expr::Index(index) => visitor.visit_index(index),
        Expr::GridPoint(point) => visitor.visit_grid_point(point),
        Expr::Unary { operator, operand } => visitor.visit_unary(*operator, operand),
        Expr::Binary { operator, lhs, rhs } => visitor.visit_binary(*operator, lhs, rhs),
        Expr::Equals(equals) => visitor.visit_equals(equals),
        Expr::Commutative { operator, operands } => visitor.visit_commutative(*operator, operands),
    }
}

pub fn walk_unary<'e>(visitor: &mut impl Visitor<'e>, operand: &'e ExprRef) {
    visitor.visit_expression(operand);
}

pub fn walk_binary<'e>(visitor: &mut impl Visitor<'e>, lhs: &'e ExprRef, rhs: &'e ExprRef) {
    visitor.visit_expression(lhs);
    visitor.visit_expression(rhs);
}

pub fn walk_equals<'e>(visitor: &mut impl Visitor<'e>, equals: &'e Equals) {
    visitor.visit_grid_point(&equals.lhs);
    visitor.visit_expression(&equals.rhs);

    if let Some(condition) = &equals.condition {
        visitor.visit_condition(condition);
    }
}

pub fn walk_commutative<'e>(visitor: &mut impl Visitor<'e>, operands: &'e [ExprRef]) {
    for operand in operands {
        visitor.visit_expression(operand);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::ast::node_id;

    /// Records the order in which constants are reached
    #[derive(Default)]
    struct ConstOrder(Vec<f64>);

    impl<'e> Visitor<'e> for ConstOrder {
        fn visit_const(&mut self, value: f64) {
            self.0.push(value);
        }
    }

    /// Counts distinct nodes by identity
    #[derive(Default)]
    struct DistinctNodes(hashbrown::HashSet<usize>, usize);

    impl<'e> Visitor<'e> for DistinctNodes {
        fn visit_expression(&mut self, expression: &'e ExprRef) {
            self.1 += 1;

            if self.0.insert(node_id(expression)) {
                walk_expression(self, expression);
            }
        }
    }

    #[test]
    fn default_traversal_is_left_to_right() {
        let expr = Expr::binary(
            BinaryOperator::Subtract,
            Expr::unary(UnaryOperator::Negate, Expr::constant(1.0)),
            Expr::commutative(
                CommutativeOperator::Add,
                vec![Expr::constant(2.0), Expr::constant(3.0), Expr::constant(4.0)],
            ),
        );

        let mut order = ConstOrder::default();
        order.visit_expression(&expr);

        assert_eq!(order.0, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn shared_node_is_visited_once_per_parent_unless_memoized() {
        let shared = Expr::constant(5.0);
        let expr = Expr::binary(BinaryOperator::Divide, shared.clone(), shared);

        let mut order = ConstOrder::default();
        order.visit_expression(&expr);
        assert_eq!(order.0, vec![5.0, 5.0]);

        let mut distinct = DistinctNodes::default();
        distinct.visit_expression(&expr);
        assert_eq!(distinct.0.len(), 2);
        assert_eq!(distinct.1, 3);
    }
}
