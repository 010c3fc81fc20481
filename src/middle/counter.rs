//! Visitors which count things in expressions: arithmetic operations,
//! grid point reads and writes, and how many parents share each node.

use hashbrown::{HashMap, HashSet};

use crate::frontend::{
    ast::{
        node_id,
        visit::{walk_binary, walk_commutative, walk_expression, walk_unary, Visitor},
        BinaryOperator, CommutativeOperator, Equals, ExprRef, UnaryOperator,
    },
    grid::{GridPoint, PointKey},
};

/// Counts floating point operations: one per unary or binary node and
/// `operands - 1` per commutative node. Shared nodes are counted once per
/// parent, matching the work a tree walk would do.
#[derive(Debug, Default)]
pub struct OpCounter {
    pub ops: usize,
}

impl OpCounter {
    pub fn count(expression: &ExprRef) -> usize {
        let mut counter = Self::default();
        counter.visit_expression(expression);
        counter.ops
    }
}

impl<'e> Visitor<'e> for OpCounter {
    fn visit_unary(&mut self, _operator: UnaryOperator, operand: &'e ExprRef) {
        self.ops += 1;
        walk_unary(self, operand);
    }

    fn visit_binary(&mut self, _operator: BinaryOperator, lhs: &'e ExprRef, rhs: &'e ExprRef) {
        self.ops += 1;
        walk_binary(self, lhs, rhs);
    }

    fn visit_commutative(&mut self, _operator: CommutativeOperator, operands: &'e [ExprRef]) {
        self.ops += operands.len().saturating_sub(1);
        walk_commutative(self, operands);
    }
}

/// Collects the distinct grid points read and written, in the order they
/// are first reached
#[derive(Debug, Default)]
pub struct PointCounter {
    pub reads: Vec<GridPoint>,
    pub writes: Vec<GridPoint>,
    /// Reads including repeats
    pub total_reads: usize,
    seen_reads: HashSet<PointKey>,
    seen_writes: HashSet<PointKey>,
}

impl PointCounter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<'e> Visitor<'e> for PointCounter {
    fn visit_grid_point(&mut self, point: &'e GridPoint) {
        self.total_reads += 1;

        if self.seen_reads.insert(point.key()) {
            self.reads.push(point.clone());
        }
    }

    fn visit_equals(&mut self, equals: &'e Equals) {
        if self.seen_writes.insert(equals.lhs.key()) {
            self.writes.push(equals.lhs.clone());
        }

        self.visit_expression(&equals.rhs);
    }
}

/// Counts, for every node, how many times it is reached as an operand. A
/// node reached more than once is shared and worth a temporary when
/// printed.
#[derive(Debug, Default)]
pub struct UseCounter {
    uses: HashMap<usize, usize>,
}

impl UseCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn uses(&self, expression: &ExprRef) -> usize {
        self.uses.get(&node_id(expression)).copied().unwrap_or(0)
    }

    pub fn is_shared(&self, expression: &ExprRef) -> bool {
        self.uses(expression) > 1
    }
}

impl<'e> Visitor<'e> for UseCounter {
    fn visit_expression(&mut self, expression: &'e ExprRef) {
        let uses = self.uses.entry(node_id(expression)).or_default();
        *uses += 1;

        // Children of a shared node are only reached through it once
        if *uses == 1 {
            walk_expression(self, expression);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::ast::Expr;

    fn leaf(value: f64) -> ExprRef {
        Expr::constant(value)
    }

    #[test]
    fn four_operand_sum_counts_three() {
        let sum = Expr::commutative(
            CommutativeOperator::Add,
            vec![leaf(1.0), leaf(2.0), leaf(3.0), leaf(4.0)],
        );

        assert_eq!(OpCounter::count(&sum), 3);
    }

    #[test]
    fn sum_of_products_counts_five() {
        let a = Expr::commutative(CommutativeOperator::Multiply, vec![leaf(1.0), leaf(2.0)]);
        let b = Expr::commutative(CommutativeOperator::Multiply, vec![leaf(3.0), leaf(4.0)]);
        let sum = Expr::commutative(CommutativeOperator::Add, vec![a, b, leaf(5.0), leaf(6.0)]);

        assert_eq!(OpCounter::count(&sum), 5);
    }

    #[test]
    fn leaves_count_nothing() {
        assert_eq!(OpCounter::count(&leaf(1.0)), 0);
        assert_eq!(OpCounter::count(&Expr::code("coefficient")), 0);
    }

    #[test]
    fn shared_operand_is_counted_per_parent() {
        let shared = Expr::unary(UnaryOperator::Negate, leaf(1.0));
        let expr = Expr::binary(BinaryOperator::Divide, shared.clone(), shared);

        assert_eq!(OpCounter::count(&expr), 3);
    }

    #[test]
    fn use_counter_marks_shared_nodes() {
        let shared = Expr::unary(UnaryOperator::Negate, leaf(1.0));
        let single = Expr::unary(UnaryOperator::Negate, leaf(2.0));
        let expr = Expr::commutative(
            CommutativeOperator::Add,
            vec![shared.clone(), shared.clone(), single.clone()],
        );

        let mut counter = UseCounter::new();
        counter.visit_expression(&expr);

        assert!(counter.is_shared(&shared));
        assert!(!counter.is_shared(&single));
        assert_eq!(counter.uses(&expr), 1);
    }
}
