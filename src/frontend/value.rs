//! Operator overloads that let stencil definitions read like the equations
//! they describe, e.g. `(u(t, x - 1) + u(t, x + 1)) * 0.5`.

use super::ast::{BinaryOperator, CommutativeOperator, Expr, ExprRef, UnaryOperator};

/// A handle to an expression node used while declaring a stencil
#[derive(Debug, Clone)]
pub struct Value(pub ExprRef);

impl Value {
    pub fn constant(value: f64) -> Self {
        Self(Expr::constant(value))
    }

    /// Target code pasted verbatim into the generated kernel
    pub fn code(code: impl Into<String>) -> Self {
        Self(Expr::code(code))
    }

    pub fn into_expr(self) -> ExprRef {
        self.0
    }

    fn compare(self, operator: BinaryOperator, rhs: impl Into<Value>) -> Value {
        Value(Expr::binary(operator, self.0, rhs.into().0))
    }

    pub fn less_than(self, rhs: impl Into<Value>) -> Value {
        self.compare(BinaryOperator::LessThan, rhs)
    }

    pub fn less_equal(self, rhs: impl Into<Value>) -> Value {
        self.compare(BinaryOperator::LessThanOrEqualTo, rhs)
    }

    pub fn greater_than(self, rhs: impl Into<Value>) -> Value {
        self.compare(BinaryOperator::GreaterThan, rhs)
    }

    pub fn greater_equal(self, rhs: impl Into<Value>) -> Value {
        self.compare(BinaryOperator::GreaterThanOrEqualTo, rhs)
    }

    pub fn equal_to(self, rhs: impl Into<Value>) -> Value {
        self.compare(BinaryOperator::Equals, rhs)
    }

    pub fn not_equal_to(self, rhs: impl Into<Value>) -> Value {
        self.compare(BinaryOperator::NotEquals, rhs)
    }

    pub fn and(self, rhs: impl Into<Value>) -> Value {
        self.compare(BinaryOperator::LogicalAnd, rhs)
    }

    pub fn or(self, rhs: impl Into<Value>) -> Value {
        self.compare(BinaryOperator::LogicalOr, rhs)
    }
}

impl From<ExprRef> for Value {
    fn from(expr: ExprRef) -> Self {
        Value(expr)
    }
}

impl From<&Value> for Value {
    fn from(value: &Value) -> Self {
        value.clone()
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::constant(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::constant(value as f64)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::constant(value as f64)
    }
}

impl<T: Into<Value>> core::ops::Add<T> for Value {
    type Output = Value;

    fn add(self, rhs: T) -> Value {
        Value(Expr::commutative(
            CommutativeOperator::Add,
            vec![self.0, rhs.into().0],
        ))
    }
}

impl<T: Into<Value>> core::ops::Mul<T> for Value {
    type Output = Value;

    fn mul(self, rhs: T) -> Value {
        Value(Expr::commutative(
            CommutativeOperator::Multiply,
            vec![self.0, rhs.into().0],
        ))
    }
}

impl<T: Into<Value>> core::ops::Sub<T> for Value {
    type Output = Value;

    fn sub(self, rhs: T) -> Value {
        Value(Expr::binary(BinaryOperator::Subtract, self.0, rhs.into().0))
    }
}

impl<T: Into<Value>> core::ops::Div<T> for Value {
    type Output = Value;

    fn div(self, rhs: T) -> Value {
        Value(Expr::binary(BinaryOperator::Divide, self.0, rhs.into().0))
    }
}

impl<T: Into<Value>> core::ops::AddAssign<T> for Value {
    fn add_assign(&mut self, rhs: T) {
        *self = self.clone() + rhs;
    }
}

impl<T: Into<Value>> core::ops::MulAssign<T> for Value {
    fn mul_assign(&mut self, rhs: T) {
        *self = self.clone() * rhs;
    }
}

impl core::ops::Neg for Value {
    type Output = Value;

    fn neg(self) -> Value {
        Value(Expr::unary(UnaryOperator::Negate, self.0))
    }
}

impl core::ops::Not for Value {
    type Output = Value;

    fn not(self) -> Value {
        Value(Expr::unary(UnaryOperator::Not, self.0))
    }
}

impl core::ops::Add<Value> for f64 {
    type Output = Value;

    fn add(self, rhs: Value) -> Value {
        Value::constant(self) + rhs
    }
}

impl core::ops::Sub<Value> for f64 {
    type Output = Value;

    fn sub(self, rhs: Value) -> Value {
        Value::constant(self) - rhs
    }
}

impl core::ops::Mul<Value> for f64 {
    type Output = Value;

    fn mul(self, rhs: Value) -> Value {
        Value::constant(self) * rhs
    }
}

impl core::ops::Div<Value> for f64 {
    type Output = Value;

    fn div(self, rhs: Value) -> Value {
        Value::constant(self) / rhs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::ast::Expr;

    #[test]
    fn chained_additions_build_one_commutative_node() {
        let v = Value::constant(1.0) + 2.0 + 3.0 + 4.0;

        let Expr::Commutative { operator, operands } = &*v.0 else {
            panic!("expected a commutative node");
        };
        assert_eq!(*operator, CommutativeOperator::Add);
        assert_eq!(operands.len(), 4);
    }

    #[test]
    fn scalar_on_the_left_keeps_operand_order() {
        let v = 2.0 - Value::constant(1.0);

        let Expr::Binary { operator, lhs, .. } = &*v.0 else {
            panic!("expected a binary node");
        };
        assert_eq!(*operator, BinaryOperator::Subtract);
        assert!(matches!(&**lhs, Expr::Const(c) if *c == 2.0));
    }
}
