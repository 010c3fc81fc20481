//! Printing expressions as C++.
//!
//! [`ExprPrinter`] walks an expression bottom up and builds its C++ text.
//! Whenever a non-leaf node has more than one parent it is assigned to a
//! temporary the first time it is printed, and later uses refer to the
//! temporary. Grid reads and writes are left to a [`PrintHelper`].

use hashbrown::HashMap;

use super::writer::CodeWriter;
use crate::{
    frontend::{
        ast::{
            format_dim_offset, node_id,
            visit::{walk_expression, Visitor},
            BinaryOperator, CommutativeOperator, Equals, ExprRef, IndexRef, UnaryOperator,
        },
        grid::GridPoint,
    },
    middle::counter::UseCounter,
};

pub trait PrintHelper {
    /// C++ type of temporaries
    fn var_type(&self) -> &'static str;

    /// A fresh variable name with the given prefix
    fn make_var_name(&mut self, prefix: &str) -> String;

    /// Returns an expression holding the value at `point`, emitting any
    /// statements needed to compute it first
    fn read_from_point(&mut self, writer: &mut CodeWriter, point: &GridPoint) -> String;

    fn write_to_point(&mut self, writer: &mut CodeWriter, point: &GridPoint, value: &str);
}

/// Names variables `prefix_N` with one counter per helper
#[derive(Debug, Default)]
pub struct VarNames {
    next: usize,
}

impl VarNames {
    pub fn make(&mut self, prefix: &str) -> String {
        let name = format!("{prefix}_{}", self.next);
        self.next += 1;
        name
    }
}

/// A floating point literal of the stencil's element type
pub fn format_const(value: f64) -> String {
    if value.is_nan() {
        "std::numeric_limits<real_t>::quiet_NaN()".into()
    } else if value.is_infinite() {
        let sign = if value < 0.0 { "-" } else { "" };
        format!("({sign}std::numeric_limits<real_t>::infinity())")
    } else {
        format!("((real_t){value:?})")
    }
}

/// Arguments addressing one element, e.g. `t+1, x, y-2`
pub fn element_args(point: &GridPoint) -> String {
    itertools::join(
        point
            .grid()
            .dims()
            .iter()
            .zip(point.resolved_offsets())
            .map(|(dim, offset)| format_dim_offset(*dim, *offset)),
        ", ",
    )
}

pub fn format_index(index: &IndexRef) -> String {
    match index {
        IndexRef::Dim(dim) => dim.name().value().to_owned(),
        IndexRef::FirstIndex(dim) => format!("context.first_index_{}", dim.name()),
        IndexRef::LastIndex(dim) => format!("context.last_index_{}", dim.name()),
    }
}

pub struct ExprPrinter<'p, H> {
    helper: &'p mut H,
    writer: &'p mut CodeWriter,
    uses: &'p UseCounter,
    temps: HashMap<usize, String>,
    result: String,
}

impl<'p, H: PrintHelper> ExprPrinter<'p, H> {
    pub fn new(helper: &'p mut H, writer: &'p mut CodeWriter, uses: &'p UseCounter) -> Self {
        Self {
            helper,
            writer,
            uses,
            temps: HashMap::new(),
            result: String::new(),
        }
    }

    pub fn print_value(&mut self, expression: &ExprRef) -> String {
        self.visit_expression(expression);
        std::mem::take(&mut self.result)
    }

    pub fn writer(&mut self) -> &mut CodeWriter {
        &mut *self.writer
    }

    /// Emits the statement storing `rhs` at `lhs`
    pub fn print_equation(&mut self, lhs: &GridPoint, rhs: &ExprRef) {
        let value = self.print_value(rhs);
        self.helper.write_to_point(self.writer, lhs, &value);
    }
}

impl<'e, H: PrintHelper> Visitor<'e> for ExprPrinter<'_, H> {
    fn visit_expression(&mut self, expression: &'e ExprRef) {
        if let Some(temp) = self.temps.get(&node_id(expression)) {
            self.result = temp.clone();
            return;
        }

        walk_expression(self, expression);

        if !expression.is_leaf() && self.uses.is_shared(expression) {
            let temp = self.helper.make_var_name("temp");
            self.writer.emit(format!(
                "{} {temp} = {};",
                self.helper.var_type(),
                self.result
            ));
            self.temps.insert(node_id(expression), temp.clone());
            self.result = temp;
        }
    }

    fn visit_const(&mut self, value: f64) {
        self.result = format_const(value);
    }

    fn visit_code(&mut self, code: &'e str) {
        self.result = code.to_owned();
    }

    fn visit_index(&mut self, index: &'e IndexRef) {
        self.result = format_index(index);
    }

    fn visit_grid_point(&mut self, point: &'e GridPoint) {
        self.result = self.helper.read_from_point(self.writer, point);
    }

    fn visit_unary(&mut self, operator: UnaryOperator, operand: &'e ExprRef) {
        let operand = self.print_value(operand);
        self.result = format!("({operator}{operand})");
    }

    fn visit_binary(&mut self, operator: BinaryOperator, lhs: &'e ExprRef, rhs: &'e ExprRef) {
        let lhs = self.print_value(lhs);
        let rhs = self.print_value(rhs);
        self.result = format!("({lhs} {operator} {rhs})");
    }

    fn visit_equals(&mut self, equals: &'e Equals) {
        self.print_equation(&equals.lhs, &equals.rhs);
    }

    fn visit_commutative(&mut self, operator: CommutativeOperator, operands: &'e [ExprRef]) {
        let operands: Vec<String> = operands.iter().map(|o| self.print_value(o)).collect();
        self.result = format!("({})", operands.join(&format!(" {operator} ")));
    }
}

/// Prints sub-domain conditions. They only hold indices and constants, so
/// no statements are needed and integral constants print as integers.
#[derive(Debug, Default)]
pub struct ConditionPrinter {
    result: String,
}

impl ConditionPrinter {
    pub fn print(condition: &ExprRef) -> String {
        let mut printer = Self::default();
        printer.visit_expression(condition);
        printer.result
    }
}

impl<'e> Visitor<'e> for ConditionPrinter {
    fn visit_const(&mut self, value: f64) {
        self.result = if value.fract() == 0.0 && value.abs() < 1e15 {
            format!("{}", value as i64)
        } else {
            format!("{value:?}")
        };
    }

    fn visit_code(&mut self, code: &'e str) {
        self.result = code.to_owned();
    }

    fn visit_index(&mut self, index: &'e IndexRef) {
        self.result = format_index(index);
    }

    fn visit_unary(&mut self, operator: UnaryOperator, operand: &'e ExprRef) {
        let operand = Self::print(operand);
        self.result = format!("{operator}{operand}");
    }

    fn visit_binary(&mut self, operator: BinaryOperator, lhs: &'e ExprRef, rhs: &'e ExprRef) {
        self.result = format!("({} {operator} {})", Self::print(lhs), Self::print(rhs));
    }

    fn visit_commutative(&mut self, operator: CommutativeOperator, operands: &'e [ExprRef]) {
        let operands = operands.iter().map(Self::print).collect::<Vec<_>>();
        self.result = format!("({})", operands.join(&format!(" {operator} ")));
    }
}

/// Prints equations for one domain point, reading and writing single
/// elements
#[derive(Debug, Default)]
pub struct CppPrintHelper {
    names: VarNames,
}

impl CppPrintHelper {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PrintHelper for CppPrintHelper {
    fn var_type(&self) -> &'static str {
        "real_t"
    }

    fn make_var_name(&mut self, prefix: &str) -> String {
        self.names.make(prefix)
    }

    fn read_from_point(&mut self, _writer: &mut CodeWriter, point: &GridPoint) -> String {
        format!("context.{}->read_elem({})", point.grid().name(), element_args(point))
    }

    fn write_to_point(&mut self, writer: &mut CodeWriter, point: &GridPoint, value: &str) {
        writer.emit(format!(
            "context.{}->write_elem({value}, {});",
            point.grid().name(),
            element_args(point)
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        frontend::{ast::Expr, stencil::Stencil},
        point,
    };

    #[test]
    fn scalar_equation_reads_and_writes_elements() {
        let mut stencil = Stencil::new("inc");
        let t = stencil.step_dim("t");
        let x = stencil.domain_dim("x");
        let g = stencil.grid("g", &[t, x]);
        stencil.define(point!(g, t + 1, x), point!(g, t, x - 1) + 1.0);
        stencil.validate().unwrap();

        let equation = stencil.equation(0);
        let uses = UseCounter::new();
        let mut helper = CppPrintHelper::new();
        let mut writer = CodeWriter::new();
        ExprPrinter::new(&mut helper, &mut writer, &uses).print_equation(equation.lhs(), equation.rhs());

        assert_eq!(
            writer.into_output(),
            "context.g->write_elem((context.g->read_elem(t, x-1) + ((real_t)1.0)), t+1, x);\n"
        );
    }

    #[test]
    fn non_finite_constants_are_valid_cpp() {
        assert_eq!(format_const(0.5), "((real_t)0.5)");
        assert_eq!(format_const(f64::NAN), "std::numeric_limits<real_t>::quiet_NaN()");
        assert_eq!(
            format_const(f64::INFINITY),
            "(std::numeric_limits<real_t>::infinity())"
        );
        assert_eq!(
            format_const(f64::NEG_INFINITY),
            "(-std::numeric_limits<real_t>::infinity())"
        );
    }

    #[test]
    fn shared_nodes_become_temporaries() {
        let shared = Expr::commutative(
            CommutativeOperator::Multiply,
            vec![Expr::code("c0"), Expr::constant(2.0)],
        );
        let expr = Expr::binary(BinaryOperator::Divide, shared.clone(), shared);

        let mut uses = UseCounter::new();
        uses.visit_expression(&expr);

        let mut helper = CppPrintHelper::new();
        let mut writer = CodeWriter::new();
        let value = ExprPrinter::new(&mut helper, &mut writer, &uses).print_value(&expr);

        assert_eq!(value, "(temp_0 / temp_0)");
        assert_eq!(writer.into_output(), "real_t temp_0 = (c0 * ((real_t)2.0));\n");
    }

    #[test]
    fn conditions_print_integral_constants_as_integers() {
        let mut stencil = Stencil::new("cond");
        stencil.step_dim("t");
        let z = stencil.domain_dim("z");

        let condition = z.less_than(z.last_index() - 8).or(z.equal_to(3));
        assert_eq!(
            ConditionPrinter::print(&condition.into_expr()),
            "((z < (context.last_index_z - 8)) || (z == 3))"
        );
    }
}
