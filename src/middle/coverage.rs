//! Default definitions for points no equation covers.
//!
//! When every equation writing some grid values is conditional, points
//! outside all of the conditions would keep whatever the runtime left in
//! memory. Under the "define all points" policy such values get an extra
//! equation setting them to zero wherever none of the conditions hold.

use std::{collections::BTreeMap, rc::Rc};

use itertools::Itertools;
use log::warn;

use super::equations::WriteShape;
use crate::{
    frontend::{
        ast::{BinaryOperator, Equals, Expr, ExprRef, UnaryOperator},
        grid::PointKey,
        stencil::{Equation, EquationId, EquationOrigin},
    },
    index::IndexVec,
};

/// Appends a zero-valued default for each fully conditional write target.
/// Returns how many defaults were added.
pub fn add_defaults(equations: &mut IndexVec<EquationId, Equation>) -> usize {
    let mut targets: BTreeMap<(WriteShape, PointKey), Vec<EquationId>> = BTreeMap::new();

    for equation in equations.iter() {
        let lhs = equation.lhs();
        targets
            .entry((WriteShape::of(lhs), lhs.key()))
            .or_default()
            .push(equation.id);
    }

    let mut added = 0;

    for writers in targets.values() {
        let conditions: Option<Vec<ExprRef>> = writers
            .iter()
            .map(|id| equations[*id].condition().cloned())
            .collect();

        // Some writer covers the whole domain
        let Some(conditions) = conditions else {
            continue;
        };

        let first = &equations[writers[0]];
        let lhs = first.lhs().clone();

        let covered = conditions
            .into_iter()
            .reduce(|a, b| Expr::binary(BinaryOperator::LogicalOr, a, b))
            .expect("every target has at least one writer");
        let uncovered = Expr::unary(UnaryOperator::Not, covered);

        warn!(
            "{} is only defined under conditions (by {}); defaulting it to zero elsewhere",
            strip_ansi_escapes::strip_str(lhs.to_string()),
            writers.iter().map(|id| format!("eq{id}")).join(", ")
        );

        let id = equations.next_index();
        equations.push(Equation {
            id,
            expr: Rc::new(Expr::Equals(Equals {
                lhs,
                rhs: Expr::constant(0.0),
                condition: Some(uncovered),
            })),
            origin: EquationOrigin::CoverageDefault,
        });
        added += 1;
    }

    added
}
