//! The builder stencil definitions use to declare dimensions, grids and
//! equations. Everything is evaluated eagerly: each `define*` call builds
//! the equation's AST immediately and validates its grid point arguments,
//! so a malformed equation is reported with the location it was declared
//! at.

use std::{panic::Location, rc::Rc};

use super::{
    ast::{visit::Visitor, Equals, Expr, ExprRef},
    dims::{Dim, DimKind},
    grid::{Grid, GridId, GridPoint},
    intern::InternedSymbol,
    value::Value,
};
use crate::{
    error::{CompileError, Result, SourceLocation},
    index::{simple_index, Index, IndexVec},
};

simple_index! {
    pub struct EquationId;
}

/// How an equation came to exist
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EquationOrigin {
    Declared(SourceLocation),
    /// Added by the compiler to give otherwise undefined points a value
    CoverageDefault,
}

#[derive(Debug, Clone)]
pub struct Equation {
    pub id: EquationId,
    /// Always an [`Expr::Equals`] node
    pub expr: ExprRef,
    pub origin: EquationOrigin,
}

impl Equation {
    pub fn equals(&self) -> &Equals {
        self.expr
            .as_equals()
            .expect("equations always wrap an equals node")
    }

    pub fn lhs(&self) -> &GridPoint {
        &self.equals().lhs
    }

    pub fn rhs(&self) -> &ExprRef {
        &self.equals().rhs
    }

    pub fn condition(&self) -> Option<&ExprRef> {
        self.equals().condition.as_ref()
    }

    /// A short human readable label, e.g. `eq2 (pressure(t+1, x, y, z))`
    pub fn label(&self) -> String {
        format!(
            "eq{} ({})",
            self.id,
            strip_ansi_escapes::strip_str(self.lhs().to_string())
        )
    }
}

#[derive(Debug)]
pub struct Stencil {
    name: String,
    dims: Vec<Dim>,
    grids: IndexVec<GridId, Grid>,
    equations: IndexVec<EquationId, Equation>,
    radius: Option<u32>,
    /// The first problem found while declaring, reported by [`Stencil::validate`]
    error: Option<CompileError>,
}

impl Stencil {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dims: Vec::new(),
            grids: IndexVec::new(),
            equations: IndexVec::new(),
            radius: None,
            error: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn declare_dim(&mut self, name: &str, kind: DimKind) -> Dim {
        let dim = Dim::new(name, kind);

        if self.dims.iter().any(|d| d.name() == dim.name()) {
            self.record(CompileError::InvalidGrid(format!(
                "dimension `{name}` is declared twice"
            )));
        } else {
            self.dims.push(dim);
        }

        dim
    }

    pub fn step_dim(&mut self, name: &str) -> Dim {
        if self.dims.iter().any(|d| d.is_step()) {
            self.record(CompileError::InvalidGrid(format!(
                "a second step dimension `{name}` was declared"
            )));
        }

        self.declare_dim(name, DimKind::Step)
    }

    pub fn domain_dim(&mut self, name: &str) -> Dim {
        self.declare_dim(name, DimKind::Domain)
    }

    pub fn misc_dim(&mut self, name: &str) -> Dim {
        self.declare_dim(name, DimKind::Misc)
    }

    /// Declares a grid. The dimension list must contain the step dimension
    /// exactly once.
    pub fn grid(&mut self, name: &str, dims: &[Dim]) -> Grid {
        let steps = dims.iter().filter(|d| d.is_step()).count();

        if steps != 1 {
            self.record(CompileError::InvalidGrid(format!(
                "grid `{name}` must have exactly one step dimension, found {steps}"
            )));
        }

        if let Some(dim) = dims.iter().find(|d| !self.dims.contains(d)) {
            self.record(CompileError::InvalidGrid(format!(
                "grid `{name}` uses undeclared dimension `{}`",
                dim.name()
            )));
        }

        if self.grids.iter().any(|g| g.name().value() == name) {
            self.record(CompileError::InvalidGrid(format!(
                "grid `{name}` is declared twice"
            )));
        }

        let grid = Grid::new(self.grids.next_index(), InternedSymbol::new(name), dims.to_vec());
        self.grids.push(grid.clone());
        grid
    }

    /// Sets the access radius the stencil author expects. Reads further
    /// away than this are reported as a warning.
    pub fn set_radius(&mut self, radius: u32) {
        self.radius = Some(radius);
    }

    /// Declares `lhs = rhs` over the whole domain
    #[track_caller]
    pub fn define(&mut self, lhs: Value, rhs: impl Into<Value>) -> EquationId {
        self.define_at(Location::caller(), lhs, rhs.into(), None)
    }

    /// Declares `lhs = rhs` restricted to the sub-domain where `condition`
    /// holds
    #[track_caller]
    pub fn define_if(
        &mut self,
        lhs: Value,
        rhs: impl Into<Value>,
        condition: impl Into<Value>,
    ) -> EquationId {
        self.define_at(
            Location::caller(),
            lhs,
            rhs.into(),
            Some(condition.into().into_expr()),
        )
    }

    fn define_at(
        &mut self,
        location: &'static Location<'static>,
        lhs: Value,
        rhs: Value,
        condition: Option<ExprRef>,
    ) -> EquationId {
        let location = SourceLocation::from(location);
        let id = self.equations.next_index();

        let lhs = match lhs.into_expr().as_grid_point() {
            Some(point) => point.clone(),
            None => {
                self.record(CompileError::MalformedIndex {
                    location,
                    message: "the left-hand side of an equation must be a grid point".into(),
                });
                return id;
            }
        };

        if let Err(message) = check_written_point(&lhs) {
            self.record(CompileError::MalformedIndex { location, message });
        }

        let rhs = rhs.into_expr();

        if let Err(message) = check_value(&rhs) {
            self.record(CompileError::MalformedIndex { location, message });
        }

        if let Some(condition) = &condition {
            if let Err(message) = check_condition(condition) {
                self.record(CompileError::MalformedCondition { location, message });
            }
        }

        self.equations.push(Equation {
            id,
            expr: Rc::new(Expr::Equals(Equals {
                lhs,
                rhs,
                condition,
            })),
            origin: EquationOrigin::Declared(location),
        })
    }

    fn record(&mut self, error: CompileError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    /// Reports the first problem found while the stencil was declared.
    /// The problem stays recorded, so every call reports it.
    pub fn validate(&self) -> Result<()> {
        if let Some(error) = &self.error {
            return Err(error.clone());
        }

        if self.step().is_none() {
            return Err(CompileError::InvalidGrid(format!(
                "stencil `{}` declares no step dimension",
                self.name
            )));
        }

        if self.equations.is_empty() {
            return Err(CompileError::InvalidGrid(format!(
                "stencil `{}` declares no equations",
                self.name
            )));
        }

        Ok(())
    }

    pub fn step(&self) -> Option<Dim> {
        self.dims.iter().copied().find(|d| d.is_step())
    }

    pub fn domain_dims(&self) -> Vec<Dim> {
        self.dims.iter().copied().filter(|d| d.is_domain()).collect()
    }

    pub fn misc_dims(&self) -> Vec<Dim> {
        self.dims.iter().copied().filter(|d| d.is_misc()).collect()
    }

    pub fn grids(&self) -> &IndexVec<GridId, Grid> {
        &self.grids
    }

    pub fn equations(&self) -> &IndexVec<EquationId, Equation> {
        &self.equations
    }

    pub fn radius(&self) -> Option<u32> {
        self.radius
    }

    pub fn equation(&self, index: usize) -> &Equation {
        &self.equations[EquationId::new(index)]
    }
}

/// The written point must sit at the current domain position
fn check_written_point(point: &GridPoint) -> std::result::Result<(), String> {
    if let Some(message) = point.index_error() {
        return Err(message.to_owned());
    }

    let grid = point.grid();

    for (dim, offset) in grid.dims().iter().zip(point.resolved_offsets()) {
        if dim.is_domain() && *offset != 0 {
            return Err(format!(
                "grid `{}` is written at `{}` offset {offset}, writes must be at offset 0",
                grid.name(),
                dim.name()
            ));
        }
    }

    Ok(())
}

/// Finds the first problem in a value expression: a malformed grid point, a
/// loop index used as a value, or a nested equation
#[derive(Default)]
struct ValueChecker {
    error: Option<String>,
}

impl<'e> Visitor<'e> for ValueChecker {
    fn visit_grid_point(&mut self, point: &'e GridPoint) {
        if self.error.is_none() {
            self.error = point.index_error().map(str::to_owned);
        }
    }

    fn visit_index(&mut self, index: &'e super::ast::IndexRef) {
        if self.error.is_none() {
            self.error = Some(format!("loop index `{index}` cannot be used as a value"));
        }
    }

    fn visit_equals(&mut self, _equals: &'e Equals) {
        if self.error.is_none() {
            self.error = Some("equations cannot be nested".into());
        }
    }
}

fn check_value(rhs: &ExprRef) -> std::result::Result<(), String> {
    let mut checker = ValueChecker::default();
    checker.visit_expression(rhs);

    checker.error.map_or(Ok(()), Err)
}

/// Conditions may only combine loop indices and constants
#[derive(Default)]
struct ConditionChecker {
    error: Option<String>,
}

impl<'e> Visitor<'e> for ConditionChecker {
    fn visit_grid_point(&mut self, point: &'e GridPoint) {
        if self.error.is_none() {
            self.error = Some(format!(
                "conditions cannot read grid `{}`",
                point.grid().name()
            ));
        }
    }

    fn visit_code(&mut self, code: &'e str) {
        if self.error.is_none() {
            self.error = Some(format!("conditions cannot contain code `{code}`"));
        }
    }

    fn visit_equals(&mut self, _equals: &'e Equals) {
        if self.error.is_none() {
            self.error = Some("conditions cannot contain equations".into());
        }
    }
}

fn check_condition(condition: &ExprRef) -> std::result::Result<(), String> {
    let mut checker = ConditionChecker::default();
    checker.visit_expression(condition);

    checker.error.map_or(Ok(()), Err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::point;

    fn heat() -> (Stencil, Grid, Dim, Dim) {
        let mut stencil = Stencil::new("heat");
        let t = stencil.step_dim("t");
        let x = stencil.domain_dim("x");
        let u = stencil.grid("u", &[t, x]);
        (stencil, u, t, x)
    }

    #[test]
    fn well_formed_equation_is_accepted() {
        let (mut stencil, u, t, x) = heat();

        stencil.define(
            point!(u, t + 1, x),
            (point!(u, t, x - 1) + point!(u, t, x + 1)) * 0.5,
        );

        assert!(stencil.validate().is_ok());
        assert_eq!(stencil.equations().len(), 1);
        assert_eq!(stencil.equation(0).lhs().step_offset(), Some(1));
    }

    #[test]
    fn malformed_index_reports_declaration_site() {
        let (mut stencil, u, t, x) = heat();

        let line = line!() + 1;
        stencil.define(point!(u, t + 1, x), point!(u, t, x * 2));

        match stencil.validate() {
            Err(CompileError::MalformedIndex { location, .. }) => {
                assert_eq!(location.line, line);
                assert!(location.file.ends_with("stencil.rs"));
            }
            other => panic!("expected a malformed index error, got {other:?}"),
        }
    }

    #[test]
    fn declaration_errors_are_reported_every_time() {
        let (mut stencil, u, t, x) = heat();

        stencil.define(point!(u, t + 1, x), point!(u, t, x * 2));

        for _ in 0..2 {
            assert!(matches!(
                stencil.validate(),
                Err(CompileError::MalformedIndex { .. })
            ));
        }
    }

    #[test]
    fn shifted_write_is_rejected() {
        let (mut stencil, u, t, x) = heat();

        stencil.define(point!(u, t + 1, x + 1), point!(u, t, x));

        assert!(matches!(
            stencil.validate(),
            Err(CompileError::MalformedIndex { .. })
        ));
    }

    #[test]
    fn condition_reading_a_grid_is_rejected() {
        let (mut stencil, u, t, x) = heat();

        stencil.define_if(
            point!(u, t + 1, x),
            point!(u, t, x),
            point!(u, t, x).greater_than(0.0),
        );

        assert!(matches!(
            stencil.validate(),
            Err(CompileError::MalformedCondition { .. })
        ));
    }

    #[test]
    fn grid_without_step_dim_is_rejected() {
        let mut stencil = Stencil::new("bad");
        let _t = stencil.step_dim("t");
        let x = stencil.domain_dim("x");
        stencil.grid("coefficients", &[x]);

        assert!(matches!(stencil.validate(), Err(CompileError::InvalidGrid(_))));
    }
}
