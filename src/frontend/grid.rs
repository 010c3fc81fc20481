use std::rc::Rc;

use itertools::Itertools;

use super::{
    ast::{BinaryOperator, CommutativeOperator, Expr, ExprRef, IndexRef, UnaryOperator},
    dims::Dim,
    intern::InternedSymbol,
    value::Value,
};
use crate::index::simple_index;

simple_index! {
    /// Identifies a grid within the stencil that declared it
    pub struct GridId;
}

#[derive(Debug)]
struct GridInfo {
    id: GridId,
    name: InternedSymbol,
    dims: Vec<Dim>,
}

/// A named, multi-dimensional variable. Cheap to clone; every grid point
/// holds a handle to the grid it accesses.
#[derive(Debug, Clone)]
pub struct Grid(Rc<GridInfo>);

impl PartialEq for Grid {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Grid {}

impl Grid {
    pub(crate) fn new(id: GridId, name: InternedSymbol, dims: Vec<Dim>) -> Self {
        Self(Rc::new(GridInfo { id, name, dims }))
    }

    pub fn id(&self) -> GridId {
        self.0.id
    }

    pub fn name(&self) -> InternedSymbol {
        self.0.name
    }

    pub fn dims(&self) -> &[Dim] {
        &self.0.dims
    }

    pub fn position_of(&self, dim: Dim) -> Option<usize> {
        self.0.dims.iter().position(|d| *d == dim)
    }

    pub fn has_dim(&self, dim: Dim) -> bool {
        self.position_of(dim).is_some()
    }

    pub fn step_dim(&self) -> Option<Dim> {
        self.0.dims.iter().copied().find(|d| d.is_step())
    }

    /// Builds an access to this grid. Argument `i` indexes `dims()[i]`.
    pub fn at(&self, args: Vec<Value>) -> Value {
        let args = args.into_iter().map(Value::into_expr).collect();

        Value(Expr::grid_point(GridPoint::new(self.clone(), args)))
    }
}

/// Builds a grid point expression from a grid and one argument per grid
/// dimension: `point!(u, t + 1, x, y)`.
#[macro_export]
macro_rules! point {
    ($grid:expr $(, $arg:expr)* $(,)?) => {
        $grid.at(vec![$($crate::frontend::value::Value::from($arg)),*])
    };
}

/// Offsets of a normalized grid point, one per grid dimension. Together
/// with the grid id this is the identity of an access shape.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PointKey {
    pub grid: GridId,
    pub offsets: Box<[i64]>,
}

/// One access into a grid
#[derive(Debug, Clone)]
pub struct GridPoint {
    grid: Grid,
    /// The argument expressions as written by the stencil author
    args: Vec<ExprRef>,
    /// The affine normal form of `args`, or why there is none
    offsets: Result<Box<[i64]>, String>,
}

/// Points are equal when they access the same grid at the same normalized
/// offsets, however their arguments were written
impl PartialEq for GridPoint {
    fn eq(&self, other: &Self) -> bool {
        self.grid.id() == other.grid.id() && self.offsets == other.offsets
    }
}

impl GridPoint {
    pub fn new(grid: Grid, args: Vec<ExprRef>) -> Self {
        let offsets = normalize_args(&grid, &args);

        Self {
            grid,
            args,
            offsets,
        }
    }

    /// Builds an already normalized point
    pub fn with_offsets(grid: Grid, offsets: Box<[i64]>) -> Self {
        let args = grid
            .dims()
            .iter()
            .zip(offsets.iter())
            .map(|(dim, offset)| {
                if dim.is_misc() {
                    Expr::constant(*offset as f64)
                } else if *offset == 0 {
                    Expr::index(IndexRef::Dim(*dim))
                } else {
                    Expr::commutative(
                        CommutativeOperator::Add,
                        vec![Expr::index(IndexRef::Dim(*dim)), Expr::constant(*offset as f64)],
                    )
                }
            })
            .collect();

        Self {
            grid,
            args,
            offsets: Ok(offsets),
        }
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn args(&self) -> &[ExprRef] {
        &self.args
    }

    pub fn offsets(&self) -> Option<&[i64]> {
        self.offsets.as_deref().ok()
    }

    /// Why the arguments are not affine, if they are not
    pub fn index_error(&self) -> Option<&str> {
        self.offsets.as_ref().err().map(String::as_str)
    }

    /// Normalized offsets. Equations are validated when they are declared,
    /// so every point reachable from the analysis phases has them.
    pub fn resolved_offsets(&self) -> &[i64] {
        self.offsets()
            .expect("grid point arguments are validated when the equation is declared")
    }

    pub fn key(&self) -> PointKey {
        PointKey {
            grid: self.grid.id(),
            offsets: self.resolved_offsets().into(),
        }
    }

    pub fn offset_of(&self, dim: Dim) -> Option<i64> {
        self.grid
            .position_of(dim)
            .map(|position| self.resolved_offsets()[position])
    }

    pub fn step_offset(&self) -> Option<i64> {
        self.grid.step_dim().and_then(|dim| self.offset_of(dim))
    }

    /// Offsets of the misc dimensions only, in grid order
    pub fn misc_offsets(&self) -> Vec<i64> {
        self.grid
            .dims()
            .iter()
            .zip(self.resolved_offsets())
            .filter(|(dim, _)| dim.is_misc())
            .map(|(_, offset)| *offset)
            .collect()
    }

    /// A copy of this point moved by `shift` in each listed dimension the
    /// grid has. Dimensions the grid lacks are ignored.
    pub fn translated(&self, shift: &[(Dim, i64)]) -> GridPoint {
        let mut offsets: Box<[i64]> = self.resolved_offsets().into();

        for (dim, amount) in shift {
            if let Some(position) = self.grid.position_of(*dim) {
                offsets[position] += amount;
            }
        }

        GridPoint::with_offsets(self.grid.clone(), offsets)
    }
}

/// A linear combination of loop indices plus an integral constant
#[derive(Debug, Default)]
struct Linear {
    terms: Vec<(Dim, i64)>,
    constant: i64,
}

impl Linear {
    fn add(mut self, other: Linear, sign: i64) -> Linear {
        for (dim, coefficient) in other.terms {
            match self.terms.iter_mut().find(|(d, _)| *d == dim) {
                Some((_, c)) => *c += sign * coefficient,
                None => self.terms.push((dim, sign * coefficient)),
            }
        }

        self.constant += sign * other.constant;
        self.terms.retain(|(_, c)| *c != 0);
        self
    }

    fn scale(mut self, factor: i64) -> Linear {
        self.terms.iter_mut().for_each(|(_, c)| *c *= factor);
        self.constant *= factor;
        self.terms.retain(|(_, c)| *c != 0);
        self
    }

    fn as_constant(&self) -> Option<i64> {
        self.terms.is_empty().then_some(self.constant)
    }
}

fn linearize(expr: &Expr) -> Option<Linear> {
    match expr {
        Expr::Const(value) if value.fract() == 0.0 => Some(Linear {
            terms: Vec::new(),
            constant: *value as i64,
        }),
        Expr::Index(IndexRef::Dim(dim)) => Some(Linear {
            terms: vec![(*dim, 1)],
            constant: 0,
        }),
        Expr::Unary {
            operator: UnaryOperator::Negate,
            operand,
        } => linearize(operand).map(|l| l.scale(-1)),
        Expr::Binary {
            operator: BinaryOperator::Subtract,
            lhs,
            rhs,
        } => Some(linearize(lhs)?.add(linearize(rhs)?, -1)),
        Expr::Commutative {
            operator: CommutativeOperator::Add,
            operands,
        } => operands
            .iter()
            .try_fold(Linear::default(), |acc, op| Some(acc.add(linearize(op)?, 1))),
        Expr::Commutative {
            operator: CommutativeOperator::Multiply,
            operands,
        } => {
            let mut factor = 1;
            let mut variable: Option<Linear> = None;

            for operand in operands {
                let linear = linearize(operand)?;

                match linear.as_constant() {
                    Some(c) => factor *= c,
                    None if variable.is_none() => variable = Some(linear),
                    // Product of two indices
                    None => return None,
                }
            }

            Some(match variable {
                Some(linear) => linear.scale(factor),
                None => Linear {
                    terms: Vec::new(),
                    constant: factor,
                },
            })
        }
        _ => None,
    }
}

fn normalize_args(grid: &Grid, args: &[ExprRef]) -> Result<Box<[i64]>, String> {
    if args.len() != grid.dims().len() {
        return Err(format!(
            "grid `{}` has {} dimension(s) but was accessed with {} argument(s)",
            grid.name(),
            grid.dims().len(),
            args.len()
        ));
    }

    grid.dims()
        .iter()
        .zip(args)
        .map(|(dim, arg)| {
            let describe = || strip_ansi_escapes::strip_str(arg.to_string());

            let linear = linearize(arg).ok_or_else(|| {
                format!(
                    "argument `{}` for `{}` of grid `{}` is not an affine index expression",
                    describe(),
                    dim.name(),
                    grid.name()
                )
            })?;

            if dim.is_misc() {
                return linear.as_constant().ok_or_else(|| {
                    format!(
                        "argument `{}` for misc dimension `{}` of grid `{}` must be a constant",
                        describe(),
                        dim.name(),
                        grid.name()
                    )
                });
            }

            match linear.terms.as_slice() {
                [(d, 1)] if d == dim => Ok(linear.constant),
                _ => Err(format!(
                    "argument `{}` for `{}` of grid `{}` must have the form `{}+offset`",
                    describe(),
                    dim.name(),
                    grid.name(),
                    dim.name()
                )),
            }
        })
        .collect()
}

impl core::fmt::Display for PointKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}]", self.grid, self.offsets.iter().join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::dims::DimKind;

    fn grid() -> (Grid, Dim, Dim, Dim) {
        let t = Dim::new("t", DimKind::Step);
        let x = Dim::new("x", DimKind::Domain);
        let m = Dim::new("m", DimKind::Misc);
        let g = Grid::new(GridId(0), InternedSymbol::new("g"), vec![t, x, m]);
        (g, t, x, m)
    }

    #[test]
    fn affine_arguments_normalize_to_offsets() {
        let (g, t, x, _) = grid();
        let value = point!(g, t + 1, (x - 3) + 1, 2);

        let point = value.0.as_grid_point().unwrap();
        assert_eq!(point.offsets(), Some(&[1, -2, 2][..]));
        assert_eq!(point.step_offset(), Some(1));
        assert_eq!(point.misc_offsets(), vec![2]);
    }

    #[test]
    fn scaled_index_is_rejected() {
        let (g, t, x, _) = grid();
        let value = point!(g, t, x * 2, 0);

        let point = value.0.as_grid_point().unwrap();
        assert!(point.offsets().is_none());
        assert!(point.index_error().unwrap().contains("x+offset"));
    }

    #[test]
    fn wrong_dimension_is_rejected() {
        let (g, t, _, _) = grid();
        let value = point!(g, t, t, 0);

        assert!(value.0.as_grid_point().unwrap().index_error().is_some());
    }

    #[test]
    fn misc_argument_must_be_constant() {
        let (g, t, x, m) = grid();
        let value = point!(g, t, x, m);

        let error = value.0.as_grid_point().unwrap().index_error().unwrap().to_owned();
        assert!(error.contains("must be a constant"));
    }

    #[test]
    fn arity_mismatch_is_rejected() {
        let (g, t, x, _) = grid();
        let value = point!(g, t, x);

        assert!(value.0.as_grid_point().unwrap().index_error().is_some());
    }

    #[test]
    fn points_compare_by_normalized_offsets() {
        let (g, t, x, _) = grid();
        let written = point!(g, t + 1, (x + 2) - 1, 3);
        let written = written.0.as_grid_point().unwrap();

        assert_eq!(*written, GridPoint::with_offsets(g.clone(), [1, 1, 3].into()));
        assert_ne!(*written, GridPoint::with_offsets(g, [1, 0, 3].into()));
    }

    #[test]
    fn translation_moves_only_present_dims() {
        let (g, t, x, _) = grid();
        let y = Dim::new("y", DimKind::Domain);
        let value = point!(g, t, x + 1, 0);

        let moved = value.0.as_grid_point().unwrap().translated(&[(x, 4), (y, 2)]);
        assert_eq!(moved.resolved_offsets(), &[0, 5, 0]);
    }
}
