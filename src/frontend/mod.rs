//! Everything a stencil author touches: dimensions, grids, the expression
//! tree built by the operator overloads, and the registry stencils are
//! looked up from.

pub mod ast;
pub mod dims;
pub mod grid;
pub mod intern;
pub mod registry;
pub mod stencil;
pub mod value;

pub use dims::{Dim, DimKind};
pub use grid::{Grid, GridPoint};
pub use stencil::{Equation, EquationId, Stencil};
pub use value::Value;
