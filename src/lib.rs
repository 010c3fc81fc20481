//! A compiler from stencil definitions to vectorized C++ kernels.
//!
//! Stencils are declared with the builder in [`frontend`] and looked up by
//! name from the global registry. [`driver::compile`] runs the whole
//! pipeline: equation analysis and bundling in [`middle`], then C++
//! printing in [`backend`]. [`loops`] separately expands loop nest
//! templates for the runtime that drives the generated kernels.

pub mod backend;
pub mod driver;
pub mod error;
pub mod frontend;
pub mod index;
pub mod loops;
pub mod middle;
pub mod settings;
pub mod stencils;

pub use driver::{compile, compile_stencil};
pub use error::{CompileError, Result};
pub use settings::CompilerSettings;
