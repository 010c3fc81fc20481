//! Loop nest templates: a small language describing how the tiles of a
//! stencil domain are scanned, expanded into C++ loops.

pub mod expand;
pub mod parser;

pub use expand::{LoopOptions, expand};
