//! Analyses run between declaring a stencil and printing it:
//!
//! 1. Domain coverage defaults are appended for conditionally written
//!    values.
//! 2. Identical subexpressions are merged into shared nodes.
//! 3. The dependency graph between equations is built and checked for
//!    cycles.
//! 4. Equations are partitioned into bundles.
//! 5. Per bundle, the cluster body is built and its vector reads analyzed.

pub mod bundles;
pub mod cluster;
pub mod counter;
pub mod coverage;
pub mod cse;
pub mod dims;
pub mod equations;
pub mod shuffle;
pub mod vec_info;
