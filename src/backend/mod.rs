//! The backend turns analyzed bundles into C++ source.
//!
//! Each bundle gets a scalar body evaluating one domain point and a vector
//! body evaluating one cluster of vectors. Both are printed from the same
//! equations by [`print_helper::ExprPrinter`], which delegates every grid
//! access and temporary to a [`print_helper::PrintHelper`]: the scalar
//! helper reads single elements, the vector helper consults the bundle's
//! [`VecInfo`](crate::middle::vec_info::VecInfo).

use crate::{
    frontend::stencil::{Equation, EquationId, Stencil},
    index::IndexVec,
    middle::{
        bundles::{Bundle, BundleId},
        dims::Dimensions,
        shuffle::ShuffleCapability,
    },
    settings::CompilerSettings,
};

pub mod cpp;
pub mod cpp_vec;
pub mod print_helper;
pub mod writer;

/// Everything a code generator needs about one analyzed stencil
#[derive(Debug)]
pub struct Program<'a> {
    pub stencil: &'a Stencil,
    pub settings: &'a CompilerSettings,
    pub dims: &'a Dimensions,
    pub equations: &'a IndexVec<EquationId, Equation>,
    pub bundles: &'a IndexVec<BundleId, Bundle>,
    pub radius: u32,
    pub halo: u32,
    pub step_alloc: u32,
}

pub trait CodeGenerator {
    fn generate(&self, program: &Program<'_>) -> String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumString, strum::Display, strum::VariantNames)]
#[strum(serialize_all = "lowercase")]
pub enum Target {
    /// Portable C++ with the vector type emulated in software
    Cpp,
    Avx,
    Avx512,
}

impl Target {
    pub fn vector_bytes(self) -> usize {
        match self {
            Target::Cpp | Target::Avx512 => 64,
            Target::Avx => 32,
        }
    }

    pub fn shuffle_capability(self) -> ShuffleCapability {
        match self {
            Target::Cpp => ShuffleCapability {
                shuffles: false,
                masks: false,
            },
            Target::Avx => ShuffleCapability {
                shuffles: true,
                masks: false,
            },
            Target::Avx512 => ShuffleCapability {
                shuffles: true,
                masks: true,
            },
        }
    }

    pub fn get_code_generator(self) -> impl CodeGenerator {
        cpp::CppGenerator { target: self }
    }
}
