use std::{path::PathBuf, str::FromStr};

use crate::{
    backend::Target,
    error::{CompileError, Result},
};

/// Per-dimension factors written as `x=4,y=2`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DimFactors(pub Vec<(String, usize)>);

impl DimFactors {
    pub fn get(&self, dim: &str) -> Option<usize> {
        self.0
            .iter()
            .find(|(name, _)| name == dim)
            .map(|(_, factor)| *factor)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(name, _)| name.as_str())
    }
}

impl FromStr for DimFactors {
    type Err = CompileError;

    fn from_str(text: &str) -> Result<Self> {
        let mut factors: Vec<(String, usize)> = Vec::new();

        for item in text.split(',').map(str::trim).filter(|item| !item.is_empty()) {
            let Some((name, value)) = item.split_once('=') else {
                return Err(CompileError::invalid_setting(
                    text,
                    format!("`{item}` is not of the form `dim=factor`"),
                ));
            };

            let name = name.trim();
            let value: usize = value.trim().parse().map_err(|_| {
                CompileError::invalid_setting(text, format!("`{value}` is not a positive integer"))
            })?;

            if value == 0 {
                return Err(CompileError::invalid_setting(
                    text,
                    format!("factor for `{name}` must be at least 1"),
                ));
            }

            if factors.iter().any(|(n, _)| n == name) {
                return Err(CompileError::invalid_setting(
                    text,
                    format!("`{name}` is given twice"),
                ));
            }

            factors.push((name.to_owned(), value));
        }

        Ok(Self(factors))
    }
}

impl core::fmt::Display for DimFactors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = itertools::join(self.0.iter().map(|(n, v)| format!("{n}={v}")), ",");
        f.write_str(&text)
    }
}

/// Everything that parameterizes one compilation
#[derive(Debug, Clone)]
pub struct CompilerSettings {
    pub stencil: String,
    /// 4 for single precision, 8 for double
    pub elem_bytes: usize,
    pub target: Target,
    /// Overrides the width implied by the target and element size
    pub vector_width: Option<usize>,
    pub fold: DimFactors,
    pub cluster: DimFactors,
    /// Tile extents (in elements) the runtime will use, checked against
    /// fold and cluster
    pub tile: DimFactors,
    /// Overrides the radius declared by the stencil
    pub radius: Option<u32>,
    pub halo: Option<u32>,
    pub step_alloc: Option<u32>,
    pub bundle_count: Option<usize>,
    pub allow_unaligned_loads: bool,
    pub define_all_points: bool,
    pub output: Option<PathBuf>,
}

impl Default for CompilerSettings {
    fn default() -> Self {
        Self {
            stencil: String::from("iso3dfd"),
            elem_bytes: 4,
            target: Target::Avx512,
            vector_width: None,
            fold: DimFactors::default(),
            cluster: DimFactors::default(),
            tile: DimFactors::default(),
            radius: None,
            halo: None,
            step_alloc: None,
            bundle_count: None,
            allow_unaligned_loads: false,
            define_all_points: true,
            output: None,
        }
    }
}

/// Lane masks are 64-bit, one bit per lane
pub const MAX_VECTOR_WIDTH: usize = u64::BITS as usize;

impl CompilerSettings {
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.elem_bytes, 4 | 8) {
            return Err(CompileError::invalid_setting(
                "elem_bytes",
                format!("{} is neither 4 nor 8", self.elem_bytes),
            ));
        }

        match self.vector_width {
            Some(0) => {
                return Err(CompileError::invalid_setting(
                    "vector_width",
                    "must be at least 1",
                ));
            }
            Some(width) if width > MAX_VECTOR_WIDTH => {
                return Err(CompileError::invalid_setting(
                    "vector_width",
                    format!("{width} exceeds the {MAX_VECTOR_WIDTH} lanes a shuffle mask can select"),
                ));
            }
            _ => {}
        }

        if self.bundle_count == Some(0) {
            return Err(CompileError::invalid_setting(
                "bundle_count",
                "must be at least 1",
            ));
        }

        if self.step_alloc == Some(0) {
            return Err(CompileError::invalid_setting(
                "step_alloc",
                "must be at least 1",
            ));
        }

        Ok(())
    }

    /// Number of elements in one SIMD vector
    pub fn vector_width(&self) -> usize {
        self.vector_width
            .unwrap_or(self.target.vector_bytes() / self.elem_bytes)
    }

    pub fn real_type(&self) -> &'static str {
        if self.elem_bytes == 8 { "double" } else { "float" }
    }
}
