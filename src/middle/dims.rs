//! The dimension descriptor: which dimensions the stencil has and how the
//! domain dimensions map onto SIMD lanes (fold) and unrolled vectors
//! (cluster).
//!
//! Lanes are laid out row-major over the folded dimensions in declaration
//! order, so the last domain dimension varies fastest. That dimension is
//! also the inner (unit stride) dimension of the generated loops.

use itertools::Itertools;
use log::info;

use crate::{
    error::{CompileError, Result},
    frontend::{dims::Dim, grid::Grid, stencil::Stencil},
    settings::{CompilerSettings, DimFactors},
};

#[derive(Debug, Clone)]
pub struct Dimensions {
    pub step: Dim,
    pub domain: Vec<Dim>,
    pub misc: Vec<Dim>,
    /// Lanes per domain dimension, parallel to `domain`
    pub fold: Vec<usize>,
    /// Vectors per domain dimension in one cluster, parallel to `domain`
    pub cluster: Vec<usize>,
    pub vector_width: usize,
}

impl Dimensions {
    pub fn new(stencil: &Stencil, settings: &CompilerSettings) -> Result<Self> {
        let step = stencil
            .step()
            .ok_or_else(|| CompileError::InvalidGrid("no step dimension".into()))?;
        let domain = stencil.domain_dims();
        let vector_width = settings.vector_width();

        check_names(&settings.fold, &domain, "fold")?;
        check_names(&settings.cluster, &domain, "cluster")?;
        check_names(&settings.tile, &domain, "tile")?;

        let fold = if settings.fold.is_empty() {
            default_fold(&domain, vector_width)
        } else {
            domain
                .iter()
                .map(|d| settings.fold.get(d.name().value()).unwrap_or(1))
                .collect()
        };

        let product: usize = fold.iter().product();
        if product != vector_width {
            return Err(CompileError::InvalidFold(format!(
                "fold {} has {product} lanes but the vector width is {vector_width}",
                describe(&domain, &fold)
            )));
        }

        let cluster = domain
            .iter()
            .map(|d| settings.cluster.get(d.name().value()).unwrap_or(1))
            .collect();

        let dims = Self {
            step,
            domain,
            misc: stencil.misc_dims(),
            fold,
            cluster,
            vector_width,
        };

        dims.check_tiles(&settings.tile)?;

        info!(
            "vector width {vector_width}, fold {}, cluster {}",
            describe(&dims.domain, &dims.fold),
            describe(&dims.domain, &dims.cluster)
        );

        Ok(dims)
    }

    fn check_tiles(&self, tiles: &DimFactors) -> Result<()> {
        for (position, dim) in self.domain.iter().enumerate() {
            let Some(tile) = tiles.get(dim.name().value()) else {
                continue;
            };

            let unit = self.fold[position] * self.cluster[position];
            if tile % unit != 0 {
                return Err(CompileError::InvalidTile(format!(
                    "tile size {tile} in `{}` is not a multiple of fold x cluster = {unit}",
                    dim.name()
                )));
            }
        }

        Ok(())
    }

    /// Every grid an equation writes must be vectorizable, since vector
    /// writes cannot be split into lanes
    pub fn check_written_grid(&self, grid: &Grid) -> Result<()> {
        match self.folded_dims().find(|dim| !grid.has_dim(*dim)) {
            Some(dim) => Err(CompileError::InvalidFold(format!(
                "grid `{}` is written but lacks folded dimension `{}`",
                grid.name(),
                dim.name()
            ))),
            None => Ok(()),
        }
    }

    pub fn position(&self, dim: Dim) -> Option<usize> {
        self.domain.iter().position(|d| *d == dim)
    }

    pub fn fold_of(&self, dim: Dim) -> usize {
        self.position(dim).map_or(1, |p| self.fold[p])
    }

    pub fn cluster_of(&self, dim: Dim) -> usize {
        self.position(dim).map_or(1, |p| self.cluster[p])
    }

    /// The unit stride dimension
    pub fn inner_dim(&self) -> Option<Dim> {
        self.domain.last().copied()
    }

    /// Domain dimensions with more than one lane
    pub fn folded_dims(&self) -> impl Iterator<Item = Dim> + '_ {
        self.domain
            .iter()
            .zip(&self.fold)
            .filter(|(_, fold)| **fold > 1)
            .map(|(dim, _)| *dim)
    }

    /// Whole vectors of this grid can be loaded
    pub fn is_vectorizable(&self, grid: &Grid) -> bool {
        self.folded_dims().all(|dim| grid.has_dim(dim))
    }

    /// The grid varies along no folded dimension, so one element serves
    /// every lane
    pub fn is_lane_invariant(&self, grid: &Grid) -> bool {
        self.folded_dims().all(|dim| !grid.has_dim(dim))
    }

    /// Element offsets of each lane from the first lane, in domain order
    pub fn lane_offsets(&self) -> Vec<Vec<i64>> {
        if self.fold.is_empty() {
            return vec![Vec::new()];
        }

        self.fold
            .iter()
            .map(|fold| 0..*fold as i64)
            .multi_cartesian_product()
            .collect()
    }

    /// The lane holding the element at `offsets` (each below its fold)
    pub fn lane_of(&self, offsets: &[i64]) -> usize {
        offsets
            .iter()
            .zip(&self.fold)
            .fold(0, |lane, (offset, fold)| lane * fold + *offset as usize)
    }

    /// Element offsets of each vector in a cluster, in row-major order
    pub fn cluster_offsets(&self) -> Vec<Vec<(Dim, i64)>> {
        let per_dim = self
            .domain
            .iter()
            .zip(self.fold.iter().zip(&self.cluster))
            .map(|(dim, (fold, cluster))| {
                (0..*cluster as i64)
                    .map(|c| (*dim, c * *fold as i64))
                    .collect_vec()
            })
            .collect_vec();

        if per_dim.is_empty() {
            return vec![Vec::new()];
        }

        per_dim.into_iter().multi_cartesian_product().collect()
    }

    /// Elements covered by one cluster in `dim`
    pub fn cluster_points(&self, dim: Dim) -> usize {
        self.fold_of(dim) * self.cluster_of(dim)
    }
}

fn check_names(factors: &DimFactors, domain: &[Dim], what: &str) -> Result<()> {
    match factors
        .names()
        .find(|name| !domain.iter().any(|d| d.name().value() == *name))
    {
        Some(name) => Err(CompileError::invalid_setting(
            what,
            format!("`{name}` is not a domain dimension"),
        )),
        None => Ok(()),
    }
}

/// Puts every lane on the inner dimension
fn default_fold(domain: &[Dim], vector_width: usize) -> Vec<usize> {
    let mut fold = vec![1; domain.len()];

    if let Some(last) = fold.last_mut() {
        *last = vector_width;
    }

    fold
}

fn describe(domain: &[Dim], factors: &[usize]) -> String {
    domain
        .iter()
        .zip(factors)
        .map(|(dim, factor)| format!("{}={factor}", dim.name()))
        .join(",")
}
