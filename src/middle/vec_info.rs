//! Vectorization info for one cluster body: how every grid point read is
//! turned into a vector, which aligned vectors must be loaded, and the
//! reuse window of each base pointer along the inner dimension.

use std::collections::BTreeMap;

use hashbrown::HashMap;
use log::debug;

use super::{
    cluster::ClusterEquation,
    dims::Dimensions,
    shuffle::{self, LaneSource, ShuffleCapability, ShuffleOp},
};
use crate::frontend::{
    ast::visit::Visitor,
    grid::{GridPoint, PointKey},
};

/// How a vector read is produced
#[derive(Debug, Clone, PartialEq)]
pub enum ReadClass {
    /// One aligned vector load
    Aligned,
    /// Loaded at an unaligned address in one instruction
    UnalignedLoad,
    /// Assembled from aligned vectors (and single elements if needed)
    Unaligned(Vec<ShuffleOp>),
    /// The grid lacks some folded dimension: every lane is read on its own
    Gathered(Vec<GridPoint>),
    /// The grid has no folded dimension: one element broadcast to all lanes
    Broadcast,
}

/// One pointer reuse window: the range of inner dimension offsets read
/// through the same base pointer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerWindow {
    pub lo: i64,
    pub hi: i64,
}

#[derive(Debug)]
pub struct VecInfo<'d> {
    dims: &'d Dimensions,
    capability: ShuffleCapability,
    allow_unaligned_loads: bool,
    /// Distinct reads in first-use order with how each is built
    pub reads: Vec<(GridPoint, ReadClass)>,
    read_index: HashMap<PointKey, usize>,
    /// Aligned vectors to load: plain aligned reads plus those feeding
    /// unaligned ones, in first-use order
    pub aligned: Vec<GridPoint>,
    aligned_index: HashMap<PointKey, usize>,
    /// Base pointers keyed by an aligned point with its inner offset zeroed
    pub pointers: BTreeMap<PointKey, (GridPoint, PointerWindow)>,
}

impl<'d> VecInfo<'d> {
    pub fn new(dims: &'d Dimensions, capability: ShuffleCapability, allow_unaligned_loads: bool) -> Self {
        Self {
            dims,
            capability,
            allow_unaligned_loads,
            reads: Vec::new(),
            read_index: HashMap::new(),
            aligned: Vec::new(),
            aligned_index: HashMap::new(),
            pointers: BTreeMap::new(),
        }
    }

    /// Analyzes every read of a cluster body
    pub fn analyze(
        body: &[ClusterEquation],
        dims: &'d Dimensions,
        capability: ShuffleCapability,
        allow_unaligned_loads: bool,
    ) -> Self {
        let mut info = Self::new(dims, capability, allow_unaligned_loads);

        for equation in body {
            info.visit_expression(&equation.rhs);
        }

        debug!(
            "{} distinct reads, {} aligned vectors, {} base pointers",
            info.reads.len(),
            info.aligned.len(),
            info.pointers.len()
        );

        info
    }

    pub fn class_of(&self, point: &GridPoint) -> Option<&ReadClass> {
        self.read_index
            .get(&point.key())
            .map(|index| &self.reads[*index].1)
    }

    /// True when every folded offset is a multiple of its fold
    pub fn is_aligned(&self, point: &GridPoint) -> bool {
        self.dims.folded_dims().all(|dim| {
            point
                .offset_of(dim)
                .is_none_or(|offset| offset.rem_euclid(self.dims.fold_of(dim) as i64) == 0)
        })
    }

    /// Where each lane of the vector at `point` comes from
    pub fn lane_sources(&self, point: &GridPoint) -> Vec<LaneSource> {
        self.dims
            .lane_offsets()
            .into_iter()
            .map(|lane_offsets| {
                let shift: Vec<_> = self
                    .dims
                    .domain
                    .iter()
                    .copied()
                    .zip(lane_offsets)
                    .collect();
                let element = point.translated(&shift);

                let mut block_shift = Vec::new();
                let mut lane_coordinates = Vec::new();

                for dim in &self.dims.domain {
                    let fold = self.dims.fold_of(*dim) as i64;
                    let offset = element.offset_of(*dim).unwrap_or(0);
                    let coordinate = offset.rem_euclid(fold);

                    block_shift.push((*dim, -coordinate));
                    lane_coordinates.push(coordinate);
                }

                LaneSource {
                    block: element.translated(&block_shift).key(),
                    lane: self.dims.lane_of(&lane_coordinates),
                    element,
                }
            })
            .collect()
    }

    fn add_aligned(&mut self, point: GridPoint) {
        let key = point.key();

        if self.aligned_index.contains_key(&key) {
            return;
        }

        if let Some(inner) = self.dims.inner_dim().filter(|d| point.grid().has_dim(*d)) {
            let offset = point.offset_of(inner).unwrap_or(0);
            let base = point.translated(&[(inner, -offset)]);

            self.pointers
                .entry(base.key())
                .and_modify(|(_, window)| {
                    window.lo = window.lo.min(offset);
                    window.hi = window.hi.max(offset);
                })
                .or_insert((base, PointerWindow { lo: offset, hi: offset }));
        }

        self.aligned_index.insert(key, self.aligned.len());
        self.aligned.push(point);
    }

    fn classify(&mut self, point: &GridPoint) -> ReadClass {
        let grid = point.grid();

        if self.dims.vector_width > 1 && self.dims.is_lane_invariant(grid) {
            return ReadClass::Broadcast;
        }

        if !self.dims.is_vectorizable(grid) {
            let elements = self
                .lane_sources(point)
                .into_iter()
                .map(|source| source.element)
                .collect();
            return ReadClass::Gathered(elements);
        }

        if self.is_aligned(point) {
            self.add_aligned(point.clone());
            return ReadClass::Aligned;
        }

        if self.allow_unaligned_loads {
            return ReadClass::UnalignedLoad;
        }

        let sources = self.lane_sources(point);
        let ops = shuffle::plan(&sources, self.capability);

        for op in &ops {
            for block in op.blocks() {
                let aligned = GridPoint::with_offsets(point.grid().clone(), block.offsets.clone());
                self.add_aligned(aligned);
            }
        }

        ReadClass::Unaligned(ops)
    }

    /// Inner dimension offsets (in elements) to prefetch for one cluster:
    /// the whole window of each base pointer
    pub fn prefetch_offsets(&self) -> Vec<(GridPoint, Vec<i64>)> {
        let step = self.inner_step();

        self.pointers
            .values()
            .map(|(base, window)| {
                let offsets = (window.lo..=window.hi).step_by(step).collect();
                (base.clone(), offsets)
            })
            .collect()
    }

    /// Offsets the next cluster along the inner dimension needs that the
    /// current one does not
    pub fn prefetch_ahead_offsets(&self) -> Vec<(GridPoint, Vec<i64>)> {
        let step = self.inner_step();
        let advance = self
            .dims
            .inner_dim()
            .map_or(0, |inner| self.dims.cluster_points(inner) as i64);

        self.pointers
            .values()
            .map(|(base, window)| {
                let first = (window.lo + advance).max(window.hi + step as i64);
                let offsets = (first..=window.hi + advance).step_by(step).collect();
                (base.clone(), offsets)
            })
            .collect()
    }

    fn inner_step(&self) -> usize {
        self.dims.inner_dim().map_or(1, |inner| self.dims.fold_of(inner))
    }
}

impl<'e> Visitor<'e> for VecInfo<'_> {
    fn visit_grid_point(&mut self, point: &'e GridPoint) {
        let key = point.key();

        if self.read_index.contains_key(&key) {
            return;
        }

        let class = self.classify(point);
        self.read_index.insert(key, self.reads.len());
        self.reads.push((point.clone(), class));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backend::Target,
        frontend::{
            grid::{Grid, GridId},
            intern::InternedSymbol,
            stencil::Stencil,
        },
        index::Index,
        settings::CompilerSettings,
    };

    const MASKED: ShuffleCapability = ShuffleCapability {
        shuffles: true,
        masks: true,
    };

    fn dims(fold: &str, width: usize) -> (Dimensions, Grid) {
        let mut stencil = Stencil::new("vec");
        let t = stencil.step_dim("t");
        let x = stencil.domain_dim("x");
        let y = stencil.domain_dim("y");
        let settings = CompilerSettings {
            target: Target::Avx512,
            vector_width: Some(width),
            fold: fold.parse().unwrap(),
            ..CompilerSettings::default()
        };
        let dims = Dimensions::new(&stencil, &settings).unwrap();
        let grid = Grid::new(GridId::new(0), InternedSymbol::new("u"), vec![t, x, y]);
        (dims, grid)
    }

    fn at(grid: &Grid, offsets: [i64; 3]) -> GridPoint {
        GridPoint::with_offsets(grid.clone(), offsets.into())
    }

    /// The value of element `(x, y)` in this test's synthetic grid
    fn value(offsets: &[i64]) -> i64 {
        offsets[1] * 1000 + offsets[2]
    }

    fn check_plan(info: &VecInfo<'_>, point: &GridPoint, ops: &[ShuffleOp]) {
        let dims = info.dims;
        let load = |key: &PointKey| -> Vec<i64> {
            dims.lane_offsets()
                .iter()
                .map(|lane| value(&[key.offsets[0], key.offsets[1] + lane[0], key.offsets[2] + lane[1]]))
                .collect()
        };
        let read = |element: &GridPoint| value(element.resolved_offsets());

        let built = shuffle::emulate(ops, dims.vector_width, load, read);
        let wanted: Vec<i64> = info
            .lane_sources(point)
            .iter()
            .map(|source| value(source.element.resolved_offsets()))
            .collect();

        assert_eq!(built, wanted, "plan {ops:?} for {point}");
    }

    #[test]
    fn aligned_and_unaligned_reads_are_told_apart() {
        let (dims, grid) = dims("x=4,y=2", 8);
        let info = VecInfo::new(&dims, MASKED, false);

        assert!(info.is_aligned(&at(&grid, [0, 4, -2])));
        assert!(!info.is_aligned(&at(&grid, [0, 1, 0])));
        assert!(!info.is_aligned(&at(&grid, [0, 0, -1])));
    }

    #[test]
    fn every_unaligned_offset_is_assembled_correctly() {
        for (fold, width) in [("x=4,y=2", 8), ("x=1,y=8", 8), ("x=2,y=2", 4), ("x=4,y=4", 16)] {
            let (dims, grid) = dims(fold, width);

            for capability in [
                MASKED,
                ShuffleCapability { shuffles: true, masks: false },
                ShuffleCapability { shuffles: false, masks: false },
            ] {
                for x in -4..=4 {
                    for y in -4..=4 {
                        let mut info = VecInfo::new(&dims, capability, false);
                        let point = at(&grid, [1, x, y]);
                        info.visit_grid_point(&point);

                        match info.class_of(&point).unwrap().clone() {
                            ReadClass::Aligned => assert!(info.is_aligned(&point)),
                            ReadClass::Unaligned(ops) => check_plan(&info, &point, &ops),
                            other => panic!("unexpected class {other:?}"),
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn planning_the_same_read_twice_gives_the_same_plan() {
        let (dims, grid) = dims("x=4,y=2", 8);
        let capability = ShuffleCapability { shuffles: false, masks: false };
        let classify = |offsets: [i64; 3]| {
            let mut info = VecInfo::new(&dims, capability, false);
            let point = at(&grid, offsets);
            info.visit_grid_point(&point);
            info.class_of(&point).cloned()
        };

        let first = classify([0, 1, 1]);
        assert!(matches!(first, Some(ReadClass::Unaligned(_))));
        assert_eq!(first, classify([0, 1, 1]));
        assert_ne!(first, classify([0, 2, 1]));
    }

    #[test]
    fn single_dimension_shift_is_one_align() {
        let (dims, grid) = dims("x=1,y=8", 8);
        let mut info = VecInfo::new(&dims, MASKED, false);
        let point = at(&grid, [0, 0, 1]);
        info.visit_grid_point(&point);

        let Some(ReadClass::Unaligned(ops)) = info.class_of(&point) else {
            panic!("expected an unaligned read");
        };
        assert_eq!(ops.len(), 1);
        assert!(matches!(ops[0], ShuffleOp::Align { count: 1, mask: None, .. }));
        assert_eq!(info.aligned.len(), 2);
    }

    #[test]
    fn targets_without_shuffles_read_elements() {
        let (dims, grid) = dims("x=4,y=2", 8);
        let capability = ShuffleCapability { shuffles: false, masks: false };
        let mut info = VecInfo::new(&dims, capability, false);
        let point = at(&grid, [0, 1, 0]);
        info.visit_grid_point(&point);

        let Some(ReadClass::Unaligned(ops)) = info.class_of(&point) else {
            panic!("expected an unaligned read");
        };
        assert_eq!(ops.len(), 8);
        assert!(ops.iter().all(|op| matches!(op, ShuffleOp::Element { .. })));
    }

    #[test]
    fn pointer_windows_cover_inner_offsets() {
        let (dims, grid) = dims("x=1,y=4", 4);
        let mut info = VecInfo::new(&dims, MASKED, false);

        for y in [-4, 0, 8] {
            info.visit_grid_point(&at(&grid, [0, 0, y]));
        }
        info.visit_grid_point(&at(&grid, [0, 1, 0]));

        assert_eq!(info.pointers.len(), 2);
        let (_, window) = info.pointers.values().next().unwrap();
        assert_eq!(*window, PointerWindow { lo: -4, hi: 8 });

        let (_, offsets) = &info.prefetch_offsets()[0];
        assert_eq!(offsets, &vec![-4, 0, 4, 8]);

        let (_, ahead) = &info.prefetch_ahead_offsets()[0];
        assert_eq!(ahead, &vec![12]);
    }

    #[test]
    fn grids_missing_folded_dims_are_gathered_or_broadcast() {
        let (dims, _) = dims("x=4,y=2", 8);
        let t = dims.step;
        let x = dims.domain[0];
        let only_x = Grid::new(GridId::new(1), InternedSymbol::new("a"), vec![t, x]);
        let scalar = Grid::new(GridId::new(2), InternedSymbol::new("s"), vec![t]);

        let mut info = VecInfo::new(&dims, MASKED, false);
        let gathered = GridPoint::with_offsets(only_x, [0, 1].into());
        let broadcast = GridPoint::with_offsets(scalar, [0].into());
        info.visit_grid_point(&gathered);
        info.visit_grid_point(&broadcast);

        assert!(matches!(info.class_of(&gathered), Some(ReadClass::Gathered(e)) if e.len() == 8));
        assert_eq!(info.class_of(&broadcast), Some(&ReadClass::Broadcast));
    }
}
