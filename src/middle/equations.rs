//! Read/write dependencies between equations.
//!
//! Equation A depends on equation B when A reads the values B writes: the
//! same grid at the same step offset and misc indices. Domain offsets are
//! ignored, since a read anywhere within the radius can observe a point B
//! wrote during the same sweep. Two equations writing the same values are
//! additionally ordered by declaration.

use std::collections::{BTreeMap, BTreeSet};

use itertools::Itertools;
use log::debug;

use super::counter::PointCounter;
use crate::{
    error::{CompileError, Result},
    frontend::{
        ast::visit::Visitor,
        grid::{GridId, GridPoint},
        stencil::{Equation, EquationId},
    },
    index::{Index, IndexVec},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DependencyKind {
    /// Both equations write the same values; the later declared one wins
    WriteAfterWrite,
    /// The dependent equation reads values the other one writes
    ReadAfterWrite,
}

/// The part of a grid point that identifies which values it touches during
/// one sweep over the domain
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WriteShape {
    pub grid: GridId,
    pub step_offset: Option<i64>,
    pub misc_offsets: Vec<i64>,
}

impl WriteShape {
    pub fn of(point: &GridPoint) -> Self {
        Self {
            grid: point.grid().id(),
            step_offset: point.step_offset(),
            misc_offsets: point.misc_offsets(),
        }
    }
}

#[derive(Debug)]
pub struct DependencyGraph {
    /// For each equation, the equations it must follow
    dependencies: IndexVec<EquationId, BTreeMap<EquationId, DependencyKind>>,
    /// Distinct grid points each equation reads
    reads: IndexVec<EquationId, Vec<GridPoint>>,
}

impl DependencyGraph {
    pub fn build(equations: &IndexVec<EquationId, Equation>) -> Result<Self> {
        let reads: IndexVec<EquationId, Vec<GridPoint>> = IndexVec::from_raw(
            equations
                .iter()
                .map(|equation| {
                    let mut counter = PointCounter::new();
                    counter.visit_expression(equation.rhs());
                    counter.reads
                })
                .collect(),
        );

        let mut writers: BTreeMap<WriteShape, Vec<EquationId>> = BTreeMap::new();
        for equation in equations {
            writers
                .entry(WriteShape::of(equation.lhs()))
                .or_default()
                .push(equation.id);
        }

        let mut dependencies = IndexVec::from_raw(vec![BTreeMap::new(); equations.len()]);

        for equation in equations {
            let deps: &mut BTreeMap<EquationId, DependencyKind> =
                &mut dependencies.raw[equation.id.index()];

            for read in &reads[equation.id] {
                let Some(sources) = writers.get(&WriteShape::of(read)) else {
                    continue;
                };

                for source in sources {
                    if *source == equation.id {
                        return Err(CompileError::BundlingConflict(format!(
                            "{} reads `{}`, which it writes itself during the same sweep",
                            equation.label(),
                            strip_ansi_escapes::strip_str(read.to_string())
                        )));
                    }

                    deps.insert(*source, DependencyKind::ReadAfterWrite);
                }
            }

            let earlier_writers = writers[&WriteShape::of(equation.lhs())]
                .iter()
                .filter(|id| **id < equation.id);

            for writer in earlier_writers {
                deps.entry(*writer).or_insert(DependencyKind::WriteAfterWrite);
            }
        }

        let graph = Self {
            dependencies,
            reads,
        };

        if let Some(cycle) = graph.find_cycle() {
            let path = cycle
                .iter()
                .map(|id| equations[*id].label())
                .join(" -> ");

            return Err(CompileError::BundlingConflict(format!(
                "equations depend on each other in a cycle: {path}"
            )));
        }

        debug!(
            "dependency graph: {} equations, {} edges",
            equations.len(),
            graph.dependencies.iter().map(BTreeMap::len).sum::<usize>()
        );

        Ok(graph)
    }

    pub fn len(&self) -> usize {
        self.dependencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }

    pub fn dependencies(&self, id: EquationId) -> impl Iterator<Item = (EquationId, DependencyKind)> + '_ {
        self.dependencies[id].iter().map(|(id, kind)| (*id, *kind))
    }

    pub fn depends_on(&self, dependent: EquationId, source: EquationId) -> Option<DependencyKind> {
        self.dependencies[dependent].get(&source).copied()
    }

    pub fn reads(&self, id: EquationId) -> &[GridPoint] {
        &self.reads[id]
    }

    /// A topological order which, among the equations ready at each step,
    /// always takes the one declared first
    pub fn topological_order(&self) -> Vec<EquationId> {
        let mut remaining: IndexVec<EquationId, usize> =
            IndexVec::from_raw(self.dependencies.iter().map(BTreeMap::len).collect());
        let mut dependents: IndexVec<EquationId, Vec<EquationId>> =
            IndexVec::from_raw(vec![Vec::new(); self.len()]);

        for (id, deps) in self.dependencies.enumerate() {
            for source in deps.keys() {
                dependents.raw[source.index()].push(id);
            }
        }

        let mut ready: BTreeSet<EquationId> = remaining
            .enumerate()
            .filter(|(_, count)| **count == 0)
            .map(|(id, _)| id)
            .collect();
        let mut order = Vec::with_capacity(self.len());

        while let Some(id) = ready.pop_first() {
            order.push(id);

            for dependent in &dependents[id] {
                let count = &mut remaining.raw[dependent.index()];
                *count -= 1;

                if *count == 0 {
                    ready.insert(*dependent);
                }
            }
        }

        order
    }

    fn find_cycle(&self) -> Option<Vec<EquationId>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            New,
            OnPath,
            Done,
        }

        fn visit(
            graph: &DependencyGraph,
            id: EquationId,
            marks: &mut Vec<Mark>,
            path: &mut Vec<EquationId>,
        ) -> Option<Vec<EquationId>> {
            marks[id.index()] = Mark::OnPath;
            path.push(id);

            for source in graph.dependencies[id].keys() {
                match marks[source.index()] {
                    Mark::OnPath => {
                        let start = path.iter().position(|p| p == source)?;
                        let mut cycle = path[start..].to_vec();
                        cycle.push(*source);
                        return Some(cycle);
                    }
                    Mark::New => {
                        if let Some(cycle) = visit(graph, *source, marks, path) {
                            return Some(cycle);
                        }
                    }
                    Mark::Done => {}
                }
            }

            path.pop();
            marks[id.index()] = Mark::Done;
            None
        }

        let mut marks = vec![Mark::New; self.len()];
        let mut path = Vec::new();

        self.dependencies.indices().find_map(|id| {
            (marks[id.index()] == Mark::New)
                .then(|| visit(self, id, &mut marks, &mut path))
                .flatten()
        })
    }

    /// Largest distance, over every domain dimension, between a read and
    /// the point its equation writes
    pub fn max_read_distance(&self, equations: &IndexVec<EquationId, Equation>) -> i64 {
        equations
            .iter()
            .flat_map(|equation| {
                self.reads[equation.id].iter().flat_map(|read| {
                    read.grid()
                        .dims()
                        .iter()
                        .zip(read.resolved_offsets())
                        .filter(|(dim, _)| dim.is_domain())
                        .map(|(_, offset)| offset.abs())
                })
            })
            .max()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{frontend::stencil::Stencil, point};

    #[test]
    fn later_reader_depends_on_writer() {
        let mut stencil = Stencil::new("pair");
        let t = stencil.step_dim("t");
        let x = stencil.domain_dim("x");
        let u = stencil.grid("u", &[t, x]);
        let v = stencil.grid("v", &[t, x]);

        // Declared reader first to check the order comes from the data
        stencil.define(point!(v, t + 1, x), point!(u, t + 1, x - 1) + point!(v, t, x));
        stencil.define(point!(u, t + 1, x), point!(u, t, x + 1));
        stencil.validate().unwrap();

        let graph = DependencyGraph::build(stencil.equations()).unwrap();
        let (reader, writer) = (EquationId::new(0), EquationId::new(1));

        assert_eq!(graph.depends_on(reader, writer), Some(DependencyKind::ReadAfterWrite));
        assert_eq!(graph.depends_on(writer, reader), None);
        assert_eq!(graph.topological_order(), vec![writer, reader]);
        assert_eq!(graph.max_read_distance(stencil.equations()), 1);
    }

    #[test]
    fn reading_own_output_is_a_conflict() {
        let mut stencil = Stencil::new("recurrence");
        let t = stencil.step_dim("t");
        let x = stencil.domain_dim("x");
        let u = stencil.grid("u", &[t, x]);

        stencil.define(point!(u, t + 1, x), point!(u, t + 1, x - 1));
        stencil.validate().unwrap();

        assert!(matches!(
            DependencyGraph::build(stencil.equations()),
            Err(CompileError::BundlingConflict(_))
        ));
    }

    #[test]
    fn cycle_is_reported_with_its_members() {
        let mut stencil = Stencil::new("cycle");
        let t = stencil.step_dim("t");
        let x = stencil.domain_dim("x");
        let u = stencil.grid("u", &[t, x]);
        let v = stencil.grid("v", &[t, x]);

        stencil.define(point!(u, t + 1, x), point!(v, t + 1, x));
        stencil.define(point!(v, t + 1, x), point!(u, t + 1, x));
        stencil.validate().unwrap();

        match DependencyGraph::build(stencil.equations()) {
            Err(CompileError::BundlingConflict(message)) => {
                assert!(message.contains("eq0"));
                assert!(message.contains("eq1"));
            }
            other => panic!("expected a bundling conflict, got {other:?}"),
        }
    }

    #[test]
    fn same_target_writers_are_ordered_by_declaration() {
        let mut stencil = Stencil::new("overwrite");
        let t = stencil.step_dim("t");
        let x = stencil.domain_dim("x");
        let u = stencil.grid("u", &[t, x]);

        stencil.define(point!(u, t + 1, x), point!(u, t, x));
        stencil.define_if(point!(u, t + 1, x), 0.0, x.less_than(2));
        stencil.validate().unwrap();

        let graph = DependencyGraph::build(stencil.equations()).unwrap();

        assert_eq!(
            graph.depends_on(EquationId::new(1), EquationId::new(0)),
            Some(DependencyKind::WriteAfterWrite)
        );
        assert_eq!(graph.topological_order(), vec![EquationId::new(0), EquationId::new(1)]);
    }
}
