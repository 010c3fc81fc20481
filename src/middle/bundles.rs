//! Partitions equations into bundles, each evaluated by one fused sweep
//! over the domain.
//!
//! Equations are placed greedily in dependency order: each goes into the
//! earliest existing bundle that comes after every bundle holding values
//! it reads and that shares its condition, or opens a new bundle. Bundles
//! are therefore emitted in a valid topological order, and no bundle holds
//! an equation reading another member's output.

use itertools::Itertools;
use log::{debug, info, warn};

use super::equations::{DependencyGraph, DependencyKind};
use crate::{
    error::{CompileError, Result},
    frontend::{
        ast::{node_id, ExprRef},
        stencil::{Equation, EquationId},
    },
    index::{simple_index, Index, IndexVec},
};

simple_index! {
    pub struct BundleId;
}

#[derive(Debug, Clone)]
pub struct Bundle {
    pub id: BundleId,
    /// Members in declaration order
    pub equations: Vec<EquationId>,
    /// The sub-domain condition all members share
    pub condition: Option<ExprRef>,
}

impl Bundle {
    pub fn name(&self) -> String {
        format!("bundle_{}", self.id)
    }
}

fn same_condition(a: Option<&ExprRef>, b: Option<&ExprRef>) -> bool {
    // Conditions are shared nodes after CSE, so identity is equality
    a.map(node_id) == b.map(node_id)
}

/// Builds the bundles. With `requested` set, exactly that many bundles are
/// produced or the call fails.
pub fn partition(
    equations: &IndexVec<EquationId, Equation>,
    graph: &DependencyGraph,
    requested: Option<usize>,
) -> Result<IndexVec<BundleId, Bundle>> {
    let mut bundles: Vec<Vec<EquationId>> = Vec::new();
    let mut placement: IndexVec<EquationId, usize> =
        IndexVec::from_raw(vec![usize::MAX; equations.len()]);

    for id in graph.topological_order() {
        let earliest = graph
            .dependencies(id)
            .map(|(source, kind)| match kind {
                DependencyKind::ReadAfterWrite => placement[source] + 1,
                DependencyKind::WriteAfterWrite => placement[source],
            })
            .max()
            .unwrap_or(0);

        let condition = equations[id].condition();
        let target = (earliest..bundles.len()).find(|b| {
            same_condition(equations[bundles[*b][0]].condition(), condition)
        });

        let target = match target {
            Some(target) => target,
            None => {
                bundles.push(Vec::new());
                bundles.len() - 1
            }
        };

        bundles[target].push(id);
        placement.raw[id.index()] = target;
    }

    for members in &mut bundles {
        members.sort();
    }

    if let Some(requested) = requested {
        if bundles.len() > requested {
            return Err(conflict(equations, graph, &bundles, requested));
        }

        split_to(&mut bundles, requested);
    }

    let bundles: IndexVec<BundleId, Bundle> = IndexVec::from_raw(
        bundles
            .into_iter()
            .enumerate()
            .map(|(index, members)| Bundle {
                id: BundleId::new(index),
                condition: equations[members[0]].condition().cloned(),
                equations: members,
            })
            .collect(),
    );

    info!(
        "{} equations placed in {} bundles",
        equations.len(),
        bundles.len()
    );
    for bundle in &bundles {
        debug!(
            "{}: {}",
            bundle.name(),
            bundle.equations.iter().map(|id| equations[*id].label()).join(", ")
        );
    }

    Ok(bundles)
}

/// Explains why two neighbouring bundles could not be fused
fn conflict(
    equations: &IndexVec<EquationId, Equation>,
    graph: &DependencyGraph,
    bundles: &[Vec<EquationId>],
    requested: usize,
) -> CompileError {
    let reason = bundles
        .iter()
        .tuple_windows()
        .find_map(|(first, second)| {
            second.iter().find_map(|reader| {
                first.iter().find_map(|writer| {
                    (graph.depends_on(*reader, *writer) == Some(DependencyKind::ReadAfterWrite))
                        .then(|| {
                            format!(
                                "{} reads values written by {}, so they cannot share a bundle",
                                equations[*reader].label(),
                                equations[*writer].label()
                            )
                        })
                })
            })
        })
        .or_else(|| {
            bundles.iter().tuple_windows().next().map(|(first, second)| {
                format!(
                    "{} and {} are restricted to different conditions",
                    equations[first[0]].label(),
                    equations[second[0]].label()
                )
            })
        })
        .unwrap_or_default();

    CompileError::BundlingConflict(format!(
        "{requested} bundle(s) requested but {} are needed: {reason}",
        bundles.len()
    ))
}

/// Splits the largest bundles, keeping declaration order, until there are
/// `requested` of them
fn split_to(bundles: &mut Vec<Vec<EquationId>>, requested: usize) {
    while bundles.len() < requested {
        let largest = bundles
            .iter()
            .enumerate()
            .max_by_key(|(index, members)| (members.len(), std::cmp::Reverse(*index)))
            .map(|(index, _)| index);

        let Some(largest) = largest.filter(|index| bundles[*index].len() > 1) else {
            warn!(
                "{requested} bundles requested but only {} equations can be separated",
                bundles.len()
            );
            return;
        };

        let members = &mut bundles[largest];
        let tail = members.split_off(members.len().div_ceil(2));
        bundles.insert(largest + 1, tail);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        frontend::stencil::Stencil,
        middle::cse,
        point,
    };

    fn bundled(stencil: &Stencil, requested: Option<usize>) -> Result<Vec<Vec<usize>>> {
        stencil.validate()?;
        let mut equations = stencil.equations().clone();
        cse::eliminate(&mut equations);

        let graph = DependencyGraph::build(&equations)?;
        let bundles = partition(&equations, &graph, requested)?;

        Ok(bundles
            .iter()
            .map(|b| b.equations.iter().map(|id| id.index()).collect())
            .collect())
    }

    fn wave() -> (Stencil, [crate::frontend::Grid; 2], crate::frontend::Dim, crate::frontend::Dim) {
        let mut stencil = Stencil::new("wave");
        let t = stencil.step_dim("t");
        let x = stencil.domain_dim("x");
        let p = stencil.grid("p", &[t, x]);
        let v = stencil.grid("v", &[t, x]);
        (stencil, [p, v], t, x)
    }

    #[test]
    fn independent_equations_share_a_bundle() {
        let (mut stencil, [p, v], t, x) = wave();

        stencil.define(point!(p, t + 1, x), point!(p, t, x) + point!(v, t, x));
        stencil.define(point!(v, t + 1, x), point!(v, t, x) - point!(p, t, x));

        assert_eq!(bundled(&stencil, None).unwrap(), vec![vec![0, 1]]);
    }

    #[test]
    fn reader_of_new_values_goes_to_a_later_bundle() {
        let (mut stencil, [p, v], t, x) = wave();

        stencil.define(point!(p, t + 1, x), point!(v, t + 1, x - 1) + point!(v, t + 1, x));
        stencil.define(point!(v, t + 1, x), point!(v, t, x) - point!(p, t, x + 1));

        assert_eq!(bundled(&stencil, None).unwrap(), vec![vec![1], vec![0]]);
    }

    #[test]
    fn requesting_fewer_bundles_than_needed_is_a_conflict() {
        let (mut stencil, [p, v], t, x) = wave();

        stencil.define(point!(v, t + 1, x), point!(p, t + 1, x));
        stencil.define(point!(p, t + 1, x), point!(p, t, x));

        match bundled(&stencil, Some(1)) {
            Err(CompileError::BundlingConflict(message)) => {
                assert!(message.contains("eq0"), "{message}");
                assert!(message.contains("reads values written by eq1"), "{message}");
            }
            other => panic!("expected a bundling conflict, got {other:?}"),
        }
    }

    #[test]
    fn requesting_more_bundles_splits_in_declaration_order() {
        let (mut stencil, [p, v], t, x) = wave();

        stencil.define(point!(p, t + 1, x), point!(p, t, x));
        stencil.define(point!(v, t + 1, x), point!(v, t, x));

        assert_eq!(
            bundled(&stencil, Some(2)).unwrap(),
            vec![vec![0], vec![1]]
        );
    }

    #[test]
    fn different_conditions_are_not_fused() {
        let (mut stencil, [p, _], t, x) = wave();

        stencil.define_if(point!(p, t + 1, x), point!(p, t, x), x.less_than(4));
        stencil.define_if(point!(p, t + 1, x), 0.0, x.equal_to(4));

        assert_eq!(bundled(&stencil, None).unwrap(), vec![vec![0], vec![1]]);
    }

    #[test]
    fn same_condition_writers_share_a_bundle_in_declaration_order() {
        let (mut stencil, [p, _], t, x) = wave();

        stencil.define_if(point!(p, t + 1, x), point!(p, t, x), x.less_than(4));
        stencil.define_if(point!(p, t + 1, x), 1.0, x.less_than(4));

        assert_eq!(bundled(&stencil, None).unwrap(), vec![vec![0, 1]]);
    }
}
