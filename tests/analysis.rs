use std::collections::HashSet;

use stencilc::{
    backend::Target,
    frontend::{
        ast::{CommutativeOperator, Expr, ExprRef},
        grid::{GridPoint, PointKey},
        Stencil,
    },
    index::Index,
    middle::{
        bundles,
        cluster::cluster_body,
        coverage, cse,
        counter::OpCounter,
        dims::Dimensions,
        equations::DependencyGraph,
        shuffle::{self, ShuffleCapability},
        vec_info::{ReadClass, VecInfo},
    },
    point,
    settings::CompilerSettings,
    stencils,
};

/// The op count law, computed directly on the tree
fn reference_ops(expression: &ExprRef) -> usize {
    match &**expression {
        Expr::Unary { operand, .. } => 1 + reference_ops(operand),
        Expr::Binary { lhs, rhs, .. } => 1 + reference_ops(lhs) + reference_ops(rhs),
        Expr::Commutative { operands, .. } => {
            operands.len() - 1 + operands.iter().map(reference_ops).sum::<usize>()
        }
        Expr::Equals(equals) => reference_ops(&equals.rhs),
        _ => 0,
    }
}

#[test]
fn op_counter_follows_the_law() {
    let product = |a: f64, b: f64| {
        Expr::commutative(
            CommutativeOperator::Multiply,
            vec![Expr::constant(a), Expr::constant(b)],
        )
    };
    let sum = Expr::commutative(
        CommutativeOperator::Add,
        vec![product(1.0, 2.0), product(3.0, 4.0), Expr::constant(5.0), Expr::constant(6.0)],
    );
    assert_eq!(OpCounter::count(&sum), 5);

    let flat = Expr::commutative(
        CommutativeOperator::Add,
        (0..4).map(|i| Expr::constant(f64::from(i))).collect(),
    );
    assert_eq!(OpCounter::count(&flat), 3);

    let awp = stencils::awp::awp(None);
    for equation in awp.equations() {
        assert_eq!(OpCounter::count(equation.rhs()), reference_ops(equation.rhs()));
    }
}

#[test]
fn every_equation_lands_in_one_bundle_in_dependency_order() {
    let stencil = stencils::awp::awp(None);
    stencil.validate().unwrap();

    let mut equations = stencil.equations().clone();
    coverage::add_defaults(&mut equations);
    cse::eliminate(&mut equations);
    let graph = DependencyGraph::build(&equations).unwrap();
    let bundles = bundles::partition(&equations, &graph, None).unwrap();

    let mut position = vec![usize::MAX; equations.len()];
    for (index, bundle) in bundles.iter().enumerate() {
        for id in &bundle.equations {
            assert_eq!(position[id.index()], usize::MAX, "eq{id} is bundled twice");
            position[id.index()] = index;
        }
    }
    assert!(position.iter().all(|p| *p != usize::MAX));

    for id in equations.indices() {
        for (source, _) in graph.dependencies(id) {
            assert!(
                position[source.index()] <= position[id.index()],
                "eq{id} is bundled before eq{source}"
            );
        }
    }
}

#[test]
fn overlapping_conditions_keep_declaration_order() {
    let mut stencil = Stencil::new("overlap");
    let t = stencil.step_dim("t");
    let x = stencil.domain_dim("x");
    let u = stencil.grid("u", &[t, x]);

    // Both hold for x > 5; the later declaration must win there
    stencil.define_if(point!(u, t + 1, x), 1.0, x.greater_than(0));
    stencil.define_if(point!(u, t + 1, x), 2.0, x.greater_than(5));
    stencil.validate().unwrap();

    let mut equations = stencil.equations().clone();
    cse::eliminate(&mut equations);
    let graph = DependencyGraph::build(&equations).unwrap();
    let bundles = bundles::partition(&equations, &graph, None).unwrap();

    let order: Vec<usize> = bundles
        .iter()
        .flat_map(|bundle| bundle.equations.iter().map(|id| id.index()))
        .collect();
    assert_eq!(order, [0, 1]);

    let settings = CompilerSettings {
        target: Target::Cpp,
        vector_width: Some(1),
        define_all_points: false,
        ..CompilerSettings::default()
    };
    let output = stencilc::compile_stencil(stencil, &settings).unwrap();
    assert!(output.contains("#define STENCIL_BUNDLES overlap_bundle_0, overlap_bundle_1\n"));
}

/// A distinct value per element, derived from its offsets
fn value_at(offsets: &[i64]) -> i64 {
    offsets.iter().fold(0, |value, offset| value * 1000 + offset + 500)
}

#[test]
fn planned_shuffles_produce_the_wanted_lanes() {
    let mut stencil = Stencil::new("plane");
    let t = stencil.step_dim("t");
    let x = stencil.domain_dim("x");
    let y = stencil.domain_dim("y");
    let g = stencil.grid("g", &[t, x, y]);
    stencil.define(point!(g, t + 1, x, y), point!(g, t, x, y));
    stencil.validate().unwrap();

    for (target, fold) in [
        (Target::Avx512, "x=4,y=4"),
        (Target::Avx, "x=2,y=4"),
        (Target::Cpp, "y=16"),
    ] {
        let settings = CompilerSettings {
            target,
            fold: fold.parse().unwrap(),
            ..CompilerSettings::default()
        };
        let dims = Dimensions::new(&stencil, &settings).unwrap();
        let capability: ShuffleCapability = target.shuffle_capability();
        let info = VecInfo::new(&dims, capability, false);

        let load = |block: &PointKey| -> Vec<i64> {
            let base = GridPoint::with_offsets(g.clone(), block.offsets.clone());
            dims.lane_offsets()
                .into_iter()
                .map(|lane| {
                    let shift: Vec<_> = dims.domain.iter().copied().zip(lane).collect();
                    value_at(base.translated(&shift).resolved_offsets())
                })
                .collect()
        };
        let read = |element: &GridPoint| value_at(element.resolved_offsets());

        for dx in -3..=3 {
            for dy in -5..=5 {
                let wanted = GridPoint::with_offsets(g.clone(), vec![0, dx, dy].into());
                let expected = load(&wanted.key());

                let sources = info.lane_sources(&wanted);
                let ops = shuffle::plan(&sources, capability);
                let built = shuffle::emulate(&ops, dims.vector_width, &load, &read);

                assert_eq!(built, expected, "{target} {fold} at ({dx}, {dy})");
            }
        }
    }
}

#[test]
fn clustered_vector_reads_match_scalar_reads() {
    let stencil = stencils::iso3dfd::iso3dfd(Some(2));
    stencil.validate().unwrap();

    let mut equations = stencil.equations().clone();
    cse::eliminate(&mut equations);
    let graph = DependencyGraph::build(&equations).unwrap();
    let bundles = bundles::partition(&equations, &graph, None).unwrap();

    // Grids get disjoint value ranges so a read of the wrong grid shows
    let value_of = |point: &GridPoint| {
        point.grid().id().index() as i64 * 10_000_000_000_000 + value_at(point.resolved_offsets())
    };

    for (target, fold, cluster) in [
        (Target::Avx512, "y=4,z=4", "z=2"),
        (Target::Avx, "x=2,z=4", "y=2"),
        (Target::Cpp, "x=2,y=2,z=4", "x=2"),
    ] {
        let settings = CompilerSettings {
            target,
            fold: fold.parse().unwrap(),
            cluster: cluster.parse().unwrap(),
            ..CompilerSettings::default()
        };
        let dims = Dimensions::new(&stencil, &settings).unwrap();

        let load = |block: &PointKey| -> Vec<i64> {
            let base = GridPoint::with_offsets(stencil.grids()[block.grid].clone(), block.offsets.clone());
            dims.lane_offsets()
                .into_iter()
                .map(|lane| {
                    let shift: Vec<_> = dims.domain.iter().copied().zip(lane).collect();
                    value_of(&base.translated(&shift))
                })
                .collect()
        };

        let mut shuffled = 0;
        for bundle in &bundles {
            let body = cluster_body(bundle, &equations, &dims);
            let info = VecInfo::analyze(&body, &dims, target.shuffle_capability(), false);

            for (point, class) in &info.reads {
                let scalar: Vec<i64> = info
                    .lane_sources(point)
                    .iter()
                    .map(|source| value_of(&source.element))
                    .collect();

                let vector = match class {
                    ReadClass::Aligned => load(&point.key()),
                    ReadClass::Unaligned(ops) => {
                        shuffled += 1;
                        shuffle::emulate(ops, dims.vector_width, &load, &value_of)
                    }
                    ReadClass::Gathered(elements) => elements.iter().map(value_of).collect(),
                    other => panic!("unexpected {other:?} read of {point}"),
                };

                assert_eq!(vector, scalar, "{target} {fold} cluster {cluster}: {point}");
            }
        }

        assert!(shuffled > 0, "{target} {fold} built no unaligned vectors");
    }
}

#[test]
fn cse_shares_repeated_subexpressions() {
    let stencil = stencils::iso3dfd::iso3dfd(Some(1));
    stencil.validate().unwrap();

    let mut equations = stencil.equations().clone();
    cse::eliminate(&mut equations);

    // Every read of the centre point is one node after merging
    let mut centres = HashSet::new();
    collect_centres(equations.raw[0].rhs(), &mut centres);
    assert_eq!(centres.len(), 1);
}

fn collect_centres(expression: &ExprRef, centres: &mut HashSet<*const Expr>) {
    match &**expression {
        Expr::GridPoint(point)
            if point.grid().name().value() == "pressure"
                && point.resolved_offsets() == [0, 0, 0, 0] =>
        {
            centres.insert(std::rc::Rc::as_ptr(expression));
        }
        Expr::Unary { operand, .. } => collect_centres(operand, centres),
        Expr::Binary { lhs, rhs, .. } => {
            collect_centres(lhs, centres);
            collect_centres(rhs, centres);
        }
        Expr::Commutative { operands, .. } => {
            for operand in operands {
                collect_centres(operand, centres);
            }
        }
        _ => {}
    }
}
