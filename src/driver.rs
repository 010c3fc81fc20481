//! The whole pipeline from a registered stencil name to C++ source.

use std::fs;

use log::{debug, info, warn};

use crate::{
    backend::{CodeGenerator, Program},
    error::{CompileError, Result},
    frontend::{ast::visit::Visitor, registry::STENCIL_REGISTRY, Stencil},
    middle::{bundles, counter::PointCounter, coverage, cse, dims::Dimensions, equations::DependencyGraph},
    settings::CompilerSettings,
    stencils,
};

/// Compiles the stencil named in `settings` and, when an output path is
/// set, writes the result there. Nothing is written if any phase fails.
pub fn compile(settings: &CompilerSettings) -> Result<String> {
    settings.validate()?;
    stencils::register_all();

    let stencil = STENCIL_REGISTRY.build(&settings.stencil, settings.radius)?;
    let output = compile_stencil(stencil, settings)?;

    if let Some(path) = &settings.output {
        fs::write(path, &output).map_err(|source| CompileError::Output {
            path: path.display().to_string(),
            source,
        })?;
        info!("wrote {}", path.display());
    }

    Ok(output)
}

/// Compiles an already declared stencil, ignoring `settings.stencil` and
/// `settings.output`
pub fn compile_stencil(stencil: Stencil, settings: &CompilerSettings) -> Result<String> {
    settings.validate()?;
    stencil.validate()?;

    let dims = Dimensions::new(&stencil, settings)?;
    for equation in stencil.equations() {
        dims.check_written_grid(equation.lhs().grid())?;
    }

    let mut equations = stencil.equations().clone();
    if settings.define_all_points {
        let added = coverage::add_defaults(&mut equations);
        if added > 0 {
            info!("added {added} default equation(s)");
        }
    }

    let merged = cse::eliminate(&mut equations);
    debug!("merged {merged} common subexpression(s)");

    let graph = DependencyGraph::build(&equations)?;
    let bundles = bundles::partition(&equations, &graph, settings.bundle_count)?;
    info!(
        "stencil `{}`: {} equation(s) in {} bundle(s)",
        stencil.name(),
        equations.len(),
        bundles.len()
    );

    let observed = u32::try_from(graph.max_read_distance(&equations)).unwrap_or(u32::MAX);
    let radius = match settings.radius.or(stencil.radius()) {
        Some(declared) if declared < observed => {
            warn!(
                "stencil `{}` declares radius {declared} but reads {observed} points away",
                stencil.name()
            );
            declared
        }
        Some(declared) => declared,
        None => observed,
    };

    let program = Program {
        stencil: &stencil,
        settings,
        dims: &dims,
        equations: &equations,
        bundles: &bundles,
        radius,
        halo: settings.halo.unwrap_or(radius),
        step_alloc: settings.step_alloc.unwrap_or_else(|| step_span(&stencil)),
    };

    Ok(settings.target.get_code_generator().generate(&program))
}

/// Number of steps alive at once: from the oldest step read to the step
/// written
fn step_span(stencil: &Stencil) -> u32 {
    let mut counter = PointCounter::new();
    for equation in stencil.equations() {
        counter.visit_expression(&equation.expr);
    }

    let offsets = counter
        .reads
        .iter()
        .chain(&counter.writes)
        .filter_map(|point| point.step_offset());

    let (min, max) = offsets.fold((0, 0), |(min, max), offset| (min.min(offset), max.max(offset)));
    u32::try_from(max - min + 1).unwrap_or(u32::MAX)
}
