//! The whole-file C++ printer: dimension macros, the context struct and
//! one struct per bundle with its scalar, vector and prefetch entry
//! points.

use itertools::Itertools;
use log::debug;

use super::{
    cpp_vec::CppVecPrintHelper,
    print_helper::{ConditionPrinter, CppPrintHelper, ExprPrinter},
    writer::CodeWriter,
    CodeGenerator, Program, Target,
};
use crate::{
    frontend::{
        ast::{format_dim_offset, visit::Visitor},
        dims::Dim,
        grid::GridPoint,
    },
    middle::{
        bundles::Bundle,
        cluster::{cluster_body, ClusterEquation},
        counter::{OpCounter, PointCounter, UseCounter},
        vec_info::{ReadClass, VecInfo},
    },
};

pub struct CppGenerator {
    pub target: Target,
}

impl CodeGenerator for CppGenerator {
    fn generate(&self, program: &Program<'_>) -> String {
        let mut writer = CodeWriter::new();

        print_preamble(&mut writer, program, self.target);
        print_macros(&mut writer, program, self.target);
        print_context(&mut writer, program);

        for bundle in program.bundles {
            self.print_bundle(&mut writer, program, bundle);
        }

        writer.comment("Bundles in evaluation order");
        writer.push_line(format!(
            "#define STENCIL_BUNDLES {}",
            program
                .bundles
                .iter()
                .map(|bundle| bundle_struct_name(program, bundle))
                .join(", ")
        ));

        writer.into_output()
    }
}

fn context_name(program: &Program<'_>) -> String {
    format!("StencilContext_{}", program.stencil.name())
}

fn bundle_struct_name(program: &Program<'_>, bundle: &Bundle) -> String {
    format!("{}_{}", program.stencil.name(), bundle.name())
}

fn macro_name(dim: Dim) -> String {
    dim.name().value().to_uppercase()
}

fn describe(program: &Program<'_>, factors: &[usize]) -> String {
    program
        .dims
        .domain
        .iter()
        .zip(factors)
        .map(|(dim, factor)| format!("{}={factor}", dim.name()))
        .join(",")
}

fn print_preamble(writer: &mut CodeWriter, program: &Program<'_>, target: Target) {
    let text = format!(
        indoc::indoc! {r#"
        // Stencil code for `{0}`, generated by stencilc {1}. Do not edit.
        // Target {2}, vector width {3}, fold {4}, cluster {5}.
        //
        // idx_t, real_vec_t, real_vec_permute_t, ctrl_sel_bit, Grid<N> and
        // prefetch<level> are provided by the runtime.

        #pragma once

        #include <limits>

        typedef {6} real_t;
        "#},
        program.stencil.name(),
        env!("CARGO_PKG_VERSION"),
        target,
        program.dims.vector_width,
        describe(program, &program.dims.fold),
        describe(program, &program.dims.cluster),
        program.settings.real_type(),
    );

    for line in text.lines() {
        writer.push_line(line);
    }

    writer.blank();
}

fn print_macros(writer: &mut CodeWriter, program: &Program<'_>, target: Target) {
    let dims = program.dims;
    let mut define = |name: String, value: String| writer.push_line(format!("#define {name} {value}"));

    define("STENCIL_NAME".into(), format!("\"{}\"", program.stencil.name()));
    define("STENCIL_CONTEXT".into(), context_name(program));
    define("REAL_BYTES".into(), program.settings.elem_bytes.to_string());
    define("TARGET_".to_owned() + &target.to_string().to_uppercase(), "1".into());

    define("NUM_STENCIL_DIMS".into(), (dims.domain.len() + 1).to_string());
    define("NUM_DOMAIN_DIMS".into(), dims.domain.len().to_string());
    define("NUM_MISC_DIMS".into(), dims.misc.len().to_string());
    define("STEP_DIM".into(), dims.step.name().value().to_owned());
    define(
        "DOMAIN_DIMS".into(),
        dims.domain.iter().map(|d| d.name()).join(", "),
    );

    for grid in program.stencil.grids() {
        define(
            format!("NUM_GRID_DIMS_{}", grid.name()),
            grid.dims().len().to_string(),
        );
    }

    for (position, dim) in dims.domain.iter().enumerate() {
        let name = macro_name(*dim);
        define(format!("VLEN_{name}"), dims.fold[position].to_string());
        define(format!("CLEN_{name}"), dims.cluster[position].to_string());
        define(format!("CPTS_{name}"), format!("(VLEN_{name} * CLEN_{name})"));

        if let Some(tile) = program.settings.tile.get(dim.name().value()) {
            define(format!("TILE_{name}"), tile.to_string());
        }
    }

    define("VLEN".into(), dims.vector_width.to_string());
    define("CLEN".into(), dims.cluster.iter().product::<usize>().to_string());
    define("STENCIL_RADIUS".into(), program.radius.to_string());
    define("STENCIL_HALO".into(), program.halo.to_string());
    define("STEP_ALLOC".into(), program.step_alloc.to_string());
    define("NUM_BUNDLES".into(), program.bundles.len().to_string());
    define(
        "USE_UNALIGNED_LOADS".into(),
        u8::from(program.settings.allow_unaligned_loads).to_string(),
    );

    writer.blank();
}

fn print_context(writer: &mut CodeWriter, program: &Program<'_>) {
    writer.open(format!("struct {}", context_name(program)));

    writer.comment("Grids");
    for grid in program.stencil.grids() {
        writer.emit(format!("Grid<NUM_GRID_DIMS_{0}>* {0};", grid.name()));
    }

    writer.comment("Overall problem domain");
    for dim in &program.dims.domain {
        writer.emit(format!("idx_t first_index_{0}, last_index_{0};", dim.name()));
    }

    writer.close(";");
    writer.blank();
}

/// `idx_t t, idx_t x, ...` with domain names suffixed by `suffix`
fn index_params(program: &Program<'_>, suffix: &str) -> String {
    std::iter::once(format!("idx_t {}", program.dims.step.name()))
        .chain(
            program
                .dims
                .domain
                .iter()
                .map(|dim| format!("idx_t {}{suffix}", dim.name())),
        )
        .join(", ")
}

impl CppGenerator {
    fn print_bundle(&self, writer: &mut CodeWriter, program: &Program<'_>, bundle: &Bundle) {
        let body = cluster_body(bundle, program.equations, program.dims);
        let info = VecInfo::analyze(
            &body,
            program.dims,
            self.target.shuffle_capability(),
            program.settings.allow_unaligned_loads,
        );

        writer.open(format!("struct {}", bundle_struct_name(program, bundle)));
        print_stats(writer, program, bundle, &body, &info);

        writer.emit(format!(
            "static const char* name() {{ return \"{}\"; }}",
            bundle.name()
        ));
        writer.blank();

        print_valid_domain(writer, program, bundle);
        writer.blank();
        print_scalar(writer, program, bundle);
        writer.blank();
        print_cluster(writer, program, &body, &info);
        writer.blank();
        print_prefetch(writer, program, &info, "prefetch_cluster", &info.prefetch_offsets());
        writer.blank();
        print_prefetch(
            writer,
            program,
            &info,
            "prefetch_cluster_ahead",
            &info.prefetch_ahead_offsets(),
        );

        writer.close(";");
        writer.blank();
    }
}

fn print_stats(
    writer: &mut CodeWriter,
    program: &Program<'_>,
    bundle: &Bundle,
    body: &[ClusterEquation],
    info: &VecInfo<'_>,
) {
    let members = bundle.equations.iter().map(|id| &program.equations[*id]);

    let scalar_ops: usize = members.clone().map(|equation| OpCounter::count(equation.rhs())).sum();
    let mut points = PointCounter::new();
    for equation in members.clone() {
        points.visit_expression(&equation.expr);
    }

    let vector_ops: usize = body.iter().map(|equation| OpCounter::count(&equation.rhs)).sum();
    let shuffles: usize = info
        .reads
        .iter()
        .map(|(_, class)| match class {
            ReadClass::Unaligned(ops) => ops.len(),
            _ => 0,
        })
        .sum();

    debug!(
        "{}: {scalar_ops} scalar ops, {vector_ops} ops per cluster, {shuffles} shuffles",
        bundle.name()
    );

    writer.comment(format!("{} equation(s):", bundle.equations.len()));
    for equation in members {
        writer.comment(format!(
            "  {}",
            strip_ansi_escapes::strip_str(equation.expr.to_string())
        ));
    }
    writer.comment(format!(
        "Scalar: {scalar_ops} FP op(s), {} distinct point(s) read, {} written",
        points.reads.len(),
        points.writes.len()
    ));
    writer.comment(format!(
        "Cluster: {vector_ops} vector FP op(s), {} aligned load(s), {shuffles} shuffle op(s), {} base pointer(s)",
        info.aligned.len(),
        info.pointers.len()
    ));

    writer.emit(format!("static const int scalar_fp_ops = {scalar_ops};"));
    writer.emit(format!("static const int scalar_points_read = {};", points.reads.len()));
    writer.emit(format!("static const int scalar_points_written = {};", points.writes.len()));
}

fn print_valid_domain(writer: &mut CodeWriter, program: &Program<'_>, bundle: &Bundle) {
    writer.open(format!(
        "static bool is_in_valid_domain(const {}& context, {})",
        context_name(program),
        index_params(program, "")
    ));

    match &bundle.condition {
        Some(condition) => writer.emit(format!("return {};", ConditionPrinter::print(condition))),
        None => writer.emit("return true;"),
    }

    writer.close("");
}

fn print_scalar(writer: &mut CodeWriter, program: &Program<'_>, bundle: &Bundle) {
    writer.open(format!(
        "static void calc_scalar({}& context, {})",
        context_name(program),
        index_params(program, "")
    ));

    let mut uses = UseCounter::new();
    for id in &bundle.equations {
        uses.visit_expression(program.equations[*id].rhs());
    }

    let mut helper = CppPrintHelper::new();
    let mut printer = ExprPrinter::new(&mut helper, writer, &uses);
    for id in &bundle.equations {
        let equation = &program.equations[*id];
        printer.print_equation(equation.lhs(), equation.rhs());
    }

    writer.close("");
}

fn print_cluster(writer: &mut CodeWriter, program: &Program<'_>, body: &[ClusterEquation], info: &VecInfo<'_>) {
    writer.open(format!(
        "static void calc_cluster({}& context, {})",
        context_name(program),
        index_params(program, "v")
    ));

    for dim in &program.dims.domain {
        writer.emit(format!(
            "const idx_t {0} = {0}v * VLEN_{1};",
            dim.name(),
            macro_name(*dim)
        ));
    }

    let mut helper = CppVecPrintHelper::new(program.dims, info);
    helper.print_base_pointers(writer);

    let mut uses = UseCounter::new();
    for equation in body {
        uses.visit_expression(&equation.rhs);
    }

    let several = body.len() > 1;
    let mut printer = ExprPrinter::new(&mut helper, writer, &uses);
    for equation in body {
        if several {
            let at = equation
                .shift
                .iter()
                .map(|(dim, offset)| format_dim_offset(*dim, *offset))
                .join(", ");
            printer
                .writer()
                .comment(format!("eq{} at ({at})", equation.source));
        }

        printer.print_equation(&equation.lhs, &equation.rhs);
    }

    writer.close("");
}

fn print_prefetch(
    writer: &mut CodeWriter,
    program: &Program<'_>,
    info: &VecInfo<'_>,
    name: &str,
    offsets: &[(GridPoint, Vec<i64>)],
) {
    writer.emit("template<int level>");
    writer.open(format!(
        "static void {name}({}& context, {})",
        context_name(program),
        index_params(program, "v")
    ));

    let helper = CppVecPrintHelper::new(program.dims, info);
    helper.print_base_pointers(writer);
    helper.print_prefetches(writer, offsets);

    writer.close("");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        frontend::stencil::Stencil,
        middle::{bundles, dims::Dimensions, equations::DependencyGraph},
        point,
        settings::CompilerSettings,
    };

    #[test]
    fn one_bundle_prints_every_entry_point() {
        let mut stencil = Stencil::new("inc");
        let t = stencil.step_dim("t");
        let x = stencil.domain_dim("x");
        let g = stencil.grid("g", &[t, x]);
        stencil.define_if(point!(g, t + 1, x), point!(g, t, x) + 1.0, x.greater_than(0));
        stencil.validate().unwrap();

        let settings = CompilerSettings {
            stencil: "inc".into(),
            target: Target::Avx,
            vector_width: Some(4),
            ..CompilerSettings::default()
        };
        let dims = Dimensions::new(&stencil, &settings).unwrap();
        let graph = DependencyGraph::build(stencil.equations()).unwrap();
        let bundles = bundles::partition(stencil.equations(), &graph, None).unwrap();

        let program = Program {
            stencil: &stencil,
            settings: &settings,
            dims: &dims,
            equations: stencil.equations(),
            bundles: &bundles,
            radius: 0,
            halo: 0,
            step_alloc: 2,
        };
        let output = Target::Avx.get_code_generator().generate(&program);

        assert!(output.contains("typedef float real_t;"));
        assert!(output.contains("#define VLEN_X 4"));
        assert!(output.contains("#define NUM_GRID_DIMS_g 2"));
        assert!(output.contains("struct StencilContext_inc {"));
        assert!(output.contains("struct inc_bundle_0 {"));
        assert!(output.contains("        return (x > 0);"));
        assert!(output.contains("static void calc_scalar(StencilContext_inc& context, idx_t t, idx_t x) {"));
        assert!(output.contains("static void calc_cluster(StencilContext_inc& context, idx_t t, idx_t xv) {"));
        assert!(output.contains("context.g->write_vec_norm((vec_0 + ((real_t)1.0)), t+1, xv);"));
        assert!(output.contains("prefetch<level>(&ptr_0[0]);"));
        assert!(output.contains("prefetch<level>(&ptr_0[1]);"));
        assert!(output.contains("#define STENCIL_BUNDLES inc_bundle_0"));
    }
}
