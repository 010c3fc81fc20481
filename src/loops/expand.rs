//! Expands a parsed loop nest into C++.
//!
//! A loop over several dimensions becomes one loop over a linear index
//! which is split back into per-dimension indices, the last dimension
//! varying fastest. Each iteration covers `[start_dN, stop_dN)` in every
//! looped dimension, and calls receive the bounds of every domain
//! dimension (the enclosing range for dimensions not looped over).

use itertools::Itertools;
use log::debug;

use super::parser::{Call, Loop, Modifiers, Parser, Statement};
use crate::{
    backend::writer::CodeWriter,
    error::{CompileError, Result},
};

#[derive(Debug, Clone)]
pub struct LoopOptions {
    /// Number of stencil dimensions, including the step dimension (dim 0)
    pub ndims: usize,
    /// Suffix of the input variables, e.g. `rank` reads `begin_rank_d1`
    pub var_set: String,
    /// Temporal blocking is in effect, so every scan must be monotonic
    pub wavefront: bool,
}

impl Default for LoopOptions {
    fn default() -> Self {
        Self {
            ndims: 4,
            var_set: String::from("rank"),
            wavefront: false,
        }
    }
}

/// Parses, checks and expands a loop nest template
pub fn expand(source: &str, options: &LoopOptions) -> Result<String> {
    if options.ndims < 2 {
        return Err(CompileError::invalid_setting(
            "ndims",
            "at least one domain dimension is needed",
        ));
    }

    let nest = Parser::parse(source, options.ndims)?;
    check(&nest, options, &mut Vec::new(), 0)?;

    let mut expander = Expander {
        options,
        writer: CodeWriter::new(),
        next_loop: 0,
    };

    expander.writer.comment(format!(
        "Loop nest over `{}` ranges for {} stencil dimensions, generated by stencilc. Do not edit.",
        options.var_set, options.ndims
    ));
    expander.writer.comment(format!(
        "Inputs: {} for N in 1..{}.",
        ["begin", "end", "step", "group_size"]
            .iter()
            .map(|prefix| format!("{prefix}_{}_dN", options.var_set))
            .join(", "),
        options.ndims - 1
    ));

    for statement in &nest {
        expander.statement(statement, &[]);
    }

    debug!("expanded {} loops", expander.next_loop);

    Ok(expander.writer.into_output())
}

fn check(nest: &[Statement], options: &LoopOptions, path: &mut Vec<usize>, parallel: usize) -> Result<()> {
    for statement in nest {
        let Statement::Loop(l) = statement else {
            continue;
        };

        if l.dims.is_empty() {
            return Err(CompileError::LoopSpec("a loop must cover at least one dimension".into()));
        }

        for dim in &l.dims {
            if *dim == 0 || *dim >= options.ndims {
                return Err(CompileError::LoopSpec(format!(
                    "dimension {dim} is outside 1..{}",
                    options.ndims - 1
                )));
            }

            if path.contains(dim) {
                return Err(CompileError::LoopSpec(format!(
                    "dimension {dim} is looped over twice in one nest"
                )));
            }

            path.push(*dim);
        }

        check_modifiers(&l.modifiers, l.dims.len(), options)?;

        let parallel = parallel + usize::from(l.modifiers.omp.is_some());
        if parallel > 2 {
            return Err(CompileError::LoopSpec(
                "at most two nested parallel loops are supported".into(),
            ));
        }

        check(&l.body, options, path, parallel)?;
        path.truncate(path.len() - l.dims.len());
    }

    Ok(())
}

fn check_modifiers(modifiers: &Modifiers, dims: usize, options: &LoopOptions) -> Result<()> {
    let reordered = modifiers.serpentine || modifiers.square_wave;

    if options.wavefront && reordered {
        return Err(CompileError::LoopSpec(
            "serpentine and square_wave orders revisit indices non-monotonically and cannot be used with wavefronts"
                .into(),
        ));
    }

    if modifiers.serpentine && modifiers.square_wave {
        return Err(CompileError::LoopSpec(
            "serpentine and square_wave cannot be combined".into(),
        ));
    }

    if modifiers.grouped && reordered {
        return Err(CompileError::LoopSpec(
            "grouped loops scan groups in order and cannot also be reordered".into(),
        ));
    }

    if modifiers.square_wave && dims < 2 {
        return Err(CompileError::LoopSpec(
            "square_wave needs at least two dimensions".into(),
        ));
    }

    if modifiers.affinity.is_some() && modifiers.omp.is_none() {
        return Err(CompileError::LoopSpec(
            "affinity is only meaningful on an omp loop".into(),
        ));
    }

    Ok(())
}

struct Expander<'o> {
    options: &'o LoopOptions,
    writer: CodeWriter,
    next_loop: usize,
}

impl Expander<'_> {
    fn input(&self, prefix: &str, dim: usize) -> String {
        format!("{prefix}_{}_d{dim}", self.options.var_set)
    }

    fn statement(&mut self, statement: &Statement, path: &[usize]) {
        match statement {
            Statement::Loop(l) => self.expand_loop(l, path),
            Statement::Call(call) => self.expand_call(call, path),
        }
    }

    fn expand_call(&mut self, call: &Call, path: &[usize]) {
        let bounds = |prefix: &str, input: &str| {
            (1..self.options.ndims)
                .map(|dim| {
                    if path.contains(&dim) {
                        format!("{prefix}_d{dim}")
                    } else {
                        self.input(input, dim)
                    }
                })
                .collect::<Vec<_>>()
        };

        let args = call
            .args
            .iter()
            .cloned()
            .chain(bounds("start", "begin"))
            .chain(bounds("stop", "end"))
            .join(", ");

        self.writer.emit(format!("{}({args});", call.function));
    }

    fn pragma(&mut self, modifiers: &Modifiers) {
        let Some(schedule) = modifiers.omp else {
            return;
        };

        let mut pragma = format!("#pragma omp parallel for schedule({}", schedule.kind);
        if let Some(chunk) = schedule.chunk {
            pragma.push_str(&format!(",{chunk}"));
        }
        pragma.push(')');

        if let Some(affinity) = &modifiers.affinity {
            pragma.push_str(&format!(" proc_bind({affinity})"));
        }

        self.writer.emit(pragma);
    }

    /// Emits `index_dN` for each of `dims` from the linear `index`, where
    /// dimension `N` has `count(N)` values
    fn decompose(&mut self, index: &str, dims: &[usize], count: impl Fn(usize) -> String, out: impl Fn(usize) -> String) {
        for (position, dim) in dims.iter().enumerate() {
            let inner = &dims[position + 1..];
            let divisor = inner.iter().map(|d| count(*d)).join(" * ");

            let value = match (position, inner.is_empty()) {
                (0, true) => index.to_owned(),
                (0, false) => format!("{index} / ({divisor})"),
                (_, true) => format!("{index} % {}", count(*dim)),
                (_, false) => format!("({index} / ({divisor})) % {}", count(*dim)),
            };

            self.writer.emit(format!("idx_t {} = {value};", out(*dim)));
        }
    }

    fn bounds(&mut self, dims: &[usize]) {
        for dim in dims {
            let step = self.input("step", *dim);
            self.writer.emit(format!(
                "const idx_t start_d{dim} = {} + index_d{dim} * {step};",
                self.input("begin", *dim)
            ));
            self.writer.emit(format!(
                "const idx_t stop_d{dim} = std::min(start_d{dim} + {step}, {});",
                self.input("end", *dim)
            ));
        }
    }

    fn expand_loop(&mut self, l: &Loop, path: &[usize]) {
        let id = self.next_loop;
        self.next_loop += 1;

        let path: Vec<usize> = path.iter().chain(&l.dims).copied().collect();
        let iters = |dim: usize| format!("num_iters_d{dim}");

        let mut description = vec![format!(
            "Loop {id} over dimension(s) {}",
            l.dims.iter().join(", ")
        )];
        if l.modifiers.grouped {
            description.push("grouped".into());
        }
        if l.modifiers.serpentine {
            description.push("serpentine".into());
        }
        if l.modifiers.square_wave {
            description.push("square wave".into());
        }
        self.writer.comment(description.join(", "));
        self.writer.open("");

        for dim in &l.dims {
            let step = self.input("step", *dim);
            self.writer.emit(format!(
                "const idx_t num_iters_d{dim} = ({} - {} + {step} - 1) / {step};",
                self.input("end", *dim),
                self.input("begin", *dim)
            ));
        }

        if l.modifiers.grouped {
            self.expand_grouped(l, id, &path);
        } else {
            let total = l.dims.iter().map(|d| iters(*d)).join(" * ");
            self.writer.emit(format!("const idx_t num_iters_l{id} = {total};"));
            self.pragma(&l.modifiers);
            self.writer.open(format!(
                "for (idx_t index_l{id} = 0; index_l{id} < num_iters_l{id}; index_l{id}++)"
            ));

            let index = format!("index_l{id}");
            if l.modifiers.square_wave {
                self.square_wave(&index, id, &l.dims);
            } else {
                self.decompose(&index, &l.dims, iters, |dim| format!("index_d{dim}"));
            }

            if l.modifiers.serpentine {
                self.serpentine(&index, &l.dims);
            }

            self.bounds(&l.dims);
            for statement in &l.body {
                self.statement(statement, &path);
            }

            self.writer.close("");
        }

        self.writer.close("");
    }

    /// Reverses each dimension on odd passes of the dimensions outside it,
    /// so consecutive iterations stay adjacent
    fn serpentine(&mut self, index: &str, dims: &[usize]) {
        for position in 1..dims.len() {
            let dim = dims[position];
            let divisor = dims[position..].iter().map(|d| format!("num_iters_d{d}")).join(" * ");

            self.writer.emit(format!(
                "if (({index} / ({divisor})) % 2 == 1) index_d{dim} = num_iters_d{dim} - index_d{dim} - 1;"
            ));
        }
    }

    /// Visits the last two dimensions two rows at a time, alternating rows
    /// at each step along the last dimension
    fn square_wave(&mut self, index: &str, id: usize, dims: &[usize]) {
        let (outer, pair) = dims.split_at(dims.len() - 2);
        let (row, column) = (pair[0], pair[1]);
        let plane = format!("num_iters_d{row} * num_iters_d{column}");

        if !outer.is_empty() {
            let outer_index = format!("outer_l{id}");
            self.writer.emit(format!("const idx_t {outer_index} = {index} / ({plane});"));
            self.decompose(&outer_index, outer, |dim| format!("num_iters_d{dim}"), |dim| format!("index_d{dim}"));
        }

        self.writer.emit(format!("const idx_t wave_l{id} = {index} % ({plane});"));
        self.writer.emit(format!(
            "const idx_t pair_l{id} = wave_l{id} / (2 * num_iters_d{column});"
        ));
        self.writer.emit(format!(
            "const idx_t within_l{id} = wave_l{id} % (2 * num_iters_d{column});"
        ));
        self.writer.emit(format!(
            "const bool single_row_l{id} = 2 * pair_l{id} + 1 >= num_iters_d{row};"
        ));
        self.writer.emit(format!(
            "idx_t index_d{row} = 2 * pair_l{id} + (single_row_l{id} ? 0 : within_l{id} % 2);"
        ));
        self.writer.emit(format!(
            "idx_t index_d{column} = single_row_l{id} ? within_l{id} : within_l{id} / 2;"
        ));
    }

    fn expand_grouped(&mut self, l: &Loop, id: usize, path: &[usize]) {
        for dim in &l.dims {
            let step = self.input("step", *dim);
            self.writer.emit(format!(
                "const idx_t group_iters_d{dim} = std::max<idx_t>(({} + {step} - 1) / {step}, 1);",
                self.input("group_size", *dim)
            ));
            self.writer.emit(format!(
                "const idx_t num_groups_d{dim} = (num_iters_d{dim} + group_iters_d{dim} - 1) / group_iters_d{dim};"
            ));
        }

        let groups = l.dims.iter().map(|d| format!("num_groups_d{d}")).join(" * ");
        let members = l.dims.iter().map(|d| format!("group_iters_d{d}")).join(" * ");
        self.writer.emit(format!("const idx_t num_groups_l{id} = {groups};"));
        self.writer.emit(format!("const idx_t group_iters_l{id} = {members};"));

        self.pragma(&l.modifiers);
        self.writer.open(format!(
            "for (idx_t group_l{id} = 0; group_l{id} < num_groups_l{id}; group_l{id}++)"
        ));
        self.decompose(
            &format!("group_l{id}"),
            &l.dims,
            |dim| format!("num_groups_d{dim}"),
            |dim| format!("group_d{dim}"),
        );

        self.writer.open(format!(
            "for (idx_t member_l{id} = 0; member_l{id} < group_iters_l{id}; member_l{id}++)"
        ));
        self.decompose(
            &format!("member_l{id}"),
            &l.dims,
            |dim| format!("group_iters_d{dim}"),
            |dim| format!("member_d{dim}"),
        );

        for dim in &l.dims {
            self.writer.emit(format!(
                "const idx_t index_d{dim} = group_d{dim} * group_iters_d{dim} + member_d{dim};"
            ));
        }

        // Edge groups are partial
        let outside = l
            .dims
            .iter()
            .map(|dim| format!("index_d{dim} >= num_iters_d{dim}"))
            .join(" || ");
        self.writer.emit(format!("if ({outside}) continue;"));

        self.bounds(&l.dims);
        for statement in &l.body {
            self.statement(statement, path);
        }

        self.writer.close("");
        self.writer.close("");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(ndims: usize) -> LoopOptions {
        LoopOptions {
            ndims,
            ..LoopOptions::default()
        }
    }

    #[test]
    fn single_dimension_loop_calls_with_bounds() {
        let output = expand("loop(1) { call(calc(context)); }", &options(3)).unwrap();

        assert!(output.contains("const idx_t num_iters_d1 = (end_rank_d1 - begin_rank_d1 + step_rank_d1 - 1) / step_rank_d1;"));
        assert!(output.contains("for (idx_t index_l0 = 0; index_l0 < num_iters_l0; index_l0++) {"));
        assert!(output.contains("idx_t index_d1 = index_l0;"));
        assert!(output.contains("const idx_t stop_d1 = std::min(start_d1 + step_rank_d1, end_rank_d1);"));
        assert!(output.contains("calc(context, start_d1, begin_rank_d2, stop_d1, end_rank_d2);"));
    }

    #[test]
    fn multi_dimension_loop_is_linearized_inner_fastest() {
        let output = expand("omp(static) loop(1..N-1) { call(f()); }", &options(4)).unwrap();

        assert!(output.contains("const idx_t num_iters_l0 = num_iters_d1 * num_iters_d2 * num_iters_d3;"));
        assert!(output.contains("#pragma omp parallel for schedule(static)\n"));
        assert!(output.contains("idx_t index_d1 = index_l0 / (num_iters_d2 * num_iters_d3);"));
        assert!(output.contains("idx_t index_d2 = (index_l0 / (num_iters_d3)) % num_iters_d2;"));
        assert!(output.contains("idx_t index_d3 = index_l0 % num_iters_d3;"));
    }

    #[test]
    fn nested_loops_pass_outer_bounds_through() {
        let output = expand(
            "omp(dynamic, 1) affinity(spread) loop(1) { omp(guided) loop(2) { call(g(t)); } }",
            &options(3),
        )
        .unwrap();

        assert!(output.contains("#pragma omp parallel for schedule(dynamic,1) proc_bind(spread)"));
        assert!(output.contains("#pragma omp parallel for schedule(guided)"));
        assert!(output.contains("g(t, start_d1, start_d2, stop_d1, stop_d2);"));
    }

    #[test]
    fn grouped_loops_skip_partial_members() {
        let output = expand("grouped loop(1, 2) { call(f()); }", &options(3)).unwrap();

        assert!(output.contains("const idx_t num_groups_l0 = num_groups_d1 * num_groups_d2;"));
        assert!(output.contains("const idx_t index_d2 = group_d2 * group_iters_d2 + member_d2;"));
        assert!(output.contains("if (index_d1 >= num_iters_d1 || index_d2 >= num_iters_d2) continue;"));
    }

    #[test]
    fn serpentine_reverses_inner_dimension() {
        let output = expand("serpentine loop(1, 2) { call(f()); }", &options(3)).unwrap();

        assert!(output.contains(
            "if ((index_l0 / (num_iters_d2)) % 2 == 1) index_d2 = num_iters_d2 - index_d2 - 1;"
        ));
    }

    #[test]
    fn wavefronts_reject_non_monotonic_orders() {
        let options = LoopOptions {
            ndims: 3,
            wavefront: true,
            ..LoopOptions::default()
        };

        for spec in ["serpentine loop(1, 2) { }", "square_wave loop(1, 2) { }"] {
            assert!(matches!(expand(spec, &options), Err(CompileError::LoopSpec(_))));
        }
        assert!(expand("grouped loop(1, 2) { }", &options).is_ok());
    }

    #[test]
    fn malformed_nests_are_rejected() {
        for spec in [
            "loop(0) { }",
            "loop(3) { }",
            "loop(1) { loop(1) { } }",
            "loop(1, 1) { }",
            "omp(static) loop(1) { omp(static) loop(2) { omp(static) loop(3) { } } }",
            "affinity(close) loop(1) { }",
            "square_wave loop(1) { }",
        ] {
            assert!(
                matches!(expand(spec, &options(4)), Err(CompileError::LoopSpec(_))),
                "{spec} should be rejected"
            );
        }
    }
}
