use stencilc::{
    loops::{expand, LoopOptions},
    CompileError,
};

const REGION_NEST: &str = "
    // regions in parallel, blocks in each region in nested parallel
    omp(dynamic, 1) loop(1..N-1) {
        omp(static) grouped loop(1, 2) {
            loop(3) { call(calc_block(context, t)); }
        }
    }
";

#[test_log::test]
fn region_nest_expands_every_tier() {
    let options = LoopOptions {
        ndims: 4,
        var_set: "region".into(),
        wavefront: false,
    };

    // The template loops over dim 1 twice along one path
    assert!(matches!(
        expand(REGION_NEST, &options),
        Err(CompileError::LoopSpec(_))
    ));

    let template = "
        omp(dynamic, 1) loop(1, 2) {
            omp(static) grouped loop(3) {
                call(calc_block(context, t));
            }
        }
    ";
    let output = expand(template, &options).unwrap();

    assert!(output.starts_with("// Loop nest over `region` ranges"));
    assert!(output.contains("#pragma omp parallel for schedule(dynamic,1)"));
    assert!(output.contains("#pragma omp parallel for schedule(static)"));
    assert!(output.contains("const idx_t num_iters_l0 = num_iters_d1 * num_iters_d2;"));
    assert!(output.contains("for (idx_t group_l1 = 0; group_l1 < num_groups_l1; group_l1++) {"));
    assert!(output.contains(
        "calc_block(context, t, start_d1, start_d2, start_d3, stop_d1, stop_d2, stop_d3);"
    ));

    let opened = output.matches('{').count();
    let closed = output.matches('}').count();
    assert_eq!(opened, closed);
}

#[test]
fn square_wave_visits_rows_in_pairs() {
    let output = expand(
        "square_wave loop(1, 2, 3) { call(f()); }",
        &LoopOptions::default(),
    )
    .unwrap();

    assert!(output.contains("const idx_t outer_l0 = index_l0 / (num_iters_d2 * num_iters_d3);"));
    assert!(output.contains("idx_t index_d1 = outer_l0;"));
    assert!(output.contains("const idx_t pair_l0 = wave_l0 / (2 * num_iters_d3);"));
    assert!(output.contains(
        "idx_t index_d2 = 2 * pair_l0 + (single_row_l0 ? 0 : within_l0 % 2);"
    ));
    assert!(output.contains("idx_t index_d3 = single_row_l0 ? within_l0 : within_l0 / 2;"));
}

#[test]
fn parse_errors_carry_positions() {
    match expand("loop(1) {\n  cal(f());\n}", &LoopOptions::default()) {
        Err(CompileError::LoopSpec(message)) => {
            assert!(message.contains("line 2, column 3"), "{message}");
        }
        other => panic!("expected a loop specification error, got {other:?}"),
    }
}

#[test]
fn empty_dimension_ranges_are_rejected() {
    let options = LoopOptions::default();

    match expand("loop(3..N-2) { call(f()); }", &options) {
        Err(CompileError::LoopSpec(message)) => {
            assert!(message.contains("3..N-2 is an empty range"), "{message}");
        }
        other => panic!("expected a loop specification error, got {other:?}"),
    }

    assert!(expand("loop(3..N-1) { call(f()); }", &options).is_ok());
}
