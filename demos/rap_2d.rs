mod util;

use rand::prelude::*;
use structmm::comm::SelfComm;
use structmm::grid::StructGrid;
use structmm::matmult::*;
use structmm::matrix::StructMatrix;
use structmm::stencil::standard_stencils;
use structmm::util::vector;
use std::sync::Arc;
use std::time::*;
use util::*;

fn main() {
    let args = Args::cli_setup("rap_2d");

    let grid = Arc::new(StructGrid::partitioned(
        &args.domain::<2>(),
        [args.boxes, args.boxes],
        1,
        0,
    ));

    // Restriction with per point weights, constant center operator
    let mut rng = StdRng::seed_from_u64(1337);
    let mut r = StructMatrix::new(grid.clone(), standard_stencils::box_2d())
        .with_range_stride(vector![2, 2])
        .initialize()
        .unwrap();
    for e in 0..r.stencil().size() {
        let w = standard_stencils::interpolation_2d_weights()[e];
        let jitter: f64 = rng.gen_range(0.9..1.1);
        r.set_values(e, |_| w * jitter).unwrap();
    }
    r.assemble();

    let mut a = StructMatrix::new(grid.clone(), standard_stencils::laplace_2d())
        .with_constant_entry(0, standard_stencils::LAPLACE_2D_WEIGHTS[0])
        .initialize()
        .unwrap();
    for e in 1..5 {
        a.set_values(e, |p| -1.0 - 0.001 * (p[0] + p[1]) as f64).unwrap();
    }
    a.assemble();

    let mut p = StructMatrix::new(grid, standard_stencils::interpolation_2d());
    for (e, w) in standard_stencils::interpolation_2d_weights().iter().enumerate() {
        p = p.with_constant_entry(e, *w);
    }
    let mut p = p.with_domain_stride(vector![2, 2]).initialize().unwrap();

    let mut ctx =
        MatmultContext::with_parameters(SelfComm::new(), args.matmult_parameters());
    for _ in 0..args.repeats {
        let now = Instant::now();
        let coarse = rap(&mut ctx, &mut r, &mut a, &mut p).unwrap();
        report_elapsed(now);
        println!(
            "coarse operator: {} entries, {} stored per point",
            coarse.stencil().size(),
            coarse.num_values()
        );
    }

    let mut plan = ProductPlan::create(
        vec![&mut r, &mut a, &mut p],
        &[0, 1, 2],
        &[false, false, false],
    )
    .unwrap();
    plan.setup().unwrap();
    println!("{}", plan.summary());

    args.finish();
}
