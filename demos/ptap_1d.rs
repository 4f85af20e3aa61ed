mod util;

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
    let args = Args::cli_setup("ptap_1d");

    let grid = Arc::new(StructGrid::partitioned(
        &args.domain::<1>(),
        [args.boxes],
        1,
        0,
    ));
    let mut a = StructMatrix::new(grid.clone(), standard_stencils::laplace_1d())
        .initialize()
        .unwrap();
    for (e, w) in standard_stencils::LAPLACE_1D_WEIGHTS.iter().enumerate() {
        a.set_values(e, |p| *w * (1.0 + 0.01 * p[0] as f64)).unwrap();
    }
    a.assemble();

    let weights = standard_stencils::INTERPOLATION_1D_WEIGHTS;
    let mut p = StructMatrix::new(grid, standard_stencils::interpolation_1d())
        .with_domain_stride(vector![2])
        .with_constant_entry(0, weights[0])
        .with_constant_entry(1, weights[1])
        .with_constant_entry(2, weights[2])
        .initialize()
        .unwrap();

    let mut ctx =
        MatmultContext::with_parameters(SelfComm::new(), args.matmult_parameters());
    for _ in 0..args.repeats {
        let now = Instant::now();
        let mut plan = ProductPlan::create(
            vec![&mut a, &mut p],
            &[1, 0, 1],
            &[true, false, false],
        )
        .unwrap();
        let mut coarse = plan.setup().unwrap();
        plan.communicate(&mut ctx).unwrap();
        plan.compute(&mut ctx, &mut coarse).unwrap();
        report_elapsed(now);
        println!("{}", plan.summary());
        plan.destroy();
    }

    args.finish();
}
