mod util;

use structmm::comm::*;
use structmm::grid::StructGrid;
use structmm::matmult::*;
use structmm::matrix::StructMatrix;
use structmm::stencil::standard_stencils;
use structmm::util::vector;
use std::sync::Arc;
use std::time::*;
use util::*;

fn run_rank(args: &Args, comm: ThreadComm) {
    let rank = comm.rank();
    let grid = Arc::new(StructGrid::partitioned(
        &args.domain::<2>(),
        [args.boxes, args.boxes],
        comm.size(),
        rank,
    ));

    let mut a = StructMatrix::new(grid.clone(), standard_stencils::laplace_2d())
        .initialize()
        .unwrap();
    for (e, w) in standard_stencils::LAPLACE_2D_WEIGHTS.iter().enumerate() {
        a.set_values(e, |p| *w * (1.0 + 0.001 * p[0] as f64)).unwrap();
    }
    a.assemble();

    let mut p = StructMatrix::new(grid, standard_stencils::interpolation_2d())
        .with_domain_stride(vector![2, 2])
        .initialize()
        .unwrap();
    for (e, w) in standard_stencils::interpolation_2d_weights().iter().enumerate() {
        p.set_values(e, |_| *w).unwrap();
    }
    p.assemble();

    let mut ctx = MatmultContext::with_parameters(comm, args.matmult_parameters());
    for _ in 0..args.repeats {
        let now = Instant::now();
        let coarse = ptap(&mut ctx, &mut a, &mut p).unwrap();
        if rank == 0 {
            report_elapsed(now);
            println!(
                "rank 0 owns {} of {} coarse boxes",
                coarse.grid().num_local_boxes(),
                coarse.grid().boxes().len()
            );
        }
    }

    if rank == 0 {
        let mut plan = ProductPlan::create(
            vec![&mut a, &mut p],
            &[1, 0, 1],
            &[true, false, false],
        )
        .unwrap();
        plan.setup().unwrap();
        println!("{}", plan.summary());
    }
}

fn main() {
    let args = Args::cli_setup("distributed_ptap");

    std::thread::scope(|s| {
        for comm in ThreadComm::world(args.ranks) {
            let args = &args;
            s.spawn(move || run_rank(args, comm));
        }
    });

    args.finish();
}
