use structmm::comm::*;
use structmm::grid::*;
use structmm::matmult::*;
use structmm::matrix::*;
use structmm::stencil::*;
use structmm::util::*;

use float_cmp::assert_approx_eq;
use rand::prelude::*;
use std::sync::Arc;

/// Random coefficients for every variable entry, then drop couplings
/// that leave the grid.
fn randomize<const GRID_DIMENSION: usize>(
    m: &mut StructMatrix<GRID_DIMENSION>,
    rng: &mut StdRng,
) {
    let entries: Vec<usize> = m.variable_entries().collect();
    for local in 0..m.grid().num_local_boxes() {
        let owned = m.owned_box(local);
        for p in owned.point_iter() {
            for e in &entries {
                m.set_value(*e, &p, rng.gen_range(0.5..1.5)).unwrap();
            }
        }
    }
    m.assemble();
}

/// Compare every stored coupling of `result` against the path sum,
/// returns how many couplings were checked.
fn check_product<const GRID_DIMENSION: usize>(
    result: &StructMatrix<GRID_DIMENSION>,
    factors: &[(&StructMatrix<GRID_DIMENSION>, bool)],
    coarsen: Coord<GRID_DIMENSION>,
) -> usize {
    let grid = result.grid().clone();
    let mut checked = 0;
    for local in 0..grid.num_local_boxes() {
        for p in result.owned_box(local).point_iter() {
            for e in 0..result.stencil().size() {
                let (row, col) = result.row_col(e, &p);
                if !grid.contains(&row) || !grid.contains(&col) {
                    continue;
                }
                let engine = result.coupling(&row, &col).unwrap();
                let naive = naive_product_coupling(
                    factors,
                    &row.component_mul(&coarsen),
                    &col.component_mul(&coarsen),
                )
                .unwrap();
                assert_approx_eq!(f64, engine, naive, epsilon = 1e-10);
                checked += 1;
            }
        }
    }
    checked
}

fn sequential() -> MatmultContext<SelfComm> {
    MatmultContext::with_parameters(
        SelfComm::new(),
        MatmultParameters {
            strategy: ExecutionStrategy::Sequential,
            ..Default::default()
        },
    )
}

fn parallel() -> MatmultContext<SelfComm> {
    MatmultContext::with_parameters(
        SelfComm::new(),
        MatmultParameters {
            strategy: ExecutionStrategy::Parallel,
            min_parallel_points: 0,
            ..Default::default()
        },
    )
}

fn line(hi: i32, parts: usize) -> Arc<StructGrid<1>> {
    Arc::new(StructGrid::partitioned(&AABB::new(matrix![0, hi]), [parts], 1, 0))
}

fn square(hi: i32, parts: [usize; 2]) -> Arc<StructGrid<2>> {
    Arc::new(StructGrid::partitioned(
        &AABB::new(matrix![0, hi; 0, hi]),
        parts,
        1,
        0,
    ))
}

#[test]
fn ptap_1d_variable() {
    let mut rng = StdRng::seed_from_u64(1);
    let grid = line(31, 4);
    let mut a = StructMatrix::new(grid.clone(), standard_stencils::laplace_1d())
        .initialize()
        .unwrap();
    let mut p = StructMatrix::new(grid, standard_stencils::interpolation_1d())
        .with_domain_stride(vector![2])
        .initialize()
        .unwrap();
    randomize(&mut a, &mut rng);
    randomize(&mut p, &mut rng);

    let mut ctx = sequential();
    let result = ptap(&mut ctx, &mut a, &mut p).unwrap();
    assert_eq!(result.range_stride(), &vector![1]);
    assert_eq!(result.domain_stride(), &vector![1]);
    assert_eq!(result.stencil().size(), 3);
    let checked = check_product(&result, &[(&p, true), (&a, false), (&p, false)], vector![2]);
    assert!(checked > 40);
}

#[test]
fn ptap_1d_constant_interpolation() {
    let mut rng = StdRng::seed_from_u64(2);
    let grid = line(40, 3);
    let weights = standard_stencils::INTERPOLATION_1D_WEIGHTS;
    let mut a = StructMatrix::new(grid.clone(), standard_stencils::laplace_1d())
        .initialize()
        .unwrap();
    let mut p = StructMatrix::new(grid, standard_stencils::interpolation_1d())
        .with_domain_stride(vector![2])
        .with_constant_entry(0, weights[0])
        .with_constant_entry(1, weights[1])
        .with_constant_entry(2, weights[2])
        .initialize()
        .unwrap();
    randomize(&mut a, &mut rng);

    for mut ctx in [sequential(), parallel()] {
        let result = ptap(&mut ctx, &mut a, &mut p).unwrap();
        let checked =
            check_product(&result, &[(&p, true), (&a, false), (&p, false)], vector![2]);
        assert!(checked > 50);
    }
}

#[test]
fn rap_2d() {
    let mut rng = StdRng::seed_from_u64(3);
    let grid = square(15, [2, 2]);
    let mut r = StructMatrix::new(grid.clone(), standard_stencils::box_2d())
        .with_range_stride(vector![2, 2])
        .initialize()
        .unwrap();
    let mut a = StructMatrix::new(grid.clone(), standard_stencils::laplace_2d())
        .initialize()
        .unwrap();
    let mut p = StructMatrix::new(grid, standard_stencils::interpolation_2d())
        .with_domain_stride(vector![2, 2])
        .initialize()
        .unwrap();
    randomize(&mut r, &mut rng);
    randomize(&mut a, &mut rng);
    randomize(&mut p, &mut rng);

    let mut ctx = parallel();
    let result = rap(&mut ctx, &mut r, &mut a, &mut p).unwrap();
    assert_eq!(result.grid().bounding_box(), Some(AABB::new(matrix![0, 7; 0, 7])));
    let checked = check_product(
        &result,
        &[(&r, false), (&a, false), (&p, false)],
        vector![2, 2],
    );
    assert!(checked > 200);
}

#[test]
fn rtap_2d_periodic() {
    let mut rng = StdRng::seed_from_u64(4);
    let grid = Arc::new(
        StructGrid::partitioned(&AABB::new(matrix![0, 15; 0, 15]), [2, 1], 1, 0)
            .with_periodic(vector![16, 16]),
    );
    let mut rt = StructMatrix::new(grid.clone(), standard_stencils::interpolation_2d())
        .with_domain_stride(vector![2, 2])
        .initialize()
        .unwrap();
    let mut a = StructMatrix::new(grid.clone(), standard_stencils::laplace_2d())
        .with_constant_entry(0, 4.0)
        .initialize()
        .unwrap();
    let mut p = StructMatrix::new(grid, standard_stencils::interpolation_2d());
    for (e, w) in standard_stencils::interpolation_2d_weights().iter().enumerate() {
        p = p.with_constant_entry(e, *w);
    }
    let mut p = p.with_domain_stride(vector![2, 2]).initialize().unwrap();
    randomize(&mut rt, &mut rng);
    randomize(&mut a, &mut rng);

    let mut ctx = sequential();
    let result = rtap(&mut ctx, &mut rt, &mut a, &mut p).unwrap();
    let checked = check_product(
        &result,
        &[(&rt, true), (&a, false), (&p, false)],
        vector![2, 2],
    );
    // every coupling of a periodic grid is checked
    assert_eq!(checked, 64 * result.stencil().size());
}

#[test]
fn matmat_2d_mixed() {
    let mut rng = StdRng::seed_from_u64(5);
    let grid = Arc::new(StructGrid::partitioned(
        &AABB::new(matrix![0, 9; 0, 11]),
        [3, 2],
        1,
        0,
    ));
    let mut a = StructMatrix::new(grid.clone(), standard_stencils::laplace_2d())
        .initialize()
        .unwrap();
    let mut b = StructMatrix::new(grid, standard_stencils::box_2d())
        .with_constant_entry(0, 0.25)
        .with_constant_entry(2, 0.25)
        .with_constant_entry(6, 0.25)
        .with_constant_entry(8, 0.25)
        .initialize()
        .unwrap();
    randomize(&mut a, &mut rng);
    randomize(&mut b, &mut rng);

    let mut ctx = parallel();
    let result = matmat(&mut ctx, &mut a, &mut b).unwrap();
    assert_eq!(result.stencil().size(), 21);
    check_product(&result, &[(&a, false), (&b, false)], vector![1, 1]);
}

#[test]
fn cube_with_constant_combinations() {
    let grid = line(19, 3);
    let mut b = StructMatrix::new(grid, standard_stencils::laplace_1d())
        .with_constant_entry(0, -1.0)
        .with_constant_entry(2, -1.0)
        .initialize()
        .unwrap();
    b.set_values(1, |p| 2.0 + 0.1 * p[0] as f64).unwrap();

    let mut ctx = sequential();
    let result = matmult(&mut ctx, vec![&mut b], &[0, 0, 0], &[false, false, false]).unwrap();
    // the outermost entries only combine constants
    let outer = result.stencil().entry_of(&vector![3]).unwrap();
    assert_eq!(result.constant_value(outer), Some(-1.0));
    check_product(&result, &[(&b, false), (&b, false), (&b, false)], vector![1]);
}

#[test]
fn interpolate_coarse_operator() {
    let mut rng = StdRng::seed_from_u64(6);
    let grid = line(29, 3);
    let mut p = StructMatrix::new(grid.clone(), standard_stencils::interpolation_1d())
        .with_domain_stride(vector![2])
        .initialize()
        .unwrap();
    let mut coarse = StructMatrix::new(grid, StructStencil::new(&[[-2], [0], [2]]))
        .with_range_stride(vector![2])
        .with_domain_stride(vector![2])
        .initialize()
        .unwrap();
    randomize(&mut p, &mut rng);
    randomize(&mut coarse, &mut rng);

    let mut ctx = sequential();
    let result = matmat(&mut ctx, &mut p, &mut coarse).unwrap();
    assert_eq!(result.range_stride(), &vector![1]);
    assert_eq!(result.domain_stride(), &vector![2]);
    assert_eq!(result.stencil().size(), 7);
    check_product(&result, &[(&p, false), (&coarse, false)], vector![1]);
}

#[test]
fn strategies_agree() {
    let mut rng = StdRng::seed_from_u64(7);
    let grid = square(23, [3, 2]);
    let mut a = StructMatrix::new(grid.clone(), standard_stencils::laplace_2d())
        .initialize()
        .unwrap();
    let mut b = StructMatrix::new(grid.clone(), standard_stencils::box_2d())
        .initialize()
        .unwrap();
    let mut c = StructMatrix::new(grid, standard_stencils::laplace_2d())
        .with_constant_entry(0, 4.0)
        .initialize()
        .unwrap();
    randomize(&mut a, &mut rng);
    randomize(&mut b, &mut rng);
    randomize(&mut c, &mut rng);

    let terms = [0, 1, 2];
    let transposes = [false, true, false];
    let first = matmult(
        &mut sequential(),
        vec![&mut a, &mut b, &mut c],
        &terms,
        &transposes,
    )
    .unwrap();
    let second = matmult(
        &mut parallel(),
        vec![&mut a, &mut b, &mut c],
        &terms,
        &transposes,
    )
    .unwrap();
    for local in 0..first.grid().num_local_boxes() {
        for e in first.variable_entries() {
            let x = first.box_values(local, e);
            let y = second.box_values(local, e);
            for (u, v) in x.iter().zip(y) {
                assert_approx_eq!(f64, *u, *v, epsilon = 1e-12);
            }
        }
    }
    check_product(&first, &[(&a, false), (&b, true), (&c, false)], vector![1, 1]);
}
