use crate::matrix::StructMatrix;
use crate::util::*;

fn element<const GRID_DIMENSION: usize>(
    matrix: &StructMatrix<GRID_DIMENSION>,
    transpose: bool,
    row: &Coord<GRID_DIMENSION>,
    col: &Coord<GRID_DIMENSION>,
) -> Option<f64> {
    if transpose {
        matrix.coupling(col, row)
    } else {
        matrix.coupling(row, col)
    }
}

/// Element `(row, col)` of the product of `factors`, each a matrix and
/// whether it is transposed, by summing over every path of stencil offsets.
/// Slow, meant as a reference for the product engine.
/// `None` when a coefficient on the way is stored on another rank.
pub fn naive_product_coupling<const GRID_DIMENSION: usize>(
    factors: &[(&StructMatrix<GRID_DIMENSION>, bool)],
    row: &Coord<GRID_DIMENSION>,
    col: &Coord<GRID_DIMENSION>,
) -> Option<f64> {
    match factors {
        [] => Some(if row == col { 1.0 } else { 0.0 }),
        [(matrix, transpose)] => element(matrix, *transpose, row, col),
        [(matrix, transpose), rest @ ..] => {
            let mut sum = 0.0;
            for offset in matrix.stencil().offsets() {
                let next = if *transpose { row - offset } else { row + offset };
                let a = element(matrix, *transpose, row, &next)?;
                if a == 0.0 {
                    continue;
                }
                sum += a * naive_product_coupling(rest, &next, col)?;
            }
            Some(sum)
        }
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;
    use crate::grid::StructGrid;
    use crate::stencil::standard_stencils;
    use float_cmp::assert_approx_eq;
    use std::sync::Arc;

    #[test]
    fn interpolation_galerkin() {
        let grid = Arc::new(StructGrid::new(vec![AABB::new(matrix![0, 8])]));
        let weights = standard_stencils::INTERPOLATION_1D_WEIGHTS;
        let p = StructMatrix::new(grid.clone(), standard_stencils::interpolation_1d())
            .with_domain_stride(vector![2])
            .with_constant_entry(0, weights[0])
            .with_constant_entry(1, weights[1])
            .with_constant_entry(2, weights[2])
            .initialize()
            .unwrap();
        let a = StructMatrix::new(grid, standard_stencils::laplace_1d())
            .with_constant_entry(0, -1.0)
            .with_constant_entry(1, 2.0)
            .with_constant_entry(2, -1.0)
            .initialize()
            .unwrap();
        let factors = [(&p, true), (&a, false), (&p, false)];
        // interior rows of P^T A P are 1/2 [-1 2 -1]
        let at = |r, c| naive_product_coupling(&factors, &vector![r], &vector![c]).unwrap();
        assert_approx_eq!(f64, at(4, 4), 1.0);
        assert_approx_eq!(f64, at(4, 2), -0.5);
        assert_approx_eq!(f64, at(4, 6), -0.5);
        assert_approx_eq!(f64, at(4, 8), 0.0);
        assert_approx_eq!(f64, at(4, 5), 0.0);
    }

    #[test]
    fn identity_chain() {
        let grid = Arc::new(StructGrid::new(vec![AABB::new(matrix![0, 3])]));
        let two = StructMatrix::new(grid.clone(), standard_stencils::center())
            .with_constant_entry(0, 2.0)
            .initialize()
            .unwrap();
        let three = StructMatrix::new(grid, standard_stencils::center())
            .with_constant_entry(0, 3.0)
            .initialize()
            .unwrap();
        let factors = [(&two, false), (&three, false)];
        let v = naive_product_coupling(&factors, &vector![1], &vector![1]).unwrap();
        assert_approx_eq!(f64, v, 6.0);
        assert_eq!(naive_product_coupling::<1>(&[], &vector![1], &vector![2]), Some(0.0));
    }
}
