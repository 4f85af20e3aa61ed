use crate::stencil::*;

/// Single entry at the origin, the shape of a diagonal matrix.
pub fn center<const GRID_DIMENSION: usize>() -> StructStencil<GRID_DIMENSION> {
    StructStencil::new(&[[0; GRID_DIMENSION]])
}

pub fn laplace_1d() -> StructStencil<1> {
    StructStencil::new(&[[-1], [0], [1]])
}

pub fn laplace_2d() -> StructStencil<2> {
    StructStencil::new(&[[0, 0], [-1, 0], [1, 0], [0, -1], [0, 1]])
}

pub fn box_2d() -> StructStencil<2> {
    StructStencil::new(&[
        [-1, -1],
        [-1, 0],
        [-1, 1],
        [0, -1],
        [0, 0],
        [0, 1],
        [1, -1],
        [1, 0],
        [1, 1],
    ])
}

/// Linear interpolation from a 2:1 coarse lattice.
/// Stored by coarse column, entry `s` couples fine row `col - s`.
pub fn interpolation_1d() -> StructStencil<1> {
    StructStencil::new(&[[-1], [0], [1]])
}

/// Bilinear interpolation from a 2:1 coarse lattice in both dimensions.
pub fn interpolation_2d() -> StructStencil<2> {
    box_2d()
}

/// Weights matching `interpolation_1d`.
pub const INTERPOLATION_1D_WEIGHTS: [f64; 3] = [0.5, 1.0, 0.5];

/// Weights matching `laplace_1d`.
pub const LAPLACE_1D_WEIGHTS: [f64; 3] = [-1.0, 2.0, -1.0];

/// Weights matching `laplace_2d`.
pub const LAPLACE_2D_WEIGHTS: [f64; 5] = [4.0, -1.0, -1.0, -1.0, -1.0];

/// Bilinear interpolation weights matching `interpolation_2d`.
pub fn interpolation_2d_weights() -> [f64; 9] {
    let mut result = [0.0; 9];
    for (i, o) in interpolation_2d().offsets().iter().enumerate() {
        result[i] = 1.0 / ((1 << (o[0].abs() + o[1].abs())) as f64);
    }
    result
}
