use crate::util::*;

pub fn real_buffer_size<const DIMENSION: usize>(
    exclusive_bound: &Coord<DIMENSION>,
) -> usize {
    let mut accumulator = 1;
    for d in exclusive_bound {
        accumulator *= (*d).max(0) as usize;
    }
    accumulator
}

pub fn coord_to_linear<const GRID_DIMENSION: usize>(
    coord: &Coord<GRID_DIMENSION>,
    exclusive_bounds: &Coord<GRID_DIMENSION>,
) -> usize {
    let mut accumulator = 0;
    for d in 0..GRID_DIMENSION {
        debug_assert!(coord[d] >= 0);
        debug_assert!(coord[d] < exclusive_bounds[d]);
        accumulator = accumulator * exclusive_bounds[d] as usize
            + coord[d] as usize;
    }
    accumulator
}

pub fn linear_to_coord<const GRID_DIMENSION: usize>(
    linear_index: usize,
    exclusive_bounds: &Coord<GRID_DIMENSION>,
) -> Coord<GRID_DIMENSION> {
    let mut result = Coord::zero();
    let mut index_accumulator = linear_index;
    for d in (0..GRID_DIMENSION).rev() {
        let extent = exclusive_bounds[d] as usize;
        result[d] = (index_accumulator % extent) as i32;
        index_accumulator /= extent;
    }
    result
}

/// Row major linear strides for a box of the given extents,
/// highest dimension moves fastest.
pub fn linear_strides<const GRID_DIMENSION: usize>(
    exclusive_bounds: &Coord<GRID_DIMENSION>,
) -> [usize; GRID_DIMENSION] {
    let mut result = [0; GRID_DIMENSION];
    let mut accumulator = 1;
    for d in (0..GRID_DIMENSION).rev() {
        result[d] = accumulator;
        accumulator *= exclusive_bounds[d].max(0) as usize;
    }
    result
}

#[inline]
pub fn div_floor(a: i32, b: i32) -> i32 {
    debug_assert!(b > 0);
    a.div_euclid(b)
}

#[inline]
pub fn div_ceil(a: i32, b: i32) -> i32 {
    debug_assert!(b > 0);
    -(-a).div_euclid(b)
}

/// Does `stride` divide `value` in every dimension.
pub fn divides<const GRID_DIMENSION: usize>(
    stride: &Coord<GRID_DIMENSION>,
    value: &Coord<GRID_DIMENSION>,
) -> bool {
    (0..GRID_DIMENSION).all(|d| value[d].rem_euclid(stride[d]) == 0)
}

/// Are two strides nested, i.e. one divides the other in every dimension.
pub fn nested<const GRID_DIMENSION: usize>(
    a: &Coord<GRID_DIMENSION>,
    b: &Coord<GRID_DIMENSION>,
) -> bool {
    (0..GRID_DIMENSION)
        .all(|d| a[d] % b[d] == 0 || b[d] % a[d] == 0)
}

pub fn elementwise_min<const GRID_DIMENSION: usize>(
    a: &Coord<GRID_DIMENSION>,
    b: &Coord<GRID_DIMENSION>,
) -> Coord<GRID_DIMENSION> {
    a.zip_map(b, |x, y| x.min(y))
}

pub fn elementwise_max<const GRID_DIMENSION: usize>(
    a: &Coord<GRID_DIMENSION>,
    b: &Coord<GRID_DIMENSION>,
) -> Coord<GRID_DIMENSION> {
    a.zip_map(b, |x, y| x.max(y))
}

/// Elementwise division that rounds toward negative infinity.
pub fn coord_div_floor<const GRID_DIMENSION: usize>(
    a: &Coord<GRID_DIMENSION>,
    stride: &Coord<GRID_DIMENSION>,
) -> Coord<GRID_DIMENSION> {
    a.zip_map(stride, div_floor)
}

pub fn coord_div_ceil<const GRID_DIMENSION: usize>(
    a: &Coord<GRID_DIMENSION>,
    stride: &Coord<GRID_DIMENSION>,
) -> Coord<GRID_DIMENSION> {
    a.zip_map(stride, div_ceil)
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn buffer_size_test() {
        assert_eq!(real_buffer_size(&vector![5]), 5);
        assert_eq!(real_buffer_size(&vector![5, 7, 9]), 5 * 7 * 9);
        assert_eq!(real_buffer_size(&vector![5, 0]), 0);
    }

    #[test]
    fn coord_to_linear_index_test() {
        {
            let index = vector![5, 7, 11];
            let bound = vector![20, 20, 20];
            assert_eq!(
                coord_to_linear(&index, &bound),
                5 * 20 * 20 + 7 * 20 + 11
            );
        }

        {
            let index = vector![5, 7];
            let bound = vector![20, 20];
            assert_eq!(coord_to_linear(&index, &bound), 5 * 20 + 7);
        }
    }

    #[test]
    fn linear_to_coord_test() {
        assert_eq!(linear_to_coord(67, &vector![10, 10]), vector![6, 7]);
        assert_eq!(linear_to_coord(67, &vector![100]), vector![67]);
        assert_eq!(
            linear_to_coord(0, &vector![10, 10, 8, 10]),
            vector![0, 0, 0, 0]
        );
    }

    #[test]
    fn linear_strides_test() {
        assert_eq!(linear_strides(&vector![4, 5, 6]), [30, 6, 1]);
        let bound = vector![3, 7];
        let strides = linear_strides(&bound);
        let c = vector![2, 4];
        assert_eq!(
            coord_to_linear(&c, &bound),
            2 * strides[0] + 4 * strides[1]
        );
    }

    #[test]
    fn rounding_test() {
        assert_eq!(div_floor(-3, 2), -2);
        assert_eq!(div_floor(3, 2), 1);
        assert_eq!(div_ceil(-3, 2), -1);
        assert_eq!(div_ceil(3, 2), 2);
        assert_eq!(div_ceil(4, 2), 2);
        assert_eq!(
            coord_div_floor(&vector![-1, 5], &vector![2, 2]),
            vector![-1, 2]
        );
    }

    #[test]
    fn divides_test() {
        assert!(divides(&vector![2, 1], &vector![-4, 3]));
        assert!(!divides(&vector![2, 2], &vector![-4, 3]));
        assert!(nested(&vector![2, 4], &vector![4, 2]));
        assert!(!nested(&vector![2, 3], &vector![4, 2]));
    }
}
