use crate::util::indexing::*;
use crate::util::*;

/// Axis Aligned Bounding Box (AABB) for coordinate types.
/// Each instance is inclusive of both corners.
/// Grid boxes, coarsened boxes and ghost regions are all AABBs,
/// the strided storage built on top of them lives in `matrix::DataBox`.
#[derive(Hash, Debug, Copy, Clone, Eq, PartialEq)]
pub struct AABB<const DIMENSION: usize> {
    pub bounds: Bounds<DIMENSION>,
}

impl<const GRID_DIMENSION: usize> std::fmt::Display for AABB<GRID_DIMENSION> {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> Result<(), std::fmt::Error> {
        write!(f, "[")?;
        for d in 0..GRID_DIMENSION {
            if d > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}..={}", self.bounds[(d, 0)], self.bounds[(d, 1)])?;
        }
        write!(f, "]")
    }
}

impl<const DIMENSION: usize> AABB<DIMENSION> {
    /// Create AABB from raw bounds.
    #[inline]
    pub fn new(bounds: Bounds<DIMENSION>) -> Self {
        AABB { bounds }
    }

    /// Create AABB from corners.
    pub fn from_mm(min: Coord<DIMENSION>, max: Coord<DIMENSION>) -> Self {
        let result = AABB {
            bounds: Bounds::from_columns(&[min, max]),
        };
        debug_assert!(result.check_validity());
        result
    }

    /// Moving min to the origin, returns the exclusive size in each direction
    /// i.e. [0, 9]  would have exclusive size of 10.
    pub fn exclusive_bounds(&self) -> Coord<DIMENSION> {
        (self.bounds.column(1) - self.bounds.column(0)).add_scalar(1)
    }

    /// Return the number of coordinates contained in the instance.
    #[inline]
    pub fn buffer_size(&self) -> usize {
        real_buffer_size(&self.exclusive_bounds())
    }

    /// Return the coordinate in the instance for a given linear index.
    pub fn linear_to_coord(&self, index: usize) -> Coord<DIMENSION> {
        linear_to_coord(index, &self.exclusive_bounds()) + self.min()
    }

    /// Check whether the instance contains a coordinate.
    pub fn contains(&self, coord: &Coord<DIMENSION>) -> bool {
        for d in 0..DIMENSION {
            if coord[d] < self.bounds[(d, 0)] || coord[d] > self.bounds[(d, 1)]
            {
                return false;
            }
        }
        true
    }

    /// Smallest box containing both instances.
    pub fn union(&self, other: &Self) -> Self {
        let mut result = *self;
        for d in 0..DIMENSION {
            result.bounds[(d, 0)] = self.bounds[(d, 0)].min(other.bounds[(d, 0)]);
            result.bounds[(d, 1)] = self.bounds[(d, 1)].max(other.bounds[(d, 1)]);
        }
        result
    }

    /// Grow each side by the matching slope,
    /// column 0 extends the low side and column 1 the high side.
    pub fn grow(&self, slopes: &Bounds<DIMENSION>) -> Self {
        let mut result = *self;
        result.bounds.set_column(0, &(self.min() - slopes.column(0)));
        result.bounds.set_column(1, &(self.max() + slopes.column(1)));
        result
    }

    /// Map the box into the index space sampled by `stride`.
    /// A coarse index `c` lies in the result iff `stride * c` lies in the box.
    /// Returns `None` when the box holds no such point.
    pub fn coarsen(&self, stride: &Coord<DIMENSION>) -> Option<Self> {
        let result = AABB {
            bounds: Bounds::from_columns(&[
                coord_div_ceil(&self.min(), stride),
                coord_div_floor(&self.max(), stride),
            ]),
        };
        if result.check_validity() {
            Some(result)
        } else {
            None
        }
    }

    /// Return min corner.
    pub fn min(&self) -> Coord<DIMENSION> {
        self.bounds.column(0).into()
    }

    /// Return max corner
    pub fn max(&self) -> Coord<DIMENSION> {
        self.bounds.column(1).into()
    }

    /// Check that max >= min
    pub fn check_validity(&self) -> bool {
        for d in 0..DIMENSION {
            if self.bounds[(d, 0)] > self.bounds[(d, 1)] {
                return false;
            }
        }
        true
    }

    /// Return iterator over contained coords
    /// in linear ordering.
    #[allow(clippy::needless_lifetimes)]
    pub fn coord_iter<'a>(
        &'a self,
    ) -> impl Iterator<Item = Coord<DIMENSION>> + use<'a, DIMENSION> {
        (0..self.buffer_size()).map(|i| self.linear_to_coord(i))
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn buffer_size_test() {
        {
            let a = AABB::new(matrix![0, 5]);
            assert_eq!(a.buffer_size(), 6);
        }

        {
            let dimensions = AABB::new(matrix![1, 6; 1, 8; 1, 10]);
            assert_eq!(dimensions.buffer_size(), 6 * 8 * 10);
        }
    }

    #[test]
    fn linear_to_coord_in_box_test() {
        let bb = AABB::new(matrix![0, 9; 0, 9; 0, 9]);
        assert_eq!(bb.linear_to_coord(5 * 100 + 5 * 10 + 5), vector![5, 5, 5]);

        let bound = AABB::new(matrix![-2, 9; 3, 9]);
        assert_eq!(bound.linear_to_coord(0), vector![-2, 3]);
        assert_eq!(bound.linear_to_coord(bound.buffer_size() - 1), vector![9, 9]);
    }

    #[test]
    fn union_test() {
        let a = AABB::new(matrix![0, 5; 0, 5]);
        let b = AABB::new(matrix![3, 8; -2, 1]);
        assert_eq!(a.union(&b), AABB::new(matrix![0, 8; -2, 5]));
    }

    #[test]
    fn grow_test() {
        let a = AABB::new(matrix![0, 5; 2, 3]);
        assert_eq!(a.grow(&matrix![1, 2; 0, 3]), AABB::new(matrix![-1, 7; 2, 6]));
    }

    #[test]
    fn coarsen_test() {
        {
            let a = AABB::new(matrix![0, 7]);
            assert_eq!(a.coarsen(&vector![2]), Some(AABB::new(matrix![0, 3])));
        }

        {
            let a = AABB::new(matrix![1, 8; 0, 5]);
            assert_eq!(
                a.coarsen(&vector![2, 1]),
                Some(AABB::new(matrix![1, 4; 0, 5]))
            );
        }

        {
            let a = AABB::new(matrix![-3, -1]);
            assert_eq!(a.coarsen(&vector![2]), Some(AABB::new(matrix![-1, -1])));
        }

        {
            let a = AABB::new(matrix![5, 5]);
            assert_eq!(a.coarsen(&vector![2]), None);
        }
    }

    #[test]
    fn coord_iter_test() {
        let a = AABB::new(matrix![0, 1; 4, 5]);
        let coords: Vec<_> = a.coord_iter().collect();
        assert_eq!(
            coords,
            vec![vector![0, 4], vector![0, 5], vector![1, 4], vector![1, 5]]
        );
    }

    #[test]
    fn display_test() {
        let a = AABB::new(matrix![0, 1; -4, 5]);
        assert_eq!(format!("{}", a), "[0..=1, -4..=5]");
    }
}
