use crate::util::indexing::*;
use crate::util::*;

/// Strided storage region: the lattice points `lo + i * stride`
/// for `0 <= i < counts`.
/// Values are laid out in linear ordering, highest dimension fastest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DataBox<const GRID_DIMENSION: usize> {
    lo: Coord<GRID_DIMENSION>,
    counts: Coord<GRID_DIMENSION>,
    stride: Coord<GRID_DIMENSION>,
}

impl<const GRID_DIMENSION: usize> DataBox<GRID_DIMENSION> {
    pub fn new(
        lo: Coord<GRID_DIMENSION>,
        counts: Coord<GRID_DIMENSION>,
        stride: Coord<GRID_DIMENSION>,
    ) -> Self {
        debug_assert!(divides(&stride, &lo));
        DataBox {
            lo,
            counts: counts.map(|c| c.max(0)),
            stride,
        }
    }

    /// Lattice points of `stride` inside `aabb`.
    pub fn owned(
        aabb: &AABB<GRID_DIMENSION>,
        stride: &Coord<GRID_DIMENSION>,
    ) -> Self {
        let lo = coord_div_ceil(&aabb.min(), stride);
        let hi = coord_div_floor(&aabb.max(), stride);
        DataBox::new(
            lo.component_mul(stride),
            (hi - lo).add_scalar(1),
            *stride,
        )
    }

    pub fn lo(&self) -> &Coord<GRID_DIMENSION> {
        &self.lo
    }

    pub fn counts(&self) -> &Coord<GRID_DIMENSION> {
        &self.counts
    }

    pub fn stride(&self) -> &Coord<GRID_DIMENSION> {
        &self.stride
    }

    /// Last lattice point, only meaningful for non empty boxes.
    pub fn hi(&self) -> Coord<GRID_DIMENSION> {
        self.lo + (self.counts.add_scalar(-1)).component_mul(&self.stride)
    }

    pub fn len(&self) -> usize {
        real_buffer_size(&self.counts)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Extend by at least `num_ghost` base index units on each side,
    /// rounded out to whole lattice steps.
    pub fn grow(&self, num_ghost: &Bounds<GRID_DIMENSION>) -> Self {
        let mut lo = self.lo;
        let mut counts = self.counts;
        for d in 0..GRID_DIMENSION {
            let below = div_ceil(num_ghost[(d, 0)].max(0), self.stride[d]);
            let above = div_ceil(num_ghost[(d, 1)].max(0), self.stride[d]);
            lo[d] -= below * self.stride[d];
            counts[d] += below + above;
        }
        DataBox::new(lo, counts, self.stride)
    }

    /// Smallest box on the same lattice holding both instances.
    pub fn union(&self, other: &Self) -> Self {
        debug_assert_eq!(self.stride, other.stride);
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let lo = elementwise_min(&self.lo, &other.lo);
        let hi = elementwise_max(&self.hi(), &other.hi());
        let counts = (hi - lo).component_div(&self.stride).add_scalar(1);
        DataBox::new(lo, counts, self.stride)
    }

    pub fn contains(&self, coord: &Coord<GRID_DIMENSION>) -> bool {
        for d in 0..GRID_DIMENSION {
            let rel = coord[d] - self.lo[d];
            if rel < 0 || rel % self.stride[d] != 0 {
                return false;
            }
            if rel / self.stride[d] >= self.counts[d] {
                return false;
            }
        }
        true
    }

    pub fn contains_box(&self, other: &Self) -> bool {
        other.is_empty()
            || (self.contains(&other.lo) && self.contains(&other.hi()))
    }

    /// Linear index of a lattice point inside the box.
    pub fn index(&self, coord: &Coord<GRID_DIMENSION>) -> usize {
        debug_assert!(self.contains(coord), "{:?} outside {:?}", coord, self);
        let rel = (coord - self.lo).component_div(&self.stride);
        coord_to_linear(&rel, &self.counts)
    }

    pub fn point(&self, index: usize) -> Coord<GRID_DIMENSION> {
        self.lo
            + linear_to_coord(index, &self.counts).component_mul(&self.stride)
    }

    /// Change in linear index for one lattice step along each dimension.
    pub fn linear_strides(&self) -> [usize; GRID_DIMENSION] {
        linear_strides(&self.counts)
    }

    /// Change in linear index for a shift in base index units,
    /// the shift must lie on the lattice.
    pub fn linear_offset(&self, shift: &Coord<GRID_DIMENSION>) -> isize {
        debug_assert!(divides(&self.stride, shift));
        let strides = self.linear_strides();
        let mut result = 0;
        for d in 0..GRID_DIMENSION {
            result += (shift[d] / self.stride[d]) as isize * strides[d] as isize;
        }
        result
    }

    /// Iterate lattice points in linear ordering.
    pub fn point_iter(
        &self,
    ) -> impl Iterator<Item = Coord<GRID_DIMENSION>> + '_ {
        (0..self.len()).map(|i| self.point(i))
    }
}

/// One `DataBox` per local grid box.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSpace<const GRID_DIMENSION: usize> {
    pub boxes: Vec<DataBox<GRID_DIMENSION>>,
}

impl<const GRID_DIMENSION: usize> DataSpace<GRID_DIMENSION> {
    pub fn new(boxes: Vec<DataBox<GRID_DIMENSION>>) -> Self {
        DataSpace { boxes }
    }

    /// Box wise union, used to merge the needs of several matrices.
    pub fn grow_by(&mut self, other: &Self) {
        debug_assert_eq!(self.boxes.len(), other.boxes.len());
        for (a, b) in self.boxes.iter_mut().zip(other.boxes.iter()) {
            *a = a.union(b);
        }
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn owned_test() {
        {
            let b = DataBox::owned(&AABB::new(matrix![1, 8]), &vector![2]);
            assert_eq!(b.lo(), &vector![2]);
            assert_eq!(b.counts(), &vector![4]);
            assert_eq!(b.hi(), vector![8]);
        }

        {
            let b = DataBox::owned(&AABB::new(matrix![5, 5]), &vector![2]);
            assert!(b.is_empty());
        }

        {
            let b =
                DataBox::owned(&AABB::new(matrix![0, 4; -3, 3]), &vector![1, 3]);
            assert_eq!(b.lo(), &vector![0, -3]);
            assert_eq!(b.counts(), &vector![5, 3]);
            assert_eq!(b.len(), 15);
        }
    }

    #[test]
    fn grow_rounds_to_lattice() {
        let b = DataBox::owned(&AABB::new(matrix![0, 6]), &vector![2]);
        let g = b.grow(&matrix![1, 3]);
        assert_eq!(g.lo(), &vector![-2]);
        assert_eq!(g.hi(), vector![10]);
        assert!(g.contains_box(&b));
    }

    #[test]
    fn union_test() {
        let a = DataBox::owned(&AABB::new(matrix![0, 3; 0, 3]), &vector![1, 1]);
        let b = a.grow(&matrix![1, 0; 0, 2]);
        let c = a.grow(&matrix![0, 1; 0, 0]);
        let u = b.union(&c);
        assert_eq!(u.lo(), &vector![-1, 0]);
        assert_eq!(u.hi(), vector![4, 5]);
        let empty = DataBox::owned(&AABB::new(matrix![5, 5; 5, 5]), &vector![2, 2]);
        assert!(empty.is_empty());
    }

    #[test]
    fn index_test() {
        let b = DataBox::owned(&AABB::new(matrix![-2, 4; 0, 4]), &vector![2, 2]);
        assert_eq!(b.counts(), &vector![4, 3]);
        assert_eq!(b.index(&vector![-2, 0]), 0);
        assert_eq!(b.index(&vector![0, 2]), 4);
        assert_eq!(b.point(4), vector![0, 2]);
        assert!(!b.contains(&vector![1, 2]));
        assert_eq!(
            b.linear_offset(&vector![2, -2]) + b.index(&vector![0, 2]) as isize,
            b.index(&vector![2, 0]) as isize
        );
        let points: Vec<_> = b.point_iter().collect();
        assert_eq!(points.len(), 12);
        assert_eq!(points[11], vector![4, 4]);
    }

    #[test]
    fn space_grow_by() {
        let a = DataBox::owned(&AABB::new(matrix![0, 3]), &vector![1]);
        let mut space = DataSpace::new(vec![a]);
        let other = DataSpace::new(vec![a.grow(&matrix![2, 1])]);
        space.grow_by(&other);
        assert_eq!(space.boxes[0].lo(), &vector![-2]);
        assert_eq!(space.boxes[0].counts(), &vector![7]);
        assert_eq!(space.len(), 1);
    }
}
