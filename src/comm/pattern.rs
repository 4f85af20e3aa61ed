use crate::grid::StructGrid;
use crate::matrix::DataBox;
use crate::util::*;

/// Offsets, in base index units, at which a field is read
/// relative to the points of a box. Determines the ghost layer width.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommStencil<const GRID_DIMENSION: usize> {
    shifts: Vec<Coord<GRID_DIMENSION>>,
}

impl<const GRID_DIMENSION: usize> CommStencil<GRID_DIMENSION> {
    pub fn new() -> Self {
        CommStencil { shifts: Vec::new() }
    }

    pub fn insert(&mut self, shift: Coord<GRID_DIMENSION>) {
        if !self.shifts.contains(&shift) {
            self.shifts.push(shift);
        }
    }

    pub fn shifts(&self) -> &[Coord<GRID_DIMENSION>] {
        &self.shifts
    }

    pub fn is_empty(&self) -> bool {
        self.shifts.is_empty()
    }

    /// Ghost width on the low and high side of each dimension.
    pub fn num_ghost(&self) -> Bounds<GRID_DIMENSION> {
        let mut result = Bounds::zero();
        for shift in &self.shifts {
            for d in 0..GRID_DIMENSION {
                result[(d, 0)] = result[(d, 0)].max(-shift[d]);
                result[(d, 1)] = result[(d, 1)].max(shift[d]);
            }
        }
        result
    }
}

/// Copy of the value owned by `source` box at `source_point`
/// into the ghost point `dest_point` of the `dest` box.
/// Boxes are positions in the grid's global box list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transfer<const GRID_DIMENSION: usize> {
    pub source: usize,
    pub source_point: Coord<GRID_DIMENSION>,
    pub dest: usize,
    pub dest_point: Coord<GRID_DIMENSION>,
}

/// Every ghost transfer needed to fill a field sampled with `stride`
/// and padded by `num_ghost` on every box of a grid.
/// Built identically on every rank, so the order of transfers
/// can serve as the message layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommPattern<const GRID_DIMENSION: usize> {
    transfers: Vec<Transfer<GRID_DIMENSION>>,
}

impl<const GRID_DIMENSION: usize> CommPattern<GRID_DIMENSION> {
    pub fn build(
        grid: &StructGrid<GRID_DIMENSION>,
        stride: &Coord<GRID_DIMENSION>,
        num_ghost: &Bounds<GRID_DIMENSION>,
    ) -> Self {
        profiling::scope!("CommPattern::build");
        let mut transfers = Vec::new();
        for (dest, grid_box) in grid.boxes().iter().enumerate() {
            let grown = DataBox::owned(&grid_box.aabb, stride).grow(num_ghost);
            for dest_point in grown.point_iter() {
                if grid_box.aabb.contains(&dest_point) {
                    continue;
                }
                if let Some(source) = grid.owner(&dest_point) {
                    transfers.push(Transfer {
                        source,
                        source_point: grid.canonical(&dest_point),
                        dest,
                        dest_point,
                    });
                }
            }
        }
        CommPattern { transfers }
    }

    pub fn transfers(&self) -> &[Transfer<GRID_DIMENSION>] {
        &self.transfers
    }

    pub fn len(&self) -> usize {
        self.transfers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transfers.is_empty()
    }
}
