//! Box decomposed structured grids.
//!
//! Every rank keeps the full list of boxes so that exchange patterns can be
//! derived locally and agree between ranks without extra communication.
use crate::decomposition;
use crate::util::*;

/// One box of the decomposition.
/// `id` is the position of the box in the grid it was first created on
/// and survives coarsening, so matching boxes can be found across levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GridBox<const GRID_DIMENSION: usize> {
    pub id: usize,
    pub rank: usize,
    pub aabb: AABB<GRID_DIMENSION>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructGrid<const GRID_DIMENSION: usize> {
    boxes: Vec<GridBox<GRID_DIMENSION>>,
    /// Period per dimension, zero when not periodic.
    /// Periodic dimensions cover `[0, period)`.
    periodic: Coord<GRID_DIMENSION>,
    rank: usize,
    n_ranks: usize,
    local: Vec<usize>,
}

impl<const GRID_DIMENSION: usize> StructGrid<GRID_DIMENSION> {
    /// Single rank grid owning every box.
    pub fn new(aabbs: Vec<AABB<GRID_DIMENSION>>) -> Self {
        let boxes = aabbs
            .into_iter()
            .enumerate()
            .map(|(id, aabb)| GridBox { id, rank: 0, aabb })
            .collect();
        Self::from_boxes(boxes, Coord::zero(), 0, 1)
    }

    /// Decompose `domain` into `parts` blocks dealt to `n_ranks` ranks,
    /// as seen from `rank`.
    pub fn partitioned(
        domain: &AABB<GRID_DIMENSION>,
        parts: [usize; GRID_DIMENSION],
        n_ranks: usize,
        rank: usize,
    ) -> Self {
        let aabbs = decomposition::partition(domain, parts);
        let ranks = decomposition::assign_ranks(aabbs.len(), n_ranks);
        let boxes = aabbs
            .into_iter()
            .zip(ranks)
            .enumerate()
            .map(|(id, (aabb, rank))| GridBox { id, rank, aabb })
            .collect();
        Self::from_boxes(boxes, Coord::zero(), rank, n_ranks)
    }

    fn from_boxes(
        boxes: Vec<GridBox<GRID_DIMENSION>>,
        periodic: Coord<GRID_DIMENSION>,
        rank: usize,
        n_ranks: usize,
    ) -> Self {
        debug_assert!(rank < n_ranks);
        let local = boxes
            .iter()
            .enumerate()
            .filter(|(_, b)| b.rank == rank)
            .map(|(i, _)| i)
            .collect();
        StructGrid {
            boxes,
            periodic,
            rank,
            n_ranks,
            local,
        }
    }

    pub fn with_periodic(mut self, periodic: Coord<GRID_DIMENSION>) -> Self {
        debug_assert!(periodic.iter().all(|p| *p >= 0));
        self.periodic = periodic;
        self
    }

    pub fn boxes(&self) -> &[GridBox<GRID_DIMENSION>] {
        &self.boxes
    }

    pub fn periodic(&self) -> &Coord<GRID_DIMENSION> {
        &self.periodic
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn n_ranks(&self) -> usize {
        self.n_ranks
    }

    /// Positions in `boxes()` of the boxes owned by this rank.
    pub fn local_positions(&self) -> &[usize] {
        &self.local
    }

    pub fn local_boxes(
        &self,
    ) -> impl Iterator<Item = &GridBox<GRID_DIMENSION>> + '_ {
        self.local.iter().map(|i| &self.boxes[*i])
    }

    pub fn num_local_boxes(&self) -> usize {
        self.local.len()
    }

    pub fn local_box(&self, local_index: usize) -> &GridBox<GRID_DIMENSION> {
        &self.boxes[self.local[local_index]]
    }

    /// Local storage index of the box at `position` in `boxes()`,
    /// `None` when another rank owns it.
    pub fn local_index(&self, position: usize) -> Option<usize> {
        self.local.binary_search(&position).ok()
    }

    /// Local storage index of the box carrying `id`.
    pub fn local_index_of_id(&self, id: usize) -> Option<usize> {
        self.local
            .iter()
            .position(|position| self.boxes[*position].id == id)
    }

    /// Wrap a coordinate into the fundamental period.
    pub fn canonical(
        &self,
        coord: &Coord<GRID_DIMENSION>,
    ) -> Coord<GRID_DIMENSION> {
        let mut result = *coord;
        for d in 0..GRID_DIMENSION {
            if self.periodic[d] > 0 {
                result[d] = coord[d].rem_euclid(self.periodic[d]);
            }
        }
        result
    }

    /// Position in `boxes()` of the box owning `coord`,
    /// accounting for periodicity.
    pub fn owner(&self, coord: &Coord<GRID_DIMENSION>) -> Option<usize> {
        let c = self.canonical(coord);
        self.boxes.iter().position(|b| b.aabb.contains(&c))
    }

    pub fn contains(&self, coord: &Coord<GRID_DIMENSION>) -> bool {
        self.owner(coord).is_some()
    }

    /// Grid sampled by `stride`: boxes keep their id and rank,
    /// boxes holding no sampled point are dropped, periods shrink accordingly.
    pub fn coarsen(&self, stride: &Coord<GRID_DIMENSION>) -> Self {
        let boxes = self
            .boxes
            .iter()
            .filter_map(|b| {
                b.aabb.coarsen(stride).map(|aabb| GridBox {
                    id: b.id,
                    rank: b.rank,
                    aabb,
                })
            })
            .collect();
        let periodic = self.periodic.component_div(stride);
        Self::from_boxes(boxes, periodic, self.rank, self.n_ranks)
    }

    /// Hull of every box, `None` for an empty grid.
    pub fn bounding_box(&self) -> Option<AABB<GRID_DIMENSION>> {
        let mut iter = self.boxes.iter();
        let first = iter.next()?.aabb;
        Some(iter.fold(first, |acc, b| acc.union(&b.aabb)))
    }
}
