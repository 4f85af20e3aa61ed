use crate::util::*;

/// Ordered list of offsets a structured matrix couples to.
/// Entry `i` of a matrix couples row `x` to column `x + offsets[i]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructStencil<const GRID_DIMENSION: usize> {
    offsets: Vec<Coord<GRID_DIMENSION>>,
}

impl<const GRID_DIMENSION: usize> StructStencil<GRID_DIMENSION> {
    pub fn new(offsets: &[[i32; GRID_DIMENSION]]) -> Self {
        StructStencil {
            offsets: offsets
                .iter()
                .map(|o| Coord::from_column_slice(o))
                .collect(),
        }
    }

    pub fn from_offsets(offsets: Vec<Coord<GRID_DIMENSION>>) -> Self {
        debug_assert!(
            offsets
                .iter()
                .enumerate()
                .all(|(i, o)| !offsets[..i].contains(o)),
            "duplicate stencil offsets"
        );
        StructStencil { offsets }
    }

    pub fn offsets(&self) -> &[Coord<GRID_DIMENSION>] {
        &self.offsets
    }

    pub fn offset(&self, entry: usize) -> &Coord<GRID_DIMENSION> {
        &self.offsets[entry]
    }

    pub fn size(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Index of the entry with the given offset.
    pub fn entry_of(&self, offset: &Coord<GRID_DIMENSION>) -> Option<usize> {
        self.offsets.iter().position(|o| o == offset)
    }

    /// Furthest reach of the stencil on each side of each dimension,
    /// column 0 for the negative direction.
    pub fn slopes(&self) -> Bounds<GRID_DIMENSION> {
        let mut result = Bounds::zero();
        for neighbor in &self.offsets {
            for d in 0..GRID_DIMENSION {
                let neighbor_d = neighbor[d];
                if neighbor_d > 0 {
                    result[(d, 1)] = result[(d, 1)].max(neighbor_d);
                } else {
                    result[(d, 0)] = result[(d, 0)].max(-neighbor_d);
                }
            }
        }
        result
    }
}
