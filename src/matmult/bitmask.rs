use crate::comm::GhostField;
use crate::error::MatrixError;
use crate::grid::StructGrid;
use crate::matrix::{allocate, DataBox};
use crate::util::indexing::*;
use crate::util::*;

/// Per point validity of every term with constant factors.
/// Bit `t` of a point is set when it lies on the domain lattice of term `t`
/// and is owned by some box. Ghost points are filled by exchange,
/// points outside the grid keep a zero word.
#[derive(Debug, Clone, PartialEq)]
pub struct BitMask<const GRID_DIMENSION: usize> {
    boxes: Vec<(DataBox<GRID_DIMENSION>, Vec<u32>)>,
}

impl<const GRID_DIMENSION: usize> BitMask<GRID_DIMENSION> {
    pub fn build(
        grid: &StructGrid<GRID_DIMENSION>,
        stride: &Coord<GRID_DIMENSION>,
        num_ghost: &Bounds<GRID_DIMENSION>,
        bits: &[(u32, Coord<GRID_DIMENSION>)],
    ) -> Result<Self, MatrixError> {
        profiling::scope!("BitMask::build");
        let boxes = grid
            .local_boxes()
            .map(|b| {
                let owned = DataBox::owned(&b.aabb, stride);
                let data_box = owned.grow(num_ghost);
                let mut words: Vec<u32> = allocate(data_box.len())?;
                for p in owned.point_iter() {
                    let mut word = 0u32;
                    for (bit, lattice) in bits {
                        if divides(lattice, &p) {
                            word |= 1 << bit;
                        }
                    }
                    words[data_box.index(&p)] = word;
                }
                Ok::<_, MatrixError>((data_box, words))
            })
            .collect::<Result<Vec<_>, MatrixError>>()?;
        Ok(BitMask { boxes })
    }

    pub fn words(&self, local_box: usize) -> &[u32] {
        &self.boxes[local_box].1
    }

    pub fn word(&self, local_box: usize, point: &Coord<GRID_DIMENSION>) -> u32 {
        let (data_box, words) = &self.boxes[local_box];
        words[data_box.index(point)]
    }

    pub fn is_set(
        &self,
        local_box: usize,
        point: &Coord<GRID_DIMENSION>,
        bit: u32,
    ) -> bool {
        (self.word(local_box, point) >> bit) & 1 == 1
    }
}

impl<const GRID_DIMENSION: usize> GhostField<GRID_DIMENSION>
    for BitMask<GRID_DIMENSION>
{
    fn components(&self) -> usize {
        1
    }

    fn data_box(&self, local_box: usize) -> &DataBox<GRID_DIMENSION> {
        &self.boxes[local_box].0
    }

    fn pack(&self, local_box: usize, index: usize, buffer: &mut Vec<f64>) {
        // u32 is exact in f64
        buffer.push(self.boxes[local_box].1[index] as f64);
    }

    fn unpack(&mut self, local_box: usize, index: usize, values: &[f64]) {
        if let Some(v) = values.first() {
            self.boxes[local_box].1[index] = *v as u32;
        }
    }
}
