//! Structured grid matrices.
//!
//! A matrix couples rows sampled with `range_stride` to columns sampled with
//! `domain_stride`, both in the index space of its grid. Per dimension one of
//! the two strides divides the other, and the coefficient of entry `s` is
//! stored at an anchor point on the coarser of the two lattices: the row when
//! the range is at least as coarse as the domain, the column otherwise.
use crate::comm::GhostField;
use crate::error::{coord_string, MatrixError};
use crate::grid::StructGrid;
use crate::stencil::StructStencil;
use crate::util::indexing::*;
use crate::util::*;
use std::sync::Arc;

mod data_space;
pub use data_space::*;

/// Storage for one local box, `values[entry]` is empty for constant entries.
#[derive(Debug, Clone, PartialEq)]
pub struct BoxData<const GRID_DIMENSION: usize> {
    pub data_box: DataBox<GRID_DIMENSION>,
    pub values: Vec<Vec<f64>>,
}

#[derive(Debug, Clone)]
pub struct StructMatrix<const GRID_DIMENSION: usize> {
    grid: Arc<StructGrid<GRID_DIMENSION>>,
    stencil: StructStencil<GRID_DIMENSION>,
    range_stride: Coord<GRID_DIMENSION>,
    domain_stride: Coord<GRID_DIMENSION>,
    constants: Vec<Option<f64>>,
    num_ghost: Bounds<GRID_DIMENSION>,
    boxes: Vec<BoxData<GRID_DIMENSION>>,
    saved: Option<Vec<BoxData<GRID_DIMENSION>>>,
}

/// Zeroed storage of `n` values, failing instead of aborting when the
/// reservation cannot be made.
pub(crate) fn allocate<T: Clone + Default>(n: usize) -> Result<Vec<T>, MatrixError> {
    let mut result = Vec::new();
    result
        .try_reserve_exact(n)
        .map_err(|_| MatrixError::Allocation(n))?;
    result.resize(n, T::default());
    Ok(result)
}

impl<const GRID_DIMENSION: usize> StructMatrix<GRID_DIMENSION> {
    /// Square matrix with unit strides and every entry variable.
    /// Call `initialize` before use.
    pub fn new(
        grid: Arc<StructGrid<GRID_DIMENSION>>,
        stencil: StructStencil<GRID_DIMENSION>,
    ) -> Self {
        let constants = vec![None; stencil.size()];
        StructMatrix {
            grid,
            stencil,
            range_stride: Coord::from_element(1),
            domain_stride: Coord::from_element(1),
            constants,
            num_ghost: Bounds::zero(),
            boxes: Vec::new(),
            saved: None,
        }
    }

    pub fn with_range_stride(mut self, stride: Coord<GRID_DIMENSION>) -> Self {
        self.range_stride = stride;
        self
    }

    pub fn with_domain_stride(mut self, stride: Coord<GRID_DIMENSION>) -> Self {
        self.domain_stride = stride;
        self
    }

    pub fn with_num_ghost(mut self, num_ghost: Bounds<GRID_DIMENSION>) -> Self {
        self.num_ghost = num_ghost;
        self
    }

    /// Store `entry` as a single scalar shared by every point.
    pub fn with_constant_entry(mut self, entry: usize, value: f64) -> Self {
        if entry >= self.constants.len() {
            self.constants.resize(entry + 1, None);
        }
        self.constants[entry] = Some(value);
        self
    }

    /// Validate strides and offsets, then allocate zeroed storage
    /// for every variable entry on every local box.
    pub fn initialize(mut self) -> Result<Self, MatrixError> {
        if self.constants.len() > self.stencil.size() {
            return Err(MatrixError::EntryOutOfRange(self.constants.len() - 1));
        }
        let r = self.range_stride;
        let d = self.domain_stride;
        if r.iter().chain(d.iter()).any(|s| *s <= 0) || !nested(&r, &d) {
            return Err(MatrixError::InvalidStride {
                range: coord_string(&r),
                domain: coord_string(&d),
            });
        }
        let fine = elementwise_min(&r, &d);
        for offset in self.stencil.offsets() {
            if !divides(&fine, offset) {
                return Err(MatrixError::InvalidOffset {
                    offset: coord_string(offset),
                    stride: coord_string(&fine),
                });
            }
        }

        let mut boxes = Vec::with_capacity(self.grid.num_local_boxes());
        for local in 0..self.grid.num_local_boxes() {
            let data_box = self.owned_box(local).grow(&self.num_ghost);
            let mut values = Vec::with_capacity(self.stencil.size());
            for entry in 0..self.stencil.size() {
                if self.is_constant(entry) {
                    values.push(Vec::new());
                } else {
                    values.push(allocate(data_box.len())?);
                }
            }
            boxes.push(BoxData { data_box, values });
        }
        self.boxes = boxes;
        Ok(self)
    }

    pub fn grid(&self) -> &Arc<StructGrid<GRID_DIMENSION>> {
        &self.grid
    }

    pub fn stencil(&self) -> &StructStencil<GRID_DIMENSION> {
        &self.stencil
    }

    pub fn range_stride(&self) -> &Coord<GRID_DIMENSION> {
        &self.range_stride
    }

    pub fn domain_stride(&self) -> &Coord<GRID_DIMENSION> {
        &self.domain_stride
    }

    /// Lattice the coefficients are stored on.
    pub fn data_stride(&self) -> Coord<GRID_DIMENSION> {
        elementwise_max(&self.range_stride, &self.domain_stride)
    }

    pub fn num_ghost(&self) -> &Bounds<GRID_DIMENSION> {
        &self.num_ghost
    }

    pub fn is_constant(&self, entry: usize) -> bool {
        self.constant_value(entry).is_some()
    }

    pub fn constant_value(&self, entry: usize) -> Option<f64> {
        self.constants.get(entry).copied().flatten()
    }

    /// Number of entries stored per point.
    pub fn num_values(&self) -> usize {
        (0..self.stencil.size())
            .filter(|e| !self.is_constant(*e))
            .count()
    }

    pub fn variable_entries(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.stencil.size()).filter(|e| !self.is_constant(*e))
    }

    /// Per dimension, is the coefficient anchored at the row.
    pub fn row_anchored(&self, dim: usize) -> bool {
        self.range_stride[dim] >= self.domain_stride[dim]
    }

    /// Row and column coupled by `entry` at `anchor`.
    pub fn row_col(
        &self,
        entry: usize,
        anchor: &Coord<GRID_DIMENSION>,
    ) -> (Coord<GRID_DIMENSION>, Coord<GRID_DIMENSION>) {
        let offset = self.stencil.offset(entry);
        let mut row = *anchor;
        for d in 0..GRID_DIMENSION {
            if !self.row_anchored(d) {
                row[d] -= offset[d];
            }
        }
        (row, row + offset)
    }

    /// Storage point of the coefficient coupling `row` to `col`.
    pub fn anchor_of(
        &self,
        row: &Coord<GRID_DIMENSION>,
        col: &Coord<GRID_DIMENSION>,
    ) -> Coord<GRID_DIMENSION> {
        Coord::from_fn(|d, _| if self.row_anchored(d) { row[d] } else { col[d] })
    }

    /// Anchor points of local box `local` this rank is responsible for.
    pub fn owned_box(&self, local: usize) -> DataBox<GRID_DIMENSION> {
        DataBox::owned(&self.grid.local_box(local).aabb, &self.data_stride())
    }

    pub fn data_space(&self) -> DataSpace<GRID_DIMENSION> {
        DataSpace::new(self.boxes.iter().map(|b| b.data_box).collect())
    }

    pub fn box_data(&self, local: usize) -> &BoxData<GRID_DIMENSION> {
        &self.boxes[local]
    }

    pub(crate) fn boxes_mut(&mut self) -> &mut [BoxData<GRID_DIMENSION>] {
        &mut self.boxes
    }

    pub fn box_values(&self, local: usize, entry: usize) -> &[f64] {
        &self.boxes[local].values[entry]
    }

    fn check_variable(&self, entry: usize) -> Result<(), MatrixError> {
        if entry >= self.stencil.size() {
            return Err(MatrixError::EntryOutOfRange(entry));
        }
        if self.is_constant(entry) {
            return Err(MatrixError::ConstantEntry(entry));
        }
        Ok(())
    }

    /// Set a variable entry at every owned anchor point.
    pub fn set_values<F: Fn(&Coord<GRID_DIMENSION>) -> f64>(
        &mut self,
        entry: usize,
        f: F,
    ) -> Result<(), MatrixError> {
        self.check_variable(entry)?;
        for local in 0..self.boxes.len() {
            let owned = self.owned_box(local);
            let data = &mut self.boxes[local];
            for p in owned.point_iter() {
                data.values[entry][data.data_box.index(&p)] = f(&p);
            }
        }
        Ok(())
    }

    /// Find the local box and index storing `anchor`.
    fn locate(&self, anchor: &Coord<GRID_DIMENSION>) -> Option<(usize, usize)> {
        let anchor = self.grid.canonical(anchor);
        (0..self.boxes.len()).find_map(|local| {
            if self.owned_box(local).contains(&anchor) {
                Some((local, self.boxes[local].data_box.index(&anchor)))
            } else {
                None
            }
        })
    }

    pub fn set_value(
        &mut self,
        entry: usize,
        anchor: &Coord<GRID_DIMENSION>,
        value: f64,
    ) -> Result<(), MatrixError> {
        self.check_variable(entry)?;
        let (local, index) = self
            .locate(anchor)
            .ok_or_else(|| MatrixError::NotOwned(coord_string(anchor)))?;
        self.boxes[local].values[entry][index] = value;
        Ok(())
    }

    /// Coefficient of `entry` at `anchor`, `None` when the anchor
    /// is not owned by this rank.
    pub fn value(
        &self,
        entry: usize,
        anchor: &Coord<GRID_DIMENSION>,
    ) -> Option<f64> {
        if let Some(c) = self.constant_value(entry) {
            return Some(c);
        }
        let (local, index) = self.locate(anchor)?;
        Some(self.boxes[local].values[entry][index])
    }

    /// Matrix element `A(row, col)`.
    /// Couplings to rows or columns outside the grid read as zero.
    /// `None` when the coefficient is stored on another rank.
    pub fn coupling(
        &self,
        row: &Coord<GRID_DIMENSION>,
        col: &Coord<GRID_DIMENSION>,
    ) -> Option<f64> {
        let Some(entry) = self.stencil.entry_of(&(col - row)) else {
            return Some(0.0);
        };
        if !divides(&self.range_stride, row)
            || !divides(&self.domain_stride, col)
            || !self.grid.contains(row)
            || !self.grid.contains(col)
        {
            return Some(0.0);
        }
        let anchor = self.anchor_of(row, col);
        if !self.grid.contains(&anchor) {
            return Some(0.0);
        }
        self.value(entry, &anchor)
    }

    /// Zero variable couplings whose row or column falls outside the grid.
    pub fn assemble(&mut self) {
        profiling::scope!("StructMatrix::assemble");
        for local in 0..self.boxes.len() {
            let owned = self.owned_box(local);
            for entry in 0..self.stencil.size() {
                if self.is_constant(entry) {
                    continue;
                }
                for p in owned.point_iter() {
                    let (row, col) = self.row_col(entry, &p);
                    if !self.grid.contains(&row) || !self.grid.contains(&col) {
                        let index = self.boxes[local].data_box.index(&p);
                        self.boxes[local].values[entry][index] = 0.0;
                    }
                }
            }
        }
    }

    /// Move storage into `space`, keeping every stored value.
    /// The storage in use before the first resize is kept aside for `restore`.
    pub fn resize(
        &mut self,
        space: &DataSpace<GRID_DIMENSION>,
    ) -> Result<(), MatrixError> {
        if space.len() != self.boxes.len() {
            return Err(MatrixError::DataSpaceMismatch {
                expected: self.boxes.len(),
                found: space.len(),
            });
        }
        let mut resized = Vec::with_capacity(self.boxes.len());
        for (old, data_box) in self.boxes.iter().zip(space.boxes.iter()) {
            debug_assert!(data_box.contains_box(&old.data_box));
            let mut values = Vec::with_capacity(old.values.len());
            for old_values in &old.values {
                if old_values.is_empty() {
                    values.push(Vec::new());
                    continue;
                }
                let mut new_values = allocate(data_box.len())?;
                for (i, v) in old_values.iter().enumerate() {
                    new_values[data_box.index(&old.data_box.point(i))] = *v;
                }
                values.push(new_values);
            }
            resized.push(BoxData {
                data_box: *data_box,
                values,
            });
        }
        let previous = std::mem::replace(&mut self.boxes, resized);
        if self.saved.is_none() {
            self.saved = Some(previous);
        }
        Ok(())
    }

    /// Reinstate the storage from before the first `resize`.
    /// Returns false if the matrix was not resized.
    pub fn restore(&mut self) -> bool {
        match self.saved.take() {
            Some(saved) => {
                self.boxes = saved;
                true
            }
            None => false,
        }
    }

    pub fn is_resized(&self) -> bool {
        self.saved.is_some()
    }
}

impl<const GRID_DIMENSION: usize> GhostField<GRID_DIMENSION>
    for StructMatrix<GRID_DIMENSION>
{
    fn components(&self) -> usize {
        self.num_values()
    }

    fn data_box(&self, local_box: usize) -> &DataBox<GRID_DIMENSION> {
        &self.boxes[local_box].data_box
    }

    fn pack(&self, local_box: usize, index: usize, buffer: &mut Vec<f64>) {
        for values in &self.boxes[local_box].values {
            if !values.is_empty() {
                buffer.push(values[index]);
            }
        }
    }

    fn unpack(&mut self, local_box: usize, index: usize, values: &[f64]) {
        let mut incoming = values.iter();
        for stored in &mut self.boxes[local_box].values {
            if stored.is_empty() {
                continue;
            }
            if let Some(v) = incoming.next() {
                stored[index] = *v;
            }
        }
    }
}
