//! Per point evaluation of a planned product.
//!
//! For every local box of the product grid the engine walks the owned anchor
//! points `Q` and keeps four linear indices in lock step: the result storage,
//! the fine and coarse data spaces and the bitmask. Operands are bound to
//! storage once per box, kernels only add a fixed offset to their stream.
use crate::comm::GhostField;
use crate::grid::StructGrid;
use crate::matmult::bitmask::BitMask;
use crate::matmult::kernels::*;
use crate::matmult::planner::*;
use crate::matmult::{ExecutionStrategy, MatmultParameters};
use crate::matrix::{DataBox, DataSpace, StructMatrix};
use crate::util::*;
use rayon::prelude::*;

pub(crate) const STREAMS: usize = 4;
pub(crate) const RESULT: usize = 0;
pub(crate) const FINE: usize = 1;
pub(crate) const COARSE: usize = 2;
pub(crate) const MASK: usize = 3;

pub(crate) fn space_stream(space: Space) -> usize {
    match space {
        Space::Fine => FINE,
        Space::Coarse => COARSE,
    }
}

/// Odometer over the anchor points of one box,
/// highest dimension fastest to match the storage ordering.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BoxLoop<const GRID_DIMENSION: usize> {
    counts: [usize; GRID_DIMENSION],
    starts: [usize; STREAMS],
    steps: [[usize; STREAMS]; GRID_DIMENSION],
}

impl<const GRID_DIMENSION: usize> BoxLoop<GRID_DIMENSION> {
    pub fn new(
        counts: [usize; GRID_DIMENSION],
        starts: [usize; STREAMS],
        steps: [[usize; STREAMS]; GRID_DIMENSION],
    ) -> Self {
        BoxLoop {
            counts,
            starts,
            steps,
        }
    }

    pub fn len(&self) -> usize {
        self.counts.iter().product()
    }

    pub fn for_each<F: FnMut(&[usize; STREAMS])>(&self, mut f: F) {
        let n = self.len();
        let mut counter = [0; GRID_DIMENSION];
        let mut index = self.starts;
        for _ in 0..n {
            f(&index);
            let mut d = GRID_DIMENSION;
            while d > 0 {
                d -= 1;
                counter[d] += 1;
                for s in 0..STREAMS {
                    index[s] += self.steps[d][s];
                }
                if counter[d] < self.counts[d] {
                    break;
                }
                for s in 0..STREAMS {
                    index[s] -= self.steps[d][s] * self.counts[d];
                }
                counter[d] = 0;
            }
        }
    }
}

/// Storage read by the engine, all indexed by base grid local box.
pub(crate) struct EngineInputs<'a, const GRID_DIMENSION: usize> {
    pub matrices: &'a [&'a StructMatrix<GRID_DIMENSION>],
    pub mask: Option<&'a BitMask<GRID_DIMENSION>>,
    pub fine: Option<&'a DataSpace<GRID_DIMENSION>>,
    pub coarse: Option<&'a DataSpace<GRID_DIMENSION>>,
    pub base_grid: &'a StructGrid<GRID_DIMENSION>,
    pub coarsen_stride: Coord<GRID_DIMENSION>,
    /// Step between anchor points in base index units.
    pub data_stride: Coord<GRID_DIMENSION>,
}

impl<'a, const GRID_DIMENSION: usize> EngineInputs<'a, GRID_DIMENSION> {
    fn box_loop(
        &self,
        base_box: usize,
        owned: &DataBox<GRID_DIMENSION>,
        storage: &DataBox<GRID_DIMENSION>,
    ) -> BoxLoop<GRID_DIMENSION> {
        let q0 = owned.lo().component_mul(&self.coarsen_stride);
        let mut starts = [0; STREAMS];
        let mut steps = [[0; STREAMS]; GRID_DIMENSION];
        let mut counts = [0; GRID_DIMENSION];

        starts[RESULT] = storage.index(owned.lo());
        let result_strides = storage.linear_strides();
        for d in 0..GRID_DIMENSION {
            steps[d][RESULT] = result_strides[d];
            counts[d] = owned.counts()[d] as usize;
        }

        let spaces = [
            (FINE, self.fine.map(|s| &s.boxes[base_box])),
            (COARSE, self.coarse.map(|s| &s.boxes[base_box])),
            (MASK, self.mask.map(|m| m.data_box(base_box))),
        ];
        for (stream, space_box) in spaces {
            let Some(space_box) = space_box else {
                continue;
            };
            starts[stream] = space_box.index(&q0);
            let linear = space_box.linear_strides();
            for d in 0..GRID_DIMENSION {
                let step = self.data_stride[d] / space_box.stride()[d];
                steps[d][stream] = step as usize * linear[d];
            }
        }
        BoxLoop::new(counts, starts, steps)
    }

    fn resolve(
        &self,
        base_box: usize,
        operand: &Operand<GRID_DIMENSION>,
    ) -> Resolved<'a> {
        match operand {
            Operand::Variable {
                space,
                matrix,
                entry,
                shift,
            } => {
                let matrix: &'a StructMatrix<GRID_DIMENSION> = self.matrices[*matrix];
                let data_box = matrix.box_data(base_box).data_box;
                Resolved::Var {
                    stream: space_stream(*space),
                    var: Var {
                        data: matrix.box_values(base_box, *entry),
                        offset: data_box.linear_offset(shift),
                    },
                }
            }
            Operand::Masked { value, bit, shift } => {
                let Some(mask) = self.mask else {
                    panic!("ERROR: Masked operand without a bitmask");
                };
                Resolved::Masked(Masked {
                    words: mask.words(base_box),
                    offset: mask.data_box(base_box).linear_offset(shift),
                    bit: *bit,
                    value: *value,
                })
            }
        }
    }

    fn run_entry(
        &self,
        base_box: usize,
        kernels: &EntryKernels<GRID_DIMENSION>,
        lp: &BoxLoop<GRID_DIMENSION>,
        out: &mut [f64],
    ) {
        for group in &kernels.groups {
            let terms: Vec<Vec<Resolved>> = group
                .terms
                .iter()
                .map(|t| t.iter().map(|o| self.resolve(base_box, o)).collect())
                .collect();
            run_group(group.kind, &terms, lp, out);
        }
    }
}

/// Accumulate every computed entry of the product into `result`.
pub(crate) fn evaluate<const GRID_DIMENSION: usize>(
    inputs: &EngineInputs<GRID_DIMENSION>,
    kernels: &[EntryKernels<GRID_DIMENSION>],
    result: &mut StructMatrix<GRID_DIMENSION>,
    params: &MatmultParameters,
) {
    profiling::scope!("evaluate product");
    let grid = result.grid().clone();
    let mut by_entry: Vec<Option<&EntryKernels<GRID_DIMENSION>>> =
        vec![None; result.stencil().size()];
    for k in kernels {
        by_entry[k.entry] = Some(k);
    }
    let owned: Vec<DataBox<GRID_DIMENSION>> = (0..grid.num_local_boxes())
        .map(|k| result.owned_box(k))
        .collect();

    for (k, data) in result.boxes_mut().iter_mut().enumerate() {
        let Some(base_box) = inputs.base_grid.local_index_of_id(grid.local_box(k).id)
        else {
            continue;
        };
        if owned[k].is_empty() {
            continue;
        }
        let lp = inputs.box_loop(base_box, &owned[k], &data.data_box);
        let run = |entry: usize, out: &mut Vec<f64>| {
            if let Some(kernels) = by_entry[entry] {
                inputs.run_entry(base_box, kernels, &lp, out);
            }
        };
        let parallel = params.strategy == ExecutionStrategy::Parallel
            && lp.len() >= params.min_parallel_points;
        if parallel {
            data.values
                .par_iter_mut()
                .enumerate()
                .for_each(|(e, out)| run(e, out));
        } else {
            data.values
                .iter_mut()
                .enumerate()
                .for_each(|(e, out)| run(e, out));
        }
    }
}
