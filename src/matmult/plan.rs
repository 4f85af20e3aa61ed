//! Lifecycle of one matrix product.
//!
//! `create` runs the symbolic algebra and classification, `setup` builds the
//! result matrix and grows every input to the storage the product reads,
//! `communicate` starts the single ghost exchange, `compute` completes it and
//! evaluates the product. Inputs are restored to their original storage once
//! the product is computed, or when the plan is dropped.
use crate::comm::*;
use crate::error::MatmultError;
use crate::grid::StructGrid;
use crate::matmult::algebra::*;
use crate::matmult::bitmask::BitMask;
use crate::matmult::engine::*;
use crate::matmult::kernels::*;
use crate::matmult::planner::*;
use crate::matmult::MatmultContext;
use crate::matrix::{DataBox, DataSpace, StructMatrix};
use crate::stencil::StructStencil;
use crate::util::*;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanState {
    Created,
    Planned,
    CommunicationPending,
    Computed,
    /// An operation failed, the plan can only be dropped.
    Failed,
}

impl std::fmt::Display for PlanState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// What a plan decided, for reports.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanSummary {
    pub terms: usize,
    pub entries: usize,
    pub constant_entries: usize,
    pub compute_entries: usize,
    pub coeff_terms: usize,
    pub kernels: BTreeMap<KernelKind, usize>,
    pub comm_patterns: usize,
    pub mask: bool,
    pub coarsen_stride: Vec<i32>,
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "product of {} terms, coarsen stride {:?}",
            self.terms, self.coarsen_stride
        )?;
        writeln!(
            f,
            "  entries: {} ({} constant, {} computed, {} coefficient-terms)",
            self.entries, self.constant_entries, self.compute_entries, self.coeff_terms
        )?;
        for (kind, count) in &self.kernels {
            writeln!(f, "  kernel {:?}: {}", kind, count)?;
        }
        write!(
            f,
            "  comm patterns: {}, bitmask: {}",
            self.comm_patterns, self.mask
        )
    }
}

pub struct ProductPlan<'m, const GRID_DIMENSION: usize> {
    /// Referenced matrices only, terms index into this list.
    matrices: Vec<&'m mut StructMatrix<GRID_DIMENSION>>,
    terms: Vec<Term>,
    product: SymbolicProduct<GRID_DIMENSION>,
    layout: ProductLayout<GRID_DIMENSION>,
    base_grid: Arc<StructGrid<GRID_DIMENSION>>,
    result_grid: Arc<StructGrid<GRID_DIMENSION>>,
    kernels: Vec<EntryKernels<GRID_DIMENSION>>,
    compute_phase: bool,
    fine_space: Option<DataSpace<GRID_DIMENSION>>,
    coarse_space: Option<DataSpace<GRID_DIMENSION>>,
    mask: Option<BitMask<GRID_DIMENSION>>,
    comm_pkg: Option<CommPkg<GRID_DIMENSION>>,
    handle: Option<CommHandle>,
    state: PlanState,
}

impl<'m, const GRID_DIMENSION: usize> ProductPlan<'m, GRID_DIMENSION> {
    /// Plan the product of `terms`, each an index into `matrices`,
    /// transposed where `transposes` says so.
    pub fn create(
        matrices: Vec<&'m mut StructMatrix<GRID_DIMENSION>>,
        terms: &[usize],
        transposes: &[bool],
    ) -> Result<Self, MatmultError> {
        profiling::scope!("ProductPlan::create");
        if terms.len() != transposes.len() {
            return Err(MatmultError::TransposeCount {
                terms: terms.len(),
                transposes: transposes.len(),
            });
        }
        if terms.is_empty() {
            return Err(MatmultError::EmptyProduct);
        }
        for (t, m) in terms.iter().enumerate() {
            if *m >= matrices.len() {
                return Err(MatmultError::TermOutOfRange {
                    term: t,
                    matrix: *m,
                    available: matrices.len(),
                });
            }
        }

        // Keep referenced matrices in order of first use.
        let mut referenced: Vec<usize> = Vec::new();
        for m in terms {
            if !referenced.contains(m) {
                referenced.push(*m);
            }
        }
        let plan_terms: Vec<Term> = terms
            .iter()
            .zip(transposes)
            .map(|(m, transpose)| Term {
                matrix: referenced.iter().position(|r| r == m).unwrap_or(0),
                transpose: *transpose,
            })
            .collect();
        let mut slots: Vec<Option<&'m mut StructMatrix<GRID_DIMENSION>>> =
            matrices.into_iter().map(Some).collect();
        let mut kept = Vec::with_capacity(referenced.len());
        for m in &referenced {
            if let Some(matrix) = slots[*m].take() {
                kept.push(matrix);
            }
        }

        let base_grid = kept[0].grid().clone();
        for (m, matrix) in referenced.iter().zip(kept.iter()) {
            let grid = matrix.grid();
            if !Arc::ptr_eq(grid, &base_grid) && **grid != *base_grid {
                return Err(MatmultError::GridMismatch(*m));
            }
        }

        let refs: Vec<&StructMatrix<GRID_DIMENSION>> =
            kept.iter().map(|m| &**m).collect();
        let product = multiply(&refs, &plan_terms)?;
        let layout = classify(&refs, &plan_terms, &product)?;

        for d in 0..GRID_DIMENSION {
            let period = base_grid.periodic()[d];
            if period > 0 && period % product.data_stride[d] != 0 {
                return Err(MatmultError::PeriodicStride {
                    period: format!("{:?}", base_grid.periodic().as_slice()),
                    stride: format!("{:?}", product.data_stride.as_slice()),
                });
            }
        }

        let result_grid = if layout.is_coarsened() {
            Arc::new(base_grid.coarsen(&layout.coarsen_stride))
        } else {
            base_grid.clone()
        };
        let mut table = KernelTable::new();
        let kernels = group_terms(&layout.compute_entries, &mut table);
        let compute_phase =
            !layout.compute_entries.is_empty() && base_grid.num_local_boxes() > 0;
        log::debug!(
            "plan created: {} matrices, {} terms, {} kernel choices, compute phase {}",
            kept.len(),
            plan_terms.len(),
            table.len(),
            compute_phase
        );

        Ok(ProductPlan {
            matrices: kept,
            terms: plan_terms,
            product,
            layout,
            base_grid,
            result_grid,
            kernels,
            compute_phase,
            fine_space: None,
            coarse_space: None,
            mask: None,
            comm_pkg: None,
            handle: None,
            state: PlanState::Created,
        })
    }

    fn check_state(
        &self,
        expected: PlanState,
        operation: &'static str,
    ) -> Result<(), MatmultError> {
        if self.state != expected {
            return Err(MatmultError::InvalidState {
                operation,
                state: self.state.to_string(),
            });
        }
        Ok(())
    }

    /// Mark the plan failed and give inputs back their storage.
    fn fail<T>(
        &mut self,
        outcome: Result<T, MatmultError>,
    ) -> Result<T, MatmultError> {
        if let Err(e) = &outcome {
            log::debug!("plan failed in state {}: {}", self.state, e);
            self.state = PlanState::Failed;
            self.restore_inputs();
        }
        outcome
    }

    fn restore_inputs(&mut self) {
        for matrix in self.matrices.iter_mut() {
            matrix.restore();
        }
    }

    /// Storage matrix `m` reads on every local box.
    fn needed_space(&self, m: usize) -> DataSpace<GRID_DIMENSION> {
        let matrix = &self.matrices[m];
        let num_ghost = self
            .layout
            .padded(&self.layout.matrix_stencils[m].num_ghost());
        let boxes = self
            .base_grid
            .local_boxes()
            .enumerate()
            .map(|(k, b)| {
                DataBox::owned(&b.aabb, &matrix.data_stride())
                    .grow(&num_ghost)
                    .union(&matrix.box_data(k).data_box)
            })
            .collect();
        DataSpace::new(boxes)
    }

    /// Merged storage of every matrix sampled in `space`.
    fn class_space(&self, space: Space) -> Option<DataSpace<GRID_DIMENSION>> {
        let mut result: Option<DataSpace<GRID_DIMENSION>> = None;
        for m in 0..self.matrices.len() {
            if self.layout.matrix_spaces[m] != space {
                continue;
            }
            let needed = self.needed_space(m);
            match result.as_mut() {
                Some(merged) => merged.grow_by(&needed),
                None => result = Some(needed),
            }
        }
        result
    }

    fn build_result(&self) -> Result<StructMatrix<GRID_DIMENSION>, MatmultError> {
        let stencil = StructStencil::from_offsets(self.layout.offsets.clone());
        let mut result = StructMatrix::new(self.result_grid.clone(), stencil)
            .with_range_stride(self.layout.range_stride)
            .with_domain_stride(self.layout.domain_stride);
        for (entry, constant) in self.layout.constants.iter().enumerate() {
            if let Some(value) = constant {
                result = result.with_constant_entry(entry, *value);
            }
        }
        Ok(result.initialize()?)
    }

    fn setup_storage(&mut self) -> Result<(), MatmultError> {
        profiling::scope!("ProductPlan::setup_storage");
        self.fine_space = self.class_space(Space::Fine);
        self.coarse_space = self.class_space(Space::Coarse);
        for m in 0..self.matrices.len() {
            let space = match self.layout.matrix_spaces[m] {
                Space::Fine => self.fine_space.as_ref(),
                Space::Coarse => self.coarse_space.as_ref(),
            };
            if let Some(space) = space {
                self.matrices[m].resize(space)?;
            }
        }

        let mut patterns = Vec::new();
        for (m, matrix) in self.matrices.iter().enumerate() {
            if matrix.num_values() == 0 {
                continue;
            }
            let num_ghost = self
                .layout
                .padded(&self.layout.matrix_stencils[m].num_ghost());
            patterns.push((
                FieldId::Matrix(m),
                CommPattern::build(&self.base_grid, &matrix.data_stride(), &num_ghost),
            ));
        }
        if self.layout.needs_mask() {
            let num_ghost = self.layout.padded(&self.layout.mask_stencil.num_ghost());
            self.mask = Some(BitMask::build(
                &self.base_grid,
                &self.layout.mask_stride,
                &num_ghost,
                &self.layout.mask_bits,
            )?);
            patterns.push((
                FieldId::Mask,
                CommPattern::build(&self.base_grid, &self.layout.mask_stride, &num_ghost),
            ));
        }
        let pkg = CommPkg::aggregate(&self.base_grid, patterns);
        log::debug!(
            "exchange: {} send ranks, {} recv ranks, {} local copies",
            pkg.num_send_ranks(),
            pkg.num_recv_ranks(),
            pkg.num_local_copies()
        );
        self.comm_pkg = Some(pkg);
        Ok(())
    }

    /// Build the result matrix and prepare input storage.
    /// Wholly constant entries of the result are already final.
    pub fn setup(&mut self) -> Result<StructMatrix<GRID_DIMENSION>, MatmultError> {
        profiling::scope!("ProductPlan::setup");
        self.check_state(PlanState::Created, "set up")?;
        let result = self.build_result();
        let result = self.fail(result)?;
        if self.compute_phase {
            let storage = self.setup_storage();
            self.fail(storage)?;
        }
        self.state = PlanState::Planned;
        Ok(result)
    }

    fn initiate<C: Communicator>(
        &mut self,
        comm: &mut C,
        tag: u64,
    ) -> Result<(), MatmultError> {
        let Some(pkg) = self.comm_pkg.as_ref() else {
            return Ok(());
        };
        let fields: Vec<&dyn GhostField<GRID_DIMENSION>> = pkg
            .fields()
            .iter()
            .filter_map(|field| match field {
                FieldId::Matrix(m) => {
                    Some(&*self.matrices[*m] as &dyn GhostField<GRID_DIMENSION>)
                }
                FieldId::Mask => self
                    .mask
                    .as_ref()
                    .map(|mask| mask as &dyn GhostField<GRID_DIMENSION>),
            })
            .collect();
        let handle = pkg.initiate(comm, tag, &fields)?;
        self.handle = Some(handle);
        Ok(())
    }

    /// Start the ghost exchange of every input and the bitmask.
    /// Takes a tag even when this rank has nothing to exchange.
    pub fn communicate<C: Communicator>(
        &mut self,
        ctx: &mut MatmultContext<C>,
    ) -> Result<(), MatmultError> {
        profiling::scope!("ProductPlan::communicate");
        self.check_state(PlanState::Planned, "communicate")?;
        let tag = ctx.next_tag();
        if self.compute_phase {
            let outcome = self.initiate(ctx.comm_mut(), tag);
            self.fail(outcome)?;
        }
        self.state = PlanState::CommunicationPending;
        Ok(())
    }

    fn finalize<C: Communicator>(&mut self, comm: &mut C) -> Result<(), MatmultError> {
        let (Some(pkg), Some(handle)) = (self.comm_pkg.as_ref(), self.handle.take())
        else {
            return Ok(());
        };
        let mut matrix_fields: Vec<Option<&mut dyn GhostField<GRID_DIMENSION>>> = self
            .matrices
            .iter_mut()
            .map(|m| Some(&mut **m as &mut dyn GhostField<GRID_DIMENSION>))
            .collect();
        let mut mask_field = self
            .mask
            .as_mut()
            .map(|m| m as &mut dyn GhostField<GRID_DIMENSION>);
        let mut fields: Vec<&mut dyn GhostField<GRID_DIMENSION>> = Vec::new();
        for field in pkg.fields() {
            let taken = match field {
                FieldId::Matrix(m) => matrix_fields[*m].take(),
                FieldId::Mask => mask_field.take(),
            };
            if let Some(taken) = taken {
                fields.push(taken);
            }
        }
        pkg.finalize(handle, comm, &mut fields)?;
        Ok(())
    }

    fn evaluate(
        &self,
        result: &mut StructMatrix<GRID_DIMENSION>,
        params: &crate::matmult::MatmultParameters,
    ) {
        let refs: Vec<&StructMatrix<GRID_DIMENSION>> =
            self.matrices.iter().map(|m| &**m).collect();
        let inputs = EngineInputs {
            matrices: &refs,
            mask: self.mask.as_ref(),
            fine: self.fine_space.as_ref(),
            coarse: self.coarse_space.as_ref(),
            base_grid: &self.base_grid,
            coarsen_stride: self.layout.coarsen_stride,
            data_stride: self.product.data_stride,
        };
        evaluate(&inputs, &self.kernels, result, params);
    }

    /// Complete the exchange, exchanging now if `communicate` was skipped,
    /// then accumulate every computed entry into `result`.
    pub fn compute<C: Communicator>(
        &mut self,
        ctx: &mut MatmultContext<C>,
        result: &mut StructMatrix<GRID_DIMENSION>,
    ) -> Result<(), MatmultError> {
        profiling::scope!("ProductPlan::compute");
        if self.state == PlanState::Planned {
            self.communicate(ctx)?;
        }
        self.check_state(PlanState::CommunicationPending, "compute")?;
        let outcome = self.finalize(ctx.comm_mut());
        self.fail(outcome)?;
        if self.compute_phase {
            debug_assert_eq!(result.stencil().size(), self.layout.offsets.len());
            self.evaluate(result, ctx.parameters());
        }
        self.restore_inputs();
        self.state = PlanState::Computed;
        Ok(())
    }

    /// Release the plan, inputs get their original storage back.
    pub fn destroy(self) {
        log::trace!("plan destroyed in state {}", self.state);
    }

    pub fn state(&self) -> PlanState {
        self.state
    }

    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    pub fn num_matrices(&self) -> usize {
        self.matrices.len()
    }

    pub fn result_grid(&self) -> &Arc<StructGrid<GRID_DIMENSION>> {
        &self.result_grid
    }

    pub fn stencil_offsets(&self) -> &[Coord<GRID_DIMENSION>] {
        &self.layout.offsets
    }

    pub fn has_compute_phase(&self) -> bool {
        self.compute_phase
    }

    pub fn mask_allocated(&self) -> bool {
        self.mask.is_some()
    }

    pub fn num_comm_patterns(&self) -> usize {
        self.comm_pkg.as_ref().map_or(0, |pkg| pkg.fields().len())
    }

    pub fn coarsen_stride(&self) -> &Coord<GRID_DIMENSION> {
        &self.layout.coarsen_stride
    }

    pub fn fine_stride(&self) -> &Coord<GRID_DIMENSION> {
        &self.layout.fine_stride
    }

    pub fn coarse_stride(&self) -> Option<&Coord<GRID_DIMENSION>> {
        self.layout.coarse_stride.as_ref()
    }

    pub fn kernel_census(&self) -> BTreeMap<KernelKind, usize> {
        kernel_census(&self.kernels)
    }

    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            terms: self.terms.len(),
            entries: self.layout.offsets.len(),
            constant_entries: self.layout.num_constant_entries(),
            compute_entries: self.layout.compute_entries.len(),
            coeff_terms: self.layout.num_coeff_terms(),
            kernels: self.kernel_census(),
            comm_patterns: self.num_comm_patterns(),
            mask: self.mask_allocated(),
            coarsen_stride: self.layout.coarsen_stride.iter().copied().collect(),
        }
    }
}

impl<'m, const GRID_DIMENSION: usize> Drop for ProductPlan<'m, GRID_DIMENSION> {
    fn drop(&mut self) {
        self.restore_inputs();
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;
    use crate::comm::SelfComm;
    use crate::stencil::standard_stencils;
    use float_cmp::assert_approx_eq;

    fn grid() -> Arc<StructGrid<1>> {
        Arc::new(StructGrid::new(vec![AABB::new(matrix![0, 7])]).with_periodic(vector![8]))
    }

    fn laplace() -> StructMatrix<1> {
        let mut a = StructMatrix::new(grid(), standard_stencils::laplace_1d())
            .initialize()
            .unwrap();
        for (e, w) in standard_stencils::LAPLACE_1D_WEIGHTS.iter().enumerate() {
            a.set_values(e, |p| *w * (1.0 + p[0] as f64)).unwrap();
        }
        a
    }

    #[test]
    fn lifecycle() {
        let mut a = laplace();
        let before = a.data_space();
        let mut ctx = MatmultContext::new(SelfComm::new());
        let mut plan = ProductPlan::create(vec![&mut a], &[0, 0], &[false, false]).unwrap();
        assert_eq!(plan.state(), PlanState::Created);
        assert!(plan.compute(&mut ctx, &mut StructMatrix::new(grid(), standard_stencils::center())).is_err());
        assert_eq!(plan.state(), PlanState::Created);

        let mut result = plan.setup().unwrap();
        assert_eq!(plan.state(), PlanState::Planned);
        assert!(plan.setup().is_err());
        assert_eq!(plan.num_comm_patterns(), 1);
        assert!(!plan.mask_allocated());
        plan.communicate(&mut ctx).unwrap();
        assert_eq!(plan.state(), PlanState::CommunicationPending);
        plan.compute(&mut ctx, &mut result).unwrap();
        assert_eq!(plan.state(), PlanState::Computed);
        plan.destroy();
        assert_eq!(a.data_space(), before);

        // (A A)(3, 3) = A(3,2)A(2,3) + A(3,3)A(3,3) + A(3,4)A(4,3)
        let expected = -4.0 * -3.0 + 8.0 * 8.0 + -4.0 * -5.0;
        assert_approx_eq!(f64, result.coupling(&vector![3], &vector![3]).unwrap(), expected);
    }

    #[test]
    fn compute_without_communicate() {
        let mut a = laplace();
        let mut ctx = MatmultContext::new(SelfComm::new());
        let mut plan = ProductPlan::create(vec![&mut a], &[0, 0], &[false, false]).unwrap();
        let mut result = plan.setup().unwrap();
        plan.compute(&mut ctx, &mut result).unwrap();
        assert_eq!(plan.state(), PlanState::Computed);
        assert!(plan.communicate(&mut ctx).is_err());
    }

    #[test]
    fn dropped_plan_restores() {
        let mut a = laplace();
        let before = a.data_space();
        {
            let mut plan =
                ProductPlan::create(vec![&mut a], &[0, 0, 0], &[false, false, false]).unwrap();
            let _result = plan.setup().unwrap();
        }
        assert!(!a.is_resized());
        assert_eq!(a.data_space(), before);
    }

    #[test]
    fn create_errors() {
        let mut a = laplace();
        let other = Arc::new(StructGrid::new(vec![AABB::new(matrix![0, 3])]));
        let mut b = StructMatrix::new(other, standard_stencils::center())
            .initialize()
            .unwrap();
        assert!(matches!(
            ProductPlan::create(vec![&mut a], &[0, 0], &[false]),
            Err(MatmultError::TransposeCount { .. })
        ));
        assert!(matches!(
            ProductPlan::create(vec![&mut a], &[0, 1], &[false, false]),
            Err(MatmultError::TermOutOfRange { .. })
        ));
        assert!(matches!(
            ProductPlan::create(vec![&mut a], &[], &[]),
            Err(MatmultError::EmptyProduct)
        ));
        assert!(matches!(
            ProductPlan::create(vec![&mut a, &mut b], &[0, 1], &[false, false]),
            Err(MatmultError::GridMismatch(1))
        ));
    }

    #[test]
    fn unreferenced_matrices_dropped() {
        let mut a = laplace();
        let mut b = laplace();
        let plan = ProductPlan::create(vec![&mut a, &mut b], &[1, 1], &[false, true]).unwrap();
        assert_eq!(plan.num_matrices(), 1);
        assert_eq!(plan.terms()[1], Term { matrix: 0, transpose: true });
    }

    #[test]
    fn periodic_stride_rejected() {
        let odd = Arc::new(StructGrid::new(vec![AABB::new(matrix![0, 6])]).with_periodic(vector![7]));
        let mut p = StructMatrix::new(odd, standard_stencils::interpolation_1d())
            .with_domain_stride(vector![2])
            .initialize()
            .unwrap();
        assert!(matches!(
            ProductPlan::create(vec![&mut p], &[0, 0], &[true, false]),
            Err(MatmultError::PeriodicStride { .. })
        ));
    }
}
