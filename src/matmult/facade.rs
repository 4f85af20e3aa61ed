use crate::comm::Communicator;
use crate::error::MatmultError;
use crate::matmult::{MatmultContext, ProductPlan};
use crate::matrix::StructMatrix;

/// Product of `terms`, each an index into `matrices`, transposed where
/// `transposes` says so. Runs a whole plan and returns the assembled result.
pub fn matmult<C: Communicator, const GRID_DIMENSION: usize>(
    ctx: &mut MatmultContext<C>,
    matrices: Vec<&mut StructMatrix<GRID_DIMENSION>>,
    terms: &[usize],
    transposes: &[bool],
) -> Result<StructMatrix<GRID_DIMENSION>, MatmultError> {
    profiling::scope!("matmult");
    let mut plan = ProductPlan::create(matrices, terms, transposes)?;
    let mut result = plan.setup()?;
    plan.communicate(ctx)?;
    plan.compute(ctx, &mut result)?;
    let summary = plan.summary();
    plan.destroy();
    result.assemble();
    log::info!(
        "rank {}: product of {} terms, {} entries ({} constant)",
        ctx.rank(),
        summary.terms,
        summary.entries,
        summary.constant_entries
    );
    Ok(result)
}

/// `A B`
pub fn matmat<C: Communicator, const GRID_DIMENSION: usize>(
    ctx: &mut MatmultContext<C>,
    a: &mut StructMatrix<GRID_DIMENSION>,
    b: &mut StructMatrix<GRID_DIMENSION>,
) -> Result<StructMatrix<GRID_DIMENSION>, MatmultError> {
    matmult(ctx, vec![a, b], &[0, 1], &[false, false])
}

/// Galerkin product `P^T A P`.
pub fn ptap<C: Communicator, const GRID_DIMENSION: usize>(
    ctx: &mut MatmultContext<C>,
    a: &mut StructMatrix<GRID_DIMENSION>,
    p: &mut StructMatrix<GRID_DIMENSION>,
) -> Result<StructMatrix<GRID_DIMENSION>, MatmultError> {
    matmult(ctx, vec![a, p], &[1, 0, 1], &[true, false, false])
}

/// `R A P`
pub fn rap<C: Communicator, const GRID_DIMENSION: usize>(
    ctx: &mut MatmultContext<C>,
    r: &mut StructMatrix<GRID_DIMENSION>,
    a: &mut StructMatrix<GRID_DIMENSION>,
    p: &mut StructMatrix<GRID_DIMENSION>,
) -> Result<StructMatrix<GRID_DIMENSION>, MatmultError> {
    matmult(ctx, vec![r, a, p], &[0, 1, 2], &[false, false, false])
}

/// `R^T A P`, for a restriction stored with the layout of an interpolation.
pub fn rtap<C: Communicator, const GRID_DIMENSION: usize>(
    ctx: &mut MatmultContext<C>,
    rt: &mut StructMatrix<GRID_DIMENSION>,
    a: &mut StructMatrix<GRID_DIMENSION>,
    p: &mut StructMatrix<GRID_DIMENSION>,
) -> Result<StructMatrix<GRID_DIMENSION>, MatmultError> {
    matmult(ctx, vec![rt, a, p], &[0, 1, 2], &[true, false, false])
}
