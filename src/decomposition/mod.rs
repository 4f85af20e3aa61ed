//! Block decomposition of a domain into grid boxes.
use crate::util::*;

/// Split a domain into `parts[d]` near equal slabs along each dimension.
/// Boxes are returned in linear ordering, highest dimension fastest.
/// Dimensions with fewer cells than parts are split into single cells.
pub fn partition<const GRID_DIMENSION: usize>(
    domain: &AABB<GRID_DIMENSION>,
    parts: [usize; GRID_DIMENSION],
) -> Vec<AABB<GRID_DIMENSION>> {
    let extents = domain.exclusive_bounds();
    let mut cuts: Vec<Vec<(i32, i32)>> = Vec::with_capacity(GRID_DIMENSION);
    let mut counts = Coord::<GRID_DIMENSION>::zero();
    for d in 0..GRID_DIMENSION {
        let n = extents[d] as usize;
        let p = parts[d].clamp(1, n.max(1));
        let mut dim_cuts = Vec::with_capacity(p);
        let lo = domain.bounds[(d, 0)];
        for i in 0..p {
            let start = lo + (i * n / p) as i32;
            let end = lo + ((i + 1) * n / p) as i32 - 1;
            dim_cuts.push((start, end));
        }
        counts[d] = p as i32;
        cuts.push(dim_cuts);
    }

    let block_space = AABB::from_mm(Coord::zero(), counts.add_scalar(-1));
    block_space
        .coord_iter()
        .map(|block| {
            let mut bounds = Bounds::zero();
            for d in 0..GRID_DIMENSION {
                let (start, end) = cuts[d][block[d] as usize];
                bounds[(d, 0)] = start;
                bounds[(d, 1)] = end;
            }
            AABB::new(bounds)
        })
        .collect()
}

/// Deal `n_boxes` boxes to `n_ranks` ranks in contiguous blocks.
pub fn assign_ranks(n_boxes: usize, n_ranks: usize) -> Vec<usize> {
    debug_assert!(n_ranks > 0);
    (0..n_boxes).map(|i| i * n_ranks / n_boxes.max(1)).collect()
}
