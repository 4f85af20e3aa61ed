//! Symbolic multiplication of stencils.
//!
//! All positions are relative to an anchor point `Q` of the product,
//! expressed in base index units. For each combination of one entry per
//! term, the chain `X_0 = Q + c_0, X_{t+1} = X_t + sigma_t` walks from the
//! product row to the product column, where `sigma_t` is the entry offset,
//! negated for transposed terms.
use crate::error::{coord_string, MatmultError};
use crate::matrix::StructMatrix;
use crate::util::indexing::*;
use crate::util::*;

/// One factor of a product: a matrix, possibly transposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Term {
    pub matrix: usize,
    pub transpose: bool,
}

/// Contribution of one term to one coefficient-term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Factor<const GRID_DIMENSION: usize> {
    /// Stencil entry of the term's matrix.
    pub entry: usize,
    /// Where the matrix stores this coefficient, relative to `Q`.
    pub data_shift: Coord<GRID_DIMENSION>,
    /// Chain position `X_{t+1}` relative to `Q`, where the term's
    /// spatial validity is checked.
    pub mask_shift: Coord<GRID_DIMENSION>,
}

/// One product of coefficients, one factor per term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoeffTerm<const GRID_DIMENSION: usize> {
    pub factors: Vec<Factor<GRID_DIMENSION>>,
}

/// Offset of the product and every coefficient-term summing into it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductEntry<const GRID_DIMENSION: usize> {
    pub offset: Coord<GRID_DIMENSION>,
    pub terms: Vec<CoeffTerm<GRID_DIMENSION>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolicProduct<const GRID_DIMENSION: usize> {
    pub range_stride: Coord<GRID_DIMENSION>,
    pub domain_stride: Coord<GRID_DIMENSION>,
    /// Lattice of the product's anchor points.
    pub data_stride: Coord<GRID_DIMENSION>,
    /// Effective range and domain stride of every term.
    pub term_strides: Vec<(Coord<GRID_DIMENSION>, Coord<GRID_DIMENSION>)>,
    pub entries: Vec<ProductEntry<GRID_DIMENSION>>,
}

/// Range and domain stride of a term, swapped by transposition.
pub fn term_strides<const GRID_DIMENSION: usize>(
    matrix: &StructMatrix<GRID_DIMENSION>,
    term: &Term,
) -> (Coord<GRID_DIMENSION>, Coord<GRID_DIMENSION>) {
    if term.transpose {
        (*matrix.domain_stride(), *matrix.range_stride())
    } else {
        (*matrix.range_stride(), *matrix.domain_stride())
    }
}

/// Stencil of the product of `terms` and the coefficient-terms of each entry.
pub fn multiply<const GRID_DIMENSION: usize>(
    matrices: &[&StructMatrix<GRID_DIMENSION>],
    terms: &[Term],
) -> Result<SymbolicProduct<GRID_DIMENSION>, MatmultError> {
    profiling::scope!("stencil algebra");
    if terms.is_empty() {
        return Err(MatmultError::EmptyProduct);
    }
    for (t, term) in terms.iter().enumerate() {
        if term.matrix >= matrices.len() {
            return Err(MatmultError::TermOutOfRange {
                term: t,
                matrix: term.matrix,
                available: matrices.len(),
            });
        }
    }

    let strides: Vec<_> = terms
        .iter()
        .map(|term| term_strides(matrices[term.matrix], term))
        .collect();
    for t in 1..terms.len() {
        let domain = strides[t - 1].1;
        let range = strides[t].0;
        if domain != range {
            return Err(MatmultError::StrideMismatch {
                term: t - 1,
                next: t,
                domain: coord_string(&domain),
                range: coord_string(&range),
            });
        }
    }

    let range_stride = strides[0].0;
    let domain_stride = strides[terms.len() - 1].1;
    let data_stride = elementwise_max(&range_stride, &domain_stride);
    for (t, (range, domain)) in strides.iter().enumerate() {
        for stride in [range, domain] {
            if !divides(stride, &data_stride) {
                return Err(MatmultError::NonUniformStencil {
                    term: t,
                    stride: coord_string(stride),
                    data_stride: coord_string(&data_stride),
                });
            }
        }
    }

    let sizes: Vec<usize> = terms
        .iter()
        .map(|term| matrices[term.matrix].stencil().size())
        .collect();
    if sizes.iter().any(|s| *s == 0) {
        return Err(MatmultError::EmptyProduct);
    }

    let mut entries: Vec<ProductEntry<GRID_DIMENSION>> = Vec::new();
    let mut choice = vec![0; terms.len()];
    let mut sigmas = vec![Coord::zero(); terms.len()];
    'combinations: loop {
        for (t, term) in terms.iter().enumerate() {
            let offset = matrices[term.matrix].stencil().offset(choice[t]);
            sigmas[t] = if term.transpose { -offset } else { *offset };
        }
        let offset: Coord<GRID_DIMENSION> = sigmas.iter().sum();

        let mut c = Coord::from_fn(|d, _| {
            if range_stride[d] >= domain_stride[d] {
                0
            } else {
                -offset[d]
            }
        });
        let mut factors = Vec::with_capacity(terms.len());
        let mut valid = true;
        for (t, term) in terms.iter().enumerate() {
            let next = c + sigmas[t];
            if !divides(&strides[t].0, &c) || !divides(&strides[t].1, &next) {
                valid = false;
                break;
            }
            let matrix = matrices[term.matrix];
            let (row, col) = if term.transpose { (next, c) } else { (c, next) };
            factors.push(Factor {
                entry: choice[t],
                data_shift: matrix.anchor_of(&row, &col),
                mask_shift: next,
            });
            c = next;
        }

        if valid {
            let coeff_term = CoeffTerm { factors };
            match entries.iter_mut().find(|e| e.offset == offset) {
                Some(entry) => entry.terms.push(coeff_term),
                None => entries.push(ProductEntry {
                    offset,
                    terms: vec![coeff_term],
                }),
            }
        }

        // Odometer over entry choices, last term fastest.
        let mut t = terms.len();
        loop {
            if t == 0 {
                break 'combinations;
            }
            t -= 1;
            choice[t] += 1;
            if choice[t] < sizes[t] {
                break;
            }
            choice[t] = 0;
        }
    }

    if entries.is_empty() {
        return Err(MatmultError::EmptyProduct);
    }
    log::debug!(
        "symbolic product: {} terms, {} entries, {} coefficient-terms",
        terms.len(),
        entries.len(),
        entries.iter().map(|e| e.terms.len()).sum::<usize>()
    );
    Ok(SymbolicProduct {
        range_stride,
        domain_stride,
        data_stride,
        term_strides: strides,
        entries,
    })
}
