use crate::comm::CommStencil;
use crate::error::{coord_string, MatmultError};
use crate::matmult::algebra::*;
use crate::matrix::StructMatrix;
use crate::util::indexing::*;
use crate::util::*;

/// The two sampling lattices variable data can live on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Space {
    Fine,
    Coarse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TermClass {
    Variable(Space),
    /// Constant factor gated by its bitmask bit.
    Constant,
}

/// One factor of a coefficient-term, ready to be bound to storage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operand<const GRID_DIMENSION: usize> {
    /// Per point value of `entry` in plan matrix `matrix`,
    /// read at `Q + shift`.
    Variable {
        space: Space,
        matrix: usize,
        entry: usize,
        shift: Coord<GRID_DIMENSION>,
    },
    /// `value` wherever bit `bit` of the mask at `Q + shift` is set.
    Masked {
        value: f64,
        bit: u32,
        shift: Coord<GRID_DIMENSION>,
    },
}

impl<const GRID_DIMENSION: usize> Operand<GRID_DIMENSION> {
    pub fn class(&self) -> TermClass {
        match self {
            Operand::Variable { space, .. } => TermClass::Variable(*space),
            Operand::Masked { .. } => TermClass::Constant,
        }
    }
}

/// Coefficient-terms of a product entry that need per point evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputeEntry<const GRID_DIMENSION: usize> {
    pub entry: usize,
    pub terms: Vec<Vec<Operand<GRID_DIMENSION>>>,
}

/// Everything decided about a product before touching any storage.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductLayout<const GRID_DIMENSION: usize> {
    /// Stride mapping the base grid onto the product grid.
    pub coarsen_stride: Coord<GRID_DIMENSION>,
    /// Product strides and offsets in the product grid's index space.
    pub range_stride: Coord<GRID_DIMENSION>,
    pub domain_stride: Coord<GRID_DIMENSION>,
    pub offsets: Vec<Coord<GRID_DIMENSION>>,
    pub constants: Vec<Option<f64>>,
    pub compute_entries: Vec<ComputeEntry<GRID_DIMENSION>>,

    pub fine_stride: Coord<GRID_DIMENSION>,
    pub coarse_stride: Option<Coord<GRID_DIMENSION>>,
    pub matrix_spaces: Vec<Space>,
    pub matrix_stencils: Vec<CommStencil<GRID_DIMENSION>>,

    pub mask_stride: Coord<GRID_DIMENSION>,
    pub mask_stencil: CommStencil<GRID_DIMENSION>,
    /// Bit and lattice for every term whose constant factors are gated.
    pub mask_bits: Vec<(u32, Coord<GRID_DIMENSION>)>,

    /// Extra ghost width on both sides when the product domain is coarse.
    pub padding: Coord<GRID_DIMENSION>,
}

impl<const GRID_DIMENSION: usize> ProductLayout<GRID_DIMENSION> {
    pub fn needs_mask(&self) -> bool {
        !self.mask_bits.is_empty()
    }

    pub fn is_coarsened(&self) -> bool {
        self.coarsen_stride.iter().any(|c| *c != 1)
    }

    pub fn num_constant_entries(&self) -> usize {
        self.constants.iter().filter(|c| c.is_some()).count()
    }

    pub fn num_coeff_terms(&self) -> usize {
        self.compute_entries.iter().map(|e| e.terms.len()).sum()
    }

    /// `num_ghost` grown by the coarse domain padding.
    pub fn padded(&self, num_ghost: &Bounds<GRID_DIMENSION>) -> Bounds<GRID_DIMENSION> {
        let mut result = *num_ghost;
        for d in 0..GRID_DIMENSION {
            result[(d, 0)] += self.padding[d];
            result[(d, 1)] += self.padding[d];
        }
        result
    }
}

fn gcd(a: i32, b: i32) -> i32 {
    if b == 0 {
        a.abs()
    } else {
        gcd(b, a % b)
    }
}

/// Split the data strides of the plan matrices into a fine and a coarse class.
fn stride_classes<const GRID_DIMENSION: usize>(
    matrices: &[&StructMatrix<GRID_DIMENSION>],
) -> Result<(Coord<GRID_DIMENSION>, Option<Coord<GRID_DIMENSION>>), MatmultError>
{
    let mut distinct: Vec<Coord<GRID_DIMENSION>> = Vec::new();
    for m in matrices {
        let stride = m.data_stride();
        if !distinct.contains(&stride) {
            distinct.push(stride);
        }
    }
    match distinct.as_slice() {
        [] => Err(MatmultError::EmptyProduct),
        [only] => Ok((*only, None)),
        [a, b] => {
            let fine = elementwise_min(a, b);
            let coarse = elementwise_max(a, b);
            if !((fine == *a && coarse == *b) || (fine == *b && coarse == *a)) {
                return Err(MatmultError::IncomparableStrides {
                    fine: coord_string(a),
                    coarse: coord_string(b),
                });
            }
            Ok((fine, Some(coarse)))
        }
        _ => Err(MatmultError::TooManyStrides(distinct.len())),
    }
}

/// Classify every coefficient-term of a symbolic product.
/// Entries whose coefficient-terms are all constant are folded into scalars,
/// the rest become per point work on the fine and coarse data spaces.
pub fn classify<const GRID_DIMENSION: usize>(
    matrices: &[&StructMatrix<GRID_DIMENSION>],
    terms: &[Term],
    product: &SymbolicProduct<GRID_DIMENSION>,
) -> Result<ProductLayout<GRID_DIMENSION>, MatmultError> {
    profiling::scope!("classify product");
    let (fine_stride, coarse_stride) = stride_classes(matrices)?;
    let matrix_spaces: Vec<Space> = matrices
        .iter()
        .map(|m| {
            if m.data_stride() == fine_stride {
                Space::Fine
            } else {
                Space::Coarse
            }
        })
        .collect();

    let coarsen_stride =
        elementwise_min(&product.range_stride, &product.domain_stride);
    let mask_stride = product
        .term_strides
        .iter()
        .fold(product.data_stride, |acc, (r, d)| {
            Coord::from_fn(|i, _| gcd(gcd(acc[i], r[i]), d[i]))
        });

    let mut constants = Vec::with_capacity(product.entries.len());
    let mut offsets = Vec::with_capacity(product.entries.len());
    let mut compute_entries = Vec::new();
    let mut matrix_stencils = vec![CommStencil::new(); matrices.len()];
    let mut mask_stencil = CommStencil::new();
    let mut mask_bits: Vec<(u32, Coord<GRID_DIMENSION>)> = Vec::new();

    for (e, entry) in product.entries.iter().enumerate() {
        offsets.push(entry.offset.component_div(&coarsen_stride));
        let wholly_constant = entry.terms.iter().all(|term| {
            term.factors.iter().zip(terms).all(|(factor, t)| {
                matrices[t.matrix].is_constant(factor.entry)
            })
        });

        if wholly_constant {
            let mut value = 0.0;
            for term in &entry.terms {
                let mut product = 1.0;
                for (factor, t) in term.factors.iter().zip(terms) {
                    product *= matrices[t.matrix]
                        .constant_value(factor.entry)
                        .unwrap_or(0.0);
                }
                value += product;
            }
            constants.push(Some(value));
            continue;
        }

        constants.push(None);
        let mut compute_terms = Vec::with_capacity(entry.terms.len());
        for term in &entry.terms {
            let mut operands = Vec::with_capacity(terms.len());
            for (t, (factor, term_ref)) in
                term.factors.iter().zip(terms).enumerate()
            {
                let m = term_ref.matrix;
                match matrices[m].constant_value(factor.entry) {
                    Some(value) => {
                        let bit = t as u32;
                        if !mask_bits.iter().any(|(b, _)| *b == bit) {
                            mask_bits.push((bit, product.term_strides[t].1));
                        }
                        mask_stencil.insert(factor.mask_shift);
                        operands.push(Operand::Masked {
                            value,
                            bit,
                            shift: factor.mask_shift,
                        });
                    }
                    None => {
                        matrix_stencils[m].insert(factor.data_shift);
                        operands.push(Operand::Variable {
                            space: matrix_spaces[m],
                            matrix: m,
                            entry: factor.entry,
                            shift: factor.data_shift,
                        });
                    }
                }
            }
            compute_terms.push(operands);
        }
        compute_entries.push(ComputeEntry {
            entry: e,
            terms: compute_terms,
        });
    }

    if !mask_bits.is_empty() && terms.len() > u32::BITS as usize {
        return Err(MatmultError::TooManyTerms(terms.len()));
    }
    mask_bits.sort_by_key(|(bit, _)| *bit);

    let padding = Coord::from_fn(|d, _| {
        if product.domain_stride[d] > product.range_stride[d] {
            product.domain_stride[d] - 1
        } else {
            0
        }
    });

    let layout = ProductLayout {
        coarsen_stride,
        range_stride: product.range_stride.component_div(&coarsen_stride),
        domain_stride: product.domain_stride.component_div(&coarsen_stride),
        offsets,
        constants,
        compute_entries,
        fine_stride,
        coarse_stride,
        matrix_spaces,
        matrix_stencils,
        mask_stride,
        mask_stencil,
        mask_bits,
        padding,
    };
    log::debug!(
        "layout: coarsen {}, {} constant entries, {} computed, mask {}",
        coord_string(&layout.coarsen_stride),
        layout.num_constant_entries(),
        layout.compute_entries.len(),
        layout.needs_mask()
    );
    Ok(layout)
}
