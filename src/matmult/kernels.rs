//! Specialised inner loops for the coefficient-terms of a product.
//!
//! Every coefficient-term is a list of operands, one per product term.
//! Terms with three operands are dispatched on how many operands are masked
//! constants and on which space the variable ones live in, so that each group
//! runs a loop with a fixed operand layout. Everything else goes through the
//! generic loop.
use crate::matmult::engine::*;
use crate::matmult::planner::*;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KernelKind {
    /// Three variable operands in one space.
    Triple(Space),

    /// Two variable operands in one space and a masked constant.
    TripleOneMask(Space),

    /// One variable operand and two masked constants.
    TripleTwoMasks(Space),

    TripleThreeMasks,

    /// Three variable operands, two of them in `pair`.
    TripleSplit { pair: Space },

    /// One fine and one coarse operand and a masked constant.
    TripleSplitMask,

    /// Any number of operands of any class.
    Generic,
}

fn split_classes(classes: &[TermClass]) -> (Vec<(usize, Space)>, Vec<usize>) {
    let mut vars = Vec::new();
    let mut masks = Vec::new();
    for (i, class) in classes.iter().enumerate() {
        match class {
            TermClass::Variable(space) => vars.push((i, *space)),
            TermClass::Constant => masks.push(i),
        }
    }
    (vars, masks)
}

/// Kernel for a classification tuple and the order its operands
/// are handed to that kernel.
pub fn select_kernel(classes: &[TermClass]) -> (KernelKind, Vec<usize>) {
    if classes.len() != 3 {
        return (KernelKind::Generic, (0..classes.len()).collect());
    }
    let (vars, masks) = split_classes(classes);
    match (vars.as_slice(), masks.as_slice()) {
        ([(a, sa), (b, sb), (c, sc)], []) => {
            if sa == sb && sb == sc {
                (KernelKind::Triple(*sa), vec![*a, *b, *c])
            } else if sa == sb {
                (KernelKind::TripleSplit { pair: *sa }, vec![*a, *b, *c])
            } else if sa == sc {
                (KernelKind::TripleSplit { pair: *sa }, vec![*a, *c, *b])
            } else {
                (KernelKind::TripleSplit { pair: *sb }, vec![*b, *c, *a])
            }
        }
        ([(a, sa), (b, sb)], [m]) => {
            if sa == sb {
                (KernelKind::TripleOneMask(*sa), vec![*a, *b, *m])
            } else if *sa == Space::Fine {
                (KernelKind::TripleSplitMask, vec![*a, *b, *m])
            } else {
                (KernelKind::TripleSplitMask, vec![*b, *a, *m])
            }
        }
        ([(a, s)], [m0, m1]) => {
            (KernelKind::TripleTwoMasks(*s), vec![*a, *m0, *m1])
        }
        ([], [m0, m1, m2]) => (KernelKind::TripleThreeMasks, vec![*m0, *m1, *m2]),
        _ => (KernelKind::Generic, (0..classes.len()).collect()),
    }
}

/// Memoised `select_kernel`, one per plan.
#[derive(Debug, Default)]
pub struct KernelTable {
    choices: HashMap<Vec<TermClass>, (KernelKind, Vec<usize>)>,
}

impl KernelTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&mut self, classes: &[TermClass]) -> &(KernelKind, Vec<usize>) {
        if !self.choices.contains_key(classes) {
            let choice = select_kernel(classes);
            self.choices.insert(classes.to_vec(), choice);
        }
        &self.choices[classes]
    }

    /// Number of distinct classification tuples seen.
    pub fn len(&self) -> usize {
        self.choices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.choices.is_empty()
    }
}

/// Coefficient-terms of one entry sharing a kernel,
/// operands already in kernel order.
#[derive(Debug, Clone, PartialEq)]
pub struct KernelGroup<const GRID_DIMENSION: usize> {
    pub kind: KernelKind,
    pub terms: Vec<Vec<Operand<GRID_DIMENSION>>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntryKernels<const GRID_DIMENSION: usize> {
    /// Entry of the product stencil.
    pub entry: usize,
    pub groups: Vec<KernelGroup<GRID_DIMENSION>>,
}

pub fn group_terms<const GRID_DIMENSION: usize>(
    compute_entries: &[ComputeEntry<GRID_DIMENSION>],
    table: &mut KernelTable,
) -> Vec<EntryKernels<GRID_DIMENSION>> {
    compute_entries
        .iter()
        .map(|compute| {
            let mut groups: Vec<KernelGroup<GRID_DIMENSION>> = Vec::new();
            for term in &compute.terms {
                let classes: Vec<TermClass> =
                    term.iter().map(|o| o.class()).collect();
                let (kind, order) = table.lookup(&classes);
                let ordered = order.iter().map(|i| term[*i]).collect();
                match groups.iter_mut().find(|g| g.kind == *kind) {
                    Some(group) => group.terms.push(ordered),
                    None => groups.push(KernelGroup {
                        kind: *kind,
                        terms: vec![ordered],
                    }),
                }
            }
            EntryKernels {
                entry: compute.entry,
                groups,
            }
        })
        .collect()
}

/// Number of coefficient-terms handled by each kernel.
pub fn kernel_census<const GRID_DIMENSION: usize>(
    kernels: &[EntryKernels<GRID_DIMENSION>],
) -> BTreeMap<KernelKind, usize> {
    let mut census = BTreeMap::new();
    for entry in kernels {
        for group in &entry.groups {
            *census.entry(group.kind).or_insert(0) += group.terms.len();
        }
    }
    census
}

/// Variable operand bound to one box: `data[i + offset]`
/// for stream index `i`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Var<'a> {
    pub data: &'a [f64],
    pub offset: isize,
}

impl<'a> Var<'a> {
    #[inline]
    fn at(&self, i: usize) -> f64 {
        self.data[(i as isize + self.offset) as usize]
    }
}

/// Masked constant bound to one box.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Masked<'a> {
    pub words: &'a [u32],
    pub offset: isize,
    pub bit: u32,
    pub value: f64,
}

impl<'a> Masked<'a> {
    #[inline]
    fn at(&self, i: usize) -> f64 {
        if (self.words[(i as isize + self.offset) as usize] >> self.bit) & 1 == 1 {
            self.value
        } else {
            0.0
        }
    }
}

/// Operand bound to storage, with the stream it advances with.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Resolved<'a> {
    Var { stream: usize, var: Var<'a> },
    Masked(Masked<'a>),
}

impl<'a> Resolved<'a> {
    #[inline]
    fn at(&self, streams: &[usize; STREAMS]) -> f64 {
        match self {
            Resolved::Var { stream, var } => var.at(streams[*stream]),
            Resolved::Masked(m) => m.at(streams[MASK]),
        }
    }

    #[track_caller]
    fn unwrap_var(&self) -> Var<'a> {
        match self {
            Resolved::Var { var, .. } => *var,
            _ => panic!("ERROR: Not a variable operand"),
        }
    }

    #[track_caller]
    fn unwrap_masked(&self) -> Masked<'a> {
        match self {
            Resolved::Masked(m) => *m,
            _ => panic!("ERROR: Not a masked operand"),
        }
    }
}

fn vars3<'a>(term: &[Resolved<'a>]) -> [Var<'a>; 3] {
    [term[0].unwrap_var(), term[1].unwrap_var(), term[2].unwrap_var()]
}

/// Accumulate one group into the entry values `out` over a box loop.
pub(crate) fn run_group<const GRID_DIMENSION: usize>(
    kind: KernelKind,
    terms: &[Vec<Resolved>],
    lp: &BoxLoop<GRID_DIMENSION>,
    out: &mut [f64],
) {
    match kind {
        KernelKind::Triple(space) => {
            let s = space_stream(space);
            let terms: Vec<[Var; 3]> = terms.iter().map(|t| vars3(t)).collect();
            lp.for_each(|ix| {
                let i = ix[s];
                let mut acc = 0.0;
                for [a, b, c] in &terms {
                    acc = (a.at(i) * b.at(i)).mul_add(c.at(i), acc);
                }
                out[ix[RESULT]] += acc;
            });
        }
        KernelKind::TripleOneMask(space) => {
            let s = space_stream(space);
            let terms: Vec<(Var, Var, Masked)> = terms
                .iter()
                .map(|t| (t[0].unwrap_var(), t[1].unwrap_var(), t[2].unwrap_masked()))
                .collect();
            lp.for_each(|ix| {
                let i = ix[s];
                let k = ix[MASK];
                let mut acc = 0.0;
                for (a, b, m) in &terms {
                    acc = (a.at(i) * b.at(i)).mul_add(m.at(k), acc);
                }
                out[ix[RESULT]] += acc;
            });
        }
        KernelKind::TripleTwoMasks(space) => {
            let s = space_stream(space);
            let terms: Vec<(Var, Masked, Masked)> = terms
                .iter()
                .map(|t| {
                    (t[0].unwrap_var(), t[1].unwrap_masked(), t[2].unwrap_masked())
                })
                .collect();
            lp.for_each(|ix| {
                let i = ix[s];
                let k = ix[MASK];
                let mut acc = 0.0;
                for (a, m0, m1) in &terms {
                    acc = (m0.at(k) * m1.at(k)).mul_add(a.at(i), acc);
                }
                out[ix[RESULT]] += acc;
            });
        }
        KernelKind::TripleThreeMasks => {
            let terms: Vec<[Masked; 3]> = terms
                .iter()
                .map(|t| {
                    [t[0].unwrap_masked(), t[1].unwrap_masked(), t[2].unwrap_masked()]
                })
                .collect();
            lp.for_each(|ix| {
                let k = ix[MASK];
                let mut acc = 0.0;
                for [m0, m1, m2] in &terms {
                    acc = (m0.at(k) * m1.at(k)).mul_add(m2.at(k), acc);
                }
                out[ix[RESULT]] += acc;
            });
        }
        KernelKind::TripleSplit { pair } => {
            let (p, q) = match pair {
                Space::Fine => (FINE, COARSE),
                Space::Coarse => (COARSE, FINE),
            };
            let terms: Vec<[Var; 3]> = terms.iter().map(|t| vars3(t)).collect();
            lp.for_each(|ix| {
                let i = ix[p];
                let j = ix[q];
                let mut acc = 0.0;
                for [a, b, c] in &terms {
                    acc = (a.at(i) * b.at(i)).mul_add(c.at(j), acc);
                }
                out[ix[RESULT]] += acc;
            });
        }
        KernelKind::TripleSplitMask => {
            let terms: Vec<(Var, Var, Masked)> = terms
                .iter()
                .map(|t| (t[0].unwrap_var(), t[1].unwrap_var(), t[2].unwrap_masked()))
                .collect();
            lp.for_each(|ix| {
                let i = ix[FINE];
                let j = ix[COARSE];
                let k = ix[MASK];
                let mut acc = 0.0;
                for (f, c, m) in &terms {
                    acc = (f.at(i) * c.at(j)).mul_add(m.at(k), acc);
                }
                out[ix[RESULT]] += acc;
            });
        }
        KernelKind::Generic => {
            lp.for_each(|ix| {
                let mut acc = 0.0;
                for term in terms {
                    let Some((last, rest)) = term.split_last() else {
                        acc += 1.0;
                        continue;
                    };
                    let mut product: f64 = 1.0;
                    for operand in rest {
                        product *= operand.at(ix);
                    }
                    acc = product.mul_add(last.at(ix), acc);
                }
                out[ix[RESULT]] += acc;
            });
        }
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    const FV: TermClass = TermClass::Variable(Space::Fine);
    const CV: TermClass = TermClass::Variable(Space::Coarse);
    const K: TermClass = TermClass::Constant;

    #[test]
    fn selection() {
        assert_eq!(select_kernel(&[FV, FV, FV]), (KernelKind::Triple(Space::Fine), vec![0, 1, 2]));
        assert_eq!(
            select_kernel(&[CV, FV, CV]),
            (KernelKind::TripleSplit { pair: Space::Coarse }, vec![0, 2, 1])
        );
        assert_eq!(
            select_kernel(&[CV, FV, FV]),
            (KernelKind::TripleSplit { pair: Space::Fine }, vec![1, 2, 0])
        );
        assert_eq!(
            select_kernel(&[K, CV, CV]),
            (KernelKind::TripleOneMask(Space::Coarse), vec![1, 2, 0])
        );
        assert_eq!(
            select_kernel(&[CV, K, FV]),
            (KernelKind::TripleSplitMask, vec![2, 0, 1])
        );
        assert_eq!(
            select_kernel(&[K, FV, K]),
            (KernelKind::TripleTwoMasks(Space::Fine), vec![1, 0, 2])
        );
        assert_eq!(select_kernel(&[K, K, K]).0, KernelKind::TripleThreeMasks);
        assert_eq!(select_kernel(&[FV, K]), (KernelKind::Generic, vec![0, 1]));
        assert_eq!(select_kernel(&[FV, FV, K, CV]).0, KernelKind::Generic);
    }

    #[test]
    fn table_memoises() {
        let mut table = KernelTable::new();
        assert!(table.is_empty());
        table.lookup(&[FV, FV, FV]);
        table.lookup(&[FV, FV, FV]);
        table.lookup(&[K, FV]);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn grouping_by_kind() {
        let var = |matrix| Operand::<1>::Variable {
            space: Space::Fine,
            matrix,
            entry: 0,
            shift: crate::util::vector![0],
        };
        let masked = Operand::<1>::Masked {
            value: 2.0,
            bit: 0,
            shift: crate::util::vector![0],
        };
        let compute = vec![ComputeEntry {
            entry: 3,
            terms: vec![
                vec![var(0), var(1), var(0)],
                vec![masked, var(1), var(0)],
                vec![var(1), var(1), var(1)],
            ],
        }];
        let mut table = KernelTable::new();
        let kernels = group_terms(&compute, &mut table);
        assert_eq!(kernels.len(), 1);
        assert_eq!(kernels[0].entry, 3);
        assert_eq!(kernels[0].groups.len(), 2);
        assert_eq!(kernels[0].groups[0].terms.len(), 2);
        // mask moved behind the variable operands
        assert_eq!(kernels[0].groups[1].terms[0][2], masked);
        let census = kernel_census(&kernels);
        assert_eq!(census[&KernelKind::Triple(Space::Fine)], 2);
        assert_eq!(census[&KernelKind::TripleOneMask(Space::Fine)], 1);
    }

    #[test]
    fn loops_agree_with_generic() {
        let data: Vec<f64> = (0..12).map(|i| i as f64 * 0.5 + 1.0).collect();
        let coarse: Vec<f64> = (0..6).map(|i| 3.0 - i as f64).collect();
        let words: Vec<u32> = (0..12).map(|i| if i % 3 == 0 { 0b110 } else { 0b010 }).collect();
        let lp = BoxLoop::<1>::new([8], [0, 1, 0, 2], [[1, 1, 0, 1]]);
        let fine = |offset| Resolved::Var {
            stream: FINE,
            var: Var { data: &data, offset },
        };
        let coarse_var = |offset| Resolved::Var {
            stream: COARSE,
            var: Var { data: &coarse, offset },
        };
        let mask = |bit, offset| {
            Resolved::Masked(Masked {
                words: &words,
                offset,
                bit,
                value: 1.5,
            })
        };
        let cases = [
            (KernelKind::Triple(Space::Fine), vec![fine(0), fine(1), fine(-1)]),
            (KernelKind::TripleOneMask(Space::Fine), vec![fine(0), fine(2), mask(2, 0)]),
            (KernelKind::TripleTwoMasks(Space::Fine), vec![fine(1), mask(1, 1), mask(2, -1)]),
            (KernelKind::TripleThreeMasks, vec![mask(1, 0), mask(1, 1), mask(2, 0)]),
            (
                KernelKind::TripleSplit { pair: Space::Fine },
                vec![fine(0), fine(-1), coarse_var(0)],
            ),
            (KernelKind::TripleSplitMask, vec![fine(1), coarse_var(0), mask(1, 0)]),
        ];
        for (kind, term) in cases {
            let terms = vec![term.clone(), term];
            let mut special = vec![0.0; 8];
            let mut generic = vec![0.0; 8];
            run_group(kind, &terms, &lp, &mut special);
            run_group(KernelKind::Generic, &terms, &lp, &mut generic);
            for (s, g) in special.iter().zip(&generic) {
                float_cmp::assert_approx_eq!(f64, *s, *g, epsilon = 1e-12);
            }
            assert!(generic.iter().any(|v| *v != 0.0), "{:?}", kind);
        }
    }

    #[test]
    fn generic_mixed_term_lengths() {
        let data: Vec<f64> = (0..8).map(|i| i as f64 * 0.5 + 1.0).collect();
        let coarse = vec![3.0];
        let words = vec![0b10u32; 8];
        let lp = BoxLoop::<1>::new([4], [0, 1, 0, 2], [[1, 1, 0, 1]]);
        let fine = |offset| Resolved::Var {
            stream: FINE,
            var: Var { data: &data, offset },
        };
        let terms = vec![
            vec![fine(0)],
            vec![
                fine(0),
                fine(1),
                Resolved::Masked(Masked {
                    words: &words,
                    offset: 0,
                    bit: 1,
                    value: 1.5,
                }),
                Resolved::Var {
                    stream: COARSE,
                    var: Var { data: &coarse, offset: 0 },
                },
            ],
            vec![],
        ];
        let mut out = vec![0.0; 4];
        run_group(KernelKind::Generic, &terms, &lp, &mut out);
        for (v, expected) in out.iter().zip([16.0, 25.5, 37.25, 51.25]) {
            float_cmp::assert_approx_eq!(f64, *v, expected, epsilon = 1e-12);
        }
    }
}
