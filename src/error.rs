//! Error types for structured matrix products.

use thiserror::Error;

/// Errors raised while building or mutating a `StructMatrix`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MatrixError {
    /// Range and domain strides must divide one another in every dimension.
    #[error("range stride {range} and domain stride {domain} are incompatible")]
    InvalidStride { range: String, domain: String },

    /// Stencil offsets must lie on the finer of the two sampling lattices.
    #[error("stencil offset {offset} is not a multiple of stride {stride}")]
    InvalidOffset { offset: String, stride: String },

    /// Entry index past the end of the stencil.
    #[error("stencil entry {0} out of range")]
    EntryOutOfRange(usize),

    /// Per point access to an entry stored as a single constant.
    #[error("stencil entry {0} is constant")]
    ConstantEntry(usize),

    /// Point is not an owned anchor point of this matrix.
    #[error("point {0} is not owned by this rank")]
    NotOwned(String),

    /// Data space does not match the local box list.
    #[error("data space has {found} boxes, expected {expected}")]
    DataSpaceMismatch { expected: usize, found: usize },

    /// Storage could not be reserved.
    #[error("failed to allocate {0} values")]
    Allocation(usize),
}

/// Errors raised by a `Communicator` or a ghost exchange.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CommError {
    /// Peer hung up before the exchange completed.
    #[error("rank {0} disconnected")]
    Disconnected(usize),

    /// Message addressed to a rank outside the communicator.
    #[error("rank {rank} outside communicator of size {size}")]
    InvalidRank { rank: usize, size: usize },

    /// Received payload does not match the exchange pattern.
    #[error("expected {expected} values from rank {rank}, received {found}")]
    PayloadSize {
        rank: usize,
        expected: usize,
        found: usize,
    },
}

/// Errors raised while planning or evaluating a matrix product.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MatmultError {
    /// More than two distinct sampling strides in one product.
    #[error("product uses {0} distinct data strides, at most two are supported")]
    TooManyStrides(usize),

    /// Two data strides that are not multiples of each other.
    #[error("data strides {fine} and {coarse} are not nested")]
    IncomparableStrides { fine: String, coarse: String },

    /// Domain of one factor does not match the range of the next.
    #[error("term {term} has domain stride {domain}, term {next} has range stride {range}")]
    StrideMismatch {
        term: usize,
        next: usize,
        domain: String,
        range: String,
    },

    /// Product coefficients would vary within a single stencil entry.
    #[error("stride {stride} of term {term} does not divide the product data stride {data_stride}")]
    NonUniformStencil {
        term: usize,
        stride: String,
        data_stride: String,
    },

    /// Periodic length not divisible by the product data stride.
    #[error("periodic length {period} is not a multiple of stride {stride}")]
    PeriodicStride { period: String, stride: String },

    /// Term refers to a matrix that was not supplied.
    #[error("term {term} refers to matrix {matrix}, only {available} supplied")]
    TermOutOfRange {
        term: usize,
        matrix: usize,
        available: usize,
    },

    /// Terms and transpose flags have different lengths.
    #[error("{terms} terms but {transposes} transpose flags")]
    TransposeCount { terms: usize, transposes: usize },

    /// No term supplied, or no combination of entries forms a product.
    #[error("product has no stencil entries")]
    EmptyProduct,

    /// Input matrices live on different grids.
    #[error("matrix {0} is defined on a different grid")]
    GridMismatch(usize),

    /// Bitmask field holds one bit per term.
    #[error("{0} terms exceed the bitmask width")]
    TooManyTerms(usize),

    /// Lifecycle operation called out of order.
    #[error("cannot {operation} a plan in state {state}")]
    InvalidState {
        operation: &'static str,
        state: String,
    },

    #[error(transparent)]
    Matrix(#[from] MatrixError),

    #[error(transparent)]
    Communication(#[from] CommError),
}

/// Render a coordinate for an error message.
pub(crate) fn coord_string<const GRID_DIMENSION: usize>(
    c: &crate::util::Coord<GRID_DIMENSION>,
) -> String {
    format!("{:?}", c.as_slice())
}
