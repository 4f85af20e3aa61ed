//! Products of structured grid matrices.
//!
//! A product is planned symbolically first: the stencil of the result, which
//! of its entries are constant, and the storage and ghost exchange every input
//! needs. Numeric evaluation then runs specialised loops over the boxes of
//! the product grid, coarsened when range and domain are both sampled coarser
//! than the base grid.
pub mod algebra;
mod bitmask;
mod context;
mod engine;
mod facade;
mod kernels;
mod naive;
mod parameters;
mod plan;
pub mod planner;

pub use algebra::Term;
pub use bitmask::*;
pub use context::*;
pub use facade::*;
pub use kernels::{kernel_census, select_kernel, EntryKernels, KernelGroup, KernelKind, KernelTable};
pub use naive::*;
pub use parameters::*;
pub use plan::*;
pub use planner::{Space, TermClass};
