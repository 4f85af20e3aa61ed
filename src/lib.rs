//! Products of distributed structured grid matrices.
//!
//! Matrices live on box decomposed grids and are described by a stencil of
//! offsets with constant or per point coefficients, optionally sampling their
//! range or domain with a stride as multigrid transfer operators do.
//! `matmult` computes their products, including Galerkin forms such as
//! `P^T A P`, across ranks connected by a `Communicator`.

pub mod build_info;
pub mod comm;
pub mod decomposition;
pub mod error;
pub mod grid;
pub mod matmult;
pub mod matrix;
pub mod stencil;
pub mod util;
