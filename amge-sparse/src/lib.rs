//! Linear operator plumbing shared by the `amge` coarse-space construction.
//!
//! Nothing in here knows about agglomerates or interface entities; the Schur solver and
//! smoother in `amge` are built on top of these pieces.

pub mod cg;
pub mod smoother;

pub extern crate nalgebra;
pub extern crate nalgebra_sparse;

pub use cg::{
    CgOutput, ConjugateGradient, IdentityOperator, LinearOperator, RelativeResidualCriterion, SolveError,
    SolveErrorKind,
};
pub use smoother::{estimate_spectral_radius, PolynomialSmoother, SmootherConfig};
