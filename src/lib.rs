//! Coarse spaces for element-based algebraic multigrid on distributed agglomerate partitions.
//!
//! A level is built from an external partition of the fine dofs into agglomerates that meet at
//! interface entities. Candidate vectors of every agglomerate are merged on the owner of each
//! entity ([`reduce`]), turned into orthonormal coarse dofs of a tentative prolongator
//! ([`tentative`]), and optionally the agglomerate interiors are eliminated to obtain an
//! operator on face dofs only ([`schur`]). [`level`] drives the whole build.

pub mod comm;
pub mod incidence;
pub mod level;
pub mod partition;
pub mod reduce;
pub mod schur;
pub mod tentative;

pub extern crate amge_sparse;
pub extern crate nalgebra;
pub extern crate nalgebra_sparse;

pub use comm::{CommError, CommTag, Communicator, SerialComm, ThreadComm};
pub use level::{build_level, CoarseLevel, LevelBuild, LevelConfig, LevelStage};
pub use partition::{AgglomeratePartition, InterfaceEntity, PartitionBuilder};
pub use reduce::{ReducedContributions, SharedEntityReducer};
pub use schur::{AgglomerateBlock, FaceDofMap, SchurComplementReducer, SchurSmoother, SchurSolver};
pub use tentative::{TentativeConfig, TentativeProlongator, TentativeProlongatorBuilder};
