//! Building one level of the coarse hierarchy.
//!
//! The build walks through the stages
//! `Unformed -> PartitionKnown -> LocalBasisComputed -> Reduced -> Orthogonalized -> Assembled -> Ready`.
//! Each transition consumes the build and returns it in the next stage, so going back is not
//! expressible. A failed precondition aborts the build with an error.
use crate::comm::Communicator;
use crate::partition::AgglomeratePartition;
use crate::reduce::{ReducedContributions, SharedEntityReducer};
use crate::schur::{FaceSolver, SchurComplementReducer};
use crate::tentative::{Augmentation, NodeCoordinates, TentativeConfig, TentativeProlongator, TentativeProlongatorBuilder};
use amge_sparse::SmootherConfig;
use eyre::eyre;
use log::{debug, info};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LevelStage {
    Unformed,
    PartitionKnown,
    LocalBasisComputed,
    Reduced,
    Orthogonalized,
    Assembled,
    Ready,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelConfig {
    pub tentative: TentativeConfig,
    pub augmentation: Augmentation,
    pub smoother: SmootherConfig,
    pub face_solver: FaceSolver,
}

pub trait Stage {
    const STAGE: LevelStage;
}

#[derive(Debug)]
pub struct Unformed;

#[derive(Debug)]
pub struct PartitionKnown<'a> {
    partition: &'a AgglomeratePartition,
    coords: Option<&'a NodeCoordinates>,
}

#[derive(Debug)]
pub struct LocalBasisComputed<'a> {
    partition: &'a AgglomeratePartition,
    coords: Option<&'a NodeCoordinates>,
    candidates: Vec<DMatrix<f64>>,
}

#[derive(Debug)]
pub struct Reduced<'a> {
    partition: &'a AgglomeratePartition,
    coords: Option<&'a NodeCoordinates>,
    reduced: ReducedContributions,
}

#[derive(Debug)]
pub struct Orthogonalized<'a> {
    partition: &'a AgglomeratePartition,
    builder: TentativeProlongatorBuilder<'a>,
}

#[derive(Debug)]
pub struct Assembled {
    prolongator: TentativeProlongator,
    schur: Option<SchurComplementReducer>,
}

#[derive(Debug)]
pub struct Ready {
    level: CoarseLevel,
}

impl Stage for Unformed {
    const STAGE: LevelStage = LevelStage::Unformed;
}

impl<'a> Stage for PartitionKnown<'a> {
    const STAGE: LevelStage = LevelStage::PartitionKnown;
}

impl<'a> Stage for LocalBasisComputed<'a> {
    const STAGE: LevelStage = LevelStage::LocalBasisComputed;
}

impl<'a> Stage for Reduced<'a> {
    const STAGE: LevelStage = LevelStage::Reduced;
}

impl<'a> Stage for Orthogonalized<'a> {
    const STAGE: LevelStage = LevelStage::Orthogonalized;
}

impl Stage for Assembled {
    const STAGE: LevelStage = LevelStage::Assembled;
}

impl Stage for Ready {
    const STAGE: LevelStage = LevelStage::Ready;
}

/// The products of one level build, handed to the next level.
#[derive(Debug, Clone)]
pub struct CoarseLevel {
    prolongator: TentativeProlongator,
    schur: Option<SchurComplementReducer>,
}

impl CoarseLevel {
    pub fn prolongator(&self) -> &TentativeProlongator {
        &self.prolongator
    }

    /// Number of coarse dofs of each local entity.
    pub fn entity_coarse_dofs(&self) -> &[usize] {
        self.prolongator.entity_coarse_dofs()
    }

    /// The interior elimination of the level, if nonconforming reduction was requested.
    pub fn schur(&self) -> Option<&SchurComplementReducer> {
        self.schur.as_ref()
    }

    pub fn into_parts(self) -> (TentativeProlongator, Option<SchurComplementReducer>) {
        (self.prolongator, self.schur)
    }
}

#[derive(Debug)]
pub struct LevelBuild<C, S> {
    comm: C,
    config: LevelConfig,
    state: S,
}

impl<C, S: Stage> LevelBuild<C, S> {
    pub fn stage(&self) -> LevelStage {
        S::STAGE
    }

    pub fn config(&self) -> &LevelConfig {
        &self.config
    }
}

fn advance<C, T: Stage>(from: LevelStage, comm: C, config: LevelConfig, state: T) -> LevelBuild<C, T> {
    debug!("Level build: {:?} -> {:?}", from, T::STAGE);
    LevelBuild { comm, config, state }
}

impl<C: Communicator> LevelBuild<C, Unformed> {
    pub fn new(comm: C, config: LevelConfig) -> Self {
        Self {
            comm,
            config,
            state: Unformed,
        }
    }

    /// Provides the partition of this process and, if the augmentation needs them, the node
    /// coordinates.
    pub fn with_partition<'a>(
        self,
        partition: &'a AgglomeratePartition,
        coords: Option<&'a NodeCoordinates>,
    ) -> eyre::Result<LevelBuild<C, PartitionKnown<'a>>> {
        if self.comm.rank() != partition.rank() {
            return Err(eyre!(
                "partition of rank {} given to communicator rank {}",
                partition.rank(),
                self.comm.rank()
            ));
        }
        self.config.augmentation.check_coordinates(coords, partition)?;
        let from = self.stage();
        Ok(advance(from, self.comm, self.config, PartitionKnown { partition, coords }))
    }
}

impl<'a, C: Communicator> LevelBuild<C, PartitionKnown<'a>> {
    /// Provides the candidate vectors of every local agglomerate, one row per agglomerate dof.
    pub fn with_candidates(self, candidates: Vec<DMatrix<f64>>) -> eyre::Result<LevelBuild<C, LocalBasisComputed<'a>>> {
        let from = self.stage();
        let LevelBuild { comm, config, state } = self;
        let PartitionKnown { partition, coords } = state;
        if candidates.len() != partition.num_agglomerates() {
            return Err(eyre!(
                "got {} candidate matrices for {} agglomerates",
                candidates.len(),
                partition.num_agglomerates()
            ));
        }
        for (a, matrix) in candidates.iter().enumerate() {
            let num_dofs = partition.agglomerate_dofs(a).len();
            if matrix.nrows() != num_dofs {
                return Err(eyre!(
                    "candidates of agglomerate {} have {} rows, expected {}",
                    a,
                    matrix.nrows(),
                    num_dofs
                ));
            }
        }
        let state = LocalBasisComputed {
            partition,
            coords,
            candidates,
        };
        Ok(advance(from, comm, config, state))
    }

    /// Continues without spectral candidates, so the coarse space consists of the augmentation
    /// columns alone.
    pub fn without_candidates(self) -> eyre::Result<LevelBuild<C, LocalBasisComputed<'a>>> {
        if self.config.augmentation == Augmentation::None {
            return Err(eyre!("a coarse space without candidates requires an augmentation"));
        }
        let partition = self.state.partition;
        let candidates = (0..partition.num_agglomerates())
            .map(|a| DMatrix::zeros(partition.agglomerate_dofs(a).len(), 0))
            .collect();
        self.with_candidates(candidates)
    }
}

impl<'a, C: Communicator> LevelBuild<C, LocalBasisComputed<'a>> {
    /// Merges the contributions of every entity on its owner. Collective.
    pub fn reduce(self) -> eyre::Result<LevelBuild<C, Reduced<'a>>> {
        let from = self.stage();
        let LevelBuild { comm, config, state } = self;
        let LocalBasisComputed {
            partition,
            coords,
            candidates,
        } = state;
        let reduced = SharedEntityReducer::new(partition, &comm).reduce(&candidates)?;
        let state = Reduced {
            partition,
            coords,
            reduced,
        };
        Ok(advance(from, comm, config, state))
    }
}

impl<'a, C: Communicator> LevelBuild<C, Reduced<'a>> {
    /// Turns the merged contributions of the owned entities into coarse dofs.
    pub fn orthogonalize(self) -> LevelBuild<C, Orthogonalized<'a>> {
        let from = self.stage();
        let LevelBuild { comm, config, state } = self;
        let Reduced {
            partition,
            coords,
            reduced,
        } = state;
        let mut builder = TentativeProlongatorBuilder::new(partition, config.tentative);
        let num_coarse = builder.insert_reduced(&reduced, config.augmentation, coords);
        debug!("Rank {}: {} local coarse dofs", partition.rank(), num_coarse);
        advance(from, comm, config, Orthogonalized { partition, builder })
    }
}

impl<'a, C: Communicator> LevelBuild<C, Orthogonalized<'a>> {
    /// Finalizes the prolongator and, if agglomerate matrices are given, sets up the interior
    /// elimination. Collective.
    pub fn assemble(self, agglomerate_matrices: Option<&[DMatrix<f64>]>) -> eyre::Result<LevelBuild<C, Assembled>> {
        let from = self.stage();
        let LevelBuild { comm, config, state } = self;
        let Orthogonalized { partition, builder } = state;
        let prolongator = builder.finalize(&comm)?;
        let schur = agglomerate_matrices
            .map(|matrices| SchurComplementReducer::from_partition(partition, matrices))
            .transpose()?;
        Ok(advance(from, comm, config, Assembled { prolongator, schur }))
    }
}

impl<C: Communicator> LevelBuild<C, Assembled> {
    pub fn prolongator(&self) -> &TentativeProlongator {
        &self.state.prolongator
    }

    pub fn schur(&self) -> Option<&SchurComplementReducer> {
        self.state.schur.as_ref()
    }

    pub fn ready(self) -> LevelBuild<C, Ready> {
        let from = self.stage();
        let LevelBuild { comm, config, state } = self;
        let Assembled { prolongator, schur } = state;
        info!(
            "Level ready on rank {}: {} coarse dofs (global {:?}), interior elimination: {}",
            comm.rank(),
            prolongator.num_coarse_dofs(),
            prolongator.global_columns(),
            schur.is_some()
        );
        let level = CoarseLevel { prolongator, schur };
        advance(from, comm, config, Ready { level })
    }
}

impl<C> LevelBuild<C, Ready> {
    pub fn level(&self) -> &CoarseLevel {
        &self.state.level
    }

    pub fn into_level(self) -> CoarseLevel {
        self.state.level
    }
}

/// Runs a complete level build.
///
/// `candidates` are the spectral candidate vectors per agglomerate, or `None` for a coarse space
/// built from the augmentation alone. `agglomerate_matrices` requests the interior elimination.
pub fn build_level<C: Communicator>(
    comm: C,
    config: LevelConfig,
    partition: &AgglomeratePartition,
    coords: Option<&NodeCoordinates>,
    candidates: Option<Vec<DMatrix<f64>>>,
    agglomerate_matrices: Option<&[DMatrix<f64>]>,
) -> eyre::Result<CoarseLevel> {
    let build = LevelBuild::new(comm, config).with_partition(partition, coords)?;
    let build = match candidates {
        Some(candidates) => build.with_candidates(candidates)?,
        None => build.without_candidates()?,
    };
    Ok(build
        .reduce()?
        .orthogonalize()
        .assemble(agglomerate_matrices)?
        .ready()
        .into_level())
}
