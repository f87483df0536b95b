//! The agglomerate partition of one process: agglomerates, interface entities, ownership and
//! essential boundary flags.
//!
//! The partition is produced by an external partitioner and is immutable here. Every component
//! receives it explicitly, so there is no process-wide ownership state.
use crate::incidence::Incidence;
use itertools::Itertools;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

/// An interface entity as seen by one process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceEntity {
    /// Identifier shared by every process that sees the entity.
    pub global_id: usize,
    /// Rank of the single process owning the entity.
    pub owner: usize,
    /// Local fine dofs of the entity, in the canonical order agreed on by all sharing processes.
    pub dofs: Vec<usize>,
    /// Local agglomerates touching the entity.
    pub agglomerates: Vec<usize>,
    /// Other ranks with at least one agglomerate touching the entity.
    pub sharers: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgglomeratePartition {
    rank: usize,
    num_dofs: usize,
    agglomerate_dofs: Incidence,
    entity_global_ids: Vec<usize>,
    entity_owners: Vec<usize>,
    entity_dofs: Incidence,
    entity_agglomerates: Incidence,
    entity_sharers: Incidence,
    essential_boundary: Vec<bool>,
}

impl AgglomeratePartition {
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Number of local fine dofs.
    pub fn num_dofs(&self) -> usize {
        self.num_dofs
    }

    pub fn num_agglomerates(&self) -> usize {
        self.agglomerate_dofs.num_rows()
    }

    pub fn num_entities(&self) -> usize {
        self.entity_dofs.num_rows()
    }

    pub fn agglomerate_dofs(&self, agglomerate: usize) -> &[usize] {
        self.agglomerate_dofs.row(agglomerate)
    }

    pub fn entity_dofs(&self, entity: usize) -> &[usize] {
        self.entity_dofs.row(entity)
    }

    pub fn entity_size(&self, entity: usize) -> usize {
        self.entity_dofs.row_len(entity)
    }

    /// Local agglomerates touching the entity, in ascending order.
    pub fn entity_agglomerates(&self, entity: usize) -> &[usize] {
        self.entity_agglomerates.row(entity)
    }

    /// Other ranks touching the entity, in ascending order.
    pub fn entity_sharers(&self, entity: usize) -> &[usize] {
        self.entity_sharers.row(entity)
    }

    pub fn entity_owner(&self, entity: usize) -> usize {
        self.entity_owners[entity]
    }

    pub fn entity_global_id(&self, entity: usize) -> usize {
        self.entity_global_ids[entity]
    }

    pub fn is_owned(&self, entity: usize) -> bool {
        self.entity_owners[entity] == self.rank
    }

    pub fn owned_entities(&self) -> impl '_ + Iterator<Item = usize> {
        (0..self.num_entities()).filter(move |&e| self.is_owned(e))
    }

    pub fn is_essential(&self, dof: usize) -> bool {
        self.essential_boundary[dof]
    }

    pub fn essential_boundary(&self) -> &[bool] {
        &self.essential_boundary
    }

    /// All ranks this process shares at least one entity with, in ascending order.
    pub fn neighbor_ranks(&self) -> Vec<usize> {
        self.entity_sharers
            .iter()
            .flatten()
            .copied()
            .sorted_unstable()
            .dedup()
            .collect()
    }

    /// Splits the dofs of an agglomerate into those belonging to no interface entity (interior)
    /// and those belonging to one (face), each in the agglomerate's local order.
    pub fn split_agglomerate_dofs(&self, agglomerate: usize) -> (Vec<usize>, Vec<usize>) {
        let face_dofs: FxHashSet<usize> = self.entity_dofs.iter().flatten().copied().collect();
        self.agglomerate_dofs(agglomerate)
            .iter()
            .copied()
            .partition(|dof| !face_dofs.contains(dof))
    }
}

/// Incrementally describes the partition of one process.
///
/// `build` checks the structural consistency of the description.
#[derive(Debug, Clone)]
pub struct PartitionBuilder {
    rank: usize,
    num_dofs: usize,
    agglomerate_dofs: Incidence,
    entities: Vec<InterfaceEntity>,
    essential_boundary: Option<Vec<bool>>,
}

impl PartitionBuilder {
    pub fn new(rank: usize, num_dofs: usize) -> Self {
        Self {
            rank,
            num_dofs,
            agglomerate_dofs: Incidence::new(),
            entities: Vec::new(),
            essential_boundary: None,
        }
    }

    /// Adds an agglomerate with the given local fine dofs. The order of `dofs` is the row order of
    /// the agglomerate's candidate vectors and local matrices.
    pub fn with_agglomerate(mut self, dofs: &[usize]) -> Self {
        self.agglomerate_dofs.push_row(dofs);
        self
    }

    pub fn with_entity(mut self, entity: InterfaceEntity) -> Self {
        self.entities.push(entity);
        self
    }

    pub fn with_essential_boundary(mut self, essential_boundary: Vec<bool>) -> Self {
        self.essential_boundary = Some(essential_boundary);
        self
    }

    /// # Panics
    ///
    /// Panics if the description is inconsistent: dof or agglomerate indices out of bounds,
    /// overlapping entities, duplicate global ids, an agglomerate touching an entity without
    /// containing all of its dofs, or an owner that is neither this rank nor a sharer. Every dof
    /// outside the entities must be interior to exactly one agglomerate, so uncovered dofs are
    /// rejected as well.
    pub fn build(self) -> AgglomeratePartition {
        let Self {
            rank,
            num_dofs,
            agglomerate_dofs,
            entities,
            essential_boundary,
        } = self;

        let essential_boundary = essential_boundary.unwrap_or_else(|| vec![false; num_dofs]);
        assert_eq!(
            essential_boundary.len(),
            num_dofs,
            "essential boundary flags must be given for every local dof"
        );

        let agglomerate_dof_sets: Vec<FxHashSet<usize>> = agglomerate_dofs
            .iter()
            .enumerate()
            .map(|(a, dofs)| {
                let set: FxHashSet<usize> = dofs.iter().copied().collect();
                assert_eq!(set.len(), dofs.len(), "agglomerate {} lists a dof twice", a);
                assert!(
                    dofs.iter().all(|&dof| dof < num_dofs),
                    "agglomerate {} references a dof out of bounds (num_dofs = {})",
                    a,
                    num_dofs
                );
                set
            })
            .collect();

        let mut entity_of_dof: FxHashMap<usize, usize> = FxHashMap::default();
        let mut seen_global_ids = FxHashSet::default();
        let mut entity_global_ids = Vec::with_capacity(entities.len());
        let mut entity_owners = Vec::with_capacity(entities.len());
        let mut entity_dofs = Incidence::new();
        let mut entity_agglomerates = Incidence::new();
        let mut entity_sharers = Incidence::new();

        for (e, entity) in entities.into_iter().enumerate() {
            assert!(!entity.dofs.is_empty(), "entity {} has no dofs", entity.global_id);
            assert!(
                seen_global_ids.insert(entity.global_id),
                "global entity id {} appears twice on rank {}",
                entity.global_id,
                rank
            );
            for &dof in &entity.dofs {
                assert!(dof < num_dofs, "entity {} references dof {} out of bounds", entity.global_id, dof);
                if let Some(other) = entity_of_dof.insert(dof, e) {
                    panic!(
                        "dof {} belongs to both entity {} and entity {}",
                        dof, entity_global_ids[other], entity.global_id
                    );
                }
            }

            let agglomerates: Vec<usize> = entity.agglomerates.iter().copied().sorted_unstable().dedup().collect();
            for &a in &agglomerates {
                let dof_set = agglomerate_dof_sets
                    .get(a)
                    .unwrap_or_else(|| panic!("entity {} references unknown agglomerate {}", entity.global_id, a));
                assert!(
                    entity.dofs.iter().all(|dof| dof_set.contains(dof)),
                    "agglomerate {} touches entity {} but does not contain all of its dofs",
                    a,
                    entity.global_id
                );
            }

            let sharers: Vec<usize> = entity.sharers.iter().copied().sorted_unstable().dedup().collect();
            assert!(
                !sharers.contains(&rank),
                "rank {} lists itself as a sharer of entity {}",
                rank,
                entity.global_id
            );
            assert!(
                entity.owner == rank || sharers.contains(&entity.owner),
                "owner {} of entity {} is neither this rank ({}) nor a sharer",
                entity.owner,
                entity.global_id,
                rank
            );

            entity_global_ids.push(entity.global_id);
            entity_owners.push(entity.owner);
            entity_dofs.push_row(&entity.dofs);
            entity_agglomerates.push_row(&agglomerates);
            entity_sharers.push_row(&sharers);
        }

        let dof_agglomerates = agglomerate_dofs.transpose(num_dofs);
        for dof in (0..num_dofs).filter(|dof| !entity_of_dof.contains_key(dof)) {
            let count = dof_agglomerates.row_len(dof);
            assert_eq!(
                count, 1,
                "dof {} belongs to no entity and must be interior to exactly one agglomerate, found {}",
                dof, count
            );
        }

        AgglomeratePartition {
            rank,
            num_dofs,
            agglomerate_dofs,
            entity_global_ids,
            entity_owners,
            entity_dofs,
            entity_agglomerates,
            entity_sharers,
            essential_boundary,
        }
    }
}
