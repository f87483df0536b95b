//! Merging of per-entity candidate contributions onto the owning process.
use crate::comm::wire::{decode_entity_blocks, encode_entity_blocks};
use crate::comm::{CommError, CommTag, Communicator};
use crate::partition::AgglomeratePartition;
use log::debug;
use nalgebra::DMatrix;
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;

/// Restricts the candidate vectors of an agglomerate to the dofs of an entity.
///
/// Row `k` of the result is the row of `candidates` belonging to the `k`-th dof of the entity,
/// so the entity's dof order is preserved.
///
/// # Panics
///
/// Panics if `candidates` does not have one row per agglomerate dof, or if the agglomerate does
/// not contain every dof of the entity.
pub fn restrict_to_entity(
    partition: &AgglomeratePartition,
    agglomerate: usize,
    entity: usize,
    candidates: &DMatrix<f64>,
) -> DMatrix<f64> {
    let agglomerate_dofs = partition.agglomerate_dofs(agglomerate);
    assert_eq!(
        candidates.nrows(),
        agglomerate_dofs.len(),
        "candidates of agglomerate {} must have one row per agglomerate dof",
        agglomerate
    );
    let local_row: FxHashMap<usize, usize> = agglomerate_dofs
        .iter()
        .enumerate()
        .map(|(row, &dof)| (dof, row))
        .collect();
    let rows: Vec<usize> = partition
        .entity_dofs(entity)
        .iter()
        .map(|dof| {
            *local_row.get(dof).unwrap_or_else(|| {
                panic!(
                    "agglomerate {} does not contain dof {} of entity {}",
                    agglomerate,
                    dof,
                    partition.entity_global_id(entity)
                )
            })
        })
        .collect();
    candidates.select_rows(&rows)
}

/// Concatenates blocks with `nrows` rows column-wise, in iteration order.
///
/// # Panics
///
/// Panics if a block does not have `nrows` rows.
pub fn concatenate_columns<'a>(nrows: usize, blocks: impl IntoIterator<Item = &'a DMatrix<f64>>) -> DMatrix<f64> {
    let blocks: Vec<_> = blocks.into_iter().collect();
    let ncols = blocks.iter().map(|block| block.ncols()).sum();
    let mut result = DMatrix::zeros(nrows, ncols);
    let mut col = 0;
    for block in blocks {
        assert_eq!(
            block.nrows(),
            nrows,
            "contribution has {} rows, but the entity has {} dofs",
            block.nrows(),
            nrows
        );
        result
            .columns_mut(col, block.ncols())
            .copy_from(block);
        col += block.ncols();
    }
    result
}

/// Merged contributions, one slot per local entity.
///
/// Only the owner of an entity holds its merged matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct ReducedContributions {
    blocks: Vec<Option<DMatrix<f64>>>,
    num_senders: Vec<usize>,
}

impl ReducedContributions {
    pub fn num_entities(&self) -> usize {
        self.blocks.len()
    }

    /// The merged contribution of a local entity, or `None` if this process does not own it.
    pub fn get(&self, entity: usize) -> Option<&DMatrix<f64>> {
        self.blocks[entity].as_ref()
    }

    /// Number of processes whose blocks were merged for an owned entity (the owner included),
    /// or zero for an entity owned elsewhere.
    pub fn num_senders(&self, entity: usize) -> usize {
        self.num_senders[entity]
    }

    pub fn iter(&self) -> impl '_ + Iterator<Item = (usize, Option<&DMatrix<f64>>)> {
        self.blocks
            .iter()
            .enumerate()
            .map(|(entity, block)| (entity, block.as_ref()))
    }

    pub fn into_blocks(self) -> Vec<Option<DMatrix<f64>>> {
        self.blocks
    }
}

/// Delivers, to the owner of each interface entity, the column-wise concatenation of the
/// contributions of every agglomerate touching it.
///
/// Each process first concatenates the restrictions of its own incident agglomerates
/// (ascending local agglomerate id). The owner then concatenates the per-process blocks in
/// ascending sender rank, its own block included. The resulting column order, and therefore the
/// sign and order of the singular vectors computed from it, is the same on every run.
#[derive(Debug)]
pub struct SharedEntityReducer<'a, C> {
    partition: &'a AgglomeratePartition,
    comm: C,
}

impl<'a, C: Communicator> SharedEntityReducer<'a, C> {
    /// # Panics
    ///
    /// Panics if the communicator rank is not the rank of the partition.
    pub fn new(partition: &'a AgglomeratePartition, comm: C) -> Self {
        assert_eq!(
            comm.rank(),
            partition.rank(),
            "communicator rank does not match the partition rank"
        );
        Self { partition, comm }
    }

    /// The concatenated contribution of this process's agglomerates to an entity.
    pub fn local_block(&self, entity: usize, candidates: &[DMatrix<f64>]) -> DMatrix<f64> {
        let restricted: Vec<_> = self
            .partition
            .entity_agglomerates(entity)
            .iter()
            .map(|&a| restrict_to_entity(self.partition, a, entity, &candidates[a]))
            .collect();
        concatenate_columns(self.partition.entity_size(entity), &restricted)
    }

    /// Gathers the contributions of all entities on their owners.
    ///
    /// `candidates` holds one matrix per local agglomerate, with one row per agglomerate dof.
    /// Blocks until the block of every sharer of every owned entity has arrived.
    ///
    /// # Panics
    ///
    /// Panics on an inconsistent ownership table: a block received for an entity that is unknown
    /// or not owned here, a missing or duplicated sender, or a block whose row count differs from
    /// the entity size.
    pub fn reduce(&self, candidates: &[DMatrix<f64>]) -> Result<ReducedContributions, CommError> {
        let partition = self.partition;
        let rank = partition.rank();
        assert_eq!(
            candidates.len(),
            partition.num_agglomerates(),
            "expected one candidate matrix per agglomerate"
        );

        let local_blocks: Vec<DMatrix<f64>> = (0..partition.num_entities())
            .map(|e| self.local_block(e, candidates))
            .collect();

        // One message per neighbour, possibly without blocks
        let neighbors = partition.neighbor_ranks();
        let mut per_owner: BTreeMap<usize, Vec<(usize, &DMatrix<f64>)>> =
            neighbors.iter().map(|&n| (n, Vec::new())).collect();
        for (e, block) in local_blocks.iter().enumerate() {
            if !partition.is_owned(e) {
                let owner = partition.entity_owner(e);
                per_owner
                    .get_mut(&owner)
                    .expect("owner of a non-owned entity is always a sharer")
                    .push((partition.entity_global_id(e), block));
            }
        }
        let outgoing: BTreeMap<usize, Vec<u8>> = per_owner
            .into_iter()
            .map(|(owner, blocks)| (owner, encode_entity_blocks(blocks)))
            .collect();
        let received = self
            .comm
            .exchange(CommTag::ENTITY_CONTRIBUTIONS, &outgoing, &neighbors)?;

        let local_entity: FxHashMap<usize, usize> = (0..partition.num_entities())
            .map(|e| (partition.entity_global_id(e), e))
            .collect();
        let mut keyed: BTreeMap<(usize, usize), DMatrix<f64>> = BTreeMap::new();
        let mut num_received = 0;
        for (sender, bytes) in received {
            for (global_id, block) in decode_entity_blocks(sender, &bytes)? {
                let e = *local_entity.get(&global_id).unwrap_or_else(|| {
                    panic!("rank {} received a block for unknown entity {} from rank {}", rank, global_id, sender)
                });
                assert!(
                    partition.is_owned(e),
                    "rank {} received a block for entity {} owned by rank {}",
                    rank,
                    global_id,
                    partition.entity_owner(e)
                );
                assert!(
                    partition.entity_sharers(e).contains(&sender),
                    "rank {} is not a sharer of entity {}",
                    sender,
                    global_id
                );
                assert_eq!(
                    block.nrows(),
                    partition.entity_size(e),
                    "block from rank {} for entity {} has the wrong number of rows",
                    sender,
                    global_id
                );
                let previous = keyed.insert((global_id, sender), block);
                assert!(previous.is_none(), "rank {} sent two blocks for entity {}", sender, global_id);
                num_received += 1;
            }
        }

        let mut blocks = Vec::with_capacity(partition.num_entities());
        let mut num_senders = Vec::with_capacity(partition.num_entities());
        for (e, local) in local_blocks.into_iter().enumerate() {
            if !partition.is_owned(e) {
                blocks.push(None);
                num_senders.push(0);
                continue;
            }
            let global_id = partition.entity_global_id(e);
            keyed.insert((global_id, rank), local);
            let senders: Vec<usize> = keyed
                .range((global_id, 0)..=(global_id, usize::MAX))
                .map(|(&(_, sender), _)| sender)
                .collect();
            let mut expected: Vec<usize> = partition.entity_sharers(e).to_vec();
            expected.push(rank);
            expected.sort_unstable();
            assert_eq!(
                senders, expected,
                "entity {}: contributions arrived from ranks {:?}, expected {:?}",
                global_id, senders, expected
            );
            let merged = concatenate_columns(
                partition.entity_size(e),
                keyed
                    .range((global_id, 0)..=(global_id, usize::MAX))
                    .map(|(_, block)| block),
            );
            blocks.push(Some(merged));
            num_senders.push(senders.len());
        }

        debug!(
            "Rank {}: merged contributions of {} owned entities ({} remote blocks)",
            rank,
            num_senders.iter().filter(|&&n| n > 0).count(),
            num_received
        );
        Ok(ReducedContributions { blocks, num_senders })
    }
}
