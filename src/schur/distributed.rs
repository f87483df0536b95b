use super::{face_numbering, SchurComplementReducer};
use crate::comm::wire::{decode_entity_offsets, decode_triplets, encode_entity_offsets, encode_triplets};
use crate::comm::{CommError, CommTag, Communicator};
use crate::partition::AgglomeratePartition;
use log::debug;
use nalgebra::DVector;
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::ops::Range;

/// Global numbering of the face dofs of one process.
///
/// Every face dof has a single owner. The owned dofs of a process form a contiguous range of
/// global indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaceDofMap {
    global_ids: Vec<usize>,
    owners: Vec<usize>,
    owned_range: Range<usize>,
    num_global: usize,
    neighbors: Vec<usize>,
}

impl FaceDofMap {
    /// # Panics
    ///
    /// Panics if `global_ids` and `owners` differ in length, or the owned range does not fit into
    /// the global dofs.
    pub fn new(
        global_ids: Vec<usize>,
        owners: Vec<usize>,
        owned_range: Range<usize>,
        num_global: usize,
        neighbors: Vec<usize>,
    ) -> Self {
        assert_eq!(global_ids.len(), owners.len(), "every face dof needs a global id and an owner");
        assert!(owned_range.end <= num_global, "owned range exceeds the number of global face dofs");
        assert!(
            global_ids.iter().all(|&id| id < num_global),
            "global face dof id out of bounds"
        );
        Self {
            global_ids,
            owners,
            owned_range,
            num_global,
            neighbors,
        }
    }

    /// The numbering of a single process owning all of its face dofs.
    pub fn serial(num_face_dofs: usize) -> Self {
        Self::new(
            (0..num_face_dofs).collect(),
            vec![0; num_face_dofs],
            0..num_face_dofs,
            num_face_dofs,
            Vec::new(),
        )
    }

    /// Numbers the face dofs of all processes: each owner numbers the dofs of its entities
    /// contiguously (in local entity order and canonical dof order) starting at its exclusive
    /// prefix sum, then sends the first index of every shared entity to its sharers.
    ///
    /// The local face dofs are ordered like [`face_numbering`]. This is a collective operation.
    ///
    /// # Panics
    ///
    /// Panics if the number of a non-owned entity does not arrive from its owner.
    pub fn from_partition<C: Communicator>(partition: &AgglomeratePartition, comm: &C) -> Result<Self, CommError> {
        let num_owned: usize = partition
            .owned_entities()
            .map(|e| partition.entity_size(e))
            .sum();
        let owned_start = comm.exclusive_scan_sum(CommTag::FACE_COUNT, num_owned)?;
        let num_global = comm.all_reduce_sum(CommTag::FACE_TOTAL, num_owned)?;

        let mut first_index: FxHashMap<usize, usize> = FxHashMap::default();
        let mut next = owned_start;
        for e in partition.owned_entities() {
            first_index.insert(partition.entity_global_id(e), next);
            next += partition.entity_size(e);
        }

        let neighbors = partition.neighbor_ranks();
        let outgoing: BTreeMap<usize, Vec<u8>> = neighbors
            .iter()
            .map(|&neighbor| {
                let offsets: Vec<(usize, usize)> = partition
                    .owned_entities()
                    .filter(|&e| partition.entity_sharers(e).contains(&neighbor))
                    .map(|e| {
                        let global_id = partition.entity_global_id(e);
                        (global_id, first_index[&global_id])
                    })
                    .collect();
                (neighbor, encode_entity_offsets(&offsets))
            })
            .collect();
        let received = comm.exchange(CommTag::FACE_NUMBERING, &outgoing, &neighbors)?;
        for (sender, bytes) in received {
            for (global_id, first) in decode_entity_offsets(sender, &bytes)? {
                first_index.insert(global_id, first);
            }
        }

        let mut global_ids = Vec::new();
        let mut owners = Vec::new();
        for e in 0..partition.num_entities() {
            let global_id = partition.entity_global_id(e);
            let first = *first_index.get(&global_id).unwrap_or_else(|| {
                panic!(
                    "rank {} did not receive the face numbering of entity {} from its owner {}",
                    partition.rank(),
                    global_id,
                    partition.entity_owner(e)
                )
            });
            for k in 0..partition.entity_size(e) {
                global_ids.push(first + k);
                owners.push(partition.entity_owner(e));
            }
        }

        debug!(
            "Rank {}: {} face dofs, owning global face dofs {}..{} of {}",
            partition.rank(),
            global_ids.len(),
            owned_start,
            owned_start + num_owned,
            num_global
        );
        debug_assert_eq!(global_ids.len(), face_numbering(partition).len());
        Ok(Self::new(
            global_ids,
            owners,
            owned_start..owned_start + num_owned,
            num_global,
            neighbors,
        ))
    }

    pub fn num_local(&self) -> usize {
        self.global_ids.len()
    }

    pub fn global_id(&self, face_dof: usize) -> usize {
        self.global_ids[face_dof]
    }

    pub fn owner(&self, face_dof: usize) -> usize {
        self.owners[face_dof]
    }

    pub fn owned_range(&self) -> Range<usize> {
        self.owned_range.clone()
    }

    pub fn num_global(&self) -> usize {
        self.num_global
    }

    pub fn neighbors(&self) -> &[usize] {
        &self.neighbors
    }
}

/// The rows of the face operator and reduced right-hand side owned by one process.
#[derive(Debug, Clone, PartialEq)]
pub struct DistributedFaceOperator {
    /// Owned rows, with global face dof columns.
    pub matrix: CsrMatrix<f64>,
    pub rhs: DVector<f64>,
    /// Global index of the first owned row.
    pub first_row: usize,
}

type Triplets = Vec<(usize, usize, f64)>;

/// Sorts triplets into the local ones and those destined for each neighbour.
struct TripletRouter<'a> {
    rank: usize,
    local: Triplets,
    outgoing: BTreeMap<usize, Triplets>,
    map: &'a FaceDofMap,
}

impl<'a> TripletRouter<'a> {
    fn new(rank: usize, map: &'a FaceDofMap) -> Self {
        Self {
            rank,
            local: Vec::new(),
            outgoing: map.neighbors().iter().map(|&n| (n, Vec::new())).collect(),
            map,
        }
    }

    fn push(&mut self, face_dof: usize, triplet: (usize, usize, f64)) {
        let owner = self.map.owner(face_dof);
        if owner == self.rank {
            self.local.push(triplet);
        } else {
            self.outgoing
                .get_mut(&owner)
                .unwrap_or_else(|| panic!("owner {} of face dof {} is not a neighbour", owner, face_dof))
                .push(triplet);
        }
    }

    /// Sends the routed triplets to their owners and returns every triplet of an owned row,
    /// local ones first, then by ascending sender rank.
    fn exchange<C: Communicator>(self, comm: &C, tag: CommTag) -> Result<Triplets, CommError> {
        let outgoing: BTreeMap<usize, Vec<u8>> = self
            .outgoing
            .iter()
            .map(|(&owner, triplets)| (owner, encode_triplets(triplets)))
            .collect();
        let received = comm.exchange(tag, &outgoing, self.map.neighbors())?;
        let mut triplets = self.local;
        for (sender, bytes) in received {
            triplets.extend(decode_triplets(sender, &bytes)?);
        }
        Ok(triplets)
    }
}

impl SchurComplementReducer {
    /// Assembles the owned rows of the global face operator and reduced right-hand side.
    ///
    /// The face part of `b` holds this process's contributions to the face right-hand side;
    /// contributions of all processes are summed by the owner. Schur entries of rows owned
    /// elsewhere are sent to their owner. This is a collective operation.
    ///
    /// # Panics
    ///
    /// Panics if the map does not cover the face dofs of the reducer, or a received entry falls
    /// outside the owned rows.
    pub fn assemble_distributed<C: Communicator>(
        &self,
        map: &FaceDofMap,
        b: &DVector<f64>,
        comm: &C,
    ) -> Result<DistributedFaceOperator, CommError> {
        assert_eq!(map.num_local(), self.num_face_dofs(), "face dof map does not match the reducer");
        let rank = comm.rank();

        let mut matrix_router = TripletRouter::new(rank, map);
        for (a, block) in self.blocks().iter().enumerate() {
            let schur = self.local_schur(a);
            for (k, &f) in block.face_dofs().iter().enumerate() {
                let row = map.global_id(f);
                for (l, &g) in block.face_dofs().iter().enumerate() {
                    matrix_router.push(f, (row, map.global_id(g), schur[(k, l)]));
                }
            }
        }
        let mut rhs_router = TripletRouter::new(rank, map);
        let r_f = self.assemble_schur_rhs(b);
        for (f, &value) in r_f.iter().enumerate() {
            rhs_router.push(f, (map.global_id(f), 0, value));
        }

        let matrix_triplets = matrix_router.exchange(comm, CommTag::SCHUR_FACE)?;
        let rhs_triplets = rhs_router.exchange(comm, CommTag::SCHUR_RHS)?;

        let owned = map.owned_range();
        let local_row = |row: usize| {
            assert!(
                owned.contains(&row),
                "rank {} received face row {} outside its owned rows {:?}",
                rank,
                row,
                owned
            );
            row - owned.start
        };

        let mut coo = CooMatrix::new(owned.len(), map.num_global());
        for (row, col, value) in matrix_triplets {
            coo.push(local_row(row), col, value);
        }
        let mut rhs = DVector::zeros(owned.len());
        for (row, _, value) in rhs_triplets {
            rhs[local_row(row)] += value;
        }

        Ok(DistributedFaceOperator {
            matrix: CsrMatrix::from(&coo),
            rhs,
            first_row: owned.start,
        })
    }
}
