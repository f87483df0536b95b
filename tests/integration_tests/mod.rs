use amge::comm::ThreadComm;
use amge::partition::{AgglomeratePartition, InterfaceEntity, PartitionBuilder};
use nalgebra::DMatrix;

mod comm;

/// Runs `f` on `size` ranks connected by [`ThreadComm`], one thread per rank, and returns the
/// results in rank order.
pub fn run_ranks<T, F>(size: usize, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(ThreadComm) -> T + Sync,
{
    let comms = ThreadComm::create(size);
    let f = &f;
    std::thread::scope(|scope| {
        let handles: Vec<_> = comms
            .into_iter()
            .map(|comm| scope.spawn(move || f(comm)))
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("rank panicked"))
            .collect()
    })
}

/// Who owns the interface between ranks `r` and `r + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceOwner {
    Lower,
    Upper,
}

impl InterfaceOwner {
    fn owner(&self, lower_rank: usize) -> usize {
        match self {
            Self::Lower => lower_rank,
            Self::Upper => lower_rank + 1,
        }
    }
}

/// First global dof of rank `r` on the distributed line.
pub fn line_offset(rank: usize) -> usize {
    4 * rank
}

/// Number of global dofs of a line distributed over `size` ranks.
pub fn line_num_dofs(size: usize) -> usize {
    4 * size
}

/// One agglomerate per rank on a line of `4 * size` dofs.
///
/// Rank `r` holds global dofs `4r..4r + 4`, and for `r < size - 1` also the interface
/// `{4r + 4, 4r + 5}` shared with rank `r + 1`. Local dof `k` is global dof `4r + k`.
///
/// Entities, in local order: the interface with rank `r - 1` (if any), the dofs only this rank
/// holds (global id `r`), and the interface with rank `r + 1` (if any). Interfaces have global id
/// `1000 + lower rank`.
pub fn line_partition(rank: usize, size: usize, owner: InterfaceOwner) -> AgglomeratePartition {
    let has_left = rank > 0;
    let has_right = rank + 1 < size;
    let num_dofs = if has_right { 6 } else { 4 };
    let mut builder = PartitionBuilder::new(rank, num_dofs).with_agglomerate(&(0..num_dofs).collect::<Vec<_>>());
    if has_left {
        builder = builder.with_entity(InterfaceEntity {
            global_id: 1000 + rank - 1,
            owner: owner.owner(rank - 1),
            dofs: vec![0, 1],
            agglomerates: vec![0],
            sharers: vec![rank - 1],
        });
    }
    let own_dofs = if has_left { vec![2, 3] } else { vec![0, 1, 2, 3] };
    builder = builder.with_entity(InterfaceEntity {
        global_id: rank,
        owner: rank,
        dofs: own_dofs,
        agglomerates: vec![0],
        sharers: Vec::new(),
    });
    if has_right {
        builder = builder.with_entity(InterfaceEntity {
            global_id: 1000 + rank,
            owner: owner.owner(rank),
            dofs: vec![4, 5],
            agglomerates: vec![0],
            sharers: vec![rank + 1],
        });
    }
    builder.build()
}

/// The whole line on a single process, with the entities in the order in which the distributed
/// line numbers their coarse dofs.
pub fn serial_line_partition(size: usize) -> AgglomeratePartition {
    let num_dofs = line_num_dofs(size);
    let mut builder = PartitionBuilder::new(0, num_dofs);
    for r in 0..size {
        let start = line_offset(r);
        let end = (start + 6).min(num_dofs);
        builder = builder.with_agglomerate(&(start..end).collect::<Vec<_>>());
    }
    for r in 0..size {
        let start = line_offset(r);
        let own_dofs: Vec<usize> = if r == 0 { (0..4).collect() } else { vec![start + 2, start + 3] };
        builder = builder.with_entity(InterfaceEntity {
            global_id: r,
            owner: 0,
            dofs: own_dofs,
            agglomerates: vec![r],
            sharers: Vec::new(),
        });
        if r + 1 < size {
            builder = builder.with_entity(InterfaceEntity {
                global_id: 1000 + r,
                owner: 0,
                dofs: vec![start + 4, start + 5],
                agglomerates: vec![r, r + 1],
                sharers: Vec::new(),
            });
        }
    }
    builder.build()
}

/// Constants and the global coordinate `x = dof` on every agglomerate, where local dof `k` of
/// the partition is global dof `offset + k`.
pub fn line_candidates(partition: &AgglomeratePartition, offset: usize) -> Vec<DMatrix<f64>> {
    (0..partition.num_agglomerates())
        .map(|a| {
            let dofs = partition.agglomerate_dofs(a);
            DMatrix::from_fn(dofs.len(), 2, |k, j| if j == 0 { 1.0 } else { (offset + dofs[k]) as f64 })
        })
        .collect()
}
