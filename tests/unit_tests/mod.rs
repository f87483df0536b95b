use amge::partition::{AgglomeratePartition, InterfaceEntity, PartitionBuilder};
use nalgebra::DMatrix;

mod incidence;
mod level;
mod orth;
mod partition;

pub fn entity(global_id: usize, dofs: &[usize], agglomerates: &[usize]) -> InterfaceEntity {
    InterfaceEntity {
        global_id,
        owner: 0,
        dofs: dofs.to_vec(),
        agglomerates: agglomerates.to_vec(),
        sharers: Vec::new(),
    }
}

/// A single-process strip of three agglomerates over ten dofs:
///
/// ```text
/// agglomerate 0: 0 1 2 3 4
/// agglomerate 1:       3 4 5 6 7
/// agglomerate 2:             6 7 8 9
/// ```
///
/// Entities are the sets of dofs with the same agglomerate membership: `{0, 1, 2}`, `{3, 4}`,
/// `{5}`, `{6, 7}` and `{8, 9}`.
pub fn strip_partition(essential_boundary: Vec<bool>) -> AgglomeratePartition {
    PartitionBuilder::new(0, 10)
        .with_agglomerate(&[0, 1, 2, 3, 4])
        .with_agglomerate(&[3, 4, 5, 6, 7])
        .with_agglomerate(&[6, 7, 8, 9])
        .with_entity(entity(100, &[0, 1, 2], &[0]))
        .with_entity(entity(101, &[3, 4], &[0, 1]))
        .with_entity(entity(102, &[5], &[1]))
        .with_entity(entity(103, &[6, 7], &[1, 2]))
        .with_entity(entity(104, &[8, 9], &[2]))
        .with_essential_boundary(essential_boundary)
        .build()
}

/// Constants and linears on each agglomerate of the strip, evaluated at `x = dof`.
pub fn strip_candidates(partition: &AgglomeratePartition) -> Vec<DMatrix<f64>> {
    (0..partition.num_agglomerates())
        .map(|a| {
            let dofs = partition.agglomerate_dofs(a);
            DMatrix::from_fn(dofs.len(), 2, |k, j| if j == 0 { 1.0 } else { dofs[k] as f64 })
        })
        .collect()
}
