use super::{entity, strip_partition};
use amge::partition::{InterfaceEntity, PartitionBuilder};
use util::assert_panics;

#[test]
fn strip_partition_accessors() {
    let partition = strip_partition(vec![false; 10]);
    assert_eq!(partition.rank(), 0);
    assert_eq!(partition.num_dofs(), 10);
    assert_eq!(partition.num_agglomerates(), 3);
    assert_eq!(partition.num_entities(), 5);

    assert_eq!(partition.agglomerate_dofs(1), &[3, 4, 5, 6, 7]);
    assert_eq!(partition.entity_dofs(3), &[6, 7]);
    assert_eq!(partition.entity_size(0), 3);
    assert_eq!(partition.entity_agglomerates(1), &[0, 1]);
    assert_eq!(partition.entity_global_id(4), 104);
    assert!(partition.entity_sharers(2).is_empty());
    assert_eq!(partition.owned_entities().collect::<Vec<_>>(), vec![0, 1, 2, 3, 4]);
    assert!(partition.neighbor_ranks().is_empty());
}

#[test]
fn entity_agglomerates_and_sharers_are_sorted_and_unique() {
    let partition = PartitionBuilder::new(1, 4)
        .with_agglomerate(&[0, 1])
        .with_agglomerate(&[1, 2, 3])
        .with_entity(InterfaceEntity {
            global_id: 7,
            owner: 0,
            dofs: vec![1],
            agglomerates: vec![1, 0, 1],
            sharers: vec![3, 0, 3],
        })
        .with_entity(InterfaceEntity {
            global_id: 8,
            owner: 1,
            dofs: vec![3, 2],
            agglomerates: vec![1],
            sharers: vec![2],
        })
        .build();

    assert_eq!(partition.entity_agglomerates(0), &[0, 1]);
    assert_eq!(partition.entity_sharers(0), &[0, 3]);
    assert_eq!(partition.entity_owner(0), 0);
    assert!(!partition.is_owned(0));
    assert!(partition.is_owned(1));
    assert_eq!(partition.owned_entities().collect::<Vec<_>>(), vec![1]);
    assert_eq!(partition.neighbor_ranks(), vec![0, 2, 3]);
    // Entity dofs keep their given order
    assert_eq!(partition.entity_dofs(1), &[3, 2]);
}

#[test]
fn split_agglomerate_dofs_keeps_local_order() {
    let partition = PartitionBuilder::new(0, 6)
        .with_agglomerate(&[4, 0, 3, 1])
        .with_agglomerate(&[3, 5, 2])
        .with_entity(entity(0, &[3], &[0, 1]))
        .build();

    assert_eq!(partition.split_agglomerate_dofs(0), (vec![4, 0, 1], vec![3]));
    assert_eq!(partition.split_agglomerate_dofs(1), (vec![5, 2], vec![3]));
}

#[test]
fn essential_boundary_defaults_to_none() {
    let partition = PartitionBuilder::new(0, 3).with_agglomerate(&[0, 1, 2]).build();
    assert_eq!(partition.essential_boundary(), &[false, false, false]);

    let mut essential = vec![false; 10];
    essential[0] = true;
    let partition = strip_partition(essential);
    assert!(partition.is_essential(0));
    assert!(!partition.is_essential(1));
}

#[test]
fn inconsistent_partitions_panic() {
    assert_panics!(PartitionBuilder::new(0, 3)
        .with_agglomerate(&[0, 1, 2])
        .with_essential_boundary(vec![false; 2])
        .build());

    // Dof listed twice in an agglomerate
    assert_panics!(PartitionBuilder::new(0, 3).with_agglomerate(&[0, 1, 1]).build());

    // Dof out of bounds
    assert_panics!(PartitionBuilder::new(0, 3).with_agglomerate(&[0, 3]).build());

    // Empty entity
    assert_panics!(PartitionBuilder::new(0, 3)
        .with_agglomerate(&[0, 1, 2])
        .with_entity(entity(0, &[], &[0]))
        .build());

    // Duplicate global id
    assert_panics!(PartitionBuilder::new(0, 3)
        .with_agglomerate(&[0, 1, 2])
        .with_entity(entity(5, &[0], &[0]))
        .with_entity(entity(5, &[1], &[0]))
        .build());

    // Overlapping entities
    assert_panics!(PartitionBuilder::new(0, 3)
        .with_agglomerate(&[0, 1, 2])
        .with_entity(entity(0, &[0, 1], &[0]))
        .with_entity(entity(1, &[1, 2], &[0]))
        .build());

    // Unknown agglomerate
    assert_panics!(PartitionBuilder::new(0, 3)
        .with_agglomerate(&[0, 1, 2])
        .with_entity(entity(0, &[0], &[1]))
        .build());

    // Agglomerate not containing the entity
    assert_panics!(PartitionBuilder::new(0, 3)
        .with_agglomerate(&[0, 1])
        .with_agglomerate(&[2])
        .with_entity(entity(0, &[1, 2], &[0, 1]))
        .build());

    // Self listed as sharer
    assert_panics!(PartitionBuilder::new(0, 3)
        .with_agglomerate(&[0, 1, 2])
        .with_entity(InterfaceEntity {
            sharers: vec![0],
            ..entity(0, &[0], &[0])
        })
        .build());

    // Owner unknown to the entity
    assert_panics!(PartitionBuilder::new(0, 3)
        .with_agglomerate(&[0, 1, 2])
        .with_entity(InterfaceEntity {
            owner: 2,
            sharers: vec![1],
            ..entity(0, &[0], &[0])
        })
        .build());

    // Dof 2 is in two agglomerates but in no entity
    assert_panics!(PartitionBuilder::new(0, 4)
        .with_agglomerate(&[0, 1, 2])
        .with_agglomerate(&[2, 3, 1])
        .with_entity(entity(0, &[1], &[0, 1]))
        .build());

    // Dof 3 is in neither an agglomerate nor an entity
    assert_panics!(PartitionBuilder::new(0, 4)
        .with_agglomerate(&[0, 1, 2])
        .with_entity(entity(0, &[2], &[0]))
        .build());
}

#[test]
fn partition_serializes_to_json() {
    let partition = strip_partition(vec![false; 10]);
    let json = serde_json::to_string(&partition).unwrap();
    let deserialized: amge::AgglomeratePartition = serde_json::from_str(&json).unwrap();
    assert_eq!(deserialized, partition);
}
