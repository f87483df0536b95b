use super::{strip_candidates, strip_partition};
use amge::comm::SerialComm;
use amge::level::{build_level, LevelBuild, LevelConfig, LevelStage};
use amge::partition::PartitionBuilder;
use amge::tentative::{Augmentation, NodeCoordinates, PolynomialOrder, SpatialDim};
use nalgebra::DMatrix;
use util::spd_test_matrix;

fn strip_coords() -> NodeCoordinates {
    NodeCoordinates::from_node_major(1, &(0..10).map(|x| x as f64).collect::<Vec<_>>())
}

#[test]
fn level_build_walks_through_all_stages() {
    let partition = strip_partition(vec![false; 10]);
    let candidates = strip_candidates(&partition);

    let build = LevelBuild::new(SerialComm, LevelConfig::default());
    assert_eq!(build.stage(), LevelStage::Unformed);
    let build = build.with_partition(&partition, None).unwrap();
    assert_eq!(build.stage(), LevelStage::PartitionKnown);
    let build = build.with_candidates(candidates).unwrap();
    assert_eq!(build.stage(), LevelStage::LocalBasisComputed);
    let build = build.reduce().unwrap();
    assert_eq!(build.stage(), LevelStage::Reduced);
    let build = build.orthogonalize();
    assert_eq!(build.stage(), LevelStage::Orthogonalized);
    let build = build.assemble(None).unwrap();
    assert_eq!(build.stage(), LevelStage::Assembled);
    assert_eq!(build.prolongator().num_coarse_dofs(), 9);
    assert!(build.schur().is_none());
    let build = build.ready();
    assert_eq!(build.stage(), LevelStage::Ready);

    let level = build.into_level();
    assert_eq!(level.entity_coarse_dofs(), &[2, 2, 1, 2, 2]);
    assert_eq!(level.prolongator().global_columns(), 0..9);
}

#[test]
fn stages_are_ordered() {
    assert!(LevelStage::Unformed < LevelStage::PartitionKnown);
    assert!(LevelStage::Reduced < LevelStage::Orthogonalized);
    assert!(LevelStage::Assembled < LevelStage::Ready);
}

#[test]
fn build_level_with_augmentation_only() {
    let partition = strip_partition(vec![false; 10]);
    let coords = strip_coords();
    let config = LevelConfig {
        augmentation: Augmentation::Polynomials(PolynomialOrder::Linear),
        ..LevelConfig::default()
    };
    let level = build_level(SerialComm, config, &partition, Some(&coords), None, None).unwrap();
    assert_eq!(level.entity_coarse_dofs(), &[2, 2, 1, 2, 2]);

    let with_candidates = build_level(
        SerialComm,
        config,
        &partition,
        Some(&coords),
        Some(strip_candidates(&partition)),
        None,
    )
    .unwrap();
    // Candidates already contain the polynomials
    assert_eq!(with_candidates.entity_coarse_dofs(), level.entity_coarse_dofs());
}

#[test]
fn build_level_with_interior_elimination() {
    let partition = PartitionBuilder::new(0, 7)
        .with_agglomerate(&[0, 1, 2, 3])
        .with_agglomerate(&[3, 4, 5, 6])
        .with_entity(super::entity(0, &[3], &[0, 1]))
        .build();
    let config = LevelConfig {
        augmentation: Augmentation::Polynomials(PolynomialOrder::Constant),
        ..LevelConfig::default()
    };
    let matrices = vec![spd_test_matrix(4, 0.0), spd_test_matrix(4, 1.0)];
    let level = build_level(SerialComm, config, &partition, None, None, Some(&matrices)).unwrap();

    assert_eq!(level.entity_coarse_dofs(), &[1]);
    let schur = level.schur().unwrap();
    assert_eq!(schur.num_face_dofs(), 1);
    assert_eq!(schur.num_interior_dofs(), 6);

    let (prolongator, schur) = level.into_parts();
    assert_eq!(prolongator.num_coarse_dofs(), 1);
    assert!(schur.is_some());
}

#[test]
fn missing_inputs_are_errors() {
    let partition = strip_partition(vec![false; 10]);

    // Linear polynomials need coordinates
    let config = LevelConfig {
        augmentation: Augmentation::Polynomials(PolynomialOrder::Linear),
        ..LevelConfig::default()
    };
    assert!(LevelBuild::new(SerialComm, config)
        .with_partition(&partition, None)
        .is_err());

    // Without augmentation there is nothing to build a coarse space from
    let build = LevelBuild::new(SerialComm, LevelConfig::default())
        .with_partition(&partition, None)
        .unwrap();
    assert!(build.without_candidates().is_err());

    // Wrong number of candidate matrices
    let build = LevelBuild::new(SerialComm, LevelConfig::default())
        .with_partition(&partition, None)
        .unwrap();
    let mut candidates = strip_candidates(&partition);
    candidates.pop();
    assert!(build.with_candidates(candidates).is_err());

    // Wrong number of candidate rows
    let build = LevelBuild::new(SerialComm, LevelConfig::default())
        .with_partition(&partition, None)
        .unwrap();
    let mut candidates = strip_candidates(&partition);
    candidates[1] = DMatrix::zeros(3, 2);
    assert!(build.with_candidates(candidates).is_err());
}

#[test]
fn coordinates_not_matching_the_augmentation_are_errors() {
    // Three 2D nodes with two dofs each, all in one entity
    let dofs: Vec<usize> = (0..6).collect();
    let partition = PartitionBuilder::new(0, 6)
        .with_agglomerate(&dofs)
        .with_entity(super::entity(0, &dofs, &[0]))
        .build();
    let coords = NodeCoordinates::from_node_major(2, &[0.0, 0.0, 1.0, 0.0, 0.0, 1.0]);
    let rigid = |dim| LevelConfig {
        augmentation: Augmentation::RigidBodyModes(dim),
        ..LevelConfig::default()
    };

    let level = build_level(SerialComm, rigid(SpatialDim::Two), &partition, Some(&coords), None, None).unwrap();
    assert_eq!(level.entity_coarse_dofs(), &[3]);

    // Three dimensional modes from planar coordinates
    let result = build_level(SerialComm, rigid(SpatialDim::Three), &partition, Some(&coords), None, None);
    assert!(result.is_err());

    // Too few nodes for the dofs of the partition
    let two_nodes = NodeCoordinates::from_node_major(2, &[0.0, 0.0, 1.0, 0.0]);
    assert!(LevelBuild::new(SerialComm, rigid(SpatialDim::Two))
        .with_partition(&partition, Some(&two_nodes))
        .is_err());
    let linear = LevelConfig {
        augmentation: Augmentation::Polynomials(PolynomialOrder::Linear),
        ..LevelConfig::default()
    };
    assert!(LevelBuild::new(SerialComm, linear)
        .with_partition(&partition, Some(&coords))
        .is_err());

    // An entity that does not split into whole nodes
    let odd = PartitionBuilder::new(0, 6)
        .with_agglomerate(&dofs)
        .with_entity(super::entity(0, &[0, 1, 2], &[0]))
        .with_entity(super::entity(1, &[3, 4, 5], &[0]))
        .build();
    assert!(LevelBuild::new(SerialComm, rigid(SpatialDim::Two))
        .with_partition(&odd, Some(&coords))
        .is_err());
}

#[test]
fn partition_of_another_rank_is_an_error() {
    let partition = PartitionBuilder::new(1, 2).with_agglomerate(&[0, 1]).build();
    let result = LevelBuild::new(SerialComm, LevelConfig::default()).with_partition(&partition, None);
    assert!(result.is_err());
}

#[test]
fn singular_agglomerate_matrix_fails_assembly() {
    let partition = PartitionBuilder::new(0, 7)
        .with_agglomerate(&[0, 1, 2, 3])
        .with_agglomerate(&[3, 4, 5, 6])
        .with_entity(super::entity(0, &[3], &[0, 1]))
        .build();
    let config = LevelConfig {
        augmentation: Augmentation::Polynomials(PolynomialOrder::Constant),
        ..LevelConfig::default()
    };
    let matrices = vec![DMatrix::zeros(4, 4), spd_test_matrix(4, 1.0)];
    let result = build_level(SerialComm, config, &partition, None, None, Some(&matrices));
    assert!(result.is_err());
}

#[test]
fn level_config_deserializes_with_defaults() {
    let json = r#"{
        "augmentation": { "RigidBodyModes": "Two" },
        "smoother": { "degree": 5 },
        "tentative": { "avoid_essential_boundary": false }
    }"#;
    let config: LevelConfig = serde_json::from_str(json).unwrap();
    assert_eq!(config.augmentation, Augmentation::RigidBodyModes(SpatialDim::Two));
    assert_eq!(config.smoother.degree, 5);
    assert_eq!(config.smoother.power_iterations, 20);
    assert!(!config.tentative.avoid_essential_boundary);
    assert_eq!(config.tentative.svd_tolerance, 1e-10);
    assert_eq!(config.face_solver, LevelConfig::default().face_solver);
}
