//! Deterministic extra columns appended to entity contributions.
//!
//! These columns make sure the coarse space can represent low-order polynomials (scalar
//! problems) or rigid body modes (elasticity), either in addition to spectral candidates or in
//! place of them.
use crate::partition::AgglomeratePartition;
use eyre::eyre;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;

/// Coordinates of the mesh nodes, one column per node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeCoordinates {
    coords: DMatrix<f64>,
}

impl NodeCoordinates {
    /// Coordinates given as a `dim x num_nodes` matrix.
    pub fn new(coords: DMatrix<f64>) -> Self {
        Self { coords }
    }

    /// Coordinates given node by node, i.e. `[x0, y0, x1, y1, ...]` for `dim = 2`.
    ///
    /// # Panics
    ///
    /// Panics if the number of values is not a multiple of `dim`.
    pub fn from_node_major(dim: usize, values: &[f64]) -> Self {
        assert!(dim > 0, "spatial dimension must be positive");
        assert_eq!(values.len() % dim, 0, "number of coordinates must be a multiple of the dimension");
        Self::new(DMatrix::from_column_slice(dim, values.len() / dim, values))
    }

    pub fn dim(&self) -> usize {
        self.coords.nrows()
    }

    pub fn num_nodes(&self) -> usize {
        self.coords.ncols()
    }

    pub fn coordinate(&self, node: usize, component: usize) -> f64 {
        self.coords[(component, node)]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PolynomialOrder {
    Constant,
    Linear,
}

impl TryFrom<usize> for PolynomialOrder {
    type Error = eyre::Report;

    fn try_from(order: usize) -> Result<Self, Self::Error> {
        match order {
            0 => Ok(Self::Constant),
            1 => Ok(Self::Linear),
            _ => Err(eyre!("unsupported polynomial order {} (expected 0 or 1)", order)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpatialDim {
    One,
    Two,
    Three,
}

impl SpatialDim {
    pub fn value(&self) -> usize {
        match self {
            Self::One => 1,
            Self::Two => 2,
            Self::Three => 3,
        }
    }
}

impl TryFrom<usize> for SpatialDim {
    type Error = eyre::Report;

    fn try_from(dim: usize) -> Result<Self, Self::Error> {
        match dim {
            1 => Ok(Self::One),
            2 => Ok(Self::Two),
            3 => Ok(Self::Three),
            _ => Err(eyre!("unsupported spatial dimension {} (expected 1, 2 or 3)", dim)),
        }
    }
}

/// Which extra columns, if any, are appended to merged contributions before orthogonalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Augmentation {
    None,
    Polynomials(PolynomialOrder),
    RigidBodyModes(SpatialDim),
}

impl Default for Augmentation {
    fn default() -> Self {
        Self::None
    }
}

impl Augmentation {
    pub fn needs_coordinates(&self) -> bool {
        match self {
            Self::None | Self::Polynomials(PolynomialOrder::Constant) => false,
            Self::Polynomials(PolynomialOrder::Linear) | Self::RigidBodyModes(_) => true,
        }
    }

    /// Checks that `coords` can be evaluated at every dof of the partition.
    ///
    /// Linear polynomials need one node per dof. Rigid body modes need at least `dim`
    /// coordinate components, one node per `dim` dofs and entities whose size is a multiple of
    /// `dim`.
    pub fn check_coordinates(
        &self,
        coords: Option<&NodeCoordinates>,
        partition: &AgglomeratePartition,
    ) -> eyre::Result<()> {
        if !self.needs_coordinates() {
            return Ok(());
        }
        let coords = coords.ok_or_else(|| eyre!("{:?} requires node coordinates", self))?;
        let num_dofs = partition.num_dofs();
        let (min_dim, dofs_per_node) = match *self {
            Self::RigidBodyModes(dim) => (dim.value(), dim.value()),
            _ => (0, 1),
        };
        if coords.dim() < min_dim {
            return Err(eyre!(
                "{:?} requires {}-dimensional coordinates, got {}",
                self,
                min_dim,
                coords.dim()
            ));
        }
        let num_nodes = (num_dofs + dofs_per_node - 1) / dofs_per_node;
        if coords.num_nodes() < num_nodes {
            return Err(eyre!(
                "{:?} requires coordinates of {} nodes for {} dofs, got {}",
                self,
                num_nodes,
                num_dofs,
                coords.num_nodes()
            ));
        }
        if let Some(entity) =
            (0..partition.num_entities()).find(|&e| partition.entity_size(e) % dofs_per_node != 0)
        {
            return Err(eyre!(
                "entity {} has {} dofs, which is not a multiple of the dimension {}",
                partition.entity_global_id(entity),
                partition.entity_size(entity),
                dofs_per_node
            ));
        }
        Ok(())
    }

    /// Applies the augmentation to a block whose rows are the given fine dofs.
    ///
    /// # Panics
    ///
    /// Panics if the augmentation needs coordinates and none are given.
    pub fn apply(&self, block: &DMatrix<f64>, dofs: &[usize], coords: Option<&NodeCoordinates>) -> DMatrix<f64> {
        let require_coords = || coords.expect("augmentation requires node coordinates");
        match *self {
            Self::None => block.clone(),
            Self::Polynomials(PolynomialOrder::Constant) => extend_with_constants(block),
            Self::Polynomials(order) => extend_with_polynomials(block, dofs, require_coords(), order),
            Self::RigidBodyModes(dim) => extend_with_rigid_body_modes(block, dofs, require_coords(), dim),
        }
    }
}

fn append_columns(block: &DMatrix<f64>, extra: &DMatrix<f64>) -> DMatrix<f64> {
    assert_eq!(block.nrows(), extra.nrows());
    let mut result = block.clone().resize_horizontally(block.ncols() + extra.ncols(), 0.0);
    result.columns_mut(block.ncols(), extra.ncols()).copy_from(extra);
    result
}

/// Appends the all-ones column.
pub fn extend_with_constants(block: &DMatrix<f64>) -> DMatrix<f64> {
    append_columns(block, &DMatrix::from_element(block.nrows(), 1, 1.0))
}

/// Appends the all-ones column and, for linear order, one column per coordinate axis holding
/// the coordinate of each dof's node. The dofs of a scalar problem are the nodes.
pub fn extend_with_polynomials(
    block: &DMatrix<f64>,
    dofs: &[usize],
    coords: &NodeCoordinates,
    order: PolynomialOrder,
) -> DMatrix<f64> {
    assert_eq!(block.nrows(), dofs.len(), "block must have one row per dof");
    let num_extra = match order {
        PolynomialOrder::Constant => 1,
        PolynomialOrder::Linear => 1 + coords.dim(),
    };
    let extra = DMatrix::from_fn(dofs.len(), num_extra, |k, col| match col {
        0 => 1.0,
        axis => coords.coordinate(dofs[k], axis - 1),
    });
    append_columns(block, &extra)
}

/// Appends the rigid body modes of a vector-valued problem with `dim` components per node.
///
/// Dof `d` is component `d % dim` of node `d / dim`. The modes are one translation per
/// component, then for two dimensions the rotation `(y, -x)`, and for three dimensions the
/// rotations `(y, -x, 0)`, `(0, z, -y)` and `(-z, 0, x)`.
///
/// # Panics
///
/// Panics if the number of dofs is not a multiple of `dim`.
pub fn extend_with_rigid_body_modes(
    block: &DMatrix<f64>,
    dofs: &[usize],
    coords: &NodeCoordinates,
    dim: SpatialDim,
) -> DMatrix<f64> {
    let d = dim.value();
    assert_eq!(block.nrows(), dofs.len(), "block must have one row per dof");
    assert_eq!(
        dofs.len() % d,
        0,
        "number of entity dofs ({}) must be a multiple of the dimension ({})",
        dofs.len(),
        d
    );
    let num_rotations = match dim {
        SpatialDim::One => 0,
        SpatialDim::Two => 1,
        SpatialDim::Three => 3,
    };

    let mut extra = DMatrix::zeros(dofs.len(), d + num_rotations);
    for (k, &dof) in dofs.iter().enumerate() {
        let (node, component) = (dof / d, dof % d);
        extra[(k, component)] = 1.0;
        if num_rotations == 0 {
            continue;
        }
        let x = coords.coordinate(node, 0);
        let y = coords.coordinate(node, 1);
        extra[(k, d)] = match component {
            0 => y,
            1 => -x,
            _ => 0.0,
        };
        if num_rotations == 3 {
            let z = coords.coordinate(node, 2);
            extra[(k, d + 1)] = match component {
                1 => z,
                2 => -y,
                _ => 0.0,
            };
            extra[(k, d + 2)] = match component {
                0 => -z,
                2 => x,
                _ => 0.0,
            };
        }
    }
    append_columns(block, &extra)
}
