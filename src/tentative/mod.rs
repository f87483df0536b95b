//! Construction of the tentative prolongator from merged entity contributions.
//!
//! Each owned interface entity turns its merged contribution into a set of coarse dofs: rows of
//! essential boundary dofs are zeroed, vanishing columns are dropped, the block is
//! orthonormalized with a rank-revealing decomposition and every retained direction becomes
//! one new coarse dof. Columns are appended in strictly increasing order, so the result depends
//! only on the order in which entities are processed.
use crate::comm::{CommError, CommTag, Communicator};
use crate::partition::AgglomeratePartition;
use crate::reduce::ReducedContributions;
use log::{debug, info, trace, warn};
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use serde::{Deserialize, Serialize};
use std::ops::Range;

mod augment;
mod orth;

pub use augment::*;
pub use orth::*;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TentativeConfig {
    /// Exclude essential boundary dofs from the coarse space.
    pub avoid_essential_boundary: bool,
    /// Singular values not above `svd_tolerance` times the largest one are discarded.
    pub svd_tolerance: f64,
    /// Only entries with magnitude above this threshold are stored in the prolongator.
    pub insertion_threshold: f64,
    /// Compute the coarse representation of the constant vector.
    pub represent_constant: bool,
}

impl Default for TentativeConfig {
    fn default() -> Self {
        Self {
            avoid_essential_boundary: true,
            svd_tolerance: 1e-10,
            insertion_threshold: 0.0,
            represent_constant: false,
        }
    }
}

/// Zeroes the rows of essential boundary dofs (if `avoid` is set) and drops every column that is
/// identically zero afterwards.
///
/// Row `k` of `block` belongs to fine dof `dofs[k]`. Columns that are identically zero are
/// dropped even when `avoid` is not set.
pub fn filter_boundary(block: &DMatrix<f64>, dofs: &[usize], essential_boundary: &[bool], avoid: bool) -> DMatrix<f64> {
    assert_eq!(block.nrows(), dofs.len(), "block must have one row per entity dof");
    let mut filtered = block.clone();
    if avoid {
        for (k, &dof) in dofs.iter().enumerate() {
            if essential_boundary[dof] {
                filtered.row_mut(k).fill(0.0);
            }
        }
    }
    let nonzero_columns: Vec<usize> = (0..filtered.ncols())
        .filter(|&j| filtered.column(j).iter().any(|&v| v != 0.0))
        .collect();
    if nonzero_columns.len() < filtered.ncols() {
        trace!(
            "Dropped {} vanishing columns out of {}",
            filtered.ncols() - nonzero_columns.len(),
            filtered.ncols()
        );
        filtered = filtered.select_columns(&nonzero_columns);
    }
    filtered
}

/// Accumulates coarse dofs entity by entity into a growing prolongator.
#[derive(Debug)]
pub struct TentativeProlongatorBuilder<'a> {
    partition: &'a AgglomeratePartition,
    config: TentativeConfig,
    triplets: Vec<(usize, usize, f64)>,
    filled_cols: usize,
    entity_coarse_dofs: Vec<usize>,
    entity_first_column: Vec<usize>,
    entity_bases: Vec<DMatrix<f64>>,
    processed: Vec<bool>,
}

impl<'a> TentativeProlongatorBuilder<'a> {
    pub fn new(partition: &'a AgglomeratePartition, config: TentativeConfig) -> Self {
        let num_entities = partition.num_entities();
        Self {
            partition,
            config,
            triplets: Vec::new(),
            filled_cols: 0,
            entity_coarse_dofs: vec![0; num_entities],
            entity_first_column: vec![0; num_entities],
            entity_bases: (0..num_entities)
                .map(|e| DMatrix::zeros(partition.entity_size(e), 0))
                .collect(),
            processed: vec![false; num_entities],
        }
    }

    pub fn config(&self) -> &TentativeConfig {
        &self.config
    }

    /// Number of local coarse dofs created so far.
    pub fn num_coarse_dofs(&self) -> usize {
        self.filled_cols
    }

    pub fn entity_coarse_dofs(&self, entity: usize) -> usize {
        self.entity_coarse_dofs[entity]
    }

    fn is_all_boundary(&self, entity: usize) -> bool {
        let partition = self.partition;
        partition
            .entity_dofs(entity)
            .iter()
            .all(|&dof| partition.is_essential(dof))
    }

    /// Turns the merged contribution of an entity into coarse dofs and returns their number.
    ///
    /// An entity whose dofs all lie on the essential boundary (with boundary avoidance), or whose
    /// contribution has no columns left after filtering, or no retained singular values,
    /// contributes no coarse dofs.
    ///
    /// # Panics
    ///
    /// Panics if the entity has already been processed, or if `contribution` does not have one
    /// row per entity dof.
    pub fn orthogonalize_and_insert(&mut self, entity: usize, contribution: &DMatrix<f64>) -> usize {
        let partition = self.partition;
        let global_id = partition.entity_global_id(entity);
        let dofs = partition.entity_dofs(entity);
        assert!(!self.processed[entity], "entity {} was already processed", global_id);
        assert_eq!(
            contribution.nrows(),
            dofs.len(),
            "contribution for entity {} must have one row per entity dof",
            global_id
        );
        self.processed[entity] = true;
        self.entity_first_column[entity] = self.filled_cols;

        if self.config.avoid_essential_boundary && self.is_all_boundary(entity) {
            debug!("Entity {} lies entirely on the essential boundary, skipping", global_id);
            return 0;
        }
        let filtered = filter_boundary(
            contribution,
            dofs,
            partition.essential_boundary(),
            self.config.avoid_essential_boundary,
        );
        if filtered.ncols() == 0 {
            debug!("Entity {} has an empty contribution, skipping", global_id);
            return 0;
        }
        let basis = self.filtered_basis(entity, &filtered);
        if basis.ncols() == 0 {
            debug!("Entity {} retained no singular values, skipping", global_id);
            return 0;
        }

        self.insert_basis(entity, basis)
    }

    /// Orthonormal basis of a filtered entity block.
    ///
    /// With boundary avoidance only the rows of non-essential dofs enter the decomposition, so
    /// the rows of essential dofs are exactly zero in the result.
    fn filtered_basis(&self, entity: usize, filtered: &DMatrix<f64>) -> DMatrix<f64> {
        let tolerance = self.config.svd_tolerance;
        if !self.config.avoid_essential_boundary {
            return orthonormal_basis(filtered, tolerance);
        }
        let partition = self.partition;
        let interior_rows: Vec<usize> = partition
            .entity_dofs(entity)
            .iter()
            .enumerate()
            .filter(|&(_, &dof)| !partition.is_essential(dof))
            .map(|(k, _)| k)
            .collect();
        let interior_basis = orthonormal_basis(&filtered.select_rows(&interior_rows), tolerance);
        let mut basis = DMatrix::zeros(filtered.nrows(), interior_basis.ncols());
        for (k, &row) in interior_rows.iter().enumerate() {
            basis.row_mut(row).copy_from(&interior_basis.row(k));
        }
        basis
    }

    /// Inserts an orthonormal entity basis as-is, one coarse dof per column.
    fn insert_basis(&mut self, entity: usize, basis: DMatrix<f64>) -> usize {
        let partition = self.partition;
        let dofs = partition.entity_dofs(entity);
        let threshold = self.config.insertion_threshold;
        for (j, column) in basis.column_iter().enumerate() {
            let col = self.filled_cols + j;
            for (&dof, &value) in dofs.iter().zip(column.iter()) {
                if value.abs() > threshold {
                    self.triplets.push((dof, col, value));
                }
            }
        }
        let num_coarse = basis.ncols();
        self.filled_cols += num_coarse;
        self.entity_coarse_dofs[entity] = num_coarse;
        self.entity_bases[entity] = basis;
        trace!(
            "Entity {}: {} coarse dofs, columns {}..{}",
            partition.entity_global_id(entity),
            num_coarse,
            self.filled_cols - num_coarse,
            self.filled_cols
        );
        num_coarse
    }

    /// Processes every owned entity of `reduced`, in ascending local entity order.
    ///
    /// `augmentation` is applied to each merged block before orthogonalization.
    pub fn insert_reduced(
        &mut self,
        reduced: &ReducedContributions,
        augmentation: Augmentation,
        coords: Option<&NodeCoordinates>,
    ) -> usize {
        assert_eq!(
            reduced.num_entities(),
            self.partition.num_entities(),
            "reduced contributions do not match the partition"
        );
        let partition = self.partition;
        let before = self.filled_cols;
        for (entity, block) in reduced.iter() {
            if let Some(block) = block {
                let augmented = augmentation.apply(block, partition.entity_dofs(entity), coords);
                self.orthogonalize_and_insert(entity, &augmented);
            }
        }
        self.filled_cols - before
    }

    /// Compacts the accumulated columns into the immutable prolongator and computes the global
    /// column offset of this process.
    ///
    /// This is a collective operation: every process must call it.
    pub fn finalize<C: Communicator>(self, comm: &C) -> Result<TentativeProlongator, CommError> {
        let num_rows = self.partition.num_dofs();
        let num_cols = self.filled_cols;
        if num_cols == 0 {
            warn!("Rank {} has no coarse dofs", self.partition.rank());
        }
        let mut coo = CooMatrix::new(num_rows, num_cols);
        for &(i, j, v) in &self.triplets {
            coo.push(i, j, v);
        }
        let matrix = CsrMatrix::from(&coo);

        let coarse_offset = comm.exclusive_scan_sum(CommTag::COARSE_OFFSET, num_cols)?;
        info!(
            "Rank {}: tentative prolongator {}x{}, global coarse columns {}..{}",
            self.partition.rank(),
            num_rows,
            num_cols,
            coarse_offset,
            coarse_offset + num_cols
        );

        let constant_representation = self
            .config
            .represent_constant
            .then(|| constant_representation(&self.entity_bases, num_cols));

        Ok(TentativeProlongator {
            matrix,
            entity_coarse_dofs: self.entity_coarse_dofs,
            entity_first_column: self.entity_first_column,
            entity_bases: self.entity_bases,
            coarse_offset,
            constant_representation,
        })
    }
}

/// Coarse coefficients of the constant vector: for each entity basis `B`, the normalized
/// vector `B^T 1`, placed at the entity's coarse dofs.
fn constant_representation(entity_bases: &[DMatrix<f64>], num_coarse_dofs: usize) -> DVector<f64> {
    let mut result = DVector::zeros(num_coarse_dofs);
    let mut offset = 0;
    for basis in entity_bases.iter().filter(|basis| basis.ncols() > 0) {
        let mut coefficients = basis.transpose() * DVector::from_element(basis.nrows(), 1.0);
        let norm = coefficients.norm();
        if norm > 0.0 {
            coefficients /= norm;
        }
        result.rows_mut(offset, basis.ncols()).copy_from(&coefficients);
        offset += basis.ncols();
    }
    result
}

/// The finalized tentative prolongator of one process.
#[derive(Debug, Clone, PartialEq)]
pub struct TentativeProlongator {
    matrix: CsrMatrix<f64>,
    entity_coarse_dofs: Vec<usize>,
    entity_first_column: Vec<usize>,
    entity_bases: Vec<DMatrix<f64>>,
    coarse_offset: usize,
    constant_representation: Option<DVector<f64>>,
}

impl TentativeProlongator {
    /// The prolongator with rows = local fine dofs and columns = local coarse dofs.
    pub fn matrix(&self) -> &CsrMatrix<f64> {
        &self.matrix
    }

    pub fn into_matrix(self) -> CsrMatrix<f64> {
        self.matrix
    }

    pub fn num_fine_dofs(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn num_coarse_dofs(&self) -> usize {
        self.matrix.ncols()
    }

    /// Number of coarse dofs of each local entity. Entities owned elsewhere have none.
    pub fn entity_coarse_dofs(&self) -> &[usize] {
        &self.entity_coarse_dofs
    }

    /// Local coarse columns belonging to an entity.
    pub fn entity_columns(&self, entity: usize) -> Range<usize> {
        let first = self.entity_first_column[entity];
        first..first + self.entity_coarse_dofs[entity]
    }

    /// Orthonormal basis of an entity, with one row per entity dof and one column per coarse dof.
    pub fn entity_basis(&self, entity: usize) -> &DMatrix<f64> {
        &self.entity_bases[entity]
    }

    /// Global index of the first local coarse dof.
    pub fn coarse_offset(&self) -> usize {
        self.coarse_offset
    }

    /// Global indices of the local coarse dofs.
    pub fn global_columns(&self) -> Range<usize> {
        self.coarse_offset..self.coarse_offset + self.num_coarse_dofs()
    }

    pub fn constant_representation(&self) -> Option<&DVector<f64>> {
        self.constant_representation.as_ref()
    }
}

/// Builds a coarse space from polynomials alone, without spectral candidates: constants, or
/// constants and linears.
///
/// Every owned entity receives the polynomial columns restricted to its dofs.
pub fn polynomial_coarse_space<C: Communicator>(
    partition: &AgglomeratePartition,
    coords: Option<&NodeCoordinates>,
    order: PolynomialOrder,
    config: TentativeConfig,
    comm: &C,
) -> Result<TentativeProlongator, CommError> {
    let augmentation = Augmentation::Polynomials(order);
    let mut builder = TentativeProlongatorBuilder::new(partition, config);
    for entity in partition.owned_entities() {
        let dofs = partition.entity_dofs(entity);
        let block = augmentation.apply(&DMatrix::zeros(dofs.len(), 0), dofs, coords);
        builder.orthogonalize_and_insert(entity, &block);
    }
    builder.finalize(comm)
}
