//! Elimination of agglomerate interior dofs, leaving a system on face dofs only.
//!
//! Each agglomerate provides a dense block system ordered interior first, then face:
//!
//! ```text
//! [ A_ii  A_if ] [ x_i ]   [ b_i ]
//! [ A_fi  A_ff ] [ x_f ] = [ b_f ]
//! ```
//!
//! Interior dofs belong to exactly one agglomerate, so they are eliminated locally into the
//! Schur complement $S = A_{ff} - A_{fi} A_{ii}^{-1} A_{if}$. The face blocks of all
//! agglomerates are then summed like element matrices.
//!
//! Vectors over all true dofs hold every interior dof first, agglomerate by agglomerate, followed
//! by the face dofs.
use crate::partition::AgglomeratePartition;
use eyre::eyre;
use log::debug;
use nalgebra::{DMatrix, DMatrixView, DVector, DVectorView};
use rustc_hash::FxHashMap;
use std::ops::Range;

mod assembly;
mod distributed;
mod solver;
mod smoother;

pub use assembly::assemble_blocks;
pub use distributed::{DistributedFaceOperator, FaceDofMap};
pub use solver::{FaceSolver, SchurSolver};
pub use smoother::SchurSmoother;

/// The local system of one agglomerate, interior dofs first.
#[derive(Debug, Clone, PartialEq)]
pub struct AgglomerateBlock {
    matrix: DMatrix<f64>,
    num_interior: usize,
    face_dofs: Vec<usize>,
}

impl AgglomerateBlock {
    /// Creates a block from a square matrix whose first `num_interior` rows and columns belong to
    /// interior dofs. The remaining rows belong to the face dofs `face_dofs`, given as indices into
    /// the face dofs of the process.
    ///
    /// # Panics
    ///
    /// Panics if the matrix is not square or its size is not `num_interior + face_dofs.len()`.
    pub fn new(matrix: DMatrix<f64>, num_interior: usize, face_dofs: Vec<usize>) -> Self {
        assert!(matrix.is_square(), "agglomerate matrix must be square");
        assert_eq!(
            matrix.nrows(),
            num_interior + face_dofs.len(),
            "agglomerate matrix size must equal the number of interior and face dofs"
        );
        Self {
            matrix,
            num_interior,
            face_dofs,
        }
    }

    pub fn num_interior(&self) -> usize {
        self.num_interior
    }

    pub fn num_face(&self) -> usize {
        self.face_dofs.len()
    }

    pub fn face_dofs(&self) -> &[usize] {
        &self.face_dofs
    }

    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    pub fn a_ii(&self) -> DMatrixView<f64> {
        let ni = self.num_interior;
        self.matrix.view((0, 0), (ni, ni))
    }

    pub fn a_if(&self) -> DMatrixView<f64> {
        let (ni, nf) = (self.num_interior, self.num_face());
        self.matrix.view((0, ni), (ni, nf))
    }

    pub fn a_fi(&self) -> DMatrixView<f64> {
        let (ni, nf) = (self.num_interior, self.num_face());
        self.matrix.view((ni, 0), (nf, ni))
    }

    pub fn a_ff(&self) -> DMatrixView<f64> {
        let (ni, nf) = (self.num_interior, self.num_face());
        self.matrix.view((ni, ni), (nf, nf))
    }
}

/// Index of every face dof of the partition in the process face space: the dofs of all
/// entities, concatenated in local entity order.
pub fn face_numbering(partition: &AgglomeratePartition) -> FxHashMap<usize, usize> {
    (0..partition.num_entities())
        .flat_map(|e| partition.entity_dofs(e).iter().copied())
        .enumerate()
        .map(|(index, dof)| (dof, index))
        .collect()
}

/// Eliminates interior dofs agglomerate by agglomerate.
#[derive(Debug, Clone)]
pub struct SchurComplementReducer {
    blocks: Vec<AgglomerateBlock>,
    interior_inverses: Vec<DMatrix<f64>>,
    interior_offsets: Vec<usize>,
    num_face_dofs: usize,
}

impl SchurComplementReducer {
    /// Factors the interior block of every agglomerate.
    ///
    /// Returns an error if an interior block is singular.
    ///
    /// # Panics
    ///
    /// Panics if a block references a face dof not smaller than `num_face_dofs`.
    pub fn new(blocks: Vec<AgglomerateBlock>, num_face_dofs: usize) -> eyre::Result<Self> {
        let mut interior_inverses = Vec::with_capacity(blocks.len());
        let mut interior_offsets = Vec::with_capacity(blocks.len() + 1);
        interior_offsets.push(0);
        for (a, block) in blocks.iter().enumerate() {
            assert!(
                block.face_dofs.iter().all(|&f| f < num_face_dofs),
                "agglomerate {} references a face dof out of bounds",
                a
            );
            let inverse = if block.num_interior == 0 {
                DMatrix::zeros(0, 0)
            } else {
                block
                    .a_ii()
                    .clone_owned()
                    .lu()
                    .try_inverse()
                    .filter(|inverse| inverse.iter().all(|v| v.is_finite()))
                    .ok_or_else(|| eyre!("interior block of agglomerate {} is singular", a))?
            };
            interior_inverses.push(inverse);
            interior_offsets.push(interior_offsets[a] + block.num_interior);
        }
        debug!(
            "Factored {} interior blocks ({} interior dofs, {} face dofs)",
            blocks.len(),
            interior_offsets.last().copied().unwrap_or(0),
            num_face_dofs
        );
        Ok(Self {
            blocks,
            interior_inverses,
            interior_offsets,
            num_face_dofs,
        })
    }

    /// Builds the agglomerate blocks from matrices given in each agglomerate's local dof order.
    ///
    /// Dofs of an agglomerate that belong to no interface entity are interior; the others are
    /// face dofs, numbered by [`face_numbering`].
    ///
    /// # Panics
    ///
    /// Panics if the number of matrices or their sizes do not match the partition.
    pub fn from_partition(partition: &AgglomeratePartition, matrices: &[DMatrix<f64>]) -> eyre::Result<Self> {
        assert_eq!(
            matrices.len(),
            partition.num_agglomerates(),
            "expected one matrix per agglomerate"
        );
        let numbering = face_numbering(partition);
        let blocks = matrices
            .iter()
            .enumerate()
            .map(|(a, matrix)| {
                let dofs = partition.agglomerate_dofs(a);
                assert_eq!(matrix.nrows(), dofs.len(), "matrix of agglomerate {} has the wrong size", a);
                let local_position: FxHashMap<usize, usize> =
                    dofs.iter().enumerate().map(|(k, &dof)| (dof, k)).collect();
                let (interior, face) = partition.split_agglomerate_dofs(a);
                let permutation: Vec<usize> = interior
                    .iter()
                    .chain(&face)
                    .map(|dof| local_position[dof])
                    .collect();
                let reordered = matrix
                    .select_rows(&permutation)
                    .select_columns(&permutation);
                let face_dofs = face.iter().map(|dof| numbering[dof]).collect();
                AgglomerateBlock::new(reordered, interior.len(), face_dofs)
            })
            .collect();
        Self::new(blocks, numbering.len())
    }

    pub fn blocks(&self) -> &[AgglomerateBlock] {
        &self.blocks
    }

    pub fn num_face_dofs(&self) -> usize {
        self.num_face_dofs
    }

    pub fn num_interior_dofs(&self) -> usize {
        self.interior_offsets.last().copied().unwrap_or(0)
    }

    /// Length of a vector over all true dofs.
    pub fn num_true_dofs(&self) -> usize {
        self.num_interior_dofs() + self.num_face_dofs
    }

    /// Positions of the interior dofs of an agglomerate in an all-true-dof vector.
    pub fn interior_range(&self, agglomerate: usize) -> Range<usize> {
        self.interior_offsets[agglomerate]..self.interior_offsets[agglomerate + 1]
    }

    /// Positions of the face dofs in an all-true-dof vector.
    pub fn face_range(&self) -> Range<usize> {
        self.num_interior_dofs()..self.num_true_dofs()
    }

    /// The local Schur complement $A_{ff} - A_{fi} A_{ii}^{-1} A_{if}$ of an agglomerate.
    pub fn local_schur(&self, agglomerate: usize) -> DMatrix<f64> {
        let block = &self.blocks[agglomerate];
        let inverse = &self.interior_inverses[agglomerate];
        block.a_ff() - block.a_fi() * (inverse * block.a_if())
    }

    /// $A_{fi} A_{ii}^{-1} b_i$ for the interior part `b_i` of one agglomerate.
    fn eliminated_interior(&self, agglomerate: usize, b_i: DVectorView<f64>) -> DVector<f64> {
        let block = &self.blocks[agglomerate];
        block.a_fi() * (&self.interior_inverses[agglomerate] * b_i)
    }

    /// The reduced right-hand side $r_f = b_f - \sum A_{fi} A_{ii}^{-1} b_i$, where `b` is an
    /// all-true-dof vector.
    pub fn assemble_schur_rhs(&self, b: &DVector<f64>) -> DVector<f64> {
        assert_eq!(b.len(), self.num_true_dofs(), "right-hand side must cover all true dofs");
        let mut r_f = b.rows_range(self.face_range()).clone_owned();
        for (a, block) in self.blocks.iter().enumerate() {
            let range = self.interior_range(a);
            let b_i = b.rows_range(range);
            let contribution = self.eliminated_interior(a, b_i);
            for (&f, value) in block.face_dofs.iter().zip(contribution.iter()) {
                r_f[f] -= value;
            }
        }
        r_f
    }

    /// Recovers the interior part of `x` from its face part by back-substitution:
    /// $x_i = A_{ii}^{-1} (b_i - A_{if} x_f)$ for every agglomerate.
    pub fn update_interior(&self, b: &DVector<f64>, x: &mut DVector<f64>) {
        assert_eq!(b.len(), self.num_true_dofs(), "right-hand side must cover all true dofs");
        assert_eq!(x.len(), self.num_true_dofs(), "solution must cover all true dofs");
        let face_range = self.face_range();
        for (a, block) in self.blocks.iter().enumerate() {
            let range = self.interior_range(a);
            let x_f = DVector::from_iterator(
                block.num_face(),
                block.face_dofs.iter().map(|&f| x[face_range.start + f]),
            );
            let rhs = b.rows_range(range.clone()) - block.a_if() * x_f;
            let x_i = &self.interior_inverses[a] * rhs;
            x.rows_range_mut(range).copy_from(&x_i);
        }
    }

    /// Assembles the face operator $S$ by summing the local Schur complements.
    pub fn assemble_schur_matrix(&self) -> nalgebra_sparse::CsrMatrix<f64> {
        let local: Vec<(Vec<usize>, DMatrix<f64>)> = (0..self.blocks.len())
            .map(|a| (self.blocks[a].face_dofs.clone(), self.local_schur(a)))
            .collect();
        assemble_blocks(self.num_face_dofs, &local)
    }

    /// Assembles the operator over all true dofs, interior dofs first.
    pub fn assemble_full_matrix(&self) -> nalgebra_sparse::CsrMatrix<f64> {
        let face_start = self.num_interior_dofs();
        let local: Vec<(Vec<usize>, DMatrix<f64>)> = self
            .blocks
            .iter()
            .enumerate()
            .map(|(a, block)| {
                let indices = self
                    .interior_range(a)
                    .chain(block.face_dofs.iter().map(|&f| face_start + f))
                    .collect();
                (indices, block.matrix.clone())
            })
            .collect();
        assemble_blocks(self.num_true_dofs(), &local)
    }
}
