//! Rank-revealing orthonormalization of merged entity contributions.
use log::trace;
use nalgebra::DMatrix;
use ordered_float::OrderedFloat;
use std::cmp::{Ordering, Reverse};

/// A singular value paired with the index of its singular vector.
///
/// Ordered by descending value, then ascending index, so sorting is deterministic even when
/// singular values coincide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SingularDirection {
    pub value: OrderedFloat<f64>,
    pub index: usize,
}

impl Ord for SingularDirection {
    fn cmp(&self, other: &Self) -> Ordering {
        (Reverse(self.value), self.index).cmp(&(Reverse(other.value), other.index))
    }
}

impl PartialOrd for SingularDirection {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Sorts the directions and keeps those with value above `tolerance` times the largest value.
pub fn truncate_directions(mut directions: Vec<SingularDirection>, tolerance: f64) -> Vec<SingularDirection> {
    directions.sort();
    let largest = directions.first().map_or(0.0, |d| d.value.0);
    if largest <= 0.0 {
        return Vec::new();
    }
    directions.retain(|d| d.value.0 > tolerance * largest);
    directions
}

/// Flips the sign of each column so that its entry of largest magnitude is positive.
/// On ties, the first such entry decides.
pub fn normalize_signs(basis: &mut DMatrix<f64>) {
    for mut column in basis.column_iter_mut() {
        let mut pivot = 0.0_f64;
        for &value in column.iter() {
            if value.abs() > pivot.abs() {
                pivot = value;
            }
        }
        if pivot < 0.0 {
            column.neg_mut();
        }
    }
}

/// Whether the columns are mutually orthogonal up to `tolerance`, relative to their norms.
fn has_orthogonal_columns(gram: &DMatrix<f64>, tolerance: f64) -> bool {
    let n = gram.nrows();
    (0..n).all(|i| {
        (0..i).all(|j| {
            let scale = (gram[(i, i)] * gram[(j, j)]).sqrt();
            gram[(i, j)].abs() <= tolerance * scale
        })
    })
}

/// Computes an orthonormal basis for the column space of `block`, discarding directions whose
/// singular value is not above `tolerance` times the largest singular value.
///
/// The returned basis has one column per retained direction, ordered by descending singular
/// value, with signs fixed by [`normalize_signs`]. Calling this twice on the same input gives
/// the same basis.
///
/// - A block without columns or rows gives an empty basis.
/// - A block with a single row gives the unit `1x1` basis if any of its entries is non-zero.
/// - If the columns are already mutually orthogonal, the basis consists of the normalized
///   input columns (stable order for equal norms), so orthogonal input is reproduced up to
///   scaling.
pub fn orthonormal_basis(block: &DMatrix<f64>, tolerance: f64) -> DMatrix<f64> {
    let n = block.nrows();
    if n == 0 || block.ncols() == 0 {
        return DMatrix::zeros(n, 0);
    }
    if n == 1 {
        return if block.iter().any(|&v| v != 0.0) {
            DMatrix::from_element(1, 1, 1.0)
        } else {
            DMatrix::zeros(1, 0)
        };
    }

    let gram = block.transpose() * block;
    let mut basis = if has_orthogonal_columns(&gram, tolerance) {
        let directions = gram
            .diagonal()
            .iter()
            .enumerate()
            .map(|(index, &sq)| SingularDirection {
                value: OrderedFloat(sq.max(0.0).sqrt()),
                index,
            })
            .collect();
        let kept = truncate_directions(directions, tolerance);
        let mut basis = DMatrix::zeros(n, kept.len());
        for (k, direction) in kept.iter().enumerate() {
            let column = block.column(direction.index);
            basis.set_column(k, &(column / direction.value.0));
        }
        basis
    } else {
        let svd = block.clone().svd_unordered(true, false);
        let u = svd
            .u
            .as_ref()
            .expect("left singular vectors were requested");
        let directions = svd
            .singular_values
            .iter()
            .enumerate()
            .map(|(index, &value)| SingularDirection {
                value: OrderedFloat(value),
                index,
            })
            .collect();
        let kept = truncate_directions(directions, tolerance);
        let mut basis = DMatrix::zeros(n, kept.len());
        for (k, direction) in kept.iter().enumerate() {
            basis.set_column(k, &u.column(direction.index));
        }
        basis
    };

    trace!(
        "Orthonormalized {}x{} block, kept {} directions",
        n,
        block.ncols(),
        basis.ncols()
    );
    normalize_signs(&mut basis);
    basis
}
