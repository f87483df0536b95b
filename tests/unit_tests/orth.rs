use amge::tentative::{normalize_signs, orthonormal_basis, truncate_directions, SingularDirection};
use matrixcompare::assert_matrix_eq;
use nalgebra::{DMatrix, DVector};
use ordered_float::OrderedFloat;
use proptest::prelude::*;
use util::{argmax_abs, orthonormality_error};

fn direction(value: f64, index: usize) -> SingularDirection {
    SingularDirection {
        value: OrderedFloat(value),
        index,
    }
}

/// Largest entry of the part of `block` not in the span of the orthonormal `basis`.
fn projection_residual(block: &DMatrix<f64>, basis: &DMatrix<f64>) -> f64 {
    let projected = basis * (basis.transpose() * block);
    (block - projected).abs().max()
}

#[test]
fn directions_sort_by_descending_value_then_index() {
    let mut directions = vec![direction(1.0, 2), direction(3.0, 1), direction(1.0, 0), direction(2.0, 3)];
    directions.sort();
    let indices: Vec<_> = directions.iter().map(|d| d.index).collect();
    assert_eq!(indices, vec![1, 3, 0, 2]);
}

#[test]
fn truncation_is_relative_to_largest_value() {
    let directions = vec![direction(1e-12, 0), direction(2.0, 1), direction(1e-3, 2)];
    let kept = truncate_directions(directions, 1e-10);
    let indices: Vec<_> = kept.iter().map(|d| d.index).collect();
    assert_eq!(indices, vec![1, 2]);

    assert!(truncate_directions(vec![direction(0.0, 0)], 1e-10).is_empty());
    assert!(truncate_directions(Vec::new(), 1e-10).is_empty());
}

#[test]
fn normalize_signs_makes_largest_entry_positive() {
    #[rustfmt::skip]
    let mut basis = DMatrix::from_row_slice(3, 2, &[
        0.6, -0.5,
        -0.8, 0.5,
        0.0, -0.2,
    ]);
    normalize_signs(&mut basis);

    #[rustfmt::skip]
    let expected = DMatrix::from_row_slice(3, 2, &[
        -0.6, 0.5,
        0.8, -0.5,
        0.0, 0.2,
    ]);
    assert_eq!(basis, expected);
}

#[test]
fn orthogonal_columns_are_rescaled() {
    #[rustfmt::skip]
    let block = DMatrix::from_row_slice(4, 2, &[
        1.0, 1.0,
        1.0, -1.0,
        1.0, 1.0,
        1.0, -1.0,
    ]);
    let basis = orthonormal_basis(&block, 1e-10);
    assert_matrix_eq!(basis, block / 2.0, comp = abs, tol = 1e-14);
}

#[test]
fn orthogonal_columns_are_ordered_by_norm() {
    #[rustfmt::skip]
    let block = DMatrix::from_row_slice(3, 3, &[
        1.0, 0.0, 0.0,
        0.0, 0.0, 5.0,
        0.0, -2.0, 0.0,
    ]);
    let basis = orthonormal_basis(&block, 1e-10);

    #[rustfmt::skip]
    let expected = DMatrix::from_row_slice(3, 3, &[
        0.0, 0.0, 1.0,
        1.0, 0.0, 0.0,
        0.0, 1.0, 0.0,
    ]);
    assert_matrix_eq!(basis, expected, comp = abs, tol = 1e-14);
}

#[test]
fn dependent_columns_are_truncated() {
    #[rustfmt::skip]
    let block = DMatrix::from_row_slice(3, 3, &[
        1.0, 2.0, 1.0,
        1.0, 2.0, 0.0,
        1.0, 2.0, 0.0,
    ]);
    let basis = orthonormal_basis(&block, 1e-10);
    assert_eq!(basis.ncols(), 2);
    assert!(orthonormality_error(&basis) < 1e-12);
    assert!(projection_residual(&block, &basis) < 1e-12);
}

#[test]
fn zero_and_empty_blocks_give_empty_bases() {
    assert_eq!(orthonormal_basis(&DMatrix::zeros(4, 0), 1e-10).shape(), (4, 0));
    assert_eq!(orthonormal_basis(&DMatrix::zeros(0, 3), 1e-10).shape(), (0, 0));
    assert_eq!(orthonormal_basis(&DMatrix::zeros(3, 2), 1e-10).shape(), (3, 0));
}

#[test]
fn single_row_block_gives_unit_basis() {
    let basis = orthonormal_basis(&DMatrix::from_row_slice(1, 3, &[0.0, -4.0, 2.0]), 1e-10);
    assert_eq!(basis, DMatrix::from_element(1, 1, 1.0));

    let basis = orthonormal_basis(&DMatrix::zeros(1, 3), 1e-10);
    assert_eq!(basis.shape(), (1, 0));
}

#[test]
fn orthonormalizing_a_basis_reproduces_it() {
    #[rustfmt::skip]
    let block = DMatrix::from_row_slice(4, 3, &[
        1.0, 0.5, 3.0,
        2.0, -1.0, 0.0,
        0.0, 1.0, 1.0,
        1.0, 1.0, -2.0,
    ]);
    let basis = orthonormal_basis(&block, 1e-10);
    let again = orthonormal_basis(&basis, 1e-10);
    assert_eq!(again.ncols(), 3);
    // Columns of equal norm may swap, the spanned space may not
    let projector = &basis * basis.transpose();
    let projector_again = &again * again.transpose();
    assert_matrix_eq!(projector_again, projector, comp = abs, tol = 1e-12);

    // An exactly orthonormal basis is reproduced
    let hadamard = DMatrix::from_row_slice(4, 2, &[0.5, 0.5, 0.5, -0.5, 0.5, 0.5, 0.5, -0.5]);
    assert_eq!(orthonormal_basis(&hadamard, 1e-10), hadamard);
}

proptest! {
    #[test]
    fn orthonormal_basis_spans_block(
        block in (1usize..8, 0usize..6).prop_flat_map(|(rows, cols)| {
            proptest::collection::vec(-1.0..1.0f64, rows * cols)
                .prop_map(move |values| DMatrix::from_vec(rows, cols, values))
        })
    ) {
        let basis = orthonormal_basis(&block, 1e-10);
        prop_assert_eq!(basis.nrows(), block.nrows());
        prop_assert!(basis.ncols() <= block.nrows().min(block.ncols()));
        if basis.ncols() > 0 {
            prop_assert!(orthonormality_error(&basis) < 1e-10);
        }
        prop_assert!(projection_residual(&block, &basis) < 1e-8);

        for column in basis.column_iter() {
            let column: DVector<f64> = column.clone_owned();
            let pivot = argmax_abs(&column).unwrap();
            prop_assert!(column[pivot] > 0.0);
        }

        let again = orthonormal_basis(&block, 1e-10);
        prop_assert_eq!(again, basis);
    }
}
