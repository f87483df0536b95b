use nalgebra::DMatrix;
use nalgebra_sparse::pattern::SparsityPattern;
use nalgebra_sparse::CsrMatrix;
use std::collections::BTreeSet;

fn assemble_pattern(num_rows: usize, blocks: &[(Vec<usize>, DMatrix<f64>)]) -> SparsityPattern {
    // Each entry is stored exactly once, no matter how many blocks share it
    let mut matrix_entries = BTreeSet::new();
    for (indices, _) in blocks {
        for &i in indices {
            for &j in indices {
                matrix_entries.insert((i, j));
            }
        }
    }

    let mut offsets = Vec::with_capacity(num_rows + 1);
    let mut column_indices = Vec::with_capacity(matrix_entries.len());
    offsets.push(0);
    for (i, j) in matrix_entries {
        // Loop to handle consecutive empty rows
        while i + 1 > offsets.len() {
            offsets.push(column_indices.len());
        }
        column_indices.push(j);
    }
    while offsets.len() < num_rows + 1 {
        offsets.push(column_indices.len());
    }

    SparsityPattern::try_from_offsets_and_indices(num_rows, num_rows, offsets, column_indices)
        .expect("offsets and indices built from sorted entries are valid")
}

/// Sums dense blocks into a square CSR matrix, the way element matrices are assembled.
///
/// Block `(indices, matrix)` adds `matrix[(k, l)]` to entry `(indices[k], indices[l])`. The
/// sparsity pattern is the union of the blocks' index pairs.
///
/// # Panics
///
/// Panics if a block is not `indices.len()` square, or an index is not smaller than `num_rows`.
pub fn assemble_blocks(num_rows: usize, blocks: &[(Vec<usize>, DMatrix<f64>)]) -> CsrMatrix<f64> {
    for (indices, matrix) in blocks {
        assert_eq!(matrix.nrows(), indices.len(), "block must have one row per index");
        assert_eq!(matrix.ncols(), indices.len(), "block must have one column per index");
        assert!(
            indices.iter().all(|&i| i < num_rows),
            "block index out of bounds for matrix with {} rows",
            num_rows
        );
    }

    let pattern = assemble_pattern(num_rows, blocks);
    let values = vec![0.0; pattern.nnz()];
    let mut csr = CsrMatrix::try_from_pattern_and_values(pattern, values)
        .expect("values have the same length as the pattern");

    for (indices, matrix) in blocks {
        for (k, &i) in indices.iter().enumerate() {
            let mut row = csr.row_mut(i);
            let (columns, values) = row.cols_and_values_mut();
            for (l, &j) in indices.iter().enumerate() {
                let position = columns
                    .binary_search(&j)
                    .expect("entry is part of the assembled pattern");
                values[position] += matrix[(k, l)];
            }
        }
    }
    csr
}
