use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Debug;
use std::ops::Range;

/// A relation between two index sets, stored row by row in compressed form.
///
/// Row `i` lists the indices related to `i`, in the order they were pushed. This is the
/// representation used for agglomerate-to-dof, entity-to-dof and entity-to-agglomerate tables.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incidence {
    offsets: Vec<usize>,
    indices: Vec<usize>,
}

impl Debug for Incidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl Default for Incidence {
    fn default() -> Self {
        Self::new()
    }
}

impl Incidence {
    pub fn new() -> Self {
        Self {
            offsets: vec![0],
            indices: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: &[usize]) {
        self.indices.extend_from_slice(row);
        self.offsets.push(self.indices.len());
    }

    pub fn num_rows(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }

    fn row_range(&self, index: usize) -> Option<Range<usize>> {
        let begin = *self.offsets.get(index)?;
        let end = *self.offsets.get(index + 1)?;
        Some(begin..end)
    }

    pub fn get(&self, index: usize) -> Option<&[usize]> {
        let range = self.row_range(index)?;
        self.indices.get(range)
    }

    /// The indices related to `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not a row of the relation.
    pub fn row(&self, index: usize) -> &[usize] {
        self.get(index)
            .unwrap_or_else(|| panic!("row {} out of bounds for relation with {} rows", index, self.num_rows()))
    }

    pub fn row_len(&self, index: usize) -> usize {
        self.row(index).len()
    }

    pub fn iter(&self) -> impl '_ + ExactSizeIterator<Item = &[usize]> {
        (0..self.num_rows()).map(move |i| self.row(i))
    }

    /// The transposed relation, with `num_columns` rows.
    ///
    /// Each row of the transpose lists the rows of `self` that reference it, in ascending order.
    ///
    /// # Panics
    ///
    /// Panics if some index is not smaller than `num_columns`.
    pub fn transpose(&self, num_columns: usize) -> Incidence {
        let mut counts = vec![0usize; num_columns];
        for &j in &self.indices {
            assert!(j < num_columns, "index {} out of bounds for transpose with {} rows", j, num_columns);
            counts[j] += 1;
        }
        let mut offsets = Vec::with_capacity(num_columns + 1);
        offsets.push(0);
        for count in &counts {
            offsets.push(offsets.last().copied().unwrap_or(0) + count);
        }
        let mut cursor = offsets[..num_columns].to_vec();
        let mut indices = vec![0; self.indices.len()];
        for (i, row) in self.iter().enumerate() {
            for &j in row {
                indices[cursor[j]] = i;
                cursor[j] += 1;
            }
        }
        Incidence { offsets, indices }
    }
}

impl<'a> From<&'a [Vec<usize>]> for Incidence {
    fn from(rows: &'a [Vec<usize>]) -> Self {
        let mut result = Self::new();
        for row in rows {
            result.push_row(row);
        }
        result
    }
}

impl From<Vec<Vec<usize>>> for Incidence {
    fn from(rows: Vec<Vec<usize>>) -> Self {
        Self::from(rows.as_slice())
    }
}
