use std::hash::Hash;

use hashbrown::HashMap;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::error::{RecoError, Result};
use crate::io::{Observation, ProductId, UserId};

pub const FIRST_PURCHASE_WEIGHT: f64 = 1.0;
pub const REORDER_WEIGHT: f64 = 1.5;

pub type UserIndex = IdIndex<UserId>;
pub type ProductIndex = IdIndex<ProductId>;

/// Bijection between external ids and dense positions, in order of first appearance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdIndex<T: Hash + Eq> {
    ids: Vec<T>,
    positions: HashMap<T, usize>,
}

impl<T: Hash + Eq + Copy> IdIndex<T> {
    pub fn new() -> Self {
        IdIndex {
            ids: Vec::new(),
            positions: HashMap::new(),
        }
    }

    pub fn from_ids(ids: impl IntoIterator<Item = T>) -> Self {
        let mut index = Self::new();
        for id in ids {
            index.get_or_insert(id);
        }
        index
    }

    pub fn get_or_insert(&mut self, id: T) -> usize {
        let next = self.ids.len();
        let position = *self.positions.entry(id).or_insert(next);
        if position == next {
            self.ids.push(id);
        }
        position
    }

    pub fn position(&self, id: &T) -> Option<usize> {
        self.positions.get(id).copied()
    }

    pub fn id_at(&self, position: usize) -> Option<T> {
        self.ids.get(position).copied()
    }

    pub fn ids(&self) -> &[T] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl<T: Hash + Eq + Copy> Default for IdIndex<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Compressed sparse row matrix. Column indices are ascending within a row and every
/// stored value is non-zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsrMatrix {
    num_rows: usize,
    num_cols: usize,
    indptr: Vec<usize>,
    indices: Vec<u32>,
    data: Vec<f64>,
}

impl CsrMatrix {
    /// Builds the matrix from coordinate triplets; repeated coordinates are summed.
    pub fn from_triplets(
        num_rows: usize,
        num_cols: usize,
        triplets: &[(usize, usize, f64)],
    ) -> Result<Self> {
        if let Some((row, col, _)) = triplets
            .iter()
            .find(|(row, col, _)| *row >= num_rows || *col >= num_cols)
        {
            return Err(RecoError::InternalComputation(format!(
                "coordinate ({}, {}) outside of a {}x{} matrix",
                row, col, num_rows, num_cols
            )));
        }

        let mut sorted = triplets.to_vec();
        sorted.sort_by_key(|(row, col, _)| (*row, *col));

        let mut indptr = vec![0_usize; num_rows + 1];
        let mut indices = Vec::with_capacity(sorted.len());
        let mut data = Vec::with_capacity(sorted.len());
        for ((row, col), group) in &sorted.iter().group_by(|(row, col, _)| (*row, *col)) {
            let value: f64 = group.map(|(_, _, value)| *value).sum();
            if value != 0.0 {
                indices.push(col as u32);
                data.push(value);
                indptr[row + 1] += 1;
            }
        }
        for row in 0..num_rows {
            indptr[row + 1] += indptr[row];
        }

        Ok(CsrMatrix {
            num_rows,
            num_cols,
            indptr,
            indices,
            data,
        })
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.num_rows, self.num_cols)
    }

    pub fn nnz(&self) -> usize {
        self.data.len()
    }

    /// Column indices and values of one row.
    pub fn row(&self, row: usize) -> Option<SparseRow<'_>> {
        if row >= self.num_rows {
            return None;
        }
        let (start, end) = (self.indptr[row], self.indptr[row + 1]);
        Some(SparseRow {
            indices: &self.indices[start..end],
            values: &self.data[start..end],
        })
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.row(row)
            .and_then(|sparse| {
                sparse
                    .indices
                    .binary_search(&(col as u32))
                    .ok()
                    .map(|pos| sparse.values[pos])
            })
            .unwrap_or(0.0)
    }

    pub fn rows(&self) -> impl Iterator<Item = SparseRow<'_>> + '_ {
        (0..self.num_rows).filter_map(move |row| self.row(row))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SparseRow<'a> {
    pub indices: &'a [u32],
    pub values: &'a [f64],
}

impl<'a> SparseRow<'a> {
    pub fn norm(&self) -> f64 {
        self.values.iter().map(|value| value * value).sum::<f64>().sqrt()
    }

    pub fn nnz(&self) -> usize {
        self.indices.len()
    }

    /// Dot product of two rows with ascending column indices.
    pub fn dot(&self, other: &SparseRow<'_>) -> f64 {
        let (mut left, mut right) = (0, 0);
        let mut sum = 0.0;
        while left < self.indices.len() && right < other.indices.len() {
            match self.indices[left].cmp(&other.indices[right]) {
                std::cmp::Ordering::Less => left += 1,
                std::cmp::Ordering::Greater => right += 1,
                std::cmp::Ordering::Equal => {
                    sum += self.values[left] * other.values[right];
                    left += 1;
                    right += 1;
                }
            }
        }
        sum
    }
}

pub fn interaction_weight(reordered: bool) -> f64 {
    if reordered {
        REORDER_WEIGHT
    } else {
        FIRST_PURCHASE_WEIGHT
    }
}

/// Turns filtered observations into the weighted user x product matrix and its indices.
pub fn build_interaction_matrix(
    observations: &[Observation],
) -> Result<(CsrMatrix, UserIndex, ProductIndex)> {
    if observations.is_empty() {
        return Err(RecoError::EmptyDataset);
    }

    let user_index = UserIndex::from_ids(observations.iter().map(|obs| obs.user_id));
    let product_index = ProductIndex::from_ids(observations.iter().map(|obs| obs.product_id));

    let mut triplets = Vec::with_capacity(observations.len());
    for observation in observations {
        // both lookups succeed, the indices were built from these observations
        if let (Some(row), Some(col)) = (
            user_index.position(&observation.user_id),
            product_index.position(&observation.product_id),
        ) {
            triplets.push((row, col, interaction_weight(observation.reordered)));
        }
    }

    let matrix = CsrMatrix::from_triplets(user_index.len(), product_index.len(), &triplets)?;
    Ok((matrix, user_index, product_index))
}
