use dary_heap::OctonaryHeap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{RecoError, Result};
use crate::hybrid::interaction_matrix::{CsrMatrix, SparseRow};
use crate::hybrid::similarity::{Neighbor, NeighborSearch};

/// Exact (brute force) cosine nearest neighbour search over the rows of the
/// interaction matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborIndex {
    data: CsrMatrix,
    norms: Vec<f64>,
}

impl NeighborIndex {
    pub fn fit(matrix: &CsrMatrix) -> Self {
        let norms = matrix.rows().map(|row| row.norm()).collect();
        NeighborIndex {
            data: matrix.clone(),
            norms,
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        self.data.shape()
    }

    /// Scores every fitted row against `query` and keeps the `k` closest. The heap holds
    /// the current worst neighbour on top so it can be replaced in place.
    pub fn kneighbors_vector(
        &self,
        query: SparseRow<'_>,
        k: usize,
        exclude: Option<usize>,
    ) -> Vec<Neighbor> {
        if k == 0 {
            return Vec::new();
        }
        let query_norm = query.norm();

        let scored: Vec<Neighbor> = (0..self.norms.len())
            .into_par_iter()
            .filter(|row| Some(*row) != exclude)
            .filter_map(|row| {
                self.data.row(row).map(|candidate| {
                    let distance =
                        cosine_distance(&query, query_norm, &candidate, self.norms[row]);
                    Neighbor::new(row, distance)
                })
            })
            .collect();

        let mut closest = OctonaryHeap::<Neighbor>::with_capacity(k);
        for neighbor in scored.into_iter() {
            if closest.len() < k {
                closest.push(neighbor);
            } else if let Some(mut worst) = closest.peek_mut() {
                if neighbor < *worst {
                    *worst = neighbor;
                }
            }
        }
        closest.into_sorted_vec()
    }
}

impl NeighborSearch for NeighborIndex {
    fn num_rows(&self) -> usize {
        self.norms.len()
    }

    fn kneighbors(&self, row: usize, k: usize) -> Result<Vec<Neighbor>> {
        let query = self.data.row(row).ok_or_else(|| {
            RecoError::InternalComputation(format!(
                "row {} is outside of the fitted {} rows",
                row,
                self.norms.len()
            ))
        })?;
        Ok(self.kneighbors_vector(query, k, Some(row)))
    }
}

fn cosine_distance(
    left: &SparseRow<'_>,
    left_norm: f64,
    right: &SparseRow<'_>,
    right_norm: f64,
) -> f64 {
    if left_norm == 0.0 || right_norm == 0.0 {
        return 1.0;
    }
    let similarity = left.dot(right) / (left_norm * right_norm);
    (1.0 - similarity).clamp(0.0, 2.0)
}
