use std::cmp::Ordering;

use crate::error::Result;

/// A training row scored against a query, ordered by ascending distance then ascending row.
#[derive(PartialEq, Debug, Clone, Copy)]
pub struct Neighbor {
    pub row: usize,
    pub distance: f64,
}

impl Neighbor {
    pub fn new(row: usize, distance: f64) -> Self {
        Neighbor { row, distance }
    }
}

impl Eq for Neighbor {}

impl Ord for Neighbor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .partial_cmp(&other.distance)
            .unwrap_or(Ordering::Equal)
            .then_with(|| self.row.cmp(&other.row))
    }
}

impl PartialOrd for Neighbor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

pub trait NeighborSearch {
    fn num_rows(&self) -> usize;

    /// The `k` rows closest to `row`, closest first, `row` itself left out.
    fn kneighbors(&self, row: usize, k: usize) -> Result<Vec<Neighbor>>;
}

#[cfg(test)]
mod neighbor_test {
    use super::*;

    #[test]
    fn should_order_by_distance_then_row() {
        let mut neighbors = vec![
            Neighbor::new(4, 0.5),
            Neighbor::new(2, 0.1),
            Neighbor::new(1, 0.5),
            Neighbor::new(3, 0.0),
        ];
        neighbors.sort();
        let rows: Vec<usize> = neighbors.iter().map(|neighbor| neighbor.row).collect();
        assert_eq!(vec![3, 2, 1, 4], rows);
    }
}
