//! Exhaustive linear-scan index

use super::{into_neighbors, validate_query, Candidate, IndexAlgorithm, Neighbor, NeighborIndex};
use crate::error::{Result, SimilarityError};
use crate::features::FeatureMatrix;
use crate::index::MinkowskiMetric;
use crate::types::UserId;
use std::sync::Arc;

/// Compares the query row against every row
///
/// Reference implementation for the ball tree; fine for small matrices.
pub struct BruteForceIndex {
    matrix: Arc<FeatureMatrix>,
    metric: MinkowskiMetric,
}

impl BruteForceIndex {
    pub fn build(matrix: Arc<FeatureMatrix>, metric: MinkowskiMetric) -> Result<Self> {
        if matrix.is_empty() {
            return Err(SimilarityError::EmptyDataset);
        }
        Ok(Self { matrix, metric })
    }
}

impl NeighborIndex for BruteForceIndex {
    fn algorithm(&self) -> IndexAlgorithm {
        IndexAlgorithm::BruteForce
    }

    fn matrix(&self) -> &FeatureMatrix {
        &self.matrix
    }

    fn k_nearest(&self, user_id: UserId, k: usize) -> Result<Vec<Neighbor>> {
        let query_row = validate_query(&self.matrix, user_id, k)?;
        let query = self.matrix.row(query_row);

        let mut candidates: Vec<Candidate> = (0..self.matrix.num_rows())
            .map(|row| Candidate {
                distance: self.metric.distance(query, self.matrix.row(row)),
                row,
            })
            .collect();

        let wanted = k + 1;
        if candidates.len() > wanted {
            candidates.select_nth_unstable(wanted - 1);
            candidates.truncate(wanted);
        }

        Ok(into_neighbors(&self.matrix, candidates))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FeatureColumn, FeatureKind, FeatureSource};

    fn matrix(rows: Vec<(UserId, Vec<f64>)>) -> Arc<FeatureMatrix> {
        let width = rows.first().map(|(_, r)| r.len()).unwrap_or(0);
        let columns = (0..width)
            .map(|i| {
                FeatureColumn::new(
                    FeatureSource::Views,
                    FeatureKind::AuthorCount(i as i64),
                )
            })
            .collect();
        Arc::new(FeatureMatrix::from_rows(columns, rows).unwrap())
    }

    #[test]
    fn test_nearest_on_a_line() {
        let index = BruteForceIndex::build(
            matrix((1..=5).map(|id| (id, vec![id as f64])).collect()),
            MinkowskiMetric::euclidean(),
        )
        .unwrap();

        let result = index.k_nearest(3, 2).unwrap();
        let users: Vec<UserId> = result.iter().map(|n| n.user_id).collect();
        // 2 and 4 tie at distance 1, lower id first
        assert_eq!(users, vec![3, 2, 4]);
        assert_eq!(result[0].distance, 0.0);
    }

    #[test]
    fn test_duplicate_points_ordered_by_user_id() {
        let index = BruteForceIndex::build(
            matrix(vec![
                (10, vec![1.0, 1.0]),
                (7, vec![1.0, 1.0]),
                (3, vec![5.0, 5.0]),
            ]),
            MinkowskiMetric::euclidean(),
        )
        .unwrap();

        let users: Vec<UserId> = index
            .k_nearest(10, 1)
            .unwrap()
            .iter()
            .map(|n| n.user_id)
            .collect();
        assert_eq!(users, vec![7, 10]);
    }

    #[test]
    fn test_k_bounds() {
        let index = BruteForceIndex::build(
            matrix(vec![(1, vec![0.0]), (2, vec![1.0])]),
            MinkowskiMetric::euclidean(),
        )
        .unwrap();

        assert!(index.k_nearest(1, 1).is_ok());
        assert!(matches!(
            index.k_nearest(1, 2),
            Err(SimilarityError::InvalidArgument(_))
        ));
        assert!(matches!(
            index.k_nearest(1, 0),
            Err(SimilarityError::InvalidArgument(_))
        ));
        assert!(matches!(
            index.k_nearest(1, usize::MAX),
            Err(SimilarityError::InvalidArgument(_))
        ));
    }
}
