//! Similarity Index
//!
//! Read-only nearest-neighbor structures over one [`FeatureMatrix`] snapshot.
//! Any change to the matrix means building a new index; nothing here mutates
//! after construction.

pub mod ball_tree;
pub mod brute_force;
pub mod metric;

pub use ball_tree::BallTreeIndex;
pub use brute_force::BruteForceIndex;
pub use metric::MinkowskiMetric;

use crate::config::NeighborConfig;
use crate::error::{Result, SimilarityError};
use crate::features::FeatureMatrix;
use crate::types::UserId;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Spatial index strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum IndexAlgorithm {
    #[default]
    #[serde(rename = "tree-based", alias = "ball_tree", alias = "tree")]
    TreeBased,
    #[serde(rename = "brute-force", alias = "brute")]
    BruteForce,
}

impl fmt::Display for IndexAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexAlgorithm::TreeBased => f.write_str("tree-based"),
            IndexAlgorithm::BruteForce => f.write_str("brute-force"),
        }
    }
}

impl FromStr for IndexAlgorithm {
    type Err = SimilarityError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "tree-based" | "ball_tree" | "tree" => Ok(IndexAlgorithm::TreeBased),
            "brute-force" | "brute" => Ok(IndexAlgorithm::BruteForce),
            other => Err(SimilarityError::invalid_argument(format!(
                "unknown index algorithm: {}",
                other
            ))),
        }
    }
}

/// One query result
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Neighbor {
    pub row: usize,
    pub user_id: UserId,
    pub distance: f64,
}

/// Build once, query k-nearest many times
pub trait NeighborIndex: Send + Sync {
    fn algorithm(&self) -> IndexAlgorithm;

    /// Matrix snapshot this index was built from
    fn matrix(&self) -> &FeatureMatrix;

    /// The `k + 1` rows closest to `user_id`'s row, the row itself included
    ///
    /// Ordered by ascending distance, ties by ascending row (equivalently
    /// user id). Fails with `NotFound` for unknown users and with
    /// `InvalidArgument` when `k < 1` or `k + 1` exceeds the row count.
    fn k_nearest(&self, user_id: UserId, k: usize) -> Result<Vec<Neighbor>>;

    fn len(&self) -> usize {
        self.matrix().num_rows()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Build the configured index over `matrix`
pub fn build_index(
    matrix: Arc<FeatureMatrix>,
    config: &NeighborConfig,
) -> Result<Arc<dyn NeighborIndex>> {
    config.validate()?;
    let metric = MinkowskiMetric::new(config.distance_exponent);

    let index: Arc<dyn NeighborIndex> = match config.index_algorithm {
        IndexAlgorithm::TreeBased => {
            Arc::new(BallTreeIndex::build(matrix, metric, config.leaf_size)?)
        }
        IndexAlgorithm::BruteForce => Arc::new(BruteForceIndex::build(matrix, metric)?),
    };

    Ok(index)
}

/// Resolve the query row and check `k` against the row count
pub(crate) fn validate_query(matrix: &FeatureMatrix, user_id: UserId, k: usize) -> Result<usize> {
    let row = matrix
        .row_of(user_id)
        .ok_or(SimilarityError::NotFound { user_id })?;

    if k < 1 {
        return Err(SimilarityError::invalid_argument(
            "k must be a positive integer",
        ));
    }
    // k + 1 > rows, written so k = usize::MAX cannot overflow
    if k >= matrix.num_rows() {
        return Err(SimilarityError::invalid_argument(format!(
            "k = {} leaves fewer than k + 1 of the {} indexed rows",
            k,
            matrix.num_rows()
        )));
    }

    Ok(row)
}

/// Heap entry ordered by (distance, row)
#[derive(Debug, Clone, Copy)]
pub(crate) struct Candidate {
    pub distance: f64,
    pub row: usize,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.row.cmp(&other.row))
    }
}

pub(crate) fn into_neighbors(matrix: &FeatureMatrix, mut candidates: Vec<Candidate>) -> Vec<Neighbor> {
    candidates.sort_unstable();
    candidates
        .into_iter()
        .filter_map(|c| {
            matrix.user_at(c.row).map(|user_id| Neighbor {
                row: c.row,
                user_id,
                distance: c.distance,
            })
        })
        .collect()
}
