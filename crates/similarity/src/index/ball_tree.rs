//! Ball tree index
//!
//! Rows are recursively split at the median of their widest dimension. Every
//! node keeps the centroid of its rows and the radius of the smallest ball
//! around that centroid containing them, so a whole subtree is skipped once
//! `d(query, center) - radius` exceeds the current k-th best distance.

use super::{into_neighbors, validate_query, Candidate, IndexAlgorithm, Neighbor, NeighborIndex};
use crate::error::{Result, SimilarityError};
use crate::features::FeatureMatrix;
use crate::index::MinkowskiMetric;
use crate::types::UserId;
use ndarray::{Array1, ArrayView1};
use std::collections::BinaryHeap;
use std::sync::Arc;
use tracing::debug;

/// Relative slack on the pruning bound to absorb floating point rounding
const PRUNE_TOLERANCE: f64 = 1e-9;

#[derive(Debug)]
struct BallNode {
    center: Array1<f64>,
    radius: f64,
    /// Range of `order` covered by this node
    start: usize,
    end: usize,
    children: Option<(usize, usize)>,
}

/// Ball tree over the rows of one feature matrix
pub struct BallTreeIndex {
    matrix: Arc<FeatureMatrix>,
    metric: MinkowskiMetric,
    nodes: Vec<BallNode>,
    order: Vec<usize>,
}

struct TreeBuilder<'a> {
    matrix: &'a FeatureMatrix,
    metric: MinkowskiMetric,
    leaf_size: usize,
    order: Vec<usize>,
    nodes: Vec<BallNode>,
}

impl<'a> TreeBuilder<'a> {
    fn build_node(&mut self, start: usize, end: usize) -> usize {
        let center = self.centroid(start, end);
        let radius = self.order[start..end]
            .iter()
            .map(|&row| self.metric.distance(center.view(), self.matrix.row(row)))
            .fold(0.0, f64::max);

        let node_id = self.nodes.len();
        self.nodes.push(BallNode {
            center,
            radius,
            start,
            end,
            children: None,
        });

        let count = end - start;
        if count <= self.leaf_size {
            return node_id;
        }

        // All rows identical: nothing left to split on
        let Some(dim) = self.widest_dimension(start, end) else {
            return node_id;
        };

        let matrix = self.matrix;
        let values = matrix.values();
        let mid = count / 2;
        self.order[start..end].select_nth_unstable_by(mid, |&a, &b| {
            values[[a, dim]]
                .total_cmp(&values[[b, dim]])
                .then_with(|| a.cmp(&b))
        });

        let left = self.build_node(start, start + mid);
        let right = self.build_node(start + mid, end);
        self.nodes[node_id].children = Some((left, right));

        node_id
    }

    fn centroid(&self, start: usize, end: usize) -> Array1<f64> {
        let mut center = Array1::<f64>::zeros(self.matrix.num_columns());
        for &row in &self.order[start..end] {
            center += &self.matrix.row(row);
        }
        center /= (end - start) as f64;
        center
    }

    fn widest_dimension(&self, start: usize, end: usize) -> Option<usize> {
        let mut widest = None;
        let mut max_spread = 0.0;

        for dim in 0..self.matrix.num_columns() {
            let (min, max) = self.order[start..end].iter().fold(
                (f64::INFINITY, f64::NEG_INFINITY),
                |(min, max), &row| {
                    let value = self.matrix.values()[[row, dim]];
                    (min.min(value), max.max(value))
                },
            );
            let spread = max - min;
            if spread > max_spread {
                max_spread = spread;
                widest = Some(dim);
            }
        }

        widest
    }
}

impl BallTreeIndex {
    pub fn build(
        matrix: Arc<FeatureMatrix>,
        metric: MinkowskiMetric,
        leaf_size: usize,
    ) -> Result<Self> {
        if matrix.is_empty() {
            return Err(SimilarityError::EmptyDataset);
        }
        if leaf_size == 0 {
            return Err(SimilarityError::invalid_argument(
                "leaf_size must be greater than 0",
            ));
        }

        let mut builder = TreeBuilder {
            matrix: &matrix,
            metric,
            leaf_size,
            order: (0..matrix.num_rows()).collect(),
            nodes: Vec::new(),
        };
        builder.build_node(0, matrix.num_rows());
        let TreeBuilder { order, nodes, .. } = builder;

        debug!(
            rows = matrix.num_rows(),
            columns = matrix.num_columns(),
            nodes = nodes.len(),
            leaf_size,
            p = metric.exponent(),
            "Built ball tree"
        );

        Ok(Self {
            matrix,
            metric,
            nodes,
            order,
        })
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    fn search(
        &self,
        node_id: usize,
        center_distance: f64,
        query: ArrayView1<'_, f64>,
        wanted: usize,
        heap: &mut BinaryHeap<Candidate>,
    ) {
        let node = &self.nodes[node_id];

        if heap.len() == wanted {
            if let Some(worst) = heap.peek() {
                let lower_bound = center_distance - node.radius;
                if lower_bound > worst.distance + PRUNE_TOLERANCE * (1.0 + worst.distance) {
                    return;
                }
            }
        }

        match node.children {
            None => {
                for &row in &self.order[node.start..node.end] {
                    let candidate = Candidate {
                        distance: self.metric.distance(query, self.matrix.row(row)),
                        row,
                    };
                    push_bounded(heap, candidate, wanted);
                }
            }
            Some((left, right)) => {
                let left_distance = self.metric.distance(query, self.nodes[left].center.view());
                let right_distance = self.metric.distance(query, self.nodes[right].center.view());

                if left_distance <= right_distance {
                    self.search(left, left_distance, query, wanted, heap);
                    self.search(right, right_distance, query, wanted, heap);
                } else {
                    self.search(right, right_distance, query, wanted, heap);
                    self.search(left, left_distance, query, wanted, heap);
                }
            }
        }
    }
}

/// Keep the `wanted` smallest candidates in a max-heap
fn push_bounded(heap: &mut BinaryHeap<Candidate>, candidate: Candidate, wanted: usize) {
    if heap.len() < wanted {
        heap.push(candidate);
    } else if heap.peek().is_some_and(|worst| candidate < *worst) {
        heap.pop();
        heap.push(candidate);
    }
}

impl NeighborIndex for BallTreeIndex {
    fn algorithm(&self) -> IndexAlgorithm {
        IndexAlgorithm::TreeBased
    }

    fn matrix(&self) -> &FeatureMatrix {
        &self.matrix
    }

    fn k_nearest(&self, user_id: UserId, k: usize) -> Result<Vec<Neighbor>> {
        let query_row = validate_query(&self.matrix, user_id, k)?;
        let query = self.matrix.row(query_row);
        let wanted = k + 1;

        let mut heap = BinaryHeap::with_capacity(wanted + 1);
        let root_distance = self.metric.distance(query, self.nodes[0].center.view());
        self.search(0, root_distance, query, wanted, &mut heap);

        Ok(into_neighbors(&self.matrix, heap.into_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::BruteForceIndex;
    use crate::types::{FeatureColumn, FeatureKind, FeatureSource};

    fn grid_matrix(side: i64) -> Arc<FeatureMatrix> {
        let columns = vec![
            FeatureColumn::new(FeatureSource::Views, FeatureKind::DurationMean),
            FeatureColumn::new(FeatureSource::Views, FeatureKind::ViewCount),
        ];
        let rows = (0..side * side)
            .map(|i| (i + 1, vec![(i % side) as f64, (i / side) as f64]))
            .collect();
        Arc::new(FeatureMatrix::from_rows(columns, rows).unwrap())
    }

    #[test]
    fn test_tree_splits_into_leaves() {
        let tree = BallTreeIndex::build(grid_matrix(10), MinkowskiMetric::euclidean(), 4).unwrap();
        assert!(tree.num_nodes() > 1);
        // every row lands in exactly one leaf
        let mut covered: Vec<usize> = tree
            .nodes
            .iter()
            .filter(|n| n.children.is_none())
            .flat_map(|n| tree.order[n.start..n.end].iter().copied())
            .collect();
        covered.sort_unstable();
        assert_eq!(covered, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_node_balls_contain_their_rows() {
        let matrix = grid_matrix(8);
        let metric = MinkowskiMetric::euclidean();
        let tree = BallTreeIndex::build(matrix.clone(), metric, 3).unwrap();

        for node in &tree.nodes {
            for &row in &tree.order[node.start..node.end] {
                let d = metric.distance(node.center.view(), matrix.row(row));
                assert!(d <= node.radius + 1e-12);
            }
        }
    }

    #[test]
    fn test_matches_brute_force_on_grid_ties() {
        let matrix = grid_matrix(9);
        for p in [1.0, 2.0, 3.0] {
            let metric = MinkowskiMetric::new(p);
            let tree = BallTreeIndex::build(matrix.clone(), metric, 2).unwrap();
            let brute = BruteForceIndex::build(matrix.clone(), metric).unwrap();

            for &user_id in matrix.user_ids() {
                for k in [1, 4, 12] {
                    assert_eq!(
                        tree.k_nearest(user_id, k).unwrap(),
                        brute.k_nearest(user_id, k).unwrap(),
                        "user {} k {} p {}",
                        user_id,
                        k,
                        p
                    );
                }
            }
        }
    }

    #[test]
    fn test_identical_rows_do_not_split_forever() {
        let column = FeatureColumn::new(FeatureSource::Views, FeatureKind::ViewCount);
        let rows = (1..=50).map(|id| (id, vec![3.0])).collect();
        let matrix = Arc::new(FeatureMatrix::from_rows(vec![column], rows).unwrap());

        let tree = BallTreeIndex::build(matrix, MinkowskiMetric::euclidean(), 1).unwrap();
        assert_eq!(tree.num_nodes(), 1);

        let users: Vec<UserId> = tree
            .k_nearest(30, 3)
            .unwrap()
            .iter()
            .map(|n| n.user_id)
            .collect();
        assert_eq!(users, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_k_past_row_count_is_invalid() {
        let tree = BallTreeIndex::build(grid_matrix(3), MinkowskiMetric::euclidean(), 2).unwrap();

        assert!(tree.k_nearest(1, 8).is_ok());
        for k in [9, usize::MAX] {
            assert!(matches!(
                tree.k_nearest(1, k),
                Err(SimilarityError::InvalidArgument(_))
            ));
        }
    }

    #[test]
    fn test_zero_width_matrix() {
        let rows = (1..=3).map(|id| (id, Vec::new())).collect();
        let matrix = Arc::new(FeatureMatrix::from_rows(Vec::new(), rows).unwrap());
        let tree = BallTreeIndex::build(matrix, MinkowskiMetric::euclidean(), 1).unwrap();

        let result = tree.k_nearest(2, 2).unwrap();
        assert!(result.iter().all(|n| n.distance == 0.0));
        assert_eq!(result.len(), 3);
    }
}
