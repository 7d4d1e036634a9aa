//! Similar-user query engine
//!
//! [`SimilarityEngine`] answers queries against one immutable matrix + index
//! snapshot. [`SimilarityService`] holds the current snapshot for concurrent
//! readers and replaces it wholesale when the event tables are rebuilt.

use crate::config::NeighborConfig;
use crate::error::{Result, SimilarityError};
use crate::features::{aggregate_all, assemble, FeatureMatrix};
use crate::index::{build_index, IndexAlgorithm, Neighbor, NeighborIndex};
use crate::types::{EventTables, UserId};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Query engine over one matrix snapshot
pub struct SimilarityEngine {
    matrix: Arc<FeatureMatrix>,
    index: Arc<dyn NeighborIndex>,
    default_k: usize,
    built_at: DateTime<Utc>,
}

impl SimilarityEngine {
    /// Aggregate, assemble and index the event tables
    #[instrument(skip_all, fields(algorithm = %config.index_algorithm))]
    pub fn build(tables: &EventTables, config: &NeighborConfig) -> Result<Self> {
        if tables.is_empty() {
            return Err(SimilarityError::EmptyDataset);
        }

        let blocks = aggregate_all(tables);
        let matrix = assemble(&blocks)?;
        Self::from_matrix(matrix, config)
    }

    /// Index an already assembled matrix
    pub fn from_matrix(matrix: FeatureMatrix, config: &NeighborConfig) -> Result<Self> {
        if matrix.is_empty() {
            return Err(SimilarityError::EmptyDataset);
        }

        let matrix = Arc::new(matrix);
        let index = build_index(Arc::clone(&matrix), config)?;

        info!(
            users = matrix.num_rows(),
            columns = matrix.num_columns(),
            algorithm = %index.algorithm(),
            "Similarity index built"
        );

        Ok(Self {
            matrix,
            index,
            default_k: config.k,
            built_at: Utc::now(),
        })
    }

    pub fn matrix(&self) -> &FeatureMatrix {
        &self.matrix
    }

    pub fn algorithm(&self) -> IndexAlgorithm {
        self.index.algorithm()
    }

    pub fn default_k(&self) -> usize {
        self.default_k
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    pub fn num_users(&self) -> usize {
        self.matrix.num_rows()
    }

    /// Up to `k` nearest other users with their distances
    ///
    /// Returns fewer than `k` entries when fewer other users exist.
    pub fn neighbors(&self, user_id: UserId, k: usize) -> Result<Vec<Neighbor>> {
        if self.matrix.row_of(user_id).is_none() {
            return Err(SimilarityError::NotFound { user_id });
        }
        if k == 0 {
            return Err(SimilarityError::invalid_argument(
                "k must be a positive integer",
            ));
        }

        let available = self.matrix.num_rows() - 1;
        if available == 0 {
            return Ok(Vec::new());
        }
        let k = k.min(available);

        // Self sits at distance 0 but duplicates with lower ids may precede it
        Ok(self
            .index
            .k_nearest(user_id, k)?
            .into_iter()
            .filter(|n| n.user_id != user_id)
            .take(k)
            .collect())
    }

    /// Ids of up to `k` most similar users, nearest first
    pub fn similar_users(&self, user_id: UserId, k: usize) -> Result<Vec<UserId>> {
        Ok(self
            .neighbors(user_id, k)?
            .into_iter()
            .map(|n| n.user_id)
            .collect())
    }

    /// [`Self::similar_users`] with the configured default `k`
    pub fn similar_users_default(&self, user_id: UserId) -> Result<Vec<UserId>> {
        self.similar_users(user_id, self.default_k)
    }
}

/// Outcome of a successful rebuild, describing the snapshot it installed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebuildReport {
    pub generation: u64,
    pub users: usize,
    pub columns: usize,
}

/// Shared holder of the current engine snapshot
///
/// Readers clone the `Arc` under a momentary read lock and query without
/// holding it. Rebuilds happen off to the side and only a successful build is
/// swapped in; in-flight queries keep the snapshot they started with.
pub struct SimilarityService {
    current: RwLock<Arc<SimilarityEngine>>,
    config: NeighborConfig,
    generation: AtomicU64,
    rebuild_lock: Mutex<()>,
}

impl SimilarityService {
    pub fn new(engine: SimilarityEngine, config: NeighborConfig) -> Self {
        Self {
            current: RwLock::new(Arc::new(engine)),
            config,
            generation: AtomicU64::new(1),
            rebuild_lock: Mutex::new(()),
        }
    }

    /// Build the first snapshot from event tables
    pub fn build(tables: &EventTables, config: NeighborConfig) -> Result<Self> {
        let engine = SimilarityEngine::build(tables, &config)?;
        Ok(Self::new(engine, config))
    }

    pub fn config(&self) -> &NeighborConfig {
        &self.config
    }

    /// Current snapshot
    pub fn snapshot(&self) -> Arc<SimilarityEngine> {
        Arc::clone(&self.current.read())
    }

    /// Number of snapshots installed so far
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Similar users against the current snapshot, `k` defaulting to config
    pub fn similar_users(&self, user_id: UserId, k: Option<usize>) -> Result<Vec<UserId>> {
        let engine = self.snapshot();
        engine.similar_users(user_id, k.unwrap_or(engine.default_k()))
    }

    /// Install an externally built engine
    pub fn swap(&self, engine: SimilarityEngine) -> u64 {
        let engine = Arc::new(engine);
        *self.current.write() = engine;
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Rebuild from fresh event tables and swap the result in
    ///
    /// On failure the previous snapshot stays current.
    #[instrument(skip_all)]
    pub fn rebuild(&self, tables: &EventTables) -> Result<RebuildReport> {
        let _guard = self.rebuild_lock.lock();

        match SimilarityEngine::build(tables, &self.config) {
            Ok(engine) => {
                let users = engine.num_users();
                let columns = engine.matrix().num_columns();
                let generation = self.swap(engine);
                info!(generation, users, columns, "Swapped in rebuilt similarity index");
                Ok(RebuildReport {
                    generation,
                    users,
                    columns,
                })
            }
            Err(e) => {
                warn!(error = %e, "Rebuild failed, keeping current snapshot");
                Err(e)
            }
        }
    }
}
