//! User Similarity Engine
//!
//! Builds a numeric feature vector per user from assessment, interest,
//! course-tag and course-view event tables, and answers "which users are most
//! like this one" with a k-nearest-neighbor search over those vectors.
//!
//! Data flows one way: [`features::aggregator`] → [`features::assembler`] →
//! [`index`] → [`engine`]. A built index is immutable; a new matrix means a
//! new index, swapped in atomically by [`SimilarityService`].

pub mod config;
pub mod engine;
pub mod error;
pub mod features;
pub mod index;
pub mod loader;
pub mod server;
pub mod types;

// Re-export key types
pub use config::{DatasetConfig, NeighborConfig, ServerConfig, SimilarityConfig};
pub use engine::{RebuildReport, SimilarityEngine, SimilarityService};
pub use error::{Result, SimilarityError};
pub use features::{assemble, FeatureBlock, FeatureMatrix};
pub use index::{
    build_index, BallTreeIndex, BruteForceIndex, IndexAlgorithm, MinkowskiMetric, Neighbor,
    NeighborIndex,
};
pub use loader::load_event_tables;
pub use types::*;
