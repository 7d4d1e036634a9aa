//! Service configuration
//!
//! Values are layered: built-in defaults < `config/similarity.{toml,yaml,json}`
//! < environment variables prefixed with `SIMILARITY__` (nested keys joined
//! with `__`, e.g. `SIMILARITY__NEIGHBORS__K=25`). A `.env` file is loaded
//! first when present.

use crate::error::{Result, SimilarityError};
use crate::index::IndexAlgorithm;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Similarity service configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SimilarityConfig {
    /// Nearest-neighbor query configuration
    pub neighbors: NeighborConfig,

    /// Event table locations
    pub datasets: DatasetConfig,

    /// HTTP server configuration
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NeighborConfig {
    /// Neighbor count when the caller does not give one (default: 10)
    pub k: usize,

    /// Minkowski exponent p (default: 2.0, Euclidean)
    pub distance_exponent: f64,

    /// Spatial index strategy (default: tree-based)
    pub index_algorithm: IndexAlgorithm,

    /// Maximum points per ball-tree leaf
    pub leaf_size: usize,
}

impl Default for NeighborConfig {
    fn default() -> Self {
        Self {
            k: 10,
            distance_exponent: 2.0,
            index_algorithm: IndexAlgorithm::TreeBased,
            leaf_size: 40,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatasetConfig {
    pub assessment_scores: PathBuf,
    pub interests: PathBuf,
    pub course_tags: PathBuf,
    pub course_views: PathBuf,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            assessment_scores: PathBuf::from("data_files/user_assessment_scores.csv"),
            interests: PathBuf::from("data_files/user_interests.csv"),
            course_tags: PathBuf::from("data_files/course_tags.csv"),
            course_views: PathBuf::from("data_files/user_course_views.csv"),
        }
    }
}

impl DatasetConfig {
    /// Dataset paths rooted at `dir`, using the standard file names
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            assessment_scores: dir.join("user_assessment_scores.csv"),
            interests: dir.join("user_interests.csv"),
            course_tags: dir.join("course_tags.csv"),
            course_views: dir.join("user_course_views.csv"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server host
    pub host: String,

    /// Server port (default: 8083)
    pub port: u16,

    /// Worker threads
    pub workers: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8083,
            workers: None,
        }
    }
}

impl SimilarityConfig {
    /// Load configuration from `.env`, config file and environment
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let settings = config::Config::builder()
            .add_source(config::File::with_name("config/similarity").required(false))
            .add_source(
                config::Environment::with_prefix("SIMILARITY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        self.neighbors.validate()?;

        let paths = [
            ("datasets.assessment_scores", &self.datasets.assessment_scores),
            ("datasets.interests", &self.datasets.interests),
            ("datasets.course_tags", &self.datasets.course_tags),
            ("datasets.course_views", &self.datasets.course_views),
        ];
        for (key, path) in paths {
            if path.as_os_str().is_empty() {
                return Err(SimilarityError::configuration(
                    "dataset path must not be empty",
                    key,
                ));
            }
        }

        if self.server.port == 0 {
            return Err(SimilarityError::configuration(
                "port must be greater than 0",
                "server.port",
            ));
        }

        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl NeighborConfig {
    pub fn validate(&self) -> Result<()> {
        if self.k == 0 {
            return Err(SimilarityError::configuration(
                "k must be a positive integer",
                "neighbors.k",
            ));
        }

        // p < 1 breaks the triangle inequality the ball tree prunes with
        if !self.distance_exponent.is_finite() || self.distance_exponent < 1.0 {
            return Err(SimilarityError::configuration(
                format!(
                    "distance_exponent must be a finite number >= 1, got {}",
                    self.distance_exponent
                ),
                "neighbors.distance_exponent",
            ));
        }

        if self.leaf_size == 0 {
            return Err(SimilarityError::configuration(
                "leaf_size must be greater than 0",
                "neighbors.leaf_size",
            ));
        }

        Ok(())
    }
}
