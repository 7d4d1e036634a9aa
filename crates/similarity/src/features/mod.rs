//! Per-user feature construction
//!
//! Event tables are aggregated into independent [`FeatureBlock`]s, which the
//! assembler merges into one dense [`FeatureMatrix`].

pub mod aggregator;
pub mod assembler;

pub use aggregator::{
    aggregate_all, assessment_stats, assessment_tag_counts, author_counts, course_tag_counts,
    interest_tag_flags, level_counts, view_stats, FeatureBlock,
};
pub use assembler::{assemble, FeatureMatrix};
