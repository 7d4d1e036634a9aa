//! Typed event records and feature column provenance.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier shared by every user-keyed event table.
pub type UserId = i64;

/// One scored skill assessment taken by a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentRecord {
    pub user_id: UserId,
    pub tag: String,
    pub timestamp: NaiveDateTime,
    pub score: i64,
}

/// A user following an interest tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterestRecord {
    pub user_id: UserId,
    pub tag: String,
    pub timestamp: NaiveDateTime,
}

/// One tag label attached to a course. A course may carry many.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CourseTagRecord {
    pub course_id: String,
    pub tag: String,
}

/// A single course viewing session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewRecord {
    pub user_id: UserId,
    pub timestamp: NaiveDateTime,
    pub course_id: String,
    pub author_id: i64,
    pub level: String,
    pub duration_seconds: i64,
}

/// The four event streams a feature matrix is computed from.
#[derive(Debug, Clone, Default)]
pub struct EventTables {
    pub assessments: Vec<AssessmentRecord>,
    pub interests: Vec<InterestRecord>,
    pub course_tags: Vec<CourseTagRecord>,
    pub views: Vec<ViewRecord>,
}

impl EventTables {
    pub fn is_empty(&self) -> bool {
        self.assessments.is_empty()
            && self.interests.is_empty()
            && self.course_tags.is_empty()
            && self.views.is_empty()
    }
}

/// Event table a feature column was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureSource {
    Assessments,
    Interests,
    Views,
    CourseTags,
}

/// What a feature column measures.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum FeatureKind {
    /// Mean assessment score
    ScoreMean,
    /// Number of assessments taken
    ScoreCount,
    /// Mean view duration in seconds
    DurationMean,
    /// Total view duration in seconds
    DurationSum,
    /// Number of views
    ViewCount,
    /// Views at a course level
    LevelCount(String),
    /// Views of courses by an author
    AuthorCount(i64),
    /// Assessments taken under a tag
    AssessmentTagCount(String),
    /// 1 when the user follows the interest tag
    InterestFlag(String),
    /// Distinct viewed courses carrying the tag
    CourseTagCount(String),
}

/// Named matrix column with its provenance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeatureColumn {
    pub source: FeatureSource,
    pub kind: FeatureKind,
}

impl FeatureColumn {
    pub fn new(source: FeatureSource, kind: FeatureKind) -> Self {
        Self { source, kind }
    }

    /// Namespaced column name, e.g. `level:Beginner` or `view_time:sum`.
    pub fn name(&self) -> String {
        match &self.kind {
            FeatureKind::ScoreMean => "assessment_score:mean".to_string(),
            FeatureKind::ScoreCount => "assessment_score:count".to_string(),
            FeatureKind::DurationMean => "view_time:mean".to_string(),
            FeatureKind::DurationSum => "view_time:sum".to_string(),
            FeatureKind::ViewCount => "view_time:count".to_string(),
            FeatureKind::LevelCount(level) => format!("level:{}", level),
            FeatureKind::AuthorCount(author) => format!("author:{}", author),
            FeatureKind::AssessmentTagCount(tag) => format!("assessment_tag:{}", tag),
            FeatureKind::InterestFlag(tag) => format!("interest_tag:{}", tag),
            FeatureKind::CourseTagCount(tag) => format!("course_tag:{}", tag),
        }
    }
}

impl fmt::Display for FeatureColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}
