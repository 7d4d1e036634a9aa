//! Feature Aggregation
//!
//! Turns each event table into one or more sparse per-user blocks. A block
//! only holds the (user, column) cells its source actually produced; missing
//! cells are filled with zero by the assembler, never here.

use crate::types::{
    AssessmentRecord, CourseTagRecord, EventTables, FeatureColumn, FeatureKind, FeatureSource,
    InterestRecord, UserId, ViewRecord,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

/// Sparse per-user feature values sharing one column list
#[derive(Debug, Clone)]
pub struct FeatureBlock {
    name: &'static str,
    columns: Vec<FeatureColumn>,
    column_positions: HashMap<FeatureColumn, usize>,
    rows: BTreeMap<UserId, HashMap<usize, f64>>,
}

impl FeatureBlock {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            columns: Vec::new(),
            column_positions: HashMap::new(),
            rows: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Columns in first-seen order
    pub fn columns(&self) -> &[FeatureColumn] {
        &self.columns
    }

    /// User ids with at least one value, ascending
    pub fn user_ids(&self) -> impl Iterator<Item = UserId> + '_ {
        self.rows.keys().copied()
    }

    pub fn num_users(&self) -> usize {
        self.rows.len()
    }

    /// Value for (user, column position), `None` when the source had no data
    pub fn value(&self, user_id: UserId, column: usize) -> Option<f64> {
        self.rows.get(&user_id)?.get(&column).copied()
    }

    /// Value looked up by column
    pub fn get(&self, user_id: UserId, column: &FeatureColumn) -> Option<f64> {
        let position = *self.column_positions.get(column)?;
        self.value(user_id, position)
    }

    /// Present cells of one user as (column position, value)
    pub fn row(&self, user_id: UserId) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.rows
            .get(&user_id)
            .into_iter()
            .flat_map(|cells| cells.iter().map(|(&column, &value)| (column, value)))
    }

    fn column_position(&mut self, column: FeatureColumn) -> usize {
        if let Some(&position) = self.column_positions.get(&column) {
            return position;
        }
        let position = self.columns.len();
        self.column_positions.insert(column.clone(), position);
        self.columns.push(column);
        position
    }

    pub fn set(&mut self, user_id: UserId, column: FeatureColumn, value: f64) {
        let position = self.column_position(column);
        self.rows.entry(user_id).or_default().insert(position, value);
    }

    pub fn increment(&mut self, user_id: UserId, column: FeatureColumn) {
        let position = self.column_position(column);
        *self
            .rows
            .entry(user_id)
            .or_default()
            .entry(position)
            .or_insert(0.0) += 1.0;
    }
}

/// Running sum/count accumulator for one user
#[derive(Debug, Default, Clone, Copy)]
struct Stats {
    sum: f64,
    count: usize,
}

impl Stats {
    fn push(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}

fn group_stats(values: impl Iterator<Item = (UserId, f64)>) -> BTreeMap<UserId, Stats> {
    let mut grouped: BTreeMap<UserId, Stats> = BTreeMap::new();
    for (user_id, value) in values {
        grouped.entry(user_id).or_default().push(value);
    }
    grouped
}

/// Mean score and number of assessments per user
pub fn assessment_stats(records: &[AssessmentRecord]) -> FeatureBlock {
    let mut block = FeatureBlock::new("assessment_stats");
    let grouped = group_stats(records.iter().map(|r| (r.user_id, r.score as f64)));

    for (user_id, stats) in grouped {
        block.set(
            user_id,
            FeatureColumn::new(FeatureSource::Assessments, FeatureKind::ScoreMean),
            stats.mean(),
        );
        block.set(
            user_id,
            FeatureColumn::new(FeatureSource::Assessments, FeatureKind::ScoreCount),
            stats.count as f64,
        );
    }

    block
}

/// Mean, total and count of view durations per user
pub fn view_stats(records: &[ViewRecord]) -> FeatureBlock {
    let mut block = FeatureBlock::new("view_stats");
    let grouped = group_stats(
        records
            .iter()
            .map(|r| (r.user_id, r.duration_seconds as f64)),
    );

    for (user_id, stats) in grouped {
        block.set(
            user_id,
            FeatureColumn::new(FeatureSource::Views, FeatureKind::DurationMean),
            stats.mean(),
        );
        block.set(
            user_id,
            FeatureColumn::new(FeatureSource::Views, FeatureKind::DurationSum),
            stats.sum,
        );
        block.set(
            user_id,
            FeatureColumn::new(FeatureSource::Views, FeatureKind::ViewCount),
            stats.count as f64,
        );
    }

    block
}

/// Cross-tabulate (user, category) occurrences into counts
fn pivot_counts(
    name: &'static str,
    source: FeatureSource,
    cells: impl Iterator<Item = (UserId, FeatureKind)>,
) -> FeatureBlock {
    let mut block = FeatureBlock::new(name);
    for (user_id, kind) in cells {
        block.increment(user_id, FeatureColumn::new(source, kind));
    }
    block
}

/// Views per course level per user
pub fn level_counts(records: &[ViewRecord]) -> FeatureBlock {
    pivot_counts(
        "level_counts",
        FeatureSource::Views,
        records
            .iter()
            .map(|r| (r.user_id, FeatureKind::LevelCount(r.level.clone()))),
    )
}

/// Views per author per user
pub fn author_counts(records: &[ViewRecord]) -> FeatureBlock {
    pivot_counts(
        "author_counts",
        FeatureSource::Views,
        records
            .iter()
            .map(|r| (r.user_id, FeatureKind::AuthorCount(r.author_id))),
    )
}

/// Assessments per tag per user
pub fn assessment_tag_counts(records: &[AssessmentRecord]) -> FeatureBlock {
    pivot_counts(
        "assessment_tag_counts",
        FeatureSource::Assessments,
        records
            .iter()
            .map(|r| (r.user_id, FeatureKind::AssessmentTagCount(r.tag.clone()))),
    )
}

/// Binary indicator of each followed interest tag per user
pub fn interest_tag_flags(records: &[InterestRecord]) -> FeatureBlock {
    let mut block = FeatureBlock::new("interest_tag_flags");
    for record in records {
        block.set(
            record.user_id,
            FeatureColumn::new(
                FeatureSource::Interests,
                FeatureKind::InterestFlag(record.tag.clone()),
            ),
            1.0,
        );
    }
    block
}

/// Distinct viewed courses carrying each tag, per user
///
/// Views are deduplicated on (user, course) before joining, so re-watching a
/// course never counts its tags twice. Courses without tags contribute nothing.
pub fn course_tag_counts(views: &[ViewRecord], course_tags: &[CourseTagRecord]) -> FeatureBlock {
    let mut tags_by_course: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut seen_labels: HashSet<(&str, &str)> = HashSet::new();
    for record in course_tags {
        if seen_labels.insert((record.course_id.as_str(), record.tag.as_str())) {
            tags_by_course
                .entry(record.course_id.as_str())
                .or_default()
                .push(record.tag.as_str());
        }
    }

    let mut block = FeatureBlock::new("course_tag_counts");
    let mut seen_views: HashSet<(UserId, &str)> = HashSet::new();

    for view in views {
        if !seen_views.insert((view.user_id, view.course_id.as_str())) {
            continue;
        }
        let Some(tags) = tags_by_course.get(view.course_id.as_str()) else {
            continue;
        };
        for tag in tags {
            block.increment(
                view.user_id,
                FeatureColumn::new(
                    FeatureSource::CourseTags,
                    FeatureKind::CourseTagCount((*tag).to_string()),
                ),
            );
        }
    }

    block
}

/// All blocks in assembly order
pub fn aggregate_all(tables: &EventTables) -> Vec<FeatureBlock> {
    let blocks = vec![
        assessment_stats(&tables.assessments),
        view_stats(&tables.views),
        level_counts(&tables.views),
        author_counts(&tables.views),
        assessment_tag_counts(&tables.assessments),
        interest_tag_flags(&tables.interests),
        course_tag_counts(&tables.views, &tables.course_tags),
    ];

    for block in &blocks {
        debug!(
            block = block.name(),
            users = block.num_users(),
            columns = block.columns().len(),
            "Aggregated feature block"
        );
    }

    blocks
}
