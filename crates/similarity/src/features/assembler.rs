//! Feature Matrix Assembly
//!
//! Merges aggregated blocks into one dense matrix: rows are the union of all
//! users in ascending id order, columns are the union of all block columns in
//! block order, absent cells are zero.

use crate::error::{Result, SimilarityError};
use crate::features::aggregator::FeatureBlock;
use crate::types::{FeatureColumn, UserId};
use ndarray::{Array2, ArrayView1};
use std::collections::{BTreeSet, HashMap};
use tracing::info;

/// Dense user-by-feature matrix, immutable once assembled
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    columns: Vec<FeatureColumn>,
    user_ids: Vec<UserId>,
    row_index: HashMap<UserId, usize>,
    values: Array2<f64>,
}

impl FeatureMatrix {
    /// Build a matrix directly from per-user rows
    ///
    /// Rows are reordered by ascending user id. Fails on duplicate users or
    /// rows whose width differs from the column count.
    pub fn from_rows(columns: Vec<FeatureColumn>, mut rows: Vec<(UserId, Vec<f64>)>) -> Result<Self> {
        rows.sort_by_key(|(user_id, _)| *user_id);

        let width = columns.len();
        let mut values = Array2::<f64>::zeros((rows.len(), width));
        let mut user_ids = Vec::with_capacity(rows.len());
        let mut row_index = HashMap::with_capacity(rows.len());

        for (row, (user_id, features)) in rows.into_iter().enumerate() {
            if features.len() != width {
                return Err(SimilarityError::invalid_argument(format!(
                    "row for user {} has {} values, expected {}",
                    user_id,
                    features.len(),
                    width
                )));
            }
            if row_index.insert(user_id, row).is_some() {
                return Err(SimilarityError::invalid_argument(format!(
                    "duplicate row for user {}",
                    user_id
                )));
            }
            for (col, value) in features.into_iter().enumerate() {
                values[[row, col]] = value;
            }
            user_ids.push(user_id);
        }

        Ok(Self {
            columns,
            user_ids,
            row_index,
            values,
        })
    }

    pub fn num_rows(&self) -> usize {
        self.user_ids.len()
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.user_ids.is_empty()
    }

    pub fn columns(&self) -> &[FeatureColumn] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(FeatureColumn::name).collect()
    }

    /// User ids in row order (ascending)
    pub fn user_ids(&self) -> &[UserId] {
        &self.user_ids
    }

    pub fn row_of(&self, user_id: UserId) -> Option<usize> {
        self.row_index.get(&user_id).copied()
    }

    pub fn user_at(&self, row: usize) -> Option<UserId> {
        self.user_ids.get(row).copied()
    }

    pub fn row(&self, row: usize) -> ArrayView1<'_, f64> {
        self.values.row(row)
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    /// Feature vector of one user paired with its columns
    pub fn feature_vector(&self, user_id: UserId) -> Option<Vec<(&FeatureColumn, f64)>> {
        let row = self.row_of(user_id)?;
        Some(
            self.columns
                .iter()
                .zip(self.values.row(row).iter().copied())
                .collect(),
        )
    }

    /// Value of a named column for a user
    pub fn value(&self, user_id: UserId, column_name: &str) -> Option<f64> {
        let row = self.row_of(user_id)?;
        let col = self.columns.iter().position(|c| c.name() == column_name)?;
        Some(self.values[[row, col]])
    }
}

/// Assemble blocks into a dense matrix
///
/// Fails with [`SimilarityError::SchemaMismatch`] if two blocks (or two
/// columns) share a column name.
pub fn assemble(blocks: &[FeatureBlock]) -> Result<FeatureMatrix> {
    let mut columns = Vec::new();
    let mut owners: HashMap<String, &'static str> = HashMap::new();
    let mut offsets = Vec::with_capacity(blocks.len());

    for block in blocks {
        offsets.push(columns.len());
        for column in block.columns() {
            let name = column.name();
            if let Some(owner) = owners.insert(name.clone(), block.name()) {
                tracing::error!(
                    column = %name,
                    first_block = owner,
                    second_block = block.name(),
                    "Feature column defined twice"
                );
                return Err(SimilarityError::SchemaMismatch { column: name });
            }
            columns.push(column.clone());
        }
    }

    let user_ids: Vec<UserId> = blocks
        .iter()
        .flat_map(|block| block.user_ids())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let row_index: HashMap<UserId, usize> = user_ids
        .iter()
        .enumerate()
        .map(|(row, &user_id)| (user_id, row))
        .collect();

    let mut values = Array2::<f64>::zeros((user_ids.len(), columns.len()));
    for (block, offset) in blocks.iter().zip(offsets) {
        for user_id in block.user_ids() {
            let row = row_index[&user_id];
            for (col, value) in block.row(user_id) {
                values[[row, offset + col]] = value;
            }
        }
    }

    info!(
        users = user_ids.len(),
        columns = columns.len(),
        blocks = blocks.len(),
        "Assembled feature matrix"
    );

    Ok(FeatureMatrix {
        columns,
        user_ids,
        row_index,
        values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FeatureKind, FeatureSource};

    fn level(name: &str) -> FeatureColumn {
        FeatureColumn::new(FeatureSource::Views, FeatureKind::LevelCount(name.to_string()))
    }

    fn interest(name: &str) -> FeatureColumn {
        FeatureColumn::new(
            FeatureSource::Interests,
            FeatureKind::InterestFlag(name.to_string()),
        )
    }

    #[test]
    fn test_assemble_fills_missing_cells_with_zero() {
        let mut levels = FeatureBlock::new("level_counts");
        levels.increment(3, level("Beginner"));
        levels.increment(3, level("Beginner"));
        levels.increment(1, level("Advanced"));

        let mut interests = FeatureBlock::new("interest_tag_flags");
        interests.set(2, interest("rust"), 1.0);

        let matrix = assemble(&[levels, interests]).unwrap();

        assert_eq!(matrix.user_ids(), &[1, 2, 3]);
        assert_eq!(
            matrix.column_names(),
            vec!["level:Beginner", "level:Advanced", "interest_tag:rust"]
        );
        assert_eq!(matrix.value(3, "level:Beginner"), Some(2.0));
        assert_eq!(matrix.value(2, "level:Beginner"), Some(0.0));
        assert_eq!(matrix.value(2, "interest_tag:rust"), Some(1.0));
        assert_eq!(matrix.value(1, "interest_tag:rust"), Some(0.0));
    }

    #[test]
    fn test_assemble_rejects_duplicate_columns() {
        let mut first = FeatureBlock::new("first");
        first.increment(1, level("Beginner"));
        let mut second = FeatureBlock::new("second");
        second.increment(2, level("Beginner"));

        match assemble(&[first, second]) {
            Err(SimilarityError::SchemaMismatch { column }) => {
                assert_eq!(column, "level:Beginner");
            }
            other => panic!("expected schema mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_assemble_no_blocks_is_empty() {
        let matrix = assemble(&[]).unwrap();
        assert!(matrix.is_empty());
        assert_eq!(matrix.num_columns(), 0);
    }

    #[test]
    fn test_from_rows_sorts_by_user() {
        let matrix = FeatureMatrix::from_rows(
            vec![level("Beginner")],
            vec![(9, vec![1.0]), (4, vec![2.0])],
        )
        .unwrap();

        assert_eq!(matrix.user_ids(), &[4, 9]);
        assert_eq!(matrix.row_of(9), Some(1));
        assert_eq!(matrix.row(0)[0], 2.0);
    }

    #[test]
    fn test_from_rows_rejects_bad_width_and_duplicates() {
        assert!(FeatureMatrix::from_rows(vec![level("Beginner")], vec![(1, vec![])]).is_err());
        assert!(FeatureMatrix::from_rows(
            vec![level("Beginner")],
            vec![(1, vec![1.0]), (1, vec![2.0])]
        )
        .is_err());
    }
}
