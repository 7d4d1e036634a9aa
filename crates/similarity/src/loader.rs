//! CSV ingestion of the four event tables
//!
//! Files use the export headers of the course platform:
//!
//! | table            | columns                                                                  |
//! |------------------|--------------------------------------------------------------------------|
//! | assessment scores| `user_handle, assessment_tag, user_assessment_date, user_assessment_score` |
//! | interests        | `user_handle, interest_tag, date_followed`                              |
//! | course tags      | `course_id, course_tags`                                                 |
//! | course views     | `user_handle, view_date, course_id, author_handle, level, view_time_seconds` |

use crate::config::DatasetConfig;
use crate::error::{Result, SimilarityError};
use crate::types::{AssessmentRecord, CourseTagRecord, EventTables, InterestRecord, ViewRecord};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::de::{self, DeserializeOwned};
use serde::{Deserialize, Deserializer};
use std::io;
use std::path::Path;
use tracing::{info, instrument};

const TIMESTAMP_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Parse `YYYY-MM-DD HH:MM:SS`, RFC 3339 or a bare date (midnight)
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();

    for format in TIMESTAMP_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(ts);
        }
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.naive_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> std::result::Result<NaiveDateTime, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).ok_or_else(|| de::Error::custom(format!("invalid timestamp: {}", raw)))
}

#[derive(Debug, Deserialize)]
struct AssessmentRow {
    user_handle: i64,
    assessment_tag: String,
    #[serde(deserialize_with = "deserialize_timestamp")]
    user_assessment_date: NaiveDateTime,
    user_assessment_score: i64,
}

#[derive(Debug, Deserialize)]
struct InterestRow {
    user_handle: i64,
    interest_tag: String,
    #[serde(deserialize_with = "deserialize_timestamp")]
    date_followed: NaiveDateTime,
}

#[derive(Debug, Deserialize)]
struct CourseTagRow {
    course_id: String,
    course_tags: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ViewRow {
    user_handle: i64,
    #[serde(deserialize_with = "deserialize_timestamp")]
    view_date: NaiveDateTime,
    course_id: String,
    author_handle: i64,
    level: String,
    view_time_seconds: i64,
}

fn read_rows<T, R>(reader: R, source: &str) -> Result<Vec<T>>
where
    T: DeserializeOwned,
    R: io::Read,
{
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    reader
        .deserialize()
        .enumerate()
        .map(|(line, row)| {
            row.map_err(|e| {
                SimilarityError::Ingestion(format!("{} record {}: {}", source, line + 1, e))
            })
        })
        .collect()
}

fn open(path: &Path) -> Result<std::fs::File> {
    std::fs::File::open(path)
        .map_err(|e| SimilarityError::Ingestion(format!("{}: {}", path.display(), e)))
}

pub fn read_assessments<R: io::Read>(reader: R, source: &str) -> Result<Vec<AssessmentRecord>> {
    Ok(read_rows::<AssessmentRow, _>(reader, source)?
        .into_iter()
        .map(|row| AssessmentRecord {
            user_id: row.user_handle,
            tag: row.assessment_tag,
            timestamp: row.user_assessment_date,
            score: row.user_assessment_score,
        })
        .collect())
}

pub fn read_interests<R: io::Read>(reader: R, source: &str) -> Result<Vec<InterestRecord>> {
    Ok(read_rows::<InterestRow, _>(reader, source)?
        .into_iter()
        .map(|row| InterestRecord {
            user_id: row.user_handle,
            tag: row.interest_tag,
            timestamp: row.date_followed,
        })
        .collect())
}

/// Course tag rows; untagged courses are dropped
pub fn read_course_tags<R: io::Read>(reader: R, source: &str) -> Result<Vec<CourseTagRecord>> {
    Ok(read_rows::<CourseTagRow, _>(reader, source)?
        .into_iter()
        .filter_map(|row| {
            let tag = row.course_tags.filter(|t| !t.is_empty())?;
            Some(CourseTagRecord {
                course_id: row.course_id,
                tag,
            })
        })
        .collect())
}

pub fn read_views<R: io::Read>(reader: R, source: &str) -> Result<Vec<ViewRecord>> {
    Ok(read_rows::<ViewRow, _>(reader, source)?
        .into_iter()
        .map(|row| ViewRecord {
            user_id: row.user_handle,
            timestamp: row.view_date,
            course_id: row.course_id,
            author_id: row.author_handle,
            level: row.level,
            duration_seconds: row.view_time_seconds,
        })
        .collect())
}

/// Load all four event tables from the configured CSV files
#[instrument(skip_all)]
pub fn load_event_tables(datasets: &DatasetConfig) -> Result<EventTables> {
    let path = &datasets.assessment_scores;
    let assessments = read_assessments(open(path)?, &path.display().to_string())?;

    let path = &datasets.interests;
    let interests = read_interests(open(path)?, &path.display().to_string())?;

    let path = &datasets.course_tags;
    let course_tags = read_course_tags(open(path)?, &path.display().to_string())?;

    let path = &datasets.course_views;
    let views = read_views(open(path)?, &path.display().to_string())?;

    info!(
        assessments = assessments.len(),
        interests = interests.len(),
        course_tags = course_tags.len(),
        views = views.len(),
        "Loaded event tables"
    );

    Ok(EventTables {
        assessments,
        interests,
        course_tags,
        views,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timestamp_formats() {
        let midnight = NaiveDate::from_ymd_opt(2017, 6, 27)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();

        assert_eq!(parse_timestamp("2017-06-27"), Some(midnight));
        assert_eq!(parse_timestamp("2017-06-27 00:00:00"), Some(midnight));
        assert_eq!(parse_timestamp("2017-06-27T00:00:00Z"), Some(midnight));
        assert_eq!(parse_timestamp(" 2017-06-27T00:00:00 "), Some(midnight));
        assert_eq!(parse_timestamp("27/06/2017"), None);
    }

    #[test]
    fn test_read_views() {
        let csv = "user_handle,view_date,course_id,author_handle,level,view_time_seconds\n\
                   1,2017-06-27,cpt-sp2010-web-designers-branding-intro,875,Beginner,3786\n\
                   1,2017-06-28,cpt-sp2010-web-designers-branding-intro,875,Beginner,1098\n";

        let views = read_views(csv.as_bytes(), "views").unwrap();
        assert_eq!(views.len(), 2);
        assert_eq!(views[0].author_id, 875);
        assert_eq!(views[1].duration_seconds, 1098);
        assert_eq!(views[0].level, "Beginner");
    }

    #[test]
    fn test_read_course_tags_skips_untagged() {
        let csv = "course_id,course_tags\nc1,python\nc2,\nc3, data \n";

        let tags = read_course_tags(csv.as_bytes(), "tags").unwrap();
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[1].tag, "data");
    }

    #[test]
    fn test_bad_row_reports_source_and_record() {
        let csv = "user_handle,interest_tag,date_followed\nabc,rust,2017-01-01\n";

        match read_interests(csv.as_bytes(), "interests.csv") {
            Err(SimilarityError::Ingestion(message)) => {
                assert!(message.starts_with("interests.csv record 1"));
            }
            other => panic!("expected ingestion error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_file() {
        let datasets = DatasetConfig::in_dir("/nonexistent/similarity");
        assert!(matches!(
            load_event_tables(&datasets),
            Err(SimilarityError::Ingestion(_))
        ));
    }
}
