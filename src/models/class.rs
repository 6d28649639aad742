//! Class roster and per-student performance records.
//!
//! A `Class` is the aggregate the backend serves and the unit the cache
//! stores. Performance records live only nested inside their class; they
//! are never cached on their own.

use serde::{Deserialize, Serialize};

/// A class as served by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Class {
    pub id: String,
    #[serde(rename = "schoolYear")]
    pub school_year: String,
    pub label: String,
    #[serde(rename = "schoolId")]
    pub school_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub students: Option<Vec<Student>>,
    #[serde(
        rename = "studentsPerformance",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub students_performance: Option<Vec<StudentPerformance>>,
}

impl Class {
    /// Find a performance record by its id.
    pub fn performance(&self, sp_id: &str) -> Option<&StudentPerformance> {
        self.students_performance
            .as_ref()?
            .iter()
            .find(|sp| sp.id == sp_id)
    }

    pub fn performance_mut(&mut self, sp_id: &str) -> Option<&mut StudentPerformance> {
        self.students_performance
            .as_mut()?
            .iter_mut()
            .find(|sp| sp.id == sp_id)
    }
}

/// A student embedded in a class roster or a performance record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub id: String,
    #[serde(rename = "firstName")]
    pub first_name: String,
    #[serde(rename = "lastName")]
    pub last_name: String,
}

impl Student {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Per-student performance inside one class.
///
/// The counters are either absent (the backend has never materialized them)
/// or numeric. Local mutations only touch counters that are already
/// present; an absent counter stays absent until the backend provides it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentPerformance {
    pub id: String,
    #[serde(rename = "studentId")]
    pub student_id: String,
    #[serde(rename = "classId")]
    pub class_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student: Option<Student>,
    #[serde(
        rename = "activityScores",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub activity_scores: Option<Vec<ActivityScore>>,
    #[serde(
        rename = "activityPoints",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub activity_points: Option<i64>,
    #[serde(
        rename = "missingHomeworks",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub missing_homeworks: Option<i64>,
    #[serde(
        rename = "loudnessWarnings",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub loudness_warnings: Option<i64>,
}

impl StudentPerformance {
    /// Append a score entry, materializing the list if needed.
    pub fn push_score(&mut self, score: ActivityScore) {
        self.activity_scores.get_or_insert_with(Vec::new).push(score);
    }

    /// Remove the score entry matching `score_id`. Returns whether an entry
    /// was removed.
    pub fn remove_score(&mut self, score_id: &str) -> bool {
        match self.activity_scores.as_mut() {
            Some(list) => {
                let before = list.len();
                list.retain(|s| s.id != score_id);
                list.len() != before
            }
            None => false,
        }
    }

    /// Add `delta` to the activity-point counter, only if it is defined.
    pub fn bump_activity_points(&mut self, delta: i64) {
        if let Some(points) = self.activity_points.as_mut() {
            *points += delta;
        }
    }

    /// Add `delta` to the missing-homework counter, only if it is defined.
    pub fn bump_missing_homeworks(&mut self, delta: i64) {
        if let Some(count) = self.missing_homeworks.as_mut() {
            *count += delta;
        }
    }

    /// Add `delta` to the loudness-warning counter, only if it is defined.
    pub fn bump_loudness_warnings(&mut self, delta: i64) {
        if let Some(count) = self.loudness_warnings.as_mut() {
            *count += delta;
        }
    }
}

/// A single activity score inside a performance record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityScore {
    pub id: String,
    pub score: i64,
}
