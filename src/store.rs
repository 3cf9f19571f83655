//! Immutable, sorted course dataset.
//!
//! The store is loaded once at startup from a JSON data file, sorted by
//! `(subject, code)` and never mutated afterwards. Callers only ever see
//! a shared slice; every query step builds its own working list.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::models::Course;

/// On-disk layout of the course data file.
#[derive(Debug, Deserialize)]
struct DataFile {
    #[serde(default, rename = "dataAsOf")]
    data_as_of: Option<String>,
    data: Vec<Course>,
}

#[derive(Debug)]
pub struct CourseStore {
    courses: Vec<Course>,
    data_as_of: String,
}

impl CourseStore {
    /// Reads and parses the data file at `path`.
    ///
    /// A missing, unreadable, or malformed file is an error: the service
    /// must never start serving with partial data.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read course data file: {}", path.display()))?;
        Self::from_json(&content)
            .with_context(|| format!("Failed to parse course data file: {}", path.display()))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let file: DataFile = serde_json::from_str(content)?;
        Ok(Self::new(file.data, file.data_as_of.unwrap_or_default()))
    }

    /// Builds a store from already-parsed records, establishing the
    /// `(subject, code)` order.
    pub fn new(mut courses: Vec<Course>, data_as_of: impl Into<String>) -> Self {
        courses.sort_by(|a, b| a.subject.cmp(&b.subject).then_with(|| a.code.cmp(&b.code)));
        Self {
            courses,
            data_as_of: data_as_of.into(),
        }
    }

    pub fn all(&self) -> &[Course] {
        &self.courses
    }

    pub fn len(&self) -> usize {
        self.courses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.courses.is_empty()
    }

    pub fn data_as_of(&self) -> &str {
        &self.data_as_of
    }
}
