//! Core data models used throughout Course Harness.
//!
//! These types represent the course records loaded at startup and the
//! shaped objects that flow out of the query engine into the format
//! negotiator.

use serde::{Deserialize, Serialize};

/// One catalog entry. Identity is `subject ++ code`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub units: String,
    #[serde(default)]
    pub description: String,
}

impl Course {
    /// The course key used by the token index (`"COP2210"`).
    pub fn key(&self) -> String {
        format!("{}{}", self.subject, self.code)
    }

    pub fn get(&self, property: CourseProperty) -> &str {
        match property {
            CourseProperty::Subject => &self.subject,
            CourseProperty::Code => &self.code,
            CourseProperty::Name => &self.name,
            CourseProperty::Units => &self.units,
            CourseProperty::Description => &self.description,
        }
    }
}

/// The recognized course property names, in serialization order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CourseProperty {
    Subject,
    Code,
    Name,
    Units,
    Description,
}

impl CourseProperty {
    pub const ALL: [CourseProperty; 5] = [
        CourseProperty::Subject,
        CourseProperty::Code,
        CourseProperty::Name,
        CourseProperty::Units,
        CourseProperty::Description,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CourseProperty::Subject => "subject",
            CourseProperty::Code => "code",
            CourseProperty::Name => "name",
            CourseProperty::Units => "units",
            CourseProperty::Description => "description",
        }
    }

    /// Looks up a property by its lowercase name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }
}

/// A course with zero or more properties omitted.
///
/// Produced by the final shaping step of the query engine. Omitted
/// properties are skipped entirely during serialization, so a course with
/// every property excluded serializes as an empty object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PartialCourse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl PartialCourse {
    /// Copies every property of `course` except those in `excluded`.
    pub fn from_course(course: &Course, excluded: &[CourseProperty]) -> Self {
        let keep = |p: CourseProperty| {
            if excluded.contains(&p) {
                None
            } else {
                Some(course.get(p).to_string())
            }
        };
        Self {
            subject: keep(CourseProperty::Subject),
            code: keep(CourseProperty::Code),
            name: keep(CourseProperty::Name),
            units: keep(CourseProperty::Units),
            description: keep(CourseProperty::Description),
        }
    }

    pub fn get(&self, property: CourseProperty) -> Option<&str> {
        match property {
            CourseProperty::Subject => self.subject.as_deref(),
            CourseProperty::Code => self.code.as_deref(),
            CourseProperty::Name => self.name.as_deref(),
            CourseProperty::Units => self.units.as_deref(),
            CourseProperty::Description => self.description.as_deref(),
        }
    }

    /// Present properties in serialization order.
    pub fn fields(&self) -> impl Iterator<Item = (CourseProperty, &str)> {
        CourseProperty::ALL
            .into_iter()
            .filter_map(move |p| self.get(p).map(|v| (p, v)))
    }

    pub fn is_empty(&self) -> bool {
        self.fields().next().is_none()
    }
}

/// The `{ total, results }` envelope produced by the query engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultShape {
    /// Number of selected records, independent of excluded properties.
    pub total: usize,
    pub results: Vec<PartialCourse>,
}

/// Response body for the status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub version: String,
    /// Milliseconds since the process started.
    pub uptime: u64,
    pub data_as_of: String,
    pub requests_served: u64,
}

/// Response body for every failed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub error: String,
}
