use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacultyRef {
    pub id: i64,
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MajorRef {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub faculty_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassRef {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub academic_year: i32,
    pub major_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacultyView {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub majors_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MajorView {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub faculty: FacultyRef,
    pub is_active: bool,
    pub classes_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A class never stores its faculty; `faculty` is resolved through `major`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassView {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub major: MajorRef,
    pub faculty: FacultyRef,
    pub academic_year: i32,
    pub max_students: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FacultyView {
    pub fn display_name(&self) -> String {
        format!("{} - {}", self.code, self.name)
    }
}

impl MajorView {
    pub fn display_name(&self) -> String {
        format!("{} - {}", self.code, self.name)
    }
}

impl ClassView {
    pub fn display_name(&self) -> String {
        format!("{} - {}", self.code, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFaculty {
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMajor {
    pub faculty_id: i64,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewClass {
    pub major_id: i64,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub academic_year: i32,
    pub max_students: i32,
    pub is_active: bool,
}

/// Partial update. `None` leaves a field untouched; `description: Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FacultyChanges {
    pub code: Option<String>,
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MajorChanges {
    pub faculty_id: Option<i64>,
    pub code: Option<String>,
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassChanges {
    pub major_id: Option<i64>,
    pub code: Option<String>,
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub academic_year: Option<i32>,
    pub max_students: Option<i32>,
    pub is_active: Option<bool>,
}
