use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod academics;
pub mod canonical;
pub mod error;
pub mod messages;
pub mod query;
pub mod users;

pub use academics::{
    ClassChanges, ClassRef, ClassView, FacultyChanges, FacultyRef, FacultyView, MajorChanges,
    MajorRef, MajorView, NewClass, NewFaculty, NewMajor,
};
pub use error::{ErrorBody, ErrorEnvelope, ErrorKind, FieldErrors};
pub use messages::Locale;
pub use query::{
    ClassFilter, FacultyFilter, MajorFilter, Page, PageWindow, SortField, SortKey,
};
pub use users::{NewUser, ProfileChanges, User, UserView};

/// One level of the Faculty → Major → Class hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Faculty,
    Major,
    Class,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Faculty => "faculty",
            EntityKind::Major => "major",
            EntityKind::Class => "class",
        }
    }

    pub fn model_name(self) -> &'static str {
        match self {
            EntityKind::Faculty => "Faculty",
            EntityKind::Major => "Major",
            EntityKind::Class => "Class",
        }
    }

    /// The kind a record of this kind references, if any.
    pub fn parent(self) -> Option<EntityKind> {
        match self {
            EntityKind::Faculty => None,
            EntityKind::Major => Some(EntityKind::Faculty),
            EntityKind::Class => Some(EntityKind::Major),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Teacher,
    Student,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Teacher => "TEACHER",
            Role::Student => "STUDENT",
        }
    }

    pub fn parse(raw: &str) -> Option<Role> {
        match raw.trim() {
            "ADMIN" => Some(Role::Admin),
            "TEACHER" => Some(Role::Teacher),
            "STUDENT" => Some(Role::Student),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::Create => "CREATE",
            AuditAction::Update => "UPDATE",
            AuditAction::Delete => "DELETE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub user: String,
    pub action: AuditAction,
    pub model: String,
    pub object_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changes: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

impl AuditRecord {
    /// Payload persisted next to the record; its canonical hash fingerprints the event.
    pub fn payload_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|_| serde_json::json!({}))
    }
}
