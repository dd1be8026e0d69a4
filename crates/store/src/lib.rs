use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uniadmin_contracts::{
    AuditRecord, ClassChanges, ClassFilter, ClassRef, ClassView, EntityKind, FacultyChanges,
    FacultyFilter, FacultyRef, FacultyView, MajorChanges, MajorFilter, MajorRef, MajorView,
    NewClass, NewFaculty, NewMajor, NewUser, PageWindow, ProfileChanges, SortKey, User,
};

pub mod memory;
pub mod pg;

pub use memory::MemoryStore;
pub use pg::{PgStore, migrate, migrate_url};

#[derive(Debug)]
pub enum StoreError {
    Timeout,
    UniqueViolation { constraint: Option<String> },
    ForeignKeyViolation { constraint: Option<String> },
    Sqlx(sqlx::Error),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Timeout => write!(f, "store operation timed out"),
            StoreError::UniqueViolation { constraint } => write!(
                f,
                "unique constraint violated: {}",
                constraint.as_deref().unwrap_or("unknown")
            ),
            StoreError::ForeignKeyViolation { constraint } => write!(
                f,
                "foreign key constraint violated: {}",
                constraint.as_deref().unwrap_or("unknown")
            ),
            StoreError::Sqlx(err) => write!(f, "store sql error: {}", err),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<sqlx::Error> for StoreError {
    fn from(value: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &value {
            let constraint = db_err.constraint().map(str::to_string);
            if db_err.is_unique_violation() {
                return StoreError::UniqueViolation { constraint };
            }
            if db_err.is_foreign_key_violation() {
                return StoreError::ForeignKeyViolation { constraint };
            }
        }
        StoreError::Sqlx(value)
    }
}

/// Faculty → Major → Class records.
///
/// Inserts and updates receive already validated input; the store only enforces
/// code uniqueness and parent existence as a last line.
#[async_trait]
pub trait AcademicStore: Send + Sync {
    async fn ping(&self) -> Result<(), StoreError>;

    /// Whether another record of `kind` already holds `code`, ignoring `exclude_id`.
    async fn code_exists(
        &self,
        kind: EntityKind,
        code: &str,
        exclude_id: Option<i64>,
    ) -> Result<bool, StoreError>;

    /// `None` when no record exists, otherwise its `is_active` flag.
    async fn parent_active(&self, kind: EntityKind, id: i64) -> Result<Option<bool>, StoreError>;

    /// Counts `child` records referencing `parent_id`, active or not.
    async fn count_children(&self, child: EntityKind, parent_id: i64) -> Result<u64, StoreError>;

    async fn delete_record(&self, kind: EntityKind, id: i64) -> Result<bool, StoreError>;

    async fn insert_faculty(&self, new: &NewFaculty) -> Result<FacultyView, StoreError>;
    async fn update_faculty(
        &self,
        id: i64,
        changes: &FacultyChanges,
    ) -> Result<Option<FacultyView>, StoreError>;
    async fn get_faculty(&self, id: i64) -> Result<Option<FacultyView>, StoreError>;
    async fn list_faculties(
        &self,
        filter: &FacultyFilter,
        order: &[SortKey],
        window: PageWindow,
    ) -> Result<(u64, Vec<FacultyView>), StoreError>;
    async fn faculty_options(&self) -> Result<Vec<FacultyRef>, StoreError>;

    async fn insert_major(&self, new: &NewMajor) -> Result<MajorView, StoreError>;
    async fn update_major(
        &self,
        id: i64,
        changes: &MajorChanges,
    ) -> Result<Option<MajorView>, StoreError>;
    async fn get_major(&self, id: i64) -> Result<Option<MajorView>, StoreError>;
    async fn list_majors(
        &self,
        filter: &MajorFilter,
        order: &[SortKey],
        window: PageWindow,
    ) -> Result<(u64, Vec<MajorView>), StoreError>;
    async fn major_options(&self, faculty_id: Option<i64>) -> Result<Vec<MajorRef>, StoreError>;

    async fn insert_class(&self, new: &NewClass) -> Result<ClassView, StoreError>;
    async fn update_class(
        &self,
        id: i64,
        changes: &ClassChanges,
    ) -> Result<Option<ClassView>, StoreError>;
    async fn get_class(&self, id: i64) -> Result<Option<ClassView>, StoreError>;
    async fn list_classes(
        &self,
        filter: &ClassFilter,
        order: &[SortKey],
        window: PageWindow,
    ) -> Result<(u64, Vec<ClassView>), StoreError>;
    async fn class_options(
        &self,
        major_id: Option<i64>,
        academic_year: Option<i32>,
    ) -> Result<Vec<ClassRef>, StoreError>;

    /// Distinct class years, newest first.
    async fn academic_years(&self) -> Result<Vec<i32>, StoreError>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;
    async fn get_user(&self, id: i64) -> Result<Option<User>, StoreError>;
    async fn insert_user(&self, new: &NewUser) -> Result<User, StoreError>;
    async fn update_profile(
        &self,
        id: i64,
        changes: &ProfileChanges,
    ) -> Result<Option<User>, StoreError>;
    async fn set_password(&self, id: i64, password_hash: &str) -> Result<bool, StoreError>;
    async fn touch_last_login(&self, id: i64) -> Result<(), StoreError>;

    /// Idempotent: blacklisting a known jti again is not an error.
    async fn blacklist_token(
        &self,
        jti: &str,
        user_id: i64,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
    async fn is_token_blacklisted(&self, jti: &str) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Persists one record and returns its event id.
    async fn append_audit(&self, record: &AuditRecord) -> Result<String, StoreError>;
}

pub trait Store: AcademicStore + UserStore + AuditSink {}

impl<T> Store for T where T: AcademicStore + UserStore + AuditSink {}

/// Escapes `%`, `_` and `\` so user input matches literally inside `ILIKE`.
pub(crate) fn like_pattern(search: &str) -> String {
    let mut out = String::with_capacity(search.len() + 2);
    out.push('%');
    for ch in search.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('%');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("KT"), "%KT%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }

    #[test]
    fn store_error_display_names_constraint() {
        let err = StoreError::UniqueViolation {
            constraint: Some("faculties_code_key".to_string()),
        };
        assert_eq!(err.to_string(), "unique constraint violated: faculties_code_key");
    }
}
