//! Field validation and normalization for hierarchy writes.
//!
//! Rules run in a fixed order (code, name, parent reference, numeric fields) and
//! every failure is collected before the request is rejected. Nothing is written
//! until all rules pass.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use serde_json::{Map, Value};
use uniadmin_contracts::{
    ClassChanges, EntityKind, FacultyChanges, FieldErrors, Locale, MajorChanges, NewClass,
    NewFaculty, NewMajor,
};
use uniadmin_store::{AcademicStore, Store};

use super::error::ApiError;

pub const CODE_MIN_LEN: usize = 2;
pub const CODE_MAX_LEN: usize = 20;
pub const NAME_MIN_LEN: usize = 3;
pub const NAME_MAX_LEN: usize = 200;
pub const ACADEMIC_YEAR_MIN: i64 = 2000;
pub const ACADEMIC_YEAR_MAX: i64 = 2100;
pub const MAX_STUDENTS_MIN: i64 = 1;
pub const MAX_STUDENTS_MAX: i64 = 500;
pub const DEFAULT_MAX_STUDENTS: i32 = 50;

/// How a write treats absent fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Create,
    /// PUT: required fields must be present, others stay as they are.
    Replace,
    /// PATCH: only supplied fields are validated.
    Patch,
}

/// Unwraps a JSON body that must be an object.
pub fn object_body(
    body: Result<Json<Value>, JsonRejection>,
    locale: Locale,
) -> Result<Map<String, Value>, ApiError> {
    let Json(value) = body.map_err(|rejection| {
        ApiError::field(
            "non_field_errors",
            locale.malformed_body(&rejection.body_text()),
        )
    })?;

    match value {
        Value::Object(map) => Ok(map),
        _ => Err(ApiError::field(
            "non_field_errors",
            locale.malformed_body("expected a JSON object"),
        )),
    }
}

/// Reads fields out of a request body, collecting errors as it goes.
pub struct Fields<'a> {
    body: &'a Map<String, Value>,
    mode: Mode,
    locale: Locale,
    errors: FieldErrors,
    duplicate: Option<(EntityKind, String)>,
}

impl<'a> Fields<'a> {
    pub fn new(body: &'a Map<String, Value>, mode: Mode, locale: Locale) -> Self {
        Self {
            body,
            mode,
            locale,
            errors: FieldErrors::new(),
            duplicate: None,
        }
    }

    pub fn locale(&self) -> Locale {
        self.locale
    }

    pub fn push(&mut self, key: &str, message: impl Into<String>) {
        self.errors.push(key, message);
    }

    pub fn has_error(&self, key: &str) -> bool {
        self.errors.contains(key)
    }

    fn present(&mut self, key: &str, required: bool) -> Option<&'a Value> {
        match self.body.get(key) {
            None => {
                if required && self.mode != Mode::Patch {
                    self.errors.push(key, self.locale.field_required());
                }
                None
            }
            Some(Value::Null) => {
                self.errors.push(key, self.locale.field_null());
                None
            }
            Some(value) => Some(value),
        }
    }

    /// Trimmed, non-blank string.
    pub fn text(&mut self, key: &str, required: bool) -> Option<String> {
        let value = self.present(key, required)?;
        match string_value(value) {
            None => {
                self.errors.push(key, self.locale.invalid_string());
                None
            }
            Some(s) if s.is_empty() => {
                self.errors.push(key, self.locale.field_blank());
                None
            }
            Some(s) => Some(s),
        }
    }

    /// Nullable text. Blank and null both clear the field.
    pub fn optional_text(&mut self, key: &str) -> Option<Option<String>> {
        match self.body.get(key)? {
            Value::Null => Some(None),
            value => match string_value(value) {
                None => {
                    self.errors.push(key, self.locale.invalid_string());
                    None
                }
                Some(s) if s.is_empty() => Some(None),
                Some(s) => Some(Some(s)),
            },
        }
    }

    pub fn integer(&mut self, key: &str, required: bool) -> Option<i64> {
        let value = self.present(key, required)?;
        let parsed = match value {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
            Value::String(s) => parse_int(s),
            _ => None,
        };
        if parsed.is_none() {
            self.errors.push(key, self.locale.invalid_integer());
        }
        parsed
    }

    pub fn flag(&mut self, key: &str) -> Option<bool> {
        let value = self.present(key, false)?;
        let parsed = match value {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => match n.as_i64() {
                Some(1) => Some(true),
                Some(0) => Some(false),
                _ => None,
            },
            Value::String(s) => parse_flag(s),
            _ => None,
        };
        if parsed.is_none() {
            self.errors.push(key, self.locale.invalid_boolean());
        }
        parsed
    }

    pub fn bounded_len(&mut self, key: &str, value: String, min: usize, max: usize) -> Option<String> {
        let len = value.chars().count();
        if len < min {
            self.errors.push(key, self.locale.min_length(min));
            None
        } else if len > max {
            self.errors.push(key, self.locale.max_length(max));
            None
        } else {
            Some(value)
        }
    }

    pub fn bounded_int(&mut self, key: &str, value: i64, min: i64, max: i64) -> Option<i64> {
        if value < min {
            self.errors.push(key, self.locale.min_value(min));
            None
        } else if value > max {
            self.errors.push(key, self.locale.max_value(max));
            None
        } else {
            Some(value)
        }
    }

    /// Fails with every collected error. A duplicate code escalates the whole
    /// rejection to a conflict.
    pub fn finish(self) -> Result<(), ApiError> {
        if self.errors.is_empty() {
            return Ok(());
        }
        match self.duplicate {
            Some((entity, code)) => Err(ApiError::DuplicateCode {
                entity,
                code,
                details: self.errors,
            }),
            None => Err(ApiError::Validation(self.errors)),
        }
    }

    async fn code(
        &mut self,
        store: &dyn Store,
        kind: EntityKind,
        target: Option<i64>,
    ) -> Result<Option<String>, ApiError> {
        let Some(raw) = self.text("code", true) else {
            return Ok(None);
        };
        let Some(code) = self.bounded_len("code", normalize_code(&raw), CODE_MIN_LEN, CODE_MAX_LEN)
        else {
            return Ok(None);
        };

        if store.code_exists(kind, &code, target).await? {
            self.errors.push("code", self.locale.duplicate_code(kind, &code));
            self.duplicate = Some((kind, code));
            return Ok(None);
        }
        Ok(Some(code))
    }

    fn name(&mut self) -> Option<String> {
        let raw = self.text("name", true)?;
        self.bounded_len("name", raw, NAME_MIN_LEN, NAME_MAX_LEN)
    }

    /// Checks a parent reference. An unchanged reference is accepted as is.
    async fn parent(
        &mut self,
        store: &dyn Store,
        kind: EntityKind,
        key: &str,
        current: Option<i64>,
    ) -> Result<Option<i64>, ApiError> {
        let Some(id) = self.integer(key, true) else {
            return Ok(None);
        };
        if current == Some(id) {
            return Ok(Some(id));
        }

        match store.parent_active(kind, id).await? {
            None => {
                self.errors.push(key, self.locale.parent_not_found(kind, id));
                Ok(None)
            }
            Some(false) => {
                self.errors.push(key, self.locale.parent_inactive(kind));
                Ok(None)
            }
            Some(true) => Ok(Some(id)),
        }
    }
}

fn string_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn normalize_code(raw: &str) -> String {
    raw.trim().to_uppercase()
}

pub fn parse_int(raw: &str) -> Option<i64> {
    raw.trim().parse::<i64>().ok()
}

pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim() {
        "true" | "True" | "TRUE" | "1" | "yes" | "on" => Some(true),
        "false" | "False" | "FALSE" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub async fn faculty(
    store: &dyn Store,
    body: &Map<String, Value>,
    mode: Mode,
    locale: Locale,
    target: Option<i64>,
) -> Result<FacultyChanges, ApiError> {
    let mut fields = Fields::new(body, mode, locale);

    let code = fields.code(store, EntityKind::Faculty, target).await?;
    let name = fields.name();
    let description = fields.optional_text("description");
    let is_active = fields.flag("is_active");

    fields.finish()?;
    Ok(FacultyChanges {
        code,
        name,
        description,
        is_active,
    })
}

/// `current_faculty` is the stored reference when updating.
pub async fn major(
    store: &dyn Store,
    body: &Map<String, Value>,
    mode: Mode,
    locale: Locale,
    target: Option<i64>,
    current_faculty: Option<i64>,
) -> Result<MajorChanges, ApiError> {
    let mut fields = Fields::new(body, mode, locale);

    let code = fields.code(store, EntityKind::Major, target).await?;
    let name = fields.name();
    let faculty_id = fields
        .parent(store, EntityKind::Faculty, "faculty_id", current_faculty)
        .await?;
    let description = fields.optional_text("description");
    let is_active = fields.flag("is_active");

    fields.finish()?;
    Ok(MajorChanges {
        faculty_id,
        code,
        name,
        description,
        is_active,
    })
}

pub async fn class(
    store: &dyn Store,
    body: &Map<String, Value>,
    mode: Mode,
    locale: Locale,
    target: Option<i64>,
    current_major: Option<i64>,
) -> Result<ClassChanges, ApiError> {
    let mut fields = Fields::new(body, mode, locale);

    let code = fields.code(store, EntityKind::Class, target).await?;
    let name = fields.name();
    let major_id = fields
        .parent(store, EntityKind::Major, "major_id", current_major)
        .await?;
    let academic_year = fields
        .integer("academic_year", true)
        .and_then(|year| {
            fields.bounded_int("academic_year", year, ACADEMIC_YEAR_MIN, ACADEMIC_YEAR_MAX)
        })
        .map(|year| year as i32);
    let max_students = fields
        .integer("max_students", false)
        .and_then(|n| fields.bounded_int("max_students", n, MAX_STUDENTS_MIN, MAX_STUDENTS_MAX))
        .map(|n| n as i32);
    let description = fields.optional_text("description");
    let is_active = fields.flag("is_active");

    fields.finish()?;
    Ok(ClassChanges {
        major_id,
        code,
        name,
        description,
        academic_year,
        max_students,
        is_active,
    })
}

fn incomplete(kind: EntityKind) -> ApiError {
    ApiError::Internal(format!(
        "validated {} input is missing required fields",
        kind.as_str()
    ))
}

pub fn new_faculty(changes: FacultyChanges) -> Result<NewFaculty, ApiError> {
    let (Some(code), Some(name)) = (changes.code, changes.name) else {
        return Err(incomplete(EntityKind::Faculty));
    };
    Ok(NewFaculty {
        code,
        name,
        description: changes.description.flatten(),
        is_active: changes.is_active.unwrap_or(true),
    })
}

pub fn new_major(changes: MajorChanges) -> Result<NewMajor, ApiError> {
    let (Some(faculty_id), Some(code), Some(name)) =
        (changes.faculty_id, changes.code, changes.name)
    else {
        return Err(incomplete(EntityKind::Major));
    };
    Ok(NewMajor {
        faculty_id,
        code,
        name,
        description: changes.description.flatten(),
        is_active: changes.is_active.unwrap_or(true),
    })
}

pub fn new_class(changes: ClassChanges) -> Result<NewClass, ApiError> {
    let (Some(major_id), Some(code), Some(name), Some(academic_year)) = (
        changes.major_id,
        changes.code,
        changes.name,
        changes.academic_year,
    ) else {
        return Err(incomplete(EntityKind::Class));
    };
    Ok(NewClass {
        major_id,
        code,
        name,
        description: changes.description.flatten(),
        academic_year,
        max_students: changes.max_students.unwrap_or(DEFAULT_MAX_STUDENTS),
        is_active: changes.is_active.unwrap_or(true),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uniadmin_store::MemoryStore;

    fn body(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("test body must be an object"),
        }
    }

    async fn seeded() -> (MemoryStore, i64, i64) {
        let store = MemoryStore::new();
        let active = store
            .insert_faculty(&NewFaculty {
                code: "CNTT".to_string(),
                name: "Information Technology".to_string(),
                description: None,
                is_active: true,
            })
            .await
            .unwrap();
        let inactive = store
            .insert_faculty(&NewFaculty {
                code: "OLD".to_string(),
                name: "Closed Faculty".to_string(),
                description: None,
                is_active: false,
            })
            .await
            .unwrap();
        (store, active.id, inactive.id)
    }

    #[tokio::test]
    async fn code_is_trimmed_and_uppercased() {
        let store = MemoryStore::new();
        let changes = faculty(
            &store,
            &body(json!({"code": "  ktpm ", "name": "  Software  "})),
            Mode::Create,
            Locale::En,
            None,
        )
        .await
        .unwrap();
        assert_eq!(changes.code.as_deref(), Some("KTPM"));
        assert_eq!(changes.name.as_deref(), Some("Software"));
    }

    #[tokio::test]
    async fn lowercase_duplicate_code_is_a_conflict() {
        let (store, _, _) = seeded().await;
        let err = faculty(
            &store,
            &body(json!({"code": "cntt", "name": "x"})),
            Mode::Create,
            Locale::En,
            None,
        )
        .await
        .unwrap_err();

        let ApiError::DuplicateCode { code, details, .. } = err else {
            panic!("expected duplicate code");
        };
        assert_eq!(code, "CNTT");
        assert!(details.contains("code"));
        assert!(details.contains("name"), "other field errors are kept");
    }

    #[tokio::test]
    async fn updating_a_record_keeps_its_own_code() {
        let (store, faculty_id, _) = seeded().await;
        let changes = faculty(
            &store,
            &body(json!({"code": "CNTT"})),
            Mode::Patch,
            Locale::En,
            Some(faculty_id),
        )
        .await
        .unwrap();
        assert_eq!(changes.code.as_deref(), Some("CNTT"));
        assert!(changes.name.is_none());
    }

    #[tokio::test]
    async fn missing_and_inactive_parents_have_distinct_messages() {
        let (store, _, inactive_id) = seeded().await;

        let err = major(
            &store,
            &body(json!({"code": "KTPM", "name": "Software", "faculty_id": inactive_id})),
            Mode::Create,
            Locale::En,
            None,
            None,
        )
        .await
        .unwrap_err();
        let ApiError::Validation(details) = err else {
            panic!("expected validation error");
        };
        assert!(details.get("faculty_id").unwrap()[0].contains("no longer active"));

        let err = major(
            &store,
            &body(json!({"code": "KTPM", "name": "Software", "faculty_id": 999})),
            Mode::Create,
            Locale::En,
            None,
            None,
        )
        .await
        .unwrap_err();
        let ApiError::Validation(details) = err else {
            panic!("expected validation error");
        };
        assert!(details.get("faculty_id").unwrap()[0].contains("999"));
    }

    #[tokio::test]
    async fn unchanged_parent_is_not_rechecked() {
        let (store, _, inactive_id) = seeded().await;
        let changes = major(
            &store,
            &body(json!({"faculty_id": inactive_id, "name": "Renamed"})),
            Mode::Patch,
            Locale::En,
            Some(1),
            Some(inactive_id),
        )
        .await
        .unwrap();
        assert_eq!(changes.faculty_id, Some(inactive_id));
    }

    #[tokio::test]
    async fn required_fields_are_reported_together() {
        let store = MemoryStore::new();
        let err = class(
            &store,
            &body(json!({})),
            Mode::Create,
            Locale::En,
            None,
            None,
        )
        .await
        .unwrap_err();
        let ApiError::Validation(details) = err else {
            panic!("expected validation error");
        };
        for key in ["code", "name", "major_id", "academic_year"] {
            assert!(details.contains(key), "{key} should be required");
        }
        assert!(!details.contains("max_students"));
    }

    #[test]
    fn integer_fields_accept_numeric_strings() {
        let map = body(json!({"academic_year": "2021", "max_students": true}));
        let mut fields = Fields::new(&map, Mode::Patch, Locale::En);
        assert_eq!(fields.integer("academic_year", true), Some(2021));
        assert_eq!(fields.integer("max_students", false), None);
        assert!(fields.has_error("max_students"));
    }

    #[test]
    fn blank_and_null_text_are_rejected() {
        let map = body(json!({"name": "   ", "code": null, "description": ""}));
        let mut fields = Fields::new(&map, Mode::Patch, Locale::En);
        assert_eq!(fields.text("name", true), None);
        assert_eq!(fields.text("code", true), None);
        assert_eq!(fields.optional_text("description"), Some(None));
        assert!(fields.has_error("name"));
        assert!(fields.has_error("code"));
        assert!(!fields.has_error("description"));
    }
}
