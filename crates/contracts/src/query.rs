use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FacultyFilter {
    pub search: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MajorFilter {
    pub search: Option<String>,
    pub is_active: Option<bool>,
    pub faculty_id: Option<i64>,
    pub faculty_code: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassFilter {
    pub search: Option<String>,
    pub is_active: Option<bool>,
    pub major_id: Option<i64>,
    pub faculty_id: Option<i64>,
    pub academic_year: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Code,
    Name,
    CreatedAt,
    AcademicYear,
    FacultyName,
    MajorName,
}

impl SortField {
    /// Parses the public ordering name (`faculty__name`, `academic_year`, ...).
    pub fn parse(raw: &str) -> Option<SortField> {
        match raw {
            "code" => Some(SortField::Code),
            "name" => Some(SortField::Name),
            "created_at" => Some(SortField::CreatedAt),
            "academic_year" => Some(SortField::AcademicYear),
            "faculty__name" => Some(SortField::FacultyName),
            "major__name" => Some(SortField::MajorName),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub field: SortField,
    pub descending: bool,
}

impl SortKey {
    pub const fn asc(field: SortField) -> Self {
        Self {
            field,
            descending: false,
        }
    }

    pub const fn desc(field: SortField) -> Self {
        Self {
            field,
            descending: true,
        }
    }

    /// Parses a comma separated `ordering` parameter, keeping only `allowed` fields.
    pub fn parse_list(raw: &str, allowed: &[SortField]) -> Vec<SortKey> {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .filter_map(|term| {
                let (descending, name) = match term.strip_prefix('-') {
                    Some(rest) => (true, rest),
                    None => (false, term),
                };
                let field = SortField::parse(name)?;
                allowed.contains(&field).then_some(SortKey { field, descending })
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub limit: u32,
    pub offset: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub count: u64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_keeps_allowed_fields_and_direction() {
        let allowed = [SortField::Code, SortField::Name, SortField::CreatedAt];
        let keys = SortKey::parse_list("-code, name,academic_year,,bogus", &allowed);
        assert_eq!(
            keys,
            vec![SortKey::desc(SortField::Code), SortKey::asc(SortField::Name)]
        );
    }

    #[test]
    fn ordering_with_only_unknown_fields_is_empty() {
        assert!(SortKey::parse_list("-password", &[SortField::Name]).is_empty());
    }
}
