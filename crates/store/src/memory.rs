//! In-process store with the same constraints as the Postgres schema.
//!
//! Used for local development and the API integration tests.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use ulid::Ulid;
use uniadmin_contracts::{
    AuditRecord, ClassChanges, ClassFilter, ClassRef, ClassView, EntityKind, FacultyChanges,
    FacultyFilter, FacultyRef, FacultyView, MajorChanges, MajorFilter, MajorRef, MajorView,
    NewClass, NewFaculty, NewMajor, NewUser, PageWindow, ProfileChanges, SortField, SortKey, User,
};

use crate::{AcademicStore, AuditSink, StoreError, UserStore};

#[derive(Debug, Clone)]
struct FacultyRow {
    id: i64,
    code: String,
    name: String,
    description: Option<String>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct MajorRow {
    id: i64,
    faculty_id: i64,
    code: String,
    name: String,
    description: Option<String>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct ClassRow {
    id: i64,
    major_id: i64,
    code: String,
    name: String,
    description: Option<String>,
    academic_year: i32,
    max_students: i32,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct MemoryState {
    next_id: i64,
    faculties: BTreeMap<i64, FacultyRow>,
    majors: BTreeMap<i64, MajorRow>,
    classes: BTreeMap<i64, ClassRow>,
    users: BTreeMap<i64, User>,
    blacklist: HashMap<String, DateTime<Utc>>,
    audit: Vec<(String, AuditRecord)>,
}

impl MemoryState {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn code_taken(&self, kind: EntityKind, code: &str, exclude_id: Option<i64>) -> bool {
        let other = |id: i64| Some(id) != exclude_id;
        match kind {
            EntityKind::Faculty => self
                .faculties
                .values()
                .any(|r| r.code == code && other(r.id)),
            EntityKind::Major => self.majors.values().any(|r| r.code == code && other(r.id)),
            EntityKind::Class => self.classes.values().any(|r| r.code == code && other(r.id)),
        }
    }

    fn children(&self, child: EntityKind, parent_id: i64) -> u64 {
        let count = match child {
            EntityKind::Faculty => 0,
            EntityKind::Major => self
                .majors
                .values()
                .filter(|m| m.faculty_id == parent_id)
                .count(),
            EntityKind::Class => self
                .classes
                .values()
                .filter(|c| c.major_id == parent_id)
                .count(),
        };
        count as u64
    }

    fn faculty_ref(&self, id: i64) -> Option<FacultyRef> {
        self.faculties.get(&id).map(|f| FacultyRef {
            id: f.id,
            code: f.code.clone(),
            name: f.name.clone(),
        })
    }

    fn faculty_view(&self, row: &FacultyRow) -> FacultyView {
        FacultyView {
            id: row.id,
            code: row.code.clone(),
            name: row.name.clone(),
            description: row.description.clone(),
            is_active: row.is_active,
            majors_count: self.children(EntityKind::Major, row.id) as i64,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }

    fn major_view(&self, row: &MajorRow) -> Option<MajorView> {
        Some(MajorView {
            id: row.id,
            code: row.code.clone(),
            name: row.name.clone(),
            description: row.description.clone(),
            faculty: self.faculty_ref(row.faculty_id)?,
            is_active: row.is_active,
            classes_count: self.children(EntityKind::Class, row.id) as i64,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }

    fn class_view(&self, row: &ClassRow) -> Option<ClassView> {
        let major = self.majors.get(&row.major_id)?;
        let faculty = self.faculty_ref(major.faculty_id)?;
        Some(ClassView {
            id: row.id,
            code: row.code.clone(),
            name: row.name.clone(),
            description: row.description.clone(),
            major: MajorRef {
                id: major.id,
                code: major.code.clone(),
                name: major.name.clone(),
                faculty_code: faculty.code.clone(),
            },
            faculty,
            academic_year: row.academic_year,
            max_students: row.max_students,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn unique(constraint: &str) -> StoreError {
    StoreError::UniqueViolation {
        constraint: Some(constraint.to_string()),
    }
}

fn foreign_key(constraint: &str) -> StoreError {
    StoreError::ForeignKeyViolation {
        constraint: Some(constraint.to_string()),
    }
}

fn matches_search(search: Option<&String>, code: &str, name: &str) -> bool {
    let Some(search) = search else {
        return true;
    };
    let needle = search.to_lowercase();
    code.to_lowercase().contains(&needle) || name.to_lowercase().contains(&needle)
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum SortValue {
    Int(i64),
    /// Case-folded text first, raw text as the tie-break.
    Text(String, String),
    Time(DateTime<Utc>),
}

impl SortValue {
    fn text(raw: &str) -> Self {
        SortValue::Text(raw.to_lowercase(), raw.to_string())
    }
}

fn collation_key(raw: &str) -> (String, &str) {
    (raw.to_lowercase(), raw)
}

fn sort_by_keys<T>(
    items: &mut [T],
    order: &[SortKey],
    value: impl Fn(&T, SortField) -> Option<SortValue>,
    id: impl Fn(&T) -> i64,
) {
    items.sort_by(|a, b| {
        for key in order {
            let (Some(left), Some(right)) = (value(a, key.field), value(b, key.field)) else {
                continue;
            };
            let ord = if key.descending {
                right.cmp(&left)
            } else {
                left.cmp(&right)
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        id(a).cmp(&id(b))
    });
}

fn page<T>(items: Vec<T>, window: PageWindow) -> (u64, Vec<T>) {
    let count = items.len() as u64;
    let offset = usize::try_from(window.offset).unwrap_or(usize::MAX);
    let results = items
        .into_iter()
        .skip(offset)
        .take(window.limit as usize)
        .collect();
    (count, results)
}

/// Process-local store for tests and single-node demos. Text ordering is
/// case-insensitive but not locale-aware, so accented names may sort
/// differently than under a Postgres collation.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Audit records in append order.
    pub async fn audit_records(&self) -> Vec<AuditRecord> {
        let state = self.state.read().await;
        state.audit.iter().map(|(_, record)| record.clone()).collect()
    }

    /// Marks a user inactive without going through the API.
    pub async fn deactivate_user(&self, id: i64) -> bool {
        let mut state = self.state.write().await;
        match state.users.get_mut(&id) {
            Some(user) => {
                user.is_active = false;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl AcademicStore for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn code_exists(
        &self,
        kind: EntityKind,
        code: &str,
        exclude_id: Option<i64>,
    ) -> Result<bool, StoreError> {
        Ok(self.state.read().await.code_taken(kind, code, exclude_id))
    }

    async fn parent_active(&self, kind: EntityKind, id: i64) -> Result<Option<bool>, StoreError> {
        let state = self.state.read().await;
        Ok(match kind {
            EntityKind::Faculty => state.faculties.get(&id).map(|r| r.is_active),
            EntityKind::Major => state.majors.get(&id).map(|r| r.is_active),
            EntityKind::Class => state.classes.get(&id).map(|r| r.is_active),
        })
    }

    async fn count_children(&self, child: EntityKind, parent_id: i64) -> Result<u64, StoreError> {
        Ok(self.state.read().await.children(child, parent_id))
    }

    async fn delete_record(&self, kind: EntityKind, id: i64) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        match kind {
            EntityKind::Faculty => {
                if state.children(EntityKind::Major, id) > 0 {
                    return Err(foreign_key("majors_faculty_id_fkey"));
                }
                Ok(state.faculties.remove(&id).is_some())
            }
            EntityKind::Major => {
                if state.children(EntityKind::Class, id) > 0 {
                    return Err(foreign_key("classes_major_id_fkey"));
                }
                Ok(state.majors.remove(&id).is_some())
            }
            EntityKind::Class => Ok(state.classes.remove(&id).is_some()),
        }
    }

    async fn insert_faculty(&self, new: &NewFaculty) -> Result<FacultyView, StoreError> {
        let mut state = self.state.write().await;
        if state.code_taken(EntityKind::Faculty, &new.code, None) {
            return Err(unique("faculties_code_key"));
        }

        let now = Utc::now();
        let row = FacultyRow {
            id: state.allocate_id(),
            code: new.code.clone(),
            name: new.name.clone(),
            description: new.description.clone(),
            is_active: new.is_active,
            created_at: now,
            updated_at: now,
        };
        let view = state.faculty_view(&row);
        state.faculties.insert(row.id, row);
        Ok(view)
    }

    async fn update_faculty(
        &self,
        id: i64,
        changes: &FacultyChanges,
    ) -> Result<Option<FacultyView>, StoreError> {
        let mut state = self.state.write().await;
        if let Some(code) = &changes.code
            && state.code_taken(EntityKind::Faculty, code, Some(id))
        {
            return Err(unique("faculties_code_key"));
        }

        let Some(row) = state.faculties.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(code) = &changes.code {
            row.code = code.clone();
        }
        if let Some(name) = &changes.name {
            row.name = name.clone();
        }
        if let Some(description) = &changes.description {
            row.description = description.clone();
        }
        if let Some(active) = changes.is_active {
            row.is_active = active;
        }
        row.updated_at = Utc::now();

        let row = row.clone();
        Ok(Some(state.faculty_view(&row)))
    }

    async fn get_faculty(&self, id: i64) -> Result<Option<FacultyView>, StoreError> {
        let state = self.state.read().await;
        Ok(state.faculties.get(&id).map(|row| state.faculty_view(row)))
    }

    async fn list_faculties(
        &self,
        filter: &FacultyFilter,
        order: &[SortKey],
        window: PageWindow,
    ) -> Result<(u64, Vec<FacultyView>), StoreError> {
        let state = self.state.read().await;
        let mut items = state
            .faculties
            .values()
            .filter(|r| matches_search(filter.search.as_ref(), &r.code, &r.name))
            .filter(|r| filter.is_active.is_none_or(|active| r.is_active == active))
            .map(|r| state.faculty_view(r))
            .collect::<Vec<_>>();

        sort_by_keys(
            &mut items,
            order,
            |v, field| match field {
                SortField::Code => Some(SortValue::text(&v.code)),
                SortField::Name => Some(SortValue::text(&v.name)),
                SortField::CreatedAt => Some(SortValue::Time(v.created_at)),
                _ => None,
            },
            |v| v.id,
        );
        Ok(page(items, window))
    }

    async fn faculty_options(&self) -> Result<Vec<FacultyRef>, StoreError> {
        let state = self.state.read().await;
        let mut items = state
            .faculties
            .values()
            .filter(|r| r.is_active)
            .map(|r| FacultyRef {
                id: r.id,
                code: r.code.clone(),
                name: r.name.clone(),
            })
            .collect::<Vec<_>>();
        items.sort_by(|a, b| {
            collation_key(&a.name)
                .cmp(&collation_key(&b.name))
                .then(a.id.cmp(&b.id))
        });
        Ok(items)
    }

    async fn insert_major(&self, new: &NewMajor) -> Result<MajorView, StoreError> {
        let mut state = self.state.write().await;
        if state.code_taken(EntityKind::Major, &new.code, None) {
            return Err(unique("majors_code_key"));
        }
        if !state.faculties.contains_key(&new.faculty_id) {
            return Err(foreign_key("majors_faculty_id_fkey"));
        }

        let now = Utc::now();
        let row = MajorRow {
            id: state.allocate_id(),
            faculty_id: new.faculty_id,
            code: new.code.clone(),
            name: new.name.clone(),
            description: new.description.clone(),
            is_active: new.is_active,
            created_at: now,
            updated_at: now,
        };
        let view = state
            .major_view(&row)
            .ok_or_else(|| foreign_key("majors_faculty_id_fkey"))?;
        state.majors.insert(row.id, row);
        Ok(view)
    }

    async fn update_major(
        &self,
        id: i64,
        changes: &MajorChanges,
    ) -> Result<Option<MajorView>, StoreError> {
        let mut state = self.state.write().await;
        if let Some(code) = &changes.code
            && state.code_taken(EntityKind::Major, code, Some(id))
        {
            return Err(unique("majors_code_key"));
        }
        if let Some(faculty_id) = changes.faculty_id
            && !state.faculties.contains_key(&faculty_id)
        {
            return Err(foreign_key("majors_faculty_id_fkey"));
        }

        let Some(row) = state.majors.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(faculty_id) = changes.faculty_id {
            row.faculty_id = faculty_id;
        }
        if let Some(code) = &changes.code {
            row.code = code.clone();
        }
        if let Some(name) = &changes.name {
            row.name = name.clone();
        }
        if let Some(description) = &changes.description {
            row.description = description.clone();
        }
        if let Some(active) = changes.is_active {
            row.is_active = active;
        }
        row.updated_at = Utc::now();

        let row = row.clone();
        Ok(state.major_view(&row))
    }

    async fn get_major(&self, id: i64) -> Result<Option<MajorView>, StoreError> {
        let state = self.state.read().await;
        Ok(state.majors.get(&id).and_then(|row| state.major_view(row)))
    }

    async fn list_majors(
        &self,
        filter: &MajorFilter,
        order: &[SortKey],
        window: PageWindow,
    ) -> Result<(u64, Vec<MajorView>), StoreError> {
        let state = self.state.read().await;
        let mut items = state
            .majors
            .values()
            .filter(|r| matches_search(filter.search.as_ref(), &r.code, &r.name))
            .filter(|r| filter.is_active.is_none_or(|active| r.is_active == active))
            .filter(|r| filter.faculty_id.is_none_or(|id| r.faculty_id == id))
            .filter_map(|r| state.major_view(r))
            .filter(|v| {
                filter
                    .faculty_code
                    .as_ref()
                    .is_none_or(|code| &v.faculty.code == code)
            })
            .collect::<Vec<_>>();

        sort_by_keys(
            &mut items,
            order,
            |v, field| match field {
                SortField::Code => Some(SortValue::text(&v.code)),
                SortField::Name => Some(SortValue::text(&v.name)),
                SortField::CreatedAt => Some(SortValue::Time(v.created_at)),
                SortField::FacultyName => Some(SortValue::text(&v.faculty.name)),
                _ => None,
            },
            |v| v.id,
        );
        Ok(page(items, window))
    }

    async fn major_options(&self, faculty_id: Option<i64>) -> Result<Vec<MajorRef>, StoreError> {
        let state = self.state.read().await;
        let mut items = state
            .majors
            .values()
            .filter(|r| r.is_active)
            .filter(|r| faculty_id.is_none_or(|id| r.faculty_id == id))
            .filter_map(|r| {
                let faculty = state.faculties.get(&r.faculty_id)?;
                Some((
                    faculty.name.clone(),
                    MajorRef {
                        id: r.id,
                        code: r.code.clone(),
                        name: r.name.clone(),
                        faculty_code: faculty.code.clone(),
                    },
                ))
            })
            .collect::<Vec<_>>();
        items.sort_by(|(fa, a), (fb, b)| {
            collation_key(fa)
                .cmp(&collation_key(fb))
                .then_with(|| collation_key(&a.name).cmp(&collation_key(&b.name)))
                .then(a.id.cmp(&b.id))
        });
        Ok(items.into_iter().map(|(_, r)| r).collect())
    }

    async fn insert_class(&self, new: &NewClass) -> Result<ClassView, StoreError> {
        let mut state = self.state.write().await;
        if state.code_taken(EntityKind::Class, &new.code, None) {
            return Err(unique("classes_code_key"));
        }
        if !state.majors.contains_key(&new.major_id) {
            return Err(foreign_key("classes_major_id_fkey"));
        }

        let now = Utc::now();
        let row = ClassRow {
            id: state.allocate_id(),
            major_id: new.major_id,
            code: new.code.clone(),
            name: new.name.clone(),
            description: new.description.clone(),
            academic_year: new.academic_year,
            max_students: new.max_students,
            is_active: new.is_active,
            created_at: now,
            updated_at: now,
        };
        let view = state
            .class_view(&row)
            .ok_or_else(|| foreign_key("classes_major_id_fkey"))?;
        state.classes.insert(row.id, row);
        Ok(view)
    }

    async fn update_class(
        &self,
        id: i64,
        changes: &ClassChanges,
    ) -> Result<Option<ClassView>, StoreError> {
        let mut state = self.state.write().await;
        if let Some(code) = &changes.code
            && state.code_taken(EntityKind::Class, code, Some(id))
        {
            return Err(unique("classes_code_key"));
        }
        if let Some(major_id) = changes.major_id
            && !state.majors.contains_key(&major_id)
        {
            return Err(foreign_key("classes_major_id_fkey"));
        }

        let Some(row) = state.classes.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(major_id) = changes.major_id {
            row.major_id = major_id;
        }
        if let Some(code) = &changes.code {
            row.code = code.clone();
        }
        if let Some(name) = &changes.name {
            row.name = name.clone();
        }
        if let Some(description) = &changes.description {
            row.description = description.clone();
        }
        if let Some(year) = changes.academic_year {
            row.academic_year = year;
        }
        if let Some(max_students) = changes.max_students {
            row.max_students = max_students;
        }
        if let Some(active) = changes.is_active {
            row.is_active = active;
        }
        row.updated_at = Utc::now();

        let row = row.clone();
        Ok(state.class_view(&row))
    }

    async fn get_class(&self, id: i64) -> Result<Option<ClassView>, StoreError> {
        let state = self.state.read().await;
        Ok(state.classes.get(&id).and_then(|row| state.class_view(row)))
    }

    async fn list_classes(
        &self,
        filter: &ClassFilter,
        order: &[SortKey],
        window: PageWindow,
    ) -> Result<(u64, Vec<ClassView>), StoreError> {
        let state = self.state.read().await;
        let mut items = state
            .classes
            .values()
            .filter(|r| matches_search(filter.search.as_ref(), &r.code, &r.name))
            .filter(|r| filter.is_active.is_none_or(|active| r.is_active == active))
            .filter(|r| filter.major_id.is_none_or(|id| r.major_id == id))
            .filter(|r| filter.academic_year.is_none_or(|y| r.academic_year == y))
            .filter_map(|r| state.class_view(r))
            .filter(|v| filter.faculty_id.is_none_or(|id| v.faculty.id == id))
            .collect::<Vec<_>>();

        sort_by_keys(
            &mut items,
            order,
            |v, field| match field {
                SortField::Code => Some(SortValue::text(&v.code)),
                SortField::Name => Some(SortValue::text(&v.name)),
                SortField::CreatedAt => Some(SortValue::Time(v.created_at)),
                SortField::AcademicYear => Some(SortValue::Int(i64::from(v.academic_year))),
                SortField::MajorName => Some(SortValue::text(&v.major.name)),
                SortField::FacultyName => Some(SortValue::text(&v.faculty.name)),
            },
            |v| v.id,
        );
        Ok(page(items, window))
    }

    async fn class_options(
        &self,
        major_id: Option<i64>,
        academic_year: Option<i32>,
    ) -> Result<Vec<ClassRef>, StoreError> {
        let state = self.state.read().await;
        let mut items = state
            .classes
            .values()
            .filter(|r| r.is_active)
            .filter(|r| major_id.is_none_or(|id| r.major_id == id))
            .filter(|r| academic_year.is_none_or(|y| r.academic_year == y))
            .filter_map(|r| {
                let major = state.majors.get(&r.major_id)?;
                Some((
                    major.name.clone(),
                    ClassRef {
                        id: r.id,
                        code: r.code.clone(),
                        name: r.name.clone(),
                        academic_year: r.academic_year,
                        major_code: major.code.clone(),
                    },
                ))
            })
            .collect::<Vec<_>>();
        items.sort_by(|(ma, a), (mb, b)| {
            b.academic_year
                .cmp(&a.academic_year)
                .then_with(|| collation_key(ma).cmp(&collation_key(mb)))
                .then_with(|| collation_key(&a.name).cmp(&collation_key(&b.name)))
                .then(a.id.cmp(&b.id))
        });
        Ok(items.into_iter().map(|(_, r)| r).collect())
    }

    async fn academic_years(&self) -> Result<Vec<i32>, StoreError> {
        let state = self.state.read().await;
        let mut years = state
            .classes
            .values()
            .map(|r| r.academic_year)
            .collect::<Vec<_>>();
        years.sort_unstable_by(|a, b| b.cmp(a));
        years.dedup();
        Ok(years)
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn get_user(&self, id: i64) -> Result<Option<User>, StoreError> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn insert_user(&self, new: &NewUser) -> Result<User, StoreError> {
        let mut state = self.state.write().await;
        if state.users.values().any(|u| u.username == new.username) {
            return Err(unique("users_username_key"));
        }

        let user = User {
            id: state.allocate_id(),
            username: new.username.clone(),
            email: new.email.clone(),
            password_hash: new.password_hash.clone(),
            first_name: new.first_name.clone(),
            last_name: new.last_name.clone(),
            role: new.role,
            phone_number: None,
            avatar: None,
            is_active: true,
            date_joined: Utc::now(),
            last_login: None,
        };
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update_profile(
        &self,
        id: i64,
        changes: &ProfileChanges,
    ) -> Result<Option<User>, StoreError> {
        let mut state = self.state.write().await;
        let Some(user) = state.users.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(first_name) = &changes.first_name {
            user.first_name = first_name.clone();
        }
        if let Some(last_name) = &changes.last_name {
            user.last_name = last_name.clone();
        }
        if let Some(phone_number) = &changes.phone_number {
            user.phone_number = phone_number.clone();
        }
        if let Some(avatar) = &changes.avatar {
            user.avatar = avatar.clone();
        }
        Ok(Some(user.clone()))
    }

    async fn set_password(&self, id: i64, password_hash: &str) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        Ok(match state.users.get_mut(&id) {
            Some(user) => {
                user.password_hash = password_hash.to_string();
                true
            }
            None => false,
        })
    }

    async fn touch_last_login(&self, id: i64) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if let Some(user) = state.users.get_mut(&id) {
            user.last_login = Some(Utc::now());
        }
        Ok(())
    }

    async fn blacklist_token(
        &self,
        jti: &str,
        user_id: i64,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if !state.users.contains_key(&user_id) {
            return Err(foreign_key("token_blacklist_user_id_fkey"));
        }
        state
            .blacklist
            .entry(jti.to_string())
            .or_insert(expires_at);
        Ok(())
    }

    async fn is_token_blacklisted(&self, jti: &str) -> Result<bool, StoreError> {
        Ok(self.state.read().await.blacklist.contains_key(jti))
    }
}

#[async_trait]
impl AuditSink for MemoryStore {
    async fn append_audit(&self, record: &AuditRecord) -> Result<String, StoreError> {
        let event_id = Ulid::new().to_string();
        self.state
            .write()
            .await
            .audit
            .push((event_id.clone(), record.clone()));
        Ok(event_id)
    }
}
