use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{Postgres, QueryBuilder, Row};
use ulid::Ulid;
use uniadmin_contracts::canonical;
use uniadmin_contracts::{
    AuditRecord, ClassChanges, ClassFilter, ClassRef, ClassView, EntityKind, FacultyChanges,
    FacultyFilter, FacultyRef, FacultyView, MajorChanges, MajorFilter, MajorRef, MajorView,
    NewClass, NewFaculty, NewMajor, NewUser, PageWindow, ProfileChanges, Role, SortField, SortKey,
    User,
};

use crate::{AcademicStore, AuditSink, StoreError, UserStore, like_pattern};

const MIGRATE_TIMEOUT: Duration = Duration::from_secs(10);

const FACULTY_SELECT: &str = "SELECT f.id, f.code, f.name, f.description, f.is_active, f.created_at, f.updated_at, (SELECT COUNT(*) FROM majors m WHERE m.faculty_id = f.id) AS majors_count FROM faculties f";

const MAJOR_SELECT: &str = "SELECT m.id, m.code, m.name, m.description, m.is_active, m.created_at, m.updated_at, f.id AS faculty_id, f.code AS faculty_code, f.name AS faculty_name, (SELECT COUNT(*) FROM classes c WHERE c.major_id = m.id) AS classes_count FROM majors m JOIN faculties f ON f.id = m.faculty_id";

const CLASS_SELECT: &str = "SELECT c.id, c.code, c.name, c.description, c.academic_year, c.max_students, c.is_active, c.created_at, c.updated_at, m.id AS major_id, m.code AS major_code, m.name AS major_name, f.id AS faculty_id, f.code AS faculty_code, f.name AS faculty_name FROM classes c JOIN majors m ON m.id = c.major_id JOIN faculties f ON f.id = m.faculty_id";

const USER_COLUMNS: &str = "id, username, email, password_hash, first_name, last_name, role, phone_number, avatar, is_active, date_joined, last_login";

#[derive(Clone)]
pub struct PgStore {
    pool: sqlx::PgPool,
    timeout: Duration,
}

impl PgStore {
    pub async fn connect(
        db_url: &str,
        max_connections: u32,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        let pool = tokio::time::timeout(
            timeout.max(Duration::from_secs(2)),
            PgPoolOptions::new()
                .max_connections(max_connections)
                .acquire_timeout(timeout)
                .connect(db_url),
        )
        .await
        .map_err(|_| StoreError::Timeout)??;

        Ok(Self { pool, timeout })
    }

    pub async fn connect_and_migrate(
        db_url: &str,
        max_connections: u32,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        let store = Self::connect(db_url, max_connections, timeout).await?;
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        tracing::info!("applying store migrations");
        let started = std::time::Instant::now();
        tokio::time::timeout(MIGRATE_TIMEOUT, migrate(&self.pool))
            .await
            .map_err(|_| {
                tracing::error!(
                    timeout_ms = MIGRATE_TIMEOUT.as_millis() as u64,
                    "store migrations timed out"
                );
                StoreError::Timeout
            })??;
        tracing::info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "store migrations applied"
        );
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn timed<T, F>(&self, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, sqlx::Error>>,
    {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| StoreError::Timeout)?
            .map_err(StoreError::from)
    }
}

pub async fn migrate(pool: &sqlx::PgPool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn migrate_url(db_url: &str) -> Result<(), sqlx::Error> {
    let pool = sqlx::PgPool::connect(db_url).await?;
    migrate(&pool).await?;
    pool.close().await;
    Ok(())
}

fn table(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Faculty => "faculties",
        EntityKind::Major => "majors",
        EntityKind::Class => "classes",
    }
}

fn faculty_column(field: SortField) -> Option<&'static str> {
    match field {
        SortField::Code => Some("f.code"),
        SortField::Name => Some("f.name"),
        SortField::CreatedAt => Some("f.created_at"),
        _ => None,
    }
}

fn major_column(field: SortField) -> Option<&'static str> {
    match field {
        SortField::Code => Some("m.code"),
        SortField::Name => Some("m.name"),
        SortField::CreatedAt => Some("m.created_at"),
        SortField::FacultyName => Some("f.name"),
        _ => None,
    }
}

fn class_column(field: SortField) -> Option<&'static str> {
    match field {
        SortField::Code => Some("c.code"),
        SortField::Name => Some("c.name"),
        SortField::CreatedAt => Some("c.created_at"),
        SortField::AcademicYear => Some("c.academic_year"),
        SortField::MajorName => Some("m.name"),
        SortField::FacultyName => Some("f.name"),
    }
}

fn push_order(
    qb: &mut QueryBuilder<'_, Postgres>,
    order: &[SortKey],
    column: fn(SortField) -> Option<&'static str>,
    tiebreak: &str,
) {
    qb.push(" ORDER BY ");
    for key in order {
        let Some(col) = column(key.field) else {
            continue;
        };
        qb.push(col);
        qb.push(if key.descending { " DESC, " } else { " ASC, " });
    }
    qb.push(tiebreak);
    qb.push(" ASC");
}

fn push_window(qb: &mut QueryBuilder<'_, Postgres>, window: PageWindow) {
    let offset = i64::try_from(window.offset).unwrap_or(i64::MAX);
    qb.push(" LIMIT ")
        .push_bind(i64::from(window.limit))
        .push(" OFFSET ")
        .push_bind(offset);
}

fn push_search(qb: &mut QueryBuilder<'_, Postgres>, alias: &str, search: Option<&String>) {
    let Some(search) = search else {
        return;
    };
    let pattern = like_pattern(search);
    qb.push(format!(" AND ({alias}.code ILIKE "))
        .push_bind(pattern.clone())
        .push(format!(" OR {alias}.name ILIKE "))
        .push_bind(pattern)
        .push(")");
}

fn push_faculty_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &FacultyFilter) {
    qb.push(" WHERE TRUE");
    push_search(qb, "f", filter.search.as_ref());
    if let Some(active) = filter.is_active {
        qb.push(" AND f.is_active = ").push_bind(active);
    }
}

fn push_major_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &MajorFilter) {
    qb.push(" WHERE TRUE");
    push_search(qb, "m", filter.search.as_ref());
    if let Some(active) = filter.is_active {
        qb.push(" AND m.is_active = ").push_bind(active);
    }
    if let Some(faculty_id) = filter.faculty_id {
        qb.push(" AND m.faculty_id = ").push_bind(faculty_id);
    }
    if let Some(code) = &filter.faculty_code {
        qb.push(" AND f.code = ").push_bind(code.clone());
    }
}

fn push_class_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &ClassFilter) {
    qb.push(" WHERE TRUE");
    push_search(qb, "c", filter.search.as_ref());
    if let Some(active) = filter.is_active {
        qb.push(" AND c.is_active = ").push_bind(active);
    }
    if let Some(major_id) = filter.major_id {
        qb.push(" AND c.major_id = ").push_bind(major_id);
    }
    if let Some(faculty_id) = filter.faculty_id {
        qb.push(" AND m.faculty_id = ").push_bind(faculty_id);
    }
    if let Some(year) = filter.academic_year {
        qb.push(" AND c.academic_year = ").push_bind(year);
    }
}

fn faculty_from_row(row: &PgRow) -> Result<FacultyView, sqlx::Error> {
    Ok(FacultyView {
        id: row.try_get("id")?,
        code: row.try_get("code")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        is_active: row.try_get("is_active")?,
        majors_count: row.try_get("majors_count")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn major_from_row(row: &PgRow) -> Result<MajorView, sqlx::Error> {
    Ok(MajorView {
        id: row.try_get("id")?,
        code: row.try_get("code")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        faculty: FacultyRef {
            id: row.try_get("faculty_id")?,
            code: row.try_get("faculty_code")?,
            name: row.try_get("faculty_name")?,
        },
        is_active: row.try_get("is_active")?,
        classes_count: row.try_get("classes_count")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn class_from_row(row: &PgRow) -> Result<ClassView, sqlx::Error> {
    let faculty_code: String = row.try_get("faculty_code")?;
    Ok(ClassView {
        id: row.try_get("id")?,
        code: row.try_get("code")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        major: MajorRef {
            id: row.try_get("major_id")?,
            code: row.try_get("major_code")?,
            name: row.try_get("major_name")?,
            faculty_code: faculty_code.clone(),
        },
        faculty: FacultyRef {
            id: row.try_get("faculty_id")?,
            code: faculty_code,
            name: row.try_get("faculty_name")?,
        },
        academic_year: row.try_get("academic_year")?,
        max_students: row.try_get("max_students")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn user_from_row(row: &PgRow) -> Result<User, sqlx::Error> {
    let raw_role: String = row.try_get("role")?;
    let role = Role::parse(&raw_role)
        .ok_or_else(|| sqlx::Error::Decode(format!("unknown role '{raw_role}'").into()))?;

    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        role,
        phone_number: row.try_get("phone_number")?,
        avatar: row.try_get("avatar")?,
        is_active: row.try_get("is_active")?,
        date_joined: row.try_get("date_joined")?,
        last_login: row.try_get("last_login")?,
    })
}

fn map_rows<T>(
    rows: &[PgRow],
    map: fn(&PgRow) -> Result<T, sqlx::Error>,
) -> Result<Vec<T>, StoreError> {
    rows.iter()
        .map(map)
        .collect::<Result<Vec<_>, _>>()
        .map_err(StoreError::from)
}

#[async_trait]
impl AcademicStore for PgStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.timed(sqlx::query("SELECT 1").execute(&self.pool)).await?;
        Ok(())
    }

    async fn code_exists(
        &self,
        kind: EntityKind,
        code: &str,
        exclude_id: Option<i64>,
    ) -> Result<bool, StoreError> {
        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE code = $1 AND ($2::BIGINT IS NULL OR id <> $2))",
            table(kind)
        );
        self.timed(
            sqlx::query_scalar::<_, bool>(&sql)
                .bind(code)
                .bind(exclude_id)
                .fetch_one(&self.pool),
        )
        .await
    }

    async fn parent_active(&self, kind: EntityKind, id: i64) -> Result<Option<bool>, StoreError> {
        let sql = format!("SELECT is_active FROM {} WHERE id = $1", table(kind));
        self.timed(
            sqlx::query_scalar::<_, bool>(&sql)
                .bind(id)
                .fetch_optional(&self.pool),
        )
        .await
    }

    async fn count_children(&self, child: EntityKind, parent_id: i64) -> Result<u64, StoreError> {
        let sql = match child {
            EntityKind::Faculty => return Ok(0),
            EntityKind::Major => "SELECT COUNT(*) FROM majors WHERE faculty_id = $1",
            EntityKind::Class => "SELECT COUNT(*) FROM classes WHERE major_id = $1",
        };
        let count = self
            .timed(
                sqlx::query_scalar::<_, i64>(sql)
                    .bind(parent_id)
                    .fetch_one(&self.pool),
            )
            .await?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn delete_record(&self, kind: EntityKind, id: i64) -> Result<bool, StoreError> {
        let sql = format!("DELETE FROM {} WHERE id = $1", table(kind));
        let result = self
            .timed(sqlx::query(&sql).bind(id).execute(&self.pool))
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_faculty(&self, new: &NewFaculty) -> Result<FacultyView, StoreError> {
        let row = self
            .timed(
                sqlx::query(
                    "WITH f AS (INSERT INTO faculties (code, name, description, is_active) VALUES ($1, $2, $3, $4) RETURNING *) SELECT f.id, f.code, f.name, f.description, f.is_active, f.created_at, f.updated_at, 0::BIGINT AS majors_count FROM f",
                )
                .bind(&new.code)
                .bind(&new.name)
                .bind(&new.description)
                .bind(new.is_active)
                .fetch_one(&self.pool),
            )
            .await?;
        faculty_from_row(&row).map_err(StoreError::from)
    }

    async fn update_faculty(
        &self,
        id: i64,
        changes: &FacultyChanges,
    ) -> Result<Option<FacultyView>, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE faculties SET updated_at = now()");
        if let Some(code) = &changes.code {
            qb.push(", code = ").push_bind(code.clone());
        }
        if let Some(name) = &changes.name {
            qb.push(", name = ").push_bind(name.clone());
        }
        if let Some(description) = &changes.description {
            qb.push(", description = ").push_bind(description.clone());
        }
        if let Some(active) = changes.is_active {
            qb.push(", is_active = ").push_bind(active);
        }
        qb.push(" WHERE id = ").push_bind(id).push(" RETURNING id");

        let updated = self
            .timed(qb.build_query_scalar::<i64>().fetch_optional(&self.pool))
            .await?;
        match updated {
            Some(id) => self.get_faculty(id).await,
            None => Ok(None),
        }
    }

    async fn get_faculty(&self, id: i64) -> Result<Option<FacultyView>, StoreError> {
        let sql = format!("{FACULTY_SELECT} WHERE f.id = $1");
        let row = self
            .timed(sqlx::query(&sql).bind(id).fetch_optional(&self.pool))
            .await?;
        row.as_ref()
            .map(faculty_from_row)
            .transpose()
            .map_err(StoreError::from)
    }

    async fn list_faculties(
        &self,
        filter: &FacultyFilter,
        order: &[SortKey],
        window: PageWindow,
    ) -> Result<(u64, Vec<FacultyView>), StoreError> {
        let mut count_qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM faculties f");
        push_faculty_filters(&mut count_qb, filter);
        let count = self
            .timed(count_qb.build_query_scalar::<i64>().fetch_one(&self.pool))
            .await?;

        let mut qb = QueryBuilder::<Postgres>::new(FACULTY_SELECT);
        push_faculty_filters(&mut qb, filter);
        push_order(&mut qb, order, faculty_column, "f.id");
        push_window(&mut qb, window);
        let rows = self.timed(qb.build().fetch_all(&self.pool)).await?;

        Ok((
            u64::try_from(count).unwrap_or(0),
            map_rows(&rows, faculty_from_row)?,
        ))
    }

    async fn faculty_options(&self) -> Result<Vec<FacultyRef>, StoreError> {
        let rows = self
            .timed(
                sqlx::query(
                    "SELECT id, code, name FROM faculties WHERE is_active ORDER BY name ASC, id ASC",
                )
                .fetch_all(&self.pool),
            )
            .await?;
        map_rows(&rows, |row| {
            Ok(FacultyRef {
                id: row.try_get("id")?,
                code: row.try_get("code")?,
                name: row.try_get("name")?,
            })
        })
    }

    async fn insert_major(&self, new: &NewMajor) -> Result<MajorView, StoreError> {
        let id = self
            .timed(
                sqlx::query_scalar::<_, i64>(
                    "INSERT INTO majors (faculty_id, code, name, description, is_active) VALUES ($1, $2, $3, $4, $5) RETURNING id",
                )
                .bind(new.faculty_id)
                .bind(&new.code)
                .bind(&new.name)
                .bind(&new.description)
                .bind(new.is_active)
                .fetch_one(&self.pool),
            )
            .await?;
        self.get_major(id)
            .await?
            .ok_or(StoreError::Sqlx(sqlx::Error::RowNotFound))
    }

    async fn update_major(
        &self,
        id: i64,
        changes: &MajorChanges,
    ) -> Result<Option<MajorView>, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE majors SET updated_at = now()");
        if let Some(faculty_id) = changes.faculty_id {
            qb.push(", faculty_id = ").push_bind(faculty_id);
        }
        if let Some(code) = &changes.code {
            qb.push(", code = ").push_bind(code.clone());
        }
        if let Some(name) = &changes.name {
            qb.push(", name = ").push_bind(name.clone());
        }
        if let Some(description) = &changes.description {
            qb.push(", description = ").push_bind(description.clone());
        }
        if let Some(active) = changes.is_active {
            qb.push(", is_active = ").push_bind(active);
        }
        qb.push(" WHERE id = ").push_bind(id).push(" RETURNING id");

        let updated = self
            .timed(qb.build_query_scalar::<i64>().fetch_optional(&self.pool))
            .await?;
        match updated {
            Some(id) => self.get_major(id).await,
            None => Ok(None),
        }
    }

    async fn get_major(&self, id: i64) -> Result<Option<MajorView>, StoreError> {
        let sql = format!("{MAJOR_SELECT} WHERE m.id = $1");
        let row = self
            .timed(sqlx::query(&sql).bind(id).fetch_optional(&self.pool))
            .await?;
        row.as_ref()
            .map(major_from_row)
            .transpose()
            .map_err(StoreError::from)
    }

    async fn list_majors(
        &self,
        filter: &MajorFilter,
        order: &[SortKey],
        window: PageWindow,
    ) -> Result<(u64, Vec<MajorView>), StoreError> {
        let mut count_qb = QueryBuilder::<Postgres>::new(
            "SELECT COUNT(*) FROM majors m JOIN faculties f ON f.id = m.faculty_id",
        );
        push_major_filters(&mut count_qb, filter);
        let count = self
            .timed(count_qb.build_query_scalar::<i64>().fetch_one(&self.pool))
            .await?;

        let mut qb = QueryBuilder::<Postgres>::new(MAJOR_SELECT);
        push_major_filters(&mut qb, filter);
        push_order(&mut qb, order, major_column, "m.id");
        push_window(&mut qb, window);
        let rows = self.timed(qb.build().fetch_all(&self.pool)).await?;

        Ok((
            u64::try_from(count).unwrap_or(0),
            map_rows(&rows, major_from_row)?,
        ))
    }

    async fn major_options(&self, faculty_id: Option<i64>) -> Result<Vec<MajorRef>, StoreError> {
        let rows = self
            .timed(
                sqlx::query(
                    "SELECT m.id, m.code, m.name, f.code AS faculty_code FROM majors m JOIN faculties f ON f.id = m.faculty_id WHERE m.is_active AND ($1::BIGINT IS NULL OR m.faculty_id = $1) ORDER BY f.name ASC, m.name ASC, m.id ASC",
                )
                .bind(faculty_id)
                .fetch_all(&self.pool),
            )
            .await?;
        map_rows(&rows, |row| {
            Ok(MajorRef {
                id: row.try_get("id")?,
                code: row.try_get("code")?,
                name: row.try_get("name")?,
                faculty_code: row.try_get("faculty_code")?,
            })
        })
    }

    async fn insert_class(&self, new: &NewClass) -> Result<ClassView, StoreError> {
        let id = self
            .timed(
                sqlx::query_scalar::<_, i64>(
                    "INSERT INTO classes (major_id, code, name, description, academic_year, max_students, is_active) VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING id",
                )
                .bind(new.major_id)
                .bind(&new.code)
                .bind(&new.name)
                .bind(&new.description)
                .bind(new.academic_year)
                .bind(new.max_students)
                .bind(new.is_active)
                .fetch_one(&self.pool),
            )
            .await?;
        self.get_class(id)
            .await?
            .ok_or(StoreError::Sqlx(sqlx::Error::RowNotFound))
    }

    async fn update_class(
        &self,
        id: i64,
        changes: &ClassChanges,
    ) -> Result<Option<ClassView>, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE classes SET updated_at = now()");
        if let Some(major_id) = changes.major_id {
            qb.push(", major_id = ").push_bind(major_id);
        }
        if let Some(code) = &changes.code {
            qb.push(", code = ").push_bind(code.clone());
        }
        if let Some(name) = &changes.name {
            qb.push(", name = ").push_bind(name.clone());
        }
        if let Some(description) = &changes.description {
            qb.push(", description = ").push_bind(description.clone());
        }
        if let Some(year) = changes.academic_year {
            qb.push(", academic_year = ").push_bind(year);
        }
        if let Some(max_students) = changes.max_students {
            qb.push(", max_students = ").push_bind(max_students);
        }
        if let Some(active) = changes.is_active {
            qb.push(", is_active = ").push_bind(active);
        }
        qb.push(" WHERE id = ").push_bind(id).push(" RETURNING id");

        let updated = self
            .timed(qb.build_query_scalar::<i64>().fetch_optional(&self.pool))
            .await?;
        match updated {
            Some(id) => self.get_class(id).await,
            None => Ok(None),
        }
    }

    async fn get_class(&self, id: i64) -> Result<Option<ClassView>, StoreError> {
        let sql = format!("{CLASS_SELECT} WHERE c.id = $1");
        let row = self
            .timed(sqlx::query(&sql).bind(id).fetch_optional(&self.pool))
            .await?;
        row.as_ref()
            .map(class_from_row)
            .transpose()
            .map_err(StoreError::from)
    }

    async fn list_classes(
        &self,
        filter: &ClassFilter,
        order: &[SortKey],
        window: PageWindow,
    ) -> Result<(u64, Vec<ClassView>), StoreError> {
        let mut count_qb = QueryBuilder::<Postgres>::new(
            "SELECT COUNT(*) FROM classes c JOIN majors m ON m.id = c.major_id JOIN faculties f ON f.id = m.faculty_id",
        );
        push_class_filters(&mut count_qb, filter);
        let count = self
            .timed(count_qb.build_query_scalar::<i64>().fetch_one(&self.pool))
            .await?;

        let mut qb = QueryBuilder::<Postgres>::new(CLASS_SELECT);
        push_class_filters(&mut qb, filter);
        push_order(&mut qb, order, class_column, "c.id");
        push_window(&mut qb, window);
        let rows = self.timed(qb.build().fetch_all(&self.pool)).await?;

        Ok((
            u64::try_from(count).unwrap_or(0),
            map_rows(&rows, class_from_row)?,
        ))
    }

    async fn class_options(
        &self,
        major_id: Option<i64>,
        academic_year: Option<i32>,
    ) -> Result<Vec<ClassRef>, StoreError> {
        let rows = self
            .timed(
                sqlx::query(
                    "SELECT c.id, c.code, c.name, c.academic_year, m.code AS major_code FROM classes c JOIN majors m ON m.id = c.major_id WHERE c.is_active AND ($1::BIGINT IS NULL OR c.major_id = $1) AND ($2::INTEGER IS NULL OR c.academic_year = $2) ORDER BY c.academic_year DESC, m.name ASC, c.name ASC, c.id ASC",
                )
                .bind(major_id)
                .bind(academic_year)
                .fetch_all(&self.pool),
            )
            .await?;
        map_rows(&rows, |row| {
            Ok(ClassRef {
                id: row.try_get("id")?,
                code: row.try_get("code")?,
                name: row.try_get("name")?,
                academic_year: row.try_get("academic_year")?,
                major_code: row.try_get("major_code")?,
            })
        })
    }

    async fn academic_years(&self) -> Result<Vec<i32>, StoreError> {
        self.timed(
            sqlx::query_scalar::<_, i32>(
                "SELECT DISTINCT academic_year FROM classes ORDER BY academic_year DESC",
            )
            .fetch_all(&self.pool),
        )
        .await
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1");
        let row = self
            .timed(sqlx::query(&sql).bind(username).fetch_optional(&self.pool))
            .await?;
        row.as_ref()
            .map(user_from_row)
            .transpose()
            .map_err(StoreError::from)
    }

    async fn get_user(&self, id: i64) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let row = self
            .timed(sqlx::query(&sql).bind(id).fetch_optional(&self.pool))
            .await?;
        row.as_ref()
            .map(user_from_row)
            .transpose()
            .map_err(StoreError::from)
    }

    async fn insert_user(&self, new: &NewUser) -> Result<User, StoreError> {
        let sql = format!(
            "INSERT INTO users (username, email, password_hash, first_name, last_name, role) VALUES ($1, $2, $3, $4, $5, $6) RETURNING {USER_COLUMNS}"
        );
        let row = self
            .timed(
                sqlx::query(&sql)
                    .bind(&new.username)
                    .bind(&new.email)
                    .bind(&new.password_hash)
                    .bind(&new.first_name)
                    .bind(&new.last_name)
                    .bind(new.role.as_str())
                    .fetch_one(&self.pool),
            )
            .await?;
        user_from_row(&row).map_err(StoreError::from)
    }

    async fn update_profile(
        &self,
        id: i64,
        changes: &ProfileChanges,
    ) -> Result<Option<User>, StoreError> {
        if changes.is_empty() {
            return self.get_user(id).await;
        }

        let mut qb = QueryBuilder::<Postgres>::new("UPDATE users SET ");
        {
            let mut sets = qb.separated(", ");
            if let Some(first_name) = &changes.first_name {
                sets.push("first_name = ")
                    .push_bind_unseparated(first_name.clone());
            }
            if let Some(last_name) = &changes.last_name {
                sets.push("last_name = ")
                    .push_bind_unseparated(last_name.clone());
            }
            if let Some(phone_number) = &changes.phone_number {
                sets.push("phone_number = ")
                    .push_bind_unseparated(phone_number.clone());
            }
            if let Some(avatar) = &changes.avatar {
                sets.push("avatar = ").push_bind_unseparated(avatar.clone());
            }
        }
        qb.push(" WHERE id = ").push_bind(id);
        qb.push(format!(" RETURNING {USER_COLUMNS}"));

        let row = self.timed(qb.build().fetch_optional(&self.pool)).await?;
        row.as_ref()
            .map(user_from_row)
            .transpose()
            .map_err(StoreError::from)
    }

    async fn set_password(&self, id: i64, password_hash: &str) -> Result<bool, StoreError> {
        let result = self
            .timed(
                sqlx::query("UPDATE users SET password_hash = $1 WHERE id = $2")
                    .bind(password_hash)
                    .bind(id)
                    .execute(&self.pool),
            )
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn touch_last_login(&self, id: i64) -> Result<(), StoreError> {
        self.timed(
            sqlx::query("UPDATE users SET last_login = now() WHERE id = $1")
                .bind(id)
                .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    async fn blacklist_token(
        &self,
        jti: &str,
        user_id: i64,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.timed(
            sqlx::query(
                "INSERT INTO token_blacklist (jti, user_id, expires_at) VALUES ($1, $2, $3) ON CONFLICT (jti) DO NOTHING",
            )
            .bind(jti)
            .bind(user_id)
            .bind(expires_at)
            .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    async fn is_token_blacklisted(&self, jti: &str) -> Result<bool, StoreError> {
        self.timed(
            sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS(SELECT 1 FROM token_blacklist WHERE jti = $1)",
            )
            .bind(jti)
            .fetch_one(&self.pool),
        )
        .await
    }
}

#[async_trait]
impl AuditSink for PgStore {
    async fn append_audit(&self, record: &AuditRecord) -> Result<String, StoreError> {
        let event_id = Ulid::new().to_string();
        let payload_json = record.payload_json();
        let payload_hash = canonical::hash_canonical_json(&payload_json);

        self.timed(
            sqlx::query(
                "INSERT INTO audit_events (event_id, occurred_at, actor, action, model, object_id, payload_json, payload_hash) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(&event_id)
            .bind(record.timestamp)
            .bind(&record.user)
            .bind(record.action.as_str())
            .bind(&record.model)
            .bind(record.object_id)
            .bind(&payload_json)
            .bind(&payload_hash)
            .execute(&self.pool),
        )
        .await?;

        Ok(event_id)
    }
}
