use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::Response;
use tracing::field::Empty;
use uniadmin_contracts::{
    AuditAction, EntityKind, FacultyFilter, FacultyRef, FacultyView, Page, SortField, SortKey,
};
use uniadmin_policy::AccessTier;
use uniadmin_store::AcademicStore;

use super::error::ApiError;
use super::validate::{self, Mode};
use super::{AppState, IdPath, JsonBody, ListParams, RawQuery, audit, path_id, traced};

const ORDERING: &[SortField] = &[SortField::Code, SortField::Name, SortField::CreatedAt];
const DEFAULT_ORDER: &[SortKey] = &[SortKey::asc(SortField::Name)];

pub(super) async fn list(
    State(state): State<AppState>,
    headers: HeaderMap,
    uri: Uri,
    query: RawQuery,
) -> Response {
    let result = list_inner(&state, &headers, &uri, query).await;
    state.respond(StatusCode::OK, result)
}

async fn list_inner(
    state: &AppState,
    headers: &HeaderMap,
    uri: &Uri,
    query: RawQuery,
) -> Result<Page<FacultyView>, ApiError> {
    state.require(headers, AccessTier::AdminOnly).await?;

    let mut params = ListParams::new(query, state.locale())?;
    let filter = FacultyFilter {
        search: params.search(),
        is_active: params.flag("is_active"),
    };
    let order = params.ordering(ORDERING, DEFAULT_ORDER);
    let page = params.page(&state.config);
    params.finish()?;

    let (count, results) = state
        .store()
        .list_faculties(&filter, &order, page.window)
        .await?;
    page.into_page(uri, count, results)
}

pub(super) async fn retrieve(
    State(state): State<AppState>,
    headers: HeaderMap,
    id: IdPath,
) -> Response {
    let result = retrieve_inner(&state, &headers, id).await;
    state.respond(StatusCode::OK, result)
}

async fn retrieve_inner(
    state: &AppState,
    headers: &HeaderMap,
    id: IdPath,
) -> Result<FacultyView, ApiError> {
    state.require(headers, AccessTier::AdminOnly).await?;
    let id = path_id(id)?;
    state.store().get_faculty(id).await?.ok_or(ApiError::NotFound)
}

pub(super) async fn create(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: JsonBody,
) -> Response {
    let span = tracing::info_span!(
        "faculty.create",
        principal_id = Empty,
        faculty_id = Empty,
        latency_ms = Empty,
        outcome = Empty,
    );
    let result = traced(span, create_inner(&state, &headers, body)).await;
    state.respond(StatusCode::CREATED, result)
}

async fn create_inner(
    state: &AppState,
    headers: &HeaderMap,
    body: JsonBody,
) -> Result<FacultyView, ApiError> {
    let principal = state.require(headers, AccessTier::AdminOnly).await?;
    let body = validate::object_body(body, state.locale())?;

    let changes =
        validate::faculty(state.store(), &body, Mode::Create, state.locale(), None).await?;
    let new = validate::new_faculty(changes)?;

    let created = state
        .store()
        .insert_faculty(&new)
        .await
        .map_err(|err| ApiError::from_write(EntityKind::Faculty, Some(&new.code), err))?;
    tracing::Span::current().record("faculty_id", created.id);

    audit::record(
        state,
        &principal,
        AuditAction::Create,
        EntityKind::Faculty,
        created.id,
        None,
        None,
    )
    .await;
    Ok(created)
}

pub(super) async fn update(
    State(state): State<AppState>,
    headers: HeaderMap,
    id: IdPath,
    body: JsonBody,
) -> Response {
    write(state, headers, id, body, Mode::Patch).await
}

pub(super) async fn replace(
    State(state): State<AppState>,
    headers: HeaderMap,
    id: IdPath,
    body: JsonBody,
) -> Response {
    write(state, headers, id, body, Mode::Replace).await
}

async fn write(state: AppState, headers: HeaderMap, id: IdPath, body: JsonBody, mode: Mode) -> Response {
    let span = tracing::info_span!(
        "faculty.update",
        principal_id = Empty,
        faculty_id = Empty,
        latency_ms = Empty,
        outcome = Empty,
    );
    let result = traced(span, update_inner(&state, &headers, id, body, mode)).await;
    state.respond(StatusCode::OK, result)
}

async fn update_inner(
    state: &AppState,
    headers: &HeaderMap,
    id: IdPath,
    body: JsonBody,
    mode: Mode,
) -> Result<FacultyView, ApiError> {
    let principal = state.require(headers, AccessTier::AdminOnly).await?;
    let id = path_id(id)?;
    tracing::Span::current().record("faculty_id", id);

    let before = state.store().get_faculty(id).await?.ok_or(ApiError::NotFound)?;
    let body = validate::object_body(body, state.locale())?;
    let changes = validate::faculty(state.store(), &body, mode, state.locale(), Some(id)).await?;

    let after = state
        .store()
        .update_faculty(id, &changes)
        .await
        .map_err(|err| ApiError::from_write(EntityKind::Faculty, changes.code.as_deref(), err))?
        .ok_or(ApiError::NotFound)?;

    audit::record(
        state,
        &principal,
        AuditAction::Update,
        EntityKind::Faculty,
        id,
        audit::changes(&before, &after),
        None,
    )
    .await;
    Ok(after)
}

pub(super) async fn destroy(
    State(state): State<AppState>,
    headers: HeaderMap,
    id: IdPath,
) -> Response {
    let span = tracing::info_span!(
        "faculty.delete",
        principal_id = Empty,
        faculty_id = Empty,
        latency_ms = Empty,
        outcome = Empty,
    );
    let result = traced(span, destroy_inner(&state, &headers, id)).await;
    state.respond_empty(result)
}

async fn destroy_inner(state: &AppState, headers: &HeaderMap, id: IdPath) -> Result<(), ApiError> {
    let principal = state.authenticate(headers).await?;
    let rules = state.delete_rules(&principal, EntityKind::Faculty)?;
    tracing::Span::current().record("principal_id", principal.user_id);

    let id = path_id(id)?;
    tracing::Span::current().record("faculty_id", id);
    let faculty = state.store().get_faculty(id).await?.ok_or(ApiError::NotFound)?;

    state
        .guarded_delete(EntityKind::Faculty, id, &faculty.name, &rules)
        .await?;

    audit::record(
        state,
        &principal,
        AuditAction::Delete,
        EntityKind::Faculty,
        id,
        None,
        Some(audit::deleted(id, faculty.display_name())),
    )
    .await;
    Ok(())
}

pub(super) async fn dropdown(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let result = dropdown_inner(&state, &headers).await;
    state.respond(StatusCode::OK, result)
}

async fn dropdown_inner(state: &AppState, headers: &HeaderMap) -> Result<Vec<FacultyRef>, ApiError> {
    state.require(headers, AccessTier::Authenticated).await?;
    Ok(state.store().faculty_options().await?)
}
