use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{MatchedPath, Path, Query, Request, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, Uri, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::Instrument;
use uniadmin_auth::password::hash_password;
use uniadmin_auth::{Principal, TokenIssuer, TokenType, bearer_token};
use uniadmin_contracts::{
    EntityKind, FieldErrors, Locale, NewUser, Page, PageWindow, Role, SortField, SortKey,
};
use uniadmin_policy::{AccessTier, DeleteGuard, DependentRule, IntegrityViolation, authorize};
use uniadmin_store::{AcademicStore, MemoryStore, PgStore, Store, StoreError, UserStore};

use crate::config::{ApiConfig, StartupError, StoreBackend};

mod audit;
mod auth;
mod class;
pub mod error;
mod faculty;
mod major;
pub mod validate;

use self::error::{ApiError, AuthFailure};

#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    tokens: TokenIssuer,
    store: Arc<dyn Store>,
    guard: DeleteGuard,
}

pub async fn router(config: ApiConfig) -> Result<Router, StartupError> {
    let store: Arc<dyn Store> = match config.store_backend {
        StoreBackend::Postgres => {
            let db_url = config.db_url.as_deref().ok_or_else(|| StartupError {
                code: "ERR_MISSING_CONFIG",
                message: "postgres store requires UNIADMIN_DB_URL".to_string(),
            })?;

            let store = PgStore::connect_and_migrate(
                db_url,
                config.db_max_connections,
                config.db_timeout(),
            )
            .await
            .map_err(|err| StartupError {
                code: "ERR_DB_UNAVAILABLE",
                message: format!("failed to initialize store: {}", err),
            })?;
            Arc::new(store)
        }
        StoreBackend::Memory => {
            tracing::warn!("using the in-memory store; records are lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    router_with_store(config, store).await
}

/// Builds the router over an already constructed store.
pub async fn router_with_store(
    config: ApiConfig,
    store: Arc<dyn Store>,
) -> Result<Router, StartupError> {
    let tokens = TokenIssuer::new(config.token_config()).map_err(|err| StartupError {
        code: err.code,
        message: err.message,
    })?;

    bootstrap_admin(&config, store.as_ref()).await?;

    let cors = if config.cors_allow_all {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
    };

    let state = AppState {
        config,
        tokens,
        store,
        guard: DeleteGuard::standard(),
    };

    Ok(Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route(
            "/api/v1/faculties/",
            get(faculty::list).post(faculty::create),
        )
        .route("/api/v1/faculties/dropdown/", get(faculty::dropdown))
        .route(
            "/api/v1/faculties/{id}/",
            get(faculty::retrieve)
                .put(faculty::replace)
                .patch(faculty::update)
                .delete(faculty::destroy),
        )
        .route("/api/v1/majors/", get(major::list).post(major::create))
        .route("/api/v1/majors/dropdown/", get(major::dropdown))
        .route(
            "/api/v1/majors/{id}/",
            get(major::retrieve)
                .put(major::replace)
                .patch(major::update)
                .delete(major::destroy),
        )
        .route("/api/v1/classes/", get(class::list).post(class::create))
        .route("/api/v1/classes/dropdown/", get(class::dropdown))
        .route(
            "/api/v1/classes/academic-years/",
            get(class::academic_years),
        )
        .route(
            "/api/v1/classes/{id}/",
            get(class::retrieve)
                .put(class::replace)
                .patch(class::update)
                .delete(class::destroy),
        )
        .route("/api/v1/auth/login/", post(auth::login))
        .route("/api/v1/auth/register/", post(auth::register))
        .route("/api/v1/auth/refresh/", post(auth::refresh))
        .route("/api/v1/auth/change-password/", post(auth::change_password))
        .route("/api/v1/auth/logout/", post(auth::logout))
        .route("/api/v1/auth/me/", get(auth::me).patch(auth::update_me))
        .route_layer(middleware::from_fn(track_http_metrics))
        .fallback(fallback)
        .method_not_allowed_fallback(method_not_allowed)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state))
}

async fn bootstrap_admin(config: &ApiConfig, store: &dyn Store) -> Result<(), StartupError> {
    let Some(admin) = config.bootstrap_admin.as_ref() else {
        return Ok(());
    };

    let failed = |message: String| StartupError {
        code: "ERR_BOOTSTRAP_FAILED",
        message,
    };

    let existing = store
        .find_user_by_username(&admin.username)
        .await
        .map_err(|err| failed(format!("failed to look up bootstrap admin: {}", err)))?;
    if existing.is_some() {
        return Ok(());
    }

    let password_hash =
        hash_password(&admin.password).map_err(|err| failed(err.message))?;
    let user = store
        .insert_user(&NewUser {
            username: admin.username.clone(),
            email: String::new(),
            password_hash,
            first_name: String::new(),
            last_name: String::new(),
            role: Role::Admin,
        })
        .await
        .map_err(|err| failed(format!("failed to create bootstrap admin: {}", err)))?;

    tracing::info!(user_id = user.id, username = %user.username, "bootstrap admin created");
    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Serialize)]
struct ReadyzResponse {
    status: &'static str,
    checks: BTreeMap<&'static str, bool>,
}

async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let mut checks = BTreeMap::new();
    checks.insert("store", state.store.ping().await.is_ok());

    let all_ready = checks.values().all(|ok| *ok);
    let status = if all_ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadyzResponse {
            status: if all_ready { "ready" } else { "not_ready" },
            checks,
        }),
    )
}

async fn metrics(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if state.config.metrics_require_auth
        && let Err(err) = state.authenticate(&headers).await
    {
        return err.into_localized_response(state.locale());
    }

    match crate::metrics::render() {
        Ok((body, content_type)) => {
            let mut headers = HeaderMap::new();
            if let Ok(value) = HeaderValue::from_str(content_type.as_str()) {
                headers.insert(header::CONTENT_TYPE, value);
            }
            (headers, body).into_response()
        }
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

async fn fallback(State(state): State<AppState>) -> Response {
    ApiError::NotFound.into_localized_response(state.locale())
}

async fn method_not_allowed(State(state): State<AppState>) -> Response {
    ApiError::MethodNotAllowed.into_localized_response(state.locale())
}

async fn track_http_metrics(req: Request, next: Next) -> Response {
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let method = req.method().as_str().to_string();
    let started = Instant::now();

    let response = next.run(req).await;

    crate::metrics::observe_http_request(
        &route,
        &method,
        response.status().as_u16(),
        started.elapsed(),
    );
    response
}

impl AppState {
    pub fn locale(&self) -> Locale {
        self.config.locale
    }

    pub(crate) fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    pub(crate) fn respond<T: Serialize>(
        &self,
        status: StatusCode,
        result: Result<T, ApiError>,
    ) -> Response {
        match result {
            Ok(body) => (status, Json(body)).into_response(),
            Err(err) => err.into_localized_response(self.locale()),
        }
    }

    pub(crate) fn respond_empty(&self, result: Result<(), ApiError>) -> Response {
        match result {
            Ok(()) => StatusCode::NO_CONTENT.into_response(),
            Err(err) => err.into_localized_response(self.locale()),
        }
    }

    /// Resolves the bearer token to a principal. The role comes from the user
    /// record, not the token, so role changes and deactivation apply at once.
    pub(crate) async fn authenticate(&self, headers: &HeaderMap) -> Result<Principal, ApiError> {
        let result = self.resolve_principal(headers).await;
        if let Err(err @ (ApiError::NotAuthenticated | ApiError::AuthenticationFailed(_))) = &result
        {
            crate::metrics::inc_auth_failure(err.kind().as_str());
        }
        result
    }

    async fn resolve_principal(&self, headers: &HeaderMap) -> Result<Principal, ApiError> {
        let invalid = || ApiError::AuthenticationFailed(AuthFailure::InvalidToken);

        let token = bearer_token(headers).map_err(|err| match err.code {
            "ERR_AUTH_REQUIRED" => ApiError::NotAuthenticated,
            _ => invalid(),
        })?;
        let claims = self
            .tokens
            .verify(&token, TokenType::Access)
            .map_err(|_| invalid())?;
        let user_id = claims.user_id().map_err(|_| invalid())?;

        let user = self
            .store
            .get_user(user_id)
            .await?
            .filter(|user| user.is_active)
            .ok_or_else(invalid)?;

        Ok(Principal {
            user_id: user.id,
            username: user.username,
            role: user.role,
        })
    }

    /// Authentication always precedes the role check: 401 before 403.
    pub(crate) async fn require(
        &self,
        headers: &HeaderMap,
        tier: AccessTier,
    ) -> Result<Principal, ApiError> {
        let principal = self.authenticate(headers).await?;
        authorize(&principal, tier)?;
        tracing::Span::current().record("principal_id", principal.user_id);
        Ok(principal)
    }

    pub(crate) fn delete_rules(
        &self,
        principal: &Principal,
        kind: EntityKind,
    ) -> Result<Vec<DependentRule>, ApiError> {
        Ok(self.guard.plan(principal, kind)?)
    }

    async fn first_violation(
        &self,
        id: i64,
        name: &str,
        rules: &[DependentRule],
    ) -> Result<Option<IntegrityViolation>, ApiError> {
        for rule in rules {
            let count = self.store.count_children(rule.dependent, id).await?;
            if let Err(violation) = self.guard.check(name, *rule, count) {
                return Ok(Some(violation));
            }
        }
        Ok(None)
    }

    /// Runs the integrity guard and deletes. Dependents created between the
    /// count and the delete are caught by the storage foreign keys.
    pub(crate) async fn guarded_delete(
        &self,
        kind: EntityKind,
        id: i64,
        name: &str,
        rules: &[DependentRule],
    ) -> Result<(), ApiError> {
        if let Some(violation) = self.first_violation(id, name, rules).await? {
            crate::metrics::inc_integrity_rejection(kind.as_str());
            return Err(violation.into());
        }

        match self.store.delete_record(kind, id).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(ApiError::NotFound),
            Err(StoreError::ForeignKeyViolation { constraint }) => {
                crate::metrics::inc_integrity_rejection(kind.as_str());
                match self.first_violation(id, name, rules).await? {
                    Some(violation) => Err(violation.into()),
                    None => Err(ApiError::Internal(format!(
                        "delete of {} {} blocked by {}",
                        kind.as_str(),
                        id,
                        constraint.as_deref().unwrap_or("foreign key")
                    ))),
                }
            }
            Err(err) => Err(err.into()),
        }
    }
}

/// Runs `fut` inside `span`, recording how long it took and how it ended.
pub(crate) async fn traced<T, F>(span: tracing::Span, fut: F) -> Result<T, ApiError>
where
    F: Future<Output = Result<T, ApiError>>,
{
    let started = Instant::now();
    async move {
        let result = fut.await;
        let latency_ms = started.elapsed().as_millis() as u64;
        let outcome = match &result {
            Ok(_) => "ok",
            Err(err) => err.kind().as_str(),
        };
        tracing::Span::current().record("latency_ms", latency_ms);
        tracing::Span::current().record("outcome", outcome);
        result
    }
    .instrument(span)
    .await
}

pub(crate) type RawQuery = Result<Query<HashMap<String, String>>, QueryRejection>;
pub(crate) type JsonBody = Result<Json<serde_json::Value>, JsonRejection>;
pub(crate) type IdPath = Result<Path<i64>, PathRejection>;

/// Non-numeric ids address nothing.
pub(crate) fn path_id(path: IdPath) -> Result<i64, ApiError> {
    path.map(|Path(id)| id).map_err(|_| ApiError::NotFound)
}

/// Query string of a list or dropdown request.
pub(crate) struct ListParams {
    params: HashMap<String, String>,
    locale: Locale,
    errors: FieldErrors,
}

impl ListParams {
    pub(crate) fn new(query: RawQuery, locale: Locale) -> Result<Self, ApiError> {
        let Query(params) = query.map_err(|rejection| {
            ApiError::field(
                "non_field_errors",
                locale.malformed_body(&rejection.body_text()),
            )
        })?;
        Ok(Self {
            params,
            locale,
            errors: FieldErrors::new(),
        })
    }

    pub(crate) fn text(&self, key: &str) -> Option<String> {
        self.params
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(|v| v.to_string())
    }

    pub(crate) fn search(&self) -> Option<String> {
        self.text("search")
    }

    pub(crate) fn id(&mut self, key: &str) -> Option<i64> {
        let raw = self.text(key)?;
        let parsed = validate::parse_int(&raw);
        if parsed.is_none() {
            self.errors.push(key, self.locale.invalid_integer());
        }
        parsed
    }

    pub(crate) fn year(&mut self, key: &str) -> Option<i32> {
        let raw = self.text(key)?;
        let parsed = validate::parse_int(&raw).and_then(|year| i32::try_from(year).ok());
        if parsed.is_none() {
            self.errors.push(key, self.locale.invalid_integer());
        }
        parsed
    }

    pub(crate) fn flag(&mut self, key: &str) -> Option<bool> {
        let raw = self.text(key)?;
        let parsed = validate::parse_flag(&raw);
        if parsed.is_none() {
            self.errors.push(key, self.locale.invalid_boolean());
        }
        parsed
    }

    /// `ordering` restricted to `allowed`; falls back to `default` when nothing usable is given.
    pub(crate) fn ordering(&self, allowed: &[SortField], default: &[SortKey]) -> Vec<SortKey> {
        let keys = self
            .text("ordering")
            .map(|raw| SortKey::parse_list(&raw, allowed))
            .unwrap_or_default();
        if keys.is_empty() {
            default.to_vec()
        } else {
            keys
        }
    }

    pub(crate) fn page(&mut self, config: &ApiConfig) -> PageRequest {
        let page = match self.text("page") {
            None => 1,
            Some(raw) => match raw.parse::<u64>() {
                Ok(page) if page >= 1 => page,
                Ok(_) => {
                    self.errors.push("page", self.locale.min_value(1));
                    1
                }
                Err(_) => {
                    self.errors.push("page", self.locale.invalid_integer());
                    1
                }
            },
        };

        let size = self
            .text("page_size")
            .and_then(|raw| raw.parse::<u32>().ok())
            .filter(|size| *size >= 1)
            .map(|size| size.min(config.max_page_size))
            .unwrap_or(config.page_size);

        PageRequest {
            page,
            window: PageWindow {
                limit: size,
                offset: (page - 1).saturating_mul(u64::from(size)),
            },
        }
    }

    /// Rejects the request when any parameter failed to parse.
    pub(crate) fn finish(self) -> Result<(), ApiError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(self.errors))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PageRequest {
    pub page: u64,
    pub window: PageWindow,
}

impl PageRequest {
    /// Wraps one page of results. Asking past the last page is a 404.
    pub(crate) fn into_page<T>(
        self,
        uri: &Uri,
        count: u64,
        results: Vec<T>,
    ) -> Result<Page<T>, ApiError> {
        if self.page > 1 && self.window.offset >= count {
            return Err(ApiError::NotFound);
        }

        let shown = self.window.offset.saturating_add(results.len() as u64);
        Ok(Page {
            count,
            next: (shown < count).then(|| page_link(uri, self.page + 1)),
            previous: (self.page > 1).then(|| page_link(uri, self.page - 1)),
            results,
        })
    }
}

fn page_link(uri: &Uri, page: u64) -> String {
    let mut pairs: Vec<&str> = uri
        .query()
        .unwrap_or("")
        .split('&')
        .filter(|pair| !pair.is_empty() && *pair != "page" && !pair.starts_with("page="))
        .collect();

    let page_pair = format!("page={}", page);
    if page > 1 {
        pairs.push(page_pair.as_str());
    }

    if pairs.is_empty() {
        uri.path().to_string()
    } else {
        format!("{}?{}", uri.path(), pairs.join("&"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> ListParams {
        ListParams {
            params: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            locale: Locale::En,
            errors: FieldErrors::new(),
        }
    }

    fn config() -> ApiConfig {
        ApiConfig::from_kv(&HashMap::from([
            ("UNIADMIN_STORE".to_string(), "memory".to_string()),
            (
                "UNIADMIN_JWT_SECRET".to_string(),
                "0123456789abcdef0123456789abcdef".to_string(),
            ),
        ]))
        .unwrap()
    }

    #[test]
    fn page_links_preserve_other_parameters() {
        let uri: Uri = "/api/v1/faculties/?search=it&page=2&page_size=5"
            .parse()
            .unwrap();
        assert_eq!(
            page_link(&uri, 3),
            "/api/v1/faculties/?search=it&page_size=5&page=3"
        );
        assert_eq!(
            page_link(&uri, 1),
            "/api/v1/faculties/?search=it&page_size=5"
        );
    }

    #[test]
    fn page_size_is_clamped_and_page_is_validated() {
        let cfg = config();
        let mut p = params(&[("page", "3"), ("page_size", "1000")]);
        let req = p.page(&cfg);
        assert_eq!(req.window.limit, 100);
        assert_eq!(req.window.offset, 200);
        assert!(p.finish().is_ok());

        let mut p = params(&[("page", "abc")]);
        p.page(&cfg);
        assert!(matches!(p.finish(), Err(ApiError::Validation(_))));
    }

    #[test]
    fn pages_past_the_end_are_not_found() {
        let uri: Uri = "/api/v1/majors/?page=4".parse().unwrap();
        let req = PageRequest {
            page: 4,
            window: PageWindow {
                limit: 20,
                offset: 60,
            },
        };
        assert!(matches!(
            req.into_page::<i64>(&uri, 10, Vec::new()),
            Err(ApiError::NotFound)
        ));

        let first = PageRequest {
            page: 1,
            window: PageWindow {
                limit: 2,
                offset: 0,
            },
        };
        let page = first.into_page(&uri, 3, vec![1, 2]).unwrap();
        assert_eq!(page.next.as_deref(), Some("/api/v1/majors/?page=2"));
        assert_eq!(page.previous, None);
    }

    #[test]
    fn invalid_filters_name_the_parameter() {
        let mut p = params(&[("faculty", "x"), ("is_active", "maybe"), ("academic_year", "2021")]);
        assert_eq!(p.id("faculty"), None);
        assert_eq!(p.flag("is_active"), None);
        assert_eq!(p.year("academic_year"), Some(2021));

        let Err(ApiError::Validation(details)) = p.finish() else {
            panic!("expected validation error");
        };
        assert!(details.contains("faculty"));
        assert!(details.contains("is_active"));
    }

    #[test]
    fn unknown_ordering_falls_back_to_default() {
        let p = params(&[("ordering", "-password")]);
        let default = [SortKey::asc(SortField::Name)];
        assert_eq!(p.ordering(&[SortField::Code, SortField::Name], &default), default);

        let p = params(&[("ordering", "-code")]);
        assert_eq!(
            p.ordering(&[SortField::Code, SortField::Name], &default),
            vec![SortKey::desc(SortField::Code)]
        );
    }
}
