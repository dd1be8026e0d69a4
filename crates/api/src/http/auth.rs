use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use serde::Serialize;
use serde_json::Value;
use tracing::field::Empty;
use uniadmin_auth::password::{hash_password, verify_login, verify_password};
use uniadmin_auth::{AuthError, TokenType};
use uniadmin_contracts::{NewUser, ProfileChanges, Role, User, UserView};
use uniadmin_policy::AccessTier;
use uniadmin_store::{StoreError, UserStore};

use super::error::{ApiError, AuthFailure};
use super::validate::{Fields, Mode, object_body};
use super::{AppState, JsonBody, traced};

const USERNAME_MAX_LEN: usize = 150;
const PASSWORD_MIN_LEN: usize = 8;
const PASSWORD_MAX_LEN: usize = 128;
const PERSON_NAME_MAX_LEN: usize = 150;
const PHONE_MAX_LEN: usize = 15;
const AVATAR_MAX_LEN: usize = 100;

#[derive(Debug, Serialize)]
struct LoginResponse {
    access: String,
    refresh: String,
    user: UserView,
}

#[derive(Debug, Serialize)]
struct RegisterResponse {
    user: UserView,
    message: &'static str,
}

#[derive(Debug, Serialize)]
struct AccessResponse {
    access: String,
}

#[derive(Debug, Serialize)]
struct DetailResponse {
    detail: &'static str,
}

fn signing_failed(err: AuthError) -> ApiError {
    ApiError::Internal(format!("{}: {}", err.code, err.message))
}

fn login_failed(reason: AuthFailure) -> ApiError {
    let err = ApiError::AuthenticationFailed(reason);
    crate::metrics::inc_auth_failure(err.kind().as_str());
    err
}

fn valid_username(username: &str) -> bool {
    username
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'))
}

/// Syntax only: one `@`, a non-empty local part and a dotted domain.
fn valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace)
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains("..")
}

pub(super) async fn login(State(state): State<AppState>, body: JsonBody) -> Response {
    let span = tracing::info_span!(
        "auth.login",
        principal_id = Empty,
        latency_ms = Empty,
        outcome = Empty,
    );
    let result = traced(span, login_inner(&state, body)).await;
    state.respond(StatusCode::OK, result)
}

async fn login_inner(state: &AppState, body: JsonBody) -> Result<LoginResponse, ApiError> {
    let body = object_body(body, state.locale())?;
    let mut fields = Fields::new(&body, Mode::Create, state.locale());
    let username = fields
        .text("username", true)
        .and_then(|u| fields.bounded_len("username", u, 1, USERNAME_MAX_LEN));
    let password = fields
        .text("password", true)
        .and_then(|p| fields.bounded_len("password", p, 1, PASSWORD_MAX_LEN));
    fields.finish()?;
    let (Some(username), Some(password)) = (username, password) else {
        return Err(ApiError::Internal("login fields missing after validation".to_string()));
    };

    let user = state.store().find_user_by_username(&username).await?;
    let verified = verify_login(
        &password,
        user.as_ref().map(|user| user.password_hash.as_str()),
    );
    let Some(mut user) = user.filter(|_| verified) else {
        return Err(login_failed(AuthFailure::InvalidCredentials));
    };
    if !user.is_active {
        return Err(login_failed(AuthFailure::AccountDisabled));
    }
    tracing::Span::current().record("principal_id", user.id);

    let tokens = state
        .tokens
        .issue_pair(user.id, &user.username, user.role)
        .map_err(signing_failed)?;

    state.store().touch_last_login(user.id).await?;
    user.last_login = Some(chrono::Utc::now());

    Ok(LoginResponse {
        access: tokens.access,
        refresh: tokens.refresh,
        user: UserView::from(&user),
    })
}

pub(super) async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: JsonBody,
) -> Response {
    let span = tracing::info_span!(
        "auth.register",
        principal_id = Empty,
        user_id = Empty,
        latency_ms = Empty,
        outcome = Empty,
    );
    let result = traced(span, register_inner(&state, &headers, body)).await;
    state.respond(StatusCode::CREATED, result)
}

async fn register_inner(
    state: &AppState,
    headers: &HeaderMap,
    body: JsonBody,
) -> Result<RegisterResponse, ApiError> {
    state.require(headers, AccessTier::AdminOnly).await?;
    let locale = state.locale();
    let body = object_body(body, locale)?;
    let mut fields = Fields::new(&body, Mode::Create, locale);

    let mut username = fields
        .text("username", true)
        .and_then(|u| fields.bounded_len("username", u, 1, USERNAME_MAX_LEN));
    if let Some(name) = username.as_deref() {
        if !valid_username(name) {
            fields.push("username", locale.invalid_username());
            username = None;
        } else if state.store().find_user_by_username(name).await?.is_some() {
            fields.push("username", locale.username_taken());
            username = None;
        }
    }

    let email = fields.text("email", true).filter(|email| {
        let ok = valid_email(email);
        if !ok {
            fields.push("email", locale.invalid_email());
        }
        ok
    });
    let password = fields
        .text("password", true)
        .and_then(|p| fields.bounded_len("password", p, PASSWORD_MIN_LEN, PASSWORD_MAX_LEN));
    let password_confirm = fields.text("password_confirm", true).and_then(|p| {
        fields.bounded_len("password_confirm", p, PASSWORD_MIN_LEN, PASSWORD_MAX_LEN)
    });
    if let (Some(password), Some(confirm)) = (password.as_deref(), password_confirm.as_deref())
        && password != confirm
    {
        fields.push("password_confirm", locale.passwords_mismatch());
    }
    let first_name = fields
        .text("first_name", true)
        .and_then(|n| fields.bounded_len("first_name", n, 1, PERSON_NAME_MAX_LEN));
    let last_name = fields
        .text("last_name", true)
        .and_then(|n| fields.bounded_len("last_name", n, 1, PERSON_NAME_MAX_LEN));
    let role = match fields.text("role", false) {
        None => Role::Student,
        Some(raw) => Role::parse(&raw).unwrap_or_else(|| {
            fields.push("role", locale.invalid_role());
            Role::Student
        }),
    };
    fields.finish()?;

    let (Some(username), Some(email), Some(password), Some(first_name), Some(last_name)) =
        (username, email, password, first_name, last_name)
    else {
        return Err(ApiError::Internal(
            "registration fields missing after validation".to_string(),
        ));
    };

    let password_hash = hash_password(&password).map_err(signing_failed)?;
    let user = state
        .store()
        .insert_user(&NewUser {
            username,
            email,
            password_hash,
            first_name,
            last_name,
            role,
        })
        .await
        .map_err(|err| match err {
            StoreError::UniqueViolation { .. } => {
                ApiError::field("username", locale.username_taken())
            }
            err => ApiError::from(err),
        })?;
    tracing::Span::current().record("user_id", user.id);
    tracing::info!(user_id = user.id, role = user.role.as_str(), "user registered");

    Ok(RegisterResponse {
        user: UserView::from(&user),
        message: locale.user_created(),
    })
}

pub(super) async fn refresh(State(state): State<AppState>, body: JsonBody) -> Response {
    let result = refresh_inner(&state, body).await;
    state.respond(StatusCode::OK, result)
}

async fn refresh_inner(state: &AppState, body: JsonBody) -> Result<AccessResponse, ApiError> {
    let body = object_body(body, state.locale())?;
    let mut fields = Fields::new(&body, Mode::Create, state.locale());
    let token = fields.text("refresh", true);
    fields.finish()?;
    let Some(token) = token else {
        return Err(ApiError::Internal("refresh token missing after validation".to_string()));
    };

    let claims = state
        .tokens
        .verify(&token, TokenType::Refresh)
        .map_err(|_| login_failed(AuthFailure::InvalidToken))?;
    if state.store().is_token_blacklisted(&claims.jti).await? {
        return Err(login_failed(AuthFailure::InvalidToken));
    }

    let user_id = claims
        .user_id()
        .map_err(|_| login_failed(AuthFailure::InvalidToken))?;
    let user = state
        .store()
        .get_user(user_id)
        .await?
        .filter(|user| user.is_active)
        .ok_or_else(|| login_failed(AuthFailure::InvalidToken))?;

    let access = state
        .tokens
        .issue_access(user.id, &user.username, user.role)
        .map_err(signing_failed)?;
    Ok(AccessResponse { access })
}

pub(super) async fn change_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: JsonBody,
) -> Response {
    let span = tracing::info_span!(
        "auth.change_password",
        principal_id = Empty,
        latency_ms = Empty,
        outcome = Empty,
    );
    let result = traced(span, change_password_inner(&state, &headers, body)).await;
    state.respond(StatusCode::OK, result)
}

async fn change_password_inner(
    state: &AppState,
    headers: &HeaderMap,
    body: JsonBody,
) -> Result<DetailResponse, ApiError> {
    let principal = state.require(headers, AccessTier::Authenticated).await?;
    let locale = state.locale();
    let body = object_body(body, locale)?;
    let mut fields = Fields::new(&body, Mode::Create, locale);

    let old_password = fields.text("old_password", true);
    let new_password = fields
        .text("new_password", true)
        .and_then(|p| fields.bounded_len("new_password", p, PASSWORD_MIN_LEN, PASSWORD_MAX_LEN));
    let confirm = fields.text("new_password_confirm", true).and_then(|p| {
        fields.bounded_len("new_password_confirm", p, PASSWORD_MIN_LEN, PASSWORD_MAX_LEN)
    });
    if let (Some(new), Some(confirm)) = (new_password.as_deref(), confirm.as_deref())
        && new != confirm
    {
        fields.push("new_password_confirm", locale.new_passwords_mismatch());
    }
    fields.finish()?;
    let (Some(old_password), Some(new_password)) = (old_password, new_password) else {
        return Err(ApiError::Internal(
            "password fields missing after validation".to_string(),
        ));
    };

    let user = current_user(state, principal.user_id).await?;
    if !verify_password(&old_password, &user.password_hash) {
        return Err(ApiError::field("old_password", locale.wrong_current_password()));
    }

    let password_hash = hash_password(&new_password).map_err(signing_failed)?;
    if !state.store().set_password(user.id, &password_hash).await? {
        return Err(ApiError::NotFound);
    }
    tracing::info!(user_id = user.id, "password changed");

    Ok(DetailResponse {
        detail: locale.password_changed(),
    })
}

/// An empty body is a plain logout; a supplied refresh token is blacklisted.
pub(super) async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let result = logout_inner(&state, &headers, body).await;
    state.respond(StatusCode::OK, result)
}

async fn logout_inner(
    state: &AppState,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<DetailResponse, ApiError> {
    let principal = state.require(headers, AccessTier::Authenticated).await?;
    let locale = state.locale();

    let token = if body.iter().all(u8::is_ascii_whitespace) {
        None
    } else {
        let value: Value = serde_json::from_slice(&body).map_err(|err| {
            ApiError::field("non_field_errors", locale.malformed_body(&err.to_string()))
        })?;
        value
            .get("refresh")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(str::to_string)
    };

    if let Some(token) = token {
        let claims = state
            .tokens
            .verify(&token, TokenType::Refresh)
            .map_err(|_| ApiError::field("refresh", locale.invalid_token()))?;
        let user_id = claims
            .user_id()
            .map_err(|_| ApiError::field("refresh", locale.invalid_token()))?;
        state
            .store()
            .blacklist_token(&claims.jti, user_id, claims.expires_at())
            .await?;
        tracing::info!(user_id = principal.user_id, jti = %claims.jti, "refresh token blacklisted");
    }

    Ok(DetailResponse {
        detail: locale.logged_out(),
    })
}

async fn current_user(state: &AppState, user_id: i64) -> Result<User, ApiError> {
    state
        .store()
        .get_user(user_id)
        .await?
        .ok_or(ApiError::AuthenticationFailed(AuthFailure::InvalidToken))
}

/// Absent stays untouched; blank or null clears.
fn nullable(fields: &mut Fields<'_>, key: &str, max: usize) -> Option<Option<String>> {
    let value = fields.optional_text(key)?;
    Some(value.and_then(|v| fields.bounded_len(key, v, 0, max)))
}

pub(super) async fn me(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let result = me_inner(&state, &headers).await;
    state.respond(StatusCode::OK, result)
}

async fn me_inner(state: &AppState, headers: &HeaderMap) -> Result<UserView, ApiError> {
    let principal = state.require(headers, AccessTier::Authenticated).await?;
    let user = current_user(state, principal.user_id).await?;
    Ok(UserView::from(&user))
}

pub(super) async fn update_me(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: JsonBody,
) -> Response {
    let result = update_me_inner(&state, &headers, body).await;
    state.respond(StatusCode::OK, result)
}

async fn update_me_inner(
    state: &AppState,
    headers: &HeaderMap,
    body: JsonBody,
) -> Result<UserView, ApiError> {
    let principal = state.require(headers, AccessTier::Authenticated).await?;
    let body = object_body(body, state.locale())?;
    let mut fields = Fields::new(&body, Mode::Patch, state.locale());

    let first_name =
        nullable(&mut fields, "first_name", PERSON_NAME_MAX_LEN).map(Option::unwrap_or_default);
    let last_name =
        nullable(&mut fields, "last_name", PERSON_NAME_MAX_LEN).map(Option::unwrap_or_default);
    let phone_number = nullable(&mut fields, "phone_number", PHONE_MAX_LEN);
    let avatar = nullable(&mut fields, "avatar", AVATAR_MAX_LEN);
    fields.finish()?;

    let changes = ProfileChanges {
        first_name,
        last_name,
        phone_number,
        avatar,
    };
    let user = state
        .store()
        .update_profile(principal.user_id, &changes)
        .await?
        .ok_or(ApiError::AuthenticationFailed(AuthFailure::InvalidToken))?;
    Ok(UserView::from(&user))
}
