use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use uniadmin_contracts::{EntityKind, ErrorEnvelope, ErrorKind, FieldErrors, Locale};
use uniadmin_policy::{Forbidden, IntegrityViolation};
use uniadmin_store::StoreError;

/// Why an authentication attempt was refused. Each carries its own message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    InvalidToken,
    InvalidCredentials,
    AccountDisabled,
}

/// Every way a request can fail. Rendered by [`ApiError::into_localized_response`] only.
#[derive(Debug)]
pub enum ApiError {
    Validation(FieldErrors),
    DuplicateCode {
        entity: EntityKind,
        code: String,
        details: FieldErrors,
    },
    NotAuthenticated,
    AuthenticationFailed(AuthFailure),
    PermissionDenied,
    NotFound,
    /// The path exists but not for this method. Has no kind of its own.
    MethodNotAllowed,
    IntegrityConflict(IntegrityViolation),
    Internal(String),
}

impl ApiError {
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        ApiError::Validation(FieldErrors::single(field, message))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Validation(_) => ErrorKind::ValidationError,
            ApiError::DuplicateCode { .. } => ErrorKind::DuplicateCode,
            ApiError::NotAuthenticated => ErrorKind::NotAuthenticated,
            ApiError::AuthenticationFailed(_) => ErrorKind::AuthenticationFailed,
            ApiError::PermissionDenied => ErrorKind::PermissionDenied,
            ApiError::NotFound => ErrorKind::NotFound,
            ApiError::IntegrityConflict(_) => ErrorKind::IntegrityConflict,
            ApiError::MethodNotAllowed | ApiError::Internal(_) => ErrorKind::UnknownError,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            _ => StatusCode::from_u16(self.kind().status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }

    pub fn envelope(&self, locale: Locale) -> ErrorEnvelope {
        let kind = self.kind();
        match self {
            ApiError::Validation(details) => {
                ErrorEnvelope::new(kind, locale.invalid_data()).with_details(details.to_value())
            }
            ApiError::DuplicateCode {
                entity,
                code,
                details,
            } => {
                let message = locale.duplicate_code(*entity, code);
                let details = if details.is_empty() {
                    FieldErrors::single("code", message.clone())
                } else {
                    details.clone()
                };
                ErrorEnvelope::new(kind, message).with_details(details.to_value())
            }
            ApiError::NotAuthenticated => ErrorEnvelope::new(kind, locale.not_authenticated()),
            ApiError::AuthenticationFailed(reason) => {
                let message = match reason {
                    AuthFailure::InvalidToken => locale.authentication_failed(),
                    AuthFailure::InvalidCredentials => locale.invalid_credentials(),
                    AuthFailure::AccountDisabled => locale.account_disabled(),
                };
                ErrorEnvelope::new(kind, message)
            }
            ApiError::PermissionDenied => ErrorEnvelope::new(kind, locale.permission_denied()),
            ApiError::NotFound => ErrorEnvelope::new(kind, locale.not_found()),
            ApiError::MethodNotAllowed => ErrorEnvelope::new(kind, locale.method_not_allowed()),
            ApiError::IntegrityConflict(violation) => ErrorEnvelope::new(
                kind,
                locale.integrity_conflict(
                    violation.entity,
                    &violation.name,
                    violation.dependent,
                    violation.count,
                ),
            )
            .with_details(violation.details()),
            ApiError::Internal(_) => ErrorEnvelope::new(kind, locale.unknown_error()),
        }
    }

    pub fn into_localized_response(self, locale: Locale) -> Response {
        if let ApiError::Internal(reason) = &self {
            tracing::error!(reason = %reason, "request failed with internal error");
        }

        (self.status(), Json(self.envelope(locale))).into_response()
    }

    /// Maps a failed insert/update of `entity` with `code`. A unique violation here
    /// means another writer claimed the code after validation ran.
    pub fn from_write(entity: EntityKind, code: Option<&str>, err: StoreError) -> Self {
        match (err, code) {
            (StoreError::UniqueViolation { .. }, Some(code)) => ApiError::DuplicateCode {
                entity,
                code: code.to_string(),
                details: FieldErrors::new(),
            },
            (err, _) => ApiError::from(err),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<Forbidden> for ApiError {
    fn from(_: Forbidden) -> Self {
        ApiError::PermissionDenied
    }
}

impl From<IntegrityViolation> for ApiError {
    fn from(violation: IntegrityViolation) -> Self {
        ApiError::IntegrityConflict(violation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_code_renders_conflict_with_code_details() {
        let err = ApiError::DuplicateCode {
            entity: EntityKind::Faculty,
            code: "CNTT".to_string(),
            details: FieldErrors::new(),
        };
        assert_eq!(err.kind().status_code(), 409);

        let envelope = err.envelope(Locale::En);
        assert_eq!(envelope.error.code, ErrorKind::DuplicateCode);
        assert!(envelope.error.message.contains("'CNTT'"));
        let details = envelope.error.details.unwrap();
        assert!(details["code"][0].as_str().unwrap().contains("already exists"));
    }

    #[test]
    fn integrity_conflict_is_structured() {
        let err = ApiError::IntegrityConflict(IntegrityViolation {
            entity: EntityKind::Major,
            name: "Software Engineering".to_string(),
            dependent: EntityKind::Class,
            count: 2,
        });

        let envelope = serde_json::to_value(err.envelope(Locale::En)).unwrap();
        assert_eq!(envelope["error"]["code"], "INTEGRITY_CONFLICT");
        assert_eq!(envelope["error"]["details"]["count"], 2);
        assert!(
            envelope["error"]["message"]
                .as_str()
                .unwrap()
                .contains("2 related classes")
        );
    }

    #[test]
    fn internal_errors_hide_the_reason() {
        let envelope = ApiError::Internal("pool timed out".to_string()).envelope(Locale::En);
        assert_eq!(envelope.error.code, ErrorKind::UnknownError);
        assert!(!envelope.error.message.contains("pool"));
        assert!(envelope.error.details.is_none());
    }

    #[test]
    fn store_unique_violation_becomes_duplicate_code() {
        let err = ApiError::from_write(
            EntityKind::Class,
            Some("KTPM2021"),
            StoreError::UniqueViolation {
                constraint: Some("classes_code_key".to_string()),
            },
        );
        assert!(matches!(err, ApiError::DuplicateCode { entity: EntityKind::Class, .. }));

        let err = ApiError::from_write(EntityKind::Class, None, StoreError::Timeout);
        assert!(matches!(err, ApiError::Internal(_)));
    }

    #[test]
    fn wrong_method_keeps_405_under_unknown_error() {
        let err = ApiError::MethodNotAllowed;
        assert_eq!(err.status(), StatusCode::METHOD_NOT_ALLOWED);
        let envelope = err.envelope(Locale::En);
        assert_eq!(envelope.error.code, ErrorKind::UnknownError);
        assert_eq!(envelope.error.message, "Method not allowed.");
    }

    #[test]
    fn login_failures_keep_their_messages() {
        let envelope =
            ApiError::AuthenticationFailed(AuthFailure::AccountDisabled).envelope(Locale::En);
        assert_eq!(envelope.error.message, "User account is disabled");
        assert_eq!(envelope.error.code, ErrorKind::AuthenticationFailed);
    }
}
