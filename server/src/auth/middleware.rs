//! Authentication middleware.
//!
//! Bearer token extraction. With no `AUTH_SECRET` configured every request
//! is accepted anonymously; otherwise the token must equal the secret.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use crate::error::AppError;
use crate::AppState;

/// Authenticated caller extracted from the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthUser {
    Anonymous,
    Token,
}

impl AuthUser {
    pub fn is_anonymous(&self) -> bool {
        matches!(self, AuthUser::Anonymous)
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok());

        authorize(auth_header, state.config.auth_secret.as_deref())
    }
}

fn authorize(header: Option<&str>, secret: Option<&str>) -> Result<AuthUser, AppError> {
    let Some(secret) = secret else {
        return Ok(AuthUser::Anonymous);
    };

    let header = header.ok_or(AppError::Unauthorized("Missing authorization header"))?;
    let token = header
        .strip_prefix("Bearer ")
        .ok_or(AppError::Unauthorized("Invalid authorization header format"))?
        .trim();

    if token.is_empty() {
        return Err(AppError::Unauthorized("Empty bearer token"));
    }
    if token != secret {
        tracing::warn!("rejected request with an unknown bearer token");
        return Err(AppError::Unauthorized("Invalid bearer token"));
    }

    Ok(AuthUser::Token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_without_secret() {
        assert_eq!(authorize(None, None).unwrap(), AuthUser::Anonymous);
        assert_eq!(
            authorize(Some("Bearer anything"), None).unwrap(),
            AuthUser::Anonymous
        );
    }

    #[test]
    fn token_must_match_secret() {
        assert_eq!(
            authorize(Some("Bearer s3cret"), Some("s3cret")).unwrap(),
            AuthUser::Token
        );
        assert!(matches!(
            authorize(Some("Bearer nope"), Some("s3cret")),
            Err(AppError::Unauthorized("Invalid bearer token"))
        ));
    }

    #[test]
    fn malformed_headers_are_rejected() {
        assert!(matches!(
            authorize(None, Some("s3cret")),
            Err(AppError::Unauthorized("Missing authorization header"))
        ));
        assert!(matches!(
            authorize(Some("Basic abc"), Some("s3cret")),
            Err(AppError::Unauthorized("Invalid authorization header format"))
        ));
        assert!(matches!(
            authorize(Some("Bearer  "), Some("s3cret")),
            Err(AppError::Unauthorized("Empty bearer token"))
        ));
    }
}
