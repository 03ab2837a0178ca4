//! Request extractors: who is calling, and whether they may.

use async_trait::async_trait;
use axum::extract::{FromRequest, FromRequestParts};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use secrecy::ExposeSecret;
use tower_sessions::Session;

use super::error::ApiError;
use super::AppState;
use crate::domain::value_objects::{AccountId, SessionToken};
use crate::services::RequesterState;
use crate::store::{Store, StoreError};
use crate::EcommerceError;

/// JSON request body whose parse failures come back as `validation_error`.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct JsonBody<T>(pub T);

/// Session key holding the guest cart token.
pub const CART_TOKEN_KEY: &str = "cart_token";

fn session_error(e: tower_sessions::session::Error) -> StoreError { StoreError::Session(e.to_string()) }

/// The caller: an optional gateway-authenticated account plus the cookie session.
#[derive(Clone)]
pub struct Requester {
    account: Option<AccountId>,
    session: Session,
}

#[async_trait]
impl RequesterState for Requester {
    fn account(&self) -> Option<AccountId> { self.account }

    async fn cart_token(&self) -> Result<Option<SessionToken>, StoreError> {
        let Some(raw) = self.session.get::<String>(CART_TOKEN_KEY).await.map_err(session_error)? else {
            return Ok(None);
        };
        match SessionToken::parse(raw) {
            Ok(token) => Ok(Some(token)),
            Err(e) => {
                tracing::warn!(error = %e, "discarding malformed cart token");
                Ok(None)
            }
        }
    }

    async fn remember_cart_token(&self, token: &SessionToken) -> Result<(), StoreError> {
        self.session.insert(CART_TOKEN_KEY, token.as_str()).await.map_err(session_error)?;
        self.session.save().await.map_err(session_error)
    }

    async fn forget_cart_token(&self) -> Result<(), StoreError> {
        self.session.remove::<String>(CART_TOKEN_KEY).await.map_err(session_error)?;
        self.session.save().await.map_err(session_error)
    }
}

#[async_trait]
impl<S: Store> FromRequestParts<AppState<S>> for Requester {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState<S>) -> Result<Self, Self::Rejection> {
        let session = parts.extensions.get::<Session>().cloned().ok_or_else(|| {
            ApiError::Domain(EcommerceError::Storage(StoreError::Session("session layer not installed".to_string())))
        })?;

        let account = match parts.headers.get(&state.account_header) {
            None => None,
            Some(value) => {
                let id = value
                    .to_str()
                    .ok()
                    .and_then(|v| v.trim().parse::<i64>().ok())
                    .filter(|id| *id > 0)
                    .ok_or(ApiError::Unauthorized)?;
                Some(AccountId::new(id))
            }
        };

        Ok(Self { account, session })
    }
}

/// A requester that must be signed in.
pub struct SignedIn {
    pub account: AccountId,
    pub requester: Requester,
}

#[async_trait]
impl<S: Store> FromRequestParts<AppState<S>> for SignedIn {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState<S>) -> Result<Self, Self::Rejection> {
        let requester = Requester::from_request_parts(parts, state).await?;
        let account = requester.account.ok_or(ApiError::Unauthorized)?;
        Ok(Self { account, requester })
    }
}

/// Bearer-token guard for `/api/v1/admin`.
pub struct Admin;

#[async_trait]
impl<S: Store> FromRequestParts<AppState<S>> for Admin {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState<S>) -> Result<Self, Self::Rejection> {
        let Some(expected) = &state.admin_token else {
            return Err(ApiError::Forbidden);
        };
        let presented = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or(ApiError::Unauthorized)?;

        if constant_time_eq(presented.trim().as_bytes(), expected.expose_secret().as_bytes()) {
            Ok(Admin)
        } else {
            tracing::warn!(path = %parts.uri.path(), "rejected admin token");
            Err(ApiError::Forbidden)
        }
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
    }
}
