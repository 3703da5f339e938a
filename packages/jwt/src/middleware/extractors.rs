//! Handler extractors for what the token layers store in the request.
//!
//! ```ignore
//! async fn whoami(AuthToken(token): AuthToken) -> String {
//!     token.claim_str("sub").unwrap_or_default()
//! }
//! ```

use std::ops::Deref;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;

use crate::claims::{Claimer, MapClaims};
use crate::scope::RequestScope;
use crate::token::Token;

/// Verified token of the request.
///
/// Rejects with `401 Unauthorized` when no token layer ran or the scope had
/// token checks disabled.
#[derive(Debug, Clone)]
pub struct AuthToken<C: Claimer = MapClaims>(pub Token<C>);

impl<C: Claimer> Deref for AuthToken<C> {
    type Target = Token<C>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[async_trait]
impl<S, C> FromRequestParts<S> for AuthToken<C>
where
    S: Send + Sync,
    C: Claimer,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Token<C>>()
            .cloned()
            .map(Self)
            .ok_or(StatusCode::UNAUTHORIZED)
    }
}

/// Scope the request runs in, [`RequestScope::default`] when unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentScope(pub RequestScope);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentScope
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(
            parts
                .extensions
                .get::<RequestScope>()
                .copied()
                .unwrap_or_default(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use axum::http::Request;

    use super::*;

    #[tokio::test]
    async fn token_extractor_requires_extension() {
        let (mut parts, ()) = Request::new(()).into_parts();
        let res = AuthToken::<MapClaims>::from_request_parts(&mut parts, &()).await;
        assert_eq!(res.err(), Some(StatusCode::UNAUTHORIZED));

        parts.extensions.insert(Token::new(MapClaims::new()));
        let res = AuthToken::<MapClaims>::from_request_parts(&mut parts, &()).await;
        assert!(res.is_ok());
    }

    #[tokio::test]
    async fn scope_defaults_when_unset() {
        let (mut parts, ()) = Request::new(()).into_parts();
        let CurrentScope(rs) = CurrentScope::from_request_parts(&mut parts, &())
            .await
            .unwrap_or_else(|e| match e {});
        assert_eq!(rs, RequestScope::default());
    }
}
