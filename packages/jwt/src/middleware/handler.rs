use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::{error, warn};

use crate::error::{Error, ErrorKind};
use crate::scope::Scope;

/// Turns a failure into the response sent to the client.
pub type ErrorHandler = Arc<dyn Fn(&Error) -> Response + Send + Sync>;

fn canonical(status: StatusCode) -> Response {
    (status, status.canonical_reason().unwrap_or_default()).into_response()
}

/// `401 Unauthorized` with the standard reason phrase.
pub fn default_unauthorized(_err: &Error) -> Response {
    canonical(StatusCode::UNAUTHORIZED)
}

/// `503 Service Unavailable` with the standard reason phrase.
pub fn default_unavailable(_err: &Error) -> Response {
    canonical(StatusCode::SERVICE_UNAVAILABLE)
}

/// Rejection handlers of a layer.
///
/// Token failures go to the unauthorized handler of the request's scope,
/// falling back to the layer-wide one. Configuration and store lookup
/// failures go to the unavailable handler. Error details are logged, never
/// written to the response by the defaults.
#[derive(Clone)]
pub struct Handlers {
    unauthorized: ErrorHandler,
    unavailable: ErrorHandler,
    per_scope: HashMap<Scope, ErrorHandler>,
}

impl Default for Handlers {
    fn default() -> Self {
        Self {
            unauthorized: Arc::new(default_unauthorized),
            unavailable: Arc::new(default_unavailable),
            per_scope: HashMap::new(),
        }
    }
}

impl fmt::Debug for Handlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handlers")
            .field("per_scope", &self.per_scope.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Handlers {
    /// Default handlers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Layer-wide unauthorized handler.
    #[must_use]
    pub fn unauthorized<F>(mut self, f: F) -> Self
    where
        F: Fn(&Error) -> Response + Send + Sync + 'static,
    {
        self.unauthorized = Arc::new(f);
        self
    }

    /// Handler for configuration and lookup failures.
    #[must_use]
    pub fn unavailable<F>(mut self, f: F) -> Self
    where
        F: Fn(&Error) -> Response + Send + Sync + 'static,
    {
        self.unavailable = Arc::new(f);
        self
    }

    /// Unauthorized handler for requests running in `scope`.
    #[must_use]
    pub fn for_scope<F>(mut self, scope: Scope, f: F) -> Self
    where
        F: Fn(&Error) -> Response + Send + Sync + 'static,
    {
        self.per_scope.insert(scope, Arc::new(f));
        self
    }

    pub(crate) fn reject(&self, scope: Scope, err: &Error) -> Response {
        warn!(%scope, error = %err, "request unauthorized");
        let handler = self.per_scope.get(&scope).unwrap_or(&self.unauthorized);
        handler(err)
    }

    pub(crate) fn fail(&self, scope: Scope, err: &Error) -> Response {
        error!(%scope, error = %err, "token check unavailable");
        (self.unavailable)(err)
    }

    /// Store code lookups: a backend failure is unavailable, a code the
    /// backend refuses is unauthorized.
    pub(crate) fn store_lookup(&self, scope: Scope, err: &Error) -> Response {
        if err.is(ErrorKind::Internal) {
            self.fail(scope, err)
        } else {
            self.reject(scope, err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_use_canonical_statuses() {
        let h = Handlers::default();
        let res = h.reject(Scope::Default, &Error::SignatureInvalid);
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        let res = h.fail(Scope::Default, &Error::internal("boom"));
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn scope_override_wins() {
        let h = Handlers::default().for_scope(Scope::Website(2), |_| StatusCode::FORBIDDEN.into_response());
        assert_eq!(h.reject(Scope::Website(2), &Error::Revoked).status(), StatusCode::FORBIDDEN);
        assert_eq!(h.reject(Scope::Website(1), &Error::Revoked).status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn store_lookup_splits_refusal_from_outage() {
        let h = Handlers::default();
        let res = h.store_lookup(Scope::Website(1), &Error::not_found("store code \"xx\""));
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        let res = h.store_lookup(Scope::Website(1), &Error::internal("backend down"));
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
