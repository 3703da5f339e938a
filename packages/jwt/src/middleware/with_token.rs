use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use futures::future::BoxFuture;
use tower::{Layer, Service as TowerService};
use tracing::trace;

use super::{authenticate, Handlers, TokenSource};
use crate::claims::{Claimer, MapClaims};
use crate::scope::{RequestScope, Scope};
use crate::service::Service;

/// Layer verifying the token against the request's current scope.
///
/// The scope comes from a [`RequestScope`] extension set by an outer layer,
/// or [`Scope::Default`] without one. The verified token is stored as a
/// [`Token<C>`](crate::Token) extension.
pub struct WithTokenLayer<C: Claimer = MapClaims> {
    service: Arc<Service<C>>,
    source: TokenSource,
    handlers: Handlers,
}

impl<C: Claimer> Clone for WithTokenLayer<C> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            source: self.source.clone(),
            handlers: self.handlers.clone(),
        }
    }
}

impl<C: Claimer> WithTokenLayer<C> {
    /// Layer with token sources taken from the service settings.
    pub fn new(service: Arc<Service<C>>) -> Self {
        let source = TokenSource::from(service.settings());
        Self {
            service,
            source,
            handlers: Handlers::default(),
        }
    }

    /// Override the token sources.
    #[must_use]
    pub fn source(mut self, source: TokenSource) -> Self {
        self.source = source;
        self
    }

    /// Override the rejection handlers.
    #[must_use]
    pub fn handlers(mut self, handlers: Handlers) -> Self {
        self.handlers = handlers;
        self
    }
}

impl<S, C: Claimer> Layer<S> for WithTokenLayer<C> {
    type Service = WithToken<S, C>;

    fn layer(&self, inner: S) -> Self::Service {
        WithToken {
            inner,
            layer: self.clone(),
        }
    }
}

/// Middleware produced by [`WithTokenLayer`].
pub struct WithToken<S, C: Claimer = MapClaims> {
    inner: S,
    layer: WithTokenLayer<C>,
}

impl<S: Clone, C: Claimer> Clone for WithToken<S, C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            layer: self.layer.clone(),
        }
    }
}

impl<S, C> TowerService<Request<Body>> for WithToken<S, C>
where
    S: TowerService<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
    C: Claimer,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let layer = self.layer.clone();

        Box::pin(async move {
            let scope = req
                .extensions()
                .get::<RequestScope>()
                .map_or(Scope::Default, RequestScope::config_scope);
            let sc = match layer.service.config_by_scope(scope).await {
                Ok(sc) => sc,
                Err(err) => return Ok(layer.handlers.fail(scope, &err)),
            };
            if sc.disabled {
                trace!(%scope, "token check disabled");
                return inner.call(req).await;
            }

            let (mut req, parsed) = authenticate(&layer.service, &layer.source, scope, req).await;
            match parsed {
                Ok(token) => {
                    req.extensions_mut().insert(token);
                    inner.call(req).await
                }
                Err(err) => Ok(layer.handlers.reject(scope, &err)),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use serde_json::json;
    use tower::{service_fn, ServiceExt};

    use super::*;
    use crate::claims::MapClaims;
    use crate::config::ConfigUpdate;
    use crate::token::Token;

    async fn echo(req: Request<Body>) -> Result<Response, Infallible> {
        let sub = req
            .extensions()
            .get::<Token<MapClaims>>()
            .and_then(|t| t.claim_str("sub"))
            .unwrap_or_else(|| "anonymous".to_owned());
        Ok(sub.into_response())
    }

    fn service() -> Arc<Service<MapClaims>> {
        match Service::<MapClaims>::new() {
            Ok(s) => Arc::new(s),
            Err(e) => panic!("service: {e}"),
        }
    }

    fn bearer(token: &str) -> Request<Body> {
        Request::builder()
            .header("authorization", format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap_or_default()
    }

    async fn body(res: Response) -> String {
        let bytes = axum::body::to_bytes(res.into_body(), 1024).await.unwrap_or_default();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    #[tokio::test]
    async fn valid_token_reaches_handler() {
        let svc = service();
        let claims: MapClaims = [("sub", json!("alice"))].into_iter().collect();
        let token = match svc.new_token(Scope::Default, &claims).await {
            Ok(t) => t,
            Err(e) => panic!("sign: {e}"),
        };

        let app = WithTokenLayer::new(Arc::clone(&svc)).layer(service_fn(echo));
        let res = match app.oneshot(bearer(&token.raw)).await {
            Ok(r) => r,
            Err(e) => match e {},
        };
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body(res).await, "alice");
    }

    #[tokio::test]
    async fn missing_or_bad_token_is_unauthorized() {
        let svc = service();
        let app = WithTokenLayer::new(Arc::clone(&svc)).layer(service_fn(echo));

        let res = app.clone().oneshot(Request::new(Body::empty())).await;
        assert_eq!(res.ok().map(|r| r.status()), Some(StatusCode::UNAUTHORIZED));

        let res = app.oneshot(bearer("not.a.token")).await;
        assert_eq!(res.ok().map(|r| r.status()), Some(StatusCode::UNAUTHORIZED));
    }

    #[tokio::test]
    async fn disabled_scope_passes_through() {
        let svc = service();
        svc.update_scope(Scope::Website(4), ConfigUpdate::new().disabled(true)).ok();
        let app = WithTokenLayer::new(Arc::clone(&svc)).layer(service_fn(echo));

        let mut req = Request::new(Body::empty());
        req.extensions_mut()
            .insert(RequestScope::new(Default::default(), 9, 4));
        let res = match app.oneshot(req).await {
            Ok(r) => r,
            Err(e) => match e {},
        };
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body(res).await, "anonymous");
    }

    #[tokio::test]
    async fn token_from_other_scope_is_rejected() {
        let svc = service();
        let claims: MapClaims = [("sub", json!("alice"))].into_iter().collect();
        let Ok(token) = svc.new_token(Scope::Website(1), &claims).await else {
            panic!("sign failed");
        };
        svc.update_scope(Scope::Website(2), ConfigUpdate::new().key(crate::keys::Key::random_hmac(32))).ok();

        let app = WithTokenLayer::new(Arc::clone(&svc)).layer(service_fn(echo));
        let mut req = bearer(&token.raw);
        req.extensions_mut()
            .insert(RequestScope::new(Default::default(), 5, 2));
        let res = app.oneshot(req).await;
        assert_eq!(res.ok().map(|r| r.status()), Some(StatusCode::UNAUTHORIZED));
    }
}
