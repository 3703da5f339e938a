use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use futures::future::BoxFuture;
use tower::{Layer, Service as TowerService};
use tracing::{debug, trace};

use super::{authenticate, Handlers, TokenSource};
use crate::claims::{Claimer, MapClaims};
use crate::error::Error;
use crate::scope::{ActiveStore, RequestScope, Scope, StoreService};
use crate::service::Service;

/// Layer initializing the token and the active store of a request.
///
/// Needs an [`ActiveStore`] extension set by an outer layer. The token is
/// verified with the policy of the active store's website. When its store
/// code claim names another store, the [`StoreService`] decides whether the
/// request may switch; the [`ActiveStore`] and [`RequestScope`] extensions
/// are replaced when it may, the request is rejected otherwise.
pub struct WithInitTokenAndStoreLayer<C: Claimer = MapClaims> {
    service: Arc<Service<C>>,
    stores: Arc<dyn StoreService>,
    source: TokenSource,
    handlers: Handlers,
}

impl<C: Claimer> Clone for WithInitTokenAndStoreLayer<C> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            stores: Arc::clone(&self.stores),
            source: self.source.clone(),
            handlers: self.handlers.clone(),
        }
    }
}

impl<C: Claimer> WithInitTokenAndStoreLayer<C> {
    /// Layer consulting `stores` for store switches.
    pub fn new(service: Arc<Service<C>>, stores: Arc<dyn StoreService>) -> Self {
        let source = TokenSource::from(service.settings());
        Self {
            service,
            stores,
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

    async fn resolve(&self, req: Request<Body>) -> Result<Request<Body>, Response> {
        let Some(active) = req.extensions().get::<ActiveStore>().cloned() else {
            return Err(self
                .handlers
                .fail(Scope::Default, &Error::not_found("active store in request")));
        };
        let run_mode = req
            .extensions()
            .get::<RequestScope>()
            .map(|rs| rs.run_mode)
            .unwrap_or_default();
        let scope = Scope::website(active.website_id);

        let sc = self
            .service
            .config_by_scope(scope)
            .await
            .map_err(|err| self.handlers.fail(scope, &err))?;
        if sc.disabled {
            trace!(%scope, "token check disabled");
            return Ok(req);
        }

        let (mut req, parsed) = authenticate(&self.service, &self.source, scope, req).await;
        let token = parsed.map_err(|err| self.handlers.reject(scope, &err))?;

        let mut current = active;
        if let Some(code) = token.claim_str(&sc.store_code_field_name) {
            if code != current.code {
                let requested = self
                    .stores
                    .requested_store(run_mode, &code)
                    .await
                    .map_err(|err| self.handlers.store_lookup(scope, &err))?;
                debug!(from = %current.code, to = %requested.code, "token switches store");
                current = requested;
            }
        }

        req.extensions_mut()
            .insert(RequestScope::new(run_mode, current.store_id, current.website_id));
        req.extensions_mut().insert(current);
        req.extensions_mut().insert(token);
        Ok(req)
    }
}

impl<S, C: Claimer> Layer<S> for WithInitTokenAndStoreLayer<C> {
    type Service = WithInitTokenAndStore<S, C>;

    fn layer(&self, inner: S) -> Self::Service {
        WithInitTokenAndStore {
            inner,
            layer: self.clone(),
        }
    }
}

/// Middleware produced by [`WithInitTokenAndStoreLayer`].
pub struct WithInitTokenAndStore<S, C: Claimer = MapClaims> {
    inner: S,
    layer: WithInitTokenAndStoreLayer<C>,
}

impl<S: Clone, C: Claimer> Clone for WithInitTokenAndStore<S, C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            layer: self.layer.clone(),
        }
    }
}

impl<S, C> TowerService<Request<Body>> for WithInitTokenAndStore<S, C>
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
            match layer.resolve(req).await {
                Ok(req) => inner.call(req).await,
                Err(rejected) => Ok(rejected),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use async_trait::async_trait;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use serde_json::json;
    use tower::{service_fn, ServiceExt};

    use super::*;
    use crate::error;
    use crate::scope::{RunMode, StoreMap};

    async fn active(req: Request<Body>) -> Result<Response, Infallible> {
        let text = req
            .extensions()
            .get::<ActiveStore>()
            .map_or_else(|| "none".to_owned(), |s| format!("{}:{}", s.code, s.store_id));
        Ok(text.into_response())
    }

    fn service() -> Arc<Service<MapClaims>> {
        match Service::<MapClaims>::new() {
            Ok(s) => Arc::new(s),
            Err(e) => panic!("service: {e}"),
        }
    }

    fn request(raw: &str, store: Option<ActiveStore>) -> Request<Body> {
        let mut req = Request::builder()
            .header("authorization", format!("Bearer {raw}"))
            .body(Body::empty())
            .unwrap_or_default();
        if let Some(store) = store {
            req.extensions_mut().insert(store);
        }
        req
    }

    fn en() -> ActiveStore {
        ActiveStore {
            store_id: 1,
            website_id: 1,
            code: "en".to_owned(),
        }
    }

    async fn text(res: Response) -> String {
        let bytes = axum::body::to_bytes(res.into_body(), 1024).await.unwrap_or_default();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    async fn signed(svc: &Service<MapClaims>, store: &str) -> String {
        let claims: MapClaims = [("store", json!(store))].into_iter().collect();
        match svc.new_token(Scope::Website(1), &claims).await {
            Ok(t) => t.raw,
            Err(e) => panic!("sign: {e}"),
        }
    }

    #[tokio::test]
    async fn requested_store_replaces_active_store() {
        let svc = service();
        let stores = Arc::new(StoreMap::new().store("en", 1, 1).store("de", 2, 1));
        let app = WithInitTokenAndStoreLayer::new(Arc::clone(&svc), stores).layer(service_fn(active));

        let raw = signed(&svc, "de").await;
        let Ok(res) = app.oneshot(request(&raw, Some(en()))).await else {
            panic!("infallible")
        };
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(text(res).await, "de:2");
    }

    #[tokio::test]
    async fn same_code_skips_store_service() {
        let svc = service();
        // An empty table would fail any lookup.
        let app = WithInitTokenAndStoreLayer::new(Arc::clone(&svc), Arc::new(StoreMap::new()))
            .layer(service_fn(active));

        let raw = signed(&svc, "en").await;
        let Ok(res) = app.oneshot(request(&raw, Some(en()))).await else {
            panic!("infallible")
        };
        assert_eq!(text(res).await, "en:1");
    }

    #[tokio::test]
    async fn refused_store_is_unauthorized() {
        let svc = service();
        let app = WithInitTokenAndStoreLayer::new(Arc::clone(&svc), Arc::new(StoreMap::new()))
            .layer(service_fn(active));

        let raw = signed(&svc, "de").await;
        let res = app.oneshot(request(&raw, Some(en()))).await;
        assert_eq!(res.ok().map(|r| r.status()), Some(StatusCode::UNAUTHORIZED));
    }

    struct DownStoreService;

    #[async_trait]
    impl StoreService for DownStoreService {
        async fn requested_store(&self, _run_mode: RunMode, _code: &str) -> error::Result<ActiveStore> {
            Err(Error::internal("store backend down"))
        }
    }

    #[tokio::test]
    async fn store_backend_failure_is_unavailable() {
        let svc = service();
        let app = WithInitTokenAndStoreLayer::new(Arc::clone(&svc), Arc::new(DownStoreService))
            .layer(service_fn(active));

        let raw = signed(&svc, "de").await;
        let res = app.oneshot(request(&raw, Some(en()))).await;
        assert_eq!(res.ok().map(|r| r.status()), Some(StatusCode::SERVICE_UNAVAILABLE));
    }

    #[tokio::test]
    async fn missing_active_store_is_unavailable() {
        let svc = service();
        let app = WithInitTokenAndStoreLayer::new(Arc::clone(&svc), Arc::new(StoreMap::new()))
            .layer(service_fn(active));

        let raw = signed(&svc, "en").await;
        let res = app.oneshot(request(&raw, None)).await;
        assert_eq!(res.ok().map(|r| r.status()), Some(StatusCode::SERVICE_UNAVAILABLE));
    }
}
