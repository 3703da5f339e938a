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
use crate::scope::{RequestScope, RunMode, StoreFinder};
use crate::service::Service;

/// Decides the run mode of a request.
pub trait RunModeCalculator: Send + Sync {
    /// Run mode for `req`.
    fn calculate(&self, req: &Request<Body>) -> RunMode;
}

impl<F> RunModeCalculator for F
where
    F: Fn(&Request<Body>) -> RunMode + Send + Sync,
{
    fn calculate(&self, req: &Request<Body>) -> RunMode {
        self(req)
    }
}

impl RunModeCalculator for RunMode {
    fn calculate(&self, _req: &Request<Body>) -> RunMode {
        *self
    }
}

/// Layer resolving the request scope from the run mode and the token.
///
/// The run mode's default store decides which website policy verifies the
/// token. A store code claim naming another store switches the
/// [`RequestScope`] extension to that store; a code that cannot be resolved
/// rejects the request. With token checks disabled for the website the
/// default store's scope is set and the request passes unchanged.
pub struct WithRunModeLayer<C: Claimer = MapClaims> {
    service: Arc<Service<C>>,
    finder: Arc<dyn StoreFinder>,
    calculator: Arc<dyn RunModeCalculator>,
    source: TokenSource,
    handlers: Handlers,
}

impl<C: Claimer> Clone for WithRunModeLayer<C> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            finder: Arc::clone(&self.finder),
            calculator: Arc::clone(&self.calculator),
            source: self.source.clone(),
            handlers: self.handlers.clone(),
        }
    }
}

impl<C: Claimer> WithRunModeLayer<C> {
    /// Layer running every request in the default run mode.
    pub fn new(service: Arc<Service<C>>, finder: Arc<dyn StoreFinder>) -> Self {
        let source = TokenSource::from(service.settings());
        Self {
            service,
            finder,
            calculator: Arc::new(RunMode::default()),
            source,
            handlers: Handlers::default(),
        }
    }

    /// Compute the run mode per request.
    #[must_use]
    pub fn calculator(mut self, calculator: impl RunModeCalculator + 'static) -> Self {
        self.calculator = Arc::new(calculator);
        self
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
        let run_mode = self.calculator.calculate(&req);
        let (store_id, website_id) = self
            .finder
            .default_store_id(run_mode)
            .await
            .map_err(|err| self.handlers.fail(run_mode.0, &err))?;
        let mut rs = RequestScope::new(run_mode, store_id, website_id);
        let scope = rs.config_scope();

        let sc = self
            .service
            .config_by_scope(scope)
            .await
            .map_err(|err| self.handlers.fail(scope, &err))?;
        if sc.disabled {
            trace!(%scope, "token check disabled");
            let mut req = req;
            req.extensions_mut().insert(rs);
            return Ok(req);
        }

        let (mut req, parsed) = authenticate(&self.service, &self.source, scope, req).await;
        let token = parsed.map_err(|err| self.handlers.reject(scope, &err))?;

        if let Some(code) = token.claim_str(&sc.store_code_field_name) {
            let (sid, wid) = self
                .finder
                .store_id_by_code(run_mode, &code)
                .await
                .map_err(|err| self.handlers.store_lookup(scope, &err))?;
            if sid != rs.store_id {
                debug!(%run_mode, from = rs.store_id, to = sid, %code, "token switches store");
                rs = RequestScope::new(run_mode, sid, wid);
            }
        }

        req.extensions_mut().insert(rs);
        req.extensions_mut().insert(token);
        Ok(req)
    }
}

impl<S, C: Claimer> Layer<S> for WithRunModeLayer<C> {
    type Service = WithRunMode<S, C>;

    fn layer(&self, inner: S) -> Self::Service {
        WithRunMode {
            inner,
            layer: self.clone(),
        }
    }
}

/// Middleware produced by [`WithRunModeLayer`].
pub struct WithRunMode<S, C: Claimer = MapClaims> {
    inner: S,
    layer: WithRunModeLayer<C>,
}

impl<S: Clone, C: Claimer> Clone for WithRunMode<S, C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            layer: self.layer.clone(),
        }
    }
}

impl<S, C> TowerService<Request<Body>> for WithRunMode<S, C>
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
    use crate::config::ConfigUpdate;
    use crate::error::{self, Error};
    use crate::scope::{Scope, StoreMap};

    async fn scope_of(req: Request<Body>) -> Result<Response, Infallible> {
        let rs = req.extensions().get::<RequestScope>().copied();
        let text = rs.map_or_else(|| "none".to_owned(), |rs| format!("{}/{}", rs.store_id, rs.website_id));
        Ok(text.into_response())
    }

    fn stores() -> Arc<StoreMap> {
        Arc::new(
            StoreMap::new()
                .store("en", 1, 1)
                .store("de", 2, 1)
                .store("ch", 5, 2)
                .default_for(RunMode(Scope::Website(1)), 1, 1),
        )
    }

    fn service() -> Arc<Service<MapClaims>> {
        match Service::<MapClaims>::new() {
            Ok(s) => Arc::new(s),
            Err(e) => panic!("service: {e}"),
        }
    }

    async fn text(res: Response) -> String {
        let bytes = axum::body::to_bytes(res.into_body(), 1024).await.unwrap_or_default();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    fn layer(svc: &Arc<Service<MapClaims>>) -> WithRunModeLayer<MapClaims> {
        WithRunModeLayer::new(Arc::clone(svc), stores()).calculator(RunMode(Scope::Website(1)))
    }

    async fn token_for(svc: &Service<MapClaims>, store: &str) -> String {
        let claims: MapClaims = [("store", json!(store))].into_iter().collect();
        match svc.new_token(Scope::Website(1), &claims).await {
            Ok(t) => t.raw,
            Err(e) => panic!("sign: {e}"),
        }
    }

    fn bearer(raw: &str) -> Request<Body> {
        Request::builder()
            .header("authorization", format!("Bearer {raw}"))
            .body(Body::empty())
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn store_claim_switches_scope() {
        let svc = service();
        let raw = token_for(&svc, "de").await;
        let res = layer(&svc).layer(service_fn(scope_of)).oneshot(bearer(&raw)).await;
        let Ok(res) = res else { panic!("infallible") };
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(text(res).await, "2/1");
    }

    #[tokio::test]
    async fn same_store_keeps_scope() {
        let svc = service();
        let raw = token_for(&svc, "en").await;
        let res = layer(&svc).layer(service_fn(scope_of)).oneshot(bearer(&raw)).await;
        let Ok(res) = res else { panic!("infallible") };
        assert_eq!(text(res).await, "1/1");
    }

    #[tokio::test]
    async fn unknown_store_code_is_unauthorized() {
        let svc = service();
        let raw = token_for(&svc, "xx").await;
        let res = layer(&svc).layer(service_fn(scope_of)).oneshot(bearer(&raw)).await;
        assert_eq!(res.ok().map(|r| r.status()), Some(StatusCode::UNAUTHORIZED));
    }

    #[tokio::test]
    async fn missing_token_is_unauthorized() {
        let svc = service();
        let res = layer(&svc)
            .layer(service_fn(scope_of))
            .oneshot(Request::new(Body::empty()))
            .await;
        assert_eq!(res.ok().map(|r| r.status()), Some(StatusCode::UNAUTHORIZED));
    }

    #[tokio::test]
    async fn disabled_website_sets_default_store() {
        let svc = service();
        svc.update_scope(Scope::Website(1), ConfigUpdate::new().disabled(true)).ok();
        let res = layer(&svc)
            .layer(service_fn(scope_of))
            .oneshot(Request::new(Body::empty()))
            .await;
        let Ok(res) = res else { panic!("infallible") };
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(text(res).await, "1/1");
    }

    struct DownStoreBackend;

    #[async_trait]
    impl StoreFinder for DownStoreBackend {
        async fn default_store_id(&self, _run_mode: RunMode) -> error::Result<(i64, i64)> {
            Ok((1, 1))
        }

        async fn store_id_by_code(&self, _run_mode: RunMode, _code: &str) -> error::Result<(i64, i64)> {
            Err(Error::internal("store backend down"))
        }
    }

    #[tokio::test]
    async fn store_backend_failure_is_unavailable() {
        let svc = service();
        let raw = token_for(&svc, "de").await;
        let res = WithRunModeLayer::new(Arc::clone(&svc), Arc::new(DownStoreBackend))
            .calculator(RunMode(Scope::Website(1)))
            .layer(service_fn(scope_of))
            .oneshot(bearer(&raw))
            .await;
        assert_eq!(res.ok().map(|r| r.status()), Some(StatusCode::SERVICE_UNAVAILABLE));
    }

    #[tokio::test]
    async fn unknown_run_mode_is_unavailable() {
        let svc = service();
        let layer = layer(&svc).calculator(|_: &Request<Body>| RunMode(Scope::Website(9)));
        let res = layer.layer(service_fn(scope_of)).oneshot(Request::new(Body::empty())).await;
        assert_eq!(res.ok().map(|r| r.status()), Some(StatusCode::SERVICE_UNAVAILABLE));
    }
}
