use std::collections::HashMap;

use axum::body::{to_bytes, Body, Bytes};
use axum::extract::{FromRequest, Multipart};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE, COOKIE};
use axum::http::request::Parts;
use axum::http::{HeaderMap, Method, Request};
use axum::Form;
use tracing::debug;

use crate::config::Settings;

/// Largest request body read while looking for a token form field.
pub const BODY_LIMIT: usize = 2 * 1024 * 1024;

const BEARER: &str = "bearer ";

/// Where a token may be found besides the `Authorization` header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenSource {
    /// Cookie consulted after the header.
    pub cookie: Option<String>,
    /// Form field consulted last, url-encoded or multipart.
    pub form_field: Option<String>,
}

impl TokenSource {
    /// Only the `Authorization: Bearer` header.
    #[must_use]
    pub fn header_only() -> Self {
        Self::default()
    }

    /// Also read the cookie `name`.
    #[must_use]
    pub fn cookie(mut self, name: impl Into<String>) -> Self {
        self.cookie = Some(name.into());
        self
    }

    /// Also read the form field `name`.
    #[must_use]
    pub fn form_field(mut self, name: impl Into<String>) -> Self {
        self.form_field = Some(name.into());
        self
    }
}

impl From<&Settings> for TokenSource {
    fn from(settings: &Settings) -> Self {
        Self {
            cookie: settings.cookie_name.clone(),
            form_field: settings.form_field_name.clone(),
        }
    }
}

fn from_header(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let prefix = value.get(..BEARER.len())?;
    if !prefix.eq_ignore_ascii_case(BEARER) {
        return None;
    }
    let token = value[BEARER.len()..].trim();
    (!token.is_empty()).then(|| token.to_owned())
}

fn from_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, v)| *k == name && !v.is_empty())
        .map(|(_, v)| v.to_owned())
}

enum FormKind {
    UrlEncoded,
    Multipart,
}

fn form_kind(parts: &Parts) -> Option<FormKind> {
    if !matches!(parts.method, Method::POST | Method::PUT | Method::PATCH) {
        return None;
    }
    let ct = parts.headers.get(CONTENT_TYPE)?.to_str().ok()?;
    let mime = ct.split(';').next().unwrap_or_default().trim();
    if mime.eq_ignore_ascii_case("application/x-www-form-urlencoded") {
        Some(FormKind::UrlEncoded)
    } else if mime.eq_ignore_ascii_case("multipart/form-data") {
        Some(FormKind::Multipart)
    } else {
        None
    }
}

/// Request carrying only what the form extractors need.
fn replay(parts: &Parts, body: Bytes) -> Request<Body> {
    let mut req = Request::new(Body::from(body));
    *req.method_mut() = parts.method.clone();
    *req.uri_mut() = parts.uri.clone();
    if let Some(ct) = parts.headers.get(CONTENT_TYPE) {
        req.headers_mut().insert(CONTENT_TYPE, ct.clone());
    }
    req
}

async fn from_form(parts: &Parts, body: Bytes, kind: FormKind, field: &str) -> Option<String> {
    let req = replay(parts, body);
    match kind {
        FormKind::UrlEncoded => {
            let Form(fields) = Form::<HashMap<String, String>>::from_request(req, &())
                .await
                .ok()?;
            fields.get(field).filter(|v| !v.is_empty()).cloned()
        }
        FormKind::Multipart => {
            let mut multipart = Multipart::from_request(req, &()).await.ok()?;
            while let Ok(Some(f)) = multipart.next_field().await {
                if f.name() == Some(field) {
                    return f.text().await.ok().filter(|v| !v.is_empty());
                }
            }
            None
        }
    }
}

/// Find the raw token of `req`.
///
/// The bearer header wins over the cookie, the cookie over a form field.
/// Reading a form buffers the body; the returned request carries the same
/// bytes so handlers can read it again.
pub(crate) async fn token(req: Request<Body>, source: &TokenSource) -> (Request<Body>, Option<String>) {
    if let Some(t) = from_header(req.headers()) {
        return (req, Some(t));
    }
    if let Some(t) = source.cookie.as_deref().and_then(|c| from_cookie(req.headers(), c)) {
        return (req, Some(t));
    }
    let Some(field) = source.form_field.as_deref() else {
        return (req, None);
    };
    let (parts, body) = req.into_parts();
    let Some(kind) = form_kind(&parts) else {
        return (Request::from_parts(parts, body), None);
    };
    let bytes = match to_bytes(body, BODY_LIMIT).await {
        Ok(b) => b,
        Err(err) => {
            debug!(error = %err, "request body unreadable");
            return (Request::from_parts(parts, Body::empty()), None);
        }
    };
    let found = from_form(&parts, bytes.clone(), kind, field).await;
    (Request::from_parts(parts, Body::from(bytes)), found)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get(headers: &[(&str, &str)]) -> Request<Body> {
        let mut b = Request::builder().uri("/");
        for (k, v) in headers {
            b = b.header(*k, *v);
        }
        b.body(Body::empty()).unwrap_or_default()
    }

    fn post(ct: &str, body: &'static str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/")
            .header(CONTENT_TYPE, ct)
            .body(Body::from(body))
            .unwrap_or_default()
    }

    fn all() -> TokenSource {
        TokenSource::header_only().cookie("jwt").form_field("access_token")
    }

    #[tokio::test]
    async fn bearer_header_wins() {
        let req = get(&[("authorization", "Bearer a.b.c"), ("cookie", "jwt=x.y.z")]);
        let (_, t) = token(req, &all()).await;
        assert_eq!(t.as_deref(), Some("a.b.c"));
    }

    #[tokio::test]
    async fn scheme_is_case_insensitive() {
        let (_, t) = token(get(&[("authorization", "bEaReR a.b.c")]), &all()).await;
        assert_eq!(t.as_deref(), Some("a.b.c"));
        let (_, t) = token(get(&[("authorization", "Basic dXNlcg==")]), &TokenSource::default()).await;
        assert_eq!(t, None);
    }

    #[tokio::test]
    async fn cookie_when_header_is_absent() {
        let req = get(&[("cookie", "theme=dark; jwt=x.y.z")]);
        let (_, t) = token(req, &all()).await;
        assert_eq!(t.as_deref(), Some("x.y.z"));

        let req = get(&[("cookie", "jwt=x.y.z")]);
        let (_, t) = token(req, &TokenSource::header_only()).await;
        assert_eq!(t, None);
    }

    #[tokio::test]
    async fn urlencoded_form_field_keeps_body() {
        let req = post("application/x-www-form-urlencoded", "q=1&access_token=f.g.h");
        let (req, t) = token(req, &all()).await;
        assert_eq!(t.as_deref(), Some("f.g.h"));
        let body = to_bytes(req.into_body(), BODY_LIMIT).await.unwrap_or_default();
        assert_eq!(&body[..], b"q=1&access_token=f.g.h");
    }

    #[tokio::test]
    async fn multipart_form_field() {
        let body = "--XX\r\n\
            Content-Disposition: form-data; name=\"note\"\r\n\r\n\
            hi\r\n\
            --XX\r\n\
            Content-Disposition: form-data; name=\"access_token\"\r\n\r\n\
            m.n.o\r\n\
            --XX--\r\n";
        let req = post("multipart/form-data; boundary=XX", body);
        let (_, t) = token(req, &all()).await;
        assert_eq!(t.as_deref(), Some("m.n.o"));
    }

    #[tokio::test]
    async fn json_body_is_not_searched() {
        let req = post("application/json", r#"{"access_token":"f.g.h"}"#);
        let (_, t) = token(req, &all()).await;
        assert_eq!(t, None);
    }
}
