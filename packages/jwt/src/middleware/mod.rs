//! Tower middleware binding token validity to the scope a request runs in.
//!
//! Three layers share the same extraction and rejection machinery:
//!
//! * [`WithTokenLayer`] verifies the token against the scope already
//!   present in the request and never changes it.
//! * [`WithRunModeLayer`] computes the run mode, resolves its default
//!   store and lets a store code claim switch the request to another store.
//! * [`WithInitTokenAndStoreLayer`] asks a [`StoreService`](crate::StoreService)
//!   for the store named in the token when it differs from the active one.
//!
//! A verified token is inserted into the request extensions as
//! [`Token<C>`](crate::Token), together with the resolved
//! [`RequestScope`](crate::RequestScope).

mod extract;
mod extractors;
mod handler;
mod init_token_and_store;
mod run_mode;
mod with_token;

pub use extract::{TokenSource, BODY_LIMIT};
pub use extractors::{AuthToken, CurrentScope};
pub use handler::{default_unauthorized, default_unavailable, ErrorHandler, Handlers};
pub use init_token_and_store::{WithInitTokenAndStore, WithInitTokenAndStoreLayer};
pub use run_mode::{RunModeCalculator, WithRunMode, WithRunModeLayer};
pub use with_token::{WithToken, WithTokenLayer};

use axum::body::Body;
use axum::http::Request;
use tracing::debug;

use crate::claims::Claimer;
use crate::error::{Error, Result};
use crate::scope::Scope;
use crate::service::Service;
use crate::token::Token;

/// Extract and parse the request's token for `scope`.
///
/// Returns the request, rebuilt when its body had to be read, and the
/// verified token.
pub(crate) async fn authenticate<C: Claimer>(
    service: &Service<C>,
    source: &TokenSource,
    scope: Scope,
    req: Request<Body>,
) -> (Request<Body>, Result<Token<C>>) {
    let (req, raw) = extract::token(req, source).await;
    let Some(raw) = raw else {
        debug!(%scope, "request carries no token");
        return (req, Err(Error::not_found("token")));
    };
    let parsed = service.parse_scoped(scope, &raw).await;
    (req, parsed)
}
