//! Error taxonomy shared by the codec, signers, configuration cache,
//! service and middleware.

use std::fmt;

use crate::claims::ValidationErrors;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Behavioral error kinds.
///
/// Wrapped errors report the kind of their innermost cause, so callers can
/// branch on a kind without unwinding [`Error::Context`] layers themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Wrong segment count, undecodable base64 or payload.
    Malformed,
    /// Signature verification mismatch.
    SignatureInvalid,
    /// `exp` lies in the past.
    Expired,
    /// `nbf` or `iat` lies in the future.
    NotYetValid,
    /// No usable key or algorithm match.
    Unverifiable,
    /// Missing configuration, store code or token.
    NotFound,
    /// Incomplete configuration, bad claim values.
    NotValid,
    /// Unknown algorithm or unsupported scope granularity.
    NotSupported,
    /// Operation has no implementation for this input.
    NotImplemented,
    /// Claim merge collision.
    AlreadyExists,
    /// Token is on the blocklist.
    Revoked,
    /// Everything else.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Malformed => "malformed",
            ErrorKind::SignatureInvalid => "signature invalid",
            ErrorKind::Expired => "expired",
            ErrorKind::NotYetValid => "not yet valid",
            ErrorKind::Unverifiable => "unverifiable",
            ErrorKind::NotFound => "not found",
            ErrorKind::NotValid => "not valid",
            ErrorKind::NotSupported => "not supported",
            ErrorKind::NotImplemented => "not implemented",
            ErrorKind::AlreadyExists => "already exists",
            ErrorKind::Revoked => "revoked",
            ErrorKind::Internal => "internal",
        };
        f.write_str(name)
    }
}

/// Crate error type.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Structural decoding failure.
    #[error("malformed token: {0}")]
    Malformed(String),

    /// Signature did not match the signing input.
    #[error("token signature is invalid")]
    SignatureInvalid,

    /// One or more time or string claims were violated.
    #[error("token claims are invalid: {0}")]
    Validation(ValidationErrors),

    /// No key or algorithm is usable to verify the token.
    #[error("token is unverifiable: {0}")]
    Unverifiable(String),

    /// Something looked up does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// Something exists but cannot be used.
    #[error("{0} is not valid")]
    NotValid(String),

    /// Requested variant is not supported.
    #[error("{0} is not supported")]
    NotSupported(String),

    /// Requested operation has no implementation.
    #[error("{0} is not implemented")]
    NotImplemented(String),

    /// Key collision while merging claims.
    #[error("claim {0:?} already exists")]
    AlreadyExists(String),

    /// Token was revoked before its natural expiry.
    #[error("token has been revoked")]
    Revoked,

    /// Unexpected internal failure.
    #[error("internal error: {0}")]
    Internal(String),

    /// An error annotated with the name of the step that failed.
    #[error("{step}: {source}")]
    Context {
        /// Failing step.
        step: &'static str,
        /// Underlying error.
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Behavioral kind of the innermost error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Malformed(_) => ErrorKind::Malformed,
            Error::SignatureInvalid => ErrorKind::SignatureInvalid,
            Error::Validation(errs) => errs.kind(),
            Error::Unverifiable(_) => ErrorKind::Unverifiable,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::NotValid(_) => ErrorKind::NotValid,
            Error::NotSupported(_) => ErrorKind::NotSupported,
            Error::NotImplemented(_) => ErrorKind::NotImplemented,
            Error::AlreadyExists(_) => ErrorKind::AlreadyExists,
            Error::Revoked => ErrorKind::Revoked,
            Error::Internal(_) => ErrorKind::Internal,
            Error::Context { source, .. } => source.kind(),
        }
    }

    /// Returns true when the innermost error is of `kind`.
    #[inline]
    #[must_use]
    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind() == kind
    }

    /// Wrap the error with the name of the failing step.
    #[must_use]
    pub fn with_step(self, step: &'static str) -> Self {
        Error::Context {
            step,
            source: Box::new(self),
        }
    }

    /// Innermost error without step annotations.
    #[must_use]
    pub fn root(&self) -> &Error {
        match self {
            Error::Context { source, .. } => source.root(),
            other => other,
        }
    }

    /// Create a malformed-token error
    #[inline]
    #[must_use]
    pub fn malformed(msg: impl Into<String>) -> Self {
        Error::Malformed(msg.into())
    }

    /// Create an unverifiable-token error
    #[inline]
    #[must_use]
    pub fn unverifiable(msg: impl Into<String>) -> Self {
        Error::Unverifiable(msg.into())
    }

    /// Create a not-found error
    #[inline]
    #[must_use]
    pub fn not_found(what: impl Into<String>) -> Self {
        Error::NotFound(what.into())
    }

    /// Create a not-valid error
    #[inline]
    #[must_use]
    pub fn not_valid(what: impl Into<String>) -> Self {
        Error::NotValid(what.into())
    }

    /// Create a not-supported error
    #[inline]
    #[must_use]
    pub fn not_supported(what: impl Into<String>) -> Self {
        Error::NotSupported(what.into())
    }

    /// Create an internal error
    #[inline]
    #[must_use]
    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }
}

/// Attach a step name to the error of a `Result`.
pub trait ResultExt<T> {
    /// Wrap a failure with the name of the step that produced it.
    fn step(self, step: &'static str) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    #[inline]
    fn step(self, step: &'static str) -> Result<T> {
        self.map_err(|e| e.with_step(step))
    }
}

impl From<::config::ConfigError> for Error {
    fn from(err: ::config::ConfigError) -> Self {
        match err {
            ::config::ConfigError::NotFound(path) => Error::NotFound(path),
            other => Error::NotValid(format!("settings ({other})")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_sees_through_context() {
        let err = Error::SignatureInvalid
            .with_step("verify")
            .with_step("parse");
        assert_eq!(err.kind(), ErrorKind::SignatureInvalid);
        assert!(err.is(ErrorKind::SignatureInvalid));
        assert!(matches!(err.root(), Error::SignatureInvalid));
        assert_eq!(err.to_string(), "parse: verify: token signature is invalid");
    }

    #[test]
    fn result_ext_wraps_errors_only() {
        let ok: Result<u8> = Ok(1);
        assert_eq!(ok.step("noop").ok(), Some(1));

        let failed: Result<u8> = Err(Error::not_found("scope"));
        let err = failed.step("load").err();
        assert!(matches!(
            err,
            Some(Error::Context { step: "load", .. })
        ));
    }
}
