//! Time-based and string claim validation.
//!
//! Checks run in a fixed order (`exp`, `iat`, `nbf`, then `aud`/`iss` when
//! required) and every violation is collected, so callers see the complete
//! picture in one [`ValidationErrors`] instead of the first failure only.

use std::fmt;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use subtle::ConstantTimeEq;

use crate::error::ErrorKind;

/// Inputs for claim validation.
#[derive(Debug, Clone)]
pub struct Validation {
    /// Current unix time in seconds.
    pub now: i64,
    /// Clock skew tolerated on every time comparison.
    pub skew: Duration,
    /// Required audience, compared in constant time.
    pub audience: Option<String>,
    /// Required issuer, compared in constant time.
    pub issuer: Option<String>,
}

impl Default for Validation {
    fn default() -> Self {
        Self {
            now: Utc::now().timestamp(),
            skew: Duration::ZERO,
            audience: None,
            issuer: None,
        }
    }
}

impl Validation {
    /// Validation at the current time with the given skew.
    #[must_use]
    pub fn with_skew(skew: Duration) -> Self {
        Self {
            skew,
            ..Self::default()
        }
    }

    /// Pin the reference time.
    #[must_use]
    pub fn at(mut self, now: i64) -> Self {
        self.now = now;
        self
    }

    /// Require `aud` to equal `audience`.
    #[must_use]
    pub fn require_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    /// Require `iss` to equal `issuer`.
    #[must_use]
    pub fn require_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    fn skew_secs(&self) -> i64 {
        i64::try_from(self.skew.as_secs()).unwrap_or(i64::MAX)
    }
}

/// A single violated claim condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimViolation {
    /// `exp` is before now.
    Expired {
        /// Expiry claim.
        exp: i64,
        /// Reference time.
        now: i64,
    },
    /// `iat` is after now.
    IssuedInFuture {
        /// Issued-at claim.
        iat: i64,
        /// Reference time.
        now: i64,
    },
    /// `nbf` is after now.
    NotYetValid {
        /// Not-before claim.
        nbf: i64,
        /// Reference time.
        now: i64,
    },
    /// A time claim is present but not an integer.
    NotANumber(&'static str),
    /// `aud` did not match.
    AudienceMismatch,
    /// `iss` did not match.
    IssuerMismatch,
}

impl ClaimViolation {
    /// Error kind this violation maps to.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClaimViolation::Expired { .. } => ErrorKind::Expired,
            ClaimViolation::IssuedInFuture { .. } | ClaimViolation::NotYetValid { .. } => {
                ErrorKind::NotYetValid
            }
            ClaimViolation::NotANumber(_)
            | ClaimViolation::AudienceMismatch
            | ClaimViolation::IssuerMismatch => ErrorKind::NotValid,
        }
    }
}

impl fmt::Display for ClaimViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClaimViolation::Expired { exp, now } => {
                write!(f, "token expired {}s ago", now - exp)
            }
            ClaimViolation::IssuedInFuture { iat, now } => {
                write!(f, "token used before issued ({}s early)", iat - now)
            }
            ClaimViolation::NotYetValid { nbf, now } => {
                write!(f, "token not valid for another {}s", nbf - now)
            }
            ClaimViolation::NotANumber(claim) => write!(f, "claim {claim} is not a number"),
            ClaimViolation::AudienceMismatch => f.write_str("audience mismatch"),
            ClaimViolation::IssuerMismatch => f.write_str("issuer mismatch"),
        }
    }
}

/// Composite validation error listing every violated condition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    violations: Vec<ClaimViolation>,
}

impl ValidationErrors {
    /// Violated conditions in check order.
    #[must_use]
    pub fn violations(&self) -> &[ClaimViolation] {
        &self.violations
    }

    /// True when no condition was violated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    /// Whether a violation of `kind` was recorded.
    #[must_use]
    pub fn has(&self, kind: ErrorKind) -> bool {
        self.violations.iter().any(|v| v.kind() == kind)
    }

    /// Kind of the first violation.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.violations
            .first()
            .map_or(ErrorKind::NotValid, ClaimViolation::kind)
    }

    fn push(&mut self, violation: ClaimViolation) {
        self.violations.push(violation);
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, v) in self.violations.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{v}")?;
        }
        Ok(())
    }
}

/// Compare two byte strings in constant time.
#[inline]
#[must_use]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

fn time_claim(
    value: Option<Value>,
    name: &'static str,
    errs: &mut ValidationErrors,
) -> Option<i64> {
    match value {
        None | Some(Value::Null) => None,
        Some(v) => match v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)) {
            Some(n) => Some(n),
            None => {
                errs.push(ClaimViolation::NotANumber(name));
                None
            }
        },
    }
}

fn audience_matches(aud: Option<Value>, expected: &str) -> bool {
    match aud {
        Some(Value::String(aud)) => constant_time_eq(aud.as_bytes(), expected.as_bytes()),
        Some(Value::Array(list)) => list.iter().any(|a| {
            a.as_str()
                .is_some_and(|a| constant_time_eq(a.as_bytes(), expected.as_bytes()))
        }),
        _ => false,
    }
}

/// Validate registered claims read through `get`.
///
/// Absent optional claims count as satisfied.
pub(crate) fn validate_with<F>(get: F, v: &Validation) -> Result<(), ValidationErrors>
where
    F: Fn(&str) -> Option<Value>,
{
    let mut errs = ValidationErrors::default();
    let skew = v.skew_secs();

    if let Some(exp) = time_claim(get("exp"), "exp", &mut errs) {
        if v.now > exp.saturating_add(skew) {
            errs.push(ClaimViolation::Expired { exp, now: v.now });
        }
    }
    if let Some(iat) = time_claim(get("iat"), "iat", &mut errs) {
        if v.now < iat.saturating_sub(skew) {
            errs.push(ClaimViolation::IssuedInFuture { iat, now: v.now });
        }
    }
    if let Some(nbf) = time_claim(get("nbf"), "nbf", &mut errs) {
        if v.now < nbf.saturating_sub(skew) {
            errs.push(ClaimViolation::NotYetValid { nbf, now: v.now });
        }
    }
    if let Some(expected) = &v.audience {
        if !audience_matches(get("aud"), expected) {
            errs.push(ClaimViolation::AudienceMismatch);
        }
    }
    if let Some(expected) = &v.issuer {
        let matches = get("iss")
            .as_ref()
            .and_then(Value::as_str)
            .is_some_and(|iss| constant_time_eq(iss.as_bytes(), expected.as_bytes()));
        if !matches {
            errs.push(ClaimViolation::IssuerMismatch);
        }
    }

    if errs.is_empty() {
        Ok(())
    } else {
        Err(errs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn getter(map: HashMap<&'static str, Value>) -> impl Fn(&str) -> Option<Value> {
        move |k| map.get(k).cloned()
    }

    #[test]
    fn absent_claims_are_satisfied() {
        let v = Validation::default().at(1_000);
        assert!(validate_with(getter(HashMap::new()), &v).is_ok());
    }

    #[test]
    fn expired_token_is_rejected() {
        let v = Validation::default().at(1_000);
        let errs = validate_with(getter(HashMap::from([("exp", json!(999))])), &v)
            .err()
            .unwrap_or_default();
        assert_eq!(errs.kind(), ErrorKind::Expired);
        assert_eq!(errs.violations().len(), 1);
    }

    #[test]
    fn skew_extends_validity() {
        let v = Validation::with_skew(Duration::from_secs(10)).at(1_005);
        assert!(validate_with(getter(HashMap::from([("exp", json!(1_000))])), &v).is_ok());
        assert!(validate_with(getter(HashMap::from([("nbf", json!(1_010))])), &v).is_ok());
    }

    #[test]
    fn violations_accumulate_in_check_order() {
        let v = Validation::default().at(1_000);
        let claims = HashMap::from([
            ("exp", json!(500)),
            ("iat", json!(2_000)),
            ("nbf", json!(3_000)),
        ]);
        let errs = validate_with(getter(claims), &v).err().unwrap_or_default();
        assert_eq!(
            errs.violations(),
            &[
                ClaimViolation::Expired { exp: 500, now: 1_000 },
                ClaimViolation::IssuedInFuture { iat: 2_000, now: 1_000 },
                ClaimViolation::NotYetValid { nbf: 3_000, now: 1_000 },
            ]
        );
        assert!(errs.has(ErrorKind::NotYetValid));
    }

    #[test]
    fn audience_and_issuer_only_checked_when_required() {
        let claims = HashMap::from([("aud", json!(["web", "api"])), ("iss", json!("shop"))]);
        let lax = Validation::default();
        assert!(validate_with(getter(claims.clone()), &lax).is_ok());

        let strict = Validation::default()
            .require_audience("api")
            .require_issuer("shop");
        assert!(validate_with(getter(claims.clone()), &strict).is_ok());

        let wrong = Validation::default().require_issuer("other");
        let errs = validate_with(getter(claims), &wrong).err().unwrap_or_default();
        assert_eq!(errs.violations(), &[ClaimViolation::IssuerMismatch]);
    }

    #[test]
    fn constant_time_eq_handles_length_mismatch() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
        assert!(!constant_time_eq(b"abc", b"abd"));
    }
}
