use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::scoped::{ConfigUpdate, DEFAULT_SIGNING_METHOD, DEFAULT_STORE_CODE_FIELD};
use crate::error::Result;
use crate::keys::{Key, REDACTED};

/// Environment variable prefix read by [`Settings::load`].
pub const ENV_PREFIX: &str = "SCOPEJWT";

/// Process-level defaults.
///
/// Loaded from an optional TOML file, then overridden by `SCOPEJWT_*`
/// environment variables, e.g. `SCOPEJWT_EXPIRE_SECONDS=900`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Token lifetime in seconds.
    pub expire_seconds: u64,
    /// Tolerated clock skew in seconds.
    pub skew_seconds: u64,
    /// Default signing method.
    pub signing_method: String,
    /// Shared HMAC secret for the default scope. A random one is generated
    /// when unset.
    pub hmac_password: Option<String>,
    /// Claim carrying the store code.
    pub store_code_field_name: String,
    /// Reject tokens presented a second time.
    pub single_token_usage: bool,
    /// Switch token checks off for the default scope.
    pub disabled: bool,
    /// Keep revoked tokens in memory instead of ignoring revocation.
    pub memory_blocklist: bool,
    /// Cookie consulted when no bearer token is sent.
    pub cookie_name: Option<String>,
    /// Form field consulted when neither header nor cookie carry a token.
    pub form_field_name: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            expire_seconds: super::DEFAULT_EXPIRE.as_secs(),
            skew_seconds: super::DEFAULT_SKEW.as_secs(),
            signing_method: DEFAULT_SIGNING_METHOD.to_owned(),
            hmac_password: None,
            store_code_field_name: DEFAULT_STORE_CODE_FIELD.to_owned(),
            single_token_usage: false,
            disabled: false,
            memory_blocklist: false,
            cookie_name: None,
            form_field_name: None,
        }
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("expire_seconds", &self.expire_seconds)
            .field("skew_seconds", &self.skew_seconds)
            .field("signing_method", &self.signing_method)
            .field("hmac_password", &self.hmac_password.as_ref().map(|_| REDACTED))
            .field("store_code_field_name", &self.store_code_field_name)
            .field("single_token_usage", &self.single_token_usage)
            .field("disabled", &self.disabled)
            .field("memory_blocklist", &self.memory_blocklist)
            .field("cookie_name", &self.cookie_name)
            .field("form_field_name", &self.form_field_name)
            .finish()
    }
}

impl Settings {
    /// Layer `path` (optional) and `SCOPEJWT_*` variables over the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path).required(false));
        }
        let settings: Self = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .ignore_empty(true),
            )
            .build()?
            .try_deserialize()?;
        debug!(?settings, "settings loaded");
        Ok(settings)
    }

    /// Token lifetime.
    #[must_use]
    pub fn expire(&self) -> Duration {
        Duration::from_secs(self.expire_seconds)
    }

    /// Clock skew.
    #[must_use]
    pub fn skew(&self) -> Duration {
        Duration::from_secs(self.skew_seconds)
    }

    /// Update turning these settings into the default scope's policy.
    #[must_use]
    pub fn default_update(&self) -> ConfigUpdate {
        let mut update = ConfigUpdate::new()
            .expiration(self.expire())
            .skew(self.skew())
            .signing_method(self.signing_method.clone())
            .store_code_field_name(self.store_code_field_name.clone())
            .single_token_usage(self.single_token_usage)
            .disabled(self.disabled);
        if let Some(password) = &self.hmac_password {
            update = update.key(Key::hmac(password.as_bytes().to_vec()));
        }
        update
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::algorithms::SignerRegistry;
    use crate::config::ScopedConfig;
    use crate::scope::Scope;

    #[test]
    fn defaults_match_scope_defaults() {
        let s = Settings::default();
        assert_eq!(s.expire(), crate::config::DEFAULT_EXPIRE);
        assert_eq!(s.skew(), crate::config::DEFAULT_SKEW);
        assert_eq!(s.signing_method, "HS256");
        assert!(!s.memory_blocklist);
    }

    #[test]
    fn loads_toml_file() {
        let path = std::env::temp_dir().join(format!("scopejwt-settings-{}.toml", std::process::id()));
        let written = std::fs::File::create(&path).and_then(|mut f| {
            f.write_all(b"expire_seconds = 60\nsigning_method = \"HS512\"\ncookie_name = \"jwt\"\n")
        });
        assert!(written.is_ok());

        let s = Settings::load(Some(&path));
        std::fs::remove_file(&path).ok();
        let s = match s {
            Ok(s) => s,
            Err(e) => panic!("{e}"),
        };
        assert_eq!(s.expire_seconds, 60);
        assert_eq!(s.signing_method, "HS512");
        assert_eq!(s.cookie_name.as_deref(), Some("jwt"));
        assert_eq!(s.skew_seconds, 120);
    }

    #[test]
    fn missing_file_keeps_defaults() {
        let s = Settings::load(Some(Path::new("/nonexistent/scopejwt.toml"))).ok();
        assert_eq!(s.map(|s| s.expire_seconds), Some(3600));
    }

    #[test]
    fn default_update_applies() {
        let s = Settings {
            signing_method: "HS384".into(),
            hmac_password: Some("hunter2".into()),
            single_token_usage: true,
            ..Settings::default()
        };
        assert!(!format!("{s:?}").contains("hunter2"));
        let sc = ScopedConfig::new(Scope::Default).apply(s.default_update(), &SignerRegistry::with_defaults());
        assert!(sc.is_valid().is_ok());
        assert_eq!(sc.signer.alg(), "HS384");
        assert!(sc.single_token_usage);
    }
}
