//! Credential cache location.
//!
//! Kerberos keeps tickets in a credential cache named by a `<type>:<residual>`
//! string. The location is derived once per authentication attempt from a
//! [`CacheEnvironment`], which is read from the process by the caller so the
//! resolver itself never touches global state.

use std::fmt;
use std::path::PathBuf;

use crate::error::AuthError;

/// Environment variable overriding the credential cache location.
pub const CCACHE_ENV_VAR: &str = "KRB5CCNAME";

/// Scheme of file-backed credential caches.
const FILE_SCHEME: &str = "FILE:";

/// Process state the credential cache location is derived from.
#[derive(Debug, Clone)]
pub struct CacheEnvironment {
    /// Value of `KRB5CCNAME`, if set.
    pub ccache_override: Option<String>,
    /// Current user id, on platforms that have one.
    pub uid: Option<u32>,
    /// Temporary directory used on platforms without user ids.
    pub temp_dir: PathBuf,
}

impl CacheEnvironment {
    /// Capture the environment of the current process.
    #[must_use]
    pub fn from_process() -> Self {
        Self {
            ccache_override: std::env::var(CCACHE_ENV_VAR).ok(),
            uid: current_uid(),
            temp_dir: std::env::temp_dir(),
        }
    }

    /// Environment with no override, for a user with the given id.
    #[must_use]
    pub fn for_uid(uid: u32) -> Self {
        Self {
            ccache_override: None,
            uid: Some(uid),
            temp_dir: PathBuf::from("/tmp"),
        }
    }

    /// Set the cache override value.
    #[must_use]
    pub fn with_override(mut self, value: impl Into<String>) -> Self {
        self.ccache_override = Some(value.into());
        self
    }

    /// Set the temporary directory.
    #[must_use]
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = dir.into();
        self
    }
}

#[cfg(unix)]
fn current_uid() -> Option<u32> {
    Some(nix::unistd::getuid().as_raw())
}

#[cfg(not(unix))]
fn current_uid() -> Option<u32> {
    None
}

/// A file-backed credential cache, rendered as `FILE:<path>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheLocation {
    path: String,
}

impl CacheLocation {
    /// Derive the cache location from the environment.
    ///
    /// An override wins over the platform default; an override that is set
    /// but empty is a configuration error rather than a silent fallback.
    pub fn resolve(env: &CacheEnvironment) -> Result<Self, AuthError> {
        let path = match env.ccache_override.as_deref() {
            Some("") => {
                return Err(AuthError::Configuration(format!(
                    "the '{CCACHE_ENV_VAR}' environment variable is set to empty"
                )));
            }
            Some(value) => {
                let path = value.strip_prefix(FILE_SCHEME).unwrap_or(value);
                if path.is_empty() {
                    return Err(AuthError::Configuration(format!(
                        "the '{CCACHE_ENV_VAR}' environment variable names no file"
                    )));
                }
                path.to_string()
            }
            None => match env.uid {
                Some(uid) => format!("/tmp/krb5cc_{uid}"),
                None => env.temp_dir.join("krb5cc").to_string_lossy().into_owned(),
            },
        };

        let location = Self { path };
        tracing::debug!(ccache = %location, "using krb5 ccache");
        Ok(location)
    }

    /// Get the file path without the scheme.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Render the full `FILE:<path>` cache name.
    #[must_use]
    pub fn to_ccache_name(&self) -> String {
        format!("{FILE_SCHEME}{}", self.path)
    }
}

impl fmt::Display for CacheLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{FILE_SCHEME}{}", self.path)
    }
}
