//! Directory settings as read from the admin panel's configuration.
//!
//! [`LdapSettings`] mirrors the `[ldap]` section of the panel configuration. It is validated on
//! load; the typed, connection-ready form lives in the directory crate.

use crate::Error;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use validator::Validate;

/// Raw directory settings.
#[derive(Clone, Serialize, Deserialize, Validate)]
pub struct LdapSettings {
    /// Directory server URI (e.g. `ldap://127.0.0.1`)
    #[validate(url)]
    #[serde(default = "default_uri")]
    pub uri: String,

    /// Base DN holding the mail domain entries
    #[validate(length(min = 1))]
    pub basedn: String,

    /// DN of the sub-tree holding admin entries
    #[validate(length(min = 1))]
    pub domainadmin_dn: String,

    /// DN used for the connection bind
    #[validate(length(min = 1))]
    pub bind_dn: String,

    /// Password used for the connection bind
    #[serde(skip_serializing, default)]
    pub bind_pw: String,

    /// LDAP protocol version; `0` selects the default (3)
    #[serde(default = "default_protocol_version")]
    pub protocol_version: u8,

    /// Whether to issue StartTLS after connecting
    #[serde(default)]
    pub use_tls: bool,

    /// Maximum number of entries returned by a search
    #[validate(range(min = 0, max = 100_000))]
    #[serde(default = "default_size_limit")]
    pub size_limit: i32,

    /// Whether to verify TLS certificates
    #[serde(default = "default_tls_verify")]
    pub tls_verify: bool,

    /// Optional path to custom CA certificate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_ca_cert: Option<PathBuf>,

    /// Connection timeout in seconds
    #[validate(range(min = 1, max = 300))]
    #[serde(default = "default_timeout_secs")]
    pub connection_timeout_secs: u64,

    /// Per-operation timeout in seconds
    #[validate(range(min = 1, max = 300))]
    #[serde(default = "default_timeout_secs")]
    pub operation_timeout_secs: u64,
}

fn default_uri() -> String {
    "ldap://127.0.0.1".to_string()
}

const fn default_protocol_version() -> u8 {
    3
}

const fn default_size_limit() -> i32 {
    100
}

const fn default_tls_verify() -> bool {
    true
}

const fn default_timeout_secs() -> u64 {
    10
}

impl LdapSettings {
    /// Creates settings with the required DNs and bind password; everything else uses defaults.
    #[must_use]
    pub fn new(
        basedn: impl Into<String>,
        domainadmin_dn: impl Into<String>,
        bind_dn: impl Into<String>,
        bind_pw: impl Into<String>,
    ) -> Self {
        Self {
            uri: default_uri(),
            basedn: basedn.into(),
            domainadmin_dn: domainadmin_dn.into(),
            bind_dn: bind_dn.into(),
            bind_pw: bind_pw.into(),
            protocol_version: default_protocol_version(),
            use_tls: false,
            size_limit: default_size_limit(),
            tls_verify: default_tls_verify(),
            tls_ca_cert: None,
            connection_timeout_secs: default_timeout_secs(),
            operation_timeout_secs: default_timeout_secs(),
        }
    }

    /// Parses and validates settings from a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the document is malformed or a value is out of range.
    pub fn from_json_str(json: &str) -> Result<Self, Error> {
        let settings: Self = serde_json::from_str(json)?;
        settings
            .validate()
            .map_err(|e| Error::Config(format!("Invalid directory settings: {e}")))?;
        Ok(settings)
    }

    /// Set the server URI.
    #[must_use]
    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = uri.into();
        self
    }

    /// Enable or disable StartTLS.
    #[must_use]
    pub const fn with_start_tls(mut self, use_tls: bool) -> Self {
        self.use_tls = use_tls;
        self
    }

    /// Returns the bind credentials.
    #[must_use]
    pub fn credentials(&self) -> BindCredentials {
        BindCredentials::new(self.bind_dn.clone(), self.bind_pw.clone())
    }

    /// Get the connection timeout as a Duration.
    #[must_use]
    pub const fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    /// Get the operation timeout as a Duration.
    #[must_use]
    pub const fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }
}

impl fmt::Debug for LdapSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LdapSettings")
            .field("uri", &self.uri)
            .field("basedn", &self.basedn)
            .field("domainadmin_dn", &self.domainadmin_dn)
            .field("bind_dn", &self.bind_dn)
            .field("bind_pw", &"[REDACTED]")
            .field("protocol_version", &self.protocol_version)
            .field("use_tls", &self.use_tls)
            .field("size_limit", &self.size_limit)
            .field("tls_verify", &self.tls_verify)
            .field("tls_ca_cert", &self.tls_ca_cert)
            .field("connection_timeout_secs", &self.connection_timeout_secs)
            .field("operation_timeout_secs", &self.operation_timeout_secs)
            .finish()
    }
}

/// Credentials for the connection bind.
#[derive(Debug)]
pub struct BindCredentials {
    bind_dn: String,
    bind_password: SecretString,
}

impl BindCredentials {
    /// Create new bind credentials.
    #[must_use]
    pub fn new(bind_dn: impl Into<String>, bind_password: impl Into<String>) -> Self {
        Self {
            bind_dn: bind_dn.into(),
            bind_password: SecretString::from(bind_password.into()),
        }
    }

    /// Get the bind DN.
    #[must_use]
    pub fn bind_dn(&self) -> &str {
        &self.bind_dn
    }

    /// Get the bind password.
    #[must_use]
    pub fn bind_password(&self) -> &str {
        self.bind_password.expose_secret()
    }
}
