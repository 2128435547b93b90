//! Connection-ready directory configuration.

use crate::{dn::DistinguishedName, Result};
use mailadmin_core::config::{BindCredentials, LdapSettings};
use mailadmin_core::Error;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Seconds allowed for the TCP connect and TLS handshake.
pub const DEFAULT_CONNECTION_TIMEOUT_SECS: u64 = 10;
/// Seconds allowed for a single directory operation.
pub const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 10;
/// Default maximum number of entries per search.
pub const DEFAULT_SIZE_LIMIT: i32 = 100;

const SUPPORTED_SCHEMES: &[&str] = &["ldap", "ldaps", "ldapi"];

/// Configuration for connecting to the mail directory.
#[derive(Debug)]
pub struct DirectoryConfig {
    url: String,
    credentials: BindCredentials,
    base_dn: DistinguishedName,
    domainadmin_dn: DistinguishedName,
    start_tls: bool,
    size_limit: i32,
    tls_verify: bool,
    tls_ca_cert: Option<PathBuf>,
    connection_timeout_secs: u64,
    operation_timeout_secs: u64,
}

impl DirectoryConfig {
    /// Creates a new directory configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the URL is invalid or not an LDAP URL.
    pub fn new(
        url: impl Into<String>,
        credentials: BindCredentials,
        base_dn: DistinguishedName,
        domainadmin_dn: DistinguishedName,
    ) -> Result<Self> {
        let url_string = url.into();
        let parsed = Url::parse(&url_string)?;
        if !SUPPORTED_SCHEMES.contains(&parsed.scheme()) {
            return Err(Error::Config(format!(
                "unsupported directory URI scheme `{}`",
                parsed.scheme()
            )));
        }

        Ok(Self {
            url: url_string,
            credentials,
            base_dn,
            domainadmin_dn,
            start_tls: false,
            size_limit: DEFAULT_SIZE_LIMIT,
            tls_verify: true,
            tls_ca_cert: None,
            connection_timeout_secs: DEFAULT_CONNECTION_TIMEOUT_SECS,
            operation_timeout_secs: DEFAULT_OPERATION_TIMEOUT_SECS,
        })
    }

    /// Builds the configuration from raw panel settings.
    ///
    /// A protocol version of `0` selects LDAPv3; any version other than 3 is rejected.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an unsupported protocol version or URI, and
    /// [`Error::InvalidDn`] when a configured DN does not parse.
    pub fn from_settings(settings: &LdapSettings) -> Result<Self> {
        if !matches!(settings.protocol_version, 0 | 3) {
            return Err(Error::Config(format!(
                "unsupported LDAP protocol version {}",
                settings.protocol_version
            )));
        }

        let mut config = Self::new(
            settings.uri.clone(),
            settings.credentials(),
            DistinguishedName::parse(&settings.basedn)?,
            DistinguishedName::parse(&settings.domainadmin_dn)?,
        )?
        .with_start_tls(settings.use_tls)
        .with_size_limit(settings.size_limit)
        .with_tls_verification(settings.tls_verify)
        .with_connection_timeout_secs(settings.connection_timeout_secs)
        .with_operation_timeout_secs(settings.operation_timeout_secs);

        if let Some(path) = &settings.tls_ca_cert {
            config = config.with_tls_ca_cert(path.clone());
        }

        Ok(config)
    }

    /// Returns the directory URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the bind credentials.
    #[must_use]
    pub const fn credentials(&self) -> &BindCredentials {
        &self.credentials
    }

    /// Returns the base DN holding the mail domains.
    #[must_use]
    pub const fn base_dn(&self) -> &DistinguishedName {
        &self.base_dn
    }

    /// Returns the DN of the admin sub-tree.
    #[must_use]
    pub const fn domainadmin_dn(&self) -> &DistinguishedName {
        &self.domainadmin_dn
    }

    /// Returns whether StartTLS is issued after connecting.
    #[must_use]
    pub const fn start_tls(&self) -> bool {
        self.start_tls
    }

    /// Returns the search size limit.
    #[must_use]
    pub const fn size_limit(&self) -> i32 {
        self.size_limit
    }

    /// Connect and handshake deadline.
    #[must_use]
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    /// Deadline applied to every bind, search, modify and unbind.
    #[must_use]
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    /// Whether server certificates are verified.
    #[must_use]
    pub const fn tls_verify(&self) -> bool {
        self.tls_verify
    }

    /// PEM file with an extra trust anchor, if configured.
    #[must_use]
    pub fn tls_ca_cert(&self) -> Option<&Path> {
        self.tls_ca_cert.as_deref()
    }

    /// Enables or disables StartTLS.
    #[must_use]
    pub const fn with_start_tls(mut self, start_tls: bool) -> Self {
        self.start_tls = start_tls;
        self
    }

    /// Overrides the search size limit.
    #[must_use]
    pub const fn with_size_limit(mut self, size_limit: i32) -> Self {
        self.size_limit = size_limit;
        self
    }

    /// Turns certificate verification on or off. Off is for test directories only.
    #[must_use]
    pub const fn with_tls_verification(mut self, verify: bool) -> Self {
        self.tls_verify = verify;
        self
    }

    /// Trusts the CA in the given PEM file in addition to the system roots.
    #[must_use]
    pub fn with_tls_ca_cert(mut self, path: PathBuf) -> Self {
        self.tls_ca_cert = Some(path);
        self
    }

    /// Connect deadline in seconds.
    #[must_use]
    pub const fn with_connection_timeout_secs(mut self, seconds: u64) -> Self {
        self.connection_timeout_secs = seconds;
        self
    }

    /// Per-operation deadline in seconds.
    #[must_use]
    pub const fn with_operation_timeout_secs(mut self, seconds: u64) -> Self {
        self.operation_timeout_secs = seconds;
        self
    }
}
