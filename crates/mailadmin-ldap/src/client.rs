//! Directory client for mail-domain administration.

use crate::{
    config::DirectoryConfig,
    dn::{admin_dn, escape_filter_value, DistinguishedName, DOMAIN_RDN},
    domain::Domain,
    modify::ModifyRequest,
    Result,
};
use async_trait::async_trait;
use ldap3::exop::PasswordModify;
use ldap3::{LdapConnAsync, LdapConnSettings, LdapError, Mod, Scope, SearchEntry, SearchOptions};
use mailadmin_core::{AdminSession, Error, PasswordChangeError};
use native_tls::{Certificate, TlsConnector};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, warn};

/// Attributes fetched when listing domains.
pub const DOMAIN_SEARCH_ATTRS: &[&str] = &[
    "domainName",
    "cn",
    "description",
    "accountStatus",
    "domainBackupMX",
    "domainAdmin",
];

// "Return no attributes" (RFC 4511).
const NO_ATTRIBUTES: &[&str] = &["1.1"];

const RC_SIZE_LIMIT_EXCEEDED: u32 = 4;
const RC_NO_SUCH_OBJECT: u32 = 32;
const RC_INVALID_CREDENTIALS: u32 = 49;
const RC_INSUFFICIENT_ACCESS: u32 = 50;
const RC_UNWILLING_TO_PERFORM: u32 = 53;

const BAD_OLD_PASSWORD_TEXT: &str = "unwilling to verify old password";

/// Represents the search scope for LDAP queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    /// Base object only.
    Base,
    /// One level below the base.
    OneLevel,
}

impl From<SearchScope> for Scope {
    fn from(scope: SearchScope) -> Self {
        match scope {
            SearchScope::Base => Scope::Base,
            SearchScope::OneLevel => Scope::OneLevel,
        }
    }
}

/// Raw directory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LdapEntry {
    /// Distinguished name of the entry.
    pub dn: String,
    /// Attribute map (values preserved order from server).
    pub attributes: HashMap<String, Vec<String>>,
}

impl LdapEntry {
    /// Returns the first value of the attribute if present.
    #[must_use]
    pub fn first(&self, attribute: &str) -> Option<&str> {
        self.attributes
            .get(attribute)
            .and_then(|values| values.first().map(String::as_str))
    }

    /// Returns all values for the attribute.
    #[must_use]
    pub fn values(&self, attribute: &str) -> Option<&[String]> {
        self.attributes.get(attribute).map(Vec::as_slice)
    }
}

/// LDAP modification request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryModification {
    /// Replace attribute values.
    Replace {
        /// Attribute to modify.
        attribute: String,
        /// Replacement values (empty removes attribute).
        values: Vec<String>,
    },
}

impl DirectoryModification {
    /// Single-valued replace.
    #[must_use]
    pub fn replace(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Replace {
            attribute: attribute.into(),
            values: vec![value.into()],
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub(crate) trait LdapSession: Send {
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<()>;
    async fn search(
        &mut self,
        base_dn: &str,
        scope: SearchScope,
        filter: &str,
        attributes: &[&'static str],
    ) -> Result<Vec<LdapEntry>>;
    async fn modify(&mut self, dn: &str, modifications: &[DirectoryModification]) -> Result<()>;
    /// RFC 3062 password modify; an empty `old_password` is omitted from the request.
    async fn password_modify(
        &mut self,
        dn: &str,
        old_password: &str,
        new_password: &str,
    ) -> Result<()>;
    async fn unbind(&mut self) -> Result<()>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub(crate) trait LdapConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn LdapSession>>;
}

/// Entry point to the mail directory; hands out bound connections.
pub struct MailDirectory {
    config: Arc<DirectoryConfig>,
    connector: Box<dyn LdapConnector>,
}

impl MailDirectory {
    /// Creates a directory handle that uses the real LDAP connector.
    #[must_use]
    pub fn new(config: DirectoryConfig) -> Self {
        let config = Arc::new(config);
        let connector: Box<dyn LdapConnector> = Box::new(RealLdapConnector::new(config.clone()));
        Self { config, connector }
    }

    #[cfg(test)]
    #[must_use]
    pub(crate) fn with_connector(
        config: DirectoryConfig,
        connector: Box<dyn LdapConnector>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            connector,
        }
    }

    /// Returns the directory configuration.
    #[must_use]
    pub fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    /// Opens a connection and binds with the configured credentials.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] if the server cannot be reached, [`Error::Unauthorized`] if
    /// the bind is rejected and [`Error::Timeout`] if the bind does not complete in time.
    pub async fn connect(&self) -> Result<DirectoryConnection> {
        debug!(
            url = %self.config.url(),
            start_tls = self.config.start_tls(),
            "connecting to directory"
        );
        let mut session = self.connector.connect().await?;

        let credentials = self.config.credentials();
        with_timeout(
            self.config.operation_timeout(),
            "bind",
            session.simple_bind(credentials.bind_dn(), credentials.bind_password()),
        )
        .await?;
        debug!(bind_dn = credentials.bind_dn(), "bound to directory");

        Ok(DirectoryConnection::new(self.config.clone(), session))
    }
}

/// A bound directory connection.
///
/// Every operation needs `&mut self`, so calls on one connection never overlap. Call
/// [`DirectoryConnection::close`] to unbind; dropping the connection only closes the socket.
pub struct DirectoryConnection {
    config: Arc<DirectoryConfig>,
    session: Box<dyn LdapSession>,
    operation_timeout: Duration,
}

impl DirectoryConnection {
    pub(crate) fn new(config: Arc<DirectoryConfig>, session: Box<dyn LdapSession>) -> Self {
        let operation_timeout = config.operation_timeout();
        Self {
            config,
            session,
            operation_timeout,
        }
    }

    /// Returns the directory configuration.
    #[must_use]
    pub fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    /// Returns true if an entry exists at `dn`.
    ///
    /// # Errors
    ///
    /// Propagates transport and permission failures; a missing entry is `Ok(false)`.
    pub async fn entry_exists(&mut self, dn: &DistinguishedName) -> Result<bool> {
        let entries = self
            .search_existing(dn.as_str(), SearchScope::Base, "(objectClass=*)", NO_ATTRIBUTES)
            .await?;
        Ok(!entries.is_empty())
    }

    /// Returns true if `admin` has an admin entry flagged `domainGlobalAdmin=yes`.
    ///
    /// A blank `admin` has no entry and yields `false`.
    pub async fn is_global_admin(&mut self, admin: &str) -> Result<bool> {
        if admin.trim().is_empty() {
            return Ok(false);
        }
        let dn = admin_dn(admin, self.config.domainadmin_dn())?;
        let entries = self
            .search_existing(
                dn.as_str(),
                SearchScope::Base,
                "(&(objectClass=mailAdmin)(domainGlobalAdmin=yes))",
                NO_ATTRIBUTES,
            )
            .await?;
        Ok(entries.len() == 1)
    }

    /// Returns true if `admin` may manage the domain at `domain_dn`.
    ///
    /// A global admin session is re-verified against the admin's own entry; other admins must be
    /// listed in the domain's `domainAdmin` attribute. A DN without a `domainName` component or a
    /// domain that does not exist yields `false`.
    pub async fn check_domain_access(
        &mut self,
        session: &AdminSession,
        domain_dn: &DistinguishedName,
        admin: &str,
    ) -> Result<bool> {
        let Some(domain) = domain_dn.get(DOMAIN_RDN).map(str::to_owned) else {
            return Ok(false);
        };

        if !self.entry_exists(domain_dn).await? {
            debug!(dn = %domain_dn, "domain entry does not exist");
            return Ok(false);
        }

        if session.is_global_admin() {
            return self.is_global_admin(admin).await;
        }

        let filter = format!(
            "(&(domainName={})(domainAdmin={}))",
            escape_filter_value(&domain),
            escape_filter_value(admin)
        );
        let entries = self
            .search_existing(domain_dn.as_str(), SearchScope::Base, &filter, &["domainAdmin"])
            .await?;

        Ok(match entries.as_slice() {
            [entry] => entry
                .values("domainAdmin")
                .is_some_and(|admins| admins.iter().any(|a| a.eq_ignore_ascii_case(admin))),
            _ => false,
        })
    }

    /// Changes the password of the entry at `dn`, verifying the current one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PasswordChange`] with `EMPTY_CUR_PW`, `EMPTY_NEW_PW` or
    /// `NEW_PW_NOT_SAME` for malformed input before contacting the directory, and with
    /// `BAD_OLD_PASSWD` or `UNWILLING_TO_PERFORM` when the directory refuses the change.
    pub async fn set_password(
        &mut self,
        dn: &DistinguishedName,
        current_password: &str,
        new_password: &str,
        new_password_confirm: &str,
    ) -> Result<()> {
        if current_password.is_empty() {
            return Err(PasswordChangeError::EmptyCurrentPassword.into());
        }
        if new_password.is_empty() || new_password_confirm.is_empty() {
            return Err(PasswordChangeError::EmptyNewPassword.into());
        }
        if new_password != new_password_confirm {
            return Err(PasswordChangeError::NewPasswordMismatch.into());
        }

        self.password_modify(dn, current_password, new_password).await
    }

    /// Sets the password of the entry at `dn` without checking the current one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PasswordChange`] with `EMPTY_NEW_PW` for an empty password.
    pub async fn init_password(
        &mut self,
        dn: &DistinguishedName,
        new_password: &str,
    ) -> Result<()> {
        if new_password.is_empty() {
            return Err(PasswordChangeError::EmptyNewPassword.into());
        }
        self.password_modify(dn, "", new_password).await
    }

    /// Returns true if exactly one domain named `name` exists under the base DN.
    pub async fn domain_exists(&mut self, name: &str) -> Result<bool> {
        let filter = format!("(domainName={})", escape_filter_value(name.trim()));
        let base = self.config.base_dn().as_str().to_owned();
        let entries = self
            .search(&base, SearchScope::OneLevel, &filter, NO_ATTRIBUTES)
            .await?;
        Ok(entries.len() == 1)
    }

    /// Replaces all values of `attribute` on `dn` with `value`.
    pub async fn replace_attribute(
        &mut self,
        dn: &DistinguishedName,
        attribute: &str,
        value: &str,
    ) -> Result<()> {
        let modification = DirectoryModification::replace(attribute, value);
        self.modify(dn.as_str(), &[modification]).await
    }

    /// Applies a prepared modify request in a single operation.
    pub async fn apply_modifications(&mut self, request: &ModifyRequest) -> Result<()> {
        if request.modifications.is_empty() {
            return Ok(());
        }
        self.modify(request.dn.as_str(), &request.modifications).await
    }

    /// Lists the mail domains visible to the session's admin.
    ///
    /// Global admins see every domain; other admins see the domains listing them in
    /// `domainAdmin`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unauthorized`] if nobody is logged in.
    pub async fn list_domains(&mut self, session: &AdminSession) -> Result<Vec<LdapEntry>> {
        let admin = session
            .username()
            .ok_or_else(|| Error::Unauthorized("no admin logged in".to_string()))?;

        let filter = if session.is_global_admin() {
            "(objectClass=mailDomain)".to_string()
        } else {
            format!(
                "(&(objectClass=mailDomain)(domainAdmin={}))",
                escape_filter_value(admin)
            )
        };

        let base = self.config.base_dn().as_str().to_owned();
        self.search(&base, SearchScope::OneLevel, &filter, DOMAIN_SEARCH_ATTRS)
            .await
    }

    /// Like [`DirectoryConnection::list_domains`], parsed into [`Domain`] values.
    ///
    /// Entries that cannot be parsed are skipped.
    pub async fn domains(&mut self, session: &AdminSession) -> Result<Vec<Domain>> {
        let entries = self.list_domains(session).await?;
        Ok(entries
            .iter()
            .filter_map(|entry| match Domain::from_entry(entry) {
                Ok(domain) => Some(domain),
                Err(err) => {
                    warn!("Failed to parse domain entry `{}`: {err}", entry.dn);
                    None
                }
            })
            .collect())
    }

    /// Unbinds and closes the connection.
    pub async fn close(mut self) -> Result<()> {
        with_timeout(self.operation_timeout, "unbind", self.session.unbind()).await
    }

    pub(crate) async fn search(
        &mut self,
        base_dn: &str,
        scope: SearchScope,
        filter: &str,
        attributes: &'static [&'static str],
    ) -> Result<Vec<LdapEntry>> {
        debug!(base = base_dn, ?scope, filter, "directory search");
        with_timeout(
            self.operation_timeout,
            "search",
            self.session.search(base_dn, scope, filter, attributes),
        )
        .await
    }

    /// Search that treats a missing base entry as an empty result.
    pub(crate) async fn search_existing(
        &mut self,
        base_dn: &str,
        scope: SearchScope,
        filter: &str,
        attributes: &'static [&'static str],
    ) -> Result<Vec<LdapEntry>> {
        match self.search(base_dn, scope, filter, attributes).await {
            Err(Error::NotFound(_)) => Ok(Vec::new()),
            other => other,
        }
    }

    async fn modify(&mut self, dn: &str, modifications: &[DirectoryModification]) -> Result<()> {
        debug!(dn, count = modifications.len(), "directory modify");
        with_timeout(
            self.operation_timeout,
            "modify",
            self.session.modify(dn, modifications),
        )
        .await
    }

    async fn password_modify(
        &mut self,
        dn: &DistinguishedName,
        old_password: &str,
        new_password: &str,
    ) -> Result<()> {
        debug!(dn = %dn, "directory password modify");
        let result = with_timeout(
            self.operation_timeout,
            "password modify",
            self.session.password_modify(dn.as_str(), old_password, new_password),
        )
        .await;

        if let Err(Error::PasswordChange(reason)) = &result {
            warn!(dn = %dn, code = reason.code(), "password change rejected");
        }
        result
    }
}

async fn with_timeout<F, T>(limit: Duration, operation: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    timeout(limit, fut)
        .await
        .map_err(|_| Error::Timeout(format!("directory {operation} timed out")))?
}

/// Real LDAP connector backed by `ldap3`.
struct RealLdapConnector {
    config: Arc<DirectoryConfig>,
}

impl RealLdapConnector {
    fn new(config: Arc<DirectoryConfig>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl LdapConnector for RealLdapConnector {
    async fn connect(&self) -> Result<Box<dyn LdapSession>> {
        let settings = build_ldap_settings(&self.config)?;
        let (conn, ldap) = LdapConnAsync::with_settings(settings, self.config.url())
            .await
            .map_err(map_ldap_error)?;

        tokio::spawn(async move {
            if let Err(err) = conn.drive().await {
                error!("directory connection driver error: {err}");
            }
        });

        Ok(Box::new(RealLdapSession {
            inner: ldap,
            size_limit: self.config.size_limit(),
        }))
    }
}

struct RealLdapSession {
    inner: ldap3::Ldap,
    size_limit: i32,
}

#[async_trait]
impl LdapSession for RealLdapSession {
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<()> {
        self.inner
            .simple_bind(dn, password)
            .await
            .map_err(map_ldap_error)?
            .success()
            .map_err(map_ldap_error)?;
        Ok(())
    }

    async fn search(
        &mut self,
        base_dn: &str,
        scope: SearchScope,
        filter: &str,
        attributes: &[&'static str],
    ) -> Result<Vec<LdapEntry>> {
        let ldap3::SearchResult(entries, result) = self
            .inner
            .with_search_options(SearchOptions::new().sizelimit(self.size_limit))
            .search(base_dn, scope.into(), filter, attributes.to_vec())
            .await
            .map_err(map_ldap_error)?;

        match result.rc {
            0 => {}
            RC_SIZE_LIMIT_EXCEEDED => {
                warn!(
                    base = base_dn,
                    filter,
                    limit = self.size_limit,
                    "search size limit exceeded"
                );
            }
            rc => return Err(map_result_code(rc, &result.text)),
        }

        Ok(entries
            .into_iter()
            .map(SearchEntry::construct)
            .map(|entry| LdapEntry {
                dn: entry.dn,
                attributes: entry.attrs,
            })
            .collect())
    }

    async fn modify(&mut self, dn: &str, modifications: &[DirectoryModification]) -> Result<()> {
        let mods = modifications
            .iter()
            .map(|DirectoryModification::Replace { attribute, values }| {
                Mod::Replace(attribute.clone(), values.iter().cloned().collect::<HashSet<_>>())
            })
            .collect::<Vec<_>>();

        self.inner
            .modify(dn, mods)
            .await
            .map_err(map_ldap_error)?
            .success()
            .map_err(map_ldap_error)?;
        Ok(())
    }

    async fn password_modify(
        &mut self,
        dn: &str,
        old_password: &str,
        new_password: &str,
    ) -> Result<()> {
        let request = PasswordModify {
            user_id: Some(dn),
            old_pass: (!old_password.is_empty()).then_some(old_password),
            new_pass: Some(new_password),
        };

        let outcome = self.inner.extended(request).await.map_err(map_ldap_error)?;
        match outcome.success() {
            Ok(_) => Ok(()),
            Err(LdapError::LdapResult { result }) => {
                Err(map_password_modify_code(result.rc, &result.text))
            }
            Err(err) => Err(map_ldap_error(err)),
        }
    }

    async fn unbind(&mut self) -> Result<()> {
        self.inner.unbind().await.map_err(map_ldap_error)
    }
}

fn build_ldap_settings(config: &DirectoryConfig) -> Result<LdapConnSettings> {
    let mut settings = LdapConnSettings::new()
        .set_conn_timeout(config.connection_timeout())
        .set_starttls(config.start_tls());

    if !config.tls_verify() {
        warn!("TLS certificate verification disabled for directory connection");
        let connector = TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|err| Error::Config(format!("failed to construct TLS connector: {err}")))?;
        settings = settings.set_connector(connector).set_no_tls_verify(true);
    } else if let Some(cert_path) = config.tls_ca_cert() {
        debug!("loading directory CA certificate from {}", cert_path.display());
        let pem = fs::read(cert_path).map_err(|err| {
            Error::Config(format!(
                "failed to read directory CA certificate {}: {err}",
                cert_path.display()
            ))
        })?;
        let certificate = Certificate::from_pem(&pem)
            .map_err(|err| Error::Config(format!("invalid directory CA certificate: {err}")))?;
        let connector = TlsConnector::builder()
            .add_root_certificate(certificate)
            .build()
            .map_err(|err| {
                Error::Config(format!("failed to load directory CA certificate: {err}"))
            })?;
        settings = settings.set_connector(connector);
    }

    Ok(settings)
}

fn map_ldap_error(err: LdapError) -> Error {
    match err {
        LdapError::LdapResult { result } => map_result_code(result.rc, &result.text),
        other => Error::transport(other.to_string()),
    }
}

/// Maps a non-success LDAP result code to the error taxonomy.
fn map_result_code(rc: u32, text: &str) -> Error {
    match rc {
        RC_NO_SUCH_OBJECT => Error::NotFound(describe(rc, text)),
        RC_INVALID_CREDENTIALS | RC_INSUFFICIENT_ACCESS => Error::Unauthorized(describe(rc, text)),
        _ => Error::transport(describe(rc, text)),
    }
}

fn map_password_modify_code(rc: u32, text: &str) -> Error {
    if rc != RC_UNWILLING_TO_PERFORM {
        return map_result_code(rc, text);
    }

    if text.trim() == BAD_OLD_PASSWORD_TEXT {
        PasswordChangeError::BadOldPassword.into()
    } else {
        PasswordChangeError::UnwillingToPerform.into()
    }
}

fn describe(rc: u32, text: &str) -> String {
    if text.is_empty() {
        format!("rc={rc}")
    } else {
        format!("rc={rc}: {text}")
    }
}
