//! Capability checks for admin sessions.

use serde::Serialize;
use url::form_urlencoded;

use crate::{
    client::{DirectoryConnection, SearchScope},
    dn::{domain_dn, escape_filter_value, DistinguishedName},
    Result,
};
use mailadmin_core::{AdminSession, Error};
use tracing::debug;

const PERMISSION_DENIED_PATH: &str = "/users";

/// Proof that a session may manage a mail domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MailDomainGrant {
    /// Domain name taken from the checked address.
    pub domain: String,
    /// DN of the domain entry.
    pub dn: DistinguishedName,
}

/// Fails unless the session belongs to a global admin.
///
/// # Errors
///
/// Returns [`Error::Unauthorized`] for anonymous and domain-admin sessions.
pub fn require_global_admin(session: &AdminSession) -> Result<()> {
    if session.username().is_some() && session.is_global_admin() {
        Ok(())
    } else {
        Err(Error::Unauthorized("global admin required".to_string()))
    }
}

/// Location the web layer redirects to when access to `domain` is denied.
#[must_use]
pub fn permission_denied_location(domain: &str) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("msg", "PERMISSION_DENIED")
        .append_pair("domain", domain)
        .finish();
    format!("{PERMISSION_DENIED_PATH}?{query}")
}

impl DirectoryConnection {
    /// Checks that the session may manage the domain of `mail`.
    ///
    /// The domain is everything after the first `@`. Global admins pass without a lookup; other
    /// admins must be listed in the domain's `domainAdmin` attribute.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if `mail` has no domain part and [`Error::Unauthorized`]
    /// (carrying the domain) if the session may not manage it.
    pub async fn authorize_mail(
        &mut self,
        session: &AdminSession,
        mail: &str,
    ) -> Result<MailDomainGrant> {
        let domain = mail
            .split_once('@')
            .map(|(_, domain)| domain.trim())
            .filter(|domain| !domain.is_empty())
            .ok_or_else(|| Error::Validation(format!("`{mail}` has no domain part")))?
            .to_string();
        let dn = domain_dn(&domain, self.config().base_dn())?;

        if session.is_global_admin() {
            return Ok(MailDomainGrant { domain, dn });
        }

        let admin = session
            .username()
            .ok_or_else(|| Error::Unauthorized(domain.clone()))?;
        let filter = format!(
            "(&(domainName={})(domainAdmin={}))",
            escape_filter_value(&domain),
            escape_filter_value(admin)
        );
        let entries = self
            .search_existing(dn.as_str(), SearchScope::Base, &filter, &["domainName"])
            .await?;

        if entries.is_empty() {
            debug!(dn = %dn, admin, "admin is not listed on domain");
            return Err(Error::Unauthorized(domain));
        }

        Ok(MailDomainGrant { domain, dn })
    }
}
