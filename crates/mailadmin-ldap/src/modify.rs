//! Builds attribute modifications from submitted admin forms.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::{
    client::DirectoryModification,
    dn::{domain_dn, DistinguishedName, DOMAIN_RDN},
    domain::AccountStatus,
    Result,
};
use mailadmin_core::{AdminSession, Error};

/// Kind of account a form edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountType {
    /// Mail domain.
    Domain,
    /// Mail user.
    User,
    /// Mailing list.
    MailList,
    /// Mail alias.
    Alias,
}

impl AccountType {
    /// Form value of the account type.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Domain => "domain",
            Self::User => "user",
            Self::MailList => "maillist",
            Self::Alias => "alias",
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountType {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "domain" => Ok(Self::Domain),
            "user" => Ok(Self::User),
            "maillist" => Ok(Self::MailList),
            "alias" => Ok(Self::Alias),
            other => Err(Error::Validation(format!("unknown account type `{other}`"))),
        }
    }
}

/// Modifications to apply to one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifyRequest {
    /// Target entry.
    pub dn: DistinguishedName,
    /// Modifications, applied in order.
    pub modifications: Vec<DirectoryModification>,
}

/// Replace of `attribute` with `value`, or with `default` when `value` is empty.
///
/// An empty `default` yields a replace without values, which clears the attribute.
#[must_use]
pub fn single_replace(attribute: &str, value: &str, default: &str) -> DirectoryModification {
    let chosen = if value.is_empty() { default } else { value };
    DirectoryModification::Replace {
        attribute: attribute.to_string(),
        values: if chosen.is_empty() {
            Vec::new()
        } else {
            vec![chosen.to_string()]
        },
    }
}

/// Attribute/value pair for a new entry: `value`, or `default` when `value` is empty.
///
/// An empty chosen value yields no values.
#[must_use]
pub fn single_attribute(attribute: &str, value: &str, default: &str) -> (String, Vec<String>) {
    let DirectoryModification::Replace { attribute, values } =
        single_replace(attribute, value, default);
    (attribute, values)
}

/// Builds the modify request for a submitted account form.
///
/// # Errors
///
/// Returns [`Error::Validation`] when `domainName` is missing, [`Error::Unauthorized`] unless the
/// session is a global admin and [`Error::NotImplemented`] for account types other than
/// [`AccountType::Domain`].
pub fn build_modifications(
    session: &AdminSession,
    account_type: AccountType,
    form: &HashMap<String, String>,
    base_dn: &DistinguishedName,
) -> Result<ModifyRequest> {
    let domain = form
        .get(DOMAIN_RDN)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| Error::Validation("domainName is required".to_string()))?;

    if !session.is_global_admin() {
        return Err(Error::Unauthorized(domain.to_string()));
    }

    match account_type {
        AccountType::Domain => {
            let mut modifications = Vec::new();

            if let Some(cn) = form.get("cn").map(|v| v.trim()).filter(|v| !v.is_empty()) {
                modifications.push(DirectoryModification::replace("cn", cn));
            }

            let status =
                AccountStatus::parse_or_default(form.get("accountStatus").map(String::as_str));
            modifications.push(DirectoryModification::replace("accountStatus", status.as_str()));

            let backup_mx = match form.get("domainBackupMX") {
                Some(v) if v.trim().eq_ignore_ascii_case("yes") => "yes",
                _ => "no",
            };
            modifications.push(DirectoryModification::replace("domainBackupMX", backup_mx));

            Ok(ModifyRequest {
                dn: domain_dn(domain, base_dn)?,
                modifications,
            })
        }
        other => Err(Error::NotImplemented(format!("modifying {other} accounts"))),
    }
}
