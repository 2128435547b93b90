//! Mail domain representation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{client::LdapEntry, dn::DistinguishedName, Result};
use mailadmin_core::Error;

/// Value of the `accountStatus` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    /// Account is enabled.
    #[default]
    Active,
    /// Account is disabled.
    Disabled,
}

impl AccountStatus {
    /// Attribute value stored in the directory.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Disabled => "disabled",
        }
    }

    /// Parses a submitted value, falling back to [`AccountStatus::Active`] for anything unknown.
    #[must_use]
    pub fn parse_or_default(value: Option<&str>) -> Self {
        value.and_then(|v| v.parse().ok()).unwrap_or_default()
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountStatus {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "disabled" => Ok(Self::Disabled),
            other => Err(Error::Validation(format!("unknown account status `{other}`"))),
        }
    }
}

/// A mail domain entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domain {
    /// Distinguished name of the domain entry.
    pub dn: DistinguishedName,
    /// Domain name (`domainName`).
    pub name: String,
    /// Display name (`cn`).
    #[serde(default)]
    pub cn: Option<String>,
    /// Free-form description.
    #[serde(default)]
    pub description: Option<String>,
    /// Admins listed in `domainAdmin`.
    #[serde(default)]
    pub admins: Vec<String>,
    /// Whether the domain is a backup MX (`domainBackupMX=yes`).
    #[serde(default)]
    pub backup_mx: bool,
    /// Account status.
    #[serde(default)]
    pub status: AccountStatus,
}

impl Domain {
    /// Builds a domain from a raw directory entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDn`] if the entry DN is malformed and [`Error::Validation`] if the
    /// entry has no `domainName`.
    pub fn from_entry(entry: &LdapEntry) -> Result<Self> {
        let dn = DistinguishedName::parse(&entry.dn)?;
        let name = entry
            .first("domainName")
            .or_else(|| dn.get("domainName"))
            .ok_or_else(|| {
                Error::Validation(format!("entry `{}` has no domainName", entry.dn))
            })?
            .to_string();

        Ok(Self {
            name,
            cn: entry.first("cn").map(str::to_owned),
            description: entry.first("description").map(str::to_owned),
            admins: entry
                .values("domainAdmin")
                .map(<[String]>::to_vec)
                .unwrap_or_default(),
            backup_mx: entry
                .first("domainBackupMX")
                .is_some_and(|value| value.eq_ignore_ascii_case("yes")),
            status: AccountStatus::parse_or_default(entry.first("accountStatus")),
            dn,
        })
    }

    /// Returns true if `admin` is listed as an admin of this domain (case-insensitive).
    #[must_use]
    pub fn has_admin(&self, admin: &str) -> bool {
        self.admins.iter().any(|a| a.eq_ignore_ascii_case(admin))
    }

    /// Returns true if the domain is active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn entry(attrs: &[(&str, &[&str])]) -> LdapEntry {
        let attributes = attrs
            .iter()
            .map(|(name, values)| {
                (
                    (*name).to_string(),
                    values.iter().map(|v| (*v).to_string()).collect(),
                )
            })
            .collect::<HashMap<_, _>>();
        LdapEntry {
            dn: "domainName=example.com,o=domains,dc=example,dc=com".to_string(),
            attributes,
        }
    }

    #[test]
    fn parse_full_entry() {
        let domain = Domain::from_entry(&entry(&[
            ("domainName", &["example.com"]),
            ("cn", &["Example"]),
            ("domainAdmin", &["a@example.com", "b@example.com"]),
            ("domainBackupMX", &["yes"]),
            ("accountStatus", &["disabled"]),
        ]))
        .unwrap();

        assert_eq!(domain.name, "example.com");
        assert_eq!(domain.cn.as_deref(), Some("Example"));
        assert!(domain.has_admin("B@example.com"));
        assert!(!domain.has_admin("c@example.com"));
        assert!(domain.backup_mx);
        assert!(!domain.is_active());
    }

    #[test]
    fn name_falls_back_to_dn() {
        let domain = Domain::from_entry(&entry(&[])).unwrap();
        assert_eq!(domain.name, "example.com");
        assert!(domain.is_active());
        assert!(!domain.backup_mx);
        assert!(domain.admins.is_empty());
    }

    #[test]
    fn account_status_fallback() {
        assert_eq!(AccountStatus::parse_or_default(Some("Disabled")), AccountStatus::Disabled);
        assert_eq!(AccountStatus::parse_or_default(Some("bogus")), AccountStatus::Active);
        assert_eq!(AccountStatus::parse_or_default(None), AccountStatus::Active);
    }
}
