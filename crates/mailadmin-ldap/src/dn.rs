//! Distinguished name handling and the DN/filter builders for mail entries.
//!
//! Rendered DNs hex-escape the filter-special characters (`*`, `(`, `)`, `\`, NUL) in addition to
//! the usual DN escapes, so a DN produced here can be dropped into a search filter or used as a
//! search base as-is.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::Result;
use mailadmin_core::Error;

/// RDN attribute of mail domain entries.
pub(crate) const DOMAIN_RDN: &str = "domainName";
/// RDN attribute of user and admin entries.
pub(crate) const USER_RDN: &str = "mail";
const USERS_OU: &str = "Users";

/// Reasons a distinguished name fails to parse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DistinguishedNameError {
    /// Nothing but whitespace was given.
    #[error("empty distinguished name")]
    Empty,
    /// Two separators with nothing between them, or a trailing separator.
    #[error("empty component in `{0}`")]
    EmptyComponent(String),
    /// A component has no `=`.
    #[error("component without `=` in `{0}`")]
    MissingEquals(String),
    /// Nothing precedes the `=`.
    #[error("component without attribute name in `{0}`")]
    EmptyAttribute(String),
    /// Nothing follows the `=`.
    #[error("attribute `{0}` has no value")]
    EmptyValue(String),
    /// The input ends in the middle of an escape.
    #[error("dangling `\\` at end of distinguished name")]
    TrailingEscape,
    /// A hex escape is malformed or the decoded bytes are not UTF-8.
    #[error("bad escape sequence in `{0}`")]
    InvalidEscape(String),
}

impl From<DistinguishedNameError> for Error {
    fn from(err: DistinguishedNameError) -> Self {
        Error::InvalidDn(err.to_string())
    }
}

/// One RDN: usually a single `attribute=value`, occasionally several joined by `+`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelativeDistinguishedName {
    pairs: Vec<(String, String)>,
}

impl RelativeDistinguishedName {
    /// Single-valued RDN.
    #[must_use]
    pub fn new(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            pairs: vec![(attribute.into(), value.into())],
        }
    }

    /// Unescaped value of `attribute` (case-insensitive name match).
    #[must_use]
    pub fn value_of(&self, attribute: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(attribute))
            .map(|(_, value)| value.as_str())
    }

    /// Attribute/value pairs in the order written.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.pairs.iter().map(|(a, v)| (a.as_str(), v.as_str()))
    }
}

/// A parsed distinguished name, leaf RDN first.
///
/// The string form is normalised on construction and is what [`DistinguishedName::as_str`],
/// `Display` and serde produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DistinguishedName {
    rendered: String,
    rdns: Vec<RelativeDistinguishedName>,
}

impl DistinguishedName {
    /// Parses an RFC 4514 string. `\,` and `\2c` escapes are both accepted.
    ///
    /// # Errors
    ///
    /// Returns [`DistinguishedNameError`] describing the first syntax problem found.
    pub fn parse(input: impl AsRef<str>) -> std::result::Result<Self, DistinguishedNameError> {
        let input = input.as_ref().trim();
        if input.is_empty() {
            return Err(DistinguishedNameError::Empty);
        }
        Ok(Self::from_rdns(Parser::new(input).run()?))
    }

    fn from_rdns(rdns: Vec<RelativeDistinguishedName>) -> Self {
        Self {
            rendered: render(&rdns),
            rdns,
        }
    }

    /// Normalised string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.rendered
    }

    /// RDNs from leaf to root.
    #[must_use]
    pub fn rdns(&self) -> &[RelativeDistinguishedName] {
        &self.rdns
    }

    /// Value of the first (leaf-most) occurrence of `attribute`.
    #[must_use]
    pub fn get(&self, attribute: &str) -> Option<&str> {
        self.rdns.iter().find_map(|rdn| rdn.value_of(attribute))
    }

    /// DN of a child entry named by `rdn` below this one.
    #[must_use]
    pub fn child(&self, rdn: RelativeDistinguishedName) -> Self {
        let mut rdns = Vec::with_capacity(self.rdns.len() + 1);
        rdns.push(rdn);
        rdns.extend_from_slice(&self.rdns);
        Self::from_rdns(rdns)
    }
}

impl fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.rendered)
    }
}

impl FromStr for DistinguishedName {
    type Err = DistinguishedNameError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for DistinguishedName {
    type Error = DistinguishedNameError;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<DistinguishedName> for String {
    fn from(value: DistinguishedName) -> Self {
        value.rendered
    }
}

/// Builds the DN of a mail domain: `domainName=<domain>,<base_dn>`.
///
/// Surrounding whitespace and any internal spaces are removed from the domain.
///
/// # Errors
///
/// Returns [`Error::Validation`] if nothing is left of the domain name.
pub fn domain_dn(domain: &str, base_dn: &DistinguishedName) -> Result<DistinguishedName> {
    let domain = domain.trim().replace(' ', "");
    if domain.is_empty() {
        return Err(Error::Validation("domain name is empty".to_string()));
    }
    Ok(base_dn.child(RelativeDistinguishedName::new(DOMAIN_RDN, domain)))
}

/// Builds the DN of a mail user: `mail=<email>,ou=Users,domainName=<domain>,<base_dn>`.
///
/// # Errors
///
/// Returns [`Error::Validation`] unless the address contains exactly one `@` with a non-empty
/// local part and domain.
pub fn user_dn(email: &str, base_dn: &DistinguishedName) -> Result<DistinguishedName> {
    let email = email.trim();
    let (_, domain) = split_email(email)
        .ok_or_else(|| Error::Validation(format!("`{email}` is not a valid email address")))?;

    Ok(base_dn
        .child(RelativeDistinguishedName::new(DOMAIN_RDN, domain))
        .child(RelativeDistinguishedName::new("ou", USERS_OU))
        .child(RelativeDistinguishedName::new(USER_RDN, email)))
}

/// Builds the DN of a domain admin: `mail=<email>,<domainadmin_dn>`.
///
/// # Errors
///
/// Returns [`Error::Validation`] if the address is empty.
pub fn admin_dn(email: &str, domainadmin_dn: &DistinguishedName) -> Result<DistinguishedName> {
    let email = email.trim();
    if email.is_empty() {
        return Err(Error::Validation("admin address is empty".to_string()));
    }
    Ok(domainadmin_dn.child(RelativeDistinguishedName::new(USER_RDN, email)))
}

/// Returns the lowercased value of the first `attr` component of `dn`.
///
/// Attribute names match case-insensitively. A DN that does not parse as a whole is scanned
/// component by component, so a malformed tail does not hide an earlier match. Returns `None`
/// when no component carries `attr`.
#[must_use]
pub fn extract_value(dn: &str, attr: &str) -> Option<String> {
    let attr = attr.trim();
    match DistinguishedName::parse(dn) {
        Ok(parsed) => parsed.get(attr).map(str::to_lowercase),
        Err(_) => dn.split(',').find_map(|component| {
            let (name, value) = component.split_once('=')?;
            let value = value.trim();
            (name.trim().eq_ignore_ascii_case(attr) && !value.is_empty())
                .then(|| value.to_lowercase())
        }),
    }
}

/// Strips leading and trailing dots and spaces, then removes all remaining spaces.
#[must_use]
pub fn remove_space_and_dot(value: &str) -> String {
    value
        .trim_matches(|c: char| c == ' ' || c == '.')
        .replace(' ', "")
}

/// Escapes a value for use inside an LDAP search filter (RFC 4515).
#[must_use]
pub fn escape_filter_value(value: &str) -> String {
    value
        .chars()
        .fold(String::with_capacity(value.len()), |mut out, ch| {
            match filter_escape(ch) {
                Some(hex) => out.push_str(hex),
                None => out.push(ch),
            }
            out
        })
}

/// Splits `local@domain`, requiring exactly one `@` and both halves non-empty.
pub(crate) fn split_email(email: &str) -> Option<(&str, &str)> {
    let (local, domain) = email.split_once('@')?;
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return None;
    }
    Some((local, domain))
}

const fn filter_escape(ch: char) -> Option<&'static str> {
    match ch {
        '*' => Some("\\2a"),
        '(' => Some("\\28"),
        ')' => Some("\\29"),
        '\\' => Some("\\5c"),
        '\0' => Some("\\00"),
        _ => None,
    }
}

fn render(rdns: &[RelativeDistinguishedName]) -> String {
    let mut out = String::new();
    for (i, rdn) in rdns.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        for (j, (attribute, value)) in rdn.pairs().enumerate() {
            if j > 0 {
                out.push('+');
            }
            out.push_str(attribute);
            out.push('=');
            render_value(value, &mut out);
        }
    }
    out
}

fn render_value(value: &str, out: &mut String) {
    let last = value.chars().count().saturating_sub(1);
    for (i, ch) in value.chars().enumerate() {
        if let Some(hex) = filter_escape(ch) {
            out.push_str(hex);
            continue;
        }
        let special = matches!(ch, ',' | '+' | '"' | '<' | '>' | ';' | '=')
            || (i == 0 && matches!(ch, ' ' | '#'))
            || (i == last && ch == ' ');
        if special {
            out.push('\\');
        }
        out.push(ch);
    }
}

/// Single-pass RFC 4514 reader. Values are collected as bytes so hex escapes of multi-byte
/// UTF-8 sequences decode correctly.
struct Parser<'a> {
    input: &'a str,
    rdns: Vec<RelativeDistinguishedName>,
    pairs: Vec<(String, String)>,
    attribute: Option<String>,
    buf: Vec<u8>,
    // Bytes below this index came from escapes and survive trailing-space trimming.
    protected: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            rdns: Vec::new(),
            pairs: Vec::new(),
            attribute: None,
            buf: Vec::new(),
            protected: 0,
        }
    }

    fn run(
        mut self,
    ) -> std::result::Result<Vec<RelativeDistinguishedName>, DistinguishedNameError> {
        let input = self.input;
        let mut chars = input.chars();
        while let Some(ch) = chars.next() {
            match ch {
                '\\' if self.attribute.is_some() => {
                    let first = chars.next().ok_or(DistinguishedNameError::TrailingEscape)?;
                    match first.to_digit(16) {
                        Some(high) => {
                            let low = chars
                                .next()
                                .and_then(|c| c.to_digit(16))
                                .ok_or_else(|| self.invalid_escape())?;
                            let byte =
                                u8::try_from(high * 16 + low).map_err(|_| self.invalid_escape())?;
                            self.buf.push(byte);
                        }
                        None => self.push_char(first),
                    }
                    self.protected = self.buf.len();
                }
                '\\' => return Err(self.invalid_escape()),
                '=' if self.attribute.is_none() => self.take_attribute()?,
                '+' => self.finish_pair()?,
                ',' | ';' => {
                    self.finish_pair()?;
                    self.finish_rdn();
                }
                ' ' if self.buf.is_empty() => {}
                other => self.push_char(other),
            }
        }
        self.finish_pair()?;
        self.finish_rdn();
        Ok(self.rdns)
    }

    fn push_char(&mut self, ch: char) {
        let mut tmp = [0u8; 4];
        self.buf.extend_from_slice(ch.encode_utf8(&mut tmp).as_bytes());
    }

    fn take_attribute(&mut self) -> std::result::Result<(), DistinguishedNameError> {
        let name = String::from_utf8_lossy(&self.buf).trim().to_string();
        if name.is_empty() {
            return Err(DistinguishedNameError::EmptyAttribute(self.input.to_string()));
        }
        self.attribute = Some(name);
        self.buf.clear();
        self.protected = 0;
        Ok(())
    }

    fn finish_pair(&mut self) -> std::result::Result<(), DistinguishedNameError> {
        let Some(attribute) = self.attribute.take() else {
            return Err(if self.buf.iter().all(u8::is_ascii_whitespace) {
                DistinguishedNameError::EmptyComponent(self.input.to_string())
            } else {
                DistinguishedNameError::MissingEquals(self.input.to_string())
            });
        };

        while self.buf.len() > self.protected && self.buf.last() == Some(&b' ') {
            self.buf.pop();
        }
        if self.buf.is_empty() {
            return Err(DistinguishedNameError::EmptyValue(attribute));
        }

        let value =
            String::from_utf8(std::mem::take(&mut self.buf)).map_err(|_| self.invalid_escape())?;
        self.protected = 0;
        self.pairs.push((attribute, value));
        Ok(())
    }

    fn finish_rdn(&mut self) {
        if !self.pairs.is_empty() {
            self.rdns.push(RelativeDistinguishedName {
                pairs: std::mem::take(&mut self.pairs),
            });
        }
    }

    fn invalid_escape(&self) -> DistinguishedNameError {
        DistinguishedNameError::InvalidEscape(self.input.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> DistinguishedName {
        DistinguishedName::parse("o=domains,dc=example,dc=com").unwrap()
    }

    #[test]
    fn escaped_comma_survives() {
        let dn = DistinguishedName::parse("cn=Doe\\, Jane,o=domains").unwrap();
        assert_eq!(dn.get("cn"), Some("Doe, Jane"));
        assert_eq!(dn.as_str(), "cn=Doe\\, Jane,o=domains");
        assert_eq!(dn.rdns().len(), 2);
    }

    #[test]
    fn hex_escapes_decode() {
        let dn = DistinguishedName::parse("mail=a\\2ab@example.com,dc=example,dc=com").unwrap();
        assert_eq!(dn.get("mail"), Some("a*b@example.com"));
        assert_eq!(dn.as_str(), "mail=a\\2ab@example.com,dc=example,dc=com");

        let dn = DistinguishedName::parse("cn=Ren\\C3\\A9e,dc=example").unwrap();
        assert_eq!(dn.get("cn"), Some("Renée"));
    }

    #[test]
    fn spaces_around_separators_are_dropped() {
        let dn = DistinguishedName::parse(" ou = Users , o=domains ").unwrap();
        assert_eq!(dn.as_str(), "ou=Users,o=domains");

        let dn = DistinguishedName::parse("cn=trailing\\ ,o=domains").unwrap();
        assert_eq!(dn.get("cn"), Some("trailing "));
    }

    #[test]
    fn plus_joins_values_in_one_rdn() {
        let dn = DistinguishedName::parse("cn=Jane+mail=jane@example.com,o=domains").unwrap();
        assert_eq!(dn.rdns().len(), 2);
        assert_eq!(dn.rdns()[0].value_of("MAIL"), Some("jane@example.com"));
        assert_eq!(dn.as_str(), "cn=Jane+mail=jane@example.com,o=domains");
    }

    #[test]
    fn syntax_errors() {
        let cases = [
            ("   ", DistinguishedNameError::Empty),
            ("cn=Jane,", DistinguishedNameError::EmptyComponent("cn=Jane,".into())),
            ("cn=Jane,,o=x", DistinguishedNameError::EmptyComponent("cn=Jane,,o=x".into())),
            ("Jane,o=x", DistinguishedNameError::MissingEquals("Jane,o=x".into())),
            ("=Jane", DistinguishedNameError::EmptyAttribute("=Jane".into())),
            ("cn=,o=x", DistinguishedNameError::EmptyValue("cn".into())),
            ("cn=Jane\\", DistinguishedNameError::TrailingEscape),
            ("cn=\\2", DistinguishedNameError::InvalidEscape("cn=\\2".into())),
            ("cn=\\ff", DistinguishedNameError::InvalidEscape("cn=\\ff".into())),
        ];
        for (input, expected) in cases {
            assert_eq!(DistinguishedName::parse(input).unwrap_err(), expected, "{input}");
        }
    }

    #[test]
    fn domain_dn_strips_spaces() {
        let dn = domain_dn(" exa mple.com ", &base()).unwrap();
        assert_eq!(dn.as_str(), "domainName=example.com,o=domains,dc=example,dc=com");
        assert!(matches!(domain_dn("   ", &base()), Err(Error::Validation(_))));
    }

    #[test]
    fn rendered_values_escape_specials() {
        let dn = base().child(RelativeDistinguishedName::new("cn", "#a,b (c) "));
        assert_eq!(dn.as_str(), "cn=\\#a\\,b \\28c\\29\\ ,o=domains,dc=example,dc=com");
        assert_eq!(
            DistinguishedName::parse(dn.as_str()).unwrap().get("cn"),
            Some("#a,b (c) ")
        );
    }

    #[test]
    fn user_dn_layout() {
        let dn = user_dn(" john@example.com ", &base()).unwrap();
        assert_eq!(
            dn.as_str(),
            "mail=john@example.com,ou=Users,domainName=example.com,o=domains,dc=example,dc=com"
        );
    }

    #[test]
    fn user_dn_requires_single_at() {
        for input in ["john.example.com", "a@b@example.com", "@example.com", "john@", ""] {
            assert!(
                matches!(user_dn(input, &base()), Err(Error::Validation(_))),
                "{input} should be rejected"
            );
        }
    }

    #[test]
    fn admin_dn_rejects_empty() {
        let admins = DistinguishedName::parse("o=domainAdmins,dc=example,dc=com").unwrap();
        assert!(matches!(admin_dn("  ", &admins), Err(Error::Validation(_))));
    }

    #[test]
    fn extract_value_is_case_insensitive() {
        let dn = "domainName=Example.COM,o=domains,dc=example,dc=com";
        assert_eq!(extract_value(dn, "DOMAINNAME"), Some("example.com".to_string()));
        assert_eq!(extract_value(dn, "o"), Some("domains".to_string()));
        assert_eq!(extract_value(dn, "cn"), None);
        assert_eq!(extract_value("not a dn", "cn"), None);
    }

    #[test]
    fn extract_value_survives_malformed_tail() {
        let dn = "domainName=Example.com,garbage";
        assert!(DistinguishedName::parse(dn).is_err());
        assert_eq!(extract_value(dn, "domainName"), Some("example.com".to_string()));
        assert_eq!(extract_value(dn, "mail"), None);
        assert_eq!(extract_value("domainName=,garbage", "domainName"), None);
    }

    #[test]
    fn escape_filter_value_escapes_specials() {
        assert_eq!(escape_filter_value("a*b(c)d\\e\0"), "a\\2ab\\28c\\29d\\5ce\\00");
        assert_eq!(escape_filter_value("plain@example.com"), "plain@example.com");
    }

    #[test]
    fn serde_goes_through_string() {
        let dn: DistinguishedName =
            serde_json::from_str(r#""domainName=example.com,o=domains""#).unwrap();
        assert_eq!(dn.get("domainName"), Some("example.com"));
        assert_eq!(
            serde_json::to_string(&dn).unwrap(),
            r#""domainName=example.com,o=domains""#
        );
        assert!(serde_json::from_str::<DistinguishedName>(r#""bogus""#).is_err());
    }
}
