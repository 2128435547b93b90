//! Admin session state.
//!
//! The web layer owns the session lifecycle; this crate only reads the logged-in admin and the
//! global admin flag from it.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Request-scoped view of the logged-in administrator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminSession {
    /// Admin identity (an email address), absent when nobody is logged in.
    #[serde(default)]
    pub username: Option<String>,

    /// Whether the admin holds site-wide privilege.
    #[serde(
        rename = "domainGlobalAdmin",
        default,
        serialize_with = "serialize_flag",
        deserialize_with = "deserialize_flag"
    )]
    pub global_admin: bool,
}

impl AdminSession {
    /// Session for an admin scoped to the domains listing them.
    #[must_use]
    pub fn domain_admin(username: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            global_admin: false,
        }
    }

    /// Session for a site-wide admin.
    #[must_use]
    pub fn global_admin(username: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            global_admin: true,
        }
    }

    /// Session with nobody logged in.
    #[must_use]
    pub const fn anonymous() -> Self {
        Self {
            username: None,
            global_admin: false,
        }
    }

    /// Returns the logged-in admin, if any.
    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Returns true if the session carries the global admin flag.
    #[must_use]
    pub const fn is_global_admin(&self) -> bool {
        self.global_admin
    }
}

// Web sessions store the flag as "yes"; booleans are accepted as well.
#[derive(Deserialize)]
#[serde(untagged)]
enum FlagValue {
    Bool(bool),
    Text(String),
}

fn deserialize_flag<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<FlagValue>::deserialize(deserializer)?;
    Ok(match value {
        Some(FlagValue::Bool(flag)) => flag,
        Some(FlagValue::Text(text)) => text.trim().eq_ignore_ascii_case("yes"),
        None => false,
    })
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn serialize_flag<S>(flag: &bool, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(if *flag { "yes" } else { "no" })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_web_session() {
        let session: AdminSession = serde_json::from_str(
            r#"{"username": "postmaster@example.com", "domainGlobalAdmin": "yes"}"#,
        )
        .unwrap();
        assert_eq!(session.username(), Some("postmaster@example.com"));
        assert!(session.is_global_admin());
    }

    #[test]
    fn flag_other_than_yes_is_not_global() {
        let session: AdminSession =
            serde_json::from_str(r#"{"username": "a@example.com", "domainGlobalAdmin": "no"}"#)
                .unwrap();
        assert!(!session.is_global_admin());

        let session: AdminSession =
            serde_json::from_str(r#"{"username": "a@example.com"}"#).unwrap();
        assert!(!session.is_global_admin());

        let session: AdminSession =
            serde_json::from_str(r#"{"domainGlobalAdmin": true}"#).unwrap();
        assert!(session.is_global_admin());
        assert!(session.username().is_none());
    }

    #[test]
    fn serialize_uses_web_flag() {
        let json = serde_json::to_string(&AdminSession::global_admin("a@example.com")).unwrap();
        assert!(json.contains(r#""domainGlobalAdmin":"yes""#));
    }

    #[test]
    fn constructors() {
        assert!(!AdminSession::domain_admin("a@example.com").is_global_admin());
        assert_eq!(AdminSession::anonymous(), AdminSession::default());
    }
}
