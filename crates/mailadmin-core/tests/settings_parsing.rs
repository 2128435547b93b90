//! Integration tests for loading directory settings from configuration files.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use mailadmin_core::config::LdapSettings;
use mailadmin_core::{AdminSession, Error};

/// Get the path to the test fixtures directory.
fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
}

fn load_settings_fixture() -> String {
    let fixture_path = fixtures_dir().join("ldap_settings.json");
    fs::read_to_string(&fixture_path).unwrap_or_else(|e| {
        panic!(
            "Failed to read settings fixture at {}: {}",
            fixture_path.display(),
            e
        )
    })
}

#[test]
fn test_parse_settings_fixture() {
    let settings = LdapSettings::from_json_str(&load_settings_fixture()).unwrap();

    assert_eq!(settings.uri, "ldap://ldap.example.com:389");
    assert_eq!(settings.basedn, "o=domains,dc=example,dc=com");
    assert_eq!(settings.domainadmin_dn, "o=domainAdmins,dc=example,dc=com");
    assert!(settings.use_tls);
    assert!(!settings.tls_verify);
    assert_eq!(settings.size_limit, 500);
    assert_eq!(settings.connection_timeout(), Duration::from_secs(5));
    assert_eq!(settings.operation_timeout(), Duration::from_secs(15));

    let credentials = settings.credentials();
    assert_eq!(credentials.bind_dn(), "cn=vmailadmin,dc=example,dc=com");
    assert_eq!(credentials.bind_password(), "fixture-password");
}

#[test]
fn test_missing_basedn_is_config_error() {
    let result = LdapSettings::from_json_str(r#"{"bind_dn": "cn=admin", "domainadmin_dn": "o=x"}"#);
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn test_out_of_range_size_limit_is_config_error() {
    let mut document: serde_json::Value = serde_json::from_str(&load_settings_fixture()).unwrap();
    document["size_limit"] = serde_json::json!(-1);

    let result = LdapSettings::from_json_str(&document.to_string());
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn test_session_from_web_layer() {
    let session: AdminSession =
        serde_json::from_str(r#"{"username": "admin@example.com", "domainGlobalAdmin": "yes"}"#)
            .unwrap();
    assert!(session.is_global_admin());
}
