//! LDAP access layer for mail-domain administration.
//!
//! This crate opens bound directory connections, checks an admin's rights against their session,
//! and performs the search and modify operations behind domain, admin and password management.

#![deny(missing_docs)]

mod access;
mod client;
mod config;
mod dn;
mod domain;
mod modify;
mod password;

pub use access::{permission_denied_location, require_global_admin, MailDomainGrant};
pub use client::{
    DirectoryConnection, DirectoryModification, LdapEntry, MailDirectory, SearchScope,
    DOMAIN_SEARCH_ATTRS,
};
pub use config::{
    DirectoryConfig, DEFAULT_CONNECTION_TIMEOUT_SECS, DEFAULT_OPERATION_TIMEOUT_SECS,
    DEFAULT_SIZE_LIMIT,
};
pub use dn::{
    admin_dn, domain_dn, escape_filter_value, extract_value, remove_space_and_dot, user_dn,
    DistinguishedName, DistinguishedNameError, RelativeDistinguishedName,
};
pub use domain::{AccountStatus, Domain};
pub use modify::{
    build_modifications, single_attribute, single_replace, AccountType, ModifyRequest,
};
pub use password::{generate_password, verify_password, PasswordScheme};

/// Convenient result alias that reuses the core error type.
pub type Result<T> = mailadmin_core::Result<T>;
