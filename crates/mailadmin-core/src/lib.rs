//! # mailadmin-core
//!
//! Core types shared by the mail-domain administration directory layer.
//!
//! ## Modules
//!
//! - [`error`] - Error taxonomy and symbolic error codes
//! - [`config`] - Raw directory settings as read from configuration files
//! - [`session`] - Admin session state supplied by the web layer

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod session;

// Re-export commonly used types
pub use error::{Error, PasswordChangeError, Result};
pub use session::AdminSession;
