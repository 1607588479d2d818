//! # Axiom Config
//!
//! All configuration is captured in one immutable [`Config`] value built at
//! startup from CLI flags and `AXIOM_*` environment variables. There is no
//! string-keyed lookup at runtime; every setting is a typed field.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod error;

pub use config::Config;
pub use error::{ConfigError, ConfigResult};
