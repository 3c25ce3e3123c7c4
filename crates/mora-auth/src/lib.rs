//! Mora Auth - Signed token authority
//!
//! This crate provides:
//! - HMAC-signed JWT issuance and verification
//! - Claims model and the token failure taxonomy
//! - Bearer credential extraction helpers for adapters

pub mod model;
pub mod service;

// Re-export commonly used types
pub use model::*;
pub use service::bearer::{CredentialError, SkipPaths, extract_bearer, unauthorized_message};
pub use service::token::{TokenAuthority, issue_token, verify_token};
