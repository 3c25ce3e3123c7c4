//! Token service implementations

pub mod bearer;
pub mod token;
