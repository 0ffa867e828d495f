//! CLI command implementations

pub mod check_ref;
pub mod validate;
