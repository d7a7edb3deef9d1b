//! CLI command implementations

pub mod manifest;
pub mod playground;
pub mod route;
