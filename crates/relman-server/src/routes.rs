//! HTTP route modules

pub mod packages;
pub mod releases;
