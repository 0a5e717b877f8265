//! Public API module.
//!
//! Models, configuration and the service entry point.

pub mod config;
pub mod models;
pub mod service;
