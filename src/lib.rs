//! Controller for the CommonWebUI custom resource.

pub mod config;
pub mod operator;

pub use config::Config;
