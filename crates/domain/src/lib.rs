//! Shared types for the Renova assistant: error taxonomy, configuration
//! tree, and the provider-agnostic chat/tool message model.

pub mod chat;
pub mod config;
pub mod error;

pub use error::{Error, Result};
