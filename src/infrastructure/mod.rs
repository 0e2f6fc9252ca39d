//! Cross-cutting infrastructure.

pub mod config;
