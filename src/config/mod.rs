//! Configuration module for the research pipeline
//!
//! Settings are loaded from YAML and overlaid with environment variables,
//! then passed explicitly to the components that need them. There is no
//! process-global settings instance; configuration lifecycle is tied to the
//! session being run.

mod settings;

pub use settings::*;
