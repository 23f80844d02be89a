//! Configuration loading and persistence for easel.

pub mod loader;
pub mod schema;

pub use loader::{discover_and_load, find_or_default_config_path, load_config, save_config};
pub use schema::{DefaultsSection, EaselConfig, ManagerSection, SelectorSection, TargetSection};
