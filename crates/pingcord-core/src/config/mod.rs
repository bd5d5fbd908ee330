//! Configuration — schema, loading, and env var overrides.
//!
//! The delivery subsystem itself takes its settings programmatically;
//! this module is what an embedding application uses to read them from disk.
//!
//! # Usage
//! ```no_run
//! use pingcord_core::config;
//!
//! let cfg = config::load_config(None);
//! println!("API: {}", cfg.discord.api_url());
//! ```

pub mod loader;
pub mod schema;

pub use loader::{get_config_path, load_config, save_config};
pub use schema::{Config, DeliveryConfig, DeliveryMode, DiscordConfig, TemplateConfig};
