//! PingCord core — value types shared by the delivery subsystem.
//!
//! - **recipient**: `Recipient` / `RecipientKind`, the delivery target
//! - **template**: `MessageTemplate` and the format-string engine behind it
//! - **config**: typed config schema, JSON loader, env overrides
//! - **utils**: data directory resolution

pub mod config;
pub mod recipient;
pub mod template;
pub mod utils;

pub use recipient::{Recipient, RecipientKind};
pub use template::{FormatError, MessageTemplate, TemplateArgs};
