//! PingCord channels — rate-limited delivery of template notifications.
//!
//! This crate provides:
//! - **http_client**: `DiscordHttpClient` — one gate for every outbound call,
//!   a single wait-and-retry on `retry_after`, lazy session with explicit close
//! - **dm_cache**: `DmChannelCache` — user → DM channel, resolved once per run
//! - **base**: the `MessageSender` trait
//! - **direct** / **buffered**: the two delivery strategies
//! - **formatting**: splitting content to the platform's size limit
//! - **pipeline**: `ItemPipeline` — validates producer items and feeds a sender

pub mod base;
pub mod buffered;
pub mod direct;
pub mod dm_cache;
pub mod error;
pub mod formatting;
pub mod http_client;
pub mod pipeline;

pub use base::MessageSender;
pub use buffered::BufferedMessageSender;
pub use direct::DirectMessageSender;
pub use dm_cache::{DmChannel, DmChannelCache};
pub use error::SendError;
pub use http_client::{ApiResponse, DiscordHttpClient};
pub use pipeline::{DropItem, InvalidTemplate, ItemPipeline, TemplateItem, TemplateRegistry};
