//! MessageSender trait — the delivery strategy the producer side talks to.
//!
//! Implementations:
//! - `DirectMessageSender` — posts each message as soon as it is added
//! - `BufferedMessageSender` — aggregates per recipient, posts on `flush()`
//!
//! Both compose a shared `DiscordHttpClient` rather than inheriting from it.
//! Lifecycle per instance: open (accepting `add_message`) → flushed (terminal).

use async_trait::async_trait;
use pingcord_core::{MessageTemplate, TemplateArgs};

use crate::error::SendError;

#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Strategy name for logs (`"direct"`, `"buffered"`).
    fn name(&self) -> &str;

    /// Expand `template` against `args` and route every `(text, recipient)`
    /// pair to the strategy.
    ///
    /// `Ok(false)` is a soft delivery failure; format and transport problems
    /// are `Err`.
    async fn add_message(
        &self,
        template: &MessageTemplate,
        args: &TemplateArgs,
    ) -> Result<bool, SendError>;

    /// Send anything pending and release the client's connection.
    ///
    /// Meant to be called once at end of run; later calls do nothing.
    async fn flush(&self) -> Result<(), SendError>;
}
