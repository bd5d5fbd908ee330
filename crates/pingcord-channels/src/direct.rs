//! Direct sender — every expanded message is posted immediately.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use pingcord_core::config::DiscordConfig;
use pingcord_core::{MessageTemplate, TemplateArgs};

use crate::base::MessageSender;
use crate::error::SendError;
use crate::http_client::DiscordHttpClient;

/// Posts each `(text, recipient)` pair as soon as it is added.
///
/// The first failed post ends the call: the remaining pairs of that
/// expansion are not attempted and `add_message` returns `false`.
pub struct DirectMessageSender {
    client: Arc<DiscordHttpClient>,
    flushed: AtomicBool,
}

impl DirectMessageSender {
    pub fn new(client: Arc<DiscordHttpClient>) -> Self {
        Self {
            client,
            flushed: AtomicBool::new(false),
        }
    }

    pub fn from_config(config: &DiscordConfig) -> Self {
        Self::new(Arc::new(DiscordHttpClient::new(config)))
    }

    pub fn client(&self) -> &Arc<DiscordHttpClient> {
        &self.client
    }
}

#[async_trait]
impl MessageSender for DirectMessageSender {
    fn name(&self) -> &str {
        "direct"
    }

    async fn add_message(
        &self,
        template: &MessageTemplate,
        args: &TemplateArgs,
    ) -> Result<bool, SendError> {
        if self.flushed.load(Ordering::SeqCst) {
            return Err(SendError::Flushed);
        }

        for (text, recipient) in template.expand(args)? {
            if !self.client.send_to(&recipient, &text).await? {
                warn!(recipient = %recipient, "direct send failed, skipping rest of batch");
                return Ok(false);
            }
            debug!(recipient = %recipient, len = text.len(), "message delivered");
        }
        Ok(true)
    }

    async fn flush(&self) -> Result<(), SendError> {
        if self.flushed.swap(true, Ordering::SeqCst) {
            debug!("direct sender already flushed");
            return Ok(());
        }
        self.client.close();
        Ok(())
    }
}
