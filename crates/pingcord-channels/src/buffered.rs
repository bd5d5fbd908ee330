//! Buffered sender — aggregate per recipient, deliver once at end of run.
//!
//! Many small notifications for the same recipient become one message joined
//! with `\n`, which keeps the run inside the platform's message budget.
//!
//! A joined message longer than the client's `max_message_len` is split on
//! line boundaries and the chunks are posted in order. If a chunk fails, the
//! rest of that recipient's chunks are dropped and flushing moves on to the
//! next recipient.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use pingcord_core::config::DiscordConfig;
use pingcord_core::{MessageTemplate, Recipient, TemplateArgs};

use crate::base::MessageSender;
use crate::error::SendError;
use crate::formatting::split_message;
use crate::http_client::DiscordHttpClient;

/// Pending texts for one recipient, in the order they were added.
#[derive(Debug)]
struct RecipientBuffer {
    recipient: Recipient,
    messages: Vec<String>,
}

/// Buffers keyed by recipient identity; `order` keeps first-seen order.
#[derive(Debug, Default)]
struct MessageBuffer {
    order: Vec<RecipientBuffer>,
    index: HashMap<Recipient, usize>,
}

impl MessageBuffer {
    fn push(&mut self, recipient: Recipient, text: String) {
        match self.index.get(&recipient) {
            Some(&i) => self.order[i].messages.push(text),
            None => {
                self.index.insert(recipient.clone(), self.order.len());
                self.order.push(RecipientBuffer {
                    recipient,
                    messages: vec![text],
                });
            }
        }
    }
}

pub struct BufferedMessageSender {
    client: Arc<DiscordHttpClient>,
    buffer: Mutex<MessageBuffer>,
    flushed: AtomicBool,
}

impl BufferedMessageSender {
    pub fn new(client: Arc<DiscordHttpClient>) -> Self {
        Self {
            client,
            buffer: Mutex::new(MessageBuffer::default()),
            flushed: AtomicBool::new(false),
        }
    }

    pub fn from_config(config: &DiscordConfig) -> Self {
        Self::new(Arc::new(DiscordHttpClient::new(config)))
    }

    pub fn client(&self) -> &Arc<DiscordHttpClient> {
        &self.client
    }

    /// Number of recipients with buffered messages.
    pub async fn pending_recipients(&self) -> usize {
        self.buffer.lock().await.order.len()
    }

    /// Post one recipient's joined content. Returns whether every chunk landed.
    async fn deliver(&self, entry: &RecipientBuffer) -> Result<bool, SendError> {
        let content = entry.messages.join("\n");
        let chunks = split_message(&content, self.client.max_message_len());
        if chunks.len() > 1 {
            info!(
                recipient = %entry.recipient,
                chars = content.chars().count(),
                chunks = chunks.len(),
                "buffered content exceeds message limit, splitting"
            );
        }

        for (i, chunk) in chunks.iter().enumerate() {
            if !self.client.send_to(&entry.recipient, chunk).await? {
                warn!(
                    recipient = %entry.recipient,
                    chunk = i + 1,
                    of = chunks.len(),
                    "buffered message dropped"
                );
                return Ok(false);
            }
        }
        Ok(true)
    }
}

#[async_trait]
impl MessageSender for BufferedMessageSender {
    fn name(&self) -> &str {
        "buffered"
    }

    /// Never touches the network; always `Ok(true)` for a valid expansion.
    async fn add_message(
        &self,
        template: &MessageTemplate,
        args: &TemplateArgs,
    ) -> Result<bool, SendError> {
        let pairs = template.expand(args)?;
        // `flush` sets the flag under this lock, so a push is never lost.
        let mut buffer = self.buffer.lock().await;
        if self.flushed.load(Ordering::SeqCst) {
            return Err(SendError::Flushed);
        }
        for (text, recipient) in pairs {
            buffer.push(recipient, text);
        }
        Ok(true)
    }

    /// Deliver every buffer, close the client, then report the first
    /// transport error if one happened along the way.
    async fn flush(&self) -> Result<(), SendError> {
        let buffer = {
            let mut guard = self.buffer.lock().await;
            if self.flushed.swap(true, Ordering::SeqCst) {
                debug!("buffered sender already flushed");
                return Ok(());
            }
            std::mem::take(&mut *guard)
        };
        let total = buffer.order.len();
        let mut delivered = 0usize;
        let mut first_error = None;

        for entry in buffer.order.iter().filter(|e| !e.messages.is_empty()) {
            match self.deliver(entry).await {
                Ok(true) => delivered += 1,
                Ok(false) => {}
                Err(e) => {
                    error!(recipient = %entry.recipient, error = %e, "buffered flush failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        self.client.close();
        info!(recipients = total, delivered, "buffered flush complete");

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
