//! Item pipeline — turns producer items into `MessageSender` calls.
//!
//! A producer emits items naming a registered template and the data to fill
//! it with. Bad items are dropped one at a time; they never stop the run.
//!
//! Responsibilities:
//! - Hold the template registry (from config or registered in code)
//! - Validate each item and pick its template
//! - Hand the item to the configured sender and report drops
//! - Flush the sender when the run ends

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use pingcord_core::config::TemplateConfig;
use pingcord_core::{FormatError, MessageTemplate, TemplateArgs};

use crate::base::MessageSender;
use crate::error::SendError;

// ─────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────

/// Why an item was dropped. Fatal to that item only.
#[derive(Debug, Error)]
pub enum DropItem {
    #[error("item has no template key")]
    MissingTemplate,

    #[error("item has no template data")]
    MissingTemplateData,

    /// Template data must be a JSON array or object.
    #[error("template data must be an array or an object, got {0}")]
    InvalidTemplateData(&'static str),

    #[error("unknown template '{0}'")]
    UnknownTemplate(String),

    #[error("message could not be delivered to every recipient")]
    DeliveryFailed,

    #[error(transparent)]
    Send(#[from] SendError),
}

#[derive(Debug, Error)]
#[error("invalid template '{key}': {source}")]
pub struct InvalidTemplate {
    pub key: String,
    #[source]
    pub source: FormatError,
}

// ─────────────────────────────────────────────
// TemplateRegistry
// ─────────────────────────────────────────────

/// Template key → `MessageTemplate`.
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    templates: HashMap<String, MessageTemplate>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the `templates` section of the config. Every template
    /// string is validated up front.
    pub fn from_config(templates: &HashMap<String, TemplateConfig>) -> Result<Self, InvalidTemplate> {
        let mut registry = Self::new();
        for (key, cfg) in templates {
            let template = cfg.to_template().map_err(|source| InvalidTemplate {
                key: key.clone(),
                source,
            })?;
            registry.register(key.clone(), template);
        }
        Ok(registry)
    }

    /// Register a template. Overwrites any previous template with the same key.
    pub fn register(&mut self, key: impl Into<String>, template: MessageTemplate) -> &mut Self {
        let key = key.into();
        debug!(template = %key, recipients = template.recipients().len(), "registered template");
        self.templates.insert(key, template);
        self
    }

    pub fn get(&self, key: &str) -> Option<&MessageTemplate> {
        self.templates.get(key)
    }

    /// Registered keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.templates.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

// ─────────────────────────────────────────────
// TemplateItem
// ─────────────────────────────────────────────

/// One producer item, typically read from a JSON line:
///
/// ```json
/// {"template": "deploy", "template_data": {"service": "api", "version": "1.4.2"}}
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateItem {
    pub template: Option<String>,
    pub template_data: Option<Value>,
}

impl TemplateItem {
    pub fn new(template: impl Into<String>, data: impl Into<Value>) -> Self {
        Self {
            template: Some(template.into()),
            template_data: Some(data.into()),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ─────────────────────────────────────────────
// ItemPipeline
// ─────────────────────────────────────────────

/// Feeds validated items to one `MessageSender` for the length of a run.
pub struct ItemPipeline {
    registry: TemplateRegistry,
    sender: Arc<dyn MessageSender>,
}

impl ItemPipeline {
    pub fn new(registry: TemplateRegistry, sender: Arc<dyn MessageSender>) -> Self {
        info!(
            sender = sender.name(),
            templates = registry.len(),
            "item pipeline ready"
        );
        Self { registry, sender }
    }

    pub fn registry(&self) -> &TemplateRegistry {
        &self.registry
    }

    pub fn sender(&self) -> &Arc<dyn MessageSender> {
        &self.sender
    }

    /// Validate `item` and pass it to the sender.
    pub async fn process_item(&self, item: TemplateItem) -> Result<(), DropItem> {
        let key = item.template.ok_or(DropItem::MissingTemplate)?;
        let data = item.template_data.ok_or(DropItem::MissingTemplateData)?;
        let template = self
            .registry
            .get(&key)
            .ok_or_else(|| DropItem::UnknownTemplate(key.clone()))?;

        let kind = json_kind(&data);
        let args = TemplateArgs::from_value(data).ok_or(DropItem::InvalidTemplateData(kind))?;

        if self.sender.add_message(template, &args).await? {
            debug!(template = %key, "item delivered");
            Ok(())
        } else {
            warn!(template = %key, "item delivery failed");
            Err(DropItem::DeliveryFailed)
        }
    }

    /// End of run: flush the sender.
    pub async fn close(&self) -> Result<(), SendError> {
        info!(sender = self.sender.name(), "closing item pipeline");
        self.sender.flush().await
    }
}
