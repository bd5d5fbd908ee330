//! `pingcord send` / `pingcord run` — feed items through the delivery pipeline.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use colored::Colorize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use pingcord_channels::{
    BufferedMessageSender, DirectMessageSender, ItemPipeline, MessageSender, TemplateItem,
    TemplateRegistry,
};
use pingcord_core::config::{Config, DeliveryMode};

/// Counters printed at the end of `run`.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub delivered: usize,
    pub dropped: usize,
    pub interrupted: bool,
}

impl RunSummary {
    fn print(&self) {
        println!();
        println!(
            "  {:<12} {}",
            "Delivered:".bold(),
            self.delivered.to_string().green()
        );
        let dropped = if self.dropped == 0 {
            self.dropped.to_string().dimmed()
        } else {
            self.dropped.to_string().yellow()
        };
        println!("  {:<12} {}", "Dropped:".bold(), dropped);
        if self.interrupted {
            println!("  {}", "(interrupted, pending messages flushed)".dimmed());
        }
        println!();
    }
}

/// Build the sender for `mode`. The client connects lazily on first use.
fn build_sender(config: &Config, mode: DeliveryMode) -> Result<Arc<dyn MessageSender>> {
    if !config.discord.is_configured() {
        bail!("no Discord bot token configured; set discord.token or PINGCORD_DISCORD__TOKEN");
    }
    let sender: Arc<dyn MessageSender> = match mode {
        DeliveryMode::Direct => Arc::new(DirectMessageSender::from_config(&config.discord)),
        DeliveryMode::Buffered => Arc::new(BufferedMessageSender::from_config(&config.discord)),
    };
    Ok(sender)
}

fn build_pipeline(config: &Config, mode: DeliveryMode) -> Result<ItemPipeline> {
    let registry =
        TemplateRegistry::from_config(&config.templates).context("invalid template config")?;
    if registry.is_empty() {
        warn!("no templates configured, every item will be dropped");
    }
    Ok(ItemPipeline::new(registry, build_sender(config, mode)?))
}

/// Parse one JSON line. Blank lines yield `None`.
pub fn parse_item(line: &str) -> Result<Option<TemplateItem>, serde_json::Error> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(line).map(Some)
}

/// Run `pingcord send`: one item through a direct sender.
pub async fn send(config: &Config, template: &str, data: &str) -> Result<()> {
    let data: serde_json::Value =
        serde_json::from_str(data).context("--data is not valid JSON")?;
    let pipeline = build_pipeline(config, DeliveryMode::Direct)?;

    let outcome = pipeline
        .process_item(TemplateItem::new(template, data))
        .await;
    pipeline.close().await.context("failed to close sender")?;

    outcome.with_context(|| format!("item for template '{template}' was dropped"))?;
    println!("{} sent '{}'", "✓".green(), template);
    Ok(())
}

/// Run `pingcord run`: JSON-lines items from `input` (or stdin), flushed at
/// end of input or on Ctrl-C.
pub async fn run(config: &Config, input: Option<PathBuf>, buffered: bool) -> Result<()> {
    let mode = if buffered {
        DeliveryMode::Buffered
    } else {
        config.delivery.mode
    };
    let pipeline = build_pipeline(config, mode)?;

    let reader: Box<dyn AsyncBufRead + Unpin + Send> = match &input {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("failed to open {}", path.display()))?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };

    info!(mode = %mode, input = ?input, "starting run");
    let summary = process_lines(&pipeline, reader, tokio::signal::ctrl_c()).await;
    let flushed = pipeline.close().await;

    let summary = summary?;
    summary.print();
    flushed.context("flush failed")?;
    Ok(())
}

/// Feed every line of `reader` to the pipeline until end of input or until
/// `shutdown` resolves. Dropped items are logged and counted.
pub async fn process_lines<R, S, T>(
    pipeline: &ItemPipeline,
    reader: R,
    shutdown: S,
) -> Result<RunSummary>
where
    R: AsyncBufRead + Unpin,
    S: Future<Output = T>,
{
    let mut reader = reader;
    let mut summary = RunSummary::default();
    tokio::pin!(shutdown);

    let mut buf = Vec::new();
    let mut line_no = 0usize;
    loop {
        buf.clear();
        let read = tokio::select! {
            read = reader.read_until(b'\n', &mut buf) => read.context("failed to read input")?,
            _ = &mut shutdown => {
                warn!("interrupted, flushing pending messages");
                summary.interrupted = true;
                break;
            }
        };
        if read == 0 {
            break;
        }
        line_no += 1;

        let line = match std::str::from_utf8(&buf) {
            Ok(line) => line,
            Err(e) => {
                warn!(line = line_no, error = %e, "dropping item that is not valid UTF-8");
                summary.dropped += 1;
                continue;
            }
        };

        let item = match parse_item(line) {
            Ok(Some(item)) => item,
            Ok(None) => continue,
            Err(e) => {
                warn!(line = line_no, error = %e, "dropping unparseable item");
                summary.dropped += 1;
                continue;
            }
        };

        match pipeline.process_item(item).await {
            Ok(()) => summary.delivered += 1,
            Err(e) => {
                warn!(line = line_no, reason = %e, "dropped item");
                summary.dropped += 1;
            }
        }
    }

    info!(
        delivered = summary.delivered,
        dropped = summary.dropped,
        "run finished"
    );
    Ok(summary)
}
