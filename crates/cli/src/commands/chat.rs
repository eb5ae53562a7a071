//! `parley chat` — the terminal as a chat channel.
//!
//! Typed lines become messages from one author in one channel and go
//! through the full mediator pipeline, so they must address the agent
//! (`@agent …` or `!agent …`) to get an answer. `/trace` and `/tools`
//! print diagnostics instead.

use std::io::Write;
use std::sync::Arc;

use parley_agent::{AgentMediator, InvocationOutcome, SkipReason};
use parley_channels::{CliChannel, LineFormat, StdoutSink};
use parley_config::{AgentMode, AgentSettings, apply_startup_mode};
use parley_core::channel::MessageSource;

pub struct ChatOptions {
    pub channel: String,
    pub guild: Option<String>,
    pub author: String,
    pub mode: Option<AgentMode>,
    pub json: bool,
}

/// Terminal-only commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Diagnostics {
    /// Dump the trace buffer as JSON
    Trace,
    /// List tools and the audit log
    Tools,
}

impl Diagnostics {
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim() {
            "/trace" => Some(Self::Trace),
            "/tools" => Some(Self::Tools),
            _ => None,
        }
    }
}

pub fn render_diagnostics(mediator: &AgentMediator, command: Diagnostics) -> Result<String, Box<dyn std::error::Error>> {
    match command {
        Diagnostics::Trace => Ok(mediator.traces().to_json()?),
        Diagnostics::Tools => {
            let report = serde_json::json!({
                "tools": mediator.tools().names(),
                "audit": mediator.audit().entries(),
            });
            Ok(serde_json::to_string_pretty(&report)?)
        }
    }
}

/// One status line for outcomes the reply sink did not already print.
pub fn describe(outcome: &parley_core::Result<InvocationOutcome>, settings: &AgentSettings) -> Option<String> {
    match outcome {
        Ok(InvocationOutcome::Replied { .. }) => None,
        Ok(InvocationOutcome::NoReply { .. }) => Some("  [no reply]".into()),
        Ok(InvocationOutcome::PolicyBlocked { reason, .. }) => Some(format!("  [blocked by policy: {reason}]")),
        Ok(InvocationOutcome::RateLimited { .. }) => Some("  [rate limited, try again shortly]".into()),
        Ok(InvocationOutcome::Skipped(SkipReason::NotInvoked)) => Some(format!(
            "  (not addressed to the agent; start with @{} or {})",
            settings.mention_name, settings.invocation_prefix
        )),
        Ok(InvocationOutcome::Skipped(SkipReason::BlockedContent)) => {
            Some("  [message contains sensitive data and was ignored]".into())
        }
        Ok(InvocationOutcome::Skipped(_)) => None,
        Err(e) => Some(format!("  [Error] {}: {e}", e.category())),
    }
}

pub async fn run(options: ChatOptions) -> Result<(), Box<dyn std::error::Error>> {
    let mut settings = AgentSettings::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let source = apply_startup_mode(&mut settings, options.mode);
    tracing::info!(mode = %settings.active_mode(), %source, "Startup mode resolved");

    let provider = parley_providers::build_provider(&settings);
    let tools = Arc::new(parley_tools::default_registry());
    let mediator = Arc::new(AgentMediator::new(settings.clone(), provider, tools, Arc::new(StdoutSink)));

    let format = if options.json { LineFormat::Json } else { LineFormat::Text };
    let channel = CliChannel::new(options.channel)
        .with_guild(options.guild)
        .with_author(options.author)
        .with_format(format);

    if options.json {
        mediator.run(&channel).await?;
        return Ok(());
    }

    println!();
    println!("  Parley — channel {}", channel.channel_id());
    println!();
    println!("  Mode:   {} ({source})", settings.active_mode());
    println!("  Model:  {}", settings.active_model());
    println!("  Invoke: @{} or {}", settings.mention_name, settings.invocation_prefix);
    println!("  Type /trace or /tools for diagnostics, 'exit' or Ctrl+D to quit.");
    println!();

    let mut rx = channel.start().await.map_err(|e| format!("Channel error: {e}"))?;

    print!("  > ");
    std::io::stdout().flush()?;

    while let Some(item) = rx.recv().await {
        match item {
            Ok(message) => {
                if let Some(command) = Diagnostics::parse(&message.content) {
                    println!("{}", render_diagnostics(&mediator, command)?);
                } else {
                    let outcome = mediator.handle(message).await;
                    if let Some(line) = describe(&outcome, &mediator.settings()) {
                        eprintln!("{line}");
                    }
                }
            }
            Err(e) => eprintln!("  [Channel Error] {e}"),
        }

        print!("  > ");
        std::io::stdout().flush()?;
    }

    println!();
    println!("  Goodbye!");
    println!();

    Ok(())
}
