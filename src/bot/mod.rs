//! Chat command dispatch.
//!
//! Maps inbound chat messages onto orchestrator and resolver operations.
//! Authorization happens here, against a fixed allow-list of sender
//! identities: unauthorized senders get no reply and cause no state change,
//! only a debug log line. An empty allow-list denies everyone.

pub mod format;

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::adapters::{ChatSender, InboundMessage};
use crate::config::{ConfigKey, ConfigResolver};
use crate::core::{Orchestrator, Submission};
use crate::domain::TriggerSource;

/// A recognized command verb with its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Rebuild,
    Status,
    Set { key: String, value: String },
    Get { key: String },
    GetAll,
    Config,
    Defaults,
    Help,
}

/// Parse a message body into a command. Unrecognized input returns `None`
/// and is ignored, so ordinary room chatter passes through silently.
pub fn parse_command(body: &str) -> Option<Command> {
    let body = body.trim();

    match body {
        "!rebuild" => return Some(Command::Rebuild),
        "!status" => return Some(Command::Status),
        "!get all" => return Some(Command::GetAll),
        "!config" => return Some(Command::Config),
        "!defaults" => return Some(Command::Defaults),
        "!help" => return Some(Command::Help),
        _ => {}
    }

    if let Some(rest) = body.strip_prefix("!set ") {
        let mut parts = rest.splitn(2, char::is_whitespace);
        let key = parts.next()?.to_string();
        let value = parts.next()?.trim().to_string();
        return Some(Command::Set { key, value });
    }

    if let Some(rest) = body.strip_prefix("!get ") {
        return Some(Command::Get {
            key: rest.trim().to_string(),
        });
    }

    None
}

/// Routes authorized commands to the orchestrator and resolver.
pub struct CommandDispatcher {
    orchestrator: Arc<Orchestrator>,
    resolver: Arc<ConfigResolver>,
    chat: Arc<dyn ChatSender>,
    allowed_senders: Vec<String>,
}

impl CommandDispatcher {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        resolver: Arc<ConfigResolver>,
        chat: Arc<dyn ChatSender>,
        allowed_senders: Vec<String>,
    ) -> Self {
        Self {
            orchestrator,
            resolver,
            chat,
            allowed_senders,
        }
    }

    fn is_authorized(&self, sender: &str) -> bool {
        self.allowed_senders.iter().any(|s| s == sender)
    }

    /// Handle one inbound message end to end.
    pub async fn handle(&self, message: &InboundMessage) {
        if !self.is_authorized(&message.sender) {
            // Silent rejection: no reply, no state change.
            debug!(sender = %message.sender, "Ignoring message from unauthorized sender");
            return;
        }

        let Some(command) = parse_command(&message.body) else {
            return;
        };
        info!(sender = %message.sender, ?command, "Processing command");

        match command {
            Command::Rebuild => self.handle_rebuild().await,
            Command::Status => self.handle_status().await,
            Command::Set { key, value } => self.handle_set(&key, &value).await,
            Command::Get { key } => self.handle_get(&key).await,
            Command::GetAll => self.handle_get_all().await,
            Command::Config => self.handle_config().await,
            Command::Defaults => self.handle_defaults().await,
            Command::Help => self.handle_help().await,
        }
    }

    /// Drain the inbound channel until it closes.
    pub async fn run(self, mut rx: mpsc::Receiver<InboundMessage>) {
        while let Some(message) = rx.recv().await {
            self.handle(&message).await;
        }
    }

    async fn reply(&self, text: &str, html: Option<&str>) {
        if let Err(e) = self.chat.send(text, html).await {
            warn!(error = %e, "Reply could not be sent");
        }
    }

    async fn handle_rebuild(&self) {
        match self.orchestrator.submit(TriggerSource::Manual) {
            Submission::Accepted(id) => {
                self.reply(
                    &format!("🚀 Starting manual rebuild ({id}). You will be notified when it completes."),
                    None,
                )
                .await;
            }
            Submission::Rejected(reason) => {
                self.reply(&format!("⏳ Rebuild not started: {reason}."), None)
                    .await;
            }
        }
    }

    async fn handle_status(&self) {
        let snapshot = self.orchestrator.status();
        let health = self.orchestrator.health().summary();
        self.reply(&format::status(&snapshot, &health), None).await;
    }

    async fn handle_set(&self, key: &str, value: &str) {
        match self.resolver.set_override(key, value) {
            Ok(key) => {
                self.reply(
                    &format!("✅ Set {key} = {value}\n\n⚠️ Changes take effect on the next rebuild."),
                    None,
                )
                .await;
            }
            Err(e) => self.reply(&format!("❌ {e}"), None).await,
        }
    }

    async fn handle_get(&self, key_name: &str) {
        let Some(key) = ConfigKey::from_name(key_name) else {
            self.reply(
                &format!("❌ '{key_name}' is not a configurable setting.\nUse !config to see available settings."),
                None,
            )
            .await;
            return;
        };

        match self.resolver.resolve(key) {
            Ok((value, source)) => {
                self.reply(&format::single_value(key, &value, source), None)
                    .await;
            }
            Err(e) => self.reply(&format!("❌ {e}"), None).await,
        }
    }

    async fn handle_get_all(&self) {
        match self.resolver.resolve_all() {
            Ok(config) => {
                let (text, html) = format::full_config(&config);
                self.reply(&text, Some(&html)).await;
            }
            Err(e) => self.reply(&format!("❌ {e}"), None).await,
        }
    }

    async fn handle_config(&self) {
        match self.resolver.overrides() {
            Ok(overrides) => self.reply(&format::overrides(&overrides), None).await,
            Err(e) => self.reply(&format!("❌ {e}"), None).await,
        }
    }

    async fn handle_defaults(&self) {
        match self.resolver.clear_all() {
            Ok(count) => {
                self.reply(
                    &format!(
                        "♻️ Reset {count} configuration override(s).\n\
                         All settings now use environment defaults.\n\n\
                         ⚠️ Changes take effect on the next rebuild."
                    ),
                    None,
                )
                .await;
            }
            Err(e) => self.reply(&format!("❌ {e}"), None).await,
        }
    }

    async fn handle_help(&self) {
        let (text, html) = format::help();
        self.reply(&text, Some(&html)).await;
    }
}
