//! Event-handler control flow for inbound messages.

use std::sync::Arc;

use crate::{
    backend::TranslationBackend,
    commands::{parse_command, CommandHandler, COMMAND_ERROR_REPLY},
    config::Config,
    delivery::{Delivery, DeliveryConfig},
    domain::{IncomingMessage, MessageRef},
    memory::TranslationMemory,
    messaging::port::MessagingPort,
    metrics::PipelineMetrics,
    pipeline::{PipelineOutcome, ServedBy, TranslationPipeline},
    preprocess::Preprocessor,
    queue::{ConcurrencyQueue, Ticket},
    server_config::{ServerConfigPort, StatsDelta},
    session::SessionRegistry,
};

/// External collaborators the bot is wired with.
pub struct BotDeps {
    pub backend: Arc<dyn TranslationBackend>,
    pub messenger: Arc<dyn MessagingPort>,
    pub server_config: Arc<dyn ServerConfigPort>,
    pub memory: TranslationMemory,
}

/// Command output still to be posted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandReply {
    pub to: MessageRef,
    pub text: String,
}

/// What happened to an inbound message.
pub enum Disposition {
    /// Authored by a bot (including ourselves).
    Ignored,
    /// Handled as a prefix command. The reply is sent with
    /// [`TranslatorBot::send_reply`].
    Command(Option<CommandReply>),
    /// No session in the channel, or auto-translation is off for the server.
    Inactive,
    /// Admitted to the translation queue.
    Queued(Ticket<()>),
}

/// Owns every runtime service; adapters feed it messages.
pub struct TranslatorBot {
    messenger: Arc<dyn MessagingPort>,
    server_config: Arc<dyn ServerConfigPort>,
    sessions: Arc<SessionRegistry>,
    commands: CommandHandler,
    pipeline: Arc<TranslationPipeline>,
    delivery: Arc<Delivery>,
    queue: ConcurrencyQueue,
    memory: TranslationMemory,
    prefix: String,
}

impl TranslatorBot {
    pub fn new(cfg: &Config, deps: BotDeps) -> Self {
        let BotDeps {
            backend,
            messenger,
            server_config,
            memory,
        } = deps;

        let sessions = Arc::new(SessionRegistry::new(Arc::clone(&server_config)));
        let commands = CommandHandler::new(
            Arc::clone(&sessions),
            Arc::clone(&server_config),
            cfg.command_prefix.clone(),
        );
        let pipeline = Arc::new(TranslationPipeline::new(
            backend,
            memory.clone(),
            Arc::clone(&messenger),
            Preprocessor::new(cfg.preprocessing),
            cfg.emojis.clone(),
            cfg.command_prefix.clone(),
            Arc::new(PipelineMetrics::new(cfg.metrics_log_every)),
        ));
        let delivery = Arc::new(Delivery::new(
            Arc::clone(&messenger),
            cfg.webhook_name.clone(),
            DeliveryConfig {
                safe_limit: cfg.message_safe_limit,
                part_delay: cfg.part_delay,
                avatar_url: cfg.webhook_avatar_url.clone(),
                error_avatar_url: cfg.error_avatar_url.clone(),
            },
        ));

        Self {
            messenger,
            server_config,
            sessions,
            commands,
            pipeline,
            delivery,
            queue: ConcurrencyQueue::new(cfg.translation_concurrency),
            memory,
            prefix: cfg.command_prefix.clone(),
        }
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    pub fn queue(&self) -> &ConcurrencyQueue {
        &self.queue
    }

    pub fn memory(&self) -> &TranslationMemory {
        &self.memory
    }

    /// Admit one message: commands run and translations are queued before
    /// this returns. Callers feed messages one at a time in arrival order so
    /// queue admission keeps that order; only the returned reply or ticket
    /// should be awaited elsewhere.
    pub async fn handle_message(&self, msg: IncomingMessage) -> Disposition {
        if msg.author.is_bot {
            return Disposition::Ignored;
        }

        if let Some(cmd) = parse_command(&msg.content, &self.prefix) {
            let reply = match self.commands.execute(&msg, &cmd).await {
                Ok(reply) => reply,
                Err(e) => {
                    tracing::error!("Error executing command {}: {e}", cmd.name);
                    Some(COMMAND_ERROR_REPLY.to_string())
                }
            };
            return Disposition::Command(reply.map(|text| CommandReply {
                to: msg.message,
                text,
            }));
        }

        let channel = msg.channel_id();
        if !self.sessions.is_active(channel).await {
            return Disposition::Inactive;
        }

        let server_cfg = self.server_config.load(msg.server_id).await;
        if !server_cfg.auto_translate {
            tracing::debug!("Auto-translate disabled for server {}", msg.server_id);
            return Disposition::Inactive;
        }

        let pipeline = Arc::clone(&self.pipeline);
        let delivery = Arc::clone(&self.delivery);
        let sessions = Arc::clone(&self.sessions);
        let server_config = Arc::clone(&self.server_config);

        let ticket = self.queue.submit(move || async move {
            match pipeline.translate(&msg, &server_cfg).await {
                PipelineOutcome::Translated(result) => {
                    if let Err(e) = delivery.deliver_translation(&msg, &result).await {
                        tracing::error!("Could not deliver translation: {e}");
                    }
                    let tokens = match result.served_by {
                        ServedBy::Cache => 0,
                        ServedBy::Backend(_) => result.tokens.total,
                    };
                    sessions.record_translation(channel, tokens).await;
                    if let Err(e) = server_config
                        .update_stats(msg.server_id, StatsDelta::translation(tokens))
                        .await
                    {
                        tracing::warn!("Could not update server stats: {e}");
                    }
                }
                PipelineOutcome::Skipped(reason) => {
                    tracing::debug!("Message {} skipped: {reason:?}", msg.message.message_id);
                }
                PipelineOutcome::Failed(failure) => {
                    if let Err(e) = delivery.deliver_error(&msg, &failure).await {
                        tracing::error!("Could not send error message: {e}");
                    }
                }
            }
        });
        Disposition::Queued(ticket)
    }

    pub async fn send_reply(&self, reply: CommandReply) {
        if let Err(e) = self.messenger.reply(reply.to, &reply.text).await {
            tracing::warn!("Could not send command reply: {e}");
        }
    }

    /// Flush the translation memory and drop cached webhooks.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down: flushing translation memory");
        if let Err(e) = self.memory.shutdown() {
            tracing::error!("Failed to flush translation memory: {e}");
        }
        self.delivery.webhooks().clear().await;
    }
}
