//! Prefix commands: `start`, `end`, `mode`, `model`, `stats`, `help`.
//!
//! Handlers return the reply text; the caller sends it.

use std::sync::Arc;

use chrono::DateTime;

use crate::{
    backend::BackendKind,
    domain::IncomingMessage,
    errors::Error,
    formatting::format_duration,
    language::Mode,
    server_config::ServerConfigPort,
    session::SessionRegistry,
    Result,
};

pub const COMMAND_ERROR_REPLY: &str = "❌ There was an error trying to execute that command!";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandName {
    Start,
    End,
    Mode,
    Model,
    Stats,
    Help,
}

impl CommandName {
    fn from_word(word: &str) -> Option<Self> {
        match word {
            "start" => Some(Self::Start),
            "end" => Some(Self::End),
            "mode" => Some(Self::Mode),
            "model" => Some(Self::Model),
            "stats" => Some(Self::Stats),
            "help" => Some(Self::Help),
            _ => None,
        }
    }
}

/// A prefixed message split into a lower-cased name and its arguments.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedCommand {
    pub name: String,
    pub args: Vec<String>,
}

impl ParsedCommand {
    pub fn known(&self) -> Option<CommandName> {
        CommandName::from_word(&self.name)
    }
}

/// `None` when `content` does not start with `prefix`.
pub fn parse_command(content: &str, prefix: &str) -> Option<ParsedCommand> {
    let rest = content.strip_prefix(prefix)?;
    let mut words = rest.split_whitespace();
    let name = words.next().unwrap_or_default().to_lowercase();
    Some(ParsedCommand {
        name,
        args: words.map(str::to_string).collect(),
    })
}

pub struct CommandHandler {
    sessions: Arc<SessionRegistry>,
    server_config: Arc<dyn ServerConfigPort>,
    prefix: String,
}

impl CommandHandler {
    pub fn new(
        sessions: Arc<SessionRegistry>,
        server_config: Arc<dyn ServerConfigPort>,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            sessions,
            server_config,
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Reply text for a known command, `Ok(None)` for unknown ones.
    pub async fn execute(
        &self,
        msg: &IncomingMessage,
        cmd: &ParsedCommand,
    ) -> Result<Option<String>> {
        let Some(name) = cmd.known() else {
            return Ok(None);
        };
        tracing::info!(
            "Command {} from {} in channel {}",
            cmd.name,
            msg.author.name,
            msg.channel_id()
        );
        let arg = cmd.args.first().map(|a| a.to_lowercase());

        let reply = match name {
            CommandName::Start => self.start(msg).await?,
            CommandName::End => self.end(msg).await?,
            CommandName::Mode => self.mode(msg, arg.as_deref()).await?,
            CommandName::Model => self.model(msg, arg.as_deref()).await?,
            CommandName::Stats => self.stats(msg).await,
            CommandName::Help => self.help(),
        };
        Ok(Some(reply))
    }

    async fn start(&self, msg: &IncomingMessage) -> Result<String> {
        let p = &self.prefix;
        let cfg = self.server_config.load(msg.server_id).await;
        match self.sessions.start(msg.channel_id(), msg.server_id).await {
            Ok(_) => Ok(format!(
                "🎉 Translation session started in this channel!\n\n\
                 Mode: **{}**\n\
                 Model: **{}**\n\n\
                 • Messages will be automatically translated\n\
                 • Use `{p}end` to stop the session\n\
                 • Use `{p}mode [korean|japanese]` to change language mode\n\
                 • Use `{p}model [gpt4o|claude|gemini]` to change AI model",
                cfg.mode.display_name(),
                cfg.model
            )),
            Err(Error::AlreadyActive(_)) => Ok(format!(
                "A translation session is already active in this channel. Use `{p}end` to stop it first."
            )),
            Err(e) => Err(e),
        }
    }

    async fn end(&self, msg: &IncomingMessage) -> Result<String> {
        let p = &self.prefix;
        match self.sessions.end(msg.channel_id()).await {
            Ok(summary) => Ok(format!(
                "🛑 Translation session ended!\n\n\
                 **Session Statistics:**\n\
                 • Duration: {}\n\
                 • Messages Translated: {}\n\
                 • Total Tokens Used: {}\n\n\
                 Use `{p}start` to begin a new translation session.",
                format_duration(summary.duration),
                summary.translations,
                summary.total_tokens
            )),
            Err(Error::NoActiveSession(_)) => Ok(format!(
                "No active translation session in this channel. Use `{p}start` to begin one."
            )),
            Err(e) => Err(e),
        }
    }

    fn mode_choices(&self) -> String {
        Mode::ALL
            .iter()
            .map(|m| format!("• `{}mode {}` - {}", self.prefix, m.as_str(), m.describe()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    async fn mode(&self, msg: &IncomingMessage, arg: Option<&str>) -> Result<String> {
        let mut cfg = self.server_config.load(msg.server_id).await;

        let Some(raw) = arg else {
            return Ok(format!(
                "Current language mode is: **{}**\n\nAvailable modes:\n{}",
                cfg.mode.display_name(),
                self.mode_choices()
            ));
        };
        let Ok(requested) = raw.parse::<Mode>() else {
            return Ok(format!(
                "❌ Invalid mode: \"{raw}\"\n\nAvailable modes:\n{}",
                self.mode_choices()
            ));
        };
        if cfg.mode == requested {
            return Ok(format!(
                "Language mode is already set to **{}**",
                requested.display_name()
            ));
        }

        cfg.mode = requested;
        self.server_config.save(msg.server_id, &cfg).await?;
        tracing::info!("Server {} switched to {requested} mode", msg.server_id);
        Ok(format!(
            "✅ Language mode changed to **{}**\n\n• {}",
            requested.display_name(),
            requested.describe()
        ))
    }

    fn model_choices(&self) -> String {
        BackendKind::ALL
            .iter()
            .map(|k| format!("• `{}model {}` - {}", self.prefix, k.as_str(), k.description()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    async fn model(&self, msg: &IncomingMessage, arg: Option<&str>) -> Result<String> {
        let mut cfg = self.server_config.load(msg.server_id).await;

        let Some(raw) = arg else {
            return Ok(format!(
                "Current AI model is: **{}**\n\nAvailable models:\n{}",
                cfg.model,
                self.model_choices()
            ));
        };
        let Ok(requested) = raw.parse::<BackendKind>() else {
            return Ok(format!(
                "❌ Invalid model: \"{raw}\"\n\nAvailable models:\n{}",
                self.model_choices()
            ));
        };
        if cfg.model == requested {
            return Ok(format!("AI model is already set to **{requested}**"));
        }

        cfg.model = requested;
        self.server_config.save(msg.server_id, &cfg).await?;
        tracing::info!("Server {} switched to model {requested}", msg.server_id);
        Ok(format!(
            "✅ AI model changed to **{requested}**\n\nNow using: {}",
            requested.description()
        ))
    }

    async fn stats(&self, msg: &IncomingMessage) -> String {
        let cfg = self.server_config.load(msg.server_id).await;
        let active = self.sessions.active_in_server(msg.server_id).await;
        let flag = cfg.mode.home_language().flag();

        format!(
            "📊 **Translation Statistics for This Server**\n\n\
             **Current Status:**\n\
             • Mode: {flag} {}\n\
             • Model: {}\n\
             • Active Sessions: {}\n\n\
             **Usage Statistics:**\n\
             • Total Translations: {}\n\
             • Total Tokens Used: {}\n\
             • Sessions Started: {}\n\
             • Last Used: {}",
            cfg.mode.display_name(),
            cfg.model,
            active.len(),
            cfg.stats.total_translations,
            cfg.stats.total_tokens,
            cfg.stats.sessions_started,
            format_last_used(&cfg.stats.last_used)
        )
    }

    fn help(&self) -> String {
        let p = &self.prefix;
        format!(
            "🤖 **Discord Translation Bot Help**\n\n\
             **Available Commands:**\n\
             • `{p}start` - Start a translation session in the current channel\n\
             • `{p}end` - End the current translation session\n\
             • `{p}mode [korean|japanese]` - Switch language mode (korean/japanese)\n\
             • `{p}model [gpt4o|claude|gemini]` - Switch AI model (gpt4o/claude/gemini)\n\
             • `{p}stats` - Show translation statistics\n\
             • `{p}help` - Show this help message\n\n\
             **How It Works:**\n\
             1. Start a translation session with `{p}start` in a specific channel\n\
             2. Send messages in any supported language (English, Korean, Japanese)\n\
             3. The bot automatically detects the language and translates when needed\n\
             4. Translations appear in the channel with a flag on the original message\n\
             5. End the session with `{p}end` when you're done\n\n\
             **Language Modes:**\n\
             • **Korean Mode**: {}\n\
             • **Japanese Mode**: {}",
            Mode::Korean.describe(),
            Mode::Japanese.describe()
        )
    }
}

/// `Jan 5, 2025, 03:04 PM` (UTC); the raw value if it does not parse.
fn format_last_used(raw: &str) -> String {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(ts) => ts.format("%b %-d, %Y, %I:%M %p").to_string(),
        Err(_) => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::ChannelId,
        testing::{incoming, FakeServerConfig, TEST_CHANNEL, TEST_SERVER},
    };

    fn handler() -> (CommandHandler, Arc<SessionRegistry>, Arc<FakeServerConfig>) {
        let cfg = Arc::new(FakeServerConfig::default());
        let sessions = Arc::new(SessionRegistry::new(cfg.clone()));
        (
            CommandHandler::new(sessions.clone(), cfg.clone(), "!"),
            sessions,
            cfg,
        )
    }

    async fn run(h: &CommandHandler, content: &str) -> Option<String> {
        let msg = incoming(1, content);
        let cmd = parse_command(content, h.prefix()).expect("prefixed");
        h.execute(&msg, &cmd).await.unwrap()
    }

    #[test]
    fn parses_name_and_args() {
        let cmd = parse_command("!Mode  Japanese extra", "!").unwrap();
        assert_eq!(cmd.name, "mode");
        assert_eq!(cmd.args, vec!["Japanese".to_string(), "extra".to_string()]);
        assert_eq!(cmd.known(), Some(CommandName::Mode));

        assert!(parse_command("hello !start", "!").is_none());
        assert_eq!(parse_command("!", "!").unwrap().known(), None);
    }

    #[tokio::test]
    async fn start_and_end_drive_the_session() {
        let (h, sessions, cfg) = handler();

        let reply = run(&h, "!start").await.unwrap();
        assert!(reply.starts_with("🎉 Translation session started"));
        assert!(reply.contains("Mode: **Korean**"));
        assert!(reply.contains("Model: **gpt4o**"));
        assert!(sessions.is_active(TEST_CHANNEL).await);
        assert_eq!(cfg.stats(TEST_SERVER).sessions_started, 1);

        let again = run(&h, "!start").await.unwrap();
        assert!(again.starts_with("A translation session is already active"));

        sessions.record_translation(TEST_CHANNEL, 17).await;
        let reply = run(&h, "!end").await.unwrap();
        assert!(reply.starts_with("🛑 Translation session ended!"));
        assert!(reply.contains("• Messages Translated: 1"));
        assert!(reply.contains("• Total Tokens Used: 17"));
        assert!(reply.contains("• Duration: 0s"));
    }

    #[tokio::test]
    async fn end_without_session_explains() {
        let (h, _, _) = handler();
        let reply = run(&h, "!end").await.unwrap();
        assert_eq!(
            reply,
            "No active translation session in this channel. Use `!start` to begin one."
        );
    }

    #[tokio::test]
    async fn mode_shows_validates_and_switches() {
        let (h, _, cfg) = handler();

        let current = run(&h, "!mode").await.unwrap();
        assert!(current.starts_with("Current language mode is: **Korean**"));

        let invalid = run(&h, "!mode german").await.unwrap();
        assert!(invalid.starts_with("❌ Invalid mode: \"german\""));

        let same = run(&h, "!mode KOREAN").await.unwrap();
        assert_eq!(same, "Language mode is already set to **Korean**");

        let changed = run(&h, "!mode japanese").await.unwrap();
        assert!(changed.starts_with("✅ Language mode changed to **Japanese**"));
        assert_eq!(cfg.snapshot(TEST_SERVER).mode, Mode::Japanese);
    }

    #[tokio::test]
    async fn model_shows_validates_and_switches() {
        let (h, _, cfg) = handler();

        let invalid = run(&h, "!model llama").await.unwrap();
        assert!(invalid.starts_with("❌ Invalid model: \"llama\""));
        assert!(invalid.contains("`!model claude` - Anthropic's Claude 3.7 Sonnet model"));

        let changed = run(&h, "!model gemini").await.unwrap();
        assert_eq!(
            changed,
            "✅ AI model changed to **gemini**\n\nNow using: Google's Gemini 2.0 Flash model"
        );
        assert_eq!(cfg.snapshot(TEST_SERVER).model, BackendKind::Gemini);

        let same = run(&h, "!model gemini").await.unwrap();
        assert_eq!(same, "AI model is already set to **gemini**");
    }

    #[tokio::test]
    async fn stats_report_stored_totals_and_active_sessions() {
        let (h, sessions, cfg) = handler();
        sessions.start(TEST_CHANNEL, TEST_SERVER).await.unwrap();
        sessions.start(ChannelId(200), TEST_SERVER).await.unwrap();
        sessions.record_translation(TEST_CHANNEL, 5).await;
        cfg.update_stats(TEST_SERVER, crate::server_config::StatsDelta::translation(5))
            .await
            .unwrap();

        let reply = run(&h, "!stats").await.unwrap();
        assert!(reply.contains("• Mode: 🇰🇷 Korean"));
        assert!(reply.contains("• Active Sessions: 2"));
        assert!(reply.contains("• Total Translations: 1"));
        assert!(reply.contains("• Total Tokens Used: 5"));
        assert!(reply.contains("• Sessions Started: 2"));
    }

    #[tokio::test]
    async fn help_uses_configured_prefix() {
        let cfg = Arc::new(FakeServerConfig::default());
        let h = CommandHandler::new(Arc::new(SessionRegistry::new(cfg.clone())), cfg, "?");
        let reply = run(&h, "?help").await.unwrap();
        assert!(reply.contains("• `?start` - Start a translation session"));
        assert!(reply.contains("**Japanese Mode**: Translates Japanese ↔ English and Korean → Japanese"));
    }

    #[tokio::test]
    async fn unknown_commands_are_ignored() {
        let (h, _, _) = handler();
        assert!(run(&h, "!dance").await.is_none());
    }

    #[test]
    fn last_used_is_human_formatted() {
        assert_eq!(
            format_last_used("2025-01-05T15:04:00+00:00"),
            "Jan 5, 2025, 03:04 PM"
        );
        assert_eq!(format_last_used("not a date"), "not a date");
    }
}
