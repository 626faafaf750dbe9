use std::sync::{Arc, OnceLock};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use dtb_core::{
    backend::TranslationBackend,
    bot::{BotDeps, TranslatorBot},
    config::Config,
    domain::UserId,
    memory::TranslationMemory,
    messaging::{
        port::MessagingPort,
        throttled::{ThrottleConfig, ThrottledMessenger},
    },
    server_config::ServerConfigPort,
};

use crate::{
    gateway::{Gateway, GatewayConfig, GatewayEvent},
    handlers,
    http::DiscordHttp,
    DiscordMessenger,
};

const EVENT_BUFFER: usize = 256;

/// Our own user id, learned from READY.
#[derive(Debug, Default)]
pub struct SelfUser(OnceLock<UserId>);

impl SelfUser {
    pub fn set(&self, id: UserId) {
        let _ = self.0.set(id);
    }

    pub fn is(&self, id: UserId) -> bool {
        self.0.get() == Some(&id)
    }
}

pub struct AppState {
    pub bot: Arc<TranslatorBot>,
    self_user: SelfUser,
}

impl AppState {
    pub fn new(bot: Arc<TranslatorBot>) -> Self {
        Self {
            bot,
            self_user: SelfUser::default(),
        }
    }

    pub fn set_self(&self, id: UserId) {
        self.self_user.set(id);
    }

    pub fn is_self(&self, id: UserId) -> bool {
        self.self_user.is(id)
    }
}

/// Services built outside the adapter (they outlive the gateway connection).
pub struct RouterDeps {
    pub backend: Arc<dyn TranslationBackend>,
    pub server_config: Arc<dyn ServerConfigPort>,
    pub memory: TranslationMemory,
}

/// Connect to Discord and route events into the bot until `cancel` fires.
/// The bot is shut down (memory flushed, webhooks dropped) before returning.
pub async fn run_gateway(
    cfg: Arc<Config>,
    deps: RouterDeps,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let http = DiscordHttp::new(cfg.discord_token.clone());

    // The adapter retries 429s itself; the throttle keeps bursts under the buckets.
    let raw_messenger: Arc<dyn MessagingPort> = Arc::new(DiscordMessenger::new(http.clone()));
    let messenger: Arc<dyn MessagingPort> = Arc::new(ThrottledMessenger::new(
        raw_messenger,
        ThrottleConfig::default(),
    ));

    let bot = Arc::new(TranslatorBot::new(
        &cfg,
        BotDeps {
            backend: deps.backend,
            messenger,
            server_config: deps.server_config,
            memory: deps.memory,
        },
    ));
    tracing::info!("Translation queue limit: {}", bot.queue().limit());
    let state = Arc::new(AppState::new(Arc::clone(&bot)));

    let gateway = Gateway::new(
        http,
        GatewayConfig {
            activity: Some(format!("{}help | Translating...", cfg.command_prefix)),
            ..GatewayConfig::default()
        },
    );
    let (tx, mut rx) = mpsc::channel::<GatewayEvent>(EVENT_BUFFER);
    let gw_cancel = cancel.clone();
    let gw_task = tokio::spawn(async move { gateway.run(tx, gw_cancel).await });

    while let Some(event) = rx.recv().await {
        handlers::handle_event(&state, event).await;
    }

    let result = match gw_task.await {
        Ok(r) => r,
        Err(e) => Err(anyhow::anyhow!("gateway task failed: {e}")),
    };
    if let Err(e) = &result {
        tracing::error!("Discord gateway stopped: {e:#}");
    }

    bot.shutdown().await;
    result
}
