use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use dtb_core::{
    config::Config,
    memory::TranslationMemory,
    server_config::{JsonServerConfigStore, ServerDefaults},
};
use dtb_discord::router::{run_gateway, RouterDeps};
use dtb_llm::LlmBackends;

#[tokio::main]
async fn main() -> Result<(), dtb_core::Error> {
    dtb_core::logging::init("dtb")?;

    let cfg = Arc::new(Config::load()?);
    for key in cfg.missing_api_keys() {
        tracing::warn!("{key} is not set; that backend will be unavailable");
    }

    let backends = LlmBackends::from_config(&cfg);
    let enabled: Vec<&str> = backends.configured().iter().map(|k| k.as_str()).collect();
    tracing::info!("Translation backends: {}", enabled.join(", "));

    let memory = TranslationMemory::load(cfg.memory_config());
    tracing::info!(
        "Loaded {} translation memory entries from {}",
        memory.len(),
        cfg.translation_memory_path.display()
    );
    install_panic_flush(memory.clone());

    let server_config = Arc::new(JsonServerConfigStore::new(
        cfg.server_config_dir.clone(),
        ServerDefaults {
            mode: cfg.default_mode,
            model: cfg.default_model,
            auto_translate: cfg.auto_translate,
        },
    ));
    tracing::info!("Server settings in {}", server_config.dir().display());

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));

    run_gateway(
        cfg,
        RouterDeps {
            backend: Arc::new(backends),
            server_config,
            memory,
        },
        cancel,
    )
    .await
    .map_err(|e| dtb_core::Error::External(format!("discord bot failed: {e:#}")))?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Pending cache writes survive a panic anywhere in the process.
fn install_panic_flush(memory: TranslationMemory) {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        match memory.try_flush() {
            Ok(true) => {}
            Ok(false) => eprintln!("Translation memory busy; skipped flush after panic"),
            Err(e) => eprintln!("Failed to flush translation memory after panic: {e}"),
        }
        previous(info);
    }));
}

async fn cancel_on_signal(cancel: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => tracing::info!("Received SIGINT"),
                    _ = term.recv() => tracing::info!("Received SIGTERM"),
                }
            }
            Err(e) => {
                tracing::warn!("Could not install SIGTERM handler: {e}");
                let _ = tokio::signal::ctrl_c().await;
                tracing::info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Received Ctrl-C");
    }

    cancel.cancel();
}
