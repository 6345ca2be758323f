use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use parley::chat::LogRelay;
use parley::{
    ChannelRegistry, ChatCore, ChatHandle, ChatServer, ChatStateStore, Config,
    MemoryStateStore, PermissionGate, SessionOptions, SqliteStateStore, StaticPermissions,
};

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = match Config::load_with_env(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {config_path}: {e}");
            eprintln!("Using default configuration.");
            Config::default()
        }
    };

    if let Err(e) = parley::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        parley::logging::init_console_only(&config.logging.level);
    }

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        std::process::exit(1);
    }

    info!("parley chat server");
    if let Err(e) = run(config, config_path).await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }
}

async fn run(config: Config, config_path: String) -> parley::Result<()> {
    if config.database.path.is_empty() {
        info!("No database path configured, chat state is kept in memory");
        serve(config, config_path, Arc::new(MemoryStateStore::new())).await
    } else {
        let store = SqliteStateStore::open(&config.database.path).await?;
        serve(config, config_path, Arc::new(store)).await
    }
}

async fn serve<S: ChatStateStore>(
    config: Config,
    config_path: String,
    store: Arc<S>,
) -> parley::Result<()> {
    let permissions = Arc::new(StaticPermissions::new());
    permissions.apply(&config.permissions.grant_table());
    let gate =
        PermissionGate::with_fallback_level(permissions.clone(), config.permissions.fallback_level);
    let registry =
        ChannelRegistry::from_definitions(config.channel_definitions(), &config.chat.default_channel);
    info!("Loaded {} chat channels", registry.len());

    let core = ChatCore::new(registry, gate)
        .with_settings(config.chat_settings())
        .with_grant_table(permissions);
    let (handle, chat_task) = ChatHandle::spawn(
        core,
        store,
        Arc::new(LogRelay),
        config.server.queue_capacity,
    );

    spawn_reload_listener(handle.clone(), config_path);

    let server = ChatServer::bind(&config.server).await?;
    let options = SessionOptions {
        ansi: config.server.ansi,
        idle_timeout: Duration::from_secs(config.server.idle_timeout_secs),
    };
    let accept = server.serve(handle.clone(), options);

    tokio::select! {
        result = accept => result?,
        _ = tokio::signal::ctrl_c() => info!("Shutting down"),
    }

    handle.shutdown().await?;
    if let Err(e) = chat_task.await {
        error!("Chat loop panicked: {}", e);
    }
    Ok(())
}

/// Re-read the config file on SIGHUP and reload channels and grants.
#[cfg(unix)]
fn spawn_reload_listener(handle: ChatHandle, config_path: String) {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let mut hangup = match signal(SignalKind::hangup()) {
            Ok(hangup) => hangup,
            Err(e) => {
                warn!("Cannot listen for SIGHUP, reload disabled: {}", e);
                return;
            }
        };
        while hangup.recv().await.is_some() {
            info!("SIGHUP received, reloading {}", config_path);
            let config = match Config::load_with_env(&config_path)
                .and_then(|config| config.validate().map(|()| config))
            {
                Ok(config) => config,
                Err(e) => {
                    error!("Reload failed, keeping current channels: {}", e);
                    continue;
                }
            };
            match handle
                .reload_with_grants(
                    config.channel_definitions(),
                    config.chat.default_channel.clone(),
                    config.permissions.grant_table(),
                )
                .await
            {
                Ok(loaded) => info!("Reloaded {} chat channels", loaded),
                Err(e) => {
                    error!("Reload failed: {}", e);
                    break;
                }
            }
        }
    });
}

#[cfg(not(unix))]
fn spawn_reload_listener(_handle: ChatHandle, _config_path: String) {}
