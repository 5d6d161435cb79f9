use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info};

mod audio;
mod bot;
mod cache;
mod config;
mod error;
mod sources;
mod storage;
mod ui;

use crate::audio::{player::AudioPlayer, transcoder::Transcoder};
use crate::bot::MusicBot;
use crate::cache::MusicCache;
use crate::config::Config;
use crate::sources::SourceManager;
use crate::storage::HistoryStorage;

fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tunebridge=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando TuneBridge v{}", env!("CARGO_PKG_VERSION"));

    // La configuración define el tamaño del runtime, así que se carga antes
    let config = Config::load()?;
    info!("⚙️ Configuración:\n{}", config.summary());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.worker_threads.unwrap_or_else(num_cpus::get))
        .thread_name("tunebridge-worker")
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        // Manejar health check si es necesario
        if std::env::args().any(|arg| arg == "--health-check") {
            return health_check(&config).await;
        }
        run(config).await
    })
}

async fn run(config: Config) -> Result<()> {
    let transcoder = Arc::new(Transcoder::new(&config));
    if let Err(e) = transcoder.check_dependencies().await {
        error!("❌ Faltan dependencias externas: {:?}", e);
    }

    // Inicializar caché y fuentes
    let cache = MusicCache::new(config.cache_size, config.cache_ttl());
    let sources = Arc::new(SourceManager::new(&config, transcoder.clone(), cache)?);

    // Inicializar historial
    let history = Arc::new(tokio::sync::Mutex::new(
        HistoryStorage::new(config.data_dir.clone()).await?,
    ));

    let songbird = Songbird::serenity();
    let (events_tx, events_rx) = flume::unbounded();
    let player = AudioPlayer::new(
        songbird.clone(),
        sources,
        transcoder,
        events_tx,
        config.idle_timeout(),
        config.max_queue_size,
        config.default_volume,
    );

    // Configurar intents mínimos necesarios
    let mut intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;
    if config.enable_text_commands {
        intents |= GatewayIntents::GUILD_MESSAGES | GatewayIntents::MESSAGE_CONTENT;
    }

    let token = config.discord_token.clone();
    let shards = config.shards;
    let handler = MusicBot::new(config, player.clone(), history, events_rx);

    // Construir cliente
    let mut client = Client::builder(&token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        player.shutdown().await;
        shard_manager.shutdown_all().await;
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    let started = match shards {
        Some(total) => client.start_shards(total).await,
        None => client.start_autosharded().await,
    };
    if let Err(why) = started {
        error!("Error al ejecutar cliente: {:?}", why);
        return Err(why.into());
    }

    Ok(())
}

async fn health_check(config: &Config) -> Result<()> {
    // Verificar dependencias críticas
    Transcoder::new(config).check_dependencies().await?;
    println!("OK");
    Ok(())
}
