use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use vox_broker::LapinConnector;
use vox_server::audio::{AudioStore, HttpAudioStore, MemoryAudioStore};
use vox_server::lookup::{HttpProfileLookup, NoLookup, ProfileLookup};

/// Real-time TTS announcement hub.
#[derive(Debug, Parser)]
#[command(name = "vox", version, about)]
struct Args {
    /// Settings file path (overrides VOX_SETTINGS).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Listen address (overrides the settings file).
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut settings = match &args.settings {
        Some(path) => {
            let mut loaded = vox_settings::load_settings_from_path(path)
                .with_context(|| format!("loading settings from {}", path.display()))?;
            vox_settings::apply_env_overrides(&mut loaded, |name| std::env::var(name).ok());
            loaded
        }
        None => vox_settings::load_settings().context("loading settings")?,
    };
    if let Some(bind) = args.bind {
        settings.server.bind = bind;
    }
    if settings.auth.jwt_secret.is_empty() {
        tracing::warn!("auth.jwtSecret is empty; no trigger token can authenticate");
    }

    let metrics_handle = vox_server::metrics::install_recorder();

    let connector = Arc::new(LapinConnector::new(settings.broker.url.clone()));

    let profiles: Arc<dyn ProfileLookup> = match &settings.lookups {
        Some(lookups) => Arc::new(HttpProfileLookup::new(lookups)),
        None => Arc::new(NoLookup),
    };
    let audio: Arc<dyn AudioStore> = match &settings.audio.store_url {
        Some(url) => Arc::new(HttpAudioStore::new(url.clone())),
        None => {
            tracing::warn!("audio.storeUrl not set; using in-memory audio store");
            Arc::new(MemoryAudioStore::new())
        }
    };

    let handle = vox_server::start(&settings, connector, profiles, audio, metrics_handle)
        .await
        .context("starting server")?;
    tracing::info!(addr = %handle.addr, "vox ready");

    tokio::signal::ctrl_c()
        .await
        .context("listening for ctrl+c")?;
    tracing::info!("shutting down");
    Ok(())
}
