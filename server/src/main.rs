use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use impostor_core::agents::{create_provider, AiServiceConfig};
use impostor_core::api::v1::{self, ApiState};
use impostor_core::db::init_db;
use impostor_core::generation::WordGenerator;
use impostor_core::session::SessionHandle;
use impostor_core::snapshot::SqliteSnapshotStore;
use impostor_core::word_service::WordSupplyService;

const DEFAULT_BIND: &str = "127.0.0.1:3000";

struct ServerConfig {
    bind: SocketAddr,
    data_dir: PathBuf,
}

impl ServerConfig {
    fn from_env() -> Result<Self> {
        let bind = std::env::var("IMPOSTOR_BIND").unwrap_or_else(|_| DEFAULT_BIND.to_string());
        let bind = bind
            .parse()
            .with_context(|| format!("IMPOSTOR_BIND is not a socket address: {bind}"))?;
        let data_dir = match std::env::var_os("IMPOSTOR_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => default_data_dir(),
        };
        Ok(Self { bind, data_dir })
    }
}

fn default_data_dir() -> PathBuf {
    if let Some(proj) = ProjectDirs::from("com", "Impostor", "Impostor") {
        proj.data_dir().to_path_buf()
    } else {
        std::env::temp_dir().join("Impostor")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env()?;
    let db = init_db(config.data_dir.clone())
        .with_context(|| format!("failed to init db in {}", config.data_dir.display()))?;

    let ai = AiServiceConfig::from_env();
    let provider = create_provider(&ai).context("failed to configure AI provider")?;
    log::info!(
        "using {} model {}",
        provider.kind().display_name(),
        provider.config().model
    );
    let generator = WordGenerator::new(Arc::new(provider));

    let supply = WordSupplyService::new(db.clone(), Arc::new(generator.clone()));
    let store = Arc::new(SqliteSnapshotStore::new(db.clone()));
    let session = SessionHandle::load(supply, store)
        .await
        .context("failed to restore session")?;

    let app = v1::router(ApiState {
        db,
        generator,
        session: Arc::new(session),
    });

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    log::info!("listening on http://{}", config.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            log::info!("shutting down");
        })
        .await?;
    Ok(())
}
