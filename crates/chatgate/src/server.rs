//! Startup wiring: store selection, provider seeding and the HTTP server.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use log::{info, warn};
use tokio::net::TcpListener;

use crate::api::{AppState, create_router};
use crate::completion::ProviderCompleter;
use crate::config::{AppConfig, ProviderSeed, StorageBackend, StorageConfig};
use crate::store::{ConversationStore, MemoryStore, SqliteStore};

/// Open the configured conversation store.
pub async fn open_store(
    storage: &StorageConfig,
    data_dir: &Path,
) -> Result<Arc<dyn ConversationStore>> {
    match storage.backend {
        StorageBackend::Memory => {
            warn!("Using in-memory storage; conversations are lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
        StorageBackend::Sqlite => {
            let path = storage.database_path(data_dir)?;
            info!("Database path: {}", path.display());
            Ok(Arc::new(SqliteStore::open(&path).await?))
        }
    }
}

/// Create configured providers that do not exist yet. Existing providers
/// are left untouched. Returns how many were created.
pub async fn seed_providers(store: &dyn ConversationStore, seeds: &[ProviderSeed]) -> Result<usize> {
    let mut created = 0;
    for seed in seeds {
        if store.get_provider_by_name(&seed.name).await?.is_some() {
            continue;
        }

        let provider = store
            .create_provider(seed.to_new_provider()?)
            .await
            .with_context(|| format!("seeding provider {}", seed.name))?;
        if !provider.has_api_key() {
            warn!("Provider {} seeded without an API key", provider.name);
        }
        info!("Seeded provider {} ({})", provider.name, provider.kind);
        created += 1;
    }
    Ok(created)
}

/// Build the full application state from configuration.
pub async fn build_state(config: &AppConfig, data_dir: &Path) -> Result<AppState> {
    let store = open_store(&config.storage, data_dir).await?;
    seed_providers(store.as_ref(), &config.providers).await?;

    let completer = Arc::new(
        ProviderCompleter::new(store.clone(), &config.completion)
            .context("creating completion client")?,
    );

    Ok(AppState::new(store, completer, config))
}

/// Serve the router on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("running server")
}
