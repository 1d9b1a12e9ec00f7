//! Application state shared across handlers.

use std::sync::Arc;

use crate::auth::AuthState;
use crate::chat::MessageProcessor;
use crate::completion::ChatCompleter;
use crate::config::AppConfig;
use crate::store::ConversationStore;
use crate::ws::{Gateway, RealtimeConfig, SubscriptionRegistry};

/// Everything a handler can reach. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ConversationStore>,
    pub registry: Arc<SubscriptionRegistry>,
    pub gateway: Arc<Gateway>,
    pub realtime: RealtimeConfig,
    pub auth: AuthState,
    /// Browser origins allowed to call the API. Empty denies cross-origin use.
    pub cors_origins: Arc<[String]>,
}

impl AppState {
    /// Wire the realtime pipeline around a store and a completer.
    pub fn new(
        store: Arc<dyn ConversationStore>,
        completer: Arc<dyn ChatCompleter>,
        config: &AppConfig,
    ) -> Self {
        let registry = Arc::new(SubscriptionRegistry::new(config.realtime.outbox_capacity));
        let processor = Arc::new(
            MessageProcessor::new(store.clone(), completer)
                .with_options(config.completion.options()),
        );
        let gateway = Arc::new(Gateway::new(registry.clone(), processor));

        Self {
            store,
            registry,
            gateway,
            realtime: config.realtime.clone(),
            auth: AuthState::new(config.auth.clone()),
            cors_origins: config.server.cors_origins.clone().into(),
        }
    }
}
