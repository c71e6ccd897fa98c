use std::sync::Arc;

use chatloop_agents::TurnExecutor;
use chatloop_config::AppConfig;
use chatloop_db::ConversationStore;

/// Shared gateway state: configuration, the turn executor, and per-thread history.
pub struct AppState {
    pub config: AppConfig,
    pub executor: TurnExecutor,
    pub conversations: ConversationStore,
}

impl AppState {
    pub fn new(config: AppConfig, executor: TurnExecutor) -> Self {
        Self {
            config,
            executor,
            conversations: ConversationStore::new(),
        }
    }
}

pub type SharedState = Arc<AppState>;
