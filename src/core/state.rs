use std::sync::Arc;

use sqlx::PgPool;

use crate::core::{config::Settings, events::ChangeFeed, redis::RedisHandle};
use crate::services::session::SessionRegistry;
use crate::services::storage::StorageService;
use crate::services::store::PortalStore;

#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    db: PgPool,
    redis: RedisHandle,
    store: Arc<dyn PortalStore>,
    feed: ChangeFeed,
    sessions: SessionRegistry,
    storage: Option<StorageService>,
}

impl AppState {
    pub(crate) fn new(
        settings: Settings,
        db: PgPool,
        redis: RedisHandle,
        store: Arc<dyn PortalStore>,
        storage: Option<StorageService>,
    ) -> Self {
        let feed = ChangeFeed::new(settings.exam().change_feed_capacity);
        let sessions = SessionRegistry::new();
        Self { inner: Arc::new(InnerState { settings, db, redis, store, feed, sessions, storage }) }
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn db(&self) -> &PgPool {
        &self.inner.db
    }

    pub(crate) fn redis(&self) -> &RedisHandle {
        &self.inner.redis
    }

    pub(crate) fn store(&self) -> &Arc<dyn PortalStore> {
        &self.inner.store
    }

    pub(crate) fn feed(&self) -> &ChangeFeed {
        &self.inner.feed
    }

    pub(crate) fn sessions(&self) -> &SessionRegistry {
        &self.inner.sessions
    }

    pub(crate) fn storage(&self) -> Option<&StorageService> {
        self.inner.storage.as_ref()
    }
}
