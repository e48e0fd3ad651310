use amora_kernel::config::AppConfig;
use amora_storage::Storage;
use axum::extract::FromRef;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug)]
pub struct AppStateInner {
    pub config: AppConfig,
    pub storage: Storage,
    pub started: Instant,
}

/// Shared request state. Cheap to clone.
#[derive(Debug, Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

impl AppState {
    #[must_use]
    pub fn new(config: AppConfig, storage: Storage) -> Self {
        Self { inner: Arc::new(AppStateInner { config, storage, started: Instant::now() }) }
    }
}

impl Deref for AppState {
    type Target = AppStateInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl FromRef<AppState> for Storage {
    fn from_ref(state: &AppState) -> Self {
        state.inner.storage.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(state: &AppState) -> Self {
        state.inner.config.clone()
    }
}
