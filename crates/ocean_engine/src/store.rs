use async_trait::async_trait;
use ocean_core::PersistedState;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("State file I/O failed for '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("State file '{path}' is not valid: {source}")]
    Serde {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Durable storage for the learned identity and session history.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load(&self) -> Result<Option<PersistedState>, StoreError>;
    async fn save(&self, state: &PersistedState) -> Result<(), StoreError>;
}

/// Keeps state for the lifetime of the process only.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<Option<PersistedState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    pub fn with_state(state: PersistedState) -> Self {
        MemoryStore {
            state: Mutex::new(Some(state)),
        }
    }

    pub fn current(&self) -> Option<PersistedState> {
        self.state.lock().map(|guard| guard.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn load(&self) -> Result<Option<PersistedState>, StoreError> {
        Ok(self.current())
    }

    async fn save(&self, state: &PersistedState) -> Result<(), StoreError> {
        if let Ok(mut guard) = self.state.lock() {
            *guard = Some(state.clone());
        }
        Ok(())
    }
}

/// JSON file, replaced atomically through a sibling temp file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonFileStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait]
impl StateStore for JsonFileStore {
    async fn load(&self) -> Result<Option<PersistedState>, StoreError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(self.io_error(err)),
        };
        let state = serde_json::from_str(&content).map_err(|source| StoreError::Serde {
            path: self.path.clone(),
            source,
        })?;
        tracing::debug!("Loaded persisted state from {}", self.path.display());
        Ok(Some(state))
    }

    async fn save(&self, state: &PersistedState) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(state).map_err(|source| StoreError::Serde {
            path: self.path.clone(),
            source,
        })?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| self.io_error(err))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|err| self.io_error(err))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|err| self.io_error(err))?;
        tracing::debug!("Saved state to {}", self.path.display());
        Ok(())
    }
}
