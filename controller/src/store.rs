use std::{io::ErrorKind, path::PathBuf, sync::Arc};

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::warn;

use relayboard_common::{Grid, RuntimeConfig};

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("schedule mutation requires an authenticated session")]
    Unauthorized,
    #[error("failed to persist schedule grid")]
    StorageFailure(#[source] anyhow::Error),
}

/// Non-volatile storage for the schedule grid and runtime config.
///
/// The grid is one fixed-size binary record written atomically (tmp
/// sibling, then rename), so a power loss mid-write can never leave a file
/// mixing old and new cells. Loads are fail-safe: anything unreadable
/// degrades to the all-off default instead of an error.
#[derive(Clone)]
pub struct ScheduleStore {
    grid_path: Arc<PathBuf>,
    runtime_path: Arc<PathBuf>,
    lock: Arc<Mutex<()>>,
}

impl ScheduleStore {
    pub fn new() -> Self {
        let data_dir = std::env::var("RELAYBOARD_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.relayboard"));
        Self::with_data_dir(data_dir)
    }

    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            grid_path: Arc::new(data_dir.join("grid.bin")),
            runtime_path: Arc::new(data_dir.join("runtime.json")),
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Reads the persisted grid. Missing file, wrong length, or invalid
    /// cell values all fall back to the all-off default.
    pub async fn load_grid(&self) -> Grid {
        let _guard = self.lock.lock().await;
        match tokio::fs::read(self.grid_path.as_ref()).await {
            Ok(raw) => Grid::from_bytes(&raw).unwrap_or_else(|| {
                warn!(
                    "persisted grid at {} is not a valid record; starting all-off",
                    self.grid_path.display()
                );
                Grid::default()
            }),
            Err(err) if err.kind() == ErrorKind::NotFound => Grid::default(),
            Err(err) => {
                warn!("failed to read persisted grid: {err}; starting all-off");
                Grid::default()
            }
        }
    }

    pub async fn save_grid(&self, grid: &Grid) -> Result<(), ScheduleError> {
        let _guard = self.lock.lock().await;
        self.write_grid(grid).await
    }

    /// Persists whatever the shared grid holds at write time.
    ///
    /// Concurrent editors can reach the file lock in the opposite order of
    /// their in-memory swaps; snapshotting under the file lock guarantees
    /// the last record on disk always equals the last state in memory, no
    /// matter how the writers interleave.
    pub async fn save_grid_snapshot(&self, grid: &Mutex<Grid>) -> Result<(), ScheduleError> {
        let _guard = self.lock.lock().await;
        let snapshot = *grid.lock().await;
        self.write_grid(&snapshot).await
    }

    async fn write_grid(&self, grid: &Grid) -> Result<(), ScheduleError> {
        let path = self.grid_path.as_ref().clone();
        let write = async {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let tmp = path.with_extension("tmp");
            tokio::fs::write(&tmp, grid.to_bytes()).await?;
            tokio::fs::rename(&tmp, &path).await?;
            Ok::<(), std::io::Error>(())
        };
        write
            .await
            .map_err(|err| ScheduleError::StorageFailure(err.into()))
    }

    pub async fn load_runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        let _guard = self.lock.lock().await;
        match tokio::fs::read(self.runtime_path.as_ref()).await {
            Ok(raw) => Ok(serde_json::from_slice::<RuntimeConfig>(&raw)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(RuntimeConfig::default()),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn save_runtime_config(&self, runtime: &RuntimeConfig) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        let path = self.runtime_path.as_ref().clone();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let payload = serde_json::to_vec_pretty(runtime)?;
        tokio::fs::write(path, payload).await?;
        Ok(())
    }
}

impl Default for ScheduleStore {
    fn default() -> Self {
        Self::new()
    }
}
