use std::path::PathBuf;
use tokio::sync::RwLock;
use trackmatch::repository::Repository;

pub struct AppState {
    pub gtfs_data_path: PathBuf,
    pub avl_log_path: Option<PathBuf>,
    pub repository: RwLock<Option<Repository>>,
}

impl AppState {
    pub fn new(gtfs_data_path: PathBuf, avl_log_path: Option<PathBuf>) -> Self {
        Self {
            gtfs_data_path,
            avl_log_path,
            repository: RwLock::new(None),
        }
    }
}
