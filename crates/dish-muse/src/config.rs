use std::path::{Path, PathBuf};

use dish_muse_client::ClientConfig;

use crate::errors::AppError;

const DEFAULT_HISTORY_PATH: &str = "dish-muse-history.json";

/// Load `.env` files: the crate-local one first, then the working directory.
///
/// Variables already present in the process environment win.
pub fn init() {
    let _ = dotenvy::from_path(Path::new(
        format!("{}/.env", env!("CARGO_MANIFEST_DIR")).as_str(),
    ));
    dotenvy::dotenv().ok();
}

/// Application settings resolved at startup.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub client: ClientConfig,
    /// JSON file holding saved recipes.
    pub history_path: PathBuf,
}

impl AppConfig {
    /// Builds the config from `DISH_MUSE_*` environment variables.
    pub fn from_env() -> Result<Self, AppError> {
        let client = ClientConfig::from_env()?;
        Ok(Self {
            client,
            history_path: history_path_from_env(),
        })
    }
}

/// Resolves the history file location without requiring backend settings.
pub fn history_path_from_env() -> PathBuf {
    std::env::var("DISH_MUSE_HISTORY_PATH")
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_HISTORY_PATH))
}
