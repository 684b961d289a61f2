use dish_muse_client::ClientError;

use crate::history::HistoryError;

/// Top-level error for the application and CLI.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// The recipe draft is incomplete.
    #[error("{0}")]
    Validation(String),
    /// Missing or invalid settings.
    #[error("config error: {0}")]
    Config(String),
    /// A backend call failed.
    #[error(transparent)]
    Client(#[from] ClientError),
    /// Reading or writing the recipe history failed.
    #[error(transparent)]
    History(#[from] HistoryError),
    /// The user cancelled the analysis.
    #[error("analysis cancelled")]
    Cancelled,
}
