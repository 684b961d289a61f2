//! Recipe idea app: streamed tasting evaluation, dish image generation and a
//! local recipe history, built on `dish-muse-client`.

pub mod analysis;
pub mod config;
pub mod errors;
pub mod history;
pub mod observability;
pub mod recipe;

pub use analysis::{AnalysisObserver, AnalysisResult, Analyzer};
pub use config::AppConfig;
pub use errors::AppError;
pub use history::{HistoryError, JsonFileStore, NewRecipe, RecipeRecord, RecipeStore};
pub use observability::init_observability;
pub use recipe::{RecipeDraft, Seasoning};
