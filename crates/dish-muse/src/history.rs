use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::recipe::Seasoning;

pub const MAX_RATING: u8 = 5;

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("history io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("history file {path} is not valid JSON: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("recipe {0} not found")]
    NotFound(Uuid),
    #[error("rating must be between 0 and {MAX_RATING}, got {0}")]
    InvalidRating(u8),
}

pub type HistoryResult<T> = Result<T, HistoryError>;

/// A saved recipe idea.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecipeRecord {
    pub id: Uuid,
    pub ingredients: Vec<String>,
    #[serde(default)]
    pub seasonings: Vec<Seasoning>,
    pub cooking_method: String,
    pub evaluation: String,
    #[serde(default)]
    pub rating: u8,
    #[serde(default)]
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for [`RecipeStore::create`]; id and timestamp are assigned by the store.
#[derive(Clone, Debug, Default)]
pub struct NewRecipe {
    pub ingredients: Vec<String>,
    pub seasonings: Vec<Seasoning>,
    pub cooking_method: String,
    pub evaluation: String,
    pub rating: u8,
    pub image_url: Option<String>,
}

pub trait RecipeStore: Send + Sync {
    fn create(&self, input: NewRecipe) -> HistoryResult<RecipeRecord>;
    /// Newest first.
    fn list(&self) -> HistoryResult<Vec<RecipeRecord>>;
    fn get(&self, id: Uuid) -> HistoryResult<Option<RecipeRecord>>;
    fn delete(&self, id: Uuid) -> HistoryResult<()>;
}

/// Stores the whole history as one JSON array.
///
/// Writes go to a sibling temp file which is then renamed over the target,
/// so a crash mid-write leaves the previous history intact.
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: io::Error) -> HistoryError {
        HistoryError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn load(&self) -> HistoryResult<Vec<RecipeRecord>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.io_err(e)),
        };
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&raw).map_err(|source| HistoryError::Json {
            path: self.path.clone(),
            source,
        })
    }

    fn save(&self, records: &[RecipeRecord]) -> HistoryResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
        }
        let json = serde_json::to_vec_pretty(records).map_err(|source| HistoryError::Json {
            path: self.path.clone(),
            source,
        })?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, json).map_err(|e| self.io_err(e))?;
        fs::rename(&tmp, &self.path).map_err(|e| self.io_err(e))?;
        debug!(path = %self.path.display(), count = records.len(), "history saved");
        Ok(())
    }

    fn guard(&self) -> std::sync::MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl RecipeStore for JsonFileStore {
    fn create(&self, input: NewRecipe) -> HistoryResult<RecipeRecord> {
        if input.rating > MAX_RATING {
            return Err(HistoryError::InvalidRating(input.rating));
        }
        let _guard = self.guard();
        let mut records = self.load()?;
        let record = RecipeRecord {
            id: Uuid::new_v4(),
            ingredients: input.ingredients,
            seasonings: input.seasonings,
            cooking_method: input.cooking_method,
            evaluation: input.evaluation,
            rating: input.rating,
            image_url: input.image_url.filter(|url| !url.is_empty()),
            created_at: Utc::now(),
        };
        records.push(record.clone());
        self.save(&records)?;
        Ok(record)
    }

    fn list(&self) -> HistoryResult<Vec<RecipeRecord>> {
        let _guard = self.guard();
        let mut records = self.load()?;
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    fn get(&self, id: Uuid) -> HistoryResult<Option<RecipeRecord>> {
        let _guard = self.guard();
        Ok(self.load()?.into_iter().find(|r| r.id == id))
    }

    fn delete(&self, id: Uuid) -> HistoryResult<()> {
        let _guard = self.guard();
        let mut records = self.load()?;
        let before = records.len();
        records.retain(|r| r.id != id);
        if records.len() == before {
            return Err(HistoryError::NotFound(id));
        }
        self.save(&records)
    }
}
