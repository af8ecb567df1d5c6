use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::classifier::ClassifierModel;
use crate::config::StorageConfig;
use crate::ensemble::EnsembleWeights;
use crate::model::{Alphabet, History, Observation, Round};

pub const HISTORY_PATH_ENV: &str = "ENSEMBLE_FORECAST_HISTORY_PATH";
pub const WEIGHTS_PATH_ENV: &str = "ENSEMBLE_FORECAST_WEIGHTS_PATH";
pub const MODEL_PATH_ENV: &str = "ENSEMBLE_FORECAST_MODEL_PATH";

fn resolve_path(env_key: &str, configured: &Path) -> PathBuf {
    std::env::var(env_key)
        .map(PathBuf::from)
        .unwrap_or_else(|_| configured.to_path_buf())
}

pub fn history_path(cfg: &StorageConfig) -> PathBuf {
    resolve_path(HISTORY_PATH_ENV, &cfg.history_path)
}

pub fn weights_path(cfg: &StorageConfig) -> PathBuf {
    resolve_path(WEIGHTS_PATH_ENV, &cfg.weights_path)
}

pub fn model_path(cfg: &StorageConfig) -> PathBuf {
    resolve_path(MODEL_PATH_ENV, &cfg.model_path)
}

/// Append-only SQLite log of observed rounds. Rows store outcome labels, so a
/// log stays readable if the alphabet is reordered.
///
/// The store remembers which rows back the live history, oldest first, so
/// undo removes the row that was actually replayed or appended last.
pub struct HistoryStore {
    conn: Connection,
    path: PathBuf,
    live: VecDeque<i64>,
    max_live: usize,
}

impl HistoryStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS rounds (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                observed_at TEXT NOT NULL,
                outcomes TEXT NOT NULL
            );
            "#,
        )?;
        Ok(Self {
            conn,
            path: path.to_path_buf(),
            live: VecDeque::new(),
            max_live: usize::MAX,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&mut self, alphabet: &Alphabet, observation: &Observation) -> Result<()> {
        let outcomes = observation
            .round
            .slots()
            .iter()
            .map(|o| alphabet.label(*o))
            .collect::<Vec<_>>()
            .join(",");
        self.conn.execute(
            "INSERT INTO rounds (observed_at, outcomes) VALUES (?1, ?2)",
            params![
                observation
                    .observed_at
                    .to_rfc3339_opts(SecondsFormat::Nanos, true),
                outcomes
            ],
        )?;
        self.live.push_back(self.conn.last_insert_rowid());
        while self.live.len() > self.max_live {
            self.live.pop_front();
        }
        Ok(())
    }

    pub fn len(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM rounds", [], |row| row.get(0))?;
        Ok(n.max(0) as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Replays the log into a fresh `History`. Rows that no longer fit the
    /// alphabet or round width are skipped and counted in a warning.
    pub fn load(&mut self, alphabet: &Alphabet, width: usize, max_len: usize) -> Result<History> {
        let mut stmt = self
            .conn
            .prepare("SELECT seq, observed_at, outcomes FROM rounds ORDER BY seq ASC")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut history = History::new(alphabet.clone(), width, max_len);
        let mut live = VecDeque::new();
        let mut skipped = 0usize;
        for row in rows {
            let (seq, observed_at, outcomes) = row?;
            let Ok(observed_at) = DateTime::parse_from_rfc3339(&observed_at) else {
                skipped += 1;
                continue;
            };
            let parsed: Result<Vec<_>, _> =
                outcomes.split(',').map(|t| alphabet.parse(t)).collect();
            let pushed = parsed
                .map(Round::new)
                .and_then(|round| history.push(observed_at.with_timezone(&Utc), round));
            match pushed {
                Ok(_) => {
                    live.push_back(seq);
                    while live.len() > history.len() {
                        live.pop_front();
                    }
                }
                Err(_) => skipped += 1,
            }
        }
        self.live = live;
        self.max_live = max_len.max(1);
        if skipped > 0 {
            tracing::warn!(
                skipped,
                path = %self.path.display(),
                "Skipped stored rounds that do not match the configured game"
            );
        }
        Ok(history)
    }

    /// Removes the row backing the newest live round. Rows skipped on load
    /// are left alone. Returns false when no live row remains.
    pub fn truncate_last(&mut self) -> Result<bool> {
        let Some(seq) = self.live.pop_back() else {
            return Ok(false);
        };
        let removed = self
            .conn
            .execute("DELETE FROM rounds WHERE seq = ?1", params![seq])?;
        Ok(removed > 0)
    }

    pub fn clear(&mut self) -> Result<()> {
        self.conn.execute("DELETE FROM rounds", [])?;
        self.live.clear();
        Ok(())
    }
}

/// Serializes `value` to `<path>.tmp` and renames it over `path`, so readers
/// never observe a partially written file.
pub fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    let json = serde_json::to_string_pretty(value)
        .with_context(|| format!("failed to serialize {}", path.display()))?;
    let tmp = tmp_path(path);
    std::fs::write(&tmp, json).with_context(|| format!("failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("failed to rename {} to {}", tmp.display(), path.display()))?;
    Ok(())
}

pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let payload = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let value = serde_json::from_str(&payload)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(Some(value))
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

pub fn save_weights(path: &Path, weights: &EnsembleWeights) -> Result<()> {
    save_json(path, weights)
}

pub fn load_weights(path: &Path) -> Result<Option<EnsembleWeights>> {
    let weights: Option<EnsembleWeights> = load_json(path)?;
    if let Some(w) = &weights {
        w.validate()
            .with_context(|| format!("invalid weights in {}", path.display()))?;
    }
    Ok(weights)
}

pub fn save_model(path: &Path, model: &ClassifierModel) -> Result<()> {
    save_json(path, model)
}

pub fn load_model(path: &Path) -> Result<Option<ClassifierModel>> {
    load_json(path)
}
