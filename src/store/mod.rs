// Persistence for accepted (or, under the lenient policy, best-effort) datapacks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use crate::errors::PipelineError;
use crate::wire::DatapackSpec;

#[derive(Debug, Clone, Serialize)]
pub struct StoredDatapack {
    pub id: String,
    pub owner_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub spec: DatapackSpec,
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Persist `spec` with its owner and a creation timestamp; returns a stable id.
    async fn save(&self, spec: &DatapackSpec, owner_id: Option<&str>) -> Result<String, PipelineError>;

    async fn load(&self, id: &str) -> Result<Option<StoredDatapack>, PipelineError>;
}

pub type DynStore = Arc<dyn Store>;

/// SQLite-backed store. One connection, serialized behind a mutex and used
/// from the blocking pool.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, PipelineError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs_err::create_dir_all(parent).map_err(|e| PipelineError::Save(e.to_string()))?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, PipelineError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, PipelineError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS datapacks (
                id TEXT PRIMARY KEY,
                owner_id TEXT,
                pack_name TEXT NOT NULL,
                spec_json TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_datapacks_owner ON datapacks(owner_id)",
            [],
        )?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }
}

async fn blocking<T, F>(f: F) -> Result<T, PipelineError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, PipelineError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| PipelineError::Save(format!("store task failed: {e}")))?
}

#[async_trait]
impl Store for SqliteStore {
    async fn save(&self, spec: &DatapackSpec, owner_id: Option<&str>) -> Result<String, PipelineError> {
        let id = Uuid::new_v4().to_string();
        let json = serde_json::to_string(spec).map_err(|e| PipelineError::Save(e.to_string()))?;
        let name = spec.name.clone();
        let owner = owner_id.map(str::to_string);
        let created_at = Utc::now().to_rfc3339();
        let conn = self.conn.clone();
        let row_id = id.clone();

        blocking(move || {
            conn.lock().execute(
                "INSERT INTO datapacks (id, owner_id, pack_name, spec_json, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![row_id, owner, name, json, created_at],
            )?;
            Ok(())
        })
        .await?;

        tracing::info!(%id, "datapack saved");
        Ok(id)
    }

    async fn load(&self, id: &str) -> Result<Option<StoredDatapack>, PipelineError> {
        let conn = self.conn.clone();
        let id = id.to_string();

        blocking(move || {
            let row = conn
                .lock()
                .query_row(
                    "SELECT id, owner_id, spec_json, created_at FROM datapacks WHERE id = ?1",
                    params![id],
                    |r| {
                        Ok((
                            r.get::<_, String>(0)?,
                            r.get::<_, Option<String>>(1)?,
                            r.get::<_, String>(2)?,
                            r.get::<_, String>(3)?,
                        ))
                    },
                )
                .optional()?;

            let Some((id, owner_id, spec_json, created_at)) = row else {
                return Ok(None);
            };
            let spec = serde_json::from_str(&spec_json)
                .map_err(|e| PipelineError::Save(format!("corrupt row {id}: {e}")))?;
            let created_at = DateTime::parse_from_rfc3339(&created_at)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| PipelineError::Save(format!("corrupt row {id}: {e}")))?;
            Ok(Some(StoredDatapack { id, owner_id, created_at, spec }))
        })
        .await
    }
}

/// Process-local store for runs without a database file.
#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<HashMap<String, StoredDatapack>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.lock().is_empty()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn save(&self, spec: &DatapackSpec, owner_id: Option<&str>) -> Result<String, PipelineError> {
        let id = Uuid::new_v4().to_string();
        let row = StoredDatapack {
            id: id.clone(),
            owner_id: owner_id.map(str::to_string),
            created_at: Utc::now(),
            spec: spec.clone(),
        };
        self.rows.lock().insert(id.clone(), row);
        Ok(id)
    }

    async fn load(&self, id: &str) -> Result<Option<StoredDatapack>, PipelineError> {
        Ok(self.rows.lock().get(id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::FileEntry;

    fn spec() -> DatapackSpec {
        DatapackSpec {
            name: "Healing Aura".into(),
            description: "heal".into(),
            files: vec![FileEntry { path: "pack.mcmeta".into(), content: "{}".into() }],
            install_instructions: "copy".into(),
        }
    }

    #[tokio::test]
    async fn sqlite_round_trips_spec_and_owner() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(&dir.path().join("nested/packs.db")).unwrap();

        let id = store.save(&spec(), Some("user-1")).await.unwrap();
        let loaded = store.load(&id).await.unwrap().expect("row exists");
        assert_eq!(loaded.id, id);
        assert_eq!(loaded.owner_id.as_deref(), Some("user-1"));
        assert_eq!(loaded.spec, spec());
        assert!(loaded.created_at <= Utc::now());
    }

    #[tokio::test]
    async fn anonymous_saves_get_distinct_ids() {
        let store = SqliteStore::open_in_memory().unwrap();
        let a = store.save(&spec(), None).await.unwrap();
        let b = store.save(&spec(), None).await.unwrap();
        assert_ne!(a, b);
        assert!(store.load(&a).await.unwrap().unwrap().owner_id.is_none());
    }

    #[tokio::test]
    async fn unknown_id_loads_none() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.load("missing").await.unwrap().is_none());

        let mem = MemoryStore::new();
        assert!(mem.load("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn memory_store_keeps_rows() {
        let mem = MemoryStore::new();
        let id = mem.save(&spec(), Some("o")).await.unwrap();
        assert_eq!(mem.len(), 1);
        assert_eq!(mem.load(&id).await.unwrap().unwrap().spec.name, "Healing Aura");
    }
}
