//! The model registry and snapshot persistence.
//!
//! A snapshot is one JSON file holding the export form of every model:
//!
//! ```text
//! {
//!   "meta": { "version": 1, "docvault": "0.1.0" },
//!   "models": { "Post": [ { "_id": "c...", "title": "Hello" } ] }
//! }
//! ```

use std::{
    fmt, fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use bson::Bson;
use indexmap::IndexMap;
use log::{debug, info, warn};
use mea::rwlock::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use docvault_core::{
    error::{StoreError, StoreResult},
    schema::Schema,
    value,
};

use crate::model::Model;

pub(crate) type Registry = RwLock<IndexMap<String, Arc<Model>>>;

/// Called with `(old_version, new_version)` when a loaded snapshot has another version.
pub type VersionCallback = Arc<dyn Fn(i64, i64) -> StoreResult<()> + Send + Sync>;

#[derive(Clone, Default)]
pub struct DatabaseOptions {
    /// Version written into snapshots.
    pub version: i64,
    /// Snapshot file used by [`Database::load`] and [`Database::save`].
    pub path: Option<PathBuf>,
    pub on_upgrade: Option<VersionCallback>,
    pub on_downgrade: Option<VersionCallback>,
}

impl fmt::Debug for DatabaseOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseOptions")
            .field("version", &self.version)
            .field("path", &self.path)
            .field("on_upgrade", &self.on_upgrade.is_some())
            .field("on_downgrade", &self.on_downgrade.is_some())
            .finish()
    }
}

/// Builder for [`Database`].
#[derive(Debug, Default)]
pub struct DatabaseBuilder {
    options: DatabaseOptions,
}

impl DatabaseBuilder {
    pub fn version(mut self, version: i64) -> Self {
        self.options.version = version;
        self
    }

    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.options.path = Some(path.into());
        self
    }

    pub fn on_upgrade<F>(mut self, callback: F) -> Self
    where
        F: Fn(i64, i64) -> StoreResult<()> + Send + Sync + 'static,
    {
        self.options.on_upgrade = Some(Arc::new(callback));
        self
    }

    pub fn on_downgrade<F>(mut self, callback: F) -> Self
    where
        F: Fn(i64, i64) -> StoreResult<()> + Send + Sync + 'static,
    {
        self.options.on_downgrade = Some(Arc::new(callback));
        self
    }

    pub fn build(self) -> Database {
        Database { options: Arc::new(self.options), models: Arc::new(RwLock::new(IndexMap::new())) }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotMeta {
    #[serde(default)]
    version: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    docvault: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    meta: SnapshotMeta,
    #[serde(default)]
    models: Map<String, Value>,
}

/// An in-memory database.
///
/// Cloning a database is cheap; clones share their models.
///
/// # Example
///
/// ```ignore
/// let db = Database::builder()
///     .path("blog.json")
///     .version(2)
///     .on_upgrade(|from, to| {
///         log::info!("migrating {from} -> {to}");
///         Ok(())
///     })
///     .build();
///
/// db.load().await?;
/// let posts = db.model("Post", post_schema).await;
/// ```
#[derive(Clone)]
pub struct Database {
    options: Arc<DatabaseOptions>,
    models: Arc<Registry>,
}

impl Database {
    pub fn builder() -> DatabaseBuilder {
        DatabaseBuilder::default()
    }

    pub fn options(&self) -> &DatabaseOptions {
        &self.options
    }

    /// Registers a model, or returns the one already registered under `name`.
    ///
    /// An `_id` path is added to `schema` unless it declares one. When `name` is taken, `schema`
    /// is ignored.
    pub async fn model(&self, name: &str, mut schema: Schema) -> Arc<Model> {
        let mut models = self.models.write().await;
        if let Some(model) = models.get(name) {
            return model.clone();
        }

        schema.ensure_id();
        let model = Model::new(name, Arc::new(schema), Arc::downgrade(&self.models));
        models.insert(name.to_string(), model.clone());
        debug!("registered model `{name}`");
        model
    }

    pub async fn get_model(&self, name: &str) -> Option<Arc<Model>> {
        self.models.read().await.get(name).cloned()
    }

    /// Names of the registered models, in registration order.
    pub async fn models(&self) -> Vec<String> {
        self.models.read().await.keys().cloned().collect()
    }

    fn snapshot_path(&self) -> StoreResult<&Path> {
        self.options
            .path
            .as_deref()
            .ok_or_else(|| StoreError::Persistence("options.path is required".into()))
    }

    /// Loads the snapshot file into the registered models.
    ///
    /// A missing file leaves the database empty. Records of unregistered models are skipped.
    /// When the snapshot version differs from [`DatabaseOptions::version`], the matching
    /// upgrade or downgrade callback runs once after the data is loaded.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Persistence`] if no path is configured or the file is malformed
    /// - [`StoreError::Io`] if the file cannot be read
    /// - any error raised while parsing records or by a version callback
    pub async fn load(&self) -> StoreResult<()> {
        let path = self.snapshot_path()?;
        if !path.exists() {
            info!("no snapshot at {}", path.display());
            return Ok(());
        }

        let raw = fs::read_to_string(path)?;
        let snapshot: Snapshot = serde_json::from_str(&raw)
            .map_err(|err| StoreError::Persistence(format!("invalid snapshot {}: {err}", path.display())))?;

        for (name, records) in snapshot.models {
            let Some(model) = self.get_model(&name).await else {
                warn!("snapshot contains unregistered model `{name}`");
                continue;
            };

            let Value::Array(records) = records else {
                return Err(StoreError::Persistence(format!("records of `{name}` must be an array")));
            };

            let records = records
                .into_iter()
                .map(|record| match value::from_json(record) {
                    Bson::Document(record) => Ok(record),
                    other => Err(StoreError::Persistence(format!("invalid record of `{name}`: {other}"))),
                })
                .collect::<StoreResult<Vec<_>>>()?;
            model.import(records).await?;
        }

        let (old, new) = (snapshot.meta.version, self.options.version);
        info!("loaded snapshot version {old} from {}", path.display());

        if old < new {
            if let Some(callback) = &self.options.on_upgrade {
                callback(old, new)?;
            }
        } else if old > new {
            if let Some(callback) = &self.options.on_downgrade {
                callback(old, new)?;
            }
        }

        Ok(())
    }

    /// The snapshot of every registered model as JSON.
    pub async fn to_snapshot(&self) -> StoreResult<Value> {
        let models = self.models.read().await.clone();

        let mut exported = Map::new();
        for (name, model) in models {
            let records = model
                .export()
                .await?
                .into_iter()
                .map(|record| value::to_json(&Bson::Document(record)))
                .collect();
            exported.insert(name, Value::Array(records));
        }

        let snapshot = Snapshot {
            meta: SnapshotMeta {
                version: self.options.version,
                docvault: Some(env!("CARGO_PKG_VERSION").to_string()),
            },
            models: exported,
        };

        Ok(serde_json::to_value(snapshot)?)
    }

    /// Writes the snapshot file.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Persistence`] if no path is configured, and [`StoreError::Io`] if
    /// the file cannot be written.
    pub async fn save(&self) -> StoreResult<()> {
        let path = self.snapshot_path()?;
        let snapshot = self.to_snapshot().await?;

        fs::write(path, serde_json::to_string(&snapshot)?)?;
        info!("saved snapshot to {}", path.display());
        Ok(())
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database").field("options", &self.options).finish_non_exhaustive()
    }
}
