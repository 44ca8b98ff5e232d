//! Database connection management
//!
//! A store is a directory holding `main.db`, the folder registry, and one
//! `SQLite` file per folder. Folder databases are opened lazily and cached.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension};

use super::folder::{self, FolderDb};
use super::migrations;
use crate::config::{DatabaseOptions, MaintenanceConfig};
use crate::error::{Error, Result};
use crate::models::{DeviceId, FileRecord};
use crate::services::{BackgroundService, MaintenanceService};

const MAIN_DB_NAME: &str = "main.db";

/// Shared handle to a store directory
#[derive(Clone)]
pub struct Database {
    inner: Arc<Inner>,
}

struct Inner {
    dir: PathBuf,
    options: DatabaseOptions,
    main: Mutex<Connection>,
    folders: Mutex<HashMap<String, Arc<FolderDb>>>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("dir", &self.inner.dir)
            .field("options", &self.inner.options)
            .finish_non_exhaustive()
    }
}

impl Database {
    /// Open the store in `dir`, creating it if it doesn't exist
    ///
    /// Runs registry migrations automatically; folder databases are migrated
    /// when first opened.
    pub fn open(dir: impl AsRef<Path>, options: DatabaseOptions) -> Result<Self> {
        options.validate()?;

        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;

        let mut main = Connection::open(dir.join(MAIN_DB_NAME))?;
        folder::configure(&main)?;
        migrations::run_main(&mut main)?;

        tracing::debug!(
            dir = %dir.display(),
            retention = ?options.delete_retention,
            "Opened store"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                dir,
                options,
                main: Mutex::new(main),
                folders: Mutex::new(HashMap::new()),
            }),
        })
    }

    /// Directory this store lives in
    pub fn dir(&self) -> &Path {
        &self.inner.dir
    }

    pub fn options(&self) -> &DatabaseOptions {
        &self.inner.options
    }

    /// Configured tombstone retention; zero means collection is disabled
    pub fn delete_retention(&self) -> Duration {
        self.inner.options.delete_retention
    }

    /// Build the background maintenance service for this store.
    ///
    /// Only the abstract handle is returned; tests reach the concrete
    /// [`MaintenanceService`] through [`BackgroundService::as_any`].
    pub fn service(&self, interval: Duration) -> Result<Box<dyn BackgroundService>> {
        self.service_with_config(MaintenanceConfig::new(interval))
    }

    pub fn service_with_config(
        &self,
        config: MaintenanceConfig,
    ) -> Result<Box<dyn BackgroundService>> {
        Ok(Box::new(MaintenanceService::new(self.clone(), config)?))
    }

    fn lock_main(&self) -> Result<MutexGuard<'_, Connection>> {
        self.inner
            .main
            .lock()
            .map_err(|_| Error::Database("registry connection poisoned".into()))
    }

    fn lock_folders(&self) -> Result<MutexGuard<'_, HashMap<String, Arc<FolderDb>>>> {
        self.inner
            .folders
            .lock()
            .map_err(|_| Error::Database("folder cache poisoned".into()))
    }

    /// All registered folder IDs, sorted
    pub fn list_folders(&self) -> Result<Vec<String>> {
        let conn = self.lock_main()?;
        let mut stmt = conn.prepare("SELECT folder_id FROM folders ORDER BY folder_id")?;
        let folders = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(folders)
    }

    /// Open the database for `folder_id`, `None` if the folder is unknown
    pub fn folder(&self, folder_id: &str) -> Result<Option<Arc<FolderDb>>> {
        self.folder_db(folder_id, false)
    }

    fn folder_db(&self, folder_id: &str, create: bool) -> Result<Option<Arc<FolderDb>>> {
        let mut folders = self.lock_folders()?;
        if let Some(db) = folders.get(folder_id) {
            return Ok(Some(Arc::clone(db)));
        }

        let Some(database_name) = self.database_name(folder_id, create)? else {
            return Ok(None);
        };

        let db = Arc::new(FolderDb::open(
            folder_id,
            self.inner.dir.join(database_name),
        )?);
        folders.insert(folder_id.to_string(), Arc::clone(&db));
        Ok(Some(db))
    }

    fn database_name(&self, folder_id: &str, create: bool) -> Result<Option<String>> {
        let mut conn = self.lock_main()?;
        let existing: Option<String> = conn
            .query_row(
                "SELECT database_name FROM folders WHERE folder_id = ?",
                params![folder_id],
                |row| row.get(0),
            )
            .optional()?;
        if existing.is_some() || !create {
            return Ok(existing);
        }

        // File names come from the registry index, never from the folder ID
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO folders (folder_id, database_name) VALUES (?, '')",
            params![folder_id],
        )?;
        let idx = tx.last_insert_rowid();
        let name = format!("folder.{idx:04}.db");
        tx.execute(
            "UPDATE folders SET database_name = ? WHERE idx = ?",
            params![name, idx],
        )?;
        tx.commit()?;

        tracing::info!(folder = folder_id, database = %name, "Registered folder");
        Ok(Some(name))
    }

    /// Insert or replace `files` as announced by `device` in `folder_id`,
    /// registering the folder on first use
    pub fn update(&self, folder_id: &str, device: &DeviceId, files: &[FileRecord]) -> Result<()> {
        let db = self
            .folder_db(folder_id, true)?
            .ok_or_else(|| Error::NotFound(folder_id.to_string()))?;
        db.update(device, files)
    }

    /// Fetch the record `device` holds for `name` in `folder_id`
    pub fn get_device_file(
        &self,
        folder_id: &str,
        device: &DeviceId,
        name: &str,
    ) -> Result<Option<FileRecord>> {
        match self.folder(folder_id)? {
            Some(db) => db.get_device_file(device, name),
            None => Ok(None),
        }
    }

    /// Close the registry and every cached folder connection.
    ///
    /// Fails without touching anything while another clone of this handle is
    /// alive. Folder handles still held elsewhere are reported as an error
    /// after every other connection has been closed.
    pub fn close(self) -> Result<()> {
        let inner = Arc::try_unwrap(self.inner).map_err(|inner| {
            Error::Database(format!(
                "store still in use by {} other handle(s)",
                Arc::strong_count(&inner) - 1
            ))
        })?;

        let folders = inner
            .folders
            .into_inner()
            .map_err(|_| Error::Database("folder cache poisoned".into()))?;
        let mut busy = Vec::new();
        for (folder_id, db) in folders {
            match Arc::try_unwrap(db) {
                Ok(db) => db.close()?,
                Err(_) => busy.push(folder_id),
            }
        }

        let main = inner
            .main
            .into_inner()
            .map_err(|_| Error::Database("registry connection poisoned".into()))?;
        main.close().map_err(|(_, error)| Error::from(error))?;

        if !busy.is_empty() {
            busy.sort();
            return Err(Error::Database(format!(
                "folder handles still in use: {}",
                busy.join(", ")
            )));
        }
        Ok(())
    }
}
