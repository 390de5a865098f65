//! Key-value persistence for calibration data.
//!
//! Values are small unsigned integers grouped into namespaces. The file
//! backend keeps everything in one JSON document and rewrites it atomically
//! whenever a namespace that was written to is closed.

use crate::error::StoreError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Narrow persistence capability: namespaced fixed-size integers.
pub trait KeyValueStore {
    /// Select the namespace subsequent reads/writes apply to.
    fn open_namespace(&mut self, name: &str) -> Result<(), StoreError>;

    /// Read `key` from the open namespace, or `default` if absent.
    fn get_u16(&self, key: &str, default: u16) -> Result<u16, StoreError>;

    /// Write `key` into the open namespace.
    fn put_u16(&mut self, key: &str, value: u16) -> Result<(), StoreError>;

    /// Close the open namespace, committing any writes.
    fn close_namespace(&mut self) -> Result<(), StoreError>;
}

/// On-disk document layout.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
struct StoreDocument {
    namespaces: BTreeMap<String, BTreeMap<String, u16>>,
}

/// JSON file backed store.
pub struct JsonFileStore {
    path: PathBuf,
    document: StoreDocument,
    open: Option<String>,
    dirty: bool,
}

impl JsonFileStore {
    /// Load the store from `path`, starting empty if the file doesn't exist.
    pub fn load_or_default(path: &Path) -> Result<Self, StoreError> {
        let document = if path.exists() {
            let contents = fs::read_to_string(path)?;
            serde_json::from_str(&contents)?
        } else {
            StoreDocument::default()
        };

        Ok(Self {
            path: path.to_path_buf(),
            document,
            open: None,
            dirty: false,
        })
    }

    /// Like [`load_or_default`](Self::load_or_default), but an unreadable or
    /// corrupt file is logged and replaced by an empty document. The path is
    /// kept, so the next commit rewrites the file.
    pub fn open_or_empty(path: &Path) -> Self {
        Self::load_or_default(path).unwrap_or_else(|e| {
            warn!(path = %path.display(), "Ignoring unreadable store: {}", e);
            Self {
                path: path.to_path_buf(),
                document: StoreDocument::default(),
                open: None,
                dirty: false,
            }
        })
    }

    /// Get the store file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the document using a temp file and rename.
    fn flush(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let temp_path = self.path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(&self.document)?;

        {
            let mut file = fs::File::create(&temp_path)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
        }

        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }

    fn namespace(&self) -> Result<&str, StoreError> {
        self.open.as_deref().ok_or(StoreError::NamespaceNotOpen)
    }
}

impl KeyValueStore for JsonFileStore {
    fn open_namespace(&mut self, name: &str) -> Result<(), StoreError> {
        self.open = Some(name.to_string());
        Ok(())
    }

    fn get_u16(&self, key: &str, default: u16) -> Result<u16, StoreError> {
        let namespace = self.namespace()?;
        Ok(self
            .document
            .namespaces
            .get(namespace)
            .and_then(|entries| entries.get(key))
            .copied()
            .unwrap_or(default))
    }

    fn put_u16(&mut self, key: &str, value: u16) -> Result<(), StoreError> {
        let namespace = self.namespace()?.to_string();
        self.document
            .namespaces
            .entry(namespace)
            .or_default()
            .insert(key.to_string(), value);
        self.dirty = true;
        Ok(())
    }

    fn close_namespace(&mut self) -> Result<(), StoreError> {
        self.namespace()?;
        self.open = None;
        if self.dirty {
            self.flush()?;
            self.dirty = false;
        }
        Ok(())
    }
}
