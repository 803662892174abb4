//! Configuration module for specgraph
//!
//! This module handles everything that touches the filesystem:
//! - Engine and logging configuration (`specgraph.toml`)
//! - Application state persistence (recent documents, last session)
//! - Graph documents (`.sgraph`) holding macros and the main graph
//!
//! # App Data Location
//!
//! Application data is stored in the platform-appropriate location:
//! - **Linux**: `~/.local/share/dev.specgraph/`
//! - **macOS**: `~/Library/Application Support/dev.specgraph/`
//! - **Windows**: `%APPDATA%\dev.specgraph\`
//!
//! # Example
//!
//! ```ignore
//! use specgraph::config::{AppConfig, AppState, DocumentFile};
//! use specgraph::graph::Workspace;
//!
//! let config = AppConfig::load_or_default();
//! let mut state = AppState::load_or_default();
//!
//! let mut ws = Workspace::with_config(config.engine.clone());
//! let doc = DocumentFile::load("scene.sgraph")?;
//! ws.load_document(&doc.document)?;
//!
//! state.add_recent_document("scene.sgraph", "scene");
//! state.save()?;
//! ```

use crate::error::{Result, SpecGraphError};
use crate::graph::{EngineConfig, SavedDocument};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Application identifier for data directories
pub const APP_ID: &str = "dev.specgraph";

/// App state filename
pub const APP_STATE_FILE: &str = "app_state.json";

/// Configuration filename
pub const CONFIG_FILE: &str = "specgraph.toml";

/// Document file extension
pub const DOCUMENT_FILE_EXTENSION: &str = "sgraph";

/// Maximum number of recent documents to remember
pub const MAX_RECENT_DOCUMENTS: usize = 10;

/// Log filter used when neither `RUST_LOG` nor the config sets one
pub const DEFAULT_LOG_FILTER: &str = "info,specgraph=debug";

// ==================== App Data Directory ====================

/// Get the application data directory path
pub fn app_data_dir() -> Option<PathBuf> {
    dirs_next::data_dir().map(|p| p.join(APP_ID))
}

/// Ensure the app data directory exists
pub fn ensure_app_data_dir() -> Result<PathBuf> {
    let dir = app_data_dir().ok_or_else(|| {
        SpecGraphError::Config("Could not determine app data directory".to_string())
    })?;

    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| {
            SpecGraphError::Config(format!("Failed to create app data directory: {}", e))
        })?;
    }

    Ok(dir)
}

/// Get the path to the app state file
pub fn app_state_path() -> Option<PathBuf> {
    app_data_dir().map(|p| p.join(APP_STATE_FILE))
}

/// Get the path to the config file
pub fn config_path() -> Option<PathBuf> {
    app_data_dir().map(|p| p.join(CONFIG_FILE))
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            SpecGraphError::Config(format!("Failed to create directory {:?}: {}", parent, e))
        })?;
    }
    Ok(())
}

// ==================== App Config ====================

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

/// User configuration, stored as TOML
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load from an explicit path. A missing file yields defaults.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| SpecGraphError::Config(format!("Failed to read config {:?}: {}", path, e)))?;

        toml::from_str(&content)
            .map_err(|e| SpecGraphError::Config(format!("Failed to parse config {:?}: {}", path, e)))
    }

    /// Load config from the default location
    pub fn load() -> Result<Self> {
        let path = config_path().ok_or_else(|| {
            SpecGraphError::Config("Could not determine config path".to_string())
        })?;
        Self::load_from(path)
    }

    /// Load config, returning defaults on any error
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        ensure_parent(path)?;

        let content = toml::to_string_pretty(self)
            .map_err(|e| SpecGraphError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| SpecGraphError::Config(format!("Failed to write config {:?}: {}", path, e)))
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<()> {
        let dir = ensure_app_data_dir()?;
        self.save_to(dir.join(CONFIG_FILE))
    }
}

// ==================== Recent Document Entry ====================

/// Information about a recently opened document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecentDocument {
    /// Path to the document file
    pub path: PathBuf,

    /// Display name
    pub name: String,

    /// Last opened timestamp (Unix seconds)
    pub last_opened: u64,
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl RecentDocument {
    pub fn new(path: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
            last_opened: unix_now(),
        }
    }

    /// Update the last opened timestamp
    pub fn touch(&mut self) {
        self.last_opened = unix_now();
    }

    /// Check if the document file still exists
    pub fn exists(&self) -> bool {
        self.path.exists()
    }
}

// ==================== App State ====================

/// Persistent application state
///
/// History that persists across sessions, separate from documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppState {
    /// Version for future migration support
    #[serde(default = "default_app_state_version")]
    pub version: u32,

    /// Recently opened documents, most recent first
    #[serde(default)]
    pub recent_documents: Vec<RecentDocument>,

    /// Path to the last opened document
    #[serde(default)]
    pub last_document_path: Option<PathBuf>,
}

fn default_app_state_version() -> u32 {
    1
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            version: 1,
            recent_documents: Vec::new(),
            last_document_path: None,
        }
    }
}

impl AppState {
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| SpecGraphError::Config(format!("Failed to read app state: {}", e)))?;

        serde_json::from_str(&content)
            .map_err(|e| SpecGraphError::Config(format!("Failed to parse app state: {}", e)))
    }

    /// Load app state from the default location
    pub fn load() -> Result<Self> {
        let path = app_state_path().ok_or_else(|| {
            SpecGraphError::Config("Could not determine app state path".to_string())
        })?;
        Self::load_from(path)
    }

    /// Load app state, returning defaults on any error
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            tracing::warn!("Failed to load app state, using defaults: {}", e);
            Self::default()
        })
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        ensure_parent(path)?;

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| SpecGraphError::Config(format!("Failed to serialize app state: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| SpecGraphError::Config(format!("Failed to write app state: {}", e)))
    }

    /// Save app state to the default location
    pub fn save(&self) -> Result<()> {
        let dir = ensure_app_data_dir()?;
        self.save_to(dir.join(APP_STATE_FILE))
    }

    /// Add or update a recent document
    pub fn add_recent_document(&mut self, path: impl AsRef<Path>, name: &str) {
        let path = path.as_ref().to_path_buf();

        self.recent_documents.retain(|d| d.path != path);
        self.recent_documents
            .insert(0, RecentDocument::new(path.clone(), name));
        self.recent_documents.truncate(MAX_RECENT_DOCUMENTS);

        self.last_document_path = Some(path);
    }

    /// Remove a document from recents
    pub fn remove_recent_document(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        self.recent_documents.retain(|d| d.path != path);

        if self.last_document_path.as_deref() == Some(path) {
            self.last_document_path = None;
        }
    }

    /// Drop recent documents that no longer exist
    pub fn cleanup_missing_documents(&mut self) {
        self.recent_documents.retain(|d| d.exists());

        if let Some(ref last) = self.last_document_path {
            if !last.exists() {
                self.last_document_path = None;
            }
        }
    }

    /// The most recent document path, if it still exists
    pub fn get_last_document(&self) -> Option<&Path> {
        self.last_document_path
            .as_ref()
            .filter(|p| p.exists())
            .map(|p| p.as_path())
    }
}

// ==================== Document File ====================

/// A graph document on disk
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentFile {
    pub document: SavedDocument,
}

impl DocumentFile {
    pub fn new(document: SavedDocument) -> Self {
        Self { document }
    }

    /// Load a document file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SpecGraphError::Config(format!("Failed to read document {:?}: {}", path, e))
        })?;

        let document = SavedDocument::from_json_str(&content).map_err(|e| {
            SpecGraphError::Config(format!("Failed to parse document {:?}: {}", path, e))
        })?;
        tracing::info!("Read document {:?} ({} nodes)", path, document.graph.len());
        Ok(Self { document })
    }

    /// Save the document as pretty JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        ensure_parent(path)?;

        let content = self.document.to_json_string().map_err(|e| {
            SpecGraphError::Serialization(format!("Failed to serialize document: {}", e))
        })?;

        std::fs::write(path, content).map_err(|e| {
            SpecGraphError::Config(format!("Failed to write document {:?}: {}", path, e))
        })?;
        tracing::info!("Wrote document {:?}", path);
        Ok(())
    }

    /// Name shown in recent lists: the file stem
    pub fn display_name(path: impl AsRef<Path>) -> String {
        path.as_ref()
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "untitled".to_string())
    }
}

// ==================== Tests ====================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{builtin_registry, Graph};
    use tempfile::TempDir;

    #[test]
    fn test_app_state_default() {
        let state = AppState::default();
        assert!(state.recent_documents.is_empty());
        assert!(state.last_document_path.is_none());
        assert_eq!(state.version, 1);
    }

    #[test]
    fn test_add_recent_document() {
        let mut state = AppState::default();

        state.add_recent_document("/path/to/mars.sgraph", "mars");
        state.add_recent_document("/path/to/moon.sgraph", "moon");
        assert_eq!(state.recent_documents.len(), 2);
        assert_eq!(state.recent_documents[0].name, "moon"); // Most recent first

        // Adding same path again should update, not duplicate
        state.add_recent_document("/path/to/mars.sgraph", "mars again");
        assert_eq!(state.recent_documents.len(), 2);
        assert_eq!(state.recent_documents[0].name, "mars again");
        assert_eq!(
            state.last_document_path,
            Some(PathBuf::from("/path/to/mars.sgraph"))
        );

        state.remove_recent_document("/path/to/mars.sgraph");
        assert_eq!(state.recent_documents.len(), 1);
        assert!(state.last_document_path.is_none());
    }

    #[test]
    fn test_recent_documents_max_limit() {
        let mut state = AppState::default();
        for i in 0..15 {
            state.add_recent_document(format!("/path/to/doc{}.sgraph", i), &format!("doc{}", i));
        }
        assert_eq!(state.recent_documents.len(), MAX_RECENT_DOCUMENTS);
        assert_eq!(state.recent_documents[0].name, "doc14");
    }

    #[test]
    fn test_cleanup_missing_documents() {
        let dir = TempDir::new().unwrap();
        let present = dir.path().join("present.sgraph");
        std::fs::write(&present, "{}").unwrap();

        let mut state = AppState::default();
        state.add_recent_document(&present, "present");
        state.add_recent_document(dir.path().join("gone.sgraph"), "gone");
        state.cleanup_missing_documents();

        assert_eq!(state.recent_documents.len(), 1);
        assert_eq!(state.recent_documents[0].name, "present");
        assert!(state.last_document_path.is_none());
    }

    #[test]
    fn test_app_state_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join(APP_STATE_FILE);

        let mut state = AppState::default();
        state.add_recent_document("/test/a.sgraph", "a");
        state.save_to(&path).unwrap();

        let parsed = AppState::load_from(&path).unwrap();
        assert_eq!(parsed.recent_documents.len(), 1);
        assert_eq!(parsed.recent_documents[0].name, "a");
    }

    #[test]
    fn test_config_defaults_and_partial_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        assert_eq!(AppConfig::load_from(&path).unwrap(), AppConfig::default());

        std::fs::write(&path, "[engine]\nundo_depth = 4\n").unwrap();
        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.engine.undo_depth, 4);
        assert!(config.engine.auto_perform);
        assert_eq!(config.logging.filter, DEFAULT_LOG_FILTER);
    }

    #[test]
    fn test_config_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        let mut config = AppConfig::default();
        config.engine.report_version_drift = false;
        config.logging.filter = "warn".to_string();
        config.save_to(&path).unwrap();
        assert_eq!(AppConfig::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_malformed_config_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "engine = 3").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(SpecGraphError::Config(_))
        ));
    }

    #[test]
    fn test_document_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("docs").join("scene.sgraph");

        let mut g = Graph::new();
        let gen = g.create(builtin_registry(), "gen").unwrap();
        let sink = g.create(builtin_registry(), "sink").unwrap();
        g.connect(sink, 0, gen, 0);

        let file = DocumentFile::new(SavedDocument {
            graph: g.save(),
            ..Default::default()
        });
        file.save(&path).unwrap();

        let loaded = DocumentFile::load(&path).unwrap();
        assert_eq!(loaded, file);
        assert_eq!(DocumentFile::display_name(&path), "scene");
    }

    #[test]
    fn test_document_file_bad_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.sgraph");
        std::fs::write(&path, "not json").unwrap();
        assert!(DocumentFile::load(&path).is_err());
    }
}
