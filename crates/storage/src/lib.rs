use directories::ProjectDirs;
use doc_model::{Annotation, DisplayOptions, Highlight};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const PREFS_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("unable to resolve local data directory")]
    NoDataDirectory,
    #[error("unsupported schema version {found} (expected at most {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Highlights and annotations injected into a session, e.g. a lesson's
/// sample data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FixtureSet {
    #[serde(default)]
    pub highlights: Vec<Highlight>,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

impl FixtureSet {
    pub fn from_json(json: &str) -> Result<Self, StorageError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let bytes = fs::read(path.as_ref())?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), StorageError> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path.as_ref(), serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DisplayEnvelope {
    version: u32,
    display: DisplayOptions,
}

impl Storage {
    pub fn from_default_project() -> Result<Self, StorageError> {
        let dirs = ProjectDirs::from("dev", "Marginalia", "Marginalia")
            .ok_or(StorageError::NoDataDirectory)?;

        Ok(Self { root: dirs.data_local_dir().to_path_buf() })
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn load_display_options(&self) -> Result<DisplayOptions, StorageError> {
        let path = self.display_path();
        if !path.exists() {
            return Ok(DisplayOptions::default());
        }

        let bytes = fs::read(path)?;
        let envelope: DisplayEnvelope = serde_json::from_slice(&bytes)?;
        if envelope.version > PREFS_SCHEMA_VERSION {
            return Err(StorageError::UnsupportedVersion {
                found: envelope.version,
                supported: PREFS_SCHEMA_VERSION,
            });
        }

        Ok(envelope.display)
    }

    pub fn save_display_options(&self, display: &DisplayOptions) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root)?;

        let envelope = DisplayEnvelope { version: PREFS_SCHEMA_VERSION, display: *display };
        fs::write(self.display_path(), serde_json::to_vec_pretty(&envelope)?)?;
        Ok(())
    }

    pub fn fixtures_path(&self, lesson: &str) -> PathBuf {
        self.root.join("lessons").join(format!("{lesson}.json"))
    }

    fn display_path(&self) -> PathBuf {
        self.root.join("display.json")
    }
}
