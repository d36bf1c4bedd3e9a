//! Project records.

use std::path::Path;

use landwatch_pipeline::AnalysisReport;
use serde::{Deserialize, Serialize};

/// Lifecycle of a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    /// Inputs stored, not yet analyzed.
    Uploaded,
    /// The last analysis succeeded; `result` is set.
    Analyzed,
    /// The last analysis failed; `error` is set.
    Failed,
}

/// One analysis project as stored in `project.json`.
///
/// `result` and `error` are mutually exclusive and are replaced together
/// on every analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    /// Eight lowercase hex characters.
    pub id: String,
    /// Display name, `Project-{id}` unless given.
    pub name: String,
    /// Creation time, milliseconds since the Unix epoch.
    pub created_at_ms: u64,
    /// Stored reference map file name inside the project directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_file: Option<String>,
    /// Stored satellite image file name inside the project directory.
    pub satellite_file: String,
    /// Registry plot id, when the approved boundary comes from the
    /// registry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plot_id: Option<String>,
    pub status: ProjectStatus,
    /// Time of the last analysis, milliseconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analyzed_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<AnalysisReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Project {
    /// Default display name for a project id.
    #[must_use]
    pub fn default_name(id: &str) -> String {
        format!("Project-{id}")
    }
}

/// An uploaded file: its original name and contents.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    #[must_use]
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }

    /// Read an upload from disk, keeping its file name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`](crate::StoreError::Io) if the file
    /// cannot be read.
    pub fn from_path(path: &Path) -> Result<Self, crate::StoreError> {
        let bytes = std::fs::read(path).map_err(crate::StoreError::io(path))?;
        let file_name = path
            .file_name()
            .map_or_else(String::new, |n| n.to_string_lossy().into_owned());
        Ok(Self { file_name, bytes })
    }

    /// Lowercase alphanumeric extension of the original name, or `img`.
    #[must_use]
    pub fn extension(&self) -> String {
        Path::new(&self.file_name)
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
            .map_or_else(|| "img".to_owned(), str::to_ascii_lowercase)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Inputs for [`ProjectStore::create_project`](crate::ProjectStore::create_project).
///
/// A satellite image is always required, together with a reference map,
/// a registry plot id, or both. When both are present the registry
/// polygon is used for the approved boundary.
#[derive(Debug, Clone)]
pub struct NewProject {
    pub name: Option<String>,
    pub reference: Option<Upload>,
    pub satellite: Upload,
    pub plot_id: Option<String>,
}

impl NewProject {
    /// A project comparing a reference layout map with a satellite image.
    #[must_use]
    pub const fn with_reference(reference: Upload, satellite: Upload) -> Self {
        Self {
            name: None,
            reference: Some(reference),
            satellite,
            plot_id: None,
        }
    }

    /// A project whose approved boundary comes from the plot registry.
    #[must_use]
    pub fn with_plot(plot_id: impl Into<String>, satellite: Upload) -> Self {
        Self {
            name: None,
            reference: None,
            satellite,
            plot_id: Some(plot_id.into()),
        }
    }

    /// Set the display name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}
