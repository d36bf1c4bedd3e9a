//! Flat-file project store.
//!
//! Layout under the store root:
//!
//! ```text
//! projects/<id>/project.json
//! projects/<id>/reference.<ext>    (when a layout map was uploaded)
//! projects/<id>/satellite.<ext>
//! results/<id>/result.json
//! results/<id>/overlay.png
//! results/<id>/mask.png
//! results/<id>/comparison.png     (reference-map runs only)
//! ```
//!
//! Every file is replaced atomically. Analyses of one project are
//! serialized by a lock file in its project directory; different
//! projects share nothing and may run concurrently.

use std::fs;
use std::hash::Hasher;
use std::io::{Cursor, ErrorKind};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use image::{DynamicImage, ImageFormat};
use landwatch_pipeline::{AnalysisConfig, AnalysisInput, AnalysisOutcome};
use siphasher::sip::SipHasher13;

use crate::atomic::{ProjectLock, atomic_write, atomic_write_json};
use crate::error::StoreError;
use crate::project::{NewProject, Project, ProjectStatus};
use crate::registry::PlotRegistry;

const PROJECTS_DIR: &str = "projects";
const RESULTS_DIR: &str = "results";
const PROJECT_FILE: &str = "project.json";
const RESULT_FILE: &str = "result.json";
const OVERLAY_FILE: &str = "overlay.png";
const MASK_FILE: &str = "mask.png";
const COMPARISON_FILE: &str = "comparison.png";

/// Attempts at finding an unused id before giving up.
const MAX_ID_ATTEMPTS: u32 = 16;

/// Milliseconds since the Unix epoch.
#[must_use]
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

/// Project ids are path components; anything else is simply unknown.
fn check_id(id: &str) -> Result<(), StoreError> {
    if !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric()) {
        Ok(())
    } else {
        Err(StoreError::NotFound(id.to_owned()))
    }
}

fn project_id(new: &NewProject, created_at_ms: u64, attempt: u32) -> String {
    let mut hasher = SipHasher13::new();
    hasher.write(&new.satellite.bytes);
    if let Some(reference) = &new.reference {
        hasher.write(&reference.bytes);
    }
    hasher.write(new.name.as_deref().unwrap_or_default().as_bytes());
    hasher.write(new.plot_id.as_deref().unwrap_or_default().as_bytes());
    hasher.write_u64(created_at_ms);
    hasher.write_u32(attempt);
    let hex = format!("{:016x}", hasher.finish());
    hex[..8].to_owned()
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|s| !s.is_empty()).map(str::to_owned)
}

fn encode_png(image: DynamicImage, name: &'static str) -> Result<Vec<u8>, StoreError> {
    let mut buf = Cursor::new(Vec::new());
    image
        .write_to(&mut buf, ImageFormat::Png)
        .map_err(|source| StoreError::Encode { name, source })?;
    Ok(buf.into_inner())
}

fn remove_dir_if_present(path: &Path) -> Result<(), StoreError> {
    match fs::remove_dir_all(path) {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(StoreError::io(path)(e)),
        _ => Ok(()),
    }
}

/// `results/<id>.<suffix>`. Ids are alphanumeric, so these never clash
/// with a result directory.
fn sibling(dir: &Path, suffix: &str) -> PathBuf {
    let mut name = dir.as_os_str().to_owned();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

/// Replace `dir` with `staged` as one unit.
///
/// The old directory is moved aside before the rename, so readers see
/// either the previous snapshot, nothing, or the new snapshot, never a
/// mix of files from two runs.
fn swap_dir(staged: &Path, dir: &Path) -> Result<(), StoreError> {
    let old = sibling(dir, "old");
    remove_dir_if_present(&old)?;
    if let Err(e) = fs::rename(dir, &old)
        && e.kind() != ErrorKind::NotFound
    {
        return Err(StoreError::io(dir)(e));
    }
    fs::rename(staged, dir).map_err(StoreError::io(dir))?;
    remove_dir_if_present(&old)
}

/// Projects and their cached results under one root directory.
#[derive(Debug, Clone)]
pub struct ProjectStore {
    root: PathBuf,
}

impl ProjectStore {
    /// Open a store, creating its directories if needed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the directories cannot be created.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let store = Self { root: root.into() };
        for dir in [store.root.join(PROJECTS_DIR), store.root.join(RESULTS_DIR)] {
            fs::create_dir_all(&dir).map_err(StoreError::io(&dir))?;
        }
        Ok(store)
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding a project's record and inputs.
    #[must_use]
    pub fn project_dir(&self, id: &str) -> PathBuf {
        self.root.join(PROJECTS_DIR).join(id)
    }

    /// Directory holding a project's latest outputs.
    #[must_use]
    pub fn result_dir(&self, id: &str) -> PathBuf {
        self.root.join(RESULTS_DIR).join(id)
    }

    /// Store the uploads of a new project, stamped with the current time.
    ///
    /// # Errors
    ///
    /// See [`create_project_at`](Self::create_project_at).
    pub fn create_project(&self, new: NewProject) -> Result<Project, StoreError> {
        self.create_project_at(new, now_ms())
    }

    /// Store the uploads of a new project with an explicit creation time.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::MissingInput`] without a satellite image or
    /// without both a reference map and a plot id, and
    /// [`StoreError::Io`] if the files cannot be written.
    pub fn create_project_at(&self, new: NewProject, created_at_ms: u64) -> Result<Project, StoreError> {
        if new.satellite.is_empty() {
            return Err(StoreError::MissingInput("satellite image"));
        }
        let reference = new.reference.as_ref().filter(|r| !r.is_empty());
        let plot_id = non_blank(new.plot_id.as_deref());
        if reference.is_none() && plot_id.is_none() {
            return Err(StoreError::MissingInput("reference map or plot id"));
        }

        let (id, dir) = self.allocate(&new, created_at_ms)?;

        let reference_file = match reference {
            Some(upload) => {
                let file = format!("reference.{}", upload.extension());
                atomic_write(&dir.join(&file), &upload.bytes)?;
                Some(file)
            }
            None => None,
        };
        let satellite_file = format!("satellite.{}", new.satellite.extension());
        atomic_write(&dir.join(&satellite_file), &new.satellite.bytes)?;

        let project = Project {
            name: non_blank(new.name.as_deref()).unwrap_or_else(|| Project::default_name(&id)),
            id,
            created_at_ms,
            reference_file,
            satellite_file,
            plot_id,
            status: ProjectStatus::Uploaded,
            analyzed_at_ms: None,
            result: None,
            error: None,
        };
        atomic_write_json(&dir.join(PROJECT_FILE), &project)?;

        tracing::info!(id = %project.id, name = %project.name, "created project");
        Ok(project)
    }

    /// Claim a fresh project directory. `create_dir` is the arbiter, so
    /// concurrent creators never share an id.
    fn allocate(&self, new: &NewProject, created_at_ms: u64) -> Result<(String, PathBuf), StoreError> {
        let parent = self.root.join(PROJECTS_DIR);
        fs::create_dir_all(&parent).map_err(StoreError::io(&parent))?;

        for attempt in 0..MAX_ID_ATTEMPTS {
            let id = project_id(new, created_at_ms, attempt);
            let dir = parent.join(&id);
            match fs::create_dir(&dir) {
                Ok(()) => return Ok((id, dir)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    tracing::debug!(%id, attempt, "project id taken, rehashing");
                }
                Err(e) => return Err(StoreError::io(&dir)(e)),
            }
        }
        Err(StoreError::Io {
            path: parent,
            source: std::io::Error::new(ErrorKind::AlreadyExists, "no free project id"),
        })
    }

    /// Load one project record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for unknown ids and
    /// [`StoreError::Json`] for a corrupt record.
    pub fn load(&self, id: &str) -> Result<Project, StoreError> {
        check_id(id)?;
        let path = self.project_dir(id).join(PROJECT_FILE);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(StoreError::NotFound(id.to_owned())),
            Err(e) => return Err(StoreError::io(&path)(e)),
        };
        serde_json::from_slice(&bytes).map_err(StoreError::json(&path))
    }

    /// All readable projects, newest first. Unreadable records are
    /// logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the projects directory cannot be
    /// listed.
    pub fn list(&self) -> Result<Vec<Project>, StoreError> {
        let parent = self.root.join(PROJECTS_DIR);
        let entries = match fs::read_dir(&parent) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&parent)(e)),
        };

        let mut projects = Vec::new();
        for entry in entries {
            let entry = entry.map_err(StoreError::io(&parent))?;
            let name = entry.file_name();
            let Some(id) = name.to_str() else { continue };
            match self.load(id) {
                Ok(project) => projects.push(project),
                Err(e) => tracing::warn!(%id, error = %e, "skipping unreadable project"),
            }
        }
        projects.sort_by(|a, b| b.created_at_ms.cmp(&a.created_at_ms).then_with(|| a.id.cmp(&b.id)));
        Ok(projects)
    }

    /// Run the pipeline on a project and replace its cached result.
    ///
    /// A pipeline failure, or a plot id missing from the registry, is
    /// recorded on the project as [`ProjectStatus::Failed`] and returned
    /// as `Ok`. Any previous result files are removed in that case.
    ///
    /// Result files are written to a staging directory and swapped in
    /// together, then `project.json` is rewritten. If writing fails the
    /// previous snapshot and record are left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Locked`] if another analysis of the same
    /// project is running, and I/O, registry and encoding errors.
    pub fn analyze<R>(&self, id: &str, registry: &R, config: &AnalysisConfig) -> Result<Project, StoreError>
    where
        R: PlotRegistry + ?Sized,
    {
        self.load(id)?;
        let _lock = ProjectLock::acquire(&self.project_dir(id), id)?;
        let mut project = self.load(id)?;

        let results = self.result_dir(id);
        match self.input_for(&project, registry)? {
            Ok(input) => match landwatch_pipeline::analyze(input, config.clone()) {
                Ok(outcome) => {
                    let report = outcome.report.clone();
                    Self::write_outputs(&results, outcome)?;
                    project.status = ProjectStatus::Analyzed;
                    project.result = Some(report);
                    project.error = None;
                }
                Err(e) => Self::record_failure(&mut project, &results, e.to_string())?,
            },
            Err(message) => Self::record_failure(&mut project, &results, message)?,
        }

        project.analyzed_at_ms = Some(now_ms());
        atomic_write_json(&self.project_dir(id).join(PROJECT_FILE), &project)?;

        match &project.result {
            Some(report) => tracing::info!(
                %id,
                classification = ?report.assessment.classification,
                encroachment_pct = report.metrics.encroachment_pct,
                "project analyzed"
            ),
            None => tracing::warn!(%id, error = project.error.as_deref().unwrap_or_default(), "project analysis failed"),
        }
        Ok(project)
    }

    /// Build the pipeline input. The inner `Err` is an input problem to
    /// record on the project rather than a store failure.
    fn input_for<R>(&self, project: &Project, registry: &R) -> Result<Result<AnalysisInput, String>, StoreError>
    where
        R: PlotRegistry + ?Sized,
    {
        let dir = self.project_dir(&project.id);
        let read = |file: &str| {
            let path = dir.join(file);
            fs::read(&path).map_err(StoreError::io(&path))
        };
        let satellite = read(&project.satellite_file)?;

        if let Some(plot_id) = &project.plot_id {
            return Ok(match registry.lookup(plot_id)? {
                Some(polygon) => Ok(AnalysisInput::with_registry(plot_id.clone(), polygon, satellite)),
                None => Err(format!("plot {plot_id} not found in registry")),
            });
        }
        match &project.reference_file {
            Some(file) => Ok(Ok(AnalysisInput::with_reference(read(file)?, satellite))),
            None => Err(StoreError::MissingInput("reference map or plot id")),
        }
    }

    fn write_outputs(results: &Path, outcome: AnalysisOutcome) -> Result<(), StoreError> {
        let staging = sibling(results, "staging");
        remove_dir_if_present(&staging)?;
        let staged = Self::write_snapshot(&staging, outcome).and_then(|()| swap_dir(&staging, results));
        if staged.is_err()
            && let Err(e) = fs::remove_dir_all(&staging)
        {
            tracing::warn!(path = %staging.display(), error = %e, "failed to remove staging directory");
        }
        staged
    }

    fn write_snapshot(dir: &Path, outcome: AnalysisOutcome) -> Result<(), StoreError> {
        atomic_write_json(&dir.join(RESULT_FILE), &outcome.report)?;
        atomic_write(
            &dir.join(OVERLAY_FILE),
            &encode_png(DynamicImage::ImageRgb8(outcome.overlay), OVERLAY_FILE)?,
        )?;
        atomic_write(
            &dir.join(MASK_FILE),
            &encode_png(DynamicImage::ImageLuma8(outcome.encroachment_mask.into_gray()), MASK_FILE)?,
        )?;
        if let Some(comparison) = outcome.comparison {
            atomic_write(
                &dir.join(COMPARISON_FILE),
                &encode_png(DynamicImage::ImageRgb8(comparison), COMPARISON_FILE)?,
            )?;
        }
        Ok(())
    }

    fn record_failure(project: &mut Project, results: &Path, message: String) -> Result<(), StoreError> {
        remove_dir_if_present(results)?;
        project.status = ProjectStatus::Failed;
        project.result = None;
        project.error = Some(message);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::project::Upload;

    fn test_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "landwatch_store_{name}_{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn ids_are_eight_hex_chars() {
        let new = NewProject::with_plot("P-1", Upload::new("s.png", vec![1, 2, 3]));
        let id = project_id(&new, 42, 0);
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(id, project_id(&new, 42, 0));
        assert_ne!(id, project_id(&new, 42, 1));
        assert_ne!(id, project_id(&new, 43, 0));
    }

    #[test]
    fn path_like_ids_are_unknown() {
        let store = ProjectStore::open(test_dir("path_like")).unwrap();
        for id in ["", "..", "../etc", "a/b"] {
            assert!(matches!(store.load(id), Err(StoreError::NotFound(_))), "{id:?}");
        }
    }

    #[test]
    fn colliding_id_is_rehashed() {
        let store = ProjectStore::open(test_dir("collision")).unwrap();
        let new = NewProject::with_plot("P-1", Upload::new("s.png", vec![9; 4]));
        fs::create_dir(store.project_dir(&project_id(&new, 7, 0))).unwrap();

        let project = store.create_project_at(new.clone(), 7).unwrap();
        assert_eq!(project.id, project_id(&new, 7, 1));
    }
}
