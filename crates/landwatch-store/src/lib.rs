//! landwatch-store: everything `landwatch-pipeline` leaves out.
//!
//! - [`ProjectStore`]: flat-file projects (uploads, record, cached
//!   result) with atomic per-file writes and a per-project lock.
//! - [`PlotRegistry`]: approved plot polygons by id, from GeoJSON or
//!   memory.
//! - [`ProjectStore::analyze_all`]: concurrent batch analysis.

mod atomic;
mod batch;
mod error;
mod project;
mod registry;
mod store;

pub use atomic::LOCK_FILE;
pub use batch::{BatchEntry, BatchSummary};
pub use error::StoreError;
pub use project::{NewProject, Project, ProjectStatus, Upload};
pub use registry::{GeoJsonRegistry, InMemoryRegistry, PlotRegistry};
pub use store::{ProjectStore, now_ms};
