//! Concurrent analysis of many projects.

use landwatch_pipeline::AnalysisConfig;
use rayon::prelude::*;

use crate::error::StoreError;
use crate::project::{Project, ProjectStatus};
use crate::registry::PlotRegistry;
use crate::store::ProjectStore;

/// Outcome for one project of a batch.
#[derive(Debug)]
pub struct BatchEntry {
    pub id: String,
    pub outcome: Result<Project, StoreError>,
}

/// Counts over a finished batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// Analyses that produced a result.
    pub analyzed: usize,
    /// Analyses recorded as failed on the project.
    pub failed: usize,
    /// Projects the store could not process (locked, missing, I/O).
    pub errors: usize,
}

impl BatchSummary {
    #[must_use]
    pub fn of(entries: &[BatchEntry]) -> Self {
        entries.iter().fold(Self::default(), |mut s, entry| {
            match &entry.outcome {
                Ok(p) if p.status == ProjectStatus::Analyzed => s.analyzed += 1,
                Ok(_) => s.failed += 1,
                Err(_) => s.errors += 1,
            }
            s
        })
    }
}

impl ProjectStore {
    /// Analyze `ids` on the rayon pool. Entries come back in input
    /// order. Each project works on its own files under its own lock, so
    /// one failure never affects another.
    pub fn analyze_all<R>(&self, ids: &[String], registry: &R, config: &AnalysisConfig) -> Vec<BatchEntry>
    where
        R: PlotRegistry + Sync + ?Sized,
    {
        tracing::info!(projects = ids.len(), threads = rayon::current_num_threads(), "starting batch analysis");
        ids.par_iter()
            .map(|id| BatchEntry {
                id: id.clone(),
                outcome: self.analyze(id, registry, config),
            })
            .collect()
    }
}
