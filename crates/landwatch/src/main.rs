//! landwatch: command-line front end for plot encroachment analysis.
//!
//! Manages a flat-file project store and runs the analysis pipeline on
//! stored projects, or one-shot on a pair of files.
//!
//! # Usage
//!
//! ```text
//! landwatch create --reference layout.png --satellite scene.jpg --name "Plot 14"
//! landwatch analyze <ID> [--registry plots.geojson]
//! landwatch analyze-all [IDS...] [--registry plots.geojson]
//! landwatch list
//! landwatch show <ID>
//! landwatch run --reference layout.png --satellite scene.jpg --out out/ --diagnostics
//! ```
//!
//! Log verbosity follows `RUST_LOG` (default `info`); logs go to stderr.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{Args, Parser, Subcommand};
use landwatch_pipeline::diagnostics::{Clock, analyze_with_diagnostics};
use landwatch_pipeline::{AnalysisConfig, AnalysisInput, AnalysisReport};
use landwatch_store::{
    BatchSummary, GeoJsonRegistry, InMemoryRegistry, NewProject, PlotRegistry, Project,
    ProjectStatus, ProjectStore, Upload,
};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

/// Compare approved industrial plot boundaries against satellite imagery.
#[derive(Parser)]
#[command(name = "landwatch", version)]
struct Cli {
    /// Project store directory.
    #[arg(long, global = true, default_value = "landwatch-data")]
    root: PathBuf,

    /// Analysis config as a JSON file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Analysis config as a JSON string. Takes precedence over `--config`.
    ///
    /// Fields left out keep their defaults.
    #[arg(long, global = true)]
    config_json: Option<String>,

    /// Print JSON instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Store a new project.
    Create {
        /// Satellite image of the plot area.
        #[arg(long)]
        satellite: PathBuf,

        /// Layout map with the approved plot boundary.
        #[arg(long, required_unless_present = "plot_id")]
        reference: Option<PathBuf>,

        /// Registry plot id for the approved boundary.
        #[arg(long)]
        plot_id: Option<String>,

        /// Display name.
        #[arg(long)]
        name: Option<String>,
    },

    /// Analyze a stored project, replacing its previous result.
    Analyze {
        id: String,

        #[command(flatten)]
        registry: RegistryArgs,
    },

    /// Analyze several stored projects in parallel (all when none given).
    AnalyzeAll {
        ids: Vec<String>,

        #[command(flatten)]
        registry: RegistryArgs,
    },

    /// List stored projects, newest first.
    List,

    /// Show one stored project and its latest result.
    Show { id: String },

    /// Analyze a pair of files without touching the store.
    Run {
        /// Satellite image of the plot area.
        #[arg(long)]
        satellite: PathBuf,

        /// Layout map with the approved plot boundary.
        #[arg(long, required_unless_present = "plot_id", conflicts_with = "plot_id")]
        reference: Option<PathBuf>,

        /// Registry plot id for the approved boundary.
        #[arg(long, requires = "registry")]
        plot_id: Option<String>,

        #[command(flatten)]
        registry: RegistryArgs,

        /// Directory for overlay, mask and comparison images.
        #[arg(long)]
        out: Option<PathBuf>,

        /// Print per-stage timings to stderr.
        #[arg(long)]
        diagnostics: bool,
    },
}

#[derive(Args)]
struct RegistryArgs {
    /// GeoJSON feature collection of registry plots.
    #[arg(long)]
    registry: Option<PathBuf>,
}

impl RegistryArgs {
    fn load(&self) -> CliResult<Box<dyn PlotRegistry + Sync>> {
        Ok(match &self.registry {
            Some(path) => Box::new(GeoJsonRegistry::from_path(path)?),
            None => Box::new(InMemoryRegistry::new()),
        })
    }
}

/// Build the [`AnalysisConfig`] from `--config-json`, `--config` or the
/// defaults, in that order, and validate it.
fn config_from_cli(cli: &Cli) -> Result<AnalysisConfig, String> {
    let config: AnalysisConfig = if let Some(ref json) = cli.config_json {
        serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"))?
    } else if let Some(ref path) = cli.config {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("Error reading {}: {e}", path.display()))?;
        serde_json::from_str(&text).map_err(|e| format!("Error parsing {}: {e}", path.display()))?
    } else {
        AnalysisConfig::default()
    };
    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match execute(&cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn execute(cli: &Cli) -> CliResult<ExitCode> {
    let config = config_from_cli(cli)?;

    match &cli.command {
        Command::Create {
            satellite,
            reference,
            plot_id,
            name,
        } => {
            let store = ProjectStore::open(&cli.root)?;
            let new = NewProject {
                name: name.clone(),
                reference: reference.as_deref().map(Upload::from_path).transpose()?,
                satellite: Upload::from_path(satellite)?,
                plot_id: plot_id.clone(),
            };
            let project = store.create_project(new)?;
            print_project(&project, cli.json)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Analyze { id, registry } => {
            let store = ProjectStore::open(&cli.root)?;
            let registry = registry.load()?;
            let project = store.analyze(id, &*registry, &config)?;
            print_project(&project, cli.json)?;
            Ok(status_code(&project))
        }
        Command::AnalyzeAll { ids, registry } => {
            let store = ProjectStore::open(&cli.root)?;
            let ids = if ids.is_empty() {
                store.list()?.into_iter().map(|p| p.id).collect()
            } else {
                ids.clone()
            };
            let registry = registry.load()?;
            let entries = store.analyze_all(&ids, &*registry, &config);
            let summary = BatchSummary::of(&entries);

            let mut projects = Vec::with_capacity(entries.len());
            for entry in entries {
                match entry.outcome {
                    Ok(project) => projects.push(project),
                    Err(e) => eprintln!("{}: {e}", entry.id),
                }
            }
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&projects)?);
            } else {
                for project in &projects {
                    println!("{}", project_line(project));
                }
                println!(
                    "\n{} analyzed, {} failed, {} not processed",
                    summary.analyzed, summary.failed, summary.errors,
                );
            }
            Ok(if summary.failed + summary.errors == 0 {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::List => {
            let projects = ProjectStore::open(&cli.root)?.list()?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&projects)?);
            } else if projects.is_empty() {
                println!("No projects in {}", cli.root.display());
            } else {
                println!("{:<8}  {:<10}  {:<24}  Result", "Id", "Status", "Name");
                println!("{}", "-".repeat(72));
                for project in &projects {
                    println!("{}", project_line(project));
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Show { id } => {
            let project = ProjectStore::open(&cli.root)?.load(id)?;
            print_project(&project, cli.json)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Run {
            satellite,
            reference,
            plot_id,
            registry,
            out,
            diagnostics,
        } => {
            let satellite = read(satellite)?;
            let input = match (reference, plot_id) {
                (Some(reference), _) => AnalysisInput::with_reference(read(reference)?, satellite),
                (None, Some(plot_id)) => {
                    let polygon = registry
                        .load()?
                        .lookup(plot_id)?
                        .ok_or_else(|| format!("plot {plot_id} not found in registry"))?;
                    AnalysisInput::with_registry(plot_id.clone(), polygon, satellite)
                }
                (None, None) => return Err("either --reference or --plot-id is required".into()),
            };

            let (outcome, diag) = analyze_with_diagnostics(input, config, &StdClock)?;
            if *diagnostics {
                eprintln!("{}", diag.report());
            }
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&outcome.report)?);
            } else {
                println!("{}", report_text(&outcome.report));
            }

            if let Some(dir) = out {
                std::fs::create_dir_all(dir)?;
                outcome.overlay.save(dir.join("overlay.png"))?;
                outcome.encroachment_mask.into_gray().save(dir.join("mask.png"))?;
                if let Some(comparison) = outcome.comparison {
                    comparison.save(dir.join("comparison.png"))?;
                }
                tracing::info!(dir = %dir.display(), "images written");
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn read(path: &Path) -> CliResult<Vec<u8>> {
    std::fs::read(path).map_err(|e| format!("Error reading {}: {e}", path.display()).into())
}

fn status_code(project: &Project) -> ExitCode {
    if project.status == ProjectStatus::Failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

const fn status_label(status: ProjectStatus) -> &'static str {
    match status {
        ProjectStatus::Uploaded => "uploaded",
        ProjectStatus::Analyzed => "analyzed",
        ProjectStatus::Failed => "failed",
    }
}

/// One table row: id, status, name and a short result.
fn project_line(project: &Project) -> String {
    let headline = match (&project.result, &project.error) {
        (Some(report), _) => format!(
            "{} ({:.2}% encroached, risk {})",
            report.assessment.classification,
            report.metrics.encroachment_pct,
            report.assessment.risk.level,
        ),
        (None, Some(error)) => error.clone(),
        (None, None) => String::new(),
    };
    format!(
        "{:<8}  {:<10}  {:<24}  {headline}",
        project.id,
        status_label(project.status),
        project.name,
    )
}

fn print_project(project: &Project, json: bool) -> CliResult<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(project)?);
        return Ok(());
    }
    println!("Project {} ({})", project.id, project.name);
    println!("Status: {}", status_label(project.status));
    match (&project.reference_file, &project.plot_id) {
        (_, Some(plot_id)) => println!("Approved boundary: registry plot {plot_id}"),
        (Some(file), None) => println!("Approved boundary: {file}"),
        (None, None) => {}
    }
    if let Some(error) = &project.error {
        println!("Error: {error}");
    }
    if let Some(report) = &project.result {
        println!();
        println!("{}", report_text(report));
    }
    Ok(())
}

/// Human-readable summary of a report.
fn report_text(report: &AnalysisReport) -> String {
    let m = &report.metrics;
    let a = &report.assessment;
    let f = &report.financial;
    let mut lines = vec![
        format!(
            "Frame: {}x{}  |  Boundary: {}  |  ROI: {}x{} at ({}, {})",
            report.frame.width,
            report.frame.height,
            report.boundary_source.kind(),
            report.roi.width,
            report.roi.height,
            report.roi.x,
            report.roi.y,
        ),
        format!(
            "Approved: {} px  |  Built-up: {} px ({} inside)  |  Encroached: {} px",
            m.approved_area_px, m.builtup_area_px, m.builtup_inside_px, m.encroached_area_px,
        ),
        format!(
            "Encroachment: {:.2}%  |  Utilization: {:.2}%",
            m.encroachment_pct, m.utilization_pct,
        ),
        format!(
            "Classification: {}  |  Risk: {} (score {})  |  Health: {:.1}",
            a.classification, a.risk.level, a.risk.score, a.health_index,
        ),
    ];
    if !a.actions.is_empty() {
        let actions: Vec<String> = a.actions.iter().map(ToString::to_string).collect();
        lines.push(format!("Actions: {}", actions.join(", ")));
    }
    lines.push(format!(
        "Penalty: {:.2} {cur}  |  Revenue leakage: {:.2} {cur} of {:.2} {cur} ({:.1}%)",
        f.penalty,
        f.revenue_leakage,
        f.potential_annual_revenue,
        f.inefficiency_pct,
        cur = f.currency,
    ));
    if let Some(vector) = &report.vector_cross_check {
        lines.push(format!("Vector cross-check: {:.2}% encroached", vector.encroachment_pct));
    }
    if let Some(location) = &report.location {
        lines.push(format!("Location: {:.6}, {:.6}", location.lat, location.lon));
    }
    if let Some(name) = &report.layout.name {
        lines.push(format!("Layout: {name}"));
    }
    lines.join("\n")
}

/// [`Clock`] implementation backed by [`std::time::Instant`].
struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, since: &Instant) -> Duration {
        since.elapsed()
    }
}
