//! Project store behaviour on a temporary directory.

#![allow(clippy::unwrap_used)]

use std::fs;

use image::{Rgb, RgbImage};
use landwatch_pipeline::{AnalysisConfig, AnalysisReport, BoundarySource, PlotPolygon};
use landwatch_store::{
    BatchSummary, InMemoryRegistry, LOCK_FILE, NewProject, ProjectStatus, ProjectStore, StoreError,
    Upload,
};

fn png(image: &RgbImage) -> Vec<u8> {
    let mut buf = std::io::Cursor::new(Vec::new());
    image.write_to(&mut buf, image::ImageFormat::Png).unwrap();
    buf.into_inner()
}

/// 100x100 layout map with a red plot outline at (20, 20)..(80, 80).
fn layout() -> Upload {
    let map = RgbImage::from_fn(100, 100, |x, y| {
        let on_plot = (20..80).contains(&x) && (20..80).contains(&y);
        let inner = (22..78).contains(&x) && (22..78).contains(&y);
        if on_plot && !inner {
            Rgb([220, 20, 30])
        } else {
            Rgb([255, 255, 255])
        }
    });
    Upload::new("layout.png", png(&map))
}

/// 100x100 scene of bare ground with one rooftop inside the plot.
fn satellite() -> Upload {
    let scene = RgbImage::from_fn(100, 100, |x, y| {
        if (40..60).contains(&x) && (40..60).contains(&y) {
            Rgb([230, 230, 225])
        } else {
            Rgb([70, 90, 60])
        }
    });
    Upload::new("scene.PNG", png(&scene))
}

fn registry() -> InMemoryRegistry {
    let mut registry = InMemoryRegistry::new();
    registry.insert(
        "CSIDC-7",
        PlotPolygon::from_points(&[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)]),
    );
    registry
}

/// A store in a fresh directory under the system temp dir.
fn store(name: &str) -> ProjectStore {
    let dir = std::env::temp_dir().join(format!("landwatch_projects_{name}_{}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    ProjectStore::open(dir).unwrap()
}

#[test]
fn create_stores_uploads_and_record() {
    let store = store("create_stores_uploads_and_record");
    let project = store
        .create_project(NewProject::with_reference(layout(), satellite()))
        .unwrap();

    assert_eq!(project.id.len(), 8);
    assert_eq!(project.name, format!("Project-{}", project.id));
    assert_eq!(project.status, ProjectStatus::Uploaded);
    assert_eq!(project.reference_file.as_deref(), Some("reference.png"));
    assert_eq!(project.satellite_file, "satellite.png");

    let dir = store.project_dir(&project.id);
    assert_eq!(fs::read(dir.join("reference.png")).unwrap(), layout().bytes);
    assert_eq!(fs::read(dir.join("satellite.png")).unwrap(), satellite().bytes);
    assert_eq!(store.load(&project.id).unwrap(), project);
}

#[test]
fn create_requires_satellite_and_approved_source() {
    let store = store("create_requires_satellite_and_approved_source");

    let no_satellite = NewProject::with_reference(layout(), Upload::new("s.png", Vec::new()));
    assert!(matches!(
        store.create_project(no_satellite),
        Err(StoreError::MissingInput("satellite image"))
    ));

    let no_source = NewProject {
        name: Some("orphan".into()),
        reference: None,
        satellite: satellite(),
        plot_id: Some("   ".into()),
    };
    assert!(matches!(
        store.create_project(no_source),
        Err(StoreError::MissingInput("reference map or plot id"))
    ));
    assert!(store.list().unwrap().is_empty());
}

#[test]
fn list_is_newest_first() {
    let store = store("list_is_newest_first");
    let new = |name: &str| NewProject::with_plot("CSIDC-7", satellite()).named(name);
    store.create_project_at(new("old"), 1_000).unwrap();
    store.create_project_at(new("newest"), 3_000).unwrap();
    store.create_project_at(new("middle"), 2_000).unwrap();

    let names: Vec<String> = store.list().unwrap().into_iter().map(|p| p.name).collect();
    assert_eq!(names, ["newest", "middle", "old"]);
}

#[test]
fn corrupt_record_is_skipped_by_list() {
    let store = store("corrupt_record_is_skipped_by_list");
    let good = store
        .create_project(NewProject::with_plot("CSIDC-7", satellite()))
        .unwrap();
    let bad = store
        .create_project(NewProject::with_plot("CSIDC-7", satellite()).named("bad"))
        .unwrap();
    fs::write(store.project_dir(&bad.id).join("project.json"), b"{ not json").unwrap();

    let listed = store.list().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, good.id);
    assert!(matches!(store.load(&bad.id), Err(StoreError::Json { .. })));
}

#[test]
fn analyze_reference_project_writes_outputs() {
    let store = store("analyze_reference_project_writes_outputs");
    let id = store
        .create_project(NewProject::with_reference(layout(), satellite()))
        .unwrap()
        .id;

    let project = store.analyze(&id, &registry(), &AnalysisConfig::default()).unwrap();

    assert_eq!(project.status, ProjectStatus::Analyzed);
    assert!(project.error.is_none());
    assert!(project.analyzed_at_ms.is_some());
    let report = project.result.as_ref().unwrap();
    assert!(matches!(report.boundary_source, BoundarySource::RedInk { .. }));
    assert_eq!(report.metrics.encroached_area_px, 0);

    let results = store.result_dir(&id);
    let cached: AnalysisReport =
        serde_json::from_slice(&fs::read(results.join("result.json")).unwrap()).unwrap();
    assert_eq!(&cached, report);
    for file in ["overlay.png", "mask.png", "comparison.png"] {
        assert!(image::open(results.join(file)).is_ok(), "{file}");
    }
    assert_eq!(store.load(&id).unwrap(), project);
    assert!(!store.project_dir(&id).join(LOCK_FILE).exists());
}

#[test]
fn analyze_registry_project() {
    let store = store("analyze_registry_project");
    let id = store
        .create_project(NewProject::with_plot("CSIDC-7", satellite()))
        .unwrap()
        .id;

    let project = store.analyze(&id, &registry(), &AnalysisConfig::default()).unwrap();

    assert_eq!(project.status, ProjectStatus::Analyzed);
    assert_eq!(
        project.result.unwrap().boundary_source,
        BoundarySource::Registry {
            plot_id: "CSIDC-7".into()
        }
    );
    let results = store.result_dir(&id);
    assert!(results.join("overlay.png").exists());
    assert!(!results.join("comparison.png").exists());
}

#[test]
fn unknown_plot_is_recorded_as_failure() {
    let store = store("unknown_plot_is_recorded_as_failure");
    let id = store
        .create_project(NewProject::with_plot("CSIDC-404", satellite()))
        .unwrap()
        .id;

    let project = store.analyze(&id, &registry(), &AnalysisConfig::default()).unwrap();

    assert_eq!(project.status, ProjectStatus::Failed);
    assert!(project.result.is_none());
    assert_eq!(project.error.as_deref(), Some("plot CSIDC-404 not found in registry"));
}

#[test]
fn failed_rerun_replaces_previous_result() {
    let store = store("failed_rerun_replaces_previous_result");
    let project = store
        .create_project(NewProject::with_reference(layout(), satellite()))
        .unwrap();
    let id = project.id.clone();
    store.analyze(&id, &registry(), &AnalysisConfig::default()).unwrap();

    fs::write(
        store.project_dir(&id).join(&project.satellite_file),
        b"truncated upload",
    )
    .unwrap();
    let rerun = store.analyze(&id, &registry(), &AnalysisConfig::default()).unwrap();

    assert_eq!(rerun.status, ProjectStatus::Failed);
    assert!(rerun.result.is_none());
    assert!(rerun.error.as_deref().unwrap().contains("satellite"));
    let results = store.result_dir(&id);
    for file in ["result.json", "overlay.png", "mask.png", "comparison.png"] {
        assert!(!results.join(file).exists(), "{file} should be gone");
    }
}

/// `results/<id>.<suffix>`, next to the result directory.
fn beside_results(store: &ProjectStore, id: &str, suffix: &str) -> std::path::PathBuf {
    let mut path = store.result_dir(id).into_os_string();
    path.push(format!(".{suffix}"));
    path.into()
}

#[test]
fn rerun_replaces_snapshot_as_a_whole() {
    let store = store("rerun_replaces_snapshot_as_a_whole");
    let id = store
        .create_project(NewProject::with_plot("CSIDC-7", satellite()))
        .unwrap()
        .id;
    let staging = beside_results(&store, &id, "staging");
    fs::create_dir_all(&staging).unwrap();
    fs::write(staging.join("comparison.png"), b"left by a crashed run").unwrap();
    let results = store.result_dir(&id);
    fs::create_dir_all(&results).unwrap();
    fs::write(results.join("comparison.png"), b"from an older analysis").unwrap();

    let project = store.analyze(&id, &registry(), &AnalysisConfig::default()).unwrap();

    assert_eq!(project.status, ProjectStatus::Analyzed);
    assert!(results.join("overlay.png").exists());
    assert!(!results.join("comparison.png").exists());
    assert!(!staging.exists());
    assert!(!beside_results(&store, &id, "old").exists());
}

#[test]
fn failed_snapshot_write_keeps_previous_result() {
    let store = store("failed_snapshot_write_keeps_previous_result");
    let id = store
        .create_project(NewProject::with_reference(layout(), satellite()))
        .unwrap()
        .id;
    let first = store.analyze(&id, &registry(), &AnalysisConfig::default()).unwrap();
    let results = store.result_dir(&id);
    let overlay = fs::read(results.join("overlay.png")).unwrap();

    // A plain file where the staging directory goes cannot be cleared.
    fs::write(beside_results(&store, &id, "staging"), b"not a directory").unwrap();
    let err = store.analyze(&id, &registry(), &AnalysisConfig::default()).unwrap_err();

    assert!(matches!(err, StoreError::Io { .. }), "{err:?}");
    assert_eq!(store.load(&id).unwrap(), first);
    assert_eq!(fs::read(results.join("overlay.png")).unwrap(), overlay);
    assert!(results.join("comparison.png").exists());
    assert!(!store.project_dir(&id).join(LOCK_FILE).exists());
}

#[test]
fn invalid_config_is_recorded_as_failure() {
    let store = store("invalid_config_is_recorded_as_failure");
    let id = store
        .create_project(NewProject::with_plot("CSIDC-7", satellite()))
        .unwrap()
        .id;
    let mut config = AnalysisConfig::default();
    config.max_dimension = 0;

    let project = store.analyze(&id, &registry(), &config).unwrap();

    assert_eq!(project.status, ProjectStatus::Failed);
    assert!(project.error.unwrap().starts_with("invalid analysis configuration"));
}

#[test]
fn locked_project_is_refused() {
    let store = store("locked_project_is_refused");
    let id = store
        .create_project(NewProject::with_plot("CSIDC-7", satellite()))
        .unwrap()
        .id;
    let lock = store.project_dir(&id).join(LOCK_FILE);
    fs::write(&lock, b"").unwrap();

    let err = store.analyze(&id, &registry(), &AnalysisConfig::default()).unwrap_err();
    assert!(matches!(err, StoreError::Locked(ref locked) if *locked == id));
    assert_eq!(store.load(&id).unwrap().status, ProjectStatus::Uploaded);
    assert!(lock.exists());
}

#[test]
fn unknown_project_is_not_found() {
    let store = store("unknown_project_is_not_found");
    let err = store
        .analyze("deadbeef", &registry(), &AnalysisConfig::default())
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(ref id) if id == "deadbeef"));
}

#[test]
fn batch_keeps_projects_independent() {
    let store = store("batch_keeps_projects_independent");
    let reference = store
        .create_project(NewProject::with_reference(layout(), satellite()))
        .unwrap()
        .id;
    let registered = store
        .create_project(NewProject::with_plot("CSIDC-7", satellite()))
        .unwrap()
        .id;
    let missing_plot = store
        .create_project(NewProject::with_plot("CSIDC-404", satellite()))
        .unwrap()
        .id;
    let ids = vec![
        reference.clone(),
        "00000000".to_owned(),
        registered.clone(),
        missing_plot.clone(),
    ];

    let entries = store.analyze_all(&ids, &registry(), &AnalysisConfig::default());

    let order: Vec<&str> = entries.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(order, ids.iter().map(String::as_str).collect::<Vec<_>>());
    assert_eq!(
        BatchSummary::of(&entries),
        BatchSummary {
            analyzed: 2,
            failed: 1,
            errors: 1,
        }
    );
    assert_eq!(store.load(&reference).unwrap().status, ProjectStatus::Analyzed);
    assert_eq!(store.load(&registered).unwrap().status, ProjectStatus::Analyzed);
    assert_eq!(store.load(&missing_plot).unwrap().status, ProjectStatus::Failed);
}
