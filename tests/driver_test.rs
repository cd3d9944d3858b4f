use ndarray::{Array1, Array2};
use serde_json::json;
use tpn_train::config::SolverParameter;
use tpn_train::dataset::{Dataset, VideoRecord};
use tpn_train::stats::BBoxNormalizationStats;
use tpn_train::target::IouTargetAssigner;
use tpn_train::tracker::{BBoxPredLayer, GeometryFeatureNet, PropagationConfig, RoiPropagator};
use tpn_train::training::{DriverOptions, DryRunSolver, RecurrentSolver, TrainingDriver};
use tpn_train::Error;

fn record(name: &str, num_frames: i32) -> (String, VideoRecord) {
    let frames: Vec<_> = (0..num_frames)
        .map(|frame| json!({"frame": frame, "path": format!("{frame:06}.JPEG")}))
        .collect();
    let boxes: Vec<_> = (0..num_frames)
        .flat_map(|frame| {
            [
                json!({"frame": frame, "bbox": [10, 10, 59, 59], "positive": true}),
                json!({"frame": frame, "bbox": [200, 150, 259, 209]}),
            ]
        })
        .collect();
    let track: Vec<_> = (0..num_frames)
        .map(|frame| json!({"frame": frame, "bbox": [12, 10, 61, 59], "class_index": 1}))
        .collect();

    let record = VideoRecord {
        vid: serde_json::from_value(json!({
            "video": {"name": name, "width": 320, "height": 240},
            "frames": frames,
        }))
        .unwrap(),
        boxes: serde_json::from_value(json!({"video": name, "boxes": boxes})).unwrap(),
        annot: serde_json::from_value(json!({
            "video": name,
            "annotations": [{"id": "0", "track": track}],
        }))
        .unwrap(),
    };
    (name.to_owned(), record)
}

fn dataset() -> Dataset {
    Dataset::from_records([record("a", 6), record("b", 2), record("c", 4)])
}

fn net() -> GeometryFeatureNet {
    GeometryFeatureNet::new(BBoxPredLayer {
        weight: Array2::zeros((8, GeometryFeatureNet::FEATURE_DIM)),
        bias: Array1::zeros(8),
    })
    .unwrap()
}

fn param(max_iter: usize) -> SolverParameter {
    serde_yaml::from_str(&format!("max_iter: {max_iter}\ndevice_id: [0, 1]\n")).unwrap()
}

fn driver(
    solver: DryRunSolver,
    max_iter: usize,
    rank: usize,
) -> TrainingDriver<GeometryFeatureNet, DryRunSolver, IouTargetAssigner> {
    let propagator = RoiPropagator::new(PropagationConfig {
        num_tracks: 4,
        track_length: 3,
        fg_ratio: 0.5,
        batch_size: 3,
    });
    let options = DriverOptions {
        max_iter,
        rank,
        seed: 5,
        ..DriverOptions::default()
    };
    TrainingDriver::new(
        dataset(),
        propagator,
        IouTargetAssigner::default(),
        BBoxNormalizationStats::identity(2).unwrap(),
        net(),
        solver,
        options,
    )
    .unwrap()
}

#[test]
fn test_driver_runs_max_iter_steps() {
    let mut driver = driver(DryRunSolver::new(param(7)).with_num_classes(2), 7, 0);
    let summaries = driver.run().unwrap();

    assert_eq!(summaries.len(), 7);
    assert_eq!(driver.solver().iter(), 7);
    assert_eq!(
        summaries.iter().map(|s| s.iter).collect::<Vec<_>>(),
        (1..=7).collect::<Vec<_>>()
    );

    // round robin over a, b, c starting at rank 0
    let videos: Vec<_> = summaries.iter().map(|s| s.video.as_str()).collect();
    assert_eq!(videos, ["a", "b", "c", "a", "b", "c", "a"]);
    assert_eq!(driver.cursor().epoch(), 2);

    // "b" has two frames, so its window always ends in a sentinel
    for summary in &summaries {
        if summary.video == "b" {
            assert!((1..3).contains(&summary.observed_frames));
        } else {
            assert_eq!(summary.observed_frames, 3);
        }
    }

    let inputs = driver.solver().inputs().unwrap();
    assert_eq!(inputs.labels.dim(), (3, 4));
    assert_eq!(inputs.bbox_targets.dim(), (3, 4, 8));
}

#[test]
fn test_driver_resumes_from_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = dir.path().join("tpn_iter_4.solverstate.json");
    std::fs::write(&snapshot, r#"{"iter": 4}"#).unwrap();

    let mut solver = DryRunSolver::new(param(6));
    solver.restore(&snapshot).unwrap();

    let mut driver = driver(solver, 6, 1);
    let summaries = driver.run().unwrap();
    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[0].video, "b");
    assert_eq!(driver.into_solver().iter(), 6);
}

#[test]
fn test_driver_past_max_iter_does_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = dir.path().join("done.solverstate.json");
    std::fs::write(&snapshot, r#"{"iter": 10}"#).unwrap();

    let mut solver = DryRunSolver::new(param(5));
    solver.restore(&snapshot).unwrap();

    let mut driver = driver(solver, 5, 0);
    assert!(driver.run().unwrap().is_empty());
    assert_eq!(driver.solver().iter(), 10);
}

#[test]
fn test_driver_rejects_empty_dataset() {
    let result = TrainingDriver::new(
        Dataset::from_records(Vec::<(String, VideoRecord)>::new()),
        RoiPropagator::new(PropagationConfig::default()),
        IouTargetAssigner::default(),
        BBoxNormalizationStats::identity(2).unwrap(),
        net(),
        DryRunSolver::new(param(1)),
        DriverOptions::default(),
    );
    assert!(matches!(result, Err(Error::EmptyDataset)));
}

#[test]
fn test_driver_rejects_mismatched_stats() {
    let result = TrainingDriver::new(
        dataset(),
        RoiPropagator::new(PropagationConfig::default()),
        IouTargetAssigner::default(),
        BBoxNormalizationStats::identity(3).unwrap(),
        net(),
        DryRunSolver::new(param(1)),
        DriverOptions::default(),
    );
    assert!(result.is_err());
}

#[test]
fn test_driver_steps_with_box_logging() {
    let propagator = RoiPropagator::new(PropagationConfig {
        num_tracks: 2,
        track_length: 3,
        fg_ratio: 0.5,
        batch_size: 2,
    });
    let options = DriverOptions {
        max_iter: 2,
        vis_debug: true,
        seed: 1,
        ..DriverOptions::default()
    };
    let mut driver = TrainingDriver::new(
        dataset(),
        propagator,
        IouTargetAssigner::default(),
        BBoxNormalizationStats::identity(2).unwrap(),
        net(),
        DryRunSolver::new(param(2)).with_num_classes(2),
        options,
    )
    .unwrap();

    let summaries = driver.run().unwrap();
    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[1].video, "b");
    assert_eq!(driver.solver().inputs().unwrap().labels.dim(), (3, 2));
}
