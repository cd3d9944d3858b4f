use std::fs;
use std::path::Path;

use rand::{SeedableRng, rngs::StdRng};
use tempfile::TempDir;
use tpn_train::Error;
use tpn_train::config::TrainConfig;
use tpn_train::dataset::Dataset;

fn write_video(root: &Path, name: &str, with_annot: bool) {
    fs::write(
        root.join("vid").join(format!("{name}.vid")),
        format!(r#"{{"video": {{"name": "{name}"}}, "frames": [{{"frame": 0, "path": "0.JPEG"}}]}}"#),
    )
    .unwrap();
    fs::write(
        root.join("box").join(format!("{name}.box")),
        format!(r#"{{"video": "{name}", "boxes": [{{"frame": 0, "bbox": [0, 0, 9, 9]}}]}}"#),
    )
    .unwrap();
    if with_annot {
        fs::write(
            root.join("annot").join(format!("{name}.annot")),
            format!(r#"{{"video": "{name}", "annotations": []}}"#),
        )
        .unwrap();
    }
}

fn setup(blacklist: Option<&str>) -> (TempDir, TrainConfig) {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    for sub in ["vid", "box", "annot"] {
        fs::create_dir(root.join(sub)).unwrap();
    }
    write_video(root, "ILSVRC2015_train_00000000", true);
    write_video(root, "ILSVRC2015_train_00000001", true);
    write_video(root, "ILSVRC2015_train_00000002", false);
    write_video(root, "ILSVRC2015_train_00000003", true);

    fs::write(
        root.join("list.txt"),
        "train/ILSVRC2015_train_00000000\n\
         train/ILSVRC2015_train_00000001\n\
         train/ILSVRC2015_train_00000002\n\
         \n\
         ILSVRC2015_train_00000003\n\
         train/ILSVRC2015_train_00000009\n",
    )
    .unwrap();
    if let Some(blacklist) = blacklist {
        fs::write(root.join("blacklist.txt"), blacklist).unwrap();
    }

    let yaml = format!(
        "vid_list: {root}/list.txt\n\
         vid_dir: {root}/vid\n\
         box_dir: {root}/box\n\
         annot_dir: {root}/annot\n\
         blacklist: {blacklist}\n\
         track_length: 20\n\
         track_per_vid: 32\n\
         fg_ratio: 0.5\n",
        root = root.display(),
        blacklist = if blacklist.is_some() {
            format!("{}/blacklist.txt", root.display())
        } else {
            "null".to_owned()
        },
    );
    fs::write(root.join("train.yaml"), yaml).unwrap();
    let config = TrainConfig::open(root.join("train.yaml")).unwrap();
    (dir, config)
}

fn sorted_names(dataset: &Dataset) -> Vec<String> {
    let mut names = dataset.names().to_vec();
    names.sort();
    names
}

#[test]
fn test_load_skips_incomplete_videos() {
    let (_dir, config) = setup(None);
    let mut rng = StdRng::seed_from_u64(0);
    let dataset = Dataset::load(&config, false, &mut rng).unwrap();

    assert_eq!(
        sorted_names(&dataset),
        [
            "ILSVRC2015_train_00000000",
            "ILSVRC2015_train_00000001",
            "ILSVRC2015_train_00000003"
        ]
    );
    let record = dataset.get("ILSVRC2015_train_00000001").unwrap();
    assert_eq!(record.vid.name(), "ILSVRC2015_train_00000001");
    assert_eq!(record.boxes.boxes.len(), 1);
    assert!(dataset.get("ILSVRC2015_train_00000002").is_none());
}

#[test]
fn test_load_honors_blacklist() {
    let (_dir, config) = setup(Some("ILSVRC2015_train_00000000\n"));
    let mut rng = StdRng::seed_from_u64(0);
    let dataset = Dataset::load(&config, false, &mut rng).unwrap();

    assert_eq!(
        sorted_names(&dataset),
        ["ILSVRC2015_train_00000001", "ILSVRC2015_train_00000003"]
    );
}

#[test]
fn test_load_order_follows_seed() {
    let (_dir, config) = setup(None);
    let first = Dataset::load(&config, false, &mut StdRng::seed_from_u64(3)).unwrap();
    let second = Dataset::load(&config, true, &mut StdRng::seed_from_u64(3)).unwrap();
    assert_eq!(first.names(), second.names());
}

#[test]
fn test_missing_folder_is_fatal() {
    let (dir, config) = setup(None);
    fs::remove_dir_all(dir.path().join("box")).unwrap();

    let mut rng = StdRng::seed_from_u64(0);
    match Dataset::load(&config, false, &mut rng) {
        Err(Error::MissingFolder { key, .. }) => assert_eq!(key, "box_dir"),
        other => panic!("expected a missing folder error, got {other:?}"),
    }
}

#[test]
fn test_everything_filtered_is_empty() {
    let (_dir, config) = setup(Some(
        "ILSVRC2015_train_00000000\nILSVRC2015_train_00000001\nILSVRC2015_train_00000003\n",
    ));
    let mut rng = StdRng::seed_from_u64(0);
    assert!(matches!(
        Dataset::load(&config, false, &mut rng),
        Err(Error::EmptyDataset)
    ));
}
