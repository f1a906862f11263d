use image::DynamicImage;
use photo_align::config::Config;
use photo_align::data::load_font;
use photo_align::data::synthetic::{patch_scene, uniform_image, SCENE_HEIGHT, SCENE_WIDTH};
use photo_align::pipeline::{list_input_files, EntryOutcome, ALIGNED_DIR, DATED_DIR, REPORT_FILE};
use photo_align::{BatchReport, BatchRunner};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tempfile::TempDir;
use uuid::Uuid;

/// Reference outside the input folder; the input folder holds one alignable
/// target, one featureless image, one undecodable file and a non-image.
fn setup_batch(root: &Path) -> Config {
    let scene = patch_scene(11);
    let input = root.join("input");
    fs::create_dir_all(&input).unwrap();

    DynamicImage::ImageLuma8(scene.reference).save(root.join("base.png")).unwrap();
    DynamicImage::ImageLuma8(scene.target).save(input.join("target.png")).unwrap();
    DynamicImage::ImageLuma8(uniform_image(SCENE_WIDTH, SCENE_HEIGHT, 60))
        .save(input.join("uniform.png"))
        .unwrap();
    fs::write(input.join("broken.jpg"), b"definitely not a jpeg").unwrap();
    fs::write(input.join("notes.txt"), b"ignored").unwrap();

    let mut config = Config::default();
    config.batch.reference_image = Some(root.join("base.png"));
    config.batch.input_folder = Some(input);
    config.batch.output_folder = Some(root.join("output"));
    config.caption.enabled = false;
    config
}

#[test]
fn test_batch_run() {
    let temp_dir = TempDir::new().unwrap();
    let config = setup_batch(temp_dir.path());
    let aligned_dir = temp_dir.path().join("output").join(ALIGNED_DIR);

    let report = BatchRunner::new(config).run().unwrap();

    assert_eq!(report.total(), 3);
    assert_eq!(report.aligned, 1);
    assert_eq!(report.failed, 2);

    let names: Vec<&str> = report.entries.iter().map(|e| e.file_name.as_str()).collect();
    assert_eq!(names, vec!["broken.jpg", "target.png", "uniform.png"]);

    match &report.entries[0].outcome {
        EntryOutcome::Failed { kind, .. } => assert_eq!(kind, "decode_failure"),
        other => panic!("broken.jpg should fail to decode: {:?}", other),
    }
    match &report.entries[1].outcome {
        EntryOutcome::Aligned {
            aligned_path,
            dated_path,
            stats,
            ..
        } => {
            assert_eq!(aligned_path, &aligned_dir.join("target.png"));
            assert!(dated_path.is_none());
            assert!(stats.inliers > 10);
        }
        other => panic!("target.png should align: {:?}", other),
    }
    match &report.entries[2].outcome {
        EntryOutcome::Failed { kind, .. } => assert_eq!(kind, "insufficient_features"),
        other => panic!("uniform.png has no features: {:?}", other),
    }

    let aligned = image::open(aligned_dir.join("target.png")).unwrap();
    assert_eq!((aligned.width(), aligned.height()), (SCENE_WIDTH, SCENE_HEIGHT));
    assert!(!aligned_dir.join("uniform.png").exists());
    assert!(!aligned_dir.join(DATED_DIR).exists());

    // One log correlation id per input file.
    let ids: HashSet<Uuid> = report.entries.iter().map(|e| e.correlation_id).collect();
    assert_eq!(ids.len(), report.total());
    assert!(!ids.contains(&Uuid::nil()));

    let saved: BatchReport = serde_json::from_str(&fs::read_to_string(aligned_dir.join(REPORT_FILE)).unwrap()).unwrap();
    assert_eq!(saved, report);
}

#[test]
fn test_unusable_font_falls_back_to_system_fonts() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = setup_batch(temp_dir.path());
    config.caption.enabled = true;
    config.caption.font_path = Some(temp_dir.path().join("missing.ttf"));

    let report = BatchRunner::new(config).run().unwrap();

    assert_eq!(report.aligned, 1);
    let dated = temp_dir
        .path()
        .join("output")
        .join(ALIGNED_DIR)
        .join(DATED_DIR)
        .join("target.png");
    let has_system_font = load_font(None).is_some();
    assert_eq!(dated.exists(), has_system_font);

    match &report.entries[1].outcome {
        EntryOutcome::Aligned { dated_path, .. } => {
            assert_eq!(dated_path.is_some(), has_system_font);
        }
        other => panic!("target.png should align: {:?}", other),
    }
    if has_system_font {
        let captioned = image::open(&dated).unwrap();
        assert_eq!((captioned.width(), captioned.height()), (SCENE_WIDTH, SCENE_HEIGHT));
    }
}

#[test]
fn test_missing_reference_is_fatal() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = setup_batch(temp_dir.path());
    config.batch.reference_image = Some(temp_dir.path().join("nope.jpg"));

    let err = BatchRunner::new(config).run().unwrap_err();
    assert!(format!("{:#}", err).contains("Error loading base image"));
}

#[test]
fn test_missing_input_folder_is_fatal() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = setup_batch(temp_dir.path());
    config.batch.input_folder = Some(temp_dir.path().join("absent"));

    assert!(BatchRunner::new(config).run().is_err());
}

#[test]
fn test_input_listing() {
    let temp_dir = TempDir::new().unwrap();
    for name in ["b.JPG", "a.png", "c.jpeg", "d.gif", "e.txt"] {
        fs::write(temp_dir.path().join(name), b"x").unwrap();
    }
    fs::create_dir(temp_dir.path().join("f.jpg")).unwrap();

    let files = list_input_files(temp_dir.path(), &Config::default().batch.extensions).unwrap();
    let names: Vec<String> = files
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["a.png", "b.JPG", "c.jpeg"]);
}
