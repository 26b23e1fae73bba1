use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use cradle_cabal::{capture_world, has_world_changed, is_valid, CabalError, CradleInputs, WorldSnapshot};
use filetime::{set_file_mtime, FileTime};
use proptest::prelude::*;
use tempfile::TempDir;

fn touch(path: &Path, secs: i64) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    if !path.exists() {
        fs::write(path, "").unwrap();
    }
    set_file_mtime(path, FileTime::from_unix_time(secs, 0)).unwrap();
}

fn project() -> (TempDir, CradleInputs) {
    let dir = tempfile::tempdir().unwrap();
    let inputs = CradleInputs {
        descriptor: Some(dir.path().join("demo.cabal")),
        package_cache: dir.path().join("index/00-index.cache"),
        artifact: dir.path().join("dist/setup-config"),
    };
    (dir, inputs)
}

fn at(secs: u64) -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
}

fn synthetic_inputs(with_descriptor: bool) -> CradleInputs {
    CradleInputs {
        descriptor: with_descriptor.then(|| PathBuf::from("demo.cabal")),
        package_cache: PathBuf::from("00-index.cache"),
        artifact: PathBuf::from("dist/setup-config"),
    }
}

#[test]
fn artifact_newer_than_inputs_is_valid() {
    let (_dir, inputs) = project();
    touch(inputs.descriptor.as_deref().unwrap(), 1_000);
    touch(&inputs.package_cache, 1_000);
    touch(&inputs.artifact, 2_000);

    let world = capture_world(&inputs).unwrap();
    assert!(is_valid(&world));
    assert_eq!(world.artifact_modified(), Some(at(2_000)));
}

#[test]
fn equal_mtimes_are_valid() {
    let (_dir, inputs) = project();
    touch(inputs.descriptor.as_deref().unwrap(), 1_500);
    touch(&inputs.package_cache, 1_500);
    touch(&inputs.artifact, 1_500);

    assert!(capture_world(&inputs).unwrap().is_valid());
}

#[test]
fn editing_the_descriptor_invalidates() {
    let (_dir, inputs) = project();
    touch(inputs.descriptor.as_deref().unwrap(), 1_000);
    touch(&inputs.package_cache, 1_000);
    touch(&inputs.artifact, 2_000);
    assert!(capture_world(&inputs).unwrap().is_valid());

    touch(inputs.descriptor.as_deref().unwrap(), 2_001);
    assert!(!capture_world(&inputs).unwrap().is_valid());
}

#[test]
fn updating_the_package_cache_invalidates() {
    let (_dir, inputs) = project();
    touch(inputs.descriptor.as_deref().unwrap(), 1_000);
    touch(&inputs.package_cache, 3_000);
    touch(&inputs.artifact, 2_000);

    assert!(!capture_world(&inputs).unwrap().is_valid());
}

#[test]
fn missing_artifact_is_absent_and_invalid() {
    let (_dir, inputs) = project();
    touch(inputs.descriptor.as_deref().unwrap(), 1_000);
    touch(&inputs.package_cache, 1_000);

    let world = capture_world(&inputs).unwrap();
    assert_eq!(world.artifact_modified(), None);
    assert!(!world.is_valid());
}

#[test]
fn missing_descriptor_is_not_an_error() {
    let (_dir, inputs) = project();
    touch(&inputs.package_cache, 1_000);
    touch(&inputs.artifact, 2_000);

    let world = capture_world(&inputs).unwrap();
    assert_eq!(world.descriptor_path(), inputs.descriptor.as_deref());
    assert_eq!(world.descriptor_modified(), None);
    assert!(world.is_valid());
}

#[test]
fn missing_package_cache_is_an_error() {
    let (_dir, inputs) = project();
    touch(inputs.descriptor.as_deref().unwrap(), 1_000);
    touch(&inputs.artifact, 2_000);

    let err = capture_world(&inputs).unwrap_err();
    match err {
        CabalError::MissingInput { path, .. } => assert_eq!(path, inputs.package_cache),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn world_change_is_detected() {
    let (_dir, inputs) = project();
    touch(inputs.descriptor.as_deref().unwrap(), 1_000);
    touch(&inputs.package_cache, 1_000);
    touch(&inputs.artifact, 2_000);

    let before = capture_world(&inputs).unwrap();
    assert!(!has_world_changed(&before, &inputs).unwrap());

    touch(&inputs.artifact, 2_500);
    assert!(has_world_changed(&before, &inputs).unwrap());

    let refreshed = capture_world(&inputs).unwrap();
    fs::remove_file(inputs.descriptor.as_deref().unwrap()).unwrap();
    assert!(has_world_changed(&refreshed, &inputs).unwrap());
}

#[test]
fn snapshot_round_trips_through_json_and_still_compares_equal() {
    let (_dir, inputs) = project();
    touch(inputs.descriptor.as_deref().unwrap(), 1_000);
    touch(&inputs.package_cache, 1_000);
    touch(&inputs.artifact, 2_000);

    let before = capture_world(&inputs).unwrap();
    let stored = serde_json::to_string(&before).unwrap();
    let restored: WorldSnapshot = serde_json::from_str(&stored).unwrap();
    assert_eq!(restored.inputs(), inputs);
    assert!(!has_world_changed(&restored, &inputs).unwrap());
}

proptest! {
    #[test]
    fn validity_matches_newest_input(
        descriptor in proptest::option::of(0u64..10_000),
        cache in 0u64..10_000,
        artifact in proptest::option::of(0u64..10_000),
    ) {
        let world = WorldSnapshot::from_times(
            synthetic_inputs(descriptor.is_some()),
            descriptor.map(at),
            at(cache),
            artifact.map(at),
        );
        let expected = match artifact {
            None => false,
            Some(artifact) => artifact >= cache && descriptor.map_or(true, |d| artifact >= d),
        };
        prop_assert_eq!(is_valid(&world), expected);
    }

    #[test]
    fn touching_the_artifact_keeps_it_valid(
        descriptor in 0u64..10_000,
        cache in 0u64..10_000,
        artifact in 0u64..10_000,
        bump in 0u64..10_000,
    ) {
        let before = WorldSnapshot::from_times(
            synthetic_inputs(true),
            Some(at(descriptor)),
            at(cache),
            Some(at(artifact)),
        );
        let after = WorldSnapshot::from_times(
            synthetic_inputs(true),
            Some(at(descriptor)),
            at(cache),
            Some(at(artifact + bump)),
        );
        if is_valid(&before) {
            prop_assert!(is_valid(&after));
        }
    }

    #[test]
    fn an_input_newer_than_the_artifact_invalidates(
        artifact in 0u64..10_000,
        older in 0u64..10_000,
        gap in 1u64..10_000,
        bump_descriptor in any::<bool>(),
    ) {
        let newer = artifact + gap;
        let (descriptor, cache) = if bump_descriptor {
            (newer, older.min(artifact))
        } else {
            (older.min(artifact), newer)
        };
        let world = WorldSnapshot::from_times(
            synthetic_inputs(true),
            Some(at(descriptor)),
            at(cache),
            Some(at(artifact)),
        );
        prop_assert!(!is_valid(&world));
    }
}
