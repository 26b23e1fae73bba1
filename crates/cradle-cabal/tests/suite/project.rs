use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use cradle_cabal::{
    display_chain, CabalError, CabalOptions, CabalProject, CapturedOutput, CommandRunner,
    Freshness, Invocation, PackageIdentity, RunCommandError,
};
use filetime::{set_file_mtime, FileTime};
use tempfile::TempDir;

const NEWEST: &str = include_str!("../fixtures/newest.setup-config");

#[derive(Debug)]
enum Behavior {
    WriteArtifact(&'static str),
    WriteNothing,
    Fail,
}

/// Stands in for `cabal configure`, recording every invocation.
#[derive(Debug)]
struct FakeCabal {
    artifact: PathBuf,
    behavior: Behavior,
    invocations: Mutex<Vec<Invocation>>,
}

impl FakeCabal {
    fn new(artifact: PathBuf, behavior: Behavior) -> Self {
        Self {
            artifact,
            behavior,
            invocations: Mutex::new(Vec::new()),
        }
    }

    fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().unwrap().clone()
    }
}

impl CommandRunner for &FakeCabal {
    fn run(&self, invocation: &Invocation) -> Result<CapturedOutput, RunCommandError> {
        self.invocations.lock().unwrap().push(invocation.clone());
        match self.behavior {
            Behavior::WriteArtifact(text) => {
                fs::create_dir_all(self.artifact.parent().unwrap()).unwrap();
                fs::write(&self.artifact, text).unwrap();
                Ok(CapturedOutput::default())
            }
            Behavior::WriteNothing => Ok(CapturedOutput::default()),
            Behavior::Fail => Err(RunCommandError::Spawn {
                invocation: invocation.clone(),
                source: io::Error::new(io::ErrorKind::NotFound, "cabal: not installed"),
            }),
        }
    }
}

struct Fixture {
    dir: TempDir,
    options: CabalOptions,
}

impl Fixture {
    /// A project whose descriptor and package cache were last touched at t=1000.
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("demo.cabal"), 1_000);
        touch(&root.join("index/00-index.cache"), 1_000);
        let options = CabalOptions {
            package_cache: Some(PathBuf::from("index/00-index.cache")),
            ..CabalOptions::default()
        };
        Self { dir, options }
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }

    fn artifact(&self) -> PathBuf {
        self.root().join("dist/setup-config")
    }

    fn write_artifact(&self, text: &str, secs: i64) {
        fs::create_dir_all(self.artifact().parent().unwrap()).unwrap();
        fs::write(self.artifact(), text).unwrap();
        touch(&self.artifact(), secs);
    }

    fn project<'r>(&self, runner: &'r FakeCabal) -> CabalProject<&'r FakeCabal> {
        CabalProject::with_runner(self.root(), self.options.clone(), runner).unwrap()
    }
}

fn touch(path: &Path, secs: i64) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    if !path.exists() {
        fs::write(path, "").unwrap();
    }
    set_file_mtime(path, FileTime::from_unix_time(secs, 0)).unwrap();
}

fn demo() -> PackageIdentity {
    "demo-0.1.0.0".parse().unwrap()
}

#[test]
fn descriptor_is_discovered_in_the_project_root() {
    let fixture = Fixture::new();
    let runner = FakeCabal::new(fixture.artifact(), Behavior::WriteNothing);
    let project = fixture.project(&runner);

    assert_eq!(
        project.inputs().descriptor.as_deref(),
        Some(fixture.root().join("demo.cabal").as_path())
    );
    assert_eq!(project.artifact_path(), fixture.artifact());
}

#[test]
fn fresh_artifact_is_read_without_running_cabal() {
    let fixture = Fixture::new();
    fixture.write_artifact(NEWEST, 2_000);
    let runner = FakeCabal::new(fixture.artifact(), Behavior::Fail);
    let project = fixture.project(&runner);

    assert!(project.is_artifact_valid().unwrap());
    assert_eq!(project.ensure_artifact().unwrap(), Freshness::Fresh);
    let flags = project.flags().unwrap();
    assert_eq!(flags.get("fast"), Some(&true));
    assert!(runner.invocations().is_empty());
}

#[test]
fn stale_artifact_is_regenerated_in_the_project_root() {
    let fixture = Fixture::new();
    fixture.write_artifact("stale contents", 500);
    let runner = FakeCabal::new(fixture.artifact(), Behavior::WriteArtifact(NEWEST));
    let project = fixture.project(&runner);

    assert!(!project.is_artifact_valid().unwrap());
    let deps = project.dependencies(&demo()).unwrap();
    assert_eq!(deps.len(), 5);

    assert_eq!(
        runner.invocations(),
        vec![Invocation::new(fixture.root(), "cabal").args(["configure"])]
    );
    assert!(project.is_artifact_valid().unwrap());
}

#[test]
fn missing_artifact_is_generated() {
    let fixture = Fixture::new();
    let runner = FakeCabal::new(fixture.artifact(), Behavior::WriteArtifact(NEWEST));
    let project = fixture.project(&runner);

    assert_eq!(project.ensure_artifact().unwrap(), Freshness::Regenerated);
    assert_eq!(project.own_identity().unwrap(), demo());
    assert_eq!(runner.invocations().len(), 1);
}

#[test]
fn configured_program_and_arguments_are_used() {
    let mut fixture = Fixture::new();
    fixture.options.program = PathBuf::from("/opt/cabal/bin/cabal");
    fixture.options.configure_args = vec![
        "configure".to_owned(),
        "--enable-tests".to_owned(),
        "--builddir=dist".to_owned(),
    ];
    let runner = FakeCabal::new(fixture.artifact(), Behavior::WriteArtifact(NEWEST));
    let project = fixture.project(&runner);

    project.ensure_artifact().unwrap();
    let invocation = &runner.invocations()[0];
    assert_eq!(invocation.program, PathBuf::from("/opt/cabal/bin/cabal"));
    assert_eq!(
        invocation.args,
        vec!["configure", "--enable-tests", "--builddir=dist"]
    );
    assert_eq!(invocation.cwd(), fixture.root());
}

#[test]
fn regeneration_failure_is_reported_with_its_cause() {
    let fixture = Fixture::new();
    let runner = FakeCabal::new(fixture.artifact(), Behavior::Fail);
    let project = fixture.project(&runner);

    let err = project.flags().unwrap_err();
    assert!(matches!(err, CabalError::Regeneration { .. }), "{err}");
    assert_eq!(
        err.to_string(),
        "cache was invalid, regeneration was attempted, regeneration failed"
    );
    let message = display_chain(&err);
    assert!(
        message.starts_with("cache was invalid, regeneration was attempted, regeneration failed: "),
        "{message}"
    );
    assert_eq!(message.matches("cabal: not installed").count(), 1, "{message}");
}

#[test]
fn regeneration_that_writes_nothing_is_an_error() {
    let fixture = Fixture::new();
    let runner = FakeCabal::new(fixture.artifact(), Behavior::WriteNothing);
    let project = fixture.project(&runner);

    let err = project.ensure_artifact().unwrap_err();
    match err {
        CabalError::ArtifactNotProduced { path } => assert_eq!(path, fixture.artifact()),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn disabled_regeneration_reports_stale_artifact() {
    let mut fixture = Fixture::new();
    fixture.options.regenerate = false;
    fixture.write_artifact(NEWEST, 10);
    let runner = FakeCabal::new(fixture.artifact(), Behavior::WriteArtifact(NEWEST));
    let project = fixture.project(&runner);

    let err = project.dependencies(&demo()).unwrap_err();
    assert!(matches!(err, CabalError::Stale { .. }), "{err}");
    assert!(runner.invocations().is_empty());
}

#[test]
fn regeneration_changes_the_world() {
    let fixture = Fixture::new();
    fixture.write_artifact("old", 10);
    let runner = FakeCabal::new(fixture.artifact(), Behavior::WriteArtifact(NEWEST));
    let project = fixture.project(&runner);

    let before = project.capture_world().unwrap();
    assert!(!project.world_changed(&before).unwrap());
    project.ensure_artifact().unwrap();
    assert!(project.world_changed(&before).unwrap());
}

#[test]
fn unreadable_layout_is_a_parse_error_naming_the_artifact() {
    let fixture = Fixture::new();
    fixture.write_artifact(
        "Saved package config for demo-0.1.0.0 written by Cabal-3.0 using ghc-8.8\nLocalBuildInfo {}",
        2_000,
    );
    let runner = FakeCabal::new(fixture.artifact(), Behavior::Fail);
    let project = fixture.project(&runner);

    let err = project.dependencies(&demo()).unwrap_err();
    match &err {
        CabalError::Parse { path, .. } => assert_eq!(path, &fixture.artifact()),
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("no known setup-config schema matched"), "{err}");
}
