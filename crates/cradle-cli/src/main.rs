use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use cradle_cabal::{
    CabalOptions, CabalProject, ExtractedDependency, FlagAssignment, PackageIdentity,
    WorldSnapshot,
};
use cradle_config::{init_tracing, load_for_project, CabalConfig};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(
    name = "cradle",
    version,
    about = "Inspect a Cabal package's cached build configuration (setup-config)"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Report whether setup-config is current, without regenerating it
    Status(ProjectArgs),
    /// List external dependencies (regenerates setup-config when stale)
    Deps(DepsArgs),
    /// Print the configured flag assignment (regenerates setup-config when stale)
    Flags(ProjectArgs),
    /// Record modification times of the inputs and the artifact
    Snapshot(SnapshotArgs),
    /// Report whether anything changed since a recorded snapshot
    Changed(ChangedArgs),
}

#[derive(Args)]
struct ProjectArgs {
    /// Package root (defaults to current directory)
    #[arg(long, default_value = ".")]
    path: PathBuf,
    /// Emit JSON suitable for CI
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct DepsArgs {
    #[command(flatten)]
    project: ProjectArgs,
    /// Package identity to exclude; defaults to the one named in the setup-config header
    #[arg(long, value_name = "NAME-VERSION")]
    package: Option<PackageIdentity>,
}

#[derive(Args)]
struct SnapshotArgs {
    #[command(flatten)]
    project: ProjectArgs,
    /// Write the snapshot here instead of stdout
    #[arg(long, value_name = "FILE")]
    out: Option<PathBuf>,
}

#[derive(Args)]
struct ChangedArgs {
    #[command(flatten)]
    project: ProjectArgs,
    /// Snapshot previously written by `cradle snapshot`
    #[arg(long, value_name = "FILE")]
    since: PathBuf,
}

#[derive(Serialize)]
struct StatusReport {
    root: PathBuf,
    config: Option<PathBuf>,
    artifact: PathBuf,
    descriptor: Option<PathBuf>,
    package_cache: PathBuf,
    valid: bool,
}

#[derive(Serialize)]
struct ChangedReport {
    changed: bool,
}

fn main() {
    let cli = Cli::parse();
    let exit_code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            1
        }
    };

    std::process::exit(exit_code);
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Status(args) => {
            let (project, config_path) = open_project(&args.path)?;
            let inputs = project.inputs();
            let report = StatusReport {
                root: project.root().to_path_buf(),
                config: config_path,
                artifact: inputs.artifact.clone(),
                descriptor: inputs.descriptor.clone(),
                package_cache: inputs.package_cache.clone(),
                valid: project.is_artifact_valid()?,
            };
            if args.json {
                print_json(&report)?;
            } else {
                let state = if report.valid { "up to date" } else { "stale" };
                println!("setup-config: {} ({state})", report.artifact.display());
                match &report.descriptor {
                    Some(descriptor) => println!("  descriptor: {}", descriptor.display()),
                    None => println!("  descriptor: (none)"),
                }
                println!("  package cache: {}", report.package_cache.display());
                if let Some(config) = &report.config {
                    println!("  config: {}", config.display());
                }
            }
            Ok(0)
        }
        Command::Deps(args) => {
            let (project, _) = open_project(&args.project.path)?;
            let setup = project.load()?;
            let deps = match &args.package {
                Some(own) => setup.dependencies(own)?,
                None => setup.own_dependencies()?,
            };
            if args.project.json {
                print_json(&deps)?;
            } else {
                print_dependencies(&deps);
            }
            Ok(0)
        }
        Command::Flags(args) => {
            let (project, _) = open_project(&args.path)?;
            let flags = project.flags()?;
            if args.json {
                print_json(&flags)?;
            } else {
                print_flags(&flags);
            }
            Ok(0)
        }
        Command::Snapshot(args) => {
            let (project, _) = open_project(&args.project.path)?;
            let snapshot = project.capture_world()?;
            let text = serde_json::to_string_pretty(&snapshot)?;
            match &args.out {
                Some(out) => {
                    std::fs::write(out, format!("{text}\n"))
                        .with_context(|| format!("failed to write snapshot {}", out.display()))?;
                    if !args.project.json {
                        println!("snapshot written to {}", out.display());
                    }
                }
                None => println!("{text}"),
            }
            Ok(0)
        }
        Command::Changed(args) => {
            let (project, _) = open_project(&args.project.path)?;
            let text = std::fs::read_to_string(&args.since)
                .with_context(|| format!("failed to read snapshot {}", args.since.display()))?;
            let previous: WorldSnapshot = serde_json::from_str(&text)
                .with_context(|| format!("failed to parse snapshot {}", args.since.display()))?;
            let changed = project.world_changed(&previous)?;
            if args.project.json {
                print_json(&ChangedReport { changed })?;
            } else {
                println!("{changed}");
            }
            Ok(0)
        }
    }
}

fn open_project(path: &Path) -> Result<(CabalProject, Option<PathBuf>)> {
    let root = path
        .canonicalize()
        .with_context(|| format!("failed to resolve project root {}", path.display()))?;
    let (config, config_path, diagnostics) = load_for_project(&root)?;
    init_tracing(&config.logging);

    if let Some(config_path) = &config_path {
        tracing::debug!(target: "cradle.config", path = %config_path.display(), "loaded config");
        for key in &diagnostics.unknown_keys {
            tracing::warn!(
                target: "cradle.config",
                path = %config_path.display(),
                key = %key,
                "ignoring unknown config key"
            );
        }
    }

    let project = CabalProject::open(&root, cabal_options(&config.cabal))
        .with_context(|| format!("failed to open Cabal package at {}", root.display()))?;
    Ok((project, config_path))
}

fn cabal_options(config: &CabalConfig) -> CabalOptions {
    CabalOptions {
        program: config.program.clone(),
        configure_args: config.configure_args.clone(),
        dist_dir: config.dist_dir.clone(),
        descriptor: config.descriptor.clone(),
        package_cache: config.package_cache.clone(),
        regenerate: config.regenerate,
        timeout: config.timeout(),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value)?;
    println!("{out}");
    Ok(())
}

fn print_dependencies(deps: &[ExtractedDependency]) {
    if deps.is_empty() {
        println!("no external dependencies");
        return;
    }
    for dep in deps {
        println!("{} ({})", dep.package, dep.installed);
    }
}

fn print_flags(flags: &FlagAssignment) {
    if flags.is_empty() {
        println!("no flags assigned");
        return;
    }
    for (name, enabled) in flags {
        let sign = if *enabled { '+' } else { '-' };
        println!("{sign}{name}");
    }
}
