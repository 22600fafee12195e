use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{exit, Command};

use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use zip::result::ZipResult;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const RUNTIME_PACKAGE: &str = "file_pipeline_lambda";
const RUNTIME_BIN: &str = "pipeline_runtime";
/// Terraform root; its `lambda_zip_path` variable is relative to this directory.
const TERRAFORM_DIR: &str = "infra/file_pipeline";
/// Default of the Terraform `lambda_zip_path` variable.
const LAMBDA_ZIP_PATH: &str = "dist/runtime.zip";
/// `provided.al2023` executes this entry of the deployment package.
const BOOTSTRAP_ENTRY: &str = "bootstrap";

type TaskResult<T = ()> = Result<T, String>;

#[derive(Parser)]
#[command(name = "xtask", about = "Build, package and CI tasks for the file pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run CI jobs over every workspace crate
    Ci {
        #[arg(value_enum, default_value_t = CiJob::Check)]
        job: CiJob,
    },
    /// Build the pipeline runtime and write the Terraform deployment package
    ServerlessPackage {
        /// Compilation target triple matching the Lambda architecture
        #[arg(long, default_value = "x86_64-unknown-linux-gnu")]
        target: String,
        /// Package an unoptimized build
        #[arg(long)]
        debug: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum CiJob {
    /// fmt, clippy, then tests
    Check,
    /// Tests only
    Test,
}

#[derive(Debug, Deserialize)]
struct CargoMetadata {
    packages: Vec<MetadataPackage>,
}

#[derive(Debug, Deserialize)]
struct MetadataPackage {
    name: String,
    manifest_path: PathBuf,
}

fn cargo(args: &[&str]) -> TaskResult {
    eprintln!("+ cargo {}", args.join(" "));
    let status = Command::new("cargo")
        .args(args)
        .status()
        .map_err(|error| format!("failed to execute cargo: {error}"))?;
    if status.success() {
        Ok(())
    } else {
        Err(format!("`cargo {}` exited with {status}", args.join(" ")))
    }
}

/// Library crates under `crates/`, in manifest order. `xtask` is left out.
fn workspace_crates() -> TaskResult<Vec<String>> {
    let output = Command::new("cargo")
        .args(["metadata", "--no-deps", "--format-version", "1"])
        .output()
        .map_err(|error| format!("failed to execute cargo metadata: {error}"))?;
    if !output.status.success() {
        return Err(format!(
            "cargo metadata failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }
    crate_names(&output.stdout)
}

fn crate_names(metadata_json: &[u8]) -> TaskResult<Vec<String>> {
    let metadata: CargoMetadata = serde_json::from_slice(metadata_json)
        .map_err(|error| format!("unexpected cargo metadata output: {error}"))?;
    let names: Vec<String> = metadata
        .packages
        .into_iter()
        .filter(|package| {
            package
                .manifest_path
                .components()
                .any(|component| component.as_os_str() == "crates")
        })
        .map(|package| package.name)
        .collect();
    if names.is_empty() {
        return Err("no crates found under crates/".to_string());
    }
    Ok(names)
}

fn ci_tests() -> TaskResult {
    for name in workspace_crates()? {
        eprintln!("\n=== test {name} ===");
        cargo(&["test", "-p", &name])?;
    }
    Ok(())
}

fn ci_check() -> TaskResult {
    eprintln!("\n=== fmt ===");
    cargo(&["fmt", "--all", "--", "--check"])?;
    eprintln!("\n=== clippy ===");
    cargo(&["clippy", "--workspace", "--all-targets", "--", "-D", "warnings"])?;
    ci_tests()
}

fn require_target(target: &str) -> TaskResult {
    let output = match Command::new("rustup")
        .args(["target", "list", "--installed"])
        .output()
    {
        Ok(output) if output.status.success() => output,
        // Toolchains not managed by rustup: let cargo report a missing target.
        _ => return Ok(()),
    };
    let installed = String::from_utf8_lossy(&output.stdout);
    if installed.lines().any(|line| line.trim() == target) {
        Ok(())
    } else {
        Err(format!(
            "target `{target}` is not installed; run `rustup target add {target}`"
        ))
    }
}

fn package_runtime(target: &str, debug: bool) -> TaskResult {
    require_target(target)?;

    let mut build_args = vec!["build", "-p", RUNTIME_PACKAGE, "--bin", RUNTIME_BIN];
    build_args.extend(["--target", target]);
    if !debug {
        build_args.push("--release");
    }
    cargo(&build_args)?;

    let profile_dir = if debug { "debug" } else { "release" };
    let binary_path = Path::new("target")
        .join(target)
        .join(profile_dir)
        .join(RUNTIME_BIN);
    let zip_path = Path::new(TERRAFORM_DIR).join(LAMBDA_ZIP_PATH);
    if let Some(dir) = zip_path.parent() {
        fs::create_dir_all(dir)
            .map_err(|error| format!("failed to create {}: {error}", dir.display()))?;
    }

    write_lambda_zip(&binary_path, &zip_path)?;
    let bootstrap_size = verify_lambda_zip(&zip_path)?;

    eprintln!(
        "\nPackaged {} ({bootstrap_size} byte {BOOTSTRAP_ENTRY}) for lambda_zip_path = \"{LAMBDA_ZIP_PATH}\"",
        zip_path.display()
    );
    Ok(())
}

fn write_lambda_zip(binary_path: &Path, zip_path: &Path) -> TaskResult {
    let binary = fs::read(binary_path).map_err(|error| {
        format!(
            "failed to read runtime binary {}: {error}",
            binary_path.display()
        )
    })?;
    let file = fs::File::create(zip_path)
        .map_err(|error| format!("failed to create {}: {error}", zip_path.display()))?;

    let mut zip = ZipWriter::new(file);
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o755);
    let write = |zip: &mut ZipWriter<fs::File>| -> ZipResult<()> {
        zip.start_file(BOOTSTRAP_ENTRY, options)?;
        zip.write_all(&binary)?;
        zip.finish()?;
        Ok(())
    };
    write(&mut zip).map_err(|error| format!("failed to write {}: {error}", zip_path.display()))
}

/// Checks the package holds exactly one executable `bootstrap` entry and
/// returns its uncompressed size.
fn verify_lambda_zip(zip_path: &Path) -> TaskResult<u64> {
    let file = fs::File::open(zip_path)
        .map_err(|error| format!("failed to open {}: {error}", zip_path.display()))?;
    let mut archive = ZipArchive::new(file)
        .map_err(|error| format!("{} is not a zip archive: {error}", zip_path.display()))?;

    let entries: Vec<&str> = archive.file_names().collect();
    if entries != [BOOTSTRAP_ENTRY] {
        return Err(format!(
            "{} must contain only `{BOOTSTRAP_ENTRY}`, found {entries:?}",
            zip_path.display()
        ));
    }

    let entry = archive
        .by_name(BOOTSTRAP_ENTRY)
        .map_err(|error| format!("failed to read `{BOOTSTRAP_ENTRY}`: {error}"))?;
    if !entry.unix_mode().is_some_and(|mode| mode & 0o111 != 0) {
        return Err(format!("`{BOOTSTRAP_ENTRY}` is not executable"));
    }
    if entry.size() == 0 {
        return Err(format!("`{BOOTSTRAP_ENTRY}` is empty"));
    }
    Ok(entry.size())
}

fn main() {
    let result = match Cli::parse().command {
        Commands::Ci { job: CiJob::Check } => ci_check(),
        Commands::Ci { job: CiJob::Test } => ci_tests(),
        Commands::ServerlessPackage { target, debug } => package_runtime(&target, debug),
    };

    if let Err(message) = result {
        eprintln!("error: {message}");
        exit(1);
    }
}
