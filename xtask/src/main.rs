use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{exit, Command, ExitStatus};

use clap::{Parser, Subcommand, ValueEnum};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

const LAMBDA_PACKAGE: &str = "mlflow_shutdown_lambda";
const LAMBDA_BIN: &str = "shutdown_lambda";
const LAMBDA_ZIP: &str = "shutdown.zip";
const DEFAULT_TARGET: &str = "x86_64-unknown-linux-gnu";
const DIST_DIR_ENV: &str = "LAMBDA_DIST_DIR";
const DEFAULT_DIST_DIR: &str = "dist";
const DEFAULT_CROSS_LINKER: &str = "x86_64-linux-gnu-gcc";

// ── CLI definition ─────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "xtask",
    about = "Task runner for the MLflow tracking-server shutdown workspace",
    long_about = "A unified CLI for running tests, CI checks, and packaging the\n\
                  shutdown Lambda in the MLflow tracking-server shutdown workspace."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the workspace tests
    Test,
    /// Run CI checks (fmt, clippy, tests, packaging)
    Ci {
        /// Job to run
        #[arg(value_enum, default_value_t = CiJob::Check)]
        job: CiJob,
    },
    /// Build and package the shutdown Lambda as a `bootstrap` zip
    LambdaPackage {
        /// Compilation target triple for the Lambda binary
        #[arg(long, default_value = DEFAULT_TARGET)]
        target: String,
        /// Build profile used for the binary
        #[arg(value_enum, long, default_value_t = BuildProfile::Release)]
        profile: BuildProfile,
        /// Directory that receives `shutdown.zip`
        #[arg(long, env = DIST_DIR_ENV, default_value = DEFAULT_DIST_DIR)]
        dist_dir: PathBuf,
    },
}

#[derive(Clone, ValueEnum)]
enum CiJob {
    /// Formatting, clippy, and tests
    Check,
    /// Build and zip the Lambda artifact
    Package,
    /// Run check + package
    All,
}

#[derive(Clone, Copy, ValueEnum)]
enum BuildProfile {
    Debug,
    Release,
}

impl BuildProfile {
    fn dir_name(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Release => "release",
        }
    }

    fn as_cargo_flag(self) -> Option<&'static str> {
        match self {
            Self::Debug => None,
            Self::Release => Some("--release"),
        }
    }
}

// ── helpers ────────────────────────────────────────────────────────

fn step(label: &str) {
    eprintln!("\n=== {label} ===");
}

fn cargo(args: &[&str]) -> ExitStatus {
    eprintln!("+ cargo {}", args.join(" "));
    Command::new("cargo")
        .args(args)
        .status()
        .expect("failed to execute cargo")
}

fn run_cargo(args: &[&str]) {
    let status = cargo(args);
    if !status.success() {
        exit(status.code().unwrap_or(1));
    }
}

fn package_shutdown_lambda(target: &str, profile: BuildProfile, dist_dir: &Path) {
    if let Err(message) = preflight(target) {
        eprintln!("error: {message}");
        exit(1);
    }

    step("Build shutdown lambda binary");

    let mut cargo_args = vec![
        "build",
        "-p",
        LAMBDA_PACKAGE,
        "--target",
        target,
        "--bin",
        LAMBDA_BIN,
    ];
    if let Some(flag) = profile.as_cargo_flag() {
        cargo_args.push(flag);
    }
    run_cargo(&cargo_args);

    step("Package lambda zip artifact");
    let binary_path = Path::new("target")
        .join(target)
        .join(profile.dir_name())
        .join(binary_name(LAMBDA_BIN, target));
    let zip_path = dist_dir.join(LAMBDA_ZIP);

    if let Err(error) = write_bootstrap_zip(&binary_path, &zip_path) {
        eprintln!("error: failed to package '{}': {error}", binary_path.display());
        exit(1);
    }

    eprintln!("\nPackaged artifact:\n- {}", zip_path.display());
}

/// Fails early when the target or its cross-linker is missing.
fn preflight(target: &str) -> Result<(), String> {
    match installed_targets() {
        Some(installed) if !installed.iter().any(|line| line == target) => {
            return Err(format!(
                "rust target `{target}` is not installed; run `rustup target add {target}`"
            ));
        }
        Some(_) => {}
        None => eprintln!("warning: could not list installed rust targets; skipping target check"),
    }

    if !needs_cross_linker(target) {
        return Ok(());
    }

    let candidates = linker_candidates(target, |key| std::env::var(key).ok());
    if !candidates.iter().any(|candidate| tool_works(candidate)) {
        return Err(format!(
            "no C cross-linker for `{target}`; install `{DEFAULT_CROSS_LINKER}` or set CC_{}",
            target.replace('-', "_")
        ));
    }

    Ok(())
}

fn installed_targets() -> Option<Vec<String>> {
    let output = Command::new("rustup")
        .args(["target", "list", "--installed"])
        .output()
        .ok()
        .filter(|output| output.status.success())?;

    Some(
        String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(|line| line.trim().to_string())
            .collect(),
    )
}

// aws-lc-sys needs a Linux C toolchain when cross-compiling from Windows.
fn needs_cross_linker(target: &str) -> bool {
    cfg!(windows) && target.ends_with("unknown-linux-gnu")
}

/// Linker commands to try, environment overrides first.
fn linker_candidates(target: &str, lookup: impl Fn(&str) -> Option<String>) -> Vec<String> {
    let keys = [
        format!("CC_{}", target.replace('-', "_")),
        format!("CC_{target}"),
        "TARGET_CC".to_string(),
        "CC".to_string(),
    ];

    keys.iter()
        .filter_map(|key| lookup(key))
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .chain(std::iter::once(DEFAULT_CROSS_LINKER.to_string()))
        .collect()
}

fn tool_works(program: &str) -> bool {
    let mut parts = program.split_whitespace();
    let Some(bin) = parts.next() else {
        return false;
    };

    Command::new(bin)
        .args(parts)
        .arg("--version")
        .output()
        .is_ok_and(|output| output.status.success())
}

fn binary_name(bin_name: &str, target: &str) -> String {
    if target.contains("windows") {
        format!("{bin_name}.exe")
    } else {
        bin_name.to_string()
    }
}

/// Writes `binary_path` into `zip_path` as the executable `bootstrap` entry.
fn write_bootstrap_zip(binary_path: &Path, zip_path: &Path) -> zip::result::ZipResult<()> {
    let binary = fs::read(binary_path)?;
    if let Some(parent) = zip_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut zip = ZipWriter::new(fs::File::create(zip_path)?);
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o755);
    zip.start_file("bootstrap", options)?;
    zip.write_all(&binary)?;
    zip.finish()?;
    Ok(())
}

/// `LAMBDA_DIST_DIR` when set and non-empty, else `dist`.
fn resolve_dist_dir(lookup: impl Fn(&str) -> Option<String>) -> PathBuf {
    lookup(DIST_DIR_ENV)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .map_or_else(|| PathBuf::from(DEFAULT_DIST_DIR), PathBuf::from)
}

// ── CI jobs ────────────────────────────────────────────────────────

fn ci_check() {
    step("Check formatting");
    run_cargo(&["fmt", "--all", "--", "--check"]);

    step("Clippy");
    run_cargo(&[
        "clippy",
        "--all-targets",
        "--all-features",
        "--",
        "-D",
        "warnings",
    ]);

    step("Test mlflow_shutdown_core");
    run_cargo(&["test", "-p", "mlflow_shutdown_core"]);

    step("Test mlflow_shutdown_lambda");
    run_cargo(&["test", "-p", LAMBDA_PACKAGE]);
}

fn ci_package() {
    let dist_dir = resolve_dist_dir(|key| std::env::var(key).ok());
    package_shutdown_lambda(DEFAULT_TARGET, BuildProfile::Release, &dist_dir);
}

// ── main ───────────────────────────────────────────────────────────

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Test => {
            run_cargo(&["test", "--workspace"]);
        }
        Commands::Ci { job } => {
            match job {
                CiJob::Check => ci_check(),
                CiJob::Package => ci_package(),
                CiJob::All => {
                    ci_check();
                    ci_package();
                }
            }
            eprintln!("\nCI job passed.");
        }
        Commands::LambdaPackage {
            target,
            profile,
            dist_dir,
        } => {
            package_shutdown_lambda(&target, profile, &dist_dir);
        }
    }
}
