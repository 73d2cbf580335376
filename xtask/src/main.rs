use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{exit, Command};

use anyhow::{bail, Context, Result};
use aws_config::BehaviorVersion;
use clap::{Parser, Subcommand, ValueEnum};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

// ── CLI definition ─────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "xtask",
    about = "Task runner for the investment tracker",
    long_about = "Container image, lint, packaging and deployment tasks for the\n\
                  investment tracker service and its daily report function."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the returns service image
    BuildImage {
        #[arg(long, default_value = DEFAULT_TAG)]
        tag: String,
        /// AlphaVantage key baked into the image
        #[arg(long, env = "AV_API_KEY")]
        api_key: String,
    },
    /// Run the returns service image locally
    RunImage {
        #[arg(long, default_value = DEFAULT_TAG)]
        tag: String,
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
    /// Tag the image for a registry and push it
    Push {
        /// e.g. `gcr.io/my-project`
        #[arg(long, env = "IMAGE_REGISTRY")]
        registry: String,
        #[arg(long, default_value = DEFAULT_TAG)]
        tag: String,
    },
    /// Formatting and clippy checks
    Lint,
    /// Build the report function and zip it as a deployment archive
    Package {
        #[arg(long, default_value = "x86_64-unknown-linux-gnu")]
        target: String,
        #[arg(value_enum, long, default_value_t = BuildProfile::Release)]
        profile: BuildProfile,
    },
    /// Replace the report function's code with a deployment archive
    Deploy {
        #[arg(long, env = "FUNCTION_NAME")]
        function_name: String,
        #[arg(long, default_value = DEFAULT_ARCHIVE)]
        archive: PathBuf,
        /// Upload through this bucket instead of sending the archive inline
        #[arg(long, env = "DEPLOY_BUCKET")]
        s3_bucket: Option<String>,
    },
}

const DEFAULT_TAG: &str = "investment-tracker:latest";
const DEFAULT_ARCHIVE: &str = "dist/lambda.zip";
const LAMBDA_BIN: &str = "lambda";

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

/// Run an external tool; a failure ends xtask with the tool's exit status.
fn run_tool(program: &str, args: &[&str]) -> Result<()> {
    eprintln!("+ {} {}", program, args.join(" "));
    let status = Command::new(program)
        .args(args)
        .status()
        .with_context(|| format!("failed to execute {program}"))?;
    if !status.success() {
        exit(status.code().unwrap_or(1));
    }
    Ok(())
}

fn remote_tag(registry: &str, tag: &str) -> String {
    format!("{}/{}", registry.trim_end_matches('/'), tag)
}

fn package_lambda(target: &str, profile: BuildProfile) -> Result<PathBuf> {
    step("Build report function");
    let mut cargo_args = vec![
        "build",
        "--bin",
        LAMBDA_BIN,
        "--features",
        "lambda",
        "--target",
        target,
    ];
    if let Some(flag) = profile.as_cargo_flag() {
        cargo_args.push(flag);
    }
    run_tool("cargo", &cargo_args)?;

    step("Package deployment archive");
    let binary = Path::new("target")
        .join(target)
        .join(profile.dir_name())
        .join(LAMBDA_BIN);
    let archive = PathBuf::from(DEFAULT_ARCHIVE);
    if let Some(dir) = archive.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }
    write_bootstrap_zip(&binary, &archive)?;

    eprintln!("\nPackaged artifact:\n- {}", archive.display());
    Ok(archive)
}

/// Zip `binary_path` as a single executable `bootstrap` entry.
fn write_bootstrap_zip(binary_path: &Path, zip_path: &Path) -> Result<()> {
    if !binary_path.exists() {
        bail!("expected lambda binary at '{}'", binary_path.display());
    }

    let binary = fs::read(binary_path)
        .with_context(|| format!("failed to read {}", binary_path.display()))?;
    let file = fs::File::create(zip_path)
        .with_context(|| format!("failed to create {}", zip_path.display()))?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o755);
    zip.start_file("bootstrap", options)?;
    zip.write_all(&binary)?;
    zip.finish()?;
    Ok(())
}

async fn deploy(function_name: &str, archive: &Path, s3_bucket: Option<&str>) -> Result<()> {
    let bytes = fs::read(archive).with_context(|| {
        format!(
            "failed to read {}; run `xtask package` first",
            archive.display()
        )
    })?;
    let config = aws_config::load_defaults(BehaviorVersion::latest()).await;
    let lambda = aws_sdk_lambda::Client::new(&config);

    let request = lambda.update_function_code().function_name(function_name);
    let request = match s3_bucket {
        Some(bucket) => {
            let key = format!("{}/lambda.zip", function_name);
            step(&format!("Upload s3://{bucket}/{key}"));
            aws_sdk_s3::Client::new(&config)
                .put_object()
                .bucket(bucket)
                .key(&key)
                .body(aws_sdk_s3::primitives::ByteStream::from(bytes))
                .send()
                .await
                .context("failed to upload deployment archive")?;
            request.s3_bucket(bucket).s3_key(key)
        }
        None => request.zip_file(aws_sdk_lambda::primitives::Blob::new(bytes)),
    };

    step(&format!("Update function {function_name}"));
    let output = request
        .send()
        .await
        .with_context(|| format!("failed to update {function_name}"))?;
    eprintln!(
        "Deployed {} ({} bytes)",
        output.function_arn().unwrap_or(function_name),
        output.code_size()
    );
    Ok(())
}

// ── main ───────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::BuildImage { tag, api_key } => {
            step("Build image");
            let build_arg = format!("AV_API_KEY={api_key}");
            run_tool(
                "docker",
                &["build", "--build-arg", &build_arg, "-t", &tag, "."],
            )?;
        }
        Commands::RunImage { tag, port } => {
            step("Run image");
            let env = format!("PORT={port}");
            let publish = format!("{port}:{port}");
            run_tool("docker", &["run", "--rm", "-e", &env, "-p", &publish, &tag])?;
        }
        Commands::Push { registry, tag } => {
            let remote = remote_tag(&registry, &tag);
            step("Tag image");
            run_tool("docker", &["tag", &tag, &remote])?;
            step("Push image");
            run_tool("docker", &["push", &remote])?;
        }
        Commands::Lint => {
            step("Check formatting");
            run_tool("cargo", &["fmt", "--all", "--", "--check"])?;

            step("Clippy");
            run_tool(
                "cargo",
                &[
                    "clippy",
                    "--workspace",
                    "--all-targets",
                    "--all-features",
                    "--",
                    "-D",
                    "warnings",
                ],
            )?;
            eprintln!("\nLint passed.");
        }
        Commands::Package { target, profile } => {
            package_lambda(&target, profile)?;
        }
        Commands::Deploy {
            function_name,
            archive,
            s3_bucket,
        } => {
            deploy(&function_name, &archive, s3_bucket.as_deref()).await?;
        }
    }
    Ok(())
}
