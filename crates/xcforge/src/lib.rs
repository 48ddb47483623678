//! # xcforge
//!
//! Command-line tool that builds native libraries for several Apple platforms
//! and packages each one as an `.xcframework`.
//!
//! ## Overview
//!
//! `xcforge` is the CLI front end of [`xcforge_sdk`]. It handles:
//!
//! - **Selection** - Turns CLI flags or Xcode build settings into a platform set
//! - **Configuration** - Merges `xcforge.toml`, CLI flags and defaults
//! - **Discovery** - Locates `cmake` and loads `.env.local`
//! - **Reporting** - Logs every stage and optionally writes a JSON summary
//!
//! ## Quick Start
//!
//! ```bash
//! # Write a starter xcforge.toml next to the sources
//! xcforge init --root dependencies
//!
//! # Build every platform for every configured library
//! xcforge build --root dependencies
//!
//! # Build from an Xcode run script phase
//! xcforge build --root dependencies \
//!     --archs "$ARCHS" --effective-platform-name "$EFFECTIVE_PLATFORM_NAME"
//!
//! # Build two platforms of one library with Mbed TLS
//! xcforge build --platform IOS --platform IOS_SIMULATOR --library quicr --crypto mbedtls
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `build` | Build, merge, symbolicate, patch and package |
//! | `platforms` | List supported platforms |
//! | `init` | Write a starter `xcforge.toml` |
//!
//! ## Exit Status
//!
//! `0` unless a fatal error occurred. Failed platform builds, symbol
//! extraction and metadata patches are logged but do not change the status;
//! configuration errors and failed merges or packaging exit with `1`.
//!
//! ## CLI Flags
//!
//! Global flags available on all commands:
//!
//! - **`--verbose` / `-v`** - Log every external command (`RUST_LOG` still wins)
//!
//! ## Modules
//!
//! - [`config`] - Configuration file support for `xcforge.toml`

#![cfg_attr(docsrs, feature(doc_cfg))]

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use xcforge_sdk::{
    CryptoBackend, ForgeError, LibraryTarget, PlatformId, PlatformSet, Registry, RunConfig,
    RunSummary, Selection, SystemRunner, types::host_parallelism,
};

use config::{CONFIG_FILE_NAME, ConfigResolver, ForgeConfig};

pub mod config;

/// Fallback location of `cmake` when it is not on `PATH`.
const HOMEBREW_CMAKE: &str = "/opt/homebrew/bin/cmake";

/// Builds native libraries for Apple platforms and packages them as xcframeworks.
#[derive(Parser, Debug)]
#[command(
    name = "xcforge",
    author,
    version,
    about = "Multi-platform xcframework builder",
    long_about = None
)]
struct Cli {
    /// Print verbose output including all commands
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the selected platforms and package one xcframework per library.
    Build(BuildArgs),
    /// List supported platforms.
    Platforms,
    /// Write a starter xcforge.toml.
    Init {
        #[arg(long, help = "Directory to write xcforge.toml into (default: current directory)")]
        root: Option<PathBuf>,
        #[arg(long, help = "Overwrite an existing xcforge.toml")]
        force: bool,
    },
}

#[derive(Args, Debug, Default)]
struct BuildArgs {
    #[arg(long = "platform", help = "Platform to build (repeatable), e.g. IOS or CATALYST_ARM")]
    platforms: Vec<String>,
    #[arg(long, help = "Space-separated architectures, used by Xcode")]
    archs: Option<String>,
    #[arg(
        long,
        allow_hyphen_values = true,
        help = "Effective platform name, used by Xcode (e.g. -iphoneos)"
    )]
    effective_platform_name: Option<String>,
    #[arg(long, help = "Build number, used by Xcode Cloud")]
    build_number: Option<u64>,
    #[arg(long, help = "TLS backend: openssl or mbedtls")]
    crypto: Option<String>,
    #[arg(long = "library", help = "Library to build (repeatable, default: all configured)")]
    libraries: Vec<String>,
    #[arg(long, help = "Directory holding sources and build outputs (default: current directory)")]
    root: Option<PathBuf>,
    #[arg(long, help = "Path to config file (default: discover xcforge.toml)")]
    config: Option<PathBuf>,
    #[arg(long, help = "Path to cmake")]
    cmake: Option<PathBuf>,
    #[arg(long, help = "Write a JSON run summary to this path")]
    summary: Option<PathBuf>,
}

/// Everything a build needs, resolved before any process is launched.
#[derive(Debug)]
struct ResolvedBuild {
    run: RunConfig,
    platforms: PlatformSet,
    libraries: Vec<LibraryTarget>,
    config_path: Option<PathBuf>,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Build(args) => cmd_build(&args),
        Command::Platforms => {
            cmd_platforms();
            Ok(())
        }
        Command::Init { root, force } => {
            let root = match root {
                Some(root) => root,
                None => env::current_dir().context("Failed to get current directory")?,
            };
            let path = write_starter_config(&root, force)?;
            println!("✓ Wrote {}", path.display());
            Ok(())
        }
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn cmd_build(args: &BuildArgs) -> Result<()> {
    let root = match &args.root {
        Some(root) => root.clone(),
        None => env::current_dir().context("Failed to get current directory")?,
    };
    load_dotenv(&root);

    let registry = Registry::standard();
    let build = resolve_build(args, &root, &registry)?;
    if let Some(path) = &build.config_path {
        log::info!("Using config {}", path.display());
    }
    log::info!(
        "Building {} for {} (build {}, {})",
        build
            .libraries
            .iter()
            .map(|l| l.name.as_str())
            .collect::<Vec<_>>()
            .join(", "),
        build.platforms,
        build.run.build_number,
        build.run.crypto
    );

    let mut summary = RunSummary::new(&build.run);
    let outcome = xcforge_sdk::Forge::new(&SystemRunner, &registry, &build.run).run_into(
        &build.libraries,
        &build.platforms,
        &mut summary,
    );

    print_summary(&summary);
    if let Some(path) = &args.summary {
        write_summary(&summary, path)?;
    }
    outcome?;
    Ok(())
}

fn write_summary(summary: &RunSummary, path: &Path) -> Result<()> {
    summary
        .write_to(path)
        .with_context(|| format!("Failed to write summary to {:?}", path))?;
    println!("Summary written to {}", path.display());
    Ok(())
}

/// Resolves CLI flags, config and defaults into a run description.
///
/// Every configuration error is raised here, before any process launches.
fn resolve_build(args: &BuildArgs, root: &Path, registry: &Registry) -> Result<ResolvedBuild> {
    if !root.is_dir() {
        return Err(ForgeError::Config(format!(
            "root directory {} does not exist",
            root.display()
        ))
        .into());
    }
    let root = root
        .canonicalize()
        .with_context(|| format!("Failed to resolve root directory {:?}", root))?;

    let resolver = ConfigResolver::new(&root, args.config.as_deref())?;
    let config = resolver.effective();

    let cmake = locate_cmake(args.cmake.as_deref(), resolver.cmake())?;
    let crypto = match &args.crypto {
        Some(name) => Some(name.parse::<CryptoBackend>()?),
        None => None,
    };

    let mut run = RunConfig::new(&root, cmake);
    run.build_number = resolver.resolve(args.build_number, |c| c.build.build_number, 1234);
    run.crypto = resolver.resolve(crypto, |c| c.build.crypto, CryptoBackend::default());
    run.deployment_target = config
        .build
        .deployment_target
        .clone()
        .unwrap_or(run.deployment_target);
    run.marketing_version = config
        .build
        .marketing_version
        .clone()
        .unwrap_or(run.marketing_version);
    run.jobs = config.build.jobs.unwrap_or_else(host_parallelism).max(1);
    run.minimum_system_version = config.metadata.minimum_system_version.clone();
    run.generator = config.generator_layout();
    run.tools = config.tools.to_tool_paths();
    if let Some(file) = &config.toolchain.toolchain_file {
        run.toolchain_file = root.join(file);
    }
    if let Some(path) = &config.toolchain.module_path {
        run.module_path = root.join(path);
    }

    let platforms = select_platforms(args, &config, registry)?;
    let libraries = resolver.libraries(&args.libraries)?;
    if libraries.is_empty() {
        return Err(ForgeError::Config(format!(
            "no libraries configured; add a [[library]] table to {}",
            CONFIG_FILE_NAME
        ))
        .into());
    }

    Ok(ResolvedBuild {
        run,
        platforms,
        libraries,
        config_path: resolver.config_path,
    })
}

/// Turns `--platform`, Xcode settings or the configured default list into a
/// platform set.
fn select_platforms(
    args: &BuildArgs,
    config: &ForgeConfig,
    registry: &Registry,
) -> Result<PlatformSet> {
    let explicit: &[String] = if !args.platforms.is_empty() {
        &args.platforms
    } else if args.effective_platform_name.is_none() {
        &config.build.platforms
    } else {
        &[]
    };

    let platforms = explicit
        .iter()
        .map(|name| name.parse::<PlatformId>())
        .collect::<Result<Vec<_>, _>>()?;

    let selection = Selection {
        platforms,
        archs: args.archs.clone(),
        effective_platform_name: args.effective_platform_name.clone(),
    };
    Ok(selection.resolve(registry)?)
}

/// Locates `cmake`.
///
/// Order: `--cmake`, then `toolchain.cmake` from the config, then `PATH`,
/// then the Homebrew prefix.
fn locate_cmake(cli: Option<&Path>, configured: Option<&Path>) -> Result<PathBuf> {
    if let Some(explicit) = cli.or(configured) {
        if explicit.is_file() {
            return Ok(explicit.to_path_buf());
        }
        return which::which(explicit).map_err(|_| {
            anyhow::Error::from(ForgeError::Config(format!(
                "cmake not found at {}",
                explicit.display()
            )))
        });
    }

    if let Ok(path) = which::which("cmake") {
        return Ok(path);
    }

    let homebrew = PathBuf::from(HOMEBREW_CMAKE);
    if homebrew.is_file() {
        return Ok(homebrew);
    }

    Err(ForgeError::Config(format!(
        "cmake not found on PATH or at {}. Install it with `brew install cmake` or pass --cmake",
        HOMEBREW_CMAKE
    ))
    .into())
}

fn load_dotenv(root: &Path) {
    let path = root.join(".env.local");
    if dotenvy::from_path(&path).is_ok() {
        log::debug!("Loaded {}", path.display());
    }
}

fn print_summary(summary: &RunSummary) {
    for report in &summary.libraries {
        println!(
            "✓ {} ({} platform{})",
            report.bundle.display(),
            report.packaged.len(),
            if report.packaged.len() == 1 { "" } else { "s" }
        );
        for build in report.builds.iter().filter(|b| !b.succeeded()) {
            println!(
                "  ✗ {} failed during {} ({})",
                build.platform,
                build.step.as_str(),
                build.status
            );
        }
        for platform in &report.missing_symbols {
            println!("  ! {} shipped without debug symbols", platform);
        }
        for platform in &report.unpatched {
            println!("  ! {} kept its original minimum OS version", platform);
        }
    }
}

fn cmd_platforms() {
    let registry = Registry::standard();
    println!(
        "{:<14} {:<20} {:<20} {}",
        "ID", "TOOLCHAIN", "BUILD FOLDER", "MERGED INTO"
    );
    for desc in registry.descriptors() {
        let merged = registry
            .merged_into(desc.id)
            .map(|p| p.primary.to_string())
            .unwrap_or_default();
        println!(
            "{:<14} {:<20} {:<20} {}",
            desc.id.as_str(),
            desc.toolchain_platform,
            desc.build_folder,
            merged
        );
    }
}

fn write_starter_config(root: &Path, force: bool) -> Result<PathBuf> {
    let path = root.join(CONFIG_FILE_NAME);
    if path.exists() && !force {
        bail!(
            "{} already exists. Pass --force to overwrite it",
            path.display()
        );
    }
    fs::create_dir_all(root).with_context(|| format!("Failed to create {:?}", root))?;
    fs::write(&path, ForgeConfig::generate_starter_toml())
        .with_context(|| format!("Failed to write config file: {:?}", path))?;
    Ok(path)
}
