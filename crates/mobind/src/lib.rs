//! # mobind
//!
//! Command-line tool that turns Go packages into native mobile and desktop
//! libraries.
//!
//! ## Quick Start
//!
//! ```bash
//! # Android archive with every architecture
//! mobind bind -o hello.aar example.com/hello
//!
//! # iOS framework for devices and the simulator
//! mobind bind --target ios/arm64,amd64 example.com/hello
//!
//! # Preview the commands of a macOS bind without running them
//! mobind bind -n --target macos example.com/hello
//!
//! # Signed macOS application from a main package
//! mobind build --target macos --team ABCDE12345 example.com/hello/cmd/hello
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `bind` | Build an `.aar` or `.framework` from library packages |
//! | `build` | Build a macOS `.app` from a `main` package |
//! | `init` | Write a starter `mobind.toml` |
//! | `targets` | List platforms and their architectures |
//!
//! ## Global Flags
//!
//! - **`-n` / `--dry-run`** - Print commands without running them
//! - **`-x` / `--echo`** - Print commands as they run
//! - **`-v` / `--verbose`** - Debug logging
//! - **`--work`** - Keep the work directory and print its path
//!
//! ## Modules
//!
//! - [`config`] - Configuration file support for `mobind.toml`

#![cfg_attr(docsrs, feature(doc_cfg))]

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use mobind_sdk::context::DEFAULT_MIN_SDK;
use mobind_sdk::{
    AppContext, AppOptions, BindContext, BindOptions, BindResult, GoBuildFlags, Platform, Shell,
    TargetSpec,
};

use config::{ConfigResolver, MobindConfig};

pub mod config;
mod toolchain;

/// Builds Go packages into Android archives, Apple frameworks and macOS apps.
#[derive(Parser, Debug)]
#[command(name = "mobind", author, version, about = "Go mobile bindings builder", long_about = None)]
struct Cli {
    /// Print the commands but do not run them
    #[arg(short = 'n', long = "dry-run", global = true)]
    dry_run: bool,

    /// Print the commands as they run
    #[arg(short = 'x', long = "echo", global = true)]
    echo: bool,

    /// Print debug logs
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Keep the temporary work directory and print its path
    #[arg(long, global = true)]
    work: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build a library archive or framework from Go packages.
    Bind(BindArgs),
    /// Build a signed macOS application from a main package.
    Build(BuildArgs),
    /// Write a starter config file.
    Init {
        #[arg(long, default_value = config::CONFIG_FILE_NAME)]
        output: PathBuf,
    },
    /// List supported platforms and architectures.
    Targets,
}

/// Flags passed through to `go build`.
#[derive(Args, Debug, Default)]
struct GoFlags {
    /// Force rebuilding of packages that are already up to date
    #[arg(short = 'a', long = "rebuild-all")]
    rebuild_all: bool,
    /// Flags passed to the Go compiler
    #[arg(long, allow_hyphen_values = true)]
    gcflags: Option<String>,
    /// Remove file system paths from the compiled binaries
    #[arg(long)]
    trimpath: bool,
}

impl From<GoFlags> for GoBuildFlags {
    fn from(flags: GoFlags) -> Self {
        GoBuildFlags {
            rebuild_all: flags.rebuild_all,
            gcflags: flags.gcflags,
            trimpath: flags.trimpath,
        }
    }
}

#[derive(Args, Debug, Default)]
struct BindArgs {
    /// Target platform and architectures, e.g. `android` or `ios/arm64,amd64`
    #[arg(long)]
    target: Option<String>,
    /// Output bundle (`<name>.aar` or `<Name>.framework`)
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,
    /// Comma-separated build tags
    #[arg(long, value_delimiter = ',')]
    tags: Vec<String>,
    /// Objective-C name prefix (Apple targets)
    #[arg(long)]
    prefix: Option<String>,
    /// Java package prefix (Android)
    #[arg(long)]
    javapkg: Option<String>,
    /// Classpath for the Java stubs (Android)
    #[arg(long)]
    classpath: Option<String>,
    /// Boot classpath for the Java stubs (Android)
    #[arg(long)]
    bootclasspath: Option<String>,
    /// Flags passed to the Go linker for every architecture
    #[arg(long, allow_hyphen_values = true)]
    ldflags: Option<String>,
    /// Minimum SDK recorded in the AAR manifest
    #[arg(long)]
    min_sdk: Option<u32>,
    #[command(flatten)]
    go: GoFlags,
    /// Import paths to bind (defaults to the current directory)
    packages: Vec<String>,
}

#[derive(Args, Debug, Default)]
struct BuildArgs {
    /// Target descriptor; only `macos[/archs]` is supported
    #[arg(long)]
    target: Option<String>,
    /// Output bundle (`<name>.app`)
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,
    /// Bundle identifier prefix
    #[arg(long)]
    bundleid: Option<String>,
    /// Signing team identifier
    #[arg(long)]
    team: Option<String>,
    /// Comma-separated build tags
    #[arg(long, value_delimiter = ',')]
    tags: Vec<String>,
    /// Extra flags passed to the Go linker
    #[arg(long, allow_hyphen_values = true)]
    ldflags: Option<String>,
    #[command(flatten)]
    go: GoFlags,
    /// The main package to build
    package: String,
}

/// Setup logging based on verbose flag or RUST_LOG environment variable
fn setup_logging(verbose: bool) {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if verbose {
        EnvFilter::new("mobind=debug,mobind_sdk=debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

pub fn run() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        Command::Bind(args) => {
            let resolver = ConfigResolver::new()?;
            if let Some(path) = &resolver.config_path {
                debug!(config = %path.display(), "Loaded config");
            }
            let options = bind_options(args, &resolver)?;
            let platform = options.target.platform();
            let api_level = resolver.android().api_level;
            let toolchain = toolchain::discover(platform, api_level, cli.dry_run)?;

            let work = WorkDir::create(cli.work)?;
            let ctx = BindContext::new(options, toolchain, work.path())
                .context("Invalid bind configuration")?;
            let shell = Shell::system().dry_run(cli.dry_run).echo(cli.echo);
            let result = mobind_sdk::bind(&ctx, &shell);
            work.finish();
            let result = result.context("Bind failed")?;
            report(&result, cli.dry_run);
        }
        Command::Build(args) => {
            let resolver = ConfigResolver::new()?;
            let options = app_options(args, &resolver)?;
            let toolchain =
                toolchain::discover(Platform::Macos, resolver.android().api_level, cli.dry_run)?;

            let work = WorkDir::create(cli.work)?;
            let ctx = AppContext::new(options, toolchain, work.path())
                .context("Invalid build configuration")?;
            let shell = Shell::system().dry_run(cli.dry_run).echo(cli.echo);
            let result = mobind_sdk::build_app(&ctx, &shell);
            work.finish();
            let result = result.context("Build failed")?;
            report(&result, cli.dry_run);
        }
        Command::Init { output } => cmd_init(&output)?,
        Command::Targets => print!("{}", render_targets()),
    }

    Ok(())
}

/// Merges bind flags over the config file.
fn bind_options(args: BindArgs, resolver: &ConfigResolver) -> Result<BindOptions> {
    let descriptor = resolver.resolve_opt(args.target, |c| c.bind.target.clone());
    let target = TargetSpec::parse(descriptor.as_deref()).context("Invalid --target")?;
    let android = resolver.android();

    let mut options = BindOptions::new(target);
    options.packages = args.packages;
    options.output = resolver.resolve_opt(args.output, |c| c.bind.output.clone());
    options.tags = resolver.tags(args.tags);
    options.prefix = resolver.resolve_opt(args.prefix, |c| c.bind.prefix.clone());
    options.ldflags = resolver.resolve_opt(args.ldflags, |c| c.bind.ldflags.clone());
    options.min_sdk = resolver.resolve(args.min_sdk, |c| Some(c.android.min_sdk), DEFAULT_MIN_SDK);
    options.build_flags = args.go.into();

    // Android-only settings from the file must not trip the platform check
    // when the file is shared with Apple binds.
    let is_android = options.target.platform() == Platform::Android;
    let from_file = |value: Option<String>| value.filter(|_| is_android);
    options.java_pkg = args.javapkg.or_else(|| from_file(android.javapkg.clone()));
    options.classpath = args.classpath.or_else(|| from_file(android.classpath.clone()));
    options.bootclasspath = args
        .bootclasspath
        .or_else(|| from_file(android.bootclasspath.clone()));
    Ok(options)
}

/// Merges build flags over the config file.
fn app_options(args: BuildArgs, resolver: &ConfigResolver) -> Result<AppOptions> {
    let descriptor = args.target.unwrap_or_else(|| Platform::Macos.to_string());
    let target = TargetSpec::parse(Some(&descriptor)).context("Invalid --target")?;
    let apple = resolver.apple();

    Ok(AppOptions {
        target,
        package: args.package,
        output: args.output,
        bundle_id: args.bundleid.or(apple.bundle_id),
        team_id: args.team.or(apple.team_id),
        tags: resolver.tags(args.tags),
        ldflags: resolver.resolve_opt(args.ldflags, |c| c.bind.ldflags.clone()),
        build_flags: args.go.into(),
        source_dir: PathBuf::from("."),
    })
}

fn report(result: &BindResult, dry_run: bool) {
    if dry_run {
        return;
    }
    let archs: Vec<&str> = result.archs.iter().map(|a| a.as_str()).collect();
    println!(
        "Wrote {} ({}: {})",
        result.output.display(),
        result.platform,
        archs.join(", ")
    );
    if !result.linked_packages.is_empty() {
        println!("Linked {} Go packages", result.linked_packages.len());
    }
}

fn render_targets() -> String {
    let mut out = String::new();
    for platform in Platform::ALL {
        let archs: Vec<&str> = platform.supported_archs().iter().map(|a| a.as_str()).collect();
        out.push_str(&format!("{:<8} {}\n", platform.as_str(), archs.join(",")));
    }
    out
}

fn cmd_init(output: &Path) -> Result<()> {
    ensure_can_write(output)?;
    fs::write(output, MobindConfig::generate_starter_toml())
        .with_context(|| format!("Failed to write {:?}", output))?;
    println!("Wrote {}", output.display());
    Ok(())
}

fn ensure_can_write(path: &Path) -> Result<()> {
    if path.exists() {
        bail!("refusing to overwrite existing file: {:?}", path);
    }
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating parent directory {:?}", parent))?;
    }
    Ok(())
}

/// Temporary work directory, removed on drop unless `--work` was given.
enum WorkDir {
    Temp(tempfile::TempDir),
    Kept(PathBuf),
}

impl WorkDir {
    fn create(keep: bool) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("mobind-work-")
            .tempdir()
            .context("Failed to create work directory")?;
        if keep {
            let path = dir.keep();
            println!("WORK={}", path.display());
            Ok(Self::Kept(path))
        } else {
            Ok(Self::Temp(dir))
        }
    }

    fn path(&self) -> &Path {
        match self {
            Self::Temp(dir) => dir.path(),
            Self::Kept(path) => path,
        }
    }

    fn finish(self) {
        if let Self::Temp(dir) = self
            && let Err(e) = dir.close()
        {
            debug!(error = %e, "Failed to remove work directory");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use mobind_sdk::Arch;
    use tempfile::TempDir;

    fn resolver_with(config: MobindConfig) -> ConfigResolver {
        ConfigResolver {
            config: Some(config),
            config_path: None,
        }
    }

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_bind_flags() {
        let cli = Cli::try_parse_from([
            "mobind",
            "bind",
            "-n",
            "--target",
            "ios/arm64,amd64",
            "--tags",
            "netgo,purego",
            "--ldflags",
            "-s -w",
            "-o",
            "Hello.framework",
            "example.com/hello",
            "example.com/world",
        ])
        .unwrap();

        assert!(cli.dry_run);
        let Command::Bind(args) = cli.command else {
            panic!("expected bind");
        };
        assert_eq!(args.target.as_deref(), Some("ios/arm64,amd64"));
        assert_eq!(args.tags, ["netgo", "purego"]);
        assert_eq!(args.ldflags.as_deref(), Some("-s -w"));
        assert_eq!(args.packages, ["example.com/hello", "example.com/world"]);
    }

    #[test]
    fn go_build_flags_reach_bind_and_build() {
        let cli = Cli::try_parse_from([
            "mobind",
            "bind",
            "-a",
            "--gcflags",
            "all=-N -l",
            "--trimpath",
            "--target",
            "android",
            "example.com/hello",
        ])
        .unwrap();
        let Command::Bind(args) = cli.command else {
            panic!("expected bind");
        };
        let options = bind_options(args, &ConfigResolver::default()).unwrap();
        assert_eq!(
            options.build_flags,
            GoBuildFlags {
                rebuild_all: true,
                gcflags: Some("all=-N -l".into()),
                trimpath: true,
            }
        );

        let cli = Cli::try_parse_from([
            "mobind",
            "build",
            "--rebuild-all",
            "--trimpath",
            "example.com/hello/cmd/hello",
        ])
        .unwrap();
        let Command::Build(args) = cli.command else {
            panic!("expected build");
        };
        let options = app_options(args, &ConfigResolver::default()).unwrap();
        assert!(options.build_flags.rebuild_all);
        assert!(options.build_flags.trimpath);
        assert_eq!(options.build_flags.gcflags, None);
    }

    #[test]
    fn min_sdk_falls_back_to_default_without_config() {
        let args = BindArgs {
            target: Some("android".into()),
            ..BindArgs::default()
        };
        let options = bind_options(args, &ConfigResolver::default()).unwrap();
        assert_eq!(options.min_sdk, DEFAULT_MIN_SDK);

        let args = BindArgs {
            target: Some("android".into()),
            min_sdk: Some(26),
            ..BindArgs::default()
        };
        let mut config = MobindConfig::default();
        config.android.min_sdk = 24;
        let options = bind_options(args, &resolver_with(config)).unwrap();
        assert_eq!(options.min_sdk, 26);
    }

    #[test]
    fn flags_override_config_file() {
        let mut config = MobindConfig::default();
        config.bind.target = Some("ios".into());
        config.bind.tags = vec!["netgo".into()];
        config.bind.prefix = Some("MB".into());
        let args = BindArgs {
            target: Some("macos/arm64".into()),
            ..BindArgs::default()
        };

        let options = bind_options(args, &resolver_with(config)).unwrap();
        assert_eq!(options.target.platform(), Platform::Macos);
        assert_eq!(options.target.archs(), [Arch::Arm64]);
        assert_eq!(options.tags, ["netgo"]);
        assert_eq!(options.prefix.as_deref(), Some("MB"));
    }

    #[test]
    fn android_file_settings_do_not_leak_into_apple_binds() {
        let mut config = MobindConfig::default();
        config.bind.target = Some("ios".into());
        config.android.javapkg = Some("com.example".into());
        config.android.min_sdk = 24;

        let options = bind_options(BindArgs::default(), &resolver_with(config.clone())).unwrap();
        assert!(options.java_pkg.is_none());

        let args = BindArgs {
            target: Some("android".into()),
            ..BindArgs::default()
        };
        let options = bind_options(args, &resolver_with(config)).unwrap();
        assert_eq!(options.java_pkg.as_deref(), Some("com.example"));
        assert_eq!(options.min_sdk, 24);
    }

    #[test]
    fn bad_target_is_reported() {
        let args = BindArgs {
            target: Some("android/ppc".into()),
            ..BindArgs::default()
        };
        let err = bind_options(args, &ConfigResolver::default()).unwrap_err();
        assert!(err.to_string().contains("--target"));
    }

    #[test]
    fn build_defaults_to_macos_and_config_signing() {
        let mut config = MobindConfig::default();
        config.apple.team_id = Some("ABCDE12345".into());
        config.apple.bundle_id = Some("org.example".into());
        let args = BuildArgs {
            package: "example.com/hello".into(),
            ..BuildArgs::default()
        };

        let options = app_options(args, &resolver_with(config)).unwrap();
        assert_eq!(options.target.platform(), Platform::Macos);
        assert_eq!(options.team_id.as_deref(), Some("ABCDE12345"));
        assert_eq!(options.bundle_id.as_deref(), Some("org.example"));
    }

    #[test]
    fn targets_lists_every_platform() {
        let rendered = render_targets();
        assert!(rendered.contains("android  arm,arm64,386,amd64"));
        assert!(rendered.contains("ios      arm64,amd64"));
        assert!(rendered.contains("macos    arm64,amd64"));
    }

    #[test]
    fn init_refuses_to_overwrite() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("mobind.toml");
        cmd_init(&path).unwrap();
        assert!(fs::read_to_string(&path).unwrap().contains("[bind]"));
        assert!(cmd_init(&path).is_err());
    }
}
