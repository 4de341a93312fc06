//! Bind and build pipelines.
//!
//! A bind runs the same stages for every platform:
//!
//! 1. **Package loading** - resolve import paths, rejecting `main` packages
//! 2. **Binding generation** - run `gobind` into the work directory
//! 3. **Dependency manifest** - write `go.mod` for the generated tree
//! 4. **Cross compilation** - one binary per architecture, in declared order
//! 5. **Packaging** - `lipo` plus a framework bundle (Apple) or an AAR (Android)
//!
//! ## Builders
//!
//! | Module | Platform | Output |
//! |--------|----------|--------|
//! | [`apple`] | iOS, macOS | `<Title>.framework` |
//! | [`android`] | Android | `<name>.aar` and `<name>-sources.jar` |
//! | [`app`] | macOS | `<name>.app` from a `main` package |
//!
//! ## Example
//!
//! ```ignore
//! use mobind_sdk::builders::{self, Shell};
//! use mobind_sdk::{BindContext, BindOptions, TargetSpec, Toolchain};
//!
//! let target = TargetSpec::parse(Some("ios/arm64,amd64"))?;
//! let mut options = BindOptions::new(target);
//! options.packages = vec!["example.com/hello".into()];
//! let ctx = BindContext::new(options, Toolchain::default(), "/tmp/mobind-work")?;
//!
//! let shell = Shell::system().dry_run(true); // Preview only
//! let result = builders::bind(&ctx, &shell)?;
//! println!("{}", result.output.display());
//! # Ok::<(), mobind_sdk::BindError>(())
//! ```

pub mod android;
pub mod app;
pub mod apple;
pub mod common;
pub mod compile;
pub mod env;
pub mod framework;
pub mod gobind;
pub mod lipo;

use tracing::{info, instrument};

use crate::context::BindContext;
use crate::modfile;
use crate::packages::load_packages;
use crate::types::{BindError, BindResult, Platform};

pub use app::build_app;
pub use common::{CommandKind, CommandOutput, CommandRunner, CommandSpec, ProcessError, Shell, SystemRunner};
pub use compile::{ArchitectureArtifact, CrossCompiler, GoBuildFlags, SymbolExtraction};
pub use env::{AndroidNdk, AppleSdks, BuildEnvironment, Toolchain};

/// Runs a full bind described by `ctx`.
///
/// Fails fast: the first failing stage aborts the rest, and whatever it left
/// in the work directory stays there.
#[instrument(skip_all, fields(target = %ctx.target()))]
pub fn bind(ctx: &BindContext, shell: &Shell) -> Result<BindResult, BindError> {
    let platform = ctx.platform();
    let toolchain = ctx.toolchain();
    let source_dir = &ctx.options().source_dir;

    // Step 1: Load packages
    let packages = load_packages(
        shell,
        toolchain,
        source_dir,
        ctx.packages(),
        platform,
        ctx.tags(),
    )?;
    info!(count = packages.len(), "Loaded packages");

    // Step 2: Generate bindings
    let generated = gobind::generate(ctx, shell, &packages)?;

    // Step 3: Dependency manifest for the generated tree
    let first_arch = ctx.target().archs()[0];
    let manifest =
        modfile::build_manifest(shell, toolchain, source_dir, platform, first_arch, ctx.tags())?;
    if let Some(manifest) = &manifest {
        modfile::write_manifest(shell, &generated.src_dir(), manifest)?;
    }
    let tidy = manifest.is_some();

    // Steps 4-5: Compile, merge and package
    match platform {
        Platform::Android => android::bind(ctx, shell, &packages, &generated, tidy),
        Platform::Ios | Platform::Macos => apple::bind(ctx, shell, &packages, &generated, tidy),
    }
}
