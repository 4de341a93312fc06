//! Immutable build contexts.
//!
//! A context is validated once, before any package is loaded or any file is
//! written, and then passed by reference to every stage. Stages only read it.

use std::path::{Path, PathBuf};

use crate::builders::common::title_case;
use crate::builders::compile::{GoBuildFlags, SymbolExtraction};
use crate::builders::env::Toolchain;
use crate::target::TargetSpec;
use crate::types::{BindError, Platform};

/// Default minimum SDK written to the AAR manifest.
pub const DEFAULT_MIN_SDK: u32 = 21;

/// User-facing options for a bind.
#[derive(Debug, Clone)]
pub struct BindOptions {
    /// Platform and architectures.
    pub target: TargetSpec,
    /// Import paths to bind. Empty binds the current directory.
    pub packages: Vec<String>,
    /// Output bundle path; derived from the first package when `None`.
    pub output: Option<PathBuf>,
    /// Extra build tags.
    pub tags: Vec<String>,
    /// Objective-C name prefix (Apple only).
    pub prefix: Option<String>,
    /// Java package prefix (Android only).
    pub java_pkg: Option<String>,
    /// Classpath for reverse bindings (Android only).
    pub classpath: Option<String>,
    /// Boot classpath for reverse bindings (Android only).
    pub bootclasspath: Option<String>,
    /// Link-time flags forwarded to every compile.
    pub ldflags: Option<String>,
    /// `-a`, `-gcflags` and `-trimpath`.
    pub build_flags: GoBuildFlags,
    /// Minimum SDK recorded in the AAR manifest.
    pub min_sdk: u32,
    /// Directory the Go commands run in.
    pub source_dir: PathBuf,
    /// Which architecture's binary is scanned for linked packages.
    pub symbols: SymbolExtraction,
}

impl BindOptions {
    /// Options for `target` with every other field defaulted.
    pub fn new(target: TargetSpec) -> Self {
        Self {
            target,
            packages: Vec::new(),
            output: None,
            tags: Vec::new(),
            prefix: None,
            java_pkg: None,
            classpath: None,
            bootclasspath: None,
            ldflags: None,
            build_flags: GoBuildFlags::default(),
            min_sdk: DEFAULT_MIN_SDK,
            source_dir: PathBuf::from("."),
            symbols: SymbolExtraction::FirstDeclared,
        }
    }
}

/// A validated bind invocation.
#[derive(Debug, Clone)]
pub struct BindContext {
    options: BindOptions,
    toolchain: Toolchain,
    work_dir: PathBuf,
}

impl BindContext {
    /// Validates `options` against the toolchain.
    ///
    /// # Errors
    ///
    /// Returns [`BindError::Config`] when a flag does not apply to the target
    /// platform, the output suffix is wrong, or the toolchain lacks something
    /// the target needs.
    pub fn new(
        mut options: BindOptions,
        toolchain: Toolchain,
        work_dir: impl Into<PathBuf>,
    ) -> Result<Self, BindError> {
        let platform = options.target.platform();

        if options.java_pkg.is_some() && platform != Platform::Android {
            return Err(BindError::Config(format!(
                "-javapkg is supported only for android target, got {}",
                platform
            )));
        }
        if options.prefix.is_some() && !platform.is_apple() {
            return Err(BindError::Config(format!(
                "-prefix is supported only for Apple targets, got {}",
                platform
            )));
        }
        if let Some(output) = &options.output {
            check_suffix(output, platform.bind_output_suffix(), platform)?;
        }
        toolchain.check(platform, options.target.archs())?;

        if options.packages.is_empty() {
            options.packages.push(".".to_string());
        }
        if let Some(tag) = platform.implied_tag() {
            if !options.tags.iter().any(|t| t == tag) {
                options.tags.push(tag.to_string());
            }
        }

        Ok(Self {
            options,
            toolchain,
            work_dir: work_dir.into(),
        })
    }

    /// Target platform and architectures.
    pub fn target(&self) -> &TargetSpec {
        &self.options.target
    }

    /// Target platform.
    pub fn platform(&self) -> Platform {
        self.options.target.platform()
    }

    /// Import paths to bind, never empty.
    pub fn packages(&self) -> &[String] {
        &self.options.packages
    }

    /// Build tags, including the platform's implied tag.
    pub fn tags(&self) -> &[String] {
        &self.options.tags
    }

    /// Objective-C name prefix, empty when unset.
    pub fn prefix(&self) -> &str {
        self.options.prefix.as_deref().unwrap_or("")
    }

    /// Options that only apply to a single platform.
    pub fn options(&self) -> &BindOptions {
        &self.options
    }

    /// Toolchain locations.
    pub fn toolchain(&self) -> &Toolchain {
        &self.toolchain
    }

    /// Private working directory for generated sources and intermediates.
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Resolves the output path given the first bound package's name.
    pub fn output_path(&self, first_package: &str) -> PathBuf {
        match &self.options.output {
            Some(path) => path.clone(),
            None => match self.platform() {
                Platform::Android => PathBuf::from(format!("{}.aar", first_package)),
                Platform::Ios | Platform::Macos => {
                    PathBuf::from(format!("{}.framework", title_case(first_package)))
                }
            },
        }
    }
}

/// User-facing options for a macOS application build.
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Must be a macos target.
    pub target: TargetSpec,
    /// The single executable package.
    pub package: String,
    /// Output `.app` path; derived from the package when `None`.
    pub output: Option<PathBuf>,
    /// Bundle identifier prefix.
    pub bundle_id: Option<String>,
    /// Code signing team.
    pub team_id: Option<String>,
    /// Extra build tags.
    pub tags: Vec<String>,
    /// Link-time flags appended after `-w`.
    pub ldflags: Option<String>,
    pub build_flags: GoBuildFlags,
    /// Directory the Go commands run in.
    pub source_dir: PathBuf,
}

/// A validated application build.
#[derive(Debug, Clone)]
pub struct AppContext {
    options: AppOptions,
    toolchain: Toolchain,
    work_dir: PathBuf,
}

impl AppContext {
    /// Validates `options` against the toolchain.
    pub fn new(
        options: AppOptions,
        toolchain: Toolchain,
        work_dir: impl Into<PathBuf>,
    ) -> Result<Self, BindError> {
        let platform = options.target.platform();
        if platform != Platform::Macos {
            return Err(BindError::Config(format!(
                "app builds are supported only for macos, got {}",
                platform
            )));
        }
        if let Some(output) = &options.output {
            check_suffix(output, ".app", platform)?;
        }
        toolchain.check(platform, options.target.archs())?;
        Ok(Self {
            options,
            toolchain,
            work_dir: work_dir.into(),
        })
    }

    /// Target architectures.
    pub fn target(&self) -> &TargetSpec {
        &self.options.target
    }

    /// Options as given.
    pub fn options(&self) -> &AppOptions {
        &self.options
    }

    /// Toolchain locations.
    pub fn toolchain(&self) -> &Toolchain {
        &self.toolchain
    }

    /// Private working directory.
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Resolves the output path given the package name.
    pub fn output_path(&self, package_name: &str) -> PathBuf {
        self.options
            .output
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("{}.app", package_name)))
    }
}

fn check_suffix(output: &Path, suffix: &str, platform: Platform) -> Result<(), BindError> {
    let name = output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if name.len() <= suffix.len() || !name.ends_with(suffix) {
        return Err(BindError::Config(format!(
            "output file name {:?} does not end in '{}' (required for {})",
            output, suffix, platform
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::env::tests::fake_toolchain;

    fn ctx(options: BindOptions) -> Result<BindContext, BindError> {
        BindContext::new(options, fake_toolchain(), "/work")
    }

    #[test]
    fn test_defaults_bind_current_directory() {
        let ctx = ctx(BindOptions::new(TargetSpec::parse(None).unwrap())).unwrap();
        assert_eq!(ctx.packages(), &[".".to_string()]);
        assert_eq!(ctx.output_path("hello"), PathBuf::from("hello.aar"));
    }

    #[test]
    fn test_apple_default_output_is_title_cased() {
        let ctx = ctx(BindOptions::new(TargetSpec::parse(Some("ios")).unwrap())).unwrap();
        assert_eq!(ctx.output_path("hello"), PathBuf::from("Hello.framework"));
        assert_eq!(ctx.tags(), &["ios".to_string()]);
    }

    #[test]
    fn test_platform_specific_flags_are_rejected() {
        let mut opts = BindOptions::new(TargetSpec::parse(Some("ios")).unwrap());
        opts.java_pkg = Some("com.example".into());
        assert!(matches!(ctx(opts), Err(BindError::Config(_))));

        let mut opts = BindOptions::new(TargetSpec::parse(Some("android")).unwrap());
        opts.prefix = Some("MB".into());
        assert!(matches!(ctx(opts), Err(BindError::Config(_))));
    }

    #[test]
    fn test_output_suffix_must_match_platform() {
        let mut opts = BindOptions::new(TargetSpec::parse(Some("macos")).unwrap());
        opts.output = Some(PathBuf::from("out/Hello.aar"));
        let err = ctx(opts).unwrap_err();
        assert!(err.to_string().contains(".framework"));

        let mut opts = BindOptions::new(TargetSpec::parse(Some("android")).unwrap());
        opts.output = Some(PathBuf::from(".aar"));
        assert!(ctx(opts).is_err());
    }

    #[test]
    fn test_app_context_requires_macos() {
        let opts = AppOptions {
            target: TargetSpec::parse(Some("ios")).unwrap(),
            package: "example.com/app".into(),
            output: None,
            bundle_id: None,
            team_id: None,
            tags: Vec::new(),
            ldflags: None,
            build_flags: GoBuildFlags::default(),
            source_dir: PathBuf::from("."),
        };
        assert!(AppContext::new(opts, fake_toolchain(), "/work").is_err());
    }
}
