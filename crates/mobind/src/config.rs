//! Configuration file support for mobind.
//!
//! A `mobind.toml` persists bind settings so they need not be passed on every
//! invocation. CLI flags always take precedence over file values.
//!
//! ## Configuration File Location
//!
//! The file is searched for in the following order:
//! 1. Current working directory (`./mobind.toml`)
//! 2. Parent directories, up to the repository root or filesystem root
//!
//! ## Example Configuration
//!
//! ```toml
//! [bind]
//! target = "ios/arm64,amd64"
//! tags = ["netgo"]
//! prefix = "MB"
//! output = "Mobile.framework"
//! ldflags = "-s -w"
//!
//! [android]
//! javapkg = "com.example"
//! min_sdk = 21
//! api_level = 21
//!
//! [apple]
//! bundle_id = "org.example"
//! team_id = "ABCDE12345"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use mobind_sdk::builders::env::DEFAULT_ANDROID_API;
use mobind_sdk::context::DEFAULT_MIN_SDK;

/// The default configuration file name.
pub const CONFIG_FILE_NAME: &str = "mobind.toml";

/// Root configuration structure for `mobind.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MobindConfig {
    /// Settings shared by every bind.
    pub bind: BindConfig,

    /// Android-specific configuration.
    pub android: AndroidConfig,

    /// Apple-specific configuration.
    pub apple: AppleConfig,
}

/// Settings shared by every bind.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BindConfig {
    /// Target descriptor such as `android` or `ios/arm64,amd64`.
    pub target: Option<String>,

    /// Build tags passed to every Go invocation.
    pub tags: Vec<String>,

    /// Objective-C name prefix. Apple targets only.
    pub prefix: Option<String>,

    /// Output bundle path.
    pub output: Option<PathBuf>,

    /// Extra linker flags for every architecture compile.
    pub ldflags: Option<String>,
}

/// Android-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AndroidConfig {
    /// Java package prefix for the generated classes.
    pub javapkg: Option<String>,

    /// Minimum SDK written to the AAR manifest.
    ///
    /// Defaults to 21.
    pub min_sdk: u32,

    /// API level of the NDK clang wrappers.
    ///
    /// Defaults to 21.
    pub api_level: u32,

    /// Classpath used when compiling the Java stubs.
    pub classpath: Option<String>,

    /// Boot classpath; defaults to the platform's `android.jar`.
    pub bootclasspath: Option<String>,
}

impl Default for AndroidConfig {
    fn default() -> Self {
        Self {
            javapkg: None,
            min_sdk: DEFAULT_MIN_SDK,
            api_level: DEFAULT_ANDROID_API,
            classpath: None,
            bootclasspath: None,
        }
    }
}

/// Apple-specific configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppleConfig {
    /// Bundle identifier prefix for app builds.
    pub bundle_id: Option<String>,

    /// Development team used to sign app builds.
    pub team_id: Option<String>,
}

impl MobindConfig {
    /// Loads configuration from `path`.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: MobindConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        Ok(config)
    }

    /// Finds and loads configuration from the current directory or a parent.
    pub fn discover() -> Result<Option<(Self, PathBuf)>> {
        let cwd = std::env::current_dir().context("Failed to get current directory")?;
        Self::discover_from(&cwd)
    }

    /// Finds and loads configuration starting from `start_dir`.
    ///
    /// # Returns
    ///
    /// * `Ok(Some((config, path)))` - Found and loaded configuration with its path
    /// * `Ok(None)` - No configuration file found
    /// * `Err` - If a config file was found but couldn't be parsed
    pub fn discover_from(start_dir: &Path) -> Result<Option<(Self, PathBuf)>> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(CONFIG_FILE_NAME);

            if config_path.is_file() {
                let config = Self::load_from_file(&config_path)?;
                return Ok(Some((config, config_path)));
            }

            // Stop at repository root or filesystem root
            if current.join(".git").exists() || !current.pop() {
                break;
            }
        }

        Ok(None)
    }

    /// A commented starter file for `mobind init`.
    pub fn generate_starter_toml() -> String {
        format!(
            r#"# mobind configuration file
# CLI flags override these settings when provided.

[bind]
# Target platform and optional architectures: android, ios, macos,
# or e.g. "ios/arm64,amd64". Defaults to android with every architecture.
# target = "android"

# Build tags passed to go list, gobind and go build
# tags = []

# Objective-C name prefix (Apple targets only)
# prefix = ""

# Output bundle (<name>.aar or <Name>.framework by default)
# output = "Mobile.framework"

# Extra linker flags forwarded to every architecture compile
# ldflags = "-s -w"

[android]
# Java package prefix for generated classes
# javapkg = "com.example"

# Minimum SDK recorded in the AAR manifest
min_sdk = {min_sdk}

# API level of the NDK compiler wrappers
api_level = {api_level}

# classpath = ""
# bootclasspath = ""

[apple]
# Bundle identifier prefix for `mobind build`
# bundle_id = "org.example"

# Development team used to sign `mobind build` output
# team_id = "YOUR_TEAM_ID"
"#,
            min_sdk = DEFAULT_MIN_SDK,
            api_level = DEFAULT_ANDROID_API,
        )
    }
}

/// Merges config file values with CLI arguments.
///
/// CLI arguments always take precedence over config file values.
#[derive(Debug, Default)]
pub struct ConfigResolver {
    /// Loaded configuration, if any.
    pub config: Option<MobindConfig>,

    /// Path to the loaded config file, if any.
    pub config_path: Option<PathBuf>,
}

impl ConfigResolver {
    /// Discovers and loads configuration from the current directory upward.
    pub fn new() -> Result<Self> {
        match MobindConfig::discover()? {
            Some((config, path)) => Ok(Self {
                config: Some(config),
                config_path: Some(path),
            }),
            None => Ok(Self::default()),
        }
    }

    /// Resolves a CLI value, using config as fallback.
    pub fn resolve<T, F>(&self, cli_value: Option<T>, config_getter: F, default: T) -> T
    where
        F: FnOnce(&MobindConfig) -> Option<T>,
    {
        cli_value
            .or_else(|| self.config.as_ref().and_then(config_getter))
            .unwrap_or(default)
    }

    /// Like [`resolve`](Self::resolve) for values without a default.
    pub fn resolve_opt<T, F>(&self, cli_value: Option<T>, config_getter: F) -> Option<T>
    where
        F: FnOnce(&MobindConfig) -> Option<T>,
    {
        cli_value.or_else(|| self.config.as_ref().and_then(config_getter))
    }

    /// Build tags: CLI tags when any were given, otherwise the file's.
    pub fn tags(&self, cli_tags: Vec<String>) -> Vec<String> {
        if !cli_tags.is_empty() {
            return cli_tags;
        }
        self.config
            .as_ref()
            .map(|c| c.bind.tags.clone())
            .unwrap_or_default()
    }

    /// Returns the Android configuration.
    pub fn android(&self) -> AndroidConfig {
        self.config
            .as_ref()
            .map(|c| c.android.clone())
            .unwrap_or_default()
    }

    /// Returns the Apple configuration.
    pub fn apple(&self) -> AppleConfig {
        self.config
            .as_ref()
            .map(|c| c.apple.clone())
            .unwrap_or_default()
    }
}
