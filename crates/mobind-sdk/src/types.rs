//! Core types for mobind-sdk.
//!
//! This module defines the fundamental types used throughout the SDK:
//!
//! - [`BindError`] - Error taxonomy for every pipeline stage
//! - [`Platform`] - Target platform selection (Android, iOS, macOS)
//! - [`Arch`] - Target instruction-set architecture
//! - [`BindResult`] - Output from a bind or app build

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use crate::builders::common::ProcessError;

/// Error types for mobind-sdk operations.
///
/// Each variant maps to one pipeline stage so that a failure names the stage
/// that produced it and, for compilation, the architecture being built.
///
/// # Example
///
/// ```ignore
/// match mobind_sdk::bind(&ctx, &shell) {
///     Ok(result) => println!("Wrote {:?}", result.output),
///     Err(BindError::Compile { arch, .. }) => eprintln!("{} failed to compile", arch),
///     Err(e) => eprintln!("{}", e),
/// }
/// ```
#[derive(Debug, thiserror::Error)]
pub enum BindError {
    /// Invalid target, flag combination or missing toolchain value.
    ///
    /// Raised before any package is loaded or any file is written.
    #[error("configuration error: {0}")]
    Config(String),

    /// The package loader reported diagnostics for one of the import paths.
    #[error("package load failed: {0}")]
    PackageLoad(String),

    /// An executable (`main`) package was passed to bind.
    #[error("binding 'main' package ({0}) is not supported")]
    UnsupportedPackageKind(String),

    /// The binding generator failed; its diagnostics are carried verbatim.
    #[error("binding generation failed: {0}")]
    Generation(#[source] ProcessError),

    /// Cross-compilation failed for one architecture.
    #[error("{platform}-{arch}: {source}")]
    Compile {
        /// Platform being built.
        platform: Platform,
        /// Architecture whose compile failed.
        arch: Arch,
        /// Underlying compiler failure.
        #[source]
        source: ProcessError,
    },

    /// The binary-combination tool failed.
    #[error("merging architecture binaries failed: {0}")]
    Merge(#[source] ProcessError),

    /// Bundle construction failed (filesystem layout, metadata, packing).
    #[error("bundle assembly failed: {0}")]
    Assembly(String),

    /// An I/O error occurred outside of a more specific stage.
    #[error("I/O error: {0}. Check file paths and permissions")]
    Io(#[from] std::io::Error),

    /// JSON decoding of tool output failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BindError {
    /// Returns the architecture tag for compile failures.
    pub fn arch(&self) -> Option<Arch> {
        match self {
            BindError::Compile { arch, .. } => Some(*arch),
            _ => None,
        }
    }
}

/// Target platform for a bind.
///
/// # Example
///
/// ```
/// use mobind_sdk::Platform;
///
/// assert_eq!(Platform::Ios.goos(), "darwin");
/// assert_eq!(Platform::Android.as_str(), "android");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Platform {
    /// Android: per-ABI shared libraries packed into an AAR.
    Android,
    /// iOS: static framework with a multi-architecture archive.
    Ios,
    /// macOS: static framework, or an application bundle for `build`.
    Macos,
}

impl Platform {
    /// Every platform, in the order they are listed to users.
    pub const ALL: [Platform; 3] = [Platform::Android, Platform::Ios, Platform::Macos];

    /// Returns the string representation of the platform.
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Android => "android",
            Platform::Ios => "ios",
            Platform::Macos => "macos",
        }
    }

    /// Parses a platform name.
    pub fn parse(name: &str) -> Option<Platform> {
        Platform::ALL.into_iter().find(|p| p.as_str() == name)
    }

    /// Kernel family handed to the Go toolchain as `GOOS`.
    pub fn goos(&self) -> &'static str {
        match self {
            Platform::Android => "android",
            Platform::Ios | Platform::Macos => "darwin",
        }
    }

    /// Architectures the platform can be built for. Also the default set.
    pub fn supported_archs(&self) -> &'static [Arch] {
        match self {
            Platform::Android => &[Arch::Arm, Arch::Arm64, Arch::X86, Arch::Amd64],
            Platform::Ios | Platform::Macos => &[Arch::Arm64, Arch::Amd64],
        }
    }

    /// Build tag implied by the platform, if any.
    ///
    /// iOS shares `GOOS=darwin` with macOS, so code that must know it runs on
    /// the restricted mobile runtime keys off the `ios` tag.
    pub fn implied_tag(&self) -> Option<&'static str> {
        match self {
            Platform::Ios => Some("ios"),
            _ => None,
        }
    }

    /// Whether the platform produces an Apple framework bundle.
    pub fn is_apple(&self) -> bool {
        matches!(self, Platform::Ios | Platform::Macos)
    }

    /// Language paired with Go when generating bindings.
    pub fn binding_language(&self) -> &'static str {
        match self {
            Platform::Android => "java",
            Platform::Ios | Platform::Macos => "objc",
        }
    }

    /// File suffix the output must carry.
    pub fn bind_output_suffix(&self) -> &'static str {
        match self {
            Platform::Android => ".aar",
            Platform::Ios | Platform::Macos => ".framework",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Instruction-set architecture, named the way the Go toolchain names it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Arch {
    /// 32-bit ARM (`GOARCH=arm`, built as ARMv7).
    Arm,
    /// 64-bit ARM.
    Arm64,
    /// 32-bit x86 (`GOARCH=386`).
    X86,
    /// 64-bit x86.
    Amd64,
}

impl Arch {
    /// Go architecture name (`GOARCH`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Arch::Arm => "arm",
            Arch::Arm64 => "arm64",
            Arch::X86 => "386",
            Arch::Amd64 => "amd64",
        }
    }

    /// Parses a Go architecture name.
    pub fn parse(name: &str) -> Option<Arch> {
        match name {
            "arm" => Some(Arch::Arm),
            "arm64" => Some(Arch::Arm64),
            "386" => Some(Arch::X86),
            "amd64" => Some(Arch::Amd64),
            _ => None,
        }
    }

    /// Architecture name understood by clang and `lipo -arch`.
    pub fn clang_arch(&self) -> &'static str {
        match self {
            Arch::Arm => "armv7",
            Arch::Arm64 => "arm64",
            Arch::X86 => "i386",
            Arch::Amd64 => "x86_64",
        }
    }

    /// Android ABI directory name used under `jni/`.
    pub fn android_abi(&self) -> &'static str {
        match self {
            Arch::Arm => "armeabi-v7a",
            Arch::Arm64 => "arm64-v8a",
            Arch::X86 => "x86",
            Arch::Amd64 => "x86_64",
        }
    }

    /// Clang target triple prefix for the Android NDK toolchain.
    pub fn android_triple(&self) -> &'static str {
        match self {
            Arch::Arm => "armv7a-linux-androideabi",
            Arch::Arm64 => "aarch64-linux-android",
            Arch::X86 => "i686-linux-android",
            Arch::Amd64 => "x86_64-linux-android",
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a successful bind or app build.
#[derive(Debug, Clone)]
pub struct BindResult {
    /// Platform that was built.
    pub platform: Platform,
    /// Path to the produced bundle (`.framework`, `.aar` or `.app`).
    pub output: PathBuf,
    /// Architectures contained in the output, in build order.
    pub archs: Vec<Arch>,
    /// Packages linked into the designated architecture's binary.
    ///
    /// Empty when symbol extraction is disabled or during a dry run.
    pub linked_packages: BTreeSet<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_round_trip_names() {
        for platform in Platform::ALL {
            assert_eq!(Platform::parse(platform.as_str()), Some(platform));
        }
        assert_eq!(Platform::parse("windows"), None);
    }

    #[test]
    fn test_apple_platforms_share_kernel_family() {
        assert_eq!(Platform::Ios.goos(), Platform::Macos.goos());
        assert_eq!(Platform::Android.goos(), "android");
    }

    #[test]
    fn test_only_ios_implies_tag() {
        assert_eq!(Platform::Ios.implied_tag(), Some("ios"));
        assert_eq!(Platform::Macos.implied_tag(), None);
        assert_eq!(Platform::Android.implied_tag(), None);
    }

    #[test]
    fn test_arch_names() {
        assert_eq!(Arch::parse("386"), Some(Arch::X86));
        assert_eq!(Arch::X86.clang_arch(), "i386");
        assert_eq!(Arch::Amd64.clang_arch(), "x86_64");
        assert_eq!(Arch::Arm.android_abi(), "armeabi-v7a");
        assert_eq!(Arch::parse("mips"), None);
    }

    #[test]
    fn test_compile_error_carries_arch() {
        let err = BindError::Compile {
            platform: Platform::Macos,
            arch: Arch::Amd64,
            source: ProcessError::failed("go build", Some(2), "", "undefined: Foo"),
        };
        assert_eq!(err.arch(), Some(Arch::Amd64));
        let msg = err.to_string();
        assert!(msg.starts_with("macos-amd64:"));
        assert!(msg.contains("undefined: Foo"));
    }
}
