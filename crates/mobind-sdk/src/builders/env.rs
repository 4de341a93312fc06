//! Toolchain locations and per-architecture build environments.
//!
//! Discovering where the toolchain lives is the caller's job; this module only
//! consumes a [`Toolchain`] value and derives one [`BuildEnvironment`] per
//! architecture from it. Every environment is built from scratch, so nothing
//! set for one architecture can leak into the next.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::types::{Arch, BindError, Platform};

/// Minimum iOS version passed to clang.
pub const IOS_MIN_VERSION: &str = "13.0";

/// Minimum macOS version passed to clang.
pub const MACOS_MIN_VERSION: &str = "10.14";

/// Default Android API level for the NDK clang wrappers.
pub const DEFAULT_ANDROID_API: u32 = 21;

/// Paths to the external tools the pipeline drives.
#[derive(Debug, Clone)]
pub struct Toolchain {
    /// The `go` command.
    pub go: PathBuf,
    /// The `gobind` generator.
    pub gobind: PathBuf,
    /// The host `GOPATH`, appended after the work directory for reverse bindings.
    pub host_gopath: Option<String>,
    /// Apple SDKs and compilers, required for ios and macos.
    pub apple: Option<AppleSdks>,
    /// Android NDK, required for android.
    pub android: Option<AndroidNdk>,
}

impl Default for Toolchain {
    fn default() -> Self {
        Self {
            go: PathBuf::from("go"),
            gobind: PathBuf::from("gobind"),
            host_gopath: None,
            apple: None,
            android: None,
        }
    }
}

/// Apple compiler and SDK roots as reported by `xcrun`.
#[derive(Debug, Clone)]
pub struct AppleSdks {
    /// C compiler driver.
    pub clang: PathBuf,
    /// C++ compiler driver.
    pub clangxx: PathBuf,
    /// `iphoneos` SDK root.
    pub iphoneos: Option<PathBuf>,
    /// `iphonesimulator` SDK root.
    pub iphonesimulator: Option<PathBuf>,
    /// `macosx` SDK root.
    pub macosx: Option<PathBuf>,
}

impl AppleSdks {
    /// SDK name used for a platform/arch pair.
    pub fn sdk_name(platform: Platform, arch: Arch) -> &'static str {
        match (platform, arch) {
            (Platform::Ios, Arch::Arm64) => "iphoneos",
            (Platform::Ios, _) => "iphonesimulator",
            _ => "macosx",
        }
    }

    fn sdk_root(&self, platform: Platform, arch: Arch) -> Option<&Path> {
        match Self::sdk_name(platform, arch) {
            "iphoneos" => self.iphoneos.as_deref(),
            "iphonesimulator" => self.iphonesimulator.as_deref(),
            _ => self.macosx.as_deref(),
        }
    }
}

/// An installed Android NDK.
#[derive(Debug, Clone)]
pub struct AndroidNdk {
    /// NDK root directory.
    pub ndk_root: PathBuf,
    /// Prebuilt host directory name, e.g. `linux-x86_64`.
    pub host_tag: String,
    /// API level baked into the clang wrapper names.
    pub api_level: u32,
    /// `android.jar` used as the boot classpath for `javac`.
    pub android_jar: Option<PathBuf>,
}

impl AndroidNdk {
    fn bin_dir(&self) -> PathBuf {
        self.ndk_root
            .join("toolchains/llvm/prebuilt")
            .join(&self.host_tag)
            .join("bin")
    }

    /// The API-level specific clang wrapper for `arch`.
    pub fn clang(&self, arch: Arch) -> PathBuf {
        self.bin_dir()
            .join(format!("{}{}-clang", arch.android_triple(), self.api_level))
    }

    /// The API-level specific clang++ wrapper for `arch`.
    pub fn clangxx(&self, arch: Arch) -> PathBuf {
        self.bin_dir()
            .join(format!("{}{}-clang++", arch.android_triple(), self.api_level))
    }

    /// The NDK's symbol lister.
    pub fn nm(&self) -> PathBuf {
        self.bin_dir().join("llvm-nm")
    }
}

impl Toolchain {
    /// Checks that every value `platform` needs for `archs` is present.
    ///
    /// # Errors
    ///
    /// Returns [`BindError::Config`] naming the first missing piece.
    pub fn check(&self, platform: Platform, archs: &[Arch]) -> Result<(), BindError> {
        match platform {
            Platform::Android => {
                if self.android.is_none() {
                    return Err(BindError::Config(
                        "no Android NDK configured; set ANDROID_NDK_HOME or ANDROID_HOME".into(),
                    ));
                }
            }
            Platform::Ios | Platform::Macos => {
                let sdks = self.apple.as_ref().ok_or_else(|| {
                    BindError::Config(format!(
                        "-target={} requires Xcode command line tools",
                        platform
                    ))
                })?;
                for arch in archs {
                    if sdks.sdk_root(platform, *arch).is_none() {
                        return Err(BindError::Config(format!(
                            "{} SDK not found (needed for {}/{})",
                            AppleSdks::sdk_name(platform, *arch),
                            platform,
                            arch
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// The symbol lister for binaries built for `platform`.
    pub fn nm(&self, platform: Platform) -> PathBuf {
        match (&self.android, platform) {
            (Some(ndk), Platform::Android) => ndk.nm(),
            _ => PathBuf::from("nm"),
        }
    }
}

/// Environment overrides for one compile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildEnvironment {
    platform: Platform,
    arch: Arch,
    vars: BTreeMap<String, String>,
}

impl BuildEnvironment {
    /// Derives a fresh environment for `platform`/`arch`.
    ///
    /// With a `reverse_root`, that directory is placed first on `GOPATH` so
    /// reverse-binding packages generated there resolve before the host's.
    /// Without one, `GOPATH` is inherited from the host and the module cache
    /// stays where it is.
    pub fn new(
        toolchain: &Toolchain,
        platform: Platform,
        arch: Arch,
        reverse_root: Option<&Path>,
    ) -> Result<Self, BindError> {
        let mut vars = match platform {
            Platform::Android => android_template(toolchain, arch)?,
            Platform::Ios | Platform::Macos => apple_template(toolchain, platform, arch)?,
        };
        if let Some(root) = reverse_root {
            vars.insert("GOPATH".into(), gopath(root, toolchain.host_gopath.as_deref()));
        }
        vars.insert("CGO_ENABLED".into(), "1".into());
        Ok(Self {
            platform,
            arch,
            vars,
        })
    }

    /// Platform the environment targets.
    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Architecture the environment targets.
    pub fn arch(&self) -> Arch {
        self.arch
    }

    /// All variables.
    pub fn vars(&self) -> &BTreeMap<String, String> {
        &self.vars
    }

    /// Looks up one variable.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }
}

fn android_template(
    toolchain: &Toolchain,
    arch: Arch,
) -> Result<BTreeMap<String, String>, BindError> {
    let ndk = toolchain
        .android
        .as_ref()
        .ok_or_else(|| BindError::Config("no Android NDK configured".into()))?;

    let mut vars = BTreeMap::new();
    vars.insert("GOOS".into(), Platform::Android.goos().into());
    vars.insert("GOARCH".into(), arch.as_str().into());
    vars.insert("CC".into(), ndk.clang(arch).display().to_string());
    vars.insert("CXX".into(), ndk.clangxx(arch).display().to_string());
    if arch == Arch::Arm {
        vars.insert("GOARM".into(), "7".into());
    }
    Ok(vars)
}

fn apple_template(
    toolchain: &Toolchain,
    platform: Platform,
    arch: Arch,
) -> Result<BTreeMap<String, String>, BindError> {
    let sdks = toolchain
        .apple
        .as_ref()
        .ok_or_else(|| BindError::Config("no Apple SDKs configured".into()))?;
    let sdk = sdks.sdk_root(platform, arch).ok_or_else(|| {
        BindError::Config(format!(
            "{} SDK not found",
            AppleSdks::sdk_name(platform, arch)
        ))
    })?;

    let min_version = match AppleSdks::sdk_name(platform, arch) {
        "iphoneos" => format!("-mios-version-min={}", IOS_MIN_VERSION),
        "iphonesimulator" => format!("-mios-simulator-version-min={}", IOS_MIN_VERSION),
        _ => format!("-mmacosx-version-min={}", MACOS_MIN_VERSION),
    };
    let flags = format!(
        "-isysroot {} {} -arch {}",
        sdk.display(),
        min_version,
        arch.clang_arch()
    );

    let mut vars = BTreeMap::new();
    vars.insert("GOOS".into(), platform.goos().into());
    vars.insert("GOARCH".into(), arch.as_str().into());
    vars.insert("CC".into(), sdks.clang.display().to_string());
    vars.insert("CXX".into(), sdks.clangxx.display().to_string());
    vars.insert("CGO_CFLAGS".into(), flags.clone());
    vars.insert("CGO_CXXFLAGS".into(), flags.clone());
    vars.insert("CGO_LDFLAGS".into(), flags);
    Ok(vars)
}

fn gopath(work_dir: &Path, host: Option<&str>) -> String {
    let work = work_dir.display().to_string();
    match host {
        Some(host) if !host.is_empty() => {
            let sep = if cfg!(windows) { ';' } else { ':' };
            format!("{}{}{}", work, sep, host)
        }
        _ => work,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn fake_toolchain() -> Toolchain {
        Toolchain {
            go: PathBuf::from("go"),
            gobind: PathBuf::from("gobind"),
            host_gopath: Some("/home/dev/go".into()),
            apple: Some(AppleSdks {
                clang: PathBuf::from("/usr/bin/clang"),
                clangxx: PathBuf::from("/usr/bin/clang++"),
                iphoneos: Some(PathBuf::from("/sdk/iPhoneOS.sdk")),
                iphonesimulator: Some(PathBuf::from("/sdk/iPhoneSimulator.sdk")),
                macosx: Some(PathBuf::from("/sdk/MacOSX.sdk")),
            }),
            android: Some(AndroidNdk {
                ndk_root: PathBuf::from("/ndk"),
                host_tag: "linux-x86_64".into(),
                api_level: 21,
                android_jar: Some(PathBuf::from("/sdk/platforms/android-33/android.jar")),
            }),
        }
    }

    #[test]
    fn test_apple_env_uses_sdk_and_clang_arch() {
        let env =
            BuildEnvironment::new(&fake_toolchain(), Platform::Ios, Arch::Amd64, Some(Path::new("/w")))
                .unwrap();
        assert_eq!(env.get("GOOS"), Some("darwin"));
        assert_eq!(env.get("GOARCH"), Some("amd64"));
        assert_eq!(env.get("CGO_ENABLED"), Some("1"));
        let cflags = env.get("CGO_CFLAGS").unwrap();
        assert!(cflags.contains("-isysroot /sdk/iPhoneSimulator.sdk"));
        assert!(cflags.contains("-mios-simulator-version-min="));
        assert!(cflags.ends_with("-arch x86_64"));
    }

    #[test]
    fn test_android_env_uses_ndk_wrappers() {
        let env = BuildEnvironment::new(
            &fake_toolchain(),
            Platform::Android,
            Arch::Arm,
            Some(Path::new("/w")),
        )
        .unwrap();
        assert_eq!(env.get("GOOS"), Some("android"));
        assert_eq!(env.get("GOARM"), Some("7"));
        assert_eq!(
            env.get("CC"),
            Some("/ndk/toolchains/llvm/prebuilt/linux-x86_64/bin/armv7a-linux-androideabi21-clang")
        );
        assert!(env.get("CGO_CFLAGS").is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_gopath_prefers_work_dir() {
        let env = BuildEnvironment::new(
            &fake_toolchain(),
            Platform::Macos,
            Arch::Arm64,
            Some(Path::new("/w")),
        )
        .unwrap();
        assert_eq!(env.get("GOPATH"), Some("/w:/home/dev/go"));
    }

    #[test]
    fn test_gopath_is_inherited_without_reverse_root() {
        let env = BuildEnvironment::new(&fake_toolchain(), Platform::Macos, Arch::Arm64, None)
            .unwrap();
        assert!(env.get("GOPATH").is_none());
        assert_eq!(env.get("GOARCH"), Some("arm64"));
    }

    #[test]
    fn test_each_arch_gets_its_own_environment() {
        let tc = fake_toolchain();
        let a = BuildEnvironment::new(&tc, Platform::Macos, Arch::Arm64, None).unwrap();
        let b = BuildEnvironment::new(&tc, Platform::Macos, Arch::Amd64, None).unwrap();
        assert_ne!(a.get("CGO_LDFLAGS"), b.get("CGO_LDFLAGS"));
        assert_eq!(a.get("GOARCH"), Some("arm64"));
    }

    #[test]
    fn test_check_reports_missing_toolchain() {
        let tc = Toolchain::default();
        assert!(matches!(
            tc.check(Platform::Android, &[Arch::Arm64]),
            Err(BindError::Config(_))
        ));

        let mut tc = fake_toolchain();
        if let Some(sdks) = tc.apple.as_mut() {
            sdks.iphonesimulator = None;
        }
        assert!(tc.check(Platform::Ios, &[Arch::Arm64]).is_ok());
        let err = tc.check(Platform::Ios, &[Arch::Amd64]).unwrap_err();
        assert!(err.to_string().contains("iphonesimulator"));
    }
}
