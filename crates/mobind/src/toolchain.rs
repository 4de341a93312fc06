//! Host toolchain discovery.
//!
//! Locates the Go tools, the Apple SDKs and the Android NDK and packs them
//! into a [`Toolchain`]. Missing platform pieces are left as `None`; the SDK
//! reports them when a bind actually needs them.

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, bail};
use tracing::debug;

use mobind_sdk::Platform;
use mobind_sdk::builders::{AndroidNdk, AppleSdks, Toolchain};

/// Discovers everything a build for `platform` needs.
///
/// A dry run never executes `gobind`, so a missing one is only logged.
pub fn discover(platform: Platform, api_level: u32, dry_run: bool) -> Result<Toolchain> {
    let go = which::which("go").context(
        "go not found on PATH.\n\
         Install from https://go.dev/dl/",
    )?;
    let gobind = gobind_path(which::which("gobind").ok(), dry_run)?;
    let host_gopath = host_gopath(&go);

    let (apple, android) = match platform {
        Platform::Ios | Platform::Macos => (apple_sdks(), None),
        Platform::Android => (None, android_ndk(api_level)),
    };

    let toolchain = Toolchain {
        go,
        gobind,
        host_gopath,
        apple,
        android,
    };
    debug!(?toolchain, "Discovered toolchain");
    Ok(toolchain)
}

fn gobind_path(found: Option<PathBuf>, dry_run: bool) -> Result<PathBuf> {
    match found {
        Some(path) => Ok(path),
        None if dry_run => {
            debug!("gobind not found on PATH; dry run continues without it");
            Ok(PathBuf::from("gobind"))
        }
        None => bail!(
            "gobind not found on PATH.\n\
             Install with: go install golang.org/x/mobile/cmd/gobind@latest"
        ),
    }
}

fn host_gopath(go: &Path) -> Option<String> {
    if let Ok(gopath) = env::var("GOPATH")
        && !gopath.is_empty()
    {
        return Some(gopath);
    }
    capture(Command::new(go).args(["env", "GOPATH"]))
}

fn apple_sdks() -> Option<AppleSdks> {
    which::which("xcrun").ok()?;
    let clang = capture(Command::new("xcrun").args(["--find", "clang"]))?;
    let clangxx = capture(Command::new("xcrun").args(["--find", "clang++"]))?;
    let sdk = |name: &str| {
        capture(Command::new("xcrun").args(["--sdk", name, "--show-sdk-path"])).map(PathBuf::from)
    };
    Some(AppleSdks {
        clang: PathBuf::from(clang),
        clangxx: PathBuf::from(clangxx),
        iphoneos: sdk("iphoneos"),
        iphonesimulator: sdk("iphonesimulator"),
        macosx: sdk("macosx"),
    })
}

fn android_ndk(api_level: u32) -> Option<AndroidNdk> {
    let sdk_home = env::var_os("ANDROID_HOME").map(PathBuf::from);
    let ndk_root = ndk_root(env::var_os("ANDROID_NDK_HOME").map(PathBuf::from), sdk_home.as_deref())?;
    Some(AndroidNdk {
        ndk_root,
        host_tag: host_tag().to_string(),
        api_level,
        android_jar: sdk_home.as_deref().and_then(android_jar),
    })
}

/// `ANDROID_NDK_HOME`, else `$ANDROID_HOME/ndk-bundle`, else the newest
/// side-by-side NDK under `$ANDROID_HOME/ndk`.
fn ndk_root(ndk_home: Option<PathBuf>, sdk_home: Option<&Path>) -> Option<PathBuf> {
    if let Some(ndk) = ndk_home.filter(|p| p.is_dir()) {
        return Some(ndk);
    }
    let sdk_home = sdk_home?;
    let bundle = sdk_home.join("ndk-bundle");
    if bundle.is_dir() {
        return Some(bundle);
    }
    std::fs::read_dir(sdk_home.join("ndk"))
        .ok()?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_dir())
        .max_by_key(|p| ndk_version(p))
}

/// Numeric components of an NDK directory name such as `26.1.10909125`.
fn ndk_version(dir: &Path) -> Vec<u64> {
    dir.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
        .split('.')
        .map(|part| part.parse().unwrap_or(0))
        .collect()
}

/// The highest `platforms/android-N/android.jar` under the SDK.
fn android_jar(sdk_home: &Path) -> Option<PathBuf> {
    std::fs::read_dir(sdk_home.join("platforms"))
        .ok()?
        .filter_map(|e| e.ok())
        .filter_map(|e| {
            let name = e.file_name().to_string_lossy().into_owned();
            let level: u32 = name.strip_prefix("android-")?.parse().ok()?;
            let jar = e.path().join("android.jar");
            jar.is_file().then_some((level, jar))
        })
        .max_by_key(|(level, _)| *level)
        .map(|(_, jar)| jar)
}

fn host_tag() -> &'static str {
    match env::consts::OS {
        "macos" => "darwin-x86_64",
        "windows" => "windows-x86_64",
        _ => "linux-x86_64",
    }
}

/// Trimmed stdout of a successful command.
fn capture(cmd: &mut Command) -> Option<String> {
    let output = cmd.output().ok()?;
    if !output.status.success() {
        return None;
    }
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!stdout.is_empty()).then_some(stdout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_ndk_home_wins() {
        let temp = TempDir::new().unwrap();
        let ndk = temp.path().join("ndk-home");
        std::fs::create_dir_all(&ndk).unwrap();
        std::fs::create_dir_all(temp.path().join("sdk/ndk-bundle")).unwrap();

        let found = ndk_root(Some(ndk.clone()), Some(&temp.path().join("sdk")));
        assert_eq!(found, Some(ndk));
    }

    #[test]
    fn test_newest_side_by_side_ndk() {
        let temp = TempDir::new().unwrap();
        let sdk = temp.path().join("sdk");
        std::fs::create_dir_all(sdk.join("ndk/25.2.9519653")).unwrap();
        std::fs::create_dir_all(sdk.join("ndk/26.1.10909125")).unwrap();

        let found = ndk_root(None, Some(&sdk));
        assert_eq!(found, Some(sdk.join("ndk/26.1.10909125")));
        assert_eq!(ndk_root(None, None), None);
    }

    #[test]
    fn test_ndk_versions_compare_numerically() {
        let temp = TempDir::new().unwrap();
        let sdk = temp.path().join("sdk");
        std::fs::create_dir_all(sdk.join("ndk/9.0.0")).unwrap();
        std::fs::create_dir_all(sdk.join("ndk/26.1.10909125")).unwrap();
        std::fs::create_dir_all(sdk.join("ndk/26.0.99")).unwrap();

        let found = ndk_root(None, Some(&sdk));
        assert_eq!(found, Some(sdk.join("ndk/26.1.10909125")));
    }

    #[test]
    fn test_missing_gobind_only_fails_real_runs() {
        let found = PathBuf::from("/go/bin/gobind");
        assert_eq!(gobind_path(Some(found.clone()), false).unwrap(), found);
        assert_eq!(gobind_path(None, true).unwrap(), PathBuf::from("gobind"));
        let err = gobind_path(None, false).unwrap_err();
        assert!(err.to_string().contains("go install golang.org/x/mobile/cmd/gobind"));
    }

    #[test]
    fn test_android_jar_picks_highest_platform() {
        let temp = TempDir::new().unwrap();
        for level in ["android-21", "android-34", "android-9"] {
            let dir = temp.path().join("platforms").join(level);
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join("android.jar"), b"").unwrap();
        }
        std::fs::create_dir_all(temp.path().join("platforms/android-35")).unwrap();

        assert_eq!(
            android_jar(temp.path()),
            Some(temp.path().join("platforms/android-34/android.jar"))
        );
    }
}
