//! Package loading via `go list`.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, instrument};

use crate::builders::common::{CommandSpec, Shell, tags_flag};
use crate::builders::env::Toolchain;
use crate::types::{BindError, Platform};

/// Architecture used when probing packages. Package sets do not vary by
/// architecture for the platforms supported here.
const PROBE_ARCH: &str = "arm64";

/// A resolved Go package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageDescriptor {
    /// Canonical import path.
    pub import_path: String,
    /// Package clause name.
    pub name: String,
    /// Source directory.
    pub dir: PathBuf,
    /// Whether this is a `main` package.
    pub is_executable: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListedPackage {
    import_path: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    dir: String,
    #[serde(default)]
    error: Option<ListError>,
    #[serde(default)]
    deps_errors: Vec<ListError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListError {
    #[serde(default)]
    pos: String,
    err: String,
}

impl ListError {
    fn describe(&self) -> String {
        if self.pos.is_empty() {
            self.err.clone()
        } else {
            format!("{}: {}", self.pos, self.err)
        }
    }
}

/// Loads bindable packages: like [`list_packages`] but rejects `main`.
///
/// # Errors
///
/// - [`BindError::PackageLoad`] if `go list` fails or reports any diagnostic
/// - [`BindError::UnsupportedPackageKind`] if a package is `main`
pub fn load_packages(
    shell: &Shell,
    toolchain: &Toolchain,
    source_dir: &Path,
    paths: &[String],
    platform: Platform,
    tags: &[String],
) -> Result<Vec<PackageDescriptor>, BindError> {
    let packages = list_packages(shell, toolchain, source_dir, paths, platform, tags)?;
    if let Some(main) = packages.iter().find(|p| p.is_executable) {
        return Err(BindError::UnsupportedPackageKind(main.import_path.clone()));
    }
    Ok(packages)
}

/// Lists `paths` as they would be built for `platform`.
#[instrument(skip(shell, toolchain, source_dir))]
pub fn list_packages(
    shell: &Shell,
    toolchain: &Toolchain,
    source_dir: &Path,
    paths: &[String],
    platform: Platform,
    tags: &[String],
) -> Result<Vec<PackageDescriptor>, BindError> {
    let mut cmd = CommandSpec::new(toolchain.go.display().to_string())
        .args(["list", "-e", "-json"])
        .env("GOOS", platform.goos())
        .env("GOARCH", PROBE_ARCH)
        .env("CGO_ENABLED", "1")
        .current_dir(source_dir)
        .query();
    if let Some(flag) = tags_flag(tags) {
        cmd = cmd.arg(flag);
    }
    let cmd = cmd.args(paths.iter().cloned());

    let output = shell
        .run(&cmd)
        .map_err(|e| BindError::PackageLoad(e.to_string()))?;
    let packages = parse_package_list(&output.stdout)?;

    for pkg in &packages {
        debug!(import_path = %pkg.import_path, name = %pkg.name, "Loaded package");
    }
    Ok(packages)
}

/// Decodes the concatenated JSON objects printed by `go list -json`.
///
/// Diagnostics attached to any package are collected into one
/// [`BindError::PackageLoad`].
pub fn parse_package_list(stdout: &str) -> Result<Vec<PackageDescriptor>, BindError> {
    let mut packages = Vec::new();
    let mut diagnostics = Vec::new();

    let stream = serde_json::Deserializer::from_str(stdout).into_iter::<ListedPackage>();
    for listed in stream {
        let listed = listed?;
        if let Some(err) = &listed.error {
            diagnostics.push(format!("{}: {}", listed.import_path, err.describe()));
        }
        for err in &listed.deps_errors {
            diagnostics.push(format!("{}: {}", listed.import_path, err.describe()));
        }
        packages.push(PackageDescriptor {
            is_executable: listed.name == "main",
            import_path: listed.import_path,
            name: listed.name,
            dir: PathBuf::from(listed.dir),
        });
    }

    if !diagnostics.is_empty() {
        return Err(BindError::PackageLoad(diagnostics.join("\n")));
    }
    if packages.is_empty() {
        return Err(BindError::PackageLoad("no packages matched".into()));
    }
    Ok(packages)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_stream_of_packages() {
        let out = r#"{
    "Dir": "/src/hello",
    "ImportPath": "example.com/hello",
    "Name": "hello"
}
{
    "Dir": "/src/world",
    "ImportPath": "example.com/world",
    "Name": "world"
}
"#;
        let pkgs = parse_package_list(out).unwrap();
        assert_eq!(pkgs.len(), 2);
        assert_eq!(pkgs[0].name, "hello");
        assert_eq!(pkgs[1].dir, PathBuf::from("/src/world"));
        assert!(!pkgs[0].is_executable);
    }

    #[test]
    fn test_main_package_is_flagged() {
        let pkgs = parse_package_list(
            r#"{"ImportPath": "example.com/cmd/tool", "Name": "main", "Dir": "/src/tool"}"#,
        )
        .unwrap();
        assert!(pkgs[0].is_executable);
    }

    #[test]
    fn test_diagnostics_become_load_errors() {
        let out = r#"{"ImportPath": "example.com/missing", "Error": {"Err": "cannot find package"}}
{"ImportPath": "example.com/ok", "Name": "ok", "DepsErrors": [{"Pos": "ok.go:3:2", "Err": "no required module"}]}"#;
        let err = parse_package_list(out).unwrap_err();
        let msg = err.to_string();
        assert!(matches!(err, BindError::PackageLoad(_)));
        assert!(msg.contains("example.com/missing: cannot find package"));
        assert!(msg.contains("ok.go:3:2: no required module"));
    }

    #[test]
    fn test_empty_listing_is_an_error() {
        assert!(matches!(
            parse_package_list(""),
            Err(BindError::PackageLoad(_))
        ));
    }
}
