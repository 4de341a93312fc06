//! Dependency manifest for the generated source tree.
//!
//! The generated `gobind` package lives in a private work directory, outside
//! the user's module. To build it with the exact dependency versions the user
//! resolved, the module graph is listed with `go list -m -json all` and folded
//! into a standalone `go.mod` written next to the generated sources.

use std::fmt::Write as _;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::builders::common::{CommandSpec, Shell, assembly_err, tags_flag};
use crate::builders::env::Toolchain;
use crate::types::{Arch, BindError, Platform};

/// Module path declared by the generated manifest.
pub const GENERATED_MODULE: &str = "gobind";

/// A `require` directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Require {
    pub path: String,
    pub version: String,
}

/// A `replace` directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replace {
    pub old_path: String,
    /// Empty replaces every version.
    pub old_version: String,
    pub new_path: String,
    /// Empty for directory replacements.
    pub new_version: String,
}

/// One record from `go list -m -json`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ModuleRecord {
    pub path: String,
    pub version: String,
    pub dir: String,
    pub main: bool,
    pub replace: Option<Box<ModuleRecord>>,
}

/// A `go.mod` for the generated tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyManifest {
    module: String,
    requires: Vec<Require>,
    replaces: Vec<Replace>,
}

impl DependencyManifest {
    /// An empty manifest declaring `module`.
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            requires: Vec::new(),
            replaces: Vec::new(),
        }
    }

    /// Folds module records into a manifest for [`GENERATED_MODULE`].
    pub fn from_records(records: impl IntoIterator<Item = ModuleRecord>) -> Self {
        let mut manifest = Self::new(GENERATED_MODULE);
        for record in records {
            manifest.fold(record);
        }
        manifest
    }

    /// Adds the directive one module record calls for.
    ///
    /// - replaced by a directory: replace with the directory, ignoring its version
    /// - replaced by another module: replace with its path and version
    /// - no version (the main module or a workspace module): replace with its
    ///   directory
    /// - otherwise: require at its version
    pub fn fold(&mut self, record: ModuleRecord) {
        if let Some(rep) = record.replace {
            if is_directory_path(&rep.path) {
                let dir = if rep.dir.is_empty() { rep.path } else { rep.dir };
                self.add_replace(&record.path, &record.version, &dir, "");
            } else {
                self.add_replace(&record.path, &record.version, &rep.path, &rep.version);
            }
        } else if record.version.is_empty() {
            self.add_replace(&record.path, "", &record.dir, "");
        } else {
            self.requires.push(Require {
                path: record.path,
                version: record.version,
            });
        }
    }

    fn add_replace(&mut self, old_path: &str, old_version: &str, new_path: &str, new_version: &str) {
        self.replaces.push(Replace {
            old_path: old_path.to_string(),
            old_version: old_version.to_string(),
            new_path: new_path.to_string(),
            new_version: new_version.to_string(),
        });
    }

    /// Declared module path.
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Require directives in fold order.
    pub fn requires(&self) -> &[Require] {
        &self.requires
    }

    /// Replace directives in fold order.
    pub fn replaces(&self) -> &[Replace] {
        &self.replaces
    }

    /// Renders the manifest in `go.mod` syntax.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "module {}", auto_quote(&self.module));

        let requires: Vec<String> = self
            .requires
            .iter()
            .map(|r| format!("{} {}", auto_quote(&r.path), auto_quote(&r.version)))
            .collect();
        write_block(&mut out, "require", &requires);

        let replaces: Vec<String> = self
            .replaces
            .iter()
            .map(|r| {
                format!(
                    "{} => {}",
                    module_version(&r.old_path, &r.old_version),
                    module_version(&r.new_path, &r.new_version)
                )
            })
            .collect();
        write_block(&mut out, "replace", &replaces);
        out
    }
}

fn module_version(path: &str, version: &str) -> String {
    if version.is_empty() {
        auto_quote(path)
    } else {
        format!("{} {}", auto_quote(path), auto_quote(version))
    }
}

fn write_block(out: &mut String, verb: &str, lines: &[String]) {
    match lines {
        [] => {}
        [single] => {
            let _ = write!(out, "\n{} {}\n", verb, single);
        }
        many => {
            let _ = write!(out, "\n{} (\n", verb);
            for line in many {
                let _ = writeln!(out, "\t{}", line);
            }
            out.push_str(")\n");
        }
    }
}

/// Quotes a token when `go.mod` syntax requires it.
fn auto_quote(s: &str) -> String {
    let must_quote = s.is_empty()
        || s.contains("//")
        || s.contains("/*")
        || s.chars().any(|c| match c {
            ' ' | '"' | '\'' | '`' => true,
            '(' | ')' | '[' | ']' | '{' | '}' | ',' => s.len() > 1,
            c => c.is_control() || c.is_whitespace(),
        });
    if must_quote {
        format!("{:?}", s)
    } else {
        s.to_string()
    }
}

/// Whether a replacement path names a directory rather than a module.
///
/// Both Unix and Windows spellings are recognised since `go.mod` files move
/// between hosts.
pub fn is_directory_path(path: &str) -> bool {
    let bytes = path.as_bytes();
    path == "."
        || path == ".."
        || path.starts_with("./")
        || path.starts_with(".\\")
        || path.starts_with("../")
        || path.starts_with("..\\")
        || path.starts_with('/')
        || path.starts_with('\\')
        || (bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':')
}

/// Decodes the concatenated JSON records printed by `go list -m -json`.
pub fn parse_module_list(stdout: &str) -> Result<Vec<ModuleRecord>, BindError> {
    serde_json::Deserializer::from_str(stdout)
        .into_iter::<ModuleRecord>()
        .map(|r| r.map_err(BindError::from))
        .collect()
}

/// Whether the source tree builds in module mode.
pub fn modules_in_use(shell: &Shell, toolchain: &Toolchain, source_dir: &Path) -> Result<bool, BindError> {
    let cmd = CommandSpec::new(toolchain.go.display().to_string())
        .args(["env", "GOMOD"])
        .current_dir(source_dir)
        .query();
    let output = shell
        .run(&cmd)
        .map_err(|e| BindError::Config(format!("probing for Go modules: {}", e)))?;
    let gomod = output.stdout.trim();
    // Module mode without a go.mod reports the null device.
    Ok(!gomod.is_empty() && gomod != "/dev/null" && gomod != "NUL")
}

/// Lists the module graph and folds it into a manifest.
///
/// Returns `Ok(None)` when the tree is not using modules or the module list
/// cannot be produced; neither is fatal.
#[instrument(skip(shell, toolchain, source_dir, tags))]
pub fn build_manifest(
    shell: &Shell,
    toolchain: &Toolchain,
    source_dir: &Path,
    platform: Platform,
    arch: Arch,
    tags: &[String],
) -> Result<Option<DependencyManifest>, BindError> {
    if !modules_in_use(shell, toolchain, source_dir)? {
        debug!("Not in module mode; skipping go.mod generation");
        return Ok(None);
    }

    let mut cmd = CommandSpec::new(toolchain.go.display().to_string())
        .args(["list", "-m", "-json"])
        .env("GOOS", platform.goos())
        .env("GOARCH", arch.as_str())
        .current_dir(source_dir)
        .query();
    if let Some(flag) = tags_flag(tags) {
        cmd = cmd.arg(flag);
    }
    let cmd = cmd.arg("all");

    let output = match shell.run(&cmd) {
        Ok(output) => output,
        Err(e) => {
            warn!(error = %e, "Module list unavailable; building without go.mod");
            return Ok(None);
        }
    };

    let manifest = DependencyManifest::from_records(parse_module_list(&output.stdout)?);
    debug!(
        requires = manifest.requires().len(),
        replaces = manifest.replaces().len(),
        "Folded module graph"
    );
    Ok(Some(manifest))
}

/// Writes `manifest` as `<src_dir>/go.mod`.
pub fn write_manifest(shell: &Shell, src_dir: &Path, manifest: &DependencyManifest) -> Result<(), BindError> {
    let path = src_dir.join("go.mod");
    shell
        .write_file(&path, manifest.render().as_bytes())
        .map_err(assembly_err("writing", &path))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(path: &str, version: &str, dir: &str) -> ModuleRecord {
        ModuleRecord {
            path: path.into(),
            version: version.into(),
            dir: dir.into(),
            ..ModuleRecord::default()
        }
    }

    #[test]
    fn test_fold_rules() {
        let mut local = record("example.com/lib", "v1.0.0", "");
        local.replace = Some(Box::new(record("../lib", "", "/home/dev/lib")));

        let mut remote = record("example.com/old", "v1.0.0", "");
        remote.replace = Some(Box::new(record("example.com/fork", "v1.2.0", "")));

        let main = ModuleRecord {
            main: true,
            ..record("example.com/app", "", "/home/dev/app")
        };

        let manifest = DependencyManifest::from_records([
            main,
            record("golang.org/x/mobile", "v0.0.0-20240101", "/mod/x/mobile"),
            local,
            remote,
        ]);

        assert_eq!(manifest.module(), "gobind");
        assert_eq!(
            manifest.requires(),
            &[Require {
                path: "golang.org/x/mobile".into(),
                version: "v0.0.0-20240101".into()
            }]
        );
        assert_eq!(manifest.replaces().len(), 3);
        assert_eq!(manifest.replaces()[0].new_path, "/home/dev/app");
        assert_eq!(manifest.replaces()[1].new_path, "/home/dev/lib");
        assert_eq!(manifest.replaces()[1].old_version, "v1.0.0");
        assert_eq!(manifest.replaces()[1].new_version, "");
        assert_eq!(manifest.replaces()[2].new_path, "example.com/fork");
        assert_eq!(manifest.replaces()[2].new_version, "v1.2.0");
    }

    #[test]
    fn test_render_go_mod() {
        let mut remote = record("example.com/old", "v1.0.0", "");
        remote.replace = Some(Box::new(record("example.com/fork", "v1.2.0", "")));
        let manifest = DependencyManifest::from_records([
            record("example.com/app", "", "/src/my app"),
            record("golang.org/x/mobile", "v0.1.0", ""),
            remote,
        ]);

        let text = manifest.render();
        assert!(text.starts_with("module gobind\n"));
        assert!(text.contains("\nrequire golang.org/x/mobile v0.1.0\n"));
        assert!(text.contains("\nreplace (\n"));
        assert!(text.contains("\texample.com/app => \"/src/my app\"\n"));
        assert!(text.contains("\texample.com/old v1.0.0 => example.com/fork v1.2.0\n"));
    }

    #[test]
    fn test_directory_paths() {
        assert!(is_directory_path("./lib"));
        assert!(is_directory_path("../lib"));
        assert!(is_directory_path("/abs/lib"));
        assert!(is_directory_path("C:\\lib"));
        assert!(!is_directory_path("example.com/lib"));
    }

    #[test]
    fn test_parse_module_stream() {
        let out = r#"{"Path": "example.com/app", "Main": true, "Dir": "/src/app"}
{"Path": "golang.org/x/mobile", "Version": "v0.1.0", "Dir": "/mod/mobile"}"#;
        let records = parse_module_list(out).unwrap();
        assert_eq!(records.len(), 2);
        assert!(records[0].main);
        assert_eq!(records[1].version, "v0.1.0");
    }
}
