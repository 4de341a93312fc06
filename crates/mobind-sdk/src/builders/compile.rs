//! Per-architecture cross compilation.
//!
//! Architectures are compiled one at a time in declared order. The first
//! failure aborts the remaining architectures and is reported with its
//! architecture; artifacts from earlier architectures are dropped.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, info, instrument};

use crate::builders::common::{CommandSpec, ProcessError, Shell, tags_flag};
use crate::builders::env::{BuildEnvironment, Toolchain};
use crate::types::{Arch, BindError, Platform};

/// Which architecture's binary is scanned for linked packages.
///
/// Symbol sets are assumed not to vary by architecture, so at most one binary
/// is scanned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SymbolExtraction {
    /// Skip the scan.
    Disabled,
    /// Scan the first architecture in declaration order.
    #[default]
    FirstDeclared,
    /// Scan this architecture; no scan if it is not being built.
    Arch(Arch),
}

impl SymbolExtraction {
    /// The architecture to scan out of `archs`.
    pub fn designated(&self, archs: &[Arch]) -> Option<Arch> {
        match self {
            SymbolExtraction::Disabled => None,
            SymbolExtraction::FirstDeclared => archs.first().copied(),
            SymbolExtraction::Arch(arch) => archs.contains(arch).then_some(*arch),
        }
    }
}

/// `-buildmode` for a compile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildMode {
    /// Static archive for Apple frameworks.
    CArchive,
    /// Shared library for Android.
    CShared,
    /// Plain executable.
    Exe,
}

impl BuildMode {
    fn flag(&self) -> Option<&'static str> {
        match self {
            BuildMode::CArchive => Some("-buildmode=c-archive"),
            BuildMode::CShared => Some("-buildmode=c-shared"),
            BuildMode::Exe => None,
        }
    }
}

/// Flags forwarded verbatim to every `go build`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GoBuildFlags {
    /// `-a`: rebuild every package, ignoring the build cache.
    pub rebuild_all: bool,
    /// `-gcflags=<flags>` for the compiler.
    pub gcflags: Option<String>,
    /// `-trimpath`: strip filesystem paths from the binary.
    pub trimpath: bool,
}

/// One architecture's compiled binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchitectureArtifact {
    pub arch: Arch,
    pub path: PathBuf,
}

/// Every architecture's binary plus the linked packages, if scanned.
#[derive(Debug, Clone, Default)]
pub struct CompiledArchs {
    pub artifacts: Vec<ArchitectureArtifact>,
    pub linked_packages: BTreeSet<String>,
}

/// Drives `go build` once per architecture.
#[derive(Debug)]
pub struct CrossCompiler<'a> {
    toolchain: &'a Toolchain,
    platform: Platform,
    work_dir: &'a Path,
    tags: &'a [String],
    ldflags: Vec<String>,
    flags: GoBuildFlags,
    mode: BuildMode,
    tidy: bool,
    reverse_bindings: bool,
    symbols: SymbolExtraction,
}

impl<'a> CrossCompiler<'a> {
    /// Creates a compiler for `platform` writing intermediates under `work_dir`.
    pub fn new(
        toolchain: &'a Toolchain,
        platform: Platform,
        work_dir: &'a Path,
        mode: BuildMode,
    ) -> Self {
        Self {
            toolchain,
            platform,
            work_dir,
            tags: &[],
            ldflags: Vec::new(),
            flags: GoBuildFlags::default(),
            mode,
            tidy: false,
            reverse_bindings: true,
            symbols: SymbolExtraction::FirstDeclared,
        }
    }

    /// Sets the build tags.
    pub fn tags(mut self, tags: &'a [String]) -> Self {
        self.tags = tags;
        self
    }

    /// Appends link-time flags. Empty or missing values are ignored.
    pub fn ldflags(mut self, flags: Option<&str>) -> Self {
        if let Some(flags) = flags.map(str::trim).filter(|f| !f.is_empty()) {
            self.ldflags.push(flags.to_string());
        }
        self
    }

    /// Sets the `-a`, `-gcflags` and `-trimpath` flags.
    pub fn build_flags(mut self, flags: &GoBuildFlags) -> Self {
        self.flags = flags.clone();
        self
    }

    /// Puts the work directory first on `GOPATH` so generated reverse
    /// bindings resolve. On by default; plain executables turn it off so the
    /// host module cache is used.
    pub fn reverse_bindings(mut self, enabled: bool) -> Self {
        self.reverse_bindings = enabled;
        self
    }

    /// Runs `go mod tidy` in the package directory before each compile.
    pub fn tidy(mut self, tidy: bool) -> Self {
        self.tidy = tidy;
        self
    }

    /// Sets the symbol extraction policy.
    pub fn symbols(mut self, symbols: SymbolExtraction) -> Self {
        self.symbols = symbols;
        self
    }

    /// Compiles `package` (run from `package_dir`) for every arch in `archs`.
    ///
    /// `output_for` names the binary produced for each architecture.
    #[instrument(skip_all, fields(platform = %self.platform, package = package))]
    pub fn compile_all(
        &self,
        shell: &Shell,
        archs: &[Arch],
        package_dir: &Path,
        package: &str,
        output_for: impl Fn(Arch) -> PathBuf,
    ) -> Result<CompiledArchs, BindError> {
        let designated = self.symbols.designated(archs);
        let mut compiled = CompiledArchs::default();

        for &arch in archs {
            info!(arch = %arch, "Compiling");
            let out = output_for(arch);
            self.compile_one(shell, arch, package_dir, package, &out)?;

            if Some(arch) == designated {
                compiled.linked_packages = self.linked_packages(shell, arch, &out)?;
                debug!(arch = %arch, packages = ?compiled.linked_packages, "Linked packages");
            }
            compiled.artifacts.push(ArchitectureArtifact { arch, path: out });
        }
        Ok(compiled)
    }

    /// The `go build` command for one architecture.
    pub fn build_command(
        &self,
        env: &BuildEnvironment,
        package_dir: &Path,
        package: &str,
        out: &Path,
    ) -> CommandSpec {
        let mut cmd = CommandSpec::new(self.toolchain.go.display().to_string())
            .arg("build")
            .envs(env.vars())
            .current_dir(package_dir);
        if let Some(flag) = tags_flag(self.tags) {
            cmd = cmd.arg(flag);
        }
        if self.flags.rebuild_all {
            cmd = cmd.arg("-a");
        }
        if let Some(gcflags) = self.flags.gcflags.as_deref().filter(|f| !f.trim().is_empty()) {
            cmd = cmd.arg(format!("-gcflags={}", gcflags.trim()));
        }
        if !self.ldflags.is_empty() {
            cmd = cmd.arg(format!("-ldflags={}", self.ldflags.join(" ")));
        }
        if self.flags.trimpath {
            cmd = cmd.arg("-trimpath");
        }
        if let Some(mode) = self.mode.flag() {
            cmd = cmd.arg(mode);
        }
        cmd.arg("-o").path_arg(out).arg(package)
    }

    fn compile_one(
        &self,
        shell: &Shell,
        arch: Arch,
        package_dir: &Path,
        package: &str,
        out: &Path,
    ) -> Result<(), BindError> {
        let reverse_root = self.reverse_bindings.then_some(self.work_dir);
        let env = BuildEnvironment::new(self.toolchain, self.platform, arch, reverse_root)?;
        debug!(arch = %arch, env = ?env.vars(), "Build environment");
        let tag = |source: ProcessError| BindError::Compile {
            platform: self.platform,
            arch,
            source,
        };

        if self.tidy {
            let tidy = CommandSpec::new(self.toolchain.go.display().to_string())
                .args(["mod", "tidy"])
                .envs(env.vars())
                .current_dir(package_dir);
            shell.run(&tidy).map_err(tag)?;
        }
        shell
            .run(&self.build_command(&env, package_dir, package, out))
            .map_err(tag)?;
        Ok(())
    }

    fn linked_packages(
        &self,
        shell: &Shell,
        arch: Arch,
        binary: &Path,
    ) -> Result<BTreeSet<String>, BindError> {
        if shell.is_dry_run() {
            return Ok(BTreeSet::new());
        }
        let nm = CommandSpec::new(self.toolchain.nm(self.platform).display().to_string())
            .path_arg(binary)
            .query();
        let output = shell.run(&nm).map_err(|source| BindError::Compile {
            platform: self.platform,
            arch,
            source,
        })?;
        extract_packages(&output.stdout)
    }
}

/// Matches a text symbol and captures its package path: everything up to
/// the first `.` after the last `/`. Go escapes dots in the last path
/// element as `%2e`.
const SYMBOL_PATTERN: &str = r"^[0-9a-fA-F]+ [tT] _?(?:\S*/vendor/)?((?:[\w.~%-]+/)*[\w~%-]+)\.";

fn symbol_re() -> Result<&'static Regex, BindError> {
    static RE: OnceLock<Regex> = OnceLock::new();
    if let Some(re) = RE.get() {
        return Ok(re);
    }
    let re = Regex::new(SYMBOL_PATTERN)
        .map_err(|e| BindError::Assembly(format!("invalid symbol pattern: {}", e)))?;
    Ok(RE.get_or_init(|| re))
}

/// Collects Go package paths from text symbols in `nm` output.
pub fn extract_packages(nm_output: &str) -> Result<BTreeSet<String>, BindError> {
    let re = symbol_re()?;
    Ok(nm_output
        .lines()
        .filter_map(|line| re.captures(line.trim()))
        .filter_map(|caps| caps.get(1).map(|m| unescape_symbol_path(m.as_str())))
        .collect())
}

/// Decodes `%XX` escapes in a symbol's package path.
fn unescape_symbol_path(path: &str) -> String {
    let bytes = path.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && let Some(byte) = path
                .get(i + 1..i + 3)
                .and_then(|hex| u8::from_str_radix(hex, 16).ok())
        {
            out.push(byte);
            i += 3;
            continue;
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::common::{CommandOutput, CommandRunner};
    use crate::builders::env::tests::fake_toolchain;
    use std::cell::RefCell;
    use std::io;
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct Script {
        seen: Rc<RefCell<Vec<CommandSpec>>>,
        fail_arch: Option<&'static str>,
    }

    impl CommandRunner for Script {
        fn run(&self, cmd: &CommandSpec) -> io::Result<CommandOutput> {
            self.seen.borrow_mut().push(cmd.clone());
            if cmd.has_arg("build") && cmd.env.get("GOARCH").map(String::as_str) == self.fail_arch {
                return Ok(CommandOutput::failed(1, "# gobind\nundefined: x"));
            }
            if cmd.program == "nm" {
                return Ok(CommandOutput::ok(
                    "0000000000001000 T _golang.org/x/mobile/bind/seq.init\n\
                     0000000000001010 t _example.com/hello.Greet\n\
                     0000000000001020 T _x_cgo_init\n",
                ));
            }
            Ok(CommandOutput::ok(""))
        }
    }

    #[test]
    fn test_extract_packages() {
        let pkgs = extract_packages(
            "0000000000001000 T _golang.org/x/mobile/bind/seq.(*Ref).Get\n\
             0000000000001010 t _example.com/vendor/golang.org/x/net/http2.init\n\
             0000000000001020 T _runtime.morestack\n\
             0000000000001030 T _x_cgo_init\n\
             0000000000001040 D _example.com/hello.Data\n",
        )
        .unwrap();
        let pkgs: Vec<&str> = pkgs.iter().map(String::as_str).collect();
        assert_eq!(
            pkgs,
            ["golang.org/x/mobile/bind/seq", "golang.org/x/net/http2", "runtime"]
        );
    }

    #[test]
    fn test_extract_packages_with_dotted_last_element() {
        let pkgs = extract_packages(
            "0000000000002000 T _gopkg.in/yaml%2ev3.(*Decoder).Decode\n\
             0000000000002010 t _github.com/foo/bar%2ev2.Run\n\
             0000000000002020 T _github.com/foo/bar%2ev2.(*Client).Do\n\
             0000000000002030 T _example.com/hello.Greet.func1\n",
        )
        .unwrap();
        let pkgs: Vec<&str> = pkgs.iter().map(String::as_str).collect();
        assert_eq!(
            pkgs,
            ["example.com/hello", "github.com/foo/bar.v2", "gopkg.in/yaml.v3"]
        );
    }

    #[test]
    fn test_unescape_symbol_path() {
        assert_eq!(unescape_symbol_path("gopkg.in/yaml%2ev3"), "gopkg.in/yaml.v3");
        assert_eq!(unescape_symbol_path("a/b%2Ec"), "a/b.c");
        assert_eq!(unescape_symbol_path("odd%zz"), "odd%zz");
        assert_eq!(unescape_symbol_path("trail%2"), "trail%2");
    }

    #[test]
    fn test_build_flags_are_forwarded_in_order() {
        let tc = fake_toolchain();
        let script = Script::default();
        let shell = Shell::new(script.clone());
        let flags = GoBuildFlags {
            rebuild_all: true,
            gcflags: Some("all=-N -l".into()),
            trimpath: true,
        };
        let tags = vec!["ios".to_string()];
        CrossCompiler::new(&tc, Platform::Ios, Path::new("/w"), BuildMode::CArchive)
            .tags(&tags)
            .ldflags(Some("-s"))
            .build_flags(&flags)
            .compile_all(&shell, &[Arch::Arm64], Path::new("/w/src"), "./gobind", |a| {
                PathBuf::from(format!("/w/ios/{}.a", a))
            })
            .unwrap();

        let seen = script.seen.borrow();
        let build = seen.iter().find(|c| c.has_arg("build")).unwrap();
        assert_eq!(
            build.args,
            [
                "build",
                "-tags=ios",
                "-a",
                "-gcflags=all=-N -l",
                "-ldflags=-s",
                "-trimpath",
                "-buildmode=c-archive",
                "-o",
                "/w/ios/arm64.a",
                "./gobind",
            ]
        );
    }

    #[test]
    fn test_gopath_only_set_for_reverse_bindings() {
        let tc = fake_toolchain();
        let script = Script::default();
        let shell = Shell::new(script.clone());
        let out = |a: Arch| PathBuf::from(format!("/w/{}", a));

        CrossCompiler::new(&tc, Platform::Macos, Path::new("/w"), BuildMode::CArchive)
            .compile_all(&shell, &[Arch::Arm64], Path::new("/w/src"), "./gobind", out)
            .unwrap();
        CrossCompiler::new(&tc, Platform::Macos, Path::new("/w"), BuildMode::Exe)
            .reverse_bindings(false)
            .compile_all(&shell, &[Arch::Arm64], Path::new("/w/src"), "./cmd", out)
            .unwrap();

        let seen = script.seen.borrow();
        let builds: Vec<&CommandSpec> = seen.iter().filter(|c| c.has_arg("build")).collect();
        assert_eq!(builds.len(), 2);
        assert!(builds[0].env.get("GOPATH").is_some_and(|p| p.starts_with("/w")));
        assert!(builds[1].env.get("GOPATH").is_none());
    }

    #[test]
    fn test_designated_arch_policy() {
        let archs = [Arch::Amd64, Arch::Arm64];
        assert_eq!(SymbolExtraction::FirstDeclared.designated(&archs), Some(Arch::Amd64));
        assert_eq!(SymbolExtraction::Arch(Arch::Arm64).designated(&archs), Some(Arch::Arm64));
        assert_eq!(SymbolExtraction::Arch(Arch::X86).designated(&archs), None);
        assert_eq!(SymbolExtraction::Disabled.designated(&archs), None);
    }

    #[test]
    fn test_compiles_in_order_and_scans_designated_arch_only() {
        let tc = fake_toolchain();
        let script = Script::default();
        let shell = Shell::new(script.clone());
        let tags = vec!["ios".to_string()];
        let compiler = CrossCompiler::new(&tc, Platform::Ios, Path::new("/w"), BuildMode::CArchive)
            .tags(&tags)
            .ldflags(Some("-s -w"))
            .tidy(true)
            .symbols(SymbolExtraction::Arch(Arch::Amd64));

        let compiled = compiler
            .compile_all(&shell, &[Arch::Arm64, Arch::Amd64], Path::new("/w/src"), "./gobind", |a| {
                PathBuf::from(format!("/w/ios/{}.a", a))
            })
            .unwrap();

        assert_eq!(compiled.artifacts.len(), 2);
        assert_eq!(compiled.artifacts[0].arch, Arch::Arm64);
        assert!(compiled.linked_packages.contains("example.com/hello"));

        let seen = script.seen.borrow();
        let programs: Vec<String> = seen
            .iter()
            .map(|c| format!("{} {}", c.program, c.args.first().cloned().unwrap_or_default()))
            .collect();
        assert_eq!(
            programs,
            ["go mod", "go build", "go mod", "go build", "nm /w/ios/amd64.a"]
        );
        let build = &seen[1];
        assert_eq!(build.flag_value("-ldflags"), Some("-s -w"));
        assert_eq!(build.flag_value("-buildmode"), Some("c-archive"));
        assert_eq!(build.arg_after("-o"), Some("/w/ios/arm64.a"));
        assert_eq!(build.args.last().map(String::as_str), Some("./gobind"));
    }

    #[test]
    fn test_failure_is_tagged_and_stops_remaining_archs() {
        let tc = fake_toolchain();
        let script = Script {
            fail_arch: Some("arm64"),
            ..Script::default()
        };
        let shell = Shell::new(script.clone());
        let compiler =
            CrossCompiler::new(&tc, Platform::Android, Path::new("/w"), BuildMode::CShared);

        let err = compiler
            .compile_all(
                &shell,
                &[Arch::Arm, Arch::Arm64, Arch::X86],
                Path::new("/w/src"),
                "./gobind",
                |a| PathBuf::from(format!("/w/{}.so", a)),
            )
            .unwrap_err();

        assert_eq!(err.arch(), Some(Arch::Arm64));
        assert!(err.to_string().contains("undefined: x"));
        let seen = script.seen.borrow();
        assert!(
            !seen
                .iter()
                .any(|c| c.env.get("GOARCH").map(String::as_str) == Some("386"))
        );
    }
}
