//! Driver for the `gobind` binding generator.

use std::path::{Path, PathBuf};

use tracing::{info, instrument};

use crate::builders::common::{CommandSpec, Shell, tags_flag, title_case};
use crate::context::BindContext;
use crate::packages::PackageDescriptor;
use crate::types::BindError;

/// Header base name of the shared universe package.
pub const UNIVERSE_BASE: &str = "Universe";

/// Shared reference-counting header emitted alongside every binding.
pub const REF_HEADER: &str = "ref.h";

/// Layout of the generator's output under the work directory.
#[derive(Debug, Clone)]
pub struct GeneratedSources {
    root: PathBuf,
}

impl GeneratedSources {
    /// Output rooted at `work_dir`.
    pub fn new(work_dir: &Path) -> Self {
        Self {
            root: work_dir.to_path_buf(),
        }
    }

    /// `<work>/src`, the root of the generated Go tree.
    pub fn src_dir(&self) -> PathBuf {
        self.root.join("src")
    }

    /// `<work>/src/gobind`, the generated main package and its headers.
    pub fn gobind_dir(&self) -> PathBuf {
        self.src_dir().join("gobind")
    }

    /// `<work>/java`, the generated Java sources.
    pub fn java_dir(&self) -> PathBuf {
        self.root.join("java")
    }

    /// Path of the generated Objective-C header for `base`.
    pub fn objc_header(&self, base: &str) -> PathBuf {
        self.gobind_dir().join(format!("{}.objc.h", base))
    }

    /// Path of the shared `ref.h`.
    pub fn ref_header(&self) -> PathBuf {
        self.gobind_dir().join(REF_HEADER)
    }
}

/// Header base name for one bound package: `<prefix><Title>`.
pub fn header_base(prefix: &str, package_name: &str) -> String {
    format!("{}{}", prefix, title_case(package_name))
}

/// Builds the generator command line for `packages`.
pub fn generator_command(ctx: &BindContext, packages: &[PackageDescriptor]) -> CommandSpec {
    let platform = ctx.platform();
    let opts = ctx.options();

    let mut cmd = CommandSpec::new(ctx.toolchain().gobind.display().to_string())
        .arg(format!("-lang=go,{}", platform.binding_language()))
        .arg(format!("-outdir={}", ctx.work_dir().display()))
        .env("GOOS", platform.goos())
        .env("CGO_ENABLED", "1");
    if let Some(flag) = tags_flag(ctx.tags()) {
        cmd = cmd.arg(flag);
    }
    if let Some(prefix) = &opts.prefix {
        cmd = cmd.arg(format!("-prefix={}", prefix));
    }
    if let Some(java_pkg) = &opts.java_pkg {
        cmd = cmd.arg(format!("-javapkg={}", java_pkg));
    }
    if let Some(classpath) = &opts.classpath {
        cmd = cmd.arg(format!("-classpath={}", classpath));
    }
    if let Some(bootclasspath) = &opts.bootclasspath {
        cmd = cmd.arg(format!("-bootclasspath={}", bootclasspath));
    }
    cmd.current_dir(&opts.source_dir)
        .args(packages.iter().map(|p| p.import_path.clone()))
}

/// Runs the generator once for every bound package.
///
/// The generator's diagnostics are carried verbatim in
/// [`BindError::Generation`].
#[instrument(skip_all, fields(platform = %ctx.platform(), packages = packages.len()))]
pub fn generate(
    ctx: &BindContext,
    shell: &Shell,
    packages: &[PackageDescriptor],
) -> Result<GeneratedSources, BindError> {
    info!("Generating bindings");
    shell
        .run(&generator_command(ctx, packages))
        .map_err(BindError::Generation)?;
    Ok(GeneratedSources::new(ctx.work_dir()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::env::tests::fake_toolchain;
    use crate::context::BindOptions;
    use crate::target::TargetSpec;

    fn pkg(path: &str, name: &str) -> PackageDescriptor {
        PackageDescriptor {
            import_path: path.into(),
            name: name.into(),
            dir: PathBuf::from("/src").join(name),
            is_executable: false,
        }
    }

    #[test]
    fn test_objc_generator_args() {
        let mut opts = BindOptions::new(TargetSpec::parse(Some("ios/arm64")).unwrap());
        opts.prefix = Some("MB".into());
        opts.tags = vec!["netgo".into()];
        let ctx = BindContext::new(opts, fake_toolchain(), "/work").unwrap();

        let cmd = generator_command(&ctx, &[pkg("example.com/hello", "hello")]);
        assert_eq!(cmd.program, "gobind");
        assert_eq!(cmd.flag_value("-lang"), Some("go,objc"));
        assert_eq!(cmd.flag_value("-outdir"), Some("/work"));
        assert_eq!(cmd.flag_value("-tags"), Some("netgo,ios"));
        assert_eq!(cmd.flag_value("-prefix"), Some("MB"));
        assert_eq!(cmd.args.last().map(String::as_str), Some("example.com/hello"));
        assert_eq!(cmd.env.get("GOOS").map(String::as_str), Some("darwin"));
    }

    #[test]
    fn test_java_generator_args() {
        let mut opts = BindOptions::new(TargetSpec::parse(Some("android/arm64")).unwrap());
        opts.java_pkg = Some("com.example".into());
        opts.classpath = Some("/libs/a.jar".into());
        let ctx = BindContext::new(opts, fake_toolchain(), "/work").unwrap();

        let cmd = generator_command(&ctx, &[pkg("example.com/a", "a"), pkg("example.com/b", "b")]);
        assert_eq!(cmd.flag_value("-lang"), Some("go,java"));
        assert_eq!(cmd.flag_value("-javapkg"), Some("com.example"));
        assert_eq!(cmd.flag_value("-classpath"), Some("/libs/a.jar"));
        assert!(cmd.flag_value("-tags").is_none());
        assert!(cmd.flag_value("-prefix").is_none());
        assert!(cmd.has_arg("example.com/a") && cmd.has_arg("example.com/b"));
    }

    #[test]
    fn test_header_paths() {
        let gen_out = GeneratedSources::new(Path::new("/work"));
        assert_eq!(header_base("MB", "hello"), "MBHello");
        assert_eq!(
            gen_out.objc_header("MBHello"),
            PathBuf::from("/work/src/gobind/MBHello.objc.h")
        );
        assert_eq!(gen_out.ref_header(), PathBuf::from("/work/src/gobind/ref.h"));
    }
}
