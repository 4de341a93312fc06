//! Android archive (AAR) binds.
//!
//! Each architecture is compiled to `jni/<abi>/libgojni.so`. The generated
//! Java sources are compiled into `classes.jar`, and everything is packed
//! into an AAR with a sibling `-sources.jar`.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument};

use crate::builders::common::{CommandSpec, Shell, assembly_err};
use crate::builders::compile::{BuildMode, CrossCompiler};
use crate::builders::gobind::GeneratedSources;
use crate::codegen::{AndroidManifest, write_validated};
use crate::context::BindContext;
use crate::packages::PackageDescriptor;
use crate::types::{BindError, BindResult};

/// Soname every per-ABI library is linked with.
const LIB_NAME: &str = "libgojni.so";

/// Java language level for the generated stubs.
const JAVA_RELEASE: &str = "1.8";

/// Compiles every ABI and packs the AAR.
#[instrument(skip_all, fields(target = %ctx.target()))]
pub fn bind(
    ctx: &BindContext,
    shell: &Shell,
    packages: &[PackageDescriptor],
    generated: &GeneratedSources,
    tidy: bool,
) -> Result<BindResult, BindError> {
    let first = packages
        .first()
        .ok_or_else(|| BindError::PackageLoad("no packages to bind".into()))?;
    let output = absolute(&ctx.output_path(&first.name))?;
    let bootclasspath = boot_classpath(ctx)?;
    let work = ctx.work_dir();
    let archs = ctx.target().archs().to_vec();

    // Step 1: One shared library per ABI
    let jni_dir = work.join("android/jni");
    for arch in &archs {
        let dir = jni_dir.join(arch.android_abi());
        shell.mkdir_all(&dir).map_err(assembly_err("creating", &dir))?;
    }
    let soname = format!("-extldflags=-Wl,-soname,{}", LIB_NAME);
    let compiled = CrossCompiler::new(ctx.toolchain(), ctx.platform(), work, BuildMode::CShared)
        .tags(ctx.tags())
        .ldflags(ctx.options().ldflags.as_deref())
        .ldflags(Some(&soname))
        .build_flags(&ctx.options().build_flags)
        .tidy(tidy)
        .symbols(ctx.options().symbols)
        .compile_all(shell, &archs, &generated.src_dir(), "./gobind", |arch| {
            jni_dir.join(arch.android_abi()).join(LIB_NAME)
        })?;
    debug!(libraries = compiled.artifacts.len(), "Compiled shared libraries");

    // Step 2: Stage and pack the archive
    let staging = work.join("aar");
    AarAssembler {
        shell,
        staging: &staging,
    }
    .assemble(ctx, packages, generated, &jni_dir, &bootclasspath, &output)?;

    Ok(BindResult {
        platform: ctx.platform(),
        output,
        archs,
        linked_packages: compiled.linked_packages,
    })
}

fn boot_classpath(ctx: &BindContext) -> Result<String, BindError> {
    if let Some(bcp) = &ctx.options().bootclasspath {
        return Ok(bcp.clone());
    }
    ctx.toolchain()
        .android
        .as_ref()
        .and_then(|ndk| ndk.android_jar.as_ref())
        .map(|jar| jar.display().to_string())
        .ok_or_else(|| {
            BindError::Config(
                "android.jar not found; install an Android platform or pass -bootclasspath".into(),
            )
        })
}

fn absolute(path: &Path) -> Result<PathBuf, BindError> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

/// Path of the sources jar written next to `aar`.
pub fn sources_jar_path(aar: &Path) -> PathBuf {
    let stem = aar
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    aar.with_file_name(format!("{}-sources.jar", stem))
}

struct AarAssembler<'a> {
    shell: &'a Shell,
    staging: &'a Path,
}

impl AarAssembler<'_> {
    fn assemble(
        &self,
        ctx: &BindContext,
        packages: &[PackageDescriptor],
        generated: &GeneratedSources,
        jni_dir: &Path,
        bootclasspath: &str,
        output: &Path,
    ) -> Result<(), BindError> {
        info!(output = %output.display(), "Assembling AAR");
        let shell = self.shell;
        let staging = self.staging;
        shell
            .remove_all(staging)
            .map_err(assembly_err("removing", staging))?;
        shell
            .mkdir_all(&staging.join("res"))
            .map_err(assembly_err("creating", staging))?;

        let manifest = AndroidManifest {
            package: format!("go.{}", packages[0].name),
            min_sdk: ctx.options().min_sdk,
        };
        write_validated(
            shell,
            &staging.join("AndroidManifest.xml"),
            || manifest.validate(),
            || manifest.render(),
        )?;

        let mut proguard = String::from("-keep class go.** { *; }\n");
        if let Some(java_pkg) = &ctx.options().java_pkg {
            proguard.push_str(&format!("-keep class {}.** {{ *; }}\n", java_pkg));
        }
        self.write(&staging.join("proguard.txt"), proguard.as_bytes())?;
        self.write(&staging.join("R.txt"), b"")?;

        self.build_classes_jar(ctx, generated, bootclasspath)?;

        let jni = staging.join("jni");
        shell
            .copy_dir_all(&jni, jni_dir)
            .map_err(assembly_err("copying", jni_dir))?;

        for pkg in packages {
            let assets = pkg.dir.join("assets");
            if assets.is_dir() {
                let dst = staging.join("assets");
                shell
                    .copy_dir_all(&dst, &assets)
                    .map_err(assembly_err("copying", &assets))?;
            }
        }

        if let Some(parent) = output.parent() {
            shell.mkdir_all(parent).map_err(assembly_err("creating", parent))?;
        }
        shell
            .remove_all(output)
            .map_err(assembly_err("removing", output))?;
        let zip = CommandSpec::new("zip")
            .arg("-qr")
            .path_arg(output)
            .arg(".")
            .current_dir(staging);
        shell
            .run(&zip)
            .map_err(|e| BindError::Assembly(e.to_string()))?;

        let sources = sources_jar_path(output);
        let jar = CommandSpec::new("jar")
            .arg("cf")
            .path_arg(&sources)
            .arg("-C")
            .path_arg(&generated.java_dir())
            .arg(".");
        shell
            .run(&jar)
            .map_err(|e| BindError::Assembly(e.to_string()))?;
        Ok(())
    }

    fn build_classes_jar(
        &self,
        ctx: &BindContext,
        generated: &GeneratedSources,
        bootclasspath: &str,
    ) -> Result<(), BindError> {
        let classes = ctx.work_dir().join("javac-output");
        self.shell
            .mkdir_all(&classes)
            .map_err(assembly_err("creating", &classes))?;

        let mut javac = CommandSpec::new("javac")
            .arg("-d")
            .path_arg(&classes)
            .args(["-source", JAVA_RELEASE, "-target", JAVA_RELEASE])
            .args(["-bootclasspath", bootclasspath]);
        if let Some(classpath) = &ctx.options().classpath {
            javac = javac.args(["-classpath", classpath.as_str()]);
        }
        let sources = java_sources(&generated.java_dir())?;
        if sources.is_empty() && !self.shell.is_dry_run() {
            return Err(BindError::Assembly(format!(
                "no Java sources generated under {}",
                generated.java_dir().display()
            )));
        }
        for source in &sources {
            javac = javac.path_arg(source);
        }
        self.shell
            .run(&javac)
            .map_err(|e| BindError::Assembly(e.to_string()))?;

        let jar = CommandSpec::new("jar")
            .arg("cf")
            .path_arg(&self.staging.join("classes.jar"))
            .arg("-C")
            .path_arg(&classes)
            .arg(".");
        self.shell
            .run(&jar)
            .map_err(|e| BindError::Assembly(e.to_string()))?;
        Ok(())
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<(), BindError> {
        self.shell
            .write_file(path, contents)
            .map_err(assembly_err("writing", path))
    }
}

/// Every `.java` file under `dir`, sorted. A missing directory yields none.
fn java_sources(dir: &Path) -> Result<Vec<PathBuf>, BindError> {
    let mut found = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else if path.extension().is_some_and(|ext| ext == "java") {
                found.push(path);
            }
        }
    }
    found.sort();
    Ok(found)
}
