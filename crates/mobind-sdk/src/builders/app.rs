//! macOS application bundles built from a `main` package.
//!
//! The executable is compiled per architecture and merged, then wrapped by a
//! generated Xcode project so `xcodebuild` can sign it and produce the `.app`.

use std::path::Path;

use tracing::{info, instrument, warn};

use crate::builders::common::{CommandSpec, Shell, assembly_err, title_case};
use crate::builders::compile::{BuildMode, CrossCompiler, SymbolExtraction};
use crate::builders::env::MACOS_MIN_VERSION;
use crate::builders::lipo;
use crate::codegen::{InfoPlist, TemplateVar, generate_xcode_project, rfc1034_label, write_validated};
use crate::context::AppContext;
use crate::packages::list_packages;
use crate::types::{BindError, BindResult, Platform};

/// Bundle identifier prefix used when none is configured.
pub const DEFAULT_BUNDLE_ID: &str = "org.golang.todo";

/// Builds `<name>.app` for the context's package.
#[instrument(skip_all, fields(package = %ctx.options().package, target = %ctx.target()))]
pub fn build_app(ctx: &AppContext, shell: &Shell) -> Result<BindResult, BindError> {
    let opts = ctx.options();
    let toolchain = ctx.toolchain();
    let work = ctx.work_dir();
    let archs = ctx.target().archs().to_vec();

    // Step 1: Resolve the executable package
    let packages = list_packages(
        shell,
        toolchain,
        &opts.source_dir,
        std::slice::from_ref(&opts.package),
        Platform::Macos,
        &opts.tags,
    )?;
    let [pkg] = packages.as_slice() else {
        return Err(BindError::Config(format!(
            "build takes exactly one package, {:?} matched {}",
            opts.package,
            packages.len()
        )));
    };
    if !pkg.is_executable {
        return Err(BindError::Config(format!(
            "{} is not a main package",
            pkg.import_path
        )));
    }
    let team = opts
        .team_id
        .as_deref()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| BindError::Config("no signing team; pass -team or set apple.team_id".into()))?;

    let base = pkg
        .import_path
        .rsplit('/')
        .next()
        .unwrap_or(pkg.import_path.as_str());
    let product = match rfc1034_label(base) {
        label if label.is_empty() => "ProductName".to_string(),
        label => label,
    };
    let bundle_id = format!(
        "{}.{}",
        opts.bundle_id.as_deref().unwrap_or(DEFAULT_BUNDLE_ID),
        product
    );
    let output = ctx.output_path(base);

    // Step 2: Project files
    let vars = [
        TemplateVar {
            name: "PRODUCT_NAME",
            value: product.clone(),
        },
        TemplateVar {
            name: "BUNDLE_ID",
            value: bundle_id.clone(),
        },
        TemplateVar {
            name: "MACOS_MIN_VERSION",
            value: MACOS_MIN_VERSION.to_string(),
        },
    ];
    generate_xcode_project(shell, work, &vars)?;
    let plist = InfoPlist::application(&title_case(base), &bundle_id, MACOS_MIN_VERSION);
    write_validated(
        shell,
        &work.join("main/Info.plist"),
        || plist.validate(),
        || plist.render(),
    )?;

    // Step 3: Compile and merge the executable
    let mut ldflags = String::from("-w");
    if let Some(extra) = opts.ldflags.as_deref().filter(|f| !f.trim().is_empty()) {
        ldflags.push(' ');
        ldflags.push_str(extra.trim());
    }
    let compiled = CrossCompiler::new(toolchain, Platform::Macos, work, BuildMode::Exe)
        .tags(&opts.tags)
        .ldflags(Some(&ldflags))
        .build_flags(&opts.build_flags)
        .reverse_bindings(false)
        .symbols(SymbolExtraction::FirstDeclared)
        .compile_all(shell, &archs, &opts.source_dir, &pkg.import_path, |arch| {
            work.join(arch.as_str())
        })?;
    lipo::merge(shell, compiled.artifacts, &work.join("main/main"))?;

    // Step 4: Assets
    let assets_dst = work.join("main/assets");
    shell
        .mkdir_all(&assets_dst)
        .map_err(assembly_err("creating", &assets_dst))?;
    let assets_src = pkg.dir.join("assets");
    if assets_src.is_dir() {
        shell
            .copy_dir_all(&assets_dst, &assets_src)
            .map_err(assembly_err("copying", &assets_src))?;
    }

    // Step 5: Sign and build the bundle
    info!(team = team, "Running xcodebuild");
    let xcodebuild = CommandSpec::new("xcrun")
        .arg("xcodebuild")
        .args(["-configuration", "Release"])
        .arg("-project")
        .path_arg(&work.join("main.xcodeproj"))
        .arg("-allowProvisioningUpdates")
        .arg(format!("DEVELOPMENT_TEAM={}", team))
        .current_dir(work);
    shell
        .run(&xcodebuild)
        .map_err(|e| BindError::Assembly(e.to_string()))?;

    // Step 6: Move the release build into place
    let built = work.join("build/Release/main.app");
    place_bundle(shell, &built, &output)?;

    Ok(BindResult {
        platform: Platform::Macos,
        output,
        archs,
        linked_packages: compiled.linked_packages,
    })
}

fn place_bundle(shell: &Shell, built: &Path, output: &Path) -> Result<(), BindError> {
    shell
        .remove_all(output)
        .map_err(assembly_err("removing", output))?;
    if let Err(e) = shell.rename(built, output) {
        // The work directory usually lives on another filesystem.
        warn!(error = %e, "Rename failed; copying instead");
        shell
            .copy_dir_all(output, built)
            .map_err(assembly_err("copying", built))?;
        shell.remove_all(built).map_err(assembly_err("removing", built))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_place_bundle_replaces_previous_output() {
        let temp = TempDir::new().unwrap();
        let built = temp.path().join("build/Release/main.app");
        fs::create_dir_all(built.join("Contents/MacOS")).unwrap();
        fs::write(built.join("Contents/MacOS/main"), b"new").unwrap();
        let output = temp.path().join("hello.app");
        fs::create_dir_all(output.join("old")).unwrap();

        place_bundle(&Shell::system(), &built, &output).unwrap();

        assert!(!output.join("old").exists());
        assert_eq!(fs::read(output.join("Contents/MacOS/main")).unwrap(), b"new");
        assert!(!built.exists());
    }
}
