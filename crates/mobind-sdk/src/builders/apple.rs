//! Static framework binds for iOS and macOS.

use tracing::instrument;

use crate::builders::common::Shell;
use crate::builders::compile::{BuildMode, CrossCompiler};
use crate::builders::framework::{FrameworkAssembler, FrameworkLayout, HeaderPlan};
use crate::builders::gobind::GeneratedSources;
use crate::builders::lipo;
use crate::codegen::InfoPlist;
use crate::context::BindContext;
use crate::packages::PackageDescriptor;
use crate::types::{BindError, BindResult};

/// Compiles the generated package per architecture, merges the archives and
/// assembles `<Title>.framework`.
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
    let layout = FrameworkLayout::new(ctx.output_path(&first.name))?;
    let title = layout.title().to_string();
    let work = ctx.work_dir();
    let platform = ctx.platform();
    let archs = ctx.target().archs().to_vec();

    // Step 1: One static archive per architecture
    let compiled = CrossCompiler::new(ctx.toolchain(), platform, work, BuildMode::CArchive)
        .tags(ctx.tags())
        .ldflags(ctx.options().ldflags.as_deref())
        .build_flags(&ctx.options().build_flags)
        .tidy(tidy)
        .symbols(ctx.options().symbols)
        .compile_all(shell, &archs, &generated.src_dir(), "./gobind", |arch| {
            work.join(format!("{}-{}-{}.a", title, platform, arch))
        })?;

    // Step 2: Merge into one multi-architecture archive
    let merged = work.join(format!("{}-{}.a", title, platform));
    lipo::merge(shell, compiled.artifacts, &merged)?;

    // Step 3: Bundle
    let headers = HeaderPlan::for_packages(generated, packages, ctx.prefix(), &title);
    FrameworkAssembler::new(&layout, shell).assemble(
        &merged,
        &headers,
        &InfoPlist::framework(&title),
    )?;

    Ok(BindResult {
        platform,
        output: layout.root().to_path_buf(),
        archs,
        linked_packages: compiled.linked_packages,
    })
}
