//! Merging per-architecture binaries with `lipo`.

use std::path::Path;

use tracing::{info, instrument};

use crate::builders::common::{CommandSpec, Shell};
use crate::builders::compile::ArchitectureArtifact;
use crate::types::BindError;

/// The `xcrun lipo -create` command for `artifacts`.
pub fn lipo_command(artifacts: &[ArchitectureArtifact], output: &Path) -> CommandSpec {
    let mut cmd = CommandSpec::new("xcrun").args(["lipo", "-create"]);
    for artifact in artifacts {
        cmd = cmd
            .args(["-arch", artifact.arch.clang_arch()])
            .path_arg(&artifact.path);
    }
    cmd.arg("-o").path_arg(output)
}

/// Merges every artifact into one multi-architecture binary at `output`.
///
/// Takes the artifacts by value: they are not used after merging.
#[instrument(skip_all, fields(output = %output.display(), slices = artifacts.len()))]
pub fn merge(
    shell: &Shell,
    artifacts: Vec<ArchitectureArtifact>,
    output: &Path,
) -> Result<(), BindError> {
    if artifacts.is_empty() {
        return Err(BindError::Assembly("no architecture binaries to merge".into()));
    }
    info!("Merging architectures");
    shell
        .run(&lipo_command(&artifacts, output))
        .map_err(BindError::Merge)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Arch;
    use std::path::PathBuf;

    #[test]
    fn test_lipo_command_has_one_slice_per_artifact() {
        let artifacts = vec![
            ArchitectureArtifact {
                arch: Arch::Arm64,
                path: PathBuf::from("/w/arm64.a"),
            },
            ArchitectureArtifact {
                arch: Arch::Amd64,
                path: PathBuf::from("/w/amd64.a"),
            },
        ];
        let cmd = lipo_command(&artifacts, Path::new("/w/Out"));
        assert_eq!(
            cmd.args,
            [
                "lipo", "-create", "-arch", "arm64", "/w/arm64.a", "-arch", "x86_64",
                "/w/amd64.a", "-o", "/w/Out"
            ]
        );
    }

    #[test]
    fn test_empty_merge_is_rejected() {
        let shell = Shell::system().dry_run(true);
        assert!(matches!(
            merge(&shell, Vec::new(), Path::new("/w/Out")),
            Err(BindError::Assembly(_))
        ));
    }
}
