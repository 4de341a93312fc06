//! Static framework bundle assembly.
//!
//! Layout produced for a framework titled `T`:
//!
//! ```text
//! T.framework/
//!   Versions/A/T                      merged binary
//!   Versions/A/Headers/               public headers
//!   Versions/A/Resources/Info.plist
//!   Versions/A/Modules/module.modulemap
//!   Versions/Current -> A
//!   Headers   -> Versions/Current/Headers
//!   T         -> Versions/Current/T
//!   Resources -> Versions/Current/Resources
//!   Modules   -> Versions/Current/Modules
//! ```

use std::path::{Path, PathBuf};

use tracing::{info, instrument};

use crate::builders::common::{Shell, assembly_err};
use crate::builders::gobind::{GeneratedSources, REF_HEADER, UNIVERSE_BASE, header_base};
use crate::codegen::{InfoPlist, ModuleMap, UmbrellaHeader, write_validated};
use crate::packages::PackageDescriptor;
use crate::types::BindError;

/// Paths inside a framework bundle.
#[derive(Debug, Clone)]
pub struct FrameworkLayout {
    root: PathBuf,
    title: String,
}

impl FrameworkLayout {
    /// Layout for the bundle at `root`, titled after its base name.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, BindError> {
        let root = root.into();
        let title = root
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_suffix(".framework"))
            .filter(|n| !n.is_empty())
            .ok_or_else(|| {
                BindError::Config(format!(
                    "static framework name {:?} missing .framework suffix",
                    root
                ))
            })?
            .to_string();
        Ok(Self { root, title })
    }

    /// Bundle root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Module and binary name.
    pub fn title(&self) -> &str {
        &self.title
    }

    fn version_dir(&self) -> PathBuf {
        self.root.join("Versions/A")
    }

    /// `Versions/A/Headers`.
    pub fn headers_dir(&self) -> PathBuf {
        self.version_dir().join("Headers")
    }

    /// `Versions/A/Resources`.
    pub fn resources_dir(&self) -> PathBuf {
        self.version_dir().join("Resources")
    }

    /// `Versions/A/Modules`.
    pub fn modules_dir(&self) -> PathBuf {
        self.version_dir().join("Modules")
    }

    /// `Versions/A/<Title>`.
    pub fn binary_path(&self) -> PathBuf {
        self.version_dir().join(&self.title)
    }
}

/// Which headers go into the bundle and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderPlan {
    /// One package: its header is copied as `<Title>.h`.
    Single {
        source: PathBuf,
        supporting: Vec<PathBuf>,
    },
    /// Several packages: each header keeps its name and an umbrella header
    /// includes them all.
    Umbrella {
        headers: Vec<PathBuf>,
        umbrella: UmbrellaHeader,
    },
}

impl HeaderPlan {
    /// Plans headers for `packages` from the generator's output.
    pub fn for_packages(
        generated: &GeneratedSources,
        packages: &[PackageDescriptor],
        prefix: &str,
        title: &str,
    ) -> Self {
        let universe = generated.objc_header(UNIVERSE_BASE);
        if let [only] = packages {
            return HeaderPlan::Single {
                source: generated.objc_header(&header_base(prefix, &only.name)),
                supporting: vec![universe, generated.ref_header()],
            };
        }

        let mut bases: Vec<String> = packages
            .iter()
            .map(|p| header_base(prefix, &p.name))
            .collect();
        bases.push(UNIVERSE_BASE.to_string());

        let mut headers: Vec<PathBuf> = bases.iter().map(|b| generated.objc_header(b)).collect();
        headers.push(generated.ref_header());

        let mut includes = vec![REF_HEADER.to_string()];
        includes.extend(bases.iter().map(|b| format!("{}.objc.h", b)));

        HeaderPlan::Umbrella {
            headers,
            umbrella: UmbrellaHeader {
                title: title.to_string(),
                packages: packages.iter().map(|p| p.import_path.clone()).collect(),
                includes,
            },
        }
    }
}

/// Builds a framework bundle from a merged binary and generated headers.
#[derive(Debug)]
pub struct FrameworkAssembler<'a> {
    layout: &'a FrameworkLayout,
    shell: &'a Shell,
}

impl<'a> FrameworkAssembler<'a> {
    pub fn new(layout: &'a FrameworkLayout, shell: &'a Shell) -> Self {
        Self { layout, shell }
    }

    /// Replaces any bundle at the layout root with a fresh one.
    ///
    /// Returns the header names listed in the module map.
    #[instrument(skip_all, fields(bundle = %self.layout.root().display()))]
    pub fn assemble(
        &self,
        merged_binary: &Path,
        headers: &HeaderPlan,
        plist: &InfoPlist,
    ) -> Result<Vec<String>, BindError> {
        info!("Assembling framework");
        let root = self.layout.root();
        let title = self.layout.title();

        // Step 1: Reset and lay out the versioned skeleton
        self.shell
            .remove_all(root)
            .map_err(assembly_err("removing", root))?;
        for dir in [
            self.layout.headers_dir(),
            self.layout.resources_dir(),
            self.layout.modules_dir(),
        ] {
            self.shell.mkdir_all(&dir).map_err(assembly_err("creating", &dir))?;
        }

        // Step 2: Current-version symlink chain
        self.link("A", &root.join("Versions/Current"))?;
        self.link("Versions/Current/Headers", &root.join("Headers"))?;
        self.link(&format!("Versions/Current/{}", title), &root.join(title))?;
        self.link("Versions/Current/Resources", &root.join("Resources"))?;
        self.link("Versions/Current/Modules", &root.join("Modules"))?;

        // Step 3: Headers
        let header_names = self.copy_headers(headers)?;

        // Step 4: Metadata
        let plist_path = self.layout.resources_dir().join("Info.plist");
        write_validated(self.shell, &plist_path, || plist.validate(), || plist.render())?;

        let module_map = ModuleMap {
            module: title.to_string(),
            headers: header_names.clone(),
        };
        let map_path = self.layout.modules_dir().join("module.modulemap");
        write_validated(self.shell, &map_path, || module_map.validate(), || module_map.render())?;

        // Step 5: Binary
        let binary = self.layout.binary_path();
        self.shell
            .copy_file(&binary, merged_binary)
            .map_err(assembly_err("placing binary", &binary))?;

        Ok(header_names)
    }

    fn link(&self, target: &str, link: &Path) -> Result<(), BindError> {
        self.shell
            .symlink(target, link)
            .map_err(assembly_err("linking", link))
    }

    fn copy_into_headers(&self, src: &Path, name: &str) -> Result<(), BindError> {
        let dst = self.layout.headers_dir().join(name);
        self.shell
            .copy_file(&dst, src)
            .map_err(assembly_err("copying header", src))
    }

    fn copy_headers(&self, plan: &HeaderPlan) -> Result<Vec<String>, BindError> {
        let title_header = format!("{}.h", self.layout.title());
        match plan {
            HeaderPlan::Single { source, supporting } => {
                self.copy_into_headers(source, &title_header)?;
                for header in supporting {
                    self.copy_into_headers(header, &file_name(header))?;
                }
                Ok(vec![title_header])
            }
            HeaderPlan::Umbrella { headers, umbrella } => {
                let mut names = Vec::with_capacity(headers.len() + 1);
                for header in headers {
                    let name = file_name(header);
                    self.copy_into_headers(header, &name)?;
                    if name != REF_HEADER {
                        names.push(name);
                    }
                }
                let path = self.layout.headers_dir().join(&title_header);
                write_validated(self.shell, &path, || umbrella.validate(), || umbrella.render())?;
                names.push(title_header);
                Ok(names)
            }
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
