//! Target descriptor parsing.
//!
//! A target descriptor has the form `platform[/arch[,arch...]]`. When it is
//! omitted the primary mobile platform (Android) is selected with its full
//! architecture set.

use std::fmt;

use crate::types::{Arch, BindError, Platform};

/// Platform to build for plus the ordered, de-duplicated architectures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSpec {
    platform: Platform,
    archs: Vec<Arch>,
}

impl TargetSpec {
    /// Builds a target spec, enforcing the platform's supported set.
    ///
    /// Duplicates are dropped keeping the first occurrence; an empty list
    /// selects every supported architecture.
    pub fn new(platform: Platform, archs: &[Arch]) -> Result<Self, BindError> {
        if archs.is_empty() {
            return Ok(Self::all(platform));
        }
        let mut ordered: Vec<Arch> = Vec::with_capacity(archs.len());
        for arch in archs {
            if !platform.supported_archs().contains(arch) {
                return Err(unsupported_arch(platform, arch.as_str()));
            }
            if !ordered.contains(arch) {
                ordered.push(*arch);
            }
        }
        Ok(Self {
            platform,
            archs: ordered,
        })
    }

    /// The platform with every architecture it supports.
    pub fn all(platform: Platform) -> Self {
        Self {
            platform,
            archs: platform.supported_archs().to_vec(),
        }
    }

    /// Parses an optional descriptor such as `ios/arm64,amd64`.
    ///
    /// # Errors
    ///
    /// Returns [`BindError::Config`] for an unknown platform, an unknown
    /// architecture, or an architecture the platform does not support.
    pub fn parse(descriptor: Option<&str>) -> Result<Self, BindError> {
        let descriptor = match descriptor.map(str::trim) {
            None | Some("") => return Ok(Self::all(Platform::Android)),
            Some(d) => d,
        };

        let (platform_name, arch_list) = match descriptor.split_once('/') {
            Some((p, a)) => (p, Some(a)),
            None => (descriptor, None),
        };

        let platform = Platform::parse(platform_name).ok_or_else(|| {
            BindError::Config(format!(
                "invalid target {:?}: unsupported platform {:?} (expected one of: {})",
                descriptor,
                platform_name,
                Platform::ALL.map(|p| p.as_str()).join(", ")
            ))
        })?;

        let Some(arch_list) = arch_list else {
            return Ok(Self::all(platform));
        };

        let mut archs = Vec::new();
        for raw in arch_list.split(',') {
            // Tolerate the long form `android/arm,android/386`.
            let name = match raw.trim().split_once('/') {
                Some((p, a)) if p == platform_name => a,
                Some(_) => {
                    return Err(BindError::Config(format!(
                        "invalid target {:?}: cannot mix platforms",
                        descriptor
                    )));
                }
                None => raw.trim(),
            };
            if name.is_empty() {
                return Err(BindError::Config(format!(
                    "invalid target {:?}: empty architecture",
                    descriptor
                )));
            }
            let arch = Arch::parse(name).ok_or_else(|| unsupported_arch(platform, name))?;
            archs.push(arch);
        }

        Self::new(platform, &archs)
    }

    /// Target platform.
    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Architectures in declaration order. Never empty.
    pub fn archs(&self) -> &[Arch] {
        &self.archs
    }
}

impl fmt::Display for TargetSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let archs: Vec<&str> = self.archs.iter().map(|a| a.as_str()).collect();
        write!(f, "{}/{}", self.platform, archs.join(","))
    }
}

fn unsupported_arch(platform: Platform, name: &str) -> BindError {
    let supported: Vec<&str> = platform.supported_archs().iter().map(|a| a.as_str()).collect();
    BindError::Config(format!(
        "unsupported arch {:?} for platform {} (supported: {})",
        name,
        platform,
        supported.join(", ")
    ))
}
