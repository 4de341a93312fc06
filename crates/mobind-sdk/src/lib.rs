//! Go mobile bindings for Rust tooling
//!
//! `mobind-sdk` turns Go library packages into native packages for mobile and
//! desktop hosts:
//!
//! - **Android**: an AAR with one `libgojni.so` per ABI plus Java stubs
//! - **iOS / macOS**: a static `.framework` with a multi-architecture archive,
//!   Objective-C headers and a Clang module map
//! - **macOS apps**: a signed `.app` built from a `main` package
//!
//! # Quick Start
//!
//! ```ignore
//! use mobind_sdk::{BindContext, BindOptions, Shell, TargetSpec, Toolchain};
//!
//! fn main() -> Result<(), mobind_sdk::BindError> {
//!     let mut options = BindOptions::new(TargetSpec::parse(Some("android/arm64"))?);
//!     options.packages = vec!["example.com/hello".to_string()];
//!
//!     let ctx = BindContext::new(options, Toolchain::default(), "/tmp/mobind-work")?;
//!     let result = mobind_sdk::bind(&ctx, &Shell::system())?;
//!     println!("Wrote {}", result.output.display());
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **Target**: parses `platform[/arch,...]` descriptors
//! - **Packages**: loads packages with `go list`
//! - **Modfile**: folds the module graph into a `go.mod` for generated code
//! - **Builders**: drives `gobind`, `go build`, `lipo` and bundle assembly
//! - **Codegen**: structured Info.plist, module map, umbrella header and
//!   Android manifest, plus the embedded Xcode project template
//!
//! Every external command and filesystem change goes through
//! [`builders::Shell`], which implements dry runs (`-n`) and command echo (`-x`).

// Public modules
pub mod builders;
pub mod codegen;
pub mod context;
pub mod modfile;
pub mod packages;
pub mod target;
pub mod types;

// Re-export key types for convenience
pub use builders::{GoBuildFlags, Shell, SymbolExtraction, Toolchain, bind, build_app};
pub use context::{AppContext, AppOptions, BindContext, BindOptions};
pub use packages::PackageDescriptor;
pub use target::TargetSpec;
pub use types::{Arch, BindError, BindResult, Platform};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
