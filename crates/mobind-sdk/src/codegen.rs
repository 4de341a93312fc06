//! Bundle metadata and generated project files.
//!
//! Metadata files are built as structured descriptors that are validated
//! first and rendered second:
//!
//! - [`InfoPlist`] - `Info.plist` for frameworks and application bundles
//! - [`ModuleMap`] - Clang `module.modulemap` for a framework
//! - [`UmbrellaHeader`] - header that includes every bound package's header
//! - [`AndroidManifest`] - `AndroidManifest.xml` inside an AAR
//!
//! The Xcode project used for macOS application builds is embedded from
//! `templates/macos` and rendered with [`TemplateVar`] substitution.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use include_dir::{Dir, DirEntry, include_dir};

use crate::builders::common::{Shell, assembly_err};
use crate::types::BindError;

const MACOS_TEMPLATES: Dir = include_dir!("$CARGO_MANIFEST_DIR/templates/macos");

const PLIST_HEADER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
"#;

/// A value in an [`InfoPlist`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlistValue {
    String(String),
    Bool(bool),
}

/// A flat property list.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InfoPlist {
    entries: Vec<(String, PlistValue)>,
    required: Vec<&'static str>,
}

impl InfoPlist {
    /// Descriptor for a static framework named `title`.
    pub fn framework(title: &str) -> Self {
        let mut plist = Self::default()
            .string("CFBundleName", title)
            .string("CFBundleExecutable", title)
            .string("CFBundlePackageType", "FMWK")
            .string("CFBundleInfoDictionaryVersion", "6.0");
        plist.required = vec!["CFBundleName", "CFBundleExecutable"];
        plist
    }

    /// Descriptor for a macOS application bundle.
    pub fn application(name: &str, bundle_id: &str, min_system_version: &str) -> Self {
        let mut plist = Self::default()
            .string("CFBundleDevelopmentRegion", "en")
            .string("CFBundleExecutable", "main")
            .string("CFBundleIdentifier", bundle_id)
            .string("CFBundleInfoDictionaryVersion", "6.0")
            .string("CFBundleName", name)
            .string("CFBundlePackageType", "APPL")
            .string("CFBundleShortVersionString", "1.0")
            .string("CFBundleVersion", "1")
            .string("LSMinimumSystemVersion", min_system_version)
            .boolean("NSHighResolutionCapable", true);
        plist.required = vec!["CFBundleIdentifier", "CFBundleName", "CFBundleExecutable"];
        plist
    }

    /// Adds or replaces a string entry.
    pub fn string(self, key: &str, value: &str) -> Self {
        self.set(key, PlistValue::String(value.to_string()))
    }

    /// Adds or replaces a boolean entry.
    pub fn boolean(self, key: &str, value: bool) -> Self {
        self.set(key, PlistValue::Bool(value))
    }

    fn set(mut self, key: &str, value: PlistValue) -> Self {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key.to_string(), value)),
        }
        self
    }

    /// Looks up a string entry.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.iter().find_map(|(k, v)| match v {
            PlistValue::String(s) if k == key => Some(s.as_str()),
            _ => None,
        })
    }

    /// Checks that every required key is present and non-empty.
    pub fn validate(&self) -> Result<(), BindError> {
        for key in &self.required {
            if self.get(key).is_none_or(|v| v.trim().is_empty()) {
                return Err(BindError::Assembly(format!(
                    "Info.plist is missing required key {}",
                    key
                )));
            }
        }
        Ok(())
    }

    /// Renders XML.
    pub fn render(&self) -> String {
        let mut out = String::from(PLIST_HEADER);
        out.push_str("<plist version=\"1.0\">\n<dict>\n");
        for (key, value) in &self.entries {
            let _ = writeln!(out, "  <key>{}</key>", xml_escape(key));
            match value {
                PlistValue::String(s) => {
                    let _ = writeln!(out, "  <string>{}</string>", xml_escape(s));
                }
                PlistValue::Bool(true) => out.push_str("  <true/>\n"),
                PlistValue::Bool(false) => out.push_str("  <false/>\n"),
            }
        }
        out.push_str("</dict>\n</plist>\n");
        out
    }
}

/// Clang module map for a framework.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleMap {
    pub module: String,
    pub headers: Vec<String>,
}

impl ModuleMap {
    pub fn validate(&self) -> Result<(), BindError> {
        if self.module.is_empty() {
            return Err(BindError::Assembly("module map has no module name".into()));
        }
        if self.headers.is_empty() {
            return Err(BindError::Assembly(format!(
                "module map for {} lists no headers",
                self.module
            )));
        }
        Ok(())
    }

    pub fn render(&self) -> String {
        let mut out = format!("framework module \"{}\" {{\n", self.module);
        for header in &self.headers {
            let _ = writeln!(out, "    header \"{}\"", header);
        }
        out.push_str("    export *\n}\n");
        out
    }
}

/// Header aggregating several bound packages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UmbrellaHeader {
    /// Framework title, used for the include guard.
    pub title: String,
    /// Import paths of the bound packages, listed in the banner.
    pub packages: Vec<String>,
    /// Headers to include, in order.
    pub includes: Vec<String>,
}

impl UmbrellaHeader {
    pub fn validate(&self) -> Result<(), BindError> {
        if self.includes.is_empty() {
            return Err(BindError::Assembly(format!(
                "umbrella header for {} includes nothing",
                self.title
            )));
        }
        Ok(())
    }

    pub fn render(&self) -> String {
        let guard: String = self
            .title
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        let mut out = String::from("// Objective-C API for the Go packages:\n//\n");
        for pkg in &self.packages {
            let _ = writeln!(out, "//\t{}", pkg);
        }
        out.push_str("//\n// Generated by mobind. Do not edit.\n");
        let _ = writeln!(out, "#ifndef __{}_FRAMEWORK_H__", guard);
        let _ = writeln!(out, "#define __{}_FRAMEWORK_H__\n", guard);
        for include in &self.includes {
            let _ = writeln!(out, "#include \"{}\"", include);
        }
        out.push_str("\n#endif\n");
        out
    }
}

/// `AndroidManifest.xml` for an AAR.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AndroidManifest {
    pub package: String,
    pub min_sdk: u32,
}

impl AndroidManifest {
    pub fn validate(&self) -> Result<(), BindError> {
        let valid_segment = |s: &str| {
            let mut chars = s.chars();
            chars
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        };
        if !self.package.split('.').all(valid_segment) {
            return Err(BindError::Assembly(format!(
                "invalid Android package name {:?}",
                self.package
            )));
        }
        if self.min_sdk == 0 {
            return Err(BindError::Assembly("minSdkVersion must be positive".into()));
        }
        Ok(())
    }

    pub fn render(&self) -> String {
        format!(
            "<manifest xmlns:android=\"http://schemas.android.com/apk/res/android\" package=\"{}\">\n\
             \t<uses-sdk android:minSdkVersion=\"{}\"/>\n\
             </manifest>\n",
            xml_escape(&self.package),
            self.min_sdk
        )
    }
}

/// Validates and writes a descriptor.
pub fn write_validated(
    shell: &Shell,
    path: &Path,
    validate: impl FnOnce() -> Result<(), BindError>,
    rendered: impl FnOnce() -> String,
) -> Result<(), BindError> {
    validate()?;
    shell
        .write_file(path, rendered().as_bytes())
        .map_err(assembly_err("writing", path))
}

fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

/// Template variable that can be replaced in template files
#[derive(Debug, Clone)]
pub struct TemplateVar {
    pub name: &'static str,
    pub value: String,
}

/// File extensions that should be processed for template variable substitution
const TEMPLATE_EXTENSIONS: &[&str] = &["pbxproj", "json", "plist", "xcscheme"];

/// Renders the embedded Xcode project for a macOS app into `out_root`.
///
/// Produces `main.xcodeproj/project.pbxproj` and the app icon asset catalogue
/// under `main/Images.xcassets`.
pub fn generate_xcode_project(
    shell: &Shell,
    out_root: &Path,
    vars: &[TemplateVar],
) -> Result<Vec<PathBuf>, BindError> {
    let mut files = Vec::new();
    collect_rendered(&MACOS_TEMPLATES, vars, &mut files)?;

    let mut written = Vec::with_capacity(files.len());
    for (relative, contents) in files {
        let out_path = out_root.join(relative);
        shell
            .write_file(&out_path, &contents)
            .map_err(assembly_err("writing", &out_path))?;
        written.push(out_path);
    }
    Ok(written)
}

fn collect_rendered(
    dir: &Dir,
    vars: &[TemplateVar],
    out: &mut Vec<(PathBuf, Vec<u8>)>,
) -> Result<(), BindError> {
    for entry in dir.entries() {
        match entry {
            DirEntry::Dir(sub) => collect_rendered(sub, vars, out)?,
            DirEntry::File(file) => {
                let mut relative = file.path().to_path_buf();
                let mut contents = file.contents().to_vec();

                let is_explicit_template = relative
                    .extension()
                    .map(|ext| ext == "template")
                    .unwrap_or(false);
                if is_explicit_template {
                    relative.set_extension("");
                }

                if is_explicit_template || is_template_file(&relative) {
                    if let Ok(text) = std::str::from_utf8(&contents) {
                        let rendered = render_template(text, vars);
                        validate_no_unreplaced_placeholders(&rendered, &relative)?;
                        contents = rendered.into_bytes();
                    }
                }
                out.push((relative, contents));
            }
        }
    }
    Ok(())
}

/// Checks if a file should be processed for template variable substitution
/// based on its extension
fn is_template_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| TEMPLATE_EXTENSIONS.contains(&ext))
}

/// Validates that no unreplaced template placeholders remain in the rendered content
fn validate_no_unreplaced_placeholders(content: &str, file_path: &Path) -> Result<(), BindError> {
    let mut pos = 0;
    let mut unreplaced = Vec::new();

    while let Some(start) = content[pos..].find("{{") {
        let abs_start = pos + start;
        let Some(end) = content[abs_start..].find("}}") else {
            break;
        };
        let var_name = &content[abs_start + 2..abs_start + end];
        if !var_name.is_empty()
            && var_name
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
        {
            unreplaced.push(content[abs_start..abs_start + end + 2].to_string());
        }
        pos = abs_start + end + 2;
    }

    if !unreplaced.is_empty() {
        return Err(BindError::Assembly(format!(
            "template {:?} has unreplaced placeholders: {:?}",
            file_path, unreplaced
        )));
    }
    Ok(())
}

fn render_template(input: &str, vars: &[TemplateVar]) -> String {
    let mut output = input.to_string();
    for var in vars {
        output = output.replace(&format!("{{{{{}}}}}", var.name), &var.value);
    }
    output
}

/// Reduces `name` to an RFC 1034 label: ASCII letters, digits and hyphens,
/// starting with a letter.
///
/// Returns an empty string when nothing usable remains.
pub fn rfc1034_label(name: &str) -> String {
    let mut label = String::with_capacity(name.len());
    for c in name.chars() {
        if label.is_empty() {
            if c.is_ascii_alphabetic() {
                label.push(c);
            }
        } else if c.is_ascii_alphanumeric() || c == '-' {
            label.push(c);
        } else {
            label.push('-');
        }
    }
    label
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_framework_plist() {
        let plist = InfoPlist::framework("Hello");
        plist.validate().unwrap();
        let xml = plist.render();
        assert!(xml.starts_with("<?xml version=\"1.0\""));
        assert!(xml.contains("<key>CFBundleName</key>\n  <string>Hello</string>"));
        assert!(xml.contains("<string>FMWK</string>"));
    }

    #[test]
    fn test_plist_validation_catches_missing_fields() {
        let plist = InfoPlist::application("", "org.example.app", "10.14");
        let err = plist.validate().unwrap_err();
        assert!(err.to_string().contains("CFBundleName"));
    }

    #[test]
    fn test_plist_escapes_and_overrides() {
        let plist = InfoPlist::application("A&B", "org.example.ab", "10.14")
            .string("CFBundleVersion", "7");
        let xml = plist.render();
        assert!(xml.contains("<string>A&amp;B</string>"));
        assert_eq!(plist.get("CFBundleVersion"), Some("7"));
        assert_eq!(xml.matches("CFBundleVersion").count(), 1);
        assert!(xml.contains("<true/>"));
    }

    #[test]
    fn test_module_map() {
        let map = ModuleMap {
            module: "Hello".into(),
            headers: vec!["Hello.h".into()],
        };
        map.validate().unwrap();
        assert_eq!(
            map.render(),
            "framework module \"Hello\" {\n    header \"Hello.h\"\n    export *\n}\n"
        );
        let empty = ModuleMap {
            module: "Hello".into(),
            headers: Vec::new(),
        };
        assert!(empty.validate().is_err());
    }

    #[test]
    fn test_umbrella_header() {
        let header = UmbrellaHeader {
            title: "Mobile".into(),
            packages: vec!["example.com/a".into(), "example.com/b".into()],
            includes: vec!["ref.h".into(), "A.objc.h".into(), "B.objc.h".into()],
        };
        let text = header.render();
        assert!(text.contains("//\texample.com/a\n"));
        assert!(text.contains("#ifndef __Mobile_FRAMEWORK_H__"));
        assert!(text.contains("#include \"ref.h\"\n#include \"A.objc.h\"\n#include \"B.objc.h\"\n"));
        assert!(text.trim_end().ends_with("#endif"));
    }

    #[test]
    fn test_android_manifest() {
        let manifest = AndroidManifest {
            package: "go.hello".into(),
            min_sdk: 21,
        };
        manifest.validate().unwrap();
        assert!(manifest.render().contains("package=\"go.hello\""));
        assert!(manifest.render().contains("android:minSdkVersion=\"21\""));

        let bad = AndroidManifest {
            package: "go.1bad".into(),
            min_sdk: 21,
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_rfc1034_label() {
        assert_eq!(rfc1034_label("hello"), "hello");
        assert_eq!(rfc1034_label("my_app"), "my-app");
        assert_eq!(rfc1034_label("9lives"), "lives");
        assert_eq!(rfc1034_label("___"), "");
    }

    #[test]
    fn test_validate_no_unreplaced_placeholders() {
        assert!(validate_no_unreplaced_placeholders("hello world", Path::new("a.json")).is_ok());
        assert!(validate_no_unreplaced_placeholders("{{ lower }}", Path::new("a.json")).is_ok());
        let err = validate_no_unreplaced_placeholders("id = {{BUNDLE_ID}};", Path::new("a.pbxproj"))
            .unwrap_err();
        assert!(err.to_string().contains("{{BUNDLE_ID}}"));
    }

    #[test]
    fn test_generate_xcode_project() {
        let temp = TempDir::new().unwrap();
        let shell = Shell::system();
        let vars = [
            TemplateVar {
                name: "PRODUCT_NAME",
                value: "hello".into(),
            },
            TemplateVar {
                name: "BUNDLE_ID",
                value: "org.example.hello".into(),
            },
            TemplateVar {
                name: "MACOS_MIN_VERSION",
                value: "10.14".into(),
            },
        ];
        generate_xcode_project(&shell, temp.path(), &vars).unwrap();

        let pbxproj =
            std::fs::read_to_string(temp.path().join("main.xcodeproj/project.pbxproj")).unwrap();
        assert!(pbxproj.contains("PRODUCT_BUNDLE_IDENTIFIER = org.example.hello;"));
        assert!(!pbxproj.contains("{{"));
        assert!(
            temp.path()
                .join("main/Images.xcassets/AppIcon.appiconset/Contents.json")
                .exists()
        );
    }
}
