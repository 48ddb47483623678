//! Artifact path layout.
//!
//! Every path handed from one pipeline stage to the next is computed here,
//! once, and carried in a [`FrameworkArtifact`]. The build task writes into
//! `build_dir`, the unifier merges the binary under `framework`, the symbol
//! generator reads `binary` and writes `dsym`, the metadata patcher edits
//! `info_plist`, and the assembler packages `framework` and `dsym`.
//!
//! Each library gets its own build root, so two libraries never share a
//! toolchain cache.
//!
//! ```text
//! <root>/
//! ├── build/
//! │   └── neo_media_client/               # build root, one per library
//! │       └── build-ios/                  # PlatformDescriptor::build_folder
//! │           └── src/extern/             # LibraryTarget::sub_path
//! │               └── Release-iphoneos/   # GeneratorLayout product suffix (optional)
//! │                   ├── neo_media_client.framework
//! │                   └── neo_media_client.framework.dSYM
//! └── neo_media_client.xcframework        # bundle output
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::platform::{FrameworkLayout, PlatformDescriptor};
use crate::types::LibraryTarget;

/// Directory under the root that holds every library's build root.
pub const BUILD_DIR_NAME: &str = "build";

/// Build-file generator selection and the product sub-path it implies.
///
/// Multi-config generators such as Xcode place products in a
/// `<configuration>-<sdk>` sub-directory; single-config generators (Make,
/// Ninja) do not. The rule is kept as data: `product_suffix` is a template in
/// which `{configuration}` and `{sdk}` are substituted, and no suffix is
/// appended when it is unset.
///
/// # Example
///
/// ```
/// use xcforge_sdk::GeneratorLayout;
///
/// let xcode = GeneratorLayout::xcode();
/// assert_eq!(xcode.generator.as_deref(), Some("Xcode"));
/// assert_eq!(xcode.render_suffix("iphoneos").as_deref(), Some("Release-iphoneos"));
/// assert_eq!(GeneratorLayout::default().render_suffix("iphoneos"), None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorLayout {
    /// Generator passed to the toolchain with `-G`; the toolchain default when unset.
    pub generator: Option<String>,
    /// Build configuration (e.g. `Release`).
    pub configuration: String,
    /// Product sub-directory template.
    pub product_suffix: Option<String>,
}

impl Default for GeneratorLayout {
    fn default() -> Self {
        Self {
            generator: None,
            configuration: "Release".to_string(),
            product_suffix: None,
        }
    }
}

impl GeneratorLayout {
    /// Layout for the Xcode generator.
    pub fn xcode() -> Self {
        Self {
            generator: Some("Xcode".to_string()),
            configuration: "Release".to_string(),
            product_suffix: Some("{configuration}-{sdk}".to_string()),
        }
    }

    /// Renders the product suffix for the given SDK label.
    pub fn render_suffix(&self, sdk: &str) -> Option<String> {
        self.product_suffix
            .as_deref()
            .filter(|template| !template.is_empty())
            .map(|template| {
                template
                    .replace("{configuration}", &self.configuration)
                    .replace("{sdk}", sdk)
            })
    }
}

/// Paths of one library's framework for one platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameworkArtifact {
    /// Platform the artifact belongs to.
    pub platform: PlatformDescriptor,
    /// Library build root holding every platform's build folder.
    pub build_root: PathBuf,
    /// Platform build directory (`<build root>/<build folder>`).
    pub build_dir: PathBuf,
    /// Directory containing the `.framework`, relative to `build_dir`.
    pub product_sub_path: PathBuf,
    /// The `.framework` directory.
    pub framework: PathBuf,
    /// The framework's binary.
    pub binary: PathBuf,
    /// The framework's `Info.plist`.
    pub info_plist: PathBuf,
    /// Companion symbol bundle (`<name>.framework.dSYM`).
    pub dsym: PathBuf,
}

/// Computes artifact paths under a root directory.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
    generator: GeneratorLayout,
}

impl OutputLayout {
    /// Creates a layout rooted at `root`.
    pub fn new(root: impl Into<PathBuf>, generator: GeneratorLayout) -> Self {
        Self {
            root: root.into(),
            generator,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Build root of `library` (`<root>/build/<library name>`).
    pub fn build_root(&self, library: &LibraryTarget) -> PathBuf {
        self.root.join(BUILD_DIR_NAME).join(&library.name)
    }

    /// Build directory of `library` for `platform`.
    pub fn build_dir(&self, platform: &PlatformDescriptor, library: &LibraryTarget) -> PathBuf {
        self.build_root(library).join(platform.build_folder)
    }

    /// Directory containing the framework, relative to the build directory.
    pub fn product_sub_path(
        &self,
        platform: &PlatformDescriptor,
        library: &LibraryTarget,
    ) -> PathBuf {
        let mut path = library.sub_path.clone();
        if let Some(suffix) = self.generator.render_suffix(platform.sdk) {
            path.push(suffix);
        }
        path
    }

    /// All paths of `library`'s framework for `platform`.
    pub fn artifact(
        &self,
        platform: &PlatformDescriptor,
        library: &LibraryTarget,
    ) -> FrameworkArtifact {
        let build_root = self.build_root(library);
        let build_dir = self.build_dir(platform, library);
        let product_sub_path = self.product_sub_path(platform, library);
        let framework = build_dir
            .join(&product_sub_path)
            .join(format!("{}.framework", library.name));

        let (binary, info_plist) = match platform.framework_layout {
            FrameworkLayout::Flat => (framework.join(&library.name), framework.join("Info.plist")),
            FrameworkLayout::Versioned => {
                let version_dir = framework.join("Versions").join("A");
                (
                    version_dir.join(&library.name),
                    version_dir.join("Resources").join("Info.plist"),
                )
            }
        };

        let dsym = build_dir
            .join(&product_sub_path)
            .join(format!("{}.framework.dSYM", library.name));

        FrameworkArtifact {
            platform: *platform,
            build_root,
            build_dir,
            product_sub_path,
            framework,
            binary,
            info_plist,
            dsym,
        }
    }

    /// Output path of `library`'s xcframework.
    pub fn bundle_path(&self, library: &LibraryTarget) -> PathBuf {
        self.root.join(format!("{}.xcframework", library.name))
    }
}
