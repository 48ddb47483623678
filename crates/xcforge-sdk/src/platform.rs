//! Platform registry.
//!
//! The registry is an immutable table, built once per run, that maps each
//! [`PlatformId`] to its [`PlatformDescriptor`]: the toolchain's platform name,
//! the build folder label, the SDK label and the framework layout. It also
//! holds the [`UniversalPair`] table that tells the unifier which platforms
//! share an OS family and get merged into one binary.
//!
//! ## Supported platforms
//!
//! | Id | Toolchain platform | Build folder | Merged into |
//! |----|--------------------|--------------|-------------|
//! | `CATALYST_ARM` | `MAC_CATALYST_ARM64` | `build-catalyst` | |
//! | `CATALYST_X86` | `MAC_CATALYST` | `build-catalyst-x86` | `CATALYST_ARM` |
//! | `IOS` | `OS64` | `build-ios` | |
//! | `IOS_SIMULATOR` | `SIMULATORARM64` | `build-iossim` | |

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::types::ForgeError;

/// Identifier of a supported platform/architecture combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlatformId {
    /// Mac Catalyst on Apple silicon.
    CatalystArm,
    /// Mac Catalyst on Intel.
    CatalystX86,
    /// iOS devices.
    Ios,
    /// iOS simulator on Apple silicon.
    IosSimulator,
}

impl PlatformId {
    /// Every supported platform, in registry order.
    pub const ALL: [PlatformId; 4] = [
        PlatformId::CatalystArm,
        PlatformId::CatalystX86,
        PlatformId::Ios,
        PlatformId::IosSimulator,
    ];

    /// Returns the canonical name (e.g. `CATALYST_ARM`).
    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformId::CatalystArm => "CATALYST_ARM",
            PlatformId::CatalystX86 => "CATALYST_X86",
            PlatformId::Ios => "IOS",
            PlatformId::IosSimulator => "IOS_SIMULATOR",
        }
    }
}

impl fmt::Display for PlatformId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlatformId {
    type Err = ForgeError;

    /// Parses a canonical name. Case and `-`/`_` separators are ignored, so
    /// `ios-simulator` and `IOS_SIMULATOR` are the same platform.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        PlatformId::ALL
            .into_iter()
            .find(|id| id.as_str() == normalized)
            .ok_or_else(|| ForgeError::UnknownPlatform(s.to_string()))
    }
}

/// On-disk layout of a produced `.framework`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameworkLayout {
    /// iOS style: binary and `Info.plist` at the framework root.
    Flat,
    /// macOS style: binary under `Versions/A`, plist under `Versions/A/Resources`.
    Versioned,
}

/// A metadata field that must be rewritten after the build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetadataOverride {
    /// Property list key to replace.
    pub field: &'static str,
}

/// Static description of one platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformDescriptor {
    /// Platform identifier.
    pub id: PlatformId,
    /// Value passed to the toolchain as `PLATFORM`.
    pub toolchain_platform: &'static str,
    /// Build output directory label, relative to the root directory.
    pub build_folder: &'static str,
    /// SDK label substituted into generator product suffixes.
    pub sdk: &'static str,
    /// Framework layout produced for this platform.
    pub framework_layout: FrameworkLayout,
    /// Minimum-OS field to patch, for platforms whose ecosystem enforces a
    /// version distinct from the deployment target.
    pub metadata_override: Option<MetadataOverride>,
}

/// Two builds of the same OS family that are merged into one binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UniversalPair {
    /// Platform kept after the merge; its binary holds both slices.
    pub primary: PlatformId,
    /// Platform folded into the primary and dropped afterwards.
    pub secondary: PlatformId,
    /// OS-family prefix handed to the merge script.
    pub prefix: &'static str,
}

const CATALYST_MINIMUM_OS: MetadataOverride = MetadataOverride {
    field: "LSMinimumSystemVersion",
};

const STANDARD_PLATFORMS: [PlatformDescriptor; 4] = [
    PlatformDescriptor {
        id: PlatformId::CatalystArm,
        toolchain_platform: "MAC_CATALYST_ARM64",
        build_folder: "build-catalyst",
        sdk: "maccatalyst",
        framework_layout: FrameworkLayout::Versioned,
        metadata_override: Some(CATALYST_MINIMUM_OS),
    },
    PlatformDescriptor {
        id: PlatformId::CatalystX86,
        toolchain_platform: "MAC_CATALYST",
        build_folder: "build-catalyst-x86",
        sdk: "maccatalyst",
        framework_layout: FrameworkLayout::Versioned,
        metadata_override: Some(CATALYST_MINIMUM_OS),
    },
    PlatformDescriptor {
        id: PlatformId::Ios,
        toolchain_platform: "OS64",
        build_folder: "build-ios",
        sdk: "iphoneos",
        framework_layout: FrameworkLayout::Flat,
        metadata_override: None,
    },
    PlatformDescriptor {
        id: PlatformId::IosSimulator,
        toolchain_platform: "SIMULATORARM64",
        build_folder: "build-iossim",
        sdk: "iphonesimulator",
        framework_layout: FrameworkLayout::Flat,
        metadata_override: None,
    },
];

const STANDARD_PAIRS: [UniversalPair; 1] = [UniversalPair {
    primary: PlatformId::CatalystArm,
    secondary: PlatformId::CatalystX86,
    prefix: "catalyst",
}];

/// Immutable lookup table from [`PlatformId`] to [`PlatformDescriptor`].
#[derive(Debug, Clone)]
pub struct Registry {
    descriptors: Vec<PlatformDescriptor>,
    pairs: Vec<UniversalPair>,
}

impl Registry {
    /// The registry of every supported platform.
    pub fn standard() -> Self {
        Self::from_descriptors(STANDARD_PLATFORMS.to_vec(), STANDARD_PAIRS.to_vec())
    }

    /// Builds a registry from an explicit table.
    pub fn from_descriptors(
        descriptors: Vec<PlatformDescriptor>,
        pairs: Vec<UniversalPair>,
    ) -> Self {
        Self { descriptors, pairs }
    }

    /// Looks up a platform.
    ///
    /// # Returns
    ///
    /// * `Ok(&PlatformDescriptor)` - The platform's descriptor
    /// * `Err(ForgeError::UnknownPlatform)` - The table has no such platform
    pub fn get(&self, id: PlatformId) -> Result<&PlatformDescriptor, ForgeError> {
        self.descriptors
            .iter()
            .find(|d| d.id == id)
            .ok_or_else(|| ForgeError::UnknownPlatform(id.to_string()))
    }

    /// All descriptors, in registry order.
    pub fn descriptors(&self) -> &[PlatformDescriptor] {
        &self.descriptors
    }

    /// Architecture pairs merged by the unifier.
    pub fn universal_pairs(&self) -> &[UniversalPair] {
        &self.pairs
    }

    /// The pair in which `id` is the secondary, if any.
    pub fn merged_into(&self, id: PlatformId) -> Option<&UniversalPair> {
        self.pairs.iter().find(|p| p.secondary == id)
    }
}

/// Ordered, duplicate-free set of requested platforms.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlatformSet {
    platforms: Vec<PlatformId>,
}

impl PlatformSet {
    /// Creates a set, keeping the first occurrence of each platform.
    pub fn new(platforms: impl IntoIterator<Item = PlatformId>) -> Self {
        let mut set = Self::default();
        for id in platforms {
            set.insert(id);
        }
        set
    }

    /// Every platform in `registry`, in registry order.
    pub fn all(registry: &Registry) -> Self {
        Self::new(registry.descriptors().iter().map(|d| d.id))
    }

    /// Appends `id` unless it is already present.
    pub fn insert(&mut self, id: PlatformId) -> bool {
        if self.contains(id) {
            return false;
        }
        self.platforms.push(id);
        true
    }

    /// Removes `id`, returning whether it was present.
    pub fn remove(&mut self, id: PlatformId) -> bool {
        let before = self.platforms.len();
        self.platforms.retain(|p| *p != id);
        before != self.platforms.len()
    }

    pub fn contains(&self, id: PlatformId) -> bool {
        self.platforms.contains(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = PlatformId> + '_ {
        self.platforms.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.platforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.platforms.is_empty()
    }
}

impl fmt::Display for PlatformSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.platforms.iter().map(|p| p.as_str()).collect();
        write!(f, "{{{}}}", names.join(", "))
    }
}

/// Platform selection as requested by the caller (CLI flags or Xcode build
/// settings).
#[derive(Debug, Clone, Default)]
pub struct Selection {
    /// Explicitly requested platforms.
    pub platforms: Vec<PlatformId>,
    /// Space-separated architecture list (Xcode's `ARCHS`).
    pub archs: Option<String>,
    /// Xcode's `EFFECTIVE_PLATFORM_NAME` (e.g. `-maccatalyst`).
    pub effective_platform_name: Option<String>,
}

impl Selection {
    /// Resolves the selection into a [`PlatformSet`].
    ///
    /// Explicit platforms win. Otherwise the effective platform name (and for
    /// Catalyst, the architecture list) picks the platforms. With no
    /// selection at all, every platform in `registry` is built.
    ///
    /// # Returns
    ///
    /// * `Err(ForgeError::Config)` - The effective platform name is not
    ///   recognised, or the selection resolves to no platform
    pub fn resolve(&self, registry: &Registry) -> Result<PlatformSet, ForgeError> {
        let set = if !self.platforms.is_empty() {
            PlatformSet::new(self.platforms.iter().copied())
        } else if let Some(name) = self.effective_platform_name.as_deref() {
            self.resolve_effective(name)?
        } else {
            PlatformSet::all(registry)
        };

        for id in set.iter() {
            registry.get(id)?;
        }

        if set.is_empty() {
            return Err(ForgeError::Config(format!(
                "selection resolved to no platforms (effective platform name: {:?}, archs: {:?})",
                self.effective_platform_name, self.archs
            )));
        }
        Ok(set)
    }

    fn resolve_effective(&self, name: &str) -> Result<PlatformSet, ForgeError> {
        let mut set = PlatformSet::default();
        if name.contains("maccatalyst") {
            let archs = self.archs.as_deref().unwrap_or_default();
            for arch in archs.split_whitespace() {
                match arch {
                    "arm64" => {
                        set.insert(PlatformId::CatalystArm);
                    }
                    "x86_64" => {
                        set.insert(PlatformId::CatalystX86);
                    }
                    other => log::warn!("Ignoring unsupported Catalyst architecture '{}'", other),
                }
            }
        } else if name.contains("iphonesimulator") {
            set.insert(PlatformId::IosSimulator);
        } else if name.contains("iphoneos") {
            set.insert(PlatformId::Ios);
        } else {
            return Err(ForgeError::Config(format!(
                "unrecognised effective platform name '{}' (expected maccatalyst, iphoneos or iphonesimulator)",
                name
            )));
        }
        Ok(set)
    }
}
