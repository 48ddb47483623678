//! Configuration file support for xcforge.
//!
//! This module provides support for `xcforge.toml` configuration files that
//! persist toolchain locations, build settings and the list of libraries to
//! package, so that Xcode build phases only need to pass the platform
//! selection.
//!
//! ## Configuration File Location
//!
//! The configuration file is searched for in the following order:
//! 1. The root directory (`<root>/xcforge.toml`)
//! 2. Parent directories (up to the repository root or filesystem root)
//!
//! An explicit `--config` path skips the search.
//!
//! ## Example Configuration
//!
//! ```toml
//! [toolchain]
//! cmake = "/opt/homebrew/bin/cmake"
//! generator = "Xcode"
//! product_suffix = "{configuration}-{sdk}"
//!
//! [build]
//! deployment_target = "16.0"
//! crypto = "mbedtls"
//!
//! [metadata]
//! minimum_system_version = "13.0"
//!
//! [[library]]
//! name = "neo_media_client"
//! source_dir = "new-qmedia"
//! bundle_identifier = "com.cisco.quicr.qmedia"
//! sub_path = "src/extern"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use xcforge_sdk::{CryptoBackend, GeneratorLayout, LibraryTarget, ToolPaths};

/// The default configuration file name.
pub const CONFIG_FILE_NAME: &str = "xcforge.toml";

/// Root configuration structure for `xcforge.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForgeConfig {
    /// Build toolchain settings.
    pub toolchain: ToolchainConfig,

    /// Values stamped into every build.
    pub build: BuildSettings,

    /// Post-build tool locations.
    pub tools: ToolsConfig,

    /// Framework metadata overrides.
    pub metadata: MetadataConfig,

    /// Libraries to build, in build order.
    #[serde(rename = "library")]
    pub libraries: Vec<LibraryConfig>,
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            toolchain: ToolchainConfig::default(),
            build: BuildSettings::default(),
            tools: ToolsConfig::default(),
            metadata: MetadataConfig::default(),
            libraries: default_libraries(),
        }
    }
}

/// Build toolchain settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainConfig {
    /// Path to `cmake`.
    ///
    /// If not specified, `cmake` is looked up on `PATH`, then at
    /// `/opt/homebrew/bin/cmake`.
    pub cmake: Option<PathBuf>,

    /// Apple platforms toolchain file, relative to the root directory.
    ///
    /// Defaults to `ios.toolchain.cmake`.
    pub toolchain_file: Option<PathBuf>,

    /// `CMAKE_MODULE_PATH`, relative to the root directory.
    ///
    /// Defaults to the root directory itself.
    pub module_path: Option<PathBuf>,

    /// Generator passed with `-G` (e.g. `Xcode`).
    pub generator: Option<String>,

    /// Build configuration. Defaults to `Release`.
    pub configuration: Option<String>,

    /// Product sub-directory template; `{configuration}` and `{sdk}` are
    /// substituted. Unset means products land directly in the sub-path.
    pub product_suffix: Option<String>,
}

/// Values stamped into every build.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildSettings {
    /// Deployment target. Defaults to `16.0`.
    pub deployment_target: Option<String>,

    /// Marketing version. Defaults to `1.0`.
    pub marketing_version: Option<String>,

    /// Build counter. Defaults to `1234`; Xcode Cloud passes its own.
    pub build_number: Option<u64>,

    /// TLS backend. Defaults to `openssl`.
    pub crypto: Option<CryptoBackend>,

    /// Compile parallelism. Defaults to the host's compute units.
    pub jobs: Option<usize>,

    /// Platforms built when none are selected on the command line.
    ///
    /// Empty means every supported platform.
    pub platforms: Vec<String>,
}

/// Post-build tool locations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Shell running the merge script. Defaults to `sh`.
    pub shell: Option<PathBuf>,
    /// Merge script, relative to the root directory. Defaults to `make_universal.sh`.
    pub merge_script: Option<PathBuf>,
    pub xcodebuild: Option<PathBuf>,
    pub dsymutil: Option<PathBuf>,
    pub plutil: Option<PathBuf>,
}

impl ToolsConfig {
    /// Applies configured locations on top of the defaults.
    pub fn to_tool_paths(&self) -> ToolPaths {
        let defaults = ToolPaths::default();
        ToolPaths {
            shell: self.shell.clone().unwrap_or(defaults.shell),
            merge_script: self.merge_script.clone().unwrap_or(defaults.merge_script),
            xcodebuild: self.xcodebuild.clone().unwrap_or(defaults.xcodebuild),
            dsymutil: self.dsymutil.clone().unwrap_or(defaults.dsymutil),
            plutil: self.plutil.clone().unwrap_or(defaults.plutil),
        }
    }
}

/// Framework metadata overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    /// Value written to `LSMinimumSystemVersion` for Catalyst frameworks.
    ///
    /// Defaults to `13.0`.
    pub minimum_system_version: String,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            minimum_system_version: "13.0".to_string(),
        }
    }
}

/// One library to build and package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryConfig {
    /// Framework name.
    pub name: String,
    /// Source directory, relative to the root directory.
    pub source_dir: PathBuf,
    /// Bundle identifier.
    pub bundle_identifier: String,
    /// Build-system target; defaults to `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compile_target: Option<String>,
    /// Framework location inside a build folder; defaults to `src`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_path: Option<PathBuf>,
}

impl LibraryConfig {
    pub fn to_target(&self) -> LibraryTarget {
        let mut target = LibraryTarget::new(
            self.name.clone(),
            self.source_dir.clone(),
            self.bundle_identifier.clone(),
        );
        if let Some(compile_target) = &self.compile_target {
            target = target.compile_target(compile_target.clone());
        }
        if let Some(sub_path) = &self.sub_path {
            target = target.sub_path(sub_path.clone());
        }
        target
    }
}

fn default_libraries() -> Vec<LibraryConfig> {
    vec![
        LibraryConfig {
            name: "neo_media_client".to_string(),
            source_dir: PathBuf::from("new-qmedia"),
            bundle_identifier: "com.cisco.quicr.qmedia".to_string(),
            compile_target: None,
            sub_path: Some(PathBuf::from("src/extern")),
        },
        LibraryConfig {
            name: "quicr".to_string(),
            source_dir: PathBuf::from("libquicr"),
            bundle_identifier: "com.cisco.quicr.quicr".to_string(),
            compile_target: None,
            sub_path: None,
        },
    ]
}

impl ForgeConfig {
    /// Loads configuration from the specified file path.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Ok(ForgeConfig)` - Successfully loaded configuration
    /// * `Err` - If the file cannot be read or parsed
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: ForgeConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        Ok(config)
    }

    /// Attempts to find and load configuration starting from the specified directory.
    ///
    /// The search walks up the directory tree and stops at the first
    /// directory containing `.git`, or at the filesystem root.
    ///
    /// # Returns
    ///
    /// * `Ok(Some((config, path)))` - Found and loaded configuration with its path
    /// * `Ok(None)` - No configuration file found
    /// * `Err` - If a config file was found but couldn't be parsed
    pub fn discover_from(start_dir: &Path) -> Result<Option<(Self, PathBuf)>> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(CONFIG_FILE_NAME);

            if config_path.is_file() {
                let config = Self::load_from_file(&config_path)?;
                return Ok(Some((config, config_path)));
            }

            // Stop at repository root or filesystem root
            if current.join(".git").exists() || !current.pop() {
                break;
            }
        }

        Ok(None)
    }

    /// Saves the configuration to the specified file path.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        Ok(())
    }

    /// Generator layout described by the `[toolchain]` section.
    pub fn generator_layout(&self) -> GeneratorLayout {
        let defaults = GeneratorLayout::default();
        GeneratorLayout {
            generator: self.toolchain.generator.clone(),
            configuration: self
                .toolchain
                .configuration
                .clone()
                .unwrap_or(defaults.configuration),
            product_suffix: self.toolchain.product_suffix.clone(),
        }
    }

    /// Generates a starter configuration file as a formatted TOML string.
    ///
    /// This includes helpful comments explaining each configuration option.
    pub fn generate_starter_toml() -> String {
        r#"# xcforge configuration file
# CLI flags override these settings when provided.

[toolchain]
# Path to cmake (default: looked up on PATH, then /opt/homebrew/bin/cmake)
# cmake = "/opt/homebrew/bin/cmake"

# Apple platforms toolchain file, relative to this directory
toolchain_file = "ios.toolchain.cmake"

# Generator and product sub-directory (uncomment for the Xcode generator)
# generator = "Xcode"
# product_suffix = "{configuration}-{sdk}"

# Build configuration (default: Release)
configuration = "Release"

[build]
# Deployment target stamped into every framework (default: 16.0)
deployment_target = "16.0"

# Marketing version (default: 1.0)
marketing_version = "1.0"

# TLS backend: "openssl" or "mbedtls" (default: openssl)
crypto = "openssl"

# Platforms built when none are selected (default: all)
# platforms = ["CATALYST_ARM", "CATALYST_X86", "IOS", "IOS_SIMULATOR"]

[metadata]
# LSMinimumSystemVersion written into Catalyst frameworks (default: 13.0)
minimum_system_version = "13.0"

[[library]]
name = "neo_media_client"
source_dir = "new-qmedia"
bundle_identifier = "com.cisco.quicr.qmedia"
sub_path = "src/extern"

[[library]]
name = "quicr"
source_dir = "libquicr"
bundle_identifier = "com.cisco.quicr.quicr"
"#
        .to_string()
    }
}

/// Configuration resolver that merges config file values with CLI arguments.
///
/// CLI arguments always take precedence over config file values.
#[derive(Debug, Default)]
pub struct ConfigResolver {
    /// Loaded configuration, if any.
    pub config: Option<ForgeConfig>,

    /// Path to the loaded config file, if any.
    pub config_path: Option<PathBuf>,
}

impl ConfigResolver {
    /// Loads `explicit` if given, otherwise discovers `xcforge.toml` from `root`.
    ///
    /// If no config file is found, the resolver will use default values
    /// which can be overridden by CLI arguments.
    pub fn new(root: &Path, explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            let config = ForgeConfig::load_from_file(path)?;
            return Ok(Self {
                config: Some(config),
                config_path: Some(path.to_path_buf()),
            });
        }

        match ForgeConfig::discover_from(root)? {
            Some((config, path)) => Ok(Self {
                config: Some(config),
                config_path: Some(path),
            }),
            None => Ok(Self::default()),
        }
    }

    /// Returns the loaded configuration, or the defaults.
    pub fn effective(&self) -> ForgeConfig {
        self.config.clone().unwrap_or_default()
    }

    /// Returns the configured `cmake` path.
    pub fn cmake(&self) -> Option<&Path> {
        self.config
            .as_ref()
            .and_then(|c| c.toolchain.cmake.as_deref())
    }

    /// Returns the libraries to build, keeping only `selected` when non-empty.
    ///
    /// # Returns
    ///
    /// * `Err` - A selected name is not a configured library
    pub fn libraries(&self, selected: &[String]) -> Result<Vec<LibraryTarget>> {
        let all = self.effective().libraries;
        if selected.is_empty() {
            return Ok(all.iter().map(LibraryConfig::to_target).collect());
        }

        selected
            .iter()
            .map(|name| {
                all.iter()
                    .find(|l| &l.name == name)
                    .map(LibraryConfig::to_target)
                    .with_context(|| {
                        let known: Vec<&str> = all.iter().map(|l| l.name.as_str()).collect();
                        format!(
                            "Unknown library '{}'. Configured libraries: {}",
                            name,
                            known.join(", ")
                        )
                    })
            })
            .collect()
    }

    /// Resolves a CLI value, using config as fallback.
    ///
    /// # Arguments
    ///
    /// * `cli_value` - Value from CLI argument (None if not provided)
    /// * `config_getter` - Function to get value from config
    /// * `default` - Default value if neither CLI nor config provides a value
    ///
    /// # Returns
    ///
    /// The resolved value, preferring CLI over config over default.
    pub fn resolve<T, F>(&self, cli_value: Option<T>, config_getter: F, default: T) -> T
    where
        F: FnOnce(&ForgeConfig) -> Option<T>,
    {
        cli_value
            .or_else(|| self.config.as_ref().and_then(config_getter))
            .unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = ForgeConfig::default();
        assert_eq!(config.metadata.minimum_system_version, "13.0");
        assert_eq!(config.libraries.len(), 2);
        assert_eq!(config.libraries[0].name, "neo_media_client");
        assert_eq!(config.generator_layout(), GeneratorLayout::default());
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join(CONFIG_FILE_NAME);

        let toml_content = r#"
[toolchain]
cmake = "/usr/local/bin/cmake"
generator = "Xcode"
product_suffix = "{configuration}-{sdk}"

[build]
deployment_target = "15.0"
build_number = 77
crypto = "mbedtls"
platforms = ["IOS"]

[tools]
merge_script = "scripts/make_universal.sh"

[[library]]
name = "quicr"
source_dir = "libquicr"
bundle_identifier = "com.cisco.quicr.quicr"
compile_target = "quicr_framework"
"#;
        std::fs::write(&config_path, toml_content).unwrap();

        let config = ForgeConfig::load_from_file(&config_path).unwrap();

        assert_eq!(
            config.toolchain.cmake,
            Some(PathBuf::from("/usr/local/bin/cmake"))
        );
        assert_eq!(config.build.deployment_target.as_deref(), Some("15.0"));
        assert_eq!(config.build.build_number, Some(77));
        assert_eq!(config.build.crypto, Some(CryptoBackend::MbedTls));
        assert_eq!(config.build.platforms, vec!["IOS".to_string()]);
        assert_eq!(config.metadata.minimum_system_version, "13.0");

        let layout = config.generator_layout();
        assert_eq!(layout.render_suffix("iphoneos").as_deref(), Some("Release-iphoneos"));

        let tools = config.tools.to_tool_paths();
        assert_eq!(tools.merge_script, PathBuf::from("scripts/make_universal.sh"));
        assert_eq!(tools.plutil, PathBuf::from("plutil"));

        assert_eq!(config.libraries.len(), 1);
        let target = config.libraries[0].to_target();
        assert_eq!(target.compile_target, "quicr_framework");
        assert_eq!(target.sub_path, PathBuf::from("src"));
    }

    #[test]
    fn test_rejects_unknown_crypto() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&config_path, "[build]\ncrypto = \"boringssl\"\n").unwrap();

        assert!(ForgeConfig::load_from_file(&config_path).is_err());
    }

    #[test]
    fn test_discover_config_in_parent() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(
            temp_dir.path().join(CONFIG_FILE_NAME),
            "[metadata]\nminimum_system_version = \"14.0\"\n",
        )
        .unwrap();
        let nested = temp_dir.path().join("dependencies");
        std::fs::create_dir(&nested).unwrap();

        let (config, path) = ForgeConfig::discover_from(&nested).unwrap().unwrap();

        assert_eq!(config.metadata.minimum_system_version, "14.0");
        assert_eq!(path, temp_dir.path().join(CONFIG_FILE_NAME));
    }

    #[test]
    fn test_discover_no_config() {
        let temp_dir = TempDir::new().unwrap();
        // Create a .git directory to stop the search
        std::fs::create_dir(temp_dir.path().join(".git")).unwrap();

        let result = ForgeConfig::discover_from(temp_dir.path()).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_starter_toml_round_trips() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&config_path, ForgeConfig::generate_starter_toml()).unwrap();

        let config = ForgeConfig::load_from_file(&config_path).unwrap();

        assert_eq!(config.libraries, ForgeConfig::default().libraries);
        assert_eq!(config.build.crypto, Some(CryptoBackend::OpenSsl));
    }

    #[test]
    fn test_save_and_reload() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join(CONFIG_FILE_NAME);
        let mut config = ForgeConfig::default();
        config.build.jobs = Some(6);

        config.save_to_file(&config_path).unwrap();
        let loaded = ForgeConfig::load_from_file(&config_path).unwrap();

        assert_eq!(loaded.build.jobs, Some(6));
        assert_eq!(loaded.libraries, config.libraries);
    }

    #[test]
    fn test_config_resolver() {
        let mut config = ForgeConfig::default();
        config.build.build_number = Some(99);
        let resolver = ConfigResolver {
            config: Some(config),
            config_path: None,
        };

        // CLI value takes precedence
        let result = resolver.resolve(Some(500), |c| c.build.build_number, 1234);
        assert_eq!(result, 500);

        // Config value used when CLI is None
        let result = resolver.resolve(None, |c| c.build.build_number, 1234);
        assert_eq!(result, 99);

        // Default when neither is set
        let empty = ConfigResolver::default();
        assert_eq!(empty.resolve(None, |c| c.build.build_number, 1234), 1234);
    }

    #[test]
    fn test_library_selection() {
        let resolver = ConfigResolver::default();

        let all = resolver.libraries(&[]).unwrap();
        assert_eq!(all.len(), 2);

        let only = resolver.libraries(&["quicr".to_string()]).unwrap();
        assert_eq!(only.len(), 1);
        assert_eq!(only[0].source_dir, PathBuf::from("libquicr"));

        let err = resolver.libraries(&["opus".to_string()]).unwrap_err();
        assert!(err.to_string().contains("neo_media_client, quicr"));
    }

    #[test]
    fn test_explicit_config_path() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("custom.toml");
        std::fs::write(&config_path, "[toolchain]\ncmake = \"/bin/cmake\"\n").unwrap();

        let resolver = ConfigResolver::new(Path::new("/nonexistent"), Some(&config_path)).unwrap();

        assert_eq!(resolver.cmake(), Some(Path::new("/bin/cmake")));
        assert_eq!(resolver.config_path.as_deref(), Some(config_path.as_path()));
    }
}
