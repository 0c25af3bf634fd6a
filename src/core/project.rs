//! Project configuration (firmkit.toml)
//!
//! Describes where the build folder, the platform core and the library
//! folders live, and how to invoke the preprocessor.

use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::defaults::{DEFAULT_BUILD_DIR, DEFAULT_PREPROCESSOR, ENV_PREPROCESSOR, PROJECT_FILE};
use crate::core::discovery::DiscoveryOptions;
use crate::core::library::LibraryLocation;
use crate::core::resolver::HeaderIndex;
use crate::error::{LibraryError, ProjectError};
use crate::infra::preprocessor::GccPreprocessor;

const APP_NAME: &str = "firmkit";

/// Parsed firmkit.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectConfig {
    /// Build configuration
    pub build: BuildConfig,

    /// Preprocessor configuration
    #[serde(default)]
    pub preprocessor: PreprocessorConfig,

    /// Library folders
    #[serde(default)]
    pub libraries: LibrariesConfig,
}

/// `[build]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BuildConfig {
    /// Build directory
    #[serde(default = "default_build_dir")]
    pub path: PathBuf,

    /// Sketch main file name, e.g. `Blink.ino`
    #[serde(default)]
    pub sketch: Option<String>,

    /// Platform core folder
    pub core_path: PathBuf,

    /// Board variant folder
    #[serde(default)]
    pub variant_path: Option<PathBuf>,

    /// Target architecture
    pub arch: String,
}

fn default_build_dir() -> PathBuf {
    PathBuf::from(DEFAULT_BUILD_DIR)
}

/// `[preprocessor]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PreprocessorConfig {
    /// Executable name or path
    #[serde(default = "default_preprocessor")]
    pub command: String,

    /// Flags placed before the discovery flags
    #[serde(default)]
    pub flags: Vec<String>,
}

fn default_preprocessor() -> String {
    DEFAULT_PREPROCESSOR.to_string()
}

impl Default for PreprocessorConfig {
    fn default() -> Self {
        Self {
            command: default_preprocessor(),
            flags: Vec::new(),
        }
    }
}

/// `[libraries]` section
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LibrariesConfig {
    /// Folders of user-installed libraries
    #[serde(default)]
    pub dirs: Vec<PathBuf>,

    /// Folders of platform-bundled libraries
    #[serde(default)]
    pub platform_dirs: Vec<PathBuf>,

    /// Single-library folders that always win ranking
    #[serde(default)]
    pub unmanaged: Vec<PathBuf>,
}

/// A loaded project: its folder plus configuration with resolved paths
#[derive(Debug, Clone)]
pub struct Project {
    /// Folder holding firmkit.toml
    pub root: PathBuf,
    /// Configuration; relative paths already resolved against `root`
    pub config: ProjectConfig,
}

impl Project {
    /// Load `firmkit.toml` from `root`
    pub fn load(root: &Path) -> Result<Self, ProjectError> {
        let path = root.join(PROJECT_FILE);
        if !path.is_file() {
            return Err(ProjectError::NotFound { path });
        }
        let content = std::fs::read_to_string(&path).map_err(|e| ProjectError::Parse {
            path: path.clone(),
            error: e.to_string(),
        })?;
        let config = Self::parse(&content).map_err(|e| ProjectError::Parse {
            path: path.clone(),
            error: e.to_string(),
        })?;
        Self::from_config(root, config)
    }

    /// Parse configuration text
    pub fn parse(content: &str) -> Result<ProjectConfig, toml::de::Error> {
        toml::from_str(content)
    }

    /// Resolve relative paths and apply environment overrides
    pub fn from_config(root: &Path, mut config: ProjectConfig) -> Result<Self, ProjectError> {
        if config.build.arch.trim().is_empty() {
            return Err(ProjectError::Invalid {
                field: "build.arch".to_string(),
                message: "must not be empty".to_string(),
            });
        }

        let resolve = |p: &PathBuf| if p.is_absolute() { p.clone() } else { root.join(p) };
        config.build.path = resolve(&config.build.path);
        config.build.core_path = resolve(&config.build.core_path);
        config.build.variant_path = config.build.variant_path.as_ref().map(resolve);
        for list in [
            &mut config.libraries.dirs,
            &mut config.libraries.platform_dirs,
            &mut config.libraries.unmanaged,
        ] {
            *list = list.iter().map(resolve).collect();
        }

        if let Ok(command) = env::var(ENV_PREPROCESSOR) {
            if !command.trim().is_empty() {
                tracing::debug!("Preprocessor overridden by {ENV_PREPROCESSOR}: {command}");
                config.preprocessor.command = command;
            }
        }

        Ok(Self {
            root: root.to_path_buf(),
            config,
        })
    }

    /// Sketch main file name; defaults to `<project folder>.ino`
    pub fn sketch_name(&self) -> String {
        self.config.build.sketch.clone().unwrap_or_else(|| {
            let dir = self
                .root
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "sketch".to_string());
            format!("{dir}.ino")
        })
    }

    /// Discovery options for this project; `sketch` overrides the main file
    pub fn discovery_options(&self, sketch: Option<&str>) -> DiscoveryOptions {
        let sketch = sketch.map(str::to_string).unwrap_or_else(|| self.sketch_name());
        let build = &self.config.build;
        let mut opts = DiscoveryOptions::new(
            &build.path,
            &build.core_path,
            format!("{sketch}.cpp"),
            build.arch.clone(),
        );
        opts.variant_path = build.variant_path.clone();
        opts
    }

    /// User library folders; the platform default when none is configured
    pub fn user_library_dirs(&self) -> Vec<PathBuf> {
        if self.config.libraries.dirs.is_empty() {
            vec![default_user_libraries_dir()]
        } else {
            self.config.libraries.dirs.clone()
        }
    }

    /// Index every configured library
    pub fn library_index(&self) -> Result<HeaderIndex, LibraryError> {
        let mut index = HeaderIndex::new();
        for dir in &self.config.libraries.platform_dirs {
            index.scan_libraries_dir(dir, LibraryLocation::PlatformBuiltIn)?;
        }
        for dir in self.user_library_dirs() {
            index.scan_libraries_dir(&dir, LibraryLocation::User)?;
        }
        for dir in &self.config.libraries.unmanaged {
            index.add_library_dir(dir, LibraryLocation::Unmanaged)?;
        }
        tracing::debug!("Indexed {} libraries", index.libraries().len());
        Ok(index)
    }

    /// Preprocessor configured for this project
    pub fn preprocessor(&self) -> GccPreprocessor {
        GccPreprocessor::new(self.config.preprocessor.command.clone())
            .with_flags(self.config.preprocessor.flags.clone())
    }
}

/// Platform data folder for user-installed libraries
pub fn default_user_libraries_dir() -> PathBuf {
    dirs::data_dir()
        .map(|p| p.join(APP_NAME))
        .unwrap_or_else(|| {
            dirs::home_dir()
                .map(|h| h.join(".local").join("share").join(APP_NAME))
                .unwrap_or_else(|| PathBuf::from(".").join(".local").join("share").join(APP_NAME))
        })
        .join("libraries")
}
