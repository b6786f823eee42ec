//! Atom package configuration
//!
//! Loaded from a TOML document with an `[atoms]` table:
//!
//! ```toml
//! [atoms]
//! package_root = "src"
//! template_dirs = ["html", "templates"]
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::Error;

/// Where atom packages live and which of their directories hold templates
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AtomsConfig {
    /// Directory packages are resolved against; `a.b` maps to `<root>/a/b`
    pub package_root: PathBuf,
    /// Template directories inside a package, searched in order
    pub template_dirs: Vec<String>,
}

impl Default for AtomsConfig {
    fn default() -> Self {
        Self {
            package_root: PathBuf::from("."),
            template_dirs: vec!["html".to_string(), "templates".to_string()],
        }
    }
}

#[derive(Deserialize)]
struct TomlConfig {
    #[serde(default)]
    atoms: AtomsConfig,
}

impl AtomsConfig {
    pub fn with_package_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.package_root = root.into();
        self
    }

    pub fn with_template_dirs<S: Into<String>>(mut self, dirs: impl IntoIterator<Item = S>) -> Self {
        self.template_dirs = dirs.into_iter().map(Into::into).collect();
        self
    }

    /// Load from a TOML file; a relative `package_root` is taken relative to the file
    pub fn from_file(path: &Path) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_str(&content)?;
        if config.package_root.is_relative() {
            if let Some(dir) = path.parent() {
                config.package_root = dir.join(&config.package_root);
            }
        }
        Ok(config)
    }

    /// Load from a TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, Error> {
        let parsed: TomlConfig = toml::from_str(content)?;
        Ok(parsed.atoms)
    }

    /// Directory of a dotted package name
    pub fn package_dir(&self, package: &str) -> PathBuf {
        package
            .split('.')
            .fold(self.package_root.clone(), |dir, segment| dir.join(segment))
    }

    /// Template search path of a package, in lookup order
    pub fn search_path(&self, package: &str) -> Vec<PathBuf> {
        let dir = self.package_dir(package);
        self.template_dirs.iter().map(|d| dir.join(d)).collect()
    }
}
