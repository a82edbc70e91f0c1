//! Build declaration schema
//!
//! The declaration is the user-facing description of an image: a base
//! image, heavy setup (packages and script installs), light setup (config
//! tasks), custom APT sources, and environment inheritance flags. Loaded
//! from YAML or JSON; unknown keys are tolerated, contradictory fields are
//! rejected.

use crate::error::{DepimgError, DepimgResult};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use tracing::warn;

/// Root build declaration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Declaration {
    /// Base image reference
    pub base_image: String,

    /// Name of the image being built
    pub image_name: String,

    /// Tag of the image being built
    pub image_tag: String,

    /// Package installations and script installs
    pub heavy_setup: HeavySetup,

    /// Grouped config tasks, cheap and always rebuilt
    pub light_setup: LightSetup,

    /// Lines written verbatim to /etc/apt/sources.list before apt refresh
    pub apt_sources: Vec<String>,

    /// Free-form layer map (apt/yum package lists plus named scripts)
    pub layers: LayersMap,

    // Legacy top-level package lists, honored when `layers` is empty
    pub apt_packages: Vec<String>,
    pub yum_packages: Vec<String>,

    // Environment inheritance flags
    pub inherit_env: bool,
    pub inherit_proxy: bool,
    pub inherit_locale: bool,
    pub inherit_timezone: bool,
    pub inherit_custom_env: Vec<String>,
    pub exclude_env: Vec<String>,
}

impl Default for Declaration {
    fn default() -> Self {
        Self {
            base_image: "ubuntu:22.04".to_string(),
            image_name: "my-app".to_string(),
            image_tag: "latest".to_string(),
            heavy_setup: HeavySetup::default(),
            light_setup: LightSetup::default(),
            apt_sources: Vec::new(),
            layers: LayersMap::default(),
            apt_packages: Vec::new(),
            yum_packages: Vec::new(),
            inherit_env: true,
            inherit_proxy: true,
            inherit_locale: false,
            inherit_timezone: true,
            inherit_custom_env: Vec::new(),
            exclude_env: Vec::new(),
        }
    }
}

/// Package installations and script-based installs
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HeavySetup {
    pub apt_packages: Vec<String>,
    pub yum_packages: Vec<String>,
    pub pip_packages: Vec<String>,
    pub script_installs: Vec<ScriptInstall>,
}

/// A named, opaque install script
///
/// Identity is the name: the body may change freely without forcing a
/// rebuild. At most one of `commands` / `file` may be set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptInstall {
    pub name: String,
    pub dependencies: Vec<String>,
    pub commands: Vec<String>,
    /// Script file path, relative to the declaration file's directory
    pub file: Option<String>,
    /// "src:dst" copy mappings, src relative to the declaration directory
    pub copies: Vec<String>,
}

/// One light-setup config task
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LightSetupTask {
    pub name: String,
    pub dependencies: Vec<String>,
    pub commands: Vec<String>,
}

/// Free-form layer map: `apt`/`yum` package lists plus named scripts
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LayersMap {
    pub apt: Vec<String>,
    pub yum: Vec<String>,
    pub scripts: Vec<NamedScript>,
}

impl LayersMap {
    pub fn is_empty(&self) -> bool {
        self.apt.is_empty() && self.yum.is_empty() && self.scripts.is_empty()
    }
}

/// A named script entry of the free-form layer map
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NamedScript {
    pub name: String,
    pub commands: Vec<String>,
}

/// Ordered category -> tasks mapping.
///
/// Declaration files use a plain mapping; the declared order of categories
/// is preserved, which a `HashMap` would lose.
#[derive(Debug, Clone, Default)]
pub struct LightSetup(pub Vec<(String, Vec<LightSetupTask>)>);

impl LightSetup {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for LightSetup {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (category, tasks) in &self.0 {
            map.serialize_entry(category, tasks)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for LightSetup {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct LightSetupVisitor;

        impl<'de> Visitor<'de> for LightSetupVisitor {
            type Value = LightSetup;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a mapping of category name to a list of tasks")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((category, tasks)) =
                    access.next_entry::<String, Vec<LightSetupTask>>()?
                {
                    entries.push((category, tasks));
                }
                Ok(LightSetup(entries))
            }
        }

        deserializer.deserialize_map(LightSetupVisitor)
    }
}

impl Declaration {
    /// Load a declaration from a YAML or JSON file, dispatching on extension
    pub async fn from_path(path: &Path) -> DepimgResult<Self> {
        if !path.exists() {
            return Err(DepimgError::ConfigNotFound(path.to_path_buf()));
        }
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| DepimgError::io(format!("reading {}", path.display()), e))?;

        let declaration: Declaration = match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&raw)?,
            Some("json") => serde_json::from_str(&raw)?,
            other => {
                return Err(DepimgError::ConfigInvalid {
                    path: path.to_path_buf(),
                    reason: format!(
                        "unsupported config format '{}' (expected .yaml, .yml or .json)",
                        other.unwrap_or("")
                    ),
                })
            }
        };

        declaration.validate(path)?;
        Ok(declaration)
    }

    /// Validate invariants that parsing alone cannot catch.
    ///
    /// A script install with both `commands` and `file` is an error;
    /// duplicate layer names only warn.
    pub fn validate(&self, path: &Path) -> DepimgResult<()> {
        for install in &self.heavy_setup.script_installs {
            if install.file.is_some() && !install.commands.is_empty() {
                return Err(DepimgError::ConfigInvalid {
                    path: path.to_path_buf(),
                    reason: format!(
                        "script_installs[{}] cannot specify both 'file' and 'commands'",
                        install.name
                    ),
                });
            }
        }

        let mut seen = HashSet::new();
        let names = self
            .heavy_setup
            .script_installs
            .iter()
            .map(|s| s.name.clone())
            .chain(
                self.light_setup
                    .0
                    .iter()
                    .flat_map(|(_, tasks)| tasks.iter().map(|t| t.name.clone())),
            )
            .chain(self.layers.scripts.iter().map(|s| s.name.clone()));
        for name in names {
            if !seen.insert(name.clone()) {
                warn!("duplicate layer name '{name}' in declaration");
            }
        }

        Ok(())
    }
}
