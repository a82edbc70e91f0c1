//! Package manager command table
//!
//! Each supported manager knows how to refresh its metadata, install a
//! single package, and remove a batch of packages. Removal is always
//! best-effort (`|| true`) so cleanup layers never abort a build.

use crate::layer::LayerKind;

/// Supported package managers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PackageManager {
    Apt,
    Yum,
    Pip,
}

impl PackageManager {
    /// Dependency-item prefix and display name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Apt => "apt",
            Self::Yum => "yum",
            Self::Pip => "pip",
        }
    }

    /// Map a layer kind to its manager, if any
    pub fn for_kind(kind: LayerKind) -> Option<Self> {
        match kind {
            LayerKind::Apt => Some(Self::Apt),
            LayerKind::Yum => Some(Self::Yum),
            LayerKind::Pip => Some(Self::Pip),
            _ => None,
        }
    }

    /// Parse a dependency-item prefix ("apt", "yum", "pip")
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "apt" => Some(Self::Apt),
            "yum" => Some(Self::Yum),
            "pip" => Some(Self::Pip),
            _ => None,
        }
    }

    /// Whether installing packages requires a metadata refresh first
    pub fn needs_refresh(&self) -> bool {
        !matches!(self, Self::Pip)
    }

    /// Metadata refresh command, if the manager has one
    pub fn refresh_cmd(&self) -> Option<&'static str> {
        match self {
            Self::Apt => Some("apt-get update"),
            Self::Yum => Some("yum makecache"),
            Self::Pip => None,
        }
    }

    /// Name of the metadata refresh layer emitted during decomposition
    pub fn update_layer_name(&self) -> &'static str {
        match self {
            Self::Apt => "apt_update",
            Self::Yum => "yum_makecache",
            Self::Pip => "",
        }
    }

    /// Name of the refresh layer injected when continuing from a reused base
    pub fn refresh_layer_name(&self) -> &'static str {
        match self {
            Self::Apt => "apt_refresh",
            Self::Yum => "yum_refresh",
            Self::Pip => "",
        }
    }

    /// Best-effort batch removal command for cleanup layers
    pub fn remove_cmd(&self, packages: &[String]) -> String {
        let pkgs = packages.join(" ");
        match self {
            Self::Apt => format!(
                "apt-get purge -y {pkgs} || true && apt-get autoremove -y || true"
            ),
            Self::Yum => format!("yum remove -y {pkgs} || true"),
            Self::Pip => format!("python3 -m pip uninstall -y {pkgs} || true"),
        }
    }
}
