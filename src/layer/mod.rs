//! Layer model
//!
//! A layer is one atomic image mutation: install one package, run one
//! script, or apply one config task. Layers carry a stable content hash
//! used in intermediate image tags, and map to canonical dependency items
//! (`type:identity`) used for set-based reuse planning.

pub mod decompose;

use sha2::{Digest, Sha256};
use std::fmt;

/// Layer categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerKind {
    Base,
    Apt,
    Yum,
    Pip,
    Script,
    Config,
}

impl LayerKind {
    /// Lowercase wire name, used in hashes, tags and dependency items
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Base => "base",
            Self::Apt => "apt",
            Self::Yum => "yum",
            Self::Pip => "pip",
            Self::Script => "script",
            Self::Config => "config",
        }
    }

    /// Whether this kind installs a single package via a package manager
    pub fn is_package(&self) -> bool {
        matches!(self, Self::Apt | Self::Yum | Self::Pip)
    }
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Layer names that are pure maintenance: metadata refreshes, custom APT
/// sources, and cleanup removals. They never contribute dependency items.
const MAINTENANCE_NAMES: &[&str] = &[
    "apt_update",
    "yum_makecache",
    "apt_refresh",
    "yum_refresh",
    "apt_sources",
];

/// One atomic image mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layer {
    /// Identifier; for packages, the sanitized package specifier
    pub name: String,
    pub kind: LayerKind,
    /// Package specifier, script/config body, or base image reference
    pub content: String,
    /// "src:dst" copy mappings for script layers
    pub copies: Vec<String>,
    /// Informational dependency names
    pub dependencies: Vec<String>,
    hash: String,
}

impl Layer {
    pub fn new(name: impl Into<String>, kind: LayerKind, content: impl Into<String>) -> Self {
        let name = name.into();
        let content = content.into();
        let hash = content_hash(kind, &name, &content);
        Self {
            name,
            kind,
            content,
            copies: Vec::new(),
            dependencies: Vec::new(),
            hash,
        }
    }

    pub fn with_copies(mut self, copies: Vec<String>) -> Self {
        self.copies = copies;
        self
    }

    /// First 8 hex chars of SHA-256 over `"{type}:{name}:{content}"`
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Canonical dependency item, or `None` for layers that are never part
    /// of the dependency set (base, config, maintenance, cleanup).
    pub fn dep_item(&self) -> Option<String> {
        if self.is_maintenance() {
            return None;
        }
        match self.kind {
            LayerKind::Apt | LayerKind::Yum | LayerKind::Pip => {
                Some(format!("{}:{}", self.kind, self.content))
            }
            LayerKind::Script => Some(format!("script:{}", self.name)),
            LayerKind::Base | LayerKind::Config => None,
        }
    }

    /// Maintenance layers: package metadata refreshes, APT sources writes,
    /// and cleanup removals.
    pub fn is_maintenance(&self) -> bool {
        MAINTENANCE_NAMES.contains(&self.name.as_str()) || self.name.ends_with("_cleanup_remove")
    }

    /// Intermediate image tag for this layer under the naming scheme
    pub fn image_tag(&self, repo: &str, base_tag_slug: &str) -> String {
        format!(
            "{repo}:{base_tag_slug}__layer-{}-{}-{}",
            slugify(self.kind.as_str()),
            slugify(&self.name),
            self.hash
        )
    }
}

fn content_hash(kind: LayerKind, name: &str, content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}:{}:{}", kind.as_str(), name, content).as_bytes());
    hex::encode(hasher.finalize())[..8].to_string()
}

/// Replace every character outside `[A-Za-z0-9._-]` with `_`
pub fn slugify(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Derive a layer name from a package specifier
/// (`-` -> `_`, `+` -> `plus`, `.` -> `_`)
pub fn sanitize_package_name(package: &str) -> String {
    package
        .replace('-', "_")
        .replace('+', "plus")
        .replace('.', "_")
}

/// Split a base image reference into (short repo name, tag).
///
/// The tag separator is the last `:` after the last `/`; a missing tag
/// defaults to `latest`. Only the final path segment of the repository is
/// kept, for human-readable prefixes.
pub fn split_base_image(base_image: &str) -> (String, String) {
    let last_slash = base_image.rfind('/');
    let last_colon = base_image.rfind(':');
    let (name, tag) = match (last_colon, last_slash) {
        (Some(c), Some(s)) if c > s => (&base_image[..c], &base_image[c + 1..]),
        (Some(c), None) => (&base_image[..c], &base_image[c + 1..]),
        _ => (base_image, "latest"),
    };
    let repo = name.rsplit('/').next().unwrap_or(name);
    (repo.to_string(), tag.to_string())
}
