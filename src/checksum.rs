//! Dependency checksum and sidecar file
//!
//! The checksum canonicalizes the declaration's dependency-significant
//! content: the base image, every package from every source, and script
//! install names (bodies are deliberately excluded). When the stored
//! sidecar matches, the whole build is skipped.

use crate::declaration::Declaration;
use crate::error::{DepimgError, DepimgResult};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Canonical dependency item list for checksum purposes.
///
/// Sorted and de-duplicated; script installs contribute their name only.
pub fn canonical_items(declaration: &Declaration) -> Vec<String> {
    let mut items = Vec::new();

    items.push(format!("base:{}", declaration.base_image));

    for pkg in &declaration.apt_packages {
        items.push(format!("apt:{pkg}"));
    }
    for pkg in &declaration.yum_packages {
        items.push(format!("yum:{pkg}"));
    }

    let heavy = &declaration.heavy_setup;
    for pkg in &heavy.apt_packages {
        items.push(format!("apt:{pkg}"));
    }
    for pkg in &heavy.yum_packages {
        items.push(format!("yum:{pkg}"));
    }
    for pkg in &heavy.pip_packages {
        items.push(format!("pip:{pkg}"));
    }
    for install in &heavy.script_installs {
        if !install.name.is_empty() {
            items.push(format!("script:{}", install.name));
        }
    }

    for pkg in &declaration.layers.apt {
        items.push(format!("apt:{pkg}"));
    }
    for pkg in &declaration.layers.yum {
        items.push(format!("yum:{pkg}"));
    }
    for script in &declaration.layers.scripts {
        if !script.name.is_empty() {
            items.push(format!("script:{}", script.name));
        }
    }

    items.sort_unstable();
    items.dedup();
    items
}

/// SHA-256 hex over the newline-joined canonical item list
pub fn dependency_checksum(items: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(items.join("\n").as_bytes());
    hex::encode(hasher.finalize())
}

/// Sidecar file name for a given image name and tag
pub fn sidecar_path(dir: &Path, image_name: &str, image_tag: &str) -> PathBuf {
    dir.join(format!("img_dependency_{image_name}_{image_tag}.checksum"))
}

/// Read a previously stored checksum; missing or unreadable means
/// "no prior build".
pub async fn read_sidecar(path: &Path) -> Option<String> {
    let raw = tokio::fs::read_to_string(path).await.ok()?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Write the checksum sidecar (one hex line plus newline)
pub async fn write_sidecar(path: &Path, checksum: &str) -> DepimgResult<()> {
    tokio::fs::write(path, format!("{checksum}\n"))
        .await
        .map_err(|e| DepimgError::io(format!("writing {}", path.display()), e))
}
