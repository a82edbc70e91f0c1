//! Image label schema for dependency metadata
//!
//! Built images carry their full dependency set in labels under the
//! `io.teleinfra.imgdeps.` namespace so the planner can recover it with a
//! single `inspect` call, without running the image. The base64 payload is
//! the source of truth; the plain JSON variant is attached only when small
//! enough to stay readable in `inspect` output.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

pub const LABEL_VERSION: &str = "io.teleinfra.imgdeps.version";
pub const LABEL_CACHE_KEY: &str = "io.teleinfra.imgdeps.cache_key";
pub const LABEL_CREATED: &str = "io.teleinfra.imgdeps.created";
pub const LABEL_ITEMS: &str = "io.teleinfra.imgdeps.items";
pub const LABEL_ITEMS_B64: &str = "io.teleinfra.imgdeps.items_b64";

/// Schema version written into `.version`
pub const SCHEMA_VERSION: &str = "1";

/// Fixed in-image path used by images produced before the label schema
pub const LEGACY_ITEMS_PATH: &str = "/opt/dependency_img_build/dependencies.list";

/// Plain `.items` label is omitted beyond this JSON payload size
const PLAIN_ITEMS_LIMIT: usize = 2048;

/// SHA-256 hex of the sorted, newline-joined dependency items
pub fn cache_key(items: &[String]) -> String {
    let mut sorted: Vec<&str> = items.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    let mut hasher = Sha256::new();
    hasher.update(sorted.join("\n").as_bytes());
    hex::encode(hasher.finalize())
}

/// Encode a dependency item list into the full label set
pub fn encode(items: &[String]) -> Vec<(String, String)> {
    let mut sorted: Vec<String> = items.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    // Vec<String> serialization cannot fail
    let payload = serde_json::to_string(&sorted).unwrap_or_default();
    let mut labels = vec![
        (LABEL_VERSION.to_string(), SCHEMA_VERSION.to_string()),
        (LABEL_CACHE_KEY.to_string(), cache_key(&sorted)),
        (
            LABEL_CREATED.to_string(),
            Utc::now().format("%Y%m%dT%H%M%SZ").to_string(),
        ),
        (LABEL_ITEMS_B64.to_string(), BASE64.encode(&payload)),
    ];
    if payload.len() <= PLAIN_ITEMS_LIMIT {
        labels.push((LABEL_ITEMS.to_string(), payload));
    }
    labels
}

/// Render labels as a single `LABEL k=v k=v ...` change directive for
/// `import --change`. Values are quoted; b64/hex values never need escapes
/// but the plain JSON variant does.
pub fn change_directive(labels: &[(String, String)]) -> String {
    let parts: Vec<String> = labels
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", k, v.replace('\\', "\\\\").replace('"', "\\\"")))
        .collect();
    format!("LABEL {}", parts.join(" "))
}

/// Recover the dependency item list from inspected labels.
///
/// Prefers `.items_b64`; falls back to plain `.items`. Returns `None` when
/// neither is present or decoding fails.
pub fn decode(labels: &HashMap<String, String>) -> Option<Vec<String>> {
    if let Some(b64) = labels.get(LABEL_ITEMS_B64) {
        if let Ok(bytes) = BASE64.decode(b64.trim()) {
            if let Ok(items) = serde_json::from_slice::<Vec<String>>(&bytes) {
                return Some(items);
            }
        }
    }
    if let Some(plain) = labels.get(LABEL_ITEMS) {
        if let Ok(items) = serde_json::from_str::<Vec<String>>(plain) {
            return Some(items);
        }
    }
    None
}
